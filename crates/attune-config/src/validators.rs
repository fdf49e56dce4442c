//! Per-value validators.
//!
//! Validators run after a value has decoded successfully. They never see
//! raw strings and never see `null`. Path validators accept a path (or a
//! string naming one) and check every element of a list.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ValueValidationError;
use crate::option::ConfigOption;
use crate::value::ConfigValue;

/// A named check applied to a decoded option value.
///
/// Implementations must be side-effect free apart from inspecting the
/// filesystem or whatever resource the value names.
pub trait ConfigValueValidator: Send + Sync + fmt::Debug {
    /// Short human readable name.
    fn name(&self) -> &str;

    /// What the validator checks.
    fn description(&self) -> &str;

    /// Check `value`, which is about to be stored on `option`.
    ///
    /// # Errors
    ///
    /// Returns a [`ValueValidationError`] describing the first problem found.
    fn validate(
        &self,
        option_name: &str,
        option: &ConfigOption,
        value: &ConfigValue,
    ) -> Result<(), ValueValidationError>;
}

/// The file at the path exists and is a regular file.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsureFileExists;

/// The directory at the path exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsureDirectoryExists;

/// The path can be read. A path that does not exist is judged by its parent.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsurePathIsReadable;

/// The path can be written. A path that does not exist is judged by its parent.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsurePathIsWritable;

/// The path is executable. A path that does not exist is judged by its parent.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsurePathIsExecutable;

/// The file name ends with the given (possibly compound) extension.
///
/// ```
/// use attune_config::EnsureFileHasExtension;
///
/// assert_eq!(EnsureFileHasExtension::new("tar.gz").extension(), ".tar.gz");
/// assert_eq!(EnsureFileHasExtension::new(".json").extension(), ".json");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureFileHasExtension {
    extension: String,
}

impl EnsureFileHasExtension {
    /// Expect `extension`, with or without its leading dot.
    pub fn new(extension: impl Into<String>) -> Self {
        let extension = extension.into();
        let extension = if extension.starts_with('.') {
            extension
        } else {
            format!(".{extension}")
        };
        Self { extension }
    }

    /// The expected extension, always with a leading dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl ConfigValueValidator for EnsureFileExists {
    fn name(&self) -> &str {
        "Validate File Exists"
    }

    fn description(&self) -> &str {
        "Validates that the file at a given path exists."
    }

    fn validate(&self, _: &str, _: &ConfigOption, value: &ConfigValue) -> Result<(), ValueValidationError> {
        for_each_path(self.name(), value, |path| {
            if !path.exists() {
                return Err(format!("file at {} does not exist", path.display()));
            }
            if !path.is_file() {
                return Err(format!("{} is not a file", path.display()));
            }
            Ok(())
        })
    }
}

impl ConfigValueValidator for EnsureDirectoryExists {
    fn name(&self) -> &str {
        "Validate Directory Exists"
    }

    fn description(&self) -> &str {
        "Validates that the directory at a given path exists."
    }

    fn validate(&self, _: &str, _: &ConfigOption, value: &ConfigValue) -> Result<(), ValueValidationError> {
        for_each_path(self.name(), value, |path| {
            if !path.exists() {
                return Err(format!("directory at {} does not exist", path.display()));
            }
            if !path.is_dir() {
                return Err(format!("{} is not a directory", path.display()));
            }
            Ok(())
        })
    }
}

impl ConfigValueValidator for EnsurePathIsReadable {
    fn name(&self) -> &str {
        "Validate Path is Readable"
    }

    fn description(&self) -> &str {
        "Validates that a given path is readable."
    }

    fn validate(&self, _: &str, _: &ConfigOption, value: &ConfigValue) -> Result<(), ValueValidationError> {
        for_each_path(self.name(), value, |path| {
            if has_access(&existing_or_parent(path), Access::Read) {
                Ok(())
            } else {
                Err(format!("{} is not readable", path.display()))
            }
        })
    }
}

impl ConfigValueValidator for EnsurePathIsWritable {
    fn name(&self) -> &str {
        "Validate Path is Writable"
    }

    fn description(&self) -> &str {
        "Validates that a given path is writable."
    }

    fn validate(&self, _: &str, _: &ConfigOption, value: &ConfigValue) -> Result<(), ValueValidationError> {
        for_each_path(self.name(), value, |path| {
            if has_access(&existing_or_parent(path), Access::Write) {
                Ok(())
            } else {
                Err(format!("{} is not writable", path.display()))
            }
        })
    }
}

impl ConfigValueValidator for EnsurePathIsExecutable {
    fn name(&self) -> &str {
        "Validate Path is Executable"
    }

    fn description(&self) -> &str {
        "Validates that a given path is executable."
    }

    fn validate(&self, _: &str, _: &ConfigOption, value: &ConfigValue) -> Result<(), ValueValidationError> {
        for_each_path(self.name(), value, |path| {
            if has_access(&existing_or_parent(path), Access::Execute) {
                Ok(())
            } else {
                Err(format!("{} is not executable", path.display()))
            }
        })
    }
}

impl ConfigValueValidator for EnsureFileHasExtension {
    fn name(&self) -> &str {
        "Validate File Type"
    }

    fn description(&self) -> &str {
        "Validates that the file at a given path is of set file type."
    }

    fn validate(&self, _: &str, _: &ConfigOption, value: &ConfigValue) -> Result<(), ValueValidationError> {
        for_each_path(self.name(), value, |path| {
            if joined_extensions(path) == self.extension {
                Ok(())
            } else {
                Err(format!("{} is not {}", path.display(), self.extension))
            }
        })
    }
}

fn for_each_path<F>(validator: &str, value: &ConfigValue, check: F) -> Result<(), ValueValidationError>
where
    F: Fn(&Path) -> Result<(), String>,
{
    fn visit<F>(validator: &str, value: &ConfigValue, check: &F) -> Result<(), ValueValidationError>
    where
        F: Fn(&Path) -> Result<(), String>,
    {
        match value {
            ConfigValue::Null => Ok(()),
            ConfigValue::Path(path) => check(path).map_err(|m| ValueValidationError::new(validator, m)),
            ConfigValue::Str(s) => check(Path::new(s)).map_err(|m| ValueValidationError::new(validator, m)),
            ConfigValue::List(items) => items.iter().try_for_each(|item| visit(validator, item, check)),
            other => Err(ValueValidationError::new(
                validator,
                format!("expected a path, got {other}"),
            )),
        }
    }

    visit(validator, value, &check)
}

fn existing_or_parent(path: &Path) -> PathBuf {
    if path.exists() {
        return path.to_path_buf();
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    Write,
    Execute,
}

/// Ask the kernel whether the calling process may access `path`, so owner,
/// group and superuser rules all apply.
#[cfg(unix)]
fn has_access(path: &Path, access: Access) -> bool {
    use rustix::fs::{access as check_access, Access as Mode};

    let mode = match access {
        Access::Read => Mode::READ_OK,
        Access::Write => Mode::WRITE_OK,
        Access::Execute => Mode::EXEC_OK,
    };
    check_access(path, mode).is_ok()
}

#[cfg(not(unix))]
fn has_access(path: &Path, access: Access) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    match access {
        Access::Read | Access::Execute => true,
        Access::Write => !metadata.permissions().readonly(),
    }
}

/// `archive.tar.gz` has the joined extension `.tar.gz`; dot files have none.
fn joined_extensions(path: &Path) -> String {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return String::new();
    };
    let name = name.trim_start_matches('.');
    name.find('.').map_or_else(String::new, |i| name[i..].to_string())
}
