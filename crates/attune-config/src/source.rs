//! Configuration sources.
//!
//! A source turns a prefix into a flat `KEY -> raw string` map. Sources do
//! not decode, trim or validate anything; they only strip framing that is
//! specific to where the values live.
//!
//! File-like sources share one document grammar: one `KEY=VALUE` pair per
//! line, split on the first `=`, lines separated by `\n`. Empty lines are
//! skipped and a trailing `\r` is dropped. There is no quoting, escaping or
//! comment syntax.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::header::AUTHORIZATION;
use tracing::debug;

use crate::error::SourceError;

/// Key/value separator of the document grammar.
pub const KEY_VALUE_SEPARATOR: char = '=';

/// Line separator of the document grammar.
pub const LINE_SEPARATOR: char = '\n';

/// Default user agent sent by [`RemoteHttpFile`].
pub const DEFAULT_USER_AGENT: &str = concat!("attune-", env!("CARGO_PKG_VERSION"));

/// Default timeout of [`RemoteHttpFile`].
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// A backend supplying raw configuration values.
pub trait ConfigSource: Send + Sync + fmt::Debug {
    /// Short human readable name, used in errors and logs.
    fn name(&self) -> &str;

    /// What the source reads from.
    fn description(&self) -> &str;

    /// Every entry whose key starts with `prefix`.
    ///
    /// # Errors
    ///
    /// [`SourceError::Permission`] when the source exists but cannot be read,
    /// [`SourceError::Connection`] when a networked source is unreachable and
    /// [`SourceError::Parse`] when the document is malformed.
    fn fetch(&self, prefix: &str) -> Result<HashMap<String, String>, SourceError>;
}

/// Parse a `KEY=VALUE` document.
///
/// ```
/// use attune_config::parse_document;
///
/// let values = parse_document("DB_USER=admin\nDB_URL=postgres://h/db?sslmode=require\n").unwrap();
/// assert_eq!(values["DB_URL"], "postgres://h/db?sslmode=require");
/// assert!(parse_document("DB_USER").is_err());
/// ```
pub fn parse_document(text: &str) -> Result<HashMap<String, String>, SourceError> {
    let mut values = HashMap::new();
    for (index, line) in text.split(LINE_SEPARATOR).enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(KEY_VALUE_SEPARATOR) else {
            return Err(SourceError::parse(format!(
                "no key value separator `{KEY_VALUE_SEPARATOR}` on line {}",
                index + 1
            )));
        };
        values.insert(key.to_string(), value.to_string());
    }
    Ok(values)
}

/// Keep the entries whose key starts with `prefix`, ignoring case.
pub fn filter_prefix(
    values: impl IntoIterator<Item = (String, String)>,
    prefix: &str,
) -> HashMap<String, String> {
    let prefix = prefix.to_lowercase();
    values
        .into_iter()
        .filter(|(key, _)| key.to_lowercase().starts_with(&prefix))
        .collect()
}

/// A fixed in-memory map.
#[derive(Debug, Clone, Default)]
pub struct StaticDictionary {
    values: HashMap<String, String>,
}

impl StaticDictionary {
    /// Wrap the given entries.
    pub fn new<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl ConfigSource for StaticDictionary {
    fn name(&self) -> &str {
        "Static Dictionary"
    }

    fn description(&self) -> &str {
        "Sources configuration from a static dictionary."
    }

    fn fetch(&self, prefix: &str) -> Result<HashMap<String, String>, SourceError> {
        Ok(filter_prefix(self.values.clone(), prefix))
    }
}

/// The process environment.
///
/// The prefix is matched case-sensitively. Variables whose name or value is
/// not valid UTF-8 are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentVariables;

impl ConfigSource for EnvironmentVariables {
    fn name(&self) -> &str {
        "Environment Variables"
    }

    fn description(&self) -> &str {
        "Sources configuration from the environment variables."
    }

    fn fetch(&self, prefix: &str) -> Result<HashMap<String, String>, SourceError> {
        Ok(std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .filter(|(k, _)| k.starts_with(prefix))
            .collect())
    }
}

enum FileObjectState {
    Unread(Box<dyn Read + Send>),
    Read(String),
}

/// Any reader holding a `KEY=VALUE` document.
///
/// The reader is drained on the first fetch and the text kept, so later
/// reloads see the same document.
pub struct FileObject {
    state: Mutex<FileObjectState>,
}

impl FileObject {
    /// Wrap `reader`.
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            state: Mutex::new(FileObjectState::Unread(Box::new(reader))),
        }
    }

    fn text(&self) -> Result<String, SourceError> {
        let mut state = self.state.lock();
        if let FileObjectState::Unread(reader) = &mut *state {
            let mut text = String::new();
            reader
                .read_to_string(&mut text)
                .map_err(|e| read_error("file object", &e))?;
            *state = FileObjectState::Read(text);
        }
        match &*state {
            FileObjectState::Read(text) => Ok(text.clone()),
            FileObjectState::Unread(_) => Err(SourceError::parse("file object could not be read")),
        }
    }
}

impl fmt::Debug for FileObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let read = matches!(&*self.state.lock(), FileObjectState::Read(_));
        f.debug_struct("FileObject").field("read", &read).finish()
    }
}

impl ConfigSource for FileObject {
    fn name(&self) -> &str {
        "File Object"
    }

    fn description(&self) -> &str {
        "Sources configuration from a given file object, read as a KEY=VALUE document."
    }

    fn fetch(&self, prefix: &str) -> Result<HashMap<String, String>, SourceError> {
        Ok(filter_prefix(parse_document(&self.text()?)?, prefix))
    }
}

/// A `KEY=VALUE` document on the local filesystem.
///
/// The file is read again on every fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    /// Read from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file backing this source.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for LocalFile {
    fn name(&self) -> &str {
        "Local File"
    }

    fn description(&self) -> &str {
        "Sources configuration from a given local file, read as a KEY=VALUE document."
    }

    fn fetch(&self, prefix: &str) -> Result<HashMap<String, String>, SourceError> {
        let text = fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                SourceError::NotFound {
                    path: self.path.clone(),
                }
            } else {
                read_error(&self.path.display().to_string(), &e)
            }
        })?;
        debug!(path = %self.path.display(), bytes = text.len(), "read local configuration file");
        Ok(filter_prefix(parse_document(&text)?, prefix))
    }
}

/// A `KEY=VALUE` document served over HTTP(S).
///
/// 4xx responses are permission errors. Everything else that is not a
/// success, including timeouts, is a connection error.
#[derive(Clone)]
pub struct RemoteHttpFile {
    url: String,
    timeout: Duration,
    authorization_header: Option<String>,
    user_agent: String,
}

impl RemoteHttpFile {
    /// Fetch from `url`, which must be `http://` or `https://`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidUrl`] for any other scheme.
    pub fn new(url: impl Into<String>) -> Result<Self, SourceError> {
        let url = url.into();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(SourceError::InvalidUrl {
                url,
                reason: "only http and https endpoints are supported".to_string(),
            });
        }
        Ok(Self {
            url,
            timeout: DEFAULT_HTTP_TIMEOUT,
            authorization_header: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
    }

    /// Request timeout. Default 10 seconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Value of the `Authorization` header, e.g. `Bearer <token>`.
    #[must_use]
    pub fn with_authorization_header(mut self, header: impl Into<String>) -> Self {
        self.authorization_header = Some(header.into());
        self
    }

    /// User agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// The document URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `reqwest::blocking` refuses to run on a tokio runtime thread, so inside
    /// one the request is moved to a scoped plain thread.
    fn download(&self) -> Result<String, SourceError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return self.download_blocking();
        }
        thread::scope(|scope| {
            scope.spawn(|| self.download_blocking()).join().unwrap_or_else(|_| {
                Err(SourceError::connection(format!(
                    "request to {} was aborted",
                    self.url
                )))
            })
        })
    }

    fn download_blocking(&self) -> Result<String, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(|e| SourceError::connection(format!("failed to build HTTP client: {e}")))?;

        let mut request = client.get(&self.url);
        if let Some(header) = &self.authorization_header {
            request = request.header(AUTHORIZATION, header);
        }

        let response = request
            .send()
            .map_err(|e| SourceError::connection(format!("could not connect to {}: {e}", self.url)))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(SourceError::permission(format!(
                "received status code {status} when connecting to {}",
                self.url
            )));
        }
        if !status.is_success() {
            return Err(SourceError::connection(format!(
                "received status code {status} when connecting to {}",
                self.url
            )));
        }

        response
            .text()
            .map_err(|e| SourceError::connection(format!("failed to read body from {}: {e}", self.url)))
    }
}

impl fmt::Debug for RemoteHttpFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteHttpFile")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .field(
                "authorization_header",
                &self.authorization_header.as_ref().map(|_| "<redacted>"),
            )
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl ConfigSource for RemoteHttpFile {
    fn name(&self) -> &str {
        "Remote HTTP File"
    }

    fn description(&self) -> &str {
        "Sources configuration from a remote HTTP server at a given URL, read as a KEY=VALUE document."
    }

    fn fetch(&self, prefix: &str) -> Result<HashMap<String, String>, SourceError> {
        debug!(url = %self.url, timeout_secs = self.timeout.as_secs(), "fetching remote configuration document");
        let text = self.download()?;
        Ok(filter_prefix(parse_document(&text)?, prefix))
    }
}

fn read_error(what: &str, error: &io::Error) -> SourceError {
    match error.kind() {
        io::ErrorKind::InvalidData => SourceError::parse(format!("{what} is not valid UTF-8")),
        _ => SourceError::permission(format!("cannot read {what}: {error}")),
    }
}
