//! Integration tests for loading configuration schemas from real sources.
//!
//! Every test that touches the process environment uses variable names no
//! other test uses, so tests can run in parallel.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use attune_config::{
    option, Config, ConfigError, ConfigSnapshot, ConfigValue, DecodeError, EnsureFileExists,
    EnvironmentVariables, FileObject, LocalFile, RemoteHttpFile, StaticDictionary, ValueType,
};
use httpmock::prelude::*;
use tempfile::TempDir;

/// Write a `KEY=VALUE` document into a fresh temp dir.
fn document(contents: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.env");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn test_int_with_trailing_space_is_rejected() {
    std::env::set_var("ATTUNE_IT_WS_TEST_INT", "5 ");

    let err = Config::builder("Whitespace")
        .prefix("ATTUNE_IT_WS_")
        .option("TEST_INT", option().datatype(ValueType::Int))
        .source(EnvironmentVariables)
        .build()
        .unwrap_err();

    match err {
        ConfigError::Decode { option, source } => {
            assert_eq!(option, "ATTUNE_IT_WS_TEST_INT");
            assert_eq!(source, DecodeError::Whitespace);
        }
        other => panic!("expected a decode error, got {other:?}"),
    }
}

#[test]
fn test_choice_default_applies_when_unset() {
    let config = Config::builder("Logging")
        .prefix("ATTUNE_IT_CHOICE_")
        .option(
            "LEVEL",
            option()
                .datatype(ValueType::choice(["DEBUG", "INFO"]))
                .default("INFO"),
        )
        .source(EnvironmentVariables)
        .build()
        .unwrap();

    assert_eq!(config.get::<String>("LEVEL").unwrap(), "INFO");
}

#[test]
fn test_list_tolerates_trailing_separator() {
    std::env::set_var("ATTUNE_IT_LIST_TEST_LIST", "a,b,");

    let config = Config::builder("Lists")
        .prefix("ATTUNE_IT_LIST_")
        .option("TEST_LIST", option().datatype(ValueType::list(ValueType::Str)))
        .source(EnvironmentVariables)
        .build()
        .unwrap();

    assert_eq!(
        config.value("TEST_LIST").unwrap(),
        ConfigValue::from(vec!["a", "b"])
    );
}

#[test]
fn test_missing_required_option_names_it() {
    let err = Config::builder("Required")
        .option("TEST_KEY", option().datatype(ValueType::Str))
        .source(StaticDictionary::new([("OTHER_KEY", "value")]))
        .build()
        .unwrap_err();

    match &err {
        ConfigError::MissingRequired { option } => assert_eq!(option, "TEST_KEY"),
        other => panic!("expected a missing-required error, got {other:?}"),
    }
    assert!(err.to_string().contains("TEST_KEY"));
}

#[test]
fn test_validator_failure_references_value() {
    let err = Config::builder("Paths")
        .option(
            "TEST_PATH",
            option().datatype(ValueType::Path).validator(EnsureFileExists),
        )
        .source(StaticDictionary::new([("TEST_PATH", "/nonexistent")]))
        .build()
        .unwrap_err();

    assert!(matches!(err, ConfigError::Validation { .. }));
    assert!(err.to_string().contains("TEST_PATH"));
    assert!(err.to_string().contains("/nonexistent"));
}

#[test]
fn test_environment_wins_over_local_file() {
    std::env::set_var("ATTUNE_IT_PREC_TEST_X", "from-env");
    let (_dir, path) = document("ATTUNE_IT_PREC_TEST_X=from-file\nATTUNE_IT_PREC_TEST_Y=file-only\n");

    let config = Config::builder("Precedence")
        .prefix("ATTUNE_IT_PREC_")
        .option("TEST_X", option().datatype(ValueType::Str))
        .option("TEST_Y", option().datatype(ValueType::Str))
        .source(EnvironmentVariables)
        .source(LocalFile::new(&path))
        .build()
        .unwrap();

    assert_eq!(config.get::<String>("TEST_X").unwrap(), "from-env");
    assert_eq!(config.get::<String>("TEST_Y").unwrap(), "file-only");
}

#[test]
fn test_first_listed_source_wins() {
    let config = Config::builder("Precedence")
        .option("X", option().datatype(ValueType::Int))
        .source(StaticDictionary::new([("X", "1")]))
        .source(StaticDictionary::new([("x", "2")]))
        .build()
        .unwrap();
    assert_eq!(config.get::<i64>("X").unwrap(), 1);
}

#[test]
fn test_hardcoded_value_survives_reload() {
    let (_dir, path) = document("APP_WORKERS=4\n");

    let config = Config::builder("App")
        .prefix("APP_")
        .option("WORKERS", option().datatype(ValueType::Int))
        .source(LocalFile::new(&path))
        .build()
        .unwrap();
    assert_eq!(config.get::<i64>("WORKERS").unwrap(), 4);

    config.hardcode_config_value("WORKERS", 1).unwrap();
    fs::write(&path, "APP_WORKERS=16\n").unwrap();
    config.reload_config().unwrap();
    assert_eq!(config.get::<i64>("WORKERS").unwrap(), 1);

    // Plain sets are ignored too, only another hardcode moves it.
    config.set_config_value("WORKERS", 2).unwrap();
    assert_eq!(config.get::<i64>("WORKERS").unwrap(), 1);
    config.hardcode_config_value("WORKERS", 3).unwrap();
    assert_eq!(config.get::<i64>("WORKERS").unwrap(), 3);
}

#[test]
fn test_reload_is_idempotent() {
    let (_dir, path) = document("APP_HOSTS=a, b\nAPP_RATIO=0.5\nAPP_DEBUG=on\n");

    let config = Config::builder("App")
        .prefix("APP_")
        .option("HOSTS", option().datatype(ValueType::list(ValueType::Str)))
        .option("RATIO", option().datatype(ValueType::Float))
        .option("DEBUG", option().datatype(ValueType::Bool))
        .source(LocalFile::new(&path))
        .build()
        .unwrap();

    let before = config.snapshot().unwrap();
    let first_loaded_at = config.last_loaded_at().unwrap();

    config.reload_config().unwrap();
    let after = config.snapshot().unwrap();

    assert_eq!(
        before.iter().collect::<Vec<_>>(),
        after.iter().collect::<Vec<_>>()
    );
    assert!(config.last_loaded_at().unwrap() >= first_loaded_at);
    assert_eq!(after.generation(), before.generation() + 1);
    assert!(!config.last_load_contained_changes());
}

#[test]
fn test_lazy_first_access_loads_once_across_threads() {
    let hooks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hooks);
    let config = Arc::new(
        Config::builder("Lazy")
            .option("A", option().datatype(ValueType::Int))
            .source(StaticDictionary::new([("A", "42")]))
            .lazy_load(true)
            .post_load_hook(move |_: &ConfigSnapshot| -> Result<(), String> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build()
            .unwrap(),
    );
    assert_eq!(hooks.load(Ordering::SeqCst), 0);

    let barrier = Arc::new(Barrier::new(8));
    let readers: Vec<_> = (0..8)
        .map(|_| {
            let config = Arc::clone(&config);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                config.get::<i64>("A").unwrap()
            })
        })
        .collect();

    for reader in readers {
        assert_eq!(reader.join().unwrap(), 42);
    }
    assert_eq!(hooks.load(Ordering::SeqCst), 1);
    assert_eq!(config.generation(), 1);
}

#[test]
fn test_optional_and_typed_values_from_file_object() {
    let document = "\
SVC_TOKEN=dGVzdA==
SVC_LIMITS={\"cpu\": 2}
SVC_REGIONS=EU,US
SVC_TIMEOUT=
";
    let config = Config::builder("Service")
        .prefix("SVC_")
        .option("TOKEN", option().datatype(ValueType::Base64EncodedString))
        .option("LIMITS", option().datatype(ValueType::UnvalidatedDict))
        .option(
            "REGIONS",
            option().datatype(ValueType::list(ValueType::choice(["EU", "US", "APAC"]))),
        )
        .option("TIMEOUT", option().datatype(ValueType::optional(ValueType::Float)))
        .option(
            "RETRIES",
            option().datatype(ValueType::Int).default_with(|| ConfigValue::Int(3)),
        )
        .source(FileObject::new(std::io::Cursor::new(document)))
        .build()
        .unwrap();

    let token: attune_config::Base64EncodedString = config.get("TOKEN").unwrap();
    assert_eq!(token.encoded(), "dGVzdA==");
    assert_eq!(token.decoded(), "test");

    let limits: attune_config::UnvalidatedDict = config.get("LIMITS").unwrap();
    assert_eq!(limits.get("cpu"), Some(&serde_json::json!(2)));

    assert_eq!(config.get::<Vec<String>>("REGIONS").unwrap(), ["EU", "US"]);
    assert_eq!(config.get::<Option<f64>>("TIMEOUT").unwrap(), None);
    assert_eq!(config.get::<u32>("RETRIES").unwrap(), 3);

    // The file object was drained once; reloading reuses its text.
    config.reload_config().unwrap();
    assert_eq!(config.get::<Vec<String>>("REGIONS").unwrap(), ["EU", "US"]);
}

#[test]
fn test_remote_http_file_source() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/app.env");
        then.status(200).body("REMOTE_REPLICAS=3\nREMOTE_UNKNOWN=ignored\n");
    });

    let config = Config::builder("Remote")
        .prefix("REMOTE_")
        .option("REPLICAS", option().datatype(ValueType::Int))
        .source(RemoteHttpFile::new(server.url("/app.env")).unwrap())
        .build()
        .unwrap();

    mock.assert();
    assert_eq!(config.get::<i64>("REPLICAS").unwrap(), 3);
}

#[test]
fn test_remote_http_forbidden_aborts_load() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/app.env");
        then.status(401);
    });

    let err = Config::builder("Remote")
        .prefix("REMOTE_")
        .option("REPLICAS", option().datatype(ValueType::Int).default(1))
        .source(RemoteHttpFile::new(server.url("/app.env")).unwrap())
        .build()
        .unwrap_err();

    match err {
        ConfigError::Source {
            source_name,
            source: attune_config::SourceError::Permission { .. },
        } => assert_eq!(source_name, "Remote HTTP File"),
        other => panic!("expected a permission error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_remote_source_fails_cleanly_inside_async_code() {
    let err = Config::builder("Remote")
        .prefix("REMOTE_")
        .option("REPLICAS", option().datatype(ValueType::Int))
        .source(
            RemoteHttpFile::new("http://127.0.0.1:1/app.env")
                .unwrap()
                .with_timeout(std::time::Duration::from_secs(2)),
        )
        .build()
        .unwrap_err();

    assert!(matches!(
        err,
        ConfigError::Source {
            source: attune_config::SourceError::Connection { .. },
            ..
        }
    ));
}

#[test]
fn test_set_config_value_reruns_validators() {
    let (_dir, path) = document("x");
    let config = Config::builder("Paths")
        .option(
            "FILE",
            option()
                .datatype(ValueType::optional(ValueType::Path))
                .validator(EnsureFileExists),
        )
        .source(StaticDictionary::new(Vec::<(String, String)>::new()))
        .build()
        .unwrap();
    assert_eq!(config.value("FILE").unwrap(), ConfigValue::Null);

    config.set_config_value("FILE", path.clone()).unwrap();
    assert_eq!(config.get::<PathBuf>("FILE").unwrap(), path);

    let err = config
        .set_config_value("FILE", PathBuf::from("/nonexistent/file"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Validation { .. }));
    assert_eq!(config.get::<PathBuf>("FILE").unwrap(), path);

    config.set_config_value("FILE", ConfigValue::Null).unwrap();
    assert_eq!(config.get::<Option<PathBuf>>("FILE").unwrap(), None);
}
