use tandem_util::errors::TandemError;

#[test]
fn test_io_error_display() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let err = TandemError::from(io_err);
    assert!(err.to_string().contains("I/O error"), "got: {err}");
}

#[test]
fn test_config_error_display() {
    let err = TandemError::Config {
        message: "unknown key".to_string(),
    };
    assert_eq!(err.to_string(), "Configuration error: unknown key");
    let help = miette::Diagnostic::help(&err).map(|h| h.to_string());
    assert_eq!(help.as_deref(), Some("Check the [resolver] table of tandem.toml"));
}

#[test]
fn test_registry_error_display() {
    let err = TandemError::registry("timeout");
    assert_eq!(err.to_string(), "Registry error: timeout");
}

#[test]
fn test_lockfile_error_display() {
    let err = TandemError::Lockfile {
        message: "truncated".to_string(),
    };
    assert_eq!(err.to_string(), "Lockfile error: truncated");
}

#[test]
fn test_generic_error_display() {
    let err = TandemError::Generic {
        message: "something broke".to_string(),
    };
    assert_eq!(err.to_string(), "something broke");
}
