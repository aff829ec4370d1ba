use std::path::{Path, PathBuf};

use tandem_core::config::{ResolverConfig, TandemConfig};

#[test]
fn defaults() {
    let config = ResolverConfig::default();
    assert_eq!(config.fetch_concurrency, 8);
    assert_eq!(config.project_root, PathBuf::from("."));
}

#[test]
fn parses_kebab_case_keys() {
    let config = TandemConfig::from_toml_str(
        r#"
[resolver]
fetch-concurrency = 2
project-root = "/work/app"
"#,
    )
    .unwrap();
    assert_eq!(config.resolver.fetch_concurrency, 2);
    assert_eq!(
        config.resolver.on_disk(Path::new("dep")),
        PathBuf::from("/work/app/dep")
    );
}

#[test]
fn missing_section_uses_defaults() {
    let config = TandemConfig::from_toml_str("").unwrap();
    assert_eq!(config.resolver.fetch_concurrency, 8);
}

#[test]
fn zero_concurrency_still_gets_a_permit() {
    let config = ResolverConfig {
        fetch_concurrency: 0,
        ..ResolverConfig::default()
    };
    assert_eq!(config.fetch_permits(), 1);
}

#[test]
fn invalid_toml_is_a_config_error() {
    let err = TandemConfig::from_toml_str("[resolver\n").unwrap_err();
    assert!(err.to_string().starts_with("Configuration error"), "got: {err}");
}

#[test]
fn load_or_default_reads_existing_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("tandem.toml");
    std::fs::write(&path, "[resolver]\nfetch-concurrency = 3\n").unwrap();
    assert_eq!(TandemConfig::load_or_default(&path).resolver.fetch_concurrency, 3);
    assert_eq!(
        TandemConfig::load_or_default(&tmp.path().join("absent.toml"))
            .resolver
            .fetch_concurrency,
        8
    );
}
