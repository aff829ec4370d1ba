use tandem_core::manifest::Manifest;
use tandem_core::package::{PackageId, Scope};
use tandem_core::spec::VersionSpec;
use tandem_core::version::SourceKind;

#[test]
fn dependencies_keep_declaration_order() {
    let manifest = Manifest::new("root")
        .depend("zeta", "1.0.0")
        .depend("alpha", "^2.0.0")
        .depend("mid", "link:./mid");
    let deps = manifest.parse_dependencies().unwrap();
    let names: Vec<_> = deps.iter().map(|d| d.id.to_string()).collect();
    assert_eq!(names, ["zeta", "alpha", "mid"]);
}

#[test]
fn opam_manifest_scopes_bare_names() {
    let manifest = Manifest::opam("dep").depend("conflict", "< \"2.0.0\"");
    let deps = manifest.parse_dependencies().unwrap();
    assert_eq!(deps[0].id, PackageId::opam("conflict"));
    assert_eq!(deps[0].spec.to_string(), "<opam:2.0.0");
}

#[test]
fn prefixed_names_are_opam_in_any_manifest() {
    let manifest = Manifest::new("root").depend("@opam/conflict", "2.0.0");
    let deps = manifest.parse_dependencies().unwrap();
    assert_eq!(deps[0].id.scope(), Scope::Opam);
    assert_eq!(deps[0].spec.kind(), SourceKind::Opam);
    assert_eq!(deps[0].spec.to_string(), "=opam:2.0.0");
}

#[test]
fn invalid_dependency_names_the_declaring_package() {
    let manifest = Manifest::new("root").depend("broken", "not-a-version");
    let err = manifest.parse_dependencies().unwrap_err();
    assert_eq!(err.package, "root");
    assert_eq!(err.name, "broken");
    assert!(err.to_string().contains("declared by root"), "got: {err}");
}

#[test]
fn label_includes_version_when_known() {
    assert_eq!(Manifest::new("app").label(), "app");
    assert_eq!(
        Manifest::new("app").with_version("1.0.0").label(),
        "app@1.0.0"
    );
}

#[test]
fn manifest_deserializes_from_toml() {
    let manifest: Manifest = toml::from_str(
        r#"
name = "dep"
scope = "opam"

[dependencies]
conflict = "< 2.0.0"
"#,
    )
    .unwrap();
    assert_eq!(manifest.scope, Scope::Opam);
    let deps = manifest.parse_dependencies().unwrap();
    assert!(matches!(deps[0].spec, VersionSpec::Range(_)));
}

#[test]
fn invalid_dependency_is_a_diagnostic() {
    use miette::Diagnostic;

    let manifest = Manifest::new("lib").depend("other", "latest");
    let err = manifest.parse_dependencies().unwrap_err();
    let code = err.code().map(|c| c.to_string());
    assert_eq!(code.as_deref(), Some("tandem::manifest::invalid_dependency"));
    let cause = err.diagnostic_source().and_then(|d| d.code()).map(|c| c.to_string());
    assert!(cause.is_some_and(|c| c.starts_with("tandem::spec::")));
}
