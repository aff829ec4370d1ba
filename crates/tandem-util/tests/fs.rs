use std::path::{Path, PathBuf};

use tandem_util::fs::{local_base, normalize, resolve_relative, to_slash};

#[test]
fn normalize_drops_current_dir() {
    assert_eq!(normalize(Path::new("./missing")), PathBuf::from("missing"));
}

#[test]
fn normalize_folds_parent_dir() {
    assert_eq!(
        normalize(Path::new("dep/../conflict-other")),
        PathBuf::from("conflict-other")
    );
}

#[test]
fn normalize_keeps_leading_parent_dir() {
    assert_eq!(normalize(Path::new("../../a/./b")), PathBuf::from("../../a/b"));
}

#[test]
fn normalize_does_not_escape_root() {
    assert_eq!(normalize(Path::new("/../etc")), PathBuf::from("/etc"));
}

#[test]
fn resolve_relative_joins_base() {
    assert_eq!(
        resolve_relative(Path::new("dep"), Path::new("../conflict-other")),
        PathBuf::from("conflict-other")
    );
}

#[test]
fn resolve_relative_keeps_absolute() {
    assert_eq!(
        resolve_relative(Path::new("dep"), Path::new("/opt/./pkg")),
        PathBuf::from("/opt/pkg")
    );
}

#[test]
fn local_base_of_manifest_file_is_parent() {
    assert_eq!(local_base(Path::new("dep/dep.opam")), PathBuf::from("dep"));
    assert_eq!(local_base(Path::new("dep/package.json")), PathBuf::from("dep"));
}

#[test]
fn local_base_of_directory_is_itself() {
    assert_eq!(local_base(Path::new("dep")), PathBuf::from("dep"));
}

#[test]
fn local_base_of_top_level_manifest_is_empty() {
    assert_eq!(local_base(Path::new("root.opam")), PathBuf::new());
}

#[test]
fn to_slash_renders_relative_and_empty_paths() {
    assert_eq!(to_slash(Path::new("dep/dep.opam")), "dep/dep.opam");
    assert_eq!(to_slash(Path::new("")), ".");
    assert_eq!(to_slash(Path::new("/opt/pkg")), "/opt/pkg");
}

#[test]
fn local_base_resolves_against_real_directories() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("dep");
    std::fs::create_dir(&dir).unwrap();
    let base = local_base(&dir.join("dep.opam"));
    assert_eq!(base, dir);
    assert!(base.is_dir());
}
