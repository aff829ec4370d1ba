use std::path::{Component, Path, PathBuf};

/// Manifest file extensions that may be named directly by a local source.
const MANIFEST_EXTENSIONS: &[&str] = &["opam", "json"];

/// Lexically normalise a path: drop `.` components and fold `..` into the
/// preceding component where there is one.
///
/// Never touches the filesystem, so symlinks are not resolved. Leading `..`
/// components of a relative path are kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

/// Resolve `location` relative to `base` and normalise the result.
///
/// Absolute locations are only normalised.
pub fn resolve_relative(base: &Path, location: &Path) -> PathBuf {
    if location.is_absolute() {
        normalize(location)
    } else {
        normalize(&base.join(location))
    }
}

/// Directory against which the dependencies of a local source are resolved.
///
/// A location naming a manifest file directly (`dep/dep.opam`) uses its parent
/// directory; any other location is itself the base directory.
pub fn local_base(location: &Path) -> PathBuf {
    let names_manifest = location
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MANIFEST_EXTENSIONS.contains(&ext));
    if names_manifest {
        location.parent().map(Path::to_path_buf).unwrap_or_default()
    } else {
        location.to_path_buf()
    }
}

/// Render a path with `/` separators regardless of platform, as used in
/// diagnostics and lockfiles.
pub fn to_slash(path: &Path) -> String {
    let mut out = String::new();
    for component in path.components() {
        match component {
            Component::RootDir => out.push('/'),
            Component::Prefix(prefix) => out.push_str(&prefix.as_os_str().to_string_lossy()),
            other => {
                if !out.is_empty() && !out.ends_with('/') {
                    out.push('/');
                }
                out.push_str(&other.as_os_str().to_string_lossy());
            }
        }
    }
    if out.is_empty() {
        out.push('.');
    }
    out
}
