//! The collaborator the resolver discovers packages through.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tandem_core::manifest::Manifest;
use tandem_core::package::PackageId;
use tandem_core::version::{Source, Version};
use tandem_util::errors::TandemError;

/// Lists versions, hands out manifests and checks local sources.
///
/// Implementations are shared between fetch tasks, so they must be cheap to
/// call concurrently.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Every published version of `id`, as raw strings in any order. An
    /// unknown package lists nothing.
    async fn versions(&self, id: &PackageId) -> Result<Vec<String>, TandemError>;

    /// The manifest of one candidate, or `None` when there is none.
    ///
    /// Local sources are passed with their project-relative location.
    async fn manifest(&self, id: &PackageId, source: &Source)
        -> Result<Option<Manifest>, TandemError>;

    /// Whether a local source exists on disk.
    ///
    /// Only a definite "not found" is `Ok(false)`; any other I/O failure is
    /// an error rather than a missing source.
    async fn exists(&self, path: &Path) -> Result<bool, TandemError> {
        Ok(tokio::fs::try_exists(path).await?)
    }
}

/// An in-memory registry, used for embedding and tests.
///
/// Existence of local sources is checked against the real filesystem.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    versions: HashMap<PackageId, Vec<String>>,
    manifests: HashMap<(PackageId, Source), Manifest>,
    delays: HashMap<PackageId, Duration>,
    version_calls: AtomicUsize,
    manifest_calls: AtomicUsize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a versioned manifest under the scope it declares.
    ///
    /// A version that does not parse under that scope is still listed, but has
    /// no manifest.
    pub fn publish(mut self, manifest: Manifest) -> Self {
        let id = PackageId::new(manifest.name.clone(), manifest.scope);
        let raw = manifest.version.clone().unwrap_or_default();
        self.versions.entry(id.clone()).or_default().push(raw.clone());
        if let Ok(version) = Version::parse(&raw, id.scope()) {
            self.manifests
                .insert((id, Source::Version(version)), manifest);
        }
        self
    }

    /// List a version without publishing its manifest.
    pub fn list(mut self, id: PackageId, version: impl Into<String>) -> Self {
        self.versions.entry(id).or_default().push(version.into());
        self
    }

    /// Provide the manifest found at a local `link:`/`path:` location.
    pub fn local(mut self, id: PackageId, source: Source, manifest: Manifest) -> Self {
        self.manifests.insert((id, source), manifest);
        self
    }

    /// Hold every request about `id` for `delay` before answering.
    pub fn delay(mut self, id: PackageId, delay: Duration) -> Self {
        self.delays.insert(id, delay);
        self
    }

    /// Number of `versions` calls served so far.
    pub fn version_calls(&self) -> usize {
        self.version_calls.load(Ordering::SeqCst)
    }

    /// Number of `manifest` calls served so far.
    pub fn manifest_calls(&self) -> usize {
        self.manifest_calls.load(Ordering::SeqCst)
    }

    async fn wait(&self, id: &PackageId) {
        if let Some(delay) = self.delays.get(id) {
            tokio::time::sleep(*delay).await;
        }
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn versions(&self, id: &PackageId) -> Result<Vec<String>, TandemError> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        self.wait(id).await;
        Ok(self.versions.get(id).cloned().unwrap_or_default())
    }

    async fn manifest(
        &self,
        id: &PackageId,
        source: &Source,
    ) -> Result<Option<Manifest>, TandemError> {
        self.manifest_calls.fetch_add(1, Ordering::SeqCst);
        self.wait(id).await;
        Ok(self.manifests.get(&(id.clone(), source.clone())).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::package::Scope;

    #[tokio::test]
    async fn publish_lists_and_serves_manifests() {
        let registry = MemoryRegistry::new()
            .publish(Manifest::new("conflict").with_version("1.0.0"))
            .publish(Manifest::new("conflict").with_version("2.0.0"));
        let id = PackageId::registry("conflict");
        assert_eq!(registry.versions(&id).await.unwrap(), ["1.0.0", "2.0.0"]);

        let source = Source::Version(Version::parse("2.0.0", Scope::Registry).unwrap());
        let manifest = registry.manifest(&id, &source).await.unwrap().unwrap();
        assert_eq!(manifest.label(), "conflict@2.0.0");
        assert_eq!(registry.version_calls(), 1);
        assert_eq!(registry.manifest_calls(), 1);
    }

    #[tokio::test]
    async fn opam_manifests_land_in_opam_scope() {
        let registry = MemoryRegistry::new().publish(Manifest::opam("conflict").with_version("1.0.0"));
        assert!(registry
            .versions(&PackageId::registry("conflict"))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            registry.versions(&PackageId::opam("conflict")).await.unwrap(),
            ["1.0.0"]
        );
    }

    #[tokio::test]
    async fn listed_only_versions_have_no_manifest() {
        let id = PackageId::registry("ghost");
        let registry = MemoryRegistry::new().list(id.clone(), "1.0.0");
        let source = Source::Version(Version::parse("1.0.0", Scope::Registry).unwrap());
        assert_eq!(registry.versions(&id).await.unwrap(), ["1.0.0"]);
        assert!(registry.manifest(&id, &source).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exists_checks_the_filesystem() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = MemoryRegistry::new();
        assert!(registry.exists(tmp.path()).await.unwrap());
        assert!(!registry.exists(&tmp.path().join("missing")).await.unwrap());
    }

    #[tokio::test]
    async fn exists_reports_io_failures() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("plain"), "").unwrap();
        let registry = MemoryRegistry::new();
        let err = registry
            .exists(&tmp.path().join("plain/child"))
            .await
            .unwrap_err();
        assert!(matches!(err, TandemError::Io(_)), "got: {err}");
    }
}
