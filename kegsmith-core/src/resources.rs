// kegsmith-core/src/resources.rs
use std::path::Path;

use kegsmith_common::error::{KegError, Result};
use kegsmith_common::model::ResourceSpec;
use kegsmith_net::{ArtifactSource, Fetcher};
use tracing::{debug, error, info};

use crate::runtime::{RuntimeHandle, RuntimeProvider};

fn install_failure(resource: &ResourceSpec, cause: KegError) -> KegError {
    KegError::ResourceInstallFailure {
        resource: resource.name.clone(),
        cause: Box::new(cause),
    }
}

/// Fetches, verifies and installs `resources` into `runtime`, in order.
///
/// Stops at the first failure; resources after it are never fetched. Nothing
/// already installed is rolled back. Verified archives are written to
/// `staging_dir`, which the caller owns.
pub async fn install_resources<S, R>(
    fetcher: &Fetcher<S>,
    provider: &R,
    runtime: &RuntimeHandle,
    resources: &[ResourceSpec],
    staging_dir: &Path,
    mut on_installed: impl FnMut(&ResourceSpec),
) -> Result<()>
where
    S: ArtifactSource,
    R: RuntimeProvider,
{
    tokio::fs::create_dir_all(staging_dir)
        .await
        .map_err(|e| KegError::WriteFailure {
            path: staging_dir.to_path_buf(),
            reason: e.to_string(),
        })?;

    for (index, resource) in resources.iter().enumerate() {
        debug!(
            "Installing resource {}/{}: '{}'",
            index + 1,
            resources.len(),
            resource.name
        );
        let artifact = fetcher
            .fetch(&resource.name, &resource.url, &resource.file_name(), &resource.sha256)
            .await
            .map_err(|e| {
                error!("Resource '{}' could not be fetched: {}", resource.name, e);
                install_failure(resource, e)
            })?;

        let archive_path = staging_dir.join(&artifact.file_name);
        tokio::fs::write(&archive_path, &artifact.bytes)
            .await
            .map_err(|e| {
                install_failure(
                    resource,
                    KegError::WriteFailure {
                        path: archive_path.clone(),
                        reason: e.to_string(),
                    },
                )
            })?;

        provider
            .install_resource(runtime, resource, &archive_path)
            .await
            .map_err(|e| install_failure(resource, e))?;

        info!("Installed resource '{}'", resource.name);
        on_installed(resource);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use kegsmith_common::Cache;
    use kegsmith_net::{sha256_hex, MemorySource};

    use super::*;
    use crate::test_support::FakeRuntime;

    fn resource(name: &str, body: &[u8]) -> ResourceSpec {
        ResourceSpec::new(
            name,
            format!("https://files.example.org/{name}-1.0.tar.gz"),
            sha256_hex(body),
        )
    }

    #[tokio::test]
    async fn stops_at_first_failure_in_declaration_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = resource("a", b"A");
        let b = resource("b", b"B");
        let c = resource("c", b"C");
        let source = MemorySource::new()
            .with(&a.url, b"A".to_vec())
            .with(&b.url, b"tampered".to_vec())
            .with(&c.url, b"C".to_vec());
        let fetcher = Fetcher::new(source, Cache::at(dir.path().join("cache")).unwrap());
        let provider = FakeRuntime::default();
        let runtime = RuntimeHandle::for_libexec(dir.path().join("libexec"));

        let mut seen = Vec::new();
        let err = install_resources(
            &fetcher,
            &provider,
            &runtime,
            &[a.clone(), b, c.clone()],
            &dir.path().join("staging"),
            |r| seen.push(r.name.clone()),
        )
        .await
        .unwrap_err();

        match &err {
            KegError::ResourceInstallFailure { resource, cause } => {
                assert_eq!(resource, "b");
                assert!(matches!(**cause, KegError::ChecksumMismatch { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(seen, vec!["a"]);
        assert_eq!(provider.installed(), vec!["a"]);
        assert!(!fetcher.source().requests().contains(&c.url));
    }

    #[tokio::test]
    async fn installer_errors_are_attributed_to_the_resource() {
        let dir = tempfile::tempdir().unwrap();
        let a = resource("a", b"A");
        let fetcher = Fetcher::new(
            MemorySource::new().with(&a.url, b"A".to_vec()),
            Cache::at(dir.path().join("cache")).unwrap(),
        );
        let provider = FakeRuntime::default().failing_install("a");
        let runtime = RuntimeHandle::for_libexec(dir.path().join("libexec"));

        let err = install_resources(
            &fetcher,
            &provider,
            &runtime,
            &[a],
            &dir.path().join("staging"),
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.root_cause(),
            KegError::CommandFailed { .. }
        ));
    }
}
