// kegsmith-net/src/fetch.rs
use kegsmith_common::cache::Cache;
use kegsmith_common::error::Result;
use kegsmith_common::pipeline::PipelineEvent;
use tokio::sync::broadcast;
use tracing::{debug, instrument, warn};

use crate::http::ArtifactSource;
use crate::validation::{validate_url, verify_checksum};

/// Bytes whose SHA-256 has been checked against the formula's declared digest.
#[derive(Debug, Clone)]
pub struct VerifiedArtifact {
    pub subject: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub from_cache: bool,
}

/// Downloads artifacts through an [`ArtifactSource`] and verifies them before
/// anything else sees the bytes. Only verified bytes are written to the cache.
#[derive(Debug)]
pub struct Fetcher<S> {
    source: S,
    cache: Cache,
    event_tx: Option<broadcast::Sender<PipelineEvent>>,
}

impl<S: ArtifactSource> Fetcher<S> {
    pub fn new(source: S, cache: Cache) -> Self {
        Self {
            source,
            cache,
            event_tx: None,
        }
    }

    pub fn with_events(mut self, event_tx: broadcast::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    fn send_event(&self, event: PipelineEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Fetches `url` for `subject` (a formula or resource name) and checks it
    /// against `expected_sha256`.
    ///
    /// A cached copy is reused only if it still matches; a stale or corrupted
    /// entry is deleted and the artifact fetched again.
    #[instrument(skip(self, expected_sha256), fields(subject = %subject))]
    pub async fn fetch(
        &self,
        subject: &str,
        url: &str,
        file_name: &str,
        expected_sha256: &str,
    ) -> Result<VerifiedArtifact> {
        let parsed = validate_url(url)?;
        let cache_path = self.cache.entry_path(subject, file_name);

        match self.cache.load(&cache_path) {
            Ok(Some(bytes)) => match verify_checksum(subject, url, &bytes, expected_sha256) {
                Ok(()) => {
                    debug!("Using cached artifact: {}", cache_path.display());
                    self.send_event(PipelineEvent::DownloadFinished {
                        subject: subject.to_string(),
                        size_bytes: bytes.len() as u64,
                        from_cache: true,
                    });
                    return Ok(VerifiedArtifact {
                        subject: subject.to_string(),
                        file_name: file_name.to_string(),
                        bytes,
                        from_cache: true,
                    });
                }
                Err(e) => {
                    debug!(
                        "Cached artifact checksum mismatch ({}): {}. Redownloading.",
                        cache_path.display(),
                        e
                    );
                    if let Err(remove_err) = self.cache.remove(&cache_path) {
                        warn!(
                            "Failed to remove corrupted cache file {}: {}",
                            cache_path.display(),
                            remove_err
                        );
                    }
                }
            },
            Ok(None) => debug!("Artifact for '{}' not found in cache.", subject),
            Err(e) => warn!("Ignoring unreadable cache entry: {}", e),
        }

        self.send_event(PipelineEvent::DownloadStarted {
            subject: subject.to_string(),
            url: url.to_string(),
        });
        let bytes = self.source.fetch_bytes(&parsed).await?;
        verify_checksum(subject, url, &bytes, expected_sha256)?;

        if let Err(e) = self.cache.store(&cache_path, &bytes) {
            // Cache is transient; a verified download is still usable.
            warn!("Could not cache artifact for '{}': {}", subject, e);
        }
        self.send_event(PipelineEvent::DownloadFinished {
            subject: subject.to_string(),
            size_bytes: bytes.len() as u64,
            from_cache: false,
        });

        Ok(VerifiedArtifact {
            subject: subject.to_string(),
            file_name: file_name.to_string(),
            bytes,
            from_cache: false,
        })
    }
}
