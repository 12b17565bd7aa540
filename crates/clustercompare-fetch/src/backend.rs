//! Unified reference-fetch backend trait (§4.J).

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::{FetchError, Result};
use crate::http::HttpFetcher;
use crate::local::LocalFetcher;
use crate::oci::OciFetcher;

/// Resolves a `-r/--reference` argument into a local directory
/// containing `metadata.yaml` plus every file it references.
#[async_trait]
pub trait ReferenceFetcher: Send + Sync {
    /// Short name of the backend, useful for logging and tests.
    fn backend_name(&self) -> &'static str;

    async fn fetch(&self, source: &str) -> Result<PathBuf>;
}

/// Pick the backend implied by `source`'s syntax (§4.J).
#[must_use]
pub fn resolve_fetcher(source: &str) -> Box<dyn ReferenceFetcher> {
    if let Some(rest) = source.strip_prefix("container://") {
        Box::new(OciFetcher::new(rest.to_string()))
    } else if source.starts_with("http://") || source.starts_with("https://") {
        Box::new(HttpFetcher::new(source.to_string()))
    } else {
        Box::new(LocalFetcher)
    }
}

/// Fetch `source` into a local directory root, dispatching on syntax.
pub async fn fetch_reference(source: &str) -> Result<PathBuf> {
    resolve_fetcher(source).fetch(source).await
}

pub(crate) fn extract_archive(data: &[u8], dest: &std::path::Path) -> Result<()> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let gz = GzDecoder::new(std::io::Cursor::new(data));
    let mut archive = Archive::new(gz);
    std::fs::create_dir_all(dest)?;
    archive.unpack(dest).map_err(|e| FetchError::Archive(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_by_syntax() {
        assert_eq!(resolve_fetcher("container://img:tag:/path").backend_name(), "oci");
        assert_eq!(resolve_fetcher("https://example.com/bundle").backend_name(), "http");
        assert_eq!(resolve_fetcher("/local/path").backend_name(), "local");
    }
}
