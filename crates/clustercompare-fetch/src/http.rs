//! HTTP(S) backend (§4.J): fetches `metadata.yaml` and every path it
//! references from a base URL, with bounded retry-with-backoff, and
//! stages them into a temporary directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::ReferenceFetcher;
use crate::discover::discover_referenced_paths;
use crate::error::{FetchError, Result};

const MAX_ATTEMPTS: u32 = 4;
const BASE_BACKOFF: Duration = Duration::from_millis(200);

pub struct HttpFetcher {
    base_url: String,
    client: reqwest::Client,
}

impl HttpFetcher {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self { base_url, client: reqwest::Client::new() }
    }

    async fn get_with_retry(&self, url: &str) -> Result<Vec<u8>> {
        let mut last_reason = String::new();
        for attempt in 0..MAX_ATTEMPTS {
            match self.client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp.bytes().await.map(|b| b.to_vec()).map_err(|e| FetchError::HttpExhausted {
                        url: url.to_string(),
                        attempts: attempt + 1,
                        reason: e.to_string(),
                    })
                }
                Ok(resp) => last_reason = format!("HTTP {}", resp.status()),
                Err(e) => last_reason = e.to_string(),
            }

            if attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(backoff_with_jitter(attempt)).await;
            }
        }

        Err(FetchError::HttpExhausted { url: url.to_string(), attempts: MAX_ATTEMPTS, reason: last_reason })
    }
}

/// Exponential backoff with jitter derived from the current instant,
/// rather than a `rand` dependency (one fewer crate to pull in for a
/// single retry helper).
fn backoff_with_jitter(attempt: u32) -> Duration {
    let exp = BASE_BACKOFF * 2u32.pow(attempt);
    let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.subsec_nanos()).unwrap_or(0);
    let jitter_range = ((exp.as_millis() as u64) / 2).max(1);
    let jitter_millis = u64::from(nanos) % jitter_range;
    exp + Duration::from_millis(jitter_millis)
}

#[async_trait]
impl ReferenceFetcher for HttpFetcher {
    fn backend_name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, source: &str) -> Result<PathBuf> {
        let base = source.trim_end_matches('/');
        let staging = tempfile::tempdir().map_err(FetchError::Io)?;
        let staging_path = staging.into_path();

        let metadata_url = format!("{base}/metadata.yaml");
        let metadata_bytes = self.get_with_retry(&metadata_url).await?;
        write_file(&staging_path, "metadata.yaml", &metadata_bytes)?;

        let metadata_yaml: serde_yaml::Value = serde_yaml::from_str(&String::from_utf8_lossy(&metadata_bytes))?;
        let referenced_paths = discover_referenced_paths(&metadata_yaml);

        for rel_path in referenced_paths {
            let url = format!("{base}/{rel_path}");
            let bytes = self.get_with_retry(&url).await?;
            write_file(&staging_path, &rel_path, &bytes)?;
        }

        Ok(staging_path)
    }
}

fn write_file(root: &Path, rel_path: &str, contents: &[u8]) -> Result<()> {
    let dest = root.join(rel_path);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(dest, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_metadata_and_referenced_templates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("apiVersion: v2\nparts:\n  - name: core\n    components:\n      - allOf:\n          - path: deploy.yaml\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/deploy.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("kind: Deployment\n"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(server.uri());
        let root = fetcher.fetch(&server.uri()).await.unwrap();
        assert!(root.join("metadata.yaml").exists());
        assert!(root.join("deploy.yaml").exists());
    }

    #[tokio::test]
    async fn exhausts_retries_on_persistent_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/metadata.yaml")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

        let fetcher = HttpFetcher::new(server.uri());
        let err = fetcher.fetch(&server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpExhausted { .. }));
    }

    #[test]
    fn backoff_grows_exponentially() {
        let first = backoff_with_jitter(0);
        let second = backoff_with_jitter(1);
        assert!(second >= first);
    }
}
