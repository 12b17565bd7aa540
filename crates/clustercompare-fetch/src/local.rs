//! Local filesystem backend (§4.J): the reference argument is an
//! existing path, used as-is.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::backend::ReferenceFetcher;
use crate::error::{FetchError, Result};

pub struct LocalFetcher;

#[async_trait]
impl ReferenceFetcher for LocalFetcher {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn fetch(&self, source: &str) -> Result<PathBuf> {
        let path = PathBuf::from(source);
        if !path.exists() {
            return Err(FetchError::LocalPathMissing { path: source.to_string() });
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn existing_path_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = LocalFetcher;
        let resolved = fetcher.fetch(dir.path().to_str().unwrap()).await.unwrap();
        assert_eq!(resolved, dir.path());
    }

    #[tokio::test]
    async fn missing_path_is_an_error() {
        let fetcher = LocalFetcher;
        let err = fetcher.fetch("/definitely/does/not/exist").await.unwrap_err();
        assert!(matches!(err, FetchError::LocalPathMissing { .. }));
    }
}
