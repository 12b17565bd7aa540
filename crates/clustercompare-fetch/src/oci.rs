//! OCI image backend (§4.J): `container://image:tag:/path/to/metadata.yaml`
//! is pulled via an OCI registry client, its layers are extracted, and
//! `path/to/` becomes the bundle root.

use async_trait::async_trait;
use oci_distribution::client::{Client, ClientConfig, ClientProtocol};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::Reference;
use std::path::PathBuf;

use crate::backend::{extract_archive, ReferenceFetcher};
use crate::error::{FetchError, Result};

pub struct OciFetcher {
    /// The `image:tag:/path/to/metadata.yaml` portion, after
    /// `container://` has been stripped.
    locator: String,
}

impl OciFetcher {
    #[must_use]
    pub fn new(locator: String) -> Self {
        Self { locator }
    }
}

struct ParsedLocator {
    image_and_tag: String,
    path: String,
}

fn parse_locator(locator: &str) -> Result<ParsedLocator> {
    let split_at = locator.find(":/").ok_or_else(|| FetchError::MalformedSource {
        source: locator.to_string(),
        reason: "expected 'image:tag:/path/to/metadata.yaml'".to_string(),
    })?;
    let image_and_tag = locator[..split_at].to_string();
    let path = locator[split_at + 1..].to_string();
    if image_and_tag.is_empty() || path.is_empty() {
        return Err(FetchError::MalformedSource {
            source: locator.to_string(),
            reason: "image, tag, and path must all be non-empty".to_string(),
        });
    }
    Ok(ParsedLocator { image_and_tag, path })
}

#[async_trait]
impl ReferenceFetcher for OciFetcher {
    fn backend_name(&self) -> &'static str {
        "oci"
    }

    async fn fetch(&self, _source: &str) -> Result<PathBuf> {
        let parsed = parse_locator(&self.locator)?;

        let reference = Reference::try_from(parsed.image_and_tag.as_str())
            .map_err(|e| FetchError::MalformedSource { source: self.locator.clone(), reason: e.to_string() })?;

        let client = Client::new(ClientConfig { protocol: ClientProtocol::Https, ..Default::default() });
        let auth = RegistryAuth::Anonymous;

        let image_data = client
            .pull(&reference, &auth, vec![
                "application/vnd.cncf.helm.chart.content.v1.tar+gzip",
                "application/vnd.oci.image.layer.v1.tar+gzip",
            ])
            .await
            .map_err(|e| FetchError::OciPullFailed { reference: parsed.image_and_tag.clone(), message: e.to_string() })?;

        let layer = image_data
            .layers
            .first()
            .ok_or_else(|| FetchError::OciPullFailed { reference: parsed.image_and_tag.clone(), message: "no layers found".to_string() })?;

        let extracted = tempfile::tempdir().map_err(FetchError::Io)?.into_path();
        extract_archive(&layer.data, &extracted)?;

        let relative_metadata_path = parsed.path.trim_start_matches('/');
        let metadata_path = extracted.join(relative_metadata_path);
        let root = metadata_path.parent().ok_or_else(|| FetchError::OciPathMissing { path: parsed.path.clone() })?;
        if !metadata_path.exists() {
            return Err(FetchError::OciPathMissing { path: parsed.path.clone() });
        }

        Ok(root.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_image_tag_and_path() {
        let parsed = parse_locator("ghcr.io/org/bundle:1.0.0:/bundles/app/metadata.yaml").unwrap();
        assert_eq!(parsed.image_and_tag, "ghcr.io/org/bundle:1.0.0");
        assert_eq!(parsed.path, "/bundles/app/metadata.yaml");
    }

    #[test]
    fn rejects_locator_without_path() {
        let err = parse_locator("ghcr.io/org/bundle:1.0.0").unwrap_err();
        assert!(matches!(err, FetchError::MalformedSource { .. }));
    }
}
