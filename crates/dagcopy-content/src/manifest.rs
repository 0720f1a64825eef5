//! OCI manifest model and down-edge discovery

use crate::fetch_all;
use async_trait::async_trait;
use dagcopy_types::{media_type, Descriptor, EdgeFinder, Error, ReadOnlyStorage, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

/// OCI image manifest (also covers Docker schema 2 manifests)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    /// Always 2
    pub schema_version: u32,
    /// Media type of the manifest itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Image config blob
    pub config: Descriptor,
    /// Layer blobs, base layer first
    #[serde(default)]
    pub layers: Vec<Descriptor>,
    /// Manifest this one refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,
    /// Optional annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl ImageManifest {
    /// Build an OCI image manifest
    pub fn new(config: Descriptor, layers: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(media_type::OCI_MANIFEST.to_string()),
            config,
            layers,
            subject: None,
            annotations: None,
        }
    }
}

/// OCI image index (also covers Docker manifest lists)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    /// Always 2
    pub schema_version: u32,
    /// Media type of the index itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Referenced manifests
    #[serde(default)]
    pub manifests: Vec<Descriptor>,
    /// Optional annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl ImageIndex {
    /// Build an OCI image index
    pub fn new(manifests: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(media_type::OCI_INDEX.to_string()),
            manifests,
            annotations: None,
        }
    }
}

/// OCI artifact manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactManifest {
    /// Media type of the manifest itself
    pub media_type: String,
    /// Type of the artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    /// Artifact blobs
    #[serde(default)]
    pub blobs: Vec<Descriptor>,
    /// Manifest this artifact refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,
    /// Optional annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// Serialize a manifest and describe it with `media_type`
pub fn pack<T: Serialize>(media_type: &str, manifest: &T) -> Result<(Descriptor, Vec<u8>)> {
    let data = serde_json::to_vec(manifest).map_err(|e| Error::other(e.to_string()))?;
    Ok((Descriptor::from_bytes(media_type, &data), data))
}

fn parse<T: DeserializeOwned>(desc: &Descriptor, data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| Error::manifest(desc.digest.as_str(), e.to_string()))
}

/// Down-edge discovery for OCI and Docker manifests and indexes.
///
/// Only the manifest/index media types are fetched and parsed; every other
/// media type is a leaf and is never read.
#[derive(Debug, Clone, Copy, Default)]
pub struct OciEdgeFinder;

#[async_trait]
impl EdgeFinder for OciEdgeFinder {
    async fn down_edges(
        &self,
        storage: &dyn ReadOnlyStorage,
        desc: &Descriptor,
    ) -> Result<Vec<Descriptor>> {
        let nodes = match desc.media_type.as_str() {
            media_type::OCI_MANIFEST | media_type::DOCKER_MANIFEST => {
                let data = fetch_all(storage, desc).await?;
                let manifest: ImageManifest = parse(desc, &data)?;
                let mut nodes = Vec::with_capacity(manifest.layers.len() + 2);
                nodes.extend(manifest.subject);
                nodes.push(manifest.config);
                nodes.extend(manifest.layers);
                nodes
            }
            media_type::OCI_INDEX | media_type::DOCKER_MANIFEST_LIST => {
                let data = fetch_all(storage, desc).await?;
                let index: ImageIndex = parse(desc, &data)?;
                index.manifests
            }
            media_type::OCI_ARTIFACT_MANIFEST => {
                let data = fetch_all(storage, desc).await?;
                let manifest: ArtifactManifest = parse(desc, &data)?;
                let mut nodes = Vec::with_capacity(manifest.blobs.len() + 1);
                nodes.extend(manifest.subject);
                nodes.extend(manifest.blobs);
                nodes
            }
            _ => Vec::new(),
        };
        trace!(digest = %desc.digest, children = nodes.len(), "found down edges");
        Ok(nodes)
    }
}
