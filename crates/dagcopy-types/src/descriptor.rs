//! Content identity: digests, descriptors and well-known media types

use crate::{Error, Result};
use sha2::{Digest as _, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Well-known media types of structured (non-leaf) content
pub mod media_type {
    /// OCI image manifest
    pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
    /// OCI image index
    pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
    /// OCI artifact manifest
    pub const OCI_ARTIFACT_MANIFEST: &str = "application/vnd.oci.artifact.manifest.v1+json";
    /// OCI image config
    pub const OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
    /// OCI gzip-compressed layer
    pub const OCI_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
    /// Docker image manifest, schema 2
    pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
    /// Docker manifest list
    pub const DOCKER_MANIFEST_LIST: &str =
        "application/vnd.docker.distribution.manifest.list.v2+json";
}

/// Content digest in `algorithm:encoded` form, e.g. `sha256:e3b0c442...`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Digest(String);

impl Digest {
    /// Parse and validate a digest string
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidDigest {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let (algorithm, encoded) = value
            .split_once(':')
            .ok_or_else(|| invalid("missing ':' separator"))?;
        if algorithm.is_empty() || encoded.is_empty() {
            return Err(invalid("empty algorithm or encoded part"));
        }
        if !algorithm
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c))
        {
            return Err(invalid("algorithm contains invalid characters"));
        }
        if !encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "=_-".contains(c))
        {
            return Err(invalid("encoded part contains invalid characters"));
        }
        if algorithm == "sha256"
            && (encoded.len() != 64 || !encoded.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')))
        {
            return Err(invalid("sha256 digests must be 64 lowercase hex characters"));
        }

        Ok(Self(value.to_string()))
    }

    /// Compute the sha256 digest of `data`
    pub fn sha256(data: &[u8]) -> Self {
        Self(format!("sha256:{:x}", Sha256::digest(data)))
    }

    /// Hash algorithm name
    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map_or("", |(algorithm, _)| algorithm)
    }

    /// Encoded hash value
    pub fn encoded(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, encoded)| encoded)
    }

    /// Full digest string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

/// Immutable identity of a content blob.
///
/// Two descriptors with the same digest are the same node: equality and
/// hashing only look at [`Descriptor::digest`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Descriptor {
    /// Media type of the referenced content
    #[cfg_attr(feature = "serde", serde(rename = "mediaType"))]
    pub media_type: String,
    /// Content digest
    pub digest: Digest,
    /// Content size in bytes
    pub size: u64,
    /// Optional annotations
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl Descriptor {
    /// Create a descriptor from its parts
    pub fn new(media_type: impl Into<String>, digest: Digest, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest,
            size,
            annotations: None,
        }
    }

    /// Describe `data` with the given media type, computing its sha256 digest
    pub fn from_bytes(media_type: impl Into<String>, data: &[u8]) -> Self {
        Self::new(media_type, Digest::sha256(data), data.len() as u64)
    }

    /// Attach an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl Eq for Descriptor {}

impl Hash for Descriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {} bytes)", self.digest, self.media_type, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const EMPTY_SHA256: &str =
        "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_sha256_of_empty_input() {
        assert_eq!(Digest::sha256(b"").as_str(), EMPTY_SHA256);
    }

    #[test]
    fn test_digest_parts() {
        let digest = Digest::parse(EMPTY_SHA256).unwrap();
        assert_eq!(digest.algorithm(), "sha256");
        assert_eq!(digest.encoded().len(), 64);
    }

    #[rstest]
    #[case("")]
    #[case("sha256")]
    #[case(":abc")]
    #[case("sha256:")]
    #[case("sha256:xyz")]
    #[case("SHA256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")]
    #[case("sha256:E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855")]
    fn test_invalid_digests(#[case] input: &str) {
        assert!(matches!(
            Digest::parse(input),
            Err(Error::InvalidDigest { .. })
        ));
    }

    #[test]
    fn test_other_algorithms_are_accepted() {
        assert!(Digest::parse("sha512:abcdef0123").is_ok());
        assert!(Digest::parse("multihash+base58:QmRZxt2b1FVZPNqd8hsiykDL3TdBDeTSPX9Kv46HmX4Gx8").is_ok());
    }

    #[test]
    fn test_descriptor_identity_is_digest() {
        let a = Descriptor::from_bytes(media_type::OCI_LAYER_GZIP, b"layer");
        let mut b = a.clone().with_annotation("org.opencontainers.image.title", "layer.tar");
        b.media_type = "application/octet-stream".to_string();
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_descriptor_json_field_names() {
        let desc = Descriptor::from_bytes(media_type::OCI_CONFIG, b"{}");
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json["mediaType"], media_type::OCI_CONFIG);
        assert_eq!(json["size"], 2);
        assert!(json.get("annotations").is_none());

        let bad = serde_json::json!({"mediaType": "x", "digest": "nope", "size": 1});
        assert!(serde_json::from_value::<Descriptor>(bad).is_err());
    }

    proptest! {
        #[test]
        fn test_computed_digests_always_parse(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let digest = Digest::sha256(&data);
            prop_assert_eq!(Digest::parse(digest.as_str()).unwrap(), digest);
        }
    }
}
