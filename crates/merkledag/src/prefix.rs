use std::fmt;
use std::str::FromStr;

use cid::{Cid, Version};
use multihash::Multihash;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use crate::node::NodeError;

/// Multicodec code for dag-pb encoded nodes
pub const DAG_PB: u64 = 0x70;
/// Multicodec code for raw, un-interpreted blocks
pub const RAW: u64 = 0x55;

/// Largest digest a [`Multihash`] in this crate can hold
pub const MAX_DIGEST_SIZE: usize = 64;

/// Hash functions a node may be identified with.
///  Codes follow the multicodec table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HashFunction {
    Identity,
    Sha2_256,
    Sha2_512,
    Blake3,
}

impl HashFunction {
    pub fn code(&self) -> u64 {
        match self {
            HashFunction::Identity => 0x00,
            HashFunction::Sha2_256 => 0x12,
            HashFunction::Sha2_512 => 0x13,
            HashFunction::Blake3 => 0x1e,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashFunction::Identity => "identity",
            HashFunction::Sha2_256 => "sha2-256",
            HashFunction::Sha2_512 => "sha2-512",
            HashFunction::Blake3 => "blake3",
        }
    }

    /// Digest length produced when no explicit length is requested.
    ///  `None` for identity, which is as long as its input.
    pub fn default_length(&self) -> Option<usize> {
        match self {
            HashFunction::Identity => None,
            HashFunction::Sha2_256 => Some(32),
            HashFunction::Sha2_512 => Some(64),
            HashFunction::Blake3 => Some(32),
        }
    }

    /// Hash `data`, producing `length` bytes of digest (or the natural length)
    pub fn digest(&self, data: &[u8], length: Option<usize>) -> Result<Vec<u8>, NodeError> {
        let full = match self {
            HashFunction::Identity => {
                if let Some(length) = length {
                    if length != data.len() {
                        return Err(NodeError::Hash(format!(
                            "identity hash length {} does not match input length {}",
                            length,
                            data.len()
                        )));
                    }
                }
                return Ok(data.to_vec());
            }
            HashFunction::Sha2_256 => Sha256::digest(data).to_vec(),
            HashFunction::Sha2_512 => Sha512::digest(data).to_vec(),
            HashFunction::Blake3 => {
                // blake3 is an XOF, so longer digests are produced rather than truncated
                let length = length.unwrap_or(32);
                if length > MAX_DIGEST_SIZE {
                    return Err(NodeError::Hash(format!(
                        "blake3 digest length {} exceeds {}",
                        length, MAX_DIGEST_SIZE
                    )));
                }
                let mut out = vec![0u8; length];
                let mut hasher = blake3::Hasher::new();
                hasher.update(data);
                hasher.finalize_xof().fill(&mut out);
                return Ok(out);
            }
        };

        match length {
            None => Ok(full),
            Some(length) if length <= full.len() => Ok(full[..length].to_vec()),
            Some(length) => Err(NodeError::Hash(format!(
                "requested {} digest of {} bytes, but it only produces {}",
                self,
                length,
                full.len()
            ))),
        }
    }
}

impl TryFrom<u64> for HashFunction {
    type Error = NodeError;

    fn try_from(code: u64) -> Result<Self, Self::Error> {
        match code {
            0x00 => Ok(HashFunction::Identity),
            0x12 => Ok(HashFunction::Sha2_256),
            0x13 => Ok(HashFunction::Sha2_512),
            0x1e => Ok(HashFunction::Blake3),
            other => Err(NodeError::UnsupportedHashFunction(other)),
        }
    }
}

impl FromStr for HashFunction {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identity" => Ok(HashFunction::Identity),
            "sha2-256" => Ok(HashFunction::Sha2_256),
            "sha2-512" => Ok(HashFunction::Sha2_512),
            "blake3" => Ok(HashFunction::Blake3),
            other => Err(NodeError::UnknownHashFunction(other.to_string())),
        }
    }
}

impl TryFrom<String> for HashFunction {
    type Error = NodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HashFunction> for String {
    fn from(value: HashFunction) -> Self {
        value.name().to_string()
    }
}

impl fmt::Display for HashFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything needed to derive a content identifier from encoded bytes:
///  CID version, content codec, multihash code and (optionally) a
///  truncated digest length.
///
/// The hash is kept as a raw multihash code so prefixes of stored
///  blocks survive even when this crate cannot compute their hash.
///  Only [`CidPrefix::sum`] needs a supported [`HashFunction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CidPrefix {
    version: Version,
    codec: u64,
    hash_code: u64,
    length: Option<usize>,
}

impl Default for CidPrefix {
    fn default() -> Self {
        Self::v0()
    }
}

impl CidPrefix {
    /// CIDv0: implicit dag-pb codec and sha2-256
    pub const fn v0() -> Self {
        Self {
            version: Version::V0,
            codec: DAG_PB,
            hash_code: 0x12,
            length: None,
        }
    }

    /// CIDv1 with dag-pb and sha2-256
    pub const fn v1() -> Self {
        Self {
            version: Version::V1,
            codec: DAG_PB,
            hash_code: 0x12,
            length: None,
        }
    }

    /// Build a dag-pb prefix from a `(version, hash function, length)` triple
    pub fn new(version: u64, hash_code: u64, length: Option<usize>) -> Result<Self, NodeError> {
        let version =
            Version::try_from(version).map_err(|_| NodeError::UnsupportedCidVersion(version))?;
        let hash = HashFunction::try_from(hash_code)?;
        let prefix = Self {
            version,
            codec: DAG_PB,
            hash_code: hash.code(),
            length,
        };
        prefix.validate()?;
        Ok(prefix)
    }

    /// The prefix a content identifier was built with.
    ///  Any multihash code is accepted here.
    pub fn from_cid(cid: &Cid) -> Self {
        let hash_code = cid.hash().code();
        let size = cid.hash().size() as usize;
        // full-length digests map back onto the presets
        let default_length = HashFunction::try_from(hash_code)
            .ok()
            .and_then(|hash| hash.default_length());
        let length = match default_length {
            Some(default) if default == size => None,
            _ => Some(size),
        };
        Self {
            version: cid.version(),
            codec: cid.codec(),
            hash_code,
            length,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn codec(&self) -> u64 {
        self.codec
    }

    /// Multihash code of the hash function
    pub fn hash_code(&self) -> u64 {
        self.hash_code
    }

    /// The hash function, failing for codes this crate cannot compute
    pub fn hash_function(&self) -> Result<HashFunction, NodeError> {
        HashFunction::try_from(self.hash_code)
    }

    pub fn length(&self) -> Option<usize> {
        self.length
    }

    pub fn with_codec(mut self, codec: u64) -> Self {
        self.codec = codec;
        self
    }

    fn validate(&self) -> Result<(), NodeError> {
        if self.version == Version::V0 {
            if self.hash_code != HashFunction::Sha2_256.code() {
                return Err(NodeError::InvalidPrefix(format!(
                    "CIDv0 requires sha2-256, got hash 0x{:x}",
                    self.hash_code
                )));
            }
            if self.length.is_some_and(|length| length != 32) {
                return Err(NodeError::InvalidPrefix(
                    "CIDv0 requires a full 32 byte digest".to_string(),
                ));
            }
            if self.codec != DAG_PB {
                return Err(NodeError::InvalidPrefix(
                    "CIDv0 only supports the dag-pb codec".to_string(),
                ));
            }
        }
        if self.length.is_some_and(|length| length > MAX_DIGEST_SIZE) {
            return Err(NodeError::InvalidPrefix(format!(
                "digest length may not exceed {} bytes",
                MAX_DIGEST_SIZE
            )));
        }
        Ok(())
    }

    /// Hash `data` and wrap the digest as a content identifier
    pub fn sum(&self, data: &[u8]) -> Result<Cid, NodeError> {
        self.validate()?;
        let hash = self.hash_function()?;
        let digest = hash.digest(data, self.length)?;
        let multihash = Multihash::<MAX_DIGEST_SIZE>::wrap(hash.code(), &digest)
            .map_err(|e| NodeError::Hash(e.to_string()))?;
        match self.version {
            Version::V0 => Cid::new_v0(multihash).map_err(|e| NodeError::Hash(e.to_string())),
            Version::V1 => Ok(Cid::new_v1(self.codec, multihash)),
        }
    }
}

/// Protobuf prefix for a given CID version
pub fn prefix_for_cid_version(version: u64) -> Result<CidPrefix, NodeError> {
    match version {
        0 => Ok(CidPrefix::v0()),
        1 => Ok(CidPrefix::v1()),
        other => Err(NodeError::UnsupportedCidVersion(other)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_v0_sum_of_empty_block() {
        let cid = CidPrefix::v0().sum(&[]).unwrap();
        assert_eq!(
            cid.to_string(),
            "QmdfTbBqBPQ7VNxZEYEj14VmRuZBkqFbiwReogJgS1zR1n"
        );
        assert_eq!(cid.version(), Version::V0);
        assert_eq!(cid.codec(), DAG_PB);
        assert_eq!(CidPrefix::from_cid(&cid), CidPrefix::v0());
    }

    #[test]
    fn test_v1_raw_sum() {
        let cid = CidPrefix::v1().with_codec(RAW).sum(b"foo").unwrap();
        assert_eq!(
            cid.to_string(),
            "bafkreibme22gw2h7y2h7tg2fhqotaqjucnbc24deqo72b6mkl2egezxhvy"
        );
    }

    #[test]
    fn test_prefix_for_cid_version() {
        assert_eq!(prefix_for_cid_version(0).unwrap(), CidPrefix::v0());
        assert_eq!(prefix_for_cid_version(1).unwrap(), CidPrefix::v1());
        assert!(matches!(
            prefix_for_cid_version(2),
            Err(NodeError::UnsupportedCidVersion(2))
        ));
    }

    #[test]
    fn test_custom_prefix_validation() {
        assert!(matches!(
            CidPrefix::new(1, 0x99, None),
            Err(NodeError::UnsupportedHashFunction(0x99))
        ));
        assert!(matches!(
            CidPrefix::new(0, 0x13, None),
            Err(NodeError::InvalidPrefix(_))
        ));
        assert!(matches!(
            CidPrefix::new(0, 0x12, Some(20)),
            Err(NodeError::InvalidPrefix(_))
        ));

        let prefix = CidPrefix::new(1, 0x13, Some(20)).unwrap();
        let cid = prefix.sum(b"beep").unwrap();
        assert_eq!(cid.hash().code(), 0x13);
        assert_eq!(cid.hash().size(), 20);
        assert_eq!(CidPrefix::from_cid(&cid), prefix);
    }

    #[test]
    fn test_blake3_lengths() {
        let short = CidPrefix::new(1, 0x1e, Some(16)).unwrap().sum(b"x").unwrap();
        let long = CidPrefix::new(1, 0x1e, Some(64)).unwrap().sum(b"x").unwrap();
        assert_eq!(short.hash().size(), 16);
        assert_eq!(long.hash().size(), 64);
        // the XOF stream is a prefix-extension of itself
        assert_eq!(short.hash().digest(), &long.hash().digest()[..16]);
    }

    #[test]
    fn test_hash_function_names_round_trip() {
        for hash in [
            HashFunction::Identity,
            HashFunction::Sha2_256,
            HashFunction::Sha2_512,
            HashFunction::Blake3,
        ] {
            assert_eq!(hash.name().parse::<HashFunction>().unwrap(), hash);
            assert_eq!(HashFunction::try_from(hash.code()).unwrap(), hash);
        }
        assert!("md5".parse::<HashFunction>().is_err());
    }

    #[test]
    fn test_prefix_of_unsupported_hash() {
        // sha3-256 digest of nothing in particular
        let multihash = Multihash::<MAX_DIGEST_SIZE>::wrap(0x16, &[7u8; 32]).unwrap();
        let cid = Cid::new_v1(DAG_PB, multihash);

        let prefix = CidPrefix::from_cid(&cid);
        assert_eq!(prefix.hash_code(), 0x16);
        assert_eq!(prefix.length(), Some(32));
        assert_eq!(prefix.codec(), DAG_PB);
        assert!(matches!(
            prefix.hash_function(),
            Err(NodeError::UnsupportedHashFunction(0x16))
        ));
        assert!(matches!(
            prefix.sum(b"data"),
            Err(NodeError::UnsupportedHashFunction(0x16))
        ));
    }
}
