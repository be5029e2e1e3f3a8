use bytes::Bytes;
use cid::Cid;

use crate::prefix::{CidPrefix, RAW};

use super::NodeError;

/// An opaque leaf. The block is the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNode {
    data: Bytes,
    cid: Cid,
}

impl RawNode {
    /// Wrap `data` with a CIDv1 / sha2-256 identifier
    pub fn new(data: impl Into<Bytes>) -> Result<Self, NodeError> {
        Self::with_prefix(data, &CidPrefix::v1())
    }

    /// Wrap `data`, hashing it as the given prefix describes.
    ///  The codec is always set to raw.
    pub fn with_prefix(data: impl Into<Bytes>, prefix: &CidPrefix) -> Result<Self, NodeError> {
        let data = data.into();
        let cid = prefix.with_codec(RAW).sum(&data)?;
        Ok(Self { data, cid })
    }

    /// Trusts that `cid` identifies `block`
    pub fn from_block(cid: Cid, block: Bytes) -> Self {
        Self { data: block, cid }
    }

    pub fn cid(&self) -> Cid {
        self.cid
    }

    pub fn raw_data(&self) -> &Bytes {
        &self.data
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
