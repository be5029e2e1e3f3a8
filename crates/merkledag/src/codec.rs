//! dag-pb wire format.
//!
//! ```text
//! message PBLink {
//!   optional bytes  Hash  = 1;
//!   optional string Name  = 2;
//!   optional uint64 Tsize = 3;
//! }
//!
//! message PBNode {
//!   repeated PBLink Links = 2;
//!   optional bytes  Data  = 1;
//! }
//! ```
//!
//! Links are always written before data, and data is omitted when empty.
//! Blocks written by [`encode_node`] decode and re-encode to the same
//! bytes. The decoder also accepts links without a Name or Tsize, link
//! fields in any order and an explicit empty Data field. Such blocks
//! re-encode in canonical form and so hash to a different CID.

use bytes::{BufMut, Bytes};
use cid::Cid;

use crate::link::Link;

const WIRE_VARINT: u64 = 0;
const WIRE_LEN: u64 = 2;

const NODE_DATA: u64 = 1;
const NODE_LINKS: u64 = 2;

const LINK_HASH: u64 = 1;
const LINK_NAME: u64 = 2;
const LINK_TSIZE: u64 = 3;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to decode dag-pb node: {0}")]
    Decode(String),
    #[error("link {0} has a missing or invalid hash")]
    InvalidLinkHash(usize),
}

fn decode_err(msg: impl Into<String>) -> CodecError {
    CodecError::Decode(msg.into())
}

/// Encode a node, emitting `links` in exactly the order given
pub fn encode_node(links: &[Link], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len_hint(links, data));
    for link in links {
        let inner = encode_link(link);
        put_key(&mut out, NODE_LINKS, WIRE_LEN);
        put_varint(&mut out, inner.len() as u64);
        out.put_slice(&inner);
    }
    if !data.is_empty() {
        put_key(&mut out, NODE_DATA, WIRE_LEN);
        put_varint(&mut out, data.len() as u64);
        out.put_slice(data);
    }
    out
}

fn encode_link(link: &Link) -> Vec<u8> {
    let hash = link.cid.to_bytes();
    let mut out = Vec::with_capacity(hash.len() + link.name.len() + 16);
    put_key(&mut out, LINK_HASH, WIRE_LEN);
    put_varint(&mut out, hash.len() as u64);
    out.put_slice(&hash);
    put_key(&mut out, LINK_NAME, WIRE_LEN);
    put_varint(&mut out, link.name.len() as u64);
    out.put_slice(link.name.as_bytes());
    put_key(&mut out, LINK_TSIZE, WIRE_VARINT);
    put_varint(&mut out, link.size);
    out
}

fn encoded_len_hint(links: &[Link], data: &[u8]) -> usize {
    links.iter().map(|l| l.name.len() + 56).sum::<usize>() + data.len() + 8
}

/// Decode a dag-pb block into its links (in wire order) and data
pub fn decode_node(block: &Bytes) -> Result<(Vec<Link>, Bytes), CodecError> {
    let mut reader = Reader::new(block);
    let mut links = Vec::new();
    let mut data: Option<Bytes> = None;

    while !reader.is_empty() {
        let (field, wire) = reader.key()?;
        match (field, wire) {
            (NODE_LINKS, WIRE_LEN) => {
                if data.is_some() {
                    return Err(decode_err("links must precede data"));
                }
                let range = reader.len_delimited()?;
                let link = decode_link(&block[range], links.len())?;
                links.push(link);
            }
            (NODE_DATA, WIRE_LEN) => {
                if data.is_some() {
                    return Err(decode_err("duplicate data field"));
                }
                let range = reader.len_delimited()?;
                data = Some(block.slice(range));
            }
            (NODE_LINKS, _) | (NODE_DATA, _) => {
                return Err(decode_err(format!(
                    "unexpected wire type {} for node field {}",
                    wire, field
                )));
            }
            _ => return Err(decode_err(format!("unknown node field {}", field))),
        }
    }

    Ok((links, data.unwrap_or_default()))
}

fn decode_link(buf: &[u8], index: usize) -> Result<Link, CodecError> {
    let mut reader = Reader::new(buf);
    let mut hash: Option<&[u8]> = None;
    let mut name: Option<String> = None;
    let mut size: Option<u64> = None;

    while !reader.is_empty() {
        let (field, wire) = reader.key()?;
        match (field, wire) {
            (LINK_HASH, WIRE_LEN) if hash.is_none() => {
                let range = reader.len_delimited()?;
                hash = Some(&buf[range]);
            }
            (LINK_NAME, WIRE_LEN) if name.is_none() => {
                let range = reader.len_delimited()?;
                let value = std::str::from_utf8(&buf[range])
                    .map_err(|_| decode_err(format!("link {} name is not valid utf-8", index)))?;
                name = Some(value.to_string());
            }
            (LINK_TSIZE, WIRE_VARINT) if size.is_none() => {
                size = Some(reader.varint()?);
            }
            (LINK_HASH, WIRE_LEN) | (LINK_NAME, WIRE_LEN) | (LINK_TSIZE, WIRE_VARINT) => {
                return Err(decode_err(format!(
                    "duplicate field {} in link {}",
                    field, index
                )));
            }
            (LINK_HASH, _) | (LINK_NAME, _) | (LINK_TSIZE, _) => {
                return Err(decode_err(format!(
                    "unexpected wire type {} for link field {}",
                    wire, field
                )));
            }
            _ => {
                return Err(decode_err(format!(
                    "unknown field {} in link {}",
                    field, index
                )))
            }
        }
    }

    let hash = hash.ok_or(CodecError::InvalidLinkHash(index))?;
    let cid = Cid::try_from(hash).map_err(|_| CodecError::InvalidLinkHash(index))?;

    Ok(Link {
        name: name.unwrap_or_default(),
        size: size.unwrap_or(0),
        cid,
    })
}

fn put_key(out: &mut Vec<u8>, field: u64, wire: u64) {
    put_varint(out, (field << 3) | wire);
}

fn put_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    out.put_u8(value as u8);
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn varint(&mut self) -> Result<u64, CodecError> {
        let mut value: u64 = 0;
        for i in 0..10 {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or_else(|| decode_err("truncated varint"))?;
            self.pos += 1;
            // the tenth byte may only carry the top bit of a u64
            if i == 9 && byte > 1 {
                return Err(decode_err("varint overflows u64"));
            }
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(decode_err("varint overflows u64"))
    }

    fn key(&mut self) -> Result<(u64, u64), CodecError> {
        let key = self.varint()?;
        let field = key >> 3;
        if field == 0 {
            return Err(decode_err("invalid field number 0"));
        }
        Ok((field, key & 0x7))
    }

    fn len_delimited(&mut self) -> Result<std::ops::Range<usize>, CodecError> {
        let len = self.varint()?;
        let len = usize::try_from(len).map_err(|_| decode_err("length overflows usize"))?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| decode_err("truncated length-delimited field"))?;
        let range = self.pos..end;
        self.pos = end;
        Ok(range)
    }
}
