//! Content addressing
//!
//! Every chunk is identified by the first [`ADDR_SIZE`] bytes of the SHA-512
//! digest of its exact contents. Addresses order lexicographically by bytes,
//! which is the order table indexes are sorted in.

use crate::{NbsError, Result};
use bytes::Bytes;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};
use std::fmt;
use std::str::FromStr;

/// Address width in bytes
pub const ADDR_SIZE: usize = 20;

/// Content hash identifying a chunk
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; ADDR_SIZE]);

impl Address {
    /// Wrap raw address bytes
    pub const fn new(bytes: [u8; ADDR_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build an address from a slice of exactly [`ADDR_SIZE`] bytes
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; ADDR_SIZE] = slice.try_into().map_err(|_| {
            NbsError::InvalidFormat(format!(
                "address must be {} bytes, got {}",
                ADDR_SIZE,
                slice.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Parse a 40 character hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let decoded = hex::decode(s)
            .map_err(|e| NbsError::InvalidFormat(format!("bad address {:?}: {}", s, e)))?;
        Self::from_slice(&decoded)
    }

    /// Raw address bytes
    pub fn as_bytes(&self) -> &[u8; ADDR_SIZE] {
        &self.0
    }

    /// Lowercase hex representation
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = NbsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(de::Error::custom)
    }
}

/// Compute the address of a chunk's bytes
pub fn compute_addr(data: &[u8]) -> Address {
    let digest = Sha512::digest(data);
    let mut bytes = [0u8; ADDR_SIZE];
    bytes.copy_from_slice(&digest[..ADDR_SIZE]);
    Address(bytes)
}

/// An immutable chunk together with its address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    addr: Address,
    data: Bytes,
}

impl Chunk {
    /// Create a chunk, computing its address
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            addr: compute_addr(&data),
            data,
        }
    }

    /// The chunk's address
    pub fn addr(&self) -> Address {
        self.addr
    }

    /// The chunk's bytes
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume the chunk, returning its bytes
    pub fn into_data(self) -> Bytes {
        self.data
    }
}
