//! SHA-256 hashing and the fixed-length digest type shared by every module.
//!
//! Digests travel between processes as 64-character lowercase hex strings.
//! Interior tree nodes hash the *hex text* of their children concatenated
//! left-then-right, so an auditor working purely with the hex values found in
//! a proof document can replay every step without decoding anything.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::{AuditError, AuditResult};

/// Length of a digest in bytes (256 bits).
pub const DIGEST_LENGTH: usize = 32;

/// Marker hashed to produce the root of a tree with no leaves.
pub const EMPTY_TREE_MARKER: &[u8] = b"MERKLE_EMPTY";

/// A 256-bit SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Digest([u8; DIGEST_LENGTH]);

impl Digest {
    /// Wraps raw digest bytes.
    pub const fn new(bytes: [u8; DIGEST_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parses a 64-character hex string (an optional `0x` prefix is accepted).
    pub fn from_hex(input: &str) -> AuditResult<Self> {
        let trimmed = input.strip_prefix("0x").unwrap_or(input);
        let bytes = hex::decode(trimmed)
            .map_err(|err| AuditError::InvalidDigest(format!("{input}: {err}")))?;
        if bytes.len() != DIGEST_LENGTH {
            return Err(AuditError::InvalidDigest(format!(
                "expected {DIGEST_LENGTH} bytes, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; DIGEST_LENGTH];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    /// Lowercase hex rendering used on the wire.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LENGTH] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; DIGEST_LENGTH]> for Digest {
    fn from(bytes: [u8; DIGEST_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Digest::from_hex(&raw).map_err(de::Error::custom)
    }
}

/// Hashes an arbitrary byte sequence with SHA-256.  Every input, including the
/// empty slice, is valid.
pub fn hash(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut out = [0u8; DIGEST_LENGTH];
    out.copy_from_slice(&hasher.finalize());
    Digest(out)
}

/// Combines two child digests into their parent: `hash(hex(left) || hex(right))`.
pub fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(left.to_hex().as_bytes());
    hasher.update(right.to_hex().as_bytes());
    let mut out = [0u8; DIGEST_LENGTH];
    out.copy_from_slice(&hasher.finalize());
    Digest(out)
}

/// Root of a tree that holds no leaves.
pub fn empty_root() -> Digest {
    hash(EMPTY_TREE_MARKER)
}
