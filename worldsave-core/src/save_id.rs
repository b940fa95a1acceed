//! Per-character save identifiers.
//!
//! A save is known by its human name. Paths and database keys use an encoded
//! token instead: a `#` sentinel followed by URL-safe, unpadded base64 of the
//! UTF-8 name. The token alphabet never contains `/`, `\` or `.`, which the
//! on-disk layout relies on.

use std::fmt;
use std::hash::{Hash, Hasher};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, WorldError};

/// Marks a string as already encoded.
pub const ENCODED_SENTINEL: char = '#';

/// Encode a name into a path- and key-safe token.
///
/// Strings that already carry the sentinel are returned unchanged, so
/// applying the transform twice is harmless.
#[must_use]
pub fn encode_name(name: &str) -> String {
    if name.starts_with(ENCODED_SENTINEL) {
        return name.to_string();
    }
    encode_always(name)
}

fn encode_always(name: &str) -> String {
    let mut out = String::with_capacity(1 + name.len() * 4 / 3 + 4);
    out.push(ENCODED_SENTINEL);
    URL_SAFE_NO_PAD.encode_string(name.as_bytes(), &mut out);
    out
}

/// Decode a token produced by [`encode_name`].
///
/// Strings without the sentinel are plain names and come back unchanged.
///
/// # Errors
/// Returns [`WorldError::InvalidSaveId`] if the payload is not valid base64
/// or not valid UTF-8.
pub fn decode_name(token: &str) -> Result<String> {
    let Some(payload) = token.strip_prefix(ENCODED_SENTINEL) else {
        return Ok(token.to_string());
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| WorldError::InvalidSaveId {
            token: token.to_string(),
            reason: e.to_string(),
        })?;
    String::from_utf8(bytes).map_err(|e| WorldError::InvalidSaveId {
        token: token.to_string(),
        reason: e.to_string(),
    })
}

/// One character's save slot within a world.
///
/// Equality and hashing use the decoded name only.
#[derive(Debug, Clone, Eq)]
pub struct SaveId {
    name: String,
    encoded: String,
}

impl SaveId {
    /// Build from a human-readable name.
    ///
    /// The name is always encoded, even when it starts with the sentinel.
    #[must_use]
    pub fn from_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let encoded = encode_always(&name);
        Self { name, encoded }
    }

    /// Build from an encoded token, such as a file name prefix.
    ///
    /// # Errors
    /// Returns [`WorldError::InvalidSaveId`] if the token does not decode.
    pub fn from_encoded(token: &str) -> Result<Self> {
        let name = decode_name(token)?;
        Ok(Self {
            encoded: encode_always(&name),
            name,
        })
    }

    /// The human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The path-safe token.
    #[must_use]
    pub fn encoded(&self) -> &str {
        &self.encoded
    }
}

impl PartialEq for SaveId {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Hash for SaveId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for SaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Serialize for SaveId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

impl<'de> Deserialize<'de> for SaveId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(name))
    }
}
