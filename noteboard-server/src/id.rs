//! Note identifiers: short auto-generated ids by default (4 chars),
//! escalating on collision, plus acceptance of arbitrary custom ids a client
//! chooses via `PUT`.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Maximum length of any note id, custom or generated.
pub const MAX_LEN: usize = 10;
/// Default length for freshly generated ids.
pub const DEFAULT_LEN: usize = 4;

/// Characters that are never confused for one another at a glance: no
/// `0`/`O`, `1`/`l`/`I`, etc.
const ALPHABET: &[u8] = b"23456789abcdefghjkmnpqrstuvwxyz";

/// A short, URL-safe identifier for a note.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteId(String);

impl NoteId {
    fn valid_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_')
    }

    /// Generate a random id of the given length from the unambiguous alphabet.
    pub fn generate(len: usize) -> Self {
        let mut rng = rand::rng();
        let s: String = (0..len)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        Self(s)
    }
}

impl FromStr for NoteId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > MAX_LEN {
            anyhow::bail!("note id must be 1-{MAX_LEN} characters");
        }
        if !s.chars().all(Self::valid_char) {
            anyhow::bail!("note id contains invalid characters");
        }
        Ok(Self(s.to_string()))
    }
}

impl AsRef<str> for NoteId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for NoteId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NoteId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
