/// RFID tag identifiers
///
/// A tag is known to the core only by its 12 hex character identifier. The
/// value is opaque: it is compared, hashed, and printed, nothing else.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// Number of hex characters in a tag identifier
pub const TAG_ID_LEN: usize = 12;

/// Validated, upper-cased tag identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagId(String);

impl TagId {
    pub fn new(raw: &str) -> Result<Self, CoreError> {
        let raw = raw.trim();
        if raw.len() != TAG_ID_LEN || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CoreError::Config(format!(
                "tag identifier must be {} hex characters, got {:?}",
                TAG_ID_LEN, raw
            )));
        }
        Ok(Self(raw.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TagId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for TagId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TagId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TagId::new(&raw).map_err(serde::de::Error::custom)
    }
}
