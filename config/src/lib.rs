//! Shared configuration types for the ILS extractor.
//!
//! All configuration that is read from files or the environment lives here so
//! that the `extractor` library and the `connector` binary agree on shapes and
//! defaults.

use std::fmt;

use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod shared;

/// A secret string that can round-trip through serde without leaking in debug output.
///
/// [`secrecy::Secret`] intentionally does not implement [`Serialize`], but config
/// files carry passwords, so we wrap it and serialize the exposed value.
#[derive(Clone)]
pub struct SerializableSecretString(Secret<String>);

impl SerializableSecretString {
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for SerializableSecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SerializableSecretString(REDACTED)")
    }
}

impl From<String> for SerializableSecretString {
    fn from(value: String) -> Self {
        Self(Secret::new(value))
    }
}

impl Serialize for SerializableSecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.expose_secret())
    }
}

impl<'de> Deserialize<'de> for SerializableSecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self(Secret::new(value)))
    }
}
