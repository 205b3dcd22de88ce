//! Transport-safe value encoding
//!
//! Values are serialized to JSON text so their type survives the trip
//! (strings stay strings, numbers stay numbers, structures stay
//! structures). With encoding enabled the JSON text is additionally
//! base64'd so control characters and binary-ish strings never reach the
//! backend's text analysis.

use crate::error::{CacheError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Encoder/decoder for the stored `value` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueCodec {
    base64: bool,
}

impl ValueCodec {
    /// Create a codec; `base64` selects the second encoding stage
    pub fn new(base64: bool) -> Self {
        Self { base64 }
    }

    /// Whether the base64 stage is applied
    pub fn is_base64(&self) -> bool {
        self.base64
    }

    /// Encode a value into its stored form
    pub fn encode<V>(&self, value: &V) -> Result<String>
    where
        V: Serialize + ?Sized,
    {
        let text = serde_json::to_string(value)?;
        if self.base64 {
            Ok(STANDARD.encode(text.as_bytes()))
        } else {
            Ok(text)
        }
    }

    /// Decode a stored value back into `V`
    pub fn decode<V>(&self, stored: &str) -> Result<V>
    where
        V: DeserializeOwned,
    {
        let text = if self.base64 {
            let bytes = STANDARD.decode(stored.trim())?;
            String::from_utf8(bytes)
                .map_err(|e| CacheError::Decode(format!("decoded value is not UTF-8: {e}")))?
        } else {
            stored.to_owned()
        };

        serde_json::from_str(&text).map_err(|e| CacheError::Decode(e.to_string()))
    }
}

impl Default for ValueCodec {
    fn default() -> Self {
        Self::new(true)
    }
}
