//! Payload deserializers.
//!
//! Kafka keys and values are raw bytes. A [`Deserializer`] turns them into the
//! table's key and value types.

use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::marker::PhantomData;
use thiserror::Error;

/// Errors from decoding a key or payload.
#[derive(Error, Debug)]
pub enum DeserializeError {
    /// Bytes are not valid UTF-8
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Bytes are not valid JSON for the target type
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decodes raw bytes into a typed value.
pub trait Deserializer: Send + 'static {
    /// The decoded type.
    type Output: Clone + Debug + Send + Sync + 'static;

    /// Decode `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`] if `bytes` is not a valid encoding.
    fn deserialize(&self, bytes: &[u8]) -> Result<Self::Output, DeserializeError>;
}

/// Passes bytes through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct BytesDeserializer;

impl Deserializer for BytesDeserializer {
    type Output = Vec<u8>;

    fn deserialize(&self, bytes: &[u8]) -> Result<Vec<u8>, DeserializeError> {
        Ok(bytes.to_vec())
    }
}

/// Decodes UTF-8 text.
#[derive(Clone, Copy, Debug, Default)]
pub struct Utf8Deserializer;

impl Deserializer for Utf8Deserializer {
    type Output = String;

    fn deserialize(&self, bytes: &[u8]) -> Result<String, DeserializeError> {
        Ok(std::str::from_utf8(bytes)?.to_string())
    }
}

/// Decodes JSON into `T`.
///
/// # Example
///
/// ```
/// use eventsource_redpanda::deserializer::{Deserializer, JsonDeserializer};
/// use serde::Deserialize;
///
/// #[derive(Clone, Debug, Deserialize, PartialEq)]
/// struct Alarm {
///     room: String,
///     armed: bool,
/// }
///
/// let alarm = JsonDeserializer::<Alarm>::new()
///     .deserialize(br#"{"room":"lobby","armed":true}"#)
///     .unwrap();
/// assert!(alarm.armed);
/// ```
pub struct JsonDeserializer<T> {
    _target: PhantomData<fn() -> T>,
}

impl<T> JsonDeserializer<T> {
    /// Create a deserializer for `T`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _target: PhantomData,
        }
    }
}

impl<T> Default for JsonDeserializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonDeserializer<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> Debug for JsonDeserializer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonDeserializer")
    }
}

impl<T> Deserializer for JsonDeserializer<T>
where
    T: DeserializeOwned + Clone + Debug + Send + Sync + 'static,
{
    type Output = T;

    fn deserialize(&self, bytes: &[u8]) -> Result<T, DeserializeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
