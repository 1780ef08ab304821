//! Encoding of cached values to and from stored blobs.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Error;

/// A value that can be stored in the cache.
///
/// `encode` failures abort the write; `decode` failures on a stored blob are
/// treated by the engine as a miss.
pub trait CacheValue: Sized {
    fn encode(&self) -> Result<Vec<u8>, Error>;
    fn decode(bytes: Vec<u8>) -> Result<Self, Error>;
}

/// Raw bytes, stored verbatim.
impl CacheValue for Vec<u8> {
    fn encode(&self) -> Result<Vec<u8>, Error> {
        Ok(self.clone())
    }

    fn decode(bytes: Vec<u8>) -> Result<Self, Error> {
        Ok(bytes)
    }
}

impl CacheValue for String {
    fn encode(&self) -> Result<Vec<u8>, Error> {
        Ok(self.as_bytes().to_vec())
    }

    fn decode(bytes: Vec<u8>) -> Result<Self, Error> {
        String::from_utf8(bytes).map_err(|e| Error::Decode(e.to_string()))
    }
}

/// Any serde type, stored as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Serialize + DeserializeOwned> CacheValue for Json<T> {
    fn encode(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(&self.0).map_err(|e| Error::Encode(e.to_string()))
    }

    fn decode(bytes: Vec<u8>) -> Result<Self, Error> {
        serde_json::from_slice(&bytes).map(Json).map_err(|e| Error::Decode(e.to_string()))
    }
}
