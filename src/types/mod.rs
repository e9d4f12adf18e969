//! Public types for the Hifadhi API.

mod request;
mod response;

pub use request::{Destination, Request, RequestKey};
pub use response::{Body, BodyStream, Response, ResponseSource, Snapshot};

/// Serde helpers storing byte bodies as base64 strings in JSON.
pub(crate) mod base64_body {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }

    /// Same encoding for optional bodies.
    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            body: &Option<Bytes>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match body {
                Some(body) => serializer.serialize_some(&STANDARD.encode(body)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Bytes>, D::Error> {
            let encoded = Option::<String>::deserialize(deserializer)?;
            encoded
                .map(|s| STANDARD.decode(s).map(Bytes::from))
                .transpose()
                .map_err(serde::de::Error::custom)
        }
    }
}
