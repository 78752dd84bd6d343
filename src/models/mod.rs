pub mod channel;
pub mod payment;
pub mod response;

pub use channel::*;
pub use payment::*;
pub use response::*;

/// Serde helpers for integers the gateway encodes as decimal strings.
///
/// Numbers are accepted too; some gateway versions emit plain JSON integers for timeouts.
pub(crate) mod decimal {
    use ethers::types::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => U256::from_dec_str(text.trim())
                .map_err(|e| D::Error::custom(format!("invalid decimal {:?}: {}", text, e))),
            Raw::Number(n) => Ok(U256::from(n)),
        }
    }

    pub mod small {
        use super::Raw;
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&value.to_string())
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
            match Raw::deserialize(deserializer)? {
                Raw::Text(text) => text
                    .trim()
                    .parse()
                    .map_err(|e| D::Error::custom(format!("invalid integer {:?}: {}", text, e))),
                Raw::Number(n) => Ok(n),
            }
        }
    }

    /// Opaque identifiers: kept as text whether the gateway sends a string or a number.
    pub mod opaque {
        use super::Raw;
        use serde::{Deserialize, Deserializer};

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<String>, D::Error> {
            Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
                Raw::Text(text) => text,
                Raw::Number(n) => n.to_string(),
            }))
        }
    }
}
