//! MessagePack codec helpers.
//!
//! Thin wrappers around `rmp-serde`. Every payload on the cluster subjects is
//! MessagePack; event bodies inside a [`RouteRequest`](crate::messages::RouteRequest)
//! are opaque bytes and are not touched here.

use serde::{Deserialize, Serialize};

use crate::error::NetError;

/// Encode a value to MessagePack bytes. Structs are written as maps so that
/// peers tolerate added optional fields.
///
/// # Errors
///
/// Returns [`NetError::Encode`] if serialisation fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, NetError> {
    rmp_serde::to_vec_named(value).map_err(NetError::Encode)
}

/// Decode a value from MessagePack bytes.
///
/// # Errors
///
/// Returns [`NetError::Decode`] if deserialisation fails.
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, NetError> {
    rmp_serde::from_slice(bytes).map_err(NetError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Before {
        name: String,
    }

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct After {
        name: String,
        #[serde(default)]
        weight: u32,
    }

    #[test]
    fn test_added_field_defaults() {
        let bytes = encode(&Before {
            name: "node-a".to_string(),
        })
        .unwrap();
        let restored: After = decode(&bytes).unwrap();
        assert_eq!(restored.name, "node-a");
        assert_eq!(restored.weight, 0);
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let result: Result<Before, _> = decode(&[0xFF, 0xFF]);
        assert!(matches!(result, Err(NetError::Decode(_))));
    }
}
