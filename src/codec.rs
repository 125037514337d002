// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 shmcomm contributors
//
// Message serialization. Two methods are recognised:
//
// * `"pickle-equivalent"` — compact native binary encoding (bincode),
//   the default.
// * `"msgpack"`           — MessagePack with named struct fields, for
//   exchanging data with non-Rust peers.
//
// Both ends of a channel must use the same method; nothing on the wire
// identifies it. The `*_bytes` endpoint methods bypass the codec entirely.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, ShmError};

/// Serialization method used by an endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Codec {
    /// Native binary serialization (bincode).
    #[default]
    Native,
    /// MessagePack (rmp-serde, named fields).
    Msgpack,
}

impl Codec {
    /// Resolve a method identifier string.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "pickle-equivalent" => Ok(Self::Native),
            "msgpack" => Ok(Self::Msgpack),
            other => Err(ShmError::Argument(format!(
                "unknown serialization method '{other}' \
                 (expected \"pickle-equivalent\" or \"msgpack\")"
            ))),
        }
    }

    /// The method identifier string.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Native => "pickle-equivalent",
            Self::Msgpack => "msgpack",
        }
    }

    /// Serialize `value` to bytes.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Self::Native => bincode::serialize(value)
                .map_err(|e| ShmError::Serialization(format!("bincode encode failed: {e}"))),
            Self::Msgpack => rmp_serde::to_vec_named(value)
                .map_err(|e| ShmError::Serialization(format!("msgpack encode failed: {e}"))),
        }
    }

    /// Deserialize bytes produced by [`encode`](Self::encode) with the same
    /// method.
    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            Self::Native => bincode::deserialize(data)
                .map_err(|e| ShmError::Serialization(format!("bincode decode failed: {e}"))),
            Self::Msgpack => rmp_serde::from_slice(data)
                .map_err(|e| ShmError::Serialization(format!("msgpack decode failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Pose {
        x: f64,
        y: f64,
        heading: f64,
    }

    #[test]
    fn native_roundtrip() {
        let pose = Pose { x: 1.0, y: 2.0, heading: 0.5 };
        let bytes = Codec::Native.encode(&pose).unwrap();
        let back: Pose = Codec::Native.decode(&bytes).unwrap();
        assert_eq!(back, pose);
    }

    #[test]
    fn msgpack_roundtrip() {
        let pose = Pose { x: -3.5, y: 0.0, heading: 2.25 };
        let bytes = Codec::Msgpack.encode(&pose).unwrap();
        let back: Pose = Codec::Msgpack.decode(&bytes).unwrap();
        assert_eq!(back, pose);
    }

    #[test]
    fn method_names_resolve() {
        assert_eq!(Codec::from_name("pickle-equivalent").unwrap(), Codec::Native);
        assert_eq!(Codec::from_name("msgpack").unwrap(), Codec::Msgpack);
        assert_eq!(Codec::Native.name(), "pickle-equivalent");
    }

    #[test]
    fn unknown_method_is_an_argument_error() {
        let err = Codec::from_name("json").unwrap_err();
        assert!(matches!(err, ShmError::Argument(_)));
    }

    #[test]
    fn decode_truncated_buffer_fails() {
        let pose = Pose { x: 1.0, y: 2.0, heading: 3.0 };
        let bytes = Codec::Native.encode(&pose).unwrap();
        let result: Result<Pose> = Codec::Native.decode(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(ShmError::Serialization(_))));
    }
}
