//! Helpful serialization tools.
//!
//! The wire format is protobuf (other parts of the network read the same
//! bytes we write), so binary (de)serialization goes through `prost`. Human
//! readable output goes through yaml and is for display only: nothing in this
//! crate reads yaml back in.

use crate::error::Result;
use base64::Engine;
use serde::Serialize;

/// Serialize a wire message. Maps in our messages are ordered, so this is
/// deterministic.
pub(crate) fn serialize<T: prost::Message>(msg: &T) -> Vec<u8> {
    msg.encode_to_vec()
}

/// Deserialize a wire message.
pub(crate) fn deserialize<T: prost::Message + Default>(bytes: &[u8]) -> Result<T> {
    Ok(T::decode(bytes)?)
}

/// Render an object as yaml.
pub(crate) fn serialize_human<T: Serialize>(obj: &T) -> Result<String> {
    Ok(serde_yaml::to_string(obj)?)
}

/// Convert bytes to (standard, padded) base64. This is the alphabet used
/// inside PEM frames and in the upstream JSON rendering of configs, so we
/// stick to it everywhere.
pub fn base64_encode<T: AsRef<[u8]>>(bytes: T) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes.as_ref())
}

/// Convert base64 back into bytes.
pub fn base64_decode<T: AsRef<[u8]>>(bytes: T) -> Result<Vec<u8>> {
    Ok(base64::engine::general_purpose::STANDARD.decode(bytes.as_ref())?)
}

/// Like [base64_encode] but URL-safe and without padding, used for digests
/// that end up in strings.
pub fn base64_encode_url<T: AsRef<[u8]>>(bytes: T) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes.as_ref())
}

pub fn base64_decode_url<T: AsRef<[u8]>>(bytes: T) -> Result<Vec<u8>> {
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(bytes.as_ref())?)
}

/// A default implementation for (de)serializing a wire message to or from
/// binary format.
pub trait SerdeBinary: prost::Message + Default {
    /// Serialize this message
    fn serialize_binary(&self) -> Vec<u8> {
        serialize(self)
    }

    /// Deserialize this message
    fn deserialize_binary(slice: &[u8]) -> Result<Self> {
        deserialize(slice)
    }
}

impl SerdeBinary for crate::proto::Config {}
impl SerdeBinary for crate::proto::ConfigUpdate {}
