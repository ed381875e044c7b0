use crate::{
    error::Error,
    util::ser,
};
use std::convert::TryInto;

/// A cryptographic hash. By defining this as an enum, we allow expansion of
/// hash algorithms in the future.
///
/// When stringified, the hash is in the format `base64([<hash bytes>|<u8 tag>])`
/// where the `tag` is the specific hash algorithm we use. This allows the hash
/// to shine on its own without the tag getting in the way. Yes, it's vain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Hash {
    /// Blake3 256bit hash
    Blake3([u8; 32]),
}

impl Hash {
    /// Create a new blake3 hash from a message
    pub fn new_blake3(message: &[u8]) -> Self {
        Self::Blake3(*blake3::hash(message).as_bytes())
    }

    /// Return the byte slice representing this hash.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Blake3(bin) => &bin[..],
        }
    }
}

impl From<&Hash> for String {
    fn from(hash: &Hash) -> Self {
        let enc = match hash {
            Hash::Blake3(bin) => {
                let mut vec = Vec::from(&bin[..]);
                vec.push(0);
                vec
            }
        };
        ser::base64_encode_url(&enc[..])
    }
}

impl TryFrom<&str> for Hash {
    type Error = Error;

    fn try_from(string: &str) -> std::result::Result<Self, Self::Error> {
        let dec = ser::base64_decode_url(string)?;
        let (tag, bytes) = dec.split_last()
            .ok_or_else(|| Error::MalformedHash(string.into()))?;
        match tag {
            0 => {
                let arr: [u8; 32] = bytes.try_into()
                    .map_err(|_| Error::MalformedHash(string.into()))?;
                Ok(Self::Blake3(arr))
            }
            _ => Err(Error::MalformedHash(string.into())),
        }
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from(self))
    }
}
