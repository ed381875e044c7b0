use crate::{
    config::keys,
    error::Result,
    msp::MspIdentitySet,
    proto,
    util::ser,
};
use getset;
use std::sync::OnceLock;

/// Which structure a value's bytes hold. Decided by the value's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Msp,
    AnchorPeers,
    Acls,
    Capabilities,
    Opaque,
}

impl PayloadKind {
    pub fn for_key(key: &str) -> Self {
        match key {
            keys::MSP_KEY => Self::Msp,
            keys::ANCHOR_PEERS_KEY => Self::AnchorPeers,
            keys::ACLS_KEY => Self::Acls,
            keys::CAPABILITIES_KEY => Self::Capabilities,
            _ => Self::Opaque,
        }
    }
}

/// The decoded contents of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum ValuePayload {
    Msp(MspIdentitySet),
    AnchorPeers(proto::AnchorPeers),
    Acls(proto::Acls),
    Capabilities(proto::Capabilities),
    /// Anything we don't have a structure for. Still versioned and governed
    /// like everything else, we just can't look inside.
    Opaque(Vec<u8>),
}

impl ValuePayload {
    fn decode(kind: PayloadKind, bytes: &[u8]) -> Result<Self> {
        let payload = match kind {
            PayloadKind::Msp => Self::Msp(MspIdentitySet::from_bytes(bytes)?),
            PayloadKind::AnchorPeers => Self::AnchorPeers(ser::deserialize(bytes)?),
            PayloadKind::Acls => Self::Acls(ser::deserialize(bytes)?),
            PayloadKind::Capabilities => Self::Capabilities(ser::deserialize(bytes)?),
            PayloadKind::Opaque => Self::Opaque(bytes.to_vec()),
        };
        Ok(payload)
    }
}

/// A leaf in the config tree. We hold on to the exact bytes we were given and
/// only decode them when someone asks, so values nobody touches re-encode
/// exactly as they came in.
#[derive(Debug, Clone, getset::Getters, getset::CopyGetters)]
pub struct ConfigValue {
    #[getset(get_copy = "pub")]
    version: u64,
    #[getset(get = "pub")]
    raw: Vec<u8>,
    /// The policy that must be satisfied to modify this value.
    #[getset(get = "pub")]
    mod_policy: String,
    #[getset(get_copy = "pub")]
    kind: PayloadKind,
    payload: OnceLock<ValuePayload>,
}

impl ConfigValue {
    /// A new value (version 0) stored under the name `key`.
    pub fn new<T: Into<String>>(key: &str, raw: Vec<u8>, mod_policy: T) -> Self {
        Self {
            version: 0,
            raw,
            mod_policy: mod_policy.into(),
            kind: PayloadKind::for_key(key),
            payload: OnceLock::new(),
        }
    }

    pub(crate) fn from_proto(key: &str, value: &proto::ConfigValue) -> Self {
        Self::new(key, value.value.clone(), value.mod_policy.clone())
            .with_version(value.version)
    }

    pub(crate) fn to_proto(&self) -> proto::ConfigValue {
        proto::ConfigValue {
            version: self.version,
            value: self.raw.clone(),
            mod_policy: self.mod_policy.clone(),
        }
    }

    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Decode (once) and return this value's payload.
    pub fn payload(&self) -> Result<&ValuePayload> {
        if let Some(payload) = self.payload.get() {
            return Ok(payload);
        }
        let decoded = ValuePayload::decode(self.kind, &self.raw)?;
        Ok(self.payload.get_or_init(|| decoded))
    }
}

impl PartialEq for ConfigValue {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version &&
            self.raw == other.raw &&
            self.mod_policy == other.mod_policy &&
            self.kind == other.kind
    }
}
