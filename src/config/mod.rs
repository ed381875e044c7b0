//! The channel configuration: a versioned tree of groups, values, and
//! policies, plus the sequence number of the config as a whole.
//!
//! Everything here treats a [Config] as a snapshot. Operations that change
//! something return a new `Config` and leave `self` alone, which means two
//! people can build competing proposals off the same base without stepping
//! on each other.

pub mod keys;
mod text;
mod tree;
mod value;

pub use tree::{ConfigTree, Group, GroupId, PolicyRef};
pub use value::{ConfigValue, PayloadKind, ValuePayload};

use crate::{
    crypto::{cert::Certificate, hash::Hash},
    error::{Error, Result},
    msp::MspIdentitySet,
    proto,
    util::ser::{self, SerdeBinary},
};
use getset;
use tracing::debug;

/// A full channel configuration.
#[derive(Debug, Clone, PartialEq, getset::Getters, getset::CopyGetters, getset::MutGetters)]
pub struct Config {
    /// The tree, rooted at the `Channel` group.
    #[getset(get = "pub", get_mut = "pub")]
    channel_group: ConfigTree,
    /// Goes up by exactly one for every committed update.
    #[getset(get_copy = "pub")]
    sequence: u64,
}

impl Config {
    pub fn new(channel_group: ConfigTree, sequence: u64) -> Self {
        Self { channel_group, sequence }
    }

    pub fn from_proto(config: &proto::Config) -> Self {
        let root = config.channel_group.clone().unwrap_or_default();
        Self::new(ConfigTree::from_proto(&root), config.sequence)
    }

    pub fn to_proto(&self) -> Result<proto::Config> {
        Ok(proto::Config {
            sequence: self.sequence,
            channel_group: Some(self.channel_group.to_proto()?),
        })
    }

    /// Decode a config from its wire (protobuf `common.Config`) form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let config = proto::Config::deserialize_binary(bytes)?;
        Ok(Self::from_proto(&config))
    }

    /// Encode this config. Deterministic: the same config always encodes to
    /// the same bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.to_proto()?.serialize_binary())
    }

    /// A digest of the wire form of this config.
    pub fn hash(&self) -> Result<Hash> {
        Ok(Hash::new_blake3(&self.to_bytes()?))
    }

    /// Render this config as yaml for humans. Don't try to read it back in.
    pub fn to_yaml(&self) -> Result<String> {
        ser::serialize_human(&text::ConfigView::new(self)?)
    }

    /// This config with the sequence bumped by one. For whoever commits
    /// updates (which is not us).
    pub fn next_sequence(&self) -> Self {
        Self::new(self.channel_group.clone(), self.sequence + 1)
    }

    /// Find the group for an application org, ie `Channel/Application/Org1`.
    pub fn application_org(&self, org: &str) -> Result<GroupId> {
        self.channel_group.get_path(&[keys::APPLICATION_GROUP, org])
            .map_err(|_| Error::OrganizationNotFound(org.into()))
    }

    /// Decode the MSP of an application org.
    pub fn org_msp(&self, org: &str) -> Result<MspIdentitySet> {
        let org_id = self.application_org(org)?;
        let value = self.channel_group.group(org_id)?.values().get(keys::MSP_KEY)
            .ok_or_else(|| Error::NoMspConfigured(org.into()))?;
        match value.payload()? {
            ValuePayload::Msp(set) => Ok(set.clone()),
            _ => Err(Error::NoMspConfigured(org.into())),
        }
    }

    /// Add a root CA to an application org's MSP. See
    /// [MspIdentitySet::add_root_ca] for what makes a certificate acceptable.
    pub fn add_root_ca(&self, org: &str, cert: &Certificate) -> Result<Self> {
        self.update_org_msp(org, |msp| msp.add_root_ca(cert))
    }

    /// Add a certificate to an application org's revocation list.
    pub fn revoke_certificate(&self, org: &str, cert: &Certificate) -> Result<Self> {
        self.update_org_msp(org, |msp| Ok(msp.revoke_certificate(cert)))
    }

    /// Apply `op` to an org's MSP and write the result back, bumping the MSP
    /// value's version and the org group's version. Nothing else in the tree
    /// changes.
    fn update_org_msp<F>(&self, org: &str, op: F) -> Result<Self>
        where F: FnOnce(&MspIdentitySet) -> Result<MspIdentitySet>,
    {
        let org_id = self.application_org(org)?;
        let current = self.org_msp(org)?;
        let mod_policy = self.channel_group.group(org_id)?.values().get(keys::MSP_KEY)
            .map(|v| v.mod_policy().clone())
            .ok_or_else(|| Error::NoMspConfigured(org.into()))?;
        let updated = op(&current)?;
        let mut next = self.clone();
        next.channel_group.set_value(org_id, keys::MSP_KEY, updated.to_bytes(), mod_policy)?;
        debug!(org, msp = %updated.name(), "updated org MSP");
        Ok(next)
    }
}
