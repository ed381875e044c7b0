//! Working out what a proposed config changes, and who has to sign off on it.
//!
//! The important rule: every change is governed by a policy from the *base*
//! config, never the proposed one. Otherwise a proposal could weaken a policy
//! and, in the same breath, use the weakened version to approve itself.

mod compute;

pub use compute::compute_config_update;

use crate::{
    config::{Config, ConfigTree, Group, GroupId},
    crypto::verify::SignatureVerifier,
    error::{Error, Result},
    policy::{ConfigPolicy, PolicyEvaluator, SignedData},
};
use getset;
use std::collections::BTreeSet;
use tracing::debug;

/// What kind of thing changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Group,
    Value,
    Policy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// The policy (from the base config) that must pass for a change to go
/// through.
#[derive(Debug, Clone, PartialEq, getset::Getters, getset::CopyGetters)]
pub struct GoverningPolicy {
    /// Absolute path of the policy, ie `/Channel/Application/Org1/Admins`.
    #[getset(get = "pub")]
    path: String,
    /// The base-tree group the policy lives in.
    #[getset(get_copy = "pub")]
    group: GroupId,
    #[getset(get = "pub")]
    policy: ConfigPolicy,
}

/// One changed item.
#[derive(Debug, Clone, PartialEq, getset::Getters, getset::CopyGetters)]
pub struct Change {
    /// Absolute path of the item, ie `/Channel/Application/Org1/MSP`.
    #[getset(get = "pub")]
    path: String,
    #[getset(get_copy = "pub")]
    item: ItemKind,
    #[getset(get_copy = "pub")]
    change: ChangeKind,
    /// The base version (none if the item was added).
    #[getset(get_copy = "pub")]
    old_version: Option<u64>,
    /// The proposed version (none if the item was removed).
    #[getset(get_copy = "pub")]
    new_version: Option<u64>,
    #[getset(get = "pub")]
    governed_by: GoverningPolicy,
}

/// Everything that differs between a base config and a proposal.
#[derive(Debug, Clone, PartialEq, getset::Getters, getset::CopyGetters)]
pub struct UpdateSet {
    /// The sequence of the config this was computed against.
    #[getset(get_copy = "pub")]
    base_sequence: u64,
    #[getset(get = "pub")]
    changes: Vec<Change>,
}

impl UpdateSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// The distinct policies that must all pass for this update, in the order
    /// they first come up.
    pub fn required_policies(&self) -> Vec<&GoverningPolicy> {
        let mut seen = BTreeSet::new();
        self.changes.iter()
            .map(|c| &c.governed_by)
            .filter(|gov| seen.insert(gov.path.clone()))
            .collect()
    }

    /// Check the signatures against every required policy, in the base
    /// config. The first policy that isn't satisfied fails the whole thing.
    pub fn authorize<V: SignatureVerifier>(&self, base: &Config, signatures: &[SignedData], verifier: &V) -> Result<()> {
        if base.sequence() != self.base_sequence {
            Err(Error::IncompatibleStructure(format!("update computed against sequence {}, not {}", self.base_sequence, base.sequence())))?;
        }
        let evaluator = PolicyEvaluator::new(base.channel_group(), verifier)?;
        let signers = evaluator.signers(signatures);
        for required in self.required_policies() {
            let policy = required.policy.policy()?;
            if !evaluator.evaluate_signers(required.group, policy, &signers)? {
                debug!(policy = %required.path, "policy not satisfied");
                Err(Error::PolicyNotSatisfied(required.path.clone()))?;
            }
        }
        Ok(())
    }
}

/// Compute the changes between `base` and `proposed`, each bound to the base
/// policy that governs it.
pub fn diff(base: &Config, proposed: &Config) -> Result<UpdateSet> {
    let changes = diff_trees(base.channel_group(), proposed.channel_group())?;
    debug!(base_sequence = base.sequence(), changes = changes.len(), "computed config diff");
    Ok(UpdateSet {
        base_sequence: base.sequence(),
        changes,
    })
}

/// Tree-level [diff].
pub fn diff_trees(base: &ConfigTree, proposed: &ConfigTree) -> Result<Vec<Change>> {
    let base_root = base.group(base.root())?;
    let proposed_root = proposed.group(proposed.root())?;
    if base_root.name() != proposed_root.name() {
        Err(Error::IncompatibleStructure(format!("root group {} vs {}", base_root.name(), proposed_root.name())))?;
    }
    let mut differ = Differ { base, proposed, changes: vec![] };
    differ.group(base.root(), proposed.root())?;
    Ok(differ.changes)
}

struct Differ<'a> {
    base: &'a ConfigTree,
    proposed: &'a ConfigTree,
    changes: Vec<Change>,
}

impl<'a> Differ<'a> {
    fn governing(&self, group: GroupId, mod_policy: &str) -> Result<GoverningPolicy> {
        let found = self.base.resolve_policy(group, mod_policy)?;
        let path = format!("{}/{}", self.base.path_string(found.group)?, found.name);
        Ok(GoverningPolicy {
            path,
            group: found.group,
            policy: found.policy.clone(),
        })
    }

    fn push(&mut self, path: String, item: ItemKind, change: ChangeKind, versions: (Option<u64>, Option<u64>), governed_by: GoverningPolicy) {
        let (old_version, new_version) = versions;
        self.changes.push(Change { path, item, change, old_version, new_version, governed_by });
    }

    fn group(&mut self, base_id: GroupId, proposed_id: GroupId) -> Result<()> {
        let base_group = self.base.group(base_id)?;
        let proposed_group = self.proposed.group(proposed_id)?;
        let path = self.base.path_string(base_id)?;
        if proposed_group.version() < base_group.version() {
            Err(Error::IncompatibleStructure(format!("{} version went from {} to {}", path, base_group.version(), proposed_group.version())))?;
        }

        self.items(base_id, &path, ItemKind::Value, base_group, proposed_group)?;
        self.items(base_id, &path, ItemKind::Policy, base_group, proposed_group)?;

        let membership_changed = !base_group.subgroups().keys().eq(proposed_group.subgroups().keys());
        if membership_changed || base_group.mod_policy() != proposed_group.mod_policy() {
            check_version_bump(&path, base_group.version(), proposed_group.version())?;
            let gov = self.governing(base_id, base_group.mod_policy())?;
            self.push(path.clone(), ItemKind::Group, ChangeKind::Modified, (Some(base_group.version()), Some(proposed_group.version())), gov);
        }

        for (name, base_child) in base_group.subgroups() {
            match proposed_group.subgroups().get(name) {
                Some(proposed_child) => self.group(*base_child, *proposed_child)?,
                None => {
                    let gov = self.governing(base_id, base_group.mod_policy())?;
                    let old = self.base.group(*base_child)?.version();
                    self.push(format!("{}/{}", path, name), ItemKind::Group, ChangeKind::Removed, (Some(old), None), gov);
                }
            }
        }
        for (name, proposed_child) in proposed_group.subgroups() {
            if base_group.subgroups().contains_key(name) {
                continue;
            }
            // the new group and everything in it comes in under the parent's
            // mod policy
            let gov = self.governing(base_id, base_group.mod_policy())?;
            let new = self.proposed.group(*proposed_child)?.version();
            self.push(format!("{}/{}", path, name), ItemKind::Group, ChangeKind::Added, (None, Some(new)), gov);
        }
        Ok(())
    }

    /// Diff the values or policies of two matching groups.
    fn items(&mut self, base_id: GroupId, path: &str, kind: ItemKind, base_group: &Group, proposed_group: &Group) -> Result<()> {
        let base_items = item_list(kind, base_group);
        let proposed_items = item_list(kind, proposed_group);
        for (name, base_item) in &base_items {
            let item_path = format!("{}/{}", path, name);
            match proposed_items.iter().find(|(n, _)| n == name) {
                Some((_, proposed_item)) => {
                    if base_item == proposed_item {
                        continue;
                    }
                    check_version_bump(&item_path, base_item.version, proposed_item.version)?;
                    let gov = self.governing(base_id, &base_item.mod_policy)?;
                    self.push(item_path, kind, ChangeKind::Modified, (Some(base_item.version), Some(proposed_item.version)), gov);
                }
                None => {
                    let gov = self.governing(base_id, base_group.mod_policy())?;
                    self.push(item_path, kind, ChangeKind::Removed, (Some(base_item.version), None), gov);
                }
            }
        }
        for (name, proposed_item) in &proposed_items {
            if base_items.iter().any(|(n, _)| n == name) {
                continue;
            }
            let gov = self.governing(base_id, base_group.mod_policy())?;
            self.push(format!("{}/{}", path, name), kind, ChangeKind::Added, (None, Some(proposed_item.version)), gov);
        }
        Ok(())
    }
}

/// Just enough of a value or policy to compare two of them.
#[derive(PartialEq)]
struct ItemSummary<'a> {
    version: u64,
    mod_policy: &'a str,
    content: ItemContent<'a>,
}

#[derive(PartialEq)]
enum ItemContent<'a> {
    Bytes(&'a [u8]),
    Policy(&'a crate::proto::Policy),
}

fn item_list<'a>(kind: ItemKind, group: &'a Group) -> Vec<(&'a str, ItemSummary<'a>)> {
    match kind {
        ItemKind::Value => group.values().iter()
            .map(|(name, v)| (name.as_str(), ItemSummary { version: v.version(), mod_policy: v.mod_policy(), content: ItemContent::Bytes(v.raw()) }))
            .collect(),
        ItemKind::Policy => group.policies().iter()
            .map(|(name, p)| (name.as_str(), ItemSummary { version: p.version(), mod_policy: p.mod_policy(), content: ItemContent::Policy(p.raw()) }))
            .collect(),
        ItemKind::Group => vec![],
    }
}

fn check_version_bump(path: &str, old: u64, new: u64) -> Result<()> {
    if new <= old {
        Err(Error::IncompatibleStructure(format!("{} changed but its version went from {} to {}", path, old, new)))?;
    }
    Ok(())
}
