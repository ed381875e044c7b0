//! Turning a base config and a proposed config into the `ConfigUpdate`
//! message the rest of the network expects: a read set pinning the versions
//! the update depends on, and a write set carrying what changes.

use crate::{
    config::Config,
    error::{Error, Result},
    proto,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Values and policies diff the same way, so this lets one function handle
/// both maps.
trait Item: Clone {
    fn version(&self) -> u64;
    fn mod_policy(&self) -> &str;
    fn same_content(&self, other: &Self) -> bool;
    /// A version-only entry, used to pin an item without rewriting it.
    fn pinned(version: u64) -> Self;
    /// `self` rewritten at `version`.
    fn at_version(&self, version: u64) -> Self;
}

impl Item for proto::ConfigValue {
    fn version(&self) -> u64 {
        self.version
    }

    fn mod_policy(&self) -> &str {
        &self.mod_policy
    }

    fn same_content(&self, other: &Self) -> bool {
        self.value == other.value
    }

    fn pinned(version: u64) -> Self {
        Self { version, ..Default::default() }
    }

    fn at_version(&self, version: u64) -> Self {
        Self { version, ..self.clone() }
    }
}

impl Item for proto::ConfigPolicy {
    fn version(&self) -> u64 {
        self.version
    }

    fn mod_policy(&self) -> &str {
        &self.mod_policy
    }

    fn same_content(&self, other: &Self) -> bool {
        self.policy == other.policy
    }

    fn pinned(version: u64) -> Self {
        Self { version, ..Default::default() }
    }

    fn at_version(&self, version: u64) -> Self {
        Self { version, ..self.clone() }
    }
}

/// The result of diffing one map (values, policies, or groups) of a group.
struct MapUpdate<T> {
    read_set: BTreeMap<String, T>,
    write_set: BTreeMap<String, T>,
    /// Untouched entries, pinned at their current version.
    same_set: BTreeMap<String, T>,
    /// Whether anything was added or removed.
    members_updated: bool,
}

impl<T> Default for MapUpdate<T> {
    fn default() -> Self {
        Self {
            read_set: BTreeMap::new(),
            write_set: BTreeMap::new(),
            same_set: BTreeMap::new(),
            members_updated: false,
        }
    }
}

fn item_map_update<T: Item>(base: &BTreeMap<String, T>, proposed: &BTreeMap<String, T>) -> MapUpdate<T> {
    let mut update = MapUpdate::default();
    for (name, base_item) in base {
        let proposed_item = match proposed.get(name) {
            Some(x) => x,
            None => {
                update.members_updated = true;
                continue;
            }
        };
        if base_item.mod_policy() == proposed_item.mod_policy() && base_item.same_content(proposed_item) {
            update.same_set.insert(name.clone(), T::pinned(base_item.version()));
        } else {
            update.write_set.insert(name.clone(), proposed_item.at_version(base_item.version() + 1));
        }
    }
    for (name, proposed_item) in proposed {
        if !base.contains_key(name) {
            update.members_updated = true;
            update.write_set.insert(name.clone(), proposed_item.at_version(0));
        }
    }
    update
}

fn group_map_update(base: &BTreeMap<String, proto::ConfigGroup>, proposed: &BTreeMap<String, proto::ConfigGroup>) -> MapUpdate<proto::ConfigGroup> {
    let mut update = MapUpdate::default();
    for (name, base_group) in base {
        let proposed_group = match proposed.get(name) {
            Some(x) => x,
            None => {
                update.members_updated = true;
                continue;
            }
        };
        match group_update(base_group, proposed_group) {
            Some((read, write)) => {
                update.read_set.insert(name.clone(), read);
                update.write_set.insert(name.clone(), write);
            }
            None => {
                update.same_set.insert(name.clone(), proto::ConfigGroup { version: base_group.version, ..Default::default() });
            }
        }
    }
    for (name, proposed_group) in proposed {
        if base.contains_key(name) {
            continue;
        }
        update.members_updated = true;
        // diffing against nothing turns every member into a version zero
        // write. a group with no members at all still needs to be written.
        let write = group_update(&proto::ConfigGroup::default(), proposed_group)
            .map(|(_, write)| write)
            .unwrap_or_default();
        update.write_set.insert(name.clone(), proto::ConfigGroup {
            version: 0,
            mod_policy: proposed_group.mod_policy.clone(),
            ..write
        });
    }
    update
}

/// Diff two versions of a group, returning its (read, write) entries, or
/// `None` if nothing under it changed.
fn group_update(base: &proto::ConfigGroup, proposed: &proto::ConfigGroup) -> Option<(proto::ConfigGroup, proto::ConfigGroup)> {
    let mut policies = item_map_update(&base.policies, &proposed.policies);
    let mut values = item_map_update(&base.values, &proposed.values);
    let mut groups = group_map_update(&base.groups, &proposed.groups);

    let members_updated = policies.members_updated || values.members_updated || groups.members_updated;
    if !members_updated && base.mod_policy == proposed.mod_policy {
        // the group itself stays put: only pin and write what's below it
        let nothing_below = policies.read_set.is_empty() && policies.write_set.is_empty()
            && values.read_set.is_empty() && values.write_set.is_empty()
            && groups.read_set.is_empty() && groups.write_set.is_empty();
        if nothing_below {
            return None;
        }
        let read = proto::ConfigGroup {
            version: base.version,
            policies: policies.read_set,
            values: values.read_set,
            groups: groups.read_set,
            ..Default::default()
        };
        let write = proto::ConfigGroup {
            version: base.version,
            policies: policies.write_set,
            values: values.write_set,
            groups: groups.write_set,
            ..Default::default()
        };
        return Some((read, write));
    }

    // the group's membership (or mod policy) changed, so the write set has to
    // spell out the whole group, pinning everything that stays the same.
    for (name, same) in policies.same_set {
        policies.read_set.insert(name.clone(), same.clone());
        policies.write_set.insert(name, same);
    }
    for (name, same) in values.same_set {
        values.read_set.insert(name.clone(), same.clone());
        values.write_set.insert(name, same);
    }
    for (name, same) in groups.same_set {
        groups.read_set.insert(name.clone(), same.clone());
        groups.write_set.insert(name, same);
    }
    let read = proto::ConfigGroup {
        version: base.version,
        policies: policies.read_set,
        values: values.read_set,
        groups: groups.read_set,
        ..Default::default()
    };
    let write = proto::ConfigGroup {
        version: base.version + 1,
        policies: policies.write_set,
        values: values.write_set,
        groups: groups.write_set,
        mod_policy: proposed.mod_policy.clone(),
    };
    Some((read, write))
}

/// Build the `ConfigUpdate` that takes `base` to `proposed` on the given
/// channel. Fails with [Error::NoDifferences] if there's nothing to update.
pub fn compute_config_update(channel_id: &str, base: &Config, proposed: &Config) -> Result<proto::ConfigUpdate> {
    let base_root = base.to_proto()?.channel_group.unwrap_or_default();
    let proposed_root = proposed.to_proto()?.channel_group.unwrap_or_default();
    let (read_set, write_set) = group_update(&base_root, &proposed_root)
        .ok_or(Error::NoDifferences)?;
    debug!(channel_id, "computed config update");
    Ok(proto::ConfigUpdate {
        channel_id: channel_id.into(),
        read_set: Some(read_set),
        write_set: Some(write_set),
        isolated_data: BTreeMap::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::keys,
        crypto::cert::{Certificate, KeyUsage},
        policy::{MetaRule, Policy},
        util::{ser::SerdeBinary, test::{self, TestOrg}},
    };

    fn sub<'a>(group: &'a proto::ConfigGroup, path: &[&str]) -> &'a proto::ConfigGroup {
        path.iter().fold(group, |g, name| &g.groups[*name])
    }

    #[test]
    fn no_differences() {
        let org1 = TestOrg::new("Org1");
        let base = test::channel(&[&org1]);
        assert_eq!(compute_config_update("mychannel", &base, &base.clone()), Err(Error::NoDifferences));
        // sequence isn't part of the tree
        assert_eq!(compute_config_update("mychannel", &base, &base.next_sequence()), Err(Error::NoDifferences));
    }

    #[test]
    fn modified_value() {
        let org1 = TestOrg::new("Org1");
        let org2 = TestOrg::new("Org2");
        let base = test::channel(&[&org1, &org2]);
        let ca = Certificate::from_parts(b"another CA".to_vec(), true, KeyUsage::CERT_SIGN);
        let proposed = base.add_root_ca("Org1", &ca).unwrap();

        let update = compute_config_update("mychannel", &base, &proposed).unwrap();
        assert_eq!(update.channel_id, "mychannel");
        let read_set = update.read_set.as_ref().unwrap();
        let write_set = update.write_set.as_ref().unwrap();

        // only the path down to Org1 is there, at the base versions
        assert_eq!(read_set.groups.keys().collect::<Vec<_>>(), vec!["Application"]);
        assert_eq!(sub(read_set, &["Application"]).groups.keys().collect::<Vec<_>>(), vec!["Org1"]);
        let org1_read = sub(read_set, &["Application", "Org1"]);
        assert_eq!(org1_read.version, 0);
        assert!(org1_read.values.is_empty());

        let org1_write = sub(write_set, &["Application", "Org1"]);
        assert_eq!(org1_write.version, 0);
        assert_eq!(org1_write.values.keys().collect::<Vec<_>>(), vec![keys::MSP_KEY]);
        let msp = &org1_write.values[keys::MSP_KEY];
        assert_eq!(msp.version, 1);
        assert_eq!(msp.mod_policy, "Admins");
        assert_eq!(msp.value, proposed.org_msp("Org1").unwrap().to_bytes());
        assert!(org1_write.policies.is_empty());

        let bytes = update.serialize_binary();
        assert_eq!(proto::ConfigUpdate::deserialize_binary(&bytes).unwrap(), update);
    }

    #[test]
    fn added_group() {
        let org1 = TestOrg::new("Org1");
        let base = test::channel(&[&org1]);
        let mut proposed = base.clone();
        let app = proposed.channel_group().get_path(&[keys::APPLICATION_GROUP]).unwrap();
        let tree = proposed.channel_group_mut();
        let org2 = tree.add_subgroup(app, "Org2", "Admins").unwrap();
        tree.set_value(org2, keys::MSP_KEY, vec![1, 2, 3], "Admins").unwrap();
        tree.set_policy(org2, "Readers", &Policy::implicit_meta("Readers", MetaRule::Any), "Admins").unwrap();

        let update = compute_config_update("mychannel", &base, &proposed).unwrap();
        let base_app = sub(base.to_proto().unwrap().channel_group.as_ref().unwrap(), &["Application"]).clone();
        let read_app = sub(update.read_set.as_ref().unwrap(), &["Application"]);
        let write_app = sub(update.write_set.as_ref().unwrap(), &["Application"]);

        // membership changed: everything in Application gets pinned
        assert_eq!(read_app.version, base_app.version);
        assert_eq!(write_app.version, base_app.version + 1);
        assert_eq!(write_app.mod_policy, "Admins");
        assert_eq!(read_app.values.keys().collect::<Vec<_>>(), base_app.values.keys().collect::<Vec<_>>());
        assert_eq!(read_app.policies.keys().collect::<Vec<_>>(), base_app.policies.keys().collect::<Vec<_>>());
        assert_eq!(read_app.groups.keys().collect::<Vec<_>>(), vec!["Org1"]);
        assert_eq!(write_app.groups.keys().collect::<Vec<_>>(), vec!["Org1", "Org2"]);
        assert_eq!(write_app.groups["Org1"], proto::ConfigGroup { version: 0, ..Default::default() });
        assert_eq!(write_app.values[keys::ACLS_KEY].value, Vec::<u8>::new());

        let new_org = &write_app.groups["Org2"];
        assert_eq!(new_org.version, 0);
        assert_eq!(new_org.mod_policy, "Admins");
        assert_eq!(new_org.values[keys::MSP_KEY].value, vec![1, 2, 3]);
        assert_eq!(new_org.values[keys::MSP_KEY].version, 0);
        assert_eq!(new_org.policies["Readers"].version, 0);
    }

    #[test]
    fn removed_value_and_empty_group() {
        let org1 = TestOrg::new("Org1");
        let base = test::channel(&[&org1]);
        let org1_id = base.application_org("Org1").unwrap();
        let mut proposed = base.clone();
        let tree = proposed.channel_group_mut();
        tree.remove_value(org1_id, keys::ANCHOR_PEERS_KEY).unwrap();
        tree.add_subgroup(org1_id, "Empty", "Admins").unwrap();

        let update = compute_config_update("mychannel", &base, &proposed).unwrap();
        let write_org = sub(update.write_set.as_ref().unwrap(), &["Application", "Org1"]);
        assert_eq!(write_org.version, 1);
        assert_eq!(write_org.values.keys().collect::<Vec<_>>(), vec![keys::MSP_KEY]);
        assert_eq!(write_org.values[keys::MSP_KEY].value, Vec::<u8>::new());
        assert_eq!(write_org.groups["Empty"], proto::ConfigGroup { mod_policy: "Admins".into(), ..Default::default() });
    }

    #[test]
    fn mod_policy_change() {
        let org1 = TestOrg::new("Org1");
        let base = test::channel(&[&org1]);
        let org1_id = base.application_org("Org1").unwrap();
        let mut proposed = base.clone();
        proposed.channel_group_mut().set_mod_policy(org1_id, "Writers").unwrap();
        let update = compute_config_update("mychannel", &base, &proposed).unwrap();
        let write_org = sub(update.write_set.as_ref().unwrap(), &["Application", "Org1"]);
        assert_eq!(write_org.version, 1);
        assert_eq!(write_org.mod_policy, "Writers");
        assert_eq!(write_org.values.len(), 2);
    }
}
