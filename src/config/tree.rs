//! The config tree itself.
//!
//! Groups live in an arena and point at each other by [GroupId]. Children are
//! found through a group's `subgroups` map, parents through its `parent` link,
//! which is all the policy lookups need in order to walk upward. Removing a
//! subgroup unlinks it but leaves its node in the arena, so ids handed out
//! earlier never dangle into some other group.

use crate::{
    config::{keys, value::ConfigValue},
    error::{Error, Result},
    policy::{ConfigPolicy, Policy},
    proto,
};
use getset;
use std::collections::BTreeMap;
use tracing::trace;

/// Points at a group inside one specific [ConfigTree].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(usize);

/// A node in the config tree.
#[derive(Debug, Clone, getset::Getters, getset::CopyGetters)]
pub struct Group {
    #[getset(get = "pub")]
    name: String,
    #[getset(get_copy = "pub")]
    parent: Option<GroupId>,
    #[getset(get = "pub")]
    subgroups: BTreeMap<String, GroupId>,
    #[getset(get = "pub")]
    values: BTreeMap<String, ConfigValue>,
    #[getset(get = "pub")]
    policies: BTreeMap<String, ConfigPolicy>,
    #[getset(get_copy = "pub")]
    version: u64,
    /// The policy that governs adding or removing this group's members, or
    /// changing this field.
    #[getset(get = "pub")]
    mod_policy: String,
}

impl Group {
    fn new(name: String, parent: Option<GroupId>, version: u64, mod_policy: String) -> Self {
        Self {
            name,
            parent,
            subgroups: BTreeMap::new(),
            values: BTreeMap::new(),
            policies: BTreeMap::new(),
            version,
            mod_policy,
        }
    }
}

/// A policy found by [ConfigTree::resolve_policy], along with where it lives.
#[derive(Debug, Clone, Copy)]
pub struct PolicyRef<'a> {
    /// The group the policy is defined in.
    pub group: GroupId,
    pub name: &'a str,
    pub policy: &'a ConfigPolicy,
}

/// The channel config tree.
#[derive(Debug, Clone)]
pub struct ConfigTree {
    nodes: Vec<Group>,
}

impl ConfigTree {
    /// Create a tree with nothing but an empty root group.
    pub fn new<T: Into<String>>(mod_policy: T) -> Self {
        Self {
            nodes: vec![Group::new(keys::CHANNEL_GROUP.into(), None, 0, mod_policy.into())],
        }
    }

    /// The root (`Channel`) group.
    pub fn root(&self) -> GroupId {
        GroupId(0)
    }

    pub fn group(&self, id: GroupId) -> Result<&Group> {
        self.nodes.get(id.0)
            .ok_or_else(|| Error::PathNotFound(format!("group #{}", id.0)))
    }

    fn group_mut(&mut self, id: GroupId) -> Result<&mut Group> {
        self.nodes.get_mut(id.0)
            .ok_or_else(|| Error::PathNotFound(format!("group #{}", id.0)))
    }

    /// Find a group by walking `path` down from `from`. Exact names only.
    pub fn get(&self, from: GroupId, path: &[&str]) -> Result<GroupId> {
        let mut current = from;
        for (i, name) in path.iter().enumerate() {
            current = match self.group(current)?.subgroups.get(*name) {
                Some(id) => *id,
                None => {
                    let base = self.path_string(from)?;
                    Err(Error::PathNotFound(format!("{}/{}", base, path[0..=i].join("/"))))?
                }
            };
        }
        Ok(current)
    }

    /// Find a group by path from the root, ie `&["Application", "Org1"]`.
    pub fn get_path(&self, path: &[&str]) -> Result<GroupId> {
        self.get(self.root(), path)
    }

    /// The names from the root down to (and including) this group.
    pub fn path(&self, id: GroupId) -> Result<Vec<String>> {
        let mut names = vec![];
        let mut current = Some(id);
        while let Some(cur) = current {
            let group = self.group(cur)?;
            names.push(group.name.clone());
            current = group.parent;
        }
        names.reverse();
        Ok(names)
    }

    /// The absolute path of a group, ie `/Channel/Application/Org1`.
    pub fn path_string(&self, id: GroupId) -> Result<String> {
        Ok(format!("/{}", self.path(id)?.join("/")))
    }

    /// Every group reachable from `id` (including `id`), parents before
    /// children, siblings in name order.
    pub fn descendants(&self, id: GroupId) -> Result<Vec<GroupId>> {
        let mut out = vec![];
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            // reversed so the stack pops them in name order
            stack.extend(self.group(cur)?.subgroups.values().rev());
        }
        Ok(out)
    }

    /// Find the policy a `mod_policy` (or any other policy reference) points
    /// to, starting at `group`.
    ///
    /// - `/Channel/Application/Admins` is absolute and must match exactly.
    /// - `Org1/Admins` is relative to `group` and must match exactly.
    /// - `Admins` is looked for in `group`, then its parent, and so on up to
    ///   the root.
    ///
    /// An empty reference never resolves (nothing can modify that item).
    pub fn resolve_policy<'a>(&'a self, group: GroupId, name: &str) -> Result<PolicyRef<'a>> {
        if name.is_empty() {
            Err(Error::PolicyNotFound(format!("(empty policy reference at {})", self.path_string(group)?)))?;
        }
        if let Some(absolute) = name.strip_prefix('/') {
            let parts = absolute.split('/').collect::<Vec<_>>();
            let (policy_name, groups) = parts.split_last()
                .ok_or_else(|| Error::PolicyNotFound(name.into()))?;
            let (root_name, groups) = groups.split_first()
                .ok_or_else(|| Error::PolicyNotFound(name.into()))?;
            if *root_name != self.group(self.root())?.name {
                Err(Error::PolicyNotFound(name.into()))?;
            }
            let target = self.get(self.root(), groups)
                .map_err(|_| Error::PolicyNotFound(name.into()))?;
            return self.policy_in(target, policy_name)
                .ok_or_else(|| Error::PolicyNotFound(name.into()));
        }
        if name.contains('/') {
            let parts = name.split('/').collect::<Vec<_>>();
            let (policy_name, groups) = parts.split_last()
                .ok_or_else(|| Error::PolicyNotFound(name.into()))?;
            let target = self.get(group, groups)
                .map_err(|_| Error::PolicyNotFound(name.into()))?;
            return self.policy_in(target, policy_name)
                .ok_or_else(|| Error::PolicyNotFound(name.into()));
        }
        let mut current = Some(group);
        while let Some(cur) = current {
            if let Some(found) = self.policy_in(cur, name) {
                return Ok(found);
            }
            trace!(policy = name, group = ?cur, "policy not in group, trying parent");
            current = self.group(cur)?.parent;
        }
        Err(Error::PolicyNotFound(format!("{} (from {})", name, self.path_string(group)?)))
    }

    fn policy_in<'a>(&'a self, group: GroupId, name: &str) -> Option<PolicyRef<'a>> {
        let group_ref = self.nodes.get(group.0)?;
        group_ref.policies.get_key_value(name)
            .map(|(name, policy)| PolicyRef { group, name: name.as_str(), policy })
    }

    /// Set a value in a group. An existing value's version goes up by one, a
    /// new value starts at zero. Either way the group's version goes up.
    pub fn set_value<T: Into<String>>(&mut self, group: GroupId, name: &str, value: Vec<u8>, mod_policy: T) -> Result<()> {
        let node = self.group_mut(group)?;
        let version = node.values.get(name).map(|v| v.version() + 1).unwrap_or(0);
        node.values.insert(name.into(), ConfigValue::new(name, value, mod_policy).with_version(version));
        node.version += 1;
        trace!(group = %node.name, value = name, version, "set value");
        Ok(())
    }

    /// Set a policy in a group, with the same versioning rules as
    /// [set_value][ConfigTree::set_value].
    pub fn set_policy<T: Into<String>>(&mut self, group: GroupId, name: &str, policy: &Policy, mod_policy: T) -> Result<()> {
        let node = self.group_mut(group)?;
        let version = node.policies.get(name).map(|p| p.version() + 1).unwrap_or(0);
        node.policies.insert(name.into(), ConfigPolicy::new(policy, mod_policy).with_version(version));
        node.version += 1;
        trace!(group = %node.name, policy = name, version, "set policy");
        Ok(())
    }

    /// Add an empty subgroup. The parent's version goes up, the new group
    /// starts at zero.
    pub fn add_subgroup<T: Into<String>>(&mut self, parent: GroupId, name: &str, mod_policy: T) -> Result<GroupId> {
        if self.group(parent)?.subgroups.contains_key(name) {
            Err(Error::DuplicateName(name.into()))?;
        }
        let id = GroupId(self.nodes.len());
        self.nodes.push(Group::new(name.into(), Some(parent), 0, mod_policy.into()));
        let node = self.group_mut(parent)?;
        node.subgroups.insert(name.into(), id);
        node.version += 1;
        Ok(id)
    }

    pub fn remove_value(&mut self, group: GroupId, name: &str) -> Result<()> {
        let path = self.path_string(group)?;
        let node = self.group_mut(group)?;
        node.values.remove(name)
            .ok_or_else(|| Error::PathNotFound(format!("{}/{}", path, name)))?;
        node.version += 1;
        Ok(())
    }

    pub fn remove_policy(&mut self, group: GroupId, name: &str) -> Result<()> {
        let path = self.path_string(group)?;
        let node = self.group_mut(group)?;
        node.policies.remove(name)
            .ok_or_else(|| Error::PathNotFound(format!("{}/{}", path, name)))?;
        node.version += 1;
        Ok(())
    }

    pub fn remove_subgroup(&mut self, parent: GroupId, name: &str) -> Result<()> {
        let path = self.path_string(parent)?;
        let node = self.group_mut(parent)?;
        node.subgroups.remove(name)
            .ok_or_else(|| Error::PathNotFound(format!("{}/{}", path, name)))?;
        node.version += 1;
        Ok(())
    }

    /// Change a group's own mod policy. Counts as a modification of the group.
    pub fn set_mod_policy<T: Into<String>>(&mut self, group: GroupId, mod_policy: T) -> Result<()> {
        let node = self.group_mut(group)?;
        node.mod_policy = mod_policy.into();
        node.version += 1;
        Ok(())
    }

    /// Build a tree from its wire form. The root is always named `Channel`.
    pub fn from_proto(root: &proto::ConfigGroup) -> Self {
        let mut tree = Self { nodes: vec![] };
        tree.push_proto(keys::CHANNEL_GROUP, None, root);
        tree
    }

    fn push_proto(&mut self, name: &str, parent: Option<GroupId>, group: &proto::ConfigGroup) -> GroupId {
        let id = GroupId(self.nodes.len());
        let mut node = Group::new(name.into(), parent, group.version, group.mod_policy.clone());
        node.values = group.values.iter()
            .map(|(k, v)| (k.clone(), ConfigValue::from_proto(k, v)))
            .collect();
        node.policies = group.policies.iter()
            .map(|(k, p)| (k.clone(), ConfigPolicy::from_proto(p)))
            .collect();
        self.nodes.push(node);
        for (child_name, child) in &group.groups {
            let child_id = self.push_proto(child_name, Some(id), child);
            // ids are sequential, and `id` was just pushed
            if let Some(node) = self.nodes.get_mut(id.0) {
                node.subgroups.insert(child_name.clone(), child_id);
            }
        }
        id
    }

    /// The wire form of the whole tree.
    pub fn to_proto(&self) -> Result<proto::ConfigGroup> {
        self.subtree_to_proto(self.root())
    }

    /// The wire form of the tree under `id`.
    pub fn subtree_to_proto(&self, id: GroupId) -> Result<proto::ConfigGroup> {
        let group = self.group(id)?;
        let groups = group.subgroups.iter()
            .map(|(name, child)| Ok((name.clone(), self.subtree_to_proto(*child)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(proto::ConfigGroup {
            version: group.version,
            groups,
            values: group.values.iter().map(|(k, v)| (k.clone(), v.to_proto())).collect(),
            policies: group.policies.iter().map(|(k, p)| (k.clone(), p.to_proto())).collect(),
            mod_policy: group.mod_policy.clone(),
        })
    }
}

impl PartialEq for ConfigTree {
    /// Two trees are equal if they encode the same, regardless of how their
    /// arenas happen to be laid out.
    fn eq(&self, other: &Self) -> bool {
        match (self.to_proto(), other.to_proto()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}
