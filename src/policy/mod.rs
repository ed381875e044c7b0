//! The policy system decides whether a set of signatures is enough to do
//! something, generally to modify part of the config tree.
//!
//! There are two kinds of policy we can evaluate. Signature policies are a
//! recursive structure of "N of these sub-rules" bottoming out in "signed by
//! this principal", which is enough to express ANY/ALL/MAJORITY and arbitrary
//! nestings thereof. Implicit meta policies don't name anybody at all: they
//! aggregate the policy of the same name in every child group ("a majority of
//! the orgs' Admins policies").

mod eval;

pub use eval::{PolicyEvaluator, SignedData};

use crate::{
    error::{Error, Result},
    msp::Principal,
    proto,
    util::ser,
};
use getset;
use std::convert::TryFrom;
use std::sync::OnceLock;

/// Rules nested deeper than this are rejected.
pub const MAX_RULE_DEPTH: usize = 64;

/// A recursive structure that defines the conditions under which a signature
/// policy can be satisfied.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyRule {
    /// A signature from the principal at this index of the policy's
    /// identities.
    SignedBy(u32),
    /// At least `n` of the given sub-rules must pass.
    NOutOf {
        n: u32,
        rules: Vec<PolicyRule>,
    },
}

impl PolicyRule {
    /// One of the given rules must pass.
    pub fn any(rules: Vec<PolicyRule>) -> Self {
        Self::NOutOf { n: 1, rules }
    }

    /// All of the given rules must pass.
    pub fn all(rules: Vec<PolicyRule>) -> Self {
        Self::NOutOf { n: rules.len() as u32, rules }
    }

    /// More than half of the given rules must pass.
    pub fn majority(rules: Vec<PolicyRule>) -> Self {
        Self::NOutOf { n: (rules.len() / 2 + 1) as u32, rules }
    }

    /// How deep this rule goes. A lone `SignedBy` is 1.
    pub fn depth(&self) -> usize {
        match self {
            Self::SignedBy(_) => 1,
            Self::NOutOf { rules, .. } => 1 + rules.iter().map(|r| r.depth()).max().unwrap_or(0),
        }
    }

    /// Every principal index referenced anywhere in this rule.
    fn indices(&self, out: &mut Vec<u32>) {
        match self {
            Self::SignedBy(idx) => out.push(*idx),
            Self::NOutOf { rules, .. } => {
                for rule in rules {
                    rule.indices(out);
                }
            }
        }
    }

    fn from_proto(rule: &proto::SignaturePolicy, depth: usize) -> Result<Self> {
        if depth > MAX_RULE_DEPTH {
            Err(Error::PolicyRuleTooDeep(MAX_RULE_DEPTH))?;
        }
        match rule.r#type.as_ref() {
            Some(proto::signature_policy::Type::SignedBy(idx)) => {
                let idx = u32::try_from(*idx)
                    .map_err(|_| Error::UnresolvableRole(format!("negative principal index {}", idx)))?;
                Ok(Self::SignedBy(idx))
            }
            Some(proto::signature_policy::Type::NOutOf(n_out_of)) => {
                let rules = n_out_of.rules.iter()
                    .map(|r| Self::from_proto(r, depth + 1))
                    .collect::<Result<Vec<_>>>()?;
                // a negative n is trivially satisfied, same as zero
                let n = u32::try_from(n_out_of.n).unwrap_or(0);
                Ok(Self::NOutOf { n, rules })
            }
            None => Err(Error::UnresolvableRole("signature rule has no type".into())),
        }
    }

    fn to_proto(&self) -> proto::SignaturePolicy {
        let ty = match self {
            Self::SignedBy(idx) => proto::signature_policy::Type::SignedBy(*idx as i32),
            Self::NOutOf { n, rules } => {
                proto::signature_policy::Type::NOutOf(proto::signature_policy::NOutOf {
                    n: *n as i32,
                    rules: rules.iter().map(|r| r.to_proto()).collect(),
                })
            }
        };
        proto::SignaturePolicy { r#type: Some(ty) }
    }
}

/// A signature rule plus the principals its `SignedBy` leaves point at.
#[derive(Debug, Clone, PartialEq, getset::Getters, getset::CopyGetters)]
pub struct SignaturePolicy {
    #[getset(get_copy = "pub")]
    version: i32,
    #[getset(get = "pub")]
    rule: PolicyRule,
    #[getset(get = "pub")]
    identities: Vec<Principal>,
}

impl SignaturePolicy {
    /// Create a new signature policy. Every `SignedBy` must point at one of
    /// `identities` and the rule can't nest deeper than [MAX_RULE_DEPTH].
    pub fn new(rule: PolicyRule, identities: Vec<Principal>) -> Result<Self> {
        if rule.depth() > MAX_RULE_DEPTH {
            Err(Error::PolicyRuleTooDeep(MAX_RULE_DEPTH))?;
        }
        let mut indices = vec![];
        rule.indices(&mut indices);
        if let Some(idx) = indices.iter().find(|idx| **idx as usize >= identities.len()) {
            Err(Error::UnresolvableRole(format!("principal index {} out of range ({} declared)", idx, identities.len())))?;
        }
        Ok(Self { version: 0, rule, identities })
    }

    /// Build a flat N-of policy over `principals`, one `SignedBy` per
    /// principal. Always valid.
    pub fn n_out_of(n: u32, principals: Vec<Principal>) -> Self {
        let rules = (0..principals.len() as u32).map(PolicyRule::SignedBy).collect();
        Self {
            version: 0,
            rule: PolicyRule::NOutOf { n, rules },
            identities: principals,
        }
    }

    pub fn any_of(principals: Vec<Principal>) -> Self {
        Self::n_out_of(1, principals)
    }

    pub fn all_of(principals: Vec<Principal>) -> Self {
        let n = principals.len() as u32;
        Self::n_out_of(n, principals)
    }

    pub fn majority_of(principals: Vec<Principal>) -> Self {
        let n = (principals.len() / 2 + 1) as u32;
        Self::n_out_of(n, principals)
    }

    /// Note that this does *not* check principal indices: a stored policy
    /// pointing at a principal that doesn't exist fails at evaluation time.
    fn from_proto(envelope: &proto::SignaturePolicyEnvelope) -> Result<Self> {
        let rule = match envelope.rule.as_ref() {
            Some(rule) => PolicyRule::from_proto(rule, 1)?,
            None => Err(Error::UnresolvableRole("signature policy has no rule".into()))?,
        };
        Ok(Self {
            version: envelope.version,
            rule,
            identities: envelope.identities.iter().map(Principal::from_proto).collect(),
        })
    }

    fn to_proto(&self) -> proto::SignaturePolicyEnvelope {
        proto::SignaturePolicyEnvelope {
            version: self.version,
            rule: Some(self.rule.to_proto()),
            identities: self.identities.iter().map(|p| p.to_proto()).collect(),
        }
    }
}

/// How many of the children's sub-policies must pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaRule {
    Any,
    All,
    Majority,
}

impl MetaRule {
    /// The number of satisfied sub-policies needed out of `count`. With no
    /// sub-policies at all, the threshold is zero.
    pub fn threshold(&self, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        match self {
            Self::Any => 1,
            Self::All => count,
            Self::Majority => count / 2 + 1,
        }
    }
}

impl std::fmt::Display for MetaRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => write!(f, "ANY"),
            Self::All => write!(f, "ALL"),
            Self::Majority => write!(f, "MAJORITY"),
        }
    }
}

/// A policy that aggregates the policy named `sub_policy` in each child group.
#[derive(Debug, Clone, PartialEq, getset::Getters, getset::CopyGetters)]
pub struct ImplicitMetaPolicy {
    #[getset(get = "pub")]
    sub_policy: String,
    #[getset(get_copy = "pub")]
    rule: MetaRule,
}

impl ImplicitMetaPolicy {
    pub fn new<T: Into<String>>(sub_policy: T, rule: MetaRule) -> Self {
        Self { sub_policy: sub_policy.into(), rule }
    }

    fn from_proto(meta: &proto::ImplicitMetaPolicy) -> Result<Self> {
        let rule = match proto::ImplicitMetaRule::try_from(meta.rule) {
            Ok(proto::ImplicitMetaRule::Any) => MetaRule::Any,
            Ok(proto::ImplicitMetaRule::All) => MetaRule::All,
            Ok(proto::ImplicitMetaRule::Majority) => MetaRule::Majority,
            Err(_) => Err(Error::UnresolvableRole(format!("unknown implicit meta rule {}", meta.rule)))?,
        };
        Ok(Self::new(meta.sub_policy.clone(), rule))
    }

    fn to_proto(&self) -> proto::ImplicitMetaPolicy {
        let rule = match self.rule {
            MetaRule::Any => proto::ImplicitMetaRule::Any,
            MetaRule::All => proto::ImplicitMetaRule::All,
            MetaRule::Majority => proto::ImplicitMetaRule::Majority,
        };
        proto::ImplicitMetaPolicy {
            sub_policy: self.sub_policy.clone(),
            rule: rule as i32,
        }
    }
}

/// A decoded policy.
#[derive(Debug, Clone, PartialEq)]
pub enum Policy {
    Signature(SignaturePolicy),
    ImplicitMeta(ImplicitMetaPolicy),
    /// Some other policy type. We keep it around (it's part of the tree) but
    /// evaluating it is an error.
    Unsupported {
        policy_type: i32,
        value: Vec<u8>,
    },
}

impl Policy {
    /// Shortcut for creating an implicit meta policy.
    pub fn implicit_meta<T: Into<String>>(sub_policy: T, rule: MetaRule) -> Self {
        Self::ImplicitMeta(ImplicitMetaPolicy::new(sub_policy, rule))
    }

    pub fn from_proto(policy: &proto::Policy) -> Result<Self> {
        let decoded = match proto::PolicyType::try_from(policy.r#type) {
            Ok(proto::PolicyType::Signature) => {
                let envelope: proto::SignaturePolicyEnvelope = ser::deserialize(&policy.value)?;
                Self::Signature(SignaturePolicy::from_proto(&envelope)?)
            }
            Ok(proto::PolicyType::ImplicitMeta) => {
                let meta: proto::ImplicitMetaPolicy = ser::deserialize(&policy.value)?;
                Self::ImplicitMeta(ImplicitMetaPolicy::from_proto(&meta)?)
            }
            _ => Self::Unsupported { policy_type: policy.r#type, value: policy.value.clone() },
        };
        Ok(decoded)
    }

    pub fn to_proto(&self) -> proto::Policy {
        match self {
            Self::Signature(sig) => proto::Policy {
                r#type: proto::PolicyType::Signature as i32,
                value: ser::serialize(&sig.to_proto()),
            },
            Self::ImplicitMeta(meta) => proto::Policy {
                r#type: proto::PolicyType::ImplicitMeta as i32,
                value: ser::serialize(&meta.to_proto()),
            },
            Self::Unsupported { policy_type, value } => proto::Policy {
                r#type: *policy_type,
                value: value.clone(),
            },
        }
    }
}

impl From<SignaturePolicy> for Policy {
    fn from(sig: SignaturePolicy) -> Self {
        Self::Signature(sig)
    }
}

/// A policy as it sits in the config tree: versioned, with its own mod
/// policy. Like values, the wire form is kept and decoded on demand.
#[derive(Debug, Clone, getset::Getters, getset::CopyGetters)]
pub struct ConfigPolicy {
    #[getset(get_copy = "pub")]
    version: u64,
    #[getset(get = "pub")]
    raw: proto::Policy,
    #[getset(get = "pub")]
    mod_policy: String,
    decoded: OnceLock<Policy>,
}

impl ConfigPolicy {
    /// A new (version 0) config policy.
    pub fn new<T: Into<String>>(policy: &Policy, mod_policy: T) -> Self {
        Self {
            version: 0,
            raw: policy.to_proto(),
            mod_policy: mod_policy.into(),
            decoded: OnceLock::from(policy.clone()),
        }
    }

    pub(crate) fn from_proto(policy: &proto::ConfigPolicy) -> Self {
        Self {
            version: policy.version,
            raw: policy.policy.clone().unwrap_or_default(),
            mod_policy: policy.mod_policy.clone(),
            decoded: OnceLock::new(),
        }
    }

    pub(crate) fn to_proto(&self) -> proto::ConfigPolicy {
        proto::ConfigPolicy {
            version: self.version,
            policy: Some(self.raw.clone()),
            mod_policy: self.mod_policy.clone(),
        }
    }

    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Decode (once) and return the policy.
    pub fn policy(&self) -> Result<&Policy> {
        if let Some(policy) = self.decoded.get() {
            return Ok(policy);
        }
        let decoded = Policy::from_proto(&self.raw)?;
        Ok(self.decoded.get_or_init(|| decoded))
    }
}

impl PartialEq for ConfigPolicy {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version &&
            self.raw == other.raw &&
            self.mod_policy == other.mod_policy
    }
}
