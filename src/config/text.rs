//! A human-readable view of a config, for display only. Structured payloads
//! are decoded, certificates shown as their PEM text, and everything else as
//! base64.

use crate::{
    config::{Config, ConfigTree, GroupId, ValuePayload},
    error::Result,
    msp::{MspIdentitySet, Principal},
    policy::{Policy, PolicyRule},
    util::ser,
};
use serde_derive::Serialize;
use std::collections::BTreeMap;

#[derive(Serialize)]
pub(crate) struct ConfigView {
    sequence: u64,
    channel_group: GroupView,
}

impl ConfigView {
    pub(crate) fn new(config: &Config) -> Result<Self> {
        let tree = config.channel_group();
        Ok(Self {
            sequence: config.sequence(),
            channel_group: GroupView::new(tree, tree.root())?,
        })
    }
}

#[derive(Serialize)]
struct GroupView {
    version: u64,
    mod_policy: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    groups: BTreeMap<String, GroupView>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    values: BTreeMap<String, ValueView>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    policies: BTreeMap<String, PolicyView>,
}

impl GroupView {
    fn new(tree: &ConfigTree, id: GroupId) -> Result<Self> {
        let group = tree.group(id)?;
        let groups = group.subgroups().iter()
            .map(|(name, child)| Ok((name.clone(), Self::new(tree, *child)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let values = group.values().iter()
            .map(|(name, value)| {
                let view = ValueView {
                    version: value.version(),
                    mod_policy: value.mod_policy().clone(),
                    value: PayloadView::new(value.payload(), value.raw()),
                };
                (name.clone(), view)
            })
            .collect();
        let policies = group.policies().iter()
            .map(|(name, policy)| {
                let view = PolicyView {
                    version: policy.version(),
                    mod_policy: policy.mod_policy().clone(),
                    policy: PolicyBodyView::new(policy.policy(), &policy.raw().value),
                };
                (name.clone(), view)
            })
            .collect();
        Ok(Self {
            version: group.version(),
            mod_policy: group.mod_policy().clone(),
            groups,
            values,
            policies,
        })
    }
}

#[derive(Serialize)]
struct ValueView {
    version: u64,
    mod_policy: String,
    value: PayloadView,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum PayloadView {
    Msp(MspView),
    AnchorPeers(Vec<String>),
    Acls(BTreeMap<String, String>),
    Capabilities(Vec<String>),
    Opaque(String),
    /// The payload was supposed to have structure, but didn't decode.
    Undecodable(String),
}

impl PayloadView {
    fn new(payload: Result<&ValuePayload>, raw: &[u8]) -> Self {
        match payload {
            Ok(ValuePayload::Msp(msp)) => Self::Msp(MspView::new(msp)),
            Ok(ValuePayload::AnchorPeers(peers)) => {
                Self::AnchorPeers(peers.anchor_peers.iter().map(|p| format!("{}:{}", p.host, p.port)).collect())
            }
            Ok(ValuePayload::Acls(acls)) => {
                Self::Acls(acls.acls.iter().map(|(k, v)| (k.clone(), v.policy_ref.clone())).collect())
            }
            Ok(ValuePayload::Capabilities(caps)) => Self::Capabilities(caps.capabilities.keys().cloned().collect()),
            Ok(ValuePayload::Opaque(bytes)) => Self::Opaque(ser::base64_encode(bytes)),
            Err(_) => Self::Undecodable(ser::base64_encode(raw)),
        }
    }
}

#[derive(Serialize)]
struct MspView {
    name: String,
    root_certs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    intermediate_certs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    admins: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    revocation_list: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    organizational_unit_identifiers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tls_root_certs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tls_intermediate_certs: Vec<String>,
    node_ous_enabled: bool,
}

impl MspView {
    fn new(msp: &MspIdentitySet) -> Self {
        // certs are PEM, which is text. if someone stuffed DER in there, show
        // base64 instead of mojibake.
        let certs = |list: &Vec<Vec<u8>>| {
            list.iter()
                .map(|c| String::from_utf8(c.clone()).unwrap_or_else(|_| ser::base64_encode(c)))
                .collect::<Vec<_>>()
        };
        Self {
            name: msp.name().clone(),
            root_certs: certs(msp.root_certs()),
            intermediate_certs: certs(msp.intermediate_certs()),
            admins: certs(msp.admins()),
            revocation_list: certs(msp.revocation_list()),
            organizational_unit_identifiers: msp.organizational_unit_identifiers().iter()
                .map(|ou| ou.organizational_unit_identifier.clone())
                .collect(),
            tls_root_certs: certs(msp.tls_root_certs()),
            tls_intermediate_certs: certs(msp.tls_intermediate_certs()),
            node_ous_enabled: msp.node_ous().as_ref().map(|n| n.enable).unwrap_or(false),
        }
    }
}

#[derive(Serialize)]
struct PolicyView {
    version: u64,
    mod_policy: String,
    policy: PolicyBodyView,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum PolicyBodyView {
    Signature {
        rule: String,
        identities: Vec<String>,
    },
    ImplicitMeta(String),
    Unsupported {
        #[serde(rename = "type")]
        ty: i32,
        value: String,
    },
    Undecodable(String),
}

impl PolicyBodyView {
    fn new(policy: Result<&Policy>, raw: &[u8]) -> Self {
        match policy {
            Ok(Policy::Signature(sig)) => Self::Signature {
                rule: rule_string(sig.rule(), sig.identities()),
                identities: sig.identities().iter().map(|p| p.to_string()).collect(),
            },
            Ok(Policy::ImplicitMeta(meta)) => Self::ImplicitMeta(format!("{} {}", meta.rule(), meta.sub_policy())),
            Ok(Policy::Unsupported { policy_type, value }) => Self::Unsupported {
                ty: *policy_type,
                value: ser::base64_encode(value),
            },
            Err(_) => Self::Undecodable(ser::base64_encode(raw)),
        }
    }
}

/// Render a rule the way people write them: `OutOf(1, 'Org1MSP.admin')`.
fn rule_string(rule: &PolicyRule, identities: &[Principal]) -> String {
    match rule {
        PolicyRule::SignedBy(idx) => {
            match identities.get(*idx as usize) {
                Some(principal) => format!("'{}'", principal),
                None => format!("'#{}'", idx),
            }
        }
        PolicyRule::NOutOf { n, rules } => {
            let mut parts = vec![n.to_string()];
            parts.extend(rules.iter().map(|r| rule_string(r, identities)));
            format!("OutOf({})", parts.join(", "))
        }
    }
}
