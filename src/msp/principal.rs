use crate::{
    msp::Identity,
    proto,
    util::ser,
};
use std::convert::TryFrom;

/// Who a `SignedBy` rule is asking for.
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    /// Anyone holding the given role in the given MSP.
    Role {
        msp_id: String,
        role: proto::MspRoleType,
    },
    /// One specific identity.
    Identity(Identity),
    /// A principal we can read but not evaluate (OU, anonymity, combined, or
    /// something that didn't decode). Kept verbatim.
    Unsupported(proto::MspPrincipal),
}

impl Principal {
    /// Any valid member of `msp_id`.
    pub fn member<T: Into<String>>(msp_id: T) -> Self {
        Self::Role { msp_id: msp_id.into(), role: proto::MspRoleType::Member }
    }

    /// Any admin of `msp_id`.
    pub fn admin<T: Into<String>>(msp_id: T) -> Self {
        Self::Role { msp_id: msp_id.into(), role: proto::MspRoleType::Admin }
    }

    /// The MSP this principal belongs to, if we know it.
    pub fn msp_id(&self) -> Option<&str> {
        match self {
            Self::Role { msp_id, .. } => Some(msp_id.as_str()),
            Self::Identity(identity) => Some(identity.msp_id().as_str()),
            Self::Unsupported(_) => None,
        }
    }

    pub fn from_proto(principal: &proto::MspPrincipal) -> Self {
        let classification = proto::PrincipalClassification::try_from(principal.principal_classification);
        match classification {
            Ok(proto::PrincipalClassification::Role) => {
                let role: Option<proto::MspRole> = ser::deserialize(&principal.principal).ok();
                match role.and_then(|r| proto::MspRoleType::try_from(r.role).ok().map(|t| (r.msp_identifier, t))) {
                    Some((msp_id, role)) => Self::Role { msp_id, role },
                    None => Self::Unsupported(principal.clone()),
                }
            }
            Ok(proto::PrincipalClassification::Identity) => {
                match Identity::from_bytes(&principal.principal) {
                    Ok(identity) => Self::Identity(identity),
                    Err(_) => Self::Unsupported(principal.clone()),
                }
            }
            _ => Self::Unsupported(principal.clone()),
        }
    }

    pub fn to_proto(&self) -> proto::MspPrincipal {
        match self {
            Self::Role { msp_id, role } => {
                let role = proto::MspRole {
                    msp_identifier: msp_id.clone(),
                    role: *role as i32,
                };
                proto::MspPrincipal {
                    principal_classification: proto::PrincipalClassification::Role as i32,
                    principal: ser::serialize(&role),
                }
            }
            Self::Identity(identity) => {
                proto::MspPrincipal {
                    principal_classification: proto::PrincipalClassification::Identity as i32,
                    principal: identity.to_bytes(),
                }
            }
            Self::Unsupported(raw) => raw.clone(),
        }
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Role { msp_id, role } => {
                let role = match role {
                    proto::MspRoleType::Member => "member",
                    proto::MspRoleType::Admin => "admin",
                    proto::MspRoleType::Client => "client",
                    proto::MspRoleType::Peer => "peer",
                    proto::MspRoleType::Orderer => "orderer",
                };
                write!(f, "{}.{}", msp_id, role)
            }
            Self::Identity(identity) => write!(f, "{}.identity", identity.msp_id()),
            Self::Unsupported(raw) => write!(f, "unsupported({})", raw.principal_classification),
        }
    }
}
