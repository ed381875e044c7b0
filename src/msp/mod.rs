//! Membership service providers. An MSP is the identity half of an
//! organization: which CAs it trusts, who its admins are, and what it has
//! revoked. It's stored in the config tree as the `MSP` value of an org group.
//!
//! Mutations here never modify in place. They hand back a new
//! [MspIdentitySet] and leave the original alone, so a failed operation can't
//! leave a half-edited MSP lying around.

mod identity;
mod principal;
mod registry;

pub use identity::Identity;
pub use principal::Principal;
pub use registry::MspRegistry;

use crate::{
    crypto::cert::{Certificate, KeyUsage},
    error::{Error, Result},
    proto,
    util::ser,
};
use getset;
use tracing::{debug, trace};

/// How many intermediates we'll walk through looking for a root before we
/// give up.
pub const MAX_CHAIN_DEPTH: usize = 8;

/// The (decoded) configuration of a single x509 MSP. All certificate lists
/// hold PEM-armored certificates.
#[derive(Debug, Clone, Default, PartialEq, getset::Getters, getset::MutGetters, getset::Setters)]
#[getset(get = "pub", get_mut = "pub(crate)", set = "pub(crate)")]
pub struct MspIdentitySet {
    /// The MSP ID, ie `Org1MSP`.
    name: String,
    /// Trust anchors.
    root_certs: Vec<Vec<u8>>,
    intermediate_certs: Vec<Vec<u8>>,
    /// Certificates whose holders are admins of this MSP.
    admins: Vec<Vec<u8>>,
    /// Certificates that are no longer valid identities, nor valid issuers.
    revocation_list: Vec<Vec<u8>>,
    signing_identity: Option<proto::SigningIdentityInfo>,
    organizational_unit_identifiers: Vec<proto::FabricOuIdentifier>,
    crypto_config: Option<proto::FabricCryptoConfig>,
    tls_root_certs: Vec<Vec<u8>>,
    tls_intermediate_certs: Vec<Vec<u8>>,
    node_ous: Option<proto::FabricNodeOus>,
}

impl MspIdentitySet {
    /// Create a new, empty identity set for the given MSP ID.
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder-ish helper for setting up the trusted roots.
    pub fn with_root_certs(mut self, root_certs: Vec<Vec<u8>>) -> Self {
        self.root_certs = root_certs;
        self
    }

    pub fn with_intermediate_certs(mut self, intermediate_certs: Vec<Vec<u8>>) -> Self {
        self.intermediate_certs = intermediate_certs;
        self
    }

    pub fn with_admins(mut self, admins: Vec<Vec<u8>>) -> Self {
        self.admins = admins;
        self
    }

    /// Decode an MSP from the bytes of a config value (an `MspConfig`
    /// wrapping a `FabricMSPConfig`). Empty bytes decode to an empty MSP.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let wrapper: proto::MspConfig = ser::deserialize(bytes)?;
        if wrapper.r#type != proto::MSP_TYPE_FABRIC {
            Err(Error::MspTypeUnsupported(wrapper.r#type))?;
        }
        let config: proto::FabricMspConfig = ser::deserialize(&wrapper.config)?;
        Ok(Self::from(config))
    }

    /// Encode this MSP as config value bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let wrapper = proto::MspConfig {
            r#type: proto::MSP_TYPE_FABRIC,
            config: ser::serialize(&proto::FabricMspConfig::from(self)),
        };
        ser::serialize(&wrapper)
    }

    /// Add a new trust anchor. The certificate must be a CA *and* be allowed
    /// to sign certificates, otherwise we return an error and nothing changes.
    ///
    /// The certificate is appended as-is. Adding the same CA twice gives you
    /// two copies.
    pub fn add_root_ca(&self, cert: &Certificate) -> Result<Self> {
        if !cert.key_usage().contains(KeyUsage::CERT_SIGN) {
            Err(Error::InvalidKeyUsage)?;
        }
        if !cert.is_ca() {
            Err(Error::NotACertificateAuthority)?;
        }
        let mut next = self.clone();
        next.root_certs.push(cert.to_pem());
        debug!(msp = %self.name, root_certs = next.root_certs.len(), "added root CA");
        Ok(next)
    }

    /// Revoke a certificate. Any certificate can be revoked: leaves,
    /// intermediates, even ones that were never issued by this MSP.
    pub fn revoke_certificate(&self, cert: &Certificate) -> Self {
        let mut next = self.clone();
        next.revocation_list.push(cert.to_pem());
        debug!(msp = %self.name, revocations = next.revocation_list.len(), "revoked certificate");
        next
    }

    /// Checks that `cert` is a valid identity under this MSP: it isn't a CA,
    /// it chains to one of our roots (possibly through our intermediates), and
    /// nothing on that chain below the root has been revoked.
    pub fn validate_identity(&self, cert: &Certificate) -> bool {
        if cert.chain().is_none() {
            trace!(msp = %self.name, "certificate has no chain material");
            return false;
        }
        if cert.is_ca() {
            trace!(msp = %self.name, "CA certificates cannot act as identities");
            return false;
        }
        let roots = decode_all(&self.root_certs);
        let intermediates = decode_all(&self.intermediate_certs);
        let chain = match build_chain(cert, &roots, &intermediates) {
            Some(x) => x,
            None => {
                trace!(msp = %self.name, "certificate does not chain to a root");
                return false;
            }
        };
        let revoked = decode_all(&self.revocation_list);
        // everything but the root. a revoked root is just a root someone
        // forgot to remove.
        let below_root = &chain[0..chain.len() - 1];
        if below_root.iter().any(|member| is_revoked(member, &revoked)) {
            debug!(msp = %self.name, "certificate chain contains a revoked certificate");
            return false;
        }
        true
    }

    /// Errors unless this MSP can decide membership in `role`.
    ///
    /// Client/peer/orderer roles are determined by node OU classification,
    /// which we don't implement.
    pub fn check_role(&self, role: proto::MspRoleType) -> Result<()> {
        match role {
            proto::MspRoleType::Member | proto::MspRoleType::Admin => Ok(()),
            proto::MspRoleType::Client | proto::MspRoleType::Peer | proto::MspRoleType::Orderer => {
                Err(Error::UnresolvableRole(format!("{:?} role in MSP {} needs node OU classification", role, self.name)))
            }
        }
    }

    /// Whether `cert` satisfies the given role under this MSP.
    pub fn satisfies(&self, cert: &Certificate, role: proto::MspRoleType) -> Result<bool> {
        self.check_role(role)?;
        match role {
            proto::MspRoleType::Admin => Ok(self.validate_identity(cert) && self.is_admin(cert)),
            _ => Ok(self.validate_identity(cert)),
        }
    }

    fn is_admin(&self, cert: &Certificate) -> bool {
        decode_all(&self.admins).iter().any(|admin| admin.raw() == cert.raw())
    }
}

impl From<proto::FabricMspConfig> for MspIdentitySet {
    fn from(config: proto::FabricMspConfig) -> Self {
        Self {
            name: config.name,
            root_certs: config.root_certs,
            intermediate_certs: config.intermediate_certs,
            admins: config.admins,
            revocation_list: config.revocation_list,
            signing_identity: config.signing_identity,
            organizational_unit_identifiers: config.organizational_unit_identifiers,
            crypto_config: config.crypto_config,
            tls_root_certs: config.tls_root_certs,
            tls_intermediate_certs: config.tls_intermediate_certs,
            node_ous: config.fabric_node_ous,
        }
    }
}

impl From<&MspIdentitySet> for proto::FabricMspConfig {
    fn from(set: &MspIdentitySet) -> Self {
        Self {
            name: set.name.clone(),
            root_certs: set.root_certs.clone(),
            intermediate_certs: set.intermediate_certs.clone(),
            admins: set.admins.clone(),
            revocation_list: set.revocation_list.clone(),
            signing_identity: set.signing_identity.clone(),
            organizational_unit_identifiers: set.organizational_unit_identifiers.clone(),
            crypto_config: set.crypto_config.clone(),
            tls_root_certs: set.tls_root_certs.clone(),
            tls_intermediate_certs: set.tls_intermediate_certs.clone(),
            fabric_node_ous: set.node_ous.clone(),
        }
    }
}

/// Decode a list of stored certificates, skipping (and logging) any we can't
/// read. A broken entry can't vouch for anyone.
fn decode_all(certs: &[Vec<u8>]) -> Vec<Certificate> {
    certs.iter()
        .filter_map(|bytes| {
            match Certificate::decode(bytes) {
                Ok(cert) => Some(cert),
                Err(e) => {
                    debug!(error = %e, "skipping undecodable certificate");
                    None
                }
            }
        })
        .collect()
}

/// Walk from `cert` up to a root. Returns the chain leaf-first with the root
/// at the end.
fn build_chain(cert: &Certificate, roots: &[Certificate], intermediates: &[Certificate]) -> Option<Vec<Certificate>> {
    let mut chain = vec![cert.clone()];
    let mut current = cert.clone();
    for _ in 0..MAX_CHAIN_DEPTH {
        if let Some(root) = roots.iter().find(|root| root.issues(&current)) {
            chain.push(root.clone());
            return Some(chain);
        }
        let next = intermediates.iter()
            .find(|inter| inter.issues(&current) && !chain.contains(inter))?
            .clone();
        chain.push(next.clone());
        current = next;
    }
    None
}

fn is_revoked(cert: &Certificate, revoked: &[Certificate]) -> bool {
    revoked.iter().any(|entry| entry.raw() == cert.raw() || entry.same_serial(cert))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::cert,
        util::test::TestCa,
    };

    fn ca_parts() -> Certificate {
        Certificate::from_parts(vec![1, 2, 3, 4], true, KeyUsage::CERT_SIGN)
    }

    #[test]
    fn add_root_ca_checks_key_usage_then_ca() {
        let set = MspIdentitySet::new("Org1MSP");
        let before = set.to_bytes();

        let no_usage = Certificate::from_parts(vec![1], true, KeyUsage::DIGITAL_SIGNATURE);
        assert_eq!(set.add_root_ca(&no_usage), Err(Error::InvalidKeyUsage));
        // key usage is checked first
        let neither = Certificate::from_parts(vec![1], false, KeyUsage::empty());
        assert_eq!(set.add_root_ca(&neither), Err(Error::InvalidKeyUsage));
        let not_ca = Certificate::from_parts(vec![1], false, KeyUsage::CERT_SIGN | KeyUsage::CRL_SIGN);
        assert_eq!(set.add_root_ca(&not_ca), Err(Error::NotACertificateAuthority));

        assert_eq!(set.to_bytes(), before);
        assert_eq!(set.root_certs().len(), 0);
    }

    #[test]
    fn add_root_ca_appends() {
        let existing = cert::encode(&[9, 9, 9]);
        let set = MspIdentitySet::new("Org1MSP")
            .with_root_certs(vec![existing.clone()]);
        let ca = ca_parts();
        let set2 = set.add_root_ca(&ca).unwrap();
        assert_eq!(set2.root_certs(), &vec![existing.clone(), cert::encode(ca.raw())]);
        // no dedup
        let set3 = set2.add_root_ca(&ca).unwrap();
        assert_eq!(set3.root_certs(), &vec![existing, cert::encode(ca.raw()), cert::encode(ca.raw())]);
        // original untouched
        assert_eq!(set.root_certs().len(), 1);
        assert_eq!(set3.revocation_list().len(), 0);
    }

    #[test]
    fn add_root_ca_real_cert() {
        let ca = TestCa::new("Org3 CA");
        let set = MspIdentitySet::new("Org3MSP").add_root_ca(&ca.certificate()).unwrap();
        assert_eq!(set.root_certs()[0], ca.certificate().to_pem());
    }

    #[test]
    fn revoke_has_no_preconditions() {
        let set = MspIdentitySet::new("Org1MSP");
        let leaf = Certificate::from_parts(vec![7, 7], false, KeyUsage::empty());
        let set2 = set.revoke_certificate(&leaf);
        assert_eq!(set2.revocation_list(), &vec![cert::encode(&[7, 7])]);
        assert_eq!(set2.root_certs().len(), 0);
        let set3 = set2.revoke_certificate(&leaf);
        assert_eq!(set3.revocation_list().len(), 2);
    }

    #[test]
    fn bytes_roundtrip_and_type_check() {
        let set = MspIdentitySet::new("Org1MSP")
            .with_root_certs(vec![cert::encode(&[1, 2, 3])])
            .with_admins(vec![cert::encode(&[4, 5, 6])]);
        let set2 = MspIdentitySet::from_bytes(&set.to_bytes()).unwrap();
        assert_eq!(set, set2);

        assert_eq!(MspIdentitySet::from_bytes(&[]).unwrap(), MspIdentitySet::default());

        let idemix = proto::MspConfig { r#type: 1, config: vec![] };
        assert_eq!(MspIdentitySet::from_bytes(&ser::serialize(&idemix)), Err(Error::MspTypeUnsupported(1)));
    }

    #[test]
    fn validate_identity_chains() {
        let ca = TestCa::new("Org1 CA");
        let inter = ca.issue_intermediate("Org1 intermediate CA");
        let stranger_ca = TestCa::new("Evil CA");
        let set = MspIdentitySet::new("Org1MSP")
            .with_root_certs(vec![ca.certificate().to_pem()])
            .with_intermediate_certs(vec![inter.certificate().to_pem()]);

        let direct = ca.issue_leaf("user1").certificate();
        let via_inter = inter.issue_leaf("user2").certificate();
        let stranger = stranger_ca.issue_leaf("user3").certificate();
        assert!(set.validate_identity(&direct));
        assert!(set.validate_identity(&via_inter));
        assert!(!set.validate_identity(&stranger));
        // CAs aren't identities
        assert!(!set.validate_identity(&ca.certificate()));
        assert!(!set.validate_identity(&inter.certificate()));
        // no chain material
        assert!(!set.validate_identity(&Certificate::from_parts(direct.raw().clone(), false, KeyUsage::empty())));

        // without the intermediate configured, the deep leaf is an orphan
        let no_inter = MspIdentitySet::new("Org1MSP")
            .with_root_certs(vec![ca.certificate().to_pem()]);
        assert!(!no_inter.validate_identity(&via_inter));
    }

    #[test]
    fn validate_identity_revocation() {
        let ca = TestCa::new("Org1 CA");
        let inter = ca.issue_intermediate("Org1 intermediate CA");
        let set = MspIdentitySet::new("Org1MSP")
            .with_root_certs(vec![ca.certificate().to_pem()])
            .with_intermediate_certs(vec![inter.certificate().to_pem()]);
        let alice = ca.issue_leaf("alice").certificate();
        let bob = ca.issue_leaf("bob").certificate();
        let carol = inter.issue_leaf("carol").certificate();

        let revoked_alice = set.revoke_certificate(&alice);
        assert!(!revoked_alice.validate_identity(&alice));
        assert!(revoked_alice.validate_identity(&bob));
        assert!(revoked_alice.validate_identity(&carol));

        // revoking the intermediate takes out everything under it
        let revoked_inter = set.revoke_certificate(&inter.certificate());
        assert!(!revoked_inter.validate_identity(&carol));
        assert!(revoked_inter.validate_identity(&alice));

        // revoking the root itself is not a thing we honor
        let revoked_root = set.revoke_certificate(&ca.certificate());
        assert!(revoked_root.validate_identity(&alice));
    }

    #[test]
    fn satisfies_roles() {
        let ca = TestCa::new("Org1 CA");
        let admin = ca.issue_leaf("admin").certificate();
        let user = ca.issue_leaf("user").certificate();
        let set = MspIdentitySet::new("Org1MSP")
            .with_root_certs(vec![ca.certificate().to_pem()])
            .with_admins(vec![admin.to_pem()]);
        assert_eq!(set.satisfies(&admin, proto::MspRoleType::Member), Ok(true));
        assert_eq!(set.satisfies(&admin, proto::MspRoleType::Admin), Ok(true));
        assert_eq!(set.satisfies(&user, proto::MspRoleType::Member), Ok(true));
        assert_eq!(set.satisfies(&user, proto::MspRoleType::Admin), Ok(false));
        assert_eq!(
            set.satisfies(&admin, proto::MspRoleType::Peer),
            Err(Error::UnresolvableRole("Peer role in MSP Org1MSP needs node OU classification".into())),
        );
        assert!(matches!(set.satisfies(&user, proto::MspRoleType::Client), Err(Error::UnresolvableRole(_))));
        assert!(matches!(set.check_role(proto::MspRoleType::Orderer), Err(Error::UnresolvableRole(_))));
        assert_eq!(set.check_role(proto::MspRoleType::Member), Ok(()));

        // revoked admins are not admins
        let set2 = set.revoke_certificate(&admin);
        assert_eq!(set2.satisfies(&admin, proto::MspRoleType::Admin), Ok(false));
    }
}
