//! Policy evaluation: given a bunch of signatures, does a policy pass?

use crate::{
    config::{ConfigTree, GroupId},
    crypto::verify::SignatureVerifier,
    error::{Error, Result},
    msp::{Identity, MspRegistry, Principal},
    policy::{ImplicitMetaPolicy, Policy, PolicyRule, SignaturePolicy, MAX_RULE_DEPTH},
};
use tracing::{debug, trace};

/// A signature over some data by some (serialized) identity.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedData {
    /// A serialized `SerializedIdentity`.
    pub identity: Vec<u8>,
    pub signature: Vec<u8>,
    /// The exact bytes that were signed.
    pub data: Vec<u8>,
}

impl SignedData {
    pub fn new(identity: Vec<u8>, signature: Vec<u8>, data: Vec<u8>) -> Self {
        Self { identity, signature, data }
    }
}

/// Evaluates policies against the MSPs of one config tree.
pub struct PolicyEvaluator<'a, V> {
    tree: &'a ConfigTree,
    msps: MspRegistry,
    verifier: &'a V,
}

impl<'a, V: SignatureVerifier> PolicyEvaluator<'a, V> {
    pub fn new(tree: &'a ConfigTree, verifier: &'a V) -> Result<Self> {
        Ok(Self {
            tree,
            msps: MspRegistry::from_tree(tree)?,
            verifier,
        })
    }

    /// Decode and verify a set of signatures, keeping the identities whose
    /// signature checks out. Anything that doesn't decode or doesn't verify is
    /// dropped: it can't satisfy anything anyway.
    pub fn signers(&self, signatures: &[SignedData]) -> Vec<Identity> {
        signatures.iter()
            .filter_map(|signed| {
                let identity = match Identity::from_bytes(&signed.identity) {
                    Ok(x) => x,
                    Err(e) => {
                        debug!(error = %e, "skipping undecodable identity");
                        return None;
                    }
                };
                if !self.verifier.verify(&identity, &signed.signature, &signed.data) {
                    debug!(msp = %identity.msp_id(), "skipping invalid signature");
                    return None;
                }
                Some(identity)
            })
            .collect()
    }

    /// Evaluate a policy (living in `group`) against a set of signatures.
    pub fn evaluate(&self, group: GroupId, policy: &Policy, signatures: &[SignedData]) -> Result<bool> {
        let signers = self.signers(signatures);
        self.evaluate_signers(group, policy, &signers)
    }

    /// Resolve a policy reference from `group` and evaluate it.
    pub fn evaluate_path(&self, group: GroupId, name: &str, signatures: &[SignedData]) -> Result<bool> {
        let found = self.tree.resolve_policy(group, name)?;
        self.evaluate(found.group, found.policy.policy()?, signatures)
    }

    /// Like [evaluate][PolicyEvaluator::evaluate], with signatures that were
    /// already checked via [signers][PolicyEvaluator::signers].
    pub fn evaluate_signers(&self, group: GroupId, policy: &Policy, signers: &[Identity]) -> Result<bool> {
        match policy {
            Policy::Signature(sig) => self.evaluate_signature(sig, signers),
            Policy::ImplicitMeta(meta) => self.evaluate_meta(group, meta, signers),
            Policy::Unsupported { policy_type, .. } => Err(Error::UnsupportedPolicyType(*policy_type)),
        }
    }

    fn evaluate_signature(&self, policy: &SignaturePolicy, signers: &[Identity]) -> Result<bool> {
        self.evaluate_rule(policy.rule(), policy.identities(), signers, 1)
    }

    /// Every sub-rule gets evaluated, even once the answer is known, so that a
    /// broken principal anywhere in the rule always surfaces as an error.
    fn evaluate_rule(&self, rule: &PolicyRule, identities: &[Principal], signers: &[Identity], depth: usize) -> Result<bool> {
        if depth > MAX_RULE_DEPTH {
            Err(Error::PolicyRuleTooDeep(MAX_RULE_DEPTH))?;
        }
        match rule {
            PolicyRule::SignedBy(idx) => {
                let principal = identities.get(*idx as usize)
                    .ok_or_else(|| Error::UnresolvableRole(format!("principal index {} out of range ({} declared)", idx, identities.len())))?;
                self.principal_satisfied(principal, signers)
            }
            PolicyRule::NOutOf { n, rules } => {
                let results = rules.iter()
                    .map(|r| self.evaluate_rule(r, identities, signers, depth + 1))
                    .collect::<Result<Vec<_>>>()?;
                let passed = results.into_iter().filter(|x| *x).count();
                trace!(n, passed, "n-out-of rule");
                Ok(passed >= *n as usize)
            }
        }
    }

    fn principal_satisfied(&self, principal: &Principal, signers: &[Identity]) -> Result<bool> {
        match principal {
            Principal::Role { msp_id, role } => {
                let msp = self.msps.get(msp_id)
                    .ok_or_else(|| Error::UnresolvableRole(format!("MSP {} is not defined in this channel", msp_id)))?;
                msp.check_role(*role)?;
                for signer in signers.iter().filter(|signer| signer.msp_id() == msp_id) {
                    if msp.satisfies(signer.certificate(), *role)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Principal::Identity(wanted) => {
                let msp = self.msps.get(wanted.msp_id())
                    .ok_or_else(|| Error::UnresolvableRole(format!("MSP {} is not defined in this channel", wanted.msp_id())))?;
                Ok(signers.iter()
                    .filter(|signer| signer.msp_id() == wanted.msp_id() && signer.certificate().raw() == wanted.certificate().raw())
                    .any(|signer| msp.validate_identity(signer.certificate())))
            }
            Principal::Unsupported(raw) => {
                Err(Error::UnresolvableRole(format!("unsupported principal classification {}", raw.principal_classification)))
            }
        }
    }

    /// Count how many children satisfy their own `sub_policy`. A child that
    /// doesn't define one counts as not satisfied.
    fn evaluate_meta(&self, group: GroupId, meta: &ImplicitMetaPolicy, signers: &[Identity]) -> Result<bool> {
        let node = self.tree.group(group)?;
        let mut satisfied = 0;
        for (name, child) in node.subgroups() {
            match self.tree.group(*child)?.policies().get(meta.sub_policy()) {
                Some(sub) => {
                    if self.evaluate_signers(*child, sub.policy()?, signers)? {
                        satisfied += 1;
                    }
                }
                None => debug!(group = %name, sub_policy = %meta.sub_policy(), "sub-policy missing, counting as unsatisfied"),
            }
        }
        let threshold = meta.rule().threshold(node.subgroups().len());
        trace!(group = %node.name(), rule = %meta.rule(), satisfied, threshold, "implicit meta policy");
        Ok(satisfied >= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::verify::Ed25519Verifier,
        policy::MetaRule,
        proto,
        util::{
            ser,
            test::{self, TestOrg, TestSigner},
        },
    };

    const MSG: &[u8] = b"add Org4 to the channel plz";

    fn sigs(signers: &[(&TestSigner, &str)]) -> Vec<SignedData> {
        signers.iter().map(|(s, msp)| s.sign(msp, MSG)).collect()
    }

    #[test]
    fn signed_by_and_roles() {
        let org1 = TestOrg::new("Org1");
        let org2 = TestOrg::new("Org2");
        let config = test::channel(&[&org1, &org2]);
        let tree = config.channel_group();
        let eval = PolicyEvaluator::new(tree, &Ed25519Verifier).unwrap();
        let root = tree.root();

        let admin1 = Policy::from(SignaturePolicy::any_of(vec![Principal::admin("Org1MSP")]));
        let member1 = Policy::from(SignaturePolicy::any_of(vec![Principal::member("Org1MSP")]));

        assert!(eval.evaluate(root, &admin1, &sigs(&[(&org1.admin, "Org1MSP")])).unwrap());
        assert!(!eval.evaluate(root, &admin1, &sigs(&[(&org1.member, "Org1MSP")])).unwrap());
        assert!(eval.evaluate(root, &member1, &sigs(&[(&org1.member, "Org1MSP")])).unwrap());
        assert!(eval.evaluate(root, &member1, &sigs(&[(&org1.admin, "Org1MSP")])).unwrap());
        // right person, wrong claimed MSP
        assert!(!eval.evaluate(root, &admin1, &sigs(&[(&org1.admin, "Org2MSP")])).unwrap());
        // org2's admin is not org1's admin
        assert!(!eval.evaluate(root, &admin1, &sigs(&[(&org2.admin, "Org1MSP")])).unwrap());
        assert!(!eval.evaluate(root, &admin1, &[]).unwrap());

        // a signature over the wrong data doesn't count
        let mut forged = org1.admin.sign("Org1MSP", MSG);
        forged.data = b"something else".to_vec();
        assert!(!eval.evaluate(root, &admin1, &[forged]).unwrap());

        // junk identities are skipped, not errors
        let junk = SignedData::new(vec![0xff, 0xff, 0xff], vec![], MSG.to_vec());
        assert!(eval.evaluate(root, &admin1, &[junk.clone(), org1.admin.sign("Org1MSP", MSG)]).unwrap());
        assert!(!eval.evaluate(root, &admin1, &[junk]).unwrap());

        // specific identity principals
        let just_member = Policy::from(SignaturePolicy::any_of(vec![Principal::Identity(org1.member.identity("Org1MSP"))]));
        assert!(eval.evaluate(root, &just_member, &sigs(&[(&org1.member, "Org1MSP")])).unwrap());
        assert!(!eval.evaluate(root, &just_member, &sigs(&[(&org1.admin, "Org1MSP")])).unwrap());
    }

    #[test]
    fn n_out_of_matches_counting() {
        let org1 = TestOrg::new("Org1");
        let org2 = TestOrg::new("Org2");
        let org3 = TestOrg::new("Org3");
        let config = test::channel(&[&org1, &org2, &org3]);
        let tree = config.channel_group();
        let eval = PolicyEvaluator::new(tree, &Ed25519Verifier).unwrap();

        let people = vec![
            ("org1-admin", &org1.admin, "Org1MSP"),
            ("org2-admin", &org2.admin, "Org2MSP"),
            ("org3-admin", &org3.admin, "Org3MSP"),
            ("org1-member", &org1.member, "Org1MSP"),
        ];
        let principals = vec![Principal::admin("Org1MSP"), Principal::admin("Org2MSP"), Principal::admin("Org3MSP")];
        let combinations = test::generate_combinations(&people);
        for k in 0..=4u32 {
            let policy = Policy::from(SignaturePolicy::n_out_of(k, principals.clone()));
            for combo in &combinations {
                let signatures = combo.iter().map(|(_, s, msp)| s.sign(msp, MSG)).collect::<Vec<_>>();
                let admins = combo.iter().filter(|(name, _, _)| name.ends_with("admin")).count() as u32;
                let res = eval.evaluate(tree.root(), &policy, &signatures).unwrap();
                assert_eq!(res, admins >= k, "k = {}, combo = {:?}", k, combo.iter().map(|x| x.0).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn nested_rules() {
        let org1 = TestOrg::new("Org1");
        let org2 = TestOrg::new("Org2");
        let org3 = TestOrg::new("Org3");
        let config = test::channel(&[&org1, &org2, &org3]);
        let tree = config.channel_group();
        let eval = PolicyEvaluator::new(tree, &Ed25519Verifier).unwrap();

        // org1 admin AND (org2 admin OR org3 admin)
        let policy = Policy::from(SignaturePolicy::new(
            PolicyRule::all(vec![
                PolicyRule::SignedBy(0),
                PolicyRule::any(vec![PolicyRule::SignedBy(1), PolicyRule::SignedBy(2)]),
            ]),
            vec![Principal::admin("Org1MSP"), Principal::admin("Org2MSP"), Principal::admin("Org3MSP")],
        ).unwrap());

        let passing = vec![
            vec!["org1", "org2"],
            vec!["org1", "org3"],
        ];
        let names = vec!["org1", "org2", "org3"];
        let signer = |name: &str| match name {
            "org1" => org1.admin.sign("Org1MSP", MSG),
            "org2" => org2.admin.sign("Org2MSP", MSG),
            "org3" => org3.admin.sign("Org3MSP", MSG),
            _ => panic!("bad name"),
        };
        let should_pass = |combo: &Vec<&str>| {
            passing.iter().any(|needed| needed.iter().all(|n| combo.contains(n)))
        };
        for combo in test::generate_combinations(&names) {
            let signatures = combo.iter().map(|n| signer(n)).collect::<Vec<_>>();
            let res = eval.evaluate(tree.root(), &policy, &signatures).unwrap();
            if res != should_pass(&combo) {
                panic!("combination {:?} gave {} but shouldn't have", combo, res);
            }
        }
    }

    #[test]
    fn majority_of_three_with_two() {
        let org1 = TestOrg::new("Org1");
        let org2 = TestOrg::new("Org2");
        let org3 = TestOrg::new("Org3");
        let config = test::channel(&[&org1, &org2, &org3]);
        let tree = config.channel_group();
        let eval = PolicyEvaluator::new(tree, &Ed25519Verifier).unwrap();
        let policy = Policy::from(SignaturePolicy::majority_of(vec![
            Principal::admin("Org1MSP"),
            Principal::admin("Org2MSP"),
            Principal::admin("Org3MSP"),
        ]));
        let signatures = sigs(&[(&org1.admin, "Org1MSP"), (&org2.admin, "Org2MSP")]);
        assert!(eval.evaluate(tree.root(), &policy, &signatures).unwrap());
        let signatures = sigs(&[(&org1.admin, "Org1MSP")]);
        assert!(!eval.evaluate(tree.root(), &policy, &signatures).unwrap());
    }

    #[test]
    fn unresolvable_principals_are_errors() {
        let org1 = TestOrg::new("Org1");
        let config = test::channel(&[&org1]);
        let tree = config.channel_group();
        let eval = PolicyEvaluator::new(tree, &Ed25519Verifier).unwrap();
        let signatures = sigs(&[(&org1.admin, "Org1MSP")]);

        // an MSP the channel doesn't have, even though the rule would pass
        // without it
        let ghost = Policy::from(SignaturePolicy::any_of(vec![Principal::admin("Org1MSP"), Principal::admin("Org9MSP")]));
        assert_eq!(
            eval.evaluate(tree.root(), &ghost, &signatures),
            Err(Error::UnresolvableRole("MSP Org9MSP is not defined in this channel".into())),
        );

        // dangling index (only possible via decoded policies)
        let envelope = proto::SignaturePolicyEnvelope {
            version: 0,
            rule: Some(PolicyRule::any(vec![PolicyRule::SignedBy(0), PolicyRule::SignedBy(3)]).to_proto()),
            identities: vec![Principal::admin("Org1MSP").to_proto()],
        };
        let raw = proto::Policy { r#type: proto::PolicyType::Signature as i32, value: ser::serialize(&envelope) };
        let dangling = Policy::from_proto(&raw).unwrap();
        assert_eq!(
            eval.evaluate(tree.root(), &dangling, &signatures),
            Err(Error::UnresolvableRole("principal index 3 out of range (1 declared)".into())),
        );

        let ou = Principal::Unsupported(proto::MspPrincipal {
            principal_classification: proto::PrincipalClassification::OrganizationUnit as i32,
            principal: vec![],
        });
        let ou_policy = Policy::from(SignaturePolicy::any_of(vec![ou]));
        assert!(matches!(eval.evaluate(tree.root(), &ou_policy, &signatures), Err(Error::UnresolvableRole(_))));

        // node OU roles can't be decided here, with or without signatures
        let peer = Policy::from(SignaturePolicy::any_of(vec![Principal::Role { msp_id: "Org1MSP".into(), role: proto::MspRoleType::Peer }]));
        assert!(matches!(eval.evaluate(tree.root(), &peer, &signatures), Err(Error::UnresolvableRole(_))));
        assert!(matches!(eval.evaluate(tree.root(), &peer, &[]), Err(Error::UnresolvableRole(_))));
        let mixed = Policy::from(SignaturePolicy::any_of(vec![
            Principal::member("Org1MSP"),
            Principal::Role { msp_id: "Org1MSP".into(), role: proto::MspRoleType::Orderer },
        ]));
        assert!(matches!(eval.evaluate(tree.root(), &mixed, &signatures), Err(Error::UnresolvableRole(_))));

        let unknown = Policy::Unsupported { policy_type: 2, value: vec![] };
        assert_eq!(eval.evaluate(tree.root(), &unknown, &signatures), Err(Error::UnsupportedPolicyType(2)));
    }

    #[test]
    fn implicit_meta() {
        let org1 = TestOrg::new("Org1");
        let org2 = TestOrg::new("Org2");
        let org3 = TestOrg::new("Org3");
        let config = test::channel(&[&org1, &org2, &org3]);
        let tree = config.channel_group();
        let app = tree.get_path(&["Application"]).unwrap();
        let eval = PolicyEvaluator::new(tree, &Ed25519Verifier).unwrap();

        let majority = Policy::implicit_meta("Admins", MetaRule::Majority);
        let any = Policy::implicit_meta("Admins", MetaRule::Any);
        let all = Policy::implicit_meta("Admins", MetaRule::All);
        let one = sigs(&[(&org1.admin, "Org1MSP")]);
        let two = sigs(&[(&org1.admin, "Org1MSP"), (&org3.admin, "Org3MSP")]);
        let three = sigs(&[(&org1.admin, "Org1MSP"), (&org2.admin, "Org2MSP"), (&org3.admin, "Org3MSP")]);

        assert!(!eval.evaluate(app, &majority, &one).unwrap());
        assert!(eval.evaluate(app, &majority, &two).unwrap());
        assert!(eval.evaluate(app, &any, &one).unwrap());
        assert!(!eval.evaluate(app, &all, &two).unwrap());
        assert!(eval.evaluate(app, &all, &three).unwrap());
        assert!(!eval.evaluate(app, &any, &sigs(&[(&org1.member, "Org1MSP")])).unwrap());

        // channel Admins is MAJORITY of Application's Admins, which is itself
        // MAJORITY of the orgs'
        assert!(eval.evaluate_path(tree.root(), "Admins", &two).unwrap());
        assert!(!eval.evaluate_path(tree.root(), "Admins", &one).unwrap());

        // a group with no children: zero of zero is enough
        let org1_id = tree.get_path(&["Application", "Org1"]).unwrap();
        assert!(eval.evaluate(org1_id, &all, &[]).unwrap());
        assert!(eval.evaluate(org1_id, &any, &[]).unwrap());

        // a child without the sub-policy counts as a no
        let nope = Policy::implicit_meta("Nope", MetaRule::Any);
        assert!(!eval.evaluate(app, &nope, &three).unwrap());
    }

    #[test]
    fn closures_as_verifiers() {
        let org1 = TestOrg::new("Org1");
        let config = test::channel(&[&org1]);
        let tree = config.channel_group();
        let trust_everyone = |_: &Identity, _: &[u8], _: &[u8]| true;
        let eval = PolicyEvaluator::new(tree, &trust_everyone).unwrap();
        let policy = Policy::from(SignaturePolicy::any_of(vec![Principal::admin("Org1MSP")]));
        let unsigned = SignedData::new(org1.admin.identity("Org1MSP").to_bytes(), vec![], MSG.to_vec());
        assert!(eval.evaluate(tree.root(), &policy, &[unsigned.clone()]).unwrap());

        let trust_no_one = |_: &Identity, _: &[u8], _: &[u8]| false;
        let eval = PolicyEvaluator::new(tree, &trust_no_one).unwrap();
        assert!(!eval.evaluate(tree.root(), &policy, &[unsigned]).unwrap());
    }

    #[test]
    fn msp_changes_are_seen() {
        let org1 = TestOrg::new("Org1");
        let config = test::channel(&[&org1]);
        let revoked = config.revoke_certificate("Org1", &org1.admin.certificate()).unwrap();
        let policy = Policy::from(SignaturePolicy::any_of(vec![Principal::admin("Org1MSP")]));
        let signatures = sigs(&[(&org1.admin, "Org1MSP")]);

        let eval = PolicyEvaluator::new(config.channel_group(), &Ed25519Verifier).unwrap();
        assert!(eval.evaluate(config.channel_group().root(), &policy, &signatures).unwrap());
        let eval = PolicyEvaluator::new(revoked.channel_group(), &Ed25519Verifier).unwrap();
        assert!(!eval.evaluate(revoked.channel_group().root(), &policy, &signatures).unwrap());
        assert_eq!(revoked.org_msp("Org1").unwrap(), org1.msp().revoke_certificate(&org1.admin.certificate()));
    }
}
