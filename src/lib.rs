//! Channel configuration governance for a permissioned ledger.
//!
//! A channel's configuration is a versioned tree of groups, values, and
//! policies. Organizations are groups under `Application`, each with an MSP
//! (the set of certificates that decides who belongs to the org and who
//! administers it) and a handful of signature policies. Changing anything in
//! the tree requires signatures satisfying the `mod_policy` that governs the
//! changed item.
//!
//! This crate covers the pieces needed to propose and vet such changes:
//!
//! - [config]: the tree itself, plus the org-level MSP operations (adding a
//!   root CA, revoking a certificate) that produce a new config.
//! - [msp]: identities, principals, and certificate chain validation.
//! - [policy]: signature and implicit-meta policies, and evaluating them
//!   against a set of signatures.
//! - [update]: what changed between two configs, which (pre-change) policies
//!   must sign off on it, and the read-set/write-set update message.
//!
//! Nothing here talks to a network or persists anything. Configs go in as
//! bytes or values and come out the same way.

pub mod error;
pub(crate) mod util;
pub mod proto;
pub mod crypto;
pub mod msp;
pub mod policy;
pub mod config;
pub mod update;
