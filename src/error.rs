//! The main error enum for the project lives here, and documents the various
//! conditions that can arise while reading, mutating, diffing, or authorizing
//! a channel configuration.
//!
//! Every variant belongs to exactly one [ErrorKind], which lets callers tell a
//! plain "not enough signatures yet" apart from "this channel's policy setup
//! is broken" without matching on individual variants.

use thiserror::Error;

/// The broad class an [Error] falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input from the caller (malformed certificate, wrong key usage,
    /// undecodable bytes). Fix the input and try again.
    Validation,
    /// The tree doesn't look the way the caller thinks it does: a path,
    /// policy, or org is missing, or two trees can't be compared.
    Structural,
    /// A policy evaluated to false. Collect more (or different) signatures.
    Authorization,
    /// A policy references something that cannot be resolved, so it can never
    /// be evaluated. Fatal to the update.
    UnresolvableRole,
}

/// This is our error enum. It contains an entry for any part of the system in
/// which an expectation is not met or a problem occurs.
#[derive(Error, Debug)]
pub enum Error {
    /// Two trees cannot be diffed against each other (root mismatch, version
    /// regression, content changed without a version bump...)
    #[error("incompatible config structure: {0}")]
    IncompatibleStructure(String),

    /// A certificate is missing the cert-sign key usage bit.
    #[error("certificate key usage must include cert sign")]
    InvalidKeyUsage,

    /// Bytes handed to us as a certificate aren't one.
    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),

    /// A stringified hash didn't decode.
    #[error("malformed hash: {0}")]
    MalformedHash(String),

    /// A protobuf message failed to decode.
    #[error("protobuf decode error: {0}")]
    MessageDecode(#[from] prost::DecodeError),

    /// An MSP value exists but holds a config type we can't operate on.
    #[error("unsupported MSP config type {0}")]
    MspTypeUnsupported(i32),

    /// Bad base64 (inside a PEM frame, usually).
    #[error("base64 decode error")]
    DeserializeBase64(#[from] base64::DecodeError),

    /// A name is already taken within its group.
    #[error("the name {0} is already in use (names must be unique within a group)")]
    DuplicateName(String),

    /// The base and proposed configs are identical, so there's nothing to
    /// update.
    #[error("no differences detected between original and updated config")]
    NoDifferences,

    /// An organization group exists but doesn't carry an MSP value.
    #[error("no MSP configured for organization {0}")]
    NoMspConfigured(String),

    /// The certificate does not have the CA flag set.
    #[error("certificate must be a CA certificate")]
    NotACertificateAuthority,

    /// The organization group wasn't found under the application group.
    #[error("organization {0} not found")]
    OrganizationNotFound(String),

    /// A group path didn't resolve.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// A policy reference didn't resolve (directly or by walking up the tree).
    #[error("policy not found: {0}")]
    PolicyNotFound(String),

    /// A policy was evaluated against a signature set and came back false.
    #[error("policy {0} not satisfied")]
    PolicyNotSatisfied(String),

    /// A signature rule is nested deeper than we're willing to walk.
    #[error("signature rule exceeds maximum depth of {0}")]
    PolicyRuleTooDeep(usize),

    /// An error while rendering yaml.
    #[error("yaml serialization error")]
    SerializeYaml(#[from] serde_yaml::Error),

    /// A policy references a principal we cannot resolve: a dangling identity
    /// index, an MSP that doesn't exist in the channel, or a principal type we
    /// don't know about.
    #[error("unresolvable role: {0}")]
    UnresolvableRole(String),

    /// The stored policy has a type this engine can't evaluate.
    #[error("unsupported policy type {0}")]
    UnsupportedPolicyType(i32),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeserializeBase64(..) |
                Self::InvalidKeyUsage |
                Self::MalformedCertificate(..) |
                Self::MalformedHash(..) |
                Self::MessageDecode(..) |
                Self::NotACertificateAuthority |
                Self::SerializeYaml(..) => ErrorKind::Validation,
            Self::IncompatibleStructure(..) |
                Self::MspTypeUnsupported(..) |
                Self::DuplicateName(..) |
                Self::NoDifferences |
                Self::NoMspConfigured(..) |
                Self::OrganizationNotFound(..) |
                Self::PathNotFound(..) |
                Self::PolicyNotFound(..) => ErrorKind::Structural,
            Self::PolicyNotSatisfied(..) => ErrorKind::Authorization,
            Self::PolicyRuleTooDeep(..) |
                Self::UnresolvableRole(..) |
                Self::UnsupportedPolicyType(..) => ErrorKind::UnresolvableRole,
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        // prost/yaml errors aren't comparable, so compare the debug output.
        // crude, but it's only here so tests can assert_eq on results.
        format!("{:?}", self) == format!("{:?}", other)
    }
}

/// Wraps `std::result::Result` around our `Error` enum
pub type Result<T> = std::result::Result<T, Error>;
