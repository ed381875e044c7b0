//! Well-known names in the channel config tree.

/// The root group.
pub const CHANNEL_GROUP: &str = "Channel";
pub const APPLICATION_GROUP: &str = "Application";

/// The value holding an org's MSP definition.
pub const MSP_KEY: &str = "MSP";
pub const ANCHOR_PEERS_KEY: &str = "AnchorPeers";
pub const ACLS_KEY: &str = "ACLs";
pub const CAPABILITIES_KEY: &str = "Capabilities";

pub const ADMINS_POLICY: &str = "Admins";
pub const READERS_POLICY: &str = "Readers";
pub const WRITERS_POLICY: &str = "Writers";
pub const ENDORSEMENT_POLICY: &str = "Endorsement";
