//! Utilities. OBVIOUSLY.

pub(crate) mod ser;
