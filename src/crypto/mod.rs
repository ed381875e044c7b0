//! The crypto module holds certificate handling, hashing, and signature
//! verification. Nothing in here knows what a channel is.

pub mod cert;
pub mod hash;
pub mod verify;
