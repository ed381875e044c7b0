//! Wire messages for the channel configuration.
//!
//! Other components of the network (ordering, validation) deserialize the
//! exact same bytes we produce, so these are field-for-field mirrors of the
//! upstream protobuf schema, derived with `prost` instead of generated. Maps
//! are `BTreeMap`s so encoding is deterministic: the same tree always yields
//! the same bytes, which is what makes config hashing reproducible.

mod common;
mod msp;
mod peer;

pub use common::*;
pub use msp::*;
pub use peer::*;
