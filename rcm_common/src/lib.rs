//! RCM Common Library
//!
//! Shared leaf crate for all rcm workspace members.
//!
//! # Module Structure
//!
//! - [`math`] - Cartesian math types (vector, rotation, frame, twist)
//! - [`value`] - Runtime port value types carried through dataflow nets
//! - [`ops`] - Pure scalar/boolean operator vocabulary
//! - [`error`] - Error taxonomy: configuration, mapping, real-time faults
//! - [`device`] - Device capability contract and per-cycle samples
//! - [`config`] - Engine configuration loading and validation
//! - [`prelude`] - Common re-exports for convenience

pub mod config;
pub mod device;
pub mod error;
pub mod math;
pub mod ops;
pub mod prelude;
pub mod value;
