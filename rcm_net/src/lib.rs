//! # RCM Dataflow Network Model
//!
//! The primitive dataflow network: typed single-writer ports, computation
//! primitives with a three-phase per-cycle contract, executable nets with
//! a precomputed topological evaluation order, and the process-wide
//! device/interface/primitive registries.
//!
//! A net is built once (ports allocated, primitives added, devices
//! resolved, parameters checked, evaluation order computed), then stepped
//! by the executor every control cycle. Topology is immutable after
//! build; the per-cycle path performs no heap allocation.
//!
//! ## Module Structure
//!
//! - [`port`] - Port identifiers and the value store
//! - [`primitive`] - The `Primitive` trait and per-cycle context
//! - [`primitives`] - Builtin primitive library
//! - [`net`] - Executable `Net`, watcher table, exception latch
//! - [`builder`] - `NetBuilder`: wiring, merging, validation, build
//! - [`registry`] - Device, interface and primitive registries
//! - [`devices`] - Simulation devices for development and tests

pub mod builder;
pub mod devices;
pub mod net;
pub mod port;
pub mod primitive;
pub mod primitives;
pub mod registry;
