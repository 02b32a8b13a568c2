//! # RCM Execution Engine
//!
//! The cyclic scheduler that steps live nets once per control tick with
//! deterministic ordering and fault containment.
//!
//! One executor thread paces itself with absolute-time sleeps (drift-free
//! `clock_nanosleep` with the `rt` feature, `std::thread::sleep`
//! fallback otherwise) and steps every admitted net in admission order.
//! Each net's cycle is self-contained; a net reaching a terminal state
//! publishes its outcome through its handle and is retired without
//! touching the other nets.
//!
//! ## Zero-allocation cycle path
//!
//! Net topology, port stores and device caches are pre-allocated at
//! build time; the per-tick path performs no heap allocation apart from
//! draining rare owner-facing event notifications.

#![deny(clippy::disallowed_types)]

pub mod executor;
pub mod rt;
pub mod stats;

pub use executor::{Executor, NetHandle, NetOutcome, run_inline};
pub use stats::CycleStats;
