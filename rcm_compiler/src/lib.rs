//! # RCM Command Compiler
//!
//! Lowers declarative commands into executable dataflow nets.
//!
//! Applications describe *what* a quantity means as a graph of reactive
//! value nodes ([`graph::ValueGraph`]); a pluggable
//! [`mapper::MapperRegistry`] knows *how* each node kind is realized as
//! primitives, producing [`fragment::Fragment`]s that the compiler
//! composes bottom-up — memoized by structural equality, so a value used
//! twice compiles once — into one net bound to a
//! [`command::Command`].
//!
//! ## Module Structure
//!
//! - [`graph`] - Hash-consed reactive value expression arena
//! - [`fragment`] - Partially built sub-networks with exposed ports
//! - [`mapper`] - Kind-indexed fragment factory registry
//! - [`command`] - Commands: an action plus watcher/handler conditions
//! - [`compile`] - The fragment compiler and `compile_command`

pub mod command;
pub mod compile;
pub mod fragment;
pub mod graph;
pub mod mapper;

pub use command::{Action, Command};
pub use compile::{CompilerEnv, FragmentCompiler, compile_command};
pub use fragment::Fragment;
pub use graph::{KindTag, NodeId, ValueGraph, ValueKind};
pub use mapper::{MapperCtx, MapperRegistry};
