//! Commands: the application-level unit of execution.
//!
//! A command is an action plus a set of (condition → effect) watcher
//! pairs and exception handlers, all expressed over one value graph.
//! Each command compiles to exactly one net; its id is part of
//! real-time exception identity, so the same exception kind raised by
//! two different commands stays distinct.

use std::sync::atomic::{AtomicU64, Ordering};

use rcm_common::error::{CommandId, ExceptionKind};
use rcm_net::net::{Effect, EventId};

use crate::graph::{NodeId, ValueGraph};

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);

/// What a command does while its conditions are watched.
#[derive(Debug, Clone)]
pub enum Action {
    /// Run for a fixed duration, then complete.
    Wait { seconds: f64 },
    /// Drive a device's target channel from a reactive setpoint until
    /// `complete_when` holds (or cancellation, which always completes a
    /// drive). The actuator write is disabled once cancellation is
    /// sensed.
    Drive {
        device: String,
        setpoint: NodeId,
        complete_when: Option<NodeId>,
    },
}

/// An action plus its event/exception/cancellation conditions.
pub struct Command {
    id: CommandId,
    name: String,
    values: ValueGraph,
    action: Action,
    watchers: Vec<(NodeId, Effect)>,
    handlers: Vec<(ExceptionKind, Effect)>,
}

impl Command {
    /// Create a command over an application-built value graph. Ids are
    /// process-unique and monotonically increasing.
    pub fn new(name: impl Into<String>, values: ValueGraph, action: Action) -> Self {
        Self {
            id: CommandId(NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            values,
            action,
            watchers: Vec::new(),
            handlers: Vec::new(),
        }
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn values(&self) -> &ValueGraph {
        &self.values
    }

    pub fn watchers(&self) -> &[(NodeId, Effect)] {
        &self.watchers
    }

    pub fn handlers(&self) -> &[(ExceptionKind, Effect)] {
        &self.handlers
    }

    /// Raise a real-time exception of `kind` while `condition` holds.
    pub fn raise_when(&mut self, condition: NodeId, kind: ExceptionKind) -> &mut Self {
        self.watchers.push((condition, Effect::Raise(kind)));
        self
    }

    /// Request cancellation when `condition` holds.
    pub fn cancel_when(&mut self, condition: NodeId) -> &mut Self {
        self.watchers.push((condition, Effect::Cancel));
        self
    }

    /// Notify the owner (rising edge) when `condition` holds.
    pub fn emit_when(&mut self, condition: NodeId, event: EventId) -> &mut Self {
        self.watchers.push((condition, Effect::Emit(event)));
        self
    }

    /// Consume exceptions of `kind` with the given effect instead of
    /// faulting the net.
    pub fn handle(&mut self, kind: ExceptionKind, effect: Effect) -> &mut Self {
        self.handlers.push((kind, effect));
        self
    }
}
