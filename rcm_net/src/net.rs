//! Executable nets.
//!
//! A `Net` owns its primitives and ports, the topological evaluation
//! order computed at build time, a cancellation flag, a cycle counter and
//! the latched real-time exception set. It is the unit of real-time
//! execution: the engine calls [`Net::step`] once per control tick.
//!
//! ## Per-cycle order
//!
//! 1. Sample every bound device once into the net's device cache. A
//!    vanished device latches `DEVICE_UNAVAILABLE` instead of dangling.
//! 2. `read_sensor` for sensor-consuming primitives, in evaluation order.
//! 3. `update` for every primitive in topological order.
//! 4. Watcher pass, strictly after all outputs are final: latch
//!    exceptions (coalesced by {kind, command}), run handlers, set the
//!    cancellation flag, emit rising-edge events, check completion.
//! 5. Advance cycle counter and elapsed time.
//!
//! A latched unhandled exception lets the net run exactly one further
//! full cycle (so ramp-down logic sees the fault through exception-sense
//! outputs), then the net stops with `Faulted`. A primitive returning a
//! programming fault stops the net immediately with `Fatal`; other nets
//! are unaffected.

use std::fmt;
use std::sync::Weak;

use bitflags::bitflags;

use rcm_common::device::{Device, DeviceSample};
use rcm_common::error::{CommandId, ExceptionKind, PrimitiveFault, RtException};
use rcm_common::value::RtValue;

use crate::port::{PortId, PortStore};
use crate::primitive::{CycleContext, Primitive};

/// Capacity of the per-net exception latch (distinct {kind, command}
/// pairs).
pub const MAX_NET_EXCEPTIONS: usize = 16;
/// Events one cycle can emit.
pub const MAX_EVENTS_PER_CYCLE: usize = 8;

// ─── Identifiers & effects ──────────────────────────────────────────

/// Application-chosen id of an emitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub u32);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event#{}", self.0)
    }
}

/// What a watcher or exception handler does when its condition holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Latch a real-time exception of this kind.
    Raise(ExceptionKind),
    /// Request cooperative cancellation of the net.
    Cancel,
    /// Notify the command's owner (rising edge only for watchers).
    Emit(EventId),
}

/// A compiled condition: boolean port plus the effect it triggers.
#[derive(Debug, Clone)]
pub(crate) struct Watcher {
    pub port: PortId,
    pub effect: Effect,
    pub prev: bool,
}

// ─── Net state ──────────────────────────────────────────────────────

/// Lifecycle of a net: `Created → Running → {Completed, Cancelled,
/// Faulted}`, plus `Fatal` for programming faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetState {
    Created,
    Running,
    Completed,
    Cancelled,
    Faulted,
    Fatal,
}

impl NetState {
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::Faulted | Self::Fatal
        )
    }
}

impl fmt::Display for NetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Faulted => "faulted",
            Self::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

bitflags! {
    /// Per-net condition summary flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NetFlags: u8 {
        /// Cancellation requested (owner or watcher). Never cleared.
        const CANCEL_REQUESTED = 0x01;
        /// An unhandled exception is latched.
        const FAULT_LATCHED    = 0x02;
        /// The one post-fault cycle has been granted.
        const POST_FAULT_RUN   = 0x04;
        /// A bound device vanished from the registry.
        const DEVICE_LOST      = 0x08;
    }
}

// ─── Exception latch ────────────────────────────────────────────────

/// Fixed-capacity set of latched real-time exceptions for one net.
///
/// Insertion coalesces by value: the same {kind, command} pair latches
/// once no matter how often its condition fires.
#[derive(Debug, Default)]
pub struct ExceptionLatch {
    entries: heapless::Vec<(RtException, bool), MAX_NET_EXCEPTIONS>,
}

impl ExceptionLatch {
    /// Latch an exception. Returns `true` if it was newly inserted,
    /// `false` if already present or the latch is full.
    pub fn insert(&mut self, exception: RtException) -> bool {
        if self.contains(&exception) {
            return false;
        }
        self.entries.push((exception, false)).is_ok()
    }

    pub fn contains(&self, exception: &RtException) -> bool {
        self.entries.iter().any(|(e, _)| e == exception)
    }

    /// True while any exception of this kind is latched (consumed or
    /// not).
    pub fn contains_kind(&self, kind: ExceptionKind) -> bool {
        self.entries.iter().any(|(e, _)| e.kind == kind)
    }

    /// Mark an exception as consumed by a handler.
    pub fn consume(&mut self, exception: &RtException) {
        if let Some(entry) = self.entries.iter_mut().find(|(e, _)| e == exception) {
            entry.1 = true;
        }
    }

    /// Exceptions no handler consumed.
    pub fn unconsumed(&self) -> impl Iterator<Item = RtException> + '_ {
        self.entries
            .iter()
            .filter(|(_, consumed)| !consumed)
            .map(|(e, _)| *e)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }
}

// ─── Net ────────────────────────────────────────────────────────────

pub(crate) struct PrimEntry {
    pub prim: Box<dyn Primitive>,
    /// Index into the net's device table, for sensor-consuming
    /// primitives.
    pub device_slot: Option<usize>,
}

pub(crate) struct NetDevice {
    pub name: String,
    pub device: Weak<dyn Device>,
}

/// Result of one [`Net::step`].
#[derive(Debug)]
pub struct StepReport {
    pub state: NetState,
    pub events: heapless::Vec<EventId, MAX_EVENTS_PER_CYCLE>,
}

/// A compiled, executable dataflow network bound to one command.
pub struct Net {
    pub(crate) name: String,
    pub(crate) command: CommandId,
    pub(crate) prims: Vec<PrimEntry>,
    pub(crate) ports: PortStore,
    /// Topological evaluation order (primitive indices).
    pub(crate) order: Vec<u32>,
    /// Evaluation-order subset of primitives that consume sensor data.
    pub(crate) sensor_order: Vec<u32>,
    pub(crate) devices: Vec<NetDevice>,
    pub(crate) samples: Vec<DeviceSample>,
    pub(crate) watchers: Vec<Watcher>,
    pub(crate) handlers: Vec<(ExceptionKind, Effect)>,
    pub(crate) completion: Option<PortId>,
    pub(crate) latch: ExceptionLatch,
    pub(crate) pending_events: heapless::Vec<EventId, MAX_EVENTS_PER_CYCLE>,
    pub(crate) flags: NetFlags,
    pub(crate) state: NetState,
    pub(crate) fault: Option<PrimitiveFault>,
    pub(crate) cycle: u64,
    pub(crate) elapsed_s: f64,
}

impl Net {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> CommandId {
        self.command
    }

    pub fn state(&self) -> NetState {
        self.state
    }

    /// Cycles executed so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Elapsed net time [s].
    pub fn elapsed_s(&self) -> f64 {
        self.elapsed_s
    }

    pub fn primitive_count(&self) -> usize {
        self.prims.len()
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// The precomputed topological evaluation order.
    pub fn evaluation_order(&self) -> &[u32] {
        &self.order
    }

    /// Current value of a port (inspection/tests).
    pub fn port_value(&self, id: PortId) -> Option<&RtValue> {
        self.ports.value(id)
    }

    /// Request cooperative cancellation; observed by the cancel-sense
    /// primitive on the next cycle.
    pub fn request_cancel(&mut self) {
        self.flags.insert(NetFlags::CANCEL_REQUESTED);
    }

    pub fn flags(&self) -> NetFlags {
        self.flags
    }

    /// Latched exceptions no handler consumed.
    pub fn unconsumed_exceptions(&self) -> Vec<RtException> {
        self.latch.unconsumed().collect()
    }

    /// The programming fault that made this net `Fatal`, if any.
    pub fn fatal_fault(&self) -> Option<&PrimitiveFault> {
        self.fault.as_ref()
    }

    /// Execute one control cycle.
    ///
    /// `external_cancel` merges the owner's cancellation flag; once true
    /// it is latched for the life of the net. Stepping a terminal net is
    /// a no-op.
    pub fn step(&mut self, period_s: f64, external_cancel: bool) -> StepReport {
        if self.state.is_terminal() {
            return StepReport {
                state: self.state,
                events: heapless::Vec::new(),
            };
        }
        if self.state == NetState::Created {
            self.state = NetState::Running;
        }
        if external_cancel {
            self.flags.insert(NetFlags::CANCEL_REQUESTED);
        }

        // ═══ Phase 0: device sampling ═══
        for slot in 0..self.devices.len() {
            let upgraded = self.devices[slot].device.upgrade();
            match upgraded {
                Some(device) => self.samples[slot] = device.sample(),
                None => {
                    self.flags.insert(NetFlags::DEVICE_LOST);
                    self.latch_exception(ExceptionKind::DEVICE_UNAVAILABLE);
                }
            }
        }

        // ═══ Phase 1: sensor reads ═══
        for i in 0..self.sensor_order.len() {
            let idx = self.sensor_order[i] as usize;
            if let Some(slot) = self.prims[idx].device_slot {
                self.prims[idx].prim.read_sensor(&self.samples[slot]);
            }
        }

        // ═══ Phase 2: updates in topological order ═══
        let cycle = self.cycle + 1;
        let elapsed_s = cycle as f64 * period_s;
        {
            let cx = CycleContext {
                cycle,
                elapsed_s,
                period_s,
                cancelled: self.flags.contains(NetFlags::CANCEL_REQUESTED),
                latched: &self.latch,
            };
            for i in 0..self.order.len() {
                let idx = self.order[i] as usize;
                if let Err(fault) = self.prims[idx].prim.update(&mut self.ports, &cx) {
                    self.fault = Some(fault);
                    self.state = NetState::Fatal;
                    self.cycle = cycle;
                    self.elapsed_s = elapsed_s;
                    return StepReport {
                        state: self.state,
                        events: heapless::Vec::new(),
                    };
                }
            }
        }

        // ═══ Phase 3: watcher pass (all outputs final) ═══
        for i in 0..self.watchers.len() {
            let port = self.watchers[i].port;
            let value = self
                .ports
                .value(port)
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let rising = value && !self.watchers[i].prev;
            self.watchers[i].prev = value;
            if !value {
                continue;
            }
            match self.watchers[i].effect {
                Effect::Raise(kind) => self.latch_exception(kind),
                Effect::Cancel => {
                    self.flags.insert(NetFlags::CANCEL_REQUESTED);
                }
                Effect::Emit(id) => {
                    if rising {
                        let _ = self.pending_events.push(id);
                    }
                }
            }
        }

        let completion_now = self
            .completion
            .and_then(|p| self.ports.value(p))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        // Terminal resolution. A fault grants exactly one further cycle.
        if self.flags.contains(NetFlags::FAULT_LATCHED) {
            if self.flags.contains(NetFlags::POST_FAULT_RUN) {
                self.state = NetState::Faulted;
            } else {
                self.flags.insert(NetFlags::POST_FAULT_RUN);
            }
        } else if completion_now {
            self.state = if self.flags.contains(NetFlags::CANCEL_REQUESTED) {
                NetState::Cancelled
            } else {
                NetState::Completed
            };
        }

        // ═══ Phase 4: advance counters ═══
        self.cycle = cycle;
        self.elapsed_s = elapsed_s;

        let mut events = heapless::Vec::new();
        core::mem::swap(&mut events, &mut self.pending_events);
        StepReport {
            state: self.state,
            events,
        }
    }

    /// Latch an exception, coalescing by {kind, command}. A registered
    /// handler consumes it and fires its effect; otherwise the net is
    /// marked faulting.
    fn latch_exception(&mut self, kind: ExceptionKind) {
        let exception = RtException::new(kind, self.command);
        if self.latch.contains(&exception) {
            return;
        }
        if !self.latch.insert(exception) {
            // Latch saturated; fail towards Faulted rather than dropping.
            self.flags.insert(NetFlags::FAULT_LATCHED);
            return;
        }
        match self.handlers.iter().find(|(k, _)| *k == kind).map(|(_, e)| *e) {
            Some(effect) => {
                self.latch.consume(&exception);
                match effect {
                    Effect::Raise(chained) => self.latch_exception(chained),
                    Effect::Cancel => {
                        self.flags.insert(NetFlags::CANCEL_REQUESTED);
                    }
                    Effect::Emit(id) => {
                        let _ = self.pending_events.push(id);
                    }
                }
            }
            None => {
                self.flags.insert(NetFlags::FAULT_LATCHED);
            }
        }
    }
}

impl fmt::Debug for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Net")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("state", &self.state)
            .field("cycle", &self.cycle)
            .field("primitives", &self.prims.len())
            .field("ports", &self.ports.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcm_common::error::CommandId;

    #[test]
    fn latch_coalesces_by_value() {
        let mut latch = ExceptionLatch::default();
        let a = RtException::new(ExceptionKind::TIMEOUT, CommandId(1));
        assert!(latch.insert(a));
        assert!(!latch.insert(a));
        assert_eq!(latch.len(), 1);

        // Same kind, different command: distinct.
        let b = RtException::new(ExceptionKind::TIMEOUT, CommandId(2));
        assert!(latch.insert(b));
        assert_eq!(latch.len(), 2);
    }

    #[test]
    fn latch_consume_tracking() {
        let mut latch = ExceptionLatch::default();
        let a = RtException::new(ExceptionKind::TIMEOUT, CommandId(1));
        let b = RtException::new(ExceptionKind::POSITION_BOUND, CommandId(1));
        latch.insert(a);
        latch.insert(b);
        latch.consume(&a);

        let unconsumed: Vec<_> = latch.unconsumed().collect();
        assert_eq!(unconsumed, vec![b]);
        // Consumed exceptions still count as active for sensing.
        assert!(latch.contains_kind(ExceptionKind::TIMEOUT));
    }

    #[test]
    fn latch_capacity() {
        let mut latch = ExceptionLatch::default();
        for k in 0..MAX_NET_EXCEPTIONS as u16 {
            assert!(latch.insert(RtException::new(ExceptionKind(k), CommandId(1))));
        }
        assert!(latch.is_full());
        assert!(!latch.insert(RtException::new(ExceptionKind(999), CommandId(1))));
    }

    #[test]
    fn net_state_terminality() {
        assert!(!NetState::Created.is_terminal());
        assert!(!NetState::Running.is_terminal());
        assert!(NetState::Completed.is_terminal());
        assert!(NetState::Cancelled.is_terminal());
        assert!(NetState::Faulted.is_terminal());
        assert!(NetState::Fatal.is_terminal());
    }
}
