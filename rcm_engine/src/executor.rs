//! The cyclic multi-net executor.
//!
//! One executor thread paces itself at the configured period and steps
//! every live net per tick, in admission order. Nets are submitted from
//! any thread and observed through [`NetHandle`]s: cooperative
//! cancellation, event polling, and blocking on the terminal
//! [`NetOutcome`].
//!
//! Fault containment: a net reaching `Fatal` (primitive programming
//! fault) or `Faulted` (unhandled real-time exception) is retired at the
//! end of its own cycle; other nets and the registries are untouched.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use rcm_common::config::EngineConfig;
use rcm_common::error::{ConfigError, PrimitiveFault, RtException, UnhandledExceptions};
use rcm_net::net::{EventId, Net, NetState};

use crate::rt::{self, Pacer, RtError};
use crate::stats::CycleStats;

// ─── Errors ─────────────────────────────────────────────────────────

/// Executor lifecycle errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rt(#[from] RtError),

    #[error("executor thread spawn failed: {0}")]
    Spawn(String),

    #[error("executor is already running")]
    AlreadyRunning,

    #[error("executor is not running")]
    NotRunning,

    #[error("net limit reached ({max} live nets)")]
    Saturated { max: usize },
}

// ─── Outcome & handle ───────────────────────────────────────────────

/// Terminal result of one net, published through its handle.
#[derive(Debug, Clone, PartialEq)]
pub struct NetOutcome {
    pub status: NetState,
    /// Cycles the net executed.
    pub cycles: u64,
    /// Latched exceptions no handler consumed.
    pub exceptions: Vec<RtException>,
    /// Programming fault, for `Fatal` outcomes.
    pub fault: Option<PrimitiveFault>,
}

impl NetOutcome {
    /// The aggregate failure for a `Faulted` outcome.
    pub fn unhandled(&self) -> Option<UnhandledExceptions> {
        if self.status == NetState::Faulted && !self.exceptions.is_empty() {
            Some(UnhandledExceptions {
                exceptions: self.exceptions.clone(),
            })
        } else {
            None
        }
    }
}

struct NetShared {
    cancel: AtomicBool,
    state: Mutex<NetState>,
    outcome: Mutex<Option<NetOutcome>>,
    done: Condvar,
    events: Mutex<Vec<EventId>>,
}

/// Owner-side handle to a submitted net.
#[derive(Clone)]
pub struct NetHandle {
    shared: Arc<NetShared>,
}

impl std::fmt::Debug for NetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetHandle").finish_non_exhaustive()
    }
}

impl NetHandle {
    /// Request cooperative cancellation; takes effect on the net's next
    /// scheduled cycle.
    pub fn cancel(&self) {
        self.shared.cancel.store(true, Ordering::SeqCst);
    }

    pub fn state(&self) -> NetState {
        *self.shared.state.lock().expect("net state lock poisoned")
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Drain events emitted since the last poll.
    pub fn poll_events(&self) -> Vec<EventId> {
        let mut events = self.shared.events.lock().expect("net events lock poisoned");
        std::mem::take(&mut *events)
    }

    /// Block until the net reaches a terminal state.
    pub fn wait(&self) -> NetOutcome {
        let mut guard = self
            .shared
            .outcome
            .lock()
            .expect("net outcome lock poisoned");
        loop {
            if let Some(outcome) = guard.as_ref() {
                return outcome.clone();
            }
            guard = self
                .shared
                .done
                .wait(guard)
                .expect("net outcome lock poisoned");
        }
    }

    /// Block until the net terminates or the timeout elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<NetOutcome> {
        let guard = self
            .shared
            .outcome
            .lock()
            .expect("net outcome lock poisoned");
        let (guard, _) = self
            .shared
            .done
            .wait_timeout_while(guard, timeout, |outcome| outcome.is_none())
            .expect("net outcome lock poisoned");
        guard.clone()
    }
}

// ─── Executor ───────────────────────────────────────────────────────

struct Submission {
    net: Net,
    shared: Arc<NetShared>,
}

struct ExecutorShared {
    running: AtomicBool,
    inbox: Mutex<Vec<Submission>>,
    /// Queued + active nets, bounded by `max_nets`.
    live_count: AtomicUsize,
    stats: Mutex<CycleStats>,
}

/// The cyclic executor. Owns one scheduler thread for the life of the
/// process (or until [`Executor::shutdown`]).
pub struct Executor {
    config: EngineConfig,
    shared: Arc<ExecutorShared>,
    thread: Option<JoinHandle<()>>,
}

impl Executor {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config,
            shared: Arc::new(ExecutorShared {
                running: AtomicBool::new(false),
                inbox: Mutex::new(Vec::new()),
                live_count: AtomicUsize::new(0),
                stats: Mutex::new(CycleStats::new()),
            }),
            thread: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start the scheduler thread.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.thread.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        self.shared.running.store(true, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let thread = std::thread::Builder::new()
            .name("rcm-cycle".to_string())
            .spawn(move || cycle_loop(&config, &shared))
            .map_err(|e| EngineError::Spawn(e.to_string()))?;
        self.thread = Some(thread);
        info!(
            cycle_time_us = self.config.cycle_time_us,
            max_nets = self.config.max_nets,
            "executor started"
        );
        Ok(())
    }

    /// Submit a net for cyclic execution. It is admitted at the next
    /// tick boundary.
    pub fn submit(&self, net: Net) -> Result<NetHandle, EngineError> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return Err(EngineError::NotRunning);
        }
        let live = self.shared.live_count.fetch_add(1, Ordering::SeqCst);
        if live >= self.config.max_nets {
            self.shared.live_count.fetch_sub(1, Ordering::SeqCst);
            return Err(EngineError::Saturated {
                max: self.config.max_nets,
            });
        }
        let shared = Arc::new(NetShared {
            cancel: AtomicBool::new(false),
            state: Mutex::new(NetState::Created),
            outcome: Mutex::new(None),
            done: Condvar::new(),
            events: Mutex::new(Vec::new()),
        });
        debug!(net = %net.name(), command = %net.command(), "net submitted");
        self.shared
            .inbox
            .lock()
            .expect("executor inbox lock poisoned")
            .push(Submission {
                net,
                shared: Arc::clone(&shared),
            });
        Ok(NetHandle { shared })
    }

    /// Snapshot of the tick timing statistics.
    pub fn stats(&self) -> CycleStats {
        self.shared
            .stats
            .lock()
            .expect("executor stats lock poisoned")
            .clone()
    }

    /// Stop the scheduler thread. Nets still live get their current
    /// (possibly non-terminal) state published so waiters unblock.
    pub fn shutdown(&mut self) {
        if self.thread.is_none() {
            return;
        }
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("executor thread panicked");
            }
        }
        info!("executor stopped");
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ─── Scheduler loop ─────────────────────────────────────────────────

fn outcome_of(net: &Net) -> NetOutcome {
    NetOutcome {
        status: net.state(),
        cycles: net.cycle(),
        exceptions: net.unconsumed_exceptions(),
        fault: net.fatal_fault().cloned(),
    }
}

fn publish(shared: &NetShared, outcome: NetOutcome) {
    *shared.state.lock().expect("net state lock poisoned") = outcome.status;
    let mut guard = shared.outcome.lock().expect("net outcome lock poisoned");
    *guard = Some(outcome);
    shared.done.notify_all();
}

fn cycle_loop(config: &EngineConfig, shared: &ExecutorShared) {
    if let Err(e) = rt::rt_setup(config.cpu_core, config.rt_priority) {
        warn!("RT setup failed: {e}; continuing without RT scheduling");
    }
    let mut pacer = match Pacer::new(config.cycle_period()) {
        Ok(pacer) => pacer,
        Err(e) => {
            error!("pacer init failed: {e}");
            shared.running.store(false, Ordering::SeqCst);
            return;
        }
    };
    let period_s = config.cycle_period_s();
    let budget_ns = config.cycle_period().as_nanos() as i64;
    let mut active: Vec<Submission> = Vec::with_capacity(config.max_nets);

    while shared.running.load(Ordering::SeqCst) {
        let latency_ns = pacer.wait_next();
        let tick_start = Instant::now();

        // Admit newly submitted nets at the tick boundary, in
        // submission order.
        {
            let mut inbox = shared.inbox.lock().expect("executor inbox lock poisoned");
            active.append(&mut inbox);
        }

        // Step every live net; terminal nets are retired in place.
        active.retain_mut(|sub| {
            let cancel = sub.shared.cancel.load(Ordering::SeqCst);
            let report = sub.net.step(period_s, cancel);
            if !report.events.is_empty() {
                sub.shared
                    .events
                    .lock()
                    .expect("net events lock poisoned")
                    .extend(report.events.iter().copied());
            }
            if report.state.is_terminal() {
                debug!(
                    net = %sub.net.name(),
                    state = %report.state,
                    cycles = sub.net.cycle(),
                    "net retired"
                );
                publish(&sub.shared, outcome_of(&sub.net));
                shared.live_count.fetch_sub(1, Ordering::SeqCst);
                false
            } else {
                *sub.shared.state.lock().expect("net state lock poisoned") = report.state;
                true
            }
        });

        let duration_ns = tick_start.elapsed().as_nanos() as i64;
        shared
            .stats
            .lock()
            .expect("executor stats lock poisoned")
            .record(duration_ns, latency_ns, budget_ns);
    }

    // Shutdown: unblock every waiter with the net's current state.
    let leftovers = {
        let mut inbox = shared.inbox.lock().expect("executor inbox lock poisoned");
        active.append(&mut inbox);
        active
    };
    for sub in leftovers {
        publish(&sub.shared, outcome_of(&sub.net));
        shared.live_count.fetch_sub(1, Ordering::SeqCst);
    }
}

// ─── Inline runner ──────────────────────────────────────────────────

/// Step a single net to a terminal state without pacing (tests,
/// tooling). Returns the outcome and every event emitted along the way.
///
/// Stops after `max_cycles` even if the net is still running; the
/// outcome then carries the non-terminal state.
pub fn run_inline(mut net: Net, period_s: f64, max_cycles: u64) -> (NetOutcome, Vec<EventId>) {
    let mut events = Vec::new();
    let mut cycles = 0;
    while !net.state().is_terminal() && cycles < max_cycles {
        let report = net.step(period_s, false);
        events.extend(report.events.iter().copied());
        cycles += 1;
    }
    (outcome_of(&net), events)
}
