//! RT setup and drift-free cycle pacing.
//!
//! ## RT setup sequence
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)` — lock all pages.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity` — pin to an isolated CPU core.
//! 4. `sched_setscheduler(SCHED_FIFO, prio)` — RT priority.
//!
//! All RT system calls are gated behind the `rt` cargo feature; without
//! it they are no-ops and pacing falls back to `std::thread::sleep`,
//! which is adequate for simulation and tests.

use std::time::Duration;

use thiserror::Error;

/// RT setup or pacing failure.
#[derive(Debug, Error)]
pub enum RtError {
    #[error("RT setup error: {0}")]
    Setup(String),
}

/// Lock all current and future memory pages (prevent page faults in the
/// cycle loop). No-op without the `rt` feature.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), RtError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| RtError::Setup(format!("mlockall failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), RtError> {
    Ok(()) // No-op in simulation mode
}

/// Prefault stack pages so the cycle loop never page-faults.
fn prefault_stack() {
    // Touch 1 MB of stack to prefault pages.
    let mut buf = [0u8; 1024 * 1024];
    for byte in buf.iter_mut() {
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

/// Pin the current thread to a CPU core. No-op without the `rt` feature.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), RtError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| RtError::Setup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| RtError::Setup(format!("sched_setaffinity failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), RtError> {
    Ok(()) // No-op in simulation mode
}

/// Set SCHED_FIFO with the given priority. No-op without the `rt`
/// feature.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), RtError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(RtError::Setup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), RtError> {
    Ok(()) // No-op in simulation mode
}

/// Perform the full RT setup sequence for the calling thread.
///
/// Must run on the executor thread before its first tick. In simulation
/// mode (no `rt` feature) all RT calls are no-ops.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), RtError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Pacer ──────────────────────────────────────────────────────────

/// Absolute-time cycle pacing.
///
/// With the `rt` feature: `clock_nanosleep(TIMER_ABSTIME)` on
/// `CLOCK_MONOTONIC` for drift-free wakes. Without it: sleep for the
/// remaining slice of the period.
pub struct Pacer {
    period: Duration,
    #[cfg(feature = "rt")]
    next_wake: nix::sys::time::TimeSpec,
    #[cfg(not(feature = "rt"))]
    last_wake: std::time::Instant,
}

impl Pacer {
    pub fn new(period: Duration) -> Result<Self, RtError> {
        #[cfg(feature = "rt")]
        {
            use nix::time::{ClockId, clock_gettime};
            let now = clock_gettime(ClockId::CLOCK_MONOTONIC)
                .map_err(|e| RtError::Setup(format!("clock_gettime: {e}")))?;
            Ok(Self {
                period,
                next_wake: now,
            })
        }
        #[cfg(not(feature = "rt"))]
        {
            Ok(Self {
                period,
                last_wake: std::time::Instant::now(),
            })
        }
    }

    /// Sleep until the next cycle boundary. Returns the wake latency
    /// [ns] (time between expected and actual wake).
    pub fn wait_next(&mut self) -> i64 {
        #[cfg(feature = "rt")]
        {
            use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};
            let clock = ClockId::CLOCK_MONOTONIC;
            self.next_wake = timespec_add_ns(self.next_wake, self.period.as_nanos() as i64);
            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &self.next_wake);
            match clock_gettime(clock) {
                Ok(now) => timespec_diff_ns(&now, &self.next_wake).max(0),
                Err(_) => 0,
            }
        }
        #[cfg(not(feature = "rt"))]
        {
            let target = self.last_wake + self.period;
            let now = std::time::Instant::now();
            if let Some(remaining) = target.checked_duration_since(now) {
                std::thread::sleep(remaining);
            }
            let woke = std::time::Instant::now();
            self.last_wake = target;
            woke.saturating_duration_since(target).as_nanos() as i64
        }
    }
}

/// Add nanoseconds to a TimeSpec.
#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    while nanos < 0 {
        secs -= 1;
        nanos += 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

/// Compute the difference (a - b) in nanoseconds.
#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}
