//! End-to-end: build a command, compile it, run the net.

use std::sync::Arc;

use rcm_common::device::{channels, interfaces};
use rcm_common::error::{CommandId, ConfigError, ExceptionKind, MappingError, RtException};
use rcm_common::ops::{BoolOp, CmpOp};
use rcm_common::value::RtValue;
use rcm_compiler::command::{Action, Command};
use rcm_compiler::compile::{CompilerEnv, compile_command};
use rcm_compiler::graph::ValueGraph;
use rcm_compiler::mapper::MapperRegistry;
use rcm_engine::executor::run_inline;
use rcm_net::devices::SimulatedWheel;
use rcm_net::net::{EventId, NetState};
use rcm_net::registry::{DeviceRegistry, InterfaceRegistry, PrimitiveRegistry};

const PERIOD_S: f64 = 0.001;

struct Setup {
    devices: DeviceRegistry,
    interfaces: InterfaceRegistry,
    primitives: PrimitiveRegistry,
    mappers: MapperRegistry,
}

impl Setup {
    fn new() -> Self {
        Self {
            devices: DeviceRegistry::new(),
            interfaces: InterfaceRegistry::new(),
            primitives: PrimitiveRegistry::with_builtins(),
            mappers: MapperRegistry::with_builtins(),
        }
    }

    fn env(&self) -> CompilerEnv<'_> {
        CompilerEnv {
            devices: &self.devices,
            interfaces: &self.interfaces,
            primitives: &self.primitives,
            mappers: &self.mappers,
        }
    }
}

/// Scenario A: a 2 s wait with an "elapsed > 0.189 s" exception guard
/// faults at cycle ⌈0.189 / period⌉ and aggregates exactly one inner
/// exception. With a 2 ms period the ceiling is exact: ⌈94.5⌉ = 95.
#[test]
fn wait_with_timeout_guard_faults() {
    let setup = Setup::new();
    let mut g = ValueGraph::new();
    let clock = g.clock();
    let limit = g.constant(RtValue::Double(0.189));
    let guard = g.compare(CmpOp::Gt, clock, limit, 0.0).unwrap();

    let mut cmd = Command::new("guarded-wait", g, Action::Wait { seconds: 2.0 });
    cmd.raise_when(guard, ExceptionKind::TIMEOUT);
    let command_id = cmd.id();

    let net = compile_command(&cmd, &setup.env()).unwrap();
    let (outcome, _) = run_inline(net, 0.002, 10_000);

    assert_eq!(outcome.status, NetState::Faulted);
    // Fault latched on cycle 95, one post-fault cycle, stopped at 96.
    assert_eq!(outcome.cycles, 96);
    assert_eq!(
        outcome.exceptions,
        vec![RtException::new(ExceptionKind::TIMEOUT, command_id)]
    );
    let aggregate = outcome.unhandled().expect("aggregate failure");
    assert_eq!(aggregate.exceptions.len(), 1);
}

/// Scenario A at a 1 ms period. 189 × 0.001 rounds to exactly 0.189 in
/// binary, so the strict guard first holds one cycle past the exact
/// boundary; the fault lands within one cycle of the ceiling.
#[test]
fn wait_with_timeout_guard_faults_1ms() {
    let setup = Setup::new();
    let mut g = ValueGraph::new();
    let clock = g.clock();
    let limit = g.constant(RtValue::Double(0.189));
    let guard = g.compare(CmpOp::Gt, clock, limit, 0.0).unwrap();

    let mut cmd = Command::new("guarded-wait-1ms", g, Action::Wait { seconds: 2.0 });
    cmd.raise_when(guard, ExceptionKind::TIMEOUT);

    let net = compile_command(&cmd, &setup.env()).unwrap();
    let (outcome, _) = run_inline(net, PERIOD_S, 10_000);

    assert_eq!(outcome.status, NetState::Faulted);
    assert_eq!(outcome.exceptions.len(), 1);
    // Latch cycle + one post-fault cycle.
    assert!((190..=191).contains(&outcome.cycles), "cycles = {}", outcome.cycles);
}

/// Scenario B: a device reporting position 1.0 / velocity 0.5 is seen
/// exactly on the cycle after the update.
#[test]
fn wheel_feedback_visible_next_cycle() {
    let setup = Setup::new();
    let wheel = Arc::new(SimulatedWheel::new("wheel"));
    wheel.set_state(1.0, 0.5);
    setup.devices.register("wheel", wheel.clone()).unwrap();

    let mut g = ValueGraph::new();
    let position = g.device_sensor("wheel", interfaces::POSITION_SENSOR, channels::POSITION);
    let velocity = g.device_sensor("wheel", interfaces::VELOCITY_SENSOR, channels::VELOCITY);
    let expect_pos = g.constant(RtValue::Double(1.0));
    let expect_vel = g.constant(RtValue::Double(0.5));
    // Exact comparison: sensor values pass through unmodified.
    let pos_ok = g.compare(CmpOp::Eq, position, expect_pos, 0.0).unwrap();
    let vel_ok = g.compare(CmpOp::Eq, velocity, expect_vel, 0.0).unwrap();
    let both = g.bool_combine(BoolOp::And, pos_ok, vel_ok).unwrap();

    let mut cmd = Command::new("monitor", g, Action::Wait { seconds: 0.01 });
    cmd.emit_when(both, EventId(1));

    let mut net = compile_command(&cmd, &setup.env()).unwrap();
    let report = net.step(PERIOD_S, false);
    assert_eq!(report.events.as_slice(), &[EventId(1)]);
}

/// Scenario C: requesting a capability the device lacks fails at compile
/// time with a configuration error.
#[test]
fn missing_capability_is_compile_error() {
    let setup = Setup::new();

    struct ErrorOnly;
    impl rcm_common::device::Device for ErrorOnly {
        fn name(&self) -> &str {
            "limited"
        }
        fn interfaces(&self) -> &[&'static str] {
            &[interfaces::ERROR_CODE]
        }
        fn sample(&self) -> rcm_common::device::DeviceSample {
            rcm_common::device::DeviceSample::new()
        }
    }
    setup.devices.register("limited", Arc::new(ErrorOnly)).unwrap();

    let mut g = ValueGraph::new();
    let position = g.device_sensor("limited", interfaces::POSITION_SENSOR, channels::POSITION);
    let limit = g.constant(RtValue::Double(1.0));
    let cond = g.compare(CmpOp::Gt, position, limit, 0.0).unwrap();

    let mut cmd = Command::new("bad-caps", g, Action::Wait { seconds: 1.0 });
    cmd.raise_when(cond, ExceptionKind::POSITION_BOUND);

    let err = compile_command(&cmd, &setup.env()).unwrap_err();
    assert!(matches!(
        err,
        MappingError::Config(ConfigError::MissingCapability { .. })
    ));
}

/// Same exception kind firing across many cycles coalesces into one
/// fault; two different kinds yield two.
#[test]
fn exception_coalescing_and_distinct_kinds() {
    let setup = Setup::new();
    let mut g = ValueGraph::new();
    let clock = g.clock();
    let limit = g.constant(RtValue::Double(0.002));
    let guard = g.compare(CmpOp::Gt, clock, limit, 0.0).unwrap();

    let mut cmd = Command::new("double-fault", g, Action::Wait { seconds: 1.0 });
    cmd.raise_when(guard, ExceptionKind::TIMEOUT);
    cmd.raise_when(guard, ExceptionKind::POSITION_BOUND);
    let command_id = cmd.id();

    let net = compile_command(&cmd, &setup.env()).unwrap();
    let (outcome, _) = run_inline(net, PERIOD_S, 100);

    assert_eq!(outcome.status, NetState::Faulted);
    assert_eq!(
        outcome.exceptions,
        vec![
            RtException::new(ExceptionKind::TIMEOUT, command_id),
            RtException::new(ExceptionKind::POSITION_BOUND, command_id),
        ]
    );
}

/// A handled exception cancels instead of faulting.
#[test]
fn handler_consumes_exception() {
    let setup = Setup::new();
    let mut g = ValueGraph::new();
    let clock = g.clock();
    let limit = g.constant(RtValue::Double(0.002));
    let guard = g.compare(CmpOp::Gt, clock, limit, 0.0).unwrap();

    let mut cmd = Command::new("handled", g, Action::Wait { seconds: 1.0 });
    cmd.raise_when(guard, ExceptionKind::TIMEOUT);
    cmd.handle(ExceptionKind::TIMEOUT, rcm_net::net::Effect::Cancel);

    let net = compile_command(&cmd, &setup.env()).unwrap();
    let (outcome, _) = run_inline(net, PERIOD_S, 100);

    assert_eq!(outcome.status, NetState::Cancelled);
    assert!(outcome.exceptions.is_empty());
    assert!(outcome.unhandled().is_none());
}

/// A drive action commands the device until cancellation, which also
/// completes the net as Cancelled.
#[test]
fn drive_action_until_cancel() {
    let setup = Setup::new();
    let wheel = Arc::new(SimulatedWheel::new("wheel"));
    setup.devices.register("wheel", wheel.clone()).unwrap();

    let mut g = ValueGraph::new();
    let setpoint = g.constant(RtValue::Double(0.5));
    let cmd = Command::new(
        "drive",
        g,
        Action::Drive {
            device: "wheel".to_string(),
            setpoint,
            complete_when: None,
        },
    );

    let mut net = compile_command(&cmd, &setup.env()).unwrap();

    // Runs while not cancelled; the setpoint reaches the device.
    assert_eq!(net.step(PERIOD_S, false).state, NetState::Running);
    assert_eq!(wheel.velocity(), 0.5);

    // Cancellation completes the drive.
    let mut state = net.step(PERIOD_S, true).state;
    if !state.is_terminal() {
        state = net.step(PERIOD_S, false).state;
    }
    assert_eq!(state, NetState::Cancelled);
}

/// Compiling against two different command instances keeps their
/// exception identities distinct.
#[test]
fn same_kind_different_commands_distinct() {
    let setup = Setup::new();

    let build = |name: &str| -> (CommandId, NetState, Vec<RtException>) {
        let mut g = ValueGraph::new();
        let clock = g.clock();
        let limit = g.constant(RtValue::Double(0.001));
        let guard = g.compare(CmpOp::Ge, clock, limit, 0.0).unwrap();
        let mut cmd = Command::new(name, g, Action::Wait { seconds: 1.0 });
        cmd.raise_when(guard, ExceptionKind::TIMEOUT);
        let id = cmd.id();
        let net = compile_command(&cmd, &setup.env()).unwrap();
        let (outcome, _) = run_inline(net, PERIOD_S, 100);
        (id, outcome.status, outcome.exceptions)
    };

    let (id_a, status_a, exc_a) = build("first");
    let (id_b, status_b, exc_b) = build("second");
    assert_eq!(status_a, NetState::Faulted);
    assert_eq!(status_b, NetState::Faulted);
    assert_ne!(id_a, id_b);
    assert_ne!(exc_a, exc_b);
    assert_eq!(exc_a[0].kind, exc_b[0].kind);
}
