//! # RCM Demo Runner
//!
//! Compiles and executes a demo command against a simulated wheel:
//! drive at a constant velocity for a fixed duration, with a
//! position-bound exception guard and cooperative Ctrl-C cancellation.
//!
//! This binary is glue: it populates the registries the way a driver
//! stack would at startup, then hands everything to the compiler and the
//! cyclic executor.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use rcm_common::config::EngineConfig;
use rcm_common::device::{channels, interfaces};
use rcm_common::error::ExceptionKind;
use rcm_common::ops::CmpOp;
use rcm_common::value::RtValue;
use rcm_compiler::command::{Action, Command};
use rcm_compiler::compile::{CompilerEnv, compile_command};
use rcm_compiler::graph::ValueGraph;
use rcm_compiler::mapper::MapperRegistry;
use rcm_engine::executor::Executor;
use rcm_net::devices::SimulatedWheel;
use rcm_net::net::NetState;
use rcm_net::registry::{DeviceRegistry, InterfaceRegistry, PrimitiveRegistry};

/// RCM demo runner — drive a simulated wheel through the full
/// compile/execute pipeline.
#[derive(Parser, Debug)]
#[command(name = "rcm_main")]
#[command(version)]
#[command(about = "Compile and execute a demo command against a simulated wheel")]
struct Args {
    /// Path to the engine configuration TOML. Defaults are used when
    /// absent.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Demo drive duration [s].
    #[arg(long, default_value_t = 2.0)]
    duration: f64,

    /// Wheel velocity setpoint [units/s].
    #[arg(long, default_value_t = 0.25)]
    velocity: f64,

    /// Position bound that raises the guard exception [units].
    #[arg(long, default_value_t = 10.0)]
    position_bound: f64,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("rcm demo runner v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("rcm demo runner shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => {
            info!("Loading engine config from {}", path.display());
            EngineConfig::load(path)?
        }
        None => {
            warn!("No --config given; using defaults");
            EngineConfig::default()
        }
    };
    info!(
        "Config OK: cycle_time={}µs, max_nets={}",
        config.cycle_time_us, config.max_nets
    );

    // ── Registries, populated the way a driver stack would at init ──
    let devices = DeviceRegistry::new();
    let interfaces_registry = InterfaceRegistry::new();
    let primitives = PrimitiveRegistry::with_builtins();
    let mappers = MapperRegistry::with_builtins();

    let wheel = Arc::new(SimulatedWheel::new("wheel0"));
    devices.register("wheel0", wheel.clone())?;

    // ── Demo command ──
    let mut graph = ValueGraph::new();
    let clock = graph.clock();
    let duration = graph.constant(RtValue::Double(args.duration));
    let done = graph.compare(CmpOp::Ge, clock, duration, 0.0)?;
    let setpoint = graph.constant(RtValue::Double(args.velocity));
    let position = graph.device_sensor("wheel0", interfaces::POSITION_SENSOR, channels::POSITION);
    let bound = graph.constant(RtValue::Double(args.position_bound));
    let out_of_bounds = graph.compare(CmpOp::Gt, position, bound, 0.0)?;

    let mut command = Command::new(
        "demo-drive",
        graph,
        Action::Drive {
            device: "wheel0".to_string(),
            setpoint,
            complete_when: Some(done),
        },
    );
    command.raise_when(out_of_bounds, ExceptionKind::POSITION_BOUND);

    let env = CompilerEnv {
        devices: &devices,
        interfaces: &interfaces_registry,
        primitives: &primitives,
        mappers: &mappers,
    };
    let net = compile_command(&command, &env)?;
    info!(
        "Command compiled: {} primitives, {} ports",
        net.primitive_count(),
        net.port_count()
    );

    // ── Execute ──
    let mut executor = Executor::new(config.clone())?;
    executor.start()?;
    let handle = executor.submit(net)?;

    let cancel_handle = handle.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, cancelling command");
        cancel_handle.cancel();
    })?;

    // Tick the wheel simulation at the control rate until the command
    // terminates.
    let period = config.cycle_period();
    let outcome = loop {
        wheel.tick(config.cycle_period_s());
        if let Some(outcome) = handle.wait_timeout(period) {
            break outcome;
        }
    };

    match outcome.status {
        NetState::Completed => info!(
            "Command completed after {} cycles (wheel at {:.3})",
            outcome.cycles,
            wheel.position()
        ),
        NetState::Cancelled => info!("Command cancelled after {} cycles", outcome.cycles),
        NetState::Faulted => {
            if let Some(aggregate) = outcome.unhandled() {
                error!("Command faulted: {aggregate}");
            }
        }
        state => warn!("Command ended in state '{state}'"),
    }

    executor.shutdown();
    let stats = executor.stats();
    info!(
        "Executor stats: {} ticks, avg={}ns, max={}ns, overruns={}",
        stats.tick_count,
        stats.avg_tick_ns(),
        stats.max_tick_ns,
        stats.overruns
    );

    Ok(())
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
