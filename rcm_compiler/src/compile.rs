//! The fragment compiler and `compile_command`.
//!
//! `FragmentCompiler` lowers value nodes bottom-up into one shared
//! `NetBuilder`. Compilation is memoized per `NodeId`; together with the
//! graph's hash-consing this gives structural deduplication — compiling
//! two occurrences of value-equal subtrees produces exactly one fragment
//! instance.
//!
//! `compile_command` walks a command's action and every watcher
//! condition, wires each condition's boolean output into the net's
//! watcher table (evaluated in the same per-cycle pass as ordinary
//! dataflow, after all outputs are final) and finishes the net through
//! the single build gate.

use std::collections::HashMap;

use tracing::debug;

use rcm_common::device::{channels, interfaces};
use rcm_common::error::{ConfigError, MappingError};
use rcm_common::ops::{BoolOp, CmpOp};
use rcm_common::value::RtValue;
use rcm_net::builder::NetBuilder;
use rcm_net::net::Net;
use rcm_net::port::PortId;
use rcm_net::primitives::ActuatorWrite;
use rcm_net::registry::{DeviceRegistry, InterfaceRegistry, PrimitiveRegistry};

use crate::command::{Action, Command};
use crate::graph::{NodeId, ValueGraph};
use crate::mapper::{MapperCtx, MapperRegistry};

/// Everything the compiler needs: the populated registries.
pub struct CompilerEnv<'a> {
    pub devices: &'a DeviceRegistry,
    pub interfaces: &'a InterfaceRegistry,
    pub primitives: &'a PrimitiveRegistry,
    pub mappers: &'a MapperRegistry,
}

impl<'a> CompilerEnv<'a> {
    fn mapper_ctx(&self) -> MapperCtx<'a> {
        MapperCtx {
            devices: self.devices,
            interfaces: self.interfaces,
            primitives: self.primitives,
        }
    }
}

// ─── FragmentCompiler ───────────────────────────────────────────────

/// Lowers value nodes into one shared builder, memoized per node.
pub struct FragmentCompiler<'a> {
    env: &'a CompilerEnv<'a>,
    builder: NetBuilder,
    memo: HashMap<NodeId, PortId>,
}

impl<'a> FragmentCompiler<'a> {
    pub fn new(env: &'a CompilerEnv<'a>, name: impl Into<String>) -> Self {
        Self {
            env,
            builder: NetBuilder::new(name),
            memo: HashMap::new(),
        }
    }

    /// Compile `root` (children first, memoized) and return the port its
    /// value appears on in the shared builder.
    pub fn compile(&mut self, graph: &ValueGraph, root: NodeId) -> Result<PortId, MappingError> {
        if let Some(&port) = self.memo.get(&root) {
            return Ok(port);
        }

        // Iterative post-order over the arena; children always carry
        // smaller ids than their parent, so this terminates.
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if self.memo.contains_key(&id) {
                continue;
            }
            if !expanded {
                stack.push((id, true));
                for child in graph.kind(id).children() {
                    if !self.memo.contains_key(&child) {
                        stack.push((child, false));
                    }
                }
                continue;
            }

            let ctx = self.env.mapper_ctx();
            let fragment = self.env.mappers.build_fragment(&ctx, graph, id)?;
            let children = graph.kind(id).children();
            if fragment.inputs.len() != children.len() {
                return Err(MappingError::Arity {
                    context: "fragment inputs",
                    expected: children.len(),
                    found: fragment.inputs.len(),
                });
            }
            let mut bindings = Vec::with_capacity(children.len());
            for (fragment_input, child) in fragment.inputs.iter().zip(&children) {
                let child_port = self
                    .memo
                    .get(child)
                    .copied()
                    .ok_or_else(|| MappingError::DependencyCycle("value graph".to_string()))?;
                bindings.push((*fragment_input, child_port));
            }
            let outputs = fragment.outputs.clone();
            let remap = self.builder.merge_bound(fragment.net, &bindings)?;
            let out = outputs
                .first()
                .map(|&p| remap.port(p))
                .ok_or(MappingError::Arity {
                    context: "fragment outputs",
                    expected: 1,
                    found: 0,
                })?;
            self.memo.insert(id, out);
        }

        self.memo
            .get(&root)
            .copied()
            .ok_or_else(|| MappingError::DependencyCycle("value graph".to_string()))
    }

    /// Direct access to the shared builder (action lowering).
    pub fn builder_mut(&mut self) -> &mut NetBuilder {
        &mut self.builder
    }

    pub fn finish(self) -> NetBuilder {
        self.builder
    }
}

// ─── Command compiler ───────────────────────────────────────────────

enum LoweredAction {
    Simple {
        completion: NodeId,
    },
    Drive {
        device: String,
        completion: NodeId,
        enable: NodeId,
        setpoint: NodeId,
    },
}

fn lower_action(action: &Action, graph: &mut ValueGraph) -> Result<LoweredAction, MappingError> {
    match action {
        Action::Wait { seconds } => {
            if !seconds.is_finite() || *seconds <= 0.0 {
                return Err(ConfigError::ParameterOutOfRange {
                    primitive: "action::wait",
                    parameter: "seconds",
                    detail: format!("{seconds} (must be finite and > 0)"),
                }
                .into());
            }
            let clock = graph.clock();
            let limit = graph.constant(RtValue::Double(*seconds));
            let completion = graph.compare(CmpOp::Ge, clock, limit, 0.0)?;
            Ok(LoweredAction::Simple { completion })
        }
        Action::Drive {
            device,
            setpoint,
            complete_when,
        } => {
            let cancel = graph.cancel_requested();
            let enable = graph.not_(cancel)?;
            let completion = match complete_when {
                Some(condition) => graph.bool_combine(BoolOp::Or, *condition, cancel)?,
                None => cancel,
            };
            Ok(LoweredAction::Drive {
                device: device.clone(),
                completion,
                enable,
                setpoint: *setpoint,
            })
        }
    }
}

/// Compile a command into one executable net.
pub fn compile_command(command: &Command, env: &CompilerEnv<'_>) -> Result<Net, MappingError> {
    // Action lowering adds nodes; work on a copy of the command's graph.
    let mut graph = command.values().clone();
    let lowered = lower_action(command.action(), &mut graph)?;

    let mut compiler = FragmentCompiler::new(env, command.name());

    let completion_port = match &lowered {
        LoweredAction::Simple { completion } => compiler.compile(&graph, *completion)?,
        LoweredAction::Drive {
            device,
            completion,
            enable,
            setpoint,
        } => {
            // Precondition: the device must accept actuator commands.
            env.devices
                .lookup(device, &[interfaces::ACTUATOR], env.interfaces)?;
            let completion_port = compiler.compile(&graph, *completion)?;
            let enable_port = compiler.compile(&graph, *enable)?;
            let setpoint_port = compiler.compile(&graph, *setpoint)?;
            compiler.builder_mut().add(ActuatorWrite::new(
                device.clone(),
                channels::TARGET,
                enable_port,
                setpoint_port,
            ))?;
            completion_port
        }
    };

    // Every condition's boolean output joins the net's watcher table so
    // it is evaluated inside the same per-cycle pass as the dataflow.
    for (condition, effect) in command.watchers() {
        let port = compiler.compile(&graph, *condition)?;
        compiler.builder_mut().watch(port, *effect)?;
    }

    let mut builder = compiler.finish();
    builder.set_completion(completion_port)?;
    for (kind, effect) in command.handlers() {
        builder.handle(*kind, *effect);
    }

    debug!(
        command = %command.id(),
        name = command.name(),
        primitives = builder.primitive_count(),
        ports = builder.port_count(),
        "command compiled"
    );
    builder.build(command.id(), env.devices, env.interfaces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcm_common::error::ExceptionKind;
    use rcm_common::ops::BinaryOp;

    struct Env {
        devices: DeviceRegistry,
        interfaces: InterfaceRegistry,
        primitives: PrimitiveRegistry,
        mappers: MapperRegistry,
    }

    impl Env {
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

    #[test]
    fn wait_command_compiles() {
        let setup = Env::new();
        let cmd = Command::new("wait", ValueGraph::new(), Action::Wait { seconds: 1.0 });
        let net = compile_command(&cmd, &setup.env()).unwrap();
        // Clock, constant, compare.
        assert_eq!(net.primitive_count(), 3);
    }

    #[test]
    fn non_positive_wait_rejected() {
        let setup = Env::new();
        let cmd = Command::new("wait", ValueGraph::new(), Action::Wait { seconds: 0.0 });
        let err = compile_command(&cmd, &setup.env()).unwrap_err();
        assert!(matches!(
            err,
            MappingError::Config(ConfigError::ParameterOutOfRange { .. })
        ));
    }

    #[test]
    fn shared_subtrees_compile_once() {
        let setup = Env::new();
        let mut g = ValueGraph::new();
        // Two structurally equal conditions built independently.
        let clock_a = g.clock();
        let limit_a = g.constant(RtValue::Double(0.5));
        let sum_a = g.combined(BinaryOp::Add, clock_a, limit_a).unwrap();
        let cond_a = g.compare(CmpOp::Gt, sum_a, limit_a, 0.0).unwrap();

        let clock_b = g.clock();
        let limit_b = g.constant(RtValue::Double(0.5));
        let sum_b = g.combined(BinaryOp::Add, clock_b, limit_b).unwrap();
        let cond_b = g.compare(CmpOp::Gt, sum_b, limit_b, 0.0).unwrap();
        assert_eq!(cond_a, cond_b);

        let mut cmd = Command::new("dedup", g, Action::Wait { seconds: 1.0 });
        cmd.raise_when(cond_a, ExceptionKind::TIMEOUT);
        cmd.raise_when(cond_b, ExceptionKind::POSITION_BOUND);

        let net = compile_command(&cmd, &setup.env()).unwrap();
        // Action: clock + limit(1.0) + compare = 3. Conditions share the
        // action's clock and add: limit(0.5) + add + compare = 3 more.
        assert_eq!(net.primitive_count(), 6);
    }

    #[test]
    fn topological_order_stable_across_compilations() {
        let setup = Env::new();
        let build = || {
            let mut g = ValueGraph::new();
            let clock = g.clock();
            let limit = g.constant(RtValue::Double(0.1));
            let cond = g.compare(CmpOp::Gt, clock, limit, 0.0).unwrap();
            let mut cmd = Command::new("stable", g, Action::Wait { seconds: 1.0 });
            cmd.raise_when(cond, ExceptionKind::TIMEOUT);
            compile_command(&cmd, &setup.env()).unwrap()
        };
        let a = build();
        let b = build();
        assert_eq!(a.evaluation_order(), b.evaluation_order());
        assert_eq!(a.primitive_count(), b.primitive_count());
    }

    #[test]
    fn unmapped_extension_kind_fails() {
        let setup = Env::new();
        let mut g = ValueGraph::new();
        let ext = g.extension(
            "vendor::mystery",
            vec![],
            None,
            rcm_common::value::ValueType::Bool,
        );
        let mut cmd = Command::new("ext", g, Action::Wait { seconds: 1.0 });
        cmd.cancel_when(ext);
        let err = compile_command(&cmd, &setup.env()).unwrap_err();
        assert!(matches!(err, MappingError::NoMapper(_)));
    }
}
