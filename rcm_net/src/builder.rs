//! `NetBuilder`: wiring, fragment merging, validation and the build
//! pass.
//!
//! Builders are cheap, independent port/primitive arenas. The fragment
//! compiler constructs many small builders and merges them into one via
//! [`NetBuilder::merge_bound`], which renames designated ports of the
//! absorbed builder onto existing ports of the subsuming one.
//!
//! [`NetBuilder::build`] is the single compile-time gate: it resolves
//! device dependencies against the registries, runs `check_parameters`
//! on every primitive exactly once, and computes the topological
//! evaluation order (dependency cycles are rejected here).

use std::collections::HashMap;

use tracing::debug;

use rcm_common::device::DeviceSample;
use rcm_common::error::{CommandId, ExceptionKind, MappingError};
use rcm_common::value::ValueType;

use crate::net::{Effect, ExceptionLatch, Net, NetDevice, NetFlags, NetState, PrimEntry, Watcher};
use crate::port::{PortId, PortStore};
use crate::primitive::Primitive;
use crate::registry::{DeviceRegistry, InterfaceRegistry};

/// Port-id translation produced by a merge.
#[derive(Debug, Clone)]
pub struct PortRemap {
    table: Vec<PortId>,
    /// Index offset applied to the absorbed builder's primitives.
    pub prim_offset: u32,
}

impl PortRemap {
    /// Translate a port id of the absorbed builder into the subsuming
    /// builder's namespace.
    pub fn port(&self, p: PortId) -> PortId {
        self.table.get(p.0 as usize).copied().unwrap_or(p)
    }
}

/// An under-construction dataflow network.
pub struct NetBuilder {
    name: String,
    port_types: Vec<ValueType>,
    writers: Vec<Option<u32>>,
    prims: Vec<Box<dyn Primitive>>,
    watchers: Vec<(PortId, Effect)>,
    handlers: Vec<(ExceptionKind, Effect)>,
    completion: Option<PortId>,
}

impl NetBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port_types: Vec::new(),
            writers: Vec::new(),
            prims: Vec::new(),
            watchers: Vec::new(),
            handlers: Vec::new(),
            completion: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port_count(&self) -> usize {
        self.port_types.len()
    }

    pub fn primitive_count(&self) -> usize {
        self.prims.len()
    }

    /// Allocate a port cell of the given type.
    pub fn port(&mut self, ty: ValueType) -> PortId {
        let id = PortId(self.port_types.len() as u32);
        self.port_types.push(ty);
        self.writers.push(None);
        id
    }

    /// Declared type of a port.
    pub fn port_type(&self, id: PortId) -> Option<ValueType> {
        self.port_types.get(id.0 as usize).copied()
    }

    fn check_port(
        &self,
        context: &'static str,
        id: PortId,
        expected: ValueType,
    ) -> Result<(), MappingError> {
        match self.port_types.get(id.0 as usize) {
            None => Err(MappingError::PortOutOfRange {
                context,
                port: id.0,
            }),
            Some(&ty) if ty != expected => Err(MappingError::PortType {
                context,
                expected,
                found: ty,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Add a primitive, validating its declared wiring: every referenced
    /// port must exist with a matching type, and every output port gains
    /// this primitive as its single writer.
    pub fn add(&mut self, prim: impl Primitive + 'static) -> Result<u32, MappingError> {
        self.add_boxed(Box::new(prim))
    }

    pub fn add_boxed(&mut self, prim: Box<dyn Primitive>) -> Result<u32, MappingError> {
        let index = self.prims.len() as u32;
        let context = prim.type_name();
        let spec = prim.ports();
        for &(id, ty) in &spec.inputs {
            self.check_port(context, id, ty)?;
        }
        for &(id, ty) in &spec.outputs {
            self.check_port(context, id, ty)?;
            let slot = &mut self.writers[id.0 as usize];
            if slot.is_some() {
                return Err(MappingError::MultipleWriters {
                    context,
                    port: id.0,
                });
            }
            *slot = Some(index);
        }
        self.prims.push(prim);
        Ok(index)
    }

    /// Attach a watcher: when the boolean port is true after a cycle's
    /// updates, the effect fires.
    pub fn watch(&mut self, port: PortId, effect: Effect) -> Result<(), MappingError> {
        self.check_port("watcher", port, ValueType::Bool)?;
        self.watchers.push((port, effect));
        Ok(())
    }

    /// Register an exception handler: a latched exception of this kind is
    /// consumed and fires the effect instead of faulting the net.
    pub fn handle(&mut self, kind: ExceptionKind, effect: Effect) {
        self.handlers.push((kind, effect));
    }

    /// Designate the boolean port whose truth completes the net.
    pub fn set_completion(&mut self, port: PortId) -> Result<(), MappingError> {
        self.check_port("completion", port, ValueType::Bool)?;
        self.completion = Some(port);
        Ok(())
    }

    /// Absorb another builder. `bindings` renames ports of `other` onto
    /// existing ports of `self` (output-to-input wiring); all remaining
    /// ports are appended. Returns the id translation.
    pub fn merge_bound(
        &mut self,
        other: NetBuilder,
        bindings: &[(PortId, PortId)],
    ) -> Result<PortRemap, MappingError> {
        let prim_offset = self.prims.len() as u32;

        let mut table = Vec::with_capacity(other.port_types.len());
        for (idx, &ty) in other.port_types.iter().enumerate() {
            let from = PortId(idx as u32);
            if let Some(&(_, to)) = bindings.iter().find(|(f, _)| *f == from) {
                self.check_port("merge", to, ty)?;
                table.push(to);
            } else {
                table.push(self.port(ty));
            }
        }
        let remap = PortRemap { table, prim_offset };

        // Move primitives across, translating their port ids.
        for mut prim in other.prims {
            prim.remap_ports(&mut |p| remap.port(p));
            self.prims.push(prim);
        }
        // Merge writer slots; a bound port must not gain a second writer.
        for (port_idx, writer) in other.writers.iter().enumerate() {
            if let Some(w) = writer {
                let target = remap.port(PortId(port_idx as u32));
                let slot = &mut self.writers[target.0 as usize];
                if slot.is_some() {
                    return Err(MappingError::MultipleWriters {
                        context: "merge",
                        port: target.0,
                    });
                }
                *slot = Some(w + prim_offset);
            }
        }

        for (port, effect) in other.watchers {
            self.watchers.push((remap.port(port), effect));
        }
        self.handlers.extend(other.handlers);
        if self.completion.is_none() {
            self.completion = other.completion.map(|p| remap.port(p));
        }

        Ok(remap)
    }

    /// Finish the net: resolve devices, check parameters once, compute
    /// the topological evaluation order.
    pub fn build(
        mut self,
        command: CommandId,
        devices: &DeviceRegistry,
        interfaces: &InterfaceRegistry,
    ) -> Result<Net, MappingError> {
        // Device resolution, deduplicated by name.
        let mut device_table: Vec<NetDevice> = Vec::new();
        let mut device_slots: HashMap<String, usize> = HashMap::new();
        let mut prim_slots: Vec<Option<usize>> = Vec::with_capacity(self.prims.len());

        for prim in &mut self.prims {
            let dep = prim.device_dependency().cloned();
            match dep {
                Some(dep) => {
                    let slot = match device_slots.get(&dep.device) {
                        Some(&slot) => slot,
                        None => {
                            let weak = devices.lookup(&dep.device, &dep.interfaces, interfaces)?;
                            let slot = device_table.len();
                            device_table.push(NetDevice {
                                name: dep.device.clone(),
                                device: weak,
                            });
                            device_slots.insert(dep.device.clone(), slot);
                            slot
                        }
                    };
                    // Re-check capabilities for every dependency on a
                    // shared device, then hand over the handle.
                    let weak = devices.lookup(&dep.device, &dep.interfaces, interfaces)?;
                    prim.bind_device(weak);
                    prim_slots.push(Some(slot));
                }
                None => prim_slots.push(None),
            }
        }

        // Parameter validation: once per primitive, after device binding.
        for prim in &self.prims {
            prim.check_parameters()?;
        }

        // Dependency edges: writer → reader.
        let n = self.prims.len();
        let mut indegree = vec![0usize; n];
        let mut successors: Vec<Vec<u32>> = vec![Vec::new(); n];
        for (i, prim) in self.prims.iter().enumerate() {
            for (id, _) in prim.ports().inputs {
                if let Some(w) = self.writers[id.0 as usize] {
                    if w as usize != i {
                        successors[w as usize].push(i as u32);
                        indegree[i] += 1;
                    }
                }
            }
        }

        // Kahn with a min-index ready set: deterministic order for
        // structurally identical builders.
        let mut ready: std::collections::BTreeSet<u32> = indegree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 0)
            .map(|(i, _)| i as u32)
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &succ in &successors[next as usize] {
                indegree[succ as usize] -= 1;
                if indegree[succ as usize] == 0 {
                    ready.insert(succ);
                }
            }
        }
        if order.len() < n {
            let stuck = (0..n)
                .find(|&i| indegree[i] > 0)
                .map(|i| self.prims[i].type_name().to_string())
                .unwrap_or_default();
            return Err(MappingError::DependencyCycle(stuck));
        }

        let sensor_order: Vec<u32> = order
            .iter()
            .copied()
            .filter(|&i| self.prims[i as usize].needs_sensor())
            .collect();

        debug!(
            net = %self.name,
            primitives = n,
            ports = self.port_types.len(),
            devices = device_table.len(),
            "net built"
        );

        let samples = vec![DeviceSample::default(); device_table.len()];
        Ok(Net {
            name: self.name,
            command,
            prims: self
                .prims
                .into_iter()
                .zip(prim_slots)
                .map(|(prim, device_slot)| PrimEntry { prim, device_slot })
                .collect(),
            ports: PortStore::from_types(&self.port_types),
            order,
            sensor_order,
            devices: device_table,
            samples,
            watchers: self
                .watchers
                .into_iter()
                .map(|(port, effect)| Watcher {
                    port,
                    effect,
                    prev: false,
                })
                .collect(),
            handlers: self.handlers,
            completion: self.completion,
            latch: ExceptionLatch::default(),
            pending_events: heapless::Vec::new(),
            flags: NetFlags::empty(),
            state: NetState::Created,
            fault: None,
            cycle: 0,
            elapsed_s: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{BinaryDouble, BoolLatch, Constant};
    use rcm_common::ops::BinaryOp;
    use rcm_common::value::RtValue;

    fn empty_registries() -> (DeviceRegistry, InterfaceRegistry) {
        (DeviceRegistry::new(), InterfaceRegistry::new())
    }

    #[test]
    fn wire_and_build() {
        let mut b = NetBuilder::new("t");
        let a = b.port(ValueType::Double);
        let c = b.port(ValueType::Double);
        let sum = b.port(ValueType::Double);
        b.add(Constant::new(RtValue::Double(1.0), a)).unwrap();
        b.add(Constant::new(RtValue::Double(2.0), c)).unwrap();
        b.add(BinaryDouble::new(BinaryOp::Add, a, c, sum)).unwrap();

        let (devs, ifaces) = empty_registries();
        let mut net = b.build(CommandId(1), &devs, &ifaces).unwrap();
        net.step(0.001, false);
        assert_eq!(net.port_value(sum), Some(&RtValue::Double(3.0)));
    }

    #[test]
    fn unconnected_input_reads_default() {
        let mut b = NetBuilder::new("t");
        let a = b.port(ValueType::Double); // no writer
        let c = b.port(ValueType::Double);
        let sum = b.port(ValueType::Double);
        b.add(Constant::new(RtValue::Double(5.0), c)).unwrap();
        b.add(BinaryDouble::new(BinaryOp::Add, a, c, sum)).unwrap();

        let (devs, ifaces) = empty_registries();
        let mut net = b.build(CommandId(1), &devs, &ifaces).unwrap();
        net.step(0.001, false);
        assert_eq!(net.port_value(sum), Some(&RtValue::Double(5.0)));
    }

    #[test]
    fn second_writer_rejected() {
        let mut b = NetBuilder::new("t");
        let out = b.port(ValueType::Double);
        b.add(Constant::new(RtValue::Double(1.0), out)).unwrap();
        let err = b.add(Constant::new(RtValue::Double(2.0), out)).unwrap_err();
        assert!(matches!(err, MappingError::MultipleWriters { .. }));
    }

    #[test]
    fn port_type_mismatch_rejected() {
        let mut b = NetBuilder::new("t");
        let out = b.port(ValueType::Bool);
        let err = b.add(Constant::new(RtValue::Double(1.0), out)).unwrap_err();
        assert!(matches!(err, MappingError::PortType { .. }));
    }

    #[test]
    fn dependency_cycle_rejected() {
        let mut b = NetBuilder::new("t");
        let x = b.port(ValueType::Double);
        let y = b.port(ValueType::Double);
        b.add(BinaryDouble::new(BinaryOp::Add, y, y, x)).unwrap();
        b.add(BinaryDouble::new(BinaryOp::Add, x, x, y)).unwrap();

        let (devs, ifaces) = empty_registries();
        let err = b.build(CommandId(1), &devs, &ifaces).unwrap_err();
        assert!(matches!(err, MappingError::DependencyCycle(_)));
    }

    #[test]
    fn evaluation_order_is_deterministic() {
        let build = || {
            let mut b = NetBuilder::new("t");
            let p: Vec<_> = (0..4).map(|_| b.port(ValueType::Double)).collect();
            let sum = b.port(ValueType::Double);
            for (i, &port) in p.iter().enumerate() {
                b.add(Constant::new(RtValue::Double(i as f64), port)).unwrap();
            }
            b.add(BinaryDouble::new(BinaryOp::Add, p[0], p[3], sum))
                .unwrap();
            let (devs, ifaces) = empty_registries();
            b.build(CommandId(1), &devs, &ifaces).unwrap()
        };
        let n1 = build();
        let n2 = build();
        assert_eq!(n1.evaluation_order(), n2.evaluation_order());
    }

    #[test]
    fn merge_bound_renames_ports() {
        // Inner fragment: latch an externally provided boolean.
        let mut inner = NetBuilder::new("frag");
        let ext_in = inner.port(ValueType::Bool);
        let latched = inner.port(ValueType::Bool);
        inner.add(BoolLatch::new(ext_in, latched)).unwrap();

        // Outer: a constant true feeds the fragment input.
        let mut outer = NetBuilder::new("t");
        let t = outer.port(ValueType::Bool);
        outer.add(Constant::new(RtValue::Bool(true), t)).unwrap();
        let remap = outer.merge_bound(inner, &[(ext_in, t)]).unwrap();
        let latched_out = remap.port(latched);

        let (devs, ifaces) = empty_registries();
        let mut net = outer.build(CommandId(1), &devs, &ifaces).unwrap();
        net.step(0.001, false);
        assert_eq!(net.port_value(latched_out), Some(&RtValue::Bool(true)));
    }

    #[test]
    fn merge_bound_type_mismatch_rejected() {
        let mut inner = NetBuilder::new("frag");
        let ext_in = inner.port(ValueType::Bool);
        let out = inner.port(ValueType::Bool);
        inner.add(BoolLatch::new(ext_in, out)).unwrap();

        let mut outer = NetBuilder::new("t");
        let d = outer.port(ValueType::Double);
        let err = outer.merge_bound(inner, &[(ext_in, d)]).unwrap_err();
        assert!(matches!(err, MappingError::PortType { .. }));
    }
}
