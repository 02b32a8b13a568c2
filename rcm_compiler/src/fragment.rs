//! Fragments: independently built sub-networks with exposed ports.
//!
//! A fragment is the unit mappers produce: its own small `NetBuilder`
//! plus the ports it exposes. `inputs` are unconnected ports the parent
//! binds to child outputs when the fragment is absorbed (output-to-input
//! port renaming via `NetBuilder::merge_bound`); `outputs` are the ports
//! the fragment's value appears on.

use rcm_net::builder::NetBuilder;
use rcm_net::port::PortId;

/// A partially built sub-network.
pub struct Fragment {
    /// The fragment's own primitive/port arena.
    pub net: NetBuilder,
    /// External input ports, in child order; bound to child fragment
    /// outputs during composition.
    pub inputs: Vec<PortId>,
    /// Exposed output ports carrying the fragment's value(s).
    pub outputs: Vec<PortId>,
}

impl std::fmt::Debug for Fragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fragment")
            .field("net", &self.net.name())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}

impl Fragment {
    /// A leaf fragment with no external inputs.
    pub fn leaf(net: NetBuilder, outputs: Vec<PortId>) -> Self {
        Self {
            net,
            inputs: Vec::new(),
            outputs,
        }
    }

    pub fn new(net: NetBuilder, inputs: Vec<PortId>, outputs: Vec<PortId>) -> Self {
        Self {
            net,
            inputs,
            outputs,
        }
    }
}
