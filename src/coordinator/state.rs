use crate::engine::{FirewallPolicy, SignalingEngine, TransportConfig};

/// Engine settings overridden while the tunnel is on, captured when it is
/// turned on and put back when it is turned off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestorePoint {
    pub transport: TransportConfig,
    pub firewall_policy: FirewallPolicy,
}

impl RestorePoint {
    pub(crate) fn capture(engine: &dyn SignalingEngine) -> Self {
        Self {
            transport: engine.transport_config(),
            firewall_policy: engine.firewall_policy(),
        }
    }
    pub(crate) fn restore(self, engine: &dyn SignalingEngine) {
        engine.set_transport_config(self.transport);
        engine.set_firewall_policy(self.firewall_policy);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Relay started, not yet reported connected.
    Connecting,
    /// Hooks installed and registration requested through the tunnel.
    Ready,
    /// Relay lost its connection; waiting for it to come back.
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disabled,
    Enabled { restore: RestorePoint, phase: Phase },
}

impl LinkState {
    pub fn is_enabled(&self) -> bool {
        matches!(self, LinkState::Enabled { .. })
    }
    pub fn phase(&self) -> Option<Phase> {
        match self {
            LinkState::Disabled => None,
            LinkState::Enabled { phase, .. } => Some(*phase),
        }
    }
    pub(crate) fn with_phase(self, phase: Phase) -> Self {
        match self {
            LinkState::Disabled => LinkState::Disabled,
            LinkState::Enabled { restore, .. } => LinkState::Enabled { restore, phase },
        }
    }
}
