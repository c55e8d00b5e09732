//! Network statistics.
//!
//! [`NetworkStats`] is a point-in-time snapshot of the radio network. Obtain
//! one via [`RadioNetwork::stats`](crate::network::RadioNetwork::stats).

use crate::{
    handover::{HandoverCounters, HandoverState},
    measure::Bandwidth,
    topology::{BaseStationId, Imsi, Position, TerminalId},
};

/// Snapshot of a single base station.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseStationStats {
    pub id: BaseStationId,
    pub position: Position,
    pub bandwidth: Bandwidth,
    pub max_terminals: usize,
    /// terminals currently attached
    pub attached: usize,
}

/// Snapshot of a single terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalStats {
    pub id: TerminalId,
    pub imsi: Imsi,
    pub position: Position,
    pub serving: Option<BaseStationId>,
    pub state: HandoverState,
    /// active dedicated bearers
    pub bearers: usize,
}

/// Point-in-time snapshot of the entire radio network.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkStats {
    /// In identifier order.
    pub base_stations: Vec<BaseStationStats>,
    /// In identifier order.
    pub terminals: Vec<TerminalStats>,
    pub handover: HandoverCounters,
    /// flows opened since the start of the run
    pub flows: usize,
}
