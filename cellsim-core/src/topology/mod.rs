mod placement;
mod position;

pub use self::{
    placement::{ListPositionAllocator, PositionAllocator, UniformDiscPositionAllocator},
    position::Position,
};
pub use crate::id::{BaseStationId, Imsi, TerminalId};
use crate::{config::TopologyConfig, measure::Bandwidth};
use std::collections::BTreeMap;
use thiserror::Error;

/// A fixed radio access point.
///
/// Base stations are created once, while the scenario is set up, and are
/// never modified afterward. Use [`Topology::new_base_station`] to register
/// one.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseStation {
    id: BaseStationId,
    position: Position,
    bandwidth: Bandwidth,
    max_terminals: usize,
}

/// A mobile subscriber device.
///
/// The position is updated by the mobility collaborator. Which base station
/// serves the terminal is tracked by the [`AttachmentPolicy`].
///
/// [`AttachmentPolicy`]: crate::attachment::AttachmentPolicy
#[derive(Debug, Clone, PartialEq)]
pub struct Terminal {
    id: TerminalId,
    imsi: Imsi,
    position: Position,
}

impl BaseStation {
    #[inline]
    pub fn id(&self) -> BaseStationId {
        self.id
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.position
    }

    /// Capacity of the carrier.
    #[inline]
    pub fn bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    /// How many terminals may be attached at the same time.
    #[inline]
    pub fn max_terminals(&self) -> usize {
        self.max_terminals
    }
}

impl Terminal {
    #[inline]
    pub fn id(&self) -> TerminalId {
        self.id
    }

    #[inline]
    pub fn imsi(&self) -> Imsi {
        self.imsi
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.position
    }
}

/// Error returned when the [`Topology`] is queried or updated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    #[error("Base station ({id}) Not Found")]
    UnknownBaseStation { id: BaseStationId },
    #[error("Terminal ({id}) Not Found")]
    UnknownTerminal { id: TerminalId },
    #[error("Position {position} is not finite")]
    InvalidPosition { position: Position },
    #[error("Base station must accept at least one terminal")]
    ZeroCapacity,
}

/// Registry of every base station and terminal of the run.
///
/// Identifiers are assigned sequentially starting at `1`, and iteration
/// always follows identifier order so scans over the registry are
/// reproducible.
///
/// # Example
///
/// ```
/// use cellsim_core::topology::{Position, Topology};
///
/// let mut topology = Topology::default();
/// let enb = topology.add_base_station(Position::new(0.0, 0.0, 0.0)).unwrap();
/// let ue = topology.add_terminal(Position::new(30.0, 40.0, 0.0)).unwrap();
///
/// assert_eq!(topology.distance(ue, enb).unwrap(), 50.0);
/// ```
#[derive(Debug, Clone)]
pub struct Topology {
    config: TopologyConfig,

    base_stations: BTreeMap<BaseStationId, BaseStation>,
    terminals: BTreeMap<TerminalId, Terminal>,

    /// the last assigned IDs
    ///
    /// ID 0 is never handed out
    base_station_id: BaseStationId,
    terminal_id: TerminalId,
    next_imsi: Imsi,
}

/// Builder for a new base station.
///
/// Obtained via [`Topology::new_base_station`]. The bandwidth and admission
/// capacity default to the values of the [`TopologyConfig`].
pub struct BaseStationBuilder<'a> {
    position: Position,
    bandwidth: Bandwidth,
    max_terminals: usize,

    topology: &'a mut Topology,
}

impl BaseStationBuilder<'_> {
    pub fn set_bandwidth(mut self, bandwidth: Bandwidth) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    pub fn set_max_terminals(mut self, max_terminals: usize) -> Self {
        self.max_terminals = max_terminals;
        self
    }

    /// Register the base station and return its identifier.
    ///
    /// # Errors
    ///
    /// - [`TopologyError::InvalidPosition`] if a coordinate is NaN or infinite.
    /// - [`TopologyError::ZeroCapacity`] if `max_terminals` is `0`.
    pub fn build(self) -> Result<BaseStationId, TopologyError> {
        let Self {
            position,
            bandwidth,
            max_terminals,
            topology,
        } = self;

        if !position.is_finite() {
            return Err(TopologyError::InvalidPosition { position });
        }
        if max_terminals == 0 {
            return Err(TopologyError::ZeroCapacity);
        }

        topology.base_station_id = topology.base_station_id.next();
        let id = topology.base_station_id;
        topology.base_stations.insert(
            id,
            BaseStation {
                id,
                position,
                bandwidth,
                max_terminals,
            },
        );

        tracing::debug!(%id, %position, %bandwidth, "base station registered");

        Ok(id)
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::new(TopologyConfig::default())
    }
}

impl Topology {
    pub fn new(config: TopologyConfig) -> Self {
        Self {
            next_imsi: Imsi::new(config.first_imsi),
            config,
            base_stations: BTreeMap::new(),
            terminals: BTreeMap::new(),
            base_station_id: BaseStationId::ZERO,
            terminal_id: TerminalId::ZERO,
        }
    }

    /// Start registering a base station at `position`.
    pub fn new_base_station(&mut self, position: Position) -> BaseStationBuilder<'_> {
        BaseStationBuilder {
            position,
            bandwidth: self.config.default_bandwidth,
            max_terminals: self.config.default_max_terminals,
            topology: self,
        }
    }

    /// Register a base station with the default capacity.
    pub fn add_base_station(&mut self, position: Position) -> Result<BaseStationId, TopologyError> {
        self.new_base_station(position).build()
    }

    /// Register a terminal at its initial position.
    ///
    /// The terminal gets the next IMSI in sequence.
    pub fn add_terminal(&mut self, position: Position) -> Result<TerminalId, TopologyError> {
        if !position.is_finite() {
            return Err(TopologyError::InvalidPosition { position });
        }

        self.terminal_id = self.terminal_id.next();
        let id = self.terminal_id;
        let imsi = self.next_imsi;
        self.next_imsi = imsi.next();

        self.terminals.insert(id, Terminal { id, imsi, position });

        tracing::debug!(%id, %imsi, %position, "terminal registered");

        Ok(id)
    }

    /// Record the new position of a terminal.
    pub fn update_position(
        &mut self,
        terminal: TerminalId,
        position: Position,
    ) -> Result<(), TopologyError> {
        if !position.is_finite() {
            return Err(TopologyError::InvalidPosition { position });
        }
        let entry = self
            .terminals
            .get_mut(&terminal)
            .ok_or(TopologyError::UnknownTerminal { id: terminal })?;
        entry.position = position;

        tracing::trace!(%terminal, %position, "terminal moved");
        Ok(())
    }

    /// Straight line distance between a terminal and a base station.
    pub fn distance(
        &self,
        terminal: TerminalId,
        base_station: BaseStationId,
    ) -> Result<f64, TopologyError> {
        let terminal = self.terminal(terminal)?;
        let base_station = self.base_station(base_station)?;
        Ok(terminal.position.distance(&base_station.position))
    }

    pub fn base_station(&self, id: BaseStationId) -> Result<&BaseStation, TopologyError> {
        self.base_stations
            .get(&id)
            .ok_or(TopologyError::UnknownBaseStation { id })
    }

    pub fn terminal(&self, id: TerminalId) -> Result<&Terminal, TopologyError> {
        self.terminals
            .get(&id)
            .ok_or(TopologyError::UnknownTerminal { id })
    }

    /// All base stations, in identifier order.
    pub fn base_stations(&self) -> impl Iterator<Item = &BaseStation> {
        self.base_stations.values()
    }

    /// All terminals, in identifier order.
    pub fn terminals(&self) -> impl Iterator<Item = &Terminal> {
        self.terminals.values()
    }

    pub fn base_station_count(&self) -> usize {
        self.base_stations.len()
    }

    pub fn terminal_count(&self) -> usize {
        self.terminals.len()
    }
}
