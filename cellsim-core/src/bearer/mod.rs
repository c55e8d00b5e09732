//! Dedicated bearers and their traffic filters.
//!
//! A bearer routes the packets matching its [`TrafficFilter`] through a
//! dedicated [`QosClass`]. Every packet of a terminal that matches no active
//! bearer is carried by the default bearer and classifies as
//! [`Classification::Default`].

mod filter;
mod qos;

pub use self::{
    filter::{Direction, PacketDirection, PacketFilter, PortRange, TrafficFilter},
    qos::QosClass,
};
pub use crate::id::BearerId;
use crate::topology::{TerminalId, Topology, TopologyError};
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
};
use thiserror::Error;

/// A dedicated bearer of one terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bearer {
    id: BearerId,
    terminal: TerminalId,
    qos: QosClass,
    filter: TrafficFilter,
}

/// Result of [`BearerRegistry::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Bearer(BearerId),
    #[default]
    Default,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BearerError {
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(
        "Terminal ({terminal}): packet filter {filter:?} overlaps a filter of bearer ({existing})"
    )]
    DuplicateFilter {
        terminal: TerminalId,
        existing: BearerId,
        filter: PacketFilter,
    },
    #[error("A bearer needs at least one packet filter")]
    EmptyFilter,
    #[error("Bearer ({id}) Not Found")]
    UnknownBearer { id: BearerId },
}

impl Bearer {
    #[inline]
    pub fn id(&self) -> BearerId {
        self.id
    }

    #[inline]
    pub fn terminal(&self) -> TerminalId {
        self.terminal
    }

    #[inline]
    pub fn qos(&self) -> QosClass {
        self.qos
    }

    #[inline]
    pub fn filter(&self) -> &TrafficFilter {
        &self.filter
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(id) => write!(f, "bearer ({id})"),
            Self::Default => f.write_str("default bearer"),
        }
    }
}

/// Active dedicated bearers of every terminal.
///
/// # Example
///
/// ```
/// use cellsim_core::{
///     bearer::{
///         BearerRegistry, Classification, Direction, PacketDirection, PacketFilter, PortRange,
///         QosClass, TrafficFilter,
///     },
///     topology::{Position, Topology},
/// };
///
/// let mut topology = Topology::default();
/// let ue = topology.add_terminal(Position::ORIGIN).unwrap();
///
/// let mut bearers = BearerRegistry::new();
/// let video = bearers
///     .activate_bearer(
///         &topology,
///         ue,
///         QosClass::NgbrVideoTcpDefault,
///         TrafficFilter::new()
///             .with(PacketFilter::new(Direction::Downlink).with_local(PortRange::single(1000))),
///     )
///     .unwrap();
///
/// let class = bearers.classify(ue, 80, 1000, PacketDirection::Downlink);
/// assert_eq!(class, Classification::Bearer(video));
/// ```
#[derive(Debug, Clone)]
pub struct BearerRegistry {
    bearers: BTreeMap<BearerId, Bearer>,

    /// active bearers of every terminal, in activation order
    by_terminal: HashMap<TerminalId, Vec<BearerId>>,

    /// the last assigned ID
    bearer_id: BearerId,
}

impl Default for BearerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BearerRegistry {
    pub fn new() -> Self {
        Self {
            bearers: BTreeMap::new(),
            by_terminal: HashMap::new(),
            bearer_id: BearerId::ZERO,
        }
    }

    /// Activate a dedicated bearer for `terminal`.
    ///
    /// # Errors
    ///
    /// - [`BearerError::EmptyFilter`] if `filter` has no packet filter.
    /// - [`BearerError::DuplicateFilter`] if a packet filter overlaps one of
    ///   another active bearer of the same terminal.
    /// - [`BearerError::Topology`] if the terminal is not registered.
    pub fn activate_bearer(
        &mut self,
        topology: &Topology,
        terminal: TerminalId,
        qos: QosClass,
        filter: TrafficFilter,
    ) -> Result<BearerId, BearerError> {
        topology.terminal(terminal)?;

        if filter.is_empty() {
            return Err(BearerError::EmptyFilter);
        }

        for existing in self.bearers_of(terminal) {
            if let Some(overlap) = filter.overlap(existing.filter()) {
                return Err(BearerError::DuplicateFilter {
                    terminal,
                    existing: existing.id(),
                    filter: *overlap,
                });
            }
        }

        self.bearer_id = self.bearer_id.next();
        let id = self.bearer_id;

        tracing::debug!(%id, %terminal, %qos, filters = filter.len(), "bearer activated");

        self.bearers.insert(
            id,
            Bearer {
                id,
                terminal,
                qos,
                filter,
            },
        );
        self.by_terminal.entry(terminal).or_default().push(id);

        Ok(id)
    }

    /// Remove a bearer. Packets it used to match fall back to the default
    /// bearer.
    pub fn deactivate_bearer(&mut self, id: BearerId) -> Result<Bearer, BearerError> {
        let bearer = self
            .bearers
            .remove(&id)
            .ok_or(BearerError::UnknownBearer { id })?;

        if let Some(ids) = self.by_terminal.get_mut(&bearer.terminal) {
            ids.retain(|active| *active != id);
            if ids.is_empty() {
                self.by_terminal.remove(&bearer.terminal);
            }
        }

        tracing::debug!(%id, terminal = %bearer.terminal, "bearer deactivated");

        Ok(bearer)
    }

    /// Remove every bearer of `terminal`, returning them in activation order.
    pub fn deactivate_all(&mut self, terminal: TerminalId) -> Vec<Bearer> {
        let ids = self.by_terminal.remove(&terminal).unwrap_or_default();

        if !ids.is_empty() {
            tracing::debug!(%terminal, count = ids.len(), "bearers torn down");
        }

        ids.into_iter()
            .filter_map(|id| self.bearers.remove(&id))
            .collect()
    }

    /// Find the bearer carrying a packet of `terminal`.
    ///
    /// Bearers are scanned in activation order and the first one with a
    /// matching packet filter wins.
    pub fn classify(
        &self,
        terminal: TerminalId,
        source_port: u16,
        destination_port: u16,
        direction: PacketDirection,
    ) -> Classification {
        let (local, remote) = direction.local_remote(source_port, destination_port);

        self.bearers_of(terminal)
            .find(|bearer| bearer.filter.matches(direction, local, remote))
            .map_or(Classification::Default, |bearer| {
                Classification::Bearer(bearer.id)
            })
    }

    pub fn bearer(&self, id: BearerId) -> Result<&Bearer, BearerError> {
        self.bearers
            .get(&id)
            .ok_or(BearerError::UnknownBearer { id })
    }

    /// Active bearers of `terminal`, in activation order.
    pub fn bearers_of(&self, terminal: TerminalId) -> impl Iterator<Item = &Bearer> {
        self.by_terminal
            .get(&terminal)
            .into_iter()
            .flatten()
            .filter_map(|id| self.bearers.get(id))
    }

    pub fn len(&self) -> usize {
        self.bearers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bearers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Position;

    fn downlink_port(port: u16) -> TrafficFilter {
        TrafficFilter::new()
            .with(PacketFilter::new(Direction::Downlink).with_local(PortRange::single(port)))
    }

    fn setup() -> (Topology, TerminalId, BearerRegistry) {
        let mut topology = Topology::default();
        let ue = topology.add_terminal(Position::ORIGIN).unwrap();
        (topology, ue, BearerRegistry::new())
    }

    #[test]
    fn default_registry_numbers_from_one() {
        let (topology, ue, _) = setup();
        let mut bearers = BearerRegistry::default();
        assert!(bearers.is_empty());

        let id = bearers
            .activate_bearer(&topology, ue, QosClass::default(), downlink_port(1000))
            .unwrap();
        assert_eq!(id, BearerId::ONE);
        assert_eq!(bearers.len(), 1);
    }

    #[test]
    fn classify_by_local_port() {
        let (topology, ue, mut bearers) = setup();
        let first = bearers
            .activate_bearer(&topology, ue, QosClass::default(), downlink_port(1000))
            .unwrap();
        let second = bearers
            .activate_bearer(&topology, ue, QosClass::default(), downlink_port(1001))
            .unwrap();

        assert_eq!(
            bearers.classify(ue, 49_153, 1000, PacketDirection::Downlink),
            Classification::Bearer(first)
        );
        assert_eq!(
            bearers.classify(ue, 49_153, 1001, PacketDirection::Downlink),
            Classification::Bearer(second)
        );
        assert_eq!(
            bearers.classify(ue, 49_153, 2000, PacketDirection::Downlink),
            Classification::Default
        );
        // uplink is not covered by a downlink filter
        assert_eq!(
            bearers.classify(ue, 1000, 49_153, PacketDirection::Uplink),
            Classification::Default
        );
    }

    #[test]
    fn first_activated_wins() {
        let (topology, ue, mut bearers) = setup();
        let uplink = bearers
            .activate_bearer(
                &topology,
                ue,
                QosClass::GbrConvVoice,
                TrafficFilter::new().with(PacketFilter::new(Direction::Uplink)),
            )
            .unwrap();
        let downlink = bearers
            .activate_bearer(
                &topology,
                ue,
                QosClass::NgbrIms,
                TrafficFilter::new().with(PacketFilter::new(Direction::Downlink)),
            )
            .unwrap();

        assert_eq!(
            bearers.classify(ue, 5, 6, PacketDirection::Uplink),
            Classification::Bearer(uplink)
        );
        assert_eq!(
            bearers.classify(ue, 5, 6, PacketDirection::Downlink),
            Classification::Bearer(downlink)
        );
    }

    #[test]
    fn deactivate_falls_back_to_default() {
        let (topology, ue, mut bearers) = setup();
        let id = bearers
            .activate_bearer(&topology, ue, QosClass::default(), downlink_port(1000))
            .unwrap();

        let removed = bearers.deactivate_bearer(id).unwrap();
        assert_eq!(removed.id(), id);
        assert_eq!(
            bearers.classify(ue, 80, 1000, PacketDirection::Downlink),
            Classification::Default
        );
        assert_eq!(
            bearers.deactivate_bearer(id),
            Err(BearerError::UnknownBearer { id })
        );
    }

    #[test]
    fn duplicate_filter_is_rejected() {
        let (topology, ue, mut bearers) = setup();
        let first = bearers
            .activate_bearer(&topology, ue, QosClass::default(), downlink_port(1000))
            .unwrap();

        let error = bearers
            .activate_bearer(
                &topology,
                ue,
                QosClass::NgbrIms,
                TrafficFilter::new().with(
                    PacketFilter::new(Direction::Bidirectional)
                        .with_local(PortRange::new(900, 1100).unwrap()),
                ),
            )
            .unwrap_err();

        assert!(matches!(
            error,
            BearerError::DuplicateFilter { existing, .. } if existing == first
        ));
        assert_eq!(bearers.len(), 1);
    }

    #[test]
    fn same_ports_opposite_direction_is_fine() {
        let (topology, ue, mut bearers) = setup();
        bearers
            .activate_bearer(&topology, ue, QosClass::default(), downlink_port(1000))
            .unwrap();

        bearers
            .activate_bearer(
                &topology,
                ue,
                QosClass::default(),
                TrafficFilter::new()
                    .with(PacketFilter::new(Direction::Uplink).with_local(PortRange::single(1000))),
            )
            .unwrap();
    }

    #[test]
    fn filters_of_other_terminals_do_not_conflict() {
        let (mut topology, ue1, mut bearers) = setup();
        let ue2 = topology.add_terminal(Position::ORIGIN).unwrap();

        bearers
            .activate_bearer(&topology, ue1, QosClass::default(), downlink_port(1000))
            .unwrap();
        let other = bearers
            .activate_bearer(&topology, ue2, QosClass::default(), downlink_port(1000))
            .unwrap();

        assert_eq!(
            bearers.classify(ue2, 80, 1000, PacketDirection::Downlink),
            Classification::Bearer(other)
        );
    }

    #[test]
    fn invalid_activation() {
        let (topology, ue, mut bearers) = setup();

        assert_eq!(
            bearers.activate_bearer(&topology, ue, QosClass::default(), TrafficFilter::new()),
            Err(BearerError::EmptyFilter)
        );
        assert!(matches!(
            bearers.activate_bearer(
                &topology,
                TerminalId::new(9),
                QosClass::default(),
                downlink_port(1000)
            ),
            Err(BearerError::Topology(TopologyError::UnknownTerminal { .. }))
        ));
        assert!(bearers.is_empty());
    }

    #[test]
    fn deactivate_all() {
        let (topology, ue, mut bearers) = setup();
        let a = bearers
            .activate_bearer(&topology, ue, QosClass::default(), downlink_port(1000))
            .unwrap();
        let b = bearers
            .activate_bearer(&topology, ue, QosClass::default(), downlink_port(1001))
            .unwrap();

        let removed: Vec<_> = bearers.deactivate_all(ue).iter().map(Bearer::id).collect();
        assert_eq!(removed, [a, b]);
        assert_eq!(bearers.bearers_of(ue).count(), 0);
        assert!(bearers.deactivate_all(ue).is_empty());
    }
}
