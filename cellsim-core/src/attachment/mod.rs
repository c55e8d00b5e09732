//! Which base station serves which terminal.
//!
//! The [`AttachmentPolicy`] owns the attachment log and answers "who serves
//! terminal T". Each successful attach or detach returns the
//! [`AttachmentEvent`]s it produced; the caller forwards them to the
//! [`HandoverStateMachine`]. That hand-off is the only link between the two
//! components.
//!
//! The policy never decides on its own when to re-evaluate an attachment.
//! The mobility or scheduling collaborator calls
//! [`attach_to_closest`](AttachmentPolicy::attach_to_closest) (or starts a
//! handover) on whatever cadence it controls.
//!
//! [`HandoverStateMachine`]: crate::handover::HandoverStateMachine

mod rnti;

pub use self::rnti::Rnti;
use self::rnti::RntiAllocator;
use crate::{
    time::SimTime,
    topology::{BaseStation, BaseStationId, TerminalId, Topology, TopologyError},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

/// How [`AttachmentPolicy::auto_attach`] picks a base station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttachmentMode {
    /// Every attachment names its base station explicitly.
    Manual,
    /// The closest base station with room left.
    #[default]
    Closest,
    /// Base stations take turns, in identifier order.
    RoundRobin,
    /// Fill base stations in identifier order, `per_base_station` terminals
    /// each.
    Block { per_base_station: usize },
}

/// Why an [`AttachmentRecord`] was appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachCause {
    /// The terminal was unattached.
    Initial,
    /// Detach-then-attach shortcut, bypassing the handover procedure.
    Reattach,
    /// Completion of a handover.
    Handover,
    /// Connection re-established after a failed handover.
    Reestablishment,
}

/// One entry of the append-only attachment log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentRecord {
    pub terminal: TerminalId,
    pub base_station: BaseStationId,
    pub rnti: Rnti,
    pub at: SimTime,
    pub cause: AttachCause,
}

/// Emitted for every successful attach or detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentEvent {
    Attached {
        terminal: TerminalId,
        base_station: BaseStationId,
        rnti: Rnti,
        at: SimTime,
    },
    Detached {
        terminal: TerminalId,
        base_station: BaseStationId,
        rnti: Rnti,
        at: SimTime,
    },
}

impl AttachmentEvent {
    fn attached(record: &AttachmentRecord) -> Self {
        Self::Attached {
            terminal: record.terminal,
            base_station: record.base_station,
            rnti: record.rnti,
            at: record.at,
        }
    }

    fn detached(record: &AttachmentRecord, at: SimTime) -> Self {
        Self::Detached {
            terminal: record.terminal,
            base_station: record.base_station,
            rnti: record.rnti,
            at,
        }
    }

    pub fn terminal(&self) -> TerminalId {
        match self {
            Self::Attached { terminal, .. } | Self::Detached { terminal, .. } => *terminal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttachError {
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error("Terminal ({terminal}) is already attached to base station ({base_station})")]
    AlreadyAttached {
        terminal: TerminalId,
        base_station: BaseStationId,
    },
    #[error("Terminal ({terminal}) is not attached")]
    NotAttached { terminal: TerminalId },
    #[error("No base station can accept terminal ({terminal})")]
    NoBaseStationAvailable { terminal: TerminalId },
    #[error("Base station ({base_station}) already serves its maximum of {max_terminals} terminals")]
    CapacityExceeded {
        base_station: BaseStationId,
        max_terminals: usize,
    },
    #[error("Base station ({base_station}) has no free RNTI")]
    RntiExhausted { base_station: BaseStationId },
    #[error("Terminal ({terminal}) needs an explicit base station, attachment mode is manual")]
    ManualMode { terminal: TerminalId },
}

/// Decides and records which base station each terminal is attached to.
///
/// # Example
///
/// ```
/// use cellsim_core::{
///     SimTime,
///     attachment::{AttachmentEvent, AttachmentPolicy},
///     topology::{Position, Topology},
/// };
///
/// let mut topology = Topology::default();
/// let enb1 = topology.add_base_station(Position::new(0.0, 0.0, 0.0)).unwrap();
/// let enb2 = topology.add_base_station(Position::new(10.0, 0.0, 0.0)).unwrap();
/// let ue = topology.add_terminal(Position::new(1.0, 0.0, 0.0)).unwrap();
///
/// let mut policy = AttachmentPolicy::default();
/// let events = policy.attach_to_closest(&topology, ue, SimTime::ZERO).unwrap();
/// assert!(matches!(events[..], [AttachmentEvent::Attached { .. }]));
/// assert_eq!(policy.serving(ue), Some(enb1));
/// # let _ = enb2;
/// ```
#[derive(Debug, Clone, Default)]
pub struct AttachmentPolicy {
    mode: AttachmentMode,

    log: Vec<AttachmentRecord>,

    /// index in `log` of the current attachment of every attached terminal
    current: HashMap<TerminalId, usize>,

    served: BTreeMap<BaseStationId, BTreeSet<TerminalId>>,

    rntis: HashMap<BaseStationId, RntiAllocator>,

    /// next base station index for [`AttachmentMode::RoundRobin`]
    round_robin: usize,
}

impl AttachmentPolicy {
    pub fn new(mode: AttachmentMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> AttachmentMode {
        self.mode
    }

    /// The base station currently serving `terminal`.
    pub fn serving(&self, terminal: TerminalId) -> Option<BaseStationId> {
        self.current(terminal).map(|record| record.base_station)
    }

    /// The most recent non-superseded record of `terminal`.
    pub fn current(&self, terminal: TerminalId) -> Option<&AttachmentRecord> {
        self.current.get(&terminal).map(|index| &self.log[*index])
    }

    /// Every record ever appended, oldest first.
    pub fn records(&self) -> &[AttachmentRecord] {
        &self.log
    }

    /// Number of terminals attached to `base_station`.
    pub fn load(&self, base_station: BaseStationId) -> usize {
        self.served.get(&base_station).map_or(0, BTreeSet::len)
    }

    /// Terminals attached to `base_station`, in identifier order.
    pub fn served_by(&self, base_station: BaseStationId) -> impl Iterator<Item = TerminalId> + '_ {
        self.served
            .get(&base_station)
            .into_iter()
            .flat_map(|terminals| terminals.iter().copied())
    }

    /// Attach an unattached terminal to `base_station`.
    ///
    /// # Errors
    ///
    /// - [`AttachError::AlreadyAttached`] if the terminal is attached. Use
    ///   [`reattach`](Self::reattach) for detach-then-attach semantics.
    /// - [`AttachError::CapacityExceeded`] if the base station is full.
    /// - [`AttachError::Topology`] if either identifier is unknown.
    pub fn attach(
        &mut self,
        topology: &Topology,
        terminal: TerminalId,
        base_station: BaseStationId,
        at: SimTime,
    ) -> Result<Vec<AttachmentEvent>, AttachError> {
        topology.terminal(terminal)?;
        topology.base_station(base_station)?;

        if let Some(current) = self.serving(terminal) {
            return Err(AttachError::AlreadyAttached {
                terminal,
                base_station: current,
            });
        }

        let record = self.connect(topology, terminal, base_station, at, AttachCause::Initial)?;
        Ok(vec![AttachmentEvent::attached(&record)])
    }

    /// Attach `terminal` to `base_station`, detaching it first if needed.
    ///
    /// An attached terminal produces a `Detached` event followed by an
    /// `Attached` event, even when the base station does not change.
    pub fn reattach(
        &mut self,
        topology: &Topology,
        terminal: TerminalId,
        base_station: BaseStationId,
        at: SimTime,
    ) -> Result<Vec<AttachmentEvent>, AttachError> {
        topology.terminal(terminal)?;
        topology.base_station(base_station)?;

        if self.serving(terminal).is_none() {
            return self.attach(topology, terminal, base_station, at);
        }

        self.ensure_room(topology, terminal, base_station)?;
        self.ensure_rnti(terminal, base_station)?;
        let previous = self.disconnect(terminal);
        let record = self.connect(topology, terminal, base_station, at, AttachCause::Reattach)?;

        let mut events = Vec::with_capacity(2);
        if let Some(previous) = previous {
            events.push(AttachmentEvent::detached(&previous, at));
        }
        events.push(AttachmentEvent::attached(&record));
        Ok(events)
    }

    /// Detach `terminal` from its serving base station.
    pub fn detach(
        &mut self,
        topology: &Topology,
        terminal: TerminalId,
        at: SimTime,
    ) -> Result<AttachmentEvent, AttachError> {
        topology.terminal(terminal)?;

        let record = self
            .disconnect(terminal)
            .ok_or(AttachError::NotAttached { terminal })?;

        tracing::debug!(%terminal, base_station = %record.base_station, %at, "terminal detached");

        Ok(AttachmentEvent::detached(&record, at))
    }

    /// The closest base station that still has room for `terminal`.
    ///
    /// Base stations are scanned in identifier order and only a strictly
    /// smaller distance replaces the current best, so ties go to the lowest
    /// identifier.
    pub fn select_closest(
        &self,
        topology: &Topology,
        terminal: TerminalId,
    ) -> Result<BaseStationId, AttachError> {
        let position = topology.terminal(terminal)?.position();

        let mut best: Option<(f64, BaseStationId)> = None;
        for base_station in topology.base_stations() {
            if !self.has_room(base_station, terminal) {
                continue;
            }

            let distance = position.distance(&base_station.position());
            match best {
                Some((closest, _)) if distance >= closest => {}
                _ => best = Some((distance, base_station.id())),
            }
        }

        best.map(|(_, id)| id)
            .ok_or(AttachError::NoBaseStationAvailable { terminal })
    }

    /// Attach `terminal` to the closest base station.
    ///
    /// Nothing happens if it is already served by that base station. If it
    /// is served by another one it is re-pointed with
    /// [`reattach`](Self::reattach) semantics.
    pub fn attach_to_closest(
        &mut self,
        topology: &Topology,
        terminal: TerminalId,
        at: SimTime,
    ) -> Result<Vec<AttachmentEvent>, AttachError> {
        let target = self.select_closest(topology, terminal)?;

        match self.serving(terminal) {
            Some(current) if current == target => Ok(Vec::new()),
            Some(_) => self.reattach(topology, terminal, target, at),
            None => self.attach(topology, terminal, target, at),
        }
    }

    /// Attach an unattached terminal following the configured
    /// [`AttachmentMode`].
    pub fn auto_attach(
        &mut self,
        topology: &Topology,
        terminal: TerminalId,
        at: SimTime,
    ) -> Result<Vec<AttachmentEvent>, AttachError> {
        topology.terminal(terminal)?;
        if let Some(current) = self.serving(terminal) {
            return Err(AttachError::AlreadyAttached {
                terminal,
                base_station: current,
            });
        }

        let stations: Vec<&BaseStation> = topology.base_stations().collect();

        let (target, cursor) = match self.mode {
            AttachmentMode::Manual => return Err(AttachError::ManualMode { terminal }),
            AttachmentMode::Closest => (self.select_closest(topology, terminal)?, None),
            AttachmentMode::RoundRobin => {
                let count = stations.len();
                let index = (0..count)
                    .map(|offset| (self.round_robin + offset) % count)
                    .find(|index| self.has_room(stations[*index], terminal))
                    .ok_or(AttachError::NoBaseStationAvailable { terminal })?;
                (stations[index].id(), Some((index + 1) % count))
            }
            AttachmentMode::Block { per_base_station } => {
                let station = stations
                    .iter()
                    .find(|station| {
                        self.load(station.id()) < per_base_station
                            && self.has_room(station, terminal)
                    })
                    .ok_or(AttachError::NoBaseStationAvailable { terminal })?;
                (station.id(), None)
            }
        };

        let events = self.attach(topology, terminal, target, at)?;
        if let Some(cursor) = cursor {
            self.round_robin = cursor;
        }
        Ok(events)
    }

    /// Move an attached terminal to `base_station` without emitting any
    /// [`AttachmentEvent`].
    ///
    /// Used when the handover procedure itself drives the change (handover
    /// completion, re-establishment after a failure). A new RNTI is
    /// allocated even if the base station does not change.
    pub fn repoint(
        &mut self,
        topology: &Topology,
        terminal: TerminalId,
        base_station: BaseStationId,
        at: SimTime,
        cause: AttachCause,
    ) -> Result<AttachmentRecord, AttachError> {
        topology.terminal(terminal)?;
        topology.base_station(base_station)?;

        if self.serving(terminal).is_none() {
            return Err(AttachError::NotAttached { terminal });
        }

        self.ensure_room(topology, terminal, base_station)?;
        self.ensure_rnti(terminal, base_station)?;
        self.disconnect(terminal);
        self.connect(topology, terminal, base_station, at, cause)
    }

    fn has_room(&self, base_station: &BaseStation, terminal: TerminalId) -> bool {
        let load = self.served.get(&base_station.id()).map_or(0, |served| {
            served.len() - usize::from(served.contains(&terminal))
        });
        load < base_station.max_terminals()
    }

    fn ensure_room(
        &self,
        topology: &Topology,
        terminal: TerminalId,
        base_station: BaseStationId,
    ) -> Result<(), AttachError> {
        let station = topology.base_station(base_station)?;
        if self.has_room(station, terminal) {
            Ok(())
        } else {
            Err(AttachError::CapacityExceeded {
                base_station,
                max_terminals: station.max_terminals(),
            })
        }
    }

    /// A terminal already served by `base_station` gives its RNTI back
    /// before asking for a new one.
    fn ensure_rnti(
        &self,
        terminal: TerminalId,
        base_station: BaseStationId,
    ) -> Result<(), AttachError> {
        let exhausted = self
            .rntis
            .get(&base_station)
            .is_some_and(RntiAllocator::is_exhausted);
        if exhausted && self.serving(terminal) != Some(base_station) {
            Err(AttachError::RntiExhausted { base_station })
        } else {
            Ok(())
        }
    }

    fn connect(
        &mut self,
        topology: &Topology,
        terminal: TerminalId,
        base_station: BaseStationId,
        at: SimTime,
        cause: AttachCause,
    ) -> Result<AttachmentRecord, AttachError> {
        self.ensure_room(topology, terminal, base_station)?;

        let rnti = self
            .rntis
            .entry(base_station)
            .or_insert_with(RntiAllocator::new)
            .allocate()
            .ok_or(AttachError::RntiExhausted { base_station })?;

        let record = AttachmentRecord {
            terminal,
            base_station,
            rnti,
            at,
            cause,
        };
        self.log.push(record);
        self.current.insert(terminal, self.log.len() - 1);
        self.served.entry(base_station).or_default().insert(terminal);

        tracing::debug!(%terminal, %base_station, %rnti, %at, ?cause, "terminal attached");

        Ok(record)
    }

    fn disconnect(&mut self, terminal: TerminalId) -> Option<AttachmentRecord> {
        let index = self.current.remove(&terminal)?;
        let record = self.log[index];

        if let Some(served) = self.served.get_mut(&record.base_station) {
            served.remove(&terminal);
        }
        if let Some(pool) = self.rntis.get_mut(&record.base_station) {
            pool.release(record.rnti);
        }

        Some(record)
    }
}
