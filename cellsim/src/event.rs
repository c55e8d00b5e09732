//! Timed stimuli and the queue delivering them in order.

use cellsim_core::{
    SimTime,
    bearer::{BearerId, QosClass, TrafficFilter},
    defaults::DEFAULT_QOS_CLASS,
    handover::FailureReason,
    network::Packet,
    time::duration_str,
    topology::{BaseStationId, Position, TerminalId},
};
use core::cmp::Reverse;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BinaryHeap, time::Duration};

/// A stimulus applied to the [`RadioNetwork`] at a given simulated time.
///
/// [`RadioNetwork`]: cellsim_core::RadioNetwork
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// Report a new position of a terminal.
    Move {
        terminal: TerminalId,
        position: Position,
    },
    Attach {
        terminal: TerminalId,
        base_station: BaseStationId,
    },
    Reattach {
        terminal: TerminalId,
        base_station: BaseStationId,
    },
    AttachToClosest {
        terminal: TerminalId,
    },
    /// Attach every unattached terminal with the configured attachment mode.
    AutoAttachAll,
    Detach {
        terminal: TerminalId,
    },
    ConnectionEstablished {
        terminal: TerminalId,
        base_station: BaseStationId,
    },
    HandoverStart {
        terminal: TerminalId,
        target: BaseStationId,
    },
    HandoverEndOk {
        terminal: TerminalId,
    },
    HandoverFailure {
        terminal: TerminalId,
        reason: FailureReason,
    },
    ActivateBearer {
        terminal: TerminalId,
        #[serde(default = "default_qos")]
        qos: QosClass,
        filter: TrafficFilter,
    },
    DeactivateBearer {
        bearer: BearerId,
    },
    PacketSent {
        packet: Packet,
    },
    PacketReceived {
        packet: Packet,
        #[serde(with = "duration_str")]
        delay: Duration,
    },
}

fn default_qos() -> QosClass {
    DEFAULT_QOS_CLASS
}

impl Event {
    /// Short name of the event, as written in scenario files.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Move { .. } => "move",
            Self::Attach { .. } => "attach",
            Self::Reattach { .. } => "reattach",
            Self::AttachToClosest { .. } => "attach_to_closest",
            Self::AutoAttachAll => "auto_attach_all",
            Self::Detach { .. } => "detach",
            Self::ConnectionEstablished { .. } => "connection_established",
            Self::HandoverStart { .. } => "handover_start",
            Self::HandoverEndOk { .. } => "handover_end_ok",
            Self::HandoverFailure { .. } => "handover_failure",
            Self::ActivateBearer { .. } => "activate_bearer",
            Self::DeactivateBearer { .. } => "deactivate_bearer",
            Self::PacketSent { .. } => "packet_sent",
            Self::PacketReceived { .. } => "packet_received",
        }
    }
}

/// Events ordered by time, then by insertion order.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
    sequence: u64,
}

#[derive(Debug)]
struct Scheduled {
    at: SimTime,
    sequence: u64,
    event: Event,
}

impl Scheduled {
    fn key(&self) -> (SimTime, u64) {
        (self.at, self.sequence)
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Time of the next event, if any.
    #[inline]
    pub fn next_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|scheduled| scheduled.0.at)
    }

    pub fn push(&mut self, at: SimTime, event: Event) {
        let sequence = self.sequence;
        self.sequence += 1;
        self.heap.push(Reverse(Scheduled {
            at,
            sequence,
            event,
        }))
    }

    pub fn pop(&mut self) -> Option<(SimTime, Event)> {
        self.heap
            .pop()
            .map(|Reverse(scheduled)| (scheduled.at, scheduled.event))
    }

    /// Pop every event due at or before `time`, in delivery order.
    pub fn pop_all_elapsed(&mut self, time: SimTime) -> Vec<(SimTime, Event)> {
        let mut events = Vec::new();
        while self.next_time().is_some_and(|at| at <= time) {
            if let Some(event) = self.pop() {
                events.push(event);
            }
        }
        events
    }
}

impl Extend<(SimTime, Event)> for EventQueue {
    fn extend<I: IntoIterator<Item = (SimTime, Event)>>(&mut self, iter: I) {
        for (at, event) in iter {
            self.push(at, event);
        }
    }
}

impl FromIterator<(SimTime, Event)> for EventQueue {
    fn from_iter<I: IntoIterator<Item = (SimTime, Event)>>(iter: I) -> Self {
        let mut queue = Self::new();
        queue.extend(iter);
        queue
    }
}
