use super::FailureReason;
use crate::{
    attachment::Rnti,
    time::SimTime,
    topology::{BaseStationId, TerminalId},
};
use serde::Serialize;

/// What a [`HandoverNotification`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// Unattached to connected.
    ConnectionEstablished,
    /// Connected again after a failed handover.
    ConnectionReestablished,
    HandoverStart,
    HandoverEndOk,
    HandoverFailure(FailureReason),
    Detached,
}

/// Emitted to the listeners on every transition of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoverNotification {
    pub terminal: TerminalId,
    pub kind: NotificationKind,
    /// base station the terminal leaves or was served by
    pub source: Option<BaseStationId>,
    /// base station the terminal joins or tries to join
    pub target: Option<BaseStationId>,
    /// the RNTI assigned by the new serving base station, when there is one
    pub rnti: Option<Rnti>,
    pub at: SimTime,
}

/// Running totals of the handover state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HandoverCounters {
    pub connections_established: u64,
    pub connections_reestablished: u64,
    pub handover_starts: u64,
    pub handover_successes: u64,
    pub no_preamble_response: u64,
    pub max_random_access_retries: u64,
    pub source_leaving_failures: u64,
    pub target_joining_failures: u64,
    pub detaches: u64,
    /// stimuli dropped because the state did not allow them
    pub invalid_transitions: u64,
}

impl HandoverCounters {
    pub fn failures(&self, reason: FailureReason) -> u64 {
        match reason {
            FailureReason::NoPreambleResponse => self.no_preamble_response,
            FailureReason::MaxRandomAccessRetries => self.max_random_access_retries,
            FailureReason::SourceLeavingFailure => self.source_leaving_failures,
            FailureReason::TargetJoiningFailure => self.target_joining_failures,
        }
    }

    pub fn total_failures(&self) -> u64 {
        self.no_preamble_response
            + self.max_random_access_retries
            + self.source_leaving_failures
            + self.target_joining_failures
    }

    pub(super) fn record(&mut self, kind: NotificationKind) {
        match kind {
            NotificationKind::ConnectionEstablished => self.connections_established += 1,
            NotificationKind::ConnectionReestablished => self.connections_reestablished += 1,
            NotificationKind::HandoverStart => self.handover_starts += 1,
            NotificationKind::HandoverEndOk => self.handover_successes += 1,
            NotificationKind::HandoverFailure(reason) => match reason {
                FailureReason::NoPreambleResponse => self.no_preamble_response += 1,
                FailureReason::MaxRandomAccessRetries => self.max_random_access_retries += 1,
                FailureReason::SourceLeavingFailure => self.source_leaving_failures += 1,
                FailureReason::TargetJoiningFailure => self.target_joining_failures += 1,
            },
            NotificationKind::Detached => self.detaches += 1,
        }
    }
}
