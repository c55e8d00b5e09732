use crate::topology::BaseStationId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state of one terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HandoverState {
    #[default]
    Unattached,
    Connected {
        serving: BaseStationId,
    },
    HandoverInProgress {
        source: BaseStationId,
        target: BaseStationId,
    },
    HandoverFailed {
        source: BaseStationId,
        reason: FailureReason,
    },
}

/// Why a handover did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// the target never answered the random access preamble
    NoPreambleResponse,
    MaxRandomAccessRetries,
    SourceLeavingFailure,
    TargetJoiningFailure,
}

/// An input of the [`HandoverStateMachine`].
///
/// [`HandoverStateMachine`]: super::HandoverStateMachine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stimulus {
    ConnectionEstablished {
        base_station: BaseStationId,
    },
    HandoverStart {
        target: BaseStationId,
    },
    HandoverEndOk,
    HandoverFailure {
        reason: FailureReason,
    },
    Detach,
}

impl HandoverState {
    /// The base station the terminal is served by, or was served by before
    /// the pending or failed handover.
    pub fn source(&self) -> Option<BaseStationId> {
        match self {
            Self::Unattached => None,
            Self::Connected { serving } => Some(*serving),
            Self::HandoverInProgress { source, .. } | Self::HandoverFailed { source, .. } => {
                Some(*source)
            }
        }
    }

    /// Whether `stimulus` is a valid transition out of this state.
    pub fn accepts(&self, stimulus: &Stimulus) -> bool {
        match (self, stimulus) {
            (
                Self::Unattached | Self::HandoverFailed { .. },
                Stimulus::ConnectionEstablished { .. },
            ) => true,
            (Self::Connected { serving }, Stimulus::HandoverStart { target }) => serving != target,
            (
                Self::HandoverInProgress { .. },
                Stimulus::HandoverEndOk | Stimulus::HandoverFailure { .. },
            ) => true,
            (Self::Connected { .. } | Self::HandoverFailed { .. }, Stimulus::Detach) => true,
            _ => false,
        }
    }
}

impl fmt::Display for HandoverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unattached => f.write_str("unattached"),
            Self::Connected { serving } => write!(f, "connected to ({serving})"),
            Self::HandoverInProgress { source, target } => {
                write!(f, "handover in progress ({source}) -> ({target})")
            }
            Self::HandoverFailed { source, reason } => {
                write!(f, "handover from ({source}) failed: {reason}")
            }
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoPreambleResponse => "no preamble response",
            Self::MaxRandomAccessRetries => "max random access retries",
            Self::SourceLeavingFailure => "source leaving failure",
            Self::TargetJoiningFailure => "target joining failure",
        })
    }
}

impl fmt::Display for Stimulus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionEstablished { base_station } => {
                write!(f, "connection established with ({base_station})")
            }
            Self::HandoverStart { target } => write!(f, "handover start to ({target})"),
            Self::HandoverEndOk => f.write_str("handover end ok"),
            Self::HandoverFailure { reason } => write!(f, "handover failure ({reason})"),
            Self::Detach => f.write_str("detach"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source() {
        let enb1 = BaseStationId::new(1);
        let enb2 = BaseStationId::new(2);

        assert_eq!(HandoverState::Unattached.source(), None);
        assert_eq!(HandoverState::Connected { serving: enb1 }.source(), Some(enb1));
        assert_eq!(
            HandoverState::HandoverInProgress {
                source: enb1,
                target: enb2
            }
            .source(),
            Some(enb1)
        );
    }

    #[test]
    fn accepts() {
        let enb1 = BaseStationId::new(1);
        let enb2 = BaseStationId::new(2);
        let connected = HandoverState::Connected { serving: enb1 };
        let in_progress = HandoverState::HandoverInProgress {
            source: enb1,
            target: enb2,
        };

        assert!(connected.accepts(&Stimulus::HandoverStart { target: enb2 }));
        assert!(!connected.accepts(&Stimulus::HandoverStart { target: enb1 }));
        assert!(!in_progress.accepts(&Stimulus::HandoverStart { target: enb1 }));
        assert!(!in_progress.accepts(&Stimulus::Detach));
        assert!(in_progress.accepts(&Stimulus::HandoverEndOk));
        assert!(!HandoverState::Unattached.accepts(&Stimulus::Detach));
    }

    #[test]
    fn display() {
        let state = HandoverState::HandoverInProgress {
            source: BaseStationId::new(1),
            target: BaseStationId::new(2),
        };
        assert_eq!(state.to_string(), "handover in progress (1) -> (2)");
        assert_eq!(
            Stimulus::HandoverFailure {
                reason: FailureReason::NoPreambleResponse
            }
            .to_string(),
            "handover failure (no preamble response)"
        );
    }
}
