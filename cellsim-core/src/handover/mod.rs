//! Per terminal connection and handover state.
//!
//! ```text
//!                 connection_established
//!   Unattached ---------------------------> Connected(serving)
//!       ^                                     |        ^
//!       |  detach              handover_start |        | handover_end_ok
//!       +-------------------------------------+        |
//!       |                                     v        |
//!       |                        HandoverInProgress(source, target)
//!       |                                     |
//!       |  detach            handover_failure |
//!       |                                     v
//!       +---------------------- HandoverFailed(source, reason)
//!                                             |
//!                      connection_established +--> Connected(serving)
//! ```
//!
//! Any other stimulus is an [`HandoverError::InvalidTransition`]: it is
//! logged, counted and dropped, and the state does not change.

mod notification;
mod state;

pub use self::{
    notification::{HandoverCounters, HandoverNotification, NotificationKind},
    state::{FailureReason, HandoverState, Stimulus},
};
use crate::{
    attachment::{AttachmentEvent, Rnti},
    time::SimTime,
    topology::{BaseStationId, TerminalId},
};
use std::{collections::HashMap, fmt};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandoverError {
    #[error("Terminal ({terminal}) is {state}, cannot apply {stimulus}")]
    InvalidTransition {
        terminal: TerminalId,
        state: HandoverState,
        stimulus: Stimulus,
    },
}

type Listener = Box<dyn FnMut(&HandoverNotification)>;

/// Tracks the [`HandoverState`] of every terminal.
///
/// A terminal the machine never heard of is [`HandoverState::Unattached`].
/// Listeners registered with [`subscribe`](Self::subscribe) observe every
/// transition, in order. They only get a shared view of the notification and
/// cannot feed stimuli back into the machine.
///
/// # Example
///
/// ```
/// use cellsim_core::{
///     SimTime,
///     attachment::Rnti,
///     handover::{HandoverState, HandoverStateMachine},
///     topology::{BaseStationId, TerminalId},
/// };
///
/// let ue = TerminalId::new(1);
/// let enb1 = BaseStationId::new(1);
/// let enb2 = BaseStationId::new(2);
///
/// let mut machine = HandoverStateMachine::new();
/// machine.connection_established(ue, enb1, Rnti::new(1), SimTime::ZERO).unwrap();
/// machine.handover_start(ue, enb2, SimTime::from_secs(1)).unwrap();
/// machine.handover_end_ok(ue, Rnti::new(1), SimTime::from_secs(1)).unwrap();
///
/// assert_eq!(machine.state(ue), HandoverState::Connected { serving: enb2 });
/// ```
#[derive(Default)]
pub struct HandoverStateMachine {
    states: HashMap<TerminalId, HandoverState>,
    counters: HandoverCounters,
    listeners: Vec<Listener>,
}

impl HandoverStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener called on every successful transition.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&HandoverNotification) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn state(&self, terminal: TerminalId) -> HandoverState {
        self.states.get(&terminal).copied().unwrap_or_default()
    }

    /// Target of the handover in progress, if any.
    pub fn pending_target(&self, terminal: TerminalId) -> Option<BaseStationId> {
        match self.state(terminal) {
            HandoverState::HandoverInProgress { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn counters(&self) -> &HandoverCounters {
        &self.counters
    }

    /// Terminals not in [`HandoverState::Unattached`].
    pub fn tracked(&self) -> usize {
        self.states.len()
    }

    /// Check `stimulus` against the current state without applying it.
    ///
    /// An invalid stimulus is reported exactly like the transition methods
    /// do: logged, counted and returned as an error.
    pub fn ensure(&mut self, terminal: TerminalId, stimulus: Stimulus) -> Result<(), HandoverError> {
        let state = self.state(terminal);
        if state.accepts(&stimulus) {
            Ok(())
        } else {
            Err(self.invalid(terminal, state, stimulus))
        }
    }

    /// Drop `stimulus` as an invalid transition from the current state.
    ///
    /// For callers that already know the stimulus cannot be applied.
    pub fn reject(&mut self, terminal: TerminalId, stimulus: Stimulus) -> HandoverError {
        let state = self.state(terminal);
        self.invalid(terminal, state, stimulus)
    }

    /// `Unattached -> Connected`, or `HandoverFailed -> Connected` when
    /// recovering from a failed handover.
    pub fn connection_established(
        &mut self,
        terminal: TerminalId,
        base_station: BaseStationId,
        rnti: Rnti,
        at: SimTime,
    ) -> Result<(), HandoverError> {
        let state = self.state(terminal);
        let (kind, source) = match state {
            HandoverState::Unattached => (NotificationKind::ConnectionEstablished, None),
            HandoverState::HandoverFailed { source, .. } => {
                (NotificationKind::ConnectionReestablished, Some(source))
            }
            _ => {
                return Err(self.invalid(
                    terminal,
                    state,
                    Stimulus::ConnectionEstablished { base_station },
                ));
            }
        };

        self.transition(
            HandoverState::Connected {
                serving: base_station,
            },
            HandoverNotification {
                terminal,
                kind,
                source,
                target: Some(base_station),
                rnti: Some(rnti),
                at,
            },
        );
        Ok(())
    }

    /// `Connected -> HandoverInProgress`.
    ///
    /// Starting a handover towards the serving base station is invalid.
    pub fn handover_start(
        &mut self,
        terminal: TerminalId,
        target: BaseStationId,
        at: SimTime,
    ) -> Result<(), HandoverError> {
        let state = self.state(terminal);
        let source = match state {
            HandoverState::Connected { serving } if serving != target => serving,
            _ => {
                return Err(self.invalid(terminal, state, Stimulus::HandoverStart { target }));
            }
        };

        self.transition(
            HandoverState::HandoverInProgress { source, target },
            HandoverNotification {
                terminal,
                kind: NotificationKind::HandoverStart,
                source: Some(source),
                target: Some(target),
                rnti: None,
                at,
            },
        );
        Ok(())
    }

    /// `HandoverInProgress -> Connected(target)`.
    ///
    /// Returns the new serving base station.
    pub fn handover_end_ok(
        &mut self,
        terminal: TerminalId,
        rnti: Rnti,
        at: SimTime,
    ) -> Result<BaseStationId, HandoverError> {
        let state = self.state(terminal);
        let HandoverState::HandoverInProgress { source, target } = state else {
            return Err(self.invalid(terminal, state, Stimulus::HandoverEndOk));
        };

        self.transition(
            HandoverState::Connected { serving: target },
            HandoverNotification {
                terminal,
                kind: NotificationKind::HandoverEndOk,
                source: Some(source),
                target: Some(target),
                rnti: Some(rnti),
                at,
            },
        );
        Ok(target)
    }

    /// `HandoverInProgress -> HandoverFailed`.
    ///
    /// The terminal stays associated with the source base station until it
    /// re-establishes a connection or detaches.
    pub fn handover_failure(
        &mut self,
        terminal: TerminalId,
        reason: FailureReason,
        at: SimTime,
    ) -> Result<(), HandoverError> {
        let state = self.state(terminal);
        let HandoverState::HandoverInProgress { source, target } = state else {
            return Err(self.invalid(terminal, state, Stimulus::HandoverFailure { reason }));
        };

        self.transition(
            HandoverState::HandoverFailed { source, reason },
            HandoverNotification {
                terminal,
                kind: NotificationKind::HandoverFailure(reason),
                source: Some(source),
                target: Some(target),
                rnti: None,
                at,
            },
        );
        Ok(())
    }

    /// `Connected -> Unattached` or `HandoverFailed -> Unattached`.
    pub fn detach(&mut self, terminal: TerminalId, at: SimTime) -> Result<(), HandoverError> {
        let state = self.state(terminal);
        let source = match state {
            HandoverState::Connected { serving } => serving,
            HandoverState::HandoverFailed { source, .. } => source,
            _ => return Err(self.invalid(terminal, state, Stimulus::Detach)),
        };

        self.transition(
            HandoverState::Unattached,
            HandoverNotification {
                terminal,
                kind: NotificationKind::Detached,
                source: Some(source),
                target: None,
                rnti: None,
                at,
            },
        );
        Ok(())
    }

    /// Feed an event of the [`AttachmentPolicy`] into the machine.
    ///
    /// [`AttachmentPolicy`]: crate::attachment::AttachmentPolicy
    pub fn apply(&mut self, event: &AttachmentEvent) -> Result<(), HandoverError> {
        match *event {
            AttachmentEvent::Attached {
                terminal,
                base_station,
                rnti,
                at,
            } => self.connection_established(terminal, base_station, rnti, at),
            AttachmentEvent::Detached { terminal, at, .. } => self.detach(terminal, at),
        }
    }

    fn transition(&mut self, to: HandoverState, notification: HandoverNotification) {
        let terminal = notification.terminal;
        tracing::debug!(
            %terminal,
            from = %self.state(terminal),
            to = %to,
            at = %notification.at,
            "handover state transition"
        );

        if to == HandoverState::Unattached {
            self.states.remove(&terminal);
        } else {
            self.states.insert(terminal, to);
        }
        self.counters.record(notification.kind);

        for listener in self.listeners.iter_mut() {
            listener(&notification);
        }
    }

    fn invalid(
        &mut self,
        terminal: TerminalId,
        state: HandoverState,
        stimulus: Stimulus,
    ) -> HandoverError {
        tracing::warn!(%terminal, %state, %stimulus, "invalid handover transition dropped");
        self.counters.invalid_transitions += 1;

        HandoverError::InvalidTransition {
            terminal,
            state,
            stimulus,
        }
    }
}

impl fmt::Debug for HandoverStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandoverStateMachine")
            .field("states", &self.states)
            .field("counters", &self.counters)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
