//! The dispatch loop.

use crate::event::{Event, EventQueue};
use cellsim_core::{RadioNetwork, SimTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the [`Runner`] does when an event fails.
///
/// Invalid handover transitions are dropped by the state machine and always
/// skipped, whatever the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// stop the run at the first error
    #[default]
    Abort,
    /// log the error and carry on with the next event
    Skip,
}

#[derive(Debug, Error)]
#[error("Event {event} at {at} failed")]
pub struct RunError {
    pub at: SimTime,
    pub event: &'static str,
    #[source]
    pub source: cellsim_core::Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Cannot schedule {event} at {at}, the run already reached {now}")]
    InThePast {
        at: SimTime,
        now: SimTime,
        event: &'static str,
    },
}

/// Counters of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RunSummary {
    /// events applied successfully
    pub applied: usize,
    /// events dropped after an error
    pub skipped: usize,
    /// time of the last event delivered
    pub last_event: Option<SimTime>,
}

/// Delivers the events of an [`EventQueue`] to a [`RadioNetwork`] in time
/// order.
#[derive(Debug)]
pub struct Runner {
    network: RadioNetwork,
    queue: EventQueue,
    policy: ErrorPolicy,
    summary: RunSummary,
}

impl Runner {
    pub fn new(network: RadioNetwork, queue: EventQueue) -> Self {
        Self {
            network,
            queue,
            policy: ErrorPolicy::default(),
            summary: RunSummary::default(),
        }
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Queue `event` for delivery at `at`.
    ///
    /// Events are delivered in non-decreasing time order, so `at` cannot be
    /// earlier than the last event delivered.
    pub fn schedule(&mut self, at: SimTime, event: Event) -> Result<(), ScheduleError> {
        if let Some(now) = self.summary.last_event.filter(|now| at < *now) {
            return Err(ScheduleError::InThePast {
                at,
                now,
                event: event.name(),
            });
        }
        self.queue.push(at, event);
        Ok(())
    }

    pub fn network(&self) -> &RadioNetwork {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut RadioNetwork {
        &mut self.network
    }

    pub fn into_network(self) -> RadioNetwork {
        self.network
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Events left to deliver.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Deliver the next event. Returns `false` once the queue is empty.
    pub fn step(&mut self) -> Result<bool, RunError> {
        let Some((at, event)) = self.queue.pop() else {
            return Ok(false);
        };
        self.summary.last_event = Some(at);

        match apply(&mut self.network, &event, at) {
            Ok(()) => {
                self.summary.applied += 1;
                Ok(true)
            }
            Err(error) if error.is_invalid_transition() => {
                self.summary.skipped += 1;
                Ok(true)
            }
            Err(error) => match self.policy {
                ErrorPolicy::Skip => {
                    tracing::warn!(%at, event = event.name(), %error, "event skipped");
                    self.summary.skipped += 1;
                    Ok(true)
                }
                ErrorPolicy::Abort => Err(RunError {
                    at,
                    event: event.name(),
                    source: error,
                }),
            },
        }
    }

    /// Deliver every event due at or before `until`.
    pub fn run_until(&mut self, until: SimTime) -> Result<RunSummary, RunError> {
        while self.queue.next_time().is_some_and(|at| at <= until) {
            self.step()?;
        }
        Ok(self.summary)
    }

    /// Deliver every event.
    pub fn run(&mut self) -> Result<RunSummary, RunError> {
        while self.step()? {}

        tracing::info!(
            applied = self.summary.applied,
            skipped = self.summary.skipped,
            "run completed"
        );
        Ok(self.summary)
    }
}

fn apply(network: &mut RadioNetwork, event: &Event, at: SimTime) -> Result<(), cellsim_core::Error> {
    match event {
        Event::Move { terminal, position } => network.update_position(*terminal, *position),
        Event::Attach {
            terminal,
            base_station,
        } => network.attach(*terminal, *base_station, at),
        Event::Reattach {
            terminal,
            base_station,
        } => network.reattach(*terminal, *base_station, at),
        Event::AttachToClosest { terminal } => network.attach_to_closest(*terminal, at),
        Event::AutoAttachAll => network.auto_attach_all(at).map(|_| ()),
        Event::Detach { terminal } => network.detach(*terminal, at),
        Event::ConnectionEstablished {
            terminal,
            base_station,
        } => network.connection_established(*terminal, *base_station, at),
        Event::HandoverStart { terminal, target } => network.handover_start(*terminal, *target, at),
        Event::HandoverEndOk { terminal } => network.handover_end_ok(*terminal, at).map(|_| ()),
        Event::HandoverFailure { terminal, reason } => {
            network.handover_failure(*terminal, *reason, at)
        }
        Event::ActivateBearer {
            terminal,
            qos,
            filter,
        } => network
            .activate_bearer(*terminal, *qos, filter.clone())
            .map(|_| ()),
        Event::DeactivateBearer { bearer } => network.deactivate_bearer(*bearer),
        Event::PacketSent { packet } => network.packet_sent(packet, at).map(|_| ()),
        Event::PacketReceived { packet, delay } => {
            network.packet_received(packet, at, *delay).map(|_| ())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellsim_core::{
        handover::HandoverState,
        topology::{BaseStationId, Position, TerminalId},
    };

    fn network() -> (RadioNetwork, BaseStationId, BaseStationId, TerminalId) {
        let mut network = RadioNetwork::default();
        let enb1 = network.add_base_station(Position::ORIGIN).unwrap();
        let enb2 = network.add_base_station(Position::new(10.0, 0.0, 0.0)).unwrap();
        let ue = network.add_terminal(Position::new(1.0, 0.0, 0.0)).unwrap();
        (network, enb1, enb2, ue)
    }

    #[test]
    fn empty_queue() {
        let (network, ..) = network();
        let mut runner = Runner::new(network, EventQueue::new());

        assert!(!runner.step().unwrap());
        assert_eq!(runner.run().unwrap(), RunSummary::default());
    }

    #[test]
    fn invalid_transition_is_skipped() {
        let (network, _, enb2, ue) = network();
        let mut runner = Runner::new(network, EventQueue::new());
        runner.schedule(SimTime::from_secs(1), Event::HandoverStart {
            terminal: ue,
            target: enb2,
        }).unwrap();

        let summary = runner.run().unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.last_event, Some(SimTime::from_secs(1)));
        assert_eq!(runner.network().state(ue), HandoverState::Unattached);
    }

    #[test]
    fn abort_on_error() {
        let (network, ..) = network();
        let mut runner = Runner::new(network, EventQueue::new());
        runner.schedule(SimTime::ZERO, Event::Detach {
            terminal: TerminalId::new(1),
        }).unwrap();
        runner.schedule(SimTime::ZERO, Event::AutoAttachAll).unwrap();

        let error = runner.run().unwrap_err();
        assert_eq!(error.event, "detach");
        assert_eq!(runner.pending(), 1);
    }

    #[test]
    fn skip_on_error() {
        let (network, enb1, _, ue) = network();
        let mut runner =
            Runner::new(network, EventQueue::new()).with_error_policy(ErrorPolicy::Skip);
        runner.schedule(SimTime::ZERO, Event::Detach { terminal: ue }).unwrap();
        runner.schedule(SimTime::ZERO, Event::AutoAttachAll).unwrap();

        let summary = runner.run().unwrap();
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(runner.network().serving(ue), Some(enb1));
    }

    #[test]
    fn schedule_before_last_event() {
        let (network, ..) = network();
        let mut runner = Runner::new(network, EventQueue::new());
        runner
            .schedule(SimTime::from_secs(5), Event::AutoAttachAll)
            .unwrap();
        runner.run().unwrap();

        assert_eq!(
            runner.schedule(SimTime::from_secs(1), Event::AutoAttachAll),
            Err(ScheduleError::InThePast {
                at: SimTime::from_secs(1),
                now: SimTime::from_secs(5),
                event: "auto_attach_all",
            })
        );
        assert_eq!(runner.pending(), 0);

        // same time is still in order
        runner
            .schedule(SimTime::from_secs(5), Event::AutoAttachAll)
            .unwrap();
        runner.run().unwrap();
        assert_eq!(runner.summary().last_event, Some(SimTime::from_secs(5)));
    }

    #[test]
    fn run_until() {
        let (network, _, _, ue) = network();
        let mut runner = Runner::new(network, EventQueue::new());
        runner.schedule(SimTime::from_secs(1), Event::AttachToClosest { terminal: ue }).unwrap();
        runner.schedule(SimTime::from_secs(3), Event::Detach { terminal: ue }).unwrap();

        runner.run_until(SimTime::from_secs(2)).unwrap();
        assert!(runner.network().serving(ue).is_some());
        assert_eq!(runner.pending(), 1);

        runner.run().unwrap();
        assert!(runner.network().serving(ue).is_none());
    }
}
