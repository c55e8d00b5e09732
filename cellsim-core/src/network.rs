//! The entry point wiring every component together.

use crate::{
    Error,
    attachment::{AttachCause, AttachmentEvent, AttachmentPolicy, Rnti},
    bearer::{BearerId, BearerRegistry, Classification, PacketDirection, QosClass, TrafficFilter},
    config::{ConfigError, NetworkConfig},
    flow::{Aggregator, FiveTuple, FlowEvent, FlowId, FlowKey, FlowReport, ThroughputTrace},
    handover::{
        FailureReason, HandoverNotification, HandoverState, HandoverStateMachine, Stimulus,
    },
    stats::{BaseStationStats, NetworkStats, TerminalStats},
    time::SimTime,
    topology::{
        BaseStationBuilder, BaseStationId, Position, PositionAllocator, TerminalId, Topology,
    },
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};

/// A packet as seen by the radio network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Packet {
    pub terminal: TerminalId,
    pub tuple: FiveTuple,
    pub direction: PacketDirection,
    pub size: u64,
}

/// This is the entry point for all activities with [`cellsim_core`].
///
/// The [`RadioNetwork`] owns the [`Topology`], the [`AttachmentPolicy`], the
/// [`HandoverStateMachine`], the [`BearerRegistry`] and the [`Aggregator`],
/// and keeps them consistent:
///
/// - every attach and detach of the policy is forwarded to the state
///   machine, so a terminal is attached exactly when its state is not
///   [`HandoverState::Unattached`];
/// - a handover completion re-points the policy to the target;
/// - a detach tears down the dedicated bearers of the terminal;
/// - packets are classified by the bearer registry before reaching the
///   aggregator. A received packet is accounted to the flow its sent
///   counterpart went to, even if the bearers changed in between.
///
/// All methods take `&mut self`: stimuli are applied one at a time, in the
/// order the driver delivers them.
///
/// # Example
///
/// ```
/// use cellsim_core::{
///     RadioNetwork, SimTime,
///     handover::HandoverState,
///     topology::Position,
/// };
///
/// let mut network = RadioNetwork::default();
/// let enb1 = network.add_base_station(Position::new(0.0, 0.0, 0.0)).unwrap();
/// let enb2 = network.add_base_station(Position::new(10.0, 0.0, 0.0)).unwrap();
/// let ue = network.add_terminal(Position::new(1.0, 0.0, 0.0)).unwrap();
///
/// network.attach_to_closest(ue, SimTime::ZERO).unwrap();
/// assert_eq!(network.state(ue), HandoverState::Connected { serving: enb1 });
///
/// network.handover_start(ue, enb2, SimTime::from_secs(1)).unwrap();
/// network.handover_end_ok(ue, SimTime::from_secs(1)).unwrap();
/// assert_eq!(network.serving(ue), Some(enb2));
/// ```
///
/// [`cellsim_core`]: crate
#[derive(Debug)]
pub struct RadioNetwork {
    topology: Topology,
    attachment: AttachmentPolicy,
    handover: HandoverStateMachine,
    bearers: BearerRegistry,
    aggregator: Aggregator,

    /// flow and count of the packets sent but not received yet
    in_flight: HashMap<(TerminalId, FiveTuple), (FlowId, u64)>,
}

impl Default for RadioNetwork {
    fn default() -> Self {
        Self::with_config(NetworkConfig::default())
    }
}

impl RadioNetwork {
    /// Build a network after validating `config`.
    pub fn new(config: NetworkConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: NetworkConfig) -> Self {
        let NetworkConfig {
            topology,
            attachment,
            aggregator,
        } = config;

        Self {
            topology: Topology::new(topology),
            attachment: AttachmentPolicy::new(attachment.mode),
            handover: HandoverStateMachine::new(),
            bearers: BearerRegistry::new(),
            aggregator: Aggregator::new(aggregator),
            in_flight: HashMap::new(),
        }
    }

    // -- topology ---------------------------------------------------------

    /// Start registering a base station, see [`Topology::new_base_station`].
    pub fn new_base_station(&mut self, position: Position) -> BaseStationBuilder<'_> {
        self.topology.new_base_station(position)
    }

    pub fn add_base_station(&mut self, position: Position) -> Result<BaseStationId, Error> {
        Ok(self.topology.add_base_station(position)?)
    }

    pub fn add_terminal(&mut self, position: Position) -> Result<TerminalId, Error> {
        Ok(self.topology.add_terminal(position)?)
    }

    /// Register `count` terminals at the positions drawn from `allocator`.
    pub fn place_terminals<A>(
        &mut self,
        allocator: &mut A,
        count: usize,
    ) -> Result<Vec<TerminalId>, Error>
    where
        A: PositionAllocator + ?Sized,
    {
        (0..count)
            .map(|_| self.add_terminal(allocator.next_position()))
            .collect()
    }

    /// Report a new position of `terminal`.
    ///
    /// The attachment is left untouched: re-evaluating it is up to the
    /// caller, with [`attach_to_closest`](Self::attach_to_closest) or a
    /// handover.
    pub fn update_position(&mut self, terminal: TerminalId, position: Position) -> Result<(), Error> {
        Ok(self.topology.update_position(terminal, position)?)
    }

    pub fn distance(&self, terminal: TerminalId, base_station: BaseStationId) -> Result<f64, Error> {
        Ok(self.topology.distance(terminal, base_station)?)
    }

    // -- attachment -------------------------------------------------------

    /// Attach an unattached terminal to `base_station`.
    pub fn attach(
        &mut self,
        terminal: TerminalId,
        base_station: BaseStationId,
        at: SimTime,
    ) -> Result<(), Error> {
        let events = self
            .attachment
            .attach(&self.topology, terminal, base_station, at)?;
        self.dispatch(&events)
    }

    /// Attach `terminal` to `base_station`, detaching it first if needed.
    ///
    /// This bypasses the handover procedure: the state machine sees a detach
    /// followed by a connection establishment. Dedicated bearers are kept.
    /// Rejected while a handover is in progress.
    pub fn reattach(
        &mut self,
        terminal: TerminalId,
        base_station: BaseStationId,
        at: SimTime,
    ) -> Result<(), Error> {
        self.reject_during_handover(terminal, Stimulus::Detach)?;

        let events = self
            .attachment
            .reattach(&self.topology, terminal, base_station, at)?;
        self.dispatch(&events)
    }

    /// Attach `terminal` to the closest base station with room left.
    ///
    /// Does nothing if it is already served by that base station. A terminal
    /// whose handover failed re-establishes its connection with the closest
    /// base station instead.
    pub fn attach_to_closest(&mut self, terminal: TerminalId, at: SimTime) -> Result<(), Error> {
        self.reject_during_handover(terminal, Stimulus::Detach)?;

        if let HandoverState::HandoverFailed { .. } = self.handover.state(terminal) {
            let target = self.attachment.select_closest(&self.topology, terminal)?;
            return self.reestablish(terminal, target, at);
        }

        let events = self
            .attachment
            .attach_to_closest(&self.topology, terminal, at)?;
        self.dispatch(&events)
    }

    /// Attach an unattached terminal following the configured
    /// [`AttachmentMode`](crate::attachment::AttachmentMode).
    pub fn auto_attach(&mut self, terminal: TerminalId, at: SimTime) -> Result<(), Error> {
        let events = self.attachment.auto_attach(&self.topology, terminal, at)?;
        self.dispatch(&events)
    }

    /// [`auto_attach`](Self::auto_attach) every unattached terminal, in
    /// identifier order. Returns how many terminals were attached.
    ///
    /// Stops at the first error; the terminals attached before it stay
    /// attached.
    pub fn auto_attach_all(&mut self, at: SimTime) -> Result<usize, Error> {
        let pending: Vec<TerminalId> = self
            .topology
            .terminals()
            .map(|terminal| terminal.id())
            .filter(|terminal| self.attachment.serving(*terminal).is_none())
            .collect();

        for terminal in &pending {
            self.auto_attach(*terminal, at)?;
        }
        Ok(pending.len())
    }

    /// Detach `terminal` and tear down its dedicated bearers.
    ///
    /// Rejected while a handover is in progress.
    pub fn detach(&mut self, terminal: TerminalId, at: SimTime) -> Result<(), Error> {
        self.reject_during_handover(terminal, Stimulus::Detach)?;

        let event = self.attachment.detach(&self.topology, terminal, at)?;
        self.bearers.deactivate_all(terminal);
        self.dispatch(&[event])
    }

    // -- handover ---------------------------------------------------------

    /// The connection with `base_station` is established.
    ///
    /// For an unattached terminal this is an [`attach`](Self::attach). After
    /// a failed handover it is the recovery: the terminal is re-pointed to
    /// `base_station` with a new RNTI.
    pub fn connection_established(
        &mut self,
        terminal: TerminalId,
        base_station: BaseStationId,
        at: SimTime,
    ) -> Result<(), Error> {
        self.topology.terminal(terminal)?;
        self.topology.base_station(base_station)?;

        match self.handover.state(terminal) {
            HandoverState::Unattached => self.attach(terminal, base_station, at),
            HandoverState::HandoverFailed { .. } => self.reestablish(terminal, base_station, at),
            _ => Err(self
                .handover
                .reject(terminal, Stimulus::ConnectionEstablished { base_station })
                .into()),
        }
    }

    /// Start a handover of `terminal` towards `target`.
    pub fn handover_start(
        &mut self,
        terminal: TerminalId,
        target: BaseStationId,
        at: SimTime,
    ) -> Result<(), Error> {
        self.topology.terminal(terminal)?;
        self.topology.base_station(target)?;

        Ok(self.handover.handover_start(terminal, target, at)?)
    }

    /// Complete the handover in progress: the target becomes the serving
    /// base station.
    ///
    /// If the target cannot accept the terminal the handover stays in
    /// progress and the error is returned.
    pub fn handover_end_ok(&mut self, terminal: TerminalId, at: SimTime) -> Result<BaseStationId, Error> {
        self.topology.terminal(terminal)?;

        let Some(target) = self.handover.pending_target(terminal) else {
            return Err(self.handover.reject(terminal, Stimulus::HandoverEndOk).into());
        };

        let record = self.attachment.repoint(
            &self.topology,
            terminal,
            target,
            at,
            AttachCause::Handover,
        )?;
        let serving = self.handover.handover_end_ok(terminal, record.rnti, at)?;
        self.trace_connection(terminal, serving, record.rnti);

        Ok(serving)
    }

    /// The handover in progress failed. The terminal stays with the source
    /// base station until it re-establishes a connection or detaches.
    pub fn handover_failure(
        &mut self,
        terminal: TerminalId,
        reason: FailureReason,
        at: SimTime,
    ) -> Result<(), Error> {
        self.topology.terminal(terminal)?;

        Ok(self.handover.handover_failure(terminal, reason, at)?)
    }

    // -- bearers ----------------------------------------------------------

    pub fn activate_bearer(
        &mut self,
        terminal: TerminalId,
        qos: QosClass,
        filter: TrafficFilter,
    ) -> Result<BearerId, Error> {
        Ok(self
            .bearers
            .activate_bearer(&self.topology, terminal, qos, filter)?)
    }

    pub fn deactivate_bearer(&mut self, bearer: BearerId) -> Result<(), Error> {
        self.bearers.deactivate_bearer(bearer)?;
        Ok(())
    }

    pub fn classify(
        &self,
        terminal: TerminalId,
        source_port: u16,
        destination_port: u16,
        direction: PacketDirection,
    ) -> Classification {
        self.bearers
            .classify(terminal, source_port, destination_port, direction)
    }

    // -- packets ----------------------------------------------------------

    /// Account a packet leaving its sender. Returns the flow it belongs to.
    pub fn packet_sent(&mut self, packet: &Packet, at: SimTime) -> Result<FlowId, Error> {
        let flow = self.flow_of(packet)?;
        self.aggregator.on_packet_sent(flow, packet.size, at)?;

        let (current, pending) = self
            .in_flight
            .entry((packet.terminal, packet.tuple))
            .or_insert((flow, 0));
        if *current != flow {
            // the classification changed: older packets are lost to tracking
            *current = flow;
            *pending = 0;
        }
        *pending += 1;

        Ok(flow)
    }

    /// Account a packet reaching its receiver after `delay`.
    ///
    /// The packet joins the flow of its in-flight sent counterpart. Without
    /// one it is classified like a sent packet.
    pub fn packet_received(
        &mut self,
        packet: &Packet,
        at: SimTime,
        delay: Duration,
    ) -> Result<FlowId, Error> {
        let flow = match self.take_in_flight(packet) {
            Some(flow) => flow,
            None => self.flow_of(packet)?,
        };
        self.aggregator
            .on_packet_received(flow, packet.size, at, delay)?;
        Ok(flow)
    }

    pub fn report(&self) -> FlowReport {
        self.aggregator.report()
    }

    pub fn throughput_trace(&self) -> ThroughputTrace {
        self.aggregator.throughput_trace()
    }

    // -- observation ------------------------------------------------------

    /// Register a listener of every handover state transition.
    pub fn subscribe_handover<F>(&mut self, listener: F)
    where
        F: FnMut(&HandoverNotification) + 'static,
    {
        self.handover.subscribe(listener);
    }

    /// Register a listener of every flow event.
    pub fn subscribe_flows<F>(&mut self, listener: F)
    where
        F: FnMut(&FlowEvent) + 'static,
    {
        self.aggregator.subscribe(listener);
    }

    pub fn state(&self, terminal: TerminalId) -> HandoverState {
        self.handover.state(terminal)
    }

    pub fn serving(&self, terminal: TerminalId) -> Option<BaseStationId> {
        self.attachment.serving(terminal)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn attachment(&self) -> &AttachmentPolicy {
        &self.attachment
    }

    pub fn handover(&self) -> &HandoverStateMachine {
        &self.handover
    }

    pub fn bearers(&self) -> &BearerRegistry {
        &self.bearers
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn stats(&self) -> NetworkStats {
        let base_stations = self
            .topology
            .base_stations()
            .map(|base_station| BaseStationStats {
                id: base_station.id(),
                position: base_station.position(),
                bandwidth: base_station.bandwidth(),
                max_terminals: base_station.max_terminals(),
                attached: self.attachment.load(base_station.id()),
            })
            .collect();

        let terminals = self
            .topology
            .terminals()
            .map(|terminal| TerminalStats {
                id: terminal.id(),
                imsi: terminal.imsi(),
                position: terminal.position(),
                serving: self.attachment.serving(terminal.id()),
                state: self.handover.state(terminal.id()),
                bearers: self.bearers.bearers_of(terminal.id()).count(),
            })
            .collect();

        NetworkStats {
            base_stations,
            terminals,
            handover: *self.handover.counters(),
            flows: self.aggregator.len(),
        }
    }

    // -- internals --------------------------------------------------------

    fn reestablish(
        &mut self,
        terminal: TerminalId,
        base_station: BaseStationId,
        at: SimTime,
    ) -> Result<(), Error> {
        let record = self.attachment.repoint(
            &self.topology,
            terminal,
            base_station,
            at,
            AttachCause::Reestablishment,
        )?;
        self.handover
            .connection_established(terminal, base_station, record.rnti, at)?;
        self.trace_connection(terminal, base_station, record.rnti);
        Ok(())
    }

    fn reject_during_handover(&mut self, terminal: TerminalId, stimulus: Stimulus) -> Result<(), Error> {
        if let HandoverState::HandoverInProgress { .. } = self.handover.state(terminal) {
            return Err(self.handover.reject(terminal, stimulus).into());
        }
        Ok(())
    }

    fn dispatch(&mut self, events: &[AttachmentEvent]) -> Result<(), Error> {
        for event in events {
            self.handover.apply(event)?;
            if let AttachmentEvent::Attached {
                terminal,
                base_station,
                rnti,
                ..
            } = *event
            {
                self.trace_connection(terminal, base_station, rnti);
            }
        }
        Ok(())
    }

    fn trace_connection(
        &self,
        terminal: TerminalId,
        base_station: BaseStationId,
        rnti: Rnti,
    ) {
        if let Ok(terminal) = self.topology.terminal(terminal) {
            tracing::info!(
                imsi = %terminal.imsi(),
                cell = %base_station,
                %rnti,
                "connection established"
            );
        }
    }

    fn take_in_flight(&mut self, packet: &Packet) -> Option<FlowId> {
        let key = (packet.terminal, packet.tuple);
        let (flow, pending) = self.in_flight.get_mut(&key)?;
        let flow = *flow;
        *pending -= 1;
        if *pending == 0 {
            self.in_flight.remove(&key);
        }
        Some(flow)
    }

    fn flow_of(&mut self, packet: &Packet) -> Result<FlowId, Error> {
        self.topology.terminal(packet.terminal)?;

        let classification = self.bearers.classify(
            packet.terminal,
            packet.tuple.source.port(),
            packet.tuple.destination.port(),
            packet.direction,
        );
        let key = FlowKey {
            terminal: packet.terminal,
            classification,
        };
        Ok(self.aggregator.open_flow(key, packet.tuple))
    }
}
