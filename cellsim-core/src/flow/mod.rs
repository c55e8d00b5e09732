//! Per flow statistics.
//!
//! A flow is the traffic of one terminal carried by one bearer (or by the
//! default bearer). The [`Aggregator`] owns the counters of every flow. They
//! are independent of the bearer lifetime and survive its teardown, so the
//! final report covers every flow ever opened.

mod report;
mod stats;
mod throughput;

pub use self::{
    report::{FlowReport, FlowSummary},
    stats::FlowStats,
    throughput::{ThroughputSample, ThroughputSampler, ThroughputTrace},
};
pub use crate::id::FlowId;
use crate::{bearer::Classification, config::AggregatorConfig, time::SimTime, topology::TerminalId};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    net::SocketAddr,
    time::Duration,
};
use thiserror::Error;

/// Transport protocol of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// Addresses and protocol identifying the packets of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FiveTuple {
    pub source: SocketAddr,
    pub destination: SocketAddr,
    pub protocol: Protocol,
}

/// What the [`Aggregator`] keys flows by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub terminal: TerminalId,
    pub classification: Classification,
}

/// Everything known about a flow besides its counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowDescriptor {
    pub key: FlowKey,
    /// the tuple of the packet that opened the flow
    pub tuple: FiveTuple,
}

/// Emitted to the listeners of the [`Aggregator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEvent {
    Opened {
        flow: FlowId,
        key: FlowKey,
    },
    PacketSent {
        flow: FlowId,
        size: u64,
        at: SimTime,
    },
    PacketReceived {
        flow: FlowId,
        size: u64,
        at: SimTime,
        delay: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("Flow ({id}) Not Found")]
    UnknownFlow { id: FlowId },
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FiveTuple {
    pub fn new(source: SocketAddr, destination: SocketAddr, protocol: Protocol) -> Self {
        Self {
            source,
            destination,
            protocol,
        }
    }
}

impl fmt::Display for FiveTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

#[derive(Debug, Clone)]
struct FlowEntry {
    descriptor: FlowDescriptor,
    stats: FlowStats,
}

type Listener = Box<dyn FnMut(&FlowEvent)>;

/// Accumulates the counters of every flow and renders the report.
///
/// # Example
///
/// ```
/// use cellsim_core::{
///     SimTime,
///     bearer::Classification,
///     config::AggregatorConfig,
///     flow::{Aggregator, FiveTuple, FlowKey, Protocol},
///     topology::TerminalId,
/// };
/// use std::time::Duration;
///
/// let mut aggregator = Aggregator::new(AggregatorConfig::default());
/// let key = FlowKey { terminal: TerminalId::ONE, classification: Classification::Default };
/// let tuple = FiveTuple::new(
///     "1.0.0.2:49153".parse().unwrap(),
///     "7.0.0.2:1000".parse().unwrap(),
///     Protocol::Udp,
/// );
/// let flow = aggregator.open_flow(key, tuple);
///
/// aggregator.on_packet_sent(flow, 1_000, SimTime::ZERO).unwrap();
/// aggregator
///     .on_packet_received(flow, 1_000, SimTime::from_secs(1), Duration::from_millis(5))
///     .unwrap();
///
/// let report = aggregator.report();
/// assert_eq!(report.flows[0].throughput_mbps, 0.008);
/// ```
pub struct Aggregator {
    config: AggregatorConfig,

    flows: BTreeMap<FlowId, FlowEntry>,
    index: HashMap<FlowKey, FlowId>,

    /// the last assigned ID
    flow_id: FlowId,

    sampler: ThroughputSampler,

    listeners: Vec<Listener>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::default())
    }
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        let origin = config
            .window
            .map_or(SimTime::ZERO, |window| window.start);
        let sampler = ThroughputSampler::new(config.throughput_bin, origin);

        Self {
            config,
            flows: BTreeMap::new(),
            index: HashMap::new(),
            flow_id: FlowId::ZERO,
            sampler,
            listeners: Vec::new(),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&FlowEvent) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Get the flow of `key`, creating it if this is its first packet.
    pub fn open_flow(&mut self, key: FlowKey, tuple: FiveTuple) -> FlowId {
        if let Some(id) = self.index.get(&key) {
            return *id;
        }

        self.flow_id = self.flow_id.next();
        let id = self.flow_id;
        self.flows.insert(
            id,
            FlowEntry {
                descriptor: FlowDescriptor { key, tuple },
                stats: FlowStats::default(),
            },
        );
        self.index.insert(key, id);

        tracing::debug!(
            flow = %id,
            terminal = %key.terminal,
            classification = %key.classification,
            %tuple,
            "flow opened"
        );
        self.emit(FlowEvent::Opened { flow: id, key });

        id
    }

    pub fn flow_id(&self, key: &FlowKey) -> Option<FlowId> {
        self.index.get(key).copied()
    }

    pub fn descriptor(&self, id: FlowId) -> Result<&FlowDescriptor, FlowError> {
        self.entry(id).map(|entry| &entry.descriptor)
    }

    pub fn stats(&self, id: FlowId) -> Result<&FlowStats, FlowError> {
        self.entry(id).map(|entry| &entry.stats)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn on_packet_sent(&mut self, flow: FlowId, size: u64, at: SimTime) -> Result<(), FlowError> {
        self.entry_mut(flow)?.stats.record_sent(size, at);

        tracing::trace!(%flow, size, %at, "packet sent");
        self.emit(FlowEvent::PacketSent { flow, size, at });
        Ok(())
    }

    pub fn on_packet_received(
        &mut self,
        flow: FlowId,
        size: u64,
        at: SimTime,
        delay: Duration,
    ) -> Result<(), FlowError> {
        self.entry_mut(flow)?.stats.record_received(size, at, delay);
        self.sampler.record(size, at);

        tracing::trace!(%flow, size, %at, ?delay, "packet received");
        self.emit(FlowEvent::PacketReceived {
            flow,
            size,
            at,
            delay,
        });
        Ok(())
    }

    /// Summaries of every flow, ordered by flow identifier.
    pub fn report(&self) -> FlowReport {
        let window = self.config.window.map(|window| window.duration());

        let flows = self
            .flows
            .iter()
            .map(|(id, entry)| {
                FlowSummary::new(
                    *id,
                    entry.descriptor.key.terminal,
                    entry.descriptor.key.classification,
                    entry.descriptor.tuple,
                    &entry.stats,
                    window,
                )
            })
            .collect();

        let report = FlowReport::new(flows);
        tracing::info!(
            flows = report.flows.len(),
            mean_throughput_mbps = report.mean_throughput_mbps,
            mean_delay_ms = report.mean_delay_ms,
            "flow report generated"
        );
        report
    }

    /// The binned throughput of every received packet.
    ///
    /// Covers the configured run window, or up to the last reception when
    /// there is none.
    pub fn throughput_trace(&self) -> ThroughputTrace {
        self.sampler
            .trace(self.config.window.map(|window| window.stop))
    }

    fn entry(&self, id: FlowId) -> Result<&FlowEntry, FlowError> {
        self.flows.get(&id).ok_or(FlowError::UnknownFlow { id })
    }

    fn entry_mut(&mut self, id: FlowId) -> Result<&mut FlowEntry, FlowError> {
        self.flows.get_mut(&id).ok_or(FlowError::UnknownFlow { id })
    }

    fn emit(&mut self, event: FlowEvent) {
        for listener in self.listeners.iter_mut() {
            listener(&event);
        }
    }
}

impl fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregator")
            .field("config", &self.config)
            .field("flows", &self.flows)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}
