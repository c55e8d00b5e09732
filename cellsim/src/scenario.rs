//! Scenario files.
//!
//! A scenario is a JSON document describing the network to build and the
//! stimuli to deliver to it:
//!
//! ```
//! # use cellsim::Scenario;
//! # use cellsim_core::topology::{BaseStationId, TerminalId};
//! let scenario = Scenario::from_json(r#"{
//!     "config": { "aggregator": { "window": { "start": "0s", "stop": "1s" } } },
//!     "base_stations": [
//!         { "position": { "x": 0.0, "y": 0.0 } },
//!         { "position": { "x": 10.0, "y": 0.0 }, "max_terminals": 10 }
//!     ],
//!     "terminals": [
//!         { "placement": "list", "positions": [{ "x": 1.0, "y": 0.0 }] }
//!     ],
//!     "events": [
//!         { "at": "0s", "event": { "kind": "attach_to_closest", "terminal": 1 } }
//!     ]
//! }"#).unwrap();
//!
//! let mut runner = scenario.into_runner().unwrap();
//! runner.run().unwrap();
//! assert_eq!(
//!     runner.network().serving(TerminalId::new(1)),
//!     Some(BaseStationId::new(1))
//! );
//! ```

use crate::{
    event::{Event, EventQueue},
    runner::Runner,
};
use cellsim_core::{
    RadioNetwork, SimTime,
    bearer::{QosClass, TrafficFilter},
    config::{ConfigError, NetworkConfig},
    defaults::{DEFAULT_DISC_RADIUS, DEFAULT_QOS_CLASS},
    measure::Bandwidth,
    network::Packet,
    time::duration_str,
    topology::{
        ListPositionAllocator, Position, PositionAllocator, TerminalId,
        UniformDiscPositionAllocator,
    },
};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Cannot read scenario file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid scenario document")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid network configuration")]
    Config(#[from] ConfigError),
    #[error("Failed to set up the network")]
    Setup(#[from] cellsim_core::Error),
    #[error("Terminal placement {index} has no position")]
    EmptyPlacement { index: usize },
    #[error("Traffic source {index} has a zero interval")]
    ZeroInterval { index: usize },
}

/// A base station to register at setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaseStationSetup {
    pub position: Position,
    /// falls back to the topology default
    #[serde(default)]
    pub bandwidth: Option<Bandwidth>,
    #[serde(default)]
    pub max_terminals: Option<usize>,
}

/// A group of terminals to register at setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "placement", rename_all = "snake_case")]
pub enum TerminalPlacement {
    /// One terminal per position.
    List { positions: Vec<Position> },
    /// `count` terminals drawn uniformly from a disc.
    Disc {
        center: Position,
        #[serde(default = "default_disc_radius")]
        radius: f64,
        count: usize,
        #[serde(default)]
        seed: u64,
    },
}

/// A dedicated bearer activated at setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BearerSetup {
    pub terminal: TerminalId,
    #[serde(default = "default_qos")]
    pub qos: QosClass,
    pub filter: TrafficFilter,
}

/// A constant bit rate source, standing in for the packet transport.
///
/// Sends `packet` every `interval` from `start` (included) to `stop`
/// (excluded). Each packet is received `delay` later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrafficSource {
    pub packet: Packet,
    #[serde(with = "duration_str")]
    pub interval: Duration,
    pub start: SimTime,
    pub stop: SimTime,
    #[serde(with = "duration_str")]
    pub delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimedEvent {
    pub at: SimTime,
    pub event: Event,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Scenario {
    pub config: NetworkConfig,
    pub base_stations: Vec<BaseStationSetup>,
    pub terminals: Vec<TerminalPlacement>,
    pub bearers: Vec<BearerSetup>,
    pub traffic: Vec<TrafficSource>,
    pub events: Vec<TimedEvent>,
}

fn default_disc_radius() -> f64 {
    DEFAULT_DISC_RADIUS
}

fn default_qos() -> QosClass {
    DEFAULT_QOS_CLASS
}

impl TerminalPlacement {
    fn allocator(&self, index: usize) -> Result<(Box<dyn PositionAllocator>, usize), ScenarioError> {
        match self {
            Self::List { positions } => {
                let allocator = ListPositionAllocator::new(positions.clone())
                    .ok_or(ScenarioError::EmptyPlacement { index })?;
                Ok((Box::new(allocator), positions.len()))
            }
            Self::Disc {
                center,
                radius,
                count,
                seed,
            } => Ok((
                Box::new(UniformDiscPositionAllocator::new(*center, *radius, *seed)),
                *count,
            )),
        }
    }
}

impl TrafficSource {
    /// The send and receive events of this source.
    pub fn events(&self) -> impl Iterator<Item = (SimTime, Event)> + '_ {
        let mut next = Some(self.start);
        std::iter::from_fn(move || {
            let at = next.filter(|at| *at < self.stop)?;
            next = Some(at + self.interval);
            Some(at)
        })
        .flat_map(move |at| {
            [
                (at, Event::PacketSent {
                    packet: self.packet,
                }),
                (at + self.delay, Event::PacketReceived {
                    packet: self.packet,
                    delay: self.delay,
                }),
            ]
        })
    }
}

impl Scenario {
    pub fn from_json(document: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(document)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let document = fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&document)
    }

    /// Register the base stations, the terminals and the bearers.
    pub fn build_network(&self) -> Result<RadioNetwork, ScenarioError> {
        let mut network = RadioNetwork::new(self.config.clone())?;

        for base_station in &self.base_stations {
            let mut builder = network.new_base_station(base_station.position);
            if let Some(bandwidth) = base_station.bandwidth {
                builder = builder.set_bandwidth(bandwidth);
            }
            if let Some(max_terminals) = base_station.max_terminals {
                builder = builder.set_max_terminals(max_terminals);
            }
            builder.build().map_err(cellsim_core::Error::from)?;
        }

        for (index, terminals) in self.terminals.iter().enumerate() {
            let (mut allocator, count) = terminals.allocator(index)?;
            network.place_terminals(allocator.as_mut(), count)?;
        }

        for bearer in &self.bearers {
            network.activate_bearer(bearer.terminal, bearer.qos, bearer.filter.clone())?;
        }

        tracing::debug!(
            base_stations = self.base_stations.len(),
            terminals = network.topology().terminal_count(),
            bearers = self.bearers.len(),
            "network built"
        );

        Ok(network)
    }

    /// Every timed event, the traffic sources expanded.
    ///
    /// Explicit events come first so they win ties with traffic.
    pub fn build_queue(&self) -> Result<EventQueue, ScenarioError> {
        let mut queue: EventQueue = self
            .events
            .iter()
            .map(|timed| (timed.at, timed.event.clone()))
            .collect();

        for (index, source) in self.traffic.iter().enumerate() {
            if source.interval.is_zero() {
                return Err(ScenarioError::ZeroInterval { index });
            }
            queue.extend(source.events());
        }

        Ok(queue)
    }

    pub fn into_runner(self) -> Result<Runner, ScenarioError> {
        let network = self.build_network()?;
        let queue = self.build_queue()?;
        Ok(Runner::new(network, queue))
    }
}
