//! Cellular attachment, handover and flow statistics core.
//!
//! The crate decides which base station a mobile terminal is associated
//! with, tracks how that association changes through handovers, maps
//! dedicated traffic flows to bearers and aggregates per flow statistics.
//! Propagation, scheduling, packet transport and mobility are left to the
//! caller: it reports positions, stimuli and packet events, the core reacts.
//!
//! Start with a [`RadioNetwork`]:
//!
//! ```
//! use cellsim_core::{
//!     RadioNetwork, SimTime,
//!     bearer::{Direction, PacketDirection, PacketFilter, PortRange, QosClass, TrafficFilter},
//!     flow::{FiveTuple, Protocol},
//!     network::Packet,
//!     topology::Position,
//! };
//! use std::time::Duration;
//!
//! let mut network = RadioNetwork::default();
//! network.add_base_station(Position::new(0.0, 0.0, 0.0)).unwrap();
//! let ue = network.add_terminal(Position::new(100.0, 0.0, 0.0)).unwrap();
//! network.attach_to_closest(ue, SimTime::ZERO).unwrap();
//!
//! network
//!     .activate_bearer(
//!         ue,
//!         QosClass::NgbrVideoTcpDefault,
//!         TrafficFilter::new()
//!             .with(PacketFilter::new(Direction::Downlink).with_local(PortRange::single(1000))),
//!     )
//!     .unwrap();
//!
//! let packet = Packet {
//!     terminal: ue,
//!     tuple: FiveTuple::new(
//!         "1.0.0.2:49153".parse().unwrap(),
//!         "7.0.0.2:1000".parse().unwrap(),
//!         Protocol::Udp,
//!     ),
//!     direction: PacketDirection::Downlink,
//!     size: 1_000,
//! };
//! network.packet_sent(&packet, SimTime::ZERO).unwrap();
//! network
//!     .packet_received(&packet, SimTime::from_millis(10), Duration::from_millis(10))
//!     .unwrap();
//!
//! println!("{}", network.report());
//! ```

pub mod attachment;
pub mod bearer;
pub mod config;
pub mod defaults;
mod error;
pub mod flow;
pub mod handover;
mod id;
pub mod measure;
pub mod network;
pub mod stats;
pub mod time;
pub mod topology;

pub use self::{
    error::Error,
    measure::Bandwidth,
    network::RadioNetwork,
    time::SimTime,
    topology::{BaseStationId, Imsi, Position, TerminalId},
};
