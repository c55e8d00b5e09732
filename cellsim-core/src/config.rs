//! Typed configuration of every component.
//!
//! Each component takes its own configuration struct at construction time.
//! [`NetworkConfig::validate`] checks the whole set once, before anything is
//! built; components assume they were handed a valid configuration.
//!
//! All structs implement `serde` traits so a driver can load them from a
//! scenario file. Measures use their human readable forms:
//!
//! ```
//! # use cellsim_core::config::NetworkConfig;
//! let config: NetworkConfig = serde_json::from_str(r#"{
//!     "topology": { "default_bandwidth": "20mbps" },
//!     "attachment": { "mode": { "kind": "block", "per_base_station": 10 } },
//!     "aggregator": {
//!         "window": { "start": "10ms", "stop": "30s" },
//!         "throughput_bin": "200ms"
//!     }
//! }"#).unwrap();
//! config.validate().unwrap();
//! ```

use crate::{
    attachment::AttachmentMode,
    defaults::{
        DEFAULT_BASE_STATION_BANDWIDTH, DEFAULT_FIRST_IMSI, DEFAULT_MAX_TERMINALS,
        DEFAULT_THROUGHPUT_BIN,
    },
    measure::Bandwidth,
    time::{SimTime, duration_str},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("default_max_terminals must be at least 1")]
    ZeroMaxTerminals,
    #[error("first_imsi must not be 0")]
    ZeroImsi,
    #[error("block attachment needs at least 1 terminal per base station")]
    ZeroBlockSize,
    #[error("run window stops ({stop}) before it starts ({start})")]
    InvalidWindow { start: SimTime, stop: SimTime },
    #[error("throughput bin must be longer than 0s")]
    ZeroThroughputBin,
}

/// Defaults applied to entities registered in the [`Topology`].
///
/// [`Topology`]: crate::topology::Topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TopologyConfig {
    /// carrier capacity of base stations that do not set one
    pub default_bandwidth: Bandwidth,
    /// admission capacity of base stations that do not set one
    pub default_max_terminals: usize,
    /// IMSI of the first terminal
    pub first_imsi: u64,
}

/// Configuration of the [`AttachmentPolicy`].
///
/// [`AttachmentPolicy`]: crate::attachment::AttachmentPolicy
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttachmentConfig {
    pub mode: AttachmentMode,
}

/// The simulated interval traffic is offered over.
///
/// Used to compute the offered load of every flow in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunWindow {
    pub start: SimTime,
    pub stop: SimTime,
}

/// Configuration of the flow statistics [`Aggregator`].
///
/// [`Aggregator`]: crate::flow::Aggregator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregatorConfig {
    /// when traffic starts and stops; without it the offered load is
    /// reported as 0
    pub window: Option<RunWindow>,
    /// width of a bin of the throughput trace
    #[serde(with = "duration_str")]
    pub throughput_bin: Duration,
}

/// The configuration of a whole [`RadioNetwork`].
///
/// [`RadioNetwork`]: crate::network::RadioNetwork
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub topology: TopologyConfig,
    pub attachment: AttachmentConfig,
    pub aggregator: AggregatorConfig,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            default_bandwidth: DEFAULT_BASE_STATION_BANDWIDTH,
            default_max_terminals: DEFAULT_MAX_TERMINALS,
            first_imsi: DEFAULT_FIRST_IMSI,
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window: None,
            throughput_bin: DEFAULT_THROUGHPUT_BIN,
        }
    }
}

impl TopologyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_max_terminals == 0 {
            return Err(ConfigError::ZeroMaxTerminals);
        }
        if self.first_imsi == 0 {
            return Err(ConfigError::ZeroImsi);
        }
        Ok(())
    }
}

impl AttachmentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.mode {
            AttachmentMode::Block {
                per_base_station: 0,
            } => Err(ConfigError::ZeroBlockSize),
            _ => Ok(()),
        }
    }
}

impl RunWindow {
    /// Length of the window.
    pub fn duration(&self) -> Duration {
        self.stop.saturating_duration_since(self.start)
    }
}

impl AggregatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(RunWindow { start, stop }) = self.window {
            if stop < start {
                return Err(ConfigError::InvalidWindow { start, stop });
            }
        }
        if self.throughput_bin.is_zero() {
            return Err(ConfigError::ZeroThroughputBin);
        }
        Ok(())
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.topology.validate()?;
        self.attachment.validate()?;
        self.aggregator.validate()
    }
}
