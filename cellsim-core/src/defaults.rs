use crate::{bearer::QosClass, measure::Bandwidth};
use std::time::Duration;

/// Default capacity of a base station carrier.
///
/// This is the peak downlink rate of a 20 MHz LTE carrier (100 resource
/// blocks, single stream).
///
/// ```
/// # use cellsim_core::defaults::*;
/// assert_eq!(
///     DEFAULT_BASE_STATION_BANDWIDTH.to_string(),
///     "75mbps"
/// );
/// ```
pub const DEFAULT_BASE_STATION_BANDWIDTH: Bandwidth = Bandwidth::new(75_000_000);

/// Default maximum number of terminals a base station serves.
///
/// By default a base station has a (virtually) unlimited admission
/// capacity.
pub const DEFAULT_MAX_TERMINALS: usize = usize::MAX;

/// IMSI given to the first registered terminal. Following terminals get
/// consecutive values.
pub const DEFAULT_FIRST_IMSI: u64 = 1;

/// Default width of a throughput trace bin.
///
/// ```
/// # use cellsim_core::{SimTime, defaults::*};
/// assert_eq!(SimTime::new(DEFAULT_THROUGHPUT_BIN).to_string(), "200ms");
/// ```
pub const DEFAULT_THROUGHPUT_BIN: Duration = Duration::from_millis(200);

/// Default QoS class of a dedicated bearer.
pub const DEFAULT_QOS_CLASS: QosClass = QosClass::NgbrVideoTcpDefault;

/// Default radius, in meters, of the disc terminals are dropped in around
/// a base station.
pub const DEFAULT_DISC_RADIUS: f64 = 500.0;
