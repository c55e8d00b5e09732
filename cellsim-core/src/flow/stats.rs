use crate::time::SimTime;
use std::time::Duration;

const MEGA: f64 = 1_000_000.0;

/// Counters of one flow.
///
/// Only the [`Aggregator`] mutates them, the derived metrics are computed on
/// demand when reporting.
///
/// [`Aggregator`]: super::Aggregator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowStats {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub delay_sum: Duration,
    pub jitter_sum: Duration,
    pub first_tx: Option<SimTime>,
    pub last_tx: Option<SimTime>,
    pub first_rx: Option<SimTime>,
    pub last_rx: Option<SimTime>,
    /// one way delay of the last received packet
    pub last_delay: Option<Duration>,
}

impl FlowStats {
    pub(crate) fn record_sent(&mut self, size: u64, at: SimTime) {
        self.tx_packets += 1;
        self.tx_bytes += size;
        self.first_tx.get_or_insert(at);
        self.last_tx = Some(at);
    }

    pub(crate) fn record_received(&mut self, size: u64, at: SimTime, delay: Duration) {
        self.rx_packets += 1;
        self.rx_bytes += size;
        self.delay_sum += delay;
        if let Some(previous) = self.last_delay {
            self.jitter_sum += delay.abs_diff(previous);
        }
        self.last_delay = Some(delay);
        self.first_rx.get_or_insert(at);
        self.last_rx = Some(at);
    }

    /// Interval from the first transmission to the last reception.
    ///
    /// Falls back to the first reception when no transmission was recorded.
    pub fn rx_window(&self) -> Duration {
        let Some(last_rx) = self.last_rx else {
            return Duration::ZERO;
        };
        match self.first_tx.or(self.first_rx) {
            Some(start) => last_rx.saturating_duration_since(start),
            None => Duration::ZERO,
        }
    }

    /// Received throughput in Mbps (10^6 bits per second).
    pub fn throughput_mbps(&self) -> f64 {
        let window = self.rx_window();
        if self.rx_packets == 0 || window.is_zero() {
            return 0.0;
        }
        self.rx_bytes as f64 * 8.0 / window.as_secs_f64() / MEGA
    }

    /// Mean one way delay in milliseconds.
    pub fn mean_delay_ms(&self) -> f64 {
        if self.rx_packets == 0 {
            return 0.0;
        }
        self.delay_sum.as_secs_f64() * 1_000.0 / self.rx_packets as f64
    }

    /// Mean jitter in milliseconds.
    pub fn mean_jitter_ms(&self) -> f64 {
        if self.rx_packets == 0 {
            return 0.0;
        }
        self.jitter_sum.as_secs_f64() * 1_000.0 / self.rx_packets as f64
    }

    /// Offered load in Mbps over the run window.
    pub fn offered_mbps(&self, window: Option<Duration>) -> f64 {
        match window {
            Some(window) if !window.is_zero() => {
                self.tx_bytes as f64 * 8.0 / window.as_secs_f64() / MEGA
            }
            _ => 0.0,
        }
    }
}
