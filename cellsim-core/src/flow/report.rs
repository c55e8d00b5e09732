use super::{FiveTuple, FlowId, FlowStats};
use crate::{bearer::Classification, topology::TerminalId};
use serde::Serialize;
use std::{fmt, time::Duration};

/// Derived metrics of one flow, as rendered in the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowSummary {
    pub id: FlowId,
    pub terminal: TerminalId,
    pub classification: Classification,
    pub tuple: FiveTuple,
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub tx_offered_mbps: f64,
    pub rx_bytes: u64,
    pub throughput_mbps: f64,
    pub mean_delay_ms: f64,
    pub mean_jitter_ms: f64,
    pub rx_packets: u64,
}

/// Summary of every flow plus the cross flow means.
///
/// Rendering the same report always produces the same text, floats are
/// written with six decimals.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FlowReport {
    pub flows: Vec<FlowSummary>,
    pub mean_throughput_mbps: f64,
    pub mean_delay_ms: f64,
}

impl FlowSummary {
    pub(crate) fn new(
        id: FlowId,
        terminal: TerminalId,
        classification: Classification,
        tuple: FiveTuple,
        stats: &FlowStats,
        window: Option<Duration>,
    ) -> Self {
        Self {
            id,
            terminal,
            classification,
            tuple,
            tx_packets: stats.tx_packets,
            tx_bytes: stats.tx_bytes,
            tx_offered_mbps: stats.offered_mbps(window),
            rx_bytes: stats.rx_bytes,
            throughput_mbps: stats.throughput_mbps(),
            mean_delay_ms: stats.mean_delay_ms(),
            mean_jitter_ms: stats.mean_jitter_ms(),
            rx_packets: stats.rx_packets,
        }
    }
}

impl FlowReport {
    /// Flows must already be ordered by identifier.
    pub(crate) fn new(flows: Vec<FlowSummary>) -> Self {
        let (mean_throughput_mbps, mean_delay_ms) = if flows.is_empty() {
            (0.0, 0.0)
        } else {
            let count = flows.len() as f64;
            let throughput: f64 = flows.iter().map(|flow| flow.throughput_mbps).sum();
            let delay: f64 = flows.iter().map(|flow| flow.mean_delay_ms).sum();
            (throughput / count, delay / count)
        };

        Self {
            flows,
            mean_throughput_mbps,
            mean_delay_ms,
        }
    }

    pub fn flow(&self, id: FlowId) -> Option<&FlowSummary> {
        self.flows.iter().find(|flow| flow.id == id)
    }
}

impl fmt::Display for FlowSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Flow {} ({}) proto {}",
            self.id, self.tuple, self.tuple.protocol
        )?;
        writeln!(f, "  Tx Packets: {}", self.tx_packets)?;
        writeln!(f, "  Tx Bytes:   {}", self.tx_bytes)?;
        writeln!(f, "  TxOffered:  {:.6} Mbps", self.tx_offered_mbps)?;
        writeln!(f, "  Rx Bytes:   {}", self.rx_bytes)?;
        writeln!(f, "  Throughput: {:.6} Mbps", self.throughput_mbps)?;
        writeln!(f, "  Mean delay:  {:.6} ms", self.mean_delay_ms)?;
        writeln!(f, "  Mean jitter:  {:.6} ms", self.mean_jitter_ms)?;
        writeln!(f, "  Rx Packets: {}", self.rx_packets)
    }
}

impl fmt::Display for FlowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for flow in &self.flows {
            write!(f, "{flow}")?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "  Mean flow throughput: {:.6} Mbps",
            self.mean_throughput_mbps
        )?;
        writeln!(f, "  Mean flow delay: {:.6} ms", self.mean_delay_ms)
    }
}
