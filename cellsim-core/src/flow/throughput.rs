//! Binned throughput trace.
//!
//! The sampler sums the bytes received by every flow per fixed width bin.
//! Each bin becomes one `<seconds> <throughput>` line, the throughput being
//! expressed in Mib/s (`bytes * 8 / bin / 1024 / 1024`).

use crate::time::SimTime;
use std::{collections::BTreeMap, convert::Infallible, fmt, str::FromStr, time::Duration};

/// One line of a [`ThroughputTrace`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    /// end of the bin
    pub at: SimTime,
    /// Mib/s
    pub throughput: f64,
}

/// Received bytes per bin, starting at `origin`.
#[derive(Debug, Clone)]
pub struct ThroughputSampler {
    bin: Duration,
    origin: SimTime,
    bins: BTreeMap<u64, u64>,
}

/// A sequence of throughput samples.
///
/// ```
/// # use cellsim_core::flow::ThroughputTrace;
/// let trace: ThroughputTrace = "0.2 1.5\n0.4 2.5\ntotal n/a\n".parse().unwrap();
/// assert_eq!(trace.len(), 2);
/// assert_eq!(trace.mean(), Some(2.0));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThroughputTrace(Vec<ThroughputSample>);

impl ThroughputSampler {
    pub fn new(bin: Duration, origin: SimTime) -> Self {
        Self {
            bin,
            origin,
            bins: BTreeMap::new(),
        }
    }

    pub fn bin(&self) -> Duration {
        self.bin
    }

    /// Account `bytes` received at `at`. Receptions before the origin are
    /// ignored.
    pub fn record(&mut self, bytes: u64, at: SimTime) {
        if at < self.origin {
            return;
        }
        let elapsed = at.saturating_duration_since(self.origin).as_nanos();
        let Some(index) = elapsed.checked_div(self.bin.as_nanos()) else {
            return;
        };
        let Ok(index) = u64::try_from(index) else {
            return;
        };
        *self.bins.entry(index).or_default() += bytes;
    }

    /// Samples of every complete bin before `until`, or up to the last bin
    /// with data when `until` is `None`. Bins without data are reported as 0.
    pub fn trace(&self, until: Option<SimTime>) -> ThroughputTrace {
        let bin_nanos = self.bin.as_nanos();
        if bin_nanos == 0 {
            return ThroughputTrace::default();
        }

        let count = match until {
            Some(until) => until.saturating_duration_since(self.origin).as_nanos() / bin_nanos,
            None => self
                .bins
                .last_key_value()
                .map_or(0, |(index, _)| u128::from(*index) + 1),
        };

        let bin_secs = self.bin.as_secs_f64();
        let mut at = self.origin;
        let mut samples = Vec::new();
        for index in 0..count {
            at = at + self.bin;
            let bytes = u64::try_from(index)
                .ok()
                .and_then(|index| self.bins.get(&index))
                .copied()
                .unwrap_or_default();
            samples.push(ThroughputSample {
                at,
                throughput: bytes as f64 * 8.0 / bin_secs / 1024.0 / 1024.0,
            });
        }

        ThroughputTrace(samples)
    }
}

impl ThroughputTrace {
    pub fn samples(&self) -> &[ThroughputSample] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Mean of the throughput column, `None` without samples.
    pub fn mean(&self) -> Option<f64> {
        if self.0.is_empty() {
            return None;
        }
        let total: f64 = self.0.iter().map(|sample| sample.throughput).sum();
        Some(total / self.0.len() as f64)
    }
}

impl fmt::Display for ThroughputTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for sample in &self.0 {
            writeln!(f, "{:.3} {:.6}", sample.at.as_secs_f64(), sample.throughput)?;
        }
        Ok(())
    }
}

impl FromStr for ThroughputTrace {
    type Err = Infallible;

    /// Lines with fewer than two columns are ignored, lines whose columns
    /// are not numbers are skipped with a warning.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut samples = Vec::new();

        for (number, line) in s.lines().enumerate() {
            let mut columns = line.split_whitespace();
            let (Some(time), Some(value)) = (columns.next(), columns.next()) else {
                continue;
            };

            let Ok(throughput) = value.parse::<f64>() else {
                tracing::warn!(line = number + 1, %value, "skipping non-numeric throughput value");
                continue;
            };
            let Some(at) = time
                .parse::<f64>()
                .ok()
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            else {
                tracing::warn!(line = number + 1, %time, "skipping invalid sample time");
                continue;
            };

            samples.push(ThroughputSample {
                at: SimTime::new(at),
                throughput,
            });
        }

        Ok(Self(samples))
    }
}

impl FromIterator<ThroughputSample> for ThroughputTrace {
    fn from_iter<I: IntoIterator<Item = ThroughputSample>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BIN: Duration = Duration::from_millis(200);

    #[test]
    fn bins_bytes() {
        let mut sampler = ThroughputSampler::new(BIN, SimTime::ZERO);
        // 26_214 bytes in 200ms is 1 Mib/s (up to rounding)
        sampler.record(13_107, SimTime::from_millis(10));
        sampler.record(13_107, SimTime::from_millis(199));
        sampler.record(1, SimTime::from_millis(450));

        let trace = sampler.trace(None);
        let samples = trace.samples();

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].at, SimTime::from_millis(200));
        assert!((samples[0].throughput - 26_214.0 * 8.0 / 0.2 / 1_048_576.0).abs() < 1e-12);
        assert_eq!(samples[1].throughput, 0.0);
        assert_eq!(samples[2].at, SimTime::from_millis(600));
    }

    #[test]
    fn trace_until_includes_empty_bins() {
        let mut sampler = ThroughputSampler::new(BIN, SimTime::from_millis(100));
        sampler.record(1_000, SimTime::from_millis(50)); // before origin
        sampler.record(1_000, SimTime::from_millis(150));

        let trace = sampler.trace(Some(SimTime::from_secs(1)));

        assert_eq!(trace.len(), 4);
        assert!(trace.samples()[0].throughput > 0.0);
        assert!(trace.samples()[1..].iter().all(|s| s.throughput == 0.0));
    }

    #[test]
    fn render() {
        let trace: ThroughputTrace = [
            ThroughputSample {
                at: SimTime::from_millis(200),
                throughput: 1.5,
            },
            ThroughputSample {
                at: SimTime::from_millis(400),
                throughput: 0.0,
            },
        ]
        .into_iter()
        .collect();

        assert_eq!(trace.to_string(), "0.200 1.500000\n0.400 0.000000\n");
    }

    #[test]
    fn parse_skips_bad_lines() {
        let text = "# time value\n0.2 4.0\n0.4 abc\n\n0.6 2.0\nsingle\n";
        let trace: ThroughputTrace = text.parse().unwrap();

        assert_eq!(trace.len(), 2);
        assert_eq!(trace.mean(), Some(3.0));
    }

    #[test]
    fn empty_mean() {
        assert_eq!(ThroughputTrace::default().mean(), None);
        let trace: ThroughputTrace = "nothing here\n".parse().unwrap();
        assert_eq!(trace.mean(), None);
    }
}
