//! Simulated time.
//!
//! Every stimulus the core reacts to is stamped with a [`SimTime`]: the
//! amount of simulated time elapsed since the start of the run. The core
//! never reads a wall clock.

use anyhow::{anyhow, bail, ensure};
use logos::{Lexer, Logos};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::{fmt, ops::Add, str::FromStr, time::Duration};

/// An instant on the simulation clock.
///
/// # Parsing and display
///
/// ```
/// # use cellsim_core::SimTime;
/// let t: SimTime = "1s 500ms".parse().unwrap();
/// assert_eq!(t, SimTime::from_millis(1_500));
/// assert_eq!(t.to_string(), "1s500ms");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimTime(Duration);

impl SimTime {
    /// The start of the run.
    pub const ZERO: Self = Self(Duration::ZERO);

    #[inline]
    pub const fn new(since_start: Duration) -> Self {
        Self(since_start)
    }

    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        Self(Duration::from_micros(micros))
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0.as_secs_f64()
    }

    /// get the elapsed time since the start of the run
    #[inline]
    pub fn into_duration(self) -> Duration {
        self.0
    }

    /// Returns the time elapsed from `earlier` to `self`, or
    /// [`Duration::ZERO`] if `earlier` is later than `self`.
    pub fn saturating_duration_since(self, earlier: SimTime) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

/// Saturates at the largest representable time.
impl Add<Duration> for SimTime {
    type Output = SimTime;
    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0.saturating_add(rhs))
    }
}

impl From<Duration> for SimTime {
    fn from(value: Duration) -> Self {
        Self::new(value)
    }
}

impl From<SimTime> for Duration {
    fn from(value: SimTime) -> Self {
        value.into_duration()
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_duration(self.0, f)
    }
}

impl FromStr for SimTime {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s).map(Self)
    }
}

impl Serialize for SimTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SimTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Writes a duration as its non-zero components, largest first
/// (`1s542ms`, `250µs`). A zero duration is written `0s`.
fn fmt_duration(duration: Duration, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if duration.is_zero() {
        return f.write_str("0s");
    }

    let secs = duration.as_secs();
    let nanos = duration.subsec_nanos();
    let millis = nanos / 1_000_000;
    let micros = (nanos / 1_000) % 1_000;
    let nanos = nanos % 1_000;

    if secs > 0 {
        write!(f, "{secs}s")?;
    }
    if millis > 0 {
        write!(f, "{millis}ms")?;
    }
    if micros > 0 {
        write!(f, "{micros}µs")?;
    }
    if nanos > 0 {
        write!(f, "{nanos}ns")?;
    }
    Ok(())
}

/// Parse a human readable duration such as `200ms` or `1s 500ms`.
///
/// Components are summed. Accepted units: `ns`, `us`/`µs`, `ms`, `s`, `m`.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let mut lex = Lexer::<'_, Token>::new(s);

    let mut durations = Vec::new();

    while let Some(next) = lex.next() {
        let number = next.map_err(|()| anyhow!("Failed to parse: {s}"))?;

        ensure!(
            number == Token::Value,
            "Expecting duration to starts with number. Cannot parse {s}"
        );
        let number: u64 = lex.slice().parse()?;

        let Some(Ok(measure)) = lex.next() else {
            bail!("Expecting a measure, failed to parse: {s}")
        };
        let duration = match measure {
            Token::NanoSeconds => Duration::from_nanos(number),
            Token::MicroSeconds => Duration::from_micros(number),
            Token::MilliSeconds => Duration::from_millis(number),
            Token::Seconds => Duration::from_secs(number),
            Token::Minutes => number
                .checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| anyhow!("Duration `{s}' is too large"))?,
            Token::Value => bail!("Failed to parse `{s}', expecting a measure."),
        };
        durations.push(duration);
    }

    ensure!(!durations.is_empty(), "Expecting a duration, got `{s}'");

    durations
        .into_iter()
        .try_fold(Duration::ZERO, Duration::checked_add)
        .ok_or_else(|| anyhow!("Duration `{s}' is too large"))
}

/// `serde(with = ...)` adapter storing a [`Duration`] as its human
/// readable form (`"200ms"`).
pub mod duration_str {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&SimTime(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(de::Error::custom)
    }
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")] // Ignore this regex pattern between tokens
enum Token {
    #[token("ns")]
    NanoSeconds,
    #[regex("us|μs|µs")]
    MicroSeconds,
    #[token("ms")]
    MilliSeconds,
    #[token("s")]
    Seconds,
    #[token("m")]
    Minutes,

    #[regex("[0-9]+")]
    Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logos_lexer() {
        let mut lex = Token::lexer("1ns");

        assert_eq!(lex.next(), Some(Ok(Token::Value)));
        assert_eq!(lex.span(), 0..1);
        assert_eq!(lex.slice(), "1");

        assert_eq!(lex.next(), Some(Ok(Token::NanoSeconds)));
        assert_eq!(lex.span(), 1..3);
        assert_eq!(lex.slice(), "ns");
    }

    #[test]
    fn parse() {
        let SimTime(duration) = "123ms".parse().unwrap();
        assert_eq!(duration.as_millis(), 123);

        let SimTime(duration) = "1s 2000ms 3000000us".parse().unwrap();
        assert_eq!(duration.as_secs(), 6);

        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn parse_invalid_strings() {
        assert!("150".parse::<SimTime>().is_err());
        assert!("ms".parse::<SimTime>().is_err());
        assert!("".parse::<SimTime>().is_err());
        assert!("1.5s".parse::<SimTime>().is_err());
    }

    #[test]
    fn add_saturates() {
        let end = SimTime::new(Duration::MAX);
        assert_eq!(end + Duration::from_secs(1), end);
    }

    #[test]
    fn parse_too_large() {
        assert!(parse_duration("307445734561825861m").is_err());
        assert!(parse_duration("18446744073709551615s 1s").is_err());
        assert!(
            serde_json::from_str::<crate::config::AggregatorConfig>(
                r#"{ "throughput_bin": "307445734561825861m" }"#
            )
            .is_err()
        );
    }

    #[test]
    fn display() {
        assert_eq!(SimTime::ZERO.to_string(), "0s");
        assert_eq!(SimTime::from_millis(150).to_string(), "150ms");
        assert_eq!(SimTime::from_millis(1_542).to_string(), "1s542ms");
        assert_eq!(SimTime::from_micros(1).to_string(), "1µs");
    }

    #[test]
    fn display_round_trip() {
        let original = SimTime::new(Duration::from_nanos(2_003_004_005));
        let parsed: SimTime = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn saturating_duration_since() {
        let early = SimTime::from_millis(10);
        let late = SimTime::from_millis(25);

        assert_eq!(
            late.saturating_duration_since(early),
            Duration::from_millis(15)
        );
        assert_eq!(early.saturating_duration_since(late), Duration::ZERO);
    }
}
