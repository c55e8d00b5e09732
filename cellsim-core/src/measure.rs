use anyhow::{bail, ensure};
use logos::{Lexer, Logos};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::{fmt, str::FromStr};

/// Capacity of a radio carrier, in bits per second.
///
/// Units are decimal (`1kbps` is `1_000bps`) so they line up with the
/// Mbps (`10^6`) figures of the statistics report.
///
/// # Default
///
/// The default [`Bandwidth`] is the 20 MHz LTE carrier peak rate used by
/// [`DEFAULT_BASE_STATION_BANDWIDTH`].
///
/// # Example
///
/// ```
/// # use cellsim_core::Bandwidth;
/// let bw: Bandwidth = "20mbps".parse().unwrap();
/// assert_eq!(bw.bits_per_sec(), 20_000_000);
/// ```
///
/// [`DEFAULT_BASE_STATION_BANDWIDTH`]: crate::defaults::DEFAULT_BASE_STATION_BANDWIDTH
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bandwidth(
    /// bits per seconds
    u64,
);

impl Bandwidth {
    pub const ZERO: Self = Self::new(0);

    pub const fn new(bits_per_sec: u64) -> Self {
        Self(bits_per_sec)
    }

    #[inline]
    pub const fn bits_per_sec(&self) -> u64 {
        self.0
    }
}

impl Default for Bandwidth {
    fn default() -> Self {
        crate::defaults::DEFAULT_BASE_STATION_BANDWIDTH
    }
}

const K: u64 = 1_000;
const M: u64 = 1_000 * 1_000;
const G: u64 = 1_000 * 1_000 * 1_000;

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;

        if v != 0 && v % G == 0 {
            write!(f, "{}gbps", v / G)
        } else if v != 0 && v % M == 0 {
            write!(f, "{}mbps", v / M)
        } else if v != 0 && v % K == 0 {
            write!(f, "{}kbps", v / K)
        } else {
            write!(f, "{v}bps")
        }
    }
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")] // Ignore this regex pattern between tokens
enum BandwidthToken {
    #[regex("bps")]
    Bps,
    #[regex("kbps")]
    Kbps,
    #[regex("mbps")]
    Mbps,
    #[regex("gbps")]
    Gbps,

    #[regex("[0-9]+")]
    Value,
}

impl FromStr for Bandwidth {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lex = Lexer::<'_, BandwidthToken>::new(s);

        let Some(Ok(BandwidthToken::Value)) = lex.next() else {
            bail!("Expecting to parse a number")
        };
        let number: u64 = lex.slice().parse()?;
        let Some(Ok(token)) = lex.next() else {
            bail!("Expecting to parse a unit")
        };
        let multiplier = match token {
            BandwidthToken::Bps => 1,
            BandwidthToken::Kbps => K,
            BandwidthToken::Mbps => M,
            BandwidthToken::Gbps => G,
            BandwidthToken::Value => bail!("Expecting to parse a unit (bps, kbps, ...)"),
        };

        ensure!(
            lex.next().is_none(),
            "Not expecting any other tokens to parse a bandwidth"
        );

        let Some(bps) = number.checked_mul(multiplier) else {
            bail!("Bandwidth `{s}' does not fit in 64 bits")
        };

        Ok(Self(bps))
    }
}

impl Serialize for Bandwidth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Bandwidth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bandwidth() {
        macro_rules! assert_bandwidth {
            ($string:literal == $value:expr) => {
                assert_eq!($string.parse::<Bandwidth>().unwrap(), Bandwidth::new($value));
            };
        }

        assert_bandwidth!("0bps" == 0);
        assert_bandwidth!("42bps" == 42);
        assert_bandwidth!("42kbps" == 42_000);
        assert_bandwidth!("42mbps" == 42_000_000);
        assert_bandwidth!("1gbps" == 1_000_000_000);
        assert_bandwidth!("20 mbps" == 20_000_000);
    }

    #[test]
    fn print_bandwidth() {
        assert_eq!(Bandwidth::new(0).to_string(), "0bps");
        assert_eq!(Bandwidth::new(1_500).to_string(), "1500bps");
        assert_eq!(Bandwidth::new(75_000).to_string(), "75kbps");
        assert_eq!(Bandwidth::new(20_000_000).to_string(), "20mbps");
        assert_eq!(Bandwidth::new(3_000_000_000).to_string(), "3gbps");
    }

    #[test]
    fn parse_invalid_strings() {
        assert!("42".parse::<Bandwidth>().is_err()); // no unit
        assert!("mbps".parse::<Bandwidth>().is_err()); // no number
        assert!("".parse::<Bandwidth>().is_err()); // empty
        assert!("42mbps extra".parse::<Bandwidth>().is_err()); // trailing token
        assert!("18446744073709551615gbps".parse::<Bandwidth>().is_err()); // overflow
    }

    #[test]
    fn display_round_trip() {
        let original = Bandwidth::new(50_000_000);
        let parsed: Bandwidth = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }
}
