use anyhow::{anyhow, bail, ensure};
use logos::{Lexer, Logos};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::{fmt, str::FromStr};

/// An inclusive range of transport ports.
///
/// ```
/// # use cellsim_core::bearer::PortRange;
/// let range: PortRange = "1000-1001".parse().unwrap();
/// assert!(range.contains(1001));
/// assert!(range.overlaps(&PortRange::single(1000)));
/// assert_eq!("2000".parse::<PortRange>().unwrap(), PortRange::single(2000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortRange {
    start: u16,
    end: u16,
}

/// Which way a [`PacketFilter`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// towards the terminal
    Downlink,
    /// from the terminal
    Uplink,
    #[default]
    Bidirectional,
}

/// Which way a packet travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketDirection {
    Downlink,
    Uplink,
}

/// A single rule of a [`TrafficFilter`].
///
/// The local range applies to the port on the terminal side, the remote
/// range to the port on the network side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacketFilter {
    pub direction: Direction,
    pub local: PortRange,
    pub remote: PortRange,
}

/// Ordered list of [`PacketFilter`]s of one bearer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrafficFilter(Vec<PacketFilter>);

impl PortRange {
    /// Every port.
    pub const ANY: Self = Self {
        start: 0,
        end: u16::MAX,
    };

    /// Returns `None` if `start > end`.
    pub const fn new(start: u16, end: u16) -> Option<Self> {
        if start > end {
            None
        } else {
            Some(Self { start, end })
        }
    }

    pub const fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    #[inline]
    pub const fn start(&self) -> u16 {
        self.start
    }

    #[inline]
    pub const fn end(&self) -> u16 {
        self.end
    }

    pub const fn contains(&self, port: u16) -> bool {
        self.start <= port && port <= self.end
    }

    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::ANY
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")]
enum PortToken {
    #[token("-")]
    Dash,

    #[regex("[0-9]+")]
    Value,
}

impl FromStr for PortRange {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lex = Lexer::<'_, PortToken>::new(s);

        let Some(Ok(PortToken::Value)) = lex.next() else {
            bail!("Expecting to parse a port number in `{s}'")
        };
        let start: u16 = lex.slice().parse()?;

        let end = match lex.next() {
            None => return Ok(Self::single(start)),
            Some(Ok(PortToken::Dash)) => {
                let Some(Ok(PortToken::Value)) = lex.next() else {
                    bail!("Expecting a port number after `-' in `{s}'")
                };
                lex.slice().parse::<u16>()?
            }
            Some(_) => bail!("Expecting `-' or the end of the range in `{s}'"),
        };

        ensure!(
            lex.next().is_none(),
            "Not expecting any other tokens to parse a port range"
        );

        Self::new(start, end).ok_or_else(|| anyhow!("Port range `{s}' ends before it starts"))
    }
}

impl Serialize for PortRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PortRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

impl Direction {
    /// Equal directions overlap, and [`Direction::Bidirectional`] overlaps
    /// everything.
    pub fn overlaps(&self, other: &Self) -> bool {
        self == other || *self == Self::Bidirectional || *other == Self::Bidirectional
    }

    pub fn covers(&self, packet: PacketDirection) -> bool {
        matches!(
            (self, packet),
            (Self::Bidirectional, _)
                | (Self::Downlink, PacketDirection::Downlink)
                | (Self::Uplink, PacketDirection::Uplink)
        )
    }
}

impl PacketDirection {
    /// Split `(source_port, destination_port)` into `(local, remote)`.
    ///
    /// The terminal receives downlink packets, so its port is the
    /// destination one; it sends uplink packets from its source port.
    pub fn local_remote(&self, source_port: u16, destination_port: u16) -> (u16, u16) {
        match self {
            Self::Downlink => (destination_port, source_port),
            Self::Uplink => (source_port, destination_port),
        }
    }
}

impl PacketFilter {
    /// A filter of the given direction matching every port.
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            ..Self::default()
        }
    }

    pub fn with_local(mut self, local: PortRange) -> Self {
        self.local = local;
        self
    }

    pub fn with_remote(mut self, remote: PortRange) -> Self {
        self.remote = remote;
        self
    }

    pub fn matches(&self, direction: PacketDirection, local_port: u16, remote_port: u16) -> bool {
        self.direction.covers(direction)
            && self.local.contains(local_port)
            && self.remote.contains(remote_port)
    }

    /// Some packet would match both filters.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.direction.overlaps(&other.direction)
            && self.local.overlaps(&other.local)
            && self.remote.overlaps(&other.remote)
    }
}

impl TrafficFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: PacketFilter) {
        self.0.push(filter);
    }

    pub fn with(mut self, filter: PacketFilter) -> Self {
        self.push(filter);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PacketFilter> {
        self.0.iter()
    }

    pub fn matches(&self, direction: PacketDirection, local_port: u16, remote_port: u16) -> bool {
        self.0
            .iter()
            .any(|filter| filter.matches(direction, local_port, remote_port))
    }

    /// The first packet filter of `self` overlapping one of `other`.
    pub fn overlap(&self, other: &Self) -> Option<&PacketFilter> {
        self.0
            .iter()
            .find(|mine| other.0.iter().any(|theirs| mine.overlaps(theirs)))
    }
}

impl From<Vec<PacketFilter>> for TrafficFilter {
    fn from(filters: Vec<PacketFilter>) -> Self {
        Self(filters)
    }
}

impl FromIterator<PacketFilter> for TrafficFilter {
    fn from_iter<I: IntoIterator<Item = PacketFilter>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u16, end: u16) -> PortRange {
        PortRange::new(start, end).unwrap()
    }

    #[test]
    fn parse_port_range() {
        assert_eq!("1000".parse::<PortRange>().unwrap(), PortRange::single(1000));
        assert_eq!("1000-1001".parse::<PortRange>().unwrap(), range(1000, 1001));
        assert_eq!("0 - 65535".parse::<PortRange>().unwrap(), PortRange::ANY);
    }

    #[test]
    fn parse_invalid_port_range() {
        assert!("".parse::<PortRange>().is_err());
        assert!("-10".parse::<PortRange>().is_err());
        assert!("10-".parse::<PortRange>().is_err());
        assert!("1001-1000".parse::<PortRange>().is_err());
        assert!("70000".parse::<PortRange>().is_err());
        assert!("1-2-3".parse::<PortRange>().is_err());
    }

    #[test]
    fn range_overlap() {
        assert!(range(1000, 1000).overlaps(&range(1000, 1000)));
        assert!(range(10, 20).overlaps(&range(20, 30)));
        assert!(!range(1000, 1000).overlaps(&range(1001, 1001)));
        assert!(PortRange::ANY.overlaps(&range(5, 5)));
    }

    #[test]
    fn direction_overlap() {
        use Direction::*;

        assert!(Downlink.overlaps(&Downlink));
        assert!(!Downlink.overlaps(&Uplink));
        assert!(Bidirectional.overlaps(&Uplink));
        assert!(Downlink.overlaps(&Bidirectional));
    }

    #[test]
    fn local_port_depends_on_direction() {
        assert_eq!(PacketDirection::Downlink.local_remote(80, 1000), (1000, 80));
        assert_eq!(PacketDirection::Uplink.local_remote(1000, 80), (1000, 80));
    }

    #[test]
    fn packet_filter_matches() {
        let filter = PacketFilter::new(Direction::Downlink).with_local(PortRange::single(1000));

        assert!(filter.matches(PacketDirection::Downlink, 1000, 49_153));
        assert!(!filter.matches(PacketDirection::Uplink, 1000, 49_153));
        assert!(!filter.matches(PacketDirection::Downlink, 1001, 49_153));
    }

    #[test]
    fn packet_filter_overlap_needs_both_ranges() {
        let a = PacketFilter::new(Direction::Uplink)
            .with_local(range(1000, 1010))
            .with_remote(PortRange::single(80));
        let b = PacketFilter::new(Direction::Bidirectional)
            .with_local(range(1005, 1020))
            .with_remote(PortRange::single(443));

        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&b.with_remote(PortRange::ANY)));
    }

    #[test]
    fn traffic_filter_overlap() {
        let existing = TrafficFilter::new()
            .with(PacketFilter::new(Direction::Downlink).with_local(PortRange::single(1000)));
        let candidate = TrafficFilter::new()
            .with(PacketFilter::new(Direction::Downlink).with_local(PortRange::single(1001)))
            .with(PacketFilter::new(Direction::Bidirectional).with_local(range(990, 1000)));

        assert_eq!(candidate.overlap(&existing), candidate.iter().nth(1));
    }

    #[test]
    fn deserialize_packet_filter() {
        let filter: PacketFilter =
            serde_json::from_str(r#"{ "direction": "downlink", "local": "1000" }"#).unwrap();
        assert_eq!(
            filter,
            PacketFilter::new(Direction::Downlink).with_local(PortRange::single(1000))
        );
    }
}
