use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::{fmt, str};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const ZERO: Self = $name::new(0);
            pub const ONE: Self = $name::new(1);

            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            #[inline]
            pub const fn into_u64(self) -> u64 {
                self.0
            }

            #[must_use = "function does not modify the current value"]
            pub(crate) fn next(self) -> Self {
                Self::new(self.0 + 1)
            }
        }

        impl str::FromStr for $name {
            type Err = anyhow::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self).map_err(|error| anyhow!("{error}"))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

entity_id! {
    /// The identifier of a base station (eNB) in the [`Topology`].
    ///
    /// Identifiers are handed out from `1`; [`BaseStationId::ZERO`] is never
    /// assigned.
    ///
    /// [`Topology`]: crate::topology::Topology
    BaseStationId
}

entity_id! {
    /// The identifier of a terminal (UE) in the [`Topology`].
    ///
    /// [`Topology`]: crate::topology::Topology
    TerminalId
}

entity_id! {
    /// International mobile subscriber identity, unique per terminal.
    Imsi
}

entity_id! {
    /// The identifier of a dedicated bearer in the [`BearerRegistry`].
    ///
    /// Identifiers grow with activation order, which is also the order
    /// filters are evaluated in.
    ///
    /// [`BearerRegistry`]: crate::bearer::BearerRegistry
    BearerId
}

entity_id! {
    /// The identifier of a flow tracked by the [`Aggregator`].
    ///
    /// [`Aggregator`]: crate::flow::Aggregator
    FlowId
}
