use crate::{
    attachment::AttachError, bearer::BearerError, config::ConfigError, flow::FlowError,
    handover::HandoverError, topology::TopologyError,
};
use thiserror::Error;

/// Any error returned by the [`RadioNetwork`].
///
/// [`RadioNetwork`]: crate::network::RadioNetwork
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Attach(#[from] AttachError),
    #[error(transparent)]
    Handover(#[from] HandoverError),
    #[error(transparent)]
    Bearer(#[from] BearerError),
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// The stimulus was dropped because the terminal's handover state did
    /// not allow it. The state is unchanged.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::Handover(HandoverError::InvalidTransition { .. }))
    }

    /// A base station, terminal, bearer or flow identifier was not found.
    pub fn is_unknown_entity(&self) -> bool {
        matches!(
            self,
            Self::Topology(TopologyError::UnknownBaseStation { .. } | TopologyError::UnknownTerminal { .. })
                | Self::Attach(AttachError::Topology(
                    TopologyError::UnknownBaseStation { .. } | TopologyError::UnknownTerminal { .. }
                ))
                | Self::Bearer(
                    BearerError::UnknownBearer { .. }
                        | BearerError::Topology(
                            TopologyError::UnknownBaseStation { .. }
                                | TopologyError::UnknownTerminal { .. }
                        )
                )
                | Self::Flow(FlowError::UnknownFlow { .. })
        )
    }
}
