use thiserror::Error;

use crate::{node::NodeRef, GridId};

/// Errors from direct graph access. Searches never return these; a search that cannot complete
/// ends in [`crate::job::JobState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathfindingError {
    #[error("{0} is not part of the pathfinding graph")]
    UnknownGrid(GridId),
    #[error("node handle {0:?} refers to a grid that has since been removed")]
    StaleNode(NodeRef),
}
