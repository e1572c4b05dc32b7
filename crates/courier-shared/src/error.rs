use thiserror::Error;

/// Logical validation failures, rejected before any write reaches a store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("direct conversation must have exactly 2 participants, got {0}")]
    DirectParticipantCount(usize),

    #[error("group conversation must have at least 3 participants, got {0}")]
    GroupParticipantCount(usize),

    #[error("group conversation requires a name")]
    MissingGroupName,

    #[error("message must carry text or an image")]
    EmptyMessage,
}
