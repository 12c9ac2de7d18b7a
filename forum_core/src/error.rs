use sea_orm::DbErr;
use thiserror::Error;

/// Reasons a restructuring request is refused. Always raised before the
/// first write, so a rejected call leaves the store untouched.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no posts were selected")]
    NoPostsSelected,

    #[error("cannot split off every post of a topic")]
    SelectedAllPosts,

    #[error("the first post of a topic cannot be split off")]
    SplitFirstPost,

    #[error("could not find the selected messages")]
    CannotFindMessages,

    #[error("at least two topics are needed to merge")]
    NeedMoreTopics,

    #[error("target board does not exist")]
    NoBoard,
}

#[derive(Debug, Error)]
pub enum RestructureError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("not allowed to act on any of the selected topics")]
    Access,

    /// The cooperative deadline passed before the first write or between two
    /// self-contained chunks, so the call may be repeated with the same input.
    #[error("execution budget exhausted")]
    DeadlineExceeded,

    #[error("fatal database error")]
    DbError(#[from] DbErr),
}

impl RestructureError {
    pub fn validation(&self) -> Option<ValidationError> {
        match self {
            RestructureError::Validation(reason) => Some(*reason),
            _ => None,
        }
    }
}
