use thiserror::Error;

use epd_model::Iid;
use epd_session::SessionError;

use crate::row::RowId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The subject is state-dependent but its actual-state list is missing.
    #[error("state dependence of {subject} points at missing state list {state_list}")]
    MissingStateInChain { subject: Iid, state_list: Iid },
    /// A required contextual container (iteration, usage) is absent.
    #[error("required container {container} is missing")]
    MissingRequiredContainer { container: Iid },
    /// The write collaborator refused the request; the row keeps its last
    /// confirmed value.
    #[error("write rejected for row {row}: {reason}")]
    WriteRejected { row: RowId, reason: String },
    #[error("row {0} is not editable")]
    NotEditable(RowId),
    #[error("no such row {0}")]
    RowNotFound(RowId),
    #[error("unknown object {0}")]
    UnknownObject(Iid),
}

impl From<SessionError> for TreeError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::UnknownObject(iid) => TreeError::UnknownObject(iid),
        }
    }
}

pub type Result<T> = std::result::Result<T, TreeError>;
