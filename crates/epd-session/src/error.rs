use thiserror::Error;

use epd_model::Iid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown object {0}")]
    UnknownObject(Iid),
}

pub type Result<T> = std::result::Result<T, SessionError>;
