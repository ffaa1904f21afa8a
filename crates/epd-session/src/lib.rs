pub mod access;
pub mod bus;
pub mod error;
pub mod event;
pub mod store;
pub mod write;

pub use access::{AccessControl, DomainWriteAccess, ReadOnlyAccess};
pub use bus::{ChangeBus, Watch};
pub use error::{Result, SessionError};
pub use event::{ChangeEvent, EventKind};
pub use store::{SessionStore, SessionWriter};
pub use write::{ValueField, WriteAction, WriteCollaborator, WriteError, WriteRequest};
