//! Live row-tree maintenance for parameter values.
//!
//! [`ValueTreeSynchronizer`] materializes the Option x State x Component
//! tree for one parameter-like slot and keeps it consistent under change
//! notifications, repairing only what a change invalidates and preserving
//! row identity everywhere else.

pub mod error;
pub mod row;
pub mod synchronizer;

pub use error::{Result, TreeError};
pub use row::{Row, RowArena, RowId, RowKind, ValueCells};
pub use synchronizer::{ContainerRef, RepairOutcome, SlotKey, ValueTreeSynchronizer};
