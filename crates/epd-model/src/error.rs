use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// An array dimension carries a non-positive axis. The whole array is
    /// treated as having zero components.
    #[error("array dimension axis {axis} has non-positive extent {value}")]
    InvalidDimension { axis: usize, value: i64 },
    /// A flat component index outside `[1, component_count]`.
    #[error("flat index {index} outside [1, {count}]")]
    IndexOutOfRange { index: usize, count: usize },
    /// A coordinate with a different rank than the dimension it is mapped
    /// against, or an axis value outside `[1, d_i]`.
    #[error("coordinate {coordinate} does not address dimension {dimension}")]
    InvalidCoordinate {
        coordinate: String,
        dimension: String,
    },
    #[error("cannot parse {input:?} as a dimension string")]
    InvalidDimensionString { input: String },
    #[error("value set has {actual} entries per field, expected {expected}")]
    ValueArrayMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, ModelError>;
