//! Flat-index / tensor-coordinate mapping for array parameter types.
//!
//! Components of an array type are stored as a flat, 1-based list in
//! row-major order: coordinate `{1;1;...;1}` is flat index 1 and the last
//! axis varies fastest. The mapper here must stay bit-exact with that layout
//! because flattened component values are stored and retrieved by flat index
//! elsewhere in the system.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::parameter::ParameterTypeComponent;

/// Ordered axis extents of an array parameter type, rank >= 1.
///
/// Axes may hold any parsed integer; only strictly positive extents are
/// usable. A single non-positive axis invalidates the whole array, matching
/// the all-or-nothing validation the dimension editor performs. Non-positive
/// values are deliberately kept as parsed rather than rejected at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayDimension(Vec<i64>);

impl ArrayDimension {
    pub fn new(axes: Vec<i64>) -> Self {
        Self(axes)
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn axes(&self) -> &[i64] {
        &self.0
    }

    /// Total number of components: the product of the axes if every axis is
    /// strictly positive and the product is representable, otherwise 0.
    pub fn component_count(&self) -> usize {
        if self.0.is_empty() {
            return 0;
        }
        let mut count: usize = 1;
        for &axis in &self.0 {
            if axis <= 0 {
                return 0;
            }
            match count.checked_mul(axis as usize) {
                Some(product) => count = product,
                None => return 0,
            }
        }
        count
    }

    /// Returns the first offending axis if the dimension is unusable. An
    /// axis that pushes the running component count past `usize::MAX` is
    /// offending too.
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(ModelError::InvalidDimension { axis: 1, value: 0 });
        }
        let mut count: usize = 1;
        for (position, &axis) in self.0.iter().enumerate() {
            if axis <= 0 {
                return Err(ModelError::InvalidDimension {
                    axis: position + 1,
                    value: axis,
                });
            }
            count = count
                .checked_mul(axis as usize)
                .ok_or(ModelError::InvalidDimension {
                    axis: position + 1,
                    value: axis,
                })?;
        }
        Ok(())
    }
}

impl fmt::Display for ArrayDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, axis) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ";")?;
            }
            write!(f, "{axis}")?;
        }
        write!(f, "}}")
    }
}

impl FromStr for ArrayDimension {
    type Err = ModelError;

    /// Parse a user-edited dimension string of the form `{d1;d2;...}`.
    /// Surrounding braces are optional; axes are separated by `;`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or(trimmed);
        if inner.trim().is_empty() {
            return Err(ModelError::InvalidDimensionString {
                input: s.to_string(),
            });
        }
        let mut axes = Vec::new();
        for part in inner.split(';') {
            let axis = part
                .trim()
                .parse::<i64>()
                .map_err(|_| ModelError::InvalidDimensionString {
                    input: s.to_string(),
                })?;
            axes.push(axis);
        }
        Ok(Self(axes))
    }
}

/// Tensor coordinate of one flattened component, one 1-based value per axis.
///
/// Derived on demand from a flat index; never stored on the model, always
/// recomputed when the dimension changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentCoordinate(Vec<i64>);

impl ComponentCoordinate {
    pub fn new(values: Vec<i64>) -> Self {
        Self(values)
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn values(&self) -> &[i64] {
        &self.0
    }
}

impl fmt::Display for ComponentCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ";")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, "}}")
    }
}

/// Converts between flat component indexes and tensor coordinates for one
/// fixed [`ArrayDimension`].
///
/// The per-axis denominators `den(i) = d_{i+1} * ... * d_r` are computed once
/// at construction, not per coordinate. Each conversion is then O(rank):
/// `c_i = ceil((n - offset(i)) / den(i))` where `offset(i)` is the flat span
/// already consumed by the coordinates chosen on axes `1..i-1`.
#[derive(Debug, Clone)]
pub struct CoordinateMapper {
    dimension: ArrayDimension,
    denominators: Vec<usize>,
    component_count: usize,
}

impl CoordinateMapper {
    /// Build a mapper for `dimension`. Fails with
    /// [`ModelError::InvalidDimension`] if any axis is non-positive.
    pub fn new(dimension: &ArrayDimension) -> Result<Self> {
        dimension.validate()?;
        let rank = dimension.rank();
        let mut denominators = vec![1usize; rank];
        // validate() bounds the full product, so every suffix product fits
        for i in (0..rank.saturating_sub(1)).rev() {
            denominators[i] = denominators[i + 1] * dimension.axes()[i + 1] as usize;
        }
        Ok(Self {
            dimension: dimension.clone(),
            denominators,
            component_count: dimension.component_count(),
        })
    }

    pub fn component_count(&self) -> usize {
        self.component_count
    }

    pub fn dimension(&self) -> &ArrayDimension {
        &self.dimension
    }

    /// Map a 1-based flat index to its tensor coordinate.
    pub fn coordinate_of(&self, flat_index: usize) -> Result<ComponentCoordinate> {
        if flat_index < 1 || flat_index > self.component_count {
            return Err(ModelError::IndexOutOfRange {
                index: flat_index,
                count: self.component_count,
            });
        }
        let rank = self.dimension.rank();
        let mut values = vec![0i64; rank];
        for i in 0..rank {
            let mut offset = 0usize;
            for j in 0..i {
                offset += (values[j] as usize - 1) * self.denominators[j];
            }
            let remaining = flat_index - offset;
            // ceil(remaining / den) in integer arithmetic
            values[i] = remaining.div_ceil(self.denominators[i]) as i64;
        }
        Ok(ComponentCoordinate::new(values))
    }

    /// Map a tensor coordinate back to its 1-based flat index. Inverse of
    /// [`CoordinateMapper::coordinate_of`].
    pub fn flat_index_of(&self, coordinate: &ComponentCoordinate) -> Result<usize> {
        let rank = self.dimension.rank();
        if coordinate.rank() != rank {
            return Err(self.invalid_coordinate(coordinate));
        }
        let mut index = 1usize;
        for (i, &value) in coordinate.values().iter().enumerate() {
            if value < 1 || value > self.dimension.axes()[i] {
                return Err(self.invalid_coordinate(coordinate));
            }
            index += (value as usize - 1) * self.denominators[i];
        }
        Ok(index)
    }

    fn invalid_coordinate(&self, coordinate: &ComponentCoordinate) -> ModelError {
        ModelError::InvalidCoordinate {
            coordinate: coordinate.to_string(),
            dimension: self.dimension.to_string(),
        }
    }
}

/// Reconcile an existing flat component list against a user-edited dimension.
///
/// Components are kept by position up to the new component count, new ones
/// are created with the coordinate string as their short name, and every
/// surviving component has its coordinate label restamped. An invalid
/// dimension yields an empty list.
pub fn reconcile_components(
    existing: &[ParameterTypeComponent],
    dimension: &ArrayDimension,
) -> Result<Vec<ParameterTypeComponent>> {
    let mapper = match CoordinateMapper::new(dimension) {
        Ok(mapper) => mapper,
        Err(err) => {
            return match err {
                ModelError::InvalidDimension { .. } => Ok(Vec::new()),
                other => Err(other),
            };
        }
    };
    let mut components = Vec::with_capacity(mapper.component_count());
    for flat_index in 1..=mapper.component_count() {
        let coordinates = mapper.coordinate_of(flat_index)?.to_string();
        let component = match existing.get(flat_index - 1) {
            Some(component) => {
                let mut kept = component.clone();
                kept.coordinates = Some(coordinates);
                kept
            }
            None => ParameterTypeComponent::with_coordinates(coordinates),
        };
        components.push(component);
    }
    Ok(components)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_by_three_layout() {
        let dimension: ArrayDimension = "{2;3}".parse().expect("parse dimension");
        assert_eq!(dimension.component_count(), 6);
        let mapper = CoordinateMapper::new(&dimension).expect("mapper");
        assert_eq!(mapper.coordinate_of(1).unwrap().values(), &[1, 1]);
        assert_eq!(mapper.coordinate_of(4).unwrap().values(), &[2, 1]);
        assert_eq!(mapper.coordinate_of(6).unwrap().values(), &[2, 3]);
    }

    #[test]
    fn non_positive_axis_means_zero_components() {
        let dimension = ArrayDimension::new(vec![2, 0, 3]);
        assert_eq!(dimension.component_count(), 0);
        assert_eq!(
            dimension.validate(),
            Err(ModelError::InvalidDimension { axis: 2, value: 0 })
        );
        assert!(matches!(
            CoordinateMapper::new(&dimension),
            Err(ModelError::InvalidDimension { axis: 2, value: 0 })
        ));
    }

    #[test]
    fn overflowing_product_is_invalid_not_a_panic() {
        let dimension = ArrayDimension::new(vec![100_000; 4]);
        assert_eq!(dimension.component_count(), 0);
        assert!(matches!(
            dimension.validate(),
            Err(ModelError::InvalidDimension { .. })
        ));
        assert!(matches!(
            CoordinateMapper::new(&dimension),
            Err(ModelError::InvalidDimension { .. })
        ));
    }

    #[test]
    fn dimension_string_round_trips() {
        let dimension: ArrayDimension = " {4;1;2} ".parse().expect("parse");
        assert_eq!(dimension.to_string(), "{4;1;2}");
        // negative axes parse fine, they only fail validation
        let negative: ArrayDimension = "{3;-1}".parse().expect("parse");
        assert_eq!(negative.component_count(), 0);
    }
}
