//! Tests for flat-index / tensor-coordinate mapping.
//!
//! Covers the bijection and round-trip properties of the mapper plus the
//! component-list reconciliation driven by a user-edited dimension string.

use std::collections::HashSet;

use proptest::prelude::*;

use epd_model::{
    ArrayDimension, ComponentCoordinate, CoordinateMapper, ModelError, ParameterTypeComponent,
    reconcile_components,
};

// =========================================================================
// Component count
// =========================================================================

#[test]
fn count_is_product_of_axes() {
    let dimension = ArrayDimension::new(vec![2, 3, 4]);
    assert_eq!(dimension.component_count(), 24);
    assert!(dimension.validate().is_ok());
}

#[test]
fn count_is_zero_with_any_non_positive_axis() {
    for axes in [vec![0], vec![2, 0], vec![-1, 3], vec![2, 3, -5]] {
        let dimension = ArrayDimension::new(axes);
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
}

// =========================================================================
// Coordinate mapping
// =========================================================================

#[test]
fn documented_two_by_three_examples() {
    let dimension: ArrayDimension = "{2;3}".parse().expect("parse");
    let mapper = CoordinateMapper::new(&dimension).expect("mapper");
    assert_eq!(mapper.component_count(), 6);
    assert_eq!(mapper.coordinate_of(1).unwrap().values(), &[1, 1]);
    assert_eq!(mapper.coordinate_of(2).unwrap().values(), &[1, 2]);
    assert_eq!(mapper.coordinate_of(4).unwrap().values(), &[2, 1]);
    assert_eq!(mapper.coordinate_of(6).unwrap().values(), &[2, 3]);
}

#[test]
fn first_and_last_indexes() {
    let dimension = ArrayDimension::new(vec![3, 2, 4]);
    let mapper = CoordinateMapper::new(&dimension).expect("mapper");
    assert_eq!(mapper.coordinate_of(1).unwrap().values(), &[1, 1, 1]);
    assert_eq!(mapper.coordinate_of(24).unwrap().values(), &[3, 2, 4]);
}

#[test]
fn last_axis_varies_fastest() {
    let dimension = ArrayDimension::new(vec![2, 2]);
    let mapper = CoordinateMapper::new(&dimension).expect("mapper");
    let coordinates: Vec<Vec<i64>> = (1..=4)
        .map(|n| mapper.coordinate_of(n).unwrap().values().to_vec())
        .collect();
    assert_eq!(
        coordinates,
        vec![vec![1, 1], vec![1, 2], vec![2, 1], vec![2, 2]]
    );
}

#[test]
fn out_of_range_index_is_rejected() {
    let dimension = ArrayDimension::new(vec![2, 3]);
    let mapper = CoordinateMapper::new(&dimension).expect("mapper");
    assert_eq!(
        mapper.coordinate_of(0),
        Err(ModelError::IndexOutOfRange { index: 0, count: 6 })
    );
    assert_eq!(
        mapper.coordinate_of(7),
        Err(ModelError::IndexOutOfRange { index: 7, count: 6 })
    );
}

#[test]
fn mismatched_coordinate_is_rejected() {
    let dimension = ArrayDimension::new(vec![2, 3]);
    let mapper = CoordinateMapper::new(&dimension).expect("mapper");
    let wrong_rank = ComponentCoordinate::new(vec![1, 1, 1]);
    assert!(matches!(
        mapper.flat_index_of(&wrong_rank),
        Err(ModelError::InvalidCoordinate { .. })
    ));
    let out_of_axis = ComponentCoordinate::new(vec![3, 1]);
    assert!(matches!(
        mapper.flat_index_of(&out_of_axis),
        Err(ModelError::InvalidCoordinate { .. })
    ));
}

// =========================================================================
// Bijection and round-trip properties
// =========================================================================

proptest! {
    #[test]
    fn coordinates_cover_the_cartesian_product_exactly_once(
        axes in prop::collection::vec(1i64..=5, 1..=4),
    ) {
        let dimension = ArrayDimension::new(axes);
        let mapper = CoordinateMapper::new(&dimension).expect("mapper");
        let count = mapper.component_count();
        prop_assert_eq!(
            count,
            dimension.axes().iter().product::<i64>() as usize
        );

        let mut seen = HashSet::new();
        for flat_index in 1..=count {
            let coordinate = mapper.coordinate_of(flat_index).expect("in range");
            prop_assert_eq!(coordinate.rank(), dimension.rank());
            for (axis, &value) in coordinate.values().iter().enumerate() {
                prop_assert!(value >= 1 && value <= dimension.axes()[axis]);
            }
            prop_assert!(seen.insert(coordinate.values().to_vec()));
        }
        prop_assert_eq!(seen.len(), count);
    }

    #[test]
    fn flat_index_round_trips(
        axes in prop::collection::vec(1i64..=5, 1..=4),
    ) {
        let dimension = ArrayDimension::new(axes);
        let mapper = CoordinateMapper::new(&dimension).expect("mapper");
        for flat_index in 1..=mapper.component_count() {
            let coordinate = mapper.coordinate_of(flat_index).expect("in range");
            let back = mapper.flat_index_of(&coordinate).expect("inverse");
            prop_assert_eq!(back, flat_index);
            let again = mapper.coordinate_of(back).expect("forward");
            prop_assert_eq!(again, coordinate);
        }
    }
}

// =========================================================================
// Component reconciliation
// =========================================================================

#[test]
fn reconcile_grows_and_labels_components() {
    let existing = vec![
        ParameterTypeComponent::new("x"),
        ParameterTypeComponent::new("y"),
    ];
    let dimension = ArrayDimension::new(vec![2, 2]);
    let components = reconcile_components(&existing, &dimension).expect("reconcile");
    assert_eq!(components.len(), 4);
    // survivors keep identity and short name, everyone gets coordinates
    assert_eq!(components[0].iid, existing[0].iid);
    assert_eq!(components[0].short_name, "x");
    assert_eq!(components[0].coordinates.as_deref(), Some("{1;1}"));
    assert_eq!(components[1].iid, existing[1].iid);
    // fresh components are named after their coordinates
    assert_eq!(components[2].short_name, "{2;1}");
    assert_eq!(components[3].short_name, "{2;2}");
}

#[test]
fn reconcile_shrinks_by_position() {
    let existing: Vec<ParameterTypeComponent> = (0..6)
        .map(|i| ParameterTypeComponent::new(format!("c{i}")))
        .collect();
    let dimension = ArrayDimension::new(vec![2]);
    let components = reconcile_components(&existing, &dimension).expect("reconcile");
    assert_eq!(components.len(), 2);
    assert_eq!(components[0].iid, existing[0].iid);
    assert_eq!(components[1].iid, existing[1].iid);
}

#[test]
fn reconcile_empties_on_invalid_dimension() {
    let existing = vec![ParameterTypeComponent::new("x")];
    let dimension = ArrayDimension::new(vec![2, -3]);
    let components = reconcile_components(&existing, &dimension).expect("reconcile");
    assert!(components.is_empty());
}
