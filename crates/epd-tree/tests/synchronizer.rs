//! Structural behaviour of the value-tree synchronizer: full construction,
//! incremental option/state/component repair, shadow swapping and disposal.

use std::collections::HashMap;

use proptest::prelude::*;

use epd_model::{
    ActualFiniteState, ActualFiniteStateList, ActualStateKind, ArrayDimension, DesignOption,
    DomainOfExpertise, ElementDefinition, ElementUsage, Iid, Iteration, Parameter,
    ParameterOverride, ParameterSubscription, ParameterType, ParameterTypeComponent, Subject,
    fresh_iid, reconcile_components,
};
use epd_session::{ChangeBus, ChangeEvent, DomainWriteAccess, SessionStore, SessionWriter};
use epd_tree::{
    ContainerRef, RepairOutcome, RowId, RowKind, SlotKey, TreeError, ValueTreeSynchronizer,
};

// =======================================================================
// Fixture
// =======================================================================

struct Scene {
    store: SessionStore,
    bus: ChangeBus,
    sys: Iid,
    thermal: Iid,
    iteration: Iid,
    option_a: Iid,
    state_list: Iid,
    state_orbit: Iid,
    parameter_type: Iid,
    definition: Iid,
    usage: Iid,
    parameter: Iid,
}

fn named_domain(short_name: &str) -> DomainOfExpertise {
    DomainOfExpertise {
        iid: fresh_iid(),
        revision: 1,
        name: short_name.to_string(),
        short_name: short_name.to_string(),
    }
}

fn named_option(name: &str, short_name: &str) -> DesignOption {
    DesignOption {
        iid: fresh_iid(),
        revision: 1,
        name: name.to_string(),
        short_name: short_name.to_string(),
    }
}

fn named_state(name: &str) -> ActualFiniteState {
    ActualFiniteState {
        iid: fresh_iid(),
        revision: 1,
        name: name.to_string(),
        kind: ActualStateKind::Mandatory,
    }
}

/// Two options, two states, a two-component compound type: eight terminal
/// cells behind four value-set records.
fn scene() -> Scene {
    let store = SessionStore::new();
    let sys = store.add_domain(named_domain("SYS"));
    let thermal = store.add_domain(named_domain("THE"));
    let iteration = store.add_iteration(Iteration {
        iid: fresh_iid(),
        revision: 1,
        options: Vec::new(),
    });
    let option_a = store
        .add_option(iteration, named_option("Option A", "A"))
        .expect("option a");
    store
        .add_option(iteration, named_option("Option B", "B"))
        .expect("option b");
    let state_launch = store.add_actual_state(named_state("Launch"));
    let state_orbit = store.add_actual_state(named_state("Orbit"));
    let state_list = store.add_state_list(ActualFiniteStateList {
        iid: fresh_iid(),
        revision: 1,
        states: vec![state_launch, state_orbit],
    });
    let parameter_type = store.add_parameter_type(ParameterType::Compound {
        iid: fresh_iid(),
        revision: 1,
        name: "Position".to_string(),
        short_name: "pos".to_string(),
        components: vec![
            ParameterTypeComponent::new("x"),
            ParameterTypeComponent::new("y"),
        ],
    });
    let definition = store.add_element_definition(ElementDefinition {
        iid: fresh_iid(),
        revision: 1,
        name: "Battery".to_string(),
        container: iteration,
        parameters: Vec::new(),
    });
    let usage = store.add_element_usage(ElementUsage {
        iid: fresh_iid(),
        revision: 1,
        name: "BAT1".to_string(),
        element_definition: definition,
        container: iteration,
        overrides: Vec::new(),
    });
    let parameter = store.add_parameter(Parameter {
        iid: fresh_iid(),
        revision: 1,
        parameter_type,
        owner: sys,
        container: definition,
        is_option_dependent: true,
        state_dependence: Some(state_list),
        value_sets: Vec::new(),
    });
    store.drain_events();
    Scene {
        store,
        bus: ChangeBus::new(),
        sys,
        thermal,
        iteration,
        option_a,
        state_list,
        state_orbit,
        parameter_type,
        definition,
        usage,
        parameter,
    }
}

fn synchronizer(scene: &Scene, container: ContainerRef) -> ValueTreeSynchronizer {
    ValueTreeSynchronizer::new(
        scene.store.clone(),
        scene.bus.clone(),
        Box::new(SessionWriter::new(scene.store.clone())),
        Box::new(DomainWriteAccess::new(scene.sys)),
        SlotKey {
            container,
            base_parameter: scene.parameter,
            active_domain: scene.sys,
        },
    )
}

/// Drain pending store notifications into the tree, in mutation order.
fn deliver(scene: &Scene, sync: &mut ValueTreeSynchronizer) -> Vec<RepairOutcome> {
    scene
        .store
        .drain_events()
        .into_iter()
        .map(|event| sync.on_change(event).expect("repair"))
        .collect()
}

/// (subject, option, state, component) row counts of the visible tree.
fn kind_counts(sync: &ValueTreeSynchronizer) -> (usize, usize, usize, usize) {
    let mut counts = (0, 0, 0, 0);
    for id in sync.visible_rows() {
        match sync.row(id).expect("visible row").kind {
            RowKind::Subject => counts.0 += 1,
            RowKind::Option { .. } => counts.1 += 1,
            RowKind::State { .. } => counts.2 += 1,
            RowKind::Component { .. } => counts.3 += 1,
        }
    }
    counts
}

fn component_rows(sync: &ValueTreeSynchronizer) -> Vec<RowId> {
    sync.visible_rows()
        .into_iter()
        .filter(|id| {
            matches!(
                sync.row(*id).expect("visible row").kind,
                RowKind::Component { .. }
            )
        })
        .collect()
}

// =======================================================================
// Construction
// =======================================================================

#[test]
fn build_materializes_option_state_component_tree() {
    let scene = scene();
    let mut sync = synchronizer(&scene, ContainerRef::Definition(scene.definition));
    sync.build().expect("build");

    assert_eq!(sync.active_subject(), Some(Subject::Parameter(scene.parameter)));
    assert_eq!(kind_counts(&sync), (1, 2, 4, 8));

    // eight terminals behind four records, each shared by the two components
    let mut value_sets: Vec<Iid> = component_rows(&sync)
        .into_iter()
        .filter_map(|id| sync.row(id).and_then(|row| row.value_set))
        .collect();
    value_sets.sort();
    value_sets.dedup();
    assert_eq!(value_sets.len(), 4);

    for id in component_rows(&sync) {
        let row = sync.row(id).expect("component row");
        let cells = row.cells.as_ref().expect("terminal cells");
        assert_eq!(cells.manual, "-");
        assert_eq!(cells.actual, "-");
        assert!(row.is_editable);
    }
}

#[test]
fn scalar_parameter_folds_cells_onto_subject_row() {
    let store = SessionStore::new();
    let sys = store.add_domain(named_domain("SYS"));
    let parameter_type = store.add_parameter_type(ParameterType::Scalar {
        iid: fresh_iid(),
        revision: 1,
        name: "mass".to_string(),
        short_name: "m".to_string(),
    });
    let parameter = store.add_parameter(Parameter {
        iid: fresh_iid(),
        revision: 1,
        parameter_type,
        owner: sys,
        container: fresh_iid(),
        is_option_dependent: false,
        state_dependence: None,
        value_sets: Vec::new(),
    });
    store.drain_events();
    let mut sync = ValueTreeSynchronizer::new(
        store.clone(),
        ChangeBus::new(),
        Box::new(SessionWriter::new(store.clone())),
        Box::new(DomainWriteAccess::new(sys)),
        SlotKey {
            container: ContainerRef::Definition(parameter),
            base_parameter: parameter,
            active_domain: sys,
        },
    );
    sync.build().expect("build");

    let rows = sync.visible_rows();
    assert_eq!(rows.len(), 1);
    let root = sync.row(rows[0]).expect("root");
    assert_eq!(root.kind, RowKind::Subject);
    assert!(root.cells.is_some());
    assert_eq!(root.slot_index, 0);
}

#[test]
fn missing_iteration_fails_build_without_leaking_watches() {
    let scene = scene();
    let store = scene.store.clone();
    let orphan_definition = store.add_element_definition(ElementDefinition {
        iid: fresh_iid(),
        revision: 1,
        name: "Orphan".to_string(),
        container: fresh_iid(),
        parameters: Vec::new(),
    });
    let parameter = store.add_parameter(Parameter {
        iid: fresh_iid(),
        revision: 1,
        parameter_type: scene.parameter_type,
        owner: scene.sys,
        container: orphan_definition,
        is_option_dependent: true,
        state_dependence: None,
        value_sets: Vec::new(),
    });
    store.drain_events();
    let mut sync = ValueTreeSynchronizer::new(
        store.clone(),
        scene.bus.clone(),
        Box::new(SessionWriter::new(store)),
        Box::new(DomainWriteAccess::new(scene.sys)),
        SlotKey {
            container: ContainerRef::Definition(orphan_definition),
            base_parameter: parameter,
            active_domain: scene.sys,
        },
    );
    let err = sync.build().expect_err("iteration is missing");
    assert!(matches!(err, TreeError::MissingRequiredContainer { .. }));
    assert!(sync.visible_rows().is_empty());
    assert_eq!(scene.bus.active_watches(), 0);
}

#[test]
fn unresolvable_option_yields_placeholder_row_instead_of_aborting() {
    let store = SessionStore::new();
    let sys = store.add_domain(named_domain("SYS"));
    let ghost = fresh_iid();
    let iteration = store.add_iteration(Iteration {
        iid: fresh_iid(),
        revision: 1,
        options: vec![ghost],
    });
    let parameter_type = store.add_parameter_type(ParameterType::Compound {
        iid: fresh_iid(),
        revision: 1,
        name: "Position".to_string(),
        short_name: "pos".to_string(),
        components: vec![ParameterTypeComponent::new("x")],
    });
    let definition = store.add_element_definition(ElementDefinition {
        iid: fresh_iid(),
        revision: 1,
        name: "Battery".to_string(),
        container: iteration,
        parameters: Vec::new(),
    });
    let parameter = store.add_parameter(Parameter {
        iid: fresh_iid(),
        revision: 1,
        parameter_type,
        owner: sys,
        container: definition,
        is_option_dependent: true,
        state_dependence: None,
        value_sets: Vec::new(),
    });
    store.drain_events();
    let mut sync = ValueTreeSynchronizer::new(
        store.clone(),
        ChangeBus::new(),
        Box::new(SessionWriter::new(store.clone())),
        Box::new(DomainWriteAccess::new(sys)),
        SlotKey {
            container: ContainerRef::Definition(definition),
            base_parameter: parameter,
            active_domain: sys,
        },
    );
    sync.build().expect("build tolerates an unresolvable option");

    // the bad option gets a childless diagnostic row, nothing else is lost
    assert_eq!(kind_counts(&sync), (1, 1, 0, 0));
    let placeholder = sync
        .visible_rows()
        .into_iter()
        .find(|id| sync.row(*id).expect("row").kind.option_iid() == Some(ghost))
        .expect("placeholder option row");
    let row = sync.row(placeholder).expect("placeholder row");
    assert!(row.error.is_some());
    assert!(row.children.is_empty());
}

// =======================================================================
// Incremental repair
// =======================================================================

#[test]
fn option_add_patches_tree_and_preserves_existing_rows() {
    let scene = scene();
    let mut sync = synchronizer(&scene, ContainerRef::Definition(scene.definition));
    sync.build().expect("build");
    let before: Vec<RowId> = sync.visible_rows();

    scene
        .store
        .add_option(scene.iteration, named_option("Option C", "C"))
        .expect("add option");
    let outcomes = deliver(&scene, &mut sync);
    assert!(outcomes.contains(&RepairOutcome::Patched));

    assert_eq!(kind_counts(&sync), (1, 3, 6, 12));
    let after: Vec<RowId> = sync.visible_rows();
    for id in &before {
        assert!(after.contains(id), "pre-existing row {id} must survive");
    }
}

#[test]
fn option_removal_drops_only_its_subtree() {
    let scene = scene();
    let mut sync = synchronizer(&scene, ContainerRef::Definition(scene.definition));
    sync.build().expect("build");
    let under_a = |sync: &ValueTreeSynchronizer, id: RowId| {
        let mut current = Some(id);
        while let Some(row) = current.and_then(|id| sync.row(id)) {
            if row.kind.option_iid() == Some(scene.option_a) {
                return true;
            }
            current = row.parent;
        }
        false
    };
    let survivors: Vec<RowId> = sync
        .visible_rows()
        .into_iter()
        .filter(|id| !under_a(&sync, *id))
        .collect();

    scene
        .store
        .remove_option(scene.iteration, scene.option_a)
        .expect("remove option");
    let outcomes = deliver(&scene, &mut sync);
    assert!(outcomes.contains(&RepairOutcome::Patched));

    assert_eq!(kind_counts(&sync), (1, 1, 2, 4));
    assert_eq!(sync.visible_rows(), survivors);
}

#[test]
fn forbidden_state_removes_subtrees_and_their_watches() {
    let scene = scene();
    let mut sync = synchronizer(&scene, ContainerRef::Definition(scene.definition));
    sync.build().expect("build");
    let baseline = scene.bus.active_watches();
    let launch_rows: Vec<RowId> = sync
        .visible_rows()
        .into_iter()
        .filter(|id| {
            sync.row(*id)
                .expect("visible row")
                .kind
                .state_iid()
                .is_some_and(|state| state != scene.state_orbit)
        })
        .collect();
    assert_eq!(launch_rows.len(), 2);

    scene
        .store
        .set_state_kind(scene.state_orbit, ActualStateKind::Forbidden)
        .expect("forbid");
    let outcomes = deliver(&scene, &mut sync);
    assert!(outcomes.contains(&RepairOutcome::Patched));

    // two orbit cells gone, their two value-set watches released
    assert_eq!(kind_counts(&sync), (1, 2, 2, 4));
    assert_eq!(scene.bus.active_watches(), baseline - 2);
    let after = sync.visible_rows();
    for id in &launch_rows {
        assert!(after.contains(id), "launch rows keep their identity");
    }

    scene
        .store
        .set_state_kind(scene.state_orbit, ActualStateKind::Mandatory)
        .expect("unforbid");
    deliver(&scene, &mut sync);
    assert_eq!(kind_counts(&sync), (1, 2, 4, 8));
    assert_eq!(scene.bus.active_watches(), baseline);
}

#[test]
fn component_added_to_type_reconciles_terminals() {
    let scene = scene();
    let mut sync = synchronizer(&scene, ContainerRef::Definition(scene.definition));
    sync.build().expect("build");
    let before = component_rows(&sync);

    scene
        .store
        .update_parameter_type(scene.parameter_type, |parameter_type| {
            if let ParameterType::Compound { components, .. } = parameter_type {
                components.push(ParameterTypeComponent::new("z"));
            }
        })
        .expect("extend type");
    let outcomes = deliver(&scene, &mut sync);
    assert!(outcomes.contains(&RepairOutcome::Patched));

    assert_eq!(kind_counts(&sync), (1, 2, 4, 12));
    let after = component_rows(&sync);
    for id in &before {
        assert!(after.contains(id), "existing component rows survive");
    }
    let z_rows: Vec<&RowId> = after
        .iter()
        .filter(|id| sync.row(**id).expect("component row").name == "z")
        .collect();
    assert_eq!(z_rows.len(), 4);
    for id in z_rows {
        assert_eq!(sync.row(*id).expect("z row").slot_index, 2);
    }
}

#[test]
fn array_dimension_growth_flows_through_component_repair() {
    let scene = scene();
    let dimension = ArrayDimension::new(vec![2, 2]);
    let components =
        reconcile_components(&[], &dimension).expect("initial component grid");
    let array_type = scene.store.add_parameter_type(ParameterType::Array {
        iid: fresh_iid(),
        revision: 1,
        name: "Inertia".to_string(),
        short_name: "I".to_string(),
        dimension: dimension.clone(),
        is_tensor: false,
        components,
    });
    let parameter = scene.store.add_parameter(Parameter {
        iid: fresh_iid(),
        revision: 1,
        parameter_type: array_type,
        owner: scene.sys,
        container: fresh_iid(),
        is_option_dependent: false,
        state_dependence: None,
        value_sets: Vec::new(),
    });
    scene.store.drain_events();
    let mut sync = ValueTreeSynchronizer::new(
        scene.store.clone(),
        scene.bus.clone(),
        Box::new(SessionWriter::new(scene.store.clone())),
        Box::new(DomainWriteAccess::new(scene.sys)),
        SlotKey {
            container: ContainerRef::Definition(parameter),
            base_parameter: parameter,
            active_domain: scene.sys,
        },
    );
    sync.build().expect("build");
    assert_eq!(component_rows(&sync).len(), 4);
    let before = component_rows(&sync);

    // growing the last axis keeps every existing coordinate valid
    let grown = ArrayDimension::new(vec![2, 3]);
    scene
        .store
        .update_parameter_type(array_type, |parameter_type| {
            if let ParameterType::Array {
                dimension,
                components,
                ..
            } = parameter_type
            {
                *components = reconcile_components(components, &grown)
                    .expect("regrown component grid");
                *dimension = grown.clone();
            }
        })
        .expect("grow dimension");
    let outcomes = deliver(&scene, &mut sync);
    assert!(outcomes.contains(&RepairOutcome::Patched));

    let after = component_rows(&sync);
    assert_eq!(after.len(), 6);
    for id in &before {
        assert!(after.contains(id), "surviving coordinates keep their rows");
    }
    let names: Vec<String> = after
        .iter()
        .map(|id| sync.row(*id).expect("component row").name.clone())
        .collect();
    assert!(names.contains(&"{2;3}".to_string()));
}

#[test]
fn stale_revision_is_discarded() {
    let scene = scene();
    let mut sync = synchronizer(&scene, ContainerRef::Definition(scene.definition));
    sync.build().expect("build");
    let target = component_rows(&sync)[0];
    let value_set = sync
        .row(target)
        .and_then(|row| row.value_set)
        .expect("backing record");

    let revision = scene
        .store
        .update_value_set(value_set, |record| {
            record.manual[0] = "3.5".to_string();
        })
        .expect("update");
    let event = ChangeEvent::updated(value_set, revision);
    scene.store.drain_events();

    assert_eq!(
        sync.on_change(event).expect("fresh event"),
        RepairOutcome::CellsRefreshed
    );
    assert_eq!(
        sync.on_change(event).expect("replayed event"),
        RepairOutcome::StaleDiscarded
    );

    let cells = sync
        .row(target)
        .and_then(|row| row.cells.clone())
        .expect("cells");
    assert_eq!(cells.manual, "3.5");
}

#[test]
fn unwatched_object_is_ignored() {
    let scene = scene();
    let mut sync = synchronizer(&scene, ContainerRef::Definition(scene.definition));
    sync.build().expect("build");
    let outcome = sync
        .on_change(ChangeEvent::updated(fresh_iid(), 7))
        .expect("ignore");
    assert_eq!(outcome, RepairOutcome::Ignored);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Any interleaving of option adds and removals leaves the OptionRow
    /// layer equal to the iteration's ordered list, with surviving options
    /// keeping their row ids across every step.
    #[test]
    fn option_rows_track_iteration_membership(ops in prop::collection::vec(any::<u8>(), 1..16)) {
        let scene = scene();
        let mut sync = synchronizer(&scene, ContainerRef::Definition(scene.definition));
        sync.build().expect("build");
        let mut known: HashMap<Iid, RowId> = HashMap::new();

        for byte in ops {
            let options = scene
                .store
                .iteration(scene.iteration)
                .expect("iteration")
                .options;
            if byte % 2 == 0 || options.is_empty() {
                scene
                    .store
                    .add_option(scene.iteration, named_option("Option", "O"))
                    .expect("add option");
            } else {
                let victim = options[(byte as usize / 2) % options.len()];
                scene
                    .store
                    .remove_option(scene.iteration, victim)
                    .expect("remove option");
            }
            for event in scene.store.drain_events() {
                sync.on_change(event).expect("repair");
            }

            let expected = scene
                .store
                .iteration(scene.iteration)
                .expect("iteration")
                .options;
            let root = sync.root().expect("root");
            let pairs: Vec<(Iid, RowId)> = sync
                .row(root)
                .expect("root row")
                .children
                .iter()
                .map(|id| {
                    let option = sync
                        .row(*id)
                        .expect("option row")
                        .kind
                        .option_iid()
                        .expect("option kind");
                    (option, *id)
                })
                .collect();
            let tree_options: Vec<Iid> = pairs.iter().map(|(option, _)| *option).collect();
            prop_assert_eq!(&tree_options, &expected);
            for (option, id) in &pairs {
                if let Some(previous) = known.get(option) {
                    prop_assert_eq!(previous, id);
                }
            }
            known = pairs.into_iter().collect();
        }
    }
}

// =======================================================================
// Shadowing
// =======================================================================

#[test]
fn override_shadows_base_and_removal_restores_identical_rows() {
    let scene = scene();
    let mut sync = synchronizer(&scene, ContainerRef::Usage(scene.usage));
    sync.build().expect("build");
    assert_eq!(sync.active_subject(), Some(Subject::Parameter(scene.parameter)));
    let base_rows = sync.visible_rows();

    let ovr = scene
        .store
        .add_override(ParameterOverride {
            iid: fresh_iid(),
            revision: 1,
            parameter: scene.parameter,
            owner: scene.thermal,
            container: scene.usage,
            value_sets: Vec::new(),
        })
        .expect("attach override");
    let outcomes = deliver(&scene, &mut sync);
    assert!(outcomes.contains(&RepairOutcome::ShadowSwapped));
    assert_eq!(sync.active_subject(), Some(Subject::Override(ovr)));
    assert_eq!(kind_counts(&sync), (1, 2, 4, 8));
    // owned by another domain, so the shadowing rows are read-only
    for id in sync.visible_rows() {
        assert!(!sync.row(id).expect("override row").is_editable);
    }

    scene.store.remove_override(ovr).expect("detach override");
    let outcomes = deliver(&scene, &mut sync);
    assert!(outcomes.contains(&RepairOutcome::ShadowSwapped));
    assert_eq!(sync.active_subject(), Some(Subject::Parameter(scene.parameter)));
    assert_eq!(sync.visible_rows(), base_rows);
}

#[test]
fn owned_subscription_shadows_the_base_parameter() {
    let scene = scene();
    let mut sync = synchronizer(&scene, ContainerRef::Definition(scene.definition));
    sync.build().expect("build");
    let base_rows = sync.visible_rows();

    let sub = scene
        .store
        .add_subscription(ParameterSubscription {
            iid: fresh_iid(),
            revision: 1,
            subscribed: scene.parameter,
            owner: scene.sys,
            value_sets: Vec::new(),
        })
        .expect("attach subscription");
    let outcomes = deliver(&scene, &mut sync);
    assert!(outcomes.contains(&RepairOutcome::ShadowSwapped));
    assert_eq!(sync.active_subject(), Some(Subject::Subscription(sub)));
    // the subscription belongs to the active domain, so it is editable
    for id in component_rows(&sync) {
        assert!(sync.row(id).expect("subscription row").is_editable);
    }

    scene.store.remove_subscription(sub).expect("detach");
    let outcomes = deliver(&scene, &mut sync);
    assert!(outcomes.contains(&RepairOutcome::ShadowSwapped));
    assert_eq!(sync.visible_rows(), base_rows);
}

#[test]
fn foreign_subscription_does_not_shadow() {
    let scene = scene();
    let mut sync = synchronizer(&scene, ContainerRef::Definition(scene.definition));
    sync.build().expect("build");

    scene
        .store
        .add_subscription(ParameterSubscription {
            iid: fresh_iid(),
            revision: 1,
            subscribed: scene.parameter,
            owner: scene.thermal,
            value_sets: Vec::new(),
        })
        .expect("attach foreign subscription");
    let outcomes = deliver(&scene, &mut sync);
    assert!(!outcomes.contains(&RepairOutcome::ShadowSwapped));
    assert_eq!(sync.active_subject(), Some(Subject::Parameter(scene.parameter)));
}

// =======================================================================
// Disposal
// =======================================================================

#[test]
fn dispose_releases_every_watch_and_goes_inert() {
    let scene = scene();
    let mut sync = synchronizer(&scene, ContainerRef::Definition(scene.definition));
    sync.build().expect("build");
    assert!(scene.bus.active_watches() > 0);
    assert!(sync.watched_objects() > 0);

    sync.dispose();
    assert_eq!(scene.bus.active_watches(), 0);
    assert_eq!(sync.watched_objects(), 0);
    assert!(sync.visible_rows().is_empty());

    scene
        .store
        .set_state_kind(scene.state_orbit, ActualStateKind::Forbidden)
        .expect("mutate after dispose");
    for event in scene.store.drain_events() {
        assert_eq!(sync.on_change(event).expect("inert"), RepairOutcome::Ignored);
    }

    // disposing twice is harmless
    sync.dispose();
    assert_eq!(scene.bus.active_watches(), 0);
}

#[test]
fn state_list_watch_covers_membership_changes() {
    let scene = scene();
    let mut sync = synchronizer(&scene, ContainerRef::Definition(scene.definition));
    sync.build().expect("build");

    let state_cruise = scene.store.add_actual_state(named_state("Cruise"));
    scene
        .store
        .update_state_list(scene.state_list, |list| list.states.push(state_cruise))
        .expect("extend list");
    let outcomes = deliver(&scene, &mut sync);
    assert!(outcomes.contains(&RepairOutcome::Patched));
    assert_eq!(kind_counts(&sync), (1, 2, 6, 12));
}
