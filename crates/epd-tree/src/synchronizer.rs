//! Construction and incremental maintenance of the Option x State x
//! Component row tree for one parameter-like subject.
//!
//! A synchronizer owns the tree for one container slot: the base parameter,
//! the override that may replace it on an element usage, and the
//! subscription the active domain may hold on either. Exactly one of those
//! subjects is visible at a time; the others' row sets are kept suppressed
//! so that un-shadowing restores the original rows with their identity
//! intact.
//!
//! All structural repair is diff-and-patch: the desired key set is computed
//! from the domain graph, rows whose key vanished are removed (cascading
//! their watches), rows for new keys are created, and everything else keeps
//! its [`RowId`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::collections::hash_map::Entry;

use tracing::{debug, warn};

use epd_model::{
    ActualFiniteState, Iid, ParameterSwitchKind, ParameterType, RevisionNumber, Subject, ValueSet,
};
use epd_session::{
    AccessControl, ChangeBus, ChangeEvent, SessionStore, ValueField, Watch, WriteAction,
    WriteCollaborator, WriteRequest,
};

use crate::error::{Result, TreeError};
use crate::row::{Row, RowArena, RowId, RowKind, ValueCells};

/// Where the slot lives: a base parameter on its element definition, or a
/// parameter reachable through an element usage (where overrides can attach).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRef {
    Definition(Iid),
    Usage(Iid),
}

impl ContainerRef {
    pub fn iid(&self) -> Iid {
        match self {
            ContainerRef::Definition(iid) | ContainerRef::Usage(iid) => *iid,
        }
    }
}

/// Identifies one container slot: (base parameter, active domain) at a
/// container. The shadow relation decides which subject fills the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotKey {
    pub container: ContainerRef,
    pub base_parameter: Iid,
    pub active_domain: Iid,
}

/// What one incremental repair did, mostly for callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Structural rows were added, removed or reordered.
    Patched,
    /// A whole subject subtree was rebuilt.
    Rebuilt,
    /// A different subject became visible for the slot.
    ShadowSwapped,
    /// Display cells were re-read, no structural change.
    CellsRefreshed,
    /// Revision not newer than the last processed one; dropped.
    StaleDiscarded,
    /// Notification understood but nothing to do.
    NoChange,
    /// Notification for an object this tree does not watch.
    Ignored,
}

/// Why an object is watched; drives dispatch in [`ValueTreeSynchronizer::on_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// The base parameter or a built override/subscription subject.
    SubjectThing,
    /// The element usage whose override set shadows the base parameter.
    ContainerUsage,
    /// The iteration owning the option list.
    Iteration,
    /// The actual finite state list of the state dependence.
    StateList,
    /// One actual finite state (kind flips matter).
    ActualState,
    /// The subject's parameter type (component list changes matter).
    ParameterType,
    /// A value set backing one or more terminal rows.
    ValueSet,
}

#[derive(Debug)]
struct WatchEntry {
    _watch: Watch,
    role: Role,
}

/// Everything the builders need to know about one subject, resolved fresh
/// from the graph. Overrides and subscriptions inherit type and dependence
/// from the base parameter they shadow.
#[derive(Debug, Clone)]
struct SubjectInfo {
    subject: Subject,
    owner: Iid,
    owner_short_name: String,
    parameter_type: ParameterType,
    is_option_dependent: bool,
    state_dependence: Option<Iid>,
    display_name: String,
}

/// Structure-defining facts a subject subtree was built against. When a
/// notification shows these changed, the subtree is rebuilt rather than
/// patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Signature {
    is_option_dependent: bool,
    state_dependence: Option<Iid>,
    parameter_type: Iid,
    is_compound: bool,
}

impl Signature {
    fn of(info: &SubjectInfo) -> Self {
        Self {
            is_option_dependent: info.is_option_dependent,
            state_dependence: info.state_dependence,
            parameter_type: info.parameter_type.iid(),
            is_compound: info.parameter_type.is_compound(),
        }
    }
}

#[derive(Debug)]
struct BuiltTree {
    root: RowId,
    signature: Signature,
}

/// Owns and maintains the row tree for one [`SlotKey`].
///
/// Single-threaded by contract: `build` and `on_change` calls must be
/// serialized by the caller, and notifications must arrive in delivery
/// order per object.
pub struct ValueTreeSynchronizer {
    store: SessionStore,
    bus: ChangeBus,
    writer: Box<dyn WriteCollaborator>,
    access: Box<dyn AccessControl>,
    slot: SlotKey,
    arena: RowArena,
    subject_roots: BTreeMap<Subject, BuiltTree>,
    active: Option<Subject>,
    watches: HashMap<Iid, WatchEntry>,
    last_seen: HashMap<Iid, RevisionNumber>,
    disposed: bool,
}

impl ValueTreeSynchronizer {
    pub fn new(
        store: SessionStore,
        bus: ChangeBus,
        writer: Box<dyn WriteCollaborator>,
        access: Box<dyn AccessControl>,
        slot: SlotKey,
    ) -> Self {
        Self {
            store,
            bus,
            writer,
            access,
            slot,
            arena: RowArena::new(),
            subject_roots: BTreeMap::new(),
            active: None,
            watches: HashMap::new(),
            last_seen: HashMap::new(),
            disposed: false,
        }
    }

    // ---------------------------------------------------------------------
    // Read surface for the UI layer
    // ---------------------------------------------------------------------

    /// Root of the currently visible subject subtree.
    pub fn root(&self) -> Option<RowId> {
        let active = self.active?;
        self.subject_roots.get(&active).map(|tree| tree.root)
    }

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.arena.row(id)
    }

    /// Pre-order traversal of the visible tree.
    pub fn visible_rows(&self) -> Vec<RowId> {
        self.root()
            .map(|root| self.arena.preorder(root))
            .unwrap_or_default()
    }

    pub fn active_subject(&self) -> Option<Subject> {
        self.active
    }

    /// Number of objects this tree currently watches.
    pub fn watched_objects(&self) -> usize {
        self.watches.len()
    }

    // ---------------------------------------------------------------------
    // Construction
    // ---------------------------------------------------------------------

    /// Full construction of the tree for the slot's active subject.
    ///
    /// A missing required container leaves the tree empty and returns the
    /// failure; nothing is partially built.
    pub fn build(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.arena.clear();
        self.subject_roots.clear();
        self.active = None;
        let active = self.resolve_active();
        let built = active.and_then(|subject| {
            self.build_subject_tree(subject).map(|tree| (subject, tree))
        });
        match built {
            Ok((subject, tree)) => {
                self.subject_roots.insert(subject, tree);
                self.active = Some(subject);
                self.sync_watches();
                Ok(())
            }
            Err(err) => {
                self.arena.clear();
                self.watches.clear();
                self.last_seen.clear();
                Err(err)
            }
        }
    }

    /// Releases every change subscription and drops the whole tree.
    /// Idempotent, and safe to call at any point.
    pub fn dispose(&mut self) {
        self.watches.clear();
        self.last_seen.clear();
        self.arena.clear();
        self.subject_roots.clear();
        self.active = None;
        self.disposed = true;
    }

    // ---------------------------------------------------------------------
    // Incremental repair
    // ---------------------------------------------------------------------

    /// Apply one change notification. Repairs only the subtree keyed by the
    /// changed object; notifications for unrelated or unwatched objects are
    /// ignored, stale revisions are discarded.
    pub fn on_change(&mut self, event: ChangeEvent) -> Result<RepairOutcome> {
        if self.disposed {
            return Ok(RepairOutcome::Ignored);
        }
        let Some(entry) = self.watches.get(&event.iid) else {
            debug!(iid = %event.iid, "notification for unwatched object ignored");
            return Ok(RepairOutcome::Ignored);
        };
        let role = entry.role;
        if let Some(&last) = self.last_seen.get(&event.iid)
            && event.revision <= last
        {
            debug!(
                iid = %event.iid,
                incoming = event.revision,
                last,
                "stale revision discarded"
            );
            return Ok(RepairOutcome::StaleDiscarded);
        }
        self.last_seen.insert(event.iid, event.revision);

        let outcome = match role {
            Role::Iteration => self.repair_options()?,
            Role::ActualState | Role::StateList => self.repair_states()?,
            Role::ParameterType => self.repair_components()?,
            Role::ContainerUsage => self.repair_shadow()?,
            Role::SubjectThing => self.repair_subject()?,
            Role::ValueSet => self.refresh_cells(event.iid)?,
        };
        self.sync_watches();
        Ok(outcome)
    }

    /// Option added to or removed from the iteration: patch the OptionRow
    /// layer of every built subject subtree, leaving surviving rows alone.
    fn repair_options(&mut self) -> Result<RepairOutcome> {
        let Some(active) = self.active else {
            return Ok(RepairOutcome::NoChange);
        };
        let info = self.subject_info(active)?;
        if !info.is_option_dependent {
            return Ok(RepairOutcome::NoChange);
        }
        let iteration_iid = self.iteration_iid()?;
        let iteration = self
            .store
            .iteration(iteration_iid)
            .map_err(|_| TreeError::MissingRequiredContainer {
                container: iteration_iid,
            })?;
        let desired: Vec<Iid> = iteration.options;
        let desired_set: BTreeSet<Iid> = desired.iter().copied().collect();

        let mut changed = false;
        let roots: Vec<(Subject, RowId)> = self
            .subject_roots
            .iter()
            .map(|(subject, tree)| (*subject, tree.root))
            .collect();
        for (subject, root) in roots {
            let sub_info = self.subject_info(subject)?;
            let editable = self.access.can_write(sub_info.owner);

            let mut surviving: HashMap<Iid, RowId> = HashMap::new();
            let option_children: Vec<RowId> =
                self.arena.row(root).map(|row| row.children.clone()).unwrap_or_default();
            for child in option_children {
                let Some(option) = self.arena.row(child).and_then(|row| row.kind.option_iid())
                else {
                    continue;
                };
                if desired_set.contains(&option) {
                    surviving.insert(option, child);
                } else {
                    self.arena.remove_subtree(child);
                    changed = true;
                }
            }

            let mut ordered = Vec::with_capacity(desired.len());
            for option in &desired {
                if let Some(existing) = surviving.get(option) {
                    ordered.push(*existing);
                } else {
                    let created = self.build_option_row(root, *option, &sub_info, editable)?;
                    ordered.push(created);
                    changed = true;
                }
            }
            if let Some(row) = self.arena.row_mut(root) {
                row.children = ordered;
            }
        }
        Ok(if changed {
            RepairOutcome::Patched
        } else {
            RepairOutcome::NoChange
        })
    }

    /// State kind flipped, or the state list's membership changed: diff the
    /// StateRow layer under every option row (or the root) of every built
    /// subtree against the non-forbidden states, in list order.
    fn repair_states(&mut self) -> Result<RepairOutcome> {
        let Some(active) = self.active else {
            return Ok(RepairOutcome::NoChange);
        };
        let info = self.subject_info(active)?;
        let Some(list_iid) = info.state_dependence else {
            return Ok(RepairOutcome::NoChange);
        };
        let list = self
            .store
            .state_list(list_iid)
            .map_err(|_| TreeError::MissingStateInChain {
                subject: active.iid(),
                state_list: list_iid,
            })?;
        let mut desired: Vec<ActualFiniteState> = Vec::new();
        for state_iid in &list.states {
            match self.store.actual_state(*state_iid) {
                Ok(state) if !state.is_forbidden() => desired.push(state),
                Ok(_) => {}
                Err(_) => {
                    warn!(state = %state_iid, "state list references missing actual state");
                }
            }
        }
        let desired_set: BTreeSet<Iid> = desired.iter().map(|state| state.iid).collect();

        let mut changed = false;
        let roots: Vec<(Subject, RowId)> = self
            .subject_roots
            .iter()
            .map(|(subject, tree)| (*subject, tree.root))
            .collect();
        for (subject, root) in roots {
            let sub_info = self.subject_info(subject)?;
            let editable = self.access.can_write(sub_info.owner);
            let parents = self.state_parents(root, &sub_info);
            for parent in parents {
                let option = self.option_context(parent);

                let mut surviving: HashMap<Iid, RowId> = HashMap::new();
                let state_children: Vec<RowId> = self
                    .arena
                    .row(parent)
                    .map(|row| row.children.clone())
                    .unwrap_or_default();
                for child in state_children {
                    let Some(state) = self.arena.row(child).and_then(|row| row.kind.state_iid())
                    else {
                        continue;
                    };
                    if desired_set.contains(&state) {
                        surviving.insert(state, child);
                    } else {
                        self.arena.remove_subtree(child);
                        changed = true;
                    }
                }

                let mut ordered = Vec::with_capacity(desired.len());
                for state in &desired {
                    if let Some(existing) = surviving.get(&state.iid) {
                        ordered.push(*existing);
                    } else {
                        let created =
                            self.build_state_row(parent, option, state, &sub_info, editable)?;
                        ordered.push(created);
                        changed = true;
                    }
                }
                if let Some(row) = self.arena.row_mut(parent) {
                    row.children = ordered;
                }
            }
        }
        Ok(if changed {
            RepairOutcome::Patched
        } else {
            RepairOutcome::NoChange
        })
    }

    /// Parameter type changed. A shape change (scalar/compound flip, type
    /// swap) rebuilds the affected subject subtrees; a component-list delta
    /// reconciles ComponentRows by component identity under every terminal.
    fn repair_components(&mut self) -> Result<RepairOutcome> {
        if self.rebuild_stale_signatures()? {
            return Ok(RepairOutcome::Rebuilt);
        }
        let Some(active) = self.active else {
            return Ok(RepairOutcome::NoChange);
        };
        let info = self.subject_info(active)?;
        if !info.parameter_type.is_compound() {
            // scalar terminals have no component rows; cells refresh comes
            // with the value-set notifications
            return Ok(RepairOutcome::NoChange);
        }

        let mut changed = false;
        let roots: Vec<(Subject, RowId)> = self
            .subject_roots
            .iter()
            .map(|(subject, tree)| (*subject, tree.root))
            .collect();
        for (subject, root) in roots {
            let sub_info = self.subject_info(subject)?;
            let editable = self.access.can_write(sub_info.owner);
            let components = sub_info.parameter_type.components().to_vec();
            let desired_set: BTreeSet<Iid> =
                components.iter().map(|component| component.iid).collect();

            for parent in self.component_parents(root, &sub_info) {
                let (option, state) = self.cell_context(parent);
                let value_set = self.store.resolve_value_set(
                    subject,
                    option,
                    state,
                    sub_info.parameter_type.slot_count(),
                )?;

                let mut surviving: HashMap<Iid, RowId> = HashMap::new();
                let children: Vec<RowId> = self
                    .arena
                    .row(parent)
                    .map(|row| row.children.clone())
                    .unwrap_or_default();
                for child in children {
                    let Some(component) =
                        self.arena.row(child).and_then(|row| row.kind.component_iid())
                    else {
                        continue;
                    };
                    if desired_set.contains(&component) {
                        surviving.insert(component, child);
                    } else {
                        self.arena.remove_subtree(child);
                        changed = true;
                    }
                }

                let record = self.store.value_set(value_set)?;
                let mut ordered = Vec::with_capacity(components.len());
                for (index, component) in components.iter().enumerate() {
                    if let Some(existing) = surviving.get(&component.iid).copied() {
                        if let Some(row) = self.arena.row_mut(existing) {
                            // surviving components may have shifted slots
                            if row.slot_index != index || row.name != component.short_name {
                                changed = true;
                            }
                            row.kind = RowKind::Component {
                                component: component.iid,
                                index,
                            };
                            row.slot_index = index;
                            row.name = component.short_name.clone();
                            row.cells = Some(cells_from(&record, index));
                        }
                        ordered.push(existing);
                    } else {
                        let created = self.insert_component_row(
                            parent, &sub_info, component.iid, index, value_set, &record, editable,
                        );
                        ordered.push(created);
                        changed = true;
                    }
                }
                if let Some(row) = self.arena.row_mut(parent) {
                    row.children = ordered;
                }
            }
        }
        Ok(if changed {
            RepairOutcome::Patched
        } else {
            RepairOutcome::NoChange
        })
    }

    /// Override/subscription set changed at the container: re-evaluate only
    /// the shadow relation and swap which row set is visible. Suppressed
    /// trees stay built so un-shadowing restores their rows unchanged.
    fn repair_shadow(&mut self) -> Result<RepairOutcome> {
        // drop built trees whose subject no longer exists
        let dead: Vec<Subject> = self
            .subject_roots
            .keys()
            .copied()
            .filter(|subject| self.subject_info(*subject).is_err())
            .collect();
        for subject in &dead {
            if let Some(tree) = self.subject_roots.remove(subject) {
                self.arena.remove_subtree(tree.root);
            }
        }

        let new_active = self.resolve_active()?;
        if self.active == Some(new_active) {
            return Ok(if dead.is_empty() {
                RepairOutcome::NoChange
            } else {
                RepairOutcome::Patched
            });
        }
        if !self.subject_roots.contains_key(&new_active) {
            let tree = self.build_subject_tree(new_active)?;
            self.subject_roots.insert(new_active, tree);
        }
        debug!(
            from = ?self.active,
            to = %new_active,
            "shadow relation swapped visible subject"
        );
        self.active = Some(new_active);
        Ok(RepairOutcome::ShadowSwapped)
    }

    /// The subject object itself changed: its subscription set may shadow
    /// differently, and its structure-defining flags may have flipped.
    fn repair_subject(&mut self) -> Result<RepairOutcome> {
        let swapped = self.repair_shadow()?;
        if self.rebuild_stale_signatures()? {
            return Ok(RepairOutcome::Rebuilt);
        }
        Ok(swapped)
    }

    /// Value-set record updated: re-read the cached display fields of every
    /// row it backs. No structural change, row identity untouched.
    fn refresh_cells(&mut self, value_set: Iid) -> Result<RepairOutcome> {
        let rows = self.arena.rows_backed_by(value_set);
        if rows.is_empty() {
            return Ok(RepairOutcome::NoChange);
        }
        let record = self.store.value_set(value_set)?;
        for id in rows {
            if let Some(row) = self.arena.row_mut(id) {
                row.cells = Some(cells_from(&record, row.slot_index));
                row.error = None;
            }
        }
        Ok(RepairOutcome::CellsRefreshed)
    }

    /// Rebuild any built subtree whose structure-defining signature no
    /// longer matches the graph. Returns true if anything was rebuilt.
    fn rebuild_stale_signatures(&mut self) -> Result<bool> {
        let subjects: Vec<Subject> = self.subject_roots.keys().copied().collect();
        let mut rebuilt = false;
        for subject in subjects {
            let info = self.subject_info(subject)?;
            let signature = Signature::of(&info);
            let stale = self
                .subject_roots
                .get(&subject)
                .is_some_and(|tree| tree.signature != signature);
            if !stale {
                continue;
            }
            if let Some(tree) = self.subject_roots.remove(&subject) {
                self.arena.remove_subtree(tree.root);
            }
            let tree = self.build_subject_tree(subject)?;
            self.subject_roots.insert(subject, tree);
            rebuilt = true;
        }
        Ok(rebuilt)
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Set the authoritative-value switch on a row.
    ///
    /// The switch propagates to every descendant row that carries cells
    /// (component rows and folded terminals), never upward and never to
    /// siblings. One clone+switch write is dispatched per distinct backing
    /// record; a rejected write leaves the affected rows on their last
    /// confirmed switch and marks them with the failure.
    pub fn set_switch(&mut self, id: RowId, kind: ParameterSwitchKind) -> Result<()> {
        let row = self.arena.row(id).ok_or(TreeError::RowNotFound(id))?;
        if !row.is_editable {
            return Err(TreeError::NotEditable(id));
        }
        let targets: Vec<RowId> = self
            .arena
            .preorder(id)
            .into_iter()
            .filter(|target| self.arena.row(*target).is_some_and(Row::is_terminal))
            .collect();
        let mut record_rows: BTreeMap<Iid, Vec<RowId>> = BTreeMap::new();
        for target in targets {
            if let Some(value_set) = self.arena.row(target).and_then(|row| row.value_set) {
                record_rows.entry(value_set).or_default().push(target);
            }
        }

        let mut first_rejection: Option<TreeError> = None;
        for (value_set, rows) in record_rows {
            let request = WriteRequest {
                value_set,
                action: WriteAction::SetSwitch(kind),
            };
            match self.writer.submit(&request) {
                Ok(()) => {
                    for target in rows {
                        if let Some(row) = self.arena.row_mut(target)
                            && let Some(cells) = row.cells.as_mut()
                        {
                            cells.value_switch = kind;
                            cells.actual = match kind {
                                ParameterSwitchKind::Manual => cells.manual.clone(),
                                ParameterSwitchKind::Computed => cells.computed.clone(),
                                ParameterSwitchKind::Reference => cells.reference.clone(),
                            };
                            row.error = None;
                        }
                    }
                }
                Err(err) => {
                    warn!(value_set = %value_set, error = %err, "switch write rejected");
                    for target in &rows {
                        if let Some(row) = self.arena.row_mut(*target) {
                            row.error = Some(err.to_string());
                        }
                    }
                    first_rejection.get_or_insert(TreeError::WriteRejected {
                        row: id,
                        reason: err.to_string(),
                    });
                }
            }
        }
        match first_rejection {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Edit one editable value field of a terminal row.
    ///
    /// Produces a clone-one-field write for the row's slot in the backing
    /// record; the display is updated only once the collaborator accepts.
    /// On rejection the row keeps its last confirmed value and carries the
    /// failure until a corrective notification arrives.
    pub fn edit_value(&mut self, id: RowId, field: ValueField, value: String) -> Result<()> {
        let row = self.arena.row(id).ok_or(TreeError::RowNotFound(id))?;
        if !row.is_editable || row.cells.is_none() {
            return Err(TreeError::NotEditable(id));
        }
        let value_set = row.value_set.ok_or(TreeError::NotEditable(id))?;
        let slot_index = row.slot_index;
        let record = self.store.value_set(value_set)?;
        let mut values = match field {
            ValueField::Manual => record.manual.clone(),
            ValueField::Reference => record.reference.clone(),
        };
        if slot_index >= values.len() {
            values.resize(slot_index + 1, "-".to_string());
        }
        values[slot_index] = value.clone();

        let request = WriteRequest {
            value_set,
            action: WriteAction::SetValues { field, values },
        };
        match self.writer.submit(&request) {
            Ok(()) => {
                if let Some(row) = self.arena.row_mut(id)
                    && let Some(cells) = row.cells.as_mut()
                {
                    match field {
                        ValueField::Manual => cells.manual = value.clone(),
                        ValueField::Reference => cells.reference = value.clone(),
                    }
                    let selected = match cells.value_switch {
                        ParameterSwitchKind::Manual => matches!(field, ValueField::Manual),
                        ParameterSwitchKind::Reference => matches!(field, ValueField::Reference),
                        ParameterSwitchKind::Computed => false,
                    };
                    if selected {
                        cells.actual = value;
                    }
                    row.error = None;
                }
                Ok(())
            }
            Err(err) => {
                warn!(row = %id, value_set = %value_set, error = %err, "value write rejected");
                if let Some(row) = self.arena.row_mut(id) {
                    row.error = Some(err.to_string());
                }
                Err(TreeError::WriteRejected {
                    row: id,
                    reason: err.to_string(),
                })
            }
        }
    }

    // ---------------------------------------------------------------------
    // Subject resolution and builders
    // ---------------------------------------------------------------------

    /// Apply the shadow relation for the slot: an override on the usage
    /// replaces the base parameter, and a subscription owned by the active
    /// domain replaces whichever of the two it subscribes to.
    fn resolve_active(&self) -> Result<Subject> {
        let mut candidate = Subject::Parameter(self.slot.base_parameter);
        if let ContainerRef::Usage(usage) = self.slot.container {
            self.store
                .element_usage(usage)
                .map_err(|_| TreeError::MissingRequiredContainer { container: usage })?;
            if let Some(ovr) = self
                .store
                .override_on_usage(usage, self.slot.base_parameter)
            {
                candidate = Subject::Override(ovr.iid);
            }
        }
        if let Some(sub) = self
            .store
            .subscription_owned(self.slot.active_domain, candidate.iid())
        {
            candidate = Subject::Subscription(sub.iid);
        }
        Ok(candidate)
    }

    fn subject_info(&self, subject: Subject) -> Result<SubjectInfo> {
        let (base, owner) = match subject {
            Subject::Parameter(iid) => {
                let parameter = self.store.parameter(iid)?;
                let owner = parameter.owner;
                (parameter, owner)
            }
            Subject::Override(iid) => {
                let ovr = self.store.parameter_override(iid)?;
                let base = self.store.parameter(ovr.parameter)?;
                (base, ovr.owner)
            }
            Subject::Subscription(iid) => {
                let sub = self.store.parameter_subscription(iid)?;
                let base = match self.store.parameter(sub.subscribed) {
                    Ok(parameter) => parameter,
                    Err(_) => {
                        let ovr = self.store.parameter_override(sub.subscribed)?;
                        self.store.parameter(ovr.parameter)?
                    }
                };
                (base, sub.owner)
            }
        };
        let parameter_type = self.store.parameter_type(base.parameter_type)?;
        let owner_short_name = self
            .store
            .domain_of_expertise(owner)
            .map(|domain| domain.short_name)
            .unwrap_or_default();
        Ok(SubjectInfo {
            subject,
            owner,
            owner_short_name,
            display_name: parameter_type.name().to_string(),
            parameter_type,
            is_option_dependent: base.is_option_dependent,
            state_dependence: base.state_dependence,
        })
    }

    /// The iteration reached through the slot's container chain.
    fn iteration_iid(&self) -> Result<Iid> {
        let container = self.slot.container.iid();
        match self.slot.container {
            ContainerRef::Definition(definition) => Ok(self
                .store
                .element_definition(definition)
                .map_err(|_| TreeError::MissingRequiredContainer { container })?
                .container),
            ContainerRef::Usage(usage) => Ok(self
                .store
                .element_usage(usage)
                .map_err(|_| TreeError::MissingRequiredContainer { container })?
                .container),
        }
    }

    fn build_subject_tree(&mut self, subject: Subject) -> Result<BuiltTree> {
        let info = self.subject_info(subject)?;
        let editable = self.access.can_write(info.owner);
        let root = self.arena.insert(|id| Row {
            id,
            kind: RowKind::Subject,
            subject,
            parent: None,
            children: Vec::new(),
            name: info.display_name.clone(),
            owner_short_name: info.owner_short_name.clone(),
            value_set: None,
            slot_index: 0,
            cells: None,
            is_editable: editable,
            error: None,
        });
        match self.build_subject_children(root, &info, editable) {
            Ok(()) => Ok(BuiltTree {
                root,
                signature: Signature::of(&info),
            }),
            Err(err) => {
                // never leave a half-built subtree in the arena
                self.arena.remove_subtree(root);
                Err(err)
            }
        }
    }

    fn build_subject_children(
        &mut self,
        root: RowId,
        info: &SubjectInfo,
        editable: bool,
    ) -> Result<()> {
        if info.is_option_dependent {
            let iteration_iid = self.iteration_iid()?;
            let iteration = self
                .store
                .iteration(iteration_iid)
                .map_err(|_| TreeError::MissingRequiredContainer {
                    container: iteration_iid,
                })?;
            for option in iteration.options {
                self.build_option_row(root, option, info, editable)?;
            }
        } else if info.state_dependence.is_some() {
            self.build_state_layer(root, None, info, editable)?;
        } else if info.parameter_type.is_compound() {
            self.build_component_layer(root, None, None, info, editable)?;
        } else {
            self.bind_folded_cells(root, None, None, info)?;
        }
        Ok(())
    }

    /// One OptionRow and its full State x Component subtree. A failure to
    /// resolve the option yields a placeholder row with a diagnostic instead
    /// of aborting the whole build.
    fn build_option_row(
        &mut self,
        parent: RowId,
        option: Iid,
        info: &SubjectInfo,
        editable: bool,
    ) -> Result<RowId> {
        let resolved = self.store.design_option(option);
        let (name, error) = match &resolved {
            Ok(design_option) => (design_option.name.clone(), None),
            Err(err) => {
                warn!(option = %option, error = %err, "option subtree left as placeholder");
                (String::new(), Some(err.to_string()))
            }
        };
        let failed = error.is_some();
        let row = self.arena.insert(|id| Row {
            id,
            kind: RowKind::Option { option },
            subject: info.subject,
            parent: Some(parent),
            children: Vec::new(),
            name: name.clone(),
            owner_short_name: info.owner_short_name.clone(),
            value_set: None,
            slot_index: 0,
            cells: None,
            is_editable: editable,
            error,
        });
        if failed {
            return Ok(row);
        }
        if info.state_dependence.is_some() {
            self.build_state_layer(row, Some(option), info, editable)?;
        } else if info.parameter_type.is_compound() {
            self.build_component_layer(row, Some(option), None, info, editable)?;
        } else {
            self.bind_folded_cells(row, Some(option), None, info)?;
        }
        Ok(row)
    }

    /// StateRows for every non-forbidden state, in list order.
    fn build_state_layer(
        &mut self,
        parent: RowId,
        option: Option<Iid>,
        info: &SubjectInfo,
        editable: bool,
    ) -> Result<()> {
        let Some(list_iid) = info.state_dependence else {
            return Ok(());
        };
        let list = self
            .store
            .state_list(list_iid)
            .map_err(|_| TreeError::MissingStateInChain {
                subject: info.subject.iid(),
                state_list: list_iid,
            })?;
        for state_iid in list.states {
            let state = match self.store.actual_state(state_iid) {
                Ok(state) => state,
                Err(err) => {
                    warn!(state = %state_iid, error = %err, "skipping missing actual state");
                    continue;
                }
            };
            if state.is_forbidden() {
                continue;
            }
            self.build_state_row(parent, option, &state, info, editable)?;
        }
        Ok(())
    }

    fn build_state_row(
        &mut self,
        parent: RowId,
        option: Option<Iid>,
        state: &ActualFiniteState,
        info: &SubjectInfo,
        editable: bool,
    ) -> Result<RowId> {
        let row = self.arena.insert(|id| Row {
            id,
            kind: RowKind::State { state: state.iid },
            subject: info.subject,
            parent: Some(parent),
            children: Vec::new(),
            name: state.name.clone(),
            owner_short_name: info.owner_short_name.clone(),
            value_set: None,
            slot_index: 0,
            cells: None,
            is_editable: editable,
            error: None,
        });
        if info.parameter_type.is_compound() {
            self.build_component_layer(row, option, Some(state.iid), info, editable)?;
        } else {
            self.bind_folded_cells(row, option, Some(state.iid), info)?;
        }
        Ok(row)
    }

    /// One ComponentRow per parameter-type component, all backed by the one
    /// record resolved (or lazily created) for this (option, state) cell.
    fn build_component_layer(
        &mut self,
        parent: RowId,
        option: Option<Iid>,
        state: Option<Iid>,
        info: &SubjectInfo,
        editable: bool,
    ) -> Result<()> {
        let value_set = self.store.resolve_value_set(
            info.subject,
            option,
            state,
            info.parameter_type.slot_count(),
        )?;
        let record = self.store.value_set(value_set)?;
        let components = info.parameter_type.components().to_vec();
        for (index, component) in components.iter().enumerate() {
            self.insert_component_row(
                parent, info, component.iid, index, value_set, &record, editable,
            );
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_component_row(
        &mut self,
        parent: RowId,
        info: &SubjectInfo,
        component: Iid,
        index: usize,
        value_set: Iid,
        record: &ValueSet,
        editable: bool,
    ) -> RowId {
        let name = info
            .parameter_type
            .components()
            .get(index)
            .map(|c| c.short_name.clone())
            .unwrap_or_default();
        self.arena.insert(|id| Row {
            id,
            kind: RowKind::Component { component, index },
            subject: info.subject,
            parent: Some(parent),
            children: Vec::new(),
            name: name.clone(),
            owner_short_name: info.owner_short_name.clone(),
            value_set: Some(value_set),
            slot_index: index,
            cells: Some(cells_from(record, index)),
            is_editable: editable,
            error: None,
        })
    }

    /// Scalar subjects carry their single implicit component on the parent
    /// row itself instead of a dedicated ComponentRow.
    fn bind_folded_cells(
        &mut self,
        row: RowId,
        option: Option<Iid>,
        state: Option<Iid>,
        info: &SubjectInfo,
    ) -> Result<()> {
        let value_set =
            self.store
                .resolve_value_set(info.subject, option, state, info.parameter_type.slot_count())?;
        let record = self.store.value_set(value_set)?;
        if let Some(row) = self.arena.row_mut(row) {
            row.value_set = Some(value_set);
            row.slot_index = 0;
            row.cells = Some(cells_from(&record, 0));
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Tree navigation helpers
    // ---------------------------------------------------------------------

    /// Rows that hold StateRow children for a subject subtree.
    fn state_parents(&self, root: RowId, info: &SubjectInfo) -> Vec<RowId> {
        if info.is_option_dependent {
            self.arena
                .row(root)
                .map(|row| row.children.clone())
                .unwrap_or_default()
                .into_iter()
                .filter(|child| {
                    self.arena
                        .row(*child)
                        .is_some_and(|row| matches!(row.kind, RowKind::Option { .. }))
                })
                .collect()
        } else {
            vec![root]
        }
    }

    /// Rows that hold ComponentRow children for a subject subtree.
    fn component_parents(&self, root: RowId, info: &SubjectInfo) -> Vec<RowId> {
        if info.state_dependence.is_some() {
            self.arena
                .preorder(root)
                .into_iter()
                .filter(|id| {
                    self.arena
                        .row(*id)
                        .is_some_and(|row| matches!(row.kind, RowKind::State { .. }))
                })
                .collect()
        } else if info.is_option_dependent {
            self.state_parents(root, info)
        } else {
            vec![root]
        }
    }

    /// The option a row sits under, if any.
    fn option_context(&self, id: RowId) -> Option<Iid> {
        let mut current = Some(id);
        while let Some(row) = current.and_then(|id| self.arena.row(id)) {
            if let Some(option) = row.kind.option_iid() {
                return Some(option);
            }
            current = row.parent;
        }
        None
    }

    /// The (option, state) cell a terminal parent belongs to.
    fn cell_context(&self, id: RowId) -> (Option<Iid>, Option<Iid>) {
        let mut option = None;
        let mut state = None;
        let mut current = Some(id);
        while let Some(row) = current.and_then(|id| self.arena.row(id)) {
            if state.is_none() {
                state = row.kind.state_iid();
            }
            if option.is_none() {
                option = row.kind.option_iid();
            }
            current = row.parent;
        }
        (option, state)
    }

    // ---------------------------------------------------------------------
    // Watch bookkeeping
    // ---------------------------------------------------------------------

    /// Reconcile the held subscriptions against the objects that can
    /// currently invalidate part of the tree. Watches for removed rows'
    /// records are dropped here, which is what cascade-disposal means for
    /// this tree.
    fn sync_watches(&mut self) {
        let mut desired: HashMap<Iid, Role> = HashMap::new();
        desired.insert(self.slot.base_parameter, Role::SubjectThing);
        for subject in self.subject_roots.keys() {
            desired.insert(subject.iid(), Role::SubjectThing);
        }
        if let ContainerRef::Usage(usage) = self.slot.container {
            desired.insert(usage, Role::ContainerUsage);
        }
        if let Some(active) = self.active
            && let Ok(info) = self.subject_info(active)
        {
            desired.insert(info.parameter_type.iid(), Role::ParameterType);
            if info.is_option_dependent
                && let Ok(iteration) = self.iteration_iid()
            {
                desired.insert(iteration, Role::Iteration);
            }
            if let Some(list_iid) = info.state_dependence {
                desired.insert(list_iid, Role::StateList);
                if let Ok(list) = self.store.state_list(list_iid) {
                    // forbidden states stay watched so un-forbidding is seen
                    for state in list.states {
                        desired.insert(state, Role::ActualState);
                    }
                }
            }
        }
        for row in self.arena.iter() {
            if let Some(value_set) = row.value_set {
                desired.insert(value_set, Role::ValueSet);
            }
        }

        self.watches.retain(|iid, _| desired.contains_key(iid));
        self.last_seen.retain(|iid, _| desired.contains_key(iid));
        for (iid, role) in desired {
            match self.watches.entry(iid) {
                Entry::Occupied(mut occupied) => {
                    occupied.get_mut().role = role;
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(WatchEntry {
                        _watch: self.bus.subscribe(iid),
                        role,
                    });
                    let revision = self.store.revision_of(iid).unwrap_or(0);
                    self.last_seen.entry(iid).or_insert(revision);
                }
            }
        }
    }
}

fn cells_from(record: &ValueSet, index: usize) -> ValueCells {
    let pick = |values: &[String]| {
        values
            .get(index)
            .cloned()
            .unwrap_or_else(|| "-".to_string())
    };
    ValueCells {
        manual: pick(&record.manual),
        computed: pick(&record.computed),
        reference: pick(&record.reference),
        published: pick(&record.published),
        actual: pick(record.actual()),
        value_switch: record.value_switch,
    }
}
