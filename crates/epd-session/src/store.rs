//! In-memory domain graph with synchronous reads and revision-stamped
//! mutation.
//!
//! Reads return the current, already-mutated state of an object; there is no
//! transactional snapshot isolation. Every mutation bumps the object's
//! revision and queues a [`ChangeEvent`] that the caller drains and delivers
//! to interested consumers, so delivery order matches mutation order.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use epd_model::{
    ActualFiniteState, ActualFiniteStateList, ActualStateKind, DesignOption, DomainOfExpertise,
    ElementDefinition, ElementUsage, Iid, Iteration, Parameter, ParameterOverride,
    ParameterSubscription, ParameterType, RevisionNumber, Subject, ValueSet,
};

use crate::error::{Result, SessionError};
use crate::event::ChangeEvent;
use crate::write::{ValueField, WriteAction, WriteCollaborator, WriteError, WriteRequest};

#[derive(Debug, Default)]
struct Graph {
    options: HashMap<Iid, DesignOption>,
    states: HashMap<Iid, ActualFiniteState>,
    state_lists: HashMap<Iid, ActualFiniteStateList>,
    domains: HashMap<Iid, DomainOfExpertise>,
    iterations: HashMap<Iid, Iteration>,
    definitions: HashMap<Iid, ElementDefinition>,
    usages: HashMap<Iid, ElementUsage>,
    parameter_types: HashMap<Iid, ParameterType>,
    parameters: HashMap<Iid, Parameter>,
    overrides: HashMap<Iid, ParameterOverride>,
    subscriptions: HashMap<Iid, ParameterSubscription>,
    value_sets: HashMap<Iid, ValueSet>,
    pending: VecDeque<ChangeEvent>,
}

/// Shared handle to the session's domain graph.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<Graph>>,
}

fn get<T: Clone>(map: &HashMap<Iid, T>, iid: Iid) -> Result<T> {
    map.get(&iid).cloned().ok_or(SessionError::UnknownObject(iid))
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn graph(&self) -> MutexGuard<'_, Graph> {
        self.inner.lock().expect("store lock")
    }

    /// Mutations queued since the last drain, in mutation order.
    pub fn drain_events(&self) -> Vec<ChangeEvent> {
        self.graph().pending.drain(..).collect()
    }

    /// Current revision of any object, whatever its kind.
    pub fn revision_of(&self, iid: Iid) -> Option<RevisionNumber> {
        let graph = self.graph();
        graph
            .options
            .get(&iid)
            .map(|thing| thing.revision)
            .or_else(|| graph.states.get(&iid).map(|thing| thing.revision))
            .or_else(|| graph.state_lists.get(&iid).map(|thing| thing.revision))
            .or_else(|| graph.domains.get(&iid).map(|thing| thing.revision))
            .or_else(|| graph.iterations.get(&iid).map(|thing| thing.revision))
            .or_else(|| graph.definitions.get(&iid).map(|thing| thing.revision))
            .or_else(|| graph.usages.get(&iid).map(|thing| thing.revision))
            .or_else(|| graph.parameter_types.get(&iid).map(|thing| thing.revision()))
            .or_else(|| graph.parameters.get(&iid).map(|thing| thing.revision))
            .or_else(|| graph.overrides.get(&iid).map(|thing| thing.revision))
            .or_else(|| graph.subscriptions.get(&iid).map(|thing| thing.revision))
            .or_else(|| graph.value_sets.get(&iid).map(|thing| thing.revision))
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub fn design_option(&self, iid: Iid) -> Result<DesignOption> {
        get(&self.graph().options, iid)
    }

    pub fn actual_state(&self, iid: Iid) -> Result<ActualFiniteState> {
        get(&self.graph().states, iid)
    }

    pub fn state_list(&self, iid: Iid) -> Result<ActualFiniteStateList> {
        get(&self.graph().state_lists, iid)
    }

    pub fn domain_of_expertise(&self, iid: Iid) -> Result<DomainOfExpertise> {
        get(&self.graph().domains, iid)
    }

    pub fn iteration(&self, iid: Iid) -> Result<Iteration> {
        get(&self.graph().iterations, iid)
    }

    pub fn element_definition(&self, iid: Iid) -> Result<ElementDefinition> {
        get(&self.graph().definitions, iid)
    }

    pub fn element_usage(&self, iid: Iid) -> Result<ElementUsage> {
        get(&self.graph().usages, iid)
    }

    pub fn parameter_type(&self, iid: Iid) -> Result<ParameterType> {
        get(&self.graph().parameter_types, iid)
    }

    pub fn parameter(&self, iid: Iid) -> Result<Parameter> {
        get(&self.graph().parameters, iid)
    }

    pub fn parameter_override(&self, iid: Iid) -> Result<ParameterOverride> {
        get(&self.graph().overrides, iid)
    }

    pub fn parameter_subscription(&self, iid: Iid) -> Result<ParameterSubscription> {
        get(&self.graph().subscriptions, iid)
    }

    pub fn value_set(&self, iid: Iid) -> Result<ValueSet> {
        get(&self.graph().value_sets, iid)
    }

    /// The override sitting on `usage` that replaces `parameter`, if any.
    pub fn override_on_usage(&self, usage: Iid, parameter: Iid) -> Option<ParameterOverride> {
        let graph = self.graph();
        let usage = graph.usages.get(&usage)?;
        usage
            .overrides
            .iter()
            .filter_map(|iid| graph.overrides.get(iid))
            .find(|ovr| ovr.parameter == parameter)
            .cloned()
    }

    /// The subscription `owner` holds on `subscribed`, if any. At most one
    /// subscription per (owner, subscribed) pair exists.
    pub fn subscription_owned(&self, owner: Iid, subscribed: Iid) -> Option<ParameterSubscription> {
        let graph = self.graph();
        graph
            .subscriptions
            .values()
            .find(|sub| sub.owner == owner && sub.subscribed == subscribed)
            .cloned()
    }

    // ---------------------------------------------------------------------
    // Population
    // ---------------------------------------------------------------------

    pub fn add_domain(&self, domain: DomainOfExpertise) -> Iid {
        let mut graph = self.graph();
        let (iid, revision) = (domain.iid, domain.revision);
        graph.domains.insert(iid, domain);
        graph.pending.push_back(ChangeEvent::added(iid, revision));
        iid
    }

    pub fn add_iteration(&self, iteration: Iteration) -> Iid {
        let mut graph = self.graph();
        let (iid, revision) = (iteration.iid, iteration.revision);
        graph.iterations.insert(iid, iteration);
        graph.pending.push_back(ChangeEvent::added(iid, revision));
        iid
    }

    pub fn add_state_list(&self, list: ActualFiniteStateList) -> Iid {
        let mut graph = self.graph();
        let (iid, revision) = (list.iid, list.revision);
        graph.state_lists.insert(iid, list);
        graph.pending.push_back(ChangeEvent::added(iid, revision));
        iid
    }

    pub fn add_actual_state(&self, state: ActualFiniteState) -> Iid {
        let mut graph = self.graph();
        let (iid, revision) = (state.iid, state.revision);
        graph.states.insert(iid, state);
        graph.pending.push_back(ChangeEvent::added(iid, revision));
        iid
    }

    pub fn add_element_definition(&self, definition: ElementDefinition) -> Iid {
        let mut graph = self.graph();
        let (iid, revision) = (definition.iid, definition.revision);
        graph.definitions.insert(iid, definition);
        graph.pending.push_back(ChangeEvent::added(iid, revision));
        iid
    }

    pub fn add_element_usage(&self, usage: ElementUsage) -> Iid {
        let mut graph = self.graph();
        let (iid, revision) = (usage.iid, usage.revision);
        graph.usages.insert(iid, usage);
        graph.pending.push_back(ChangeEvent::added(iid, revision));
        iid
    }

    pub fn add_parameter_type(&self, parameter_type: ParameterType) -> Iid {
        let mut graph = self.graph();
        let (iid, revision) = (parameter_type.iid(), parameter_type.revision());
        graph.parameter_types.insert(iid, parameter_type);
        graph.pending.push_back(ChangeEvent::added(iid, revision));
        iid
    }

    pub fn add_parameter(&self, parameter: Parameter) -> Iid {
        let mut graph = self.graph();
        let (iid, revision) = (parameter.iid, parameter.revision);
        graph.parameters.insert(iid, parameter);
        graph.pending.push_back(ChangeEvent::added(iid, revision));
        iid
    }

    pub fn add_value_set(&self, value_set: ValueSet) -> Iid {
        let mut graph = self.graph();
        let (iid, revision) = (value_set.iid, value_set.revision);
        graph.value_sets.insert(iid, value_set);
        graph.pending.push_back(ChangeEvent::added(iid, revision));
        iid
    }

    // ---------------------------------------------------------------------
    // Structural mutation
    // ---------------------------------------------------------------------

    /// Add an option to the graph and to its iteration's ordered list.
    pub fn add_option(&self, iteration: Iid, option: DesignOption) -> Result<Iid> {
        let mut graph = self.graph();
        let (iid, revision) = (option.iid, option.revision);
        graph.options.insert(iid, option);
        graph.pending.push_back(ChangeEvent::added(iid, revision));
        let iter = graph
            .iterations
            .get_mut(&iteration)
            .ok_or(SessionError::UnknownObject(iteration))?;
        iter.options.push(iid);
        iter.revision += 1;
        let event = ChangeEvent::updated(iteration, iter.revision);
        graph.pending.push_back(event);
        Ok(iid)
    }

    /// Remove an option from the graph and from its iteration's list.
    pub fn remove_option(&self, iteration: Iid, option: Iid) -> Result<()> {
        let mut graph = self.graph();
        let removed = graph
            .options
            .remove(&option)
            .ok_or(SessionError::UnknownObject(option))?;
        graph
            .pending
            .push_back(ChangeEvent::removed(option, removed.revision));
        let iter = graph
            .iterations
            .get_mut(&iteration)
            .ok_or(SessionError::UnknownObject(iteration))?;
        iter.options.retain(|iid| *iid != option);
        iter.revision += 1;
        let event = ChangeEvent::updated(iteration, iter.revision);
        graph.pending.push_back(event);
        Ok(())
    }

    /// Flip the applicability kind of an actual finite state.
    pub fn set_state_kind(&self, state: Iid, kind: ActualStateKind) -> Result<RevisionNumber> {
        self.update_actual_state(state, |actual| actual.kind = kind)
    }

    pub fn update_actual_state(
        &self,
        iid: Iid,
        mutate: impl FnOnce(&mut ActualFiniteState),
    ) -> Result<RevisionNumber> {
        let mut graph = self.graph();
        let state = graph
            .states
            .get_mut(&iid)
            .ok_or(SessionError::UnknownObject(iid))?;
        mutate(state);
        state.revision += 1;
        let revision = state.revision;
        graph.pending.push_back(ChangeEvent::updated(iid, revision));
        Ok(revision)
    }

    pub fn update_state_list(
        &self,
        iid: Iid,
        mutate: impl FnOnce(&mut ActualFiniteStateList),
    ) -> Result<RevisionNumber> {
        let mut graph = self.graph();
        let list = graph
            .state_lists
            .get_mut(&iid)
            .ok_or(SessionError::UnknownObject(iid))?;
        mutate(list);
        list.revision += 1;
        let revision = list.revision;
        graph.pending.push_back(ChangeEvent::updated(iid, revision));
        Ok(revision)
    }

    pub fn update_parameter_type(
        &self,
        iid: Iid,
        mutate: impl FnOnce(&mut ParameterType),
    ) -> Result<RevisionNumber> {
        let mut graph = self.graph();
        let parameter_type = graph
            .parameter_types
            .get_mut(&iid)
            .ok_or(SessionError::UnknownObject(iid))?;
        mutate(parameter_type);
        let revision = parameter_type.revision() + 1;
        match parameter_type {
            ParameterType::Scalar { revision: rev, .. }
            | ParameterType::Compound { revision: rev, .. }
            | ParameterType::Array { revision: rev, .. } => *rev = revision,
        }
        graph.pending.push_back(ChangeEvent::updated(iid, revision));
        Ok(revision)
    }

    pub fn update_parameter(
        &self,
        iid: Iid,
        mutate: impl FnOnce(&mut Parameter),
    ) -> Result<RevisionNumber> {
        let mut graph = self.graph();
        let parameter = graph
            .parameters
            .get_mut(&iid)
            .ok_or(SessionError::UnknownObject(iid))?;
        mutate(parameter);
        parameter.revision += 1;
        let revision = parameter.revision;
        graph.pending.push_back(ChangeEvent::updated(iid, revision));
        Ok(revision)
    }

    pub fn update_value_set(
        &self,
        iid: Iid,
        mutate: impl FnOnce(&mut ValueSet),
    ) -> Result<RevisionNumber> {
        let mut graph = self.graph();
        let value_set = graph
            .value_sets
            .get_mut(&iid)
            .ok_or(SessionError::UnknownObject(iid))?;
        mutate(value_set);
        value_set.revision += 1;
        let revision = value_set.revision;
        graph.pending.push_back(ChangeEvent::updated(iid, revision));
        Ok(revision)
    }

    /// Attach an override to a usage. The usage is the notified container.
    pub fn add_override(&self, ovr: ParameterOverride) -> Result<Iid> {
        let mut graph = self.graph();
        let (iid, revision, usage_iid) = (ovr.iid, ovr.revision, ovr.container);
        graph.overrides.insert(iid, ovr);
        graph.pending.push_back(ChangeEvent::added(iid, revision));
        let usage = graph
            .usages
            .get_mut(&usage_iid)
            .ok_or(SessionError::UnknownObject(usage_iid))?;
        usage.overrides.push(iid);
        usage.revision += 1;
        let event = ChangeEvent::updated(usage_iid, usage.revision);
        graph.pending.push_back(event);
        Ok(iid)
    }

    pub fn remove_override(&self, iid: Iid) -> Result<()> {
        let mut graph = self.graph();
        let removed = graph
            .overrides
            .remove(&iid)
            .ok_or(SessionError::UnknownObject(iid))?;
        graph
            .pending
            .push_back(ChangeEvent::removed(iid, removed.revision));
        let usage = graph
            .usages
            .get_mut(&removed.container)
            .ok_or(SessionError::UnknownObject(removed.container))?;
        usage.overrides.retain(|ovr| *ovr != iid);
        usage.revision += 1;
        let event = ChangeEvent::updated(removed.container, usage.revision);
        graph.pending.push_back(event);
        Ok(())
    }

    /// Attach a subscription. The subscribed parameter or override is the
    /// notified container.
    pub fn add_subscription(&self, sub: ParameterSubscription) -> Result<Iid> {
        let mut graph = self.graph();
        let (iid, revision, subscribed) = (sub.iid, sub.revision, sub.subscribed);
        graph.subscriptions.insert(iid, sub);
        graph.pending.push_back(ChangeEvent::added(iid, revision));
        Self::touch_subscribed(&mut graph, subscribed)?;
        Ok(iid)
    }

    pub fn remove_subscription(&self, iid: Iid) -> Result<()> {
        let mut graph = self.graph();
        let removed = graph
            .subscriptions
            .remove(&iid)
            .ok_or(SessionError::UnknownObject(iid))?;
        graph
            .pending
            .push_back(ChangeEvent::removed(iid, removed.revision));
        Self::touch_subscribed(&mut graph, removed.subscribed)?;
        Ok(())
    }

    fn touch_subscribed(graph: &mut Graph, subscribed: Iid) -> Result<()> {
        if let Some(parameter) = graph.parameters.get_mut(&subscribed) {
            parameter.revision += 1;
            let event = ChangeEvent::updated(subscribed, parameter.revision);
            graph.pending.push_back(event);
            return Ok(());
        }
        if let Some(ovr) = graph.overrides.get_mut(&subscribed) {
            ovr.revision += 1;
            let event = ChangeEvent::updated(subscribed, ovr.revision);
            graph.pending.push_back(event);
            return Ok(());
        }
        Err(SessionError::UnknownObject(subscribed))
    }

    // ---------------------------------------------------------------------
    // Value-set resolution
    // ---------------------------------------------------------------------

    pub fn subject_value_sets(&self, subject: Subject) -> Result<Vec<Iid>> {
        let graph = self.graph();
        match subject {
            Subject::Parameter(iid) => {
                Ok(get(&graph.parameters, iid)?.value_sets)
            }
            Subject::Override(iid) => Ok(get(&graph.overrides, iid)?.value_sets),
            Subject::Subscription(iid) => Ok(get(&graph.subscriptions, iid)?.value_sets),
        }
    }

    /// Find the record backing one `(option, state)` cell of `subject`,
    /// materializing a placeholder if the domain layer has none yet.
    ///
    /// Lazy materialization is presentation-driven backfill and does not
    /// queue change events.
    pub fn resolve_value_set(
        &self,
        subject: Subject,
        option: Option<Iid>,
        state: Option<Iid>,
        slot_count: usize,
    ) -> Result<Iid> {
        let mut graph = self.graph();
        let existing_lists = match subject {
            Subject::Parameter(iid) => {
                get(&graph.parameters, iid)?.value_sets
            }
            Subject::Override(iid) => get(&graph.overrides, iid)?.value_sets,
            Subject::Subscription(iid) => get(&graph.subscriptions, iid)?.value_sets,
        };
        for iid in &existing_lists {
            if let Some(value_set) = graph.value_sets.get(iid)
                && value_set.option == option
                && value_set.state == state
            {
                return Ok(*iid);
            }
        }
        let placeholder = ValueSet::placeholder(option, state, slot_count);
        let iid = placeholder.iid;
        graph.value_sets.insert(iid, placeholder);
        match subject {
            Subject::Parameter(subject_iid) => {
                let parameter = graph
                    .parameters
                    .get_mut(&subject_iid)
                    .ok_or(SessionError::UnknownObject(subject_iid))?;
                parameter.value_sets.push(iid);
            }
            Subject::Override(subject_iid) => {
                let ovr = graph
                    .overrides
                    .get_mut(&subject_iid)
                    .ok_or(SessionError::UnknownObject(subject_iid))?;
                ovr.value_sets.push(iid);
            }
            Subject::Subscription(subject_iid) => {
                let sub = graph
                    .subscriptions
                    .get_mut(&subject_iid)
                    .ok_or(SessionError::UnknownObject(subject_iid))?;
                sub.value_sets.push(iid);
            }
        }
        Ok(iid)
    }
}

/// Applies accepted write requests straight to the store, bumping the value
/// set's revision and queueing the corrective notification.
#[derive(Debug, Clone)]
pub struct SessionWriter {
    store: SessionStore,
}

impl SessionWriter {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }
}

impl WriteCollaborator for SessionWriter {
    fn submit(&self, request: &WriteRequest) -> std::result::Result<(), WriteError> {
        if let WriteAction::SetValues { values, .. } = &request.action {
            let record = self
                .store
                .value_set(request.value_set)
                .map_err(|_| WriteError::UnknownValueSet(request.value_set))?;
            if let Err(err) = record.check_slot_count(values.len()) {
                warn!(value_set = %request.value_set, error = %err, "refusing value write");
                return Err(WriteError::Rejected {
                    reason: err.to_string(),
                });
            }
        }
        let action = request.action.clone();
        self.store
            .update_value_set(request.value_set, move |value_set| match action {
                WriteAction::SetValues { field, values } => match field {
                    ValueField::Manual => value_set.manual = values,
                    ValueField::Reference => value_set.reference = values,
                },
                WriteAction::SetSwitch(kind) => value_set.value_switch = kind,
            })
            .map(|_| ())
            .map_err(|_| WriteError::UnknownValueSet(request.value_set))
    }
}
