pub mod array;
pub mod domain;
pub mod error;
pub mod ids;
pub mod parameter;

pub use array::{ArrayDimension, ComponentCoordinate, CoordinateMapper, reconcile_components};
pub use domain::{
    ActualFiniteState, ActualFiniteStateList, ActualStateKind, DesignOption, DomainOfExpertise,
    ElementDefinition, ElementUsage, Iteration,
};
pub use error::{ModelError, Result};
pub use ids::{Iid, RevisionNumber, fresh_iid};
pub use parameter::{
    Parameter, ParameterOverride, ParameterSubscription, ParameterSwitchKind, ParameterType,
    ParameterTypeComponent, Subject, ValueSet,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_set_actual_follows_switch() {
        let mut value_set = ValueSet::placeholder(None, None, 2);
        value_set.manual = vec!["1".into(), "2".into()];
        value_set.computed = vec!["10".into(), "20".into()];
        assert_eq!(value_set.actual(), &["1", "2"]);
        value_set.value_switch = ParameterSwitchKind::Computed;
        assert_eq!(value_set.actual(), &["10", "20"]);
    }

    #[test]
    fn subject_serializes() {
        let subject = Subject::Override(Iid::new(7));
        let json = serde_json::to_string(&subject).expect("serialize subject");
        let round: Subject = serde_json::from_str(&json).expect("deserialize subject");
        assert_eq!(round, subject);
    }
}
