//! Pure plan rewrites for apps.
//!
//! Nothing here performs I/O. Values that cannot be predicted from the
//! inputs become `Unknown`.

use super::model::{AppModel, DEFAULT_STATE_TIMEOUT};
use super::state::{AppState, DesiredState};
use crate::framework::{Attr, CaseInsensitiveString, SemanticEquality, YamlString};

/// Default `desired_state` when the config leaves it out.
pub const DEFAULT_DESIRED_STATE: &str = "RUNNING";

/// Predicts the post-apply `state`.
///
/// - no prior state: unset (the resource is being created or destroyed)
/// - desired state changed: unknown
/// - observed state differs from the target: the target, except that a
///   crashed app stays `CRASHED` when stopped is desired
/// - otherwise: unchanged
#[must_use]
pub fn predict_state(
    prior_state: &Attr<String>,
    prior_desired: &Attr<CaseInsensitiveString>,
    planned_desired: &Attr<CaseInsensitiveString>,
) -> Attr<String> {
    let Some(prior) = prior_state.get() else {
        return Attr::Null;
    };
    let Some(planned) = planned_desired.get() else {
        return Attr::Unknown;
    };
    let target = DesiredState::normalize(planned.as_str());
    let prior_target = prior_desired
        .get()
        .map(|desired| DesiredState::normalize(desired.as_str()));

    if prior_target != Some(target) {
        return Attr::Unknown;
    }
    let observed = AppState::parse(prior);
    if observed.as_str() != target.as_str() {
        if target.satisfied_by(&observed) {
            return Attr::Known(prior.clone());
        }
        return Attr::Known(target.as_str().to_string());
    }
    Attr::Known(prior.clone())
}

/// Keeps the prior spelling of `desired_state` when it only differs in case.
#[must_use]
pub fn preserve_desired_case(
    prior: &Attr<CaseInsensitiveString>,
    planned: Attr<CaseInsensitiveString>,
) -> Attr<CaseInsensitiveString> {
    if prior.is_known() && planned.semantic_equal(prior) {
        prior.clone()
    } else {
        planned
    }
}

/// Keeps the prior compose text when it parses to the same tree, or when
/// the config drops it. The server has no way to remove a compose file.
#[must_use]
pub fn preserve_compose(
    prior: &Attr<YamlString>,
    planned: Attr<YamlString>,
) -> Attr<YamlString> {
    if prior.is_known() && (planned.is_null() || planned.semantic_equal(prior)) {
        prior.clone()
    } else {
        planned
    }
}

/// Applies defaults and all app plan modifiers.
#[must_use]
pub fn modify_app_plan(prior: Option<&AppModel>, planned: AppModel) -> AppModel {
    let mut planned = planned;
    planned.desired_state = planned
        .desired_state
        .or_default_if_null(CaseInsensitiveString::from(DEFAULT_DESIRED_STATE));
    planned.state_timeout = planned
        .state_timeout
        .or_default_if_null(DEFAULT_STATE_TIMEOUT);
    planned.custom_app = planned.custom_app.or_default_if_null(true);

    let Some(prior) = prior else {
        planned.id = Attr::Unknown;
        planned.state = Attr::Unknown;
        return planned;
    };

    planned.id = prior.id.clone();
    planned.desired_state = preserve_desired_case(&prior.desired_state, planned.desired_state);
    planned.compose_config = preserve_compose(&prior.compose_config, planned.compose_config);
    planned.state = predict_state(&prior.state, &prior.desired_state, &planned.desired_state);
    planned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desired(value: &str) -> Attr<CaseInsensitiveString> {
        Attr::Known(CaseInsensitiveString::from(value))
    }

    fn state(value: &str) -> Attr<String> {
        Attr::Known(value.to_string())
    }

    #[test]
    fn predict_without_prior_is_unset() {
        assert_eq!(predict_state(&Attr::Null, &Attr::Null, &desired("running")), Attr::Null);
    }

    #[test]
    fn predict_desired_change_is_unknown() {
        assert_eq!(
            predict_state(&state("RUNNING"), &desired("running"), &desired("stopped")),
            Attr::Unknown
        );
    }

    #[test]
    fn predict_case_change_is_not_a_change() {
        assert_eq!(
            predict_state(&state("RUNNING"), &desired("running"), &desired("RUNNING")),
            state("RUNNING")
        );
    }

    #[test]
    fn predict_drift_is_corrected() {
        assert_eq!(
            predict_state(&state("STOPPED"), &desired("running"), &desired("running")),
            state("RUNNING")
        );
        assert_eq!(
            predict_state(&state("DEPLOYING"), &desired("running"), &desired("running")),
            state("RUNNING")
        );
    }

    #[test]
    fn predict_crashed_as_stopped() {
        assert_eq!(
            predict_state(&state("CRASHED"), &desired("stopped"), &desired("stopped")),
            state("CRASHED")
        );
        assert_eq!(
            predict_state(&state("CRASHED"), &desired("running"), &desired("running")),
            state("RUNNING")
        );
    }

    #[test]
    fn case_preservation() {
        assert_eq!(preserve_desired_case(&desired("running"), desired("RUNNING")), desired("running"));
        assert_eq!(preserve_desired_case(&desired("running"), desired("stopped")), desired("stopped"));
        assert_eq!(preserve_desired_case(&Attr::Null, desired("Stopped")), desired("Stopped"));
    }

    #[test]
    fn compose_semantic_preservation() {
        let prior = Attr::Known(YamlString::from("services:\n  web:\n    image: nginx\n"));
        let same = Attr::Known(YamlString::from("services: {web: {image: nginx}}"));
        let other = Attr::Known(YamlString::from("services: {web: {image: caddy}}"));
        assert_eq!(preserve_compose(&prior, same), prior);
        assert_eq!(preserve_compose(&prior, other.clone()), other);
        assert_eq!(preserve_compose(&prior, Attr::Null), prior);
        assert_eq!(preserve_compose(&Attr::Null, Attr::Null), Attr::Null);
    }

    #[test]
    fn modify_plan_on_create_applies_defaults() {
        let planned = modify_app_plan(None, AppModel::named("web"));
        assert_eq!(planned.desired_state, desired("RUNNING"));
        assert_eq!(planned.state_timeout, Attr::Known(120));
        assert_eq!(planned.state, Attr::Unknown);
        assert_eq!(planned.id, Attr::Unknown);
    }

    #[test]
    fn modify_plan_without_changes_is_stable() {
        let prior = AppModel {
            id: state("web"),
            name: state("web"),
            custom_app: Attr::Known(true),
            compose_config: Attr::Known(YamlString::from("services: {}\n")),
            desired_state: desired("stopped"),
            state_timeout: Attr::Known(120),
            restart_triggers: Attr::Null,
            state: state("STOPPED"),
        };
        let planned = AppModel {
            desired_state: desired("Stopped"),
            compose_config: Attr::Known(YamlString::from("services: {}")),
            id: Attr::Unknown,
            state: Attr::Unknown,
            ..prior.clone()
        };
        assert_eq!(modify_app_plan(Some(&prior), planned), prior);
    }
}
