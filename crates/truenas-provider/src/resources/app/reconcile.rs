//! App reconciler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use truenas_api::models::{AppCreateRequest, AppUpdateRequest};
use truenas_api::AppService;
use truenas_core::client::{PollPolicy, MAX_STATE_TIMEOUT, MIN_STATE_TIMEOUT};
use truenas_core::{Error, ErrorCode};

use super::model::{AppModel, DEFAULT_STATE_TIMEOUT};
use super::plan::{modify_app_plan, DEFAULT_DESIRED_STATE};
use super::state::{AppState, DesiredState};
use super::wait::{wait_for_stable, WaitOutcome};
use crate::framework::{
    Attr, Attribute, AttributeType, CaseInsensitiveString, Diagnostics, OperationContext,
    ReadOutcome, Resource, Response, Schema, SemanticEquality, YamlString,
};
use crate::validators::{require, validate_int, validate_str, Validator};

const SUMMARY_CREATE: &str = "Unable to Create App";
const SUMMARY_READ: &str = "Unable to Read App";
const SUMMARY_UPDATE: &str = "Unable to Update App";
const SUMMARY_DELETE: &str = "Unable to Delete App";
const SUMMARY_START: &str = "Unable to Start App";
const SUMMARY_STOP: &str = "Unable to Stop App";
const SUMMARY_RESTART_STOP: &str = "Unable to Stop App for Restart";
const SUMMARY_RESTART_START: &str = "Unable to Start App for Restart";
const SUMMARY_TIMEOUT: &str = "Timeout Waiting for App State";
const SUMMARY_WRONG_STATE: &str = "App Did Not Reach Desired State";
const SUMMARY_DRIFT: &str = "App State Drift Detected";
const SUMMARY_CANCELLED: &str = "Operation Cancelled";

const DESIRED_STATES: &[&str] = &["running", "stopped"];

/// A failed step with the summary the host should see.
struct Failure {
    summary: &'static str,
    error: Error,
}

impl Failure {
    const fn new(summary: &'static str, error: Error) -> Self {
        Self { summary, error }
    }

    /// Wait failures: timeouts get their own summary.
    fn wait(error: Error, fallback: &'static str) -> Self {
        let summary = if error.error_code() == ErrorCode::Etimedout {
            SUMMARY_TIMEOUT
        } else {
            fallback
        };
        Self { summary, error }
    }
}

/// Where a lifecycle step left the app.
enum Step {
    Settled(AppState),
    Cancelled(Option<AppState>),
}

/// `truenas_app` resource.
pub struct AppResource {
    apps: Arc<dyn AppService>,
    poll_policy: PollPolicy,
}

impl AppResource {
    /// Resource backed by `apps`.
    #[must_use]
    pub fn new(apps: Arc<dyn AppService>) -> Self {
        Self {
            apps,
            poll_policy: PollPolicy::new(),
        }
    }

    /// Override the state polling policy.
    #[must_use]
    pub const fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    async fn wait(&self, ctx: &OperationContext, name: &str, timeout: u64) -> Result<Step, Error> {
        let apps = &self.apps;
        let outcome = wait_for_stable(
            ctx,
            name,
            Duration::from_secs(timeout),
            self.poll_policy,
            || {
                let apps = Arc::clone(apps);
                let name = name.to_string();
                async move { Ok(apps.get_app(&name).await?.map(|app| app.state)) }
            },
        )
        .await?;
        Ok(match outcome {
            WaitOutcome::Stable(state) => Step::Settled(state),
            WaitOutcome::Cancelled(last) => Step::Cancelled(last),
        })
    }

    /// Issue start or stop towards `target`, then wait.
    async fn transition(
        &self,
        ctx: &OperationContext,
        name: &str,
        target: DesiredState,
        timeout: u64,
    ) -> Result<Step, Failure> {
        info!(app = name, target = %target, "Moving app towards target state");
        match target {
            DesiredState::Running => self
                .apps
                .start_app(name)
                .await
                .map_err(|e| Failure::new(SUMMARY_START, e))?,
            DesiredState::Stopped => self
                .apps
                .stop_app(name)
                .await
                .map_err(|e| Failure::new(SUMMARY_STOP, e))?,
        }
        self.wait(ctx, name, timeout)
            .await
            .map_err(|e| Failure::wait(e, SUMMARY_READ))
    }

    /// Drive an app from `observed` to `target`; waits out transitional states first.
    async fn converge(
        &self,
        ctx: &OperationContext,
        name: &str,
        observed: AppState,
        target: DesiredState,
        timeout: u64,
    ) -> Result<Step, Failure> {
        let mut current = observed;
        if !current.is_stable() {
            match self
                .wait(ctx, name, timeout)
                .await
                .map_err(|e| Failure::wait(e, SUMMARY_READ))?
            {
                Step::Settled(state) => current = state,
                cancelled @ Step::Cancelled(_) => return Ok(cancelled),
            }
        }
        if target.satisfied_by(&current) {
            return Ok(Step::Settled(current));
        }
        self.transition(ctx, name, target, timeout).await
    }

    async fn restart(&self, ctx: &OperationContext, name: &str, timeout: u64) -> Result<Step, Failure> {
        info!(app = name, "Restart triggers changed, restarting app");
        self.apps
            .stop_app(name)
            .await
            .map_err(|e| Failure::new(SUMMARY_RESTART_STOP, e))?;
        self.apps
            .start_app(name)
            .await
            .map_err(|e| Failure::new(SUMMARY_RESTART_START, e))?;
        self.wait(ctx, name, timeout)
            .await
            .map_err(|e| Failure::wait(e, SUMMARY_RESTART_START))
    }
}

fn target_of(model: &AppModel) -> DesiredState {
    DesiredState::normalize(
        model
            .desired_state
            .get()
            .map_or(DEFAULT_DESIRED_STATE, CaseInsensitiveString::as_str),
    )
}

fn fail(failure: Failure, mut diagnostics: Diagnostics) -> Response<AppModel> {
    diagnostics.add_api_error(failure.summary, &failure.error);
    Response::failed(diagnostics)
}

fn cancelled(mut state: AppModel, last: Option<AppState>, mut diagnostics: Diagnostics) -> Response<AppModel> {
    if let Some(last) = last {
        state.state = Attr::Known(last.as_str().to_string());
    }
    diagnostics.add_warning(
        SUMMARY_CANCELLED,
        format!(
            "Stopped waiting for app '{}'; the recorded state may be stale until the next refresh.",
            state.name_str()
        ),
    );
    Response::with_diagnostics(state, diagnostics)
}

/// True when both sides carry triggers and they differ.
fn triggers_changed(prior: &AppModel, planned: &AppModel) -> bool {
    match (prior.restart_triggers.get(), planned.restart_triggers.get()) {
        (Some(before), Some(after)) => before != after,
        _ => false,
    }
}

fn compose_from_server(
    config: Option<&serde_json::Map<String, serde_json::Value>>,
    prior: &Attr<YamlString>,
) -> Result<Attr<YamlString>, Error> {
    let Some(config) = config.filter(|map| !map.is_empty()) else {
        return Ok(Attr::Null);
    };
    let observed = Attr::Known(YamlString::new(serde_yaml::to_string(config)?));
    if prior.is_known() && observed.semantic_equal(prior) {
        Ok(prior.clone())
    } else {
        Ok(observed)
    }
}

#[async_trait]
impl Resource for AppResource {
    type Model = AppModel;

    fn type_name(&self) -> &'static str {
        "truenas_app"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "Custom application deployed from a compose file.",
            vec![
                Attribute::computed("id", AttributeType::String)
                    .describe("Application identifier (same as the name)."),
                Attribute::required("name", AttributeType::String)
                    .replace()
                    .validator(Validator::NonEmpty)
                    .describe("Application name."),
                Attribute::optional("custom_app", AttributeType::Bool)
                    .with_default(true)
                    .replace(),
                Attribute::optional("compose_config", AttributeType::Yaml)
                    .plan_modifier("preserve_semantic_yaml")
                    .describe("Docker compose YAML."),
                Attribute::optional("desired_state", AttributeType::CaseInsensitive)
                    .with_default(DEFAULT_DESIRED_STATE)
                    .validator(Validator::one_of_ignore_case(DESIRED_STATES))
                    .plan_modifier("preserve_case")
                    .describe("Lifecycle state to keep the app in."),
                Attribute::optional("state_timeout", AttributeType::Int)
                    .with_default(DEFAULT_STATE_TIMEOUT)
                    .validator(Validator::IntRange {
                        min: MIN_STATE_TIMEOUT as i64,
                        max: MAX_STATE_TIMEOUT as i64,
                    })
                    .describe("Seconds to wait for a stable state."),
                Attribute::optional("restart_triggers", AttributeType::Map)
                    .describe("Changing any value restarts a running app."),
                Attribute::computed("state", AttributeType::String)
                    .plan_modifier("predict_state")
                    .describe("Observed lifecycle state."),
            ],
        )
    }

    fn validate_config(&self, config: &AppModel) -> Diagnostics {
        let mut diags = Diagnostics::new();
        require(&mut diags, "name", &config.name);
        validate_str(&mut diags, "name", &config.name, &[Validator::NonEmpty]);
        validate_str(
            &mut diags,
            "desired_state",
            &config.desired_state,
            &[Validator::one_of_ignore_case(DESIRED_STATES)],
        );
        validate_int(
            &mut diags,
            "state_timeout",
            &config.state_timeout,
            &[Validator::IntRange {
                min: MIN_STATE_TIMEOUT as i64,
                max: MAX_STATE_TIMEOUT as i64,
            }],
        );

        if config.custom_app.get_or(true) && config.compose_config.is_null() {
            diags.add_attribute_error(
                "compose_config",
                "Missing Attribute Configuration",
                "compose_config is required when custom_app is true",
            );
        }
        if let Some(compose) = config.compose_config.get() {
            if compose.parse().is_none() {
                diags.add_attribute_error(
                    "compose_config",
                    "Invalid Compose Config",
                    "compose_config must be valid YAML",
                );
            }
        }
        diags
    }

    fn modify_plan(&self, prior: Option<&AppModel>, planned: AppModel) -> AppModel {
        modify_app_plan(prior, planned)
    }

    async fn create(&self, ctx: &OperationContext, planned: AppModel) -> Response<AppModel> {
        let name = planned.name_str().to_string();
        let timeout = planned.timeout_secs();
        let diagnostics = Diagnostics::new();

        let mut request = AppCreateRequest::new(&name, planned.custom_app.get_or(true));
        if let Some(compose) = planned.compose_config.get() {
            request = request.with_compose(compose.as_str());
        }
        let app = match self.apps.create_app(request).await {
            Ok(app) => app,
            Err(err) => return Response::error(SUMMARY_CREATE, &err),
        };
        info!(app = %name, state = %app.state, "Created app");

        // User spellings of desired_state and compose_config are kept as planned.
        let mut state = AppModel {
            id: Attr::Known(name.clone()),
            custom_app: Attr::Known(app.custom_app),
            state: Attr::Known(app.state.clone()),
            ..planned.clone()
        };
        state.desired_state = planned
            .desired_state
            .clone()
            .or_known(CaseInsensitiveString::from(DEFAULT_DESIRED_STATE));
        state.state_timeout = Attr::Known(planned.state_timeout.get_or(DEFAULT_STATE_TIMEOUT));

        let target = target_of(&planned);
        match self
            .converge(ctx, &name, AppState::parse(&app.state), target, timeout)
            .await
        {
            Ok(Step::Settled(final_state)) => {
                state.state = Attr::Known(final_state.as_str().to_string());
                Response::with_diagnostics(state, diagnostics)
            }
            Ok(Step::Cancelled(last)) => cancelled(state, last, diagnostics),
            Err(failure) => fail(failure, diagnostics),
        }
    }

    async fn read(&self, _ctx: &OperationContext, prior: AppModel) -> Response<ReadOutcome<AppModel>> {
        let name = prior
            .name
            .get()
            .or_else(|| prior.id.get())
            .cloned()
            .unwrap_or_default();

        let app = match self.apps.get_app_with_config(&name).await {
            Ok(Some(app)) => app,
            Ok(None) => {
                info!(app = %name, "App no longer exists, removing from state");
                return Response::ok(ReadOutcome::Removed);
            }
            Err(err) => return Response::error(SUMMARY_READ, &err),
        };

        let compose_config = match compose_from_server(app.config.as_ref(), &prior.compose_config) {
            Ok(compose) => compose,
            Err(err) => return Response::error(SUMMARY_READ, &err),
        };

        let desired_state = match prior.desired_state {
            Attr::Known(desired) => Attr::Known(desired),
            _ => Attr::Known(CaseInsensitiveString::from(app.state.as_str())),
        };
        let state_timeout = match prior.state_timeout {
            Attr::Known(timeout) => Attr::Known(timeout),
            _ => Attr::Known(DEFAULT_STATE_TIMEOUT),
        };
        let restart_triggers = match prior.restart_triggers {
            Attr::Known(triggers) => Attr::Known(triggers),
            _ => Attr::Null,
        };

        debug!(app = %name, state = %app.state, "Read app");
        Response::ok(ReadOutcome::Found(AppModel {
            id: Attr::Known(app.name.clone()),
            name: Attr::Known(app.name),
            custom_app: Attr::Known(app.custom_app),
            compose_config,
            desired_state,
            state_timeout,
            restart_triggers,
            state: Attr::Known(app.state),
        }))
    }

    async fn update(
        &self,
        ctx: &OperationContext,
        prior: AppModel,
        planned: AppModel,
    ) -> Response<AppModel> {
        let name = planned.name_str().to_string();
        let timeout = planned.timeout_secs();
        let mut diagnostics = Diagnostics::new();
        let mut state = AppModel {
            id: Attr::Known(name.clone()),
            custom_app: planned.custom_app.clone().or_known(true),
            state_timeout: Attr::Known(planned.state_timeout.get_or(DEFAULT_STATE_TIMEOUT)),
            ..planned.clone()
        };

        // 1. Compose changes. A dropped compose leaves the server's in place.
        if planned.compose_config.is_null() {
            state.compose_config = prior.compose_config.clone();
        } else if !planned.compose_config.semantic_equal(&prior.compose_config) {
            let request = AppUpdateRequest {
                custom_compose_config_string: planned
                    .compose_config
                    .get()
                    .map(|compose| compose.as_str().to_string()),
            };
            if let Err(err) = self.apps.update_app(&name, request).await {
                return Response::error(SUMMARY_UPDATE, &err);
            }
            info!(app = %name, "Updated app compose config");
        }

        // 2. Current state, settled.
        let mut current = match self.apps.get_app(&name).await {
            Ok(Some(app)) => AppState::parse(&app.state),
            Ok(None) => {
                let err = Error::NotFound(format!("app '{name}' not found"));
                return Response::error(SUMMARY_READ, &err);
            }
            Err(err) => return Response::error(SUMMARY_READ, &err),
        };
        state.state = Attr::Known(current.as_str().to_string());
        if !current.is_stable() {
            match self.wait(ctx, &name, timeout).await {
                Ok(Step::Settled(settled)) => current = settled,
                Ok(Step::Cancelled(last)) => return cancelled(state, last, diagnostics),
                Err(err) => return fail(Failure::wait(err, SUMMARY_READ), diagnostics),
            }
        }

        // 3. Restart protocol.
        if triggers_changed(&prior, &planned) && current == AppState::Running {
            match self.restart(ctx, &name, timeout).await {
                Ok(Step::Settled(settled)) => current = settled,
                Ok(Step::Cancelled(last)) => return cancelled(state, last, diagnostics),
                Err(failure) => return fail(failure, diagnostics),
            }
        }

        // 4. Desired state.
        let target = target_of(&planned);
        if !target.satisfied_by(&current) {
            if target_of(&prior) == target {
                warn!(app = %name, observed = %current, desired = %target, "App state drifted");
                diagnostics.add_warning(
                    SUMMARY_DRIFT,
                    format!(
                        "App '{name}' was found in state {current} but desired_state is {target}. \
                         It was changed outside of this configuration and will be moved back to {target}. \
                         To keep the current state, set desired_state = \"{}\".",
                        current.as_str().to_lowercase()
                    ),
                );
            }
            match self.transition(ctx, &name, target, timeout).await {
                Ok(Step::Settled(settled)) => current = settled,
                Ok(Step::Cancelled(last)) => return cancelled(state, last, diagnostics),
                Err(failure) => return fail(failure, diagnostics),
            }
            if !target.satisfied_by(&current) {
                diagnostics.add_error(
                    SUMMARY_WRONG_STATE,
                    format!("App '{name}' reached state {current} instead of desired {target}."),
                );
                state.state = Attr::Known(current.as_str().to_string());
                return Response::with_diagnostics(state, diagnostics);
            }
        }

        state.state = Attr::Known(current.as_str().to_string());
        Response::with_diagnostics(state, diagnostics)
    }

    async fn delete(&self, _ctx: &OperationContext, prior: AppModel) -> Response<()> {
        let name = prior.name_str();
        match self.apps.delete_app(name).await {
            Ok(()) => {
                info!(app = %name, "Deleted app");
                Response::ok(())
            }
            Err(err) if err.is_not_found() => {
                debug!(app = %name, "App already absent");
                Response::ok(())
            }
            Err(err) => Response::error(SUMMARY_DELETE, &err),
        }
    }

    async fn import(&self, _ctx: &OperationContext, id: &str) -> Response<AppModel> {
        Response::ok(AppModel {
            id: Attr::Known(id.to_string()),
            ..AppModel::named(id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::collections::BTreeMap;
    use truenas_api::models::App;
    use truenas_api::MockAppService;

    fn app(name: &str, state: &str) -> App {
        App {
            name: name.to_string(),
            id: Some(name.to_string()),
            state: state.to_string(),
            custom_app: true,
            version: None,
            upgrade_available: false,
            config: None,
        }
    }

    fn running_model() -> AppModel {
        AppModel {
            id: Attr::Known("web".into()),
            name: Attr::Known("web".into()),
            custom_app: Attr::Known(true),
            compose_config: Attr::Known(YamlString::from("services: {}\n")),
            desired_state: Attr::Known(CaseInsensitiveString::from("running")),
            state_timeout: Attr::Known(120),
            restart_triggers: Attr::Null,
            state: Attr::Known("RUNNING".into()),
        }
    }

    fn resource(mock: MockAppService) -> AppResource {
        AppResource::new(Arc::new(mock))
    }

    #[test]
    fn validate_config_reports_bad_values() {
        let resource = resource(MockAppService::new());
        let mut config = running_model();
        config.desired_state = Attr::Known(CaseInsensitiveString::from("paused"));
        config.state_timeout = Attr::Known(5);
        config.compose_config = Attr::Known(YamlString::from("services: [unclosed"));

        let diags = resource.validate_config(&config);
        let attrs: Vec<_> = diags.errors().filter_map(|d| d.attribute.clone()).collect();
        assert_eq!(attrs, vec!["desired_state", "state_timeout", "compose_config"]);
    }

    #[test]
    fn validate_config_requires_compose_for_custom_apps() {
        let resource = resource(MockAppService::new());
        let mut config = running_model();
        config.compose_config = Attr::Null;
        assert!(resource.validate_config(&config).has_error());
        config.custom_app = Attr::Known(false);
        assert!(!resource.validate_config(&config).has_error());
    }

    #[tokio::test]
    async fn read_missing_app_is_removed() {
        let mut mock = MockAppService::new();
        mock.expect_get_app_with_config()
            .with(eq("web"))
            .returning(|_| Ok(None));
        let response = resource(mock)
            .read(&OperationContext::background(), running_model())
            .await;
        assert!(!response.has_error());
        assert_eq!(response.state, Some(ReadOutcome::Removed));
    }

    #[tokio::test]
    async fn read_keeps_user_spelling_of_compose() {
        let mut mock = MockAppService::new();
        mock.expect_get_app_with_config().returning(|_| {
            let mut app = app("web", "RUNNING");
            app.config = serde_json::from_value(serde_json::json!({
                "services": {"web": {"image": "nginx"}}
            }))
            .ok();
            Ok(Some(app))
        });

        let mut prior = running_model();
        prior.compose_config = Attr::Known(YamlString::from("services: {web: {image: nginx}}"));
        let response = resource(mock)
            .read(&OperationContext::background(), prior.clone())
            .await;
        let state = response.state.and_then(ReadOutcome::found).unwrap();
        assert_eq!(state.compose_config, prior.compose_config);
    }

    #[tokio::test]
    async fn read_after_import_fills_defaults() {
        let mut mock = MockAppService::new();
        mock.expect_get_app_with_config().returning(|_| {
            let mut app = app("web", "STOPPED");
            app.config = Some(serde_json::Map::new());
            Ok(Some(app))
        });
        let resource = resource(mock);
        let ctx = OperationContext::background();

        let imported = resource.import(&ctx, "web").await.state.unwrap();
        let state = resource.read(&ctx, imported).await.state.and_then(ReadOutcome::found).unwrap();
        assert_eq!(state.desired_state, Attr::Known(CaseInsensitiveString::from("STOPPED")));
        assert_eq!(state.state_timeout, Attr::Known(120));
        assert_eq!(state.restart_triggers, Attr::Null);
        assert_eq!(state.compose_config, Attr::Null);
        assert_eq!(state.id, Attr::Known("web".into()));
    }

    #[tokio::test]
    async fn create_failure_has_fixed_summary() {
        let mut mock = MockAppService::new();
        mock.expect_create_app()
            .returning(|_| Err(truenas_core::ApiError::parse("[EEXIST] app_create.app_name: exists").into()));
        let response = resource(mock)
            .create(&OperationContext::background(), running_model())
            .await;
        let diag = response.diagnostics.errors().next().unwrap();
        assert_eq!(diag.summary, "Unable to Create App");
        assert!(diag.detail.starts_with("[EEXIST] app_create.app_name: exists"));
    }

    #[tokio::test]
    async fn update_crashed_with_stopped_desired_is_quiet() {
        let mut mock = MockAppService::new();
        mock.expect_get_app()
            .times(1)
            .returning(|_| Ok(Some(app("web", "CRASHED"))));
        mock.expect_start_app().never();
        mock.expect_stop_app().never();
        mock.expect_update_app().never();

        let mut prior = running_model();
        prior.desired_state = Attr::Known(CaseInsensitiveString::from("stopped"));
        prior.state = Attr::Known("CRASHED".into());
        let planned = prior.clone();

        let response = resource(mock)
            .update(&OperationContext::background(), prior, planned)
            .await;
        assert!(response.diagnostics.is_empty());
        assert_eq!(response.state.unwrap().state, Attr::Known("CRASHED".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn update_restart_start_failure() {
        let mut mock = MockAppService::new();
        let mut seq = Sequence::new();
        mock.expect_get_app()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(app("web", "RUNNING"))));
        mock.expect_stop_app()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_start_app()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(truenas_core::ApiError::parse("[EFAULT] failed to start").into()));

        let mut prior = running_model();
        prior.restart_triggers = Attr::Known(BTreeMap::from([("config".to_string(), "v1".to_string())]));
        let mut planned = prior.clone();
        planned.restart_triggers = Attr::Known(BTreeMap::from([("config".to_string(), "v2".to_string())]));

        let response = resource(mock)
            .update(&OperationContext::background(), prior, planned)
            .await;
        assert!(response.has_error());
        assert_eq!(
            response.diagnostics.errors().next().unwrap().summary,
            "Unable to Start App for Restart"
        );
    }

    #[tokio::test]
    async fn triggers_introduced_from_null_do_not_restart() {
        let mut mock = MockAppService::new();
        mock.expect_get_app()
            .returning(|_| Ok(Some(app("web", "RUNNING"))));
        mock.expect_stop_app().never();
        mock.expect_start_app().never();

        let prior = running_model();
        let mut planned = prior.clone();
        planned.restart_triggers = Attr::Known(BTreeMap::from([("a".to_string(), "1".to_string())]));

        let response = resource(mock)
            .update(&OperationContext::background(), prior, planned.clone())
            .await;
        assert!(!response.has_error());
        assert_eq!(response.state.unwrap().restart_triggers, planned.restart_triggers);
    }

    #[tokio::test]
    async fn update_skips_reformatted_compose() {
        let mut mock = MockAppService::new();
        mock.expect_update_app().never();
        mock.expect_get_app()
            .returning(|_| Ok(Some(app("web", "RUNNING"))));

        let prior = running_model();
        let mut planned = prior.clone();
        planned.compose_config = Attr::Known(YamlString::from("services: {}"));

        let response = resource(mock)
            .update(&OperationContext::background(), prior, planned.clone())
            .await;
        assert!(response.diagnostics.is_empty());
        assert_eq!(response.state.unwrap().compose_config, planned.compose_config);
    }

    #[tokio::test]
    async fn update_sends_changed_compose() {
        const NEXT: &str = "services:\n  web:\n    image: nginx\n";
        let mut mock = MockAppService::new();
        let mut seq = Sequence::new();
        mock.expect_update_app()
            .withf(|name, request| {
                name == "web" && request.custom_compose_config_string.as_deref() == Some(NEXT)
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(app("web", "RUNNING")));
        mock.expect_get_app()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(app("web", "RUNNING"))));

        let prior = running_model();
        let mut planned = prior.clone();
        planned.compose_config = Attr::Known(YamlString::from(NEXT));

        let response = resource(mock)
            .update(&OperationContext::background(), prior, planned)
            .await;
        assert!(!response.has_error());
        assert_eq!(
            response.state.unwrap().compose_config,
            Attr::Known(YamlString::from(NEXT))
        );
    }

    #[tokio::test]
    async fn update_keeps_compose_dropped_from_config() {
        let mut mock = MockAppService::new();
        mock.expect_update_app().never();
        mock.expect_get_app()
            .returning(|_| Ok(Some(app("web", "RUNNING"))));

        let prior = running_model();
        let mut planned = prior.clone();
        planned.compose_config = Attr::Null;

        let response = resource(mock)
            .update(&OperationContext::background(), prior.clone(), planned)
            .await;
        assert!(!response.has_error());
        assert_eq!(response.state.unwrap().compose_config, prior.compose_config);
    }

    #[tokio::test(start_paused = true)]
    async fn update_reports_wrong_final_state() {
        let mut mock = MockAppService::new();
        mock.expect_get_app()
            .returning(|_| Ok(Some(app("web", "STOPPED"))));
        mock.expect_start_app()
            .with(eq("web"))
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_stop_app().never();

        let prior = running_model();
        let planned = prior.clone();

        let response = resource(mock)
            .update(&OperationContext::background(), prior, planned)
            .await;
        assert!(response.has_error());
        let error = response.diagnostics.errors().next().unwrap();
        assert_eq!(error.summary, "App Did Not Reach Desired State");
        assert!(error.detail.contains("STOPPED"));
        assert_eq!(response.state.unwrap().state, Attr::Known("STOPPED".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn update_times_out_on_stuck_app() {
        let mut mock = MockAppService::new();
        mock.expect_get_app()
            .returning(|_| Ok(Some(app("web", "DEPLOYING"))));
        mock.expect_start_app().never();
        mock.expect_stop_app().never();

        let mut prior = running_model();
        prior.state_timeout = Attr::Known(30);
        let planned = prior.clone();

        let response = resource(mock)
            .update(&OperationContext::background(), prior, planned)
            .await;
        assert!(response.has_error());
        let error = response.diagnostics.errors().next().unwrap();
        assert_eq!(error.summary, "Timeout Waiting for App State");
        assert!(error.detail.contains("'web'"));
        assert!(error.detail.contains("DEPLOYING"));
    }

    #[tokio::test]
    async fn delete_tolerates_missing_app() {
        let mut mock = MockAppService::new();
        mock.expect_delete_app()
            .with(eq("web"))
            .returning(|_| Err(truenas_core::ApiError::parse("[ENOENT] app not found").into()));
        let response = resource(mock)
            .delete(&OperationContext::background(), running_model())
            .await;
        assert!(!response.has_error());
    }
}
