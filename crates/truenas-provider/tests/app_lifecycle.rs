//! App lifecycle through the real client over a scripted transport.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use truenas_api::{MockTransport, TrueNasClient};
use truenas_provider::framework::{
    Attr, CaseInsensitiveString, OperationContext, ReadOutcome, Resource, YamlString,
};
use truenas_provider::resources::app::{AppModel, AppResource};
use truenas_provider::TrueNasProvider;

/// In-memory stand-in for the middleware's app namespace.
#[derive(Default)]
struct FakeServer {
    apps: HashMap<String, Value>,
    /// State an app settles in after its next query
    settling: HashMap<String, String>,
    jobs: HashMap<i64, Value>,
    next_job: i64,
    calls: Vec<String>,
}

impl FakeServer {
    fn job(&mut self, result: Value) -> Value {
        self.next_job += 1;
        self.jobs.insert(self.next_job, result);
        json!(self.next_job)
    }

    fn transition(&mut self, name: &str, via: &str, to: &str) -> Value {
        if let Some(app) = self.apps.get_mut(name) {
            app["state"] = json!(via);
            self.settling.insert(name.to_string(), to.to_string());
        }
        self.job(Value::Null)
    }

    fn handle(&mut self, method: &str, params: &[Value]) -> Value {
        self.calls.push(method.to_string());
        match method {
            "app.create" => {
                let name = params[0]["app_name"].as_str().unwrap().to_string();
                let app = json!({"name": name, "state": "DEPLOYING", "custom_app": true});
                self.apps.insert(name.clone(), app.clone());
                self.settling.insert(name, "RUNNING".to_string());
                self.job(app)
            }
            "app.query" => {
                let name = params[0][0][2].as_str().unwrap();
                let rows: Vec<Value> = self.apps.get(name).cloned().into_iter().collect();
                if let Some(next) = self.settling.remove(name) {
                    self.apps.get_mut(name).unwrap()["state"] = json!(next);
                }
                json!(rows)
            }
            "app.update" => {
                let name = params[0].as_str().unwrap();
                let app = self.apps.get(name).cloned().unwrap_or(Value::Null);
                self.job(app)
            }
            "app.start" => {
                let name = params[0].as_str().unwrap().to_string();
                self.transition(&name, "DEPLOYING", "RUNNING")
            }
            "app.stop" => {
                let name = params[0].as_str().unwrap().to_string();
                self.transition(&name, "STOPPING", "STOPPED")
            }
            "app.delete" => {
                let name = params[0].as_str().unwrap();
                self.apps.remove(name);
                self.job(Value::Null)
            }
            "core.get_jobs" => {
                let id = params[0][0][2].as_i64().unwrap();
                let result = self.jobs.get(&id).cloned().unwrap_or(Value::Null);
                json!([{"id": id, "method": "job", "state": "SUCCESS", "result": result}])
            }
            other => panic!("unexpected call to {other}"),
        }
    }

    /// Calls made since the last drain, without job polling.
    fn drain_calls(&mut self) -> Vec<String> {
        std::mem::take(&mut self.calls)
            .into_iter()
            .filter(|call| call != "core.get_jobs")
            .collect()
    }
}

fn setup() -> (AppResource, Arc<Mutex<FakeServer>>) {
    let server = Arc::new(Mutex::new(FakeServer::default()));
    let mut transport = MockTransport::new();
    let handle = Arc::clone(&server);
    transport.expect_call().returning(move |method, params| {
        Ok(handle.lock().unwrap().handle(method, &params))
    });
    let client = TrueNasClient::with_transport(Arc::new(transport));
    let provider = TrueNasProvider::from_client(Arc::new(client));
    (provider.app_resource(), server)
}

fn config(desired: &str) -> AppModel {
    AppModel {
        compose_config: Attr::Known(YamlString::from(
            "services:\n  web:\n    image: nginx:1.27\n",
        )),
        desired_state: Attr::Known(CaseInsensitiveString::from(desired)),
        ..AppModel::named("web")
    }
}

#[tokio::test(start_paused = true)]
async fn test_create_stopped_app() {
    let (apps, server) = setup();
    let ctx = OperationContext::background();

    let planned = apps.modify_plan(None, config("stopped"));
    assert!(!apps.validate_config(&planned).has_error());
    let response = apps.create(&ctx, planned).await;

    assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
    let state = response.state.unwrap();
    assert_eq!(state.state, Attr::Known("STOPPED".into()));
    assert_eq!(
        state.desired_state,
        Attr::Known(CaseInsensitiveString::from("stopped"))
    );
    assert_eq!(state.id, Attr::Known("web".into()));

    let calls = server.lock().unwrap().drain_calls();
    assert_eq!(calls.first().map(String::as_str), Some("app.create"));
    assert!(calls.iter().any(|call| call == "app.stop"));
    assert!(!calls.iter().any(|call| call == "app.start"));
}

#[tokio::test(start_paused = true)]
async fn test_restart_triggers_bounce_running_app() {
    let (apps, server) = setup();
    let ctx = OperationContext::background();

    let mut initial = config("running");
    initial.restart_triggers = Attr::Known(BTreeMap::from([("rev".to_string(), "1".to_string())]));
    let prior = apps
        .create(&ctx, apps.modify_plan(None, initial))
        .await
        .state
        .unwrap();
    assert_eq!(prior.state, Attr::Known("RUNNING".into()));
    server.lock().unwrap().drain_calls();

    let mut next = prior.clone();
    next.restart_triggers = Attr::Known(BTreeMap::from([("rev".to_string(), "2".to_string())]));
    let planned = apps.modify_plan(Some(&prior), next);
    let response = apps.update(&ctx, prior, planned).await;

    assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
    assert_eq!(response.state.unwrap().state, Attr::Known("RUNNING".into()));
    let calls = server.lock().unwrap().drain_calls();
    assert_eq!(calls[0], "app.query");
    assert_eq!(&calls[1..3], ["app.stop", "app.start"]);
    assert!(calls[3..].iter().all(|call| call == "app.query"));
}

#[tokio::test(start_paused = true)]
async fn test_drift_is_corrected_with_warning() {
    let (apps, server) = setup();
    let ctx = OperationContext::background();

    let prior = apps
        .create(&ctx, apps.modify_plan(None, config("RUNNING")))
        .await
        .state
        .unwrap();
    {
        let mut server = server.lock().unwrap();
        server.apps.get_mut("web").unwrap()["state"] = json!("STOPPED");
        server.drain_calls();
    }

    let planned = apps.modify_plan(Some(&prior), prior.clone());
    let response = apps.update(&ctx, prior, planned).await;

    assert!(!response.has_error());
    let warning = response.diagnostics.warnings().next().unwrap();
    assert_eq!(warning.summary, "App State Drift Detected");
    assert!(warning.detail.contains("'web'"));
    assert!(warning.detail.contains("STOPPED"));
    let state = response.state.unwrap();
    assert_eq!(state.state, Attr::Known("RUNNING".into()));
    assert_eq!(
        state.desired_state,
        Attr::Known(CaseInsensitiveString::from("RUNNING"))
    );
    assert!(server.lock().unwrap().drain_calls().contains(&"app.start".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_read_after_out_of_band_delete() {
    let (apps, server) = setup();
    let ctx = OperationContext::background();

    let prior = apps
        .create(&ctx, apps.modify_plan(None, config("running")))
        .await
        .state
        .unwrap();
    server.lock().unwrap().apps.clear();

    let response = apps.read(&ctx, prior).await;
    assert!(!response.has_error());
    assert_eq!(response.state, Some(ReadOutcome::Removed));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_wait_keeps_last_state() {
    let (apps, server) = setup();
    let (ctx, cancel) = OperationContext::new();
    cancel.cancel();

    let response = apps.create(&ctx, apps.modify_plan(None, config("running"))).await;
    assert!(!response.has_error());
    let warning = response.diagnostics.warnings().next().unwrap();
    assert_eq!(warning.summary, "Operation Cancelled");
    assert_eq!(
        response.state.unwrap().state,
        Attr::Known("DEPLOYING".into())
    );
    assert_eq!(server.lock().unwrap().drain_calls(), vec!["app.create"]);
}
