//! Applications.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;
use truenas_core::types::ApiFamily;
use truenas_core::Error;

use crate::client::TrueNasClient;
use crate::models::{App, AppCreateRequest, AppUpdateRequest, QueryFilter};
use crate::Result;

/// Application namespace. Mutating calls are jobs and block until terminal.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait AppService: Send + Sync {
    /// Deploy an app and return its first observed record.
    async fn create_app(&self, request: AppCreateRequest) -> Result<App>;

    /// Look up an app by name.
    async fn get_app(&self, name: &str) -> Result<Option<App>>;

    /// Look up an app by name including its compose map.
    async fn get_app_with_config(&self, name: &str) -> Result<Option<App>>;

    /// Replace an app's compose file.
    async fn update_app(&self, name: &str, request: AppUpdateRequest) -> Result<App>;

    /// Start an app.
    async fn start_app(&self, name: &str) -> Result<()>;

    /// Stop an app.
    async fn stop_app(&self, name: &str) -> Result<()>;

    /// Remove an app.
    async fn delete_app(&self, name: &str) -> Result<()>;
}

impl TrueNasClient {
    /// Decode a job result as an app, falling back to a fresh query when the
    /// job returned something else.
    async fn app_after_job(&self, name: &str, result: Value) -> Result<App> {
        if let Ok(app) = serde_json::from_value::<App>(result) {
            return Ok(app);
        }
        self.get_app(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("App '{name}' not found after job")))
    }
}

#[async_trait]
impl AppService for TrueNasClient {
    async fn create_app(&self, request: AppCreateRequest) -> Result<App> {
        let method = self.method(ApiFamily::App, "create").await?;
        let name = request.app_name.clone();
        info!(app = %name, "Creating TrueNAS app");
        let result: Value = self.call_job(&method, vec![json!(request)]).await?;
        self.app_after_job(&name, result).await
    }

    async fn get_app(&self, name: &str) -> Result<Option<App>> {
        let method = self.method(ApiFamily::App, "query").await?;
        self.query_one(&method, QueryFilter::new().eq("name", name))
            .await
    }

    async fn get_app_with_config(&self, name: &str) -> Result<Option<App>> {
        let method = self.method(ApiFamily::App, "query").await?;
        self.query_one(
            &method,
            QueryFilter::new()
                .eq("name", name)
                .extra("retrieve_config", true),
        )
        .await
    }

    async fn update_app(&self, name: &str, request: AppUpdateRequest) -> Result<App> {
        let method = self.method(ApiFamily::App, "update").await?;
        info!(app = %name, "Updating TrueNAS app");
        let result: Value = self
            .call_job(&method, vec![json!(name), json!(request)])
            .await?;
        self.app_after_job(name, result).await
    }

    async fn start_app(&self, name: &str) -> Result<()> {
        let method = self.method(ApiFamily::App, "start").await?;
        info!(app = %name, "Starting TrueNAS app");
        self.call_job::<Value>(&method, vec![json!(name)]).await?;
        Ok(())
    }

    async fn stop_app(&self, name: &str) -> Result<()> {
        let method = self.method(ApiFamily::App, "stop").await?;
        info!(app = %name, "Stopping TrueNAS app");
        self.call_job::<Value>(&method, vec![json!(name)]).await?;
        Ok(())
    }

    async fn delete_app(&self, name: &str) -> Result<()> {
        let method = self.method(ApiFamily::App, "delete").await?;
        info!(app = %name, "Deleting TrueNAS app");
        self.call_job::<Value>(
            &method,
            vec![json!(name), json!({"remove_images": false, "remove_ix_volumes": false})],
        )
        .await?;
        Ok(())
    }
}
