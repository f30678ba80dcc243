//! The contract between a resource and the host runtime.

use async_trait::async_trait;
use truenas_core::Error;

use super::context::OperationContext;
use super::diag::Diagnostics;
use super::schema::Schema;

/// Result of an operation: new state (if any) plus diagnostics.
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// State to record. `None` leaves the host's state untouched.
    pub state: Option<T>,
    /// Errors and warnings
    pub diagnostics: Diagnostics,
}

impl<T> Response<T> {
    /// Successful response.
    pub fn ok(state: T) -> Self {
        Self {
            state: Some(state),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Response with state and accumulated diagnostics. Carries errors too
    /// when an operation failed after reaching a recordable state.
    pub const fn with_diagnostics(state: T, diagnostics: Diagnostics) -> Self {
        Self {
            state: Some(state),
            diagnostics,
        }
    }

    /// Failed response.
    pub const fn failed(diagnostics: Diagnostics) -> Self {
        Self {
            state: None,
            diagnostics,
        }
    }

    /// Failed response from a single error.
    pub fn error(summary: &str, error: &Error) -> Self {
        let mut diagnostics = Diagnostics::new();
        diagnostics.add_api_error(summary, error);
        Self::failed(diagnostics)
    }

    /// True when any diagnostic is an error.
    pub fn has_error(&self) -> bool {
        self.diagnostics.has_error()
    }
}

/// Outcome of a read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome<T> {
    /// The object exists; record this state
    Found(T),
    /// The object is gone; drop it from state
    Removed,
}

impl<T> ReadOutcome<T> {
    /// The found state, if any.
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(state) => Some(state),
            Self::Removed => None,
        }
    }
}

/// A managed resource type.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Resource model shared by config, plan and state.
    type Model: Clone + Send + Sync + 'static;

    /// Host-visible type name, e.g. `truenas_app`.
    fn type_name(&self) -> &'static str;

    /// Schema description.
    fn schema(&self) -> Schema;

    /// Pure configuration checks, run before any side effect.
    fn validate_config(&self, config: &Self::Model) -> Diagnostics;

    /// Pure plan rewrite. `prior` is `None` on create.
    fn modify_plan(&self, prior: Option<&Self::Model>, planned: Self::Model) -> Self::Model {
        let _ = prior;
        planned
    }

    /// Create the object described by `planned`.
    async fn create(&self, ctx: &OperationContext, planned: Self::Model) -> Response<Self::Model>;

    /// Refresh `prior` from the server.
    async fn read(&self, ctx: &OperationContext, prior: Self::Model)
        -> Response<ReadOutcome<Self::Model>>;

    /// Move the object from `prior` to `planned`.
    async fn update(
        &self,
        ctx: &OperationContext,
        prior: Self::Model,
        planned: Self::Model,
    ) -> Response<Self::Model>;

    /// Destroy the object.
    async fn delete(&self, ctx: &OperationContext, prior: Self::Model) -> Response<()>;

    /// Seed state for an existing object; the host reads it afterwards.
    async fn import(&self, ctx: &OperationContext, id: &str) -> Response<Self::Model>;
}
