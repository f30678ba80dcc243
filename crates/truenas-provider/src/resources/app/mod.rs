//! Custom applications.
//!
//! An app moves between `RUNNING` and `STOPPED` through server-controlled
//! transitional states. The reconciler drives it towards `desired_state`,
//! corrects drift it finds on update and bounces the app when its restart
//! triggers change.

pub mod model;
pub mod plan;
pub mod reconcile;
pub mod state;
pub mod wait;

pub use model::AppModel;
pub use reconcile::AppResource;
pub use state::{AppState, DesiredState};
pub use wait::{wait_for_stable, WaitOutcome};
