//! `truenas_snapshot`: ZFS snapshots.
//!
//! Snapshots are immutable; every attribute but `id` forces replacement, so
//! there is nothing to update.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use truenas_api::models::{Snapshot, SnapshotCreateRequest};
use truenas_api::SnapshotService;
use truenas_core::Error;

use crate::framework::{
    Attr, Attribute, AttributeType, Diagnostics, OperationContext, ReadOutcome, Resource, Response,
    Schema,
};
use crate::validators::{require, validate_str, Validator};

/// Config, plan and state of a `truenas_snapshot`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotModel {
    /// `dataset@name`
    pub id: Attr<String>,
    /// Dataset to snapshot
    pub dataset: Attr<String>,
    /// Snapshot name
    pub name: Attr<String>,
    /// Include child datasets
    pub recursive: Attr<bool>,
}

impl SnapshotModel {
    fn full_name(&self) -> Option<String> {
        match (self.dataset.get(), self.name.get()) {
            (Some(dataset), Some(name)) => Some(format!("{dataset}@{name}")),
            _ => None,
        }
    }

    fn from_server(snapshot: &Snapshot, recursive: Attr<bool>) -> Self {
        Self {
            id: Attr::Known(snapshot.id.clone()),
            dataset: Attr::Known(snapshot.dataset.clone()),
            name: Attr::Known(snapshot.short_name().to_string()),
            recursive: recursive.or_known(false),
        }
    }
}

/// Splits `dataset@name`.
fn split_id(id: &str) -> Option<(&str, &str)> {
    let (dataset, name) = id.split_once('@')?;
    (!dataset.is_empty() && !name.is_empty() && !name.contains('@')).then_some((dataset, name))
}

/// `truenas_snapshot` resource.
pub struct SnapshotResource {
    snapshots: Arc<dyn SnapshotService>,
}

impl SnapshotResource {
    /// Resource backed by `snapshots`.
    #[must_use]
    pub fn new(snapshots: Arc<dyn SnapshotService>) -> Self {
        Self { snapshots }
    }
}

#[async_trait]
impl Resource for SnapshotResource {
    type Model = SnapshotModel;

    fn type_name(&self) -> &'static str {
        "truenas_snapshot"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "ZFS snapshot of a dataset.",
            vec![
                Attribute::computed("id", AttributeType::String).describe("`dataset@name`."),
                Attribute::required("dataset", AttributeType::String)
                    .replace()
                    .validator(Validator::NonEmpty),
                Attribute::required("name", AttributeType::String)
                    .replace()
                    .validator(Validator::NonEmpty),
                Attribute::optional("recursive", AttributeType::Bool)
                    .with_default(false)
                    .replace(),
            ],
        )
    }

    fn validate_config(&self, config: &SnapshotModel) -> Diagnostics {
        let mut diags = Diagnostics::new();
        require(&mut diags, "dataset", &config.dataset);
        require(&mut diags, "name", &config.name);
        validate_str(&mut diags, "dataset", &config.dataset, &[Validator::NonEmpty]);
        validate_str(&mut diags, "name", &config.name, &[Validator::NonEmpty]);
        if config.name.get().is_some_and(|name| name.contains('@')) {
            diags.add_attribute_error("name", "Invalid Attribute Value", "name must not contain '@'");
        }
        diags
    }

    fn modify_plan(&self, prior: Option<&SnapshotModel>, mut planned: SnapshotModel) -> SnapshotModel {
        planned.recursive = planned.recursive.or_default_if_null(false);
        planned.id = match prior {
            Some(prior) => prior.id.clone(),
            None => planned.full_name().map_or(Attr::Unknown, Attr::Known),
        };
        planned
    }

    async fn create(&self, _ctx: &OperationContext, planned: SnapshotModel) -> Response<SnapshotModel> {
        let request = SnapshotCreateRequest {
            dataset: planned.dataset.get_or(String::new()),
            name: planned.name.get_or(String::new()),
            recursive: planned.recursive.get_or(false),
        };
        match self.snapshots.create_snapshot(request).await {
            Ok(snapshot) => {
                info!(snapshot = %snapshot.id, "Created snapshot");
                Response::ok(SnapshotModel::from_server(&snapshot, planned.recursive))
            }
            Err(err) => Response::error("Unable to Create Snapshot", &err),
        }
    }

    async fn read(&self, _ctx: &OperationContext, prior: SnapshotModel) -> Response<ReadOutcome<SnapshotModel>> {
        let Some(id) = prior.id.get().cloned().or_else(|| prior.full_name()) else {
            return Response::error(
                "Unable to Read Snapshot",
                &Error::ValidationError("snapshot has neither an id nor dataset and name".to_string()),
            );
        };
        match self.snapshots.get_snapshot(&id).await {
            Ok(Some(snapshot)) => Response::ok(ReadOutcome::Found(SnapshotModel::from_server(
                &snapshot,
                prior.recursive,
            ))),
            Ok(None) => {
                info!(snapshot = %id, "Snapshot no longer exists, removing from state");
                Response::ok(ReadOutcome::Removed)
            }
            Err(err) => Response::error("Unable to Read Snapshot", &err),
        }
    }

    async fn update(
        &self,
        _ctx: &OperationContext,
        prior: SnapshotModel,
        _planned: SnapshotModel,
    ) -> Response<SnapshotModel> {
        Response::ok(prior)
    }

    async fn delete(&self, _ctx: &OperationContext, prior: SnapshotModel) -> Response<()> {
        let Some(id) = prior.id.get().cloned().or_else(|| prior.full_name()) else {
            return Response::ok(());
        };
        match self
            .snapshots
            .delete_snapshot(&id, prior.recursive.get_or(false))
            .await
        {
            Ok(()) => {
                info!(snapshot = %id, "Deleted snapshot");
                Response::ok(())
            }
            Err(err) if err.is_not_found() => Response::ok(()),
            Err(err) => Response::error("Unable to Delete Snapshot", &err),
        }
    }

    async fn import(&self, _ctx: &OperationContext, id: &str) -> Response<SnapshotModel> {
        let Some((dataset, name)) = split_id(id) else {
            return Response::error(
                "Invalid Snapshot ID",
                &Error::ValidationError(format!("expected `dataset@name`, got `{id}`")),
            );
        };
        Response::ok(SnapshotModel {
            id: Attr::Known(id.to_string()),
            dataset: Attr::Known(dataset.to_string()),
            name: Attr::Known(name.to_string()),
            recursive: Attr::Null,
        })
    }
}
