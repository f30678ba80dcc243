//! ZFS snapshot payloads (`zfs.snapshot.*` / `pool.snapshot.*`).

use serde::{Deserialize, Serialize};

/// Snapshot record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Full id, `dataset@name`
    pub id: String,
    /// Dataset the snapshot belongs to
    pub dataset: String,
    /// Snapshot name without the dataset part
    #[serde(default)]
    pub snapshot_name: Option<String>,
}

impl Snapshot {
    /// Short snapshot name, derived from the id when the server omits it.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.snapshot_name
            .as_deref()
            .or_else(|| self.id.split_once('@').map(|(_, name)| name))
            .unwrap_or(&self.id)
    }
}

/// Payload for `*.snapshot.create`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotCreateRequest {
    /// Dataset to snapshot
    pub dataset: String,
    /// Snapshot name
    pub name: String,
    /// Snapshot child datasets too
    pub recursive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_name_from_id() {
        let snap: Snapshot = serde_json::from_value(json!({
            "id": "tank/data@daily",
            "dataset": "tank/data",
            "name": "tank/data@daily"
        }))
        .unwrap();
        assert_eq!(snap.short_name(), "daily");
    }
}
