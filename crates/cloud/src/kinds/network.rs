//! Network kind.

use async_trait::async_trait;
use converge_core::{Field, Lifecycle, Result};
use converge_reconciler::{ChangeSet, Differ, Resource};
use serde::{Deserialize, Serialize};

use super::{reject_changes, without_null};
use crate::api::{NetworkApi, NetworkPatch, NetworkRecord, NetworkSpec};

/// A tenant network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Network {
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub id: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub name: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub admin_state_up: Field<bool>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl Network {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Field::Set(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_admin_state_up(mut self, up: bool) -> Self {
        self.admin_state_up = Field::Set(up);
        self
    }

    fn from_record(record: NetworkRecord) -> Self {
        Self {
            id: Field::Set(record.id),
            name: Field::Set(record.name),
            admin_state_up: Field::Set(record.admin_state_up),
            lifecycle: Lifecycle::Sync,
        }
    }
}

#[async_trait]
impl Resource for Network {
    type Adapter = dyn NetworkApi;
    const KIND: &'static str = "Network";

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn id(&self) -> &Field<String> {
        &self.id
    }

    async fn find(&self, adapter: &Self::Adapter) -> Result<Option<Self>> {
        if let Field::Set(id) = &self.id {
            if let Some(record) = adapter.get_network(id).await? {
                return Ok(Some(Self::from_record(record)));
            }
        }
        let Field::Set(name) = &self.name else {
            return Ok(None);
        };
        Ok(adapter.find_network(name).await?.map(Self::from_record))
    }

    fn diff(actual: &Self, expected: &Self, differ: &mut Differ) -> Self {
        Self {
            id: differ.field("ID", &actual.id, &expected.id),
            name: differ.field("Name", &actual.name, &expected.name),
            admin_state_up: differ.field(
                "AdminStateUp",
                &actual.admin_state_up,
                &without_null(&expected.admin_state_up),
            ),
            lifecycle: expected.lifecycle,
        }
    }

    fn check_changes(
        actual: Option<&Self>,
        expected: &Self,
        changes: &ChangeSet<Self>,
    ) -> Result<()> {
        if actual.is_none() {
            expected.name.require("Name")?;
            return Ok(());
        }
        reject_changes(changes, &["ID", "Name"])
    }

    async fn create(&self, adapter: &Self::Adapter) -> Result<Self> {
        let spec = NetworkSpec {
            name: self.name.require("Name")?.clone(),
            admin_state_up: self.admin_state_up.value().copied(),
        };
        adapter.create_network(&spec).await.map(Self::from_record)
    }

    async fn update(&self, id: &str, adapter: &Self::Adapter) -> Result<Self> {
        let patch = NetworkPatch {
            admin_state_up: self.admin_state_up.value().copied(),
        };
        adapter.update_network(id, &patch).await.map(Self::from_record)
    }

    fn absorb(&mut self, observed: &Self) -> Result<()> {
        self.id.absorb("ID", &observed.id)
    }
}
