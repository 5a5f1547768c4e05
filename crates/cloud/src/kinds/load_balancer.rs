//! Load balancer kind.

use async_trait::async_trait;
use converge_core::{Field, Lifecycle, Result};
use converge_reconciler::{ChangeSet, Differ, Resolved, Resource, TaskIndex, TaskName, TaskRef};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::reject_changes;
use super::subnet::Subnet;
use crate::api::{LoadBalancerApi, LoadBalancerPatch, LoadBalancerRecord, LoadBalancerSpec};

/// A load balancer with its VIP on a subnet.
///
/// Waits for every subnet task in the run, not only the linked one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadBalancer {
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub id: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub name: Field<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<TaskRef>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub vip_subnet_id: Field<String>,
    /// Assigned by the provider.
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub port_id: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub description: Field<String>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl LoadBalancer {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Field::Set(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn on_subnet(mut self, subnet: &str) -> Self {
        self.subnet = Some(TaskRef::from(subnet));
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Field::Set(description.into());
        self
    }

    fn from_record(record: LoadBalancerRecord) -> Self {
        Self {
            id: Field::Set(record.id),
            name: Field::Set(record.name),
            subnet: None,
            vip_subnet_id: Field::Set(record.vip_subnet_id),
            port_id: Field::Set(record.vip_port_id),
            description: Field::observed(record.description),
            lifecycle: Lifecycle::Sync,
        }
    }
}

#[async_trait]
impl Resource for LoadBalancer {
    type Adapter = dyn LoadBalancerApi;
    const KIND: &'static str = "LoadBalancer";

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn id(&self) -> &Field<String> {
        &self.id
    }

    fn dependencies(&self, index: &TaskIndex) -> Vec<TaskName> {
        index
            .of_kind::<Subnet>()
            .into_iter()
            .chain(self.subnet.iter().map(|subnet| subnet.name().to_string()))
            .unique()
            .collect()
    }

    fn resolve(&mut self, resolved: &Resolved) -> Result<()> {
        resolved.fill(self.subnet.as_ref(), "VipSubnet", &mut self.vip_subnet_id)
    }

    async fn find(&self, adapter: &Self::Adapter) -> Result<Option<Self>> {
        if let Field::Set(id) = &self.id {
            if let Some(record) = adapter.get_load_balancer(id).await? {
                return Ok(Some(Self::from_record(record)));
            }
        }
        let Field::Set(name) = &self.name else {
            return Ok(None);
        };
        Ok(adapter
            .find_load_balancer(name)
            .await?
            .map(Self::from_record))
    }

    fn diff(actual: &Self, expected: &Self, differ: &mut Differ) -> Self {
        Self {
            id: differ.field("ID", &actual.id, &expected.id),
            name: differ.field("Name", &actual.name, &expected.name),
            subnet: None,
            vip_subnet_id: differ.field("VipSubnet", &actual.vip_subnet_id, &expected.vip_subnet_id),
            port_id: Field::Unset,
            description: differ.field("Description", &actual.description, &expected.description),
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
        reject_changes(changes, &["ID", "Name", "VipSubnet"])
    }

    async fn create(&self, adapter: &Self::Adapter) -> Result<Self> {
        let spec = LoadBalancerSpec {
            name: self.name.require("Name")?.clone(),
            vip_subnet_id: self.vip_subnet_id.require("VipSubnet")?.clone(),
            description: self.description.value().cloned(),
        };
        adapter
            .create_load_balancer(&spec)
            .await
            .map(Self::from_record)
    }

    async fn update(&self, id: &str, adapter: &Self::Adapter) -> Result<Self> {
        let description = match &self.description {
            Field::Unset => None,
            Field::Cleared => Some(None),
            Field::Set(description) => Some(Some(description.clone())),
        };
        adapter
            .update_load_balancer(id, &LoadBalancerPatch { description })
            .await
            .map(Self::from_record)
    }

    fn absorb(&mut self, observed: &Self) -> Result<()> {
        self.id.absorb("ID", &observed.id)?;
        self.port_id.absorb("PortID", &observed.port_id)?;
        self.vip_subnet_id.absorb("VipSubnet", &observed.vip_subnet_id)
    }
}
