//! Subnet kind.

use async_trait::async_trait;
use converge_core::{Field, Lifecycle, Result};
use converge_reconciler::{ChangeSet, Differ, Resolved, Resource, TaskIndex, TaskName, TaskRef};
use serde::{Deserialize, Serialize};

use super::{or_empty, reject_changes};
use crate::api::{SubnetApi, SubnetPatch, SubnetRecord, SubnetSpec};

/// A subnet inside a network.
///
/// `network` links to the network task; its identifier is filled into
/// `network_id` once that task converges. `network_id` may also be given
/// directly for a network managed elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Subnet {
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub id: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub name: Field<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<TaskRef>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub network_id: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub cidr: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub dns_servers: Field<Vec<String>>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl Subnet {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Field::Set(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn in_network(mut self, network: &str) -> Self {
        self.network = Some(TaskRef::from(network));
        self
    }

    #[must_use]
    pub fn with_cidr(mut self, cidr: impl Into<String>) -> Self {
        self.cidr = Field::Set(cidr.into());
        self
    }

    #[must_use]
    pub fn with_dns_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dns_servers = Field::Set(servers.into_iter().map(Into::into).collect());
        self
    }

    fn from_record(record: SubnetRecord) -> Self {
        Self {
            id: Field::Set(record.id),
            name: Field::Set(record.name),
            network: None,
            network_id: Field::Set(record.network_id),
            cidr: Field::Set(record.cidr),
            dns_servers: Field::Set(record.dns_servers),
            lifecycle: Lifecycle::Sync,
        }
    }
}

#[async_trait]
impl Resource for Subnet {
    type Adapter = dyn SubnetApi;
    const KIND: &'static str = "Subnet";

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn id(&self) -> &Field<String> {
        &self.id
    }

    fn dependencies(&self, _index: &TaskIndex) -> Vec<TaskName> {
        self.network
            .iter()
            .map(|network| network.name().to_string())
            .collect()
    }

    fn resolve(&mut self, resolved: &Resolved) -> Result<()> {
        resolved.fill(self.network.as_ref(), "Network", &mut self.network_id)
    }

    async fn find(&self, adapter: &Self::Adapter) -> Result<Option<Self>> {
        if let Field::Set(id) = &self.id {
            if let Some(record) = adapter.get_subnet(id).await? {
                return Ok(Some(Self::from_record(record)));
            }
        }
        let Field::Set(name) = &self.name else {
            return Ok(None);
        };
        Ok(adapter.find_subnet(name).await?.map(Self::from_record))
    }

    fn diff(actual: &Self, expected: &Self, differ: &mut Differ) -> Self {
        Self {
            id: differ.field("ID", &actual.id, &expected.id),
            name: differ.field("Name", &actual.name, &expected.name),
            network: None,
            network_id: differ.field("Network", &actual.network_id, &expected.network_id),
            cidr: differ.field("CIDR", &actual.cidr, &expected.cidr),
            dns_servers: differ.field(
                "DNSServers",
                &or_empty(&actual.dns_servers),
                &or_empty(&expected.dns_servers),
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
            expected.cidr.require("CIDR")?;
            return Ok(());
        }
        reject_changes(changes, &["ID", "Name", "Network", "CIDR"])
    }

    async fn create(&self, adapter: &Self::Adapter) -> Result<Self> {
        // Known only once the network task converged.
        let spec = SubnetSpec {
            name: self.name.require("Name")?.clone(),
            network_id: self.network_id.require("Network")?.clone(),
            cidr: self.cidr.require("CIDR")?.clone(),
            dns_servers: self.dns_servers.value().cloned().unwrap_or_default(),
        };
        adapter.create_subnet(&spec).await.map(Self::from_record)
    }

    async fn update(&self, id: &str, adapter: &Self::Adapter) -> Result<Self> {
        let patch = SubnetPatch {
            dns_servers: self.dns_servers.value().cloned(),
        };
        adapter.update_subnet(id, &patch).await.map(Self::from_record)
    }

    fn absorb(&mut self, observed: &Self) -> Result<()> {
        self.id.absorb("ID", &observed.id)?;
        self.network_id.absorb("Network", &observed.network_id)
    }
}
