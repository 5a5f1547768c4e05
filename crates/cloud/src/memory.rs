//! In-memory provider.
//!
//! [`MemoryCloud`] implements every kind's adapter over a plain state map. It
//! records each call it receives, can be told to fail the next calls of a
//! kind and operation, and persists its state as a JSON snapshot so the
//! command line can converge against it across runs.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use converge_core::{Error, Result};
use converge_reconciler::{Adapters, Resource};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use ulid::Ulid;

use crate::api::{
    LoadBalancerApi, LoadBalancerPatch, LoadBalancerRecord, LoadBalancerSpec, NetworkApi,
    NetworkPatch, NetworkRecord, NetworkSpec, SubnetApi, SubnetPatch, SubnetRecord, SubnetSpec,
    VolumeApi, VolumeRecord, VolumeSpec,
};
use crate::kinds::{LoadBalancer, Network, Subnet, Volume};

/// Snapshot format version written by [`MemoryCloud::save_snapshot`].
pub const SNAPSHOT_VERSION: u32 = 1;

/// Every object the provider holds, keyed by identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudState {
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkRecord>,
    #[serde(default)]
    pub subnets: BTreeMap<String, SubnetRecord>,
    #[serde(default)]
    pub load_balancers: BTreeMap<String, LoadBalancerRecord>,
    #[serde(default)]
    pub volumes: BTreeMap<String, VolumeRecord>,
}

impl CloudState {
    /// Total number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.networks
            .len()
            .saturating_add(self.subnets.len())
            .saturating_add(self.load_balancers.len())
            .saturating_add(self.volumes.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Kind of remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Lookup by identifier.
    Get,
    /// Lookup by name.
    Find,
    Create,
    Update,
}

impl Operation {
    /// Whether the call changes provider state.
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "get"),
            Self::Find => write!(f, "find"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
        }
    }
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub kind: &'static str,
    pub operation: Operation,
    /// Identifier or name the call was about.
    pub target: String,
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.operation, self.kind, self.target)
    }
}

#[derive(Debug)]
struct Fault {
    kind: String,
    operation: Operation,
    error: Error,
    remaining: u32,
}

#[derive(Debug, Default)]
struct Inner {
    state: CloudState,
    calls: Vec<Call>,
    faults: Vec<Fault>,
}

impl Inner {
    /// Log the call and fire an armed fault, if any.
    fn record(&mut self, kind: &'static str, operation: Operation, target: &str) -> Result<()> {
        self.calls.push(Call {
            kind,
            operation,
            target: target.to_string(),
        });
        let fault = self
            .faults
            .iter_mut()
            .find(|f| f.kind == kind && f.operation == operation && f.remaining > 0);
        match fault {
            Some(fault) => {
                fault.remaining = fault.remaining.saturating_sub(1);
                debug!(kind, %operation, object = target, "Injected fault");
                Err(fault.error.clone())
            }
            None => Ok(()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    saved_at: DateTime<Utc>,
    state: CloudState,
}

/// Provider backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryCloud {
    inner: Mutex<Inner>,
}

impl MemoryCloud {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_state(state: CloudState) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state,
                ..Inner::default()
            }),
        }
    }

    /// Load state from a snapshot file. A missing file is an empty cloud.
    ///
    /// # Errors
    ///
    /// Returns `FileReadFailed` if the file cannot be read and
    /// `SnapshotFailed` if it is not a snapshot this version understands.
    pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No snapshot, starting empty");
                return Ok(Self::new());
            }
            Err(e) => return Err(Error::file_read_failed(path, e.to_string())),
        };
        let snapshot: Snapshot = serde_json::from_str(&text).map_err(|e| Error::SnapshotFailed {
            reason: format!("{}: {e}", path.display()),
        })?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::SnapshotFailed {
                reason: format!("unsupported snapshot version {}", snapshot.version),
            });
        }
        debug!(
            path = %path.display(),
            objects = snapshot.state.len(),
            saved_at = %snapshot.saved_at,
            "Loaded snapshot"
        );
        Ok(Self::from_state(snapshot.state))
    }

    /// Write the current state to a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotFailed` if the state cannot be encoded and
    /// `FileWriteFailed` if the file cannot be written.
    pub async fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            state: self.snapshot().await,
        };
        let text = serde_json::to_string_pretty(&snapshot).map_err(|e| Error::SnapshotFailed {
            reason: e.to_string(),
        })?;
        std::fs::write(path, text).map_err(|e| Error::file_write_failed(path, e.to_string()))?;
        debug!(path = %path.display(), objects = snapshot.state.len(), "Saved snapshot");
        Ok(())
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> CloudState {
        self.inner.lock().await.state.clone()
    }

    /// Every call received so far, in order.
    pub async fn calls(&self) -> Vec<Call> {
        self.inner.lock().await.calls.clone()
    }

    /// Calls that changed provider state.
    pub async fn writes(&self) -> Vec<Call> {
        self.calls()
            .await
            .into_iter()
            .filter(|call| call.operation.is_write())
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.inner.lock().await.calls.clear();
    }

    /// Fail the next `times` calls of `operation` on `kind` with `error`.
    pub async fn fail_next(&self, kind: &str, operation: Operation, error: Error, times: u32) {
        self.inner.lock().await.faults.push(Fault {
            kind: kind.to_string(),
            operation,
            error,
            remaining: times,
        });
    }

    /// Register this provider for every kind.
    #[must_use]
    pub fn adapters(self: &Arc<Self>) -> Adapters {
        Adapters::new()
            .with::<dyn NetworkApi>(Arc::clone(self) as Arc<dyn NetworkApi>)
            .with::<dyn SubnetApi>(Arc::clone(self) as Arc<dyn SubnetApi>)
            .with::<dyn LoadBalancerApi>(Arc::clone(self) as Arc<dyn LoadBalancerApi>)
            .with::<dyn VolumeApi>(Arc::clone(self) as Arc<dyn VolumeApi>)
    }
}

fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Ulid::new().to_string().to_lowercase())
}

fn not_found(kind: &str, id: &str) -> Error {
    Error::provider_fatal(format!("{kind} {id} not found"))
}

#[async_trait]
impl NetworkApi for MemoryCloud {
    async fn get_network(&self, id: &str) -> Result<Option<NetworkRecord>> {
        let mut inner = self.inner.lock().await;
        inner.record(Network::KIND, Operation::Get, id)?;
        Ok(inner.state.networks.get(id).cloned())
    }

    async fn find_network(&self, name: &str) -> Result<Option<NetworkRecord>> {
        let mut inner = self.inner.lock().await;
        inner.record(Network::KIND, Operation::Find, name)?;
        Ok(inner
            .state
            .networks
            .values()
            .find(|record| record.name == name)
            .cloned())
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<NetworkRecord> {
        let mut inner = self.inner.lock().await;
        inner.record(Network::KIND, Operation::Create, &spec.name)?;
        let record = NetworkRecord {
            id: new_id("net"),
            name: spec.name.clone(),
            admin_state_up: spec.admin_state_up.unwrap_or(true),
        };
        inner
            .state
            .networks
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_network(&self, id: &str, patch: &NetworkPatch) -> Result<NetworkRecord> {
        let mut inner = self.inner.lock().await;
        inner.record(Network::KIND, Operation::Update, id)?;
        let record = inner
            .state
            .networks
            .get_mut(id)
            .ok_or_else(|| not_found(Network::KIND, id))?;
        if let Some(up) = patch.admin_state_up {
            record.admin_state_up = up;
        }
        Ok(record.clone())
    }
}

#[async_trait]
impl SubnetApi for MemoryCloud {
    async fn get_subnet(&self, id: &str) -> Result<Option<SubnetRecord>> {
        let mut inner = self.inner.lock().await;
        inner.record(Subnet::KIND, Operation::Get, id)?;
        Ok(inner.state.subnets.get(id).cloned())
    }

    async fn find_subnet(&self, name: &str) -> Result<Option<SubnetRecord>> {
        let mut inner = self.inner.lock().await;
        inner.record(Subnet::KIND, Operation::Find, name)?;
        Ok(inner
            .state
            .subnets
            .values()
            .find(|record| record.name == name)
            .cloned())
    }

    async fn create_subnet(&self, spec: &SubnetSpec) -> Result<SubnetRecord> {
        let mut inner = self.inner.lock().await;
        inner.record(Subnet::KIND, Operation::Create, &spec.name)?;
        if !inner.state.networks.contains_key(&spec.network_id) {
            return Err(not_found(Network::KIND, &spec.network_id));
        }
        let record = SubnetRecord {
            id: new_id("subnet"),
            name: spec.name.clone(),
            network_id: spec.network_id.clone(),
            cidr: spec.cidr.clone(),
            dns_servers: spec.dns_servers.clone(),
        };
        inner.state.subnets.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_subnet(&self, id: &str, patch: &SubnetPatch) -> Result<SubnetRecord> {
        let mut inner = self.inner.lock().await;
        inner.record(Subnet::KIND, Operation::Update, id)?;
        let record = inner
            .state
            .subnets
            .get_mut(id)
            .ok_or_else(|| not_found(Subnet::KIND, id))?;
        if let Some(servers) = &patch.dns_servers {
            record.dns_servers.clone_from(servers);
        }
        Ok(record.clone())
    }
}

#[async_trait]
impl LoadBalancerApi for MemoryCloud {
    async fn get_load_balancer(&self, id: &str) -> Result<Option<LoadBalancerRecord>> {
        let mut inner = self.inner.lock().await;
        inner.record(LoadBalancer::KIND, Operation::Get, id)?;
        Ok(inner.state.load_balancers.get(id).cloned())
    }

    async fn find_load_balancer(&self, name: &str) -> Result<Option<LoadBalancerRecord>> {
        let mut inner = self.inner.lock().await;
        inner.record(LoadBalancer::KIND, Operation::Find, name)?;
        Ok(inner
            .state
            .load_balancers
            .values()
            .find(|record| record.name == name)
            .cloned())
    }

    async fn create_load_balancer(&self, spec: &LoadBalancerSpec) -> Result<LoadBalancerRecord> {
        let mut inner = self.inner.lock().await;
        inner.record(LoadBalancer::KIND, Operation::Create, &spec.name)?;
        if !inner.state.subnets.contains_key(&spec.vip_subnet_id) {
            return Err(not_found(Subnet::KIND, &spec.vip_subnet_id));
        }
        let record = LoadBalancerRecord {
            id: new_id("lb"),
            name: spec.name.clone(),
            vip_subnet_id: spec.vip_subnet_id.clone(),
            vip_port_id: new_id("port"),
            description: spec.description.clone(),
        };
        inner
            .state
            .load_balancers
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_load_balancer(
        &self,
        id: &str,
        patch: &LoadBalancerPatch,
    ) -> Result<LoadBalancerRecord> {
        let mut inner = self.inner.lock().await;
        inner.record(LoadBalancer::KIND, Operation::Update, id)?;
        let record = inner
            .state
            .load_balancers
            .get_mut(id)
            .ok_or_else(|| not_found(LoadBalancer::KIND, id))?;
        if let Some(description) = &patch.description {
            record.description.clone_from(description);
        }
        Ok(record.clone())
    }
}

#[async_trait]
impl VolumeApi for MemoryCloud {
    async fn get_volume(&self, id: &str) -> Result<Option<VolumeRecord>> {
        let mut inner = self.inner.lock().await;
        inner.record(Volume::KIND, Operation::Get, id)?;
        Ok(inner.state.volumes.get(id).cloned())
    }

    async fn find_volume(&self, name: &str) -> Result<Option<VolumeRecord>> {
        let mut inner = self.inner.lock().await;
        inner.record(Volume::KIND, Operation::Find, name)?;
        Ok(inner
            .state
            .volumes
            .values()
            .find(|record| record.name == name)
            .cloned())
    }

    async fn create_volume(&self, spec: &VolumeSpec) -> Result<VolumeRecord> {
        let mut inner = self.inner.lock().await;
        inner.record(Volume::KIND, Operation::Create, &spec.name)?;
        let record = VolumeRecord {
            id: new_id("vol"),
            name: spec.name.clone(),
            size_gb: spec.size_gb,
            availability_zone: spec.availability_zone.clone(),
            tags: spec.tags.clone(),
        };
        inner.state.volumes.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn set_volume_tags(
        &self,
        id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<VolumeRecord> {
        let mut inner = self.inner.lock().await;
        inner.record(Volume::KIND, Operation::Update, id)?;
        let record = inner
            .state
            .volumes
            .get_mut(id)
            .ok_or_else(|| not_found(Volume::KIND, id))?;
        record.tags.clone_from(tags);
        Ok(record.clone())
    }
}
