//! Provider adapter interfaces, one per resource kind.
//!
//! Each trait is the full set of remote calls its kind needs. Records are the
//! provider's view of an object; specs and patches are what create and update
//! send.

use std::collections::BTreeMap;

use async_trait::async_trait;
use converge_core::Result;
use serde::{Deserialize, Serialize};

/// Provider view of a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub id: String,
    pub name: String,
    pub admin_state_up: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    pub name: String,
    pub admin_state_up: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkPatch {
    pub admin_state_up: Option<bool>,
}

#[async_trait]
pub trait NetworkApi: Send + Sync {
    async fn get_network(&self, id: &str) -> Result<Option<NetworkRecord>>;
    async fn find_network(&self, name: &str) -> Result<Option<NetworkRecord>>;
    async fn create_network(&self, spec: &NetworkSpec) -> Result<NetworkRecord>;
    async fn update_network(&self, id: &str, patch: &NetworkPatch) -> Result<NetworkRecord>;
}

/// Provider view of a subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetRecord {
    pub id: String,
    pub name: String,
    pub network_id: String,
    pub cidr: String,
    #[serde(default)]
    pub dns_servers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetSpec {
    pub name: String,
    pub network_id: String,
    pub cidr: String,
    pub dns_servers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubnetPatch {
    pub dns_servers: Option<Vec<String>>,
}

#[async_trait]
pub trait SubnetApi: Send + Sync {
    async fn get_subnet(&self, id: &str) -> Result<Option<SubnetRecord>>;
    async fn find_subnet(&self, name: &str) -> Result<Option<SubnetRecord>>;
    async fn create_subnet(&self, spec: &SubnetSpec) -> Result<SubnetRecord>;
    async fn update_subnet(&self, id: &str, patch: &SubnetPatch) -> Result<SubnetRecord>;
}

/// Provider view of a load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerRecord {
    pub id: String,
    pub name: String,
    pub vip_subnet_id: String,
    pub vip_port_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerSpec {
    pub name: String,
    pub vip_subnet_id: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadBalancerPatch {
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
}

#[async_trait]
pub trait LoadBalancerApi: Send + Sync {
    async fn get_load_balancer(&self, id: &str) -> Result<Option<LoadBalancerRecord>>;
    async fn find_load_balancer(&self, name: &str) -> Result<Option<LoadBalancerRecord>>;
    async fn create_load_balancer(&self, spec: &LoadBalancerSpec) -> Result<LoadBalancerRecord>;
    async fn update_load_balancer(
        &self,
        id: &str,
        patch: &LoadBalancerPatch,
    ) -> Result<LoadBalancerRecord>;
}

/// Provider view of a block storage volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub id: String,
    pub name: String,
    pub size_gb: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    pub name: String,
    pub size_gb: u32,
    pub availability_zone: Option<String>,
    pub tags: BTreeMap<String, String>,
}

#[async_trait]
pub trait VolumeApi: Send + Sync {
    async fn get_volume(&self, id: &str) -> Result<Option<VolumeRecord>>;
    async fn find_volume(&self, name: &str) -> Result<Option<VolumeRecord>>;
    async fn create_volume(&self, spec: &VolumeSpec) -> Result<VolumeRecord>;
    /// Replace the volume's tags.
    async fn set_volume_tags(
        &self,
        id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<VolumeRecord>;
}
