//! # converge-cloud
//!
//! Resource kinds for a cloud provider's network, load balancing and block
//! storage services, the adapter trait each kind talks to, an in-memory
//! provider implementing all of them, and manifest loading.
//!
//! ```ignore
//! use std::sync::Arc;
//! use converge_cloud::{Manifest, MemoryCloud};
//! use converge_reconciler::RunnerBuilder;
//!
//! let cloud = Arc::new(MemoryCloud::load_snapshot("state.json")?);
//! let runner = RunnerBuilder::new().with_adapters(cloud.adapters()).build()?;
//!
//! let mut tasks = Manifest::load("desired.yaml")?.into_task_set();
//! runner.run(&mut tasks).await?.into_result()?;
//! cloud.save_snapshot("state.json").await?;
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod api;
pub mod kinds;
pub mod manifest;
pub mod memory;

pub use api::{LoadBalancerApi, NetworkApi, SubnetApi, VolumeApi};
pub use kinds::{LoadBalancer, Network, Subnet, Volume};
pub use manifest::{Manifest, ManifestTask};
pub use memory::{Call, CloudState, MemoryCloud, Operation, SNAPSHOT_VERSION};
