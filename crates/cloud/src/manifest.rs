//! Desired-state manifests.
//!
//! A manifest maps task names to `kind`-tagged resource descriptions:
//!
//! ```yaml
//! tasks:
//!   private-net:
//!     kind: Network
//!     name: private
//!   private-subnet:
//!     kind: Subnet
//!     name: private
//!     network: private-net
//!     cidr: 10.0.0.0/24
//! ```
//!
//! A key left out is unset; `~` or `null` clears the field.

use std::collections::BTreeMap;
use std::path::Path;

use converge_core::{Error, Result};
use converge_reconciler::{Resource, TaskSet};
use serde::{Deserialize, Serialize};

use crate::kinds::{LoadBalancer, Network, Subnet, Volume};

/// One manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ManifestTask {
    Network(Network),
    Subnet(Subnet),
    LoadBalancer(LoadBalancer),
    Volume(Volume),
}

impl ManifestTask {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => Network::KIND,
            Self::Subnet(_) => Subnet::KIND,
            Self::LoadBalancer(_) => LoadBalancer::KIND,
            Self::Volume(_) => Volume::KIND,
        }
    }
}

/// A named set of desired resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub tasks: BTreeMap<String, ManifestTask>,
}

impl Manifest {
    /// Load a manifest, choosing the format by extension (`.json`, else YAML).
    ///
    /// # Errors
    ///
    /// Returns `FileReadFailed` or `ManifestParseFailed`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }

    /// # Errors
    ///
    /// Returns `ManifestParseFailed` if the text is not a valid manifest.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::ManifestParseFailed {
            reason: e.to_string(),
        })
    }

    /// # Errors
    ///
    /// Returns `ManifestParseFailed` if the text is not a valid manifest.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::ManifestParseFailed {
            reason: e.to_string(),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Turn every entry into a task of its kind.
    #[must_use]
    pub fn into_task_set(self) -> TaskSet {
        self.tasks
            .into_iter()
            .fold(TaskSet::new(), |tasks, (name, task)| match task {
                ManifestTask::Network(network) => tasks.with(name, network),
                ManifestTask::Subnet(subnet) => tasks.with(name, subnet),
                ManifestTask::LoadBalancer(lb) => tasks.with(name, lb),
                ManifestTask::Volume(volume) => tasks.with(name, volume),
            })
    }
}
