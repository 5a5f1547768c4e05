//! Block storage volume kind.

use std::collections::BTreeMap;

use async_trait::async_trait;
use converge_core::{Error, Field, Lifecycle, Result};
use converge_reconciler::{ChangeSet, Differ, Resource};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{or_empty, reject_changes, tags_opinion};
use crate::api::{VolumeApi, VolumeRecord, VolumeSpec};

/// A block storage volume. Only its tags can change after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Volume {
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub id: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub name: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub size_gb: Field<u32>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub availability_zone: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub tags: Field<BTreeMap<String, String>>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl Volume {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Field::Set(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_size_gb(mut self, size_gb: u32) -> Self {
        self.size_gb = Field::Set(size_gb);
        self
    }

    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut tags = self.tags.into_option().unwrap_or_default();
        tags.insert(key.into(), value.into());
        self.tags = Field::Set(tags);
        self
    }

    fn from_record(record: VolumeRecord) -> Self {
        Self {
            id: Field::Set(record.id),
            name: Field::Set(record.name),
            size_gb: Field::Set(record.size_gb),
            availability_zone: Field::observed(record.availability_zone),
            tags: Field::Set(record.tags),
            lifecycle: Lifecycle::Sync,
        }
    }
}

#[async_trait]
impl Resource for Volume {
    type Adapter = dyn VolumeApi;
    const KIND: &'static str = "Volume";

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn id(&self) -> &Field<String> {
        &self.id
    }

    async fn find(&self, adapter: &Self::Adapter) -> Result<Option<Self>> {
        if let Field::Set(id) = &self.id {
            if let Some(record) = adapter.get_volume(id).await? {
                return Ok(Some(Self::from_record(record)));
            }
        }
        let Field::Set(name) = &self.name else {
            return Ok(None);
        };
        Ok(adapter.find_volume(name).await?.map(Self::from_record))
    }

    fn diff(actual: &Self, expected: &Self, differ: &mut Differ) -> Self {
        Self {
            id: differ.field("ID", &actual.id, &expected.id),
            name: differ.field("Name", &actual.name, &expected.name),
            size_gb: differ.field("SizeGB", &actual.size_gb, &expected.size_gb),
            availability_zone: differ.field(
                "AvailabilityZone",
                &actual.availability_zone,
                &expected.availability_zone,
            ),
            tags: differ.field("Tags", &or_empty(&actual.tags), &tags_opinion(&expected.tags)),
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
            expected.size_gb.require("SizeGB")?;
            return Ok(());
        }
        reject_changes(changes, &["ID", "Name", "SizeGB", "AvailabilityZone"])
    }

    async fn create(&self, adapter: &Self::Adapter) -> Result<Self> {
        let spec = VolumeSpec {
            name: self.name.require("Name")?.clone(),
            size_gb: *self.size_gb.require("SizeGB")?,
            availability_zone: self.availability_zone.value().cloned(),
            tags: self.tags.value().cloned().unwrap_or_default(),
        };
        adapter.create_volume(&spec).await.map(Self::from_record)
    }

    async fn update(&self, id: &str, adapter: &Self::Adapter) -> Result<Self> {
        match self.tags.value() {
            Some(tags) if !tags.is_empty() => adapter
                .set_volume_tags(id, tags)
                .await
                .map(Self::from_record),
            _ => {
                debug!(volume = %id, "No tags to set");
                adapter
                    .get_volume(id)
                    .await?
                    .map(Self::from_record)
                    .ok_or_else(|| Error::provider_fatal(format!("volume {id} disappeared")))
            }
        }
    }

    fn absorb(&mut self, observed: &Self) -> Result<()> {
        self.id.absorb("ID", &observed.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn existing() -> Volume {
        Volume {
            id: Field::Set("vol-1".to_string()),
            tags: Field::Set(BTreeMap::new()),
            ..Volume::named("etcd").with_size_gb(20)
        }
    }

    #[test]
    fn test_size_required_on_create() {
        let expected = Volume::named("etcd");
        let changes = ChangeSet::compute(None, &expected);
        assert_eq!(
            Volume::check_changes(None, &expected, &changes),
            Err(Error::required_field("SizeGB"))
        );
    }

    #[test]
    fn test_resize_is_rejected() {
        let actual = existing();
        let expected = Volume::named("etcd").with_size_gb(40);
        let changes = ChangeSet::compute(Some(&actual), &expected);
        assert_eq!(
            Volume::check_changes(Some(&actual), &expected, &changes),
            Err(Error::cannot_change_field("SizeGB"))
        );
    }

    #[test]
    fn test_new_tags_are_an_update() {
        let actual = existing();
        let expected = Volume::named("etcd").with_tag("cluster", "prod");
        let changes = ChangeSet::compute(Some(&actual), &expected);

        assert_eq!(changes.fields(), vec!["Tags"]);
        assert!(Volume::check_changes(Some(&actual), &expected, &changes).is_ok());
    }

    #[test]
    fn test_empty_tags_match_anything() {
        let mut actual = existing();
        actual.tags = Field::Set(BTreeMap::from([("k".to_string(), "v".to_string())]));
        let expected = Volume {
            tags: Field::Set(BTreeMap::new()),
            ..Volume::named("etcd")
        };
        assert!(ChangeSet::compute(Some(&actual), &expected).is_empty());
    }
}
