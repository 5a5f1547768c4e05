//! A minimal resource kind and scripted provider for unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use converge_core::{Error, Field, Lifecycle, Result};

use crate::changes::{ChangeSet, Differ};
use crate::task::{Resolved, Resource, TaskIndex, TaskName, TaskRef};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Widget {
    pub id: Field<String>,
    pub name: Field<String>,
    pub size: Field<u32>,
    pub parent: Option<TaskRef>,
    pub parent_id: Field<String>,
    pub lifecycle: Lifecycle,
}

impl Widget {
    pub fn named(name: &str) -> Self {
        Self {
            name: Field::Set(name.to_string()),
            ..Self::default()
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Field::Set(size);
        self
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(TaskRef::from(parent));
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    fn label(&self) -> String {
        self.name
            .value()
            .cloned()
            .unwrap_or_else(|| "<unnamed>".to_string())
    }
}

#[async_trait]
pub trait WidgetApi: Send + Sync {
    async fn find_widget(&self, widget: &Widget) -> Result<Option<Widget>>;
    async fn create_widget(&self, widget: &Widget) -> Result<Widget>;
    async fn update_widget(&self, id: &str, delta: &Widget) -> Result<Widget>;
}

#[async_trait]
impl Resource for Widget {
    type Adapter = dyn WidgetApi;
    const KIND: &'static str = "Widget";

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn id(&self) -> &Field<String> {
        &self.id
    }

    fn dependencies(&self, _index: &TaskIndex) -> Vec<TaskName> {
        self.parent
            .iter()
            .map(|parent| parent.name().to_string())
            .collect()
    }

    fn resolve(&mut self, resolved: &Resolved) -> Result<()> {
        resolved.fill(self.parent.as_ref(), "Parent", &mut self.parent_id)
    }

    async fn find(&self, adapter: &Self::Adapter) -> Result<Option<Self>> {
        adapter.find_widget(self).await
    }

    fn diff(actual: &Self, expected: &Self, differ: &mut Differ) -> Self {
        Self {
            id: differ.field("ID", &actual.id, &expected.id),
            name: differ.field("Name", &actual.name, &expected.name),
            size: differ.field("Size", &actual.size, &expected.size),
            parent: None,
            parent_id: differ.field("Parent", &actual.parent_id, &expected.parent_id),
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
        for field in ["ID", "Name", "Parent"] {
            if changes.contains(field) {
                return Err(Error::cannot_change_field(field));
            }
        }
        Ok(())
    }

    async fn create(&self, adapter: &Self::Adapter) -> Result<Self> {
        adapter.create_widget(self).await
    }

    async fn update(&self, id: &str, adapter: &Self::Adapter) -> Result<Self> {
        adapter.update_widget(id, self).await
    }

    fn absorb(&mut self, observed: &Self) -> Result<()> {
        self.id.absorb("ID", &observed.id)
    }
}

#[derive(Debug)]
struct Fault {
    operation: String,
    error: Error,
    remaining: u32,
}

#[derive(Debug, Default)]
struct FakeState {
    objects: BTreeMap<String, Widget>,
    next_id: u32,
    calls: Vec<String>,
    faults: Vec<Fault>,
    in_flight: usize,
    max_in_flight: usize,
}

/// In-memory widget provider with a call log and scripted failures.
#[derive(Debug, Default)]
pub struct FakeWidgets {
    state: Mutex<FakeState>,
    latency: Option<Duration>,
}

impl FakeWidgets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every create take `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn seed(&self, widget: Widget) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id = state.next_id.saturating_add(1);
        let id = format!("w-{}", state.next_id);
        Self::store(&mut state, id.clone(), widget);
        id
    }

    pub fn seed_with_id(&self, id: &str, widget: Widget) {
        let mut state = self.state.lock().unwrap();
        Self::store(&mut state, id.to_string(), widget);
    }

    fn store(state: &mut FakeState, id: String, mut widget: Widget) {
        widget.id = Field::Set(id.clone());
        widget.parent = None;
        widget.lifecycle = Lifecycle::Sync;
        state.objects.insert(id, widget);
    }

    pub fn fail_next(&self, operation: &str, error: Error, times: u32) {
        self.state.lock().unwrap().faults.push(Fault {
            operation: operation.to_string(),
            error,
            remaining: times,
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }

    pub fn get(&self, id: &str) -> Option<Widget> {
        self.state.lock().unwrap().objects.get(id).cloned()
    }

    fn record(&self, operation: &str, call: String) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        let fault = state
            .faults
            .iter_mut()
            .find(|f| f.operation == operation && f.remaining > 0);
        match fault {
            Some(fault) => {
                fault.remaining = fault.remaining.saturating_sub(1);
                Err(fault.error.clone())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl WidgetApi for FakeWidgets {
    async fn find_widget(&self, widget: &Widget) -> Result<Option<Widget>> {
        self.record("find", format!("find {}", widget.label()))?;
        let state = self.state.lock().unwrap();
        if let Some(found) = widget.id.value().and_then(|id| state.objects.get(id)) {
            return Ok(Some(found.clone()));
        }
        Ok(widget.name.value().and_then(|name| {
            state
                .objects
                .values()
                .find(|w| w.name.value() == Some(name))
                .cloned()
        }))
    }

    async fn create_widget(&self, widget: &Widget) -> Result<Widget> {
        self.record("create", format!("create {}", widget.label()))?;
        {
            let mut state = self.state.lock().unwrap();
            state.in_flight = state.in_flight.saturating_add(1);
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state.lock().unwrap();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.next_id = state.next_id.saturating_add(1);
        let id = format!("w-{}", state.next_id);
        Self::store(&mut state, id.clone(), widget.clone());
        Ok(state.objects.get(&id).cloned().unwrap())
    }

    async fn update_widget(&self, id: &str, delta: &Widget) -> Result<Widget> {
        let mut fields = Vec::new();
        if delta.size.is_set() {
            fields.push("Size");
        }
        self.record("update", format!("update {id} {}", fields.join(",")))?;
        let mut state = self.state.lock().unwrap();
        let object = state
            .objects
            .get_mut(id)
            .ok_or_else(|| Error::provider_fatal(format!("no widget {id}")))?;
        if let Field::Set(size) = delta.size {
            object.size = Field::Set(size);
        }
        Ok(object.clone())
    }
}
