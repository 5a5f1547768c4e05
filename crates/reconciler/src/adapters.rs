//! Provider adapter registry.
//!
//! Each resource kind names the provider capability it needs through
//! [`Resource::Adapter`]. The registry maps that capability type to a shared
//! implementation so one provider object can serve many kinds.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use converge_core::{Error, Result};

use crate::task::Resource;

/// Shared provider adapters keyed by capability type.
#[derive(Clone, Default)]
pub struct Adapters {
    by_type: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Adapters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the implementation of capability `A`, replacing any previous one.
    pub fn register<A>(&mut self, adapter: Arc<A>) -> &mut Self
    where
        A: ?Sized + Send + Sync + 'static,
    {
        self.by_type.insert(TypeId::of::<A>(), Arc::new(adapter));
        self
    }

    /// Builder form of [`Adapters::register`].
    #[must_use]
    pub fn with<A>(mut self, adapter: Arc<A>) -> Self
    where
        A: ?Sized + Send + Sync + 'static,
    {
        self.register(adapter);
        self
    }

    /// The implementation of capability `A`, if registered.
    #[must_use]
    pub fn get<A>(&self) -> Option<Arc<A>>
    where
        A: ?Sized + Send + Sync + 'static,
    {
        self.by_type
            .get(&TypeId::of::<A>())?
            .downcast_ref::<Arc<A>>()
            .cloned()
    }

    /// The adapter for resource kind `R`.
    ///
    /// # Errors
    ///
    /// Returns `MissingAdapter` naming the kind when nothing is registered.
    pub fn require<R: Resource>(&self) -> Result<Arc<R::Adapter>> {
        self.get::<R::Adapter>()
            .ok_or_else(|| Error::missing_adapter(R::KIND))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl fmt::Debug for Adapters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapters")
            .field("registered", &self.by_type.len())
            .finish()
    }
}
