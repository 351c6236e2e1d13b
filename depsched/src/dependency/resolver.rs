use crate::dependency::{Event, Registration};
use crate::error::SchedulerError;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// Turns an external dependency value into a pending [`Registration`].
///
/// Implementations keep the registration until the awaited thing happens and
/// then consume it with `fire`, `fail` or `abandon`. Returning an error drops
/// the registration, which cancels the waiting task.
pub trait DependencyResolver: Send + Sync + 'static {
    fn register(&self, value: &dyn Any, registration: Registration)
    -> Result<(), SchedulerError>;
}

/// Resolver for [`Event`].
#[derive(Debug, Default)]
pub(crate) struct EventResolver;

impl DependencyResolver for EventResolver {
    fn register(&self, value: &dyn Any, registration: Registration) -> Result<(), SchedulerError> {
        let event = value
            .downcast_ref::<Event>()
            .ok_or(SchedulerError::UnexpectedDependencyValue {
                expected: std::any::type_name::<Event>(),
            })?;
        event.attach(registration);
        Ok(())
    }
}

/// Resolvers keyed by the type of dependency value they accept.
pub(crate) struct ResolverRegistry {
    resolvers: DashMap<TypeId, Arc<dyn DependencyResolver>>,
}

impl ResolverRegistry {
    pub(crate) fn new() -> Self {
        let registry = Self {
            resolvers: DashMap::new(),
        };
        registry.register::<Event>(Arc::new(EventResolver));
        registry
    }

    /// Returns the resolver previously registered for `T`, if any.
    pub(crate) fn register<T: Any>(
        &self,
        resolver: Arc<dyn DependencyResolver>,
    ) -> Option<Arc<dyn DependencyResolver>> {
        self.resolvers.insert(TypeId::of::<T>(), resolver)
    }

    pub(crate) fn unregister<T: Any>(&self) -> Option<Arc<dyn DependencyResolver>> {
        self.resolvers
            .remove(&TypeId::of::<T>())
            .map(|(_, resolver)| resolver)
    }

    pub(crate) fn get(
        &self,
        type_id: TypeId,
        type_name: &'static str,
    ) -> Result<Arc<dyn DependencyResolver>, SchedulerError> {
        // Cloned out so no shard lock is held while the resolver runs.
        self.resolvers
            .get(&type_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(SchedulerError::NoResolver { type_name })
    }

    pub(crate) fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub(crate) fn clear(&self) {
        self.resolvers.clear();
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("len", &self.len())
            .finish()
    }
}
