//! The service registration surface and the frozen service locator.
//!
//! Configure-family hooks write into a single-writer [`ServiceRegistry`];
//! after PostConfigure the registry freezes into an immutable [`Services`]
//! locator, the only service surface later phases see. Access is strictly
//! single-threaded during the build, so no locking is involved.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::BuildError;

/// Mutable, type-keyed service registrations accumulated during the
/// configure phases.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceRegistry {
    pub fn register<T: Send + Sync + 'static>(&mut self, service: T) {
        self.register_arc(Arc::new(service));
    }

    pub fn register_arc<T: Send + Sync + 'static>(&mut self, service: Arc<T>) {
        if self.services.insert(TypeId::of::<T>(), service).is_some() {
            tracing::debug!(
                service = std::any::type_name::<T>(),
                "service registration replaced by a later configure"
            );
        }
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Finalize the registrations into the read-only locator.
    pub fn freeze(self) -> Services {
        Services {
            services: self.services,
        }
    }
}

/// Immutable service locator handed to initialize/application hooks.
pub struct Services {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Services {
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|erased| erased.downcast::<T>().ok())
    }

    pub fn require<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, BuildError> {
        self.get::<T>().ok_or(BuildError::MissingService {
            type_name: std::any::type_name::<T>(),
        })
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("count", &self.services.len())
            .finish()
    }
}
