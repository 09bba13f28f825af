//! Typed service map injected into activations.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Minimal dependency container handed to every activation and call.
///
/// Services are keyed by type; registering a second instance of the same type
/// replaces the first, which is how tests override a production dependency
/// with a double. Cloning is cheap and shares the underlying map.
#[derive(Clone, Default)]
pub struct Services {
    inner: Arc<RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the service of type `T`.
    pub fn insert<T: Send + Sync + 'static>(&self, service: Arc<T>) {
        self.inner
            .write()
            .unwrap()
            .insert(TypeId::of::<T>(), service);
    }

    /// Resolves the service of type `T`, if registered.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner
            .read()
            .unwrap()
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|service| service.downcast::<T>().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_and_get_downcasts() {
        let services = Services::new();
        assert!(services.get::<String>().is_none());

        services.insert(Arc::new("first".to_string()));
        services.insert(Arc::new("second".to_string()));
        assert_eq!(*services.get::<String>().unwrap(), "second");

        services.insert(Arc::new(7u32));
        assert_eq!(*services.get::<u32>().unwrap(), 7);
    }
}
