//! Services - Scoped Resource Resolution
//!
//! The minimal dependency-injection contract the transition engine needs.
//! A [`ServiceCollection`] is a type map of registrations; building it
//! yields a root [`ServiceProvider`]. Providers form a scope chain: every
//! routable gets a child scope of its parent route's scope, so lookups
//! fall back to ancestors.
//!
//! Registrations carry a [`Lifetime`]:
//! - `Singleton`: one value shared by the registering scope and all descendants
//! - `Scoped`: built once per resolving scope
//! - `Transient`: built on every resolution

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ServiceError;

type SharedAny = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&ServiceProvider) -> SharedAny + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    Singleton,
    Scoped,
    Transient,
}

#[derive(Clone)]
enum Registration {
    Value(SharedAny),
    Factory(Lifetime, Factory),
}

impl Registration {
    fn lifetime(&self) -> Lifetime {
        match self {
            Registration::Value(_) => Lifetime::Singleton,
            Registration::Factory(lifetime, _) => *lifetime,
        }
    }
}

/// Registrations keyed by type (TypeMap pattern).
#[derive(Default, Clone)]
pub struct ServiceCollection {
    registrations: HashMap<TypeId, Registration>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ready value.
    ///
    /// If a registration of this type already exists, it is replaced.
    pub fn insert<T: Send + Sync + 'static>(&mut self, service: T) -> &mut Self {
        self.registrations
            .insert(TypeId::of::<T>(), Registration::Value(Arc::new(service)));
        self
    }

    /// Register a factory resolved according to `lifetime`.
    pub fn add<T, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> T + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |provider| Arc::new(factory(provider)) as SharedAny);
        self.registrations
            .insert(TypeId::of::<T>(), Registration::Factory(lifetime, factory));
        self
    }

    pub fn add_scoped<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> T + Send + Sync + 'static,
    {
        self.add(Lifetime::Scoped, factory)
    }

    pub fn add_transient<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> T + Send + Sync + 'static,
    {
        self.add(Lifetime::Transient, factory)
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.registrations.contains_key(&TypeId::of::<T>())
    }

    pub fn remove<T: 'static>(&mut self) -> bool {
        self.registrations.remove(&TypeId::of::<T>()).is_some()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Consume the collection into a root scope.
    pub fn build(self) -> ServiceProvider {
        ServiceProvider::from_parts(None, self)
    }
}

impl std::fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCollection")
            .field("registration_count", &self.registrations.len())
            .finish()
    }
}

struct Scope {
    parent: Option<ServiceProvider>,
    registrations: HashMap<TypeId, Registration>,
    singletons: Mutex<HashMap<TypeId, SharedAny>>,
    scoped: Mutex<HashMap<TypeId, SharedAny>>,
    depth: usize,
}

/// One scope of the service chain. Cloning shares the scope.
#[derive(Clone)]
pub struct ServiceProvider {
    scope: Arc<Scope>,
}

impl Default for ServiceProvider {
    fn default() -> Self {
        ServiceCollection::new().build()
    }
}

impl ServiceProvider {
    fn from_parts(parent: Option<ServiceProvider>, collection: ServiceCollection) -> Self {
        let depth = parent.as_ref().map_or(0, |p| p.scope.depth + 1);
        Self {
            scope: Arc::new(Scope {
                parent,
                registrations: collection.registrations,
                singletons: Mutex::new(HashMap::new()),
                scoped: Mutex::new(HashMap::new()),
                depth,
            }),
        }
    }

    /// Create a child scope; `configure` adds registrations visible to the
    /// child and its descendants only.
    pub fn create_scope(&self, configure: impl FnOnce(&mut ServiceCollection)) -> ServiceProvider {
        let mut collection = ServiceCollection::new();
        configure(&mut collection);
        Self::from_parts(Some(self.clone()), collection)
    }

    /// Resolve a service, walking up the scope chain.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let key = TypeId::of::<T>();
        let (owner, registration) = self.lookup(key)?;

        let shared = match registration {
            Registration::Value(value) => value,
            Registration::Factory(Lifetime::Transient, factory) => factory(self),
            Registration::Factory(Lifetime::Singleton, factory) => {
                owner.cached(&owner.scope.singletons, key, || factory(&owner))
            }
            Registration::Factory(Lifetime::Scoped, factory) => {
                self.cached(&self.scope.scoped, key, || factory(self))
            }
        };

        shared.downcast::<T>().ok()
    }

    /// Resolve a service or report which type was missing.
    pub fn require<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ServiceError> {
        self.get::<T>()
            .ok_or(ServiceError::NotRegistered(type_name::<T>()))
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.lookup(TypeId::of::<T>()).is_some()
    }

    /// Lifetime of the registration `T` resolves to, if any.
    pub fn lifetime_of<T: 'static>(&self) -> Option<Lifetime> {
        self.lookup(TypeId::of::<T>()).map(|(_, r)| r.lifetime())
    }

    pub fn parent(&self) -> Option<&ServiceProvider> {
        self.scope.parent.as_ref()
    }

    /// Number of ancestors; the root scope has depth 0.
    pub fn depth(&self) -> usize {
        self.scope.depth
    }

    pub fn ptr_eq(&self, other: &ServiceProvider) -> bool {
        Arc::ptr_eq(&self.scope, &other.scope)
    }

    fn lookup(&self, key: TypeId) -> Option<(ServiceProvider, Registration)> {
        let mut current = Some(self);
        while let Some(provider) = current {
            if let Some(registration) = provider.scope.registrations.get(&key) {
                return Some((provider.clone(), registration.clone()));
            }
            current = provider.scope.parent.as_ref();
        }
        None
    }

    fn cached(
        &self,
        cache: &Mutex<HashMap<TypeId, SharedAny>>,
        key: TypeId,
        build: impl FnOnce() -> SharedAny,
    ) -> SharedAny {
        if let Some(existing) = cache.lock().get(&key) {
            return existing.clone();
        }
        // Built outside the lock: factories may resolve further services.
        let built = build();
        cache.lock().entry(key).or_insert(built).clone()
    }
}

impl std::fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("depth", &self.scope.depth)
            .field("registration_count", &self.scope.registrations.len())
            .finish()
    }
}
