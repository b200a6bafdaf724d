//! Routable - Behaviour Bound to a Route Node
//!
//! A [`Routable`] is the controller of one route node. The transition
//! engine constructs it through a [`RoutableClass`] inside a fresh service
//! scope when the node is entered, keeps it while the node is retained and
//! calls its exit hook when the node leaves the active chain.
//!
//! Hooks may return a [`Commit`]: a deferred side effect executed only once
//! the whole transition finishes.

use std::any::type_name;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::services::{ServiceCollection, ServiceProvider};
use crate::transition::Transition;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Deferred side effect returned by a lifecycle hook.
pub struct Commit(Box<dyn FnOnce() + Send + 'static>);

impl Commit {
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Commit(Box::new(action))
    }

    pub fn run(self) {
        (self.0)()
    }
}

impl std::fmt::Debug for Commit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Commit")
    }
}

pub type HookResult = anyhow::Result<Option<Commit>>;

/// Shorthand for a hook result carrying a commit.
pub fn commit(action: impl FnOnce() + Send + 'static) -> HookResult {
    Ok(Some(Commit::new(action)))
}

/// Lifecycle hooks of a route node. All are optional.
///
/// A routable that wants to hear about being retained exposes
/// [`RetainingHooks`] through [`retaining`](Routable::retaining). When
/// entering, `on_entering` runs before `on_entering_or_retaining`; when
/// retained, `on_retaining` runs before it. Both commits are kept and
/// executed in that order.
#[async_trait]
pub trait Routable: Send + Sync + 'static {
    async fn on_entering(&self, _transition: &Transition) -> HookResult {
        Ok(None)
    }

    async fn on_exiting(&self, _transition: &Transition) -> HookResult {
        Ok(None)
    }

    /// Retain hooks of this routable, if it has any.
    ///
    /// Under [`RetainPolicy::WithCallback`](crate::transition::RetainPolicy)
    /// a node returning `Some` is kept across parameter changes instead of
    /// being exited and entered again.
    fn retaining(&self) -> Option<&dyn RetainingHooks> {
        None
    }
}

/// Hooks of a routable that observes being retained.
#[async_trait]
pub trait RetainingHooks: Send + Sync {
    async fn on_retaining(&self, _transition: &Transition) -> HookResult {
        Ok(None)
    }

    async fn on_entering_or_retaining(&self, _transition: &Transition) -> HookResult {
        Ok(None)
    }
}

/// Routable used for declarations without a provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRoutable;

impl Routable for NoopRoutable {}

/// Constructor of a routable within a service scope.
pub trait RoutableClass: Send + Sync + 'static {
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }

    /// Registrations added to the scope created for the instance.
    fn configure_services(&self, _services: &mut ServiceCollection) {}

    fn create(&self, services: &ServiceProvider) -> anyhow::Result<Arc<dyn Routable>>;
}

impl<F> RoutableClass for F
where
    F: Fn(&ServiceProvider) -> anyhow::Result<Arc<dyn Routable>> + Send + Sync + 'static,
{
    fn create(&self, services: &ServiceProvider) -> anyhow::Result<Arc<dyn Routable>> {
        self(services)
    }
}

/// Class constructing `T` through [`Default`].
pub struct DefaultClass<T>(PhantomData<fn() -> T>);

impl<T> DefaultClass<T> {
    pub fn new() -> Self {
        DefaultClass(PhantomData)
    }
}

impl<T> Default for DefaultClass<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Routable + Default> RoutableClass for DefaultClass<T> {
    fn name(&self) -> &'static str {
        type_name::<T>()
    }

    fn create(&self, _services: &ServiceProvider) -> anyhow::Result<Arc<dyn Routable>> {
        Ok(Arc::new(T::default()))
    }
}

/// What a provider yields: either the class itself or a module-shaped
/// wrapper exposing it as `default`.
pub enum RoutableModule {
    Class(Arc<dyn RoutableClass>),
    Module { default: Arc<dyn RoutableClass> },
}

impl RoutableModule {
    pub fn into_class(self) -> Arc<dyn RoutableClass> {
        match self {
            RoutableModule::Class(class) => class,
            RoutableModule::Module { default } => default,
        }
    }
}

type ProviderFn = dyn Fn() -> BoxFuture<'static, anyhow::Result<RoutableModule>> + Send + Sync;

/// Deferred, possibly asynchronous factory of a [`RoutableClass`].
///
/// Invoked once per node visit, so it must be safe to call repeatedly.
#[derive(Clone)]
pub struct RoutableProvider {
    provide: Arc<ProviderFn>,
}

impl RoutableProvider {
    /// Provider of a routable built through [`Default`].
    pub fn of<T: Routable + Default>() -> Self {
        Self::class(DefaultClass::<T>::new())
    }

    pub fn class(class: impl RoutableClass) -> Self {
        let class: Arc<dyn RoutableClass> = Arc::new(class);
        Self::from_fn(move || Ok(RoutableModule::Class(class.clone())))
    }

    /// Synchronous provider.
    pub fn from_fn<F>(provide: F) -> Self
    where
        F: Fn() -> anyhow::Result<RoutableModule> + Send + Sync + 'static,
    {
        Self {
            provide: Arc::new(move || {
                let module = provide();
                Box::pin(std::future::ready(module)) as BoxFuture<'static, _>
            }),
        }
    }

    /// Asynchronous provider, e.g. a lazily loaded module.
    pub fn deferred<F, Fut>(provide: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<RoutableModule>> + Send + 'static,
    {
        Self {
            provide: Arc::new(move || Box::pin(provide()) as BoxFuture<'static, _>),
        }
    }

    /// Invoke the provider and normalize its result to a class.
    pub async fn resolve(&self) -> anyhow::Result<Arc<dyn RoutableClass>> {
        let module = (self.provide)().await?;
        Ok(module.into_class())
    }
}

impl std::fmt::Debug for RoutableProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutableProvider").finish_non_exhaustive()
    }
}
