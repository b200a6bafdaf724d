//! Router - Orchestration of Transitions
//!
//! The router hands out transitions against a started [`RouteRegistry`],
//! tracks the ones in flight and publishes the latest finished one. The
//! render layer reads [`Router::active_transition`] and
//! [`Router::pending_transitions`] and re-renders when either changes.
//!
//! Promotion follows completion order: whichever transition reaches
//! `finished` last becomes active, even when a newer one finished before
//! it. Handlers are expected to suppress superseded navigations before
//! this matters.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use parking_lot::{Mutex, RwLock};
use waymark_core::declaration::RouteDeclaration;
use waymark_core::diagnostics::{SharedDiagnostics, TracingDiagnostics};
use waymark_core::error::RouteError;
use waymark_core::params::{RouteData, RouteParams, apply_route_defaults};
use waymark_core::registry::RouteRegistry;
use waymark_core::route::Route;
use waymark_core::services::ServiceProvider;
use waymark_core::transition::{
    Transition, TransitionContext, TransitionController, TransitionId, TransitionStatus,
};

use crate::config::RouterConfig;
use crate::error::RouterError;
use crate::handler::{RouterHandler, RouterHandlerFactory};
use crate::observable::Observable;
use crate::portal::PortalEntry;
use crate::sequence::{MonotonicSequence, TransitionSequence};

pub(crate) struct RouterInner {
    registry: Arc<RouteRegistry>,
    factory: Arc<dyn RouterHandlerFactory>,
    services: ServiceProvider,
    pub(crate) diagnostics: SharedDiagnostics,
    config: RouterConfig,
    sequence: Arc<dyn TransitionSequence>,
    handler: RwLock<Option<Arc<dyn RouterHandler>>>,
    latest_transition_id: Mutex<Option<TransitionId>>,
    active: Observable<Option<Transition>>,
    pending: Observable<Vec<Transition>>,
    pub(crate) portals: Observable<Vec<PortalEntry>>,
    pub(crate) next_portal_id: AtomicU64,
}

/// Cheap to clone; clones share one router.
#[derive(Clone)]
pub struct Router {
    pub(crate) inner: Arc<RouterInner>,
}

pub struct RouterBuilder {
    registry: Arc<RouteRegistry>,
    factory: Arc<dyn RouterHandlerFactory>,
    services: ServiceProvider,
    diagnostics: SharedDiagnostics,
    config: RouterConfig,
    sequence: Option<Arc<dyn TransitionSequence>>,
}

impl RouterBuilder {
    /// Root service scope handed to every transition.
    pub fn services(mut self, services: ServiceProvider) -> Self {
        self.services = services;
        self
    }

    pub fn diagnostics(mut self, diagnostics: SharedDiagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the id source. Defaults to a [`MonotonicSequence`] seeded
    /// from the config.
    pub fn sequence(mut self, sequence: Arc<dyn TransitionSequence>) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn build(self) -> Router {
        let sequence = self.sequence.unwrap_or_else(|| {
            Arc::new(MonotonicSequence::new(self.config.transition_id_seed))
        });

        Router {
            inner: Arc::new(RouterInner {
                registry: self.registry,
                factory: self.factory,
                services: self.services,
                diagnostics: self.diagnostics,
                config: self.config,
                sequence,
                handler: RwLock::new(None),
                latest_transition_id: Mutex::new(None),
                active: Observable::new(None),
                pending: Observable::new(Vec::new()),
                portals: Observable::new(Vec::new()),
                next_portal_id: AtomicU64::new(1),
            }),
        }
    }
}

impl Router {
    pub fn builder(
        registry: Arc<RouteRegistry>,
        factory: Arc<dyn RouterHandlerFactory>,
    ) -> RouterBuilder {
        RouterBuilder {
            registry,
            factory,
            services: ServiceProvider::default(),
            diagnostics: Arc::new(TracingDiagnostics),
            config: RouterConfig::default(),
            sequence: None,
        }
    }

    // --- lifecycle ---

    /// Create the handler. Fails when already running.
    pub async fn start(&self) -> Result<(), RouterError> {
        if self.is_started() {
            return Err(RouterError::AlreadyStarted);
        }

        let handler = self.inner.factory.create(self.inner.config.main).await?;

        let mut slot = self.inner.handler.write();
        if slot.is_some() {
            return Err(RouterError::AlreadyStarted);
        }
        *slot = Some(handler);
        *self.inner.latest_transition_id.lock() = None;

        tracing::info!(main = self.inner.config.main, "Router started");
        Ok(())
    }

    /// Drop the handler and close every open portal without output.
    pub fn stop(&self) -> Result<(), RouterError> {
        if self.inner.handler.write().take().is_none() {
            return Err(RouterError::Stopped);
        }
        *self.inner.latest_transition_id.lock() = None;

        for entry in self.inner.portals.get() {
            entry.dismiss();
        }

        tracing::info!("Router stopped");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.inner.handler.read().is_some()
    }

    pub fn handler(&self) -> Result<Arc<dyn RouterHandler>, RouterError> {
        self.inner
            .handler
            .read()
            .clone()
            .ok_or(RouterError::Stopped)
    }

    pub fn registry(&self) -> &Arc<RouteRegistry> {
        &self.inner.registry
    }

    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    pub fn services(&self) -> &ServiceProvider {
        &self.inner.services
    }

    pub fn diagnostics(&self) -> &SharedDiagnostics {
        &self.inner.diagnostics
    }

    /// Latest finished transition.
    pub fn active_transition(&self) -> &Observable<Option<Transition>> {
        &self.inner.active
    }

    /// Transitions created and not yet settled, oldest first.
    pub fn pending_transitions(&self) -> &Observable<Vec<Transition>> {
        &self.inner.pending
    }

    /// Open portals, in opening order.
    pub fn portals(&self) -> &Observable<Vec<PortalEntry>> {
        &self.inner.portals
    }

    /// Id of the last transition created since start.
    pub fn latest_transition_id(&self) -> Option<TransitionId> {
        *self.inner.latest_transition_id.lock()
    }

    // --- transitions ---

    /// Create a transition and track it until it settles.
    ///
    /// Must be called inside a Tokio runtime; the watcher promoting the
    /// transition runs as a spawned task.
    pub fn create_transition(
        &self,
        from: Option<Transition>,
        to: Route,
        to_params: RouteParams,
        to_data: RouteData,
    ) -> Result<TransitionController, RouterError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| RouterError::NoRuntime)?;

        let id = self.inner.sequence.next_id();
        *self.inner.latest_transition_id.lock() = Some(id);

        let context = TransitionContext::new(self.inner.services.clone())
            .with_diagnostics(self.inner.diagnostics.clone())
            .with_retain_policy(self.inner.config.retain_policy);
        let controller = TransitionController::new(id, from, to, to_params, to_data, context);

        let transition = controller.transition().clone();
        self.inner
            .pending
            .update(|pending| pending.push(transition.clone()));

        let router = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            let status = transition.finished().await;
            let Some(router) = router.upgrade() else {
                return;
            };

            if status == TransitionStatus::Finished {
                tracing::debug!(id = %transition.id(), to = %transition.to(), "Transition activated");
                router.active.set(Some(transition.clone()));
            }
            router
                .pending
                .update(|pending| pending.retain(|t| !t.ptr_eq(&transition)));
        });

        Ok(controller)
    }

    pub fn create_transition_to_declaration(
        &self,
        from: Option<Transition>,
        declaration: &Arc<RouteDeclaration>,
        to_params: RouteParams,
        to_data: RouteData,
    ) -> Result<TransitionController, RouterError> {
        let to = self.inner.registry.get_by_declaration(declaration)?;
        self.create_transition(from, to, to_params, to_data)
    }

    pub fn create_transition_to_id(
        &self,
        from: Option<Transition>,
        id: &str,
        to_params: RouteParams,
        to_data: RouteData,
    ) -> Result<TransitionController, RouterError> {
        let to = self.inner.registry.get_by_id(id)?;
        self.create_transition(from, to, to_params, to_data)
    }

    pub fn create_transition_to_name(
        &self,
        from: Option<Transition>,
        name: &str,
        to_params: RouteParams,
        to_data: RouteData,
    ) -> Result<TransitionController, RouterError> {
        let to = self.inner.registry.get_by_name(name)?;
        self.create_transition(from, to, to_params, to_data)
    }

    // --- queries ---

    /// Whether `route` is part of the active chain. With `params`, every
    /// parameter of the route's full path must also match the active
    /// transition's values.
    pub fn is_active(&self, route: &Route, params: Option<&RouteParams>) -> Result<bool, RouterError> {
        self.handler()?;

        let Some(active) = self.inner.active.get() else {
            return Ok(false);
        };
        let states = active.active()?;
        Ok(states
            .iter()
            .any(|state| Route::equals(state.route(), active.to_params(), route, params)))
    }

    pub fn is_active_id(&self, id: &str, params: Option<&RouteParams>) -> Result<bool, RouterError> {
        self.handler()?;
        let route = self.inner.registry.get_by_id(id)?;
        self.is_active(&route, params)
    }

    pub fn is_active_name(
        &self,
        name: &str,
        params: Option<&RouteParams>,
    ) -> Result<bool, RouterError> {
        self.handler()?;
        let route = self.inner.registry.get_by_name(name)?;
        self.is_active(&route, params)
    }

    pub fn path_for(&self, route: &Route, params: RouteParams) -> Result<String, RouterError> {
        let handler = self.handler()?;
        if route.name().is_none() {
            return Err(RouteError::NotNavigable(route.id().to_string()).into());
        }

        let params = self.resolve_params(route, params)?;
        handler.path_for(route, &params)
    }

    pub fn path_for_id(&self, id: &str, params: RouteParams) -> Result<String, RouterError> {
        self.handler()?;
        let route = self.inner.registry.get_by_id(id)?;
        self.path_for(&route, params)
    }

    pub fn path_for_name(&self, name: &str, params: RouteParams) -> Result<String, RouterError> {
        self.handler()?;
        let route = self.inner.registry.get_by_name(name)?;
        self.path_for(&route, params)
    }

    // --- navigation ---

    /// Navigate through the handler. Resolves when the handler has
    /// settled the navigation.
    pub async fn go_to(&self, route: Route, params: RouteParams) -> Result<(), RouterError> {
        let handler = self.handler()?;
        let params = self.resolve_params(&route, params)?;
        handler.go_to(self, route, params).await
    }

    pub async fn go_to_id(&self, id: &str, params: RouteParams) -> Result<(), RouterError> {
        self.handler()?;
        let route = self.inner.registry.get_by_id(id)?;
        self.go_to(route, params).await
    }

    pub async fn go_to_name(&self, name: &str, params: RouteParams) -> Result<(), RouterError> {
        self.handler()?;
        let route = self.inner.registry.get_by_name(name)?;
        self.go_to(route, params).await
    }

    /// Fill the route's defaults, inheriting from the active transition.
    fn resolve_params(&self, route: &Route, mut params: RouteParams) -> Result<RouteParams, RouterError> {
        let active = self.inner.active.get();
        let inherited = active.as_ref().map(|t| t.to_params());
        apply_route_defaults(inherited, &mut params, route.full_defaults())?;
        Ok(params)
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("started", &self.is_started())
            .field("config", &self.inner.config)
            .field("latest_transition_id", &self.latest_transition_id())
            .field("pending", &self.inner.pending.with(|p| p.len()))
            .finish()
    }
}
