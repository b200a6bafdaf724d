//! In-memory router handler.
//!
//! Keeps the current location and a history list instead of talking to a
//! browser or OS. Used for tests, headless runs and secondary routers.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use waymark_core::params::{RouteData, RouteParams};
use waymark_core::route::Route;
use waymark_core::transition::{TransitionController, TransitionStatus};

use crate::error::RouterError;
use crate::handler::{RouterHandler, RouterHandlerFactory};
use crate::router::Router;

/// Substitute `params` into the full path template of `route`.
pub fn render_path(route: &Route, params: &RouteParams) -> Result<String, RouterError> {
    let template = route.full_path().unwrap_or("/");
    let mut segments = Vec::new();

    for segment in template.split('/').filter(|s| !s.is_empty()) {
        let Some(placeholder) = segment.strip_prefix(':') else {
            segments.push(segment.to_string());
            continue;
        };

        let name_len = placeholder
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(placeholder.len());
        let (name, suffix) = placeholder.split_at(name_len);
        let value = params
            .get(name)
            .ok_or_else(|| RouterError::MissingParameter {
                route: route.id().to_string(),
                param: name.to_string(),
            })?;
        segments.push(format!("{value}{suffix}"));
    }

    Ok(format!("/{}", segments.join("/")))
}

#[derive(Default)]
struct Navigation {
    location: Option<String>,
    history: Vec<String>,
    in_flight: Option<Arc<TransitionController>>,
}

pub struct MemoryRouterHandler {
    main: bool,
    navigation: Mutex<Navigation>,
}

impl MemoryRouterHandler {
    pub fn new(main: bool) -> Self {
        Self {
            main,
            navigation: Mutex::new(Navigation::default()),
        }
    }

    pub fn is_main(&self) -> bool {
        self.main
    }

    /// Location of the last finished navigation.
    pub fn location(&self) -> Option<String> {
        self.navigation.lock().location.clone()
    }

    /// Every finished location, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.navigation.lock().history.clone()
    }

    fn supersede(&self, next: Option<Arc<TransitionController>>) {
        let previous = std::mem::replace(&mut self.navigation.lock().in_flight, next);
        if let Some(previous) = previous {
            // Refused once committing; that transition finishes first.
            if let Err(err) = previous.suppress() {
                tracing::debug!(id = %previous.id(), error = %err, "Previous navigation not suppressed");
            }
        }
    }
}

#[async_trait]
impl RouterHandler for MemoryRouterHandler {
    fn path_for(&self, route: &Route, params: &RouteParams) -> Result<String, RouterError> {
        render_path(route, params)
    }

    async fn go_to(
        &self,
        router: &Router,
        route: Route,
        params: RouteParams,
    ) -> Result<(), RouterError> {
        let location = render_path(&route, &params)?;
        let from = router.active_transition().get();
        let controller = Arc::new(router.create_transition(from, route, params, RouteData::new())?);
        self.supersede(Some(controller.clone()));

        tracing::debug!(id = %controller.id(), %location, "Navigating");

        let result: Result<(), RouterError> = match controller.execute().await {
            Ok(()) if controller.status() == TransitionStatus::Executed => {
                match controller.finish() {
                    Ok(()) => {
                        let mut navigation = self.navigation.lock();
                        navigation.location = Some(location.clone());
                        navigation.history.push(location);
                        Ok(())
                    }
                    // Superseded between execution and finishing.
                    Err(_) if controller.status() == TransitionStatus::Suppressed => Ok(()),
                    Err(err) => Err(err.into()),
                }
            }
            Ok(()) => {
                tracing::debug!(id = %controller.id(), status = %controller.status(), "Navigation dropped");
                Ok(())
            }
            Err(_) if controller.status() == TransitionStatus::Suppressed => Ok(()),
            Err(err) => controller.fail(err.into()).map_err(RouterError::from),
        };

        {
            let mut navigation = self.navigation.lock();
            if navigation
                .in_flight
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &controller))
            {
                navigation.in_flight = None;
            }
        }

        // Resolve only once the router has promoted or dropped the transition.
        let transition = controller.transition().clone();
        router
            .pending_transitions()
            .wait_for(|pending| !pending.iter().any(|t| t.ptr_eq(&transition)))
            .await;

        result
    }
}

impl std::fmt::Debug for MemoryRouterHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let navigation = self.navigation.lock();
        f.debug_struct("MemoryRouterHandler")
            .field("main", &self.main)
            .field("location", &navigation.location)
            .field("history", &navigation.history.len())
            .finish()
    }
}

/// Factory of [`MemoryRouterHandler`]s that remembers what it created.
#[derive(Default)]
pub struct MemoryRouterHandlerFactory {
    created: Mutex<Vec<Arc<MemoryRouterHandler>>>,
}

impl MemoryRouterHandlerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently created handler.
    pub fn latest(&self) -> Option<Arc<MemoryRouterHandler>> {
        self.created.lock().last().cloned()
    }

    pub fn created(&self) -> usize {
        self.created.lock().len()
    }
}

#[async_trait]
impl RouterHandlerFactory for MemoryRouterHandlerFactory {
    async fn create(&self, main: bool) -> Result<Arc<dyn RouterHandler>, RouterError> {
        let handler = Arc::new(MemoryRouterHandler::new(main));
        self.created.lock().push(handler.clone());
        Ok(handler)
    }
}
