//! Router handler adapter.
//!
//! The router leaves URL mechanics to a [`RouterHandler`]: rendering a
//! route and its parameters to a location, and driving a navigation to it.
//! Handlers are created by a [`RouterHandlerFactory`] when the router
//! starts.

use std::sync::Arc;

use async_trait::async_trait;
use waymark_core::params::RouteParams;
use waymark_core::route::Route;

use crate::error::RouterError;
use crate::router::Router;

#[async_trait]
pub trait RouterHandler: Send + Sync + 'static {
    /// Location string for `route` with fully resolved `params`.
    fn path_for(&self, route: &Route, params: &RouteParams) -> Result<String, RouterError>;

    /// Navigate to `route`, typically through
    /// [`Router::create_transition`].
    async fn go_to(&self, router: &Router, route: Route, params: RouteParams)
        -> Result<(), RouterError>;
}

#[async_trait]
pub trait RouterHandlerFactory: Send + Sync + 'static {
    /// `main` marks the handler bound to the primary location source;
    /// other handlers are driven programmatically only.
    async fn create(&self, main: bool) -> Result<Arc<dyn RouterHandler>, RouterError>;
}
