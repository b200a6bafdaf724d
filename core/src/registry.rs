use std::sync::Arc;

use parking_lot::RwLock;

use crate::declaration::RouteDeclaration;
use crate::error::{RouteError, RouteResult};
use crate::route::{Route, RouteTree};

/// Owns the route tree built from a root declaration and serves lookups
/// by declaration, id and name.
///
/// Lookups fail with [`RouteError::NotFound`] on a miss and with
/// [`RouteError::NotStarted`] while the registry is stopped.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    tree: RwLock<Option<Arc<RouteTree>>>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the tree. Configuration errors (duplicate id or name) surface
    /// here rather than on lookup.
    pub fn start(&self, root: &Arc<RouteDeclaration>) -> RouteResult<()> {
        let mut slot = self.tree.write();
        if slot.is_some() {
            return Err(RouteError::AlreadyStarted);
        }

        let tree = RouteTree::build(root)?;
        tracing::debug!(routes = tree.len(), "Route registry started");
        *slot = Some(tree);
        Ok(())
    }

    /// Release the tree. Handles obtained earlier stay valid.
    pub fn stop(&self) {
        if self.tree.write().take().is_some() {
            tracing::debug!("Route registry stopped");
        }
    }

    pub fn is_started(&self) -> bool {
        self.tree.read().is_some()
    }

    pub fn tree(&self) -> RouteResult<Arc<RouteTree>> {
        self.tree.read().clone().ok_or(RouteError::NotStarted)
    }

    pub fn root(&self) -> RouteResult<Route> {
        Ok(self.tree()?.root())
    }

    pub fn routes(&self) -> RouteResult<Vec<Route>> {
        Ok(self.tree()?.routes())
    }

    pub fn get_by_declaration(&self, declaration: &Arc<RouteDeclaration>) -> RouteResult<Route> {
        self.tree()?.get_by_declaration(declaration)
    }

    pub fn get_by_id(&self, id: &str) -> RouteResult<Route> {
        self.tree()?.get_by_id(id)
    }

    pub fn get_by_name(&self, name: &str) -> RouteResult<Route> {
        self.tree()?.get_by_name(name)
    }
}
