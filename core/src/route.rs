//! Route Tree
//!
//! The indexed, immutable tree derived from a declaration tree. Nodes live
//! in an arena owned by [`RouteTree`]; a [`Route`] is a cheap handle into
//! it. Two handles are equal only when they point at the same node of the
//! same tree.
//!
//! Every node carries:
//! - `id`: dotted chain of per-node tokens, `$<root>` for the root and
//!   `$<child_N>` for anonymous children
//! - `name`: dotted chain of the named nodes only
//! - `full_path` / `full_params` / `full_defaults`: composed with ancestors

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use crate::declaration::RouteDeclaration;
use crate::error::{RouteError, RouteResult};
use crate::params::{RouteDefaults, RouteParams};
use crate::path::{extract_params, normalize_route_path, path_combine};

pub const ROOT_ROUTE_TOKEN: &str = "$<root>";

struct RouteNode {
    declaration: Arc<RouteDeclaration>,
    id: String,
    name: Option<String>,
    path: Option<String>,
    full_path: Option<String>,
    params: Vec<String>,
    full_params: Vec<String>,
    full_defaults: RouteDefaults,
    parent: Option<usize>,
    children: Vec<usize>,
    depth: usize,
    descendants: OnceLock<Vec<usize>>,
    parents: OnceLock<Vec<usize>>,
}

/// Arena of route nodes with lookup indices.
pub struct RouteTree {
    nodes: Vec<RouteNode>,
    by_declaration: HashMap<usize, usize>,
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

fn declaration_key(declaration: &Arc<RouteDeclaration>) -> usize {
    Arc::as_ptr(declaration) as usize
}

impl RouteTree {
    /// Build and index the tree below `root`, depth first.
    ///
    /// Fails on the first declaration, id or name seen twice.
    pub fn build(root: &Arc<RouteDeclaration>) -> RouteResult<Arc<RouteTree>> {
        let mut tree = RouteTree {
            nodes: Vec::new(),
            by_declaration: HashMap::new(),
            by_id: HashMap::new(),
            by_name: HashMap::new(),
        };
        tree.insert(root, ROOT_ROUTE_TOKEN.to_string(), None)?;
        Ok(Arc::new(tree))
    }

    fn insert(
        &mut self,
        declaration: &Arc<RouteDeclaration>,
        token: String,
        parent: Option<usize>,
    ) -> RouteResult<usize> {
        let parent_node = parent.map(|p| &self.nodes[p]);

        let id = match parent_node {
            Some(p) => format!("{}.{}", p.id, token),
            None => token,
        };
        let name = declaration.name().map(|own| match self.named_ancestor(parent) {
            Some(prefix) => format!("{prefix}.{own}"),
            None => own.to_string(),
        });
        let path = declaration.path().map(normalize_route_path);
        let full_path = declaration.path().map(|own| {
            match self.ancestor_full_path(parent) {
                Some(base) => normalize_route_path(&path_combine("/", &[base, own])),
                None => normalize_route_path(own),
            }
        });
        let params = declaration.path().map(extract_params).unwrap_or_default();

        let parent_node = parent.map(|p| &self.nodes[p]);
        let mut full_params = parent_node.map(|p| p.full_params.clone()).unwrap_or_default();
        full_params.extend(params.iter().cloned());
        let mut full_defaults = parent_node
            .map(|p| p.full_defaults.clone())
            .unwrap_or_default();
        full_defaults.extend(
            declaration
                .defaults()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        let depth = parent_node.map_or(0, |p| p.depth + 1);

        let index = self.nodes.len();
        let key = declaration_key(declaration);
        if self.by_declaration.insert(key, index).is_some() {
            return Err(RouteError::DuplicateDeclaration);
        }
        if self.by_id.insert(id.clone(), index).is_some() {
            return Err(RouteError::DuplicateId(id));
        }
        if let Some(name) = &name {
            if self.by_name.insert(name.clone(), index).is_some() {
                return Err(RouteError::DuplicateName(name.clone()));
            }
        }

        self.nodes.push(RouteNode {
            declaration: declaration.clone(),
            id,
            name,
            path,
            full_path,
            params,
            full_params,
            full_defaults,
            parent,
            children: Vec::new(),
            depth,
            descendants: OnceLock::new(),
            parents: OnceLock::new(),
        });

        for (position, child) in declaration.children().iter().enumerate() {
            let token = match child.name() {
                Some(name) => name.to_string(),
                None => format!("$<child_{position}>"),
            };
            let child_index = self.insert(child, token, Some(index))?;
            self.nodes[index].children.push(child_index);
        }

        Ok(index)
    }

    fn named_ancestor(&self, mut current: Option<usize>) -> Option<&str> {
        while let Some(index) = current {
            let node = &self.nodes[index];
            if let Some(name) = &node.name {
                return Some(name);
            }
            current = node.parent;
        }
        None
    }

    fn ancestor_full_path(&self, mut current: Option<usize>) -> Option<&str> {
        while let Some(index) = current {
            let node = &self.nodes[index];
            if let Some(full_path) = &node.full_path {
                return Some(full_path);
            }
            current = node.parent;
        }
        None
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(self: &Arc<Self>) -> Route {
        Route::new(self.clone(), 0)
    }

    /// Every route, depth-first pre-order starting at the root.
    pub fn routes(self: &Arc<Self>) -> Vec<Route> {
        (0..self.nodes.len())
            .map(|index| Route::new(self.clone(), index))
            .collect()
    }

    pub fn get_by_declaration(
        self: &Arc<Self>,
        declaration: &Arc<RouteDeclaration>,
    ) -> RouteResult<Route> {
        self.by_declaration
            .get(&declaration_key(declaration))
            .map(|&index| Route::new(self.clone(), index))
            .ok_or_else(|| {
                RouteError::NotFound(declaration.name().unwrap_or("<anonymous>").to_string())
            })
    }

    pub fn get_by_id(self: &Arc<Self>, id: &str) -> RouteResult<Route> {
        self.by_id
            .get(id)
            .map(|&index| Route::new(self.clone(), index))
            .ok_or_else(|| RouteError::NotFound(id.to_string()))
    }

    pub fn get_by_name(self: &Arc<Self>, name: &str) -> RouteResult<Route> {
        self.by_name
            .get(name)
            .map(|&index| Route::new(self.clone(), index))
            .ok_or_else(|| RouteError::NotFound(name.to_string()))
    }
}

impl std::fmt::Debug for RouteTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteTree")
            .field("routes", &self.nodes.len())
            .finish()
    }
}

/// Handle to one node of a [`RouteTree`].
#[derive(Clone)]
pub struct Route {
    tree: Arc<RouteTree>,
    index: usize,
}

impl Route {
    fn new(tree: Arc<RouteTree>, index: usize) -> Self {
        Self { tree, index }
    }

    fn node(&self) -> &RouteNode {
        &self.tree.nodes[self.index]
    }

    fn at(&self, index: usize) -> Route {
        Route::new(self.tree.clone(), index)
    }

    pub fn id(&self) -> &str {
        &self.node().id
    }

    pub fn name(&self) -> Option<&str> {
        self.node().name.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.node().path.as_deref()
    }

    pub fn full_path(&self) -> Option<&str> {
        self.node().full_path.as_deref()
    }

    /// Parameters declared by this node's own path.
    pub fn params(&self) -> &[String] {
        &self.node().params
    }

    pub fn full_params(&self) -> &[String] {
        &self.node().full_params
    }

    pub fn defaults(&self) -> &RouteDefaults {
        self.node().declaration.defaults()
    }

    pub fn full_defaults(&self) -> &RouteDefaults {
        &self.node().full_defaults
    }

    pub fn declaration(&self) -> &Arc<RouteDeclaration> {
        &self.node().declaration
    }

    pub fn depth(&self) -> usize {
        self.node().depth
    }

    pub fn parent(&self) -> Option<Route> {
        self.node().parent.map(|index| self.at(index))
    }

    pub fn children(&self) -> Vec<Route> {
        self.node()
            .children
            .iter()
            .map(|&index| self.at(index))
            .collect()
    }

    /// All nodes below this one, depth-first pre-order.
    pub fn descendants(&self) -> Vec<Route> {
        let indices = self.node().descendants.get_or_init(|| {
            let mut result = Vec::new();
            let mut stack: Vec<usize> = self.node().children.iter().rev().copied().collect();
            while let Some(index) = stack.pop() {
                result.push(index);
                stack.extend(self.tree.nodes[index].children.iter().rev());
            }
            result
        });
        indices.iter().map(|&index| self.at(index)).collect()
    }

    /// Ancestors, nearest first.
    pub fn parents(&self) -> Vec<Route> {
        let indices = self.node().parents.get_or_init(|| {
            let mut result = Vec::new();
            let mut current = self.node().parent;
            while let Some(index) = current {
                result.push(index);
                current = self.tree.nodes[index].parent;
            }
            result
        });
        indices.iter().map(|&index| self.at(index)).collect()
    }

    /// Whether this node is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &Route) -> bool {
        if !Arc::ptr_eq(&self.tree, &other.tree) || self.depth() >= other.depth() {
            return false;
        }
        let mut current = other.node().parent;
        while let Some(index) = current {
            if index == self.index {
                return true;
            }
            current = self.tree.nodes[index].parent;
        }
        false
    }

    /// Identity comparison, refined by parameter values when `b_params` is
    /// given: every name of `a.full_params()` must carry the same value in
    /// both maps.
    pub fn equals(
        a: &Route,
        a_params: &RouteParams,
        b: &Route,
        b_params: Option<&RouteParams>,
    ) -> bool {
        if a != b {
            return false;
        }
        match b_params {
            None => true,
            Some(b_params) => a
                .full_params()
                .iter()
                .all(|name| a_params.get(name) == b_params.get(name)),
        }
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.tree, &other.tree) && self.index == other.index
    }
}

impl Eq for Route {}

impl Hash for Route {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.tree).hash(state);
        self.index.hash(state);
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("full_path", &self.full_path())
            .finish()
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}
