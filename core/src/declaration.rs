//! Route Declarations
//!
//! The declaration tree is the static description of the route topology an
//! application registers at startup. It is immutable once built: children
//! are owned by their parent, and every non-root declaration keeps a weak
//! link to the parent it was declared under.
//!
//! Declarations are produced through [`RouteBuilder`](crate::builder::RouteBuilder)
//! and [`RouteDeclaration::root`].

use std::sync::{Arc, Weak};

use crate::builder::RouteBuilder;
use crate::error::{RouteError, RouteResult};
use crate::params::RouteDefaults;
use crate::path::is_valid_route_name;
use crate::routable::RoutableProvider;

/// Position of a declaration in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    /// No parent, holds the top-level routes.
    Root,
    /// Branch with a parent and children.
    Layout,
    /// Leaf with a parent and no children.
    Page,
}

/// Options shared by every declaration kind.
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    pub name: Option<String>,
    pub path: Option<String>,
    pub defaults: RouteDefaults,
    pub routable: Option<RoutableProvider>,
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Declare a default for a path parameter.
    pub fn with_default(
        mut self,
        param: impl Into<String>,
        value: impl Into<crate::params::DefaultValue>,
    ) -> Self {
        self.defaults.insert(param.into(), value.into());
        self
    }

    pub fn routable(mut self, provider: RoutableProvider) -> Self {
        self.routable = Some(provider);
        self
    }
}

pub struct RouteDeclaration {
    name: Option<String>,
    path: Option<String>,
    defaults: RouteDefaults,
    routable: Option<RoutableProvider>,
    kind: DeclarationKind,
    parent: Option<Weak<RouteDeclaration>>,
    children: Vec<Arc<RouteDeclaration>>,
}

impl RouteDeclaration {
    /// Declare the root of a route tree.
    ///
    /// The root has no name or path of its own; `build` declares its
    /// children.
    pub fn root(
        routable: Option<RoutableProvider>,
        build: impl FnOnce(&mut RouteBuilder),
    ) -> RouteResult<Arc<RouteDeclaration>> {
        let mut builder = RouteBuilder::new();
        build(&mut builder);

        let options = RouteOptions {
            routable,
            ..RouteOptions::default()
        };
        Self::declare(DeclarationKind::Root, None, options, Some(builder))
    }

    pub(crate) fn declare(
        kind: DeclarationKind,
        parent: Option<Weak<RouteDeclaration>>,
        options: RouteOptions,
        children: Option<RouteBuilder>,
    ) -> RouteResult<Arc<RouteDeclaration>> {
        if let Some(name) = &options.name {
            if !is_valid_route_name(name) {
                return Err(RouteError::InvalidName(name.clone()));
            }
        }

        // Children need the weak self-link before the Arc exists.
        let mut failure = None;
        let declaration = Arc::new_cyclic(|me: &Weak<RouteDeclaration>| {
            let children = match children.map(|builder| builder.build(me)) {
                Some(Ok(children)) => children,
                Some(Err(err)) => {
                    failure = Some(err);
                    Vec::new()
                }
                None => Vec::new(),
            };

            RouteDeclaration {
                name: options.name,
                path: options.path,
                defaults: options.defaults,
                routable: options.routable,
                kind,
                parent,
                children,
            }
        });

        match failure {
            Some(err) => Err(err),
            None => Ok(declaration),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn defaults(&self) -> &RouteDefaults {
        &self.defaults
    }

    pub fn routable(&self) -> Option<&RoutableProvider> {
        self.routable.as_ref()
    }

    pub fn kind(&self) -> DeclarationKind {
        self.kind
    }

    /// Declaration this one was declared under; `None` for the root or
    /// once the tree has been dropped.
    pub fn parent(&self) -> Option<Arc<RouteDeclaration>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn children(&self) -> &[Arc<RouteDeclaration>] {
        &self.children
    }
}

impl std::fmt::Debug for RouteDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDeclaration")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("path", &self.path)
            .field("defaults", &self.defaults)
            .field("children", &self.children)
            .finish()
    }
}
