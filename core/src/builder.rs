use std::sync::{Arc, Weak};

use crate::declaration::{DeclarationKind, RouteDeclaration, RouteOptions};
use crate::error::RouteResult;
use crate::routable::RoutableProvider;

type DeclareFn = Box<dyn FnOnce(&Weak<RouteDeclaration>) -> RouteResult<Arc<RouteDeclaration>>>;

/// Collects the children of a root or layout declaration.
///
/// Declarations are materialized by [`RouteBuilder::build`] once the parent
/// exists, so each child can hold its parent link.
///
/// ```rust,ignore
/// let root = RouteDeclaration::root(None, |b| {
///     b.page("sign-in", "/sign-in", Some(RoutableProvider::of::<SignIn>()))
///         .layout(Some("products"), Some("/products"), None, |b| {
///             b.page("list", "/", None).page("detail", "/:productId", None);
///         });
/// })?;
/// ```
#[derive(Default)]
pub struct RouteBuilder {
    pending: Vec<DeclareFn>,
}

impl RouteBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a leaf route.
    pub fn page(
        &mut self,
        name: &str,
        path: &str,
        routable: Option<RoutableProvider>,
    ) -> &mut Self {
        let options = RouteOptions {
            name: Some(name.to_string()),
            path: Some(path.to_string()),
            routable,
            ..RouteOptions::default()
        };
        self.page_with(options)
    }

    /// Declare a branch route; `build` declares its children.
    pub fn layout(
        &mut self,
        name: Option<&str>,
        path: Option<&str>,
        routable: Option<RoutableProvider>,
        build: impl FnOnce(&mut RouteBuilder),
    ) -> &mut Self {
        let options = RouteOptions {
            name: name.map(str::to_string),
            path: path.map(str::to_string),
            routable,
            ..RouteOptions::default()
        };
        self.layout_with(options, build)
    }

    pub fn page_with(&mut self, options: RouteOptions) -> &mut Self {
        self.pending.push(Box::new(move |parent| {
            RouteDeclaration::declare(DeclarationKind::Page, Some(parent.clone()), options, None)
        }));
        self
    }

    pub fn layout_with(
        &mut self,
        options: RouteOptions,
        build: impl FnOnce(&mut RouteBuilder),
    ) -> &mut Self {
        let mut children = RouteBuilder::new();
        build(&mut children);

        self.pending.push(Box::new(move |parent| {
            RouteDeclaration::declare(
                DeclarationKind::Layout,
                Some(parent.clone()),
                options,
                Some(children),
            )
        }));
        self
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Materialize the collected declarations under `parent`, in
    /// declaration order.
    pub fn build(self, parent: &Weak<RouteDeclaration>) -> RouteResult<Vec<Arc<RouteDeclaration>>> {
        self.pending
            .into_iter()
            .map(|declare| declare(parent))
            .collect()
    }
}

impl std::fmt::Debug for RouteBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteBuilder")
            .field("pending", &self.pending.len())
            .finish()
    }
}
