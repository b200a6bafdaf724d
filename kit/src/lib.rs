//! Waymark facade crate.
//!
//! Re-exports the route tree and transition machine (`core`) and the router
//! with its handlers and portals (`runtime`) behind a single entry point.

pub use waymark_core as core;
pub use waymark_runtime as runtime;

pub use waymark_core::{
    RouteDeclaration, RouteRegistry, Routable, RoutableProvider, Transition, TransitionStatus,
};
pub use waymark_runtime::{Router, RouterConfig};

pub mod prelude {
    pub use waymark_core::prelude::*;
    pub use waymark_runtime::prelude::*;
}
