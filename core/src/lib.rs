pub mod builder;
pub mod declaration;
pub mod diagnostics;
pub mod error;
pub mod params;
pub mod path;
pub mod registry;
pub mod routable;
pub mod route;
pub mod services;
pub mod state;
pub mod transition;

pub mod prelude {
    pub use crate::builder::RouteBuilder;
    pub use crate::declaration::{DeclarationKind, RouteDeclaration, RouteOptions};
    pub use crate::diagnostics::{DiagnosticsService, TracingDiagnostics};
    pub use crate::error::{RouteError, StateError, TransitionError};
    pub use crate::params::{DefaultValue, RouteData, RouteDefaults, RouteParams, route_params};
    pub use crate::registry::RouteRegistry;
    pub use crate::routable::{
        Commit, DefaultClass, HookResult, NoopRoutable, RetainingHooks, Routable, RoutableClass,
        RoutableModule, RoutableProvider, commit,
    };
    pub use crate::route::Route;
    pub use crate::services::{Lifetime, ServiceCollection, ServiceProvider};
    pub use crate::state::{State, StateKind, StateStatus};
    pub use crate::transition::{
        RetainPolicy, Transition, TransitionContext, TransitionController, TransitionId,
        TransitionStatus,
    };
}

pub use builder::RouteBuilder;
pub use declaration::{DeclarationKind, RouteDeclaration, RouteOptions};
pub use diagnostics::{DiagnosticsService, SharedDiagnostics, TracingDiagnostics};
pub use error::{ParseRetainPolicyError, RouteError, RouteResult, ServiceError, StateError, TransitionError};
pub use params::{DefaultValue, RouteData, RouteDefaults, RouteParams, apply_route_defaults, route_params};
pub use registry::RouteRegistry;
pub use routable::{
    Commit, DefaultClass, HookResult, NoopRoutable, RetainingHooks, Routable, RoutableClass,
    RoutableModule, RoutableProvider, commit,
};
pub use route::{Route, RouteTree};
pub use services::{Lifetime, ServiceCollection, ServiceProvider};
pub use state::{State, StateKind, StateStatus};
pub use transition::{
    RetainPolicy, Transition, TransitionContext, TransitionController, TransitionId,
    TransitionStatus,
};
