use thiserror::Error;

use crate::state::StateStatus;
use crate::transition::TransitionStatus;

/// Configuration and lookup failures of the route tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("Route name '{0}' contains invalid characters")]
    InvalidName(String),
    #[error("Route declaration is already registered")]
    DuplicateDeclaration,
    #[error("Route id '{0}' is already registered")]
    DuplicateId(String),
    #[error("Route name '{0}' is already registered")]
    DuplicateName(String),
    #[error("Route '{0}' not found")]
    NotFound(String),
    #[error("Route registry is not started")]
    NotStarted,
    #[error("Route registry is already started")]
    AlreadyStarted,
    #[error("Route '{0}' is not navigable")]
    NotNavigable(String),
    #[error("Cannot inherit route param '{0}' as it is not present in previous params")]
    MissingInheritedParam(String),
}

/// Lifecycle ordering errors raised by [`State`](crate::state::State).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Attempt to {action} state of route '{route}' while it is {status}")]
    Ordering {
        action: &'static str,
        route: String,
        status: StateStatus,
    },
}

/// Failures of a service scope lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Service '{0}' is not registered")]
    NotRegistered(&'static str),
}

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("Attempt to {action} transition while it is {status}")]
    InvalidStatus {
        action: &'static str,
        status: TransitionStatus,
    },
    #[error("Attempt to obtain {0} states while transition is loading")]
    Loading(&'static str),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("Failed to resolve routable of route '{route}'")]
    Resolve {
        route: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Failed to construct routable of route '{route}'")]
    Construct {
        route: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Lifecycle hook '{hook}' of route '{route}' failed")]
    Hook {
        route: String,
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

pub type RouteResult<T> = Result<T, RouteError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown retain policy '{0}', expected one of: always, never, with-callback")]
pub struct ParseRetainPolicyError(pub String);
