use thiserror::Error;
use waymark_core::error::{ParseRetainPolicyError, RouteError, TransitionError};

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Attempt to use stopped router")]
    Stopped,
    #[error("Attempt to start running router")]
    AlreadyStarted,
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Missing value for param '{param}' of route '{route}'")]
    MissingParameter { route: String, param: String },
    #[error("Router requires a running Tokio runtime")]
    NoRuntime,
    #[error("Portal hook '{hook}' failed")]
    Portal {
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },
    /// For [`RouterHandler`](crate::handler::RouterHandler) and factory
    /// implementations outside this crate to wrap their own failures.
    #[error("Router handler failed")]
    Handler(#[source] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse router config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid {var}: {message}")]
    Env { var: &'static str, message: String },
    #[error(transparent)]
    RetainPolicy(#[from] ParseRetainPolicyError),
}
