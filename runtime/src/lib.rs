pub mod config;
pub mod error;
pub mod handler;
pub mod memory;
pub mod observable;
pub mod portal;
pub mod router;
pub mod sequence;
pub mod telemetry;

pub mod prelude {
    pub use crate::config::RouterConfig;
    pub use crate::error::{ConfigError, RouterError};
    pub use crate::handler::{RouterHandler, RouterHandlerFactory};
    pub use crate::memory::{MemoryRouterHandler, MemoryRouterHandlerFactory};
    pub use crate::observable::Observable;
    pub use crate::portal::{Portal, PortalController, PortalHandle, PortalStatus};
    pub use crate::router::{Router, RouterBuilder};
}

pub use config::RouterConfig;
pub use error::{ConfigError, RouterError};
pub use handler::{RouterHandler, RouterHandlerFactory};
pub use memory::{MemoryRouterHandler, MemoryRouterHandlerFactory, render_path};
pub use observable::Observable;
pub use portal::{Portal, PortalController, PortalEntry, PortalHandle, PortalId, PortalStatus};
pub use router::{Router, RouterBuilder};
pub use sequence::{DEFAULT_TRANSITION_ID_SEED, MonotonicSequence, TransitionSequence};
pub use telemetry::init_tracing;
