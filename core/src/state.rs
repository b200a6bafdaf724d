//! State - One Route Node within One Transition
//!
//! A [`State`] binds a [`Route`] to the routable instance handling it for
//! the duration of a transition. Entering states construct a fresh
//! instance inside a new service scope; retained and exiting states forward
//! the instance and scope of the state they continue.
//!
//! Lifecycle: `pristine → initialized → running → executed → finished`.
//! Each step is legal exactly once and only in that order.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{StateError, TransitionError};
use crate::routable::{Commit, HookResult, Routable, RoutableClass};
use crate::route::Route;
use crate::services::ServiceProvider;
use crate::transition::Transition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateStatus {
    Pristine,
    Initialized,
    Running,
    Executed,
    Finished,
}

impl std::fmt::Display for StateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StateStatus::Pristine => "pristine",
            StateStatus::Initialized => "initialized",
            StateStatus::Running => "running",
            StateStatus::Executed => "executed",
            StateStatus::Finished => "finished",
        };
        f.write_str(label)
    }
}

/// Which side of the partition a state belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Entering,
    Retained,
    Exiting,
}

enum Origin {
    Class(Arc<dyn RoutableClass>),
    Forwarded {
        instance: Arc<dyn Routable>,
        services: ServiceProvider,
    },
}

struct StateInner {
    status: StateStatus,
    origin: Option<Origin>,
    instance: Option<Arc<dyn Routable>>,
    services: Option<ServiceProvider>,
    commits: Vec<Commit>,
}

pub struct State {
    route: Route,
    kind: StateKind,
    inner: Mutex<StateInner>,
}

impl State {
    fn with_origin(route: Route, kind: StateKind, origin: Origin) -> Self {
        Self {
            route,
            kind,
            inner: Mutex::new(StateInner {
                status: StateStatus::Pristine,
                origin: Some(origin),
                instance: None,
                services: None,
                commits: Vec::new(),
            }),
        }
    }

    /// State constructing a new instance of `class` on initialize.
    pub fn entering(route: Route, class: Arc<dyn RoutableClass>) -> Self {
        Self::with_origin(route, StateKind::Entering, Origin::Class(class))
    }

    /// State continuing `prior` under a new transition.
    ///
    /// The instance and scope are copied now, so the new state does not
    /// keep `prior` alive.
    pub fn forward(kind: StateKind, prior: &State) -> Result<Self, StateError> {
        let (instance, services) = {
            let inner = prior.inner.lock();
            (inner.instance.clone(), inner.services.clone())
        };

        match (instance, services) {
            (Some(instance), Some(services)) => Ok(Self::with_origin(
                prior.route.clone(),
                kind,
                Origin::Forwarded { instance, services },
            )),
            _ => Err(prior.ordering("forward", prior.status())),
        }
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    pub fn status(&self) -> StateStatus {
        self.inner.lock().status
    }

    /// The routable instance, once initialized.
    pub fn instance(&self) -> Option<Arc<dyn Routable>> {
        self.inner.lock().instance.clone()
    }

    /// Scope the instance lives in, once initialized.
    pub fn services(&self) -> Option<ServiceProvider> {
        self.inner.lock().services.clone()
    }

    fn ordering(&self, action: &'static str, status: StateStatus) -> StateError {
        StateError::Ordering {
            action,
            route: self.route.id().to_string(),
            status,
        }
    }

    /// Assign instance and scope.
    ///
    /// Entering states create a child of `parent` (or of `root` when there
    /// is no parent) and construct the instance inside it. Returns the
    /// scope so the caller can thread it to the next node.
    pub fn initialize(
        &self,
        parent: Option<&ServiceProvider>,
        root: &ServiceProvider,
    ) -> Result<ServiceProvider, TransitionError> {
        let mut inner = self.inner.lock();
        if inner.status != StateStatus::Pristine {
            return Err(self.ordering("initialize", inner.status).into());
        }

        let Some(origin) = inner.origin.take() else {
            return Err(self.ordering("initialize", inner.status).into());
        };
        let (instance, services) = match origin {
            Origin::Class(class) => {
                let scope = parent
                    .unwrap_or(root)
                    .create_scope(|services| class.configure_services(services));
                let instance =
                    class
                        .create(&scope)
                        .map_err(|source| TransitionError::Construct {
                            route: self.route.id().to_string(),
                            source,
                        })?;
                (instance, scope)
            }
            Origin::Forwarded { instance, services } => (instance, services),
        };

        inner.instance = Some(instance);
        inner.services = Some(services.clone());
        inner.status = StateStatus::Initialized;
        Ok(services)
    }

    /// Invoke the lifecycle hooks matching this state's kind and keep their
    /// commits.
    pub async fn run(&self, transition: &Transition) -> Result<(), TransitionError> {
        let instance = {
            let mut inner = self.inner.lock();
            if inner.status != StateStatus::Initialized {
                return Err(self.ordering("run", inner.status).into());
            }
            inner.status = StateStatus::Running;
            inner.instance.clone()
        };
        let Some(instance) = instance else {
            return Err(self.ordering("run", StateStatus::Pristine).into());
        };

        tracing::debug!(route = %self.route, kind = ?self.kind, "Running state");

        let mut commits = Vec::new();
        match self.kind {
            StateKind::Entering => {
                commits.extend(self.hook("on_entering", instance.on_entering(transition)).await?);
                if let Some(hooks) = instance.retaining() {
                    commits.extend(
                        self.hook(
                            "on_entering_or_retaining",
                            hooks.on_entering_or_retaining(transition),
                        )
                        .await?,
                    );
                }
            }
            StateKind::Retained => {
                if let Some(hooks) = instance.retaining() {
                    commits.extend(self.hook("on_retaining", hooks.on_retaining(transition)).await?);
                    commits.extend(
                        self.hook(
                            "on_entering_or_retaining",
                            hooks.on_entering_or_retaining(transition),
                        )
                        .await?,
                    );
                }
            }
            StateKind::Exiting => {
                commits.extend(self.hook("on_exiting", instance.on_exiting(transition)).await?);
            }
        }

        let mut inner = self.inner.lock();
        inner.commits = commits;
        inner.status = StateStatus::Executed;
        Ok(())
    }

    async fn hook(
        &self,
        hook: &'static str,
        future: impl Future<Output = HookResult>,
    ) -> Result<Option<Commit>, TransitionError> {
        future.await.map_err(|source| TransitionError::Hook {
            route: self.route.id().to_string(),
            hook,
            source,
        })
    }

    /// Run the stored commits in the order their hooks returned them.
    pub fn commit(&self) -> Result<(), StateError> {
        let commits = {
            let mut inner = self.inner.lock();
            if inner.status != StateStatus::Executed {
                return Err(self.ordering("commit", inner.status));
            }
            inner.status = StateStatus::Finished;
            std::mem::take(&mut inner.commits)
        };

        for commit in commits {
            commit.run();
        }
        Ok(())
    }
}

impl State {
    /// Drop the instance and scope once no transition can continue this
    /// state. Route, kind and status stay readable.
    pub(crate) fn release(&self) {
        let mut inner = self.inner.lock();
        inner.origin = None;
        inner.instance = None;
        inner.services = None;
        inner.commits.clear();
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("route", &self.route.id())
            .field("kind", &self.kind)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::RouteDeclaration;
    use crate::route::RouteTree;
    use crate::routable::{DefaultClass, RetainingHooks, commit};
    use crate::transition::{TransitionContext, TransitionController, TransitionId};
    use async_trait::async_trait;

    #[derive(Default)]
    struct Recorder {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Routable for Recorder {
        async fn on_entering(&self, _transition: &Transition) -> HookResult {
            let log = self.log.clone();
            commit(move || log.lock().push("entering"))
        }

        fn retaining(&self) -> Option<&dyn RetainingHooks> {
            Some(self)
        }
    }

    #[async_trait]
    impl RetainingHooks for Recorder {
        async fn on_entering_or_retaining(&self, _transition: &Transition) -> HookResult {
            let log = self.log.clone();
            commit(move || log.lock().push("entering_or_retaining"))
        }
    }

    fn route() -> Route {
        let root = RouteDeclaration::root(None, |b| {
            b.page("home", "/", None);
        })
        .unwrap();
        RouteTree::build(&root).unwrap().get_by_name("home").unwrap()
    }

    fn transition(to: Route) -> TransitionController {
        TransitionController::new(
            TransitionId(1),
            None,
            to,
            Default::default(),
            Default::default(),
            TransitionContext::default(),
        )
    }

    #[tokio::test]
    async fn test_ordering_enforced() {
        let route = route();
        let state = State::entering(route.clone(), Arc::new(DefaultClass::<Recorder>::new()));
        let controller = transition(route);

        assert!(matches!(
            state.run(&controller).await,
            Err(TransitionError::State(StateError::Ordering { action: "run", .. }))
        ));
        assert!(state.commit().is_err());

        let root = ServiceProvider::default();
        let scope = state.initialize(None, &root).unwrap();
        assert!(scope.parent().unwrap().ptr_eq(&root));
        assert!(state.initialize(None, &root).is_err());

        state.run(&controller).await.unwrap();
        assert_eq!(state.status(), StateStatus::Executed);
        assert!(state.run(&controller).await.is_err());

        state.commit().unwrap();
        assert_eq!(state.status(), StateStatus::Finished);
        assert_eq!(
            state.commit().unwrap_err().to_string(),
            "Attempt to commit state of route '$<root>.home' while it is finished"
        );
    }

    #[tokio::test]
    async fn test_dual_commits_in_order() {
        let route = route();
        let log = Arc::new(Mutex::new(Vec::new()));
        let shared = log.clone();
        let class = move |_: &ServiceProvider| -> anyhow::Result<Arc<dyn Routable>> {
            Ok(Arc::new(Recorder { log: shared.clone() }))
        };
        let state = State::entering(route.clone(), Arc::new(class));
        let controller = transition(route);

        state.initialize(None, &ServiceProvider::default()).unwrap();
        state.run(&controller).await.unwrap();
        assert!(log.lock().is_empty());

        state.commit().unwrap();
        assert_eq!(*log.lock(), vec!["entering", "entering_or_retaining"]);
    }

    #[tokio::test]
    async fn test_forward_shares_instance_and_scope() {
        let route = route();
        let prior = State::entering(route.clone(), Arc::new(DefaultClass::<Recorder>::new()));
        assert!(State::forward(StateKind::Retained, &prior).is_err());

        let scope = prior.initialize(None, &ServiceProvider::default()).unwrap();
        let retained = State::forward(StateKind::Retained, &prior).unwrap();
        let child_scope = retained.initialize(None, &ServiceProvider::default()).unwrap();

        assert!(child_scope.ptr_eq(&scope));
        assert!(Arc::ptr_eq(
            &retained.instance().unwrap(),
            &prior.instance().unwrap()
        ));
        assert_eq!(retained.kind(), StateKind::Retained);

        prior.release();
        assert!(prior.instance().is_none());
        assert!(prior.services().is_none());
        assert!(State::forward(StateKind::Exiting, &prior).is_err());
        assert!(retained.instance().is_some());
    }
}
