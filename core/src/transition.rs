//! Transition - Moving Between Two Positions of the Route Tree
//!
//! A transition goes from the active chain of a previous transition to a
//! target route with parameters. Executing it partitions the affected
//! nodes into three lists:
//!
//! * **retained**: shared prefix kept alive, shallowest first
//! * **entering**: new nodes below the intersection, shallowest first
//! * **exiting**: the rest of the previous chain, deepest first
//!
//! Hooks run retained → entering → exiting. Their commits only run on
//! [`TransitionController::finish`], in the order exiting → retained →
//! entering. A superseded transition is suppressed: execution stops at the
//! next suspension point and nothing is committed.
//!
//! ## Status machine
//!
//! `pristine → loading → executing → executed → committing → finished`, with
//! `suppressed` and `failed` reachable from every non-terminal status but
//! `committing`. Once commits have started the transition can only finish.

use std::ops::Deref;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use futures_util::future::try_join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::Instrument;

use crate::diagnostics::{SharedDiagnostics, TracingDiagnostics};
use crate::error::{ParseRetainPolicyError, StateError, TransitionError};
use crate::params::{RouteData, RouteParams};
use crate::routable::{DefaultClass, NoopRoutable, RoutableClass};
use crate::route::Route;
use crate::services::ServiceProvider;
use crate::state::{State, StateKind};

/// Process-unique, increasing transition identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionId(pub u64);

impl std::fmt::Display for TransitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionStatus {
    Pristine,
    Loading,
    Executing,
    Executed,
    Committing,
    Finished,
    Suppressed,
    Failed,
}

impl TransitionStatus {
    /// `finished`, `suppressed` and `failed` admit no further change.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransitionStatus::Finished | TransitionStatus::Suppressed | TransitionStatus::Failed
        )
    }
}

impl std::fmt::Display for TransitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TransitionStatus::Pristine => "pristine",
            TransitionStatus::Loading => "loading",
            TransitionStatus::Executing => "executing",
            TransitionStatus::Executed => "executed",
            TransitionStatus::Committing => "committing",
            TransitionStatus::Finished => "finished",
            TransitionStatus::Suppressed => "suppressed",
            TransitionStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// When a node on the shared prefix compares parameters before being
/// retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetainPolicy {
    /// Identity only. Parameter changes never exit a shared ancestor.
    Always,
    /// Always compare. Any differing value exits from that node down.
    Never,
    /// Compare unless the routable has retain hooks.
    #[default]
    WithCallback,
}

impl FromStr for RetainPolicy {
    type Err = ParseRetainPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "always" => Ok(RetainPolicy::Always),
            "never" => Ok(RetainPolicy::Never),
            "with-callback" => Ok(RetainPolicy::WithCallback),
            other => Err(ParseRetainPolicyError(other.to_string())),
        }
    }
}

impl std::fmt::Display for RetainPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RetainPolicy::Always => "always",
            RetainPolicy::Never => "never",
            RetainPolicy::WithCallback => "with-callback",
        };
        f.write_str(label)
    }
}

/// Collaborators a transition needs while executing.
#[derive(Clone)]
pub struct TransitionContext {
    /// Root scope; the root route's scope is created below it.
    pub services: ServiceProvider,
    pub diagnostics: SharedDiagnostics,
    pub retain_policy: RetainPolicy,
}

impl TransitionContext {
    pub fn new(services: ServiceProvider) -> Self {
        Self {
            services,
            diagnostics: Arc::new(TracingDiagnostics),
            retain_policy: RetainPolicy::default(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: SharedDiagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_retain_policy(mut self, retain_policy: RetainPolicy) -> Self {
        self.retain_policy = retain_policy;
        self
    }
}

impl Default for TransitionContext {
    fn default() -> Self {
        Self::new(ServiceProvider::default())
    }
}

impl std::fmt::Debug for TransitionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionContext")
            .field("services", &self.services)
            .field("retain_policy", &self.retain_policy)
            .finish_non_exhaustive()
    }
}

struct Partition {
    entering: Vec<Arc<State>>,
    retained: Vec<Arc<State>>,
    exiting: Vec<Arc<State>>,
    active: Vec<Arc<State>>,
}

struct TransitionInner {
    id: TransitionId,
    from: Option<Transition>,
    to: Route,
    to_params: RouteParams,
    to_data: RouteData,
    status: Mutex<TransitionStatus>,
    states: OnceLock<Partition>,
    finished: watch::Sender<bool>,
    context: TransitionContext,
}

/// Read view of a transition, cheap to clone.
#[derive(Clone)]
pub struct Transition {
    inner: Arc<TransitionInner>,
}

impl Transition {
    pub fn id(&self) -> TransitionId {
        self.inner.id
    }

    /// Transition this one started from.
    ///
    /// The link is kept for the whole life of the transition. Instances and
    /// scopes of older transitions are released further down the chain, see
    /// [`TransitionController::finish`].
    pub fn from(&self) -> Option<&Transition> {
        self.inner.from.as_ref()
    }

    pub fn to(&self) -> &Route {
        &self.inner.to
    }

    pub fn to_params(&self) -> &RouteParams {
        &self.inner.to_params
    }

    pub fn to_data(&self) -> &RouteData {
        &self.inner.to_data
    }

    pub fn status(&self) -> TransitionStatus {
        *self.inner.status.lock()
    }

    pub fn context(&self) -> &TransitionContext {
        &self.inner.context
    }

    fn partition(&self, list: &'static str) -> Result<&Partition, TransitionError> {
        self.inner.states.get().ok_or(TransitionError::Loading(list))
    }

    pub fn entering(&self) -> Result<&[Arc<State>], TransitionError> {
        Ok(&self.partition("entering")?.entering)
    }

    pub fn retained(&self) -> Result<&[Arc<State>], TransitionError> {
        Ok(&self.partition("retained")?.retained)
    }

    pub fn exiting(&self) -> Result<&[Arc<State>], TransitionError> {
        Ok(&self.partition("exiting")?.exiting)
    }

    /// `retained ++ entering`: the chain from the root down to `to`.
    pub fn active(&self) -> Result<&[Arc<State>], TransitionError> {
        Ok(&self.partition("active")?.active)
    }

    /// Resolves once the transition is finished, suppressed or failed.
    pub async fn finished(&self) -> TransitionStatus {
        let mut settled = self.inner.finished.subscribe();
        // The sender lives as long as `self`, so this only returns when set.
        let _ = settled.wait_for(|done| *done).await;
        self.status()
    }

    pub fn ptr_eq(&self, other: &Transition) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn release_states(&self) {
        if let Some(partition) = self.inner.states.get() {
            for state in partition.exiting.iter().chain(partition.active.iter()) {
                state.release();
            }
        }
    }
}

impl PartialEq for Transition {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Transition {}

impl std::fmt::Debug for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition")
            .field("id", &self.inner.id)
            .field("to", &self.inner.to.id())
            .field("to_params", &self.inner.to_params)
            .field("status", &self.status())
            .finish()
    }
}

/// Mutable side of a [`Transition`]: drives execution and settlement.
pub struct TransitionController {
    transition: Transition,
}

impl Deref for TransitionController {
    type Target = Transition;

    fn deref(&self) -> &Transition {
        &self.transition
    }
}

impl std::fmt::Debug for TransitionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TransitionController")
            .field(&self.transition)
            .finish()
    }
}

impl TransitionController {
    pub fn new(
        id: TransitionId,
        from: Option<Transition>,
        to: Route,
        to_params: RouteParams,
        to_data: RouteData,
        context: TransitionContext,
    ) -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            transition: Transition {
                inner: Arc::new(TransitionInner {
                    id,
                    from,
                    to,
                    to_params,
                    to_data,
                    status: Mutex::new(TransitionStatus::Pristine),
                    states: OnceLock::new(),
                    finished,
                    context,
                }),
            },
        }
    }

    pub fn transition(&self) -> &Transition {
        &self.transition
    }

    /// Compute the partition, initialize every state and run the hooks.
    ///
    /// Returns early without error when suppressed. Hook, provider and
    /// construction errors are returned to the caller, which is expected
    /// to hand them to [`fail`](Self::fail).
    pub async fn execute(&self) -> Result<(), TransitionError> {
        let span = tracing::info_span!(
            "waymark.transition",
            id = %self.id(),
            to = %self.to(),
        );
        self.execute_steps().instrument(span).await
    }

    async fn execute_steps(&self) -> Result<(), TransitionError> {
        {
            let mut status = self.inner.status.lock();
            match *status {
                TransitionStatus::Suppressed => return Ok(()),
                TransitionStatus::Pristine => *status = TransitionStatus::Loading,
                other => {
                    return Err(TransitionError::InvalidStatus {
                        action: "execute",
                        status: other,
                    });
                }
            }
        }

        let (retained_prior, exiting_prior, intersection) = self.split_previous_chain()?;
        let entering_routes = self.entering_routes(intersection.as_ref());

        tracing::debug!(
            retained = retained_prior.len(),
            entering = entering_routes.len(),
            exiting = exiting_prior.len(),
            "Transition partitioned"
        );

        let classes = try_join_all(entering_routes.iter().map(resolve_class)).await?;
        if self.is_aborted() {
            tracing::debug!("Transition suppressed while loading");
            return Ok(());
        }

        let retained = forward_all(StateKind::Retained, &retained_prior)?;
        let exiting = forward_all(StateKind::Exiting, &exiting_prior)?;
        let entering: Vec<Arc<State>> = entering_routes
            .into_iter()
            .zip(classes)
            .map(|(route, class)| Arc::new(State::entering(route, class)))
            .collect();

        let root = &self.inner.context.services;
        let mut parent: Option<ServiceProvider> = None;
        for state in retained.iter().chain(entering.iter()) {
            parent = Some(state.initialize(parent.as_ref(), root)?);
        }
        for state in &exiting {
            state.initialize(None, root)?;
        }

        let active: Vec<Arc<State>> = retained.iter().chain(entering.iter()).cloned().collect();
        let run_order: Vec<Arc<State>> = active.iter().chain(exiting.iter()).cloned().collect();
        if self
            .inner
            .states
            .set(Partition {
                entering,
                retained,
                exiting,
                active,
            })
            .is_err()
        {
            return Err(TransitionError::InvalidStatus {
                action: "execute",
                status: self.status(),
            });
        }

        if !self.advance(TransitionStatus::Loading, TransitionStatus::Executing) {
            tracing::debug!("Transition suppressed before executing");
            return Ok(());
        }

        for state in &run_order {
            state.run(&self.transition).await?;
            if self.is_aborted() {
                tracing::debug!(route = %state.route(), "Transition suppressed while executing");
                return Ok(());
            }
        }

        self.advance(TransitionStatus::Executing, TransitionStatus::Executed);
        Ok(())
    }

    /// Walk the previous active chain from the root and split it at the
    /// first node that is not kept. Exiting states come back deepest
    /// first.
    fn split_previous_chain(
        &self,
    ) -> Result<(Vec<Arc<State>>, Vec<Arc<State>>, Option<Route>), TransitionError> {
        let Some(from) = self.from() else {
            return Ok((Vec::new(), Vec::new(), None));
        };

        let mut retained = Vec::new();
        let mut exiting = Vec::new();
        let mut intersection = None;

        for state in from.active()? {
            if exiting.is_empty() && self.retains(state, from.to_params()) {
                intersection = Some(state.route().clone());
                retained.push(state.clone());
            } else {
                exiting.push(state.clone());
            }
        }
        exiting.reverse();

        Ok((retained, exiting, intersection))
    }

    fn retains(&self, state: &State, from_params: &RouteParams) -> bool {
        let route = state.route();
        if route != self.to() && !route.is_ancestor_of(self.to()) {
            return false;
        }

        let compare_params = match self.inner.context.retain_policy {
            RetainPolicy::Always => false,
            RetainPolicy::Never => true,
            RetainPolicy::WithCallback => !state
                .instance()
                .is_some_and(|instance| instance.retaining().is_some()),
        };

        !compare_params || Route::equals(route, from_params, route, Some(self.to_params()))
    }

    /// Chain from just below `intersection` down to `to`, shallowest first.
    fn entering_routes(&self, intersection: Option<&Route>) -> Vec<Route> {
        let mut routes = Vec::new();
        let mut current = Some(self.to().clone());
        while let Some(route) = current {
            if Some(&route) == intersection {
                break;
            }
            current = route.parent();
            routes.push(route);
        }
        routes.reverse();
        routes
    }

    fn is_aborted(&self) -> bool {
        matches!(
            self.status(),
            TransitionStatus::Suppressed | TransitionStatus::Failed
        )
    }

    fn advance(&self, expected: TransitionStatus, next: TransitionStatus) -> bool {
        let mut status = self.inner.status.lock();
        if *status != expected {
            return false;
        }
        *status = next;
        true
    }

    fn settle(&self) {
        self.inner.finished.send_replace(true);
    }

    fn commit_states(&self) -> Result<(), StateError> {
        let Some(partition) = self.inner.states.get() else {
            return Ok(());
        };
        partition
            .exiting
            .iter()
            .chain(partition.retained.iter())
            .chain(partition.entering.iter())
            .try_for_each(|state| state.commit())
    }

    /// Commit every state (exiting → retained → entering) and mark the
    /// transition finished. Legal only once executed.
    ///
    /// While committing the transition can no longer be suppressed or
    /// failed. A state refusing to commit is reported as fatal and leaves
    /// the transition failed.
    ///
    /// Finishing also releases the instances and scopes held by the
    /// transition two steps back (`from` of `from`). The direct `from`
    /// keeps its states.
    pub fn finish(&self) -> Result<(), TransitionError> {
        {
            let mut status = self.inner.status.lock();
            if *status != TransitionStatus::Executed {
                return Err(TransitionError::InvalidStatus {
                    action: "finish",
                    status: *status,
                });
            }
            *status = TransitionStatus::Committing;
        }

        if let Err(err) = self.commit_states() {
            *self.inner.status.lock() = TransitionStatus::Failed;
            self.inner
                .context
                .diagnostics
                .fatal(&anyhow::Error::new(err.clone()));
            self.settle();
            return Err(err.into());
        }

        if !self.advance(TransitionStatus::Committing, TransitionStatus::Finished) {
            return Err(TransitionError::InvalidStatus {
                action: "finish",
                status: self.status(),
            });
        }
        tracing::debug!(id = %self.id(), to = %self.to(), "Transition finished");

        if let Some(previous) = self.from().and_then(|from| from.from()) {
            previous.release_states();
        }
        self.settle();
        Ok(())
    }

    /// Stop this transition in favour of a newer one. Nothing of it is
    /// committed afterwards. Suppressing twice is a no-op.
    pub fn suppress(&self) -> Result<(), TransitionError> {
        {
            let mut status = self.inner.status.lock();
            match *status {
                TransitionStatus::Suppressed => return Ok(()),
                TransitionStatus::Committing
                | TransitionStatus::Finished
                | TransitionStatus::Failed => {
                    return Err(TransitionError::InvalidStatus {
                        action: "suppress",
                        status: *status,
                    });
                }
                _ => *status = TransitionStatus::Suppressed,
            }
        }

        tracing::debug!(id = %self.id(), to = %self.to(), "Transition suppressed");
        self.settle();
        Ok(())
    }

    /// Terminate with `error`, reporting it to the diagnostics service.
    pub fn fail(&self, error: anyhow::Error) -> Result<(), TransitionError> {
        {
            let mut status = self.inner.status.lock();
            if status.is_terminal() || *status == TransitionStatus::Committing {
                return Err(TransitionError::InvalidStatus {
                    action: "fail",
                    status: *status,
                });
            }
            *status = TransitionStatus::Failed;
        }

        self.inner.context.diagnostics.error(&error);
        self.settle();
        Ok(())
    }
}

async fn resolve_class(route: &Route) -> Result<Arc<dyn RoutableClass>, TransitionError> {
    match route.declaration().routable() {
        Some(provider) => provider
            .resolve()
            .await
            .map_err(|source| TransitionError::Resolve {
                route: route.id().to_string(),
                source,
            }),
        None => Ok(Arc::new(DefaultClass::<NoopRoutable>::new())),
    }
}

fn forward_all(kind: StateKind, prior: &[Arc<State>]) -> Result<Vec<Arc<State>>, TransitionError> {
    prior
        .iter()
        .map(|state| -> Result<Arc<State>, TransitionError> {
            Ok(Arc::new(State::forward(kind, state)?))
        })
        .collect()
}
