//! Portals - Overlays Outside the Route Tree
//!
//! A portal (dialog, sheet, picker...) is opened by the router next to the
//! active transition and closed later by itself through its
//! [`PortalController`]. It follows the deferred-commit pattern of
//! routables, except that commits run as soon as their hook returns.
//!
//! Status: `opening → open → closing → closed`. Closing with `animate`
//! waits for [`PortalController::closed`] before the close hooks finish,
//! giving the view time to play an exit animation.
//!
//! Stopping the router closes every open portal without output.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use waymark_core::diagnostics::SharedDiagnostics;
use waymark_core::routable::HookResult;

use crate::error::RouterError;
use crate::router::{Router, RouterInner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortalId(pub u64);

impl std::fmt::Display for PortalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PortalStatus {
    Opening,
    Open,
    Closing,
    Closed,
}

impl std::fmt::Display for PortalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PortalStatus::Opening => "opening",
            PortalStatus::Open => "open",
            PortalStatus::Closing => "closing",
            PortalStatus::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Lifecycle hooks of a portal. All are optional.
#[async_trait]
pub trait Portal: Send + Sync + 'static {
    async fn on_opening(&self) -> HookResult {
        Ok(None)
    }

    async fn on_opened(&self) -> HookResult {
        Ok(None)
    }

    async fn on_closing(&self) -> HookResult {
        Ok(None)
    }

    async fn on_closed(&self) -> HookResult {
        Ok(None)
    }
}

struct Closing<O> {
    output: Option<O>,
    animate: bool,
}

struct ControllerShared<I, O> {
    id: PortalId,
    input: I,
    status: watch::Sender<PortalStatus>,
    closing: Mutex<Closing<O>>,
    done: watch::Sender<bool>,
}

/// Handle a portal uses to read its input and close itself.
pub struct PortalController<I, O> {
    shared: Arc<ControllerShared<I, O>>,
}

impl<I, O> Clone for PortalController<I, O> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<I, O> PortalController<I, O> {
    fn new(id: PortalId, input: I) -> Self {
        let (status, _) = watch::channel(PortalStatus::Opening);
        let (done, _) = watch::channel(false);
        Self {
            shared: Arc::new(ControllerShared {
                id,
                input,
                status,
                closing: Mutex::new(Closing {
                    output: None,
                    animate: false,
                }),
                done,
            }),
        }
    }

    pub fn id(&self) -> PortalId {
        self.shared.id
    }

    pub fn input(&self) -> &I {
        &self.shared.input
    }

    pub fn status(&self) -> PortalStatus {
        *self.shared.status.borrow()
    }

    /// Close the portal, handing `output` to whoever waits for it.
    ///
    /// With `animate` the portal stays `closing` until [`closed`](Self::closed)
    /// is called. Ignored with a warning unless the portal is open.
    pub fn close(&self, output: Option<O>, animate: bool) {
        let status = self.status();
        if status != PortalStatus::Open {
            tracing::warn!(portal = %self.id(), %status, "Attempt to close portal, expected status 'open'");
            return;
        }

        *self.shared.closing.lock() = Closing { output, animate };
        self.set_status(PortalStatus::Closing);
    }

    /// Finish an animated close.
    pub fn closed(&self) {
        match self.status() {
            PortalStatus::Closing => self.set_status(PortalStatus::Closed),
            PortalStatus::Closed => {}
            status => {
                tracing::warn!(portal = %self.id(), %status, "Attempt to finish closing portal, expected status 'closing'");
            }
        }
    }

    /// Close without output, finishing an animated close if one is pending.
    fn dismiss(&self) {
        match self.status() {
            PortalStatus::Open => self.close(None, false),
            PortalStatus::Closing => self.closed(),
            PortalStatus::Opening | PortalStatus::Closed => {}
        }
    }

    fn set_status(&self, status: PortalStatus) {
        self.shared.status.send_replace(status);
    }

    async fn reached(&self, target: PortalStatus) {
        let mut status = self.shared.status.subscribe();
        let _ = status.wait_for(|current| *current >= target).await;
    }

    fn animate(&self) -> bool {
        self.shared.closing.lock().animate
    }

    fn settle(&self) {
        self.shared.done.send_replace(true);
    }

    async fn output(&self) -> Option<O> {
        let mut done = self.shared.done.subscribe();
        let _ = done.wait_for(|done| *done).await;
        self.shared.closing.lock().output.take()
    }
}

/// Entry of the router's open portal list.
#[derive(Clone)]
pub struct PortalEntry {
    id: PortalId,
    portal: Arc<dyn Portal>,
    status: watch::Receiver<PortalStatus>,
    dismiss: Arc<dyn Fn() + Send + Sync>,
}

impl PortalEntry {
    pub fn id(&self) -> PortalId {
        self.id
    }

    pub fn portal(&self) -> &Arc<dyn Portal> {
        &self.portal
    }

    pub fn status(&self) -> PortalStatus {
        *self.status.borrow()
    }

    pub(crate) fn dismiss(&self) {
        (self.dismiss)()
    }
}

impl std::fmt::Debug for PortalEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalEntry")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

/// Opener's side of a portal.
pub struct PortalHandle<P, I, O> {
    portal: Arc<P>,
    controller: PortalController<I, O>,
}

impl<P, I, O> PortalHandle<P, I, O> {
    pub fn id(&self) -> PortalId {
        self.controller.id()
    }

    pub fn portal(&self) -> &Arc<P> {
        &self.portal
    }

    pub fn controller(&self) -> &PortalController<I, O> {
        &self.controller
    }

    pub fn status(&self) -> PortalStatus {
        self.controller.status()
    }
}

fn run_hook(hook: &'static str, result: HookResult) -> Result<(), RouterError> {
    match result {
        Ok(Some(commit)) => {
            commit.run();
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(source) => Err(RouterError::Portal { hook, source }),
    }
}

async fn drive_closing<P, I, O>(
    router: std::sync::Weak<RouterInner>,
    portal: Arc<P>,
    controller: PortalController<I, O>,
    diagnostics: SharedDiagnostics,
) where
    P: Portal,
    I: Send + Sync + 'static,
    O: Send + 'static,
{
    controller.reached(PortalStatus::Closing).await;

    if let Err(err) = run_hook("on_closing", portal.on_closing().await) {
        diagnostics.error(&err.into());
    }

    if controller.animate() {
        controller.reached(PortalStatus::Closed).await;
    } else {
        controller.set_status(PortalStatus::Closed);
    }

    if let Err(err) = run_hook("on_closed", portal.on_closed().await) {
        diagnostics.error(&err.into());
    }

    if let Some(router) = router.upgrade() {
        let id = controller.id();
        router.portals.update(|portals| portals.retain(|entry| entry.id != id));
    }
    tracing::debug!(portal = %controller.id(), "Portal closed");
    controller.settle();
}

impl Router {
    /// Open a portal built by `create` and run its opening hooks.
    ///
    /// The returned handle resolves to the portal's output once it has
    /// fully closed.
    pub async fn open_portal<P, I, O>(
        &self,
        input: I,
        create: impl FnOnce(PortalController<I, O>) -> P,
    ) -> Result<PortalHandle<P, I, O>, RouterError>
    where
        P: Portal,
        I: Send + Sync + 'static,
        O: Send + 'static,
    {
        self.handler()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| RouterError::NoRuntime)?;

        let id = PortalId(self.inner.next_portal_id.fetch_add(1, Ordering::Relaxed));
        let controller = PortalController::new(id, input);
        let portal = Arc::new(create(controller.clone()));

        let dismissed = controller.clone();
        let entry = PortalEntry {
            id,
            portal: portal.clone(),
            status: controller.shared.status.subscribe(),
            dismiss: Arc::new(move || dismissed.dismiss()),
        };
        self.inner.portals.update(|portals| portals.push(entry));

        let opened = async {
            run_hook("on_opening", portal.on_opening().await)?;
            controller.set_status(PortalStatus::Open);
            run_hook("on_opened", portal.on_opened().await)
        };
        if let Err(err) = opened.await {
            self.inner
                .portals
                .update(|portals| portals.retain(|entry| entry.id != id));
            controller.set_status(PortalStatus::Closed);
            controller.settle();
            return Err(err);
        }

        tracing::debug!(portal = %id, "Portal opened");
        runtime.spawn(drive_closing(
            Arc::downgrade(&self.inner),
            portal.clone(),
            controller.clone(),
            self.inner.diagnostics.clone(),
        ));

        // Stopped while the opening hooks ran.
        if !self.is_started() {
            controller.dismiss();
        }

        Ok(PortalHandle { portal, controller })
    }

    /// Wait until the portal has closed and take its output.
    ///
    /// The output goes to the first waiter only.
    pub async fn wait_for_portal<P, I, O>(
        &self,
        handle: &PortalHandle<P, I, O>,
    ) -> Result<Option<O>, RouterError> {
        self.handler()?;
        Ok(handle.controller.output().await)
    }

    /// Close the portal from the opener's side, without animation.
    pub async fn close_portal<P, I, O>(
        &self,
        handle: &PortalHandle<P, I, O>,
        output: Option<O>,
    ) -> Result<Option<O>, RouterError> {
        self.handler()?;
        handle.controller.close(output, false);
        Ok(handle.controller.output().await)
    }

    /// Open a portal and wait for its output.
    pub async fn portal<P, I, O>(
        &self,
        input: I,
        create: impl FnOnce(PortalController<I, O>) -> P,
    ) -> Result<Option<O>, RouterError>
    where
        P: Portal,
        I: Send + Sync + 'static,
        O: Send + 'static,
    {
        let handle = self.open_portal(input, create).await?;
        self.wait_for_portal(&handle).await
    }
}
