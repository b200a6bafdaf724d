use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use waymark_core::prelude::*;

#[derive(Default)]
struct Log(Mutex<Vec<String>>);

impl Log {
    fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }
}

fn only(entries: &[String], prefix: &str) -> Vec<String> {
    entries
        .iter()
        .filter(|entry| entry.starts_with(prefix))
        .cloned()
        .collect()
}

struct Probe {
    label: &'static str,
    log: Arc<Log>,
    observes: bool,
}

impl Probe {
    fn record(&self, hook: &'static str) -> HookResult {
        self.log.push(format!("run {hook} {}", self.label));
        let log = self.log.clone();
        let label = self.label;
        commit(move || log.push(format!("commit {hook} {label}")))
    }
}

#[async_trait]
impl Routable for Probe {
    async fn on_entering(&self, _transition: &Transition) -> HookResult {
        self.record("entering")
    }

    async fn on_exiting(&self, _transition: &Transition) -> HookResult {
        self.record("exiting")
    }

    fn retaining(&self) -> Option<&dyn RetainingHooks> {
        if self.observes { Some(self) } else { None }
    }
}

#[async_trait]
impl RetainingHooks for Probe {
    async fn on_retaining(&self, _transition: &Transition) -> HookResult {
        self.record("retaining")
    }

    async fn on_entering_or_retaining(&self, _transition: &Transition) -> HookResult {
        self.record("entering_or_retaining")
    }
}

fn probe(label: &'static str, observes: bool) -> Option<RoutableProvider> {
    Some(RoutableProvider::class(
        move |services: &ServiceProvider| -> anyhow::Result<Arc<dyn Routable>> {
            let log = services.require::<Log>()?;
            log.push(format!("create {label}"));
            Ok(Arc::new(Probe {
                label,
                log,
                observes,
            }))
        },
    ))
}

struct Fixture {
    registry: RouteRegistry,
    context: TransitionContext,
    log: Arc<Log>,
}

impl Fixture {
    fn new(observing_portal: bool, retain_policy: RetainPolicy) -> Self {
        let root = RouteDeclaration::root(probe("root", true), |b| {
            b.page("sign-in", "/sign-in", probe("sign-in", false))
                .layout(
                    Some("products"),
                    Some("/products"),
                    probe("products", false),
                    |b| {
                        b.page("list", "/", probe("products.list", false)).page(
                            "detail",
                            "/:productId",
                            probe("products.detail", false),
                        );
                    },
                )
                .layout_with(
                    RouteOptions {
                        name: Some("portal".into()),
                        path: Some("/portal/:tenantId".into()),
                        routable: probe("portal", observing_portal),
                        ..RouteOptions::default()
                    }
                    .with_default("tenantId", DefaultValue::Inherit),
                    |b| {
                        b.layout(
                            Some("products"),
                            Some("/products"),
                            probe("portal.products", false),
                            |b| {
                                b.page("list", "/", probe("portal.products.list", false))
                                    .page(
                                        "detail",
                                        "/:productId",
                                        probe("portal.products.detail", false),
                                    );
                            },
                        );
                    },
                );
        })
        .unwrap();

        let registry = RouteRegistry::new();
        registry.start(&root).unwrap();

        let mut services = ServiceCollection::new();
        services.insert(Log::default());
        let services = services.build();
        let log = services.require::<Log>().unwrap();

        Self {
            registry,
            context: TransitionContext::new(services).with_retain_policy(retain_policy),
            log,
        }
    }

    fn controller(
        &self,
        id: u64,
        from: Option<&TransitionController>,
        name: &str,
        params: RouteParams,
    ) -> TransitionController {
        TransitionController::new(
            TransitionId(id),
            from.map(|f| f.transition().clone()),
            self.registry.get_by_name(name).unwrap(),
            params,
            RouteData::new(),
            self.context.clone(),
        )
    }

    async fn navigate(
        &self,
        id: u64,
        from: Option<&TransitionController>,
        name: &str,
        params: RouteParams,
    ) -> TransitionController {
        let controller = self.controller(id, from, name, params);
        controller.execute().await.unwrap();
        assert_eq!(controller.status(), TransitionStatus::Executed);
        controller
    }
}

fn ids(states: &[Arc<State>]) -> Vec<String> {
    states.iter().map(|s| s.route().id().to_string()).collect()
}

fn detail(tenant: &str, product: &str) -> RouteParams {
    route_params([("tenantId", tenant), ("productId", product)])
}

#[tokio::test]
async fn test_transition_intersection() {
    let fixture = Fixture::new(false, RetainPolicy::WithCallback);

    let sign_in = fixture.navigate(0, None, "sign-in", RouteParams::new()).await;
    assert!(ids(sign_in.exiting().unwrap()).is_empty());
    assert!(ids(sign_in.retained().unwrap()).is_empty());
    assert_eq!(
        ids(sign_in.entering().unwrap()),
        ["$<root>", "$<root>.sign-in"]
    );

    let first = fixture
        .navigate(1, Some(&sign_in), "portal.products.detail", detail("1", "1"))
        .await;
    assert_eq!(ids(first.exiting().unwrap()), ["$<root>.sign-in"]);
    assert_eq!(ids(first.retained().unwrap()), ["$<root>"]);
    assert_eq!(
        ids(first.entering().unwrap()),
        [
            "$<root>.portal",
            "$<root>.portal.products",
            "$<root>.portal.products.detail",
        ]
    );

    // Leaf parameter change re-enters the leaf only.
    let second = fixture
        .navigate(2, Some(&first), "portal.products.detail", detail("1", "2"))
        .await;
    assert_eq!(
        ids(second.exiting().unwrap()),
        ["$<root>.portal.products.detail"]
    );
    assert_eq!(
        ids(second.retained().unwrap()),
        ["$<root>", "$<root>.portal", "$<root>.portal.products"]
    );
    assert_eq!(
        ids(second.entering().unwrap()),
        ["$<root>.portal.products.detail"]
    );

    // Ancestor parameter change re-enters the ancestor and everything below.
    let third = fixture
        .navigate(3, Some(&second), "portal.products.detail", detail("2", "2"))
        .await;
    assert_eq!(
        ids(third.exiting().unwrap()),
        [
            "$<root>.portal.products.detail",
            "$<root>.portal.products",
            "$<root>.portal",
        ]
    );
    assert_eq!(ids(third.retained().unwrap()), ["$<root>"]);
    assert_eq!(
        ids(third.entering().unwrap()),
        [
            "$<root>.portal",
            "$<root>.portal.products",
            "$<root>.portal.products.detail",
        ]
    );
    assert_eq!(
        ids(third.active().unwrap()),
        [
            "$<root>",
            "$<root>.portal",
            "$<root>.portal.products",
            "$<root>.portal.products.detail",
        ]
    );
}

#[tokio::test]
async fn test_navigating_up_exits_descendants_only() {
    let fixture = Fixture::new(false, RetainPolicy::WithCallback);

    let detail = fixture
        .navigate(0, None, "products.detail", route_params([("productId", "4")]))
        .await;
    let products = fixture
        .navigate(1, Some(&detail), "products", RouteParams::new())
        .await;

    assert_eq!(ids(products.exiting().unwrap()), ["$<root>.products.detail"]);
    assert_eq!(
        ids(products.retained().unwrap()),
        ["$<root>", "$<root>.products"]
    );
    assert!(products.entering().unwrap().is_empty());
}

#[tokio::test]
async fn test_run_and_commit_order() {
    let fixture = Fixture::new(false, RetainPolicy::WithCallback);

    let sign_in = fixture.navigate(0, None, "sign-in", RouteParams::new()).await;
    sign_in.finish().unwrap();
    fixture.log.take();

    let portal = fixture
        .navigate(1, Some(&sign_in), "portal.products.detail", detail("1", "1"))
        .await;
    let executed = fixture.log.take();

    assert_eq!(
        only(&executed, "create"),
        [
            "create portal",
            "create portal.products",
            "create portal.products.detail",
        ]
    );
    assert_eq!(
        only(&executed, "run"),
        [
            "run retaining root",
            "run entering_or_retaining root",
            "run entering portal",
            "run entering portal.products",
            "run entering portal.products.detail",
            "run exiting sign-in",
        ]
    );
    assert!(only(&executed, "commit").is_empty());

    portal.finish().unwrap();
    assert_eq!(
        fixture.log.take(),
        [
            "commit exiting sign-in",
            "commit retaining root",
            "commit entering_or_retaining root",
            "commit entering portal",
            "commit entering portal.products",
            "commit entering portal.products.detail",
        ]
    );
    assert_eq!(portal.finished().await, TransitionStatus::Finished);
    assert!(portal.from().is_some_and(|from| from.ptr_eq(&sign_in)));
    assert!(sign_in.active().unwrap()[1].instance().is_some());
}

#[tokio::test]
async fn test_scopes_follow_active_chain() {
    let fixture = Fixture::new(false, RetainPolicy::WithCallback);

    let sign_in = fixture.navigate(0, None, "sign-in", RouteParams::new()).await;
    let portal = fixture
        .navigate(1, Some(&sign_in), "portal.products", route_params([("tenantId", "1")]))
        .await;

    let root_state = &portal.retained().unwrap()[0];
    let entering = portal.entering().unwrap();
    let root_scope = root_state.services().unwrap();
    let portal_scope = entering[0].services().unwrap();
    let products_scope = entering[1].services().unwrap();

    assert!(root_scope.ptr_eq(&sign_in.entering().unwrap()[0].services().unwrap()));
    assert!(portal_scope.parent().unwrap().ptr_eq(&root_scope));
    assert!(products_scope.parent().unwrap().ptr_eq(&portal_scope));
    assert!(root_scope.parent().unwrap().ptr_eq(&fixture.context.services));

    let exiting_scope = portal.exiting().unwrap()[0].services().unwrap();
    assert!(exiting_scope.ptr_eq(&sign_in.entering().unwrap()[1].services().unwrap()));
}

#[tokio::test]
async fn test_observing_routable_survives_param_change() {
    let fixture = Fixture::new(true, RetainPolicy::WithCallback);

    let first = fixture
        .navigate(0, None, "portal.products.detail", detail("1", "1"))
        .await;
    let second = fixture
        .navigate(1, Some(&first), "portal.products.detail", detail("2", "1"))
        .await;

    assert_eq!(
        ids(second.retained().unwrap()),
        ["$<root>", "$<root>.portal"]
    );
    assert_eq!(
        ids(second.exiting().unwrap()),
        ["$<root>.portal.products.detail", "$<root>.portal.products"]
    );
    assert_eq!(
        ids(second.entering().unwrap()),
        ["$<root>.portal.products", "$<root>.portal.products.detail"]
    );
}

#[tokio::test]
async fn test_retain_policy_always_ignores_params() {
    let fixture = Fixture::new(false, RetainPolicy::Always);

    let first = fixture
        .navigate(0, None, "portal.products.detail", detail("1", "1"))
        .await;
    let second = fixture
        .navigate(1, Some(&first), "portal.products.detail", detail("2", "2"))
        .await;

    assert_eq!(second.retained().unwrap().len(), 4);
    assert!(second.entering().unwrap().is_empty());
    assert!(second.exiting().unwrap().is_empty());
}

#[tokio::test]
async fn test_retain_policy_never_overrides_observers() {
    let fixture = Fixture::new(true, RetainPolicy::Never);

    let first = fixture
        .navigate(0, None, "portal.products.detail", detail("1", "1"))
        .await;
    let second = fixture
        .navigate(1, Some(&first), "portal.products.detail", detail("2", "1"))
        .await;

    assert_eq!(ids(second.retained().unwrap()), ["$<root>"]);
    assert_eq!(second.exiting().unwrap().len(), 3);
}

#[tokio::test]
async fn test_suppressed_before_finish_never_commits() {
    let fixture = Fixture::new(false, RetainPolicy::WithCallback);

    let transition = fixture.navigate(0, None, "sign-in", RouteParams::new()).await;
    transition.suppress().unwrap();

    assert!(transition.finish().is_err());
    assert_eq!(transition.finished().await, TransitionStatus::Suppressed);
    assert!(only(&fixture.log.take(), "commit").is_empty());
}

struct Gated {
    gate: Arc<Notify>,
    log: Arc<Log>,
}

#[async_trait]
impl Routable for Gated {
    async fn on_entering(&self, _transition: &Transition) -> HookResult {
        self.log.push("run entering slow".into());
        self.gate.notified().await;
        let log = self.log.clone();
        commit(move || log.push("commit entering slow".into()))
    }
}

fn gated_fixture(gate: Arc<Notify>, deferred: bool) -> Fixture {
    let provider = if deferred {
        RoutableProvider::deferred(move || {
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Ok::<_, anyhow::Error>(RoutableModule::Class(Arc::new(
                    |services: &ServiceProvider| -> anyhow::Result<Arc<dyn Routable>> {
                        let log = services.require::<Log>()?;
                        log.push("create slow".into());
                        Ok(Arc::new(NoopRoutable))
                    },
                )))
            }
        })
    } else {
        RoutableProvider::class(
            move |services: &ServiceProvider| -> anyhow::Result<Arc<dyn Routable>> {
                Ok(Arc::new(Gated {
                    gate: gate.clone(),
                    log: services.require::<Log>()?,
                }))
            },
        )
    };

    let root = RouteDeclaration::root(None, |b| {
        b.layout(Some("slow"), Some("/slow"), Some(provider), |b| {
            b.page("leaf", "/leaf", probe("leaf", false));
        });
    })
    .unwrap();

    let registry = RouteRegistry::new();
    registry.start(&root).unwrap();
    let mut services = ServiceCollection::new();
    services.insert(Log::default());
    let services = services.build();
    let log = services.require::<Log>().unwrap();

    Fixture {
        registry,
        context: TransitionContext::new(services),
        log,
    }
}

#[tokio::test]
async fn test_suppressed_while_executing_stops_hooks() {
    let gate = Arc::new(Notify::new());
    let fixture = gated_fixture(gate.clone(), false);
    let controller = fixture.controller(0, None, "slow.leaf", RouteParams::new());

    let (result, ()) = tokio::join!(controller.execute(), async {
        while controller.status() != TransitionStatus::Executing {
            tokio::task::yield_now().await;
        }
        controller.suppress().unwrap();
        gate.notify_one();
    });

    result.unwrap();
    assert_eq!(controller.status(), TransitionStatus::Suppressed);
    let log = fixture.log.take();
    assert!(log.contains(&"run entering slow".to_string()));
    assert!(only(&log, "run entering leaf").is_empty());
    assert!(controller.finish().is_err());
    assert!(only(&fixture.log.take(), "commit").is_empty());
}

#[tokio::test]
async fn test_suppressed_while_loading_constructs_nothing() {
    let gate = Arc::new(Notify::new());
    let fixture = gated_fixture(gate.clone(), true);
    let controller = fixture.controller(0, None, "slow.leaf", RouteParams::new());

    let (result, ()) = tokio::join!(controller.execute(), async {
        while controller.status() != TransitionStatus::Loading {
            tokio::task::yield_now().await;
        }
        controller.suppress().unwrap();
        gate.notify_one();
    });

    result.unwrap();
    assert!(fixture.log.take().is_empty());
    assert!(matches!(
        controller.entering(),
        Err(TransitionError::Loading("entering"))
    ));
    assert_eq!(controller.finished().await, TransitionStatus::Suppressed);
}

#[derive(Default)]
struct Collected(Mutex<Vec<String>>);

impl DiagnosticsService for Collected {
    fn error(&self, error: &anyhow::Error) {
        self.0.lock().push(format!("{error:#}"));
    }

    fn fatal(&self, error: &anyhow::Error) {
        self.0.lock().push(format!("fatal: {error:#}"));
    }
}

struct Broken;

#[async_trait]
impl Routable for Broken {
    async fn on_entering(&self, _transition: &Transition) -> HookResult {
        anyhow::bail!("boom")
    }
}

#[tokio::test]
async fn test_hook_error_fails_transition() {
    let root = RouteDeclaration::root(None, |b| {
        b.page(
            "broken",
            "/broken",
            Some(RoutableProvider::class(
                |_: &ServiceProvider| -> anyhow::Result<Arc<dyn Routable>> { Ok(Arc::new(Broken)) },
            )),
        );
    })
    .unwrap();
    let registry = RouteRegistry::new();
    registry.start(&root).unwrap();

    let diagnostics = Arc::new(Collected::default());
    let controller = TransitionController::new(
        TransitionId(1),
        None,
        registry.get_by_name("broken").unwrap(),
        RouteParams::new(),
        RouteData::new(),
        TransitionContext::default().with_diagnostics(diagnostics.clone()),
    );

    let err = controller.execute().await.unwrap_err();
    assert!(matches!(
        &err,
        TransitionError::Hook { hook: "on_entering", route, .. } if route == "$<root>.broken"
    ));
    assert_eq!(controller.status(), TransitionStatus::Executing);

    controller.fail(err.into()).unwrap();
    assert_eq!(controller.finished().await, TransitionStatus::Failed);
    assert!(controller.finish().is_err());
    assert!(controller.fail(anyhow::anyhow!("again")).is_err());

    let reported = diagnostics.0.lock().clone();
    assert_eq!(reported.len(), 1);
    assert!(reported[0].contains("on_entering"));
    assert!(reported[0].ends_with("boom"));
}

#[tokio::test]
async fn test_provider_and_construction_errors() {
    let root = RouteDeclaration::root(None, |b| {
        b.page(
            "missing",
            "/missing",
            Some(RoutableProvider::deferred(|| async {
                Err::<RoutableModule, _>(anyhow::anyhow!("chunk failed to load"))
            })),
        )
        .page(
            "unbuildable",
            "/unbuildable",
            Some(RoutableProvider::class(
                |services: &ServiceProvider| -> anyhow::Result<Arc<dyn Routable>> {
                    services.require::<Log>()?;
                    Ok(Arc::new(NoopRoutable))
                },
            )),
        );
    })
    .unwrap();
    let registry = RouteRegistry::new();
    registry.start(&root).unwrap();

    let to = |name: &str| {
        TransitionController::new(
            TransitionId(1),
            None,
            registry.get_by_name(name).unwrap(),
            RouteParams::new(),
            RouteData::new(),
            TransitionContext::default(),
        )
    };

    let missing = to("missing");
    assert!(matches!(
        missing.execute().await,
        Err(TransitionError::Resolve { route, .. }) if route == "$<root>.missing"
    ));

    let unbuildable = to("unbuildable");
    assert!(matches!(
        unbuildable.execute().await,
        Err(TransitionError::Construct { route, .. }) if route == "$<root>.unbuildable"
    ));
}

#[tokio::test]
async fn test_execute_twice_is_rejected() {
    let fixture = Fixture::new(false, RetainPolicy::WithCallback);
    let transition = fixture.navigate(0, None, "sign-in", RouteParams::new()).await;

    assert!(matches!(
        transition.execute().await,
        Err(TransitionError::InvalidStatus {
            action: "execute",
            status: TransitionStatus::Executed
        })
    ));
}

#[derive(Default)]
struct Interruption {
    controller: Mutex<Option<Arc<TransitionController>>>,
    outcomes: Mutex<Vec<Result<(), TransitionError>>>,
}

/// Commits by trying to stop its own transition.
struct Interrupting(Arc<Interruption>);

#[async_trait]
impl Routable for Interrupting {
    async fn on_entering(&self, _transition: &Transition) -> HookResult {
        let interruption = self.0.clone();
        commit(move || {
            let Some(controller) = interruption.controller.lock().take() else {
                return;
            };
            let suppressed = controller.suppress();
            let failed = controller.fail(anyhow::anyhow!("too late"));
            interruption.outcomes.lock().extend([suppressed, failed]);
        })
    }
}

#[tokio::test]
async fn test_committing_transition_cannot_be_stopped() {
    let interruption = Arc::new(Interruption::default());
    let shared = interruption.clone();
    let provider = RoutableProvider::class(
        move |_: &ServiceProvider| -> anyhow::Result<Arc<dyn Routable>> {
            Ok(Arc::new(Interrupting(shared.clone())))
        },
    );
    let root = RouteDeclaration::root(None, |b| {
        b.page("checkout", "/checkout", Some(provider));
    })
    .unwrap();
    let registry = RouteRegistry::new();
    registry.start(&root).unwrap();

    let diagnostics = Arc::new(Collected::default());
    let controller = Arc::new(TransitionController::new(
        TransitionId(1),
        None,
        registry.get_by_name("checkout").unwrap(),
        RouteParams::new(),
        RouteData::new(),
        TransitionContext::default().with_diagnostics(diagnostics.clone()),
    ));
    *interruption.controller.lock() = Some(controller.clone());

    controller.execute().await.unwrap();
    controller.finish().unwrap();

    let outcomes = std::mem::take(&mut *interruption.outcomes.lock());
    assert_eq!(outcomes.len(), 2);
    assert!(matches!(
        outcomes[0],
        Err(TransitionError::InvalidStatus {
            action: "suppress",
            status: TransitionStatus::Committing
        })
    ));
    assert!(matches!(
        outcomes[1],
        Err(TransitionError::InvalidStatus {
            action: "fail",
            status: TransitionStatus::Committing
        })
    ));
    assert_eq!(controller.finished().await, TransitionStatus::Finished);
    assert!(diagnostics.0.lock().is_empty());
}

#[tokio::test]
async fn test_commit_refusal_is_fatal() {
    let diagnostics = Arc::new(Collected::default());
    let mut fixture = Fixture::new(false, RetainPolicy::WithCallback);
    fixture.context = fixture.context.clone().with_diagnostics(diagnostics.clone());

    let transition = fixture.navigate(0, None, "sign-in", RouteParams::new()).await;
    // Committed out of band, so finishing finds it already finished.
    transition.entering().unwrap()[1].commit().unwrap();

    let err = transition.finish().unwrap_err();
    assert!(matches!(
        err,
        TransitionError::State(StateError::Ordering { action: "commit", .. })
    ));
    assert_eq!(transition.finished().await, TransitionStatus::Failed);
    assert!(transition.suppress().is_err());

    let reported = diagnostics.0.lock().clone();
    assert_eq!(
        reported,
        ["fatal: Attempt to commit state of route '$<root>.sign-in' while it is finished"]
    );
}

/// Layout that only cares about being retained.
struct Tenant {
    log: Arc<Log>,
}

impl Routable for Tenant {
    fn retaining(&self) -> Option<&dyn RetainingHooks> {
        Some(self)
    }
}

#[async_trait]
impl RetainingHooks for Tenant {
    async fn on_retaining(&self, transition: &Transition) -> HookResult {
        let tenant = transition.to_params().get("tenantId").cloned();
        let log = self.log.clone();
        commit(move || log.push(format!("switch tenant {}", tenant.unwrap_or_default())))
    }
}

#[tokio::test]
async fn test_retaining_hook_keeps_layout_across_param_change() {
    let tenant = RoutableProvider::class(
        |services: &ServiceProvider| -> anyhow::Result<Arc<dyn Routable>> {
            let log = services.require::<Log>()?;
            log.push("create tenant".into());
            Ok(Arc::new(Tenant { log }))
        },
    );
    let root = RouteDeclaration::root(None, |b| {
        b.layout(Some("t"), Some("/t/:tenantId"), Some(tenant), |b| {
            b.page("leaf", "/leaf", probe("leaf", false));
        });
    })
    .unwrap();
    let registry = RouteRegistry::new();
    registry.start(&root).unwrap();
    let mut services = ServiceCollection::new();
    services.insert(Log::default());
    let services = services.build();
    let log = services.require::<Log>().unwrap();
    let fixture = Fixture {
        registry,
        context: TransitionContext::new(services),
        log,
    };

    let first = fixture
        .navigate(0, None, "t.leaf", route_params([("tenantId", "1")]))
        .await;
    first.finish().unwrap();
    fixture.log.take();

    let second = fixture
        .navigate(1, Some(&first), "t.leaf", route_params([("tenantId", "2")]))
        .await;
    assert_eq!(ids(second.exiting().unwrap()), ["$<root>.t.leaf"]);
    assert_eq!(ids(second.retained().unwrap()), ["$<root>", "$<root>.t"]);
    assert_eq!(ids(second.entering().unwrap()), ["$<root>.t.leaf"]);

    second.finish().unwrap();
    let log = fixture.log.take();
    assert!(only(&log, "create tenant").is_empty());
    assert_eq!(only(&log, "switch tenant"), ["switch tenant 2"]);
}
