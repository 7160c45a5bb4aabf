//! End-to-end lifecycle tests: full builds over purpose-built modules.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use modforge::{
    async_trait, AppCtx, AppInfo, BootOptions, BuildError, BuildState, CancellationToken,
    ConfigCtx, ConfigProvider, Discovery, InitCtx, Module, ModuleHost, ModuleRef, NoConfig, Phase,
    ShutdownOptions,
};

fn record(log: &Mutex<Vec<String>>, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

fn entries(log: &Mutex<Vec<String>>) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn index_of(entries: &[String], needle: &str) -> usize {
    entries
        .iter()
        .position(|e| e == needle)
        .unwrap_or_else(|| panic!("missing entry '{needle}' in {entries:?}"))
}

fn test_host(roots: Vec<ModuleRef>) -> Result<ModuleHost, BuildError> {
    ModuleHost::new(
        roots,
        AppInfo::named("lifecycle-tests"),
        Arc::new(NoConfig),
        CancellationToken::new(),
    )
}

#[tokio::test]
async fn build_order_places_dependencies_first() {
    #[derive(Default)]
    struct Storage;
    impl Module for Storage {}

    #[derive(Default)]
    struct Outbox;
    impl Module for Outbox {
        fn declare(&mut self, scope: &mut Discovery) {
            scope.depends_on::<Storage>();
        }
    }

    #[derive(Default)]
    struct Api;
    impl Module for Api {
        fn declare(&mut self, scope: &mut Discovery) {
            scope.depends_on::<Outbox>();
            scope.depends_on::<Storage>();
        }
    }

    let host = test_host(vec![ModuleRef::of::<Api>()]).unwrap();
    let order = host.module_names();
    let pos = |name| order.iter().position(|&n| n == name).unwrap();
    assert!(pos("Storage") < pos("Outbox"));
    assert!(pos("Outbox") < pos("Api"));
}

#[tokio::test]
async fn dependent_configure_waits_for_dependency_completion() {
    static LOG: Mutex<Vec<String>> = Mutex::new(Vec::new());

    #[derive(Default)]
    struct Base;
    #[async_trait]
    impl Module for Base {
        async fn configure(
            &self,
            _ctx: &mut ConfigCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            record(&LOG, "Base:configure:start");
            // Suspend mid-hook; the orchestrator must still not start Leaf.
            tokio::task::yield_now().await;
            record(&LOG, "Base:configure:end");
            Ok(())
        }
    }

    #[derive(Default)]
    struct Leaf;
    #[async_trait]
    impl Module for Leaf {
        fn declare(&mut self, scope: &mut Discovery) {
            scope.depends_on::<Base>();
        }

        async fn configure(
            &self,
            _ctx: &mut ConfigCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            record(&LOG, "Leaf:configure:start");
            Ok(())
        }
    }

    let mut host = test_host(vec![ModuleRef::of::<Leaf>()]).unwrap();
    host.build().await.unwrap();

    let log = entries(&LOG);
    assert!(index_of(&log, "Base:configure:end") < index_of(&log, "Leaf:configure:start"));
}

#[tokio::test]
async fn phases_form_a_barrier_across_modules() {
    static LOG: Mutex<Vec<String>> = Mutex::new(Vec::new());

    macro_rules! phased_module {
        ($name:ident) => {
            #[derive(Default)]
            struct $name;
            #[async_trait]
            impl Module for $name {
                async fn post_configure(
                    &self,
                    _ctx: &mut ConfigCtx<'_>,
                    _cancel: CancellationToken,
                ) -> anyhow::Result<()> {
                    record(&LOG, concat!(stringify!($name), ":post_configure"));
                    Ok(())
                }

                async fn pre_initialize(
                    &self,
                    _ctx: &InitCtx<'_>,
                    _cancel: CancellationToken,
                ) -> anyhow::Result<()> {
                    record(&LOG, concat!(stringify!($name), ":pre_initialize"));
                    Ok(())
                }
            }
        };
    }

    phased_module!(First);
    phased_module!(Second);

    let mut host = test_host(vec![ModuleRef::of::<First>(), ModuleRef::of::<Second>()]).unwrap();
    host.build().await.unwrap();

    let log = entries(&LOG);
    let last_post_configure = log
        .iter()
        .rposition(|e| e.ends_with(":post_configure"))
        .unwrap();
    let first_pre_initialize = log
        .iter()
        .position(|e| e.ends_with(":pre_initialize"))
        .unwrap();
    assert!(
        last_post_configure < first_pre_initialize,
        "post_configure for all modules must finish before any pre_initialize: {log:?}"
    );
}

#[tokio::test]
async fn cycle_aborts_before_any_hook_runs_anywhere() {
    static LOG: Mutex<Vec<String>> = Mutex::new(Vec::new());

    #[derive(Default)]
    struct Ping;
    impl Module for Ping {
        fn declare(&mut self, scope: &mut Discovery) {
            scope.depends_on::<Pong>();
        }
    }

    #[derive(Default)]
    struct Pong;
    impl Module for Pong {
        fn declare(&mut self, scope: &mut Discovery) {
            scope.depends_on::<Ping>();
        }
    }

    // Unrelated to the cycle, but part of the same build.
    #[derive(Default)]
    struct Bystander;
    #[async_trait]
    impl Module for Bystander {
        async fn pre_configure(
            &self,
            _ctx: &mut ConfigCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            record(&LOG, "Bystander:pre_configure");
            Ok(())
        }
    }

    let err = test_host(vec![ModuleRef::of::<Bystander>(), ModuleRef::of::<Ping>()]).unwrap_err();
    match err {
        BuildError::CycleDetected { path } => {
            assert!(path.contains(&"Ping"));
            assert!(path.contains(&"Pong"));
            assert!(!path.contains(&"Bystander"));
        }
        other => panic!("expected CycleDetected, got: {other:?}"),
    }
    assert!(
        entries(&LOG).is_empty(),
        "no hook may run when resolution fails"
    );
}

#[tokio::test]
async fn shared_dependency_hooks_run_once_per_phase() {
    static LOG: Mutex<Vec<String>> = Mutex::new(Vec::new());

    #[derive(Default)]
    struct Shared;
    #[async_trait]
    impl Module for Shared {
        async fn configure(
            &self,
            _ctx: &mut ConfigCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            record(&LOG, "Shared:configure");
            Ok(())
        }

        async fn initialize(
            &self,
            _ctx: &InitCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            record(&LOG, "Shared:initialize");
            Ok(())
        }
    }

    #[derive(Default)]
    struct UserA;
    impl Module for UserA {
        fn declare(&mut self, scope: &mut Discovery) {
            scope.depends_on::<Shared>();
        }
    }

    #[derive(Default)]
    struct UserB;
    impl Module for UserB {
        fn declare(&mut self, scope: &mut Discovery) {
            scope.depends_on::<Shared>();
        }
    }

    let mut host = test_host(vec![ModuleRef::of::<UserA>(), ModuleRef::of::<UserB>()]).unwrap();
    host.build().await.unwrap();

    let log = entries(&LOG);
    assert_eq!(log.iter().filter(|e| *e == "Shared:configure").count(), 1);
    assert_eq!(log.iter().filter(|e| *e == "Shared:initialize").count(), 1);
}

#[tokio::test]
async fn repeated_builds_produce_identical_orders() {
    #[derive(Default)]
    struct Storage;
    impl Module for Storage {}

    #[derive(Default)]
    struct Bus;
    impl Module for Bus {
        fn declare(&mut self, scope: &mut Discovery) {
            scope.depends_on::<Storage>();
        }
    }

    #[derive(Default)]
    struct Ui;
    impl Module for Ui {
        fn declare(&mut self, scope: &mut Discovery) {
            scope.depends_on::<Bus>();
            scope.depends_on::<Storage>();
        }
    }

    #[derive(Default)]
    struct Workers;
    impl Module for Workers {
        fn declare(&mut self, scope: &mut Discovery) {
            scope.depends_on::<Storage>();
        }
    }

    let roots = || {
        vec![
            ModuleRef::of::<Ui>(),
            ModuleRef::of::<Workers>(),
            ModuleRef::of::<Bus>(),
        ]
    };

    let first = test_host(roots()).unwrap().module_names();
    for _ in 0..10 {
        assert_eq!(test_host(roots()).unwrap().module_names(), first);
    }
}

#[tokio::test]
async fn pre_configure_actions_apply_in_registration_order() {
    #[derive(Default)]
    struct PipelineOptions {
        stages: Vec<&'static str>,
    }

    struct FinalStages(Vec<&'static str>);

    // Owner of PipelineOptions; first in build order, yet it still observes
    // contributions from modules that run after it in earlier phases.
    #[derive(Default)]
    struct PipelineHost;
    #[async_trait]
    impl Module for PipelineHost {
        async fn post_configure(
            &self,
            ctx: &mut ConfigCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            let mut opts = PipelineOptions::default();
            ctx.consume_pre_configured::<PipelineOptions>().apply(&mut opts);
            ctx.register_service(FinalStages(opts.stages.clone()));
            ctx.configure_options(opts);
            Ok(())
        }
    }

    #[derive(Default)]
    struct AuthContributor;
    #[async_trait]
    impl Module for AuthContributor {
        async fn pre_configure(
            &self,
            ctx: &mut ConfigCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            ctx.pre_configure::<PipelineOptions>(|o| o.stages.push("auth"))?;
            Ok(())
        }
    }

    #[derive(Default)]
    struct TracingContributor;
    #[async_trait]
    impl Module for TracingContributor {
        async fn pre_configure(
            &self,
            ctx: &mut ConfigCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            ctx.pre_configure::<PipelineOptions>(|o| o.stages.push("tracing"))?;
            Ok(())
        }
    }

    let mut host = test_host(vec![
        ModuleRef::of::<PipelineHost>(),
        ModuleRef::of::<AuthContributor>(),
        ModuleRef::of::<TracingContributor>(),
    ])
    .unwrap();
    host.build().await.unwrap();

    let stages = host
        .services()
        .unwrap()
        .require::<FinalStages>()
        .unwrap();
    assert_eq!(stages.0, vec!["auth", "tracing"]);
}

#[tokio::test]
async fn post_configure_fault_blocks_pre_initialize_for_everyone() {
    static LOG: Mutex<Vec<String>> = Mutex::new(Vec::new());

    #[derive(Default)]
    struct Faulty;
    #[async_trait]
    impl Module for Faulty {
        async fn post_configure(
            &self,
            _ctx: &mut ConfigCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            anyhow::bail!("schema validation failed")
        }
    }

    #[derive(Default)]
    struct Healthy;
    #[async_trait]
    impl Module for Healthy {
        async fn pre_initialize(
            &self,
            _ctx: &InitCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            record(&LOG, "Healthy:pre_initialize");
            Ok(())
        }
    }

    let mut host = test_host(vec![ModuleRef::of::<Healthy>(), ModuleRef::of::<Faulty>()]).unwrap();
    let err = host.build().await.unwrap_err();

    match &err {
        BuildError::HookFault { module, phase, .. } => {
            assert_eq!(*module, "Faulty");
            assert_eq!(*phase, Phase::PostConfigure);
        }
        other => panic!("expected HookFault, got: {other:?}"),
    }
    assert!(entries(&LOG).is_empty(), "no later phase may start");
    assert_eq!(host.state(), BuildState::Failed);
}

#[tokio::test]
async fn pre_configure_after_consumption_is_flagged() {
    #[derive(Default)]
    struct CacheOptions {
        capacity: usize,
    }

    #[derive(Default)]
    struct CacheOwner;
    #[async_trait]
    impl Module for CacheOwner {
        async fn configure(
            &self,
            ctx: &mut ConfigCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            let mut opts = CacheOptions::default();
            ctx.consume_pre_configured::<CacheOptions>().apply(&mut opts);
            ctx.configure_options(opts);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Latecomer;
    #[async_trait]
    impl Module for Latecomer {
        fn declare(&mut self, scope: &mut Discovery) {
            scope.depends_on::<CacheOwner>();
        }

        async fn configure(
            &self,
            ctx: &mut ConfigCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            // Runs after CacheOwner in the same phase; the actions are gone.
            ctx.pre_configure::<CacheOptions>(|o| o.capacity = 64)?;
            Ok(())
        }
    }

    let mut host = test_host(vec![ModuleRef::of::<Latecomer>()]).unwrap();
    let err = host.build().await.unwrap_err();

    match &err {
        BuildError::HookFault { module, source, .. } => {
            assert_eq!(*module, "Latecomer");
            let flagged = source
                .downcast_ref::<BuildError>()
                .map(|e| matches!(e, BuildError::LatePreConfigure { .. }))
                .unwrap_or(false);
            assert!(flagged, "expected LatePreConfigure cause, got: {source:?}");
        }
        other => panic!("expected HookFault, got: {other:?}"),
    }
}

#[tokio::test]
async fn nested_module_receives_every_phase() {
    static LOG: Mutex<Vec<String>> = Mutex::new(Vec::new());

    #[derive(Default)]
    struct StatusWidget {
        label: String,
    }
    #[async_trait]
    impl Module for StatusWidget {
        async fn pre_configure(
            &self,
            _ctx: &mut ConfigCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            record(&LOG, format!("widget[{}]:pre_configure", self.label));
            Ok(())
        }

        async fn configure(
            &self,
            _ctx: &mut ConfigCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            record(&LOG, format!("widget[{}]:configure", self.label));
            Ok(())
        }

        async fn initialize(
            &self,
            _ctx: &InitCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            record(&LOG, format!("widget[{}]:initialize", self.label));
            Ok(())
        }

        async fn application(
            &self,
            _ctx: &AppCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            record(&LOG, format!("widget[{}]:application", self.label));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Shell;
    impl Module for Shell {
        fn declare(&mut self, scope: &mut Discovery) {
            scope.attach_with::<StatusWidget>(|w| w.label = "statusbar".to_string());
        }
    }

    let mut host = test_host(vec![ModuleRef::of::<Shell>()]).unwrap();
    assert!(host.module_names().contains(&"StatusWidget"));

    host.build().await.unwrap();
    host.start().await.unwrap();

    let log = entries(&LOG);
    for hook in [
        "widget[statusbar]:pre_configure",
        "widget[statusbar]:configure",
        "widget[statusbar]:initialize",
        "widget[statusbar]:application",
    ] {
        assert_eq!(
            log.iter().filter(|e| *e == hook).count(),
            1,
            "nested module must run '{hook}' exactly once: {log:?}"
        );
    }
}

#[tokio::test]
async fn pre_cancelled_token_stops_before_the_first_hook() {
    static LOG: Mutex<Vec<String>> = Mutex::new(Vec::new());

    #[derive(Default)]
    struct Untouched;
    #[async_trait]
    impl Module for Untouched {
        async fn pre_configure(
            &self,
            _ctx: &mut ConfigCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            record(&LOG, "Untouched:pre_configure");
            Ok(())
        }
    }

    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut host = ModuleHost::new(
        vec![ModuleRef::of::<Untouched>()],
        AppInfo::named("lifecycle-tests"),
        Arc::new(NoConfig),
        cancel,
    )
    .unwrap();

    let err = host.build().await.unwrap_err();
    match err {
        BuildError::Cancelled { phase, module } => {
            assert_eq!(phase, Phase::PreConfigure);
            assert_eq!(module, "Untouched");
        }
        other => panic!("expected Cancelled, got: {other:?}"),
    }
    assert!(entries(&LOG).is_empty());
}

#[tokio::test]
async fn cancellation_mid_phase_stops_following_modules() {
    static LOG: Mutex<Vec<String>> = Mutex::new(Vec::new());

    #[derive(Default)]
    struct Canceller;
    #[async_trait]
    impl Module for Canceller {
        async fn configure(
            &self,
            _ctx: &mut ConfigCtx<'_>,
            cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            record(&LOG, "Canceller:configure");
            cancel.cancel();
            Ok(())
        }
    }

    #[derive(Default)]
    struct NeverRuns;
    #[async_trait]
    impl Module for NeverRuns {
        fn declare(&mut self, scope: &mut Discovery) {
            scope.depends_on::<Canceller>();
        }

        async fn configure(
            &self,
            _ctx: &mut ConfigCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            record(&LOG, "NeverRuns:configure");
            Ok(())
        }
    }

    let mut host = test_host(vec![ModuleRef::of::<NeverRuns>()]).unwrap();
    let err = host.build().await.unwrap_err();

    match err {
        BuildError::Cancelled { phase, module } => {
            assert_eq!(phase, Phase::Configure);
            assert_eq!(module, "NeverRuns");
        }
        other => panic!("expected Cancelled, got: {other:?}"),
    }
    assert_eq!(entries(&LOG), vec!["Canceller:configure"]);
}

#[tokio::test]
async fn missing_options_fail_at_the_request_point() {
    struct ReplicationOptions;

    #[derive(Default)]
    struct Replicator;
    #[async_trait]
    impl Module for Replicator {
        async fn initialize(
            &self,
            ctx: &InitCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            let _opts = ctx.options::<ReplicationOptions>()?;
            Ok(())
        }
    }

    let mut host = test_host(vec![ModuleRef::of::<Replicator>()]).unwrap();
    let err = host.build().await.unwrap_err();

    match &err {
        BuildError::HookFault { module, phase, source } => {
            assert_eq!(*module, "Replicator");
            assert_eq!(*phase, Phase::Initialize);
            let missing = source
                .downcast_ref::<BuildError>()
                .map(|e| matches!(e, BuildError::MissingOptions { .. }))
                .unwrap_or(false);
            assert!(missing, "expected MissingOptions cause, got: {source:?}");
        }
        other => panic!("expected HookFault, got: {other:?}"),
    }
}

#[tokio::test]
async fn state_machine_tracks_the_build() {
    #[derive(Default)]
    struct Quiet;
    impl Module for Quiet {}

    let mut host = test_host(vec![ModuleRef::of::<Quiet>()]).unwrap();
    assert_eq!(host.state(), BuildState::Resolved);

    host.build().await.unwrap();
    assert_eq!(host.state(), BuildState::Initialized);

    // A second build is a state error, not a retry.
    assert!(matches!(
        host.build().await,
        Err(BuildError::InvalidState { .. })
    ));

    host.start().await.unwrap();
    assert_eq!(host.state(), BuildState::Ready);
}

#[tokio::test]
async fn full_cycle_run_with_token_shutdown() {
    static LOG: Mutex<Vec<String>> = Mutex::new(Vec::new());

    #[derive(Default)]
    struct Engine;
    #[async_trait]
    impl Module for Engine {
        async fn application(
            &self,
            _ctx: &AppCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            record(&LOG, "Engine:application");
            Ok(())
        }

        async fn shutdown(
            &self,
            _ctx: &AppCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            record(&LOG, "Engine:shutdown");
            Ok(())
        }
    }

    #[derive(Default)]
    struct Dashboard;
    #[async_trait]
    impl Module for Dashboard {
        fn declare(&mut self, scope: &mut Discovery) {
            scope.depends_on::<Engine>();
        }

        async fn shutdown(
            &self,
            _ctx: &AppCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            record(&LOG, "Dashboard:shutdown");
            Ok(())
        }
    }

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    modforge::run(
        vec![ModuleRef::of::<Dashboard>()],
        BootOptions {
            app: AppInfo::named("full-cycle").with_version("0.1.0"),
            modules_cfg: Arc::new(NoConfig),
            shutdown: ShutdownOptions::Token(token),
        },
    )
    .await
    .unwrap();

    let log = entries(&LOG);
    assert!(log.contains(&"Engine:application".to_string()));
    // Shutdown runs in reverse build order: Dashboard before Engine.
    assert!(index_of(&log, "Dashboard:shutdown") < index_of(&log, "Engine:shutdown"));
}

#[tokio::test]
async fn typed_module_config_sections_reach_hooks() {
    #[derive(Debug, serde::Deserialize)]
    struct HeartbeatSection {
        interval_secs: u64,
    }

    struct HeartbeatInterval(u64);

    struct OneSection(serde_json::Value);
    impl ConfigProvider for OneSection {
        fn module_config(&self, module_name: &str) -> Option<&serde_json::Value> {
            (module_name == "heartbeat").then_some(&self.0)
        }
    }

    #[derive(Default)]
    struct Heartbeat;
    #[async_trait]
    impl Module for Heartbeat {
        async fn configure(
            &self,
            ctx: &mut ConfigCtx<'_>,
            _cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            let section: HeartbeatSection = ctx.config_section("heartbeat")?;
            ctx.register_service(HeartbeatInterval(section.interval_secs));
            Ok(())
        }
    }

    let mut host = ModuleHost::new(
        vec![ModuleRef::of::<Heartbeat>()],
        AppInfo::named("configured"),
        Arc::new(OneSection(serde_json::json!({ "interval_secs": 30 }))),
        CancellationToken::new(),
    )
    .unwrap();
    host.build().await.unwrap();

    let interval = host
        .services()
        .unwrap()
        .require::<HeartbeatInterval>()
        .unwrap();
    assert_eq!(interval.0, 30);
}
