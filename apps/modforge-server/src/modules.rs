//! In-tree modules for the demo server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use modforge::{AppCtx, CancellationToken, ConfigCtx, Discovery, Module};
use serde::Deserialize;
use tracing::{info, warn};

/// Process-wide runtime facts, registered once and read by everyone else.
pub struct RuntimeInfo {
    pub app_name: String,
    pub version: String,
    pub started_at: Instant,
}

#[derive(Default)]
pub struct RuntimeInfoModule;

#[async_trait]
impl Module for RuntimeInfoModule {
    async fn configure(
        &self,
        ctx: &mut ConfigCtx<'_>,
        _cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let app = ctx.app();
        ctx.register_service(RuntimeInfo {
            app_name: app.name.clone(),
            version: app.version.clone(),
            started_at: Instant::now(),
        });
        Ok(())
    }
}

/// Heartbeat cadence, owned by [`HeartbeatModule`] and open to pre-configure
/// contributions from other modules.
#[derive(Debug, Clone)]
pub struct HeartbeatOptions {
    pub interval_secs: u64,
}

impl Default for HeartbeatOptions {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

#[derive(Debug, Default, Deserialize)]
struct HeartbeatSection {
    interval_secs: Option<u64>,
}

/// Emits a periodic liveness line once the application is up.
#[derive(Default)]
pub struct HeartbeatModule;

#[async_trait]
impl Module for HeartbeatModule {
    fn declare(&mut self, scope: &mut Discovery) {
        scope.depends_on::<RuntimeInfoModule>();
    }

    async fn configure(
        &self,
        ctx: &mut ConfigCtx<'_>,
        _cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let section: HeartbeatSection = ctx.config_section_or_default("heartbeat")?;

        let mut opts = HeartbeatOptions::default();
        if let Some(secs) = section.interval_secs {
            opts.interval_secs = secs;
        }
        ctx.consume_pre_configured::<HeartbeatOptions>().apply(&mut opts);

        ctx.configure_options(opts);
        Ok(())
    }

    async fn application(
        &self,
        ctx: &AppCtx<'_>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let opts = ctx.options::<HeartbeatOptions>()?.clone();
        let runtime: Arc<RuntimeInfo> = ctx.service::<RuntimeInfo>()?;

        info!(interval_secs = opts.interval_secs, "heartbeat starting");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(opts.interval_secs));
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        info!(
                            app = %runtime.app_name,
                            uptime_secs = runtime.started_at.elapsed().as_secs(),
                            "heartbeat"
                        );
                    }
                }
            }
        });
        Ok(())
    }

    async fn shutdown(&self, _ctx: &AppCtx<'_>, _cancel: CancellationToken) -> anyhow::Result<()> {
        info!("heartbeat stopped");
        Ok(())
    }
}

/// Prints a startup banner; attached as a nested module by [`ServerModule`].
#[derive(Default)]
pub struct BannerModule {
    pub headline: String,
}

#[async_trait]
impl Module for BannerModule {
    async fn post_application(
        &self,
        ctx: &AppCtx<'_>,
        _cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let runtime = ctx.service::<RuntimeInfo>()?;
        info!(
            app = %runtime.app_name,
            version = %runtime.version,
            "{}",
            self.headline
        );
        Ok(())
    }
}

/// Root module: pulls in the rest and nudges the heartbeat cadence.
#[derive(Default)]
pub struct ServerModule;

#[async_trait]
impl Module for ServerModule {
    fn declare(&mut self, scope: &mut Discovery) {
        scope.depends_on::<RuntimeInfoModule>();
        scope.depends_on::<HeartbeatModule>();
        scope.attach_with::<BannerModule>(|b| b.headline = "modforge server ready".to_string());
    }

    async fn pre_configure(
        &self,
        ctx: &mut ConfigCtx<'_>,
        _cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        // Keep operator-provided cadences sane without owning the options.
        ctx.pre_configure::<HeartbeatOptions>(|opts| {
            if opts.interval_secs == 0 {
                warn!("heartbeat interval of 0s raised to 1s");
                opts.interval_secs = 1;
            }
        })?;
        Ok(())
    }
}
