//! Full-cycle runner.
//!
//! Thin wrapper around [`ModuleHost`] that wires up the shutdown signal,
//! drives resolve → build → start, waits for cancellation, then runs the
//! reverse-order shutdown pass.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio_util::sync::CancellationToken;

use crate::context::{AppInfo, ConfigProvider};
use crate::contracts::ModuleRef;
use crate::runtime::ModuleHost;

/// How the runtime should decide when to stop.
pub enum ShutdownOptions {
    /// Listen for OS signals (Ctrl+C / SIGTERM).
    Signals,
    /// An external `CancellationToken` controls the lifecycle.
    Token(CancellationToken),
    /// An arbitrary future; when it completes, we initiate shutdown.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

/// Options for running the full cycle.
pub struct BootOptions {
    /// Host application identity, opaque to the engine.
    pub app: AppInfo,
    /// Provider of module config sections (raw JSON by module name).
    pub modules_cfg: Arc<dyn ConfigProvider>,
    /// Shutdown strategy.
    pub shutdown: ShutdownOptions,
}

/// Full cycle: resolve → configure → initialize → application → wait → shutdown.
pub async fn run(roots: Vec<ModuleRef>, opts: BootOptions) -> anyhow::Result<()> {
    let cancel = match &opts.shutdown {
        ShutdownOptions::Token(t) => t.clone(),
        _ => CancellationToken::new(),
    };

    match opts.shutdown {
        ShutdownOptions::Signals => {
            let c = cancel.clone();
            tokio::spawn(async move {
                match modforge_host::signals::wait_for_shutdown().await {
                    Ok(()) => {
                        tracing::info!("shutdown: signal received");
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "shutdown: primary waiter failed; falling back to ctrl_c()"
                        );
                        let _ = tokio::signal::ctrl_c().await;
                    }
                }
                c.cancel();
            });
        }
        ShutdownOptions::Future(waiter) => {
            let c = cancel.clone();
            tokio::spawn(async move {
                waiter.await;
                tracing::info!("shutdown: external future completed");
                c.cancel();
            });
        }
        ShutdownOptions::Token(_) => {
            tracing::info!("shutdown: external token will control lifecycle");
        }
    }

    let mut host = ModuleHost::new(roots, opts.app, opts.modules_cfg, cancel.clone())?;
    host.build().await?;
    host.start().await?;
    tracing::info!(app = %host.app().name, "application ready");

    cancel.cancelled().await;

    host.shutdown().await;
    Ok(())
}
