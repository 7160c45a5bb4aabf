//! Module host - orchestrates the full lifecycle over the resolved build order.
//!
//! Phase order: pre_configure → configure → post_configure → (registry
//! freeze) → pre_initialize → initialize → post_initialize →
//! pre_application → application → post_application. One hook at a time, in
//! build order; a fault aborts everything after it.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::context::{AppCtx, AppInfo, ConfigCtx, ConfigProvider, InitCtx};
use crate::contracts::ModuleRef;
use crate::error::BuildError;
use crate::graph::{ModuleGraph, ModuleNode};
use crate::lifecycle::{BuildState, Phase};
use crate::options::{OptionsStore, PreConfigureRegistry};
use crate::services::{ServiceRegistry, Services};

/// Owns the resolved modules and drives them through the phase sequence.
pub struct ModuleHost {
    app: AppInfo,
    config: Arc<dyn ConfigProvider>,
    cancel: CancellationToken,
    modules: Vec<ModuleNode>,
    state: BuildState,
    registry: ServiceRegistry,
    options: OptionsStore,
    pre_configured: PreConfigureRegistry,
    services: Option<Services>,
}

impl std::fmt::Debug for ModuleHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHost")
            .field("app", &self.app)
            .field("state", &self.state)
            .field("modules", &self.modules.len())
            .finish_non_exhaustive()
    }
}

impl ModuleHost {
    /// Resolve the module graph from the given roots.
    ///
    /// Runs discovery and the topological sort; no lifecycle hook is invoked.
    /// On success the host is in [`BuildState::Resolved`]; on failure no
    /// module has observed anything beyond its own `declare` step.
    pub fn new(
        roots: Vec<ModuleRef>,
        app: AppInfo,
        config: Arc<dyn ConfigProvider>,
        cancel: CancellationToken,
    ) -> Result<Self, BuildError> {
        tracing::info!(app = %app.name, roots = roots.len(), "resolving module graph");
        let graph = ModuleGraph::discover(&roots)?;
        let modules = graph.into_build_order()?;

        Ok(Self {
            app,
            config,
            cancel,
            modules,
            state: BuildState::Resolved,
            registry: ServiceRegistry::default(),
            options: OptionsStore::default(),
            pre_configured: PreConfigureRegistry::default(),
            services: None,
        })
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn app(&self) -> &AppInfo {
        &self.app
    }

    /// Module identities in build order.
    pub fn module_names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|n| n.key.name()).collect()
    }

    /// The frozen service locator; `None` until the configure phases complete.
    pub fn services(&self) -> Option<&Services> {
        self.services.as_ref()
    }

    /// Run the configure phases, freeze the registration surface, then run
    /// the initialize phases. Atomic: any fault or cancellation parks the
    /// host in [`BuildState::Failed`].
    pub async fn build(&mut self) -> Result<(), BuildError> {
        self.expect_state(BuildState::Resolved)?;

        self.state = BuildState::Configuring;
        if let Err(e) = self.run_configure_phases().await {
            self.state = BuildState::Failed;
            return Err(e);
        }
        self.state = BuildState::Configured;

        let services = std::mem::take(&mut self.registry).freeze();
        tracing::info!(services = services.len(), "service registry frozen");
        self.services = Some(services);

        self.state = BuildState::Initializing;
        if let Err(e) = self.run_init_phases().await {
            self.state = BuildState::Failed;
            return Err(e);
        }
        self.state = BuildState::Initialized;
        Ok(())
    }

    /// Run the application phases; on success the host is [`BuildState::Ready`]
    /// and the hosting application takes over its steady-state loop.
    pub async fn start(&mut self) -> Result<(), BuildError> {
        self.expect_state(BuildState::Initialized)?;

        self.state = BuildState::ApplicationWiring;
        if let Err(e) = self.run_application_phases().await {
            self.state = BuildState::Failed;
            return Err(e);
        }
        self.state = BuildState::Ready;
        Ok(())
    }

    /// Run the shutdown hooks in reverse build order. Failures are logged
    /// and do not stop the remaining hooks.
    pub async fn shutdown(&self) {
        let Some(services) = self.services.as_ref() else {
            return;
        };
        tracing::info!("running module shutdown hooks");
        for node in self.modules.iter().rev() {
            let ctx = AppCtx {
                app: &self.app,
                services,
                options: &self.options,
                config: self.config.as_ref(),
            };
            if let Err(error) = node.module.shutdown(&ctx, self.cancel.clone()).await {
                tracing::warn!(module = node.key.name(), error = %error, "module shutdown failed");
            }
        }
    }

    fn expect_state(&self, expected: BuildState) -> Result<(), BuildError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(BuildError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    async fn run_configure_phases(&mut self) -> Result<(), BuildError> {
        let cancel = self.cancel.clone();
        for phase in Phase::CONFIGURE {
            tracing::info!(phase = %phase, "phase starting");
            let mut ctx = ConfigCtx {
                app: &self.app,
                services: &mut self.registry,
                options: &mut self.options,
                pre_configured: &mut self.pre_configured,
                config: self.config.as_ref(),
            };
            for node in &self.modules {
                if cancel.is_cancelled() {
                    return Err(BuildError::Cancelled {
                        phase,
                        module: node.key.name(),
                    });
                }
                tracing::debug!(module = node.key.name(), phase = %phase, "running hook");
                let result = match phase {
                    Phase::PreConfigure => {
                        node.module.pre_configure(&mut ctx, cancel.clone()).await
                    }
                    Phase::Configure => node.module.configure(&mut ctx, cancel.clone()).await,
                    _ => node.module.post_configure(&mut ctx, cancel.clone()).await,
                };
                finish_hook(result, phase, node.key.name(), &cancel)?;
            }
        }
        Ok(())
    }

    async fn run_init_phases(&self) -> Result<(), BuildError> {
        let cancel = self.cancel.clone();
        let services = self.services.as_ref().ok_or(BuildError::InvalidState {
            expected: BuildState::Configured,
            actual: self.state,
        })?;
        for phase in Phase::INITIALIZE {
            tracing::info!(phase = %phase, "phase starting");
            let ctx = InitCtx {
                app: &self.app,
                services,
                options: &self.options,
                config: self.config.as_ref(),
            };
            for node in &self.modules {
                if cancel.is_cancelled() {
                    return Err(BuildError::Cancelled {
                        phase,
                        module: node.key.name(),
                    });
                }
                tracing::debug!(module = node.key.name(), phase = %phase, "running hook");
                let result = match phase {
                    Phase::PreInitialize => {
                        node.module.pre_initialize(&ctx, cancel.clone()).await
                    }
                    Phase::Initialize => node.module.initialize(&ctx, cancel.clone()).await,
                    _ => node.module.post_initialize(&ctx, cancel.clone()).await,
                };
                finish_hook(result, phase, node.key.name(), &cancel)?;
            }
        }
        Ok(())
    }

    async fn run_application_phases(&self) -> Result<(), BuildError> {
        let cancel = self.cancel.clone();
        let services = self.services.as_ref().ok_or(BuildError::InvalidState {
            expected: BuildState::Initialized,
            actual: self.state,
        })?;
        for phase in Phase::APPLICATION {
            tracing::info!(phase = %phase, "phase starting");
            let ctx = AppCtx {
                app: &self.app,
                services,
                options: &self.options,
                config: self.config.as_ref(),
            };
            for node in &self.modules {
                if cancel.is_cancelled() {
                    return Err(BuildError::Cancelled {
                        phase,
                        module: node.key.name(),
                    });
                }
                tracing::debug!(module = node.key.name(), phase = %phase, "running hook");
                let result = match phase {
                    Phase::PreApplication => {
                        node.module.pre_application(&ctx, cancel.clone()).await
                    }
                    Phase::Application => node.module.application(&ctx, cancel.clone()).await,
                    _ => node.module.post_application(&ctx, cancel.clone()).await,
                };
                finish_hook(result, phase, node.key.name(), &cancel)?;
            }
        }
        Ok(())
    }
}

/// A hook that errors after the token fired is cancellation propagation, not
/// a module fault.
fn finish_hook(
    result: anyhow::Result<()>,
    phase: Phase,
    module: &'static str,
    cancel: &CancellationToken,
) -> Result<(), BuildError> {
    match result {
        Ok(()) => Ok(()),
        Err(source) => {
            if cancel.is_cancelled() {
                tracing::info!(module, phase = %phase, "hook interrupted by cancellation");
                Err(BuildError::Cancelled { phase, module })
            } else {
                Err(BuildError::HookFault {
                    module,
                    phase,
                    source,
                })
            }
        }
    }
}
