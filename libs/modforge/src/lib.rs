//! # Modforge - Modular Application Bootstrap Engine
//!
//! Independently authored modules declare dependencies on one another; the
//! engine resolves them into a deterministic build order and drives every
//! module through the same lifecycle phases.
//!
//! - **Explicit**: dependencies are declared programmatically from the
//!   module's own `declare` step; no attribute scanning, no reflection.
//! - **Deterministic**: repeated builds from identical declarations produce
//!   identical build orders; ties fall back to first-discovery order.
//! - **Fail-fast**: cycles and factory failures abort before any hook runs;
//!   a hook fault aborts the current and all later phases.
//! - **Phase-based lifecycle**: configure → initialize → application, each
//!   split into pre/main/post, all cancellation-aware.
//!
//! ## Basic module
//!
//! ```rust,ignore
//! use modforge::{Discovery, Module};
//!
//! #[derive(Default)]
//! struct AuditModule;
//!
//! #[modforge::async_trait]
//! impl Module for AuditModule {
//!     fn declare(&mut self, scope: &mut Discovery) {
//!         scope.depends_on::<StorageModule>();
//!     }
//!
//!     async fn configure(
//!         &self,
//!         ctx: &mut modforge::ConfigCtx<'_>,
//!         _cancel: modforge::CancellationToken,
//!     ) -> anyhow::Result<()> {
//!         ctx.register_service(AuditLog::new());
//!         Ok(())
//!     }
//! }
//! ```
//!
//! ## Influencing options you do not own
//!
//! A module appends mutators with `ctx.pre_configure::<RetryOptions>(..)`;
//! the module that owns `RetryOptions` consumes and applies them, in
//! registration order, when it finalizes the instance:
//!
//! ```rust,ignore
//! let mut opts = RetryOptions::default();
//! ctx.consume_pre_configured::<RetryOptions>().apply(&mut opts);
//! ctx.configure_options(opts);
//! ```

pub use anyhow::Result;
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;

pub mod context;
pub mod contracts;
pub mod error;
mod graph;
pub mod lifecycle;
pub mod options;
pub mod runtime;
pub mod services;

pub use context::{AppCtx, AppInfo, ConfigCtx, ConfigError, ConfigProvider, InitCtx, NoConfig};
pub use contracts::{Discovery, Module, ModuleFactory, ModuleKey, ModuleRef};
pub use error::BuildError;
pub use lifecycle::{BuildState, Phase};
pub use options::PreConfigured;
pub use runtime::{run, BootOptions, ModuleHost, ShutdownOptions};
pub use services::{ServiceRegistry, Services};
