//! Phase-scoped context objects.
//!
//! Each phase invocation gets its own context exposing only what that phase
//! is allowed to touch: a mutable registration surface during the configure
//! phases, a frozen service locator afterwards. Contexts are created and
//! discarded by the orchestrator; modules never hold onto them.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::error::BuildError;
use crate::options::{OptionsStore, PreConfigureRegistry, PreConfigured};
use crate::services::{ServiceRegistry, Services};

/// Provider of module config sections (raw JSON by module name).
pub trait ConfigProvider: Send + Sync {
    fn module_config(&self, module_name: &str) -> Option<&serde_json::Value>;
}

/// Provider with no sections at all (tests, embedders without config files).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConfig;

impl ConfigProvider for NoConfig {
    fn module_config(&self, _module_name: &str) -> Option<&serde_json::Value> {
        None
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration section for module '{0}'")]
    Missing(String),
    #[error("invalid configuration for module '{module}'")]
    Invalid {
        module: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Host-provided application parameters; opaque to the engine.
#[derive(Debug, Clone)]
pub struct AppInfo {
    pub name: String,
    pub instance_id: String,
    pub version: String,
}

impl AppInfo {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            instance_id: name.clone(),
            version: String::new(),
            name,
        }
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

fn extract_section<T: DeserializeOwned>(
    config: &dyn ConfigProvider,
    module_name: &str,
) -> Result<Option<T>, ConfigError> {
    match config.module_config(module_name) {
        None => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|source| ConfigError::Invalid {
                module: module_name.to_string(),
                source,
            }),
    }
}

/// Context for the configure-family phases: the mutable registration surface.
pub struct ConfigCtx<'a> {
    pub(crate) app: &'a AppInfo,
    pub(crate) services: &'a mut ServiceRegistry,
    pub(crate) options: &'a mut OptionsStore,
    pub(crate) pre_configured: &'a mut PreConfigureRegistry,
    pub(crate) config: &'a dyn ConfigProvider,
}

impl ConfigCtx<'_> {
    pub fn app(&self) -> &AppInfo {
        self.app
    }

    /// Register a service for the frozen locator later phases see.
    pub fn register_service<T: Send + Sync + 'static>(&mut self, service: T) {
        self.services.register(service);
    }

    pub fn register_service_arc<T: Send + Sync + 'static>(&mut self, service: Arc<T>) {
        self.services.register_arc(service);
    }

    /// Append a mutator for an options type owned by some other module.
    ///
    /// Fails with [`BuildError::LatePreConfigure`] if the owner already
    /// consumed the actions for `T`.
    pub fn pre_configure<T: 'static>(
        &mut self,
        action: impl FnOnce(&mut T) + Send + 'static,
    ) -> Result<(), BuildError> {
        self.pre_configured.register(action)
    }

    /// Take everything registered for `T` so far, in registration order.
    /// Intended to be called once, by the module that owns `T`.
    pub fn consume_pre_configured<T: 'static>(&mut self) -> PreConfigured<T> {
        self.pre_configured.consume::<T>()
    }

    /// Store the finalized options instance for `T`.
    pub fn configure_options<T: Send + Sync + 'static>(&mut self, value: T) {
        self.options.insert(value);
    }

    /// Require an already-configured options instance; typed not-found error
    /// if no module ever configured `T`.
    pub fn options<T: 'static>(&self) -> Result<&T, BuildError> {
        self.options.require::<T>()
    }

    pub fn try_options<T: 'static>(&self) -> Option<&T> {
        self.options.get::<T>()
    }

    /// Typed view of this module's config section.
    pub fn config_section<T: DeserializeOwned>(&self, module_name: &str) -> Result<T, ConfigError> {
        extract_section(self.config, module_name)?
            .ok_or_else(|| ConfigError::Missing(module_name.to_string()))
    }

    /// Typed view of this module's config section, defaulting when absent.
    pub fn config_section_or_default<T: DeserializeOwned + Default>(
        &self,
        module_name: &str,
    ) -> Result<T, ConfigError> {
        Ok(extract_section(self.config, module_name)?.unwrap_or_default())
    }
}

/// Context for the initialize-family phases: a resolved, read-only locator.
pub struct InitCtx<'a> {
    pub(crate) app: &'a AppInfo,
    pub(crate) services: &'a Services,
    pub(crate) options: &'a OptionsStore,
    pub(crate) config: &'a dyn ConfigProvider,
}

impl InitCtx<'_> {
    pub fn app(&self) -> &AppInfo {
        self.app
    }

    pub fn service<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, BuildError> {
        self.services.require::<T>()
    }

    pub fn try_service<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services.get::<T>()
    }

    pub fn options<T: 'static>(&self) -> Result<&T, BuildError> {
        self.options.require::<T>()
    }

    pub fn try_options<T: 'static>(&self) -> Option<&T> {
        self.options.get::<T>()
    }

    pub fn config_section<T: DeserializeOwned>(&self, module_name: &str) -> Result<T, ConfigError> {
        extract_section(self.config, module_name)?
            .ok_or_else(|| ConfigError::Missing(module_name.to_string()))
    }

    pub fn config_section_or_default<T: DeserializeOwned + Default>(
        &self,
        module_name: &str,
    ) -> Result<T, ConfigError> {
        Ok(extract_section(self.config, module_name)?.unwrap_or_default())
    }
}

/// Context for the application-family phases and the shutdown pass.
pub struct AppCtx<'a> {
    pub(crate) app: &'a AppInfo,
    pub(crate) services: &'a Services,
    pub(crate) options: &'a OptionsStore,
    pub(crate) config: &'a dyn ConfigProvider,
}

impl AppCtx<'_> {
    pub fn app(&self) -> &AppInfo {
        self.app
    }

    pub fn service<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, BuildError> {
        self.services.require::<T>()
    }

    pub fn try_service<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services.get::<T>()
    }

    pub fn options<T: 'static>(&self) -> Result<&T, BuildError> {
        self.options.require::<T>()
    }

    pub fn try_options<T: 'static>(&self) -> Option<&T> {
        self.options.get::<T>()
    }

    pub fn config_section<T: DeserializeOwned>(&self, module_name: &str) -> Result<T, ConfigError> {
        extract_section(self.config, module_name)?
            .ok_or_else(|| ConfigError::Missing(module_name.to_string()))
    }

    pub fn config_section_or_default<T: DeserializeOwned + Default>(
        &self,
        module_name: &str,
    ) -> Result<T, ConfigError> {
        Ok(extract_section(self.config, module_name)?.unwrap_or_default())
    }
}
