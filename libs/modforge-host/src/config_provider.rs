use crate::config::AppConfig;
use std::sync::Arc;

/// Configuration provider trait for modules.
pub trait ConfigProvider: Send + Sync {
    /// Get the configuration section for a specific module.
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value>;
}

/// Implementation of `ConfigProvider` backed by [`AppConfig`].
pub struct AppConfigProvider(Arc<AppConfig>);

impl AppConfigProvider {
    pub fn new(config: AppConfig) -> Self {
        Self(Arc::new(config))
    }

    pub fn from_arc(config: Arc<AppConfig>) -> Self {
        Self(config)
    }

    pub fn inner(&self) -> &AppConfig {
        &self.0
    }
}

impl ConfigProvider for AppConfigProvider {
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value> {
        self.0.modules.get(module_name)
    }
}
