use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main application configuration with strongly-typed global sections
/// and a flexible per-module configuration bag.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Host application identity and working directory.
    pub app: AppSection,
    /// Logging configuration (optional, uses defaults if None).
    pub logging: Option<LoggingConfig>,
    /// Per-module configuration bag: module_name → arbitrary JSON/YAML value.
    #[serde(default)]
    pub modules: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppSection {
    /// Application name reported to modules.
    pub name: String,
    /// Stable instance identifier. Empty means "derive from the app name".
    #[serde(default)]
    pub instance_id: String,
    /// Application version reported to modules.
    #[serde(default)]
    pub version: String,
    /// Working directory for logs and module state. Will be normalized to
    /// an absolute path; empty means the platform default.
    #[serde(default)]
    pub home_dir: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "modforge".to_string(),
            instance_id: String::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            home_dir: String::new(),
        }
    }
}

/// Logging configuration for the console sink and an optional rotating file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// "trace" | "debug" | "info" | "warn" | "error" | "off"
    pub console_level: String,
    /// Relative paths resolve against `app.home_dir`. Empty disables the file sink.
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub file_level: String,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
    #[serde(default)]
    pub max_backups: Option<usize>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            console_level: "info".to_string(),
            file: "logs/modforge.log".to_string(),
            file_level: "debug".to_string(),
            max_size_mb: Some(100),
            max_backups: Some(3),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            logging: Some(LoggingConfig::default()),
            modules: HashMap::new(),
        }
    }
}

/// CLI arguments that flow into the layered config merge.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub print_config: bool,
    pub verbose: u8,
}

impl AppConfig {
    /// Load configuration with layered loading: defaults → YAML file → environment
    /// variables. Also normalizes `app.home_dir` into an absolute path and creates
    /// the directory.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        // Start from a minimal base where optional sections are None, so they
        // remain None unless explicitly provided by YAML/ENV.
        let base = AppConfig {
            app: AppSection::default(),
            logging: None,
            modules: HashMap::new(),
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(base))
            .merge(Yaml::file(config_path.as_ref()))
            // Example: MODFORGE__APP__NAME=demo maps to app.name
            .merge(Env::prefixed("MODFORGE__").split("__"));

        let mut config: AppConfig = figment
            .extract()
            .context("failed to extract config from figment")?;

        normalize_home_dir_inplace(&mut config.app).context("failed to resolve app.home_dir")?;

        Ok(config)
    }

    /// Load from the given path, or fall back to pure defaults when no path
    /// is provided.
    pub fn load_or_default(config_path: Option<&Path>) -> Result<Self> {
        match config_path {
            Some(p) => Self::load_layered(p),
            None => {
                let mut config = Self::default();
                normalize_home_dir_inplace(&mut config.app)
                    .context("failed to resolve app.home_dir")?;
                Ok(config)
            }
        }
    }

    /// Apply CLI overrides on top of the layered result.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if args.verbose > 0 {
            let level = match args.verbose {
                1 => "info",
                2 => "debug",
                _ => "trace",
            };
            let logging = self.logging.get_or_insert_with(LoggingConfig::default);
            logging.console_level = level.to_string();
        }
    }

    /// Render the effective configuration as YAML (for `--print-config`).
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("failed to serialize config to YAML")
    }
}

/// Resolve `app.home_dir` to an absolute path and create it.
///
/// Empty means the platform default: `$HOME/.modforge` on Unix/macOS,
/// `%APPDATA%\modforge` on Windows.
fn normalize_home_dir_inplace(app: &mut AppSection) -> Result<()> {
    let resolved: PathBuf = if app.home_dir.trim().is_empty() {
        default_home_dir()?
    } else {
        let p = PathBuf::from(&app.home_dir);
        if p.is_absolute() {
            p
        } else {
            std::env::current_dir()
                .context("failed to read current directory")?
                .join(p)
        }
    };

    std::fs::create_dir_all(&resolved)
        .with_context(|| format!("failed to create home dir {}", resolved.display()))?;
    app.home_dir = resolved.to_string_lossy().to_string();
    Ok(())
}

#[cfg(unix)]
fn default_home_dir() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".modforge"))
}

#[cfg(not(unix))]
fn default_home_dir() -> Result<PathBuf> {
    let appdata = std::env::var_os("APPDATA").context("APPDATA is not set")?;
    Ok(PathBuf::from(appdata).join("modforge"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_have_logging_section() {
        let cfg = AppConfig::default();
        let logging = cfg.logging.expect("default logging");
        assert_eq!(logging.console_level, "info");
        assert!(!logging.file.is_empty());
    }

    #[test]
    fn yaml_layer_overrides_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let parent = f.path().parent().unwrap().to_path_buf();
        writeln!(
            f,
            "app:\n  name: demo\n  home_dir: {}\nmodules:\n  heartbeat:\n    interval_secs: 3\n",
            parent.display()
        )
        .unwrap();

        let cfg = AppConfig::load_layered(f.path()).unwrap();
        assert_eq!(cfg.app.name, "demo");
        assert_eq!(
            cfg.modules["heartbeat"]["interval_secs"],
            serde_json::json!(3)
        );
    }

    #[test]
    fn verbose_flag_raises_console_level() {
        let mut cfg = AppConfig::default();
        cfg.apply_cli_overrides(&CliArgs {
            verbose: 2,
            ..Default::default()
        });
        assert_eq!(cfg.logging.unwrap().console_level, "debug");
    }

    #[test]
    fn to_yaml_round_trips() {
        let cfg = AppConfig::default();
        let yaml = cfg.to_yaml().unwrap();
        assert!(yaml.contains("modforge"));
    }
}
