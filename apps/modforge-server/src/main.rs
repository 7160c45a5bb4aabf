use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use modforge_host::{AppConfig, AppConfigProvider, CliArgs, ConfigProvider};

use std::path::{Path, PathBuf};
use std::sync::Arc;

mod modules;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Adapter to make `AppConfigProvider` implement `modforge::ConfigProvider`.
struct ModforgeConfigAdapter(Arc<AppConfigProvider>);

impl modforge::ConfigProvider for ModforgeConfigAdapter {
    fn module_config(&self, module_name: &str) -> Option<&serde_json::Value> {
        self.0.get_module_config(module_name)
    }
}

use modforge::{AppInfo, BootOptions, ModuleRef, ShutdownOptions};

/// Modforge Server - modular application host
#[derive(Parser)]
#[command(name = "modforge-server")]
#[command(about = "Modforge Server - modular application host")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Layered config: defaults -> YAML (if provided) -> env (MODFORGE__*) -> CLI.
    // Also normalizes + creates app.home_dir.
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_default();
    modforge_host::logging::init_logging(&logging_config, Path::new(&config.app.home_dir));

    tracing::info!(app = %config.app.name, "Modforge Server starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config).await,
        Commands::Check => check_config(config).await,
    }
}

async fn run_server(config: AppConfig) -> Result<()> {
    tracing::info!("initializing modules…");

    let app = app_info(&config);

    // Bridge AppConfig into the engine's ConfigProvider (per-module JSON bag).
    let config_provider = Arc::new(ModforgeConfigAdapter(Arc::new(AppConfigProvider::new(
        config,
    ))));

    let roots = vec![ModuleRef::of::<modules::ServerModule>()];

    modforge::run(
        roots,
        BootOptions {
            app,
            modules_cfg: config_provider,
            shutdown: ShutdownOptions::Signals,
        },
    )
    .await
}

async fn check_config(config: AppConfig) -> Result<()> {
    tracing::info!("checking configuration…");
    // If load_or_default succeeded and home_dir normalized, we're good.
    println!("Configuration is valid");
    println!("{}", config.to_yaml()?);
    Ok(())
}

fn app_info(config: &AppConfig) -> AppInfo {
    let mut info = AppInfo::named(config.app.name.clone());
    if !config.app.instance_id.is_empty() {
        info = info.with_instance_id(config.app.instance_id.clone());
    }
    if !config.app.version.is_empty() {
        info = info.with_version(config.app.version.clone());
    }
    info
}
