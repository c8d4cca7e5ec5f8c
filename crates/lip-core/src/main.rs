//! lip command line front end

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use url::Url;

use lip_core::config::{self, RuntimeConfig};
use lip_core::migration::{platform, MigrationContext, Migrator};
use lip_core::module::{self, ModuleProxy};
use lip_core::{CacheLayout, LockGraph, PackageLock, ParseContext, Version};

#[derive(Parser)]
#[command(name = "lip")]
#[command(about = "lip package manager", long_about = None)]
#[command(version)]
struct Cli {
    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Runtime config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a manifest migrated to the current format
    Migrate {
        /// Manifest file (tooth.json)
        file: PathBuf,
        /// Platform of the placeholder variant
        #[arg(long)]
        platform: Option<String>,
    },
    /// List installed packages nothing explicitly installed depends on
    Unnecessary {
        /// Lock file (tooth_lock.json)
        lock: PathBuf,
        #[arg(long)]
        platform: Option<String>,
    },
    /// List installed packages in install order
    Order {
        lock: PathBuf,
        #[arg(long)]
        platform: Option<String>,
    },
    /// Print the escaped module path and, with a version, the proxy archive URL
    Escape {
        /// Module path
        path: String,
        #[arg(long)]
        version: Option<String>,
    },
    /// Print the cache location of a download
    CachePath { url: Url },
    /// Print the effective runtime configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("LIP_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let runtime_config = RuntimeConfig::load(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;

    match cli.command {
        Commands::Migrate { file, platform } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let migrator = Migrator::new(MigrationContext {
                host_platform: platform_or_host(platform),
            });
            let manifest = migrator
                .load_manifest(&text)
                .with_context(|| format!("failed to migrate {}", file.display()))?;
            println!("{}", manifest.to_json_string()?);
        }
        Commands::Unnecessary { lock, platform } => {
            let platform = platform_or_host(platform);
            let lock = read_lock(&lock, &platform)?;
            for id in LockGraph::new(&lock, &platform).unnecessary() {
                println!("{id}");
            }
        }
        Commands::Order { lock, platform } => {
            let platform = platform_or_host(platform);
            let lock = read_lock(&lock, &platform)?;
            for package in LockGraph::new(&lock, &platform).topo_sort()? {
                println!("{}", package.specifier());
            }
        }
        Commands::Escape { path, version } => {
            println!("{}", module::escape_path(&path)?);
            if let Some(version) = version {
                let version = Version::parse(&version)?;
                let Some(base) = runtime_config.go_module_proxies.first() else {
                    bail!("no Go module proxy configured");
                };
                let proxy = ModuleProxy::new(base.clone())?;
                println!("{}", proxy.zip_url(&path, &version)?);
            }
        }
        Commands::CachePath { url } => {
            let layout = CacheLayout::new(&runtime_config.cache);
            println!("{}", layout.download_path(&url).display());
        }
        Commands::Config => {
            print!("{}", runtime_config.to_toml_string()?);
        }
    }

    Ok(())
}

fn platform_or_host(platform: Option<String>) -> String {
    platform.unwrap_or_else(platform::host_platform)
}

fn read_lock(path: &Path, platform: &str) -> anyhow::Result<PackageLock> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let ctx = ParseContext {
        host_platform: platform.to_string(),
    };
    PackageLock::from_json_str_with(&text, &ctx)
        .with_context(|| format!("failed to parse {}", path.display()))
}
