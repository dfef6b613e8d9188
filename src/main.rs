use clap::{Parser, Subcommand};
use ovpn_updown::Config;
use ovpn_updown::firewall::table_name;
use ovpn_updown::session::EntitlementResolver;
use ovpn_updown::store::MysqlStore;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "ovpn-updown")]
#[command(about = "OpenVPN connect/disconnect hook for session admission and network access")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "./config.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Hook mode for OpenVPN integration
    ///
    /// Called by OpenVPN as its client-connect and client-disconnect script,
    /// with the client described in environment variables. Do not call this
    /// directly.
    Hook {
        /// Temporary file OpenVPN appends for client-connect; not used
        #[arg(hide = true)]
        dynamic_config: Option<PathBuf>,
    },
    /// Generate default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show the networks a client is entitled to
    Networks {
        /// Client certificate common name
        identity: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.command {
        Commands::Init { .. } => Config::default(),
        _ => match Config::load(&cli.config) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", cli.config.display(), e);
                std::process::exit(1);
            }
        },
    };

    init_logging(&config, cli.verbose)?;

    match cli.command {
        Commands::Hook { dynamic_config } => {
            if let Some(path) = dynamic_config {
                debug!("Ignoring dynamic config file {}", path.display());
            }
            match ovpn_updown::handle_hook_mode(&config).await {
                Ok(outcome) => {
                    info!("Hook completed: {:?}", outcome.state);
                }
                Err(e) => {
                    error!("Hook failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Init { force } => {
            write_default_config(&cli.config, force)?;
            println!("Created default config: {}", cli.config.display());
        }
        Commands::Networks { identity, json } => {
            show_networks(&config, &identity, json).await?;
        }
    }

    Ok(())
}

/// Log to stderr, or append to the configured log file
///
/// Hook output must stay off stdout, which OpenVPN does not read.
fn init_logging(config: &Config, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let directive = if verbose { "debug" } else { config.loglevel.as_str() };
    let builder = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_new(directive)?)
        .with_target(false);

    if config.logfile.trim().is_empty() {
        let subscriber = builder.with_writer(std::io::stderr).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.logfile)?;
        let subscriber = builder
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

fn write_default_config(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
    }
    info!("Generating default config...");
    Config::default().save(path)?;
    Ok(())
}

async fn show_networks(
    config: &Config,
    identity: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mysql = Arc::new(MysqlStore::new(&config.mysql)?);
    let resolver = EntitlementResolver::new(mysql.clone(), config.store_timeout());

    let result = resolver.resolve(identity).await;
    if let Err(e) = mysql.close().await {
        warn!("Failed to close database pool: {}", e);
    }
    let networks = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&networks)?);
        return Ok(());
    }

    println!("{} is entitled to {} networks", identity, networks.len());
    for codename in networks.iter() {
        println!("  {} -> {}", codename, table_name(codename, &config.pfctl.suffix));
    }
    Ok(())
}
