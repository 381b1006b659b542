use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use trustguard::{demo, initialize, RootConfig, RootError};
use trustguard_audit::JsonlAuditLog;
use trustguard_core::{Action, Capture, Context};

/// TrustGuard: staged identity-verification risk pipeline
#[derive(Parser, Debug)]
#[command(name = "trustguard", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Path of the JSON-lines audit trail
        #[arg(long)]
        audit_log: Option<PathBuf>,
    },

    /// Assess one capture stored as JSON
    Assess {
        /// Capture file (frames, face boxes, audio, document, metadata)
        #[arg(long)]
        capture: PathBuf,

        /// User the capture claims to belong to
        #[arg(long)]
        user: Option<String>,

        /// Source IP of the request
        #[arg(long)]
        ip: Option<String>,

        /// Protected action: login, profile_update or high_value_tx
        #[arg(long, default_value = "login")]
        action: String,

        /// App id the client claims to be
        #[arg(long)]
        app: Option<String>,
    },

    /// Show recent audit log entries
    Audit {
        /// Maximum number of entries to display
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Run the built-in synthetic scenarios
    Demo {
        /// Seed for the synthetic sensor noise
        #[arg(long, default_value = "7")]
        seed: u64,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new(
            "trustguard=debug,trustguard_pipeline=debug,trustguard_fusion=debug,\
             trustguard_policy=debug,trustguard_audit=debug",
        )
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trustguard=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<RootConfig, RootError> {
    match path {
        Some(p) => RootConfig::load(p),
        None => {
            let default_path = RootConfig::default_config_path();
            RootConfig::load(&default_path)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli).await;
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), RootError> {
    match cli.command {
        Commands::Init { audit_log } => cmd_init(cli.config.as_ref(), audit_log),
        Commands::Assess {
            capture,
            user,
            ip,
            action,
            app,
        } => {
            let context = Context {
                user_id: user,
                ip,
                action: action.parse::<Action>()?,
                claimed_app_id: app,
            };
            cmd_assess(cli.config.as_ref(), &capture, context).await
        }
        Commands::Audit { limit } => cmd_audit(cli.config.as_ref(), limit),
        Commands::Demo { seed } => cmd_demo(cli.config.as_ref(), seed).await,
    }
}

fn cmd_init(config_path: Option<&PathBuf>, audit_log: Option<PathBuf>) -> Result<(), RootError> {
    let mut config = load_config(config_path)?;
    if let Some(path) = audit_log {
        config.audit.log_path = path;
    }
    config.validate()?;

    let save_path = config_path
        .cloned()
        .unwrap_or_else(RootConfig::default_config_path);
    config.save(&save_path)?;
    JsonlAuditLog::open(config.audit.log_path.clone())?;
    info!(config = %save_path.display(), "trustguard initialized");

    println!("TrustGuard initialized successfully.");
    println!("  Config:    {}", save_path.display());
    println!("  Audit log: {}", config.audit.log_path.display());
    Ok(())
}

async fn cmd_assess(
    config_path: Option<&PathBuf>,
    capture_path: &PathBuf,
    context: Context,
) -> Result<(), RootError> {
    let config = load_config(config_path)?;
    let raw = std::fs::read_to_string(capture_path)?;
    let capture: Capture = serde_json::from_str(&raw)?;
    let state = initialize(config)?;

    let (_, record) = state
        .orchestrator
        .assess_verification(capture, context)
        .await;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn cmd_audit(config_path: Option<&PathBuf>, limit: usize) -> Result<(), RootError> {
    let config = load_config(config_path)?;
    let log = JsonlAuditLog::open(config.audit.log_path)?;
    let records = log.read_recent(limit)?;

    println!("Audit Log ({} entries):", records.len());
    if records.is_empty() {
        println!("  (no entries)");
    }
    for record in records {
        println!(
            "  {}  {:<7}  {:.2}  {:<14}  {}",
            record.audit_id,
            record.decision.to_string(),
            record.score,
            record.status.to_string(),
            record.reasons.first().map(String::as_str).unwrap_or("")
        );
    }
    Ok(())
}

async fn cmd_demo(config_path: Option<&PathBuf>, seed: u64) -> Result<(), RootError> {
    let config = load_config(config_path)?;
    let state = initialize(config)?;

    for (name, decision) in demo::run(&state, seed).await? {
        println!(
            "{:<12} {:<7} {:.2}  {}",
            name,
            decision.decision.to_string(),
            decision.effective_score,
            decision.reasons.join("; ")
        );
    }

    let stats = state.drift.stats()?;
    println!();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    println!("Pending reviews: {}", state.review.pending()?.len());
    println!(
        "Audit chain: {} records, intact = {}",
        state.chain.len(),
        state.chain.verify_chain()?
    );
    Ok(())
}
