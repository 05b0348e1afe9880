//! maas-deploy - configure and deploy machines registered in MAAS
//!
//! Reads a YAML plan of hostnames with their network bonding, RAID/LVM
//! layout and cloud-config user-data, and drives the region API to
//! wipe, configure and deploy each machine. The release mode hands
//! every machine in the plan back to the pool after a typed
//! confirmation.

use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use maas_deploy::{deploy, plan, DeployError, MaasClient, Plan};

#[derive(Parser)]
#[command(name = "maas-deploy")]
#[command(author, version, about = "Configure and deploy machines registered in MAAS", long_about = None)]
struct Cli {
    /// Machine plan with per-host configuration
    machines_config: PathBuf,

    /// Release all machines in the plan instead of deploying them
    #[arg(short, long)]
    release: bool,

    /// MAAS region API endpoint
    #[arg(long, env = "MAAS_API_URL")]
    api_url: String,

    /// MAAS API key (consumer:token:secret)
    #[arg(long, env = "MAAS_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

const RELEASE_CONFIRMATION: &str = "I AM SURE I WANT THIS!";

/// Ask for the typed release confirmation on stdin
fn confirm_release(plan: &Plan, api_url: &str) -> bool {
    let hostnames: Vec<&str> = plan.hostnames().collect();
    println!("Are you sure you want to release {:?}?", hostnames);
    println!("You are running this command against {}", api_url);
    println!("Type '{}' all in upper case to continue.", RELEASE_CONFIRMATION);

    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    line.trim_end() == RELEASE_CONFIRMATION
}

#[tokio::main]
async fn main() -> Result<(), DeployError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let plan = plan::loader::load_plan(&cli.machines_config).await?;
    let client = MaasClient::new(&cli.api_url, &cli.api_key)?;

    if cli.release {
        if confirm_release(&plan, client.api_url()) {
            deploy::release_plan(&client, &plan).await?;
        } else {
            println!("Confirmation failed.");
            return Ok(());
        }
    } else {
        deploy::run_plan(&client, &plan).await?;
    }

    info!("Done");
    Ok(())
}
