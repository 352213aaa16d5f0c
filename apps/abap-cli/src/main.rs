use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod logging;

use config::{CliConfig, SystemArgs};

/// Work with the OData services and UI5 repositories of ABAP systems
#[derive(Parser)]
#[command(name = "abap", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// YAML file with connection settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Print the merged configuration and exit
    #[arg(long)]
    print_config: bool,

    #[command(flatten)]
    system: SystemArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List or find catalog services
    Services(commands::services::ServicesArgs),
    /// Applications in the UI5 ABAP repository
    App(commands::repository::RepositoryArgs),
    /// Adaptation project variants in the layered repository
    Variant(commands::variant::VariantArgs),
    /// Search the application index
    Apps(commands::apps::AppsArgs),
    /// Show the ATO settings of the system
    Settings,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json_logs);

    let config = CliConfig::load(cli.config.as_deref(), &cli.system)?;
    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    let Some(command) = cli.command else {
        anyhow::bail!("no command given; see --help");
    };

    let provider = config.connect().await?;
    match command {
        Commands::Services(args) => args.run(&provider).await,
        Commands::App(args) => args.run(&provider).await,
        Commands::Variant(args) => args.run(&provider).await,
        Commands::Apps(args) => args.run(&provider).await,
        Commands::Settings => {
            let settings = provider.ato_settings().await?;
            println!("development package: {}", settings.development_package.unwrap_or_default());
            println!("development prefix:  {}", settings.development_prefix.unwrap_or_default());
            println!("operations type:     {}", settings.operations_type.unwrap_or_default());
            println!("tenant type:         {}", settings.tenant_type.unwrap_or_default());
            println!("S/4HANA Cloud:       {}", provider.is_s4_cloud().await);
            Ok(())
        }
    }
}
