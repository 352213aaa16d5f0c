use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use clap::{Args, Subcommand};

use abapkit::AbapServiceProvider;
use abapkit::deploy::{DeployOutcome, DeployRequest, UndeployRequest};

/// UI5 applications in the ABAP repository.
#[derive(Args, Debug)]
pub struct RepositoryArgs {
    #[command(subcommand)]
    command: RepositoryCommand,
}

#[derive(Subcommand, Debug)]
enum RepositoryCommand {
    /// Show a deployed application
    Info {
        name: String,
    },
    /// Save the files of a deployed application as a zip archive
    Download {
        name: String,
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Create or update an application from a zip archive
    Deploy(DeployArgs),
    /// Delete an application
    Undeploy {
        name: String,
        #[arg(long)]
        transport: Option<String>,
        /// Check the deletion without performing it
        #[arg(long)]
        test: bool,
    },
}

#[derive(Args, Debug)]
struct DeployArgs {
    /// BSP application name
    #[arg(long)]
    name: String,

    #[arg(long)]
    package: String,

    /// Zip archive with the application files
    #[arg(long)]
    archive: PathBuf,

    #[arg(long)]
    description: Option<String>,

    #[arg(long)]
    transport: Option<String>,

    /// Let the backend check the upload without storing it
    #[arg(long)]
    test: bool,

    /// Allow overwriting files the backend considers foreign
    #[arg(long)]
    no_safe_mode: bool,
}

impl RepositoryArgs {
    pub async fn run(self, provider: &AbapServiceProvider) -> Result<()> {
        let repository = provider.ui5_abap_repository()?;
        match self.command {
            RepositoryCommand::Info { name } => {
                let Some(info) = repository.get_info(&name).await?.found() else {
                    bail!("application {name} does not exist");
                };
                println!("name:        {}", info.name);
                println!("package:     {}", info.package);
                println!("description: {}", info.description);
                if !info.info.is_empty() {
                    println!("info:        {}", info.info);
                }
            }
            RepositoryCommand::Download { name, out } => {
                let Some(archive) = repository.download_files(&name).await? else {
                    bail!("application {name} does not exist");
                };
                std::fs::write(&out, &archive)
                    .with_context(|| format!("cannot write {}", out.display()))?;
                println!("{} bytes written to {}", archive.len(), out.display());
            }
            RepositoryCommand::Deploy(args) => {
                let archive = std::fs::read(&args.archive)
                    .with_context(|| format!("cannot read {}", args.archive.display()))?;
                let mut request = DeployRequest::new(args.name, args.package, Bytes::from(archive));
                request.description = args.description;
                request.transport = args.transport;
                request.test_mode = args.test;
                request.safe_mode = !args.no_safe_mode;

                let outcome = repository.deploy(&request).await?;
                report(&request.name, "deployed", &outcome);
            }
            RepositoryCommand::Undeploy {
                name,
                transport,
                test,
            } => {
                let request = UndeployRequest {
                    name,
                    transport,
                    test_mode: test,
                };
                match repository.undeploy(&request).await? {
                    Some(outcome) => report(&request.name, "undeployed", &outcome),
                    None => println!("{} does not exist, nothing to undeploy", request.name),
                }
            }
        }
        Ok(())
    }
}

fn report(name: &str, action: &str, outcome: &DeployOutcome) {
    if outcome.simulated {
        println!("{name}: test run finished ({}), nothing was stored", outcome.status);
    } else {
        println!("{name} {action} ({})", outcome.status);
    }
    if let Some(message) = &outcome.message {
        println!("{}", message.message);
        for detail in &message.details {
            println!("  {}: {}", detail.severity, detail.message);
        }
    }
}
