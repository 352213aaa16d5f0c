use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Args, Subcommand};

use abapkit::AbapServiceProvider;
use abapkit::deploy::{LrepDeployConfig, LrepUndeployConfig, Namespace};

use super::print_json;

/// App descriptor variants of adaptation projects.
#[derive(Args, Debug)]
pub struct VariantArgs {
    #[command(subcommand)]
    command: VariantCommand,
}

#[derive(Args, Debug)]
struct Target {
    /// Id of the adapted application
    #[arg(long)]
    reference: String,

    /// Id of the variant
    #[arg(long)]
    id: String,

    #[arg(long)]
    layer: Option<String>,

    #[arg(long)]
    transport: Option<String>,
}

impl Target {
    fn namespace(&self) -> Namespace {
        Namespace::Variant {
            reference: self.reference.clone(),
            id: self.id.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum VariantCommand {
    /// Upload a variant archive
    Deploy {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        package: Option<String>,
        #[arg(long)]
        archive: PathBuf,
    },
    /// Delete a variant
    Undeploy {
        #[command(flatten)]
        target: Target,
    },
    /// Print the descriptor the backend merges from a variant archive
    Preview {
        #[arg(long)]
        archive: PathBuf,
    },
}

fn read_archive(path: &Path) -> Result<Bytes> {
    std::fs::read(path)
        .map(Bytes::from)
        .with_context(|| format!("cannot read {}", path.display()))
}

impl VariantArgs {
    pub async fn run(self, provider: &AbapServiceProvider) -> Result<()> {
        let lrep = provider.layered_repository()?;
        match self.command {
            VariantCommand::Deploy {
                target,
                package,
                archive,
            } => {
                let config = LrepDeployConfig {
                    namespace: target.namespace(),
                    layer: target.layer,
                    package,
                    transport: target.transport,
                };
                let response = lrep.deploy(read_archive(&archive)?, &config).await?;
                println!("{} deployed ({})", config.namespace, response.status);
            }
            VariantCommand::Undeploy { target } => {
                let config = LrepUndeployConfig {
                    namespace: target.namespace(),
                    layer: target.layer,
                    transport: target.transport,
                };
                let response = lrep.undeploy(&config).await?;
                println!("{} undeployed ({})", config.namespace, response.status);
            }
            VariantCommand::Preview { archive } => {
                let merged = lrep
                    .merge_app_descriptor_variant(read_archive(&archive)?)
                    .await?;
                print_json(&merged)?;
            }
        }
        Ok(())
    }
}
