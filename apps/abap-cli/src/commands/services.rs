use anyhow::{Result, bail};
use clap::Args;

use abapkit::catalog::{AnnotationFilter, ODataServiceInfo, ServiceFilter};
use abapkit::{AbapServiceProvider, ODataVersion};

use super::print_json;

#[derive(Args, Debug)]
pub struct ServicesArgs {
    /// Query the OData v4 catalog instead of v2
    #[arg(long)]
    v4: bool,

    /// Show only the service mounted at this path
    #[arg(long, conflicts_with = "title")]
    path: Option<String>,

    /// Show only the service with this technical name
    #[arg(long)]
    title: Option<String>,

    /// Also print the annotation documents of the found service (v2 only)
    #[arg(long)]
    annotations: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

impl ServicesArgs {
    pub async fn run(self, provider: &AbapServiceProvider) -> Result<()> {
        let version = if self.v4 {
            ODataVersion::V4
        } else {
            ODataVersion::V2
        };
        let catalog = provider.catalog(version)?;

        if self.path.is_none() && self.title.is_none() {
            let services = catalog.list_services().await?;
            return self.print(&services);
        }

        let filter = ServiceFilter {
            title: self.title.clone(),
            path: self.path.clone(),
        };
        let Some(service) = catalog.find_service(&filter).await? else {
            bail!("no {version} service matches");
        };
        self.print(std::slice::from_ref(&service))?;

        if self.annotations {
            let annotations = catalog
                .get_annotations(&AnnotationFilter {
                    id: Some(service.id.clone()),
                    ..AnnotationFilter::default()
                })
                .await?;
            if self.json {
                print_json(&annotations)?;
            } else {
                for annotation in &annotations {
                    println!(
                        "\n{} {} ({})\n{}",
                        annotation.technical_name,
                        annotation.version,
                        annotation.uri,
                        annotation.definitions
                    );
                }
            }
        }
        Ok(())
    }

    fn print(&self, services: &[ODataServiceInfo]) -> Result<()> {
        if self.json {
            return print_json(services);
        }
        for service in services {
            println!(
                "{:<40} {:<6} {}",
                service.name, service.service_version, service.path
            );
        }
        tracing::info!(count = services.len(), "services listed");
        Ok(())
    }
}
