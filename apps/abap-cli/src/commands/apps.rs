use anyhow::Result;
use clap::Args;

use abapkit::AbapServiceProvider;

use super::print_json;

const DEFAULT_FIELDS: [&str; 3] = ["sap.app/id", "repoName", "url"];

/// Search the application index, or show one application.
#[derive(Args, Debug)]
pub struct AppsArgs {
    /// Show the details of this application id
    #[arg(long)]
    id: Option<String>,

    /// Search parameter, e.g. `sap.app/type=application`
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Fields to return; defaults to id, repository name and URL
    #[arg(long = "field")]
    fields: Vec<String>,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))
}

impl AppsArgs {
    pub async fn run(self, provider: &AbapServiceProvider) -> Result<()> {
        let index = provider.app_index()?;
        if let Some(id) = &self.id {
            return print_json(&index.get_app_info(id).await?);
        }

        let params: Vec<(&str, &str)> = self
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let fields: Vec<&str> = if self.fields.is_empty() {
            DEFAULT_FIELDS.to_vec()
        } else {
            self.fields.iter().map(String::as_str).collect()
        };
        print_json(&index.search(&params, &fields).await?)
    }
}
