//! Deployment to the UI5 ABAP repository and the layered repository.

mod lrep;
pub mod messages;
mod ui5_repository;

pub use lrep::{
    DEFAULT_LAYER, LOCAL_PACKAGE, LayeredRepositoryService, LrepDeployConfig, LrepUndeployConfig,
    Namespace,
};
pub use ui5_repository::{
    AppInfo, DeployOutcome, DeployRequest, Ui5AbapRepositoryService, UndeployRequest,
};
