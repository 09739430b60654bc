//! Process shell: command line, service wiring and operational routes.

mod cli;
mod infra;
mod routes;
mod server;

use crate::error::AppError;

pub use infra::{build_pipeline, DynPipeline};
pub use routes::with_service_routes;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
