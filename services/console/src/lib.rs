mod cli;
mod demo;
mod infra;
mod operator;
mod routes;
mod server;

use intern_desk::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
