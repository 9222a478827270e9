pub mod config;
pub mod department;
pub mod error;
pub mod pipeline;
pub mod remote;
pub mod session;
pub mod telemetry;
