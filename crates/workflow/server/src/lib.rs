//! workflowd library
//!
//! This module provides the core components for the workflow daemon:
//! - REST API handlers for the administrative and orchestration APIs
//! - Layered configuration
//! - Seed definition loading
//! - Server lifecycle management

pub mod api;
pub mod config;
pub mod error;
pub mod seed;
pub mod server;

pub use config::WorkflowdConfig;
pub use error::{ApiError, ServerError};
pub use seed::SeedFile;
pub use server::Server;
