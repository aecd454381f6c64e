//! HTTP layer: router, handlers, auth middleware, and DTOs.

pub mod auth;
pub mod server;
pub mod types;

pub use server::{build_router, serve};
