//! HTTP API: admin endpoints, contact endpoints and guarded pages.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
