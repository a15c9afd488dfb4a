//! HTTP API: configuration, session middleware, guards, routes.

pub mod app;
pub mod config;
pub mod context;
pub mod guards;
pub mod middleware;
