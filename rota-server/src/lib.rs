//! # Rota Server
//!
//! HTTP and chat-command front end for the rota allocation engine.
//!
//! The server loads configuration, wires the engine to PostgreSQL or
//! in-memory stores, runs the periodic sweep, purge and reset triggers,
//! watches for directory changes made elsewhere, and exposes allocation
//! and admin operations over axum.

pub mod auth;
pub mod commands;
pub mod handlers;
pub mod infra;
pub mod routes;
pub mod transport;

pub use infra::app_state::AppState;
pub use routes::create_app;
