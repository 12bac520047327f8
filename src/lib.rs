//! Terminal chat client for a locally hosted LLM backend.

pub mod api;
pub mod app;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod store;
pub mod streaming;
pub mod ui;
