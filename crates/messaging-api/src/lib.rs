//! Operator control plane for the dispatch engine.
//!
//! A thin axum surface over the scheduler lifecycle and the delivery
//! history, plus the service configuration loaded from the environment.
//! Handlers never block the engine: lifecycle calls only touch the
//! scheduler's own mutex and the history query is read-only.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod handlers;
pub mod server;

use std::sync::Arc;

pub use config::Config;
use messaging_core::MessageStore;
use messaging_dispatch::Scheduler;
pub use server::{create_router, start_server};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Dispatch scheduler driven by the lifecycle endpoints.
    pub scheduler: Arc<Scheduler>,

    /// Read access to delivery history.
    pub store: Arc<dyn MessageStore>,
}

impl AppState {
    /// Creates the shared state.
    pub fn new(scheduler: Arc<Scheduler>, store: Arc<dyn MessageStore>) -> Self {
        Self { scheduler, store }
    }
}
