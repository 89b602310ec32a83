//! Mirror Debate Gateway
//!
//! HTTP gateway for a trading debate game: the user argues a market view
//! against an AI opponent whose trader archetype mirrors their own, while a
//! judge moves a health balance between the two sides.
//!
//! The core is an adapter that turns the agent service's SSE stream of
//! message envelopes into the incremental UI message chunk protocol the chat
//! front end consumes.
//!
//! # Modules
//!
//! - [`stream`]: SSE framing, envelope model, part dispatcher, UI chunks and
//!   OpenAI-compatible completion chunks
//! - [`agent`]: agent service request model and HTTP transport
//! - [`session`]: in-memory debate sessions and cookies
//! - [`game`]: trader assessment and battle resolution
//! - [`server`]: Axum router and handlers
//! - [`config`]: layered configuration

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod agent;
pub mod config;
pub mod error;
pub mod game;
pub mod security;
pub mod server;
pub mod session;
pub mod stream;

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::agent::AgentTransport;
use crate::config::AppConfig;
use crate::security::AppRateLimiter;
use crate::session::SessionStore;

pub use error::{GatewayError, Result};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Transport to the agent service.
    pub agent: Arc<dyn AgentTransport>,
    /// Debate session store.
    pub sessions: SessionStore,
    /// Global Rate Limiter
    pub rate_limiter: Arc<AppRateLimiter>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("sessions", &self.sessions.len())
            .field("rate_limiter", &self.rate_limiter)
            .field("config", &self.config)
            .finish()
    }
}

impl AppState {
    /// Build state from configuration and an agent transport.
    #[must_use]
    pub fn new(config: Arc<AppConfig>, agent: Arc<dyn AgentTransport>) -> Self {
        let rate_limiter = Arc::new(AppRateLimiter::new(
            config.resilience.requests_per_second,
            config.resilience.burst_size,
        ));
        Self {
            agent,
            sessions: SessionStore::new(),
            rate_limiter,
            config,
        }
    }
}

/// Install the global tracing subscriber (M-LOG-STRUCTURED).
///
/// `RUST_LOG` refines the `info` default. Safe to call more than once; later
/// calls are no-ops.
pub fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (json, plain) = if log_json {
        (Some(fmt::layer().json().with_target(true)), None)
    } else {
        (None, Some(fmt::layer().with_target(true)))
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .try_init();
}
