//! Debate sessions and the cookies that identify them.
//!
//! Sessions are in-memory and process-local. Each holds the user's trader
//! code, its mirror, the debate topic, chat history and the health balance
//! the judge moves between the two sides.
//!
//! # Example
//!
//! ```rust
//! use mirror_debate_gateway::session::SessionStore;
//!
//! let store = SessionStore::new();
//! let session = store.create();
//! assert_eq!(session.apply_delta(15), 65);
//! assert_eq!(store.get(session.id()).unwrap().health(), 65);
//! ```

pub mod cookies;
mod store;

pub use store::{DebateSession, INITIAL_HEALTH, MAX_HEALTH, SessionSnapshot, SessionStore};
