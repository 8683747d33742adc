//! An in-memory deferred HTTP callback service.
//!
//! A caller registers an outbound request (method, URL, headers, body)
//! together with a delay. The engine holds it in memory, sends it
//! unmodified once the delay elapses, and lets the caller poll or cancel
//! it until then.
//!
//! ## Guarantees
//! - Registration never waits for the delay
//! - Each callback leaves the pending state exactly once: fired or cancelled
//! - A successful cancel means the request is never sent
//! - Ids are unique and increase in registration order
//!
//! ## Non-Guarantees
//! - Durability across restarts
//! - Retries of failed sends
//! - Ordering between callbacks, even with equal fire times
//! - Caller authentication

mod config;
mod dispatcher;
mod engine;
mod error;
mod registry;
mod scheduler;
mod server;
mod types;

pub use config::Config;
pub use dispatcher::{Dispatcher, HttpDispatcher, OutboundRequest};
pub use engine::Engine;
pub use error::{DispatchError, EngineError, InputError};
pub use registry::{CallbackEntry, EntrySnapshot, Registry};
pub use scheduler::{CancelHandle, Scheduler};
pub use server::{build_router, ApiError, AppState};
pub use types::{
    parse_delay,
    parse_target,
    CallbackId,
    CallbackStatus,
    CancelOutcome,
    NewCallback,
    Registration,
    CALLBACK_DELAY_HEADER,
    CALLBACK_URL_HEADER,
    MAX_DELAY,
};
