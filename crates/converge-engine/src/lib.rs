//! # Intentful Reconciliation Engine
//!
//! Converges the observed state of watched entities toward their desired
//! state by repeatedly rediffing, invoking provider callbacks, and
//! tracking progress through intent watchers.
//!
//! ## Architecture
//!
//! ```text
//! spec write ──► Behaviour Strategy ──► IntentWatcher (Pending/Active)
//!                     │                        ▲
//!                     ▼                        │ advance on rediff
//!                 Watchlist ◄─── top-up ───┐   │
//!                     │                    │   │
//!                     ▼                    │   │
//!               Diff Resolver ─── rediff ──┴───┤
//!                     │                        │
//!                     ▼                        │
//!            provider callback          Change Listener ◄── spec/status
//!            (fire and continue)                            notifications
//! ```
//!
//! The resolver loop, the change listener, and the behaviour strategies
//! all mutate watchers through the same idempotent lifecycle service, so
//! several processes can race on one store safely.

pub mod behaviour;
pub mod callback;
pub mod error;
pub mod listener;
pub mod registry;
pub mod resolver;
pub mod selection;
pub mod stores;
pub mod watchers;

// Re-exports for convenience
pub use behaviour::{
    BasicStrategy, BehaviourResolver, BehaviourStrategy, DifferStrategy, SpecOnlyStrategy,
    SpecUpdateOutcome,
};
pub use callback::{handler_url, CallbackClient, CallbackError, DEFAULT_CALLBACK_TIMEOUT_SECS};
pub use error::{EngineError, EngineResult};
pub use listener::{ChangeKind, ChangeListener, ChangeNotifier, EntityChange};
pub use registry::{KindRegistry, RegisteredKind};
pub use resolver::{backoff_seconds, DiffResolver, ResolverConfig, BACKOFF_SCHEDULE_SECS};
pub use selection::select_diff;
pub use stores::EntityStores;
pub use watchers::WatcherService;
