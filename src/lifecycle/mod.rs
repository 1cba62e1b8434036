//! Process lifecycle: start, graceful restart and shutdown.
//!
//! # Signals
//!
//! | Signal  | Transition                                    | Completion |
//! |---------|-----------------------------------------------|------------|
//! | SIGHUP  | drain (5s deadline), cleanup                  | restart    |
//! | SIGTERM | drain (5s deadline), cleanup                  | shutdown   |
//! | SIGINT  | immediate stop, cleanup                       | shutdown   |
//!
//! # Driver contract
//!
//! ```rust,ignore
//! let mut coordinator = Coordinator::new();
//! loop {
//!     let running = coordinator.start(config, OsSignals::register()?).await?;
//!     match running.completion().await {
//!         Completion::Restart => config = reload()?,
//!         Completion::Shutdown => break,
//!         Completion::Failed(reason) => return Err(reason),
//!     }
//! }
//! ```

pub mod coordinator;
pub mod signals;

pub use coordinator::{Completion, Coordinator, DRAIN_DEADLINE, RunningApp};
pub use signals::{LifecycleSignal, OsSignals, SignalSource};
