//! # Simmer Core Library
//!
//! Timer and notification scheduling engine for a guided, step-by-step
//! cooking experience. Each recipe step can carry an independent countdown
//! ("simmer 3 min", "rest 1 min"); this crate coordinates any number of them
//! against one shared clock and keeps them in lockstep with an asynchronous,
//! fallible notification subsystem, so a background alert fires exactly once
//! per completed timer -- never zero, never twice, never for a cancelled
//! one.
//!
//! ## Architecture
//!
//! - **Timer Registry**: a keyed state machine owning every countdown;
//!   operations mutate the map and return the event plus the notification
//!   work they imply
//! - **Clock Driver**: one interval task shared by all running timers,
//!   alive only while at least one of them is running
//! - **Timer Service**: a single owning task that serializes every mutation
//!   and applies the epoch guard to asynchronously resolved alert handles
//! - **Collaborators**: [`NotificationScheduler`] and [`CompletionSignal`]
//!   are injected, so the engine runs (and tests) without a platform
//!   notification stack behind it
//!
//! ## Key Components
//!
//! - [`TimerService`]: handle to the owning task; the public entry point
//! - [`TimerRegistry`]: the embeddable state machine behind it
//! - [`Config`]: TOML configuration management
//! - [`Event`]: the engine's broadcast vocabulary

pub mod config;
pub mod error;
pub mod events;
pub mod notify;
pub mod timer;

pub use config::Config;
pub use error::{ConfigError, EngineError, NotifyError};
pub use events::Event;
pub use notify::{
    AlertRequest, CompletionSignal, DeliveredAlert, LocalScheduler, NotificationHandle,
    NotificationScheduler, NullScheduler, NullSignal,
};
pub use timer::{
    ClearOutcome, Completion, ScheduleRequest, StepTimer, TimerRegistry, TimerService, TimerView,
    Transition,
};
