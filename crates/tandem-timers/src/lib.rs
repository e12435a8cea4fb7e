//! Durable timers for Tandem hosts.
//!
//! Timers live in the durable backend, not in process memory, so they
//! survive restarts. A [`TimerQueue`] schedules and cancels them; a
//! [`TimerDriver`] periodically delivers the due ones to a host-provided
//! [`TimerHandler`].
//!
//! # Modules
//!
//! - [`queue`] -- [`TimerQueue`] and its storage layout
//! - [`driver`] -- [`TimerDriver`] and [`SweepReport`]
//! - [`handler`] -- the [`TimerHandler`] contract
//! - [`clock`] -- [`Clock`], [`SystemClock`], [`ManualClock`]
//! - [`error`] -- [`TimerError`] and [`HandlerError`]

pub mod clock;
pub mod driver;
pub mod error;
pub mod handler;
pub mod queue;

pub use clock::{Clock, ManualClock, SystemClock};
pub use driver::{SweepReport, TimerDriver};
pub use error::{HandlerError, TimerError};
pub use handler::TimerHandler;
pub use queue::{DEFAULT_QUEUE_KEY, ScheduledTimer, TimerQueue};
