//! # Cadence
//!
//! A clock-driven trigger engine for Rust.
//!
//! Cadence binds a synchronous computation to a fixed argument value and
//! decides *when* and *how often* it runs. Each trigger returns a lazy,
//! cancellable stream of the computation's results, so cron-like or
//! timer-like execution needs no external scheduler process.
//!
//! ## Core Concepts
//!
//! - **Clock**: the single source of "now". [`SystemClock`] follows real time;
//!   [`SimulatedClock`] reports whatever instant a test driver assigns.
//! - **Task**: a computation, its arguments and a shared clock. All trigger
//!   methods live here.
//! - **Firings**: the stream a trigger returns. It fires only while polled and
//!   stops at its next sleep once cancelled.
//! - **Calendar filters**: per-field value sets (ISO weekday, day of month,
//!   hour, minute, second) combined with logical OR.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cadence::prelude::*;
//! use futures::StreamExt;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Bind a computation to its arguments.
//!     let task = Task::new(
//!         |city: &String| Ok(format!("reading sensors in {city}")),
//!         "Oslo".to_string(),
//!     );
//!
//!     // 2. Pick a trigger. Nothing runs until the stream is polled.
//!     let mut readings = task.repeat_every_for(Duration::from_secs(20), Duration::from_secs(5));
//!
//!     // 3. Consume the results as they fire.
//!     while let Some(reading) = readings.next().await {
//!         println!("{}", reading?);
//!     }
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Cadence";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod sequence;
pub mod task;
pub mod trigger;

pub use clock::{Clock, Instant, SimulatedClock, SystemClock};
pub use config::CadenceConfig;
pub use error::{CadenceError, Result};
pub use events::{next_event, TriggerEvent, TriggerKind};
pub use sequence::Firings;
pub use task::Task;
pub use trigger::calendar::{CalendarField, CalendarFilter, RepeatWhere};

/// A prelude module for easy importing of the most common Cadence types.
pub mod prelude {
    pub use crate::clock::{Clock, Instant, SimulatedClock, SystemClock};
    pub use crate::config::CadenceConfig;
    pub use crate::error::CadenceError;
    pub use crate::events::{next_event, TriggerEvent, TriggerKind};
    pub use crate::sequence::Firings;
    pub use crate::task::Task;
    pub use crate::trigger::calendar::{CalendarField, CalendarFilter, RepeatWhere};
}
