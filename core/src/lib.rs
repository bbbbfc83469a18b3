//! Musical-time scheduling: tempo curves, tick clocks and a transport that dispatches
//! scheduled payloads at sample-accurate times.

pub mod clock;
pub mod config;
pub mod disposable;
pub mod signal;
pub mod time;
pub mod timeline;
pub mod transport;

pub use crate::clock::{Clock, ClockEvent, PlaybackState};
pub use crate::signal::TickSignal;
pub use crate::time::{Seconds, TicksTime};
pub use crate::timeline::{IntervalTimeline, Timeline};
pub use crate::transport::{DispatchSink, Transport};
