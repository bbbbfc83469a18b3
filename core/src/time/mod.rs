pub mod bars;
pub mod notation;
pub mod signature;
pub mod source;
pub mod tempo;
pub mod ticks;

pub use self::bars::BarsTime;
pub use self::notation::{NotationError, NotationResult, Progress};
pub use self::signature::Signature;
pub use self::source::{ManualTime, SystemTime, TimeSource};
pub use self::tempo::Tempo;
pub use self::ticks::TicksTime;

/// Seconds on the host's monotonic clock.
pub type Seconds = f64;

/// Pulses (ticks) per quarter note.
pub type Ppq = u32;
