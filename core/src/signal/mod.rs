pub mod automation;
pub mod tick;

pub use self::automation::{AutomationCurve, AutomationEvent};
pub use self::tick::TickSignal;
