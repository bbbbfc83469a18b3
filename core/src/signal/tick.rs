use log::{debug, warn};

use crate::disposable::Disposable;
use crate::signal::{AutomationCurve, AutomationEvent};
use crate::time::Seconds;
use crate::timeline::{TimelineError, TimelineResult};

///! An automatable rate whose integral over time counts ticks.
///!
///! Values are expressed in user units (for example beats per minute) and converted to ticks
///! per second by `multiplier`.
#[derive(Debug, Clone)]
pub struct TickSignal {
  curve: AutomationCurve,
  multiplier: f64,
  disposable: Disposable,
}

impl TickSignal {
  /// A constant rate of `value` ticks per second starting at time zero.
  pub fn new(value: f64) -> TickSignal {
    TickSignal::with_multiplier(value, 1.0)
  }

  pub fn with_multiplier(value: f64, multiplier: f64) -> TickSignal {
    let mut curve = AutomationCurve::new(value);
    if let Err(err) = curve.set_value_at_time(value, 0.0) {
      warn!("Invalid initial tick rate {}: {}", value, err);
    }
    TickSignal {
      curve,
      multiplier,
      disposable: Disposable::new(),
    }
  }

  pub fn multiplier(&self) -> f64 {
    self.multiplier
  }

  pub fn set_multiplier(&mut self, multiplier: f64) {
    debug!("Tick signal multiplier {} -> {}", self.multiplier, multiplier);
    self.multiplier = multiplier;
  }

  pub fn events(&self) -> impl Iterator<Item = &AutomationEvent> {
    self.curve.events()
  }

  /// The rate in user units.
  pub fn get_value_at_time(&self, time: Seconds) -> f64 {
    self.curve.get_value_at_time(time)
  }

  /// Ticks elapsed from time zero to `time`.
  pub fn get_ticks_at_time(&self, time: Seconds) -> f64 {
    if time <= 0.0 {
      return 0.0;
    }
    non_negative(self.curve.integral(0.0, time) * self.multiplier)
  }

  /// The time at which the tick count reaches `tick`, or infinity when it never does.
  pub fn get_time_of_tick(&self, tick: f64) -> Seconds {
    self.time_after(0.0, tick)
  }

  /// Seconds needed to advance `ticks` more ticks from `time`.
  pub fn get_duration_of_ticks(&self, ticks: f64, time: Seconds) -> Seconds {
    self.time_after(time, ticks) - time
  }

  /// Converts a tick count into seconds, measured from `anchor`.
  pub fn ticks_to_time(&self, ticks: f64, anchor: Seconds) -> Seconds {
    self.get_duration_of_ticks(ticks, anchor)
  }

  /// Converts a duration starting at `anchor` into ticks.
  pub fn time_to_ticks(&self, duration: Seconds, anchor: Seconds) -> f64 {
    non_negative(self.curve.integral(anchor, anchor + duration) * self.multiplier)
  }

  fn time_after(&self, from: Seconds, ticks: f64) -> Seconds {
    if ticks <= 0.0 {
      return from;
    }
    if self.multiplier <= 0.0 {
      return std::f64::INFINITY;
    }
    self.curve.time_of_integral(from, ticks / self.multiplier)
  }

  fn guard(&self) -> TimelineResult<()> {
    if self.disposable.is_disposed() {
      Err(TimelineError::Disposed)
    } else {
      Ok(())
    }
  }

  pub fn set_value_at_time(&mut self, value: f64, time: Seconds) -> TimelineResult<()> {
    self.guard()?;
    self.curve.set_value_at_time(value, time)
  }

  pub fn linear_ramp_to_value_at_time(&mut self, value: f64, time: Seconds) -> TimelineResult<()> {
    self.guard()?;
    self.curve.linear_ramp_to_value_at_time(value, time)
  }

  pub fn exponential_ramp_to_value_at_time(
    &mut self,
    value: f64,
    time: Seconds,
  ) -> TimelineResult<()> {
    self.guard()?;
    self.curve.exponential_ramp_to_value_at_time(value, time)
  }

  pub fn set_target_at_time(
    &mut self,
    target: f64,
    time: Seconds,
    time_constant: f64,
  ) -> TimelineResult<()> {
    self.guard()?;
    self.curve.set_target_at_time(target, time, time_constant)
  }

  pub fn set_ramp_point(&mut self, time: Seconds) -> TimelineResult<()> {
    self.guard()?;
    self.curve.set_ramp_point(time)
  }

  pub fn linear_ramp_to(&mut self, value: f64, ramp_time: Seconds, start: Seconds) -> TimelineResult<()> {
    self.guard()?;
    self.curve.linear_ramp_to(value, ramp_time, start)
  }

  pub fn exponential_ramp_to(
    &mut self,
    value: f64,
    ramp_time: Seconds,
    start: Seconds,
  ) -> TimelineResult<()> {
    self.guard()?;
    self.curve.exponential_ramp_to(value, ramp_time, start)
  }

  pub fn cancel_scheduled_values(&mut self, after: Seconds) {
    self.curve.cancel_scheduled_values(after);
  }

  pub fn cancel_and_hold_at_time(&mut self, time: Seconds) -> TimelineResult<()> {
    self.guard()?;
    self.curve.cancel_and_hold_at_time(time)
  }

  pub fn dispose(&mut self) {
    if self.disposable.dispose() {
      self.curve.dispose();
    }
  }

  pub fn is_disposed(&self) -> bool {
    self.disposable.is_disposed()
  }
}

// Clamps negative counts to zero and lets NaN through.
fn non_negative(ticks: f64) -> f64 {
  if ticks < 0.0 {
    0.0
  } else {
    ticks
  }
}
