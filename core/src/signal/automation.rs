//! Scheduled value curves made of set, linear ramp, exponential ramp and target segments.
//!
//! The curve keeps only the event history. Values, integrals and their inverses are computed
//! from the piecewise segments that history describes.

use log::warn;

use crate::timeline::{Timeline, TimelineError, TimelineResult};

/// Approach ratio reached by `target_ramp_to` at the end of its ramp time.
const TARGET_RAMP_BASE: f64 = 200.0;

const BISECTION_STEPS: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutomationEvent {
  SetValue {
    time: f64,
    value: f64,
  },
  LinearRamp {
    time: f64,
    value: f64,
  },
  ExponentialRamp {
    time: f64,
    value: f64,
  },
  SetTarget {
    time: f64,
    target: f64,
    time_constant: f64,
  },
}

impl AutomationEvent {
  pub fn time(&self) -> f64 {
    match *self {
      AutomationEvent::SetValue { time, .. }
      | AutomationEvent::LinearRamp { time, .. }
      | AutomationEvent::ExponentialRamp { time, .. }
      | AutomationEvent::SetTarget { time, .. } => time,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Shape {
  Constant(f64),
  Linear { from: f64, to: f64 },
  Exponential { from: f64, to: f64 },
  Target { from: f64, target: f64, time_constant: f64 },
}

/// A piece of the curve over `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Segment {
  pub(crate) start: f64,
  pub(crate) end: f64,
  pub(crate) shape: Shape,
}

impl Segment {
  pub(crate) fn value_at(&self, time: f64) -> f64 {
    match self.shape {
      Shape::Constant(value) => value,
      Shape::Linear { from, to } => {
        from + (to - from) * (time - self.start) / (self.end - self.start)
      }
      Shape::Exponential { from, to } => {
        from * (to / from).powf((time - self.start) / (self.end - self.start))
      }
      Shape::Target {
        from,
        target,
        time_constant,
      } => target + (from - target) * (-(time - self.start) / time_constant).exp(),
    }
  }

  /// Area under the curve between `a` and `b`, both inside the segment.
  pub(crate) fn integral(&self, a: f64, b: f64) -> f64 {
    if b <= a {
      return 0.0;
    }
    match self.shape {
      Shape::Constant(value) => {
        if value == 0.0 {
          0.0
        } else {
          value * (b - a)
        }
      }
      Shape::Linear { .. } => (self.value_at(a) + self.value_at(b)) / 2.0 * (b - a),
      Shape::Exponential { from, to } => {
        let (va, vb) = (self.value_at(a), self.value_at(b));
        let ratio = to / from;
        if ratio == 1.0 {
          va * (b - a)
        } else {
          (vb - va) * (self.end - self.start) / ratio.ln()
        }
      }
      Shape::Target {
        from,
        target,
        time_constant,
      } => {
        let decay_a = (-(a - self.start) / time_constant).exp();
        let approach = (from - target) * time_constant;
        if b.is_infinite() {
          if target == 0.0 {
            approach * decay_a
          } else {
            target * b
          }
        } else {
          let decay_b = (-(b - self.start) / time_constant).exp();
          target * (b - a) + approach * (decay_a - decay_b)
        }
      }
    }
  }

  /// The time `x >= a` where the area from `a` reaches `amount`.
  pub(crate) fn solve(&self, a: f64, amount: f64) -> Option<f64> {
    if amount <= 0.0 {
      return Some(a);
    }
    let x = match self.shape {
      Shape::Constant(value) => {
        if value <= 0.0 {
          return None;
        }
        a + amount / value
      }
      Shape::Linear { from, to } => {
        let va = self.value_at(a);
        let slope = (to - from) / (self.end - self.start);
        if slope == 0.0 {
          if va <= 0.0 {
            return None;
          }
          a + amount / va
        } else {
          let discriminant = va * va + 2.0 * slope * amount;
          if discriminant < 0.0 {
            return None;
          }
          let denominator = va + discriminant.sqrt();
          if denominator <= 0.0 {
            return None;
          }
          a + 2.0 * amount / denominator
        }
      }
      Shape::Exponential { from, to } => {
        let va = self.value_at(a);
        let growth = (to / from).ln() / (self.end - self.start);
        if growth == 0.0 {
          if va <= 0.0 {
            return None;
          }
          a + amount / va
        } else {
          let inner = 1.0 + amount * growth / va;
          if inner <= 0.0 {
            return None;
          }
          a + inner.ln() / growth
        }
      }
      Shape::Target { .. } => self.bisect(a, amount)?,
    };
    if x.is_finite() {
      Some(x)
    } else {
      None
    }
  }

  // The exponential approach integral has no closed inverse.
  fn bisect(&self, a: f64, amount: f64) -> Option<f64> {
    let mut high = if self.end.is_finite() {
      self.end
    } else {
      let mut step = match self.shape {
        Shape::Target { time_constant, .. } => time_constant.max(1e-3),
        _ => 1.0,
      };
      let mut steps = 0;
      while self.integral(a, a + step) < amount {
        step *= 2.0;
        steps += 1;
        if steps > BISECTION_STEPS {
          return None;
        }
      }
      a + step
    };
    if self.integral(a, high) < amount {
      return None;
    }
    let mut low = a;
    for _ in 0..BISECTION_STEPS {
      let middle = (low + high) / 2.0;
      if middle <= low || middle >= high {
        break;
      }
      if self.integral(a, middle) < amount {
        low = middle;
      } else {
        high = middle;
      }
    }
    Some(high)
  }
}

///! A value scheduled over time.
#[derive(Debug, Clone)]
pub struct AutomationCurve {
  events: Timeline<AutomationEvent>,
  initial: f64,
}

impl AutomationCurve {
  pub fn new(initial: f64) -> AutomationCurve {
    AutomationCurve {
      events: Timeline::new(),
      initial,
    }
  }

  pub fn initial(&self) -> f64 {
    self.initial
  }

  pub fn events(&self) -> impl Iterator<Item = &AutomationEvent> {
    self.events.iter().map(|event| event.value())
  }

  pub fn len(&self) -> usize {
    self.events.len()
  }

  pub fn is_empty(&self) -> bool {
    self.events.is_empty()
  }

  fn add(&mut self, event: AutomationEvent) -> TimelineResult<()> {
    if let AutomationEvent::SetTarget { time_constant, .. } = event {
      if !time_constant.is_finite() {
        return Err(TimelineError::InvalidValue {
          value: time_constant,
        });
      }
    }
    let value = match event {
      AutomationEvent::SetValue { value, .. }
      | AutomationEvent::LinearRamp { value, .. }
      | AutomationEvent::ExponentialRamp { value, .. } => value,
      AutomationEvent::SetTarget { target, .. } => target,
    };
    if !value.is_finite() {
      return Err(TimelineError::InvalidValue { value });
    }
    self.events.add(event.time(), event).map(|_| ())
  }

  pub fn set_value_at_time(&mut self, value: f64, time: f64) -> TimelineResult<()> {
    self.add(AutomationEvent::SetValue { time, value })
  }

  pub fn linear_ramp_to_value_at_time(&mut self, value: f64, end_time: f64) -> TimelineResult<()> {
    self.add(AutomationEvent::LinearRamp {
      time: end_time,
      value,
    })
  }

  pub fn exponential_ramp_to_value_at_time(
    &mut self,
    value: f64,
    end_time: f64,
  ) -> TimelineResult<()> {
    self.add(AutomationEvent::ExponentialRamp {
      time: end_time,
      value,
    })
  }

  pub fn set_target_at_time(
    &mut self,
    target: f64,
    start_time: f64,
    time_constant: f64,
  ) -> TimelineResult<()> {
    self.add(AutomationEvent::SetTarget {
      time: start_time,
      target,
      time_constant,
    })
  }

  /// Linear ramps through `values`, spread evenly over `duration` from `start_time`.
  pub fn set_value_curve_at_time(
    &mut self,
    values: &[f64],
    start_time: f64,
    duration: f64,
  ) -> TimelineResult<()> {
    let (first, rest) = match values.split_first() {
      Some(split) => split,
      None => return Ok(()),
    };
    self.set_value_at_time(*first, start_time)?;
    let step = duration / rest.len().max(1) as f64;
    for (index, value) in rest.iter().enumerate() {
      self.linear_ramp_to_value_at_time(*value, start_time + step * (index + 1) as f64)?;
    }
    Ok(())
  }

  /// Pins the value the curve has at `time` so a following ramp starts from it.
  pub fn set_ramp_point(&mut self, time: f64) -> TimelineResult<()> {
    self.cancel_and_hold_at_time(time)
  }

  pub fn linear_ramp_to(&mut self, value: f64, ramp_time: f64, start_time: f64) -> TimelineResult<()> {
    self.set_ramp_point(start_time)?;
    self.linear_ramp_to_value_at_time(value, start_time + ramp_time)
  }

  pub fn exponential_ramp_to(
    &mut self,
    value: f64,
    ramp_time: f64,
    start_time: f64,
  ) -> TimelineResult<()> {
    self.set_ramp_point(start_time)?;
    self.exponential_ramp_to_value_at_time(value, start_time + ramp_time)
  }

  /// Approaches `value` exponentially, landing on it exactly after `ramp_time`.
  pub fn target_ramp_to(&mut self, value: f64, ramp_time: f64, start_time: f64) -> TimelineResult<()> {
    self.set_ramp_point(start_time)?;
    let time_constant = (ramp_time + 1.0).ln() / TARGET_RAMP_BASE.ln();
    self.set_target_at_time(value, start_time, time_constant)?;
    self.cancel_and_hold_at_time(start_time + ramp_time * 0.9)?;
    self.linear_ramp_to_value_at_time(value, start_time + ramp_time)
  }

  /// Picks a ramp shape from the values: exponential when both are positive.
  pub fn ramp_to(&mut self, value: f64, ramp_time: f64, start_time: f64) -> TimelineResult<()> {
    let current = self.get_value_at_time(start_time);
    if current > 0.0 && value > 0.0 {
      self.exponential_ramp_to(value, ramp_time, start_time)
    } else {
      self.linear_ramp_to(value, ramp_time, start_time)
    }
  }

  /// Removes every event at or after `after`.
  pub fn cancel_scheduled_values(&mut self, after: f64) {
    self.events.cancel(after);
  }

  /// Removes the events after `time` and holds the value the curve had there.
  pub fn cancel_and_hold_at_time(&mut self, time: f64) -> TimelineResult<()> {
    let value = self.get_value_at_time(time);
    self.events.for_each_after(time, |events, event| {
      events.remove(event.id());
    });
    self.set_value_at_time(value, time)
  }

  pub fn clear(&mut self) {
    self.events.clear();
  }

  pub fn dispose(&mut self) {
    self.events.dispose();
  }

  pub fn get_value_at_time(&self, time: f64) -> f64 {
    let segments = self.segments();
    match segment_at(&segments, time) {
      Some(segment) => segment.value_at(time),
      None => self.initial,
    }
  }

  /// Area under the curve over `[from, to]`. Negative when `to < from`.
  pub fn integral(&self, from: f64, to: f64) -> f64 {
    if to < from {
      return -self.integral(to, from);
    }
    self
      .segments()
      .iter()
      .filter(|segment| segment.end > from && segment.start < to)
      .map(|segment| segment.integral(segment.start.max(from), segment.end.min(to)))
      .sum()
  }

  /// The earliest time at or after `from` where the area from `from` reaches `amount`.
  /// Returns infinity when the curve never accumulates that much.
  pub fn time_of_integral(&self, from: f64, amount: f64) -> f64 {
    if amount <= 0.0 {
      return from;
    }
    let mut accumulated = 0.0;
    for segment in self.segments().iter().filter(|segment| segment.end > from) {
      let start = segment.start.max(from);
      let area = segment.integral(start, segment.end);
      if area > 0.0 && accumulated + area >= amount {
        if let Some(time) = segment.solve(start, amount - accumulated) {
          return time.min(segment.end);
        }
      }
      accumulated += area;
    }
    warn!(
      "The curve never accumulates {} from {}, the time is unreachable",
      amount, from
    );
    std::f64::INFINITY
  }

  pub(crate) fn segments(&self) -> Vec<Segment> {
    let mut segments = Vec::with_capacity(self.events.len() + 1);
    let mut start = std::f64::NEG_INFINITY;
    let mut tail = Shape::Constant(self.initial);

    fn push(segments: &mut Vec<Segment>, start: f64, end: f64, shape: Shape) {
      if end > start {
        segments.push(Segment { start, end, shape });
      }
    }

    for timeline_event in self.events.iter() {
      let time = timeline_event.time();
      let current = if start.is_finite() {
        Segment {
          start,
          end: time,
          shape: tail,
        }
        .value_at(time)
      } else {
        tail_value(tail)
      };
      let anchor = tail_value(tail);

      match *timeline_event.value() {
        AutomationEvent::SetValue { value, .. } => {
          push(&mut segments, start, time, tail);
          tail = Shape::Constant(value);
        }
        AutomationEvent::LinearRamp { value, .. } => {
          let shape = if start.is_finite() {
            Shape::Linear {
              from: anchor,
              to: value,
            }
          } else {
            tail
          };
          push(&mut segments, start, time, shape);
          tail = Shape::Constant(value);
        }
        AutomationEvent::ExponentialRamp { value, .. } => {
          let shape = if start.is_finite() && anchor * value > 0.0 {
            Shape::Exponential {
              from: anchor,
              to: value,
            }
          } else {
            Shape::Constant(anchor)
          };
          push(&mut segments, start, time, shape);
          tail = Shape::Constant(value);
        }
        AutomationEvent::SetTarget {
          target,
          time_constant,
          ..
        } => {
          push(&mut segments, start, time, tail);
          tail = if time_constant > 0.0 {
            Shape::Target {
              from: current,
              target,
              time_constant,
            }
          } else {
            Shape::Constant(target)
          };
        }
      }
      start = time;
    }
    push(&mut segments, start, std::f64::INFINITY, tail);
    segments
  }
}

// The value a shape starts from, which ramps take as their own start value.
fn tail_value(shape: Shape) -> f64 {
  match shape {
    Shape::Constant(value) => value,
    Shape::Linear { to, .. } | Shape::Exponential { to, .. } => to,
    Shape::Target { from, .. } => from,
  }
}

fn segment_at(segments: &[Segment], time: f64) -> Option<&Segment> {
  match segments.partition_point(|segment| segment.start <= time) {
    0 => None,
    index => segments.get(index - 1),
  }
}

#[cfg(test)]
mod test {

  use super::AutomationCurve;

  fn assert_approx(actual: f64, expected: f64) {
    assert!(
      (actual - expected).abs() < 1e-6,
      "expected {} but got {}",
      expected,
      actual
    );
  }

  #[test]
  pub fn initial_value_without_events() {
    let curve = AutomationCurve::new(3.0);
    assert_eq!(curve.get_value_at_time(-5.0), 3.0);
    assert_eq!(curve.get_value_at_time(100.0), 3.0);
  }

  #[test]
  pub fn set_value_steps() {
    let mut curve = AutomationCurve::new(0.0);
    curve.set_value_at_time(1.0, 0.0).unwrap();
    curve.set_value_at_time(2.0, 1.0).unwrap();
    assert_eq!(curve.get_value_at_time(-1.0), 0.0);
    assert_eq!(curve.get_value_at_time(0.5), 1.0);
    assert_eq!(curve.get_value_at_time(1.0), 2.0);
  }

  #[test]
  pub fn linear_ramp() {
    let mut curve = AutomationCurve::new(0.0);
    curve.set_value_at_time(1.0, 0.0).unwrap();
    curve.linear_ramp_to_value_at_time(3.0, 2.0).unwrap();
    assert_approx(curve.get_value_at_time(1.0), 2.0);
    assert_approx(curve.get_value_at_time(2.0), 3.0);
    assert_approx(curve.get_value_at_time(5.0), 3.0);
    assert_approx(curve.integral(0.0, 2.0), 4.0);
  }

  #[test]
  pub fn exponential_ramp() {
    let mut curve = AutomationCurve::new(0.0);
    curve.set_value_at_time(1.0, 0.0).unwrap();
    curve.exponential_ramp_to_value_at_time(4.0, 2.0).unwrap();
    assert_approx(curve.get_value_at_time(1.0), 2.0);
    assert_approx(curve.integral(0.0, 2.0), 2.0 * 3.0 / 4.0_f64.ln());
  }

  #[test]
  pub fn exponential_ramp_through_zero_holds() {
    let mut curve = AutomationCurve::new(0.0);
    curve.set_value_at_time(0.0, 0.0).unwrap();
    curve.exponential_ramp_to_value_at_time(1.0, 1.0).unwrap();
    assert_eq!(curve.get_value_at_time(0.5), 0.0);
    assert_eq!(curve.get_value_at_time(1.0), 1.0);
    assert!(!curve.integral(0.0, 2.0).is_nan());
  }

  #[test]
  pub fn set_target() {
    let mut curve = AutomationCurve::new(0.0);
    curve.set_value_at_time(1.0, 0.0).unwrap();
    curve.set_target_at_time(0.0, 1.0, 0.5).unwrap();
    assert_approx(curve.get_value_at_time(1.0), 1.0);
    assert_approx(curve.get_value_at_time(1.5), (-1.0_f64).exp());
    assert_approx(curve.integral(1.0, 1.5), 0.5 * (1.0 - (-1.0_f64).exp()));
  }

  #[test]
  pub fn set_target_without_time_constant_jumps() {
    let mut curve = AutomationCurve::new(1.0);
    curve.set_target_at_time(5.0, 1.0, 0.0).unwrap();
    assert_eq!(curve.get_value_at_time(1.0), 5.0);
  }

  #[test]
  pub fn rejects_non_finite_values() {
    let mut curve = AutomationCurve::new(1.0);
    assert!(curve.set_value_at_time(std::f64::NAN, 0.0).is_err());
    assert!(curve.set_value_at_time(1.0, std::f64::INFINITY).is_err());
    assert!(curve.set_target_at_time(5.0, 1.0, std::f64::INFINITY).is_err());
    assert!(curve.set_target_at_time(5.0, 1.0, std::f64::NEG_INFINITY).is_err());
    assert!(curve.set_target_at_time(5.0, 1.0, std::f64::NAN).is_err());
    assert!(curve.is_empty());
  }

  #[test]
  pub fn value_curve() {
    let mut curve = AutomationCurve::new(0.0);
    curve
      .set_value_curve_at_time(&[0.0, 1.0, 0.0], 1.0, 2.0)
      .unwrap();
    assert_approx(curve.get_value_at_time(1.5), 0.5);
    assert_approx(curve.get_value_at_time(2.0), 1.0);
    assert_approx(curve.get_value_at_time(2.5), 0.5);
    assert_approx(curve.get_value_at_time(3.0), 0.0);
  }

  #[test]
  pub fn linear_ramp_to_starts_from_current_value() {
    let mut curve = AutomationCurve::new(0.0);
    curve.set_value_at_time(2.0, 0.0).unwrap();
    curve.linear_ramp_to(4.0, 2.0, 1.0).unwrap();
    assert_approx(curve.get_value_at_time(0.5), 2.0);
    assert_approx(curve.get_value_at_time(1.0), 2.0);
    assert_approx(curve.get_value_at_time(2.0), 3.0);
    assert_approx(curve.get_value_at_time(3.0), 4.0);
  }

  #[test]
  pub fn target_ramp_to_lands_on_target() {
    let mut curve = AutomationCurve::new(0.0);
    curve.set_value_at_time(1.0, 0.0).unwrap();
    curve.target_ramp_to(10.0, 1.0, 0.0).unwrap();
    assert_approx(curve.get_value_at_time(1.0), 10.0);
    let middle = curve.get_value_at_time(0.5);
    assert!(middle > 1.0 && middle < 10.0);
  }

  #[test]
  pub fn cancel_scheduled_values() {
    let mut curve = AutomationCurve::new(0.0);
    curve.set_value_at_time(1.0, 0.0).unwrap();
    curve.set_value_at_time(2.0, 1.0).unwrap();
    curve.set_value_at_time(3.0, 2.0).unwrap();
    curve.cancel_scheduled_values(1.0);
    assert_eq!(curve.len(), 1);
    assert_eq!(curve.get_value_at_time(5.0), 1.0);
  }

  #[test]
  pub fn cancel_and_hold_inside_ramp() {
    let mut curve = AutomationCurve::new(0.0);
    curve.set_value_at_time(0.0, 0.0).unwrap();
    curve.linear_ramp_to_value_at_time(4.0, 4.0).unwrap();
    curve.cancel_and_hold_at_time(1.0).unwrap();
    assert_approx(curve.get_value_at_time(1.0), 1.0);
    assert_approx(curve.get_value_at_time(3.0), 1.0);
  }

  #[test]
  pub fn time_of_integral_inverts_integral() {
    let mut curve = AutomationCurve::new(0.0);
    curve.set_value_at_time(2.0, 0.0).unwrap();
    curve.linear_ramp_to_value_at_time(6.0, 2.0).unwrap();
    curve.exponential_ramp_to_value_at_time(3.0, 3.0).unwrap();
    curve.set_target_at_time(8.0, 4.0, 0.3).unwrap();
    for step in 1..60 {
      let time = f64::from(step) * 0.1;
      let area = curve.integral(0.0, time);
      assert_approx(curve.time_of_integral(0.0, area), time);
    }
  }

  #[test]
  pub fn time_of_integral_unreachable() {
    let mut curve = AutomationCurve::new(0.0);
    curve.set_value_at_time(1.0, 0.0).unwrap();
    curve.set_value_at_time(0.0, 1.0).unwrap();
    assert_approx(curve.time_of_integral(0.0, 0.5), 0.5);
    assert!(curve.time_of_integral(0.0, 2.0).is_infinite());
  }
}
