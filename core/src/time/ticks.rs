use std::{
  cmp::min,
  fmt,
  ops::{Add, AddAssign, Div, Mul, Rem, Sub, SubAssign},
};

use crate::time::{Ppq, Signature};

/// An integer position or length measured in ticks.
#[derive(Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone)]
pub struct TicksTime(u64);

impl TicksTime {
  pub fn new(ticks: u64) -> TicksTime {
    TicksTime(ticks)
  }

  pub fn zero() -> TicksTime {
    TicksTime(0)
  }

  /// Rounds a fractional tick count to the nearest tick. Negative values clamp to zero.
  pub fn from_f64(ticks: f64) -> TicksTime {
    if ticks.is_finite() && ticks > 0.0 {
      TicksTime(ticks.round() as u64)
    } else {
      TicksTime(0)
    }
  }

  pub fn per_quarter(ppq: Ppq) -> TicksTime {
    TicksTime(u64::from(ppq))
  }

  pub fn per_bar(signature: Signature, ppq: Ppq) -> TicksTime {
    TicksTime::from_f64(signature.quarters_per_bar() * f64::from(ppq))
  }

  pub fn from_quarters(quarters: f64, ppq: Ppq) -> TicksTime {
    TicksTime::from_f64(quarters * f64::from(ppq))
  }

  pub fn to_quarters(&self, ppq: Ppq) -> f64 {
    self.0 as f64 / f64::from(ppq)
  }

  pub fn is_zero(&self) -> bool {
    self.0 == 0
  }
}

impl fmt::Display for TicksTime {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}i", self.0)
  }
}

impl Add for TicksTime {
  type Output = TicksTime;
  fn add(self, rhs: TicksTime) -> Self {
    TicksTime::new(self.0.saturating_add(rhs.0))
  }
}

impl AddAssign for TicksTime {
  fn add_assign(&mut self, rhs: TicksTime) {
    *self = *self + rhs;
  }
}

impl Sub for TicksTime {
  type Output = TicksTime;
  fn sub(self, rhs: TicksTime) -> Self {
    TicksTime::new(self.0 - min(self.0, rhs.0))
  }
}

impl SubAssign for TicksTime {
  fn sub_assign(&mut self, rhs: TicksTime) {
    *self = *self - rhs;
  }
}

impl Mul<u64> for TicksTime {
  type Output = TicksTime;
  fn mul(self, rhs: u64) -> Self {
    TicksTime::new(self.0.saturating_mul(rhs))
  }
}

impl Div<u64> for TicksTime {
  type Output = TicksTime;
  fn div(self, rhs: u64) -> Self {
    TicksTime::new(self.0 / rhs)
  }
}

impl Rem for TicksTime {
  type Output = TicksTime;
  fn rem(self, rhs: TicksTime) -> Self {
    TicksTime::new(self.0 % rhs.0)
  }
}

impl From<u64> for TicksTime {
  fn from(ticks: u64) -> Self {
    TicksTime(ticks)
  }
}

impl From<TicksTime> for f64 {
  fn from(item: TicksTime) -> Self {
    item.0 as f64
  }
}

impl From<TicksTime> for u64 {
  fn from(item: TicksTime) -> Self {
    item.0
  }
}
