use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use crate::time::Seconds;

/// Monotonic seconds supplied by the host.
pub trait TimeSource {
  fn now(&self) -> Seconds;
}

///! Wall clock seconds elapsed since the source was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemTime {
  origin: Instant,
}

impl SystemTime {
  pub fn new() -> SystemTime {
    SystemTime {
      origin: Instant::now(),
    }
  }

  pub fn origin(&self) -> Instant {
    self.origin
  }
}

impl Default for SystemTime {
  fn default() -> SystemTime {
    SystemTime::new()
  }
}

impl TimeSource for SystemTime {
  fn now(&self) -> Seconds {
    let elapsed = self.origin.elapsed();
    elapsed.as_secs() as f64 + f64::from(elapsed.subsec_nanos()) * 1e-9
  }
}

///! A settable clock for offline rendering and tests. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
  now: Rc<Cell<Seconds>>,
}

impl ManualTime {
  pub fn new() -> ManualTime {
    ManualTime::at(0.0)
  }

  pub fn at(time: Seconds) -> ManualTime {
    ManualTime {
      now: Rc::new(Cell::new(time)),
    }
  }

  pub fn set(&self, time: Seconds) {
    self.now.set(time);
  }

  pub fn advance(&self, delta: Seconds) {
    self.now.set(self.now.get() + delta);
  }
}

impl TimeSource for ManualTime {
  fn now(&self) -> Seconds {
    self.now.get()
  }
}

#[cfg(test)]
mod test {

  use super::{ManualTime, SystemTime, TimeSource};

  #[test]
  pub fn manual_time_shared_between_clones() {
    let time = ManualTime::new();
    let other = time.clone();
    time.set(1.5);
    assert_eq!(other.now(), 1.5);
    other.advance(0.25);
    assert_eq!(time.now(), 1.75);
  }

  #[test]
  pub fn system_time_is_monotonic() {
    let time = SystemTime::new();
    let first = time.now();
    let second = time.now();
    assert!(first >= 0.0);
    assert!(second >= first);
  }
}
