use crate::time::{Ppq, Seconds};

const SECONDS_PER_MINUTE: f64 = 60.0;

/// Tempo in quarter notes per minute.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Tempo(f64);

impl Tempo {
  pub fn new(bpm: f64) -> Tempo {
    Tempo(bpm)
  }

  pub fn from_ticks_per_second(ticks_per_second: f64, ppq: Ppq) -> Tempo {
    Tempo(ticks_per_second * SECONDS_PER_MINUTE / f64::from(ppq))
  }

  pub fn get_value(&self) -> f64 {
    self.0
  }

  /// The tick rate of this tempo, `bpm / 60 * ppq`.
  pub fn ticks_per_second(&self, ppq: Ppq) -> f64 {
    self.0 / SECONDS_PER_MINUTE * f64::from(ppq)
  }

  /// Multiplier converting a bpm value into ticks per second.
  pub fn multiplier(ppq: Ppq) -> f64 {
    f64::from(ppq) / SECONDS_PER_MINUTE
  }

  pub fn seconds_per_quarter(&self) -> Seconds {
    SECONDS_PER_MINUTE / self.0
  }
}

impl Default for Tempo {
  fn default() -> Tempo {
    Tempo(120.0)
  }
}

impl From<Tempo> for f64 {
  fn from(item: Tempo) -> Self {
    item.0
  }
}

#[cfg(test)]
mod test {

  use super::Tempo;

  #[test]
  pub fn tempo_new() {
    let tempo = Tempo::new(120.0);
    assert_eq!(tempo.get_value(), 120.0);
  }

  #[test]
  pub fn tempo_ticks_per_second() {
    let tempo = Tempo::new(120.0);
    assert_eq!(tempo.ticks_per_second(192), 384.0);
    assert_eq!(Tempo::from_ticks_per_second(384.0, 192), tempo);
  }

  #[test]
  pub fn tempo_seconds_per_quarter() {
    assert_eq!(Tempo::new(120.0).seconds_per_quarter(), 0.5);
    assert_eq!(Tempo::new(60.0).seconds_per_quarter(), 1.0);
  }

  #[test]
  pub fn tempo_multiplier() {
    assert_eq!(Tempo::multiplier(120) * 100.0, 200.0);
  }
}
