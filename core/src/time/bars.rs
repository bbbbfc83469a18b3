use std::fmt;

use crate::time::{Ppq, Signature, TicksTime};

const QUARTERS_PRECISION: f64 = 10_000.0;
const SIXTEENTHS_PRECISION: f64 = 1_000.0;

/// A position expressed as `bars:beats:sixteenths`, where beats are quarter notes and
/// every component counts from zero.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct BarsTime {
  bars: u32,
  beats: u32,
  sixteenths: f64,
}

impl BarsTime {
  pub fn new(bars: u32, beats: u32, sixteenths: f64) -> BarsTime {
    BarsTime {
      bars,
      beats,
      sixteenths,
    }
  }

  pub fn from_bars(bars: u32) -> BarsTime {
    BarsTime::new(bars, 0, 0.0)
  }

  pub fn from_ticks(ticks_time: TicksTime, signature: Signature, ppq: Ppq) -> BarsTime {
    let quarters = f64::from(ticks_time) / f64::from(ppq);
    let quarters = (quarters * QUARTERS_PRECISION).round() / QUARTERS_PRECISION;
    let quarters_per_bar = signature.quarters_per_bar();
    let bars = (quarters / quarters_per_bar + 1e-9).floor();
    let in_bar = (quarters - bars * quarters_per_bar).max(0.0);
    let beats = (in_bar + 1e-9).floor();
    let sixteenths = ((in_bar - beats).max(0.0) * 4.0 * SIXTEENTHS_PRECISION).round()
      / SIXTEENTHS_PRECISION;
    BarsTime {
      bars: bars as u32,
      beats: beats as u32,
      sixteenths,
    }
  }

  pub fn get_bars(&self) -> u32 {
    self.bars
  }

  pub fn get_beats(&self) -> u32 {
    self.beats
  }

  pub fn get_sixteenths(&self) -> f64 {
    self.sixteenths
  }

  pub fn to_quarters(&self, signature: Signature) -> f64 {
    f64::from(self.bars) * signature.quarters_per_bar()
      + f64::from(self.beats)
      + self.sixteenths / 4.0
  }

  pub fn to_ticks(&self, signature: Signature, ppq: Ppq) -> TicksTime {
    TicksTime::from_quarters(self.to_quarters(signature), ppq)
  }
}

impl fmt::Display for BarsTime {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}:{}:{}", self.bars, self.beats, self.sixteenths)
  }
}
