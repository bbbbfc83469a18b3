//! A real-time tick generator.
//!
//! The clock polls its time source with a look-ahead window and reports every tick that falls
//! inside the window together with its exact time, derived from the tick frequency integral.

pub mod source;

use std::fmt;
use std::rc::Rc;

use log::{debug, trace, warn};

use crate::disposable::Disposable;
use crate::signal::TickSignal;
use crate::time::{Seconds, TimeSource};

pub use self::source::{TickSource, Transition};

pub const DEFAULT_LOOK_AHEAD: Seconds = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackState {
  Started,
  Paused,
  Stopped,
}

impl fmt::Display for PlaybackState {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let name = match self {
      PlaybackState::Started => "started",
      PlaybackState::Paused => "paused",
      PlaybackState::Stopped => "stopped",
    };
    write!(f, "{}", name)
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockEvent {
  Start { time: Seconds, offset: Option<f64> },
  Pause { time: Seconds },
  Stop { time: Seconds },
}

impl ClockEvent {
  fn from_transition(transition: &Transition) -> ClockEvent {
    match transition.state {
      PlaybackState::Started => ClockEvent::Start {
        time: transition.time,
        offset: transition.offset,
      },
      PlaybackState::Paused => ClockEvent::Pause {
        time: transition.time,
      },
      PlaybackState::Stopped => ClockEvent::Stop {
        time: transition.time,
      },
    }
  }

  pub fn time(&self) -> Seconds {
    match *self {
      ClockEvent::Start { time, .. } | ClockEvent::Pause { time } | ClockEvent::Stop { time } => {
        time
      }
    }
  }
}

pub type ClockListener = Box<dyn FnMut(&ClockEvent)>;

pub struct Clock {
  source: TickSource,
  time_source: Rc<dyn TimeSource>,
  look_ahead: Seconds,
  last_update: Seconds,
  listeners: Vec<ClockListener>,
  disposable: Disposable,
}

impl Clock {
  /// A clock ticking `frequency` times per second.
  pub fn new(frequency: f64, time_source: Rc<dyn TimeSource>) -> Clock {
    Clock::with_signal(TickSignal::new(frequency), time_source)
  }

  pub fn with_signal(frequency: TickSignal, time_source: Rc<dyn TimeSource>) -> Clock {
    let last_update = time_source.now();
    Clock {
      source: TickSource::new(frequency),
      time_source,
      look_ahead: DEFAULT_LOOK_AHEAD,
      last_update,
      listeners: Vec::new(),
      disposable: Disposable::new(),
    }
  }

  pub fn frequency(&self) -> &TickSignal {
    self.source.frequency()
  }

  /// Edits the frequency curve. The start, pause and stop history is rebuilt afterwards.
  pub fn with_frequency<F, R>(&mut self, edit: F) -> R
  where
    F: FnOnce(&mut TickSignal) -> R,
  {
    let result = edit(self.source.frequency_mut());
    self.source.refresh();
    result
  }

  pub fn look_ahead(&self) -> Seconds {
    self.look_ahead
  }

  pub fn set_look_ahead(&mut self, look_ahead: Seconds) {
    self.look_ahead = look_ahead.max(0.0);
  }

  /// The time the clock schedules for: the time source plus the look-ahead.
  pub fn now(&self) -> Seconds {
    self.time_source.now() + self.look_ahead
  }

  pub fn subscribe<F>(&mut self, listener: F)
  where
    F: FnMut(&ClockEvent) + 'static,
  {
    self.listeners.push(Box::new(listener));
  }

  pub fn state(&self) -> PlaybackState {
    self.get_state_at_time(self.now())
  }

  pub fn get_state_at_time(&self, time: Seconds) -> PlaybackState {
    self.source.get_state_at_time(time)
  }

  pub fn start(&mut self, time: Seconds, offset: Option<f64>) -> &mut Self {
    if self.accepts("start", time) {
      self.transition(|source| source.start(time, offset));
    }
    self
  }

  pub fn pause(&mut self, time: Seconds) -> &mut Self {
    if self.accepts("pause", time) {
      self.transition(|source| source.pause(time));
    }
    self
  }

  pub fn stop(&mut self, time: Seconds) -> &mut Self {
    if self.accepts("stop", time) {
      self.transition(|source| source.stop(time));
    }
    self
  }

  /// Forgets every transition and tick change scheduled at or after `after`.
  pub fn cancel(&mut self, after: Seconds) -> &mut Self {
    self.source.cancel(after);
    self
  }

  fn accepts(&self, action: &str, time: Seconds) -> bool {
    if self.disposable.is_disposed() {
      warn!("Ignoring {} on a disposed clock", action);
      false
    } else if !time.is_finite() {
      warn!("Ignoring {} at an invalid time {}", action, time);
      false
    } else {
      true
    }
  }

  // Applies a change and notifies the transitions it realized.
  fn transition<F>(&mut self, change: F)
  where
    F: FnOnce(&mut TickSource),
  {
    let before = self.source.transitions().to_vec();
    change(&mut self.source);
    let realized: Vec<ClockEvent> = self
      .source
      .transitions()
      .iter()
      .filter(|transition| !before.contains(transition))
      .map(ClockEvent::from_transition)
      .collect();
    if realized.is_empty() {
      debug!("Clock transition had no effect");
    }
    for event in realized.iter() {
      debug!("Clock {:?}", event);
      for listener in self.listeners.iter_mut() {
        listener(event);
      }
    }
  }

  /// Rounded ticks at `now()`.
  pub fn ticks(&self) -> u64 {
    round_ticks(self.get_ticks_at_time(self.now()))
  }

  pub fn set_ticks(&mut self, ticks: u64) {
    let now = self.now();
    self.set_ticks_at_time(ticks as f64, now);
  }

  pub fn get_ticks_at_time(&self, time: Seconds) -> f64 {
    self.source.get_ticks_at_time(time)
  }

  pub fn set_ticks_at_time(&mut self, ticks: f64, time: Seconds) {
    if self.accepts("setting ticks", time) {
      self.source.set_ticks_at_time(ticks, time);
    }
  }

  /// Seconds spent started since the last stop, at `now()`.
  pub fn seconds(&self) -> Seconds {
    self.get_seconds_at_time(self.now())
  }

  pub fn get_seconds_at_time(&self, time: Seconds) -> Seconds {
    self.source.get_seconds_at_time(time)
  }

  pub fn get_time_of_tick(&self, tick: f64, before: Seconds) -> Seconds {
    self.source.get_time_of_tick(tick, before)
  }

  /// The time `offset` ticks after the tick count at `when`.
  pub fn next_tick_time(&self, offset: f64, when: Seconds) -> Seconds {
    let current = self.get_ticks_at_time(when);
    self.source.get_time_of_tick(current + offset, when)
  }

  /// Tick times between the previous poll and `now()`. Advances the poll window.
  pub fn pending_tick_times(&mut self) -> Vec<Seconds> {
    if self.disposable.is_disposed() {
      return Vec::new();
    }
    let start = self.last_update;
    let end = self.now();
    if end <= start {
      return Vec::new();
    }
    self.last_update = end;
    self.source.forget_before(start);
    let times = self.source.tick_times_between(start, end);
    trace!("Clock window [{}, {}) has {} ticks", start, end, times.len());
    times
  }

  /// Invokes `callback` with the time and tick count of every tick between the previous poll
  /// and `now()`.
  pub fn update<F>(&mut self, mut callback: F)
  where
    F: FnMut(Seconds, u64),
  {
    for time in self.pending_tick_times() {
      callback(time, round_ticks(self.get_ticks_at_time(time)));
    }
  }

  pub fn dispose(&mut self) {
    if self.disposable.dispose() {
      self.listeners.clear();
      self.source.frequency_mut().dispose();
    }
  }

  pub fn is_disposed(&self) -> bool {
    self.disposable.is_disposed()
  }
}

pub(crate) fn round_ticks(ticks: f64) -> u64 {
  if ticks.is_finite() && ticks > 0.0 {
    ticks.round() as u64
  } else {
    0
  }
}

#[cfg(test)]
mod test {

  use std::cell::RefCell;
  use std::rc::Rc;

  use super::{Clock, ClockEvent, PlaybackState};
  use crate::time::{ManualTime, TimeSource};

  fn assert_approx(actual: f64, expected: f64) {
    assert!(
      (actual - expected).abs() < 1e-6,
      "expected {} but got {}",
      expected,
      actual
    );
  }

  fn manual_clock(frequency: f64) -> (Clock, ManualTime) {
    let time = ManualTime::new();
    let mut clock = Clock::new(frequency, Rc::new(time.clone()));
    clock.set_look_ahead(0.0);
    (clock, time)
  }

  #[test]
  pub fn frozen_while_paused() {
    let (mut clock, _) = manual_clock(20.0);
    clock.start(0.0, None).pause(1.0);
    assert_approx(clock.get_ticks_at_time(0.5), 10.0);
    assert_approx(clock.get_ticks_at_time(1.0), 20.0);
    assert_approx(clock.get_ticks_at_time(2.0), 20.0);
  }

  #[test]
  pub fn scheduled_transitions() {
    let (mut clock, time) = manual_clock(10.0);
    clock.start(0.0, None).pause(0.1).stop(0.2).start(0.3, None);
    assert_eq!(clock.state(), PlaybackState::Started);
    time.set(0.15);
    assert_eq!(clock.state(), PlaybackState::Paused);
    time.set(0.25);
    assert_eq!(clock.state(), PlaybackState::Stopped);
    time.set(0.35);
    assert_eq!(clock.state(), PlaybackState::Started);
  }

  #[test]
  pub fn state_follows_look_ahead() {
    let (mut clock, _) = manual_clock(10.0);
    clock.set_look_ahead(0.1);
    clock.start(0.05, None);
    assert_eq!(clock.state(), PlaybackState::Started);
    assert_eq!(clock.get_state_at_time(0.0), PlaybackState::Stopped);
  }

  #[test]
  pub fn bounded_run_tick_count() {
    let (mut clock, time) = manual_clock(10.0);
    clock.start(0.0, None).stop(0.45);
    let mut ticks = Vec::new();
    while time.now() < 1.0 {
      time.advance(0.03);
      clock.update(|time, tick| ticks.push((time, tick)));
    }
    assert_eq!(ticks.len(), 5);
    for (index, (time, tick)) in ticks.iter().enumerate() {
      assert_approx(*time, index as f64 * 0.1);
      assert_eq!(*tick, index as u64);
    }
  }

  #[test]
  pub fn ticks_preserved_across_pause_and_reset_on_stop() {
    let (mut clock, time) = manual_clock(10.0);
    clock.start(0.0, None).pause(1.0).start(2.0, None).stop(3.0);
    time.set(1.5);
    assert_eq!(clock.ticks(), 10);
    time.set(2.5);
    assert_eq!(clock.ticks(), 15);
    time.set(3.0);
    assert_eq!(clock.ticks(), 0);
  }

  #[test]
  pub fn tick_times_follow_tempo_ramps() {
    let (mut clock, time) = manual_clock(1.0);
    clock
      .with_frequency(|frequency| frequency.linear_ramp_to_value_at_time(3.0, 2.0))
      .unwrap();
    clock.start(0.0, None);
    let mut coarse = Vec::new();
    time.set(4.0);
    clock.update(|time, _| coarse.push(time));

    let (mut fine_clock, fine_time) = manual_clock(1.0);
    fine_clock
      .with_frequency(|frequency| frequency.linear_ramp_to_value_at_time(3.0, 2.0))
      .unwrap();
    fine_clock.start(0.0, None);
    let mut fine = Vec::new();
    for step in 1..=400 {
      fine_time.set(f64::from(step) * 0.01);
      fine_clock.update(|time, _| fine.push(time));
    }

    assert_eq!(coarse.len(), fine.len());
    for (a, b) in coarse.iter().zip(fine.iter()) {
      assert_approx(*a, *b);
    }
    assert_approx(coarse[2], 5.0_f64.sqrt() - 1.0);
  }

  #[test]
  pub fn events_are_emitted_synchronously() {
    let (mut clock, _) = manual_clock(10.0);
    let events = Rc::new(RefCell::new(Vec::new()));
    let received = events.clone();
    clock.subscribe(move |event| received.borrow_mut().push(*event));
    clock.start(1.0, Some(4.0)).pause(2.0).stop(3.0);
    clock.pause(5.0);
    assert_eq!(
      *events.borrow(),
      vec![
        ClockEvent::Start {
          time: 1.0,
          offset: Some(4.0)
        },
        ClockEvent::Pause { time: 2.0 },
        ClockEvent::Stop { time: 3.0 },
      ]
    );
  }

  #[test]
  pub fn invalid_times_are_ignored() {
    let (mut clock, _) = manual_clock(10.0);
    clock.start(std::f64::NAN, None);
    assert_eq!(clock.get_state_at_time(1.0), PlaybackState::Stopped);
  }

  #[test]
  pub fn next_tick_time() {
    let (mut clock, _) = manual_clock(10.0);
    clock.start(1.0, None);
    assert_approx(clock.next_tick_time(5.0, 1.25), 1.75);
    assert_approx(clock.get_seconds_at_time(1.5), 0.5);
  }

  #[test]
  pub fn repeated_tick_resets_keep_the_history_small() {
    let (mut clock, time) = manual_clock(10.0);
    clock.start(0.0, None);
    let mut ticks = Vec::new();
    for _ in 0..2000 {
      time.advance(0.05);
      let mut times = Vec::new();
      clock.update(|time, tick| {
        times.push(time);
        ticks.push(tick);
      });
      for time in times {
        clock.set_ticks_at_time(0.0, time);
      }
      assert!(clock.source.request_count() <= 3);
    }
    assert!(ticks.len() >= 999);
    assert_eq!(ticks[0], 0);
    assert!(ticks[1..].iter().all(|tick| *tick == 1));
  }

  #[test]
  pub fn dispose_stops_updates() {
    let (mut clock, time) = manual_clock(10.0);
    clock.start(0.0, None);
    clock.dispose();
    time.set(1.0);
    let mut count = 0;
    clock.update(|_, _| count += 1);
    assert_eq!(count, 0);
    assert!(clock.is_disposed());
  }
}
