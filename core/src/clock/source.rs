//! Tick counting over a start, pause and stop history.
//!
//! Transition requests are kept as they were scheduled and replayed in time order to build the
//! effective state history, so calls may arrive in any order. During the replay redundant
//! transitions (pausing while stopped, starting while started, ...) have no effect.

use log::{trace, warn};

use crate::clock::PlaybackState;
use crate::signal::TickSignal;
use crate::time::Seconds;
use crate::timeline::{EventId, StateTimeline, Timeline};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Request {
  Stop,
  Pause,
  SetTicks(f64),
  Start(Option<f64>),
}

impl Request {
  // Order of requests sharing the same instant. A stop and a start together end started.
  fn rank(&self) -> u8 {
    match self {
      Request::Stop => 0,
      Request::Pause => 1,
      Request::SetTicks(_) => 2,
      Request::Start(_) => 3,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TickOffset {
  ticks: f64,
  seconds: Seconds,
}

/// A realized state change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
  pub state: PlaybackState,
  pub time: Seconds,
  pub offset: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TickSource {
  frequency: TickSignal,
  requests: Timeline<Request>,
  state: StateTimeline<PlaybackState>,
  transitions: Vec<Transition>,
  tick_offset: Timeline<TickOffset>,
}

impl TickSource {
  pub fn new(frequency: TickSignal) -> TickSource {
    let mut source = TickSource {
      frequency,
      requests: Timeline::new(),
      state: StateTimeline::new(PlaybackState::Stopped),
      transitions: Vec::new(),
      tick_offset: Timeline::new(),
    };
    source.realize();
    source
  }

  pub fn frequency(&self) -> &TickSignal {
    &self.frequency
  }

  /// Changes to the frequency take effect on the next replay, see `refresh`.
  pub fn frequency_mut(&mut self) -> &mut TickSignal {
    &mut self.frequency
  }

  pub fn get_state_at_time(&self, time: Seconds) -> PlaybackState {
    self.state.get_value_at_time(time)
  }

  pub fn transitions(&self) -> &[Transition] {
    &self.transitions
  }

  pub fn start(&mut self, time: Seconds, offset: Option<f64>) {
    self.request(time, Request::Start(offset));
  }

  pub fn pause(&mut self, time: Seconds) {
    self.request(time, Request::Pause);
  }

  pub fn stop(&mut self, time: Seconds) {
    self.request(time, Request::Stop);
  }

  pub fn set_ticks_at_time(&mut self, ticks: f64, time: Seconds) {
    self.request(time, Request::SetTicks(ticks));
  }

  /// Forgets every request at or after `after`.
  pub fn cancel(&mut self, after: Seconds) {
    self.requests.cancel(after);
    self.realize();
  }

  /// Rebuilds the history, for example after the frequency changed.
  pub fn refresh(&mut self) {
    self.realize();
  }

  pub fn request_count(&self) -> usize {
    self.requests.len()
  }

  /// Forgets the requests that no longer shape the history from `horizon` on: those before the
  /// last stop ahead of `horizon`, and tick changes replaced by a later one ahead of `horizon`.
  /// The history before `horizon` is not kept exact.
  pub fn forget_before(&mut self, horizon: Seconds) {
    let count = self.requests.len();

    let last_stop = self
      .transitions
      .iter()
      .rev()
      .find(|transition| transition.state == PlaybackState::Stopped && transition.time < horizon)
      .map(|transition| transition.time);
    if let Some(stop) = last_stop {
      self.requests.cancel_before(stop);
    }

    let mut replaced: Vec<EventId> = self
      .requests
      .iter()
      .take_while(|event| event.time() < horizon)
      .filter(|event| match event.value() {
        Request::SetTicks(_) => true,
        _ => false,
      })
      .map(|event| event.id())
      .collect();
    replaced.pop();
    for id in replaced {
      self.requests.remove(id);
    }

    if self.requests.len() != count {
      trace!(
        "Forgot {} requests before {}",
        count - self.requests.len(),
        horizon
      );
      self.realize();
    }
  }

  fn request(&mut self, time: Seconds, request: Request) {
    if !time.is_finite() {
      warn!("Ignoring {:?} at an invalid time {}", request, time);
      return;
    }
    self.requests.insert(time, request);
    self.realize();
  }

  fn realize(&mut self) {
    let mut requests: Vec<(Seconds, Request)> = self
      .requests
      .iter()
      .map(|event| (event.time(), *event.value()))
      .collect();
    requests.sort_by(|(time_a, request_a), (time_b, request_b)| {
      time_a
        .partial_cmp(time_b)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then(request_a.rank().cmp(&request_b.rank()))
    });

    let mut state = StateTimeline::new(PlaybackState::Stopped);
    let mut tick_offset = Timeline::new();
    let mut transitions = Vec::new();
    state.insert(PlaybackState::Stopped, std::f64::NEG_INFINITY);
    tick_offset.insert(
      std::f64::NEG_INFINITY,
      TickOffset {
        ticks: 0.0,
        seconds: 0.0,
      },
    );

    let mut current = PlaybackState::Stopped;
    for (time, request) in requests {
      let next = match request {
        Request::Start(_) if current != PlaybackState::Started => PlaybackState::Started,
        Request::Pause if current == PlaybackState::Started => PlaybackState::Paused,
        Request::Stop if current != PlaybackState::Stopped => PlaybackState::Stopped,
        Request::SetTicks(ticks) => {
          tick_offset.insert(time, self.offset(ticks, time));
          continue;
        }
        _ => {
          trace!("Ignoring {:?} at {} while {:?}", request, time, current);
          continue;
        }
      };

      let mut offset = None;
      match request {
        Request::Start(Some(ticks)) => {
          tick_offset.insert(time, self.offset(ticks, time));
          offset = Some(ticks);
        }
        Request::Stop => {
          tick_offset.insert(time, self.offset(0.0, time));
        }
        _ => {}
      }
      state.insert(next, time);
      transitions.push(Transition {
        state: next,
        time,
        offset,
      });
      current = next;
    }

    self.state = state;
    self.tick_offset = tick_offset;
    self.transitions = transitions;
  }

  fn offset(&self, ticks: f64, time: Seconds) -> TickOffset {
    TickOffset {
      ticks,
      seconds: self.frequency.get_duration_of_ticks(ticks, time),
    }
  }

  /// Ticks counted at `time`: zero while stopped, frozen while paused.
  pub fn get_ticks_at_time(&self, time: Seconds) -> f64 {
    let frequency = &self.frequency;
    self.walk(
      time,
      |from, to| frequency.get_ticks_at_time(to) - frequency.get_ticks_at_time(from),
      |offset| offset.ticks,
    )
  }

  /// Seconds spent started since the last stop at `time`.
  pub fn get_seconds_at_time(&self, time: Seconds) -> Seconds {
    self.walk(time, |from, to| to - from, |offset| offset.seconds)
  }

  // Accumulates `elapsed` over the started periods since the last stop before `time`,
  // restarting from an offset whenever one was set.
  fn walk<E, O>(&self, time: Seconds, elapsed: E, from_offset: O) -> f64
  where
    E: Fn(Seconds, Seconds) -> f64,
    O: Fn(&TickOffset) -> f64,
  {
    let stop = match self.state.get_last_state(PlaybackState::Stopped, time) {
      Some(stop) => stop.time(),
      None => return 0.0,
    };
    let events = self
      .state
      .iter_from(stop)
      .take_while(|event| event.time() <= time)
      .map(|event| (*event.value(), event.time()))
      .chain(std::iter::once((PlaybackState::Paused, time)));

    let mut last = (PlaybackState::Stopped, stop);
    let mut total = 0.0;
    for (state, event_time) in events {
      let mut period_start = last.1;
      if let Some(offset) = self.tick_offset.get(event_time) {
        if offset.time() >= last.1 {
          total = from_offset(offset.value());
          period_start = offset.time();
        }
      }
      if last.0 == PlaybackState::Started && state != PlaybackState::Started {
        total += elapsed(period_start, event_time);
      }
      last = (state, event_time);
    }
    total
  }

  /// The time at which the count reaches `tick`, assuming the source keeps the state it has at
  /// `before`.
  pub fn get_time_of_tick(&self, tick: f64, before: Seconds) -> Seconds {
    let offset_time = self.tick_offset.get(before).map_or(0.0, |event| event.time());
    let state_time = self.state.get(before).map_or(0.0, |event| event.time());
    let reference = offset_time.max(state_time);
    let absolute =
      self.frequency.get_ticks_at_time(reference) + tick - self.get_ticks_at_time(reference);
    self.frequency.get_time_of_tick(absolute)
  }

  /// Times of the ticks inside `[start, end)`, aligned to the start of each started period.
  pub fn tick_times_between(&self, start: Seconds, end: Seconds) -> Vec<Seconds> {
    let mut times = Vec::new();
    if end <= start {
      return times;
    }

    let mut periods = Vec::new();
    let mut last = self
      .state
      .get(start)
      .map(|event| (*event.value(), event.time()));
    for event in self.state.iter_between(start, end) {
      if let Some((PlaybackState::Started, period_start)) = last {
        if *event.value() != PlaybackState::Started {
          periods.push((period_start, event.time()));
        }
      }
      last = Some((*event.value(), event.time()));
    }
    if let Some((PlaybackState::Started, period_start)) = last {
      periods.push((period_start, std::f64::INFINITY));
    }

    for (period_start, period_end) in periods {
      let from = period_start.max(start);
      let to = period_end.min(end);
      let base = self.frequency.get_ticks_at_time(period_start);
      let elapsed = self.frequency.get_ticks_at_time(from) - base;
      let mut tick = (elapsed.floor() - 1.0).max(0.0);
      loop {
        let tick_time = self.frequency.get_time_of_tick(base + tick);
        if !tick_time.is_finite() || tick_time >= to {
          break;
        }
        if tick_time >= from {
          times.push(tick_time);
        }
        tick += 1.0;
      }
    }
    times
  }
}

#[cfg(test)]
mod test {

  use super::TickSource;
  use crate::clock::PlaybackState;
  use crate::signal::TickSignal;

  fn assert_approx(actual: f64, expected: f64) {
    assert!(
      (actual - expected).abs() < 1e-6,
      "expected {} but got {}",
      expected,
      actual
    );
  }

  fn source(frequency: f64) -> TickSource {
    TickSource::new(TickSignal::new(frequency))
  }

  #[test]
  pub fn stopped_by_default() {
    let source = source(10.0);
    assert_eq!(source.get_state_at_time(0.0), PlaybackState::Stopped);
    assert_eq!(source.get_ticks_at_time(5.0), 0.0);
    assert!(source.tick_times_between(0.0, 1.0).is_empty());
  }

  #[test]
  pub fn counts_while_started() {
    let mut source = source(20.0);
    source.start(0.0, None);
    source.pause(1.0);
    assert_approx(source.get_ticks_at_time(0.5), 10.0);
    assert_approx(source.get_ticks_at_time(1.0), 20.0);
    assert_approx(source.get_ticks_at_time(2.0), 20.0);
    assert_approx(source.get_seconds_at_time(2.0), 1.0);
  }

  #[test]
  pub fn resumes_after_pause_and_resets_on_stop() {
    let mut source = source(10.0);
    source.start(0.0, None);
    source.pause(1.0);
    source.start(2.0, None);
    source.stop(3.0);
    source.start(4.0, None);
    assert_approx(source.get_ticks_at_time(1.5), 10.0);
    assert_approx(source.get_ticks_at_time(2.5), 15.0);
    assert_approx(source.get_ticks_at_time(3.0), 0.0);
    assert_approx(source.get_ticks_at_time(3.5), 0.0);
    assert_approx(source.get_ticks_at_time(4.5), 5.0);
  }

  #[test]
  pub fn start_with_offset() {
    let mut source = source(10.0);
    source.start(1.0, Some(100.0));
    assert_approx(source.get_ticks_at_time(1.0), 100.0);
    assert_approx(source.get_ticks_at_time(2.0), 110.0);
  }

  #[test]
  pub fn set_ticks_while_started() {
    let mut source = source(10.0);
    source.start(0.0, None);
    source.set_ticks_at_time(5.0, 1.0);
    assert_approx(source.get_ticks_at_time(0.5), 5.0);
    assert_approx(source.get_ticks_at_time(1.0), 5.0);
    assert_approx(source.get_ticks_at_time(1.5), 10.0);
  }

  #[test]
  pub fn calls_in_any_order() {
    let mut ordered = source(10.0);
    ordered.start(0.0, None);
    ordered.pause(0.1);
    ordered.stop(0.2);
    ordered.start(0.3, None);

    let mut shuffled = source(10.0);
    shuffled.start(0.3, None);
    shuffled.stop(0.2);
    shuffled.start(0.0, None);
    shuffled.pause(0.1);

    assert_eq!(ordered.transitions(), shuffled.transitions());
    for step in 0..5 {
      let time = f64::from(step) * 0.1 + 0.05;
      assert_eq!(ordered.get_state_at_time(time), shuffled.get_state_at_time(time));
    }
  }

  #[test]
  pub fn redundant_transitions_are_ignored() {
    let mut source = source(10.0);
    source.pause(0.5);
    source.stop(0.6);
    assert!(source.transitions().is_empty());
    source.start(1.0, None);
    source.start(1.5, None);
    assert_eq!(source.transitions().len(), 1);
  }

  #[test]
  pub fn stop_and_start_together_end_started() {
    let mut source = source(10.0);
    source.start(0.0, None);
    source.start(1.0, None);
    source.stop(1.0);
    assert_eq!(source.get_state_at_time(1.0), PlaybackState::Started);
    assert_approx(source.get_ticks_at_time(1.5), 5.0);
  }

  #[test]
  pub fn tick_times_between() {
    let mut source = source(10.0);
    source.start(0.0, None);
    source.stop(0.45);
    let times = source.tick_times_between(0.0, 1.0);
    assert_eq!(times.len(), 5);
    for (index, time) in times.iter().enumerate() {
      assert_approx(*time, index as f64 * 0.1);
    }
  }

  #[test]
  pub fn tick_times_do_not_repeat_across_windows() {
    let mut source = source(10.0);
    source.start(0.05, None);
    let mut times = Vec::new();
    let mut start = 0.0;
    while start < 1.0 {
      times.extend(source.tick_times_between(start, start + 0.03));
      start += 0.03;
    }
    assert_eq!(times.len(), 10);
    for (index, time) in times.iter().enumerate() {
      assert_approx(*time, 0.05 + index as f64 * 0.1);
    }
  }

  #[test]
  pub fn time_of_tick() {
    let mut source = source(10.0);
    source.start(1.0, None);
    assert_approx(source.get_time_of_tick(5.0, 1.5), 1.5);
    source.pause(2.0);
    source.start(3.0, None);
    assert_approx(source.get_time_of_tick(15.0, 3.5), 3.5);
  }

  #[test]
  pub fn forget_before_keeps_the_history_ahead() {
    let mut source = source(10.0);
    source.start(0.0, None);
    for step in 1..=20 {
      source.set_ticks_at_time(0.0, f64::from(step) * 0.5);
    }
    let ahead: Vec<f64> = (40..60)
      .map(|step| source.get_ticks_at_time(f64::from(step) * 0.25))
      .collect();

    source.forget_before(10.0);
    assert_eq!(source.request_count(), 3);
    for (step, ticks) in (40..60).zip(ahead.iter()) {
      assert_approx(source.get_ticks_at_time(f64::from(step) * 0.25), *ticks);
    }

    source.stop(11.0);
    source.start(12.0, None);
    source.forget_before(11.5);
    assert_eq!(source.request_count(), 2);
    assert_eq!(source.get_state_at_time(11.7), PlaybackState::Stopped);
    assert_eq!(source.get_state_at_time(12.2), PlaybackState::Started);
    assert_approx(source.get_ticks_at_time(12.5), 5.0);
    assert_approx(source.get_seconds_at_time(12.5), 0.5);
  }

  #[test]
  pub fn cancel_forgets_later_requests() {
    let mut source = source(10.0);
    source.start(0.0, None);
    source.stop(1.0);
    source.cancel(1.0);
    assert_eq!(source.get_state_at_time(2.0), PlaybackState::Started);
  }
}
