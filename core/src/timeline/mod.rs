//! Time ordered event stores.

pub mod interval;
pub mod state;

use std::fmt;
use std::ops::Range;

use failure::Fail;
use uuid::Uuid;

use crate::disposable::Disposable;

pub use self::interval::{IntervalEvent, IntervalTimeline};
pub use self::state::StateTimeline;

#[derive(Debug, Fail, PartialEq)]
pub enum TimelineError {
  #[fail(display = "Invalid event time: {}", time)]
  InvalidTime { time: f64 },

  #[fail(display = "Invalid event duration: {}", duration)]
  InvalidDuration { duration: f64 },

  #[fail(display = "Invalid value: {}", value)]
  InvalidValue { value: f64 },

  #[fail(display = "Event at {} is earlier than the last one at {}", time, last)]
  NotIncreasing { time: f64, last: f64 },

  #[fail(display = "The timeline has been disposed")]
  Disposed,
}

pub type TimelineResult<T> = Result<T, TimelineError>;

/// Identity of a stored event, stable across reordering and removals.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct EventId(Uuid);

impl EventId {
  pub fn new() -> EventId {
    EventId(Uuid::new_v4())
  }
}

impl Default for EventId {
  fn default() -> EventId {
    EventId::new()
  }
}

impl fmt::Display for EventId {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub(crate) fn check_time(time: f64) -> TimelineResult<()> {
  if time.is_finite() {
    Ok(())
  } else {
    Err(TimelineError::InvalidTime { time })
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEvent<T> {
  id: EventId,
  time: f64,
  value: T,
}

impl<T> TimelineEvent<T> {
  pub fn id(&self) -> EventId {
    self.id
  }

  pub fn time(&self) -> f64 {
    self.time
  }

  pub fn value(&self) -> &T {
    &self.value
  }

  pub fn into_value(self) -> T {
    self.value
  }
}

///! Events sorted by time. Among equal times, later insertions sort after earlier ones.
#[derive(Debug, Clone)]
pub struct Timeline<T> {
  events: Vec<TimelineEvent<T>>,
  memory: Option<usize>,
  increasing: bool,
  disposable: Disposable,
}

impl<T> Default for Timeline<T> {
  fn default() -> Self {
    Timeline::new()
  }
}

impl<T> Timeline<T> {
  pub fn new() -> Timeline<T> {
    Timeline {
      events: Vec::new(),
      memory: None,
      increasing: false,
      disposable: Disposable::new(),
    }
  }

  /// A timeline that keeps at most `memory` events, evicting the oldest ones.
  pub fn with_memory(memory: usize) -> Timeline<T> {
    Timeline {
      memory: Some(memory),
      ..Timeline::new()
    }
  }

  /// Only accept events at or after the last one.
  pub fn set_increasing(&mut self, increasing: bool) {
    self.increasing = increasing;
  }

  pub fn len(&self) -> usize {
    self.events.len()
  }

  pub fn is_empty(&self) -> bool {
    self.events.is_empty()
  }

  pub fn add(&mut self, time: f64, value: T) -> TimelineResult<EventId> {
    if self.disposable.is_disposed() {
      return Err(TimelineError::Disposed);
    }
    check_time(time)?;
    if self.increasing {
      if let Some(last) = self.events.last() {
        if time < last.time {
          return Err(TimelineError::NotIncreasing {
            time,
            last: last.time,
          });
        }
      }
    }
    Ok(self.insert(time, value))
  }

  /// Inserts without validating, for callers that already checked the time.
  pub(crate) fn insert(&mut self, time: f64, value: T) -> EventId {
    let id = EventId::new();
    let index = self.position(time);
    self.events.insert(index, TimelineEvent { id, time, value });
    if let Some(memory) = self.memory {
      if self.events.len() > memory {
        let overflow = self.events.len() - memory;
        self.events.drain(0..overflow);
      }
    }
    id
  }

  /// Removes the event with this id. Absent ids are ignored.
  pub fn remove(&mut self, id: EventId) -> Option<TimelineEvent<T>> {
    self.index_of(id).map(|index| self.events.remove(index))
  }

  pub fn index_of(&self, id: EventId) -> Option<usize> {
    self.events.iter().position(|event| event.id == id)
  }

  pub fn get_at(&self, index: usize) -> Option<&TimelineEvent<T>> {
    self.events.get(index)
  }

  pub fn get_by_id(&self, id: EventId) -> Option<&TimelineEvent<T>> {
    self.index_of(id).map(|index| &self.events[index])
  }

  /// Number of events with `time <= at`, which is also where a new event at `at` lands.
  pub fn position(&self, at: f64) -> usize {
    self.events.partition_point(|event| event.time <= at)
  }

  /// Number of events with `time < at`.
  pub fn position_before(&self, at: f64) -> usize {
    self.events.partition_point(|event| event.time < at)
  }

  /// The latest event with `time <= at`.
  pub fn get(&self, at: f64) -> Option<&TimelineEvent<T>> {
    match self.position(at) {
      0 => None,
      index => self.events.get(index - 1),
    }
  }

  /// The latest event with `time < at`.
  pub fn get_before(&self, at: f64) -> Option<&TimelineEvent<T>> {
    match self.position_before(at) {
      0 => None,
      index => self.events.get(index - 1),
    }
  }

  /// The first event with `time > at`.
  pub fn get_after(&self, at: f64) -> Option<&TimelineEvent<T>> {
    self.events.get(self.position(at))
  }

  pub fn previous_event(&self, id: EventId) -> Option<&TimelineEvent<T>> {
    match self.index_of(id) {
      Some(index) if index > 0 => self.events.get(index - 1),
      _ => None,
    }
  }

  pub fn peek(&self) -> Option<&TimelineEvent<T>> {
    self.events.first()
  }

  pub fn shift(&mut self) -> Option<TimelineEvent<T>> {
    if self.events.is_empty() {
      None
    } else {
      Some(self.events.remove(0))
    }
  }

  /// Removes every event with `time >= after`.
  pub fn cancel(&mut self, after: f64) {
    let index = self.position_before(after);
    self.events.truncate(index);
  }

  /// Removes every event with `time < before`.
  pub fn cancel_before(&mut self, before: f64) {
    let index = self.position_before(before);
    self.events.drain(0..index);
  }

  pub fn clear(&mut self) {
    self.events.clear();
  }

  pub fn dispose(&mut self) {
    if self.disposable.dispose() {
      self.events.clear();
    }
  }

  pub fn is_disposed(&self) -> bool {
    self.disposable.is_disposed()
  }

  pub fn iter(&self) -> std::slice::Iter<TimelineEvent<T>> {
    self.events.iter()
  }

  /// Events with `time <= at`.
  pub fn iter_before(&self, at: f64) -> std::slice::Iter<TimelineEvent<T>> {
    self.events[self.range_before(at)].iter()
  }

  /// Events with `time > at`.
  pub fn iter_after(&self, at: f64) -> std::slice::Iter<TimelineEvent<T>> {
    self.events[self.range_after(at)].iter()
  }

  /// Events with `time >= at`.
  pub fn iter_from(&self, at: f64) -> std::slice::Iter<TimelineEvent<T>> {
    self.events[self.range_from(at)].iter()
  }

  /// Events with `time == at`.
  pub fn iter_at_time(&self, at: f64) -> std::slice::Iter<TimelineEvent<T>> {
    self.events[self.range_at_time(at)].iter()
  }

  /// Events with `start <= time < end`.
  pub fn iter_between(&self, start: f64, end: f64) -> std::slice::Iter<TimelineEvent<T>> {
    self.events[self.range_between(start, end)].iter()
  }

  fn range_before(&self, at: f64) -> Range<usize> {
    0..self.position(at)
  }

  fn range_after(&self, at: f64) -> Range<usize> {
    self.position(at)..self.events.len()
  }

  fn range_from(&self, at: f64) -> Range<usize> {
    self.position_before(at)..self.events.len()
  }

  fn range_at_time(&self, at: f64) -> Range<usize> {
    self.position_before(at)..self.position(at)
  }

  fn range_between(&self, start: f64, end: f64) -> Range<usize> {
    let lower = self.position_before(start);
    let upper = self.position_before(end).max(lower);
    lower..upper
  }
}

impl<T: Clone> Timeline<T> {
  // Iterates a snapshot so the callback may add, remove or cancel events.
  fn iterate<F>(&mut self, range: Range<usize>, mut callback: F)
  where
    F: FnMut(&mut Timeline<T>, &TimelineEvent<T>),
  {
    let snapshot = self.events[range].to_vec();
    for event in snapshot.iter() {
      callback(self, event);
    }
  }

  pub fn for_each<F>(&mut self, callback: F)
  where
    F: FnMut(&mut Timeline<T>, &TimelineEvent<T>),
  {
    let range = 0..self.events.len();
    self.iterate(range, callback);
  }

  pub fn for_each_before<F>(&mut self, at: f64, callback: F)
  where
    F: FnMut(&mut Timeline<T>, &TimelineEvent<T>),
  {
    let range = self.range_before(at);
    self.iterate(range, callback);
  }

  pub fn for_each_after<F>(&mut self, at: f64, callback: F)
  where
    F: FnMut(&mut Timeline<T>, &TimelineEvent<T>),
  {
    let range = self.range_after(at);
    self.iterate(range, callback);
  }

  pub fn for_each_from<F>(&mut self, at: f64, callback: F)
  where
    F: FnMut(&mut Timeline<T>, &TimelineEvent<T>),
  {
    let range = self.range_from(at);
    self.iterate(range, callback);
  }

  pub fn for_each_at_time<F>(&mut self, at: f64, callback: F)
  where
    F: FnMut(&mut Timeline<T>, &TimelineEvent<T>),
  {
    let range = self.range_at_time(at);
    self.iterate(range, callback);
  }

  pub fn for_each_between<F>(&mut self, start: f64, end: f64, callback: F)
  where
    F: FnMut(&mut Timeline<T>, &TimelineEvent<T>),
  {
    let range = self.range_between(start, end);
    self.iterate(range, callback);
  }
}

#[cfg(test)]
mod test {

  use super::{Timeline, TimelineError, TimelineEvent};

  fn times<T>(timeline: &Timeline<T>) -> Vec<f64> {
    timeline.iter().map(|event| event.time()).collect()
  }

  #[test]
  pub fn add_keeps_time_order() {
    let mut timeline = Timeline::new();
    timeline.add(0.0, "a").unwrap();
    timeline.add(2.0, "b").unwrap();
    timeline.add(1.0, "c").unwrap();
    assert_eq!(times(&timeline), vec![0.0, 1.0, 2.0]);
    assert_eq!(timeline.len(), 3);
  }

  #[test]
  pub fn add_any_order_is_sorted() {
    let inserts = [5.0, 1.0, 3.0, 3.0, 0.0, 9.0, 2.5, 1.0, 7.0];
    let mut timeline = Timeline::new();
    for time in inserts.iter() {
      timeline.add(*time, ()).unwrap();
    }
    let stored = times(&timeline);
    assert!(stored.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(stored.len(), inserts.len());
  }

  #[test]
  pub fn equal_times_keep_insertion_order() {
    let mut timeline = Timeline::new();
    timeline.add(1.0, "first").unwrap();
    timeline.add(1.0, "second").unwrap();
    timeline.add(0.5, "before").unwrap();
    let values: Vec<&str> = timeline.iter().map(|event| *event.value()).collect();
    assert_eq!(values, vec!["before", "first", "second"]);
    assert_eq!(timeline.get(1.0).map(|event| *event.value()), Some("second"));
  }

  #[test]
  pub fn add_rejects_invalid_times() {
    let mut timeline = Timeline::new();
    assert!(timeline.add(std::f64::NAN, ()).is_err());
    assert_eq!(
      timeline.add(std::f64::INFINITY, ()),
      Err(TimelineError::InvalidTime {
        time: std::f64::INFINITY
      })
    );
    assert!(timeline.is_empty());
  }

  #[test]
  pub fn increasing_rejects_earlier_events() {
    let mut timeline = Timeline::new();
    timeline.set_increasing(true);
    timeline.add(1.0, ()).unwrap();
    timeline.add(1.0, ()).unwrap();
    assert_eq!(
      timeline.add(0.5, ()),
      Err(TimelineError::NotIncreasing {
        time: 0.5,
        last: 1.0
      })
    );
    assert_eq!(timeline.len(), 2);
  }

  #[test]
  pub fn get() {
    let mut timeline = Timeline::new();
    timeline.add(1.0, "a").unwrap();
    timeline.add(2.0, "b").unwrap();
    assert!(timeline.get(0.5).is_none());
    assert_eq!(timeline.get(1.0).map(|event| *event.value()), Some("a"));
    assert_eq!(timeline.get(1.5).map(|event| *event.value()), Some("a"));
    assert_eq!(timeline.get(10.0).map(|event| *event.value()), Some("b"));
  }

  #[test]
  pub fn get_before_and_after() {
    let mut timeline = Timeline::new();
    timeline.add(1.0, "a").unwrap();
    timeline.add(2.0, "b").unwrap();
    timeline.add(3.0, "c").unwrap();
    assert_eq!(timeline.get_before(2.0).map(|event| *event.value()), Some("a"));
    assert!(timeline.get_before(1.0).is_none());
    assert_eq!(timeline.get_after(2.0).map(|event| *event.value()), Some("c"));
    assert_eq!(timeline.get_after(0.0).map(|event| *event.value()), Some("a"));
    assert!(timeline.get_after(3.0).is_none());
  }

  #[test]
  pub fn remove_by_id() {
    let mut timeline = Timeline::new();
    let first = timeline.add(1.0, "a").unwrap();
    let second = timeline.add(2.0, "b").unwrap();
    assert_eq!(timeline.remove(first).map(|event| event.into_value()), Some("a"));
    assert!(timeline.remove(first).is_none());
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline.peek().map(|event| event.id()), Some(second));
  }

  #[test]
  pub fn previous_event() {
    let mut timeline = Timeline::new();
    let first = timeline.add(1.0, "a").unwrap();
    let second = timeline.add(2.0, "b").unwrap();
    assert_eq!(timeline.previous_event(second).map(|event| event.id()), Some(first));
    assert!(timeline.previous_event(first).is_none());
  }

  #[test]
  pub fn cancel_removes_suffix() {
    let mut timeline = Timeline::new();
    for time in [0.0, 1.0, 2.0, 2.0, 3.0].iter() {
      timeline.add(*time, ()).unwrap();
    }
    timeline.cancel(2.0);
    assert_eq!(times(&timeline), vec![0.0, 1.0]);
    timeline.cancel(0.5);
    assert_eq!(times(&timeline), vec![0.0]);
    timeline.cancel(0.0);
    assert!(timeline.is_empty());
  }

  #[test]
  pub fn cancel_before_removes_prefix() {
    let mut timeline = Timeline::new();
    for time in [0.0, 1.0, 2.0, 3.0].iter() {
      timeline.add(*time, ()).unwrap();
    }
    timeline.cancel_before(2.0);
    assert_eq!(times(&timeline), vec![2.0, 3.0]);
  }

  #[test]
  pub fn peek_and_shift() {
    let mut timeline = Timeline::new();
    timeline.add(2.0, "b").unwrap();
    timeline.add(1.0, "a").unwrap();
    assert_eq!(timeline.peek().map(|event| *event.value()), Some("a"));
    assert_eq!(timeline.shift().map(|event| event.into_value()), Some("a"));
    assert_eq!(timeline.shift().map(|event| event.into_value()), Some("b"));
    assert!(timeline.shift().is_none());
  }

  #[test]
  pub fn memory_evicts_oldest() {
    let mut timeline = Timeline::with_memory(3);
    for time in 0..5 {
      timeline.add(f64::from(time), time).unwrap();
    }
    assert_eq!(times(&timeline), vec![2.0, 3.0, 4.0]);
  }

  #[test]
  pub fn iteration_ranges() {
    let mut timeline = Timeline::new();
    for time in [0.0, 1.0, 2.0, 2.0, 3.0].iter() {
      timeline.add(*time, ()).unwrap();
    }
    fn collect(iter: std::slice::Iter<TimelineEvent<()>>) -> Vec<f64> {
      iter.map(|event| event.time()).collect()
    }
    assert_eq!(collect(timeline.iter_before(2.0)), vec![0.0, 1.0, 2.0, 2.0]);
    assert_eq!(collect(timeline.iter_after(2.0)), vec![3.0]);
    assert_eq!(collect(timeline.iter_from(2.0)), vec![2.0, 2.0, 3.0]);
    assert_eq!(collect(timeline.iter_at_time(2.0)), vec![2.0, 2.0]);
    assert_eq!(collect(timeline.iter_between(1.0, 3.0)), vec![1.0, 2.0, 2.0]);
    assert!(collect(timeline.iter_between(3.0, 1.0)).is_empty());
  }

  #[test]
  pub fn for_each_can_remove_while_iterating() {
    let mut timeline = Timeline::new();
    for time in 0..5 {
      timeline.add(f64::from(time), time).unwrap();
    }
    let mut visited = Vec::new();
    timeline.for_each(|timeline, event| {
      visited.push(*event.value());
      timeline.remove(event.id());
    });
    assert_eq!(visited, vec![0, 1, 2, 3, 4]);
    assert!(timeline.is_empty());
  }

  #[test]
  pub fn for_each_can_add_while_iterating() {
    let mut timeline = Timeline::new();
    timeline.add(1.0, 1).unwrap();
    timeline.add(2.0, 2).unwrap();
    let mut visited = Vec::new();
    timeline.for_each_from(1.0, |timeline, event| {
      visited.push(*event.value());
      timeline.add(event.time() - 0.5, 0).unwrap();
    });
    assert_eq!(visited, vec![1, 2]);
    assert_eq!(times(&timeline), vec![0.5, 1.0, 1.5, 2.0]);
  }

  #[test]
  pub fn for_each_can_cancel_while_iterating() {
    let mut timeline = Timeline::new();
    for time in 0..4 {
      timeline.add(f64::from(time), time).unwrap();
    }
    let mut visited = Vec::new();
    timeline.for_each_between(1.0, 3.0, |timeline, event| {
      visited.push(*event.value());
      timeline.cancel(event.time());
    });
    assert_eq!(visited, vec![1, 2]);
    assert_eq!(times(&timeline), vec![0.0]);
  }

  #[test]
  pub fn for_each_at_time_and_before_after() {
    let mut timeline = Timeline::new();
    for time in [0.0, 1.0, 1.0, 2.0].iter() {
      timeline.add(*time, *time).unwrap();
    }
    let mut count = 0;
    timeline.for_each_at_time(1.0, |_, _| count += 1);
    assert_eq!(count, 2);
    let mut before = Vec::new();
    timeline.for_each_before(1.0, |_, event| before.push(event.time()));
    assert_eq!(before, vec![0.0, 1.0, 1.0]);
    let mut after = Vec::new();
    timeline.for_each_after(1.0, |_, event| after.push(event.time()));
    assert_eq!(after, vec![2.0]);
  }

  #[test]
  pub fn dispose_clears_and_rejects() {
    let mut timeline = Timeline::new();
    timeline.add(1.0, ()).unwrap();
    timeline.dispose();
    assert!(timeline.is_disposed());
    assert!(timeline.is_empty());
    assert_eq!(timeline.add(2.0, ()), Err(TimelineError::Disposed));
  }
}
