use std::ops::Range;

use log::trace;

use crate::time::TicksTime;
use crate::timeline::{EventId, Timeline, TimelineEvent};

#[derive(Debug, Clone)]
pub(crate) struct Timeout<P> {
  pub(crate) payload: P,
  pub(crate) once: bool,
}

///! Timeouts sorted by tick with a cursor on the first one not yet reached.
///!
///! While ticks advance one by one the cursor only moves forward, so each dispatch looks at the
///! records due now instead of rescanning the ones already passed. Jumps backwards (stop, loop,
///! moving the position) rebind it with a binary search.
#[derive(Debug, Clone)]
pub(crate) struct TimeoutQueue<P> {
  timeline: Timeline<Timeout<P>>,
  cursor: usize,
}

impl<P> TimeoutQueue<P> {
  pub(crate) fn new() -> TimeoutQueue<P> {
    TimeoutQueue {
      timeline: Timeline::new(),
      cursor: 0,
    }
  }

  pub(crate) fn len(&self) -> usize {
    self.timeline.len()
  }

  #[cfg(test)]
  pub(crate) fn cursor(&self) -> usize {
    self.cursor
  }

  pub(crate) fn add(&mut self, tick: TicksTime, payload: P, once: bool) -> EventId {
    let time = f64::from(tick);
    let index = self.timeline.position(time);
    if index < self.cursor {
      self.cursor += 1;
    }
    self.timeline.insert(time, Timeout { payload, once })
  }

  pub(crate) fn remove(&mut self, id: EventId) -> bool {
    match self.timeline.index_of(id) {
      Some(index) => {
        self.timeline.remove(id);
        if index < self.cursor {
          self.cursor -= 1;
        }
        true
      }
      None => false,
    }
  }

  pub(crate) fn get_at(&self, index: usize) -> Option<&TimelineEvent<Timeout<P>>> {
    self.timeline.get_at(index)
  }

  /// Points the cursor at the first record at or after `tick`.
  pub(crate) fn rebind(&mut self, tick: TicksTime) {
    self.cursor = self.timeline.position_before(f64::from(tick));
    trace!("Timeout cursor rebound to {} at {}", self.cursor, tick);
  }

  /// Indices of the records due at `tick`. The cursor moves past them.
  pub(crate) fn due(&mut self, tick: TicksTime) -> Range<usize> {
    let time = f64::from(tick);
    let len = self.timeline.len();
    if self.cursor > len {
      self.cursor = len;
    }
    let behind = self.cursor > 0
      && self
        .timeline
        .get_at(self.cursor - 1)
        .map_or(false, |event| event.time() >= time);
    if behind {
      self.rebind(tick);
    }
    while self.cursor < len && self.time_at(self.cursor) < time {
      self.cursor += 1;
    }
    let start = self.cursor;
    while self.cursor < len && self.time_at(self.cursor) == time {
      self.cursor += 1;
    }
    start..self.cursor
  }

  /// Removes every record at or after `after`.
  pub(crate) fn cancel(&mut self, after: TicksTime) {
    self.timeline.cancel(f64::from(after));
    self.cursor = self.cursor.min(self.timeline.len());
  }

  pub(crate) fn clear(&mut self) {
    self.timeline.clear();
    self.cursor = 0;
  }

  fn time_at(&self, index: usize) -> f64 {
    self
      .timeline
      .get_at(index)
      .map_or(std::f64::INFINITY, |event| event.time())
  }
}

#[cfg(test)]
mod test {

  use super::TimeoutQueue;
  use crate::time::TicksTime;

  fn payloads(queue: &TimeoutQueue<&'static str>, tick: u64) -> Vec<&'static str> {
    let mut queue = queue.clone();
    let range = queue.due(TicksTime::new(tick));
    range
      .filter_map(|index| queue.get_at(index).map(|event| event.value().payload))
      .collect()
  }

  #[test]
  pub fn due_follows_ticks() {
    let mut queue = TimeoutQueue::new();
    queue.add(TicksTime::new(10), "b", false);
    queue.add(TicksTime::new(5), "a", false);
    queue.add(TicksTime::new(10), "c", false);

    assert!(queue.due(TicksTime::new(0)).is_empty());
    assert_eq!(queue.due(TicksTime::new(5)), 0..1);
    assert_eq!(queue.cursor(), 1);
    assert!(queue.due(TicksTime::new(6)).is_empty());
    assert_eq!(queue.due(TicksTime::new(10)), 1..3);
    assert_eq!(queue.cursor(), 3);
    assert!(queue.due(TicksTime::new(11)).is_empty());
  }

  #[test]
  pub fn skipped_ticks_are_not_due() {
    let mut queue = TimeoutQueue::new();
    queue.add(TicksTime::new(3), "a", false);
    queue.add(TicksTime::new(8), "b", false);
    assert!(queue.due(TicksTime::new(5)).is_empty());
    assert_eq!(queue.cursor(), 1);
    assert_eq!(payloads(&queue, 8), vec!["b"]);
  }

  #[test]
  pub fn jumping_back_rebinds() {
    let mut queue = TimeoutQueue::new();
    queue.add(TicksTime::new(0), "a", false);
    queue.add(TicksTime::new(4), "b", false);
    queue.due(TicksTime::new(0));
    queue.due(TicksTime::new(4));
    assert_eq!(queue.cursor(), 2);

    assert_eq!(queue.due(TicksTime::new(0)), 0..1);
    assert_eq!(queue.cursor(), 1);

    queue.rebind(TicksTime::new(4));
    assert_eq!(queue.cursor(), 1);
    assert_eq!(payloads(&queue, 4), vec!["b"]);
  }

  #[test]
  pub fn insert_and_remove_keep_the_cursor() {
    let mut queue = TimeoutQueue::new();
    queue.add(TicksTime::new(2), "a", false);
    let b = queue.add(TicksTime::new(4), "b", false);
    queue.add(TicksTime::new(6), "c", false);
    queue.due(TicksTime::new(5));
    assert_eq!(queue.cursor(), 2);

    queue.add(TicksTime::new(1), "early", false);
    assert_eq!(queue.cursor(), 3);
    assert_eq!(payloads(&queue, 6), vec!["c"]);

    assert!(queue.remove(b));
    assert_eq!(queue.cursor(), 2);
    assert!(!queue.remove(b));
    assert_eq!(payloads(&queue, 6), vec!["c"]);

    queue.add(TicksTime::new(6), "d", false);
    assert_eq!(payloads(&queue, 6), vec!["c", "d"]);
  }

  #[test]
  pub fn cancel_clamps_the_cursor() {
    let mut queue = TimeoutQueue::new();
    queue.add(TicksTime::new(2), "a", false);
    queue.add(TicksTime::new(4), "b", false);
    queue.due(TicksTime::new(10));
    assert_eq!(queue.cursor(), 2);
    queue.cancel(TicksTime::new(3));
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.cursor(), 1);
    queue.clear();
    assert_eq!(queue.cursor(), 0);
  }
}
