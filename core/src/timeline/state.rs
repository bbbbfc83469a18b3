use crate::timeline::{EventId, Timeline, TimelineEvent, TimelineResult};

///! A piecewise-constant state over time: the value at `t` is the one set by the latest
///! event at or before `t`, or `initial` when there is none.
#[derive(Debug, Clone)]
pub struct StateTimeline<S> {
  timeline: Timeline<S>,
  initial: S,
}

impl<S: Copy + PartialEq> StateTimeline<S> {
  pub fn new(initial: S) -> StateTimeline<S> {
    StateTimeline {
      timeline: Timeline::new(),
      initial,
    }
  }

  pub fn initial(&self) -> S {
    self.initial
  }

  pub fn len(&self) -> usize {
    self.timeline.len()
  }

  pub fn is_empty(&self) -> bool {
    self.timeline.is_empty()
  }

  pub fn get_value_at_time(&self, time: f64) -> S {
    self
      .timeline
      .get(time)
      .map_or(self.initial, |event| *event.value())
  }

  pub fn set_state_at_time(&mut self, state: S, time: f64) -> TimelineResult<EventId> {
    self.timeline.add(time, state)
  }

  pub(crate) fn insert(&mut self, state: S, time: f64) -> EventId {
    self.timeline.insert(time, state)
  }

  pub fn get(&self, time: f64) -> Option<&TimelineEvent<S>> {
    self.timeline.get(time)
  }

  /// The latest event at or before `time` that set `state`.
  pub fn get_last_state(&self, state: S, time: f64) -> Option<&TimelineEvent<S>> {
    let end = self.timeline.position(time);
    (0..end)
      .rev()
      .filter_map(|index| self.timeline.get_at(index))
      .find(|event| *event.value() == state)
  }

  /// The first event after `time` that sets `state`.
  pub fn get_next_state(&self, state: S, time: f64) -> Option<&TimelineEvent<S>> {
    self
      .timeline
      .iter_after(time)
      .find(|event| *event.value() == state)
  }

  /// Removes every state change at or after `after`.
  pub fn cancel(&mut self, after: f64) {
    self.timeline.cancel(after);
  }

  pub fn iter(&self) -> std::slice::Iter<TimelineEvent<S>> {
    self.timeline.iter()
  }

  pub fn iter_from(&self, time: f64) -> std::slice::Iter<TimelineEvent<S>> {
    self.timeline.iter_from(time)
  }

  pub fn iter_after(&self, time: f64) -> std::slice::Iter<TimelineEvent<S>> {
    self.timeline.iter_after(time)
  }

  pub fn iter_between(&self, start: f64, end: f64) -> std::slice::Iter<TimelineEvent<S>> {
    self.timeline.iter_between(start, end)
  }

  pub fn clear(&mut self) {
    self.timeline.clear();
  }

  pub fn dispose(&mut self) {
    self.timeline.dispose();
  }
}
