//! Interval events `[time, time + duration)` kept in a height balanced interval tree.
//!
//! Nodes live in an arena and link to each other by index. Every node caches the greatest
//! `high` of its subtree so overlap queries can skip whole branches.

use std::collections::HashMap;

use log::trace;

use crate::disposable::Disposable;
use crate::timeline::{check_time, EventId, TimelineError, TimelineResult};

#[derive(Debug, Clone, PartialEq)]
pub struct IntervalEvent<T> {
  id: EventId,
  time: f64,
  duration: f64,
  value: T,
}

impl<T> IntervalEvent<T> {
  pub fn id(&self) -> EventId {
    self.id
  }

  pub fn time(&self) -> f64 {
    self.time
  }

  pub fn duration(&self) -> f64 {
    self.duration
  }

  pub fn value(&self) -> &T {
    &self.value
  }

  pub fn into_value(self) -> T {
    self.value
  }

  pub fn low(&self) -> f64 {
    self.time
  }

  pub fn high(&self) -> f64 {
    self.time + self.duration
  }

  pub fn contains(&self, point: f64) -> bool {
    self.low() <= point && point < self.high()
  }
}

#[derive(Debug, Clone)]
struct Node<T> {
  event: IntervalEvent<T>,
  max: f64,
  height: i32,
  parent: Option<usize>,
  left: Option<usize>,
  right: Option<usize>,
}

impl<T> Node<T> {
  fn low(&self) -> f64 {
    self.event.low()
  }
}

#[derive(Debug, Clone)]
pub struct IntervalTimeline<T> {
  nodes: Vec<Node<T>>,
  root: Option<usize>,
  index: HashMap<EventId, usize>,
  disposable: Disposable,
}

impl<T> Default for IntervalTimeline<T> {
  fn default() -> Self {
    IntervalTimeline::new()
  }
}

impl<T> IntervalTimeline<T> {
  pub fn new() -> IntervalTimeline<T> {
    IntervalTimeline {
      nodes: Vec::new(),
      root: None,
      index: HashMap::new(),
      disposable: Disposable::new(),
    }
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Adds an event covering `[time, time + duration)`. An infinite duration never ends.
  pub fn add(&mut self, time: f64, duration: f64, value: T) -> TimelineResult<EventId> {
    if self.disposable.is_disposed() {
      return Err(TimelineError::Disposed);
    }
    check_time(time)?;
    if duration.is_nan() || duration < 0.0 {
      return Err(TimelineError::InvalidDuration { duration });
    }

    let id = EventId::new();
    let event = IntervalEvent {
      id,
      time,
      duration,
      value,
    };
    let node_index = self.nodes.len();
    self.nodes.push(Node {
      max: event.high(),
      event,
      height: 1,
      parent: None,
      left: None,
      right: None,
    });
    self.index.insert(id, node_index);

    let mut current = match self.root {
      Some(root) => root,
      None => {
        self.root = Some(node_index);
        return Ok(id);
      }
    };

    // equal starts go left
    loop {
      let go_left = time <= self.nodes[current].low();
      let next = if go_left {
        self.nodes[current].left
      } else {
        self.nodes[current].right
      };
      match next {
        Some(child) => current = child,
        None => {
          if go_left {
            self.nodes[current].left = Some(node_index);
          } else {
            self.nodes[current].right = Some(node_index);
          }
          self.nodes[node_index].parent = Some(current);
          break;
        }
      }
    }

    self.rebalance_from(Some(current));
    Ok(id)
  }

  /// Removes the event with this id. Absent ids are ignored.
  pub fn remove(&mut self, id: EventId) -> Option<IntervalEvent<T>> {
    let mut target = self.index.get(&id).cloned()?;

    if let (Some(_), Some(right)) = (self.nodes[target].left, self.nodes[target].right) {
      let successor = self.leftmost(right);
      self.swap_events(target, successor);
      target = successor;
    }

    let child = self.nodes[target].left.or(self.nodes[target].right);
    let parent = self.nodes[target].parent;
    if let Some(child) = child {
      self.nodes[child].parent = parent;
    }
    self.replace_child(parent, target, child);

    let (removed, parent) = self.free(target, parent);
    self.rebalance_from(parent);
    Some(removed.event)
  }

  pub fn get_by_id(&self, id: EventId) -> Option<&IntervalEvent<T>> {
    self
      .index
      .get(&id)
      .map(|node_index| &self.nodes[*node_index].event)
  }

  /// The event containing `point` with the latest start. Among events that start together
  /// the one added last wins.
  pub fn get(&self, point: f64) -> Option<&IntervalEvent<T>> {
    let mut found: Option<&IntervalEvent<T>> = None;
    for node_index in self.overlapping(point) {
      let event = &self.nodes[node_index].event;
      match found {
        Some(best) if best.low() >= event.low() => {}
        _ => found = Some(event),
      }
    }
    found
  }

  /// Events containing `point`, ordered by start.
  pub fn search(&self, point: f64) -> Vec<&IntervalEvent<T>> {
    self
      .overlapping(point)
      .into_iter()
      .map(|node_index| &self.nodes[node_index].event)
      .collect()
  }

  /// Events starting at or after `point`, ordered by start.
  pub fn search_from(&self, point: f64) -> Vec<&IntervalEvent<T>> {
    let mut results = Vec::new();
    self.collect_from(self.root, point, &mut results);
    results
      .into_iter()
      .map(|node_index| &self.nodes[node_index].event)
      .collect()
  }

  /// All events ordered by start.
  pub fn events(&self) -> Vec<&IntervalEvent<T>> {
    self.search_from(std::f64::NEG_INFINITY)
  }

  /// Removes every event starting at or after `after`.
  pub fn cancel(&mut self, after: f64) {
    let mut starting = Vec::new();
    self.collect_from(self.root, after, &mut starting);
    let ids: Vec<EventId> = starting
      .into_iter()
      .map(|node_index| self.nodes[node_index].event.id)
      .collect();
    trace!("Cancelling {} interval events from {}", ids.len(), after);
    for id in ids {
      self.remove(id);
    }
  }

  pub fn clear(&mut self) {
    self.nodes.clear();
    self.index.clear();
    self.root = None;
  }

  pub fn dispose(&mut self) {
    if self.disposable.dispose() {
      self.clear();
    }
  }

  pub fn is_disposed(&self) -> bool {
    self.disposable.is_disposed()
  }

  fn overlapping(&self, point: f64) -> Vec<usize> {
    let mut results = Vec::new();
    self.collect_overlapping(self.root, point, &mut results);
    results
  }

  fn collect_overlapping(&self, node: Option<usize>, point: f64, results: &mut Vec<usize>) {
    let node_index = match node {
      Some(node_index) => node_index,
      None => return,
    };
    let node = &self.nodes[node_index];
    if point > node.max {
      return;
    }
    self.collect_overlapping(node.left, point, results);
    if node.event.contains(point) {
      results.push(node_index);
    }
    if node.low() > point {
      return;
    }
    self.collect_overlapping(node.right, point, results);
  }

  fn collect_from(&self, node: Option<usize>, point: f64, results: &mut Vec<usize>) {
    let node_index = match node {
      Some(node_index) => node_index,
      None => return,
    };
    let node = &self.nodes[node_index];
    if node.low() >= point {
      self.collect_from(node.left, point, results);
      results.push(node_index);
    }
    self.collect_from(node.right, point, results);
  }

  fn leftmost(&self, mut node_index: usize) -> usize {
    while let Some(left) = self.nodes[node_index].left {
      node_index = left;
    }
    node_index
  }

  fn swap_events(&mut self, a: usize, b: usize) {
    if a == b {
      return;
    }
    let (low, high) = if a < b { (a, b) } else { (b, a) };
    let (head, tail) = self.nodes.split_at_mut(high);
    std::mem::swap(&mut head[low].event, &mut tail[0].event);
    self.index.insert(self.nodes[a].event.id, a);
    self.index.insert(self.nodes[b].event.id, b);
  }

  // Releases a detached node, moving the last arena slot into its place. Returns the node
  // and `tracked` adjusted in case it pointed at the moved slot.
  fn free(&mut self, node_index: usize, tracked: Option<usize>) -> (Node<T>, Option<usize>) {
    let last = self.nodes.len() - 1;
    let removed = self.nodes.swap_remove(node_index);
    self.index.remove(&removed.event.id);
    if node_index == last {
      return (removed, tracked);
    }

    let moved = &self.nodes[node_index];
    let (parent, left, right, id) = (moved.parent, moved.left, moved.right, moved.event.id);
    self.replace_child(parent, last, Some(node_index));
    for child in left.iter().chain(right.iter()) {
      self.nodes[*child].parent = Some(node_index);
    }
    self.index.insert(id, node_index);

    let tracked = if tracked == Some(last) {
      Some(node_index)
    } else {
      tracked
    };
    (removed, tracked)
  }

  fn replace_child(&mut self, parent: Option<usize>, old: usize, new: Option<usize>) {
    match parent {
      None => self.root = new,
      Some(parent) => {
        if self.nodes[parent].left == Some(old) {
          self.nodes[parent].left = new;
        } else {
          self.nodes[parent].right = new;
        }
      }
    }
  }

  fn height(&self, node: Option<usize>) -> i32 {
    node.map_or(0, |node_index| self.nodes[node_index].height)
  }

  fn max(&self, node: Option<usize>) -> f64 {
    node.map_or(std::f64::NEG_INFINITY, |node_index| {
      self.nodes[node_index].max
    })
  }

  fn balance(&self, node_index: usize) -> i32 {
    let node = &self.nodes[node_index];
    self.height(node.left) - self.height(node.right)
  }

  fn update(&mut self, node_index: usize) {
    let (left, right) = (self.nodes[node_index].left, self.nodes[node_index].right);
    let height = 1 + self.height(left).max(self.height(right));
    let max = self.nodes[node_index]
      .event
      .high()
      .max(self.max(left))
      .max(self.max(right));
    let node = &mut self.nodes[node_index];
    node.height = height;
    node.max = max;
  }

  // Walks up to the root refreshing heights and bounds, rotating where unbalanced.
  fn rebalance_from(&mut self, start: Option<usize>) {
    let mut current = start;
    while let Some(node_index) = current {
      self.update(node_index);
      let balance = self.balance(node_index);
      let subtree = if balance > 1 {
        if let Some(left) = self.nodes[node_index].left {
          if self.balance(left) < 0 {
            self.rotate_left(left);
          }
        }
        self.rotate_right(node_index)
      } else if balance < -1 {
        if let Some(right) = self.nodes[node_index].right {
          if self.balance(right) > 0 {
            self.rotate_right(right);
          }
        }
        self.rotate_left(node_index)
      } else {
        node_index
      };
      current = self.nodes[subtree].parent;
    }
  }

  fn rotate_right(&mut self, node_index: usize) -> usize {
    let pivot = match self.nodes[node_index].left {
      Some(pivot) => pivot,
      None => return node_index,
    };
    let inner = self.nodes[pivot].right;
    let parent = self.nodes[node_index].parent;

    self.nodes[node_index].left = inner;
    if let Some(inner) = inner {
      self.nodes[inner].parent = Some(node_index);
    }
    self.nodes[pivot].parent = parent;
    self.replace_child(parent, node_index, Some(pivot));
    self.nodes[pivot].right = Some(node_index);
    self.nodes[node_index].parent = Some(pivot);

    self.update(node_index);
    self.update(pivot);
    pivot
  }

  fn rotate_left(&mut self, node_index: usize) -> usize {
    let pivot = match self.nodes[node_index].right {
      Some(pivot) => pivot,
      None => return node_index,
    };
    let inner = self.nodes[pivot].left;
    let parent = self.nodes[node_index].parent;

    self.nodes[node_index].right = inner;
    if let Some(inner) = inner {
      self.nodes[inner].parent = Some(node_index);
    }
    self.nodes[pivot].parent = parent;
    self.replace_child(parent, node_index, Some(pivot));
    self.nodes[pivot].left = Some(node_index);
    self.nodes[node_index].parent = Some(pivot);

    self.update(node_index);
    self.update(pivot);
    pivot
  }
}

impl<T: Clone> IntervalTimeline<T> {
  fn iterate<F>(&mut self, snapshot: Vec<IntervalEvent<T>>, mut callback: F)
  where
    F: FnMut(&mut IntervalTimeline<T>, &IntervalEvent<T>),
  {
    for event in snapshot.iter() {
      callback(self, event);
    }
  }

  /// Visits every event ordered by start. The callback may add or remove events.
  pub fn for_each<F>(&mut self, callback: F)
  where
    F: FnMut(&mut IntervalTimeline<T>, &IntervalEvent<T>),
  {
    let snapshot = self.events().into_iter().cloned().collect();
    self.iterate(snapshot, callback);
  }

  /// Visits the events containing `point`.
  pub fn for_each_at_time<F>(&mut self, point: f64, callback: F)
  where
    F: FnMut(&mut IntervalTimeline<T>, &IntervalEvent<T>),
  {
    let snapshot = self.search(point).into_iter().cloned().collect();
    self.iterate(snapshot, callback);
  }

  /// Visits the events starting at or after `point`.
  pub fn for_each_from<F>(&mut self, point: f64, callback: F)
  where
    F: FnMut(&mut IntervalTimeline<T>, &IntervalEvent<T>),
  {
    let snapshot = self.search_from(point).into_iter().cloned().collect();
    self.iterate(snapshot, callback);
  }
}
