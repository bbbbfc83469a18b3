use crate::time::Seconds;

/// Receives every payload the transport dispatches, with the exact time it is due.
pub trait DispatchSink<P> {
  fn dispatch(&mut self, time: Seconds, payload: &P);
}

impl<P, F> DispatchSink<P> for F
where
  F: FnMut(Seconds, &P),
{
  fn dispatch(&mut self, time: Seconds, payload: &P) {
    self(time, payload)
  }
}

///! Records every dispatch in order. Useful for offline rendering and tests.
#[derive(Debug, Clone)]
pub struct DispatchLog<P> {
  entries: Vec<(Seconds, P)>,
}

impl<P> DispatchLog<P> {
  pub fn new() -> DispatchLog<P> {
    DispatchLog {
      entries: Vec::new(),
    }
  }

  pub fn entries(&self) -> &[(Seconds, P)] {
    &self.entries
  }

  pub fn times(&self) -> Vec<Seconds> {
    self.entries.iter().map(|(time, _)| *time).collect()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn drain(&mut self) -> Vec<(Seconds, P)> {
    self.entries.drain(..).collect()
  }
}

impl<P> Default for DispatchLog<P> {
  fn default() -> DispatchLog<P> {
    DispatchLog::new()
  }
}

impl<P: Clone> DispatchSink<P> for DispatchLog<P> {
  fn dispatch(&mut self, time: Seconds, payload: &P) {
    self.entries.push((time, payload.clone()));
  }
}
