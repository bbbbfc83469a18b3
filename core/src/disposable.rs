///! Disposal capability embedded by the long lived components.
#[derive(Debug, Default, Clone)]
pub struct Disposable {
  disposed: bool,
}

impl Disposable {
  pub fn new() -> Disposable {
    Disposable { disposed: false }
  }

  /// Marks the owner as disposed. Returns false when it was already disposed.
  pub fn dispose(&mut self) -> bool {
    let first = !self.disposed;
    self.disposed = true;
    first
  }

  pub fn is_disposed(&self) -> bool {
    self.disposed
  }
}
