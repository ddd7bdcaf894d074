use std::time::Duration;

/// Optional configuration for a [`Pool`](crate::Pool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
  /// Name attached to every log record the pool emits.
  pub name: String,
  /// Maximum wait in [`Pool::acquire`](crate::Pool::acquire). `Duration::ZERO`
  /// waits indefinitely.
  pub acquire_timeout: Duration,
}

impl Default for PoolOptions {
  fn default() -> Self {
    Self {
      name: "werk".to_string(),
      acquire_timeout: Duration::ZERO,
    }
  }
}

impl PoolOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
    self.acquire_timeout = timeout;
    self
  }

  pub(crate) fn has_acquire_timeout(&self) -> bool {
    !self.acquire_timeout.is_zero()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_waits_indefinitely() {
    let options = PoolOptions::default();
    assert_eq!(options.name, "werk");
    assert!(!options.has_acquire_timeout());
  }

  #[test]
  fn builder_sets_fields() {
    let options = PoolOptions::new().name("ingest").acquire_timeout(Duration::from_millis(250));
    assert_eq!(options.name, "ingest");
    assert_eq!(options.acquire_timeout, Duration::from_millis(250));
    assert!(options.has_acquire_timeout());
  }
}
