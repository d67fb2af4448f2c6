//! Heap configuration.

/// What the heap does when the growth provider refuses more memory in the
/// middle of an allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OomPolicy {
  /// Return [`HeapError::OutOfMemory`](crate::HeapError::OutOfMemory) to the caller.
  #[default]
  Error,
  /// Log the failure and terminate the process with exit status 1.
  Exit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapConfig {
  pub oom_policy: OomPolicy,
  /// Keep a set of live payload addresses so `free` and `reallocate` can
  /// reject addresses the heap never handed out.
  pub track_allocations: bool,
}

impl HeapConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_oom_policy(
    mut self,
    policy: OomPolicy,
  ) -> Self {
    self.oom_policy = policy;
    self
  }

  pub fn with_tracking(
    mut self,
    enabled: bool,
  ) -> Self {
    self.track_allocations = enabled;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = HeapConfig::new();
    assert_eq!(config.oom_policy, OomPolicy::Error);
    assert!(!config.track_allocations);
  }

  #[test]
  fn test_builder() {
    let config = HeapConfig::new()
      .with_oom_policy(OomPolicy::Exit)
      .with_tracking(true);

    assert_eq!(config.oom_policy, OomPolicy::Exit);
    assert!(config.track_allocations);
  }
}
