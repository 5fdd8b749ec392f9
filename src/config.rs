//! Configuration types for bridge construction.

/// Overflow behavior of the bridge buffer.
///
/// Chosen once per bridge instance and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPolicy {
    /// Fail the stream with `BridgeError::BufferOverflow` when a value
    /// arrives while the buffer is full. Values buffered before the
    /// overflow are still delivered first.
    FailOnOverflow,
    /// Discard the incoming value when the buffer is full.
    DropNewest,
    /// Evict the oldest buffered value to make room for the incoming one.
    DropOldest,
}

/// Buffer configuration for a push-to-pull bridge.
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    buffer_size: usize,
    policy: BufferPolicy,
}

impl BridgeConfig {
    /// Creates a bridge configuration with the given buffer capacity and
    /// overflow policy.
    ///
    /// Pick a `buffer_size` that matches the expected burst output of the
    /// push source against the consumption rate of the pull consumer; the
    /// buffer is the only thing absorbing the rate mismatch.
    ///
    /// # Panics
    ///
    /// Panics if `buffer_size` is zero.
    pub fn new(buffer_size: usize, policy: BufferPolicy) -> Self {
        assert!(buffer_size > 0, "bridge buffer size must be positive");
        Self { buffer_size, policy }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn policy(&self) -> BufferPolicy {
        self.policy
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new(100, BufferPolicy::FailOnOverflow)
    }
}
