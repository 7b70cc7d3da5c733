//! Pool configuration.
//!
//! [`PoolConfig`] is immutable; it is produced by [`PoolConfigBuilder`], whose
//! size setters validate `initial_size` and `max_size` together so the built
//! pair always satisfies `initial_size <= max_size`.

use std::time::Duration;

use super::{PoolError, PoolResult};

/// Default upper bound on live sessions.
pub const DEFAULT_MAX_SIZE: usize = 5;

/// Immutable session pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    initial_size: usize,
    max_size: usize,
    max_wait_time: Option<Duration>,
    max_idle_time: Option<chrono::Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_size: 0,
            max_size: DEFAULT_MAX_SIZE,
            max_wait_time: None,
            max_idle_time: None,
        }
    }
}

impl PoolConfig {
    /// Start a builder from the default configuration.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder {
            config: Self::default(),
        }
    }

    /// Start a builder seeded with this configuration's values.
    pub fn to_builder(&self) -> PoolConfigBuilder {
        PoolConfigBuilder {
            config: self.clone(),
        }
    }

    /// Number of sessions created eagerly when the pool is constructed
    pub fn initial_size(&self) -> usize {
        self.initial_size
    }

    /// Hard upper bound on live sessions (borrowed + idle)
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// How long `acquire` may block on an exhausted pool. `None` means forever.
    pub fn max_wait_time(&self) -> Option<Duration> {
        self.max_wait_time
    }

    /// How long a session may sit idle before eviction. `None` means never.
    ///
    /// May be zero or negative, in which case any idle session is eligible for
    /// eviction on the next maintenance pass.
    pub fn max_idle_time(&self) -> Option<chrono::Duration> {
        self.max_idle_time
    }

    /// Whether a session idle for `idle_for` has outlived `max_idle_time`.
    pub fn is_idle_expired(&self, idle_for: Duration) -> bool {
        match self.max_idle_time {
            Some(max_idle) => {
                let idle_for = chrono::Duration::from_std(idle_for).unwrap_or(chrono::Duration::MAX);
                idle_for > max_idle
            }
            None => false,
        }
    }
}

/// Builder for [`PoolConfig`].
///
/// Setters take `&mut self` so that a rejected update leaves the builder with
/// its previous, valid values.
#[derive(Debug, Clone)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl Default for PoolConfigBuilder {
    fn default() -> Self {
        PoolConfig::builder()
    }
}

impl PoolConfigBuilder {
    /// Set the warm-up size. Raises `max_size` if it would fall below it.
    pub fn initial_size(&mut self, initial_size: usize) -> PoolResult<&mut Self> {
        let max_size = self.config.max_size.max(initial_size);
        self.resize(initial_size, max_size)?;
        Ok(self)
    }

    /// Set the upper bound on live sessions. Lowers `initial_size` if it would
    /// exceed it. Zero is rejected.
    pub fn max_size(&mut self, max_size: usize) -> PoolResult<&mut Self> {
        let initial_size = self.config.initial_size.min(max_size);
        self.resize(initial_size, max_size)?;
        Ok(self)
    }

    fn resize(&mut self, initial_size: usize, max_size: usize) -> PoolResult<()> {
        if max_size == 0 {
            return Err(PoolError::Configuration(
                "max_size must be greater than 0".to_string(),
            ));
        }
        debug_assert!(initial_size <= max_size);
        self.config.initial_size = initial_size;
        self.config.max_size = max_size;
        Ok(())
    }

    /// Bound the time `acquire` waits on an exhausted pool.
    ///
    /// A negative duration means "no limit", not "zero".
    pub fn max_wait_time(&mut self, max_wait_time: chrono::Duration) -> &mut Self {
        self.config.max_wait_time = max_wait_time.to_std().ok();
        self
    }

    /// Let `acquire` wait indefinitely.
    pub fn unbounded_wait(&mut self) -> &mut Self {
        self.config.max_wait_time = None;
        self
    }

    /// Evict sessions idle for longer than `max_idle_time`. Stored verbatim,
    /// including zero and negative values.
    pub fn max_idle_time(&mut self, max_idle_time: chrono::Duration) -> &mut Self {
        self.config.max_idle_time = Some(max_idle_time);
        self
    }

    /// Never evict idle sessions.
    pub fn no_idle_eviction(&mut self) -> &mut Self {
        self.config.max_idle_time = None;
        self
    }

    /// Snapshot the current values.
    pub fn build(&self) -> PoolConfig {
        self.config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.initial_size(), 0);
        assert_eq!(config.max_size(), DEFAULT_MAX_SIZE);
        assert_eq!(config.max_wait_time(), None);
        assert_eq!(config.max_idle_time(), None);
    }

    #[test]
    fn test_initial_size_raises_max_size() {
        let config = PoolConfig::builder().initial_size(8).unwrap().build();
        assert_eq!(config.initial_size(), 8);
        assert_eq!(config.max_size(), 8);
    }

    #[test]
    fn test_max_size_lowers_initial_size() {
        let mut builder = PoolConfig::builder();
        builder.initial_size(4).unwrap().max_size(2).unwrap();
        let config = builder.build();
        assert_eq!(config.initial_size(), 2);
        assert_eq!(config.max_size(), 2);
    }

    #[test]
    fn test_zero_max_size_rejected_and_state_kept() {
        let mut builder = PoolConfig::builder();
        builder.initial_size(2).unwrap().max_size(3).unwrap();

        let err = builder.max_size(0).unwrap_err();
        assert!(matches!(err, PoolError::Configuration(_)));

        let config = builder.build();
        assert_eq!(config.initial_size(), 2);
        assert_eq!(config.max_size(), 3);
    }

    #[test]
    fn test_negative_wait_time_is_unbounded() {
        let config = PoolConfig::builder()
            .max_wait_time(chrono::Duration::milliseconds(-250))
            .build();
        assert_eq!(config.max_wait_time(), None);

        let config = PoolConfig::builder()
            .max_wait_time(chrono::Duration::milliseconds(250))
            .build();
        assert_eq!(config.max_wait_time(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_negative_idle_time_kept_verbatim() {
        let config = PoolConfig::builder()
            .max_idle_time(chrono::Duration::seconds(-3))
            .build();
        assert_eq!(config.max_idle_time(), Some(chrono::Duration::seconds(-3)));
        assert!(config.is_idle_expired(Duration::ZERO));
    }

    #[test]
    fn test_idle_expiry() {
        let config = PoolConfig::builder()
            .max_idle_time(chrono::Duration::seconds(10))
            .build();
        assert!(!config.is_idle_expired(Duration::from_secs(10)));
        assert!(config.is_idle_expired(Duration::from_secs(11)));

        let never = PoolConfig::default();
        assert!(!never.is_idle_expired(Duration::from_secs(u64::MAX / 2)));
    }

    #[test]
    fn test_to_builder_round_trip() {
        let config = PoolConfig::builder()
            .max_size(7)
            .unwrap()
            .max_wait_time(chrono::Duration::seconds(1))
            .build();
        assert_eq!(config.to_builder().build(), config);
    }
}
