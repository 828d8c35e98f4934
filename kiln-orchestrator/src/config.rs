//! Core configuration
//!
//! Defines the timeouts, lock tuning and artifact location used by the build
//! and notification services.

use std::time::Duration;

use kiln_core::paths::DEFAULT_ARTIFACT_BUCKET;

/// Build persistence configuration
///
/// Every external call is bounded by one of these timeouts so a stuck store or
/// notifier cannot block the calling request indefinitely.
#[derive(Debug, Clone)]
pub struct Config {
    /// Object-store bucket holding build artifacts and logs
    pub artifact_bucket: String,

    /// Deadline for each metadata or artifact store call
    pub store_timeout: Duration,

    /// Deadline for each secret lookup during notification
    pub secret_timeout: Duration,

    /// Deadline for each notifier send
    pub notifier_timeout: Duration,

    /// Guard save/delete with a per-build advisory lock
    pub advisory_locks: bool,

    /// Lifetime of an advisory lock whose holder never releases it
    pub lock_ttl: Duration,

    /// How long to wait for a held lock before giving up
    pub lock_acquire_timeout: Duration,

    /// Pause between lock acquisition attempts
    pub lock_retry_interval: Duration,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - KILN_ARTIFACT_BUCKET (default: kontinuous)
    /// - KILN_STORE_TIMEOUT_MS (default: 5000)
    /// - KILN_SECRET_TIMEOUT_MS (default: 3000)
    /// - KILN_NOTIFIER_TIMEOUT_MS (default: 10000)
    /// - KILN_ADVISORY_LOCKS (default: true)
    /// - KILN_LOCK_TTL_SECS (default: 30)
    /// - KILN_LOCK_ACQUIRE_TIMEOUT_MS (default: 10000)
    /// - KILN_LOCK_RETRY_MS (default: 25)
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self::from_lookup(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Builds configuration from an arbitrary variable source.
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |name: &str, default: Duration| {
            lookup(name)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        let artifact_bucket = lookup("KILN_ARTIFACT_BUCKET")
            .map(|s| s.trim().to_string())
            .unwrap_or(defaults.artifact_bucket);

        let advisory_locks = lookup("KILN_ADVISORY_LOCKS")
            .and_then(|s| match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            })
            .unwrap_or(defaults.advisory_locks);

        let lock_ttl = lookup("KILN_LOCK_TTL_SECS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.lock_ttl);

        Self {
            artifact_bucket,
            store_timeout: millis("KILN_STORE_TIMEOUT_MS", defaults.store_timeout),
            secret_timeout: millis("KILN_SECRET_TIMEOUT_MS", defaults.secret_timeout),
            notifier_timeout: millis("KILN_NOTIFIER_TIMEOUT_MS", defaults.notifier_timeout),
            advisory_locks,
            lock_ttl,
            lock_acquire_timeout: millis(
                "KILN_LOCK_ACQUIRE_TIMEOUT_MS",
                defaults.lock_acquire_timeout,
            ),
            lock_retry_interval: millis("KILN_LOCK_RETRY_MS", defaults.lock_retry_interval),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.artifact_bucket.is_empty() {
            anyhow::bail!("artifact_bucket cannot be empty");
        }

        for (name, value) in [
            ("store_timeout", self.store_timeout),
            ("secret_timeout", self.secret_timeout),
            ("notifier_timeout", self.notifier_timeout),
            ("lock_acquire_timeout", self.lock_acquire_timeout),
            ("lock_retry_interval", self.lock_retry_interval),
        ] {
            if value.is_zero() {
                anyhow::bail!("{} must be greater than 0", name);
            }
        }

        if self.advisory_locks && self.lock_ttl < self.lock_retry_interval {
            anyhow::bail!("lock_ttl must not be shorter than lock_retry_interval");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            artifact_bucket: DEFAULT_ARTIFACT_BUCKET.to_string(),
            store_timeout: Duration::from_secs(5),
            secret_timeout: Duration::from_secs(3),
            notifier_timeout: Duration::from_secs(10),
            advisory_locks: true,
            lock_ttl: Duration::from_secs(30),
            lock_acquire_timeout: Duration::from_secs(10),
            lock_retry_interval: Duration::from_millis(25),
        }
    }
}
