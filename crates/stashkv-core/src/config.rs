//! Configuration for a stash instance
//!
//! All knobs have conservative defaults; most embedders construct a stash
//! with `Config::default()` and never touch this module.

use std::time::Duration;

/// Tunable parameters for a stash instance
#[derive(Debug, Clone)]
pub struct Config {
    /// Total rename attempts before a save reports failure
    pub rename_retries: u32,
    /// Pause between rename attempts
    pub rename_retry_delay: Duration,
    /// Temp files older than this are fair game for the startup sweep
    pub stale_temp_age: Duration,
    /// Run the stale temp sweep in the background when the stash opens
    pub startup_cleanup: bool,
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.rename_retries == 0 || self.rename_retries > 100 {
            return Err("rename_retries must be in [1, 100]".into());
        }
        if self.rename_retry_delay > Duration::from_secs(10) {
            return Err("rename_retry_delay must be <= 10s".into());
        }
        if self.stale_temp_age.as_millis() == 0 {
            return Err("stale_temp_age must be > 0".into());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rename_retries: 5,
            rename_retry_delay: Duration::from_millis(30),
            stale_temp_age: Duration::from_secs(3600),
            startup_cleanup: true,
        }
    }
}
