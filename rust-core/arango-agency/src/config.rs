// SPDX-License-Identifier: PMPL-1.0-or-later
//! Agency client configuration.

use std::time::Duration;

use crate::error::{AgencyError, Result};
use crate::key::Key;

/// Default number of leader redirects a read follows.
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

/// Default per-agent timeout for health probes.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Tuning knobs for an [`Agency`](crate::Agency).
#[derive(Debug, Clone, PartialEq)]
pub struct AgencyConfig {
    /// Leader redirects a single read may follow before giving up.
    pub max_redirects: usize,
    /// Timeout for health probes of this client, unless
    /// [`HealthCheckOptions::probe_timeout`](crate::HealthCheckOptions::probe_timeout) overrides it.
    pub probe_timeout: Duration,
    /// Key read by health probes. It must never exist.
    pub health_sentinel: Key,
}

impl Default for AgencyConfig {
    fn default() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            health_sentinel: Key::new(["does-not-exist-149e97e8-4b81-5664-a8a8-9ba93881d64c"]),
        }
    }
}

impl AgencyConfig {
    /// Defaults overridden by `AGENCY_MAX_REDIRECTS` and
    /// `AGENCY_PROBE_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup("AGENCY_MAX_REDIRECTS") {
            config.max_redirects = parse_number("AGENCY_MAX_REDIRECTS", &raw)?;
        }
        if let Some(raw) = lookup("AGENCY_PROBE_TIMEOUT_SECS") {
            let secs: u64 = parse_number("AGENCY_PROBE_TIMEOUT_SECS", &raw)?;
            if secs == 0 {
                return Err(AgencyError::Config(
                    "AGENCY_PROBE_TIMEOUT_SECS must be positive".to_string(),
                ));
            }
            config.probe_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AgencyError::Config(format!("{name} must be a whole number, got '{raw}'")))
}
