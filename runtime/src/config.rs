//! Router configuration.
//!
//! Loaded from TOML, then optionally overridden from the environment:
//!
//! ```toml
//! retain-policy = "never"
//! transition-id-seed = 4096
//! main = true
//! ```
//!
//! | Variable                      | Field                |
//! |-------------------------------|----------------------|
//! | `WAYMARK_RETAIN_POLICY`       | `retain_policy`      |
//! | `WAYMARK_TRANSITION_ID_SEED`  | `transition_id_seed` |

use serde::{Deserialize, Serialize};
use waymark_core::transition::RetainPolicy;

use crate::error::ConfigError;
use crate::sequence::DEFAULT_TRANSITION_ID_SEED;

pub const RETAIN_POLICY_ENV: &str = "WAYMARK_RETAIN_POLICY";
pub const TRANSITION_ID_SEED_ENV: &str = "WAYMARK_TRANSITION_ID_SEED";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RouterConfig {
    /// Parameter comparison rule on the shared prefix of two transitions.
    pub retain_policy: RetainPolicy,
    /// First transition id handed out.
    pub transition_id_seed: u64,
    /// Whether the handler created on start is the main one.
    pub main: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            retain_policy: RetainPolicy::default(),
            transition_id_seed: DEFAULT_TRANSITION_ID_SEED,
            main: true,
        }
    }
}

impl RouterConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    /// Apply `WAYMARK_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(policy) = lookup(RETAIN_POLICY_ENV) {
            self.retain_policy = policy.parse()?;
        }
        if let Some(seed) = lookup(TRANSITION_ID_SEED_ENV) {
            self.transition_id_seed = parse_seed(&seed).ok_or_else(|| ConfigError::Env {
                var: TRANSITION_ID_SEED_ENV,
                message: format!("'{seed}' is not an unsigned integer"),
            })?;
        }
        Ok(self)
    }
}

fn parse_seed(value: &str) -> Option<u64> {
    let value = value.trim();
    match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
