//! Sync tunables, loadable from RON.
//!
//! ```ron
//! (
//!     pull_cooldown_ms: 8000,
//!     push_concurrency: 8,
//!     page_size: 200,
//!     request_timeout_ms: Some(30000),
//! )
//! ```
//!
//! Every field is optional; missing fields take the defaults from
//! [`constants`](crate::constants).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_PAGE_SIZE, DEFAULT_PULL_COOLDOWN, DEFAULT_PUSH_CONCURRENCY, DEFAULT_REQUEST_TIMEOUT,
};
use crate::error::SyncResult;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    #[serde(rename = "pull_cooldown_ms", with = "millis")]
    pub pull_cooldown: Duration,
    pub push_concurrency: usize,
    pub page_size: usize,
    /// `None` disables the per-call deadline.
    #[serde(rename = "request_timeout_ms", with = "opt_millis")]
    pub request_timeout: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pull_cooldown: DEFAULT_PULL_COOLDOWN,
            push_concurrency: DEFAULT_PUSH_CONCURRENCY,
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        }
    }
}

impl SyncConfig {
    pub fn from_ron_str(text: &str) -> SyncResult<Self> {
        let config: SyncConfig = ron::from_str(text)?;
        Ok(config.sanitized())
    }

    /// Load from a RON file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(text) => Self::from_ron_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn to_ron_string(&self) -> SyncResult<String> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }

    /// Clamp values that would stall the engine.
    fn sanitized(mut self) -> Self {
        self.push_concurrency = self.push_concurrency.max(1);
        self.page_size = self.page_size.max(1);
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
