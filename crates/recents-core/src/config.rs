use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind, CoreResult};

/// Number of records enriched inside the fetch pass before first publish.
pub const EAGER_LIMIT: usize = 8;

pub const DEFAULT_MAX_RECENT_TASKS: usize = 50;
pub const DEFAULT_MAX_WORKERS: usize = 4;

pub const DEFAULT_RECENTS_SURFACE_MARKERS: &[&str] = &[
    ".recents.RecentsActivity",
    "com.android.settings/.FallbackHome",
];

/// Policy inputs read by the pipeline. A copy is taken once per load pass, so
/// edits made while a pass is running apply from the next pass on.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecentsConfig {
    pub locked_apps: BTreeSet<String>,
    /// Zero disables the staleness filter.
    pub stale_window_secs: u64,
    pub filter_inactive: bool,
    pub filter_not_running: bool,
    pub top_sort_locked: bool,
    /// Read once when the pipeline is constructed.
    pub thumbnail_permission: bool,
    /// Fetch limit used when a load request asks for `0` tasks.
    pub max_recent_tasks: usize,
    pub eager_limit: usize,
    pub max_workers: usize,
    /// Short component substrings identifying the recents surface itself.
    pub recents_surface_markers: Vec<String>,
}

impl Default for RecentsConfig {
    fn default() -> Self {
        Self {
            locked_apps: BTreeSet::new(),
            stale_window_secs: 0,
            filter_inactive: false,
            filter_not_running: false,
            top_sort_locked: false,
            thumbnail_permission: false,
            max_recent_tasks: DEFAULT_MAX_RECENT_TASKS,
            eager_limit: EAGER_LIMIT,
            max_workers: DEFAULT_MAX_WORKERS,
            recents_surface_markers: DEFAULT_RECENTS_SURFACE_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
        }
    }
}

impl RecentsConfig {
    pub fn from_json_str(raw: &str) -> CoreResult<Self> {
        let config: Self = serde_json::from_str(raw).map_err(|error| {
            CoreError::new(
                CoreErrorKind::ParseFailure,
                format!("invalid recents configuration: {error}"),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.max_workers == 0 {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                "max_workers must be at least 1",
            ));
        }
        if self.max_recent_tasks == 0 {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                "max_recent_tasks must be at least 1",
            ));
        }
        if self
            .recents_surface_markers
            .iter()
            .any(|marker| marker.trim().is_empty())
        {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                "recents surface markers must not be blank",
            ));
        }
        Ok(())
    }

    pub fn stale_window(&self) -> Duration {
        Duration::from_secs(self.stale_window_secs)
    }
}

/// Configuration shared between the host's preference layer and the pipeline.
#[derive(Clone, Debug, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<RecentsConfig>>,
}

impl SharedConfig {
    pub fn new(config: RecentsConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn snapshot(&self) -> RecentsConfig {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, config: RecentsConfig) -> CoreResult<()> {
        config.validate()?;
        *self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    pub fn update(&self, edit: impl FnOnce(&mut RecentsConfig)) -> CoreResult<()> {
        let mut next = self.snapshot();
        edit(&mut next);
        self.replace(next)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{EAGER_LIMIT, RecentsConfig, SharedConfig};
    use crate::models::CoreErrorKind;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = RecentsConfig::from_json_str(
            r#"{ "locked_apps": ["com.example.mail"], "stale_window_secs": 3600 }"#,
        )
        .unwrap();
        assert!(config.locked_apps.contains("com.example.mail"));
        assert_eq!(config.stale_window(), Duration::from_secs(3600));
        assert_eq!(config.eager_limit, EAGER_LIMIT);
        assert_eq!(config.recents_surface_markers.len(), 2);
    }

    #[test]
    fn malformed_json_is_a_parse_failure() {
        let error = RecentsConfig::from_json_str("{ not json").unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::ParseFailure);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let error = RecentsConfig::from_json_str(r#"{ "max_workers": 0 }"#).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
    }

    #[test]
    fn snapshots_are_detached_from_later_edits() {
        let shared = SharedConfig::default();
        let before = shared.snapshot();
        shared
            .update(|config| {
                config.locked_apps.insert("com.example.maps".to_string());
            })
            .unwrap();
        assert!(!before.locked_apps.contains("com.example.maps"));
        assert!(shared.snapshot().locked_apps.contains("com.example.maps"));
    }
}
