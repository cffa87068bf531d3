//! Admission and ordering rules turning the host's raw recent tasks into the
//! list the overlay renders.

use std::collections::BTreeSet;
use std::time::{Duration, SystemTime};

use crate::config::RecentsConfig;
use crate::models::{ComponentName, RawTask, ResolvedActivity};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Rejection {
    Unresolvable,
    HomeActivity,
    RecentsSurface,
    Stale,
    NotRunning,
    ExcludedFromRecents,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Admission {
    pub resolved: ResolvedActivity,
    pub is_locked: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Filtered<T> {
    pub working: Vec<T>,
    pub raw: Vec<T>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AdmittedTask {
    pub raw: RawTask,
    pub admission: Admission,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FilterPolicy {
    locked_apps: BTreeSet<String>,
    stale_window: Duration,
    filter_inactive: bool,
    filter_not_running: bool,
    top_sort_locked: bool,
    surface_markers: Vec<String>,
}

impl FilterPolicy {
    pub fn from_config(config: &RecentsConfig) -> Self {
        Self {
            locked_apps: config.locked_apps.clone(),
            stale_window: config.stale_window(),
            filter_inactive: config.filter_inactive,
            filter_not_running: config.filter_not_running,
            top_sort_locked: config.top_sort_locked,
            surface_markers: config.recents_surface_markers.clone(),
        }
    }

    pub fn begin<T>(&self, home: Option<&ComponentName>, now: SystemTime) -> FilterPass<'_, T> {
        FilterPass {
            policy: self,
            home: home.cloned(),
            stale_before: if self.stale_window.is_zero() {
                None
            } else {
                now.checked_sub(self.stale_window)
            },
            seen_first_valid: false,
            locked_head: Vec::new(),
            tail: Vec::new(),
            raw: Vec::new(),
        }
    }

    /// Runs the whole policy over `tasks` in one go.
    pub fn apply(
        &self,
        tasks: &[RawTask],
        home: Option<&ComponentName>,
        now: SystemTime,
        mut resolve: impl FnMut(&RawTask) -> Option<ResolvedActivity>,
    ) -> Filtered<AdmittedTask> {
        let mut pass = self.begin(home, now);
        for raw in tasks {
            if let Ok(admission) = pass.admit(raw, resolve(raw)) {
                let is_locked = admission.is_locked;
                pass.accept(
                    AdmittedTask {
                        raw: raw.clone(),
                        admission,
                    },
                    is_locked,
                );
            }
        }
        pass.finish()
    }
}

/// One iteration over a raw task list. Tasks must be offered in source order
/// (most recent first) because the exclusion rule depends on position.
pub struct FilterPass<'a, T> {
    policy: &'a FilterPolicy,
    home: Option<ComponentName>,
    stale_before: Option<SystemTime>,
    seen_first_valid: bool,
    locked_head: Vec<T>,
    tail: Vec<T>,
    raw: Vec<T>,
}

impl<T: Clone> FilterPass<'_, T> {
    pub fn admit(
        &mut self,
        raw: &RawTask,
        resolved: Option<ResolvedActivity>,
    ) -> Result<Admission, Rejection> {
        let resolved = resolved.ok_or(Rejection::Unresolvable)?;
        let intent_component = raw
            .target_intent()
            .component
            .unwrap_or_else(|| resolved.component.clone());

        if self.home.as_ref() == Some(&intent_component) {
            return Err(Rejection::HomeActivity);
        }

        let short = intent_component.flatten_to_short_string();
        if self
            .policy
            .surface_markers
            .iter()
            .any(|marker| short.contains(marker.as_str()))
        {
            return Err(Rejection::RecentsSurface);
        }

        let is_locked = self.policy.locked_apps.contains(resolved.package_name());

        if self.policy.filter_inactive && !is_locked {
            if let Some(stale_before) = self.stale_before
                && raw.last_active_time < stale_before
            {
                return Err(Rejection::Stale);
            }
            if self.policy.filter_not_running && !raw.is_running() {
                return Err(Rejection::NotRunning);
            }
        }

        if raw.is_excluded_from_recents() && self.seen_first_valid {
            return Err(Rejection::ExcludedFromRecents);
        }
        self.seen_first_valid = true;

        Ok(Admission {
            resolved,
            is_locked,
        })
    }

    /// Records an admitted task. Call only after a successful [`FilterPass::admit`].
    pub fn accept(&mut self, item: T, is_locked: bool) {
        self.raw.push(item.clone());
        if is_locked && self.policy.top_sort_locked {
            self.locked_head.push(item);
        } else {
            self.tail.push(item);
        }
    }

    pub fn finish(self) -> Filtered<T> {
        let mut working = self.locked_head;
        working.extend(self.tail);
        Filtered {
            working,
            raw: self.raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::{FilterPolicy, Rejection};
    use crate::config::RecentsConfig;
    use crate::models::{ComponentName, LaunchIntent, RawTask, ResolvedActivity};

    fn raw(id: i32, package: &str) -> RawTask {
        RawTask::new(
            id,
            id,
            LaunchIntent::for_component(ComponentName::new(package, format!("{package}.Main"))),
        )
    }

    fn resolved(task: &RawTask) -> Option<ResolvedActivity> {
        task.target_intent().component.map(ResolvedActivity::new)
    }

    #[test]
    fn unresolvable_tasks_are_rejected_first() {
        let policy = FilterPolicy::from_config(&RecentsConfig::default());
        let mut pass = policy.begin::<i32>(None, SystemTime::now());
        assert_eq!(
            pass.admit(&raw(1, "gone"), None),
            Err(Rejection::Unresolvable)
        );
    }

    #[test]
    fn rejected_excluded_task_does_not_consume_first_slot() {
        let policy = FilterPolicy::from_config(&RecentsConfig::default());
        let home = ComponentName::new("launcher", "launcher.Main");
        let mut pass = policy.begin::<i32>(Some(&home), SystemTime::now());
        let home_task = raw(1, "launcher");
        assert_eq!(
            pass.admit(&home_task, resolved(&home_task)),
            Err(Rejection::HomeActivity)
        );

        let mut excluded = raw(2, "a");
        excluded.base_intent = excluded
            .base_intent
            .with_flags(crate::models::FLAG_ACTIVITY_EXCLUDE_FROM_RECENTS);
        assert!(pass.admit(&excluded, resolved(&excluded)).is_ok());
    }

    #[test]
    fn underflowing_stale_window_filters_nothing() {
        let config = RecentsConfig {
            filter_inactive: true,
            stale_window_secs: u64::MAX / 4,
            ..RecentsConfig::default()
        };
        let policy = FilterPolicy::from_config(&config);
        let mut task = raw(1, "a");
        task.last_active_time = SystemTime::UNIX_EPOCH + Duration::from_secs(5);
        let mut pass = policy.begin::<i32>(None, SystemTime::UNIX_EPOCH + Duration::from_secs(10));
        assert!(pass.admit(&task, resolved(&task)).is_ok());
    }
}
