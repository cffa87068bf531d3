#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, SystemTime};

use recents_core::host::{
    HostServices, IconPack, IconResolver, RecentsConsumer, TaskSource, ThumbnailSource,
};
use recents_core::models::{
    ComponentName, CoreError, CoreErrorKind, CoreResult, FLAG_ACTIVITY_EXCLUDE_FROM_RECENTS, Image,
    LaunchIntent, RawTask, RecentsSnapshot, ResolvedActivity,
};

pub const HOME_PACKAGE: &str = "com.example.launcher";
const GATE_LIMIT: Duration = Duration::from_secs(5);

pub fn component(package: &str) -> ComponentName {
    ComponentName::new(package, format!("{package}.MainActivity"))
}

pub fn task(persistent_id: i32, package: &str) -> RawTask {
    RawTask::new(
        persistent_id,
        persistent_id,
        LaunchIntent::for_component(component(package)),
    )
}

pub fn home_task(persistent_id: i32) -> RawTask {
    task(persistent_id, HOME_PACKAGE)
}

pub fn excluded(mut raw: RawTask) -> RawTask {
    raw.base_intent = raw
        .base_intent
        .with_flags(FLAG_ACTIVITY_EXCLUDE_FROM_RECENTS);
    raw
}

pub fn inactive_for(mut raw: RawTask, age: Duration) -> RawTask {
    raw.last_active_time = SystemTime::now() - age;
    raw
}

/// A latch blocking worker threads until the test opens it. Opens by itself
/// after a few seconds so a failing test cannot hang the suite.
#[derive(Default)]
pub struct Gate {
    closed: Mutex<bool>,
    changed: Condvar,
}

impl Gate {
    pub fn close(&self) {
        *self.closed.lock().unwrap() = true;
    }

    pub fn open(&self) {
        *self.closed.lock().unwrap() = false;
        self.changed.notify_all();
    }

    fn pass(&self) {
        let closed = self.closed.lock().unwrap();
        let _ = self
            .changed
            .wait_timeout_while(closed, GATE_LIMIT, |closed| *closed)
            .unwrap();
    }
}

#[derive(Default)]
pub struct FakeTaskSource {
    tasks: Mutex<Vec<RawTask>>,
    unresolvable: Mutex<BTreeSet<String>>,
    pub fetches: AtomicUsize,
    pub fail: AtomicBool,
    pub gate: Gate,
}

impl FakeTaskSource {
    pub fn with_tasks(tasks: Vec<RawTask>) -> Arc<Self> {
        let source = Self::default();
        *source.tasks.lock().unwrap() = tasks;
        Arc::new(source)
    }

    pub fn set_tasks(&self, tasks: Vec<RawTask>) {
        *self.tasks.lock().unwrap() = tasks;
    }

    pub fn mark_unresolvable(&self, package: &str) {
        self.unresolvable.lock().unwrap().insert(package.to_string());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl TaskSource for FakeTaskSource {
    fn list_recent_tasks(&self, limit: usize) -> CoreResult<Vec<RawTask>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.gate.pass();
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::new(
                CoreErrorKind::SourceUnavailable,
                "task service unreachable",
            ));
        }
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    fn resolve_activity(&self, intent: &LaunchIntent) -> Option<ResolvedActivity> {
        let component = intent.component.clone()?;
        if self.unresolvable.lock().unwrap().contains(&component.package) {
            return None;
        }
        Some(ResolvedActivity::new(component))
    }

    fn home_activity(&self) -> Option<ComponentName> {
        Some(component(HOME_PACKAGE))
    }
}

#[derive(Default)]
pub struct FakeIconResolver {
    label_calls: Mutex<BTreeMap<String, usize>>,
    pub icon_calls: AtomicUsize,
    pub missing_icons: Mutex<BTreeSet<String>>,
    labels_in_flight: AtomicUsize,
    pub peak_labels_in_flight: AtomicUsize,
    pub label_gate: Gate,
}

impl FakeIconResolver {
    pub fn label_calls(&self, package: &str) -> usize {
        self.label_calls
            .lock()
            .unwrap()
            .get(package)
            .copied()
            .unwrap_or(0)
    }

    pub fn icon_call_count(&self) -> usize {
        self.icon_calls.load(Ordering::SeqCst)
    }
}

impl IconResolver for FakeIconResolver {
    fn resolve_label(&self, target: &ResolvedActivity) -> String {
        *self
            .label_calls
            .lock()
            .unwrap()
            .entry(target.package_name().to_string())
            .or_default() += 1;
        let now = self.labels_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_labels_in_flight.fetch_max(now, Ordering::SeqCst);
        self.label_gate.pass();
        self.labels_in_flight.fetch_sub(1, Ordering::SeqCst);
        format!("{} label", target.package_name())
    }

    fn resolve_icon(&self, target: &ResolvedActivity, _icon_pack_active: bool) -> Option<Image> {
        self.icon_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .missing_icons
            .lock()
            .unwrap()
            .contains(target.package_name())
        {
            return None;
        }
        Some(Image::solid(2, 2, 0xff00_00ff))
    }

    fn default_icon(&self) -> Image {
        Image::solid(1, 1, 0xff80_8080)
    }
}

pub struct FakeIconPack {
    pub loaded: bool,
    pub overrides: BTreeSet<String>,
    pub composed: AtomicUsize,
}

impl FakeIconPack {
    pub const OVERRIDE_COLOR: u32 = 0xffaa_0000;
    pub const COMPOSED_COLOR: u32 = 0xff00_aa00;

    pub fn new(loaded: bool, overrides: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            loaded,
            overrides: overrides.iter().map(|package| package.to_string()).collect(),
            composed: AtomicUsize::new(0),
        })
    }
}

impl IconPack for FakeIconPack {
    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn icon_override(&self, target: &ResolvedActivity) -> Option<Image> {
        self.overrides
            .contains(target.package_name())
            .then(|| Image::solid(3, 3, Self::OVERRIDE_COLOR))
    }

    fn compose(&self, base: &Image, _label: &str) -> Option<Image> {
        self.composed.fetch_add(1, Ordering::SeqCst);
        Some(Image::solid(base.width(), base.height(), Self::COMPOSED_COLOR))
    }
}

#[derive(Default)]
pub struct FakeThumbnails {
    available: Mutex<BTreeSet<i32>>,
    pub captures: AtomicUsize,
    pub gate: Gate,
}

impl FakeThumbnails {
    pub fn for_tasks(ids: &[i32]) -> Arc<Self> {
        let thumbnails = Self::default();
        thumbnails.available.lock().unwrap().extend(ids);
        Arc::new(thumbnails)
    }

    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    /// Later captures of `persistent_task_id` come back empty.
    pub fn withdraw(&self, persistent_task_id: i32) {
        self.available.lock().unwrap().remove(&persistent_task_id);
    }
}

impl ThumbnailSource for FakeThumbnails {
    fn capture_thumbnail(&self, persistent_task_id: i32) -> CoreResult<Option<Image>> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        self.gate.pass();
        Ok(self
            .available
            .lock()
            .unwrap()
            .contains(&persistent_task_id)
            .then(|| Image::solid(16, 9, 0xff20_2020)))
    }
}

/// Consumer counting updates, for tests that assert on publish counts only.
#[derive(Default)]
pub struct CountingConsumer {
    pub updates: AtomicUsize,
    pub last: Mutex<Option<RecentsSnapshot>>,
}

impl RecentsConsumer for CountingConsumer {
    fn update(&self, snapshot: RecentsSnapshot) {
        self.updates.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(snapshot);
    }
}

pub struct Harness {
    pub tasks: Arc<FakeTaskSource>,
    pub icons: Arc<FakeIconResolver>,
    pub thumbnails: Arc<FakeThumbnails>,
}

impl Harness {
    pub fn new(tasks: Vec<RawTask>) -> Self {
        Self {
            tasks: FakeTaskSource::with_tasks(tasks),
            icons: Arc::new(FakeIconResolver::default()),
            thumbnails: Arc::new(FakeThumbnails::default()),
        }
    }

    pub fn with_thumbnails(mut self, thumbnails: Arc<FakeThumbnails>) -> Self {
        self.thumbnails = thumbnails;
        self
    }

    pub fn services(&self) -> HostServices {
        HostServices::new(
            self.tasks.clone(),
            self.icons.clone(),
            self.thumbnails.clone(),
        )
    }
}

/// Polls `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
