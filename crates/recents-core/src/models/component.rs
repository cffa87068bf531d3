use std::fmt::{Display, Formatter};

pub const FLAG_ACTIVITY_EXCLUDE_FROM_RECENTS: u32 = 0x0080_0000;
pub const FLAG_ACTIVITY_RESET_TASK_IF_NEEDED: u32 = 0x0020_0000;
pub const FLAG_ACTIVITY_NEW_TASK: u32 = 0x1000_0000;

/// Package plus activity class of a launchable target.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ComponentName {
    pub package: String,
    pub class: String,
}

impl ComponentName {
    pub fn new(package: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            class: class.into(),
        }
    }

    /// `pkg/.Suffix` when the class lives under the package, `pkg/full.Class` otherwise.
    pub fn flatten_to_short_string(&self) -> String {
        match self
            .class
            .strip_prefix(self.package.as_str())
            .filter(|rest| rest.starts_with('.'))
        {
            Some(rest) => format!("{}/{}", self.package, rest),
            None => format!("{}/{}", self.package, self.class),
        }
    }
}

impl Display for ComponentName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.flatten_to_short_string())
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct LaunchIntent {
    pub action: Option<String>,
    pub component: Option<ComponentName>,
    pub flags: u32,
}

impl LaunchIntent {
    pub fn for_component(component: ComponentName) -> Self {
        Self {
            action: None,
            component: Some(component),
            flags: 0,
        }
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags |= flags;
        self
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag == flag
    }

    /// Copy of this intent targeting `origin` when the task was started
    /// through an alias activity.
    pub fn targeting(&self, origin: Option<&ComponentName>) -> Self {
        let mut intent = self.clone();
        if let Some(origin) = origin {
            intent.component = Some(origin.clone());
        }
        intent
    }

    pub fn into_relaunch(mut self) -> Self {
        self.flags = (self.flags & !FLAG_ACTIVITY_RESET_TASK_IF_NEEDED) | FLAG_ACTIVITY_NEW_TASK;
        self
    }
}

/// Concrete activity an intent resolved to on the host.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ResolvedActivity {
    pub component: ComponentName,
}

impl ResolvedActivity {
    pub fn new(component: ComponentName) -> Self {
        Self { component }
    }

    pub fn package_name(&self) -> &str {
        &self.component.package
    }
}
