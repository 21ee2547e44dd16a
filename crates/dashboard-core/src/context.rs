use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme {other:?}")),
        }
    }
}

/// Shared handle to the active colour theme.
#[derive(Debug, Clone, Default)]
pub struct ThemeHandle {
    inner: Arc<RwLock<Theme>>,
}

impl ThemeHandle {
    pub fn new(theme: Theme) -> Self {
        Self {
            inner: Arc::new(RwLock::new(theme)),
        }
    }

    pub fn get(&self) -> Theme {
        *self.inner.read()
    }

    pub fn set(&self, theme: Theme) {
        *self.inner.write() = theme;
    }

    /// Flips the theme and returns the new one.
    pub fn toggle(&self) -> Theme {
        let mut guard = self.inner.write();
        *guard = guard.toggled();
        *guard
    }
}

/// Shared open/closed flag of the navigation sidebar.
#[derive(Debug, Clone, Default)]
pub struct SidebarHandle {
    active: Arc<AtomicBool>,
}

impl SidebarHandle {
    pub fn new(active: bool) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(active)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub fn toggle(&self) -> bool {
        !self.active.fetch_xor(true, Ordering::AcqRel)
    }
}
