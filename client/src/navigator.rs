//! Breadcrumb stack deciding which `(level, parent)` view is shown.

use atlas_shared::{AdminLevel, Domain};
use serde::{Deserialize, Serialize};

use crate::cache::ViewKey;

/// One breadcrumb. The root frame shows every district of the country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrillDownFrame {
    pub level: AdminLevel,
    pub region_id: Option<i64>,
    pub region_name: String,
}

impl DrillDownFrame {
    pub fn root(country_name: &str) -> Self {
        Self {
            level: AdminLevel::District,
            region_id: None,
            region_name: country_name.to_string(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.region_id.is_none()
    }
}

/// What the navigator needs to know about a clicked unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRef {
    pub id: i64,
    pub name: String,
    pub level: AdminLevel,
    pub has_data: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionMode {
    /// Drilling requires the unit to have at least one record.
    #[default]
    DrillDown,
    /// Boundaries only; any non-parish unit can be entered.
    Browse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavOutcome {
    /// The stack changed; load the new top frame.
    Navigated(DrillDownFrame),
    /// Show the unit's detail instead of navigating (parish or no data).
    ShowDetail(i64),
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct Navigator {
    frames: Vec<DrillDownFrame>,
    mode: InteractionMode,
}

impl Navigator {
    pub fn new(country_name: &str) -> Self {
        Self {
            frames: vec![DrillDownFrame::root(country_name)],
            mode: InteractionMode::default(),
        }
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: InteractionMode) {
        self.mode = mode;
    }

    pub fn current(&self) -> &DrillDownFrame {
        // The root frame is never popped.
        &self.frames[self.frames.len() - 1]
    }

    pub fn breadcrumbs(&self) -> &[DrillDownFrame] {
        &self.frames
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn view_key(&self, domain: Option<Domain>) -> ViewKey {
        let frame = self.current();
        ViewKey {
            domain,
            level: frame.level,
            parent_id: frame.region_id,
        }
    }

    pub fn drill_into(&mut self, unit: &UnitRef) -> NavOutcome {
        let Some(child_level) = unit.level.child() else {
            return NavOutcome::ShowDetail(unit.id);
        };
        if self.mode == InteractionMode::DrillDown && !unit.has_data {
            return NavOutcome::ShowDetail(unit.id);
        }
        let frame = DrillDownFrame {
            level: child_level,
            region_id: Some(unit.id),
            region_name: unit.name.clone(),
        };
        self.frames.push(frame.clone());
        NavOutcome::Navigated(frame)
    }

    /// Truncate to `index + 1` frames; `-1` returns to the root. Indices past
    /// the end leave the stack alone.
    pub fn navigate_to_breadcrumb(&mut self, index: isize) -> NavOutcome {
        let keep = if index < 0 {
            1
        } else {
            match usize::try_from(index) {
                Ok(i) if i < self.frames.len() => i + 1,
                _ => return NavOutcome::Unchanged,
            }
        };
        if keep == self.frames.len() {
            return NavOutcome::Unchanged;
        }
        self.frames.truncate(keep);
        NavOutcome::Navigated(self.current().clone())
    }

    pub fn back(&mut self) -> NavOutcome {
        if self.frames.len() <= 1 {
            return NavOutcome::Unchanged;
        }
        self.frames.pop();
        NavOutcome::Navigated(self.current().clone())
    }

    /// Jump straight to the view of `unit`'s children, e.g. after a search or
    /// a point lookup.
    pub fn navigate_to_unit(&mut self, unit: &UnitRef) -> NavOutcome {
        let Some(child_level) = unit.level.child() else {
            return NavOutcome::ShowDetail(unit.id);
        };
        self.frames.truncate(1);
        let frame = DrillDownFrame {
            level: child_level,
            region_id: Some(unit.id),
            region_name: unit.name.clone(),
        };
        self.frames.push(frame.clone());
        NavOutcome::Navigated(frame)
    }
}
