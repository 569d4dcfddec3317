use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};

/// One of the five fixed tiers of the administrative hierarchy.
///
/// Levels are numbered from the coarsest (`Subregion = 1`) to the finest
/// (`Parish = 5`). A numerically greater level is finer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AdminLevel {
    Subregion = 1,
    District = 2,
    Constituency = 3,
    Subcounty = 4,
    Parish = 5,
}

impl AdminLevel {
    pub const ALL: [AdminLevel; 5] = [
        AdminLevel::Subregion,
        AdminLevel::District,
        AdminLevel::Constituency,
        AdminLevel::Subcounty,
        AdminLevel::Parish,
    ];

    pub const FINEST: AdminLevel = AdminLevel::Parish;

    pub fn from_number(level: i64) -> Result<Self> {
        match level {
            1 => Ok(Self::Subregion),
            2 => Ok(Self::District),
            3 => Ok(Self::Constituency),
            4 => Ok(Self::Subcounty),
            5 => Ok(Self::Parish),
            other => Err(AtlasError::InvalidLevel(other)),
        }
    }

    pub const fn number(self) -> u8 {
        self as u8
    }

    /// Zero-based slot used by per-level arrays.
    pub const fn index(self) -> usize {
        self as usize - 1
    }

    pub fn parent(self) -> Option<Self> {
        match self {
            Self::Subregion => None,
            other => Self::from_number(i64::from(other.number()) - 1).ok(),
        }
    }

    pub fn child(self) -> Option<Self> {
        match self {
            Self::Parish => None,
            other => Self::from_number(i64::from(other.number()) + 1).ok(),
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Parish)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subregion => "subregion",
            Self::District => "district",
            Self::Constituency => "constituency",
            Self::Subcounty => "subcounty",
            Self::Parish => "parish",
        }
    }
}

impl fmt::Display for AdminLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for AdminLevel {
    type Error = AtlasError;

    fn try_from(value: u8) -> Result<Self> {
        Self::from_number(i64::from(value))
    }
}

impl From<AdminLevel> for u8 {
    fn from(value: AdminLevel) -> Self {
        value.number()
    }
}
