use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};
use crate::level::AdminLevel;

/// The three metric families the engine aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainKind {
    Elections,
    Demographics,
    Issues,
}

impl DomainKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Elections => "elections",
            Self::Demographics => "demographics",
            Self::Issues => "issues",
        }
    }
}

impl FromStr for DomainKind {
    type Err = AtlasError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "elections" | "election" | "results" => Ok(Self::Elections),
            "demographics" | "demographic" | "population" => Ok(Self::Demographics),
            "issues" | "issue" | "incidents" => Ok(Self::Issues),
            other => Err(AtlasError::InvalidDomain(format!("unknown domain '{other}'"))),
        }
    }
}

/// A concrete domain instance: which election, which census year, which
/// incident year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum Domain {
    Elections { election_id: i64 },
    Demographics { year: Option<i32> },
    Issues { year: Option<i32> },
}

impl Domain {
    /// Build a domain from loosely typed request parameters.
    pub fn from_parts(kind: &str, entity_id: Option<i64>, year: Option<i32>) -> Result<Self> {
        match kind.parse::<DomainKind>()? {
            DomainKind::Elections => {
                let election_id = entity_id.ok_or_else(|| {
                    AtlasError::InvalidDomain("elections require an entity_id".to_string())
                })?;
                Ok(Self::Elections { election_id })
            }
            DomainKind::Demographics => Ok(Self::Demographics { year }),
            DomainKind::Issues => Ok(Self::Issues { year }),
        }
    }

    pub const fn kind(&self) -> DomainKind {
        match self {
            Self::Elections { .. } => DomainKind::Elections,
            Self::Demographics { .. } => DomainKind::Demographics,
            Self::Issues { .. } => DomainKind::Issues,
        }
    }

    /// Stable textual key, used for cache keys and logs.
    pub fn cache_key(&self) -> String {
        match self {
            Self::Elections { election_id } => format!("elections:{election_id}"),
            Self::Demographics { year: Some(year) } => format!("demographics:{year}"),
            Self::Demographics { year: None } => "demographics:latest".to_string(),
            Self::Issues { year: Some(year) } => format!("issues:{year}"),
            Self::Issues { year: None } => "issues:all".to_string(),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Election category, decoded from the election-type code stored with an
/// election. Determines the level its results are recorded at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionType {
    Presidential,
    ConstituencyMp,
    DistrictWomanMp,
    DistrictChairperson,
    Other(String),
}

impl ElectionType {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "PRES" | "PRESIDENTIAL" => Self::Presidential,
            "MP" | "CONSTITUENCY_MP" | "DIRECTLY_ELECTED_MP" => Self::ConstituencyMp,
            "WOMAN_MP" | "DISTRICT_WOMAN_MP" => Self::DistrictWomanMp,
            "LC5" | "LC5_CHAIRPERSON" | "DISTRICT_CHAIRPERSON" => Self::DistrictChairperson,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn storage_level(&self) -> AdminLevel {
        match self {
            Self::Presidential => AdminLevel::Parish,
            Self::ConstituencyMp => AdminLevel::Constituency,
            Self::DistrictWomanMp | Self::DistrictChairperson => AdminLevel::District,
            Self::Other(_) => AdminLevel::FINEST,
        }
    }
}

/// Election metadata needed to aggregate its results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Election {
    pub id: i64,
    pub name: String,
    pub election_type: String,
    #[serde(default)]
    pub year: Option<i32>,
}

impl Election {
    pub fn storage_level(&self) -> AdminLevel {
        ElectionType::from_code(&self.election_type).storage_level()
    }
}

/// Storage level of demographics and incident records, both kept per parish.
pub const SURVEY_STORAGE_LEVEL: AdminLevel = AdminLevel::FINEST;
