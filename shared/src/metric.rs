use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub const MEASURE_MALE: &str = "male";
pub const MEASURE_FEMALE: &str = "female";
pub const MEASURE_HOUSEHOLDS: &str = "households";
pub const MEASURE_VOTING_AGE: &str = "votingAge";
pub const MEASURE_INJURIES: &str = "injuries";
pub const MEASURE_DEATHS: &str = "deaths";

/// Workflow state of an entered record. Only approved records are public.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
}

impl RecordStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Votes for one candidate in one administrative unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionResult {
    pub election_id: i64,
    pub unit_id: i64,
    pub candidate_id: i64,
    pub candidate_name: String,
    #[serde(default)]
    pub party: Option<String>,
    pub votes: u64,
    pub status: RecordStatus,
}

/// Census figures for one parish and year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemographicsRecord {
    pub unit_id: i64,
    pub year: i32,
    pub total_population: u64,
    #[serde(default)]
    pub male_population: u64,
    #[serde(default)]
    pub female_population: u64,
    #[serde(default)]
    pub households: Option<u64>,
    #[serde(default)]
    pub voting_age_population: Option<u64>,
}

/// A reported electoral incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRecord {
    pub id: i64,
    pub unit_id: i64,
    pub category_id: i64,
    pub category_name: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub injuries: u64,
    #[serde(default)]
    pub deaths: u64,
    pub status: RecordStatus,
}

/// Identity of a ranked entry: a candidate for elections, a category for issues.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub id: i64,
    pub name: String,
    pub group: Option<String>,
}

/// Domain-neutral record the aggregator consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub unit_id: i64,
    pub entry: Option<EntryKey>,
    pub count: u64,
    pub measures: Vec<(&'static str, u64)>,
}

impl From<&ElectionResult> for MetricRecord {
    fn from(result: &ElectionResult) -> Self {
        Self {
            unit_id: result.unit_id,
            entry: Some(EntryKey {
                id: result.candidate_id,
                name: result.candidate_name.clone(),
                group: result.party.clone(),
            }),
            count: result.votes,
            measures: Vec::new(),
        }
    }
}

impl From<&DemographicsRecord> for MetricRecord {
    fn from(record: &DemographicsRecord) -> Self {
        let mut measures = vec![
            (MEASURE_MALE, record.male_population),
            (MEASURE_FEMALE, record.female_population),
        ];
        if let Some(households) = record.households {
            measures.push((MEASURE_HOUSEHOLDS, households));
        }
        if let Some(voting_age) = record.voting_age_population {
            measures.push((MEASURE_VOTING_AGE, voting_age));
        }
        Self {
            unit_id: record.unit_id,
            entry: None,
            count: record.total_population,
            measures,
        }
    }
}

impl From<&IssueRecord> for MetricRecord {
    fn from(issue: &IssueRecord) -> Self {
        Self {
            unit_id: issue.unit_id,
            entry: Some(EntryKey {
                id: issue.category_id,
                name: issue.category_name.clone(),
                group: None,
            }),
            count: 1,
            measures: vec![(MEASURE_INJURIES, issue.injuries), (MEASURE_DEATHS, issue.deaths)],
        }
    }
}

/// Approved results only.
pub fn public_results(results: &[ElectionResult]) -> Vec<MetricRecord> {
    results
        .iter()
        .filter(|r| r.status == RecordStatus::Approved)
        .map(MetricRecord::from)
        .collect()
}

/// Approved incidents, optionally restricted to one calendar year.
pub fn public_issues(issues: &[IssueRecord], year: Option<i32>) -> Vec<MetricRecord> {
    issues
        .iter()
        .filter(|i| i.status == RecordStatus::Approved)
        .filter(|i| year.is_none_or(|y| i.date.year() == y))
        .map(MetricRecord::from)
        .collect()
}

/// Census records for `year`, or for the latest year present when `year` is
/// `None`. Returns the year actually used.
pub fn census_for_year(
    records: &[DemographicsRecord],
    year: Option<i32>,
) -> (Option<i32>, Vec<MetricRecord>) {
    let Some(year) = year.or_else(|| records.iter().map(|r| r.year).max()) else {
        return (None, Vec::new());
    };
    let selected = records
        .iter()
        .filter(|r| r.year == year)
        .map(MetricRecord::from)
        .collect();
    (Some(year), selected)
}
