use std::collections::HashMap;

use atlas_shared::{
    AdminLevel, AdminUnit, AtlasError, DemographicsRecord, DistrictLineage, Election,
    ElectionResult, IssueRecord, RecordStatus,
};
use chrono::NaiveDate;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::error::ApiError;

type UnitRow = (i64, String, Option<String>, i16, Option<i64>, Option<i64>);
type ElectionRow = (i64, String, String, Option<i32>);
type ResultRow = (i64, i64, i64, String, Option<String>, i64, String);
type DemographicsRow = (i64, i32, i64, i64, i64, Option<i64>, Option<i64>);
type IssueRow = (i64, i64, i64, String, NaiveDate, i64, i64, String);

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    postgis: bool,
}

impl PgStore {
    /// Wrap a migrated pool, probing once for PostGIS.
    pub async fn new(pool: PgPool) -> Self {
        let postgis = match sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'postgis')",
        )
        .fetch_one(&pool)
        .await
        {
            Ok(available) => available,
            Err(e) => {
                warn!(error = %e, "failed to probe for PostGIS; point lookup disabled");
                false
            }
        };
        info!(postgis, "PostgreSQL store ready");
        Self { pool, postgis }
    }

    pub fn has_postgis(&self) -> bool {
        self.postgis
    }

    pub async fn units(&self) -> Result<Vec<AdminUnit>, ApiError> {
        let rows: Vec<UnitRow> = sqlx::query_as(
            "SELECT id, name, code, level, parent_id, registered_voters \
             FROM admin_units ORDER BY level, id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, name, code, level, parent_id, voters)| -> Result<AdminUnit, ApiError> {
                Ok(AdminUnit {
                    id,
                    name,
                    code,
                    level: AdminLevel::from_number(i64::from(level))?,
                    parent_id,
                    geometry: None,
                    registered_voters: voters.and_then(|v| u64::try_from(v).ok()),
                })
            })
            .collect()
    }

    pub async fn geometries(&self, ids: &[i64]) -> Result<HashMap<i64, Value>, ApiError> {
        let rows: Vec<(i64, Value)> = sqlx::query_as(
            "SELECT id, geometry FROM admin_units \
             WHERE id = ANY($1) AND geometry IS NOT NULL",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn lineage(&self) -> Result<Vec<DistrictLineage>, ApiError> {
        let rows: Vec<(i64, i64, i32)> = sqlx::query_as(
            "SELECT current_unit_id, parent_unit_id, split_year FROM district_lineage",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(current_unit_id, parent_unit_id, split_year)| DistrictLineage {
                current_unit_id,
                parent_unit_id,
                split_year,
            })
            .collect())
    }

    pub async fn elections(&self) -> Result<Vec<Election>, ApiError> {
        let rows: Vec<ElectionRow> =
            sqlx::query_as("SELECT id, name, election_type, year FROM elections ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(election_from_row).collect())
    }

    pub async fn election(&self, id: i64) -> Result<Option<Election>, ApiError> {
        let row: Option<ElectionRow> =
            sqlx::query_as("SELECT id, name, election_type, year FROM elections WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(election_from_row))
    }

    pub async fn election_results(&self, election_id: i64) -> Result<Vec<ElectionResult>, ApiError> {
        let rows: Vec<ResultRow> = sqlx::query_as(
            "SELECT r.election_id, r.unit_id, r.candidate_id, c.name, c.party, r.votes, r.status \
             FROM results r \
             JOIN candidates c ON c.id = r.candidate_id \
             WHERE r.election_id = $1",
        )
        .bind(election_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(
                |(election_id, unit_id, candidate_id, candidate_name, party, votes, status)| {
                    Some(ElectionResult {
                        election_id,
                        unit_id,
                        candidate_id,
                        candidate_name,
                        party,
                        votes: non_negative(votes),
                        status: parse_status(&status)?,
                    })
                },
            )
            .collect())
    }

    pub async fn demographics(&self, year: Option<i32>) -> Result<Vec<DemographicsRecord>, ApiError> {
        let rows: Vec<DemographicsRow> = sqlx::query_as(
            "SELECT unit_id, year, total_population, male_population, female_population, \
                    households, voting_age_population \
             FROM demographics \
             WHERE year = COALESCE($1::int, (SELECT MAX(year) FROM demographics))",
        )
        .bind(year)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(unit_id, year, total, male, female, households, voting_age)| DemographicsRecord {
                    unit_id,
                    year,
                    total_population: non_negative(total),
                    male_population: non_negative(male),
                    female_population: non_negative(female),
                    households: households.map(non_negative),
                    voting_age_population: voting_age.map(non_negative),
                },
            )
            .collect())
    }

    pub async fn issues(&self, year: Option<i32>) -> Result<Vec<IssueRecord>, ApiError> {
        let rows: Vec<IssueRow> = sqlx::query_as(
            "SELECT i.id, i.unit_id, i.category_id, c.name, i.date, i.injuries, i.deaths, i.status \
             FROM electoral_issues i \
             JOIN issue_categories c ON c.id = i.category_id \
             WHERE $1::int IS NULL OR EXTRACT(YEAR FROM i.date)::int = $1",
        )
        .bind(year)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(
                |(id, unit_id, category_id, category_name, date, injuries, deaths, status)| {
                    Some(IssueRecord {
                        id,
                        unit_id,
                        category_id,
                        category_name,
                        date,
                        injuries: non_negative(injuries),
                        deaths: non_negative(deaths),
                        status: parse_status(&status)?,
                    })
                },
            )
            .collect())
    }

    /// Units whose polygon contains the point, via PostGIS.
    pub async fn point_lookup(
        &self,
        lng: f64,
        lat: f64,
        level: Option<AdminLevel>,
    ) -> Result<Vec<i64>, ApiError> {
        if !self.postgis {
            return Err(AtlasError::SpatialIndexUnavailable.into());
        }
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM admin_units \
             WHERE geometry IS NOT NULL \
               AND ($3::smallint IS NULL OR level = $3) \
               AND ST_Contains( \
                     ST_SetSRID(ST_GeomFromGeoJSON(geometry::text), 4326), \
                     ST_SetSRID(ST_MakePoint($1, $2), 4326)) \
             ORDER BY id",
        )
        .bind(lng)
        .bind(lat)
        .bind(level.map(|l| i16::from(l.number())))
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

fn election_from_row((id, name, election_type, year): ElectionRow) -> Election {
    Election {
        id,
        name,
        election_type,
        year,
    }
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn parse_status(raw: &str) -> Option<RecordStatus> {
    let status = RecordStatus::parse(raw);
    if status.is_none() {
        warn!(status = raw, "skipping record with unknown workflow status");
    }
    status
}
