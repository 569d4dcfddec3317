//! Data access behind the HTTP layer.
//!
//! `Store` is an enum rather than a trait object so the async methods can be
//! dispatched without boxing.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;
use std::sync::Arc;

use atlas_shared::{
    AdminLevel, AdminUnit, DemographicsRecord, DistrictLineage, Election, ElectionResult,
    IssueRecord,
};
use serde_json::Value;

use crate::error::ApiError;
use memory::MemoryStore;
use postgres::PgStore;

#[derive(Clone)]
pub enum Store {
    Postgres(PgStore),
    Memory(Arc<MemoryStore>),
}

impl Store {
    pub fn backend(&self) -> &'static str {
        match self {
            Store::Postgres(_) => "postgres",
            Store::Memory(_) => "memory",
        }
    }

    pub fn supports_point_lookup(&self) -> bool {
        match self {
            Store::Postgres(pg) => pg.has_postgis(),
            Store::Memory(_) => true,
        }
    }

    /// The administrative hierarchy without geometry.
    pub async fn units(&self) -> Result<Vec<AdminUnit>, ApiError> {
        match self {
            Store::Postgres(pg) => pg.units().await,
            Store::Memory(mem) => Ok(mem.units()),
        }
    }

    /// Raw geometry for the given units; units without geometry are absent.
    pub async fn geometries(&self, ids: &[i64]) -> Result<HashMap<i64, Value>, ApiError> {
        match self {
            Store::Postgres(pg) => pg.geometries(ids).await,
            Store::Memory(mem) => Ok(mem.geometries(ids)),
        }
    }

    pub async fn lineage(&self) -> Result<Vec<DistrictLineage>, ApiError> {
        match self {
            Store::Postgres(pg) => pg.lineage().await,
            Store::Memory(mem) => Ok(mem.lineage()),
        }
    }

    pub async fn elections(&self) -> Result<Vec<Election>, ApiError> {
        match self {
            Store::Postgres(pg) => pg.elections().await,
            Store::Memory(mem) => Ok(mem.elections()),
        }
    }

    pub async fn election(&self, id: i64) -> Result<Option<Election>, ApiError> {
        match self {
            Store::Postgres(pg) => pg.election(id).await,
            Store::Memory(mem) => Ok(mem.election(id)),
        }
    }

    pub async fn election_results(&self, election_id: i64) -> Result<Vec<ElectionResult>, ApiError> {
        match self {
            Store::Postgres(pg) => pg.election_results(election_id).await,
            Store::Memory(mem) => Ok(mem.election_results(election_id)),
        }
    }

    pub async fn demographics(&self, year: Option<i32>) -> Result<Vec<DemographicsRecord>, ApiError> {
        match self {
            Store::Postgres(pg) => pg.demographics(year).await,
            Store::Memory(mem) => Ok(mem.demographics(year)),
        }
    }

    pub async fn issues(&self, year: Option<i32>) -> Result<Vec<IssueRecord>, ApiError> {
        match self {
            Store::Postgres(pg) => pg.issues(year).await,
            Store::Memory(mem) => Ok(mem.issues(year)),
        }
    }

    pub async fn point_lookup(
        &self,
        lng: f64,
        lat: f64,
        level: Option<AdminLevel>,
    ) -> Result<Vec<i64>, ApiError> {
        match self {
            Store::Postgres(pg) => pg.point_lookup(lng, lat, level).await,
            Store::Memory(mem) => Ok(mem.point_lookup(lng, lat, level)),
        }
    }
}
