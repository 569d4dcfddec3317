pub mod aggregate;
pub mod api;
pub mod domain;
pub mod error;
pub mod feature;
pub mod geometry;
pub mod join;
pub mod level;
pub mod lineage;
pub mod metric;
pub mod unit;

pub use aggregate::{AggregateRequest, AggregateResult, AggregateSet, RankedEntry, aggregate};
pub use domain::{Domain, DomainKind, Election, ElectionType, SURVEY_STORAGE_LEVEL};
pub use error::{AtlasError, Result};
pub use feature::{CollectionMetadata, Feature, FeatureCollection, FeatureProperties};
pub use join::{JoinOutcome, boundary_collection, join};
pub use level::AdminLevel;
pub use lineage::{DistrictLineage, resolve_inheritance};
pub use metric::{DemographicsRecord, ElectionResult, IssueRecord, MetricRecord, RecordStatus};
pub use unit::{AdminTree, AdminUnit};
