//! Histogram enum values
//!
//! Bucket labels are write-once: the first label recorded for an
//! `(EnumID, BucketID)` pair wins and later upserts leave it alone.

use crate::tables::HISTOGRAM_ENUM_VALUES_TABLE;
use keystone_core::Statement;
use keystone_engine::{Keyed, Mergeable};
use serde::{Deserialize, Serialize};

/// One labelled bucket of an enumerated histogram
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HistogramEnumValue {
    /// Histogram enum
    #[serde(rename = "EnumID")]
    pub enum_id: String,
    /// Bucket number within the enum
    #[serde(rename = "BucketID")]
    pub bucket_id: i64,
    /// Human-readable bucket label
    pub label: String,
}

/// Mapper for [`HistogramEnumValue`]
pub struct HistogramEnumValueMapper;

impl Keyed for HistogramEnumValueMapper {
    type Entity = HistogramEnumValue;
    type Key = (String, i64);
    const TABLE: &'static str = HISTOGRAM_ENUM_VALUES_TABLE;

    fn key_of(entity: &HistogramEnumValue) -> (String, i64) {
        (entity.enum_id.clone(), entity.bucket_id)
    }

    fn select_by_key(key: &(String, i64)) -> Statement {
        Statement::new(
            "SELECT * FROM HistogramEnumValues WHERE EnumID = @enumID AND BucketID = @bucketID",
        )
        .bind("enumID", key.0.as_str())
        .bind("bucketID", key.1)
    }
}

impl Mergeable for HistogramEnumValueMapper {
    fn merge(_incoming: HistogramEnumValue, existing: HistogramEnumValue) -> HistogramEnumValue {
        existing
    }
}

/// Every bucket of one enum, in bucket order
pub fn enum_values_statement(enum_id: &str) -> Statement {
    Statement::new("SELECT * FROM HistogramEnumValues WHERE EnumID = @enumID ORDER BY BucketID")
        .bind("enumID", enum_id)
}
