//! Table names and schemas of the primitives layer
//!
//! Production backends own their DDL; [`install_schemas`] registers the same
//! shapes with the in-memory backend.

use keystone_core::Result;
use keystone_storage::{MemoryDatabase, TableSchema};

/// Lease rows, keyed by resource
pub const LEASES_TABLE: &str = "Leases";
/// Web features, keyed by feature key with a generated `ID`
pub const WEB_FEATURES_TABLE: &str = "WebFeatures";
/// Per-browser availability dates, keyed by (feature id, browser)
pub const BROWSER_AVAILABILITIES_TABLE: &str = "BrowserFeatureAvailabilities";
/// Feature groups, keyed by group key with a generated `ID`
pub const FEATURE_GROUPS_TABLE: &str = "FeatureGroups";
/// Direct group memberships of one web feature
pub const WEB_FEATURE_GROUPS_TABLE: &str = "WebFeatureGroups";
/// Denormalized (group, feature, depth) edges
pub const GROUP_DESCENDANTS_TABLE: &str = "FeatureGroupDescendants";
/// Saved searches, keyed by `ID`
pub const SAVED_SEARCHES_TABLE: &str = "SavedSearches";
/// Histogram enum buckets
pub const HISTOGRAM_ENUM_VALUES_TABLE: &str = "HistogramEnumValues";

/// Schemas of every table used by this crate
pub fn schemas() -> Vec<TableSchema> {
    vec![
        TableSchema::new(LEASES_TABLE, &["ResourceID"]),
        TableSchema::new(WEB_FEATURES_TABLE, &["FeatureKey"]).with_generated_id("ID"),
        TableSchema::new(BROWSER_AVAILABILITIES_TABLE, &["WebFeatureID", "BrowserName"]),
        TableSchema::new(FEATURE_GROUPS_TABLE, &["GroupKey"]).with_generated_id("ID"),
        TableSchema::new(WEB_FEATURE_GROUPS_TABLE, &["WebFeatureID"]),
        TableSchema::new(GROUP_DESCENDANTS_TABLE, &["FeatureGroupID", "WebFeatureID"]),
        TableSchema::new(SAVED_SEARCHES_TABLE, &["ID"]),
        TableSchema::new(HISTOGRAM_ENUM_VALUES_TABLE, &["EnumID", "BucketID"]),
    ]
}

/// Register every schema with an in-memory database
///
/// # Errors
///
/// Returns `InvalidInput` if a table is already registered.
pub fn install_schemas(db: &MemoryDatabase) -> Result<()> {
    for schema in schemas() {
        db.create_table(schema)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_schemas_registers_every_table() {
        let db = MemoryDatabase::new();
        install_schemas(&db).unwrap();
        for schema in schemas() {
            assert_eq!(db.row_count(&schema.name), 0);
            assert!(db.rows(&schema.name).is_ok());
        }
        assert!(install_schemas(&db).is_err());
    }
}
