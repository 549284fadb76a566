//! Web features
//!
//! Features are addressed by their stable `FeatureKey`; the store assigns a
//! surrogate `ID` on first insert that other tables reference. Browser
//! availabilities hang off that `ID`.

use crate::tables::{BROWSER_AVAILABILITIES_TABLE, WEB_FEATURES_TABLE};
use chrono::{DateTime, Utc};
use keystone_core::{Result, Row, Statement};
use keystone_engine::{IdRetrievable, Keyed, Mergeable};
use serde::{Deserialize, Serialize};

/// One web platform feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WebFeature {
    /// Store-generated id; `None` before the first insert
    #[serde(rename = "ID")]
    pub id: Option<String>,
    /// Stable external key
    pub feature_key: String,
    /// Display name
    pub name: String,
}

impl WebFeature {
    /// Feature not yet persisted
    pub fn new(feature_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            feature_key: feature_key.into(),
            name: name.into(),
        }
    }
}

/// Mapper for [`WebFeature`]
pub struct WebFeatureMapper;

impl Keyed for WebFeatureMapper {
    type Entity = WebFeature;
    type Key = String;
    const TABLE: &'static str = WEB_FEATURES_TABLE;

    fn key_of(entity: &WebFeature) -> String {
        entity.feature_key.clone()
    }

    fn select_by_key(key: &String) -> Statement {
        Statement::new("SELECT * FROM WebFeatures WHERE FeatureKey = @featureKey")
            .bind("featureKey", key.as_str())
    }
}

impl Mergeable for WebFeatureMapper {
    fn merge(incoming: WebFeature, existing: WebFeature) -> WebFeature {
        WebFeature {
            id: existing.id,
            name: incoming.name,
            ..existing
        }
    }
}

impl IdRetrievable for WebFeatureMapper {
    type Id = String;

    fn id_from_row(row: &Row) -> Result<String> {
        row.get_string("ID")
    }
}

/// Date one browser shipped one feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BrowserFeatureAvailability {
    /// Generated `ID` of the web feature
    #[serde(rename = "WebFeatureID")]
    pub web_feature_id: String,
    /// Browser name, e.g. `chrome`
    pub browser_name: String,
    /// First release carrying the feature
    pub availability_date: DateTime<Utc>,
}

impl BrowserFeatureAvailability {
    /// Availability of `web_feature_id` in `browser_name` from `date`
    pub fn new(
        web_feature_id: impl Into<String>,
        browser_name: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            web_feature_id: web_feature_id.into(),
            browser_name: browser_name.into(),
            availability_date: date,
        }
    }
}

/// Mapper for [`BrowserFeatureAvailability`], keyed by (feature id, browser)
pub struct BrowserFeatureAvailabilityMapper;

impl Keyed for BrowserFeatureAvailabilityMapper {
    type Entity = BrowserFeatureAvailability;
    type Key = (String, String);
    const TABLE: &'static str = BROWSER_AVAILABILITIES_TABLE;

    fn key_of(entity: &BrowserFeatureAvailability) -> (String, String) {
        (entity.web_feature_id.clone(), entity.browser_name.clone())
    }

    fn select_by_key(key: &(String, String)) -> Statement {
        Statement::new(
            "SELECT * FROM BrowserFeatureAvailabilities \
             WHERE WebFeatureID = @webFeatureID AND BrowserName = @browserName",
        )
        .bind("webFeatureID", key.0.as_str())
        .bind("browserName", key.1.as_str())
    }
}

impl Mergeable for BrowserFeatureAvailabilityMapper {
    // Earliest report wins
    fn merge(
        incoming: BrowserFeatureAvailability,
        existing: BrowserFeatureAvailability,
    ) -> BrowserFeatureAvailability {
        BrowserFeatureAvailability {
            availability_date: incoming.availability_date.min(existing.availability_date),
            ..existing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_availability_merge_keeps_earliest_date() {
        let early = Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2023, 9, 1, 0, 0, 0).unwrap();
        let merged = BrowserFeatureAvailabilityMapper::merge(
            BrowserFeatureAvailability::new("id-1", "firefox", late),
            BrowserFeatureAvailability::new("id-1", "firefox", early),
        );
        assert_eq!(merged.availability_date, early);
        let merged = BrowserFeatureAvailabilityMapper::merge(
            BrowserFeatureAvailability::new("id-1", "firefox", early),
            BrowserFeatureAvailability::new("id-1", "firefox", late),
        );
        assert_eq!(merged.availability_date, early);
    }

    #[test]
    fn test_merge_keeps_generated_id() {
        let existing = WebFeature {
            id: Some("id-1".into()),
            ..WebFeature::new("grid", "Grid")
        };
        let merged = WebFeatureMapper::merge(WebFeature::new("grid", "CSS Grid"), existing);
        assert_eq!(merged.id.as_deref(), Some("id-1"));
        assert_eq!(merged.name, "CSS Grid");
    }

    #[test]
    fn test_id_from_row_requires_id() {
        let row = Row::new().with("FeatureKey", "grid");
        assert!(WebFeatureMapper::id_from_row(&row).is_err());
        let row = row.with("ID", "id-1");
        assert_eq!(WebFeatureMapper::id_from_row(&row).unwrap(), "id-1");
    }
}
