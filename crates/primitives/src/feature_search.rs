//! Feature search queries built from compiled templates
//!
//! "Missing one implementation" lists the features every browser in a set
//! supports by a date except one target browser. The number of `EXISTS`
//! conditions varies with the set, so the statement is rendered from a
//! template compiled once per process; browser names reach the store only as
//! the bound parameters `otherBrowser0..N`.

use chrono::{DateTime, Utc};
use keystone_core::{
    bind_indexed, Context, Database, Error, QueryTemplate, Result, Statement, TemplateData, Value,
};
use keystone_engine::{PAGE_OFFSET_PARAM, PAGE_SIZE_PARAM};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use tracing::debug;

/// Prefix of the generated per-browser placeholders
pub const OTHER_BROWSER_PREFIX: &str = "otherBrowser";

const MISSING_ONE_IMPLEMENTATION: &str = "\
SELECT wf.FeatureKey FROM WebFeatures wf \
WHERE NOT EXISTS (\
SELECT 1 FROM BrowserFeatureAvailabilities bfa \
WHERE bfa.WebFeatureID = wf.ID AND bfa.BrowserName = @targetBrowser \
AND bfa.AvailabilityDate <= @targetDate)\
{{ range .OtherBrowsers }} AND EXISTS (\
SELECT 1 FROM BrowserFeatureAvailabilities bfa \
WHERE bfa.WebFeatureID = wf.ID AND bfa.BrowserName = @{{ . }} \
AND bfa.AvailabilityDate <= @targetDate){{ end }}\
{{ if .HasExclusions }} AND wf.FeatureKey NOT IN UNNEST(@excludedFeatureKeys){{ end }} \
ORDER BY wf.FeatureKey LIMIT @pageSize\
{{ if .HasOffset }} OFFSET @pageOffset{{ end }}";

static MISSING_ONE_IMPLEMENTATION_TEMPLATE: Lazy<QueryTemplate> = Lazy::new(|| {
    QueryTemplate::compile("missing_one_implementation", MISSING_ONE_IMPLEMENTATION)
        .expect("missing-one-implementation template must compile")
});

/// Features supported everywhere in `other_browsers` but not in `target_browser`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingOneImplementationQuery {
    /// Browser lacking the implementation
    pub target_browser: String,
    /// Browsers that must all have shipped the feature
    pub other_browsers: Vec<String>,
    /// Availability cut-off
    pub target_date: DateTime<Utc>,
    /// Feature keys to leave out of the result
    pub excluded_feature_keys: Vec<String>,
    /// Rows per page
    pub page_size: usize,
    /// Rows to skip
    pub offset: u64,
}

impl MissingOneImplementationQuery {
    /// First page of `page_size` rows with no exclusions
    pub fn new(
        target_browser: impl Into<String>,
        other_browsers: Vec<String>,
        target_date: DateTime<Utc>,
        page_size: usize,
    ) -> Self {
        Self {
            target_browser: target_browser.into(),
            other_browsers,
            target_date,
            excluded_feature_keys: Vec::new(),
            page_size,
            offset: 0,
        }
    }

    /// Leave the given feature keys out
    pub fn excluding(mut self, feature_keys: Vec<String>) -> Self {
        self.excluded_feature_keys = feature_keys;
        self
    }

    /// Start at `offset`
    pub fn at_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Render the statement
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty target browser or a zero page size.
    pub fn to_statement(&self) -> Result<Statement> {
        if self.target_browser.is_empty() {
            return Err(Error::invalid_input("target browser must not be empty"));
        }
        if self.page_size == 0 {
            return Err(Error::invalid_input("page size must be positive"));
        }

        let mut params = BTreeMap::new();
        params.insert("targetBrowser".to_string(), Value::from(self.target_browser.as_str()));
        params.insert("targetDate".to_string(), Value::Timestamp(self.target_date));
        params.insert(PAGE_SIZE_PARAM.to_string(), Value::Int(self.page_size as i64));
        let others = bind_indexed(
            &mut params,
            OTHER_BROWSER_PREFIX,
            self.other_browsers.iter().map(String::as_str),
        )?;

        let has_exclusions = !self.excluded_feature_keys.is_empty();
        if has_exclusions {
            params.insert(
                "excludedFeatureKeys".to_string(),
                Value::Array(
                    self.excluded_feature_keys
                        .iter()
                        .map(|k| Value::from(k.as_str()))
                        .collect(),
                ),
            );
        }
        let has_offset = self.offset > 0;
        if has_offset {
            let offset = i64::try_from(self.offset)
                .map_err(|_| Error::invalid_input("offset out of range"))?;
            params.insert(PAGE_OFFSET_PARAM.to_string(), Value::Int(offset));
        }

        let data = TemplateData::new()
            .list("OtherBrowsers", others)
            .flag("HasExclusions", has_exclusions)
            .flag("HasOffset", has_offset);
        MISSING_ONE_IMPLEMENTATION_TEMPLATE.render_statement(&data, params)
    }

    /// Run the search and return one page of feature keys in key order
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` as [`to_statement`](Self::to_statement) does, or
    /// the backend's error.
    pub fn fetch<D: Database + ?Sized>(&self, ctx: &Context, db: &D) -> Result<Vec<String>> {
        let statement = self.to_statement()?;
        let mut txn = db.single(ctx)?;
        let keys = txn
            .query(&statement)?
            .map(|row| row?.get_string("FeatureKey"))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            target: "keystone::store",
            browser = %self.target_browser,
            others = self.other_browsers.len(),
            found = keys.len(),
            "Missing-one-implementation search"
        );
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use keystone_core::ErrorKind;

    fn query(others: &[&str]) -> MissingOneImplementationQuery {
        MissingOneImplementationQuery::new(
            "safari",
            others.iter().map(|s| s.to_string()).collect(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            25,
        )
    }

    #[test]
    fn test_template_compiles() {
        Lazy::force(&MISSING_ONE_IMPLEMENTATION_TEMPLATE);
    }

    #[test]
    fn test_one_exists_clause_per_other_browser() {
        for n in 0..4 {
            let others: Vec<String> = (0..n).map(|i| format!("browser-{}", i)).collect();
            let others: Vec<&str> = others.iter().map(String::as_str).collect();
            let statement = query(&others).to_statement().unwrap();
            assert_eq!(statement.sql.matches(" AND EXISTS (").count(), n);
            for i in 0..n {
                let name = format!("otherBrowser{}", i);
                assert!(statement.sql.contains(&format!("@{}", name)));
                assert_eq!(
                    statement.param(&name),
                    Some(&Value::from(format!("browser-{}", i)))
                );
            }
        }
    }

    #[test]
    fn test_browser_names_never_reach_sql_text() {
        let statement = query(&["chrome'); DROP TABLE WebFeatures; --", "firefox"])
            .to_statement()
            .unwrap();
        assert!(!statement.sql.contains("DROP"));
        assert!(!statement.sql.contains("firefox"));
        assert!(!statement.sql.contains("safari"));
    }

    #[test]
    fn test_optional_fragments() {
        let plain = query(&["chrome"]).to_statement().unwrap();
        assert!(!plain.sql.contains("NOT IN UNNEST"));
        assert!(!plain.sql.contains("OFFSET"));
        assert!(plain.param("excludedFeatureKeys").is_none());

        let full = query(&["chrome"])
            .excluding(vec!["grid".into()])
            .at_offset(50)
            .to_statement()
            .unwrap();
        assert!(full.sql.contains("wf.FeatureKey NOT IN UNNEST(@excludedFeatureKeys)"));
        assert!(full.sql.ends_with("OFFSET @pageOffset"));
        assert_eq!(full.param("pageOffset"), Some(&Value::Int(50)));
    }

    #[test]
    fn test_invalid_queries() {
        let mut q = query(&["chrome"]);
        q.target_browser.clear();
        assert_eq!(q.to_statement().unwrap_err().kind(), ErrorKind::InvalidInput);

        let mut q = query(&["chrome"]);
        q.page_size = 0;
        assert_eq!(q.to_statement().unwrap_err().kind(), ErrorKind::InvalidInput);
    }
}
