//! Saved searches
//!
//! A saved search is created with a client-side UUID, edited through partial
//! update requests and listed per author with offset cursors. The listing
//! query is a compiled template: the author filter and the offset clause are
//! optional fragments.

use crate::tables::SAVED_SEARCHES_TABLE;
use chrono::{DateTime, Utc};
use keystone_core::{
    Context, Database, Error, KeyTuple, Mutation, Page, PageRequest, QueryTemplate, Result,
    Statement, TemplateData, Value,
};
use keystone_engine::{EntityStore, Keyed, Removable, Updatable, PAGE_OFFSET_PARAM, PAGE_SIZE_PARAM};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

const LIST_SAVED_SEARCHES: &str = "SELECT * FROM SavedSearches\
{{ if .ByAuthor }} WHERE AuthorID = @authorID{{ end }} \
ORDER BY Name, ID LIMIT @pageSize\
{{ if .HasOffset }} OFFSET @pageOffset{{ end }}";

static LIST_TEMPLATE: Lazy<QueryTemplate> = Lazy::new(|| {
    QueryTemplate::compile("list_saved_searches", LIST_SAVED_SEARCHES)
        .expect("saved search listing template must compile")
});

/// One saved search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SavedSearch {
    /// Primary key
    #[serde(rename = "ID")]
    pub id: String,
    /// Display name
    pub name: String,
    /// Search query text
    pub query: String,
    /// Optional description
    pub description: Option<String>,
    /// Creating user
    #[serde(rename = "AuthorID")]
    pub author_id: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Partial update of a saved search
///
/// `None` leaves a field unchanged. `description: Some(None)` clears it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSearchUpdateRequest {
    /// Search to update
    pub id: String,
    /// New name
    pub name: Option<String>,
    /// New query
    pub query: Option<String>,
    /// New description, or `Some(None)` to clear
    pub description: Option<Option<String>>,
    /// Modification time to record
    pub updated_at: DateTime<Utc>,
}

impl SavedSearchUpdateRequest {
    /// Request that changes nothing but the modification time
    pub fn new(id: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: None,
            query: None,
            description: None,
            updated_at,
        }
    }
}

/// Mapper for [`SavedSearch`]
pub struct SavedSearchMapper;

impl Keyed for SavedSearchMapper {
    type Entity = SavedSearch;
    type Key = String;
    const TABLE: &'static str = SAVED_SEARCHES_TABLE;

    fn key_of(entity: &SavedSearch) -> String {
        entity.id.clone()
    }

    fn select_by_key(key: &String) -> Statement {
        Statement::new("SELECT * FROM SavedSearches WHERE ID = @id").bind("id", key.as_str())
    }
}

impl Updatable for SavedSearchMapper {
    type Request = SavedSearchUpdateRequest;

    fn key_of_request(request: &SavedSearchUpdateRequest) -> String {
        request.id.clone()
    }

    fn apply_update(request: SavedSearchUpdateRequest, existing: SavedSearch) -> Result<SavedSearch> {
        if let Some(name) = &request.name {
            validate_name(name)?;
        }
        Ok(SavedSearch {
            name: request.name.unwrap_or(existing.name),
            query: request.query.unwrap_or(existing.query),
            description: request.description.unwrap_or(existing.description),
            updated_at: request.updated_at,
            ..existing
        })
    }
}

impl Removable for SavedSearchMapper {
    fn delete_key_of(key: &String) -> KeyTuple {
        KeyTuple::single(key.as_str())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::invalid_input("saved search name must not be empty"));
    }
    Ok(())
}

/// Statement listing one page of saved searches
///
/// # Errors
///
/// Returns a `Template` error if rendering fails.
pub fn list_statement(author_id: Option<&str>, page_size: usize, offset: u64) -> Result<Statement> {
    let mut params = BTreeMap::new();
    params.insert(PAGE_SIZE_PARAM.to_string(), Value::Int(page_size as i64));
    if let Some(author_id) = author_id {
        params.insert("authorID".to_string(), Value::from(author_id));
    }
    if offset > 0 {
        let offset = i64::try_from(offset)
            .map_err(|_| Error::corrupt_cursor("offset out of range"))?;
        params.insert(PAGE_OFFSET_PARAM.to_string(), Value::Int(offset));
    }
    let data = TemplateData::new()
        .flag("ByAuthor", author_id.is_some())
        .flag("HasOffset", offset > 0);
    LIST_TEMPLATE.render_statement(&data, params)
}

// ============================================================================
// Facade
// ============================================================================

/// Saved search operations over the entity store
#[derive(Debug, Clone)]
pub struct SavedSearches<D> {
    store: EntityStore<D>,
}

impl<D: Database> SavedSearches<D> {
    /// Facade over `store`
    pub fn new(store: EntityStore<D>) -> Self {
        Self { store }
    }

    /// Create a saved search with a fresh id
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty name.
    pub fn create(
        &self,
        ctx: &Context,
        author_id: &str,
        name: &str,
        query: &str,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SavedSearch> {
        validate_name(name)?;
        let search = SavedSearch {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            query: query.to_string(),
            description: description.map(str::to_string),
            author_id: author_id.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.store
            .read_inspect_mutate::<SavedSearchMapper, _>(ctx, &search.id, |existing| {
                if existing.is_some() {
                    return Err(Error::internal(format!("saved search id {} collided", search.id)));
                }
                Ok(vec![Mutation::insert(SAVED_SEARCHES_TABLE, &search)?])
            })?;
        debug!(target: "keystone::store", id = %search.id, author_id, "Saved search created");
        Ok(search)
    }

    /// Saved search by id
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no search has that id.
    pub fn get(&self, ctx: &Context, id: &str) -> Result<SavedSearch> {
        self.store.read_by_key::<SavedSearchMapper>(ctx, &id.to_string())
    }

    /// Apply a partial update and return the stored result
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the search is gone, `InvalidInput` for an empty name.
    pub fn update(&self, ctx: &Context, request: SavedSearchUpdateRequest) -> Result<SavedSearch> {
        let id = request.id.clone();
        self.store.update::<SavedSearchMapper>(ctx, request)?;
        self.get(ctx, &id)
    }

    /// Delete a saved search
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the search is already gone.
    pub fn delete(&self, ctx: &Context, id: &str) -> Result<()> {
        self.store
            .remove_existing::<SavedSearchMapper>(ctx, &id.to_string())
    }

    /// One page of saved searches ordered by name, optionally for one author
    ///
    /// # Errors
    ///
    /// Returns `CorruptCursor` for an invalid page token.
    pub fn list(
        &self,
        ctx: &Context,
        author_id: Option<&str>,
        request: &PageRequest,
    ) -> Result<Page<SavedSearch>> {
        self.store
            .list_page_with::<SavedSearchMapper, _>(ctx, request, |page_size, offset| {
                list_statement(author_id, page_size, offset)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use keystone_core::ErrorKind;

    fn search() -> SavedSearch {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        SavedSearch {
            id: "s-1".into(),
            name: "Baseline".into(),
            query: "baseline_status:widely".into(),
            description: Some("widely available".into()),
            author_id: "u-1".into(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_list_statement_first_page_has_no_offset() {
        let statement = list_statement(Some("u-1"), 10, 0).unwrap();
        assert!(statement.sql.contains("WHERE AuthorID = @authorID"));
        assert!(!statement.sql.contains("OFFSET"));
        assert_eq!(statement.param("pageSize"), Some(&Value::Int(10)));
    }

    #[test]
    fn test_list_statement_without_author_has_no_filter() {
        let statement = list_statement(None, 5, 15).unwrap();
        assert!(!statement.sql.contains("WHERE"));
        assert!(statement.sql.ends_with("OFFSET @pageOffset"));
        assert_eq!(statement.param("pageOffset"), Some(&Value::Int(15)));
    }

    #[test]
    fn test_apply_update_merges_fields() {
        let later = Utc.timestamp_opt(1_700_000_500, 0).unwrap();
        let request = SavedSearchUpdateRequest {
            name: Some("Renamed".into()),
            description: Some(None),
            ..SavedSearchUpdateRequest::new("s-1", later)
        };
        let updated = SavedSearchMapper::apply_update(request, search()).unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.query, "baseline_status:widely");
        assert_eq!(updated.description, None);
        assert_eq!(updated.updated_at, later);
        assert_eq!(updated.created_at, search().created_at);
    }

    #[test]
    fn test_apply_update_rejects_blank_name() {
        let request = SavedSearchUpdateRequest {
            name: Some("  ".into()),
            ..SavedSearchUpdateRequest::new("s-1", Utc::now())
        };
        let err = SavedSearchMapper::apply_update(request, search()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
