//! Feature groups, memberships and denormalized descendant edges
//!
//! Groups form a tree through `ParentKey`. A web feature belongs directly to
//! zero or more groups ([`WebFeatureGroup`]); [`GroupDescendant`] rows are the
//! materialized closure produced by [`crate::hierarchy`].

use crate::tables::{FEATURE_GROUPS_TABLE, GROUP_DESCENDANTS_TABLE, WEB_FEATURE_GROUPS_TABLE};
use keystone_core::{KeyTuple, Result, Row, Statement};
use keystone_engine::{IdRetrievable, Keyed, Mergeable, Removable};
use serde::{Deserialize, Serialize};

// ============================================================================
// Groups
// ============================================================================

/// One node of the group tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeatureGroup {
    /// Store-generated id; `None` before the first insert
    #[serde(rename = "ID")]
    pub id: Option<String>,
    /// Stable external key
    pub group_key: String,
    /// Display name
    pub name: String,
    /// Key of the parent group; `None` for a root
    pub parent_key: Option<String>,
}

impl FeatureGroup {
    /// Root group not yet persisted
    pub fn new(group_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            group_key: group_key.into(),
            name: name.into(),
            parent_key: None,
        }
    }

    /// Set the parent group key
    pub fn with_parent(mut self, parent_key: impl Into<String>) -> Self {
        self.parent_key = Some(parent_key.into());
        self
    }
}

/// Mapper for [`FeatureGroup`]
pub struct FeatureGroupMapper;

impl Keyed for FeatureGroupMapper {
    type Entity = FeatureGroup;
    type Key = String;
    const TABLE: &'static str = FEATURE_GROUPS_TABLE;

    fn key_of(entity: &FeatureGroup) -> String {
        entity.group_key.clone()
    }

    fn select_by_key(key: &String) -> Statement {
        Statement::new("SELECT * FROM FeatureGroups WHERE GroupKey = @groupKey")
            .bind("groupKey", key.as_str())
    }
}

impl Mergeable for FeatureGroupMapper {
    fn merge(incoming: FeatureGroup, existing: FeatureGroup) -> FeatureGroup {
        FeatureGroup {
            id: existing.id,
            ..incoming
        }
    }
}

impl IdRetrievable for FeatureGroupMapper {
    type Id = String;

    fn id_from_row(row: &Row) -> Result<String> {
        row.get_string("ID")
    }
}

impl Removable for FeatureGroupMapper {
    fn delete_key_of(key: &String) -> KeyTuple {
        KeyTuple::single(key.as_str())
    }
}

/// Every group, ordered by key
pub fn all_groups_statement() -> Statement {
    Statement::new("SELECT * FROM FeatureGroups ORDER BY GroupKey")
}

// ============================================================================
// Memberships
// ============================================================================

/// Direct group memberships of one web feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WebFeatureGroup {
    /// Feature id
    #[serde(rename = "WebFeatureID")]
    pub web_feature_id: String,
    /// Keys of the groups the feature is directly in
    pub group_keys: Vec<String>,
}

/// Mapper for [`WebFeatureGroup`]
pub struct WebFeatureGroupMapper;

impl Keyed for WebFeatureGroupMapper {
    type Entity = WebFeatureGroup;
    type Key = String;
    const TABLE: &'static str = WEB_FEATURE_GROUPS_TABLE;

    fn key_of(entity: &WebFeatureGroup) -> String {
        entity.web_feature_id.clone()
    }

    fn select_by_key(key: &String) -> Statement {
        Statement::new("SELECT * FROM WebFeatureGroups WHERE WebFeatureID = @webFeatureID")
            .bind("webFeatureID", key.as_str())
    }
}

impl Mergeable for WebFeatureGroupMapper {
    fn merge(incoming: WebFeatureGroup, _existing: WebFeatureGroup) -> WebFeatureGroup {
        incoming
    }
}

/// Every membership row, ordered by feature id
pub fn all_memberships_statement() -> Statement {
    Statement::new("SELECT * FROM WebFeatureGroups ORDER BY WebFeatureID")
}

// ============================================================================
// Descendant edges
// ============================================================================

/// One materialized hierarchy edge
///
/// `depth` counts parent hops from the feature's direct group to
/// `feature_group_id`; 0 is the direct group itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GroupDescendant {
    /// Ancestor group id
    #[serde(rename = "FeatureGroupID")]
    pub feature_group_id: String,
    /// Descendant feature id
    #[serde(rename = "WebFeatureID")]
    pub web_feature_id: String,
    /// Parent hops from the direct group
    pub depth: i64,
}

/// Mapper for [`GroupDescendant`]
pub struct GroupDescendantMapper;

impl Keyed for GroupDescendantMapper {
    type Entity = GroupDescendant;
    type Key = (String, String);
    const TABLE: &'static str = GROUP_DESCENDANTS_TABLE;

    fn key_of(entity: &GroupDescendant) -> (String, String) {
        (entity.feature_group_id.clone(), entity.web_feature_id.clone())
    }

    fn select_by_key(key: &(String, String)) -> Statement {
        Statement::new(
            "SELECT * FROM FeatureGroupDescendants \
             WHERE FeatureGroupID = @featureGroupID AND WebFeatureID = @webFeatureID",
        )
        .bind("featureGroupID", key.0.as_str())
        .bind("webFeatureID", key.1.as_str())
    }
}

impl Mergeable for GroupDescendantMapper {
    fn merge(incoming: GroupDescendant, _existing: GroupDescendant) -> GroupDescendant {
        incoming
    }
}

/// Edges pointing at one feature, nearest ancestor first
pub fn descendants_of_feature_statement(web_feature_id: &str) -> Statement {
    Statement::new(
        "SELECT * FROM FeatureGroupDescendants WHERE WebFeatureID = @webFeatureID \
         ORDER BY Depth, FeatureGroupID",
    )
    .bind("webFeatureID", web_feature_id)
}
