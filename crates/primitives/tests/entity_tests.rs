//! Entity mappers and saved searches over the in-memory backend

use chrono::{Duration, TimeZone, Utc};
use keystone_core::{Context, ErrorKind, PageRequest};
use keystone_engine::EntityStore;
use keystone_primitives::histogram::enum_values_statement;
use keystone_primitives::{
    install_schemas, FeatureGroup, FeatureGroupMapper, HistogramEnumValue,
    HistogramEnumValueMapper, SavedSearchUpdateRequest, SavedSearches, WebFeature,
    WebFeatureMapper,
};
use keystone_storage::MemoryDatabase;
use std::collections::BTreeSet;
use std::sync::Arc;

fn store() -> EntityStore<Arc<MemoryDatabase>> {
    let db = MemoryDatabase::new();
    install_schemas(&db).unwrap();
    EntityStore::new(Arc::new(db))
}

// ============================================================================
// Features and groups
// ============================================================================

#[test]
fn test_feature_id_is_stable_across_upserts() {
    let store = store();
    let ctx = Context::background();

    let first = store
        .upsert_and_retrieve_id::<WebFeatureMapper>(&ctx, WebFeature::new("grid", "Grid"))
        .unwrap();
    let second = store
        .upsert_and_retrieve_id::<WebFeatureMapper>(&ctx, WebFeature::new("grid", "CSS Grid"))
        .unwrap();

    assert_eq!(first, second);
    let stored = store
        .read_by_key::<WebFeatureMapper>(&ctx, &"grid".to_string())
        .unwrap();
    assert_eq!(stored.name, "CSS Grid");
    assert_eq!(stored.id.as_deref(), Some(first.as_str()));
}

#[test]
fn test_distinct_features_get_distinct_ids() {
    let store = store();
    let ctx = Context::background();

    let ids: BTreeSet<String> = ["grid", "subgrid", "has"]
        .iter()
        .map(|key| {
            store
                .upsert_and_retrieve_id::<WebFeatureMapper>(&ctx, WebFeature::new(*key, *key))
                .unwrap()
        })
        .collect();
    assert_eq!(ids.len(), 3);
}

#[test]
fn test_group_remove_contracts() {
    let store = store();
    let ctx = Context::background();
    let key = "css".to_string();

    store
        .upsert::<FeatureGroupMapper>(&ctx, FeatureGroup::new("css", "CSS"))
        .unwrap();
    store.remove_existing::<FeatureGroupMapper>(&ctx, &key).unwrap();

    let err = store
        .remove_existing::<FeatureGroupMapper>(&ctx, &key)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    store.remove::<FeatureGroupMapper>(&ctx, &key).unwrap();
}

#[test]
fn test_histogram_first_label_wins() {
    let store = store();
    let ctx = Context::background();
    let bucket = |bucket_id, label: &str| HistogramEnumValue {
        enum_id: "AnchorPositioning".into(),
        bucket_id,
        label: label.into(),
    };

    store
        .upsert::<HistogramEnumValueMapper>(&ctx, bucket(2, "Original"))
        .unwrap();
    store
        .upsert::<HistogramEnumValueMapper>(&ctx, bucket(2, "Renamed"))
        .unwrap();
    store
        .upsert::<HistogramEnumValueMapper>(&ctx, bucket(1, "First"))
        .unwrap();

    let values = store
        .read_all::<HistogramEnumValueMapper>(&ctx, &enum_values_statement("AnchorPositioning"))
        .unwrap();
    assert_eq!(values, vec![bucket(1, "First"), bucket(2, "Original")]);
}

// ============================================================================
// Saved searches
// ============================================================================

#[test]
fn test_saved_search_lifecycle() {
    let searches = SavedSearches::new(store());
    let ctx = Context::background();
    let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    let created = searches
        .create(&ctx, "u-1", "Baseline", "baseline_status:widely", None, created_at)
        .unwrap();
    assert_eq!(searches.get(&ctx, &created.id).unwrap(), created);

    let later = created_at + Duration::hours(1);
    let updated = searches
        .update(
            &ctx,
            SavedSearchUpdateRequest {
                query: Some("baseline_status:newly".into()),
                description: Some(Some("recent".into())),
                ..SavedSearchUpdateRequest::new(created.id.clone(), later)
            },
        )
        .unwrap();
    assert_eq!(updated.name, "Baseline");
    assert_eq!(updated.query, "baseline_status:newly");
    assert_eq!(updated.description.as_deref(), Some("recent"));
    assert_eq!(updated.created_at, created_at);
    assert_eq!(updated.updated_at, later);

    searches.delete(&ctx, &created.id).unwrap();
    assert!(searches.get(&ctx, &created.id).unwrap_err().is_not_found());
    assert!(searches.delete(&ctx, &created.id).unwrap_err().is_not_found());
}

#[test]
fn test_saved_search_update_never_creates() {
    let searches = SavedSearches::new(store());
    let ctx = Context::background();

    let err = searches
        .update(&ctx, SavedSearchUpdateRequest::new("missing", Utc::now()))
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_saved_search_rejects_blank_name() {
    let searches = SavedSearches::new(store());
    let ctx = Context::background();

    let err = searches
        .create(&ctx, "u-1", " ", "q", None, Utc::now())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let created = searches
        .create(&ctx, "u-1", "Name", "q", None, Utc::now())
        .unwrap();
    let err = searches
        .update(
            &ctx,
            SavedSearchUpdateRequest {
                name: Some(String::new()),
                ..SavedSearchUpdateRequest::new(created.id.clone(), Utc::now())
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(searches.get(&ctx, &created.id).unwrap().name, "Name");
}

#[test]
fn test_saved_search_listing_pages_by_author() {
    let searches = SavedSearches::new(store());
    let ctx = Context::background();
    let now = Utc::now();

    for i in 0..5 {
        searches
            .create(&ctx, "u-1", &format!("search {}", i), "q", None, now)
            .unwrap();
    }
    searches
        .create(&ctx, "u-2", "someone else", "q", None, now)
        .unwrap();

    let mut names = Vec::new();
    let mut request = PageRequest::new(2);
    let mut pages = 0;
    loop {
        let page = searches.list(&ctx, Some("u-1"), &request).unwrap();
        pages += 1;
        names.extend(page.items.into_iter().map(|s| s.name));
        match page.next_page_token {
            Some(token) => request = PageRequest::new(2).with_token(token),
            None => break,
        }
    }

    assert_eq!(pages, 3);
    assert_eq!(
        names,
        vec!["search 0", "search 1", "search 2", "search 3", "search 4"]
    );

    let everyone = searches
        .list(&ctx, None, &PageRequest::new(100))
        .unwrap();
    assert_eq!(everyone.items.len(), 6);
    assert!(everyone.next_page_token.is_none());
}

#[test]
fn test_saved_search_listing_rejects_corrupt_token() {
    let searches = SavedSearches::new(store());
    let err = searches
        .list(
            &Context::background(),
            None,
            &PageRequest::new(10).with_token("not-a-cursor"),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptCursor);
}
