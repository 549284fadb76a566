//! Primitives layer for Keystone
//!
//! Built on the generic [`EntityStore`](keystone_engine::EntityStore):
//! - **LeaseCoordinator**: TTL-bounded exclusive locks with a sideband payload
//! - **HierarchyDenormalizer**: ancestor closure of the group tree, written by
//!   a pool of batch writers behind a bounded channel
//! - **Entity mappers**: web features, browser availabilities, feature groups, descendant edges,
//!   saved searches and histogram enum values
//! - **Feature search**: compiled query templates with a per-call number of
//!   sub-conditions
//!
//! ## Design Principle: Stateless Facades
//!
//! Every primitive holds only a store handle and its settings. All
//! coordination goes through the store's transactions, never through
//! in-process locks, so several processes can share one database.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod feature_search;
pub mod features;
pub mod groups;
pub mod hierarchy;
pub mod histogram;
pub mod lease;
pub mod saved_search;
pub mod tables;

pub use feature_search::{MissingOneImplementationQuery, OTHER_BROWSER_PREFIX};
pub use features::{
    BrowserFeatureAvailability, BrowserFeatureAvailabilityMapper, WebFeature, WebFeatureMapper,
};
pub use groups::{
    FeatureGroup, FeatureGroupMapper, GroupDescendant, GroupDescendantMapper, WebFeatureGroup,
    WebFeatureGroupMapper,
};
pub use hierarchy::{DenormalizeReport, HierarchyDenormalizer, HierarchyInput};
pub use histogram::{HistogramEnumValue, HistogramEnumValueMapper};
pub use lease::{
    Clock, LeaseCoordinator, LeaseMapper, LeaseRecord, ManualClock, SystemClock, DEFAULT_LEASE_TTL,
};
pub use saved_search::{SavedSearch, SavedSearchMapper, SavedSearchUpdateRequest, SavedSearches};
pub use tables::{install_schemas, schemas};
