// Core search exports
pub mod composer;
pub mod geo;
pub mod normalize;
pub mod query;

pub use composer::{ComposeError, NearbyComposer, SearchMode, SearchOutcome};
pub use geo::Point;
pub use normalize::{join_images, split_images};
pub use query::{EntityKind, Page, Predicate, SearchDefaults, SearchPlan, SearchQuery, Searchable, SortOrder, MAX_LIMIT};
