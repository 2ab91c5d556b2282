//! # Event Store Crate
//!
//! The authoritative event layer of the recommendation core plus the feature
//! store that materializes training matrices from it.
//!
//! ## Main Components
//!
//! - **types**: domain types (Movie, RatingEvent, InteractionEvent, UserProfile, Algorithm)
//! - **store**: `EventStore`, the indexed in-memory record of all events
//! - **features**: user-item / implicit matrices and text-feature extraction
//! - **loader**: MovieLens-100k dataset ingestion
//! - **error**: error types for storage and feature materialization
//!
//! ## Example Usage
//!
//! ```
//! use event_store::{EventStore, Movie, build_user_item_matrix};
//!
//! let mut store = EventStore::new();
//! store.insert_movie(Movie::new(1, "Toy Story (1995)", vec!["Animation".into()]));
//! store.submit_rating(42, 1, 5.0, None).unwrap();
//!
//! let matrix = build_user_item_matrix(&store).unwrap();
//! assert_eq!(matrix.matrix.dim(), (1, 1));
//! ```

pub mod error;
pub mod features;
pub mod loader;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use features::{
    build_implicit_matrix, build_user_item_matrix, extract_text_features, UserItemMatrix,
    EMPTY_TEXT_SENTINEL,
};
pub use loader::load_movielens;
pub use store::{EventStore, RatingUpsert};
pub use types::{
    now_ts, Algorithm, InteractionEvent, InteractionKind, Movie, MovieId, RatingEvent, UserId,
    UserProfile,
};
