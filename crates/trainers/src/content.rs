//! Content-based trainer: TF-IDF over movie text plus the full pairwise
//! cosine-similarity matrix.

use crate::artifacts::ContentModel;
use crate::error::{Result, TrainError};
use crate::tfidf::TfidfVectorizer;
use event_store::{extract_text_features, EventStore};
use std::collections::HashMap;
use tracing::info;

/// Vocabulary cap for the vectorizer.
pub const MAX_VOCABULARY: usize = 1000;

pub struct ContentTrainer;

impl ContentTrainer {
    /// Fit TF-IDF over every movie's combined text and precompute the full
    /// similarity matrix.
    pub fn train(store: &EventStore) -> Result<ContentModel> {
        let movie_ids = store.movie_ids();
        if movie_ids.is_empty() {
            return Err(TrainError::InsufficientData(
                "catalog is empty; nothing to vectorize".to_string(),
            ));
        }

        let documents: Vec<String> = movie_ids
            .iter()
            .map(|&id| {
                store
                    .get_movie(id)
                    .map(extract_text_features)
                    .unwrap_or_default()
            })
            .collect();

        // The sentinel in extract_text_features makes an all-blank corpus
        // unreachable; this check is the invariant's last line of defense.
        if documents.iter().all(|d| d.trim().is_empty()) {
            return Err(TrainError::EmptyVocabulary);
        }

        let mut vectorizer = TfidfVectorizer::new()
            .with_stop_words_english()
            .with_ngram_range(1, 2)
            .with_max_features(MAX_VOCABULARY)
            .with_min_df(1);
        let tfidf = vectorizer.fit_transform(&documents)?;

        // Rows are l2-normalized, so the Gram matrix is cosine similarity.
        let similarity = tfidf.dot(&tfidf.t());

        let movie_index: HashMap<_, _> = movie_ids
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();

        info!(
            movies = movie_ids.len(),
            vocabulary = vectorizer.vocabulary_len(),
            "content model trained"
        );

        Ok(ContentModel {
            vectorizer,
            tfidf,
            similarity,
            movie_ids,
            movie_index,
        })
    }
}
