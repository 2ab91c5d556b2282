//! TF-IDF vectorization for the content model.
//!
//! Bounded vocabulary (term-frequency cap), 1..=2-word spans, rare terms
//! kept, smooth idf, l2-normalized rows so the row dot product is cosine
//! similarity directly. The fitted state serializes into the content
//! snapshot alongside the matrices.

use crate::error::{Result, TrainError};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Common English words excluded from the vocabulary.
const ENGLISH_STOP_WORDS: [&str; 40] = [
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "had", "has", "have",
    "he", "her", "his", "in", "is", "it", "its", "nor", "not", "of", "on", "or", "she", "that",
    "the", "their", "them", "then", "there", "they", "this", "to", "was", "were", "will", "with",
];

/// Builder-configured TF-IDF vectorizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    lowercase: bool,
    ngram_range: (usize, usize),
    max_features: Option<usize>,
    min_df: usize,
    use_stop_words: bool,
    /// term -> column, populated by `fit_transform`.
    vocabulary: HashMap<String, usize>,
    /// Per-column smooth idf, aligned with `vocabulary`.
    idf: Vec<f32>,
}

impl TfidfVectorizer {
    pub fn new() -> Self {
        Self {
            lowercase: true,
            ngram_range: (1, 1),
            max_features: None,
            min_df: 1,
            use_stop_words: false,
            vocabulary: HashMap::new(),
            idf: Vec::new(),
        }
    }

    /// Extract word spans of `min_n..=max_n` tokens.
    #[must_use]
    pub fn with_ngram_range(mut self, min_n: usize, max_n: usize) -> Self {
        self.ngram_range = (min_n.max(1), max_n.max(min_n.max(1)));
        self
    }

    /// Cap the vocabulary to the `n` most frequent terms across the corpus.
    #[must_use]
    pub fn with_max_features(mut self, n: usize) -> Self {
        self.max_features = Some(n);
        self
    }

    /// Drop terms appearing in fewer than `min_df` documents.
    #[must_use]
    pub fn with_min_df(mut self, min_df: usize) -> Self {
        self.min_df = min_df.max(1);
        self
    }

    /// Filter common English words before building spans.
    #[must_use]
    pub fn with_stop_words_english(mut self) -> Self {
        self.use_stop_words = true;
        self
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// Tokenize one document into the configured word spans.
    fn analyze(&self, text: &str) -> Vec<String> {
        let lowered;
        let text = if self.lowercase {
            lowered = text.to_lowercase();
            &lowered
        } else {
            text
        };

        let words: Vec<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() >= 2)
            .filter(|w| !self.use_stop_words || !ENGLISH_STOP_WORDS.contains(w))
            .collect();

        let (min_n, max_n) = self.ngram_range;
        let mut terms = Vec::new();
        for n in min_n..=max_n {
            if n > words.len() {
                break;
            }
            for window in words.windows(n) {
                terms.push(window.join(" "));
            }
        }
        terms
    }

    /// Fit the vocabulary and idf on `docs` and return the (docs x terms)
    /// TF-IDF matrix with l2-normalized rows.
    ///
    /// Fails with `EmptyVocabulary` only when no document contributes a
    /// single term, the degenerate all-blank corpus.
    pub fn fit_transform(&mut self, docs: &[String]) -> Result<Array2<f32>> {
        let analyzed: Vec<Vec<String>> = docs.iter().map(|d| self.analyze(d)).collect();

        // Document frequency and corpus frequency per term.
        let mut document_frequency: HashMap<&str, usize> = HashMap::new();
        let mut corpus_frequency: HashMap<&str, usize> = HashMap::new();
        for terms in &analyzed {
            let unique: HashSet<&str> = terms.iter().map(String::as_str).collect();
            for term in unique {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
            for term in terms {
                *corpus_frequency.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let mut kept: Vec<(&str, usize)> = corpus_frequency
            .iter()
            .filter(|(term, _)| document_frequency[*term] >= self.min_df)
            .map(|(term, count)| (*term, *count))
            .collect();
        // Most frequent first; ties resolved lexically so fitting is
        // deterministic.
        kept.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(cap) = self.max_features {
            kept.truncate(cap);
        }
        if kept.is_empty() {
            return Err(TrainError::EmptyVocabulary);
        }

        let mut terms: Vec<&str> = kept.into_iter().map(|(t, _)| t).collect();
        terms.sort_unstable();
        self.vocabulary = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i))
            .collect();

        let n_docs = docs.len() as f32;
        let mut idf = vec![0.0f32; self.vocabulary.len()];
        for (term, &col) in &self.vocabulary {
            let df = document_frequency[term.as_str()] as f32;
            idf[col] = ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0;
        }
        self.idf = idf;

        Ok(self.matrix_from(&analyzed))
    }

    /// Vectorize documents against the already-fitted vocabulary.
    pub fn transform(&self, docs: &[String]) -> Array2<f32> {
        let analyzed: Vec<Vec<String>> = docs.iter().map(|d| self.analyze(d)).collect();
        self.matrix_from(&analyzed)
    }

    fn matrix_from(&self, analyzed: &[Vec<String>]) -> Array2<f32> {
        let mut matrix = Array2::<f32>::zeros((analyzed.len(), self.vocabulary.len()));
        for (row, terms) in analyzed.iter().enumerate() {
            for term in terms {
                if let Some(&col) = self.vocabulary.get(term.as_str()) {
                    matrix[[row, col]] += 1.0;
                }
            }
            for (col, idf) in self.idf.iter().enumerate() {
                matrix[[row, col]] *= idf;
            }
            let norm = matrix.row(row).dot(&matrix.row(row)).sqrt();
            if norm > 0.0 {
                matrix.row_mut(row).mapv_inplace(|v| v / norm);
            }
        }
        matrix
    }
}

impl Default for TfidfVectorizer {
    fn default() -> Self {
        Self::new()
    }
}
