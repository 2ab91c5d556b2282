//! Neural collaborative-filtering trainer.
//!
//! User and movie indices are embedded, concatenated and passed through a
//! small feed-forward network with dropout, regressed against the rating
//! rescaled to [0, 1] with mean-squared-error loss. Training is a fixed
//! small number of epochs of seeded mini-batch SGD.
//!
//! The whole module sits behind the `neural` cargo feature: it is the
//! numeric-ML backend the retrain pipeline probes for, and its absence must
//! never block the other trainers.

use crate::error::{Result, TrainError};
use event_store::{EventStore, MovieId, UserId};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// One fully-connected layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    /// (inputs x outputs).
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
}

impl DenseLayer {
    fn glorot(rng: &mut StdRng, inputs: usize, outputs: usize) -> Self {
        let scale = (6.0 / (inputs + outputs) as f32).sqrt();
        Self {
            weights: Array2::from_shape_fn((inputs, outputs), |_| rng.gen_range(-scale..scale)),
            bias: Array1::zeros(outputs),
        }
    }

    fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.weights) + &self.bias
    }
}

/// Trained neural snapshot: embedding tables, MLP weights and the id maps
/// frozen at training time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralModel {
    pub user_embedding: Array2<f32>,
    pub movie_embedding: Array2<f32>,
    /// Hidden layers followed by the scalar output layer.
    pub layers: Vec<DenseLayer>,
    pub embedding_dim: usize,
    pub user_ids: Vec<UserId>,
    pub movie_ids: Vec<MovieId>,
    pub user_index: HashMap<UserId, usize>,
    pub movie_index: HashMap<MovieId, usize>,
}

impl NeuralModel {
    /// Predicted rating on the 1..=5 scale; `None` when either id was unseen
    /// at training time.
    pub fn predict(&self, user_id: UserId, movie_id: MovieId) -> Option<f32> {
        let u = *self.user_index.get(&user_id)?;
        let m = *self.movie_index.get(&movie_id)?;

        let dim = self.embedding_dim;
        let mut x = Array2::<f32>::zeros((1, dim * 2));
        x.slice_mut(ndarray::s![0, ..dim])
            .assign(&self.user_embedding.row(u));
        x.slice_mut(ndarray::s![0, dim..])
            .assign(&self.movie_embedding.row(m));

        let mut h = x;
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            h = layer.forward(&h);
            if i < last {
                h.mapv_inplace(|v| v.max(0.0));
            }
        }
        let normalized = h[[0, 0]].clamp(0.0, 1.0);
        Some(1.0 + 4.0 * normalized)
    }
}

pub struct NeuralTrainer {
    embedding_dim: usize,
    hidden_layers: Vec<usize>,
    dropout: f32,
    epochs: usize,
    batch_size: usize,
    learning_rate: f32,
    seed: u64,
}

impl Default for NeuralTrainer {
    fn default() -> Self {
        Self {
            embedding_dim: 50,
            hidden_layers: vec![64, 32, 16],
            dropout: 0.2,
            epochs: 10,
            batch_size: 128,
            learning_rate: 1e-3,
            seed: 7,
        }
    }
}

impl NeuralTrainer {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs.max(1);
        self
    }

    #[must_use]
    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim.max(1);
        self
    }

    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    #[must_use]
    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout.clamp(0.0, 0.9);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Train the network on all current ratings.
    pub fn train(&self, store: &EventStore) -> Result<NeuralModel> {
        let user_ids = store.rating_users();
        if user_ids.is_empty() {
            return Err(TrainError::InsufficientData(
                "no ratings to train the neural model on".to_string(),
            ));
        }
        let movie_ids = store.movie_ids();
        let user_index: HashMap<UserId, usize> =
            user_ids.iter().enumerate().map(|(i, &u)| (u, i)).collect();
        let movie_index: HashMap<MovieId, usize> =
            movie_ids.iter().enumerate().map(|(i, &m)| (m, i)).collect();

        // (user row, movie row, normalized target).
        let mut samples: Vec<(usize, usize, f32)> = Vec::new();
        for &user_id in &user_ids {
            for rating in store.get_user_ratings(user_id) {
                if let Some(&m) = movie_index.get(&rating.movie_id) {
                    samples.push((user_index[&user_id], m, (rating.rating - 1.0) / 4.0));
                }
            }
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let dim = self.embedding_dim;
        let emb_scale = (1.0 / dim as f32).sqrt();
        let mut user_embedding =
            Array2::from_shape_fn((user_ids.len(), dim), |_| rng.gen_range(-emb_scale..emb_scale));
        let mut movie_embedding = Array2::from_shape_fn((movie_ids.len(), dim), |_| {
            rng.gen_range(-emb_scale..emb_scale)
        });

        let mut layers = Vec::new();
        let mut inputs = dim * 2;
        for &outputs in &self.hidden_layers {
            layers.push(DenseLayer::glorot(&mut rng, inputs, outputs));
            inputs = outputs;
        }
        layers.push(DenseLayer::glorot(&mut rng, inputs, 1));

        let mut order: Vec<usize> = (0..samples.len()).collect();
        for epoch in 0..self.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0f32;
            let mut batches = 0usize;

            for batch in order.chunks(self.batch_size) {
                epoch_loss += self.train_batch(
                    batch,
                    &samples,
                    &mut user_embedding,
                    &mut movie_embedding,
                    &mut layers,
                    &mut rng,
                );
                batches += 1;
            }
            debug!(epoch = epoch + 1, loss = epoch_loss / batches as f32, "neural epoch");
        }

        info!(
            users = user_ids.len(),
            movies = movie_ids.len(),
            samples = samples.len(),
            "neural model trained"
        );

        Ok(NeuralModel {
            user_embedding,
            movie_embedding,
            layers,
            embedding_dim: dim,
            user_ids,
            movie_ids,
            user_index,
            movie_index,
        })
    }

    /// One SGD step over a mini-batch; returns the batch MSE.
    #[allow(clippy::too_many_arguments)]
    fn train_batch(
        &self,
        batch: &[usize],
        samples: &[(usize, usize, f32)],
        user_embedding: &mut Array2<f32>,
        movie_embedding: &mut Array2<f32>,
        layers: &mut [DenseLayer],
        rng: &mut StdRng,
    ) -> f32 {
        let b = batch.len();
        let dim = self.embedding_dim;

        let mut x = Array2::<f32>::zeros((b, dim * 2));
        let mut target = Array1::<f32>::zeros(b);
        for (row, &si) in batch.iter().enumerate() {
            let (u, m, t) = samples[si];
            x.slice_mut(ndarray::s![row, ..dim])
                .assign(&user_embedding.row(u));
            x.slice_mut(ndarray::s![row, dim..])
                .assign(&movie_embedding.row(m));
            target[row] = t;
        }

        // Forward pass, keeping pre-activations, dropout masks and layer
        // inputs for the backward sweep.
        let last = layers.len() - 1;
        let mut inputs: Vec<Array2<f32>> = Vec::with_capacity(layers.len());
        let mut pre_activations: Vec<Array2<f32>> = Vec::with_capacity(last);
        let mut masks: Vec<Array2<f32>> = Vec::with_capacity(last);
        let keep_scale = 1.0 / (1.0 - self.dropout);

        let mut h = x;
        for (i, layer) in layers.iter().enumerate() {
            inputs.push(h.clone());
            let z = layer.forward(&h);
            if i < last {
                let activated = z.mapv(|v| v.max(0.0));
                let mask = Array2::from_shape_fn(activated.raw_dim(), |_| {
                    if rng.gen::<f32>() < self.dropout {
                        0.0
                    } else {
                        keep_scale
                    }
                });
                h = &activated * &mask;
                pre_activations.push(z);
                masks.push(mask);
            } else {
                h = z;
            }
        }

        let prediction = h.index_axis(Axis(1), 0).to_owned();
        let error = &prediction - &target;
        let loss = error.mapv(|e| e * e).mean().unwrap_or(0.0);

        // d(MSE)/d(out) = 2 * err / batch.
        let mut grad = error
            .mapv(|e| 2.0 * e / b as f32)
            .insert_axis(Axis(1));

        for i in (0..layers.len()).rev() {
            let grad_weights = inputs[i].t().dot(&grad);
            let grad_bias = grad.sum_axis(Axis(0));
            let grad_input = grad.dot(&layers[i].weights.t());

            layers[i]
                .weights
                .scaled_add(-self.learning_rate, &grad_weights);
            layers[i].bias.scaled_add(-self.learning_rate, &grad_bias);

            if i > 0 {
                let relu_grad = pre_activations[i - 1].mapv(|z| if z > 0.0 { 1.0 } else { 0.0 });
                grad = &(&grad_input * &masks[i - 1]) * &relu_grad;
            } else {
                grad = grad_input;
            }
        }

        // Scatter the input gradient back into the embedding rows.
        for (row, &si) in batch.iter().enumerate() {
            let (u, m, _) = samples[si];
            let grad_user = grad.slice(ndarray::s![row, ..dim]).to_owned();
            let grad_movie = grad.slice(ndarray::s![row, dim..]).to_owned();
            user_embedding
                .row_mut(u)
                .scaled_add(-self.learning_rate, &grad_user);
            movie_embedding
                .row_mut(m)
                .scaled_add(-self.learning_rate, &grad_movie);
        }

        loss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_store::Movie;

    fn create_test_store() -> EventStore {
        let mut store = EventStore::new();
        for id in 1..=6 {
            store.insert_movie(Movie::new(id, format!("Movie {id}"), vec!["Drama".into()]));
        }
        // Two taste clusters: users 1-2 love movies 1-3, users 3-4 love 4-6.
        for user in 1..=2u32 {
            for movie in 1..=3u32 {
                store.submit_rating(user, movie, 5.0, None).unwrap();
            }
            for movie in 4..=6u32 {
                store.submit_rating(user, movie, 1.0, None).unwrap();
            }
        }
        for user in 3..=4u32 {
            for movie in 1..=3u32 {
                store.submit_rating(user, movie, 1.0, None).unwrap();
            }
            for movie in 4..=6u32 {
                store.submit_rating(user, movie, 5.0, None).unwrap();
            }
        }
        store
    }

    #[test]
    fn test_training_learns_the_taste_split() {
        let store = create_test_store();
        let model = NeuralTrainer::new()
            .with_embedding_dim(8)
            .with_epochs(400)
            .with_learning_rate(0.05)
            .with_dropout(0.0)
            .train(&store)
            .unwrap();

        let liked = model.predict(1, 2).unwrap();
        let disliked = model.predict(1, 5).unwrap();
        assert!(
            liked > disliked,
            "expected liked ({liked}) > disliked ({disliked})"
        );
    }

    #[test]
    fn test_predictions_stay_in_rating_range() {
        let store = create_test_store();
        let model = NeuralTrainer::new()
            .with_embedding_dim(4)
            .with_epochs(3)
            .train(&store)
            .unwrap();
        for user in 1..=4u32 {
            for movie in 1..=6u32 {
                let p = model.predict(user, movie).unwrap();
                assert!((1.0..=5.0).contains(&p));
            }
        }
    }

    #[test]
    fn test_unseen_ids_predict_none() {
        let store = create_test_store();
        let model = NeuralTrainer::new().with_epochs(1).train(&store).unwrap();
        assert!(model.predict(99, 1).is_none());
        assert!(model.predict(1, 99).is_none());
    }

    #[test]
    fn test_empty_store_is_insufficient_data() {
        let store = EventStore::new();
        assert!(matches!(
            NeuralTrainer::new().train(&store),
            Err(TrainError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_training_is_deterministic_for_a_seed() {
        let store = create_test_store();
        let a = NeuralTrainer::new().with_epochs(2).train(&store).unwrap();
        let b = NeuralTrainer::new().with_epochs(2).train(&store).unwrap();
        assert_eq!(a.user_embedding, b.user_embedding);
        assert_eq!(a.layers[0].weights, b.layers[0].weights);
    }
}
