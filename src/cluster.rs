use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::cluster::{CONVERGENCE_THRESHOLD, DEFAULT_CLUSTERS, DEFAULT_MAX_ITER};
use crate::errors::CurationError;
use crate::index::squared_euclidean;

/// Size of the training subsample used to fit cluster centroids.
///
/// Serialized untagged: a JSON integer is a count, a JSON float a fraction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrainSize {
    /// Fixed number of ids; must not exceed the pool size.
    Count(usize),
    /// Fraction of the pool in `(0, 1]`.
    Fraction(f64),
}

impl Default for TrainSize {
    fn default() -> Self {
        TrainSize::Fraction(1.0)
    }
}

impl TrainSize {
    /// Resolve to a concrete sample count for a pool of `pool_len` ids.
    pub fn resolve(self, pool_len: usize) -> Result<usize, CurationError> {
        match self {
            TrainSize::Count(count) => {
                if count > pool_len {
                    return Err(CurationError::Configuration(format!(
                        "train_size has to be at most the pool size {pool_len}, got {count}"
                    )));
                }
                Ok(count)
            }
            TrainSize::Fraction(fraction) => {
                if !(fraction > 0.0 && fraction <= 1.0) {
                    return Err(CurationError::Configuration(format!(
                        "train_size fraction has to be in (0, 1], got {fraction}"
                    )));
                }
                Ok((fraction * pool_len as f64).floor() as usize)
            }
        }
    }
}

/// K-means fitting parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KMeansConfig {
    /// Number of centroids.
    pub n_clusters: usize,
    /// Lloyd iteration cap.
    pub max_iter: usize,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            n_clusters: DEFAULT_CLUSTERS,
            max_iter: DEFAULT_MAX_ITER,
        }
    }
}

/// Fitted centroids; assigns any vector to its nearest centroid.
#[derive(Clone, Debug)]
pub struct KMeans {
    centroids: Vec<Vec<f32>>,
    iterations: usize,
    converged: bool,
}

impl KMeans {
    /// Fit `config.n_clusters` centroids to `data` using k-means++ seeding.
    pub fn fit<R: Rng + ?Sized>(
        data: &[Vec<f32>],
        config: KMeansConfig,
        rng: &mut R,
    ) -> Result<Self, CurationError> {
        if config.n_clusters == 0 {
            return Err(CurationError::Configuration(
                "n_clusters must be > 0".to_string(),
            ));
        }
        if config.max_iter == 0 {
            return Err(CurationError::Configuration(
                "max_iter must be > 0".to_string(),
            ));
        }
        if config.n_clusters > data.len() {
            return Err(CurationError::Configuration(format!(
                "n_clusters ({}) must be <= training sample size ({})",
                config.n_clusters,
                data.len()
            )));
        }
        let dim = data[0].len();
        if dim == 0 || data.iter().any(|row| row.len() != dim) {
            return Err(CurationError::Configuration(
                "training embeddings must be non-empty and share one dimension".to_string(),
            ));
        }

        let mut centroids = kmeans_plus_plus_init(data, config.n_clusters, rng);
        let mut assignments = vec![0usize; data.len()];
        let mut iterations = 0;
        let mut converged = false;

        for iter in 0..config.max_iter {
            iterations = iter + 1;
            for (slot, row) in assignments.iter_mut().zip(data.iter()) {
                *slot = nearest_centroid(&centroids, row);
            }
            let next = recompute_centroids(data, &assignments, &centroids);
            let max_movement = centroids
                .iter()
                .zip(next.iter())
                .map(|(old, new)| squared_euclidean(old, new).sqrt())
                .fold(0.0f32, f32::max);
            centroids = next;
            if max_movement < CONVERGENCE_THRESHOLD {
                converged = true;
                break;
            }
        }

        Ok(Self {
            centroids,
            iterations,
            converged,
        })
    }

    /// Index of the centroid nearest to `vector`.
    pub fn predict(&self, vector: &[f32]) -> usize {
        nearest_centroid(&self.centroids, vector)
    }

    /// Fitted centroids.
    pub fn centroids(&self) -> &[Vec<f32>] {
        &self.centroids
    }

    /// Number of Lloyd iterations run.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Whether centroid movement fell below the convergence threshold.
    pub fn converged(&self) -> bool {
        self.converged
    }
}

fn nearest_centroid(centroids: &[Vec<f32>], vector: &[f32]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::MAX;
    for (idx, centroid) in centroids.iter().enumerate() {
        let dist = squared_euclidean(vector, centroid);
        if dist < best_dist {
            best_dist = dist;
            best = idx;
        }
    }
    best
}

fn kmeans_plus_plus_init<R: Rng + ?Sized>(
    data: &[Vec<f32>],
    k: usize,
    rng: &mut R,
) -> Vec<Vec<f32>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.random_range(0..data.len())].clone());

    while centroids.len() < k {
        let weights: Vec<f32> = data
            .iter()
            .map(|row| {
                centroids
                    .iter()
                    .map(|centroid| squared_euclidean(row, centroid))
                    .fold(f32::MAX, f32::min)
            })
            .collect();
        let total: f32 = weights.iter().sum();
        if total <= f32::EPSILON {
            // Every point coincides with a centroid; fall back to a uniform pick.
            centroids.push(data[rng.random_range(0..data.len())].clone());
            continue;
        }
        let mut target = rng.random::<f32>() * total;
        let mut chosen = data.len() - 1;
        for (idx, weight) in weights.iter().enumerate() {
            if target < *weight {
                chosen = idx;
                break;
            }
            target -= weight;
        }
        centroids.push(data[chosen].clone());
    }
    centroids
}

fn recompute_centroids(
    data: &[Vec<f32>],
    assignments: &[usize],
    previous: &[Vec<f32>],
) -> Vec<Vec<f32>> {
    let dim = previous[0].len();
    let mut sums = vec![vec![0.0f32; dim]; previous.len()];
    let mut counts = vec![0usize; previous.len()];
    for (row, &cluster) in data.iter().zip(assignments.iter()) {
        counts[cluster] += 1;
        for (acc, value) in sums[cluster].iter_mut().zip(row.iter()) {
            *acc += value;
        }
    }
    sums.into_iter()
        .zip(counts)
        .zip(previous.iter())
        .map(|((sum, count), old)| {
            if count == 0 {
                // Empty clusters keep their previous centroid.
                old.clone()
            } else {
                sum.into_iter().map(|value| value / count as f32).collect()
            }
        })
        .collect()
}
