//! k-nearest-neighbour regression.

use serde::{Deserialize, Serialize};

use crate::error::MapperError;

/// How neighbours are weighted in a prediction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Every neighbour counts equally.
    Uniform,
    /// Neighbours count by inverse Euclidean distance. An exact match takes
    /// all the weight.
    #[default]
    Distance,
}

/// Multi-output KNN regressor over dense feature vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KNeighborsRegressor {
    n_neighbors: usize,
    weighting: Weighting,
    features: Vec<Vec<f64>>,
    targets: Vec<Vec<f64>>,
}

impl KNeighborsRegressor {
    /// An untrained regressor.
    #[must_use]
    pub const fn new(n_neighbors: usize, weighting: Weighting) -> Self {
        Self {
            n_neighbors,
            weighting,
            features: Vec::new(),
            targets: Vec::new(),
        }
    }

    /// Neighbours averaged per query.
    #[must_use]
    pub const fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    /// How neighbours are weighted.
    #[must_use]
    pub const fn weighting(&self) -> Weighting {
        self.weighting
    }

    /// Number of training samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// True before training.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Stores the training set.
    ///
    /// # Errors
    ///
    /// Returns `MapperError::EmptyTrainingSet` for no samples and
    /// `MapperError::DimensionMismatch` for ragged features or targets.
    pub fn fit(&mut self, features: Vec<Vec<f64>>, targets: Vec<Vec<f64>>) -> Result<(), MapperError> {
        if features.is_empty() {
            return Err(MapperError::EmptyTrainingSet);
        }
        if features.len() != targets.len() {
            return Err(MapperError::DimensionMismatch {
                expected: features.len(),
                actual: targets.len(),
            });
        }
        let width = features[0].len();
        let outputs = targets[0].len();
        for (x, y) in features.iter().zip(&targets) {
            if x.len() != width {
                return Err(MapperError::DimensionMismatch {
                    expected: width,
                    actual: x.len(),
                });
            }
            if y.len() != outputs {
                return Err(MapperError::DimensionMismatch {
                    expected: outputs,
                    actual: y.len(),
                });
            }
        }
        self.features = features;
        self.targets = targets;
        Ok(())
    }

    /// Predicts the targets for `query`.
    ///
    /// Uses `min(n_neighbors, samples)` neighbours; ties in distance keep
    /// training order.
    ///
    /// # Errors
    ///
    /// Returns `MapperError::NotFitted` before `fit`, and
    /// `MapperError::DimensionMismatch` for a query of the wrong width.
    pub fn predict(&self, query: &[f64]) -> Result<Vec<f64>, MapperError> {
        let Some(first) = self.features.first() else {
            return Err(MapperError::NotFitted);
        };
        if query.len() != first.len() {
            return Err(MapperError::DimensionMismatch {
                expected: first.len(),
                actual: query.len(),
            });
        }

        let mut distances: Vec<(usize, f64)> = self
            .features
            .iter()
            .enumerate()
            .map(|(idx, x)| (idx, euclidean(x, query)))
            .collect();
        distances.sort_by(|a, b| a.1.total_cmp(&b.1));
        let k = self.n_neighbors.clamp(1, distances.len());
        let neighbours = &distances[..k];

        let weights: Vec<f64> = match self.weighting {
            Weighting::Uniform => vec![1.0; k],
            Weighting::Distance if neighbours.iter().any(|(_, d)| *d == 0.0) => neighbours
                .iter()
                .map(|(_, d)| if *d == 0.0 { 1.0 } else { 0.0 })
                .collect(),
            Weighting::Distance => neighbours.iter().map(|(_, d)| 1.0 / d).collect(),
        };
        let total: f64 = weights.iter().sum();

        let outputs = self.targets[0].len();
        let mut prediction = vec![0.0; outputs];
        for ((idx, _), weight) in neighbours.iter().zip(&weights) {
            for (out, target) in prediction.iter_mut().zip(&self.targets[*idx]) {
                *out += weight * target;
            }
        }
        for out in &mut prediction {
            *out /= total;
        }
        Ok(prediction)
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fitted(weighting: Weighting) -> KNeighborsRegressor {
        let mut knn = KNeighborsRegressor::new(3, weighting);
        knn.fit(
            vec![vec![1.0], vec![0.5], vec![0.0]],
            vec![vec![1.0, 1.0], vec![0.75, 0.5], vec![0.5, 0.0]],
        )
        .unwrap();
        knn
    }

    #[test]
    fn test_exact_match_returns_training_target() {
        let knn = fitted(Weighting::Distance);
        assert_eq!(knn.predict(&[0.5]).unwrap(), vec![0.75, 0.5]);
        assert_eq!(knn.predict(&[1.0]).unwrap(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_distance_weighted_interpolation() {
        let knn = fitted(Weighting::Distance);
        let y = knn.predict(&[0.75]).unwrap();
        assert!(0.75 < y[0] && y[0] < 1.0);
        assert!(0.5 < y[1] && y[1] < 1.0);
    }

    #[test]
    fn test_uniform_weighting_averages() {
        let knn = fitted(Weighting::Uniform);
        let y = knn.predict(&[0.9]).unwrap();
        assert!((y[0] - 0.75).abs() < 1e-12);
        assert!((y[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_neighbours_capped_by_samples() {
        let mut knn = KNeighborsRegressor::new(5, Weighting::Distance);
        knn.fit(vec![vec![0.0], vec![1.0]], vec![vec![0.0], vec![1.0]]).unwrap();
        let y = knn.predict(&[0.25]).unwrap();
        assert!((y[0] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_errors() {
        let knn = KNeighborsRegressor::new(3, Weighting::Distance);
        assert_eq!(knn.predict(&[0.0]), Err(MapperError::NotFitted));

        let mut knn = KNeighborsRegressor::new(3, Weighting::Distance);
        assert_eq!(knn.fit(Vec::new(), Vec::new()), Err(MapperError::EmptyTrainingSet));
        assert!(knn.fit(vec![vec![0.0], vec![0.0, 1.0]], vec![vec![0.0], vec![1.0]]).is_err());

        let knn = fitted(Weighting::Distance);
        assert_eq!(
            knn.predict(&[0.0, 0.0]),
            Err(MapperError::DimensionMismatch { expected: 1, actual: 2 })
        );
    }
}
