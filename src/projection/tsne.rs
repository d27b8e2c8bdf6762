//! Exact t-SNE (van der Maaten & Hinton, 2008).
//!
//! Quadratic in the number of rows: every iteration touches all pairs. The
//! defaults mirror scikit-learn's `TSNE(n_components=2)`.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use super::{DimensionReducer, Point2};
use crate::config::{ProjectionConfig, TsneInit};
use crate::error::PipelineError;

const MACHINE_EPSILON: f64 = f64::EPSILON;
const PERPLEXITY_TOLERANCE: f64 = 1e-5;
const PERPLEXITY_STEPS: usize = 100;
const MIN_GAIN: f64 = 0.01;
const INITIAL_MOMENTUM: f64 = 0.5;
const FINAL_MOMENTUM: f64 = 0.8;
const POWER_ITERATIONS: usize = 100;
const INIT_SCALE: f64 = 1e-4;
const CHECK_EVERY: usize = 50;

pub struct Tsne {
    config: ProjectionConfig,
}

impl Tsne {
    pub fn new(config: ProjectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProjectionConfig {
        &self.config
    }

    /// Perplexity actually used for `n` rows.
    fn effective_perplexity(&self, n: usize) -> f64 {
        let max = ((n as f64 - 1.0) / 3.0).max(1.0);
        (self.config.perplexity as f64).min(max)
    }

    fn learning_rate(&self, n: usize) -> f64 {
        match self.config.learning_rate {
            Some(rate) => rate as f64,
            None => (n as f64 / self.config.early_exaggeration as f64 / 4.0).max(50.0),
        }
    }
}

impl DimensionReducer for Tsne {
    fn fit_transform(&mut self, data: ArrayView2<f32>) -> Result<Vec<Point2>, PipelineError> {
        let n = data.nrows();
        if n == 0 {
            return Err(PipelineError::Reduction("no rows to project".to_string()));
        }
        if n == 1 {
            return Ok(vec![[0.0, 0.0]]);
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::Reduction(
                "input contains non-finite values".to_string(),
            ));
        }

        let perplexity = self.effective_perplexity(n);
        if perplexity < self.config.perplexity as f64 {
            tracing::warn!(
                requested = self.config.perplexity,
                used = perplexity,
                rows = n,
                "Perplexity reduced for small input"
            );
        }

        let x = data.mapv(|v| v as f64);
        let p = {
            let distances = squared_distances(&x);
            joint_probabilities(&distances, perplexity)
        };

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let y = match self.config.init {
            TsneInit::Pca => pca_init(&x, &mut rng).unwrap_or_else(|| {
                tracing::debug!("PCA init degenerate, falling back to random init");
                random_init(n, &mut rng)
            }),
            TsneInit::Random => random_init(n, &mut rng),
        };

        let learning_rate = self.learning_rate(n);
        tracing::debug!(rows = n, perplexity, learning_rate, "Running t-SNE");

        let mut optimizer = Optimizer::new(y, learning_rate, self.config.min_grad_norm as f64);
        let exaggeration = self.config.early_exaggeration as f64;
        let exaggeration_iter = self.config.exaggeration_iter.min(self.config.max_iter);

        optimizer.run(&p, exaggeration, exaggeration_iter, INITIAL_MOMENTUM);
        let kl = optimizer.run(
            &p,
            1.0,
            self.config.max_iter - exaggeration_iter,
            FINAL_MOMENTUM,
        );

        tracing::info!(rows = n, kl_divergence = kl, "t-SNE finished");

        Ok(optimizer
            .y
            .rows()
            .into_iter()
            .map(|r| [r[0] as f32, r[1] as f32])
            .collect())
    }
}

/// Pairwise squared Euclidean distances.
fn squared_distances(x: &Array2<f64>) -> Array2<f64> {
    let norms: Array1<f64> = x.rows().into_iter().map(|r| r.dot(&r)).collect();
    let gram = x.dot(&x.t());
    let n = x.nrows();

    let mut d = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            if i != j {
                d[[i, j]] = (norms[i] + norms[j] - 2.0 * gram[[i, j]]).max(0.0);
            }
        }
    }
    d
}

/// Row-conditional Gaussian affinities whose entropy matches `ln(perplexity)`.
fn conditional_probabilities(distances: &Array2<f64>, perplexity: f64) -> Array2<f64> {
    let n = distances.nrows();
    let desired_entropy = perplexity.ln();
    let mut p = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        let row = distances.row(i);
        let mut beta = 1.0;
        let mut beta_min = f64::NEG_INFINITY;
        let mut beta_max = f64::INFINITY;

        for _ in 0..PERPLEXITY_STEPS {
            let mut sum_p = 0.0;
            for j in 0..n {
                let v = if j == i { 0.0 } else { (-row[j] * beta).exp() };
                p[[i, j]] = v;
                sum_p += v;
            }
            if sum_p == 0.0 {
                sum_p = 1e-8;
            }

            let mut sum_dist_p = 0.0;
            for j in 0..n {
                p[[i, j]] /= sum_p;
                sum_dist_p += row[j] * p[[i, j]];
            }

            let entropy = sum_p.ln() + beta * sum_dist_p;
            let diff = entropy - desired_entropy;
            if diff.abs() <= PERPLEXITY_TOLERANCE {
                break;
            }

            if diff > 0.0 {
                beta_min = beta;
                beta = if beta_max == f64::INFINITY {
                    beta * 2.0
                } else {
                    (beta + beta_max) / 2.0
                };
            } else {
                beta_max = beta;
                beta = if beta_min == f64::NEG_INFINITY {
                    beta / 2.0
                } else {
                    (beta + beta_min) / 2.0
                };
            }
        }
    }

    p
}

/// Symmetrised joint probabilities, summing to one off the diagonal.
fn joint_probabilities(distances: &Array2<f64>, perplexity: f64) -> Array2<f64> {
    let conditional = conditional_probabilities(distances, perplexity);
    let mut p = &conditional + &conditional.t();
    let n = p.nrows();

    let sum = p.sum().max(MACHINE_EPSILON);
    for i in 0..n {
        for j in 0..n {
            p[[i, j]] = if i == j {
                0.0
            } else {
                (p[[i, j]] / sum).max(MACHINE_EPSILON)
            };
        }
    }
    p
}

fn random_init(n: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
    Array2::from_shape_fn((n, 2), |_| {
        let z: f64 = StandardNormal.sample(rng);
        z * INIT_SCALE
    })
}

/// First two principal components, scaled so the first has std `INIT_SCALE`.
/// Returns `None` when the data has no spread.
fn pca_init(x: &Array2<f64>, rng: &mut ChaCha8Rng) -> Option<Array2<f64>> {
    let mean = x.mean_axis(Axis(0))?;
    let centered = x - &mean;
    let d = centered.ncols();

    let mut components: Vec<Array1<f64>> = Vec::with_capacity(2);
    for _ in 0..2 {
        let mut v: Array1<f64> = Array1::from_shape_fn(d, |_| StandardNormal.sample(rng));
        orthogonalize(&mut v, &components);
        let norm = v.dot(&v).sqrt();
        if norm == 0.0 {
            break;
        }
        v /= norm;

        for _ in 0..POWER_ITERATIONS {
            let mut w = centered.t().dot(&centered.dot(&v));
            orthogonalize(&mut w, &components);
            let norm = w.dot(&w).sqrt();
            if norm <= MACHINE_EPSILON {
                v.fill(0.0);
                break;
            }
            v = w / norm;
        }
        components.push(v);
    }

    let mut y = Array2::<f64>::zeros((x.nrows(), 2));
    for (c, component) in components.iter().enumerate() {
        y.column_mut(c).assign(&centered.dot(component));
    }

    let std = y.column(0).std(0.0);
    if !(std > MACHINE_EPSILON) {
        return None;
    }
    y.mapv_inplace(|v| v / std * INIT_SCALE);
    Some(y)
}

fn orthogonalize(v: &mut Array1<f64>, basis: &[Array1<f64>]) {
    for b in basis {
        let proj = v.dot(b);
        v.scaled_add(-proj, b);
    }
}

/// Gradient descent with momentum and per-parameter adaptive gains.
struct Optimizer {
    y: Array2<f64>,
    update: Array2<f64>,
    gains: Array2<f64>,
    grad: Array2<f64>,
    learning_rate: f64,
    min_grad_norm: f64,
    converged: bool,
}

impl Optimizer {
    fn new(y: Array2<f64>, learning_rate: f64, min_grad_norm: f64) -> Self {
        let shape = y.raw_dim();
        Self {
            y,
            update: Array2::zeros(shape),
            gains: Array2::ones(shape),
            grad: Array2::zeros(shape),
            learning_rate,
            min_grad_norm,
            converged: false,
        }
    }

    /// Run up to `iterations` steps against `p * exaggeration`; returns the
    /// last KL divergence.
    fn run(&mut self, p: &Array2<f64>, exaggeration: f64, iterations: usize, momentum: f64) -> f64 {
        let mut kl = kl_gradient(p, exaggeration, &self.y, &mut self.grad);
        if self.converged {
            return kl;
        }

        for it in 0..iterations {
            if it > 0 {
                kl = kl_gradient(p, exaggeration, &self.y, &mut self.grad);
            }

            let grad_norm = self.grad.iter().map(|g| g * g).sum::<f64>().sqrt();
            if grad_norm <= self.min_grad_norm {
                tracing::debug!(iteration = it, grad_norm, "t-SNE converged");
                self.converged = true;
                break;
            }

            let learning_rate = self.learning_rate;
            ndarray::Zip::from(&mut self.gains)
                .and(&mut self.update)
                .and(&mut self.grad)
                .and(&mut self.y)
                .for_each(|gain, update, grad, y| {
                    if *update * *grad < 0.0 {
                        *gain += 0.2;
                    } else {
                        *gain *= 0.8;
                    }
                    *gain = gain.max(MIN_GAIN);
                    *grad *= *gain;
                    *update = momentum * *update - learning_rate * *grad;
                    *y += *update;
                });

            if (it + 1) % CHECK_EVERY == 0 {
                tracing::trace!(iteration = it + 1, kl_divergence = kl, grad_norm, "t-SNE progress");
            }
        }

        kl
    }
}

/// KL(P || Q) for Student-t affinities with one degree of freedom, writing
/// the gradient with respect to `y` into `grad`.
fn kl_gradient(p: &Array2<f64>, scale: f64, y: &Array2<f64>, grad: &mut Array2<f64>) -> f64 {
    let n = y.nrows();

    let mut sum_num = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = y[[i, 0]] - y[[j, 0]];
            let dy = y[[i, 1]] - y[[j, 1]];
            sum_num += 1.0 / (1.0 + dx * dx + dy * dy);
        }
    }
    let norm = (2.0 * sum_num).max(MACHINE_EPSILON);

    grad.fill(0.0);
    let mut kl = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = y[[i, 0]] - y[[j, 0]];
            let dy = y[[i, 1]] - y[[j, 1]];
            let num = 1.0 / (1.0 + dx * dx + dy * dy);
            let q = (num / norm).max(MACHINE_EPSILON);
            let pij = p[[i, j]] * scale;

            kl += 2.0 * pij * (pij.max(MACHINE_EPSILON) / q).ln();

            let coeff = 4.0 * (pij - q) * num;
            grad[[i, 0]] += coeff * dx;
            grad[[i, 1]] += coeff * dy;
            grad[[j, 0]] -= coeff * dx;
            grad[[j, 1]] -= coeff * dy;
        }
    }

    kl
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_clusters(per_cluster: usize) -> Array2<f32> {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        Array2::from_shape_fn((per_cluster * 2, 8), |(i, _)| {
            let centre = if i < per_cluster { 0.0 } else { 10.0 };
            let noise: f64 = StandardNormal.sample(&mut rng);
            (centre + noise * 0.5) as f32
        })
    }

    fn small_config() -> ProjectionConfig {
        ProjectionConfig {
            perplexity: 5.0,
            max_iter: 300,
            exaggeration_iter: 100,
            ..ProjectionConfig::default()
        }
    }

    fn dist(a: Point2, b: Point2) -> f32 {
        ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
    }

    #[test]
    fn test_squared_distances() {
        let x = array![[0.0, 0.0], [3.0, 4.0], [0.0, 1.0]];
        let d = squared_distances(&x);
        assert!((d[[0, 1]] - 25.0).abs() < 1e-9);
        assert!((d[[1, 0]] - 25.0).abs() < 1e-9);
        assert!((d[[0, 2]] - 1.0).abs() < 1e-9);
        assert_eq!(d[[1, 1]], 0.0);
    }

    #[test]
    fn test_conditional_probabilities_match_perplexity() {
        let data = two_clusters(15).mapv(|v| v as f64);
        let d = squared_distances(&data);
        let p = conditional_probabilities(&d, 5.0);

        for i in 0..p.nrows() {
            let row = p.row(i);
            assert!((row.sum() - 1.0).abs() < 1e-6);
            assert_eq!(row[i], 0.0);
            let entropy: f64 = row.iter().filter(|&&v| v > 0.0).map(|&v| -v * v.ln()).sum();
            assert!((entropy.exp() - 5.0).abs() < 0.01, "row {} perplexity {}", i, entropy.exp());
        }
    }

    #[test]
    fn test_joint_probabilities_symmetric() {
        let data = two_clusters(10).mapv(|v| v as f64);
        let p = joint_probabilities(&squared_distances(&data), 5.0);

        assert!((p.sum() - 1.0).abs() < 1e-6);
        for i in 0..p.nrows() {
            assert_eq!(p[[i, i]], 0.0);
            for j in 0..p.ncols() {
                assert!((p[[i, j]] - p[[j, i]]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_preserves_row_count() {
        let data = two_clusters(12);
        let mut tsne = Tsne::new(small_config());

        let points = tsne.fit_transform(data.view()).unwrap();

        assert_eq!(points.len(), 24);
        assert!(points.iter().all(|p| p[0].is_finite() && p[1].is_finite()));
    }

    #[test]
    fn test_deterministic_for_seed() {
        let data = two_clusters(10);

        let a = Tsne::new(small_config()).fit_transform(data.view()).unwrap();
        let b = Tsne::new(small_config()).fit_transform(data.view()).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_separates_clusters() {
        let data = two_clusters(15);
        let points = Tsne::new(small_config()).fit_transform(data.view()).unwrap();

        let (a, b) = points.split_at(15);
        let mut intra = 0.0;
        let mut intra_n = 0;
        for cluster in [a, b] {
            for i in 0..cluster.len() {
                for j in (i + 1)..cluster.len() {
                    intra += dist(cluster[i], cluster[j]);
                    intra_n += 1;
                }
            }
        }
        let mut inter = 0.0;
        for pa in a {
            for pb in b {
                inter += dist(*pa, *pb);
            }
        }

        let intra_mean = intra / intra_n as f32;
        let inter_mean = inter / (a.len() * b.len()) as f32;
        assert!(
            inter_mean > 2.0 * intra_mean,
            "inter {} intra {}",
            inter_mean,
            intra_mean
        );
    }

    #[test]
    fn test_random_init_runs() {
        let config = ProjectionConfig {
            init: TsneInit::Random,
            ..small_config()
        };
        let points = Tsne::new(config).fit_transform(two_clusters(6).view()).unwrap();
        assert_eq!(points.len(), 12);
    }

    #[test]
    fn test_identical_points_fall_back_to_random_init() {
        let data = Array2::<f32>::ones((5, 4));
        let points = Tsne::new(small_config()).fit_transform(data.view()).unwrap();
        assert_eq!(points.len(), 5);
    }

    #[test]
    fn test_edge_sizes() {
        let mut tsne = Tsne::new(ProjectionConfig::default());

        let empty = Array2::<f32>::zeros((0, 4));
        assert!(tsne.fit_transform(empty.view()).is_err());

        let single = Array2::<f32>::ones((1, 4));
        assert_eq!(tsne.fit_transform(single.view()).unwrap(), vec![[0.0, 0.0]]);

        let pair = array![[0.0f32, 0.0], [1.0, 1.0]];
        assert_eq!(tsne.fit_transform(pair.view()).unwrap().len(), 2);
    }

    #[test]
    fn test_rejects_non_finite_input() {
        let data = array![[0.0f32, f32::NAN], [1.0, 1.0]];
        assert!(Tsne::new(small_config()).fit_transform(data.view()).is_err());
    }

    #[test]
    fn test_auto_learning_rate() {
        let tsne = Tsne::new(ProjectionConfig::default());
        assert_eq!(tsne.learning_rate(100), 50.0);
        assert_eq!(tsne.learning_rate(4800), 100.0);
        assert_eq!(tsne.effective_perplexity(21), 20.0 / 3.0);
        assert_eq!(tsne.effective_perplexity(1000), 30.0);
    }
}
