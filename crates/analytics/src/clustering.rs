//! Behavioural segmentation of wallets with k-means over the raw
//! `(tx_count, active_days, used_contracts)` vectors.
//!
//! Features are deliberately left unscaled so segment boundaries match the
//! historical output; `tx_count` dominates the distance as a result.

use anyhow::Result;
use common::config::Analysis;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::wallet_features::WalletFeatures;

type Point = [f64; 3];

const TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterParams {
    pub k: usize,
    pub seed: u64,
    pub n_init: u32,
    pub max_iter: u32,
}

impl ClusterParams {
    pub fn from_analysis(analysis: &Analysis) -> Self {
        Self {
            k: analysis.n_clusters,
            seed: analysis.cluster_seed,
            n_init: analysis.cluster_n_init,
            max_iter: analysis.cluster_max_iter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterAssignment {
    pub wallet: String,
    pub tx_count: u64,
    pub active_days: usize,
    pub used_contracts: usize,
    pub cluster: usize,
}

impl ClusterAssignment {
    fn new(features: &WalletFeatures, cluster: usize) -> Self {
        Self {
            wallet: features.wallet.clone(),
            tx_count: features.tx_count,
            active_days: features.active_days,
            used_contracts: features.used_contracts,
            cluster,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClusterStatus {
    Clustered { inertia: f64, iterations: u32 },
    /// Fewer wallets than requested clusters; everything sits in cluster 0.
    Degenerate { wallets: usize, requested: usize },
    NoData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringOutcome {
    pub assignments: Vec<ClusterAssignment>,
    pub status: ClusterStatus,
}

impl ClusteringOutcome {
    pub fn is_degenerate(&self) -> bool {
        matches!(self.status, ClusterStatus::Degenerate { .. })
    }
}

pub fn run_clustering(features: &[WalletFeatures], params: &ClusterParams) -> Result<ClusteringOutcome> {
    anyhow::ensure!(params.k > 0, "cluster count must be positive");
    anyhow::ensure!(params.n_init > 0, "n_init must be positive");

    if features.is_empty() {
        tracing::warn!("no wallet features to cluster");
        return Ok(ClusteringOutcome {
            assignments: Vec::new(),
            status: ClusterStatus::NoData,
        });
    }

    if features.len() < params.k {
        tracing::warn!(
            wallets = features.len(),
            requested = params.k,
            "too few wallets for requested clusters; assigning all to cluster 0"
        );
        return Ok(ClusteringOutcome {
            assignments: features.iter().map(|f| ClusterAssignment::new(f, 0)).collect(),
            status: ClusterStatus::Degenerate {
                wallets: features.len(),
                requested: params.k,
            },
        });
    }

    let points: Vec<Point> = features.iter().map(WalletFeatures::as_point).collect();
    let mut rng = StdRng::seed_from_u64(params.seed);

    let mut best: Option<KMeansRun> = None;
    for _ in 0..params.n_init {
        let centroids = kmeans_plus_plus(&points, params.k, &mut rng);
        let run = lloyd(&points, centroids, params.max_iter);
        if best.as_ref().is_none_or(|b| run.inertia < b.inertia) {
            best = Some(run);
        }
    }
    let best = best.ok_or_else(|| anyhow::anyhow!("k-means produced no run"))?;

    metrics::gauge!("analytics_wallets_clustered").set(features.len() as f64);
    tracing::info!(
        wallets = features.len(),
        k = params.k,
        inertia = best.inertia,
        iterations = best.iterations,
        "clustered wallets"
    );

    Ok(ClusteringOutcome {
        assignments: features
            .iter()
            .zip(&best.labels)
            .map(|(f, &label)| ClusterAssignment::new(f, label))
            .collect(),
        status: ClusterStatus::Clustered {
            inertia: best.inertia,
            iterations: best.iterations,
        },
    })
}

struct KMeansRun {
    labels: Vec<usize>,
    inertia: f64,
    iterations: u32,
}

fn squared_distance(a: &Point, b: &Point) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Index of the closest centroid and its squared distance; ties go to the lowest index.
fn nearest(point: &Point, centroids: &[Point]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (idx, c) in centroids.iter().enumerate() {
        let d = squared_distance(point, c);
        if d < best.1 {
            best = (idx, d);
        }
    }
    best
}

/// k-means++ seeding: each further centroid is drawn with probability
/// proportional to its squared distance from the closest chosen one.
fn kmeans_plus_plus(points: &[Point], k: usize, rng: &mut StdRng) -> Vec<Point> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())]);

    while centroids.len() < k {
        let weights: Vec<f64> = points.iter().map(|p| nearest(p, &centroids).1).collect();
        let total: f64 = weights.iter().sum();
        // All points coincide with a centroid: fall back to a uniform pick.
        if total <= 0.0 {
            centroids.push(points[rng.gen_range(0..points.len())]);
            continue;
        }
        let mut target = rng.gen::<f64>() * total;
        let mut chosen = points.len() - 1;
        for (idx, w) in weights.iter().enumerate() {
            if target < *w {
                chosen = idx;
                break;
            }
            target -= w;
        }
        centroids.push(points[chosen]);
    }
    centroids
}

fn lloyd(points: &[Point], mut centroids: Vec<Point>, max_iter: u32) -> KMeansRun {
    let k = centroids.len();
    let mut labels = vec![0; points.len()];
    let mut iterations = 0;

    for iter in 1..=max_iter.max(1) {
        iterations = iter;
        for (label, point) in labels.iter_mut().zip(points) {
            *label = nearest(point, &centroids).0;
        }

        let mut sums = vec![[0.0; 3]; k];
        let mut counts = vec![0_usize; k];
        for (label, point) in labels.iter().zip(points) {
            counts[*label] += 1;
            for (s, v) in sums[*label].iter_mut().zip(point) {
                *s += v;
            }
        }

        let mut shift = 0.0;
        for ((centroid, sum), count) in centroids.iter_mut().zip(&sums).zip(&counts) {
            // An empty cluster keeps its previous centroid.
            if *count == 0 {
                continue;
            }
            let updated = sum.map(|s| s / *count as f64);
            shift += squared_distance(centroid, &updated);
            *centroid = updated;
        }
        if shift <= TOLERANCE {
            break;
        }
    }

    let mut inertia = 0.0;
    for (label, point) in labels.iter_mut().zip(points) {
        let (idx, d) = nearest(point, &centroids);
        *label = idx;
        inertia += d;
    }

    KMeansRun {
        labels,
        inertia,
        iterations,
    }
}
