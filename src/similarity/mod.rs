//! Perceptual similarity detection.
//!
//! [`SimilarityDetector`] fingerprints media files through the executor and
//! groups them with [`cluster`] under the configured [`ClusterPolicy`].

pub mod cluster;
pub mod detector;

pub use cluster::{
    cluster, cluster_greedy, cluster_linkage, ClusterMember, ClusterPolicy, SimilarityCluster,
};
pub use detector::{
    SimilarityConfig, SimilarityDetector, SimilarityOutcome, SimilaritySummary, DEFAULT_THRESHOLD,
};
