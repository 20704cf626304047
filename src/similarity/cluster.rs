//! Threshold clustering of perceptual fingerprints.
//!
//! Both policies return clusters whose members are pairwise within the
//! distance threshold, with singletons dropped.
//!
//! [`ClusterPolicy::Linkage`] runs complete-linkage agglomeration and stops
//! once the closest pair of clusters is farther apart than the threshold.
//! Merges happen in order of linkage distance, ties broken by the lowest
//! member index, so the clustering at a threshold is a prefix of the
//! clustering at any larger one: raising the threshold only merges clusters.
//!
//! [`ClusterPolicy::Greedy`] visits files in path order and adds each to the
//! first cluster whose members are all within the threshold, starting a new
//! cluster otherwise. It is O(n·k) for k clusters but order-dependent, and a
//! larger threshold can move a file from one cluster to another.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::scanner::perceptual::{similarity_percent, Fingerprint, MediaKind};
use crate::scanner::FileRecord;

/// A clustered file and how close it is to the representative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterMember {
    /// The file
    pub file: FileRecord,
    /// Its fingerprint
    pub fingerprint: Fingerprint,
    /// Hamming distance to the representative
    pub distance: u32,
    /// Similarity to the representative, 0–100
    pub similarity: f64,
}

/// Files whose fingerprints are pairwise within the threshold.
///
/// The first member is the representative (distance 0, similarity 100).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityCluster {
    /// Media kind shared by every member
    pub media: MediaKind,
    /// Members in input order; the first is the representative
    pub members: Vec<ClusterMember>,
}

/// How fingerprints are grouped once distances are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClusterPolicy {
    /// Complete linkage cut at the threshold. Stable as the threshold grows.
    #[default]
    Linkage,
    /// First fit in path order. Cheaper, order-dependent.
    Greedy,
}

impl std::fmt::Display for ClusterPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linkage => write!(f, "linkage"),
            Self::Greedy => write!(f, "greedy"),
        }
    }
}

impl SimilarityCluster {
    /// Fingerprint of the representative.
    #[must_use]
    pub fn representative(&self) -> &Fingerprint {
        &self.members[0].fingerprint
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the cluster has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Total size of all members.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.members.iter().map(|m| m.file.size).sum()
    }

    /// Largest distance between any two members.
    #[must_use]
    pub fn max_pairwise_distance(&self) -> u32 {
        let mut max = 0;
        for (i, a) in self.members.iter().enumerate() {
            for b in &self.members[i + 1..] {
                max = max.max(a.fingerprint.distance(&b.fingerprint));
            }
        }
        max
    }

    /// Member paths.
    #[must_use]
    pub fn paths(&self) -> Vec<std::path::PathBuf> {
        self.members.iter().map(|m| m.file.path.clone()).collect()
    }
}

/// Cluster fingerprinted files of one media kind with the given policy.
///
/// `items` should be sorted by path; clusters come back ordered by their
/// first member.
#[must_use]
pub fn cluster(
    policy: ClusterPolicy,
    media: MediaKind,
    items: Vec<(FileRecord, Fingerprint)>,
    max_distance: u32,
) -> Vec<SimilarityCluster> {
    match policy {
        ClusterPolicy::Linkage => cluster_linkage(media, items, max_distance),
        ClusterPolicy::Greedy => cluster_greedy(media, items, max_distance),
    }
}

/// Complete-linkage clustering cut at `max_distance`.
///
/// Files connected by a chain of pairs within the threshold are split off
/// first. No complete-linkage merge can cross two such components, so each
/// is agglomerated on its own.
#[must_use]
pub fn cluster_linkage(
    media: MediaKind,
    items: Vec<(FileRecord, Fingerprint)>,
    max_distance: u32,
) -> Vec<SimilarityCluster> {
    let n = items.len();
    let mut parent: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in i + 1..n {
            if items[i].1.distance(&items[j].1) <= max_distance {
                union(&mut parent, i, j);
            }
        }
    }

    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        components.entry(root).or_default().push(i);
    }

    let mut groups: Vec<Vec<usize>> = Vec::new();
    for indices in components.into_values().filter(|c| c.len() > 1) {
        groups.extend(
            complete_linkage(&items, &indices, max_distance)
                .into_iter()
                .filter(|group| group.len() > 1),
        );
    }
    groups.sort_by_key(|group| group[0]);

    let mut slots: Vec<Option<(FileRecord, Fingerprint)>> = items.into_iter().map(Some).collect();
    groups
        .into_iter()
        .map(|group| {
            let members = group.into_iter().filter_map(|i| slots[i].take()).collect();
            new_cluster(media, members)
        })
        .collect()
}

/// Agglomerate one component. `indices` are ascending; each returned group
/// is ascending too.
fn complete_linkage(
    items: &[(FileRecord, Fingerprint)],
    indices: &[usize],
    max_distance: u32,
) -> Vec<Vec<usize>> {
    let m = indices.len();
    let mut linkage = vec![vec![0u32; m]; m];
    for a in 0..m {
        for b in a + 1..m {
            let d = items[indices[a]].1.distance(&items[indices[b]].1);
            linkage[a][b] = d;
            linkage[b][a] = d;
        }
    }

    let mut members: Vec<Vec<usize>> = indices.iter().map(|&i| vec![i]).collect();
    let mut active = vec![true; m];
    // Closest active cluster with a higher slot, per slot
    let mut nearest: Vec<Option<(u32, usize)>> =
        (0..m).map(|a| nearest_after(&linkage, &active, a)).collect();

    loop {
        let best = (0..m)
            .filter(|&a| active[a])
            .filter_map(|a| nearest[a].map(|(d, b)| (d, a, b)))
            .min();
        let Some((d, a, b)) = best else {
            break;
        };
        if d > max_distance {
            break;
        }

        let absorbed = std::mem::take(&mut members[b]);
        members[a].extend(absorbed);
        active[b] = false;
        for x in 0..m {
            if active[x] && x != a {
                let merged = linkage[a][x].max(linkage[b][x]);
                linkage[a][x] = merged;
                linkage[x][a] = merged;
            }
        }
        for x in 0..m {
            let stale = x == a || matches!(nearest[x], Some((_, t)) if t == a || t == b);
            if active[x] && stale {
                nearest[x] = nearest_after(&linkage, &active, x);
            }
        }
    }

    members
        .into_iter()
        .zip(active)
        .filter(|(_, alive)| *alive)
        .map(|(mut group, _)| {
            group.sort_unstable();
            group
        })
        .collect()
}

fn nearest_after(linkage: &[Vec<u32>], active: &[bool], a: usize) -> Option<(u32, usize)> {
    (a + 1..linkage.len())
        .filter(|&b| active[b])
        .map(|b| (linkage[a][b], b))
        .min()
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        parent[ra.max(rb)] = ra.min(rb);
    }
}

/// First-fit clustering in input order.
///
/// Only clusters with two or more members are returned, in the order they
/// were started.
#[must_use]
pub fn cluster_greedy(
    media: MediaKind,
    items: Vec<(FileRecord, Fingerprint)>,
    max_distance: u32,
) -> Vec<SimilarityCluster> {
    let mut clusters: Vec<Vec<(FileRecord, Fingerprint)>> = Vec::new();

    for (file, fingerprint) in items {
        let home = clusters.iter().position(|members| {
            members
                .iter()
                .all(|(_, other)| other.distance(&fingerprint) <= max_distance)
        });
        match home {
            Some(index) => clusters[index].push((file, fingerprint)),
            None => clusters.push(vec![(file, fingerprint)]),
        }
    }

    clusters
        .into_iter()
        .filter(|members| members.len() > 1)
        .map(|members| new_cluster(media, members))
        .collect()
}

fn new_cluster(media: MediaKind, members: Vec<(FileRecord, Fingerprint)>) -> SimilarityCluster {
    let representative = members[0].1.clone();
    let members = members
        .into_iter()
        .map(|(file, fingerprint)| {
            let distance = representative.distance(&fingerprint);
            ClusterMember {
                similarity: similarity_percent(distance, representative.bits()),
                file,
                fingerprint,
                distance,
            }
        })
        .collect();
    SimilarityCluster { media, members }
}
