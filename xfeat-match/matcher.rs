use rayon::prelude::*;
use xfeat_core::{cosine_similarity, BatchCorrespondence, Correspondence, Descriptor, XFeatConfig};

use crate::error::{MatchError, MatchResult};

/// Mutual nearest neighbour matcher with an optional similarity floor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MutualMatcher {
    min_cossim: f32,
}

impl Default for MutualMatcher {
    fn default() -> Self {
        Self { min_cossim: -1.0 }
    }
}

impl MutualMatcher {
    /// `min_cossim <= 0` disables the similarity floor.
    pub fn new(min_cossim: f32) -> Self {
        Self { min_cossim }
    }

    pub fn from_config(cfg: &XFeatConfig) -> Self {
        Self::new(cfg.min_cossim)
    }

    pub fn min_cossim(&self) -> f32 {
        self.min_cossim
    }

    pub fn match_pair(&self, left: &[Descriptor], right: &[Descriptor]) -> Vec<Correspondence> {
        match_descriptors(left, right, self.min_cossim)
    }

    pub fn match_batch(
        &self,
        left: &[Vec<Descriptor>],
        right: &[Vec<Descriptor>],
    ) -> MatchResult<Vec<BatchCorrespondence>> {
        batch_match(left, right, self.min_cossim)
    }
}

/// Index of the first maximum and the maximum itself.
#[inline]
fn first_argmax(values: impl Iterator<Item = f32>) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, v) in values.enumerate() {
        match best {
            Some((_, b)) if !(v > b) => {}
            _ => best = Some((i, v)),
        }
    }
    best
}

/// Mutual nearest neighbours under dot-product similarity.
///
/// `left[i]` and `right[j]` match iff each is the other's most similar
/// descriptor (first index wins ties). With `min_cossim > 0` the similarity
/// must also exceed `min_cossim`. Output is ordered by left index.
pub fn match_descriptors(left: &[Descriptor], right: &[Descriptor], min_cossim: f32) -> Vec<Correspondence> {
    if left.is_empty() || right.is_empty() {
        return Vec::new();
    }
    let m = right.len();

    let similarity: Vec<f32> = left
        .par_iter()
        .flat_map_iter(|a| right.iter().map(move |b| cosine_similarity(a, b)))
        .collect();

    let row_best: Vec<(usize, f32)> = similarity
        .par_chunks(m)
        .map(|row| first_argmax(row.iter().copied()).unwrap_or((0, f32::NEG_INFINITY)))
        .collect();
    let col_best: Vec<usize> = (0..m)
        .into_par_iter()
        .map(|j| {
            first_argmax((0..left.len()).map(|i| similarity[i * m + j]))
                .map(|(i, _)| i)
                .unwrap_or(usize::MAX)
        })
        .collect();

    let matches: Vec<Correspondence> = row_best
        .iter()
        .enumerate()
        .filter(|&(i, &(j, best))| col_best[j] == i && (min_cossim <= 0.0 || best > min_cossim))
        .map(|(i, &(j, _))| Correspondence { left: i, right: j })
        .collect();
    log::trace!("{} mutual matches out of {}x{}", matches.len(), left.len(), m);
    matches
}

/// [`match_descriptors`] for every batch element, ordered by batch then left index.
pub fn batch_match(
    left: &[Vec<Descriptor>],
    right: &[Vec<Descriptor>],
    min_cossim: f32,
) -> MatchResult<Vec<BatchCorrespondence>> {
    if left.len() != right.len() {
        return Err(MatchError::BatchMismatch {
            what: "batch_match",
            left: left.len(),
            right: right.len(),
        });
    }
    let per_batch: Vec<Vec<BatchCorrespondence>> = left
        .par_iter()
        .zip(right.par_iter())
        .enumerate()
        .map(|(batch, (a, b))| {
            match_descriptors(a, b, min_cossim)
                .into_iter()
                .map(|c| BatchCorrespondence { batch, left: c.left, right: c.right })
                .collect()
        })
        .collect();
    let matches: Vec<BatchCorrespondence> = per_batch.into_iter().flatten().collect();
    log::debug!("batch_match: {} correspondences over {} pairs", matches.len(), left.len());
    Ok(matches)
}
