/// Length of every local descriptor
pub const DESCRIPTOR_DIM: usize = 64;

/// Side of the sub-pixel grid covered by one coarse cell
pub const CELL_SIZE: usize = 8;

/// Number of fine-offset logits produced per correspondence (8x8 grid)
pub const OFFSET_BINS: usize = CELL_SIZE * CELL_SIZE;

/// Lower bound on the norm used by L2 normalization
pub const NORM_EPS: f32 = 1e-12;

/// Real-valued local descriptor
pub type Descriptor = [f32; DESCRIPTOR_DIM];

/// Two descriptors concatenated, the fine matcher's input
pub type DescriptorPair = [f32; 2 * DESCRIPTOR_DIM];

/// Fine matcher output for one correspondence
pub type OffsetLogits = [f32; OFFSET_BINS];

/// Sparse keypoint ≙ sub-pixel location + detection score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

/// Sparse features of one image, as parallel arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseFeatures {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl SparseFeatures {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    /// Keypoint coordinates without scores.
    pub fn positions(&self) -> Vec<[f32; 2]> {
        self.keypoints.iter().map(|kp| [kp.x, kp.y]).collect()
    }
}

/// One coarse cell picked by dense extraction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DenseFeature {
    pub x: f32,
    pub y: f32,
    /// Inverse resize factor of the pyramid level that produced the feature
    pub scale: f32,
    pub descriptor: Descriptor,
}

/// Dense features of one image, as parallel arrays sorted by reliability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DenseFeatures {
    pub keypoints: Vec<[f32; 2]>,
    pub scales: Vec<f32>,
    pub descriptors: Vec<Descriptor>,
}

impl DenseFeatures {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<DenseFeature> {
        let [x, y] = *self.keypoints.get(idx)?;
        Some(DenseFeature {
            x,
            y,
            scale: self.scales[idx],
            descriptor: self.descriptors[idx],
        })
    }

    pub fn push(&mut self, feature: DenseFeature) {
        self.keypoints.push([feature.x, feature.y]);
        self.scales.push(feature.scale);
        self.descriptors.push(feature.descriptor);
    }

    /// Append all features of `other` after the existing ones.
    pub fn extend(&mut self, other: DenseFeatures) {
        self.keypoints.extend(other.keypoints);
        self.scales.extend(other.scales);
        self.descriptors.extend(other.descriptors);
    }
}

/// Mutual nearest neighbour between two feature sets of one image pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Correspondence {
    pub left: usize,
    pub right: usize,
}

/// Mutual nearest neighbour inside batch element `batch`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchCorrespondence {
    pub batch: usize,
    pub left: usize,
    pub right: usize,
}

/// Refined correspondence; only the left point carries the sub-pixel offset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefinedMatch {
    pub batch: usize,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl RefinedMatch {
    pub fn to_array(&self) -> [f32; 4] {
        [self.x0, self.y0, self.x1, self.y1]
    }
}

/// L2-normalize `v` in place (`v / max(||v||, eps)`).
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(NORM_EPS);
    v.iter_mut().for_each(|x| *x /= norm);
}

/// Copy a slice of exactly `DESCRIPTOR_DIM` values into a descriptor.
pub fn descriptor_from_slice(values: &[f32]) -> Option<Descriptor> {
    values.try_into().ok()
}

/// Concatenate two descriptors into a fine matcher input row.
pub fn concat_descriptors(a: &Descriptor, b: &Descriptor) -> DescriptorPair {
    let mut pair = [0.0f32; 2 * DESCRIPTOR_DIM];
    pair[..DESCRIPTOR_DIM].copy_from_slice(a);
    pair[DESCRIPTOR_DIM..].copy_from_slice(b);
    pair
}

/// Dot product of two descriptors; cosine similarity for unit vectors.
#[inline]
pub fn cosine_similarity(a: &Descriptor, b: &Descriptor) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
