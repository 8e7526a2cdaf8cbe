use crate::error::{CoreError, CoreResult};

/// Dense row-major `[B, C, H, W]` float tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor4 {
    shape: [usize; 4],
    data: Vec<f32>,
}

impl Tensor4 {
    pub fn zeros(shape: [usize; 4]) -> Self {
        Self::filled(shape, 0.0)
    }

    pub fn filled(shape: [usize; 4], value: f32) -> Self {
        Self {
            shape,
            data: vec![value; shape.iter().product()],
        }
    }

    /// Wrap an existing buffer, checking that its length matches `shape`.
    pub fn from_vec(shape: [usize; 4], data: Vec<f32>) -> CoreResult<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(CoreError::DataLength {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Build a tensor by evaluating `f(b, c, y, x)` for every element.
    pub fn from_fn(shape: [usize; 4], mut f: impl FnMut(usize, usize, usize, usize) -> f32) -> Self {
        let [b_n, c_n, h, w] = shape;
        let mut data = Vec::with_capacity(shape.iter().product());
        for b in 0..b_n {
            for c in 0..c_n {
                for y in 0..h {
                    for x in 0..w {
                        data.push(f(b, c, y, x));
                    }
                }
            }
        }
        Self { shape, data }
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn batch(&self) -> usize {
        self.shape[0]
    }

    pub fn channels(&self) -> usize {
        self.shape[1]
    }

    pub fn height(&self) -> usize {
        self.shape[2]
    }

    pub fn width(&self) -> usize {
        self.shape[3]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    #[inline]
    fn offset(&self, b: usize, c: usize, y: usize, x: usize) -> usize {
        let [_, c_n, h, w] = self.shape;
        ((b * c_n + c) * h + y) * w + x
    }

    #[inline]
    pub fn get(&self, b: usize, c: usize, y: usize, x: usize) -> f32 {
        self.data[self.offset(b, c, y, x)]
    }

    #[inline]
    pub fn set(&mut self, b: usize, c: usize, y: usize, x: usize, value: f32) {
        let idx = self.offset(b, c, y, x);
        self.data[idx] = value;
    }

    /// Single `H x W` plane of batch `b`, channel `c`.
    pub fn plane(&self, b: usize, c: usize) -> &[f32] {
        let len = self.shape[2] * self.shape[3];
        let start = self.offset(b, c, 0, 0);
        &self.data[start..start + len]
    }

    /// All channels of batch element `b` as one contiguous slice.
    pub fn item(&self, b: usize) -> &[f32] {
        let len = self.shape[1] * self.shape[2] * self.shape[3];
        &self.data[b * len..(b + 1) * len]
    }

    /// Channel vector at spatial position `(y, x)` of batch element `b`.
    pub fn channel_vector(&self, b: usize, y: usize, x: usize) -> Vec<f32> {
        (0..self.shape[1]).map(|c| self.get(b, c, y, x)).collect()
    }

    /// Copy of batch element `b` as a tensor with batch size 1.
    pub fn select_batch(&self, b: usize) -> Tensor4 {
        let [_, c, h, w] = self.shape;
        Tensor4 {
            shape: [1, c, h, w],
            data: self.item(b).to_vec(),
        }
    }

    /// Stack same-shaped single-batch tensors along the batch axis.
    pub fn stack(items: &[Tensor4]) -> CoreResult<Tensor4> {
        let Some(first) = items.first() else {
            return Ok(Tensor4::zeros([0, 0, 0, 0]));
        };
        let [_, c, h, w] = first.shape;
        let mut data = Vec::new();
        let mut batch = 0;
        for item in items {
            if item.shape[1..] != first.shape[1..] {
                return Err(CoreError::ShapeMismatch {
                    context: "stack",
                    expected: first.shape[1..].to_vec(),
                    actual: item.shape[1..].to_vec(),
                });
            }
            batch += item.shape[0];
            data.extend_from_slice(&item.data);
        }
        Ok(Tensor4 {
            shape: [batch, c, h, w],
            data,
        })
    }

    /// L2-normalize every channel vector in place (`x / max(||x||, eps)`).
    pub fn l2_normalize_channels(&mut self) {
        let [b_n, c_n, h, w] = self.shape;
        let hw = h * w;
        for b in 0..b_n {
            let base = b * c_n * hw;
            for p in 0..hw {
                let mut sq = 0.0f32;
                for c in 0..c_n {
                    let v = self.data[base + c * hw + p];
                    sq += v * v;
                }
                let inv = 1.0 / sq.sqrt().max(crate::features::NORM_EPS);
                for c in 0..c_n {
                    self.data[base + c * hw + p] *= inv;
                }
            }
        }
    }

    /// Fail with a shape mismatch unless the shape equals `expected`.
    pub fn expect_shape(&self, context: &'static str, expected: [usize; 4]) -> CoreResult<()> {
        if self.shape != expected {
            return Err(CoreError::ShapeMismatch {
                context,
                expected: expected.to_vec(),
                actual: self.shape.to_vec(),
            });
        }
        Ok(())
    }

    /// Fail with a shape mismatch unless the channel count equals `channels`.
    pub fn expect_channels(&self, context: &'static str, channels: usize) -> CoreResult<()> {
        if self.shape[1] != channels {
            let mut expected = self.shape;
            expected[1] = channels;
            return Err(CoreError::ShapeMismatch {
                context,
                expected: expected.to_vec(),
                actual: self.shape.to_vec(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        let result = Tensor4::from_vec([1, 2, 3, 4], vec![0.0; 10]);
        assert!(matches!(result, Err(CoreError::DataLength { expected: 24, actual: 10, .. })));
    }

    #[test]
    fn test_indexing_is_row_major() {
        let t = Tensor4::from_fn([2, 3, 4, 5], |b, c, y, x| (b * 1000 + c * 100 + y * 10 + x) as f32);
        assert_eq!(t.get(1, 2, 3, 4), 1234.0);
        assert_eq!(t.plane(1, 2)[3 * 5 + 4], 1234.0);
        assert_eq!(t.channel_vector(0, 1, 2), vec![12.0, 112.0, 212.0]);
    }

    #[test]
    fn test_l2_normalize_channels() {
        let mut t = Tensor4::from_fn([1, 2, 1, 2], |_, c, _, x| if c == 0 { 3.0 } else { 4.0 * x as f32 });
        t.l2_normalize_channels();
        assert!((t.get(0, 0, 0, 0) - 1.0).abs() < 1e-6);
        assert!((t.get(0, 0, 0, 1) - 0.6).abs() < 1e-6);
        assert!((t.get(0, 1, 0, 1) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_stays_zero() {
        let mut t = Tensor4::zeros([1, 4, 2, 2]);
        t.l2_normalize_channels();
        assert!(t.data().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_stack_and_select() {
        let a = Tensor4::filled([1, 1, 2, 2], 1.0);
        let b = Tensor4::filled([1, 1, 2, 2], 2.0);
        let s = Tensor4::stack(&[a.clone(), b]).unwrap();
        assert_eq!(s.shape(), [2, 1, 2, 2]);
        assert_eq!(s.select_batch(0), a);
        assert_eq!(s.get(1, 0, 1, 1), 2.0);

        let c = Tensor4::filled([1, 1, 3, 2], 0.0);
        assert!(Tensor4::stack(&[s, c]).is_err());
    }
}
