//! In-memory image sets and seeded mini-batch iteration.
//!
//! Contract: every row appears exactly once per pass, batches hold `batch_size` rows except the
//! last, which holds the remainder. Callers that shape tensors "per batch" must read the size off
//! the batch they received.

use ndarray::{Array2, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{Error, Result};

/// Flattened images (`n × dim`) with one label per row.
#[derive(Debug, Clone)]
pub struct ImageSet {
    pub images: Array2<f32>,
    pub labels: Vec<u8>,
}

impl ImageSet {
    pub fn new(images: Array2<f32>, labels: Vec<u8>) -> Result<Self> {
        if images.nrows() != labels.len() {
            return Err(Error::Shape(format!(
                "{} images but {} labels",
                images.nrows(),
                labels.len()
            )));
        }
        Ok(Self { images, labels })
    }

    /// `n` images of `dim` values drawn uniformly from `[-1, 1]`, all labelled 0.
    pub fn synthetic(n: usize, dim: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let images = Array2::from_shape_simple_fn((n, dim), || rng.random_range(-1.0f32..=1.0));
        Self {
            images,
            labels: vec![0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.images.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values per image.
    pub fn dim(&self) -> usize {
        self.images.ncols()
    }

    /// Keep only the first `n` rows.
    pub fn truncate(self, n: usize) -> Self {
        if n >= self.len() {
            return self;
        }
        Self {
            images: self.images.slice(ndarray::s![..n, ..]).to_owned(),
            labels: self.labels[..n].to_vec(),
        }
    }

    pub fn batches(
        &self,
        batch_size: usize,
        shuffle_seed: Option<u64>,
    ) -> Result<MiniBatches<'_>> {
        MiniBatches::new(self.images.view(), batch_size, shuffle_seed)
    }
}

/// Number of batches a pass over `n` rows produces.
pub fn batch_count(n: usize, batch_size: usize) -> usize {
    n.div_ceil(batch_size.max(1))
}

/// Iterator over row batches of a matrix.
#[derive(Debug, Clone)]
pub struct MiniBatches<'a> {
    data: ArrayView2<'a, f32>,
    order: Vec<usize>,
    pos: usize,
    batch_size: usize,
}

impl<'a> MiniBatches<'a> {
    /// `shuffle_seed = None` keeps row order.
    pub fn new(
        data: ArrayView2<'a, f32>,
        batch_size: usize,
        shuffle_seed: Option<u64>,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::Domain("batch_size must be >= 1"));
        }
        let mut order: Vec<usize> = (0..data.nrows()).collect();
        if let Some(seed) = shuffle_seed {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            order.shuffle(&mut rng);
        }
        Ok(Self {
            data,
            order,
            pos: 0,
            batch_size,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl Iterator for MiniBatches<'_> {
    type Item = Array2<f32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.order.len() {
            return None;
        }
        let end = (self.pos + self.batch_size).min(self.order.len());
        let batch = self.data.select(Axis(0), &self.order[self.pos..end]);
        self.pos = end;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = batch_count(self.order.len() - self.pos, self.batch_size);
        (left, Some(left))
    }
}

impl ExactSizeIterator for MiniBatches<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn indexed(n: usize, dim: usize) -> Array2<f32> {
        Array2::from_shape_fn((n, dim), |(i, k)| (i * dim + k) as f32)
    }

    #[test]
    fn last_batch_holds_the_remainder() {
        let data = indexed(71, 3);
        let sizes: Vec<usize> = MiniBatches::new(data.view(), 64, Some(7))
            .unwrap()
            .map(|b| b.nrows())
            .collect();
        assert_eq!(sizes, vec![64, 7]);
    }

    #[test]
    fn unshuffled_batches_keep_row_order() {
        let data = indexed(5, 2);
        let batches: Vec<Array2<f32>> = MiniBatches::new(data.view(), 2, None).unwrap().collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].row(0)[0], 0.0);
        assert_eq!(batches[2].nrows(), 1);
        assert_eq!(batches[2].row(0)[0], 8.0);
    }

    #[test]
    fn same_seed_same_order() {
        let data = indexed(40, 1);
        let a: Vec<Array2<f32>> = MiniBatches::new(data.view(), 8, Some(3)).unwrap().collect();
        let b: Vec<Array2<f32>> = MiniBatches::new(data.view(), 8, Some(3)).unwrap().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let data = indexed(4, 1);
        assert!(matches!(
            MiniBatches::new(data.view(), 0, None),
            Err(Error::Domain(_))
        ));
    }

    #[test]
    fn image_set_checks_label_count_and_truncates() {
        assert!(ImageSet::new(Array2::zeros((3, 2)), vec![0, 1]).is_err());
        let set = ImageSet::synthetic(10, 4, 1).truncate(6);
        assert_eq!(set.len(), 6);
        assert_eq!(set.labels.len(), 6);
        assert!(set.images.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            .. ProptestConfig::default()
        })]
        #[test]
        fn prop_every_row_appears_once(
            n in 0usize..200,
            batch_size in 1usize..70,
            seed in any::<u64>(),
        ) {
            let data = indexed(n, 1);
            let it = MiniBatches::new(data.view(), batch_size, Some(seed)).unwrap();
            prop_assert_eq!(it.len(), batch_count(n, batch_size));

            let batches: Vec<Array2<f32>> = it.collect();
            let mut seen: Vec<usize> = batches
                .iter()
                .flat_map(|b| b.column(0).to_vec())
                .map(|v| v as usize)
                .collect();
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..n).collect::<Vec<_>>());

            for (i, b) in batches.iter().enumerate() {
                if i + 1 < batches.len() {
                    prop_assert_eq!(b.nrows(), batch_size);
                } else {
                    let rem = n % batch_size;
                    prop_assert_eq!(b.nrows(), if rem == 0 { batch_size } else { rem });
                }
            }
        }
    }
}
