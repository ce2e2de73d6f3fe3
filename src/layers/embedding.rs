//! Embedding Lookup
//!
//! Maps symbol indices to learned vectors: row `id` of a
//! `[vocab_size, embedding_dims]` table. The backward pass scatters each
//! output-row gradient back onto the table row it was read from; rows read
//! several times in a window accumulate.

use super::init::uniform_init;
use crate::tensor::Tensor;
use rand::Rng;

pub struct TrainableEmbedding {
    pub table: Tensor,
}

impl TrainableEmbedding {
    pub fn new(vocab_size: usize, embedding_dims: usize, rng: &mut impl Rng) -> Self {
        let limit = (3.0 / embedding_dims as f32).sqrt();
        Self {
            table: Tensor::new(
                uniform_init(vocab_size * embedding_dims, limit, rng),
                vec![vocab_size, embedding_dims],
            ),
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.table.rows()
    }

    pub fn dims(&self) -> usize {
        self.table.cols()
    }

    /// Gather one row per id: `[ids.len(), embedding_dims]`
    ///
    /// # Panics
    ///
    /// Panics if an id is outside the table; ids come from the vocabulary.
    pub fn forward(&self, ids: &[usize]) -> Tensor {
        let dims = self.dims();
        let mut out = Vec::with_capacity(ids.len() * dims);
        for &id in ids {
            assert!(id < self.vocab_size(), "symbol index {} out of range", id);
            out.extend_from_slice(self.table.row(id));
        }
        Tensor::new(out, vec![ids.len(), dims])
    }

    /// Add `grad_out` (`[ids.len(), dims]`) into `grad_table` at the looked-up rows
    pub fn backward(&self, grad_table: &mut Tensor, ids: &[usize], grad_out: &Tensor) {
        let dims = self.dims();
        for (r, &id) in ids.iter().enumerate() {
            let dst = &mut grad_table.data[id * dims..(id + 1) * dims];
            for (d, &g) in dst.iter_mut().zip(grad_out.row(r)) {
                *d += g;
            }
        }
    }
}
