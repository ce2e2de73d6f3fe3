//! Character Vocabulary
//!
//! Maps every distinct character of a corpus to a dense index in
//! `[0, vocab_size)` and back. There is no frequency cut-off and no unknown
//! token: a symbol that was not in the corpus is an error at encode time.
//!
//! Indices are assigned in sorted character order, so building twice from
//! the same text always yields the same mapping. The training windows and
//! the decoder must share one `Vocabulary`.
//!
//! ```rust
//! use yorick::Vocabulary;
//!
//! let vocab = Vocabulary::build("hello").unwrap();
//! assert_eq!(vocab.size(), 4); // e, h, l, o
//! let ids = vocab.encode("hole").unwrap();
//! assert_eq!(vocab.decode(&ids), "hole");
//! ```

use crate::error::{Result, YorickError};
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct Vocabulary {
    sym2idx: HashMap<char, usize>,
    idx2sym: Vec<char>,
}

impl Vocabulary {
    /// Build the symbol index from the whole corpus
    ///
    /// Fails with a configuration error when the corpus is empty.
    pub fn build(text: &str) -> Result<Self> {
        let mut chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return Err(YorickError::config("corpus is empty, nothing to index"));
        }
        chars.sort_unstable();
        chars.dedup();

        let sym2idx = chars.iter().enumerate().map(|(i, &c)| (c, i)).collect();

        Ok(Self {
            sym2idx,
            idx2sym: chars,
        })
    }

    pub fn size(&self) -> usize {
        self.idx2sym.len()
    }

    pub fn index_of(&self, symbol: char) -> Result<usize> {
        self.sym2idx
            .get(&symbol)
            .copied()
            .ok_or(YorickError::UnknownSymbol(symbol))
    }

    pub fn symbol(&self, index: usize) -> Option<char> {
        self.idx2sym.get(index).copied()
    }

    /// Index every character of `text`
    pub fn encode(&self, text: &str) -> Result<Vec<usize>> {
        text.chars().map(|c| self.index_of(c)).collect()
    }

    /// Map indices back to text. Out-of-range indices are skipped.
    pub fn decode(&self, ids: &[usize]) -> String {
        ids.iter().filter_map(|&i| self.symbol(i)).collect()
    }

    pub fn symbols(&self) -> &[char] {
        &self.idx2sym
    }
}
