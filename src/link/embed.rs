//! Deterministic offline embedder.
//!
//! Feature-hashes character trigrams of the NFKC-normalized, lowercased text
//! into a fixed number of buckets, with a hash-derived sign per trigram, and
//! L2-normalizes the result. Names that share many trigrams land close
//! together, so the dense index works without a model server.
//!
//! Trigrams are hashed with SeaHash over their UTF-8 bytes. Its output is
//! fixed across platforms and toolchains, which keeps persisted index files
//! readable by any build.

use crate::graph::memory::normalize;
use crate::llm::{Embedder, LlmError};

/// Default vector width for [`HashedEmbedder`].
pub const DEFAULT_HASHED_DIM: usize = 256;

const NGRAM: usize = 3;

/// Character n-gram feature-hashing embedder.
#[derive(Debug, Clone)]
pub struct HashedEmbedder {
    dim: usize,
}

impl HashedEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

}

/// Bucket index and sign for one n-gram.
fn bucket(gram: &[char], dim: usize) -> (usize, f32) {
    let h = seahash::hash(gram.iter().collect::<String>().as_bytes());
    let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
    ((h % dim as u64) as usize, sign)
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHED_DIM)
    }
}

impl Embedder for HashedEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut padded = vec![' '];
        padded.extend(normalize(text).chars());
        padded.push(' ');

        let mut vec = vec![0.0f32; self.dim];
        if padded.len() < NGRAM {
            return Ok(vec);
        }
        for gram in padded.windows(NGRAM) {
            let (i, sign) = bucket(gram, self.dim);
            vec[i] += sign;
        }

        let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vec.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l2(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
    }

    #[test]
    fn deterministic_and_normalized() {
        let e = HashedEmbedder::default();
        let a = e.embed("Assembly Line").unwrap();
        let b = e.embed("Assembly Line").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_HASHED_DIM);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn case_and_width_insensitive() {
        let e = HashedEmbedder::default();
        assert_eq!(e.embed("ＡＢＣ").unwrap(), e.embed("abc").unwrap());
    }

    #[test]
    fn similar_names_are_closer() {
        let e = HashedEmbedder::default();
        let q = e.embed("drill press").unwrap();
        let near = e.embed("Drill Press 2").unwrap();
        let far = e.embed("quality inspection").unwrap();
        assert!(l2(&q, &near) < l2(&q, &far));
    }

    #[test]
    fn trigram_buckets_are_seahash_of_utf8() {
        let dim = 64;
        let h = seahash::hash(" a ".as_bytes());
        let slot = (h % dim as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };

        let v = HashedEmbedder::new(dim).embed("A").unwrap();
        for (i, x) in v.iter().enumerate() {
            if i == slot {
                assert_eq!(*x, sign);
            } else {
                assert_eq!(*x, 0.0);
            }
        }
        assert_eq!(bucket(&['d', 'r', 'i'], dim).0, (seahash::hash(b"dri") % 64) as usize);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let e = HashedEmbedder::new(16);
        let v = e.embed("").unwrap();
        assert_eq!(v.len(), 16);
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
