use super::ParityLayout;

/// Trivial layout: a single row of `k` data blocks followed by `m` parity
/// blocks, flat index equal to logical index. Grounded on
/// `original_source/fst/io/ReedSFile.cc`'s identity `MapSmallToBig`.
pub struct ReedSolomon {
    k: usize,
    m: usize,
}

impl ReedSolomon {
    pub fn new(k: usize, m: usize) -> Self {
        assert!(k > 0, "k must be positive");
        assert!(m > 0, "m must be positive");
        Self { k, m }
    }

    pub fn m(&self) -> usize {
        self.m
    }
}

impl ParityLayout for ReedSolomon {
    fn k(&self) -> usize {
        self.k
    }

    fn group_block_count(&self) -> usize {
        self.k + self.m
    }

    fn simple_parity_indices(&self) -> Vec<usize> {
        (self.k..self.k + self.m).collect()
    }

    fn double_parity_indices(&self) -> Vec<usize> {
        Vec::new()
    }

    fn small_to_big(&self, i: usize) -> usize {
        i
    }

    fn big_to_small(&self, i: usize) -> Option<usize> {
        (i < self.k).then_some(i)
    }

    fn diagonal_stripe(&self, _i: usize) -> Vec<usize> {
        Vec::new()
    }

    fn horizontal_stripe(&self, _i: usize) -> Vec<usize> {
        Vec::new()
    }
}
