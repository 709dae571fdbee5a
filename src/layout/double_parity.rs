use super::ParityLayout;

/// `k × (k+2)` grid: `k` data columns, one simple-parity column, one
/// double-parity column, row-major flattened.
///
/// Grounded on `original_source/fst/io/RaidDpFile.cc`: the column layout
/// matches `GetSimpleParityIndices`/`GetDoubleParityIndices`. `diagonal_stripe`
/// assigns each cell a diagonal id `(row + col) mod (k+1)` over the `k` data
/// columns plus the simple-parity column treated as a `(k+1)`-th virtual
/// column; the double-parity cell of row `r` stores diagonal `r`, leaving
/// diagonal `k` uncovered. This is a from-scratch but behavior-preserving
/// reading of the source's flat-pointer `jump = k + 3` walk (per spec §9 Open
/// Question 2, which explicitly calls for validating the construction
/// exhaustively rather than trusting the source's arithmetic for arbitrary
/// `k`); every non-omitted diagonal has exactly `k + 1` members and the
/// omitted one is, as required, the one containing the block at index `k`.
pub struct DoubleParity {
    k: usize,
}

impl DoubleParity {
    pub fn new(k: usize) -> Self {
        assert!(k > 0, "k must be positive");
        Self { k }
    }

    fn width(&self) -> usize {
        self.k + 2
    }

    fn is_double_parity_cell(&self, i: usize) -> bool {
        i % self.width() == self.k + 1
    }

    /// Diagonal id of the cell at `(row, col)`, `col` in `[0, k]` (`k` itself
    /// names the simple-parity column).
    fn diagonal_id(&self, row: usize, col: usize) -> usize {
        (row + col) % (self.k + 1)
    }
}

impl ParityLayout for DoubleParity {
    fn k(&self) -> usize {
        self.k
    }

    fn group_block_count(&self) -> usize {
        self.k * self.width()
    }

    fn simple_parity_indices(&self) -> Vec<usize> {
        let width = self.width();
        (0..self.k).map(|r| r * width + self.k).collect()
    }

    fn double_parity_indices(&self) -> Vec<usize> {
        let width = self.width();
        (0..self.k).map(|r| r * width + self.k + 1).collect()
    }

    fn small_to_big(&self, i: usize) -> usize {
        let k = self.k;
        (i / k) * self.width() + i % k
    }

    fn big_to_small(&self, i: usize) -> Option<usize> {
        let width = self.width();
        let col = i % width;
        (col < self.k).then(|| (i / width) * self.k + col)
    }

    fn diagonal_stripe(&self, i: usize) -> Vec<usize> {
        let k = self.k;
        let width = self.width();
        let row = i / width;
        let col = i % width;

        let d = if col == k + 1 {
            // the double-parity cell of row r stores diagonal r
            row
        } else {
            self.diagonal_id(row, col)
        };

        if d == k {
            return Vec::new();
        }

        let mut members: Vec<usize> = (0..k)
            .map(|r| {
                let col = (d + k + 1 - r) % (k + 1);
                r * width + col
            })
            .collect();
        members.push(d * width + k + 1);
        members
    }

    fn horizontal_stripe(&self, i: usize) -> Vec<usize> {
        if self.is_double_parity_cell(i) {
            return Vec::new();
        }
        let width = self.width();
        let row = i / width;
        (0..width)
            .filter(|&c| c != self.k + 1)
            .map(|c| row * width + c)
            .collect()
    }
}
