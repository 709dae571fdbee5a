//! Maps a group's logical block positions onto the flat `StripeBuffer`
//! index space, one implementation per coding scheme.
//!
//! Grounded on `original_source/fst/io/RaidDpFile.cc`'s `Get*ParityIndices`,
//! `Map*ToSmall`/`Map*ToBig`, `GetDiagonalStripe` and
//! `ValidHorizStripe`/`ValidDiagStripe` for the double-parity variant, and on
//! `original_source/fst/io/ReedSFile.cc`'s trivial identity mapping for the
//! Reed-Solomon variant.

mod double_parity;
mod reed_solomon;

pub use double_parity::DoubleParity;
pub use reed_solomon::ReedSolomon;

/// Translates between a group's data-cell numbering and the flat index space
/// a [`crate::stripe_buffer::StripeBuffer`] stores blocks in, and names the
/// recovery stripes a given block participates in.
pub trait ParityLayout {
    /// Number of data stripes, `k`.
    fn k(&self) -> usize;

    /// Total blocks per group, `B`.
    fn group_block_count(&self) -> usize;

    /// Flat indices of the row-local ("simple") parity cells.
    fn simple_parity_indices(&self) -> Vec<usize>;

    /// Flat indices of the diagonal ("double") parity cells. Empty for
    /// layouts without a second parity dimension.
    fn double_parity_indices(&self) -> Vec<usize>;

    /// Maps a data-only index in `[0, k · data_rows)` to its flat index.
    fn small_to_big(&self, i: usize) -> usize;

    /// Inverse of [`Self::small_to_big`]; `None` if `i` names a parity cell.
    fn big_to_small(&self, i: usize) -> Option<usize>;

    /// The set of flat indices that XOR to zero on the diagonal containing
    /// `i`, or empty if `i` lies on the diagonal no parity cell covers, or
    /// if diagonals are not meaningful for this layout.
    fn diagonal_stripe(&self, i: usize) -> Vec<usize>;

    /// The set of flat indices in the row containing `i`, excluding the
    /// double-parity cell, or empty if `i` is itself a double-parity cell
    /// or diagonals are not meaningful for this layout.
    fn horizontal_stripe(&self, i: usize) -> Vec<usize>;
}
