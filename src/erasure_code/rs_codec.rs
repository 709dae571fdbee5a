//! Systematic Reed-Solomon over GF(2^8), built on `isa-l`'s Cauchy matrix
//! helpers the same way the teacher's `erasure_code::reed_solomon::ReedSolomon`
//! is, but generalized to work directly on block slices (rather than the
//! `Stripe`/`PartialStripe` wrapper) so both coding schemes' `GroupEngine` can
//! drive it uniformly.

use crate::erasure_code::Block;
use crate::{StripeError, StripeResult};

/// A stateless, thread-safe systematic `(k, m)` Reed-Solomon codec.
///
/// A new instance is cheap to build and carries no per-call state; callers
/// acquire one per group the way the reference library expects.
pub struct RsCodec {
    k: usize,
    m: usize,
    /// encode matrix, `(k+m) * k`
    encode_mat: Vec<u8>,
    /// precomputed GF multiplication tables for the parity rows
    encode_parity_table: Vec<u8>,
}

impl RsCodec {
    /// Build a systematic `(k, m)` Reed-Solomon codec.
    pub fn new(k: usize, m: usize) -> Self {
        assert!(k > 0, "k must be positive");
        assert!(m > 0, "m must be positive");
        let total = k + m;
        let encode_mat = isa_l::gf_gen_rs_matrix(k, total);
        let encode_parity_table = isa_l::ec_init_tables_owned(k, m, &encode_mat[(k * k)..]);
        Self {
            k,
            m,
            encode_mat,
            encode_parity_table,
        }
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    #[inline]
    pub fn m(&self) -> usize {
        self.m
    }

    /// Encode the `m` parity blocks from `k` data blocks. `data` and `parity`
    /// must each hold exactly `width`-byte blocks.
    ///
    /// # Panics
    /// If `data.len() != k`, `parity.len() != m`, or any block's length
    /// does not equal `width` (a contract violation, never a caller-facing
    /// error per the component's design).
    pub fn encode(&self, data: &[Block], parity: &mut [Block], width: usize) {
        assert_eq!(data.len(), self.k, "data block count must equal k");
        assert_eq!(parity.len(), self.m, "parity block count must equal m");
        assert!(data.iter().all(|b| b.block_size() == width));
        assert!(parity.iter().all(|b| b.block_size() == width));
        isa_l::ec_encode_data(
            width,
            self.k,
            self.m,
            &self.encode_parity_table,
            data,
            parity,
        );
    }

    /// Reconstruct the blocks named in `absent_indices` from any `k` blocks
    /// of `present` (each tagged with its global index in `[0, k+m)`).
    ///
    /// Returns the recovered blocks in the same order as `absent_indices`.
    ///
    /// # Error
    /// [`StripeError::ErasureCode`] if `absent_indices.len()` is greater than
    /// `m`, or if `present` does not contain at least `k` entries, or if the
    /// derived decode matrix is not invertible (can only happen if `present`
    /// contains fewer than `k` *distinct* indices).
    pub fn decode(
        &self,
        present: &[(usize, &Block)],
        absent_indices: &[usize],
        width: usize,
    ) -> StripeResult<Vec<Block>> {
        if absent_indices.len() > self.m {
            return Err(StripeError::erasure_code(
                (file!(), line!(), column!()),
                format!(
                    "cannot decode {} blocks from {} blocks by ({}, {}) rs code",
                    absent_indices.len(),
                    present.len(),
                    self.k + self.m,
                    self.k,
                ),
            ));
        }
        if present.len() < self.k {
            return Err(StripeError::erasure_code(
                (file!(), line!(), column!()),
                format!("need at least {} present blocks, got {}", self.k, present.len()),
            ));
        }

        let k = self.k;
        let (survivor_idx, survivor_block): (Vec<_>, Vec<&Block>) = present
            .iter()
            .take(k)
            .map(|(idx, block)| (*idx, *block))
            .unzip();

        let b = self
            .encode_mat
            .chunks_exact(k)
            .enumerate()
            .filter_map(|(i, chunk)| survivor_idx.contains(&i).then_some(chunk))
            .flatten()
            .copied()
            .collect::<Vec<u8>>();
        let inv_mat = isa_l::gf_invert_matrix(b).ok_or_else(|| {
            StripeError::erasure_code(
                (file!(), line!(), column!()),
                format!("decode matrix in RS({}, {}) is not invertible", self.k + self.m, self.k),
            )
        })?;

        let mut decode_mat: Vec<u8> = vec![0_u8; k * absent_indices.len()];
        decode_mat
            .chunks_exact_mut(k)
            .zip(absent_indices.iter())
            .for_each(|(decode_vec, corrupt_idx)| {
                if *corrupt_idx < k {
                    decode_vec.copy_from_slice(&inv_mat[k * corrupt_idx..k * corrupt_idx + k]);
                } else {
                    decode_vec.iter_mut().enumerate().for_each(|(i, b)| {
                        *b = 0;
                        for j in 0..k {
                            *b ^= isa_l::gf_mul(inv_mat[j * k + i], self.encode_mat[k * corrupt_idx + j]);
                        }
                    })
                }
            });

        let decode_table = isa_l::ec_init_tables_owned(k, absent_indices.len(), decode_mat);
        let mut recovered = Block::zero_n(absent_indices.len(), width);
        isa_l::ec_encode_data(
            width,
            k,
            absent_indices.len(),
            &decode_table,
            survivor_block,
            &mut recovered,
        );
        Ok(recovered)
    }
}
