//! Byte-wise XOR primitive shared by the double-parity layout's simple and
//! double parity computation.

/// Width, in bytes, of the word the bulk of a block is XORed in.
const WORD_SIZE: usize = 16;

/// XOR `a` and `b` into `out`, `len` bytes at a time.
///
/// `out` may alias `a` or `b`. The bulk of the buffer is processed in
/// `WORD_SIZE`-byte words; a non-aligned tail is handled byte-by-byte.
///
/// # Panics
/// If `a`, `b` and `out` do not all have length `len`.
pub fn xor(a: &[u8], b: &[u8], out: &mut [u8], len: usize) {
    assert_eq!(a.len(), len);
    assert_eq!(b.len(), len);
    assert_eq!(out.len(), len);

    let whole_words = len / WORD_SIZE;
    let word_bytes = whole_words * WORD_SIZE;

    for w in 0..whole_words {
        let off = w * WORD_SIZE;
        let mut word = [0_u8; WORD_SIZE];
        for i in 0..WORD_SIZE {
            word[i] = a[off + i] ^ b[off + i];
        }
        out[off..off + WORD_SIZE].copy_from_slice(&word);
    }

    for i in word_bytes..len {
        out[i] = a[i] ^ b[i];
    }
}

/// XOR `src` into `dst` in place: `dst ^= src`.
pub fn xor_into(dst: &mut [u8], src: &[u8]) {
    assert_eq!(dst.len(), src.len());
    let len = dst.len();
    let whole_words = len / WORD_SIZE;
    let word_bytes = whole_words * WORD_SIZE;

    for w in 0..whole_words {
        let off = w * WORD_SIZE;
        for i in 0..WORD_SIZE {
            dst[off + i] ^= src[off + i];
        }
    }
    for i in word_bytes..len {
        dst[i] ^= src[i];
    }
}
