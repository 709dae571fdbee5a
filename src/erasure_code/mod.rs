mod block;
mod rs_codec;
mod xor;

pub use block::Block;
pub use rs_codec::RsCodec;
pub use xor::{xor, xor_into};
