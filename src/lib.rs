//! Compressor and decompressor for PRS, the LZ77 variant used by many Sega titles
//!
//! Compressed output is byte-for-byte identical to what the traditional encoder produces
//! when using [MatchFinder::LinearScan] (the default). [MatchFinder::HashChain] is much
//! faster on large inputs and produces valid, but different, streams.
//!
//! The decoder never trusts its input: every read and every backreference is bounds
//! checked, and malformed streams are reported as a [DecompressError].

#![no_std]

mod compress;
mod decompress;
mod token;
mod util;


#[cfg(feature = "alloc")]
pub use compress::compress;
pub use compress::{max_compressed_size, CompressError, CompressState, MatchFinder};
#[cfg(feature = "alloc")]
pub use decompress::{decompress, decompress_to_vec};
pub use decompress::{decompress_to_buf, measure_decompressed_size, DecompressError};
pub use token::{tokens, Token, Tokens, MAX_COPY_LEN, MIN_INPUT_LEN, MIN_MATCH_LEN, WINDOW_SIZE};
