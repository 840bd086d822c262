//! # Minicompressor
//!
//! Compress and expand files with two minimal static formats: a static
//! Huffman code (`huffman`) and a sliding-window LZSS code (`lzss`).
//! Both formats are fully self-describing bit streams with no file
//! header, magic number, or version field, and both round-trip any
//! finite byte sequence exactly.
//!
//! The bit-granular packing shared by the two codecs lives in
//! `tools::bit_stream`.

pub mod tools;
pub mod huffman;
pub mod lzss;

type DYNERR = Box<dyn std::error::Error>;

/// Coding errors
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("bit stream ended before a required field")]
    Truncated,
    #[error("file format mismatch")]
    FileFormatMismatch
}

/// Options controlling compression
pub struct Options {
    /// starting position in the input file
    pub in_offset: u64,
    /// starting position in the output file
    pub out_offset: u64
}

pub const STD_OPTIONS: Options = Options {
    in_offset: 0,
    out_offset: 0
};
