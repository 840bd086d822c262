//! Tools shared by the compression modules

pub mod bit_stream;
