//! Static Huffman Coding
//!
//! Two-pass compression with a single static code: the first pass counts
//! byte frequencies, the second emits one variable-length code per byte.
//! The encoded stream is self-describing, in order: the serialized tree,
//! the symbol count, then the code stream.  There is no header or magic
//! number, and trailing pad bits in the final byte are ignored by the
//! decoder, which stops after the promised number of symbols.
//!
//! Degenerate alphabets are handled: with one distinct byte value the lone
//! leaf is the root and every code is zero bits long, and empty input is
//! coded as a one-leaf tree with a count of zero.

use std::io::{Cursor,Read,Write,Seek,SeekFrom,BufReader,BufWriter,ErrorKind};
use std::collections::BinaryHeap;
use std::cmp::Reverse;
use crate::tools::bit_stream::BitStream;
use crate::DYNERR;

// Node ids: 0..LEAF_COUNT are leaves (id = byte value), the rest are
// internal nodes in creation order.

const LEAF_COUNT: usize = 256;
const NODE_COUNT: usize = 2*LEAF_COUNT - 1;

fn is_leaf(id: usize) -> bool {
    id < LEAF_COUNT
}

/// Full binary tree over the byte alphabet, nodes addressed by id.
/// Child entries are meaningful only for internal ids, and are always
/// assigned when the internal node is created.
struct Tree {
    root: usize,
    left: Vec<usize>,
    right: Vec<usize>
}

/// count occurrences of each byte value from here to the end of the stream
fn tally_weights<R: Read>(reader: &mut R) -> Result<[u64;LEAF_COUNT],std::io::Error> {
    let mut weights = [0;LEAF_COUNT];
    let mut byte: [u8;1] = [0];
    loop {
        match reader.read_exact(&mut byte) {
            Ok(()) => weights[byte[0] as usize] += 1,
            Err(e) if e.kind()==ErrorKind::UnexpectedEof => return Ok(weights),
            Err(e) => return Err(e)
        }
    }
}

/// Build the tree by repeatedly merging the two lightest entries.
/// Ties are broken by the smaller id, so output is deterministic.
fn build_tree(weights: &[u64;LEAF_COUNT]) -> Tree {
    let mut left = vec![0;NODE_COUNT];
    let mut right = vec![0;NODE_COUNT];
    let mut heap: BinaryHeap<Reverse<(u64,usize)>> = BinaryHeap::new();
    for (id,weight) in weights.iter().enumerate() {
        if *weight >= 1 {
            heap.push(Reverse((*weight,id)));
        }
    }
    // alphabets of less than two symbols skip the merge loop, the lone
    // leaf (or leaf 0 for empty input) is the whole tree
    if heap.len() < 2 {
        let root = match heap.pop() {
            Some(Reverse((_,id))) => id,
            None => 0
        };
        return Tree { root, left, right };
    }
    let mut next_id = LEAF_COUNT;
    loop {
        let Reverse((left_weight,left_id)) = heap.pop().unwrap();
        let Reverse((right_weight,right_id)) = heap.pop().unwrap();
        let id = next_id;
        next_id += 1;
        left[id] = left_id;
        right[id] = right_id;
        if heap.is_empty() {
            return Tree { root: id, left, right };
        }
        heap.push(Reverse((left_weight + right_weight,id)));
    }
}

/// serialize pre-order: `1` + 8-bit value per leaf, `0` per internal node
fn dump_tree<S: Write + Seek>(tree: &Tree,id: usize,bits: &mut BitStream<S>) -> Result<(),std::io::Error> {
    if is_leaf(id) {
        bits.write_bits(1,1)?;
        bits.write_bits(id as u32,8)
    } else {
        bits.write_bits(0,1)?;
        dump_tree(tree,tree.left[id],bits)?;
        dump_tree(tree,tree.right[id],bits)
    }
}

fn load_node<S: Read + Seek>(bits: &mut BitStream<S>,left: &mut [usize],right: &mut [usize],next_id: &mut usize) -> Result<usize,DYNERR> {
    match bits.read_bits_exact(1)? {
        1 => Ok(bits.read_bits_exact(8)? as usize),
        _ => {
            if *next_id >= NODE_COUNT {
                log::error!("tree has more nodes than the alphabet allows");
                return Err(Box::new(crate::Error::FileFormatMismatch));
            }
            let id = *next_id;
            *next_id += 1;
            left[id] = load_node(bits,left,right,next_id)?;
            right[id] = load_node(bits,left,right,next_id)?;
            Ok(id)
        }
    }
}

fn load_tree<S: Read + Seek>(bits: &mut BitStream<S>) -> Result<Tree,DYNERR> {
    let mut left = vec![0;NODE_COUNT];
    let mut right = vec![0;NODE_COUNT];
    let mut next_id = LEAF_COUNT;
    let root = load_node(bits,&mut left,&mut right,&mut next_id)?;
    Ok(Tree { root, left, right })
}

/// Emit the symbol count as 8-bit groups, each followed by a continuation
/// bit, `1` meaning this was the last group.  At least one group is always
/// emitted, even for a count of zero.
fn dump_size<S: Write + Seek>(mut size: u64,bits: &mut BitStream<S>) -> Result<(),std::io::Error> {
    loop {
        bits.write_bits((size & 0xff) as u32,8)?;
        size >>= 8;
        if size == 0 {
            return bits.write_bits(1,1);
        }
        bits.write_bits(0,1)?;
    }
}

fn load_size<S: Read + Seek>(bits: &mut BitStream<S>) -> Result<u64,DYNERR> {
    let mut size: u64 = 0;
    let mut shift = 0;
    loop {
        let group = bits.read_bits_exact(8)? as u64;
        if shift < 64 {
            size |= group << shift;
        } else if group != 0 {
            log::error!("symbol count field is too wide");
            return Err(Box::new(crate::Error::FileFormatMismatch));
        }
        shift += 8;
        if bits.read_bits_exact(1)? == 1 {
            return Ok(size);
        }
    }
}

fn assign_codes(tree: &Tree,id: usize,code: u64,length: u32,table: &mut [(u64,u32)]) {
    if is_leaf(id) {
        table[id] = (code,length);
    } else {
        assign_codes(tree,tree.left[id],code,length+1,table);
        assign_codes(tree,tree.right[id],code | (1 << length),length+1,table);
    }
}

/// Derive the code table from the tree: left is 0, right is 1, and the bit
/// closest to the root is the least significant, so the decoder's walk
/// consumes the code front to back.
fn make_code_table(tree: &Tree) -> Vec<(u64,u32)> {
    let mut table = vec![(0,0);LEAF_COUNT];
    assign_codes(tree,tree.root,0,0,&mut table);
    table
}

/// codes deeper than 32 bits go out as two writes
fn put_code<S: Write + Seek>(bits: &mut BitStream<S>,code: u64,length: u32) -> Result<(),std::io::Error> {
    if length > 32 {
        bits.write_bits(code as u32,32)?;
        bits.write_bits((code >> 32) as u32,length - 32)
    } else {
        bits.write_bits(code as u32,length)
    }
}

/// Main compression function.
/// `expanded_in` is an object with `Read` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `compressed_out` is an object with `Write` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<Vec<u8>>`.
/// Returns (in_size,out_size) or error.
pub fn compress<R,W>(expanded_in: &mut R, compressed_out: &mut W, opt: &crate::Options) -> Result<(u64,u64),DYNERR>
where R: Read + Seek, W: Write + Seek {
    let mut reader = BufReader::new(expanded_in);
    let mut writer = BufWriter::new(compressed_out);
    let mut expanded_length = reader.seek(SeekFrom::End(0))?;
    if opt.in_offset > expanded_length {
        return Err(Box::new(crate::Error::FileFormatMismatch));
    }
    expanded_length -= opt.in_offset;
    reader.seek(SeekFrom::Start(opt.in_offset))?;
    writer.seek(SeekFrom::Start(opt.out_offset))?;

    log::debug!("tally symbol frequencies");
    let weights = tally_weights(&mut reader)?;
    let tree = build_tree(&weights);
    let table = make_code_table(&tree);

    let mut bits = BitStream::new(&mut writer);
    dump_tree(&tree,tree.root,&mut bits)?;
    dump_size(expanded_length,&mut bits)?;

    log::debug!("encode {} symbols",expanded_length);
    reader.seek(SeekFrom::Start(opt.in_offset))?;
    let mut byte: [u8;1] = [0];
    for _i in 0..expanded_length {
        reader.read_exact(&mut byte)?;
        let (code,length) = table[byte[0] as usize];
        put_code(&mut bits,code,length)?;
    }
    bits.flush()?;
    drop(bits);
    writer.seek(SeekFrom::End(0))?; // final byte could be rewound
    writer.flush()?;
    Ok((expanded_length,writer.stream_position()? - opt.out_offset))
}

/// Main decompression function.
/// `compressed_in` is an object with `Read` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `expanded_out` is an object with `Write` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<Vec<u8>>`.
/// Returns (in_size,out_size) or error.
pub fn expand<R,W>(compressed_in: &mut R, expanded_out: &mut W, opt: &crate::Options) -> Result<(u64,u64),DYNERR>
where R: Read + Seek, W: Write + Seek {
    let mut reader = BufReader::new(compressed_in);
    let mut writer = BufWriter::new(expanded_out);
    let mut compressed_length = reader.seek(SeekFrom::End(0))?;
    if opt.in_offset > compressed_length {
        return Err(Box::new(crate::Error::FileFormatMismatch));
    }
    compressed_length -= opt.in_offset;
    reader.seek(SeekFrom::Start(opt.in_offset))?;
    writer.seek(SeekFrom::Start(opt.out_offset))?;

    let mut bits = BitStream::new(&mut reader);
    log::debug!("load tree");
    let tree = load_tree(&mut bits)?;
    let size = load_size(&mut bits)?;
    log::debug!("decode {} symbols",size);
    if is_leaf(tree.root) {
        // single-symbol alphabet, the codes carry no bits at all
        for _i in 0..size {
            writer.write_all(&[tree.root as u8])?;
        }
    } else {
        for _i in 0..size {
            let mut id = tree.root;
            while !is_leaf(id) {
                id = match bits.read_bits_exact(1)? {
                    0 => tree.left[id],
                    _ => tree.right[id]
                };
            }
            writer.write_all(&[id as u8])?;
        }
    }
    writer.flush()?;
    Ok((compressed_length,writer.stream_position()? - opt.out_offset))
}

/// Convenience function, calls `compress` with a slice returning a Vec
pub fn compress_slice(slice: &[u8],opt: &crate::Options) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    compress(&mut src,&mut ans,opt)?;
    Ok(ans.into_inner())
}

/// Convenience function, calls `expand` with a slice returning a Vec
pub fn expand_slice(slice: &[u8],opt: &crate::Options) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    expand(&mut src,&mut ans,opt)?;
    Ok(ans.into_inner())
}

// *************** TESTS *****************

#[test]
fn compression_works() {
    // single-symbol alphabet: 9 bits of tree, count 10, stop bit, no code bits
    let test_data = "AAAAAAAAAA".as_bytes();
    let compressed = compress_slice(test_data,&crate::STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode("831402").unwrap());

    // empty input: one-leaf tree for byte 0 and a count of zero
    let compressed = compress_slice(&[],&crate::STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode("010002").unwrap());
}

#[test]
fn invertibility() {
    let test_data = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let compressed = compress_slice(test_data,&crate::STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed,&crate::STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);

    // skewed binary alphabet
    let mut test_data = Vec::new();
    for i in 0..2000 {
        test_data.push((i % 7 * i % 256) as u8);
    }
    let compressed = compress_slice(&test_data,&crate::STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed,&crate::STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
fn degenerate_inputs_round_trip() {
    for test_data in [b"".to_vec(), b"A".to_vec(), b"AAAAAAAAAA".to_vec()] {
        let compressed = compress_slice(&test_data,&crate::STD_OPTIONS).expect("compression failed");
        let expanded = expand_slice(&compressed,&crate::STD_OPTIONS).expect("expansion failed");
        assert_eq!(test_data,expanded);
    }
}

#[test]
fn deterministic_output() {
    let test_data = "abracadabra".as_bytes();
    let first = compress_slice(test_data,&crate::STD_OPTIONS).expect("compression failed");
    let second = compress_slice(test_data,&crate::STD_OPTIONS).expect("compression failed");
    assert_eq!(first,second);
}

#[test]
fn size_field_round_trip() {
    for size in [0u64,255,256,65535,0x0123_4567_89ab] {
        let mut buf: Cursor<Vec<u8>> = Cursor::new(Vec::new());
        let mut bits = BitStream::new(&mut buf);
        dump_size(size,&mut bits).expect("write failed");
        bits.flush().expect("flush failed");
        drop(bits);
        buf.set_position(0);
        let mut bits = BitStream::new(&mut buf);
        assert_eq!(load_size(&mut bits).expect("read failed"),size);
    }
}

#[test]
fn tree_serialization_fixed_point() {
    let mut weights = [0u64;LEAF_COUNT];
    for c in "abracadabra".as_bytes() {
        weights[*c as usize] += 1;
    }
    let tree = build_tree(&weights);
    let mut buf: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    {
        let mut bits = BitStream::new(&mut buf);
        dump_tree(&tree,tree.root,&mut bits).expect("write failed");
        bits.flush().expect("flush failed");
    }
    let serialized = buf.into_inner();
    let mut src = Cursor::new(serialized.clone());
    let mut bits = BitStream::new(&mut src);
    let loaded = load_tree(&mut bits).expect("read failed");
    assert_eq!(make_code_table(&tree),make_code_table(&loaded));
    let mut buf: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    {
        let mut bits = BitStream::new(&mut buf);
        dump_tree(&loaded,loaded.root,&mut bits).expect("write failed");
        bits.flush().expect("flush failed");
    }
    assert_eq!(serialized,buf.into_inner());
}
