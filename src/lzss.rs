//! LZSS Compression
//!
//! Sliding-window compression with binary-tree match finding.  The window
//! holds the last 4K of data; runs that occurred before are replaced by a
//! (position,length) reference into the window.  Match finding keeps one
//! binary search tree per possible first byte, whose nodes are window
//! positions ordered by the bytes that follow them; searching for a match
//! and registering the current position are a single combined walk.
//!
//! The token stream is literals (`1` + 8 bits) and references (`0` +
//! 12-bit position + 4-bit length), terminated by a reference whose
//! position equals the decoder's cursor, which no real match can produce.

use std::io::{Cursor,Read,Write,Seek,SeekFrom,BufReader,BufWriter,ErrorKind};
use crate::tools::bit_stream::BitStream;
use crate::DYNERR;

// LZSS coding constants

const POSITION_BITS: u32 = 12; // window position field width
const LENGTH_BITS: u32 = 4; // length field width
const WINDOW_LENGTH: usize = 1 << POSITION_BITS;
/// smallest match for which a reference is no larger than the literals it replaces
const MIN_WORD_LENGTH: usize = ((POSITION_BITS + LENGTH_BITS + 7) / 8) as usize;
/// largest length the encoded length field can carry
const MAX_WORD_LENGTH: usize = MIN_WORD_LENGTH + (1 << LENGTH_BITS) - 1;

/// a match into the window
struct Word {
    position: usize,
    length: usize
}

/// link from a tree node to the structure above it
#[derive(Clone,Copy,PartialEq)]
enum Parent {
    /// not a member of any tree
    Detached,
    /// the root of its first-byte tree
    Root,
    /// child of the given node
    Node(usize)
}

/// Match index over the window: one binary search tree per first byte,
/// whose nodes are window positions ordered lexicographically by the
/// bytes starting there.  A position belongs to at most one tree.
struct Dictionary {
    roots: [Option<usize>;256],
    parent: Vec<Parent>,
    left: Vec<Option<usize>>,
    right: Vec<Option<usize>>
}

impl Dictionary {
    fn new() -> Self {
        Self {
            roots: [None;256],
            parent: vec![Parent::Detached;WINDOW_LENGTH],
            left: vec![None;WINDOW_LENGTH],
            right: vec![None;WINDOW_LENGTH]
        }
    }
    /// Give `new` the tree position of `old`: parent link, both children,
    /// and the back-links of all three.  `old` is left dangling.
    fn transplant(&mut self,window: &[u8],old: usize,new: usize) {
        match self.parent[old] {
            Parent::Root => self.roots[window[old] as usize] = Some(new),
            Parent::Node(p) => {
                if self.left[p] == Some(old) {
                    self.left[p] = Some(new);
                } else {
                    self.right[p] = Some(new);
                }
            },
            Parent::Detached => panic!("transplanting a detached node")
        }
        self.parent[new] = self.parent[old];
        self.left[new] = self.left[old];
        if let Some(child) = self.left[old] {
            self.parent[child] = Parent::Node(new);
        }
        self.right[new] = self.right[old];
        if let Some(child) = self.right[old] {
            self.parent[child] = Parent::Node(new);
        }
    }
    /// Search the tree for the first byte at window position `x`, holding
    /// `word_length` valid lookahead bytes, and register `x` in the same
    /// walk.  Returns the longest match seen, or None if this byte value
    /// has no tree yet.  A node matching the full lookahead is replaced by
    /// `x` in place, since its own content is about to go stale.
    fn match_and_insert(&mut self,window: &[u8],x: usize,word_length: usize) -> Option<Word> {
        let mut y = match self.roots[window[x] as usize] {
            Some(root) => root,
            None => {
                self.roots[window[x] as usize] = Some(x);
                self.parent[x] = Parent::Root;
                self.left[x] = None;
                self.right[x] = None;
                return None;
            }
        };
        let mut best = Word { position: 0, length: 0 };
        let mut delta: i32;
        loop {
            let mut i = 1;
            delta = 0;
            // on exit `i` is the count of matching bytes and `delta` the
            // ordering of the first mismatch
            while i < word_length {
                delta = window[x+i] as i32 - window[y+i] as i32;
                if delta != 0 {
                    break;
                }
                i += 1;
            }
            if i > best.length {
                best = Word { position: y, length: i };
            }
            if delta == 0 {
                break;
            }
            let link = match delta < 0 {
                true => self.left[y],
                false => self.right[y]
            };
            match link {
                Some(next) => y = next,
                None => break
            }
        }
        if delta == 0 {
            self.transplant(window,y,x);
            self.parent[y] = Parent::Detached;
        } else {
            if delta < 0 {
                self.left[y] = Some(x);
            } else {
                self.right[y] = Some(x);
            }
            self.parent[x] = Parent::Node(y);
            self.left[x] = None;
            self.right[x] = None;
        }
        Some(best)
    }
    /// Remove window position `x` from whichever tree holds it, if any.
    /// A node with two children is replaced by its in-order predecessor,
    /// the rightmost node of its left branch.
    fn remove(&mut self,window: &[u8],x: usize) {
        if self.parent[x] == Parent::Detached {
            return;
        }
        let (y,z) = if self.left[x].is_none() {
            (x,self.right[x])
        } else if self.right[x].is_none() {
            (x,self.left[x])
        } else {
            let mut y = self.left[x].unwrap();
            while let Some(next) = self.right[y] {
                y = next;
            }
            (y,self.left[y])
        };
        let w = self.parent[y];
        match w {
            Parent::Root => self.roots[window[y] as usize] = z,
            Parent::Node(p) => {
                if self.left[p] == Some(y) {
                    self.left[p] = z;
                } else {
                    self.right[p] = z;
                }
            },
            Parent::Detached => panic!("removing a detached node")
        }
        if let Some(child) = z {
            self.parent[child] = w;
        }
        if y != x {
            self.transplant(window,x,y);
        }
        self.parent[x] = Parent::Detached;
    }
}

/// read a single byte, None at end of data
fn fetch_byte<R: Read>(reader: &mut R) -> Result<Option<u8>,std::io::Error> {
    let mut byte: [u8;1] = [0];
    match reader.read_exact(&mut byte) {
        Ok(()) => Ok(Some(byte[0])),
        Err(e) if e.kind()==ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e)
    }
}

/// Store a byte at the cursor and advance.  Positions below
/// `MAX_WORD_LENGTH` are mirrored past the wrap point so a match running
/// over the window edge can be read without wrapping.
fn push_byte(window: &mut [u8],pos: usize,byte: u8) -> usize {
    window[pos] = byte;
    if pos < MAX_WORD_LENGTH {
        window[WINDOW_LENGTH + pos] = byte;
    }
    (pos + 1) % WINDOW_LENGTH
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

    let mut bits = BitStream::new(&mut writer);
    let mut window = vec![0;WINDOW_LENGTH + MAX_WORD_LENGTH];
    let mut dictionary = Dictionary::new();
    let mut i: usize = 0; // oldest position still in play
    let mut j: usize = 0; // newest position filled

    log::debug!("fill the lookahead");
    while j < MAX_WORD_LENGTH {
        match fetch_byte(&mut reader)? {
            Some(byte) => {
                window[j] = byte;
                j += 1;
            },
            None => break
        }
    }

    log::debug!("entering main loop");
    let mut skips: usize = 0;
    loop {
        let data_length = (j + WINDOW_LENGTH - i) % WINDOW_LENGTH;
        if data_length == 0 {
            break;
        }
        let found = dictionary.match_and_insert(&window,i,data_length);
        if skips == 0 {
            match found {
                Some(word) if word.length >= MIN_WORD_LENGTH => {
                    log::trace!("match at {} length {}",word.position,word.length);
                    skips = word.length - 1;
                    bits.write_bits(0,1)?;
                    bits.write_bits(word.position as u32,POSITION_BITS)?;
                    bits.write_bits((word.length - MIN_WORD_LENGTH) as u32,LENGTH_BITS)?;
                },
                _ => {
                    log::trace!("literal {}",window[i]);
                    bits.write_bits(1,1)?;
                    bits.write_bits(window[i] as u32,8)?;
                }
            }
        } else {
            skips -= 1;
        }
        i = (i + 1) % WINDOW_LENGTH;
        if data_length == MAX_WORD_LENGTH {
            if let Some(byte) = fetch_byte(&mut reader)? {
                // this slot stops being a search target before it is overwritten
                dictionary.remove(&window,j);
                j = push_byte(&mut window,j,byte);
            }
        }
    }
    // the cursor position can never be a real match, it marks end of data
    bits.write_bits(0,1)?;
    bits.write_bits(i as u32,POSITION_BITS)?;
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
    let mut window = vec![0;WINDOW_LENGTH + MAX_WORD_LENGTH];
    let mut i: usize = 0;

    log::debug!("entering main loop");
    loop {
        if bits.read_bits_exact(1)? == 1 {
            let byte = bits.read_bits_exact(8)? as u8;
            writer.write_all(&[byte])?;
            i = push_byte(&mut window,i,byte);
        } else {
            let position = bits.read_bits_exact(POSITION_BITS)? as usize;
            if position == i {
                break;
            }
            let word_length = bits.read_bits_exact(LENGTH_BITS)? as usize + MIN_WORD_LENGTH;
            log::trace!("match at {} length {}",position,word_length);
            // forward byte at a time, source and destination may overlap
            for k in position..position + word_length {
                let byte = window[k];
                writer.write_all(&[byte])?;
                i = push_byte(&mut window,i,byte);
            }
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
    // one literal, one self-overlapping reference of length 9, terminator
    let test_data = "AAAAAAAAAA".as_bytes();
    let compressed = compress_slice(test_data,&crate::STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode("8300c05100").unwrap());
    let expanded = expand_slice(&compressed,&crate::STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);

    // empty input is the terminator token alone
    let compressed = compress_slice(&[],&crate::STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode("0000").unwrap());
    let expanded = expand_slice(&compressed,&crate::STD_OPTIONS).expect("expansion failed");
    assert_eq!(expanded.len(),0);
}

#[test]
fn invertibility() {
    let test_data = "I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes();
    let compressed = compress_slice(test_data,&crate::STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed,&crate::STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);

    let test_data = "1234567".as_bytes();
    let compressed = compress_slice(test_data,&crate::STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed,&crate::STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data.to_vec(),expanded);
}

#[test]
fn invertibility_beyond_window() {
    // repeating cycle longer than the whole window, exercises the wrap,
    // the mirror region, and dictionary removal
    let mut test_data = Vec::new();
    for i in 0..(WINDOW_LENGTH + WINDOW_LENGTH/4) {
        test_data.push((i % 256) as u8);
    }
    let compressed = compress_slice(&test_data,&crate::STD_OPTIONS).expect("compression failed");
    let expanded = expand_slice(&compressed,&crate::STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
fn long_run_is_bounded() {
    let test_data = vec![b'x';1000];
    let compressed = compress_slice(&test_data,&crate::STD_OPTIONS).expect("compression failed");
    // one literal plus about 999/17 references
    assert!(compressed.len() < 200);
    let expanded = expand_slice(&compressed,&crate::STD_OPTIONS).expect("expansion failed");
    assert_eq!(test_data,expanded);
}

#[test]
fn removed_positions_are_not_matched() {
    let mut window = vec![0;WINDOW_LENGTH + MAX_WORD_LENGTH];
    window[..4].copy_from_slice("abca".as_bytes());
    let mut dictionary = Dictionary::new();
    assert!(dictionary.match_and_insert(&window,0,3).is_none());
    dictionary.remove(&window,0);
    // the tree for 'a' is empty again, position 3 starts it over
    assert!(dictionary.match_and_insert(&window,3,3).is_none());
}

#[test]
fn removing_a_two_child_root() {
    let mut window = vec![0;WINDOW_LENGTH + MAX_WORD_LENGTH];
    window[..8].copy_from_slice("abacaaad".as_bytes());
    let mut dictionary = Dictionary::new();
    assert!(dictionary.match_and_insert(&window,0,2).is_none()); // root "ab"
    assert!(dictionary.match_and_insert(&window,2,2).is_some()); // right child "ac"
    assert!(dictionary.match_and_insert(&window,4,2).is_some()); // left child "aa"
    dictionary.remove(&window,0);
    assert!(dictionary.parent[0] == Parent::Detached);
    // the predecessor became the root, and the search never sees position 0
    let word = dictionary.match_and_insert(&window,6,2).expect("tree should not be empty");
    assert_eq!(word.position,4);
}
