//! Bit-granular reading and writing over a seekable byte stream.
//!
//! Values are packed LSB-first: within a byte, bit 0 is the first bit
//! written and the first bit read.  Both coding modules use this ordering
//! on both sides, so it never leaves the crate's formats.
//!
//! The writer's `flush` materializes a partial trailing byte and then
//! steps the stream position back over it, which lets a later write OR
//! more bits into the same on-disk byte.  The reader's `read_bits_refresh`
//! does the mirror image, re-reading the byte currently parked for
//! partial consumption.

use std::io::{Read,Write,Seek,SeekFrom,ErrorKind};
use crate::DYNERR;

/// Bit-level reader/writer over any seekable byte stream.
/// Read methods need `S: Read + Seek`, write methods `S: Write + Seek`,
/// so one instance can serve a duplex-positioned stream.
pub struct BitStream<S> {
    stream: S,
    /// byte partially consumed by the reader, unread bits are the high ones
    data: u8,
    /// count of unread bits remaining in `data`, 0..=7 between calls
    data_length: u32,
    /// byte partially assembled by the writer, filled bits are the low ones
    buffer: u8,
    /// count of unfilled bit positions remaining in `buffer`, 8 when empty
    buffer_length: u32
}

impl <S> BitStream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            data: 0,
            data_length: 0,
            buffer: 0,
            buffer_length: 8
        }
    }
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl <S: Read + Seek> BitStream<S> {
    /// re-read the byte that is parked for partial consumption
    fn refresh(&mut self) -> Result<(),std::io::Error> {
        self.stream.seek(SeekFrom::Current(-1))?;
        let mut byte: [u8;1] = [0];
        self.stream.read_exact(&mut byte)?;
        self.data = byte[0];
        Ok(())
    }
    fn get_bits(&mut self,bit_count: u32,refresh: bool) -> Result<(u32,u32),std::io::Error> {
        assert!(bit_count <= 32);
        let mut bits: u64;
        let mut number_of_bits: u32;
        if self.data_length == 0 {
            bits = 0;
            number_of_bits = 0;
        } else {
            if refresh {
                self.refresh()?;
            }
            bits = (self.data >> (8 - self.data_length)) as u64;
            let n = self.data_length.min(bit_count);
            bits &= (1 << n) - 1;
            number_of_bits = n;
            self.data_length -= n;
            if self.data_length >= 1 {
                return Ok((bits as u32,number_of_bits));
            }
        }
        let mut byte: [u8;1] = [0];
        while number_of_bits < bit_count {
            match self.stream.read_exact(&mut byte) {
                Ok(()) => {
                    bits |= (byte[0] as u64) << number_of_bits;
                    number_of_bits += 8;
                },
                Err(e) if e.kind()==ErrorKind::UnexpectedEof => {
                    return Ok((bits as u32,number_of_bits));
                },
                Err(e) => {
                    return Err(e);
                }
            }
        }
        if number_of_bits > bit_count {
            self.data = byte[0];
            self.data_length = number_of_bits - bit_count;
            bits &= (1 << bit_count) - 1;
            number_of_bits = bit_count;
        }
        Ok((bits as u32,number_of_bits))
    }
    /// Read up to `bit_count` bits (at most 32), assembled LSB-first, pulling
    /// whole bytes from the stream as needed.  Returns `(value,actual_count)`;
    /// `actual_count < bit_count` means the stream ran out, and the bits
    /// obtained so far are returned.  This is the sole truncation signal.
    pub fn read_bits(&mut self,bit_count: u32) -> Result<(u32,u32),std::io::Error> {
        self.get_bits(bit_count,false)
    }
    /// Same as `read_bits`, but first re-read the byte currently parked for
    /// partial consumption, via a one-byte backward seek.  Useful when the
    /// same physical byte must be inspected more than once on a stream that
    /// is also being written.
    pub fn read_bits_refresh(&mut self,bit_count: u32) -> Result<(u32,u32),std::io::Error> {
        self.get_bits(bit_count,true)
    }
    /// Read exactly `bit_count` bits or fail with `Error::Truncated`.
    pub fn read_bits_exact(&mut self,bit_count: u32) -> Result<u32,DYNERR> {
        match self.read_bits(bit_count)? {
            (bits,n) if n==bit_count => Ok(bits),
            _ => Err(Box::new(crate::Error::Truncated))
        }
    }
}

impl <S: Write + Seek> BitStream<S> {
    /// Append the low `bit_count` bits of `bits` (at most 32), LSB-first.
    /// Whole bytes are written to the stream as they fill; a sub-byte
    /// remainder stays buffered until more bits arrive or `flush` is called.
    pub fn write_bits(&mut self,bits: u32,bit_count: u32) -> Result<(),std::io::Error> {
        assert!(bit_count <= 32);
        let mut bits = match bit_count {
            32 => bits as u64,
            n => bits as u64 & ((1 << n) - 1)
        };
        let mut bit_count = bit_count;
        if self.buffer_length < 8 {
            self.buffer |= ((bits << (8 - self.buffer_length)) & 0xff) as u8;
            let n = self.buffer_length.min(bit_count);
            self.buffer_length -= n;
            if self.buffer_length == 0 {
                bits >>= n;
                bit_count -= n;
                self.stream.write_all(&[self.buffer])?;
                self.buffer = 0;
                self.buffer_length = 8;
            } else {
                return Ok(());
            }
        }
        while bit_count >= 8 {
            self.stream.write_all(&[(bits & 0xff) as u8])?;
            bits >>= 8;
            bit_count -= 8;
        }
        if bit_count >= 1 {
            self.buffer = bits as u8;
            self.buffer_length = 8 - bit_count;
        }
        Ok(())
    }
    /// If a partial byte is buffered, write it out (unfilled high positions
    /// are zero) and step the stream position back over it, so that a
    /// subsequent write can OR further bits into the same on-disk byte.
    pub fn flush(&mut self) -> Result<(),std::io::Error> {
        if self.buffer_length < 8 {
            self.stream.write_all(&[self.buffer])?;
            self.stream.seek(SeekFrom::Current(-1))?;
        }
        Ok(())
    }
}

#[test]
fn write_read_round_trip() {
    use std::io::Cursor;
    let sequence: Vec<(u32,u32)> = vec![
        (0b101,3),(0xabcd,16),(1,1),(0,0),(0x12345678,32),(0x3f,7)
    ];
    let mut buf: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    let mut bits = BitStream::new(&mut buf);
    for (value,width) in &sequence {
        bits.write_bits(*value,*width).expect("write failed");
    }
    bits.flush().expect("flush failed");
    drop(bits);
    buf.set_position(0);
    let mut bits = BitStream::new(&mut buf);
    for (value,width) in &sequence {
        assert_eq!(bits.read_bits(*width).expect("read failed"),(*value,*width));
    }
}

#[test]
fn truncated_read_reports_actual_count() {
    use std::io::Cursor;
    let mut src = Cursor::new(vec![0xff,0xff]);
    let mut bits = BitStream::new(&mut src);
    assert_eq!(bits.read_bits(12).expect("read failed"),(0xfff,12));
    // only 4 bits physically remain
    assert_eq!(bits.read_bits(8).expect("read failed"),(0xf,4));
    assert_eq!(bits.read_bits(1).expect("read failed"),(0,0));
}

#[test]
fn flush_rewrites_partial_byte() {
    use std::io::Cursor;
    let mut buf: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    {
        let mut bits = BitStream::new(&mut buf);
        bits.write_bits(1,1).expect("write failed");
        bits.flush().expect("flush failed");
        // the second write must land in the same on-disk byte
        bits.write_bits(1,1).expect("write failed");
        bits.flush().expect("flush failed");
    }
    assert_eq!(buf.into_inner(),vec![0x03]);
}

#[test]
fn refresh_rereads_parked_byte() {
    use std::io::Cursor;
    let mut src = Cursor::new(vec![0x21]);
    let mut bits = BitStream::new(&mut src);
    assert_eq!(bits.read_bits(4).expect("read failed"),(0x1,4));
    // mutate the byte underneath the parked upper half
    bits.get_mut().get_mut()[0] = 0x31;
    assert_eq!(bits.read_bits_refresh(4).expect("read failed"),(0x3,4));
}
