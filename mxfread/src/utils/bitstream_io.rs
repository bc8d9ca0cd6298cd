//! Bit-level I/O for packed metadata payloads.
//!
//! Fields are stored big-endian and MSB first, the convention shared by
//! RDD-6 and the AC-3 bitstream information it mirrors.

use std::io;
use std::io::SeekFrom;

use bitstream_io::{
    BigEndian, BitRead, BitReader, BitWrite, BitWriter, SignedInteger, UnsignedInteger,
};

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read + io::Seek> {
    bs: BitReader<R, BigEndian>,
    len: u64,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

impl<R> BitstreamIoReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
        }
    }

    fn out_of_bounds(&mut self, op: &str, n: u32) -> io::Error {
        io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "{op}({n}): out of bounds bits at {}",
                self.bs.position_in_bits().unwrap_or(0)
            ),
        )
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        if self.available()? == 0 {
            return Err(self.out_of_bounds("get", 1));
        }
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        if n as u64 > self.available()? {
            return Err(self.out_of_bounds("get_n", n));
        }
        self.bs.read_unsigned_var(n)
    }

    #[inline(always)]
    pub fn get_s<S: SignedInteger>(&mut self, n: u32) -> io::Result<S> {
        if n as u64 > self.available()? {
            return Err(self.out_of_bounds("get_s", n));
        }
        self.bs.read_signed_var(n)
    }

    pub fn get_bytes(&mut self, n: usize) -> io::Result<Vec<u8>> {
        if (n as u64) << 3 > self.available()? {
            return Err(self.out_of_bounds("get_bytes", (n as u32) << 3));
        }
        let mut buf = vec![0; n];
        self.bs.read_bytes(&mut buf)?;
        Ok(buf)
    }

    #[inline(always)]
    pub fn seek(&mut self, offset: i64) -> io::Result<u64> {
        if (offset < 0 && self.position()? as i64 + offset >= 0)
            || (offset >= 0 && self.available()? as i64 >= offset)
        {
            return self.bs.seek_bits(SeekFrom::Current(offset));
        }

        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "seek({}): out of bounds bits at {}",
                offset,
                self.position()?
            ),
        ))
    }

    /// Remaining bits.
    #[inline(always)]
    pub fn available(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits().map(|pos| self.len - pos)
    }

    /// Remaining whole bytes.
    #[inline(always)]
    pub fn available_bytes(&mut self) -> io::Result<u64> {
        self.available().map(|bits| bits >> 3)
    }

    #[inline(always)]
    pub fn skip_n(&mut self, n: u32) -> io::Result<()> {
        if n as u64 > self.available()? {
            return Err(self.out_of_bounds("skip_n", n));
        }
        self.bs.skip(n)
    }

    #[inline(always)]
    pub fn byte_align(&mut self) {
        self.bs.byte_align();
    }

    #[inline(always)]
    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        let len = buf.len() as u64;
        let read = io::Cursor::new(buf);

        Self::new(read, len)
    }
}

impl Default for BsIoSliceReader<'_> {
    fn default() -> Self {
        Self::from_slice(&[])
    }
}

/// Growable big-endian bit writer.
///
/// Writes never fail for lack of space. Callers are expected to have range
/// checked every value against its field width before packing it.
pub struct BitstreamIoWriter<W: io::Write> {
    bs: BitWriter<W, BigEndian>,
    bits: u64,
}

pub type BsIoVecWriter = BitstreamIoWriter<Vec<u8>>;

impl<W> BitstreamIoWriter<W>
where
    W: io::Write,
{
    pub fn new(write: W) -> Self {
        Self {
            bs: BitWriter::endian(write, BigEndian),
            bits: 0,
        }
    }

    #[inline(always)]
    pub fn put(&mut self, bit: bool) -> io::Result<()> {
        self.bs.write_bit(bit)?;
        self.bits += 1;
        Ok(())
    }

    #[inline(always)]
    pub fn put_n<I: UnsignedInteger>(&mut self, n: u32, value: I) -> io::Result<()> {
        self.bs.write_unsigned_var(n, value)?;
        self.bits += n as u64;
        Ok(())
    }

    #[inline(always)]
    pub fn put_s<S: SignedInteger>(&mut self, n: u32, value: S) -> io::Result<()> {
        self.bs.write_signed_var(n, value)?;
        self.bits += n as u64;
        Ok(())
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.bs.write_bytes(bytes)?;
        self.bits += (bytes.len() as u64) << 3;
        Ok(())
    }

    /// Pads with zero bits up to the next byte boundary.
    pub fn byte_align(&mut self) -> io::Result<()> {
        let pad = ((8 - (self.bits & 7)) & 7) as u32;
        if pad > 0 {
            self.put_n::<u8>(pad, 0)?;
        }
        Ok(())
    }

    #[inline(always)]
    pub fn position(&self) -> u64 {
        self.bits
    }

    /// Aligns the stream and returns the underlying writer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.byte_align()?;
        Ok(self.bs.into_writer())
    }
}

impl BsIoVecWriter {
    pub fn with_vec() -> Self {
        Self::new(Vec::new())
    }

    pub fn into_bytes(self) -> io::Result<Vec<u8>> {
        self.into_inner()
    }
}

impl Default for BsIoVecWriter {
    fn default() -> Self {
        Self::with_vec()
    }
}
