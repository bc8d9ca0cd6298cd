//! KLV file access.
//!
//! [`MxfFile`] wraps a [`ByteSource`] and reads keys, BER lengths and
//! partition-level structures. Positions are relative to the first byte of
//! the header partition pack, so any run-in preceding it is invisible to
//! callers and partition offsets can be used as file positions directly.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{Result, anyhow, bail};
use log::{debug, trace};

use crate::structs::partition::{Partition, RandomIndexPack};
use crate::utils::errors::KlvError;
use crate::utils::ul::{self, Ul};

/// Largest run-in tolerated before the header partition pack.
pub const MAX_RUN_IN_LEN: u64 = 65535;

const READ_CHUNK_LEN: u64 = 1 << 16;

/// Blocking byte stream underneath an [`MxfFile`].
pub trait ByteSource {
    /// Reads up to `buf.len()` bytes, returning 0 at end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Moves to an absolute position.
    fn seek(&mut self, pos: u64) -> io::Result<()>;

    fn tell(&self) -> u64;

    /// Current size, `None` if the source cannot tell.
    fn size(&mut self) -> io::Result<Option<u64>>;

    fn is_seekable(&self) -> bool;
}

/// Random-access source over any `Read + Seek`.
pub struct SeekableSource<R: Read + Seek> {
    inner: R,
    pos: u64,
}

impl<R: Read + Seek> SeekableSource<R> {
    pub fn new(mut inner: R) -> io::Result<Self> {
        let pos = inner.stream_position()?;
        Ok(Self { inner, pos })
    }
}

impl<R: Read + Seek> ByteSource for SeekableSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.pos = self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    // Re-queried on every call so that growing files report their new size.
    fn size(&mut self) -> io::Result<Option<u64>> {
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(self.pos))?;
        Ok(Some(end))
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// Forward-only source, e.g. a pipe. Forward seeks read and discard.
pub struct StreamSource<R: Read> {
    inner: R,
    pos: u64,
}

impl<R: Read> StreamSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, pos: 0 }
    }
}

impl<R: Read> ByteSource for StreamSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: u64) -> io::Result<()> {
        if pos < self.pos {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("cannot seek backwards from {} to {pos} on a stream", self.pos),
            ));
        }
        let want = pos - self.pos;
        let skipped = io::copy(&mut self.inner.by_ref().take(want), &mut io::sink())?;
        self.pos += skipped;
        if skipped < want {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ended while skipping",
            ));
        }
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn size(&mut self) -> io::Result<Option<u64>> {
        Ok(None)
    }

    fn is_seekable(&self) -> bool {
        false
    }
}

/// Key and length of one KLV triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kl {
    pub key: Ul,
    /// Number of bytes used by the BER length field.
    pub llen: u8,
    pub len: u64,
}

impl Kl {
    pub fn kl_size(&self) -> u64 {
        16 + self.llen as u64
    }

    pub fn total_size(&self) -> u64 {
        self.kl_size() + self.len
    }
}

pub struct MxfFile {
    source: Box<dyn ByteSource>,
    run_in: u64,
    eof: bool,
}

impl MxfFile {
    pub fn new(source: Box<dyn ByteSource>) -> Self {
        Self {
            source,
            run_in: 0,
            eof: false,
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .map_err(|e| anyhow!("failed to open {}: {e}", path.as_ref().display()))?;
        Self::from_seekable(BufReader::new(file))
    }

    pub fn from_seekable<R: Read + Seek + 'static>(reader: R) -> Result<Self> {
        Ok(Self::new(Box::new(SeekableSource::new(reader)?)))
    }

    pub fn from_stream<R: Read + 'static>(reader: R) -> Self {
        Self::new(Box::new(StreamSource::new(reader)))
    }

    pub fn is_seekable(&self) -> bool {
        self.source.is_seekable()
    }

    pub fn eof(&self) -> bool {
        self.eof
    }

    pub fn run_in(&self) -> u64 {
        self.run_in
    }

    pub fn tell(&self) -> u64 {
        self.source.tell().saturating_sub(self.run_in)
    }

    pub fn size(&mut self) -> Result<Option<u64>> {
        Ok(self
            .source
            .size()?
            .map(|size| size.saturating_sub(self.run_in)))
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        let target = pos + self.run_in;
        self.source.seek(target).map_err(|e| {
            anyhow!(KlvError::SeekFailed {
                pos,
                reason: e.to_string()
            })
        })?;
        self.eof = false;
        Ok(())
    }

    pub fn skip(&mut self, n: u64) -> Result<()> {
        let pos = self.tell();
        self.seek(pos + n)
    }

    /// Fills `buf` completely or fails with [`KlvError::UnexpectedEof`].
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.source.read(&mut buf[filled..]) {
                Ok(0) => {
                    self.eof = true;
                    bail!(KlvError::UnexpectedEof {
                        pos: self.tell(),
                        wanted: (buf.len() - filled) as u64
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Fails with [`KlvError::LengthExceedsFile`] if fewer than `n` bytes
    /// are left. Sources of unknown size always pass.
    pub fn check_len(&mut self, n: u64) -> Result<()> {
        let Some(size) = self.size()? else {
            return Ok(());
        };
        let pos = self.tell();
        let remaining = size.saturating_sub(pos);
        if n > remaining {
            bail!(KlvError::LengthExceedsFile {
                pos,
                len: n,
                remaining
            });
        }
        Ok(())
    }

    /// Reads a value of `n` bytes. On input of unknown size the buffer grows
    /// with the bytes that arrive rather than with the declared length.
    pub fn read_bytes(&mut self, n: u64) -> Result<Vec<u8>> {
        self.check_len(n)?;
        let mut buf = match self.is_seekable() {
            true => Vec::with_capacity(usize::try_from(n)?),
            false => Vec::new(),
        };
        while (buf.len() as u64) < n {
            let start = buf.len();
            let want = (n - start as u64).min(READ_CHUNK_LEN) as usize;
            buf.resize(start + want, 0);
            self.read_exact(&mut buf[start..])?;
        }
        Ok(buf)
    }

    pub fn read_k(&mut self) -> Result<Ul> {
        let mut key = [0; 16];
        self.read_exact(&mut key)?;
        Ok(Ul(key))
    }

    /// Reads a BER length, returning the field width and the value.
    pub fn read_l(&mut self) -> Result<(u8, u64)> {
        let mut first = [0; 1];
        self.read_exact(&mut first)?;
        let first = first[0];
        if first < 0x80 {
            return Ok((1, first as u64));
        }

        let count = first & 0x7F;
        if count == 0 {
            bail!(KlvError::IndefiniteLength);
        }
        if count > 8 {
            bail!(KlvError::BerLengthTooLong(count));
        }

        let mut bytes = [0; 8];
        self.read_exact(&mut bytes[..count as usize])?;
        let len = bytes[..count as usize]
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64);

        Ok((count + 1, len))
    }

    pub fn read_kl(&mut self) -> Result<Kl> {
        let key = self.read_k()?;
        let (llen, len) = self.read_l()?;
        trace!("KL {key} len {len} at {}", self.tell() - 16 - llen as u64);
        Ok(Kl { key, llen, len })
    }

    /// Reads KLs, skipping fill items, until a non-fill key is found.
    pub fn read_next_nonfiller_kl(&mut self) -> Result<Kl> {
        loop {
            let kl = self.read_kl()?;
            if !ul::is_fill(&kl.key) {
                return Ok(kl);
            }
            self.skip(kl.len)?;
        }
    }

    /// Finds the header partition pack, tolerating a run-in of up to
    /// [`MAX_RUN_IN_LEN`] bytes, and returns its KL with the file positioned
    /// at the start of the partition pack value.
    pub fn locate_header_partition(&mut self) -> Result<Kl> {
        let start = self.source.tell();
        let mut window = [0u8; 16];
        self.read_exact(&mut window)?;

        let mut consumed = 0u64;
        loop {
            let key = Ul(window);
            if ul::is_header_partition_pack(&key) {
                self.run_in = start + consumed;
                if consumed > 0 {
                    debug!("Skipped {consumed} bytes of run-in before the header partition");
                }
                let (llen, len) = self.read_l()?;
                return Ok(Kl { key, llen, len });
            }

            if consumed >= MAX_RUN_IN_LEN {
                bail!(KlvError::HeaderPartitionNotFound);
            }

            let mut next = [0; 1];
            if self.read_exact(&mut next).is_err() {
                bail!(KlvError::HeaderPartitionNotFound);
            }
            window.copy_within(1.., 0);
            window[15] = next[0];
            consumed += 1;
        }
    }

    /// Reads a partition pack value for a KL that has just been read.
    pub fn read_partition(&mut self, kl: &Kl) -> Result<Partition> {
        if !ul::is_partition_pack(&kl.key) {
            bail!(KlvError::UnexpectedKey {
                expected: "partition pack",
                found: kl.key,
            });
        }
        let value = self.read_bytes(kl.len)?;
        Partition::parse(&kl.key, &value)
    }

    /// Reads the partition pack located at `offset`.
    pub fn read_partition_at(&mut self, offset: u64) -> Result<Partition> {
        self.seek(offset)?;
        let kl = self.read_kl()?;
        self.read_partition(&kl)
    }

    /// Reads the random index pack at the end of the file, if there is one.
    ///
    /// The file position is left undefined.
    pub fn read_rip(&mut self) -> Result<Option<RandomIndexPack>> {
        let Some(size) = self.size()? else {
            return Ok(None);
        };
        if size < 4 + 17 {
            return Ok(None);
        }

        self.seek(size - 4)?;
        let mut len_bytes = [0; 4];
        self.read_exact(&mut len_bytes)?;
        let rip_len = u32::from_be_bytes(len_bytes) as u64;
        if rip_len < 17 + 4 || rip_len > size {
            return Ok(None);
        }

        self.seek(size - rip_len)?;
        let kl = self.read_kl()?;
        if !ul::is_rip(&kl.key) || kl.total_size() != rip_len {
            return Ok(None);
        }
        let value = self.read_bytes(kl.len)?;
        Ok(Some(RandomIndexPack::parse(&value)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ul::{FILL_KEY, PARTITION_KIND_HEADER, partition_pack_key};
    use std::io::Cursor;

    #[test]
    fn ber_lengths() -> Result<()> {
        let data = vec![0x05, 0x83, 0x01, 0x00, 0x00, 0x88, 0, 0, 0, 0, 0, 0, 0x01, 0x02];
        let mut file = MxfFile::from_seekable(Cursor::new(data))?;
        assert_eq!(file.read_l()?, (1, 5));
        assert_eq!(file.read_l()?, (4, 0x10000));
        assert_eq!(file.read_l()?, (9, 0x0102));
        assert!(file.read_l().is_err());
        assert!(file.eof());
        Ok(())
    }

    #[test]
    fn run_in_is_hidden() -> Result<()> {
        let mut data = vec![0xAA; 100];
        data.extend_from_slice(&partition_pack_key(PARTITION_KIND_HEADER, 0x04).0);
        data.push(0x02);
        data.extend_from_slice(&[0x11, 0x22]);
        let mut file = MxfFile::from_stream(Cursor::new(data));

        let kl = file.locate_header_partition()?;
        assert_eq!(kl.len, 2);
        assert_eq!(file.run_in(), 100);
        assert_eq!(file.tell(), 17);
        Ok(())
    }

    fn oversized_partition() -> Vec<u8> {
        let mut data = partition_pack_key(PARTITION_KIND_HEADER, 0x04).0.to_vec();
        data.extend_from_slice(&[0x88, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        data.extend_from_slice(&[0; 64]);
        data
    }

    #[test]
    fn length_beyond_file_is_an_error() -> Result<()> {
        let mut file = MxfFile::from_seekable(Cursor::new(oversized_partition()))?;
        let kl = file.locate_header_partition()?;
        let err = file.read_partition(&kl).err();
        assert!(matches!(
            err.as_ref().and_then(|e| e.downcast_ref::<KlvError>()),
            Some(KlvError::LengthExceedsFile { pos: 25, remaining: 64, .. })
        ));
        Ok(())
    }

    #[test]
    fn stream_value_is_bounded_by_input() -> Result<()> {
        let mut file = MxfFile::from_stream(Cursor::new(oversized_partition()));
        let kl = file.locate_header_partition()?;
        let err = file.read_partition(&kl).err();
        assert!(matches!(
            err.as_ref().and_then(|e| e.downcast_ref::<KlvError>()),
            Some(KlvError::UnexpectedEof { .. })
        ));
        assert!(file.eof());
        Ok(())
    }

    #[test]
    fn stream_rejects_backward_seek() -> Result<()> {
        let mut data = FILL_KEY.0.to_vec();
        data.push(0x03);
        data.extend_from_slice(&[0, 0, 0]);
        data.extend_from_slice(&FILL_KEY.0);
        data.push(0x00);
        let mut file = MxfFile::from_stream(Cursor::new(data));

        let kl = file.read_kl()?;
        file.skip(kl.len)?;
        assert_eq!(file.tell(), 20);
        assert!(file.seek(0).is_err());
        assert!(file.read_next_nonfiller_kl().is_err());
        Ok(())
    }
}
