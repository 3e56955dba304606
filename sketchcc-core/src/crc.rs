//! CRC-64 checksums for snapshot files

use std::io::{self, Read, Write};

use crc::{Crc, CRC_64_GO_ISO};

pub const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

pub fn checksum(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Writer that checksums every byte passed through it.
pub struct ChecksumWriter<W> {
    inner: W,
    digest: crc::Digest<'static, u64>,
}

impl<W: Write> ChecksumWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            digest: CRC64.digest(),
        }
    }

    /// Append the checksum of everything written so far, little-endian, and
    /// return the inner writer.
    pub fn finish(self) -> io::Result<W> {
        let Self { mut inner, digest } = self;
        inner.write_all(&digest.finalize().to_le_bytes())?;
        inner.flush()?;
        Ok(inner)
    }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.digest.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader that checksums every byte read through it.
pub struct ChecksumReader<R> {
    inner: R,
    digest: crc::Digest<'static, u64>,
}

impl<R: Read> ChecksumReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            digest: CRC64.digest(),
        }
    }

    /// Read the 8-byte trailer and return `(expected, actual)` checksums.
    pub fn finish(self) -> io::Result<(u64, u64)> {
        let Self { mut inner, digest } = self;
        let mut trailer = [0u8; 8];
        inner.read_exact(&mut trailer)?;
        Ok((u64::from_le_bytes(trailer), digest.finalize()))
    }
}

impl<R: Read> Read for ChecksumReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.digest.update(&buf[..read]);
        Ok(read)
    }
}
