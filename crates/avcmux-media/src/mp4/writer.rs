//! Streaming output of a [`MovieLayout`].

use std::io::{Read, Seek, SeekFrom, Write};

use tracing::debug;

use super::movie::{MovieLayout, SAMPLE_LENGTH_PREFIX};
use crate::annexb::ScanResult;
use crate::error::{Error, Result};

/// Copy buffer size for sample payloads.
const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Writes `ftyp free moov mdat` to any [`Write`].
///
/// Sample payloads are not held in memory; each picture NAL unit is copied
/// from the source stream at the offset recorded during the scan.
pub struct Mp4Writer<W> {
    inner: W,
    written: u64,
    buf: Vec<u8>,
}

impl<W: Write> Mp4Writer<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            written: 0,
            buf: vec![0u8; COPY_CHUNK_SIZE],
        }
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Write the whole file: header boxes, then every sample.
    ///
    /// Returns the number of bytes written, which equals `layout.file_len()`.
    pub fn write_movie<R: Read + Seek>(
        &mut self,
        layout: &MovieLayout,
        scan: &ScanResult,
        source: &mut R,
    ) -> Result<u64> {
        let header = layout.header_bytes()?;
        self.write_all(&header)?;

        for (record, &size) in scan.pictures().zip(&layout.sample_sizes) {
            self.write_all(&(size - SAMPLE_LENGTH_PREFIX).to_be_bytes())?;
            self.copy_range(source, record.byte_offset, record.byte_size)?;
        }

        self.inner.flush().map_err(Error::Write)?;

        if self.written != layout.file_len() {
            return Err(Error::invalid_mp4(format!(
                "wrote {} bytes, layout declares {}",
                self.written,
                layout.file_len()
            )));
        }
        debug!("Wrote {} bytes ({} samples)", self.written, layout.sample_sizes.len());
        Ok(self.written)
    }

    /// Copy `len` bytes starting at `offset` in `source`.
    fn copy_range<R: Read + Seek>(&mut self, source: &mut R, offset: u64, len: u64) -> Result<()> {
        source.seek(SeekFrom::Start(offset)).map_err(Error::Read)?;
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(self.buf.len() as u64) as usize;
            source.read_exact(&mut self.buf[..n]).map_err(Error::Read)?;
            self.inner.write_all(&self.buf[..n]).map_err(Error::Write)?;
            self.written += n as u64;
            remaining -= n as u64;
        }
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes).map_err(Error::Write)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
