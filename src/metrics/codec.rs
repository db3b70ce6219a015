//! Binary stream codec for labelled histograms.
//!
//! A `.hist` file is a plain sequence of self-delimited records with
//! no global header; each `write` call appends one record and the
//! reader consumes them one at a time until clean end-of-stream.
//!
//! Record layout (all integers little-endian):
//!
//! ```text
//! u32 id_len | id bytes (UTF-8)
//! u64 bucket_count
//! i64 min | i64 max | i64 bucket_width
//! i64 sample_min | i64 sample_max
//! i64 low_sample_count | i64 high_sample_count | i64 total_samples
//! u64 buckets_len (== bucket_count) | i64 × buckets_len
//! ```

use std::io::{self, Read, Write};

use thiserror::Error;

use super::histogram::Histogram;

/// Decode guard: refuse records whose bucket array would be absurdly
/// large (16M buckets is 128MB of counters).
const MAX_BUCKET_COUNT: u64 = 1 << 24;

/// Decode guard: histogram ids are short dotted labels.
const MAX_ID_LEN: u32 = 4096;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("cannot encode missing histogram")]
    MissingHistogram,
    #[error("error writing histogram record: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    /// Clean end of stream: the previous record was the last one.
    /// Not a failure, but the caller must stop reading.
    #[error("end of histogram stream")]
    Eof,
    /// The stream ended in the middle of a record.
    #[error("truncated histogram record")]
    Truncated,
    #[error("histogram id is not valid UTF-8")]
    BadId(#[from] std::string::FromUtf8Error),
    #[error("histogram id too long: {0} bytes")]
    BadIdLen(u32),
    #[error("implausible bucket count: {0}")]
    BadBucketCount(u64),
    #[error("bucket array length {got} does not match bucket count {expected}")]
    BadBucketsLen { got: u64, expected: u64 },
    #[error("error reading histogram record: {0}")]
    Io(io::Error),
}

// ─── Writer ──────────────────────────────────────────────────────

/// Appends labelled histogram records to an underlying byte stream.
///
/// The writer never flushes or syncs; that is the caller's job once
/// all histograms have been written.
pub struct HistogramWriter<W: Write> {
    out: W,
    buf: Vec<u8>,
}

impl<W: Write> HistogramWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            buf: Vec::new(),
        }
    }

    /// Encodes one `(id, histogram)` record. A missing histogram is a
    /// recoverable error: nothing is written, and the stream remains
    /// valid for subsequent calls.
    pub fn write(&mut self, id: &str, histogram: Option<&Histogram>) -> Result<(), EncodeError> {
        let hist = histogram.ok_or(EncodeError::MissingHistogram)?;

        // Stage the whole record so a successful call maps to exactly
        // one write_all on the underlying stream.
        self.buf.clear();
        self.buf
            .extend_from_slice(&(id.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(id.as_bytes());

        self.buf
            .extend_from_slice(&(hist.bucket_count() as u64).to_le_bytes());
        for field in [
            hist.min(),
            hist.max(),
            hist.bucket_width(),
            hist.sample_min(),
            hist.sample_max(),
            hist.low_sample_count(),
            hist.high_sample_count(),
            hist.total_samples(),
        ] {
            self.buf.extend_from_slice(&field.to_le_bytes());
        }

        self.buf
            .extend_from_slice(&(hist.buckets().len() as u64).to_le_bytes());
        for &count in hist.buckets() {
            self.buf.extend_from_slice(&count.to_le_bytes());
        }

        self.out.write_all(&self.buf)?;
        Ok(())
    }

    /// Consumes the writer, handing back the underlying stream.
    pub fn into_inner(self) -> W {
        self.out
    }
}

// ─── Reader ──────────────────────────────────────────────────────

/// Reads labelled histogram records back from a byte stream.
///
/// `read` returns [`DecodeError::Eof`] once the stream is exhausted.
/// Any other error means the record was corrupt or truncated; the
/// stream position is then undefined and no further reads should be
/// attempted.
pub struct HistogramReader<R: Read> {
    input: R,
}

impl<R: Read> HistogramReader<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Decodes the next `(id, histogram)` record.
    pub fn read(&mut self) -> Result<(String, Histogram), DecodeError> {
        // The id length doubles as the record boundary: hitting EOF
        // here, before any byte of a new record, is the clean
        // end-of-stream signal rather than corruption.
        let id_len = match self.read_boundary_u32()? {
            Some(n) => n,
            None => return Err(DecodeError::Eof),
        };
        if id_len > MAX_ID_LEN {
            return Err(DecodeError::BadIdLen(id_len));
        }

        let mut id_bytes = vec![0u8; id_len as usize];
        self.read_exact(&mut id_bytes)?;
        let id = String::from_utf8(id_bytes)?;

        let bucket_count = self.read_u64()?;
        if bucket_count > MAX_BUCKET_COUNT {
            return Err(DecodeError::BadBucketCount(bucket_count));
        }

        let min = self.read_i64()?;
        let max = self.read_i64()?;
        let bucket_width = self.read_i64()?;
        let sample_min = self.read_i64()?;
        let sample_max = self.read_i64()?;
        let low_sample_count = self.read_i64()?;
        let high_sample_count = self.read_i64()?;
        let total_samples = self.read_i64()?;

        let buckets_len = self.read_u64()?;
        if buckets_len != bucket_count {
            return Err(DecodeError::BadBucketsLen {
                got: buckets_len,
                expected: bucket_count,
            });
        }
        let mut buckets = Vec::with_capacity(buckets_len as usize);
        for _ in 0..buckets_len {
            buckets.push(self.read_i64()?);
        }

        Ok((
            id,
            Histogram::from_parts(
                bucket_count as usize,
                buckets,
                min,
                max,
                bucket_width,
                sample_min,
                sample_max,
                low_sample_count,
                high_sample_count,
                total_samples,
            ),
        ))
    }
}

impl<R: Read> HistogramReader<R> {
    /// Reads the leading u32 of a record. A record boundary is the
    /// only place a short read means clean EOF (`None`) instead of
    /// truncation: zero bytes is end of stream, one to three bytes is
    /// a torn record.
    fn read_boundary_u32(&mut self) -> Result<Option<u32>, DecodeError> {
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            match self.input.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(DecodeError::Truncated),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DecodeError::Io(e)),
            }
        }
        Ok(Some(u32::from_le_bytes(buf)))
    }

    fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn read_i64(&mut self) -> Result<i64, DecodeError> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        match self.input.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(DecodeError::Truncated),
            Err(e) => Err(DecodeError::Io(e)),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────
