//! Recorded server streams.
//!
//! A capture is a sequence of `[u32 tick][u32 len][len bytes]` records,
//! big-endian, optionally gzip-compressed as a whole.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::{bail, Context};
use flate2::read::GzDecoder;

/// Bytes the server sent during one client tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    pub tick: u32,
    pub bytes: Vec<u8>,
}

pub struct CaptureReader<R: Read> {
    reader: R,
    records: u64,
}

impl CaptureReader<Box<dyn Read>> {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("opening capture {}", path.display()))?;
        let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
            Box::new(GzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        Ok(CaptureReader::new(reader))
    }
}

impl<R: Read> CaptureReader<R> {
    pub fn new(reader: R) -> Self {
        CaptureReader { reader, records: 0 }
    }

    /// Fills `buf`, or returns `Ok(false)` if the stream ended before the
    /// first byte.
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    pub fn next_record(&mut self) -> anyhow::Result<Option<CaptureRecord>> {
        let mut header = [0u8; 8];
        let index = self.records;
        if !self
            .fill(&mut header)
            .with_context(|| format!("reading header of record {index}"))?
        {
            return Ok(None);
        }
        let tick = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;

        let mut bytes = vec![0u8; len];
        if !self
            .fill(&mut bytes)
            .with_context(|| format!("record {index} truncated (expected {len} bytes)"))?
            && len > 0
        {
            bail!("record {index} truncated (expected {len} bytes, got none)");
        }
        self.records += 1;
        Ok(Some(CaptureRecord { tick, bytes }))
    }
}

impl<R: Read> Iterator for CaptureReader<R> {
    type Item = anyhow::Result<CaptureRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn write_records(records: &[CaptureRecord], out: &mut Vec<u8>) {
        for record in records {
            out.extend_from_slice(&record.tick.to_be_bytes());
            out.extend_from_slice(&(record.bytes.len() as u32).to_be_bytes());
            out.extend_from_slice(&record.bytes);
        }
    }

    fn sample() -> Vec<CaptureRecord> {
        vec![
            CaptureRecord {
                tick: 0,
                bytes: vec![1, 2, 3],
            },
            CaptureRecord { tick: 4, bytes: vec![] },
            CaptureRecord {
                tick: 9,
                bytes: vec![0xff; 600],
            },
        ]
    }

    #[test]
    fn plain_capture_reads_back() {
        let mut raw = Vec::new();
        write_records(&sample(), &mut raw);
        let records: Vec<CaptureRecord> = CaptureReader::new(raw.as_slice())
            .collect::<anyhow::Result<_>>()
            .unwrap();
        assert_eq!(records, sample());
    }

    #[test]
    fn gzip_capture_reads_back() {
        let mut raw = Vec::new();
        write_records(&sample(), &mut raw);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        let compressed = encoder.finish().unwrap();

        let reader = CaptureReader::new(GzDecoder::new(compressed.as_slice()));
        let records: Vec<CaptureRecord> = reader.collect::<anyhow::Result<_>>().unwrap();
        assert_eq!(records, sample());
    }

    #[test]
    fn truncated_body_is_an_error() {
        let mut raw = Vec::new();
        write_records(&sample(), &mut raw);
        raw.truncate(raw.len() - 10);
        let results: Vec<anyhow::Result<CaptureRecord>> = CaptureReader::new(raw.as_slice()).collect();
        assert_eq!(results.len(), 3);
        assert!(results[..2].iter().all(|r| r.is_ok()));
        assert!(results[2].is_err());
    }

    #[test]
    fn truncated_header_is_an_error() {
        let raw = [0u8, 0, 0, 1, 0];
        let mut reader = CaptureReader::new(&raw[..]);
        assert!(reader.next_record().is_err());
    }
}
