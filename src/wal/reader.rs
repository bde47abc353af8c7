//! WAL Reader
//!
//! Handles reading frames from a WAL segment.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use super::entry::{parse_header, HEADER_SIZE};
use super::WalEntry;
use crate::error::{LodeError, Result};

/// Outcome of reading one frame
#[derive(Debug)]
pub enum FrameRead {
    /// A complete, checksum-valid frame
    Entry(WalEntry),

    /// Clean end of file on a frame boundary
    Eof,

    /// The file ends in the middle of a frame (torn write)
    Truncated,

    /// A complete frame whose checksum or payload is invalid
    Corrupted(String),
}

/// Reads frames from a WAL segment
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset just past the last valid frame
    position: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
        })
    }

    /// Offset just past the last frame returned
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next frame, classifying torn and corrupt tails
    pub fn read_frame(&mut self) -> Result<FrameRead> {
        let mut header = [0u8; HEADER_SIZE];
        match read_full(&mut self.reader, &mut header)? {
            0 => return Ok(FrameRead::Eof),
            n if n < HEADER_SIZE => return Ok(FrameRead::Truncated),
            _ => {}
        }

        let (lsn, crc, len) = match parse_header(&header) {
            Ok(parts) => parts,
            Err(e) => return Ok(FrameRead::Corrupted(e.to_string())),
        };

        let mut payload = vec![0u8; len as usize];
        if read_full(&mut self.reader, &mut payload)? < payload.len() {
            return Ok(FrameRead::Truncated);
        }

        match WalEntry::from_parts(lsn, crc, &payload) {
            Ok(entry) => {
                self.position += (HEADER_SIZE + payload.len()) as u64;
                Ok(FrameRead::Entry(entry))
            }
            Err(e) => Ok(FrameRead::Corrupted(e.to_string())),
        }
    }

    /// Read the next entry from the WAL; damaged tails are errors
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        match self.read_frame()? {
            FrameRead::Entry(entry) => Ok(Some(entry)),
            FrameRead::Eof => Ok(None),
            FrameRead::Truncated => Err(LodeError::WalCorruption(format!(
                "partial frame at offset {}",
                self.position
            ))),
            FrameRead::Corrupted(reason) => Err(LodeError::WalCorruption(reason)),
        }
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Reads until `buf` is full or EOF; returns bytes read
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Iterator over WAL entries
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
