//! Streaming extraction of a single entry.
//!
//! [`ItemReader`] is a pull-based state machine: every call to
//! [`ItemReader::next_chunk`] decodes at most one chunk from the archive
//! buffer, so memory use is bounded by the largest chunk rather than by the
//! size of the file.
//!
//! Entries stored raw, entries carrying a builder cache and empty entries
//! are produced as a single chunk (or none) through the same interface.

use std::borrow::Cow;

use tracing::trace;

use crate::chunk::{decompress, split_chunk};
use crate::error::{HapiError, Result};
use crate::tree::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source<'a> {
    Cached(&'a [u8]),
    Raw,
    Chunked,
}

#[derive(Debug)]
pub struct ItemReader<'a> {
    file:      &'a [u8],
    source:    Source<'a>,
    flat_size: usize,
    cursor:    usize,
    produced:  usize,
    finished:  bool,
}

impl<'a> ItemReader<'a> {
    /// Bind a reader to an entry of the archive `file`.
    pub fn new(file: &'a [u8], item: &'a Item) -> Result<Self> {
        let record = item
            .entry_record()
            .ok_or_else(|| HapiError::NotAnEntry { path: item.path().to_owned() })?;
        let source = match item.cache() {
            Some(cache) => Source::Cached(cache),
            None if record.is_compressed() => Source::Chunked,
            None => Source::Raw,
        };
        Ok(Self {
            file,
            source,
            flat_size: record.flat_size as usize,
            cursor:    record.data_start_ptr as usize,
            produced:  0,
            finished:  false,
        })
    }

    /// Total bytes this reader will produce.
    pub fn flat_size(&self) -> usize { self.flat_size }

    /// Bytes produced so far.
    pub fn produced(&self) -> usize { self.produced }

    /// Produce the next chunk of decompressed bytes.
    ///
    /// Returns `Ok(None)` once exactly `flat_size` bytes have been produced.
    /// Producing more or fewer bytes than that is an error, never a short
    /// stream.  After an error the reader is finished.
    pub fn next_chunk(&mut self) -> Result<Option<Cow<'a, [u8]>>> {
        if self.finished {
            return Ok(None);
        }
        if self.produced >= self.flat_size {
            self.finished = true;
            if self.produced != self.flat_size {
                return Err(HapiError::SizeMismatch {
                    what:     "entry",
                    expected: self.flat_size,
                    actual:   self.produced,
                });
            }
            return Ok(None);
        }

        let result = self.pull();
        if result.is_err() {
            self.finished = true;
        }
        result.map(Some)
    }

    fn pull(&mut self) -> Result<Cow<'a, [u8]>> {
        let out: Cow<'a, [u8]> = match self.source {
            Source::Cached(cache) => Cow::Borrowed(cache),
            Source::Raw => {
                let available = self.file.len().saturating_sub(self.cursor);
                if available < self.flat_size {
                    return Err(HapiError::Truncated {
                        what:      "raw entry payload",
                        offset:    self.cursor,
                        needed:    self.flat_size,
                        available,
                    });
                }
                let bytes = &self.file[self.cursor..self.cursor + self.flat_size];
                self.cursor += self.flat_size;
                Cow::Borrowed(bytes)
            }
            Source::Chunked => {
                let (record, stored, next) = split_chunk(self.file, self.cursor)?;
                trace!(offset = self.cursor, compressed = record.compressed_size, flat = record.flat_size, "chunk");
                self.cursor = next;
                Cow::Owned(decompress(&record, stored)?)
            }
        };
        self.produced += out.len();
        Ok(out)
    }
}

impl<'a> Iterator for ItemReader<'a> {
    type Item = Result<Cow<'a, [u8]>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}
