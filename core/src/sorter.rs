//! External block sort for posting triples.
//!
//! Construction cannot hold the full (ordinal, review, frequency) relation in
//! memory, so triples are buffered per block of reviews, sorted, and spilled
//! to temp runs; the runs are then merged with a bounded fan-in min-heap
//! until a single globally sorted run remains.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, Result};
use crate::writer::staged_path;
use crate::{Ordinal, ReviewId};

/// One row of the transient sort relation. Derived ordering is the sort key:
/// ordinal first, then review id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Triple {
    pub ordinal: Ordinal,
    pub review_id: ReviewId,
    pub frequency: u32,
}

const TRIPLE_BYTES: usize = 12;

impl Triple {
    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(&self.ordinal.to_le_bytes())?;
        w.write_all(&self.review_id.to_le_bytes())?;
        w.write_all(&self.frequency.to_le_bytes())
    }

    fn read_from<R: Read>(r: &mut R) -> Result<Option<Triple>> {
        let mut buf = [0u8; TRIPLE_BYTES];
        let mut filled = 0;
        while filled < TRIPLE_BYTES {
            let n = r.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        match filled {
            0 => Ok(None),
            TRIPLE_BYTES => Ok(Some(Triple {
                ordinal: le_u32(&buf[0..4]),
                review_id: le_u32(&buf[4..8]),
                frequency: le_u32(&buf[8..12]),
            })),
            n => Err(IndexError::Corruption(format!(
                "torn triple record: {n} trailing bytes"
            ))),
        }
    }
}

fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

/// Sequential reader over one sorted run file.
pub struct RunReader {
    reader: BufReader<File>,
}

impl RunReader {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
        })
    }

    pub fn next_triple(&mut self) -> Result<Option<Triple>> {
        Triple::read_from(&mut self.reader)
    }
}

/// A run being merged: its smallest unconsumed triple plus the reader behind
/// it. Heap order is the triple's sort key.
struct RunCursor {
    current: Triple,
    reader: BufReader<File>,
}

impl RunCursor {
    fn open(path: &Path) -> Result<Option<Self>> {
        let mut reader = BufReader::new(File::open(path)?);
        Ok(Triple::read_from(&mut reader)?.map(|current| RunCursor { current, reader }))
    }

    fn advance(&mut self) -> Result<bool> {
        match Triple::read_from(&mut self.reader)? {
            Some(t) => {
                self.current = t;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl PartialEq for RunCursor {
    fn eq(&self, other: &Self) -> bool {
        self.current == other.current
    }
}

impl Eq for RunCursor {}

impl PartialOrd for RunCursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RunCursor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.current.cmp(&other.current)
    }
}

/// Bounded-memory sorter for one universe's triples.
pub struct ExternalSorter {
    tmp_dir: PathBuf,
    prefix: String,
    block_size: usize,
    fan_in: usize,
    buffer: Vec<Triple>,
    buffered_reviews: usize,
    runs: usize,
}

impl ExternalSorter {
    pub const DEFAULT_BLOCK_SIZE: usize = 10_000;
    pub const DEFAULT_FAN_IN: usize = 1_000;

    pub fn new(tmp_dir: &Path, prefix: &str) -> Self {
        Self::with_limits(tmp_dir, prefix, Self::DEFAULT_BLOCK_SIZE, Self::DEFAULT_FAN_IN)
    }

    /// `block_size` is the number of reviews buffered per spilled run;
    /// `fan_in` caps how many runs one merge step reads.
    pub fn with_limits(tmp_dir: &Path, prefix: &str, block_size: usize, fan_in: usize) -> Self {
        Self {
            tmp_dir: tmp_dir.to_path_buf(),
            prefix: prefix.to_string(),
            block_size: block_size.max(1),
            fan_in: fan_in.max(2),
            buffer: Vec::new(),
            buffered_reviews: 0,
            runs: 0,
        }
    }

    fn run_path(&self, level: usize, index: usize) -> PathBuf {
        self.tmp_dir.join(format!("{}_{}_{}.run", self.prefix, level, index))
    }

    /// Add one review's aggregated triples; spills a sorted run whenever a
    /// full block of reviews has accumulated.
    pub fn push_review(&mut self, triples: impl IntoIterator<Item = Triple>) -> Result<()> {
        self.buffer.extend(triples);
        self.buffered_reviews += 1;
        if self.buffered_reviews >= self.block_size {
            self.spill()?;
        }
        Ok(())
    }

    fn spill(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            self.buffered_reviews = 0;
            return Ok(());
        }
        self.buffer.sort_unstable();
        let path = self.run_path(0, self.runs);
        let mut w = BufWriter::new(File::create(&path)?);
        for t in &self.buffer {
            t.write_to(&mut w)?;
        }
        w.flush()?;
        tracing::debug!(
            prefix = %self.prefix,
            run = self.runs,
            triples = self.buffer.len(),
            "spilled sorted block"
        );
        self.runs += 1;
        self.buffer.clear();
        self.buffered_reviews = 0;
        Ok(())
    }

    /// Flush the trailing partial block and merge every run into a single
    /// sorted run at `dest`. Merge levels proceed bottom-up, at most `fan_in`
    /// runs per step; consumed runs are deleted as soon as their group is
    /// merged, and the write targeting `dest` goes through a temp name.
    pub fn finish(mut self, dest: &Path) -> Result<()> {
        self.spill()?;
        if self.runs == 0 {
            File::create(dest)?;
            return Ok(());
        }
        if self.runs == 1 {
            fs::rename(self.run_path(0, 0), dest)?;
            return Ok(());
        }

        let mut level = 0usize;
        let mut count = self.runs;
        while count > self.fan_in {
            let groups = (count + self.fan_in - 1) / self.fan_in;
            tracing::debug!(prefix = %self.prefix, merge_level = level, runs = count, groups, "merging run level");
            for g in 0..groups {
                let start = g * self.fan_in;
                let end = (start + self.fan_in).min(count);
                let inputs: Vec<PathBuf> = (start..end).map(|i| self.run_path(level, i)).collect();
                merge_runs(&inputs, &self.run_path(level + 1, g))?;
            }
            level += 1;
            count = groups;
        }

        let inputs: Vec<PathBuf> = (0..count).map(|i| self.run_path(level, i)).collect();
        let staged = staged_path(dest);
        merge_runs(&inputs, &staged)?;
        fs::rename(&staged, dest)?;
        Ok(())
    }
}

fn merge_runs(inputs: &[PathBuf], out: &Path) -> Result<()> {
    let mut heap: BinaryHeap<Reverse<RunCursor>> = BinaryHeap::with_capacity(inputs.len());
    for path in inputs {
        if let Some(cursor) = RunCursor::open(path)? {
            heap.push(Reverse(cursor));
        }
    }
    let mut w = BufWriter::new(File::create(out)?);
    while let Some(Reverse(mut cursor)) = heap.pop() {
        cursor.current.write_to(&mut w)?;
        if cursor.advance()? {
            heap.push(Reverse(cursor));
        }
    }
    w.flush()?;
    for path in inputs {
        fs::remove_file(path)?;
    }
    Ok(())
}
