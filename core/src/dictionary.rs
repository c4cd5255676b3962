//! Per-universe dictionary: the sorted term table plus posting-list lookup
//! metadata, built from a globally sorted triple run.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::error::{IndexError, Result};
use crate::postings::encode_postings;
use crate::sorter::RunReader;
use crate::writer::staged_path;
use crate::{Ordinal, ReviewId};

/// Lookup metadata for one ordinal's posting list inside the blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DictEntry {
    pub doc_frequency: u32,
    pub collection_frequency: u32,
    pub offset: u64,
    pub len: u32,
}

/// The string→ordinal resolution structure doubles as the ordinal→string
/// table: `terms` is the sorted universe, so a binary search position IS the
/// ordinal.
#[derive(Debug, Serialize, Deserialize)]
pub struct Dictionary {
    pub terms: Vec<String>,
    pub entries: Vec<DictEntry>,
}

impl Dictionary {
    pub fn ordinal_of(&self, term: &str) -> Option<Ordinal> {
        self.terms
            .binary_search_by(|probe| probe.as_str().cmp(term))
            .ok()
            .map(|i| i as Ordinal)
    }

    pub fn term(&self, ordinal: Ordinal) -> Option<&str> {
        self.terms.get(ordinal as usize).map(String::as_str)
    }

    pub fn entry(&self, ordinal: Ordinal) -> Option<&DictEntry> {
        self.entries.get(ordinal as usize)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Consume a sorted run, grouping consecutive triples that share an
    /// ordinal into one encoded posting list appended to the blob at
    /// `blob_dest`. `terms` must be the sorted universe the run was built
    /// against.
    pub fn build(terms: Vec<String>, run: &Path, blob_dest: &Path) -> Result<Self> {
        let mut entries = vec![DictEntry::default(); terms.len()];
        let staged = staged_path(blob_dest);
        let mut blob = BufWriter::new(File::create(&staged)?);
        let mut offset = 0u64;

        let mut reader = RunReader::open(run)?;
        let mut current: Option<(Ordinal, Vec<(ReviewId, u32)>)> = None;
        while let Some(t) = reader.next_triple()? {
            if let Some((ordinal, list)) = current.as_mut() {
                if *ordinal == t.ordinal {
                    list.push((t.review_id, t.frequency));
                    continue;
                }
            }
            if let Some((ordinal, list)) = current.take() {
                offset = flush_list(&mut blob, &mut entries, ordinal, &list, offset)?;
            }
            current = Some((t.ordinal, vec![(t.review_id, t.frequency)]));
        }
        if let Some((ordinal, list)) = current.take() {
            offset = flush_list(&mut blob, &mut entries, ordinal, &list, offset)?;
        }

        blob.flush()?;
        drop(blob);
        fs::rename(&staged, blob_dest)?;
        tracing::debug!(
            terms = entries.len(),
            blob_bytes = offset,
            blob = %blob_dest.display(),
            "posting blob written"
        );
        Ok(Dictionary { terms, entries })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let staged = staged_path(path);
        let bytes = bincode::serialize(self)?;
        let mut f = File::create(&staged)?;
        f.write_all(&bytes)?;
        drop(f);
        fs::rename(&staged, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut buf = Vec::new();
        File::open(path)?.read_to_end(&mut buf)?;
        Ok(bincode::deserialize(&buf)?)
    }
}

fn flush_list<W: Write>(
    blob: &mut W,
    entries: &mut [DictEntry],
    ordinal: Ordinal,
    list: &[(ReviewId, u32)],
    offset: u64,
) -> Result<u64> {
    let entry = entries
        .get_mut(ordinal as usize)
        .ok_or_else(|| IndexError::Corruption(format!("ordinal {ordinal} outside universe")))?;
    let encoded = encode_postings(list);
    entry.doc_frequency = list.len() as u32;
    entry.collection_frequency = list.iter().map(|&(_, f)| f).sum();
    entry.offset = offset;
    entry.len = encoded.len() as u32;
    blob.write_all(&encoded)?;
    Ok(offset + encoded.len() as u64)
}
