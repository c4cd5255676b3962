//! Fixed per-review metadata, parallel-vector layout, one slot per review id.
//! Populated once at build time and read-only afterward.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use crate::error::Result;
use crate::writer::staged_path;
use crate::Ordinal;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ReviewData {
    pub product_ords: Vec<Ordinal>,
    pub scores: Vec<u8>,
    pub helpfulness_numerator: Vec<u16>,
    pub helpfulness_denominator: Vec<u16>,
    pub token_counts: Vec<u16>,
}

impl ReviewData {
    pub fn num_reviews(&self) -> u32 {
        self.scores.len() as u32
    }

    /// Sum of every review's token count.
    pub fn total_tokens(&self) -> u64 {
        self.token_counts.iter().map(|&c| c as u64).sum()
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
