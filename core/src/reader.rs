//! Read-only view over a built index directory.
//!
//! Dictionaries and the metadata table are loaded up front; posting lists
//! are fetched on demand with one seek + sequential read, so a lookup costs
//! a binary search plus one list decode regardless of corpus size. The
//! reader holds no open handles or mutable state and can be shared freely.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::dictionary::Dictionary;
use crate::error::{IndexError, Result};
use crate::postings::decode_postings;
use crate::review_data::ReviewData;
use crate::writer::{
    IndexMeta, FORMAT_VERSION, META_FILE, PRODUCT_DICT_FILE, PRODUCT_POSTINGS_FILE,
    REVIEW_DATA_FILE, TOKEN_DICT_FILE, TOKEN_POSTINGS_FILE,
};
use crate::{Ordinal, ReviewId};

pub struct IndexReader {
    token_dict: Dictionary,
    product_dict: Dictionary,
    review_data: ReviewData,
    token_blob: PathBuf,
    product_blob: PathBuf,
}

/// Per-review fixed metadata as exposed to callers; the product ordinal is
/// resolved back to its id string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewMeta {
    pub product_id: String,
    pub score: u8,
    pub helpfulness_numerator: u16,
    pub helpfulness_denominator: u16,
    pub length: u16,
}

impl IndexReader {
    pub fn open(dir: &Path) -> Result<Self> {
        let meta: IndexMeta = serde_json::from_str(&fs::read_to_string(dir.join(META_FILE))?)?;
        if meta.version != FORMAT_VERSION {
            return Err(IndexError::Corruption(format!(
                "unsupported index format version {}",
                meta.version
            )));
        }
        Ok(Self {
            token_dict: Dictionary::load(&dir.join(TOKEN_DICT_FILE))?,
            product_dict: Dictionary::load(&dir.join(PRODUCT_DICT_FILE))?,
            review_data: ReviewData::load(&dir.join(REVIEW_DATA_FILE))?,
            token_blob: dir.join(TOKEN_POSTINGS_FILE),
            product_blob: dir.join(PRODUCT_POSTINGS_FILE),
        })
    }

    /// Number of reviews containing `term`; 0 if the term is unknown.
    pub fn token_document_frequency(&self, term: &str) -> u32 {
        self.token_entry(term).map_or(0, |e| e.doc_frequency)
    }

    /// Total occurrences of `term` across the corpus; 0 if unknown.
    pub fn token_collection_frequency(&self, term: &str) -> u32 {
        self.token_entry(term).map_or(0, |e| e.collection_frequency)
    }

    /// Decoded posting list for `term`, ascending review id; empty if the
    /// term is unknown.
    pub fn reviews_with_token(&self, term: &str) -> Result<Vec<(ReviewId, u32)>> {
        match self.token_dict.ordinal_of(term) {
            Some(ordinal) => self.postings_at(&self.token_blob, &self.token_dict, ordinal),
            None => Ok(Vec::new()),
        }
    }

    /// Review ids of every review for `product_id`, ascending; empty if the
    /// product is unknown.
    pub fn reviews_of_product(&self, product_id: &str) -> Result<Vec<ReviewId>> {
        match self.product_dict.ordinal_of(product_id) {
            Some(ordinal) => Ok(self
                .postings_at(&self.product_blob, &self.product_dict, ordinal)?
                .into_iter()
                .map(|(review_id, _)| review_id)
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    /// Metadata for one review. An out-of-range id is a contract violation,
    /// signaled as `ReviewOutOfRange` rather than an empty result.
    pub fn review_metadata(&self, review_id: ReviewId) -> Result<ReviewMeta> {
        let i = review_id as usize;
        if i >= self.review_data.scores.len() {
            return Err(IndexError::ReviewOutOfRange(review_id));
        }
        let product_ord = self.review_data.product_ords[i];
        let product_id = self
            .product_dict
            .term(product_ord)
            .ok_or_else(|| {
                IndexError::Corruption(format!("product ordinal {product_ord} outside dictionary"))
            })?
            .to_string();
        Ok(ReviewMeta {
            product_id,
            score: self.review_data.scores[i],
            helpfulness_numerator: self.review_data.helpfulness_numerator[i],
            helpfulness_denominator: self.review_data.helpfulness_denominator[i],
            length: self.review_data.token_counts[i],
        })
    }

    pub fn num_reviews(&self) -> u32 {
        self.review_data.num_reviews()
    }

    /// Sum of all review lengths.
    pub fn total_tokens(&self) -> u64 {
        self.review_data.total_tokens()
    }

    fn token_entry(&self, term: &str) -> Option<&crate::dictionary::DictEntry> {
        self.token_dict
            .ordinal_of(term)
            .and_then(|ordinal| self.token_dict.entry(ordinal))
    }

    fn postings_at(
        &self,
        blob: &Path,
        dict: &Dictionary,
        ordinal: Ordinal,
    ) -> Result<Vec<(ReviewId, u32)>> {
        let entry = dict.entry(ordinal).ok_or_else(|| {
            IndexError::Corruption(format!("ordinal {ordinal} outside dictionary"))
        })?;
        if entry.len == 0 {
            return Ok(Vec::new());
        }
        let mut f = File::open(blob)?;
        f.seek(SeekFrom::Start(entry.offset))?;
        let mut buf = vec![0u8; entry.len as usize];
        f.read_exact(&mut buf)?;
        decode_postings(&buf)
    }
}
