//! One-shot batch construction of the on-disk index.
//!
//! Pipeline: parse the corpus once for the string universes and review
//! metadata, sort each universe to assign ordinals, re-scan the corpus
//! emitting posting triples through the external sorter, then group the
//! sorted runs into dictionaries and posting blobs. Every artifact is
//! written under a temp name and renamed into place.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::dictionary::Dictionary;
use crate::error::{IndexError, Result};
use crate::parser::{collect_stats, CorpusReader, CorpusStats};
use crate::review_data::ReviewData;
use crate::sorter::{ExternalSorter, Triple};
use crate::tokenizer::tokenize;
use crate::ReviewId;

pub const TOKEN_DICT_FILE: &str = "token_dict.bin";
pub const PRODUCT_DICT_FILE: &str = "product_dict.bin";
pub const REVIEW_DATA_FILE: &str = "review_data.bin";
pub const TOKEN_POSTINGS_FILE: &str = "token_postings.bin";
pub const PRODUCT_POSTINGS_FILE: &str = "product_postings.bin";
pub const META_FILE: &str = "meta.json";

pub const ARTIFACT_FILES: [&str; 5] = [
    TOKEN_DICT_FILE,
    PRODUCT_DICT_FILE,
    REVIEW_DATA_FILE,
    TOKEN_POSTINGS_FILE,
    PRODUCT_POSTINGS_FILE,
];

const TMP_DIR: &str = "tmp";

pub const FORMAT_VERSION: u32 = 1;

/// Human-readable sidecar describing a build.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexMeta {
    pub version: u32,
    pub created_at: String,
    pub num_reviews: u32,
    pub distinct_tokens: u32,
    pub distinct_products: u32,
}

pub struct IndexWriter {
    /// Reviews buffered per sorted spill.
    pub block_size: usize,
    /// Maximum runs merged in one step.
    pub fan_in: usize,
}

impl Default for IndexWriter {
    fn default() -> Self {
        Self {
            block_size: ExternalSorter::DEFAULT_BLOCK_SIZE,
            fan_in: ExternalSorter::DEFAULT_FAN_IN,
        }
    }
}

impl IndexWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index for `corpus` under `dir`. An existing directory has
    /// its artifacts replaced; a missing one is created.
    pub fn write(&self, corpus: &Path, dir: &Path) -> Result<()> {
        prepare_dir(dir)?;

        let stats = collect_stats(corpus)?;
        tracing::info!(
            num_reviews = stats.num_reviews(),
            distinct_tokens = stats.token_set.len(),
            distinct_products = stats.product_names.len(),
            "parsed corpus"
        );
        let CorpusStats {
            token_set,
            product_names,
            review_products,
            scores,
            helpfulness_numerator,
            helpfulness_denominator,
            token_counts,
        } = stats;

        // sort the universes once; position in the sorted table is the ordinal
        let mut tokens: Vec<String> = token_set.into_iter().collect();
        tokens.sort_unstable();
        let mut products: Vec<String> = product_names.clone();
        products.sort_unstable();

        let mut intern_to_ord = Vec::with_capacity(product_names.len());
        for name in &product_names {
            let ord = products
                .binary_search_by(|p| p.as_str().cmp(name.as_str()))
                .map_err(|_| {
                    IndexError::Corruption(format!("product {name:?} missing from universe"))
                })?;
            intern_to_ord.push(ord as u32);
        }
        let review_data = ReviewData {
            product_ords: review_products
                .iter()
                .map(|&i| intern_to_ord[i as usize])
                .collect(),
            scores,
            helpfulness_numerator,
            helpfulness_denominator,
            token_counts,
        };
        review_data.save(&dir.join(REVIEW_DATA_FILE))?;

        let tmp = dir.join(TMP_DIR);
        fs::create_dir_all(&tmp)?;
        let token_run = tmp.join("tokens.sorted");
        let product_run = tmp.join("products.sorted");
        self.sort_corpus(corpus, &tmp, &tokens, &products, &token_run, &product_run)?;

        let token_dict = Dictionary::build(tokens, &token_run, &dir.join(TOKEN_POSTINGS_FILE))?;
        token_dict.save(&dir.join(TOKEN_DICT_FILE))?;
        let product_dict =
            Dictionary::build(products, &product_run, &dir.join(PRODUCT_POSTINGS_FILE))?;
        product_dict.save(&dir.join(PRODUCT_DICT_FILE))?;

        write_meta(
            dir,
            &review_data,
            token_dict.len() as u32,
            product_dict.len() as u32,
        )?;
        fs::remove_dir_all(&tmp)?;
        tracing::info!(dir = %dir.display(), "index build complete");
        Ok(())
    }

    /// Second corpus pass: emit per-review aggregated triples into one
    /// sorter per universe and merge each down to a single sorted run.
    fn sort_corpus(
        &self,
        corpus: &Path,
        tmp: &Path,
        tokens: &[String],
        products: &[String],
        token_run: &Path,
        product_run: &Path,
    ) -> Result<()> {
        let token_ords: HashMap<&str, u32> = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i as u32))
            .collect();
        let product_ords: HashMap<&str, u32> = products
            .iter()
            .enumerate()
            .map(|(i, p)| (p.as_str(), i as u32))
            .collect();

        let mut token_sorter = ExternalSorter::with_limits(tmp, "t", self.block_size, self.fan_in);
        let mut product_sorter =
            ExternalSorter::with_limits(tmp, "p", self.block_size, self.fan_in);

        let mut reader = CorpusReader::open(corpus)?;
        let mut review_id: ReviewId = 0;
        while let Some(review) = reader.next_review()? {
            let mut counts: HashMap<u32, u32> = HashMap::new();
            for token in tokenize(&review.text) {
                let ordinal = token_ords.get(token.as_str()).copied().ok_or_else(|| {
                    IndexError::Corruption(format!("token {token:?} missing from universe"))
                })?;
                *counts.entry(ordinal).or_insert(0) += 1;
            }
            let triples: Vec<Triple> = counts
                .into_iter()
                .map(|(ordinal, frequency)| Triple { ordinal, review_id, frequency })
                .collect();
            token_sorter.push_review(triples)?;

            let ordinal = product_ords
                .get(review.product_id.as_str())
                .copied()
                .ok_or_else(|| {
                    IndexError::Corruption(format!(
                        "product {:?} missing from universe",
                        review.product_id
                    ))
                })?;
            product_sorter.push_review([Triple { ordinal, review_id, frequency: 1 }])?;
            review_id += 1;
        }
        token_sorter.finish(token_run)?;
        product_sorter.finish(product_run)?;
        Ok(())
    }
}

/// Delete an index directory and everything in it, temp files included.
pub fn remove_index(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    Ok(())
}

fn prepare_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        for name in ARTIFACT_FILES {
            let path = dir.join(name);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        let meta = dir.join(META_FILE);
        if meta.exists() {
            fs::remove_file(&meta)?;
        }
        let tmp = dir.join(TMP_DIR);
        if tmp.exists() {
            fs::remove_dir_all(&tmp)?;
        }
    } else {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn write_meta(
    dir: &Path,
    review_data: &ReviewData,
    distinct_tokens: u32,
    distinct_products: u32,
) -> Result<()> {
    let created_at = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| String::new());
    let meta = IndexMeta {
        version: FORMAT_VERSION,
        created_at,
        num_reviews: review_data.num_reviews(),
        distinct_tokens,
        distinct_products,
    };
    let staged = staged_path(&dir.join(META_FILE));
    let mut f = File::create(&staged)?;
    f.write_all(serde_json::to_string_pretty(&meta)?.as_bytes())?;
    drop(f);
    fs::rename(&staged, dir.join(META_FILE))?;
    Ok(())
}

/// Sibling path used to stage a file before its atomic rename into place.
pub(crate) fn staged_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
