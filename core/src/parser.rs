//! Streaming parser for the line-oriented review corpus.
//!
//! A record opens with a `product/productId: ` line; helpfulness and score
//! follow as their own lines; `review/text:` starts the review body, which
//! runs until the next product line or end of file.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use crate::error::{IndexError, Result};
use crate::tokenizer::tokenize;

const PRODUCT_PREFIX: &str = "product/productId: ";
const HELPFULNESS_PREFIX: &str = "review/helpfulness: ";
const SCORE_PREFIX: &str = "review/score: ";
const TEXT_PREFIX: &str = "review/text:";

/// One corpus record, fields extracted, text joined across lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReview {
    pub product_id: String,
    pub helpfulness_numerator: u16,
    pub helpfulness_denominator: u16,
    pub score: u8,
    pub text: String,
}

struct PartialReview {
    product_id: String,
    opened_at: usize,
    helpfulness: Option<(u16, u16)>,
    score: Option<u8>,
    text: String,
    in_text: bool,
}

/// Pull parser over a corpus file; `next_review` yields records in corpus
/// order, so review ids are implicit (0-based position).
pub struct CorpusReader {
    lines: Lines<BufReader<File>>,
    line_no: usize,
    pending: Option<PartialReview>,
    done: bool,
}

impl CorpusReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            line_no: 0,
            pending: None,
            done: false,
        })
    }

    pub fn next_review(&mut self) -> Result<Option<RawReview>> {
        if self.done {
            return Ok(None);
        }
        loop {
            let line = match self.lines.next() {
                Some(line) => line?,
                None => {
                    self.done = true;
                    return match self.pending.take() {
                        Some(partial) => finalize(partial).map(Some),
                        None => Ok(None),
                    };
                }
            };
            self.line_no += 1;

            if let Some(rest) = line.strip_prefix(PRODUCT_PREFIX) {
                let next = PartialReview {
                    product_id: rest.trim().to_string(),
                    opened_at: self.line_no,
                    helpfulness: None,
                    score: None,
                    text: String::new(),
                    in_text: false,
                };
                if let Some(finished) = self.pending.replace(next) {
                    return finalize(finished).map(Some);
                }
                continue;
            }

            let Some(partial) = self.pending.as_mut() else {
                continue; // content before the first record
            };

            // Once inside a text block, only a new product line ends it.
            if partial.in_text {
                partial.text.push(' ');
                partial.text.push_str(&line);
            } else if let Some(rest) = line.strip_prefix(HELPFULNESS_PREFIX) {
                partial.helpfulness = Some(parse_helpfulness(rest, self.line_no)?);
            } else if let Some(rest) = line.strip_prefix(SCORE_PREFIX) {
                partial.score = Some(parse_score(rest, self.line_no)?);
            } else if let Some(rest) = line.strip_prefix(TEXT_PREFIX) {
                partial.text = rest.to_string();
                partial.in_text = true;
            }
        }
    }
}

fn finalize(partial: PartialReview) -> Result<RawReview> {
    let (helpfulness_numerator, helpfulness_denominator) =
        partial.helpfulness.ok_or_else(|| IndexError::MalformedRecord {
            line: partial.opened_at,
            reason: "record has no review/helpfulness field".to_string(),
        })?;
    let score = partial.score.ok_or_else(|| IndexError::MalformedRecord {
        line: partial.opened_at,
        reason: "record has no review/score field".to_string(),
    })?;
    Ok(RawReview {
        product_id: partial.product_id,
        helpfulness_numerator,
        helpfulness_denominator,
        score,
        text: partial.text,
    })
}

fn parse_helpfulness(raw: &str, line: usize) -> Result<(u16, u16)> {
    let malformed = || IndexError::MalformedRecord {
        line,
        reason: format!("bad helpfulness {raw:?}, expected numerator/denominator"),
    };
    let (num, den) = raw.trim().split_once('/').ok_or_else(malformed)?;
    let numerator = num.parse::<u16>().map_err(|_| malformed())?;
    let denominator = den.parse::<u16>().map_err(|_| malformed())?;
    Ok((numerator, denominator))
}

/// Scores arrive as decimals ("4.0"); keep the truncated integer part.
fn parse_score(raw: &str, line: usize) -> Result<u8> {
    let integer_part = raw.trim().split('.').next().unwrap_or("");
    integer_part
        .parse::<u8>()
        .map_err(|_| IndexError::MalformedRecord {
            line,
            reason: format!("bad score {raw:?}"),
        })
}

/// Everything the first corpus pass produces: the two distinct-string
/// universes and the per-review metadata columns. Product ids are interned
/// (first-seen order) so each review stores a small index, remapped to sorted
/// ordinals by the index writer.
#[derive(Debug, Default)]
pub struct CorpusStats {
    pub token_set: HashSet<String>,
    pub product_names: Vec<String>,
    pub review_products: Vec<u32>,
    pub scores: Vec<u8>,
    pub helpfulness_numerator: Vec<u16>,
    pub helpfulness_denominator: Vec<u16>,
    pub token_counts: Vec<u16>,
}

impl CorpusStats {
    pub fn num_reviews(&self) -> u32 {
        self.scores.len() as u32
    }
}

/// First corpus pass: collect universes and metadata in one sequential scan.
pub fn collect_stats(corpus: &Path) -> Result<CorpusStats> {
    let mut reader = CorpusReader::open(corpus)?;
    let mut stats = CorpusStats::default();
    let mut product_intern: HashMap<String, u32> = HashMap::new();

    while let Some(review) = reader.next_review()? {
        let RawReview {
            product_id,
            helpfulness_numerator,
            helpfulness_denominator,
            score,
            text,
        } = review;

        let tokens = tokenize(&text);
        stats
            .token_counts
            .push(tokens.len().min(u16::MAX as usize) as u16);
        for token in tokens {
            stats.token_set.insert(token);
        }

        let intern_id = match product_intern.get(product_id.as_str()) {
            Some(&id) => id,
            None => {
                let id = stats.product_names.len() as u32;
                product_intern.insert(product_id.clone(), id);
                stats.product_names.push(product_id);
                id
            }
        };
        stats.review_products.push(intern_id);
        stats.scores.push(score);
        stats.helpfulness_numerator.push(helpfulness_numerator);
        stats.helpfulness_denominator.push(helpfulness_denominator);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn corpus_file(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parses_fields_and_multiline_text() {
        let f = corpus_file(
            "product/productId: B0001\n\
             review/helpfulness: 2/3\n\
             review/score: 4.5\n\
             review/summary: ignored\n\
             review/text: Great dog food.\n\
             My dog loves it!\n\
             product/productId: B0002\n\
             review/helpfulness: 0/0\n\
             review/score: 1\n\
             review/text: awful\n",
        );
        let mut reader = CorpusReader::open(f.path()).unwrap();

        let first = reader.next_review().unwrap().unwrap();
        assert_eq!(first.product_id, "B0001");
        assert_eq!(first.helpfulness_numerator, 2);
        assert_eq!(first.helpfulness_denominator, 3);
        assert_eq!(first.score, 4); // 4.5 truncates
        assert_eq!(first.text, " Great dog food. My dog loves it!");

        let second = reader.next_review().unwrap().unwrap();
        assert_eq!(second.product_id, "B0002");
        assert_eq!(second.score, 1);
        assert!(reader.next_review().unwrap().is_none());
    }

    #[test]
    fn malformed_helpfulness_is_fatal() {
        let f = corpus_file(
            "product/productId: B0001\n\
             review/helpfulness: lots\n\
             review/score: 4.0\n\
             review/text: fine\n",
        );
        let mut reader = CorpusReader::open(f.path()).unwrap();
        let err = reader.next_review().unwrap_err();
        assert!(matches!(err, IndexError::MalformedRecord { line: 2, .. }));
    }

    #[test]
    fn missing_score_is_fatal() {
        let f = corpus_file(
            "product/productId: B0001\n\
             review/helpfulness: 1/1\n\
             review/text: fine\n",
        );
        let mut reader = CorpusReader::open(f.path()).unwrap();
        let err = reader.next_review().unwrap_err();
        assert!(matches!(err, IndexError::MalformedRecord { line: 1, .. }));
    }

    #[test]
    fn collects_universes_and_metadata() {
        let f = corpus_file(
            "product/productId: B0002\n\
             review/helpfulness: 1/2\n\
             review/score: 5.0\n\
             review/text: good good stuff\n\
             product/productId: B0001\n\
             review/helpfulness: 0/0\n\
             review/score: 2.0\n\
             review/text: bad stuff\n\
             product/productId: B0002\n\
             review/helpfulness: 3/3\n\
             review/score: 4.0\n\
             review/text: more good stuff\n",
        );
        let stats = collect_stats(f.path()).unwrap();
        assert_eq!(stats.num_reviews(), 3);
        assert_eq!(stats.token_counts, vec![3, 2, 3]);
        assert_eq!(stats.scores, vec![5, 2, 4]);
        // distinct tokens across all reviews
        let mut tokens: Vec<&str> = stats.token_set.iter().map(String::as_str).collect();
        tokens.sort_unstable();
        assert_eq!(tokens, vec!["bad", "good", "more", "stuff"]);
        // interning keeps first-seen order, reviews reference it
        assert_eq!(stats.product_names, vec!["B0002", "B0001"]);
        assert_eq!(stats.review_products, vec![0, 1, 0]);
    }
}
