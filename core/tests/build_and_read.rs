//! End-to-end construction tests: build an index from a small corpus and
//! exercise the full read contract against it.

use reviewrank_core::dictionary::Dictionary;
use reviewrank_core::postings::decode_postings;
use reviewrank_core::writer::{
    remove_index, IndexWriter, ARTIFACT_FILES, META_FILE, TOKEN_DICT_FILE, TOKEN_POSTINGS_FILE,
};
use reviewrank_core::{IndexError, IndexReader};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const CORPUS: &str = "\
product/productId: B0002
review/helpfulness: 2/3
review/score: 4.5
review/text: Great dog food. My dog
loves it!
product/productId: B0001
review/helpfulness: 0/0
review/score: 1.0
review/text: Awful. The dog refused it.
product/productId: B0002
review/helpfulness: 5/5
review/score: 5.0
review/text: great great great food
";

fn build(dir: &Path, corpus: &str) -> PathBuf {
    let corpus_path = dir.join("corpus.txt");
    fs::write(&corpus_path, corpus).unwrap();
    let index_dir = dir.join("index");
    IndexWriter::new().write(&corpus_path, &index_dir).unwrap();
    index_dir
}

#[test]
fn build_creates_all_artifacts_and_cleans_tmp() {
    let dir = tempdir().unwrap();
    let index_dir = build(dir.path(), CORPUS);
    for name in ARTIFACT_FILES {
        assert!(index_dir.join(name).exists(), "missing artifact {name}");
    }
    assert!(index_dir.join(META_FILE).exists());
    assert!(!index_dir.join("tmp").exists(), "temp dir not reclaimed");
}

#[test]
fn reader_answers_the_full_contract() {
    let dir = tempdir().unwrap();
    let index_dir = build(dir.path(), CORPUS);
    let reader = IndexReader::open(&index_dir).unwrap();

    assert_eq!(reader.num_reviews(), 3);
    // review lengths: 7 + 5 + 4 tokens
    assert_eq!(reader.total_tokens(), 16);

    // "great" appears in reviews 0 (once) and 2 (three times)
    assert_eq!(reader.token_document_frequency("great"), 2);
    assert_eq!(reader.token_collection_frequency("great"), 4);
    assert_eq!(
        reader.reviews_with_token("great").unwrap(),
        vec![(0, 1), (2, 3)]
    );
    // "dog" appears in reviews 0 (twice) and 1 (once)
    assert_eq!(reader.reviews_with_token("dog").unwrap(), vec![(0, 2), (1, 1)]);

    // unknown terms are absent, not errors
    assert_eq!(reader.token_document_frequency("zebra"), 0);
    assert_eq!(reader.token_collection_frequency("zebra"), 0);
    assert!(reader.reviews_with_token("zebra").unwrap().is_empty());

    // product postings collect each product's reviews in corpus order
    assert_eq!(reader.reviews_of_product("B0002").unwrap(), vec![0, 2]);
    assert_eq!(reader.reviews_of_product("B0001").unwrap(), vec![1]);
    assert!(reader.reviews_of_product("B9999").unwrap().is_empty());

    let meta = reader.review_metadata(0).unwrap();
    assert_eq!(meta.product_id, "B0002");
    assert_eq!(meta.score, 4); // 4.5 truncates
    assert_eq!(meta.helpfulness_numerator, 2);
    assert_eq!(meta.helpfulness_denominator, 3);
    assert_eq!(meta.length, 7);

    // out of range is a contract violation, distinct from "absent"
    let err = reader.review_metadata(3).unwrap_err();
    assert!(matches!(err, IndexError::ReviewOutOfRange(3)));
}

#[test]
fn document_frequencies_sum_to_posting_count() {
    let dir = tempdir().unwrap();
    let index_dir = build(dir.path(), CORPUS);

    let dict = Dictionary::load(&index_dir.join(TOKEN_DICT_FILE)).unwrap();
    let blob = fs::read(index_dir.join(TOKEN_POSTINGS_FILE)).unwrap();

    let mut df_sum = 0usize;
    let mut posting_count = 0usize;
    for ordinal in 0..dict.len() as u32 {
        let entry = dict.entry(ordinal).unwrap();
        df_sum += entry.doc_frequency as usize;
        let start = entry.offset as usize;
        let list = decode_postings(&blob[start..start + entry.len as usize]).unwrap();
        posting_count += list.len();
        for pair in list.windows(2) {
            assert!(pair[0].0 < pair[1].0, "posting list not strictly increasing");
        }
    }
    assert_eq!(df_sum, posting_count);
    assert!(posting_count > 0);
}

#[test]
fn small_blocks_exercise_the_merge_path() {
    let dir = tempdir().unwrap();
    let corpus_path = dir.path().join("corpus.txt");
    let mut corpus = String::new();
    for i in 0..7 {
        corpus.push_str(&format!(
            "product/productId: P{:04}\n\
             review/helpfulness: 1/1\n\
             review/score: 3.0\n\
             review/text: shared token{} text\n",
            i % 3,
            i
        ));
    }
    fs::write(&corpus_path, &corpus).unwrap();

    let index_dir = dir.path().join("index");
    let writer = IndexWriter { block_size: 2, fan_in: 2 };
    writer.write(&corpus_path, &index_dir).unwrap();

    let reader = IndexReader::open(&index_dir).unwrap();
    assert_eq!(reader.num_reviews(), 7);
    // "shared" occurs once in every review
    assert_eq!(
        reader.reviews_with_token("shared").unwrap(),
        (0..7u32).map(|i| (i, 1u32)).collect::<Vec<_>>()
    );
    assert_eq!(reader.reviews_of_product("P0000").unwrap(), vec![0, 3, 6]);
    assert!(!index_dir.join("tmp").exists());
}

#[test]
fn rebuild_replaces_an_existing_index() {
    let dir = tempdir().unwrap();
    let index_dir = build(dir.path(), CORPUS);

    let second = "\
product/productId: C0001
review/helpfulness: 1/1
review/score: 2.0
review/text: short review
";
    let corpus_path = dir.path().join("corpus2.txt");
    fs::write(&corpus_path, second).unwrap();
    IndexWriter::new().write(&corpus_path, &index_dir).unwrap();

    let reader = IndexReader::open(&index_dir).unwrap();
    assert_eq!(reader.num_reviews(), 1);
    assert!(reader.reviews_of_product("B0002").unwrap().is_empty());
    assert_eq!(reader.reviews_of_product("C0001").unwrap(), vec![0]);
}

#[test]
fn remove_index_deletes_the_directory() {
    let dir = tempdir().unwrap();
    let index_dir = build(dir.path(), CORPUS);
    assert!(index_dir.exists());
    remove_index(&index_dir).unwrap();
    assert!(!index_dir.exists());
    // removing a missing directory is a no-op
    remove_index(&index_dir).unwrap();
}

#[test]
fn malformed_corpus_aborts_the_build() {
    let dir = tempdir().unwrap();
    let corpus_path = dir.path().join("corpus.txt");
    fs::write(
        &corpus_path,
        "product/productId: B0001\n\
         review/helpfulness: 1/1\n\
         review/score: five stars\n\
         review/text: nope\n",
    )
    .unwrap();
    let err = IndexWriter::new()
        .write(&corpus_path, &dir.path().join("index"))
        .unwrap_err();
    assert!(matches!(err, IndexError::MalformedRecord { line: 3, .. }));
}

#[test]
fn empty_corpus_builds_an_empty_index() {
    let dir = tempdir().unwrap();
    let index_dir = build(dir.path(), "");
    let reader = IndexReader::open(&index_dir).unwrap();
    assert_eq!(reader.num_reviews(), 0);
    assert_eq!(reader.total_tokens(), 0);
    assert!(reader.reviews_with_token("anything").unwrap().is_empty());
}
