mod common;

use std::path::PathBuf;

use anyhow::Result;
use assert_approx_eq::assert_approx_eq;
use common::*;
use rstest::{
    fixture,
    rstest,
};
use tempfile::TempDir;
use txquant::prelude::*;

const T1_LEN: usize = 1000;
const T2_LEN: usize = 2000;
const READ_LEN: usize = 50;
const FRAG_LEN: usize = 300;
const NUM_UNIQUE: usize = 20;

struct Fixture {
    dir:         TempDir,
    alignments:  PathBuf,
    transcripts: PathBuf,
}

fn slice(
    seq: &[u8],
    start: usize,
) -> String {
    String::from_utf8_lossy(&seq[start..start + READ_LEN]).into_owned()
}

/// `NUM_UNIQUE` pairs on t1, one pair compatible with t1 and t2, and
/// `num_unmapped` unmapped reads.
fn write_library(
    path: &std::path::Path,
    t1: &[u8],
    t2: &[u8],
    num_unmapped: usize,
) -> Result<()> {
    let mate_offset = FRAG_LEN - READ_LEN;
    let names: Vec<String> = (0..NUM_UNIQUE).map(|i| format!("frag{}", i)).collect();
    let seqs: Vec<[String; 2]> = (0..NUM_UNIQUE)
        .map(|i| {
            let pos = 10 * i;
            [slice(t1, pos), slice(t1, pos + mate_offset)]
        })
        .collect();
    let amb_t1 = [slice(t1, 500), slice(t1, 500 + mate_offset)];
    let amb_t2 = [slice(t2, 700), slice(t2, 700 + mate_offset)];
    let unmapped: Vec<String> = (0..num_unmapped).map(|i| format!("unmapped{}", i)).collect();

    let mut lines = Vec::new();
    for (i, (name, seq)) in names.iter().zip(seqs.iter()).enumerate() {
        lines.extend(SamLine::pair(
            name,
            "t1",
            (10 * i + 1) as u32,
            FRAG_LEN as u32,
            [seq[0].as_str(), seq[1].as_str()],
        ));
    }
    lines.extend(SamLine::pair(
        "ambiguous",
        "t1",
        501,
        FRAG_LEN as u32,
        [amb_t1[0].as_str(), amb_t1[1].as_str()],
    ));
    lines.extend(SamLine::pair(
        "ambiguous",
        "t2",
        701,
        FRAG_LEN as u32,
        [amb_t2[0].as_str(), amb_t2[1].as_str()],
    ));
    lines.extend(unmapped.iter().map(|name| SamLine::unmapped(name)));
    write_sam(path, &[("t1", T1_LEN), ("t2", T2_LEN)], &lines)
}

#[fixture]
fn files() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let t1 = synthetic_sequence(T1_LEN, 1);
    let t2 = synthetic_sequence(T2_LEN, 2);
    let alignments = path_in(&dir, "sample.sam");
    let transcripts = path_in(&dir, "transcripts.fa");
    write_library(&alignments, &t1, &t2, 5).unwrap();
    write_fasta(&transcripts, &[("t1", t1.as_slice()), ("t2", t2.as_slice())]).unwrap();
    Fixture {
        dir,
        alignments,
        transcripts,
    }
}

fn config() -> QuantConfig {
    QuantConfig::default()
        .with_num_group_threads(2)
        .with_mapping_cache_memory_limit(4)
}

fn open(
    alignments: Vec<PathBuf>,
    transcripts: &std::path::Path,
) -> Result<AlignmentLibrary> {
    open_with(alignments, transcripts, config())
}

fn open_with(
    alignments: Vec<PathBuf>,
    transcripts: &std::path::Path,
    config: QuantConfig,
) -> Result<AlignmentLibrary> {
    AlignmentLibrary::try_new(alignments, transcripts, "IU".parse()?, config)
}

#[rstest]
fn builds_registry_from_header(files: Fixture) -> Result<()> {
    let library = open(vec![files.alignments.clone()], &files.transcripts)?;
    assert_eq!(library.header().count(), library.transcripts().len());
    assert_eq!(library.transcripts().len(), 2);

    let t1 = &library.transcripts()[0];
    assert_eq!(t1.name(), "t1");
    assert_eq!(t1.ref_length(), T1_LEN as u32);
    assert_eq!(t1.length_class(), 0);
    assert!(t1.has_sequence());
    assert_eq!(library.transcripts()[1].length_class(), 1);
    assert_eq!(library.transcripts().id_of("t2"), Some(1));
    assert_eq!(library.transcripts().id_of("t9"), None);
    assert_eq!(library.fragment_start_dists().len(), 5);
    assert_eq!(library.length_update_state(), LengthUpdateState::Idle);
    Ok(())
}

#[rstest]
fn identical_headers_across_files(files: Fixture) -> Result<()> {
    let copy = path_in(&files.dir, "copy.sam");
    std::fs::copy(&files.alignments, &copy)?;
    let library = open(vec![files.alignments.clone(), copy], &files.transcripts)?;
    assert_eq!(library.header().count(), library.transcripts().len());

    let summary = run_pass(&library, 3);
    assert_eq!(library.num_observed_fragments(), 2 * (NUM_UNIQUE as u64 + 1 + 5));
    assert_eq!(summary.num_folded, 2 * (NUM_UNIQUE as u64 + 1));
    Ok(())
}

#[rstest]
#[case(2, 1)]
#[case(3, 2)]
#[case(4, 3)]
fn parse_workers_share_files(
    files: Fixture,
    #[case] num_parse_threads: usize,
    #[case] num_group_threads: usize,
) -> Result<()> {
    let mut alignments = vec![files.alignments.clone()];
    for i in 0..3 {
        let copy = path_in(&files.dir, &format!("copy{}.sam", i));
        std::fs::copy(&files.alignments, &copy)?;
        alignments.push(copy);
    }

    let single = open_with(
        alignments.clone(),
        &files.transcripts,
        config().with_num_parse_threads(1),
    )?;
    let expected = run_pass(&single, 2);

    let mut library = open_with(
        alignments,
        &files.transcripts,
        config()
            .with_num_parse_threads(num_parse_threads)
            .with_num_group_threads(num_group_threads),
    )?;
    for pass in 0..2 {
        if pass > 0 {
            assert!(library.reset(true, None, false));
        }
        let summary = run_pass(&library, 3);
        assert_eq!(summary.num_groups, expected.num_groups);
        assert_eq!(summary.num_folded, expected.num_folded);
        assert_eq!(library.num_observed_fragments(), single.num_observed_fragments());
        assert_eq!(library.num_mapped_fragments(), single.num_mapped_fragments());
        assert_eq!(
            library.num_uniquely_mapped_fragments(),
            single.num_uniquely_mapped_fragments()
        );
    }
    assert_eq!(expected.num_groups, 4 * (NUM_UNIQUE as u64 + 6));
    assert!(library.is_exhausted());

    let once = single.equivalence_class_builder().classes();
    let twice = library.equivalence_class_builder().classes();
    assert_eq!(once.len(), twice.len());
    for (a, b) in once.iter().zip(twice.iter()) {
        assert_eq!(a.transcripts, b.transcripts);
        assert_eq!(2 * a.count, b.count);
    }
    assert_eq!(
        single.cluster_forest().clusters(),
        library
            .cluster_forest()
            .clusters()
            .into_iter()
            .map(|mut c| {
                c.count /= 2;
                c
            })
            .collect::<Vec<_>>()
    );
    Ok(())
}

#[rstest]
#[case::renamed(&[("t1", T1_LEN), ("t3", T2_LEN)])]
#[case::resized(&[("t1", T1_LEN), ("t2", T2_LEN + 1)])]
#[case::truncated(&[("t1", T1_LEN)])]
fn differing_headers_are_rejected(
    files: Fixture,
    #[case] references: &[(&str, usize)],
) -> Result<()> {
    let other = path_in(&files.dir, "other.sam");
    write_sam(&other, references, &[])?;
    let err = open(vec![files.alignments.clone(), other], &files.transcripts)
        .err()
        .expect("inconsistent headers must fail");
    assert!(matches!(
        err.downcast_ref::<QuantError>(),
        Some(QuantError::HeaderMismatch { .. })
    ));
    Ok(())
}

#[rstest]
fn missing_inputs_are_reported(files: Fixture) {
    let missing = path_in(&files.dir, "missing.bam");
    let err = open(vec![files.alignments.clone(), missing.clone()], &files.transcripts)
        .err()
        .expect("missing alignment file must fail");
    match err.downcast_ref::<QuantError>() {
        Some(QuantError::MissingInput { kind, path }) => {
            assert_eq!(*kind, InputKind::Alignment);
            assert_eq!(path, &missing);
        },
        other => panic!("unexpected error {:?}", other),
    }

    let missing_fasta = path_in(&files.dir, "missing.fa");
    let err = open(vec![files.alignments.clone()], &missing_fasta)
        .err()
        .expect("missing transcript file must fail");
    assert!(matches!(
        err.downcast_ref::<QuantError>(),
        Some(QuantError::MissingInput {
            kind: InputKind::Transcript,
            ..
        })
    ));
}

#[rstest]
fn single_pass_aggregates_models(files: Fixture) -> Result<()> {
    let library = open(vec![files.alignments.clone()], &files.transcripts)?;
    let summary = run_pass(&library, 4);

    assert_eq!(summary.num_groups, NUM_UNIQUE as u64 + 1 + 5);
    assert_eq!(summary.num_folded, NUM_UNIQUE as u64 + 1);
    assert!(summary.updated_lengths);
    assert_eq!(library.num_observed_fragments(), NUM_UNIQUE as u64 + 6);
    assert_eq!(library.num_mapped_fragments(), NUM_UNIQUE as u64 + 1);
    assert_eq!(library.num_uniquely_mapped_fragments(), NUM_UNIQUE as u64);

    let classes = library.equivalence_class_builder().classes();
    assert_eq!(classes.len(), 2);
    assert_eq!(classes[0].transcripts, vec![0]);
    assert_eq!(classes[0].count, NUM_UNIQUE as u64);
    assert_eq!(classes[1].transcripts, vec![0, 1]);
    assert_eq!(classes[1].count, 1);
    assert!(library.cluster_forest().same(0, 1));

    let fld = library.fragment_length_dist();
    assert_eq!(fld.num_observed(), NUM_UNIQUE as u64);
    assert!(fld.mean() > 250.0);

    // Reads were cut from the transcripts, so nothing mismatches.
    let errors = library.error_model().snapshot();
    assert!(errors.counts.iter().sum::<f64>() > 0.0);
    assert_approx_eq!(errors.mismatch_rate(0), 0.0, 1e-12);
    assert!(library.read_bias_model().total() > 0);

    let t1 = &library.transcripts()[0];
    assert!(t1.effective_length() < T1_LEN as f64);
    assert!(t1.effective_length() >= 1.0);
    assert_eq!(library.effective_length_updates(), 1);
    Ok(())
}

#[rstest]
fn reset_replays_and_counts_passes(files: Fixture) -> Result<()> {
    let mut library = open(vec![files.alignments.clone()], &files.transcripts)?;
    run_pass(&library, 2);
    assert!(!library.update_transcript_lengths_atomic());

    assert!(library.reset(true, None, false));
    assert_eq!(library.quantification_passes(), 1);
    assert_eq!(library.length_update_state(), LengthUpdateState::Idle);
    let summary = run_pass(&library, 2);
    assert!(summary.updated_lengths);
    assert_eq!(library.effective_length_updates(), 2);

    // Counters restart each pass, models keep accumulating.
    assert_eq!(library.num_observed_fragments(), NUM_UNIQUE as u64 + 6);
    assert_eq!(
        library
            .equivalence_class_builder()
            .count(&[0]),
        Some(2 * NUM_UNIQUE as u64)
    );
    Ok(())
}

#[rstest]
fn ambiguous_only_pass(files: Fixture) -> Result<()> {
    let mut library = open(vec![files.alignments.clone()], &files.transcripts)?;
    run_pass(&library, 2);
    assert!(library.reset(false, None, true));
    assert_eq!(library.quantification_passes(), 0);

    let summary = run_pass(&library, 2);
    assert_eq!(summary.num_groups, 1);
    assert_eq!(library.num_observed_fragments(), NUM_UNIQUE as u64 + 6);
    assert_eq!(
        library
            .equivalence_class_builder()
            .count(&[0, 1]),
        Some(2)
    );
    Ok(())
}

#[rstest]
fn reset_fails_once_input_is_gone(files: Fixture) -> Result<()> {
    let mut library = open(vec![files.alignments.clone()], &files.transcripts)?;
    run_pass(&library, 2);
    let classes = library.equivalence_class_builder().classes();
    let fld = library.fragment_length_dist().dump_pmf();
    let eff_len = library.transcripts()[0].effective_length();

    std::fs::remove_file(&files.alignments)?;
    assert!(!library.reset(true, None, false));

    assert_eq!(library.quantification_passes(), 0);
    assert_eq!(library.equivalence_class_builder().classes(), classes);
    assert_eq!(library.fragment_length_dist().dump_pmf(), fld);
    assert_eq!(library.transcripts()[0].effective_length(), eff_len);
    assert_eq!(library.length_update_state(), LengthUpdateState::Done);
    Ok(())
}

#[test]
fn mapping_rate_of_unmapped_library() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let sam = path_in(&dir, "unmapped.sam");
    let fasta = path_in(&dir, "t.fa");
    let names: Vec<String> = (0..100).map(|i| format!("r{}", i)).collect();
    let lines: Vec<SamLine> = names.iter().map(|n| SamLine::unmapped(n)).collect();
    write_sam(&sam, &[("t1", T1_LEN)], &lines)?;
    write_fasta(&fasta, &[("t1", synthetic_sequence(T1_LEN, 3).as_slice())])?;

    let library = AlignmentLibrary::try_new(vec![sam], &fasta, "U".parse()?, config())?;
    let summary = run_pass(&library, 2);
    assert_eq!(summary.num_groups, 100);
    assert_eq!(summary.num_folded, 0);
    assert_eq!(library.num_observed_fragments(), 100);
    assert_eq!(library.num_mapped_fragments(), 0);
    assert_eq!(library.effective_mapping_rate(), 0.0);
    Ok(())
}

#[test]
fn mapping_rate_is_undefined_without_fragments() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let sam = path_in(&dir, "empty.sam");
    let fasta = path_in(&dir, "t.fa");
    write_sam(&sam, &[("t1", T1_LEN)], &[])?;
    write_fasta(&fasta, &[("t1", synthetic_sequence(T1_LEN, 4).as_slice())])?;

    let library = AlignmentLibrary::try_new(vec![sam], &fasta, "U".parse()?, config())?;
    let summary = run_pass(&library, 1);
    assert_eq!(summary.num_groups, 0);
    assert!(library.effective_mapping_rate().is_nan());

    let json = serde_json::to_value(ModelSummary::from_library(&library))?;
    assert!(json["effective_mapping_rate"].is_null());
    Ok(())
}
