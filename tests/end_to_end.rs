use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tempfile::{TempDir, tempdir};
use topn::testing::*;
use topn::{
    Compression, Partitioner, RecordFormat, Scheduler, SpillCodec, TopN, TopNConfig,
    result_file_name,
};

fn small_config(n: usize, n_reduce: usize) -> TopNConfig {
    TopNConfig::default()
        .with_n(n)
        .with_partitions(n_reduce)
        .with_workers(4)
        .with_buffer_size(64)
}

/// Write `lines` to `<dir>/input` and run; returns the result lines.
fn run_lines(dir: &TempDir, lines: &[&str], config: TopNConfig) -> Result<Vec<String>> {
    let input = dir.path().join("input");
    let output = dir.path().join("result");
    write_lines(&input, lines)?;
    TopN::new(config).run(&input, &output, dir.path().join("tmp"))?;
    read_result_lines(&output)
}

#[test]
fn counts_and_orders_by_frequency() -> Result<()> {
    let dir = tempdir()?;
    let got = run_lines(&dir, &["a", "b", "a", "c", "b", "a"], small_config(2, 3))?;
    assert_eq!(got, vec!["a: 3", "b: 2"]);
    Ok(())
}

#[test]
fn ties_keep_the_smallest_items() -> Result<()> {
    let dir = tempdir()?;
    let got = run_lines(&dir, &["z", "y", "x"], small_config(2, 3))?;
    assert_eq!(got, vec!["x: 1", "y: 1"]);
    Ok(())
}

#[test]
fn empty_input_writes_empty_result() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("input");
    let output = dir.path().join("result");
    std::fs::write(&input, "")?;

    let report = TopN::new(small_config(10, 4)).run(&input, &output, dir.path().join("tmp"))?;
    assert_eq!(report.result_lines, 0);
    assert_eq!(std::fs::read_to_string(&output)?, "");
    Ok(())
}

#[test]
fn n_larger_than_distinct_items_lists_everything() -> Result<()> {
    let dir = tempdir()?;
    let got = run_lines(&dir, &["b", "a", "b", "c"], small_config(100, 5))?;
    assert_eq!(got, vec!["b: 2", "a: 1", "c: 1"]);
    Ok(())
}

#[test]
fn zero_n_writes_empty_result() -> Result<()> {
    let dir = tempdir()?;
    let got = run_lines(&dir, &["a", "a"], small_config(0, 2))?;
    assert!(got.is_empty());
    Ok(())
}

#[test]
fn items_with_commas_survive_text_spills() -> Result<()> {
    let dir = tempdir()?;
    let lines = ["a,b", "a,b", "c,", ",d", "a,b"];
    let got = run_lines(&dir, &lines, small_config(3, 2).with_buffer_size(1))?;
    assert_eq!(got, vec!["a,b: 3", ",d: 1", "c,: 1"]);
    Ok(())
}

#[test]
fn matches_ground_truth_on_skewed_input() -> Result<()> {
    let dir = tempdir()?;
    let case = skewed_case(2_000, &[0.05, 0.04, 0.03, 0.03, 0.02], 40_000, 17)?
        .chain(uniform_case(500, 5_000, 5));
    let input = dir.path().join("input");
    case.write_to(&input)?;

    let output = result_file_name(dir.path(), 20);
    let report = TopN::new(small_config(20, 37).with_buffer_size(16)).run(
        &input,
        &output,
        dir.path().join("tmp"),
    )?;

    assert!(report.map.spills > 37, "small buffer should force repeated spills");
    assert_eq!(report.map.lines, case.lines.len() as u64);
    assert_eq!(report.distinct_items, case.counts.len() as u64);
    assert_eq!(report.records_read, report.map.records_spilled);

    let expected = format_result_lines(&ground_truth_top_n(&case.counts, 20));
    assert_result_file(&output, &expected);
    Ok(())
}

#[test]
fn embedded_carriage_returns_are_part_of_the_item() -> Result<()> {
    for concurrent in [true, false] {
        let dir = tempdir()?;
        let input = dir.path().join("input");
        let output = dir.path().join("result");
        std::fs::write(&input, "a\rb\na\rb\r\nc\n")?;

        let config = small_config(5, 3)
            .with_buffer_size(1)
            .with_concurrent_spills(concurrent);
        TopN::new(config).run(&input, &output, dir.path().join("tmp"))?;
        assert_eq!(std::fs::read_to_string(&output)?, "a\rb: 2\nc: 1\n");
    }
    Ok(())
}

#[test]
fn output_inside_work_dir_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("input");
    write_lines(&input, &["a", "b", "a"])?;
    let work = dir.path().join("tmp");
    let output = result_file_name(&work, 2);

    let err = TopN::new(small_config(2, 2))
        .run(&input, &output, &work)
        .unwrap_err();
    assert!(err.to_string().contains("inside work dir"), "{err:#}");
    assert!(!path_exists(&output));

    // The same layout with the result next to the work dir succeeds.
    let beside = result_file_name(dir.path(), 2);
    TopN::new(small_config(2, 2)).run(&input, &beside, &work)?;
    assert_result_file(&beside, &["a: 2", "b: 1"]);
    Ok(())
}

#[test]
fn zero_partitions_is_an_error_not_a_panic() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("input");
    write_lines(&input, &["a"])?;
    let err = TopN::new(small_config(1, 0))
        .run(&input, dir.path().join("out"), dir.path().join("tmp"))
        .unwrap_err();
    assert!(err.to_string().contains("n_reduce"));
    Ok(())
}

#[test]
fn single_item_input() -> Result<()> {
    let dir = tempdir()?;
    let case = single_case(1_000);
    let input = dir.path().join("input");
    case.write_to(&input)?;
    let output = dir.path().join("result");
    TopN::new(small_config(5, 8)).run(&input, &output, dir.path().join("tmp"))?;
    assert_result_file(&output, &[format!("{}: 1000", url_like(0))]);
    Ok(())
}

#[test]
fn partition_count_does_not_change_the_result() -> Result<()> {
    let dir = tempdir()?;
    let case = uniform_case(400, 8_000, 23);
    let input = dir.path().join("input");
    case.write_to(&input)?;

    let one = dir.path().join("one");
    let many = dir.path().join("many");
    TopN::new(small_config(30, 1)).run(&input, &one, dir.path().join("tmp"))?;
    TopN::new(small_config(30, 61)).run(&input, &many, dir.path().join("tmp"))?;

    assert_eq!(std::fs::read(&one)?, std::fs::read(&many)?);
    Ok(())
}

#[test]
fn repeated_runs_are_byte_identical() -> Result<()> {
    let dir = tempdir()?;
    let case = uniform_case(100, 3_000, 99);
    let input = dir.path().join("input");
    case.write_to(&input)?;

    let first = dir.path().join("first");
    let second = dir.path().join("second");
    let config = small_config(50, 7).with_buffer_size(3);
    TopN::new(config.clone()).run(&input, &first, dir.path().join("tmp"))?;
    TopN::new(config.with_concurrent_spills(false)).run(&input, &second, dir.path().join("tmp"))?;

    assert_eq!(std::fs::read(&first)?, std::fs::read(&second)?);
    assert!(files_equal(&first, &second)?);
    Ok(())
}

fn run_with_codec(codec: SpillCodec) -> Result<()> {
    let dir = tempdir()?;
    let case = skewed_case(300, &[0.2, 0.1], 6_000, 4)?;
    let input = dir.path().join("input");
    case.write_to(&input)?;
    let output = dir.path().join("result");

    TopN::new(small_config(10, 9).with_buffer_size(5).with_codec(codec)).run(
        &input,
        &output,
        dir.path().join("tmp"),
    )?;
    assert_result_file(&output, &format_result_lines(&ground_truth_top_n(&case.counts, 10)));
    Ok(())
}

#[cfg(feature = "spilling")]
#[test]
fn binary_spills_give_the_same_result() -> Result<()> {
    run_with_codec(SpillCodec::new(RecordFormat::Binary, Compression::None))
}

#[cfg(feature = "compression-gzip")]
#[test]
fn gzip_spills_give_the_same_result() -> Result<()> {
    run_with_codec(SpillCodec::new(RecordFormat::Text, Compression::Gzip))
}

#[cfg(all(feature = "compression-zstd", feature = "spilling"))]
#[test]
fn zstd_binary_spills_give_the_same_result() -> Result<()> {
    run_with_codec(SpillCodec::new(RecordFormat::Binary, Compression::Zstd))
}

#[test]
fn work_dir_is_removed_after_success() -> Result<()> {
    let dir = tempdir()?;
    let work = dir.path().join("tmp");
    run_lines(&dir, &["a", "b"], small_config(1, 4))?;
    assert!(!path_exists(&work));
    Ok(())
}

#[test]
fn kept_work_dir_is_empty_after_success() -> Result<()> {
    let dir = tempdir()?;
    let work = dir.path().join("tmp");
    run_lines(&dir, &["a", "b"], small_config(1, 4).with_keep_work_dir(true))?;
    assert!(work.is_dir());
    assert_eq!(std::fs::read_dir(&work)?.count(), 0);
    Ok(())
}

#[test]
fn stale_work_dir_contents_are_cleared() -> Result<()> {
    let dir = tempdir()?;
    let work = dir.path().join("tmp");
    std::fs::create_dir_all(&work)?;
    // Leftovers from an interrupted run must not leak into this one.
    std::fs::write(work.join("mrtmp-0"), "a,1000\n")?;
    std::fs::write(work.join("unrelated"), "x")?;

    let got = run_lines(&dir, &["a", "b", "b"], small_config(2, 1).with_keep_work_dir(true))?;
    assert_eq!(got, vec!["b: 2", "a: 1"]);
    assert!(!work.join("unrelated").exists());
    Ok(())
}

#[test]
fn failed_run_writes_no_result() -> Result<()> {
    let dir = tempdir()?;
    let output = dir.path().join("result");
    let res = TopN::new(small_config(3, 2)).run(
        dir.path().join("missing-input"),
        &output,
        dir.path().join("tmp"),
    );
    assert!(res.is_err());
    assert!(!path_exists(&output));
    Ok(())
}

#[test]
fn invalid_config_is_rejected_before_any_work() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("input");
    write_lines(&input, &["a"])?;
    let work = dir.path().join("tmp");

    for config in [
        small_config(1, 0),
        small_config(1, 2).with_workers(0),
        small_config(1, 2).with_buffer_size(0),
    ] {
        assert!(TopN::new(config).run(&input, dir.path().join("out"), &work).is_err());
    }
    assert!(!path_exists(&work));
    Ok(())
}

#[test]
fn shared_scheduler_serves_several_runs() -> Result<()> {
    let dir = tempdir()?;
    let mut pool = Scheduler::new(3);
    pool.start()?;

    let job = TopN::new(small_config(2, 5));
    for (i, lines) in [vec!["a", "b", "b"], vec!["q", "r", "q", "q", "s", "s"]].iter().enumerate() {
        let input = dir.path().join(format!("input-{i}"));
        let output = dir.path().join(format!("result-{i}"));
        write_lines(&input, lines.as_slice())?;
        job.run_with(&pool, &input, &output, dir.path().join("tmp"))?;
    }
    assert!(pool.is_running());
    pool.shutdown();

    assert_result_file(dir.path().join("result-0"), &["b: 2", "a: 1"]);
    assert_result_file(dir.path().join("result-1"), &["q: 3", "s: 2"]);
    Ok(())
}

#[test]
fn run_with_requires_a_started_scheduler() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("input");
    write_lines(&input, &["a"])?;
    let pool = Scheduler::new(1);
    let err = TopN::new(small_config(1, 1))
        .run_with(&pool, &input, dir.path().join("out"), dir.path().join("tmp"))
        .unwrap_err();
    assert!(err.to_string().contains("not started"));
    Ok(())
}

/// Routes by item length, so unrelated items share partitions heavily.
struct ByLength;

impl Partitioner for ByLength {
    fn partitions(&self) -> usize {
        3
    }

    fn partition(&self, item: &str) -> usize {
        item.len() % 3
    }
}

#[test]
fn custom_partitioner_gives_the_same_result() -> Result<()> {
    let dir = tempdir()?;
    let case = uniform_case(200, 4_000, 8);
    let input = dir.path().join("input");
    case.write_to(&input)?;
    let output = dir.path().join("result");

    let job = TopN::new(small_config(15, 500).with_buffer_size(7)).with_partitioner(Arc::new(ByLength));
    assert_eq!(job.config().n_reduce, 3);
    let report = job.run(&input, &output, dir.path().join("tmp"))?;
    assert_eq!(report.partitions, 3);
    assert_result_file(&output, &format_result_lines(&ground_truth_top_n(&case.counts, 15)));
    Ok(())
}

#[test]
fn report_carries_run_metrics() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("input");
    let output = dir.path().join("result");
    write_lines(&input, &["a", "b", "a", "c", "b", "a"])?;

    let report = TopN::new(small_config(2, 1).with_buffer_size(1)).run(
        &input,
        &output,
        dir.path().join("tmp"),
    )?;
    let m = &report.metrics;
    assert_eq!(m.counter("input_lines"), Some(6));
    assert_eq!(m.counter("spills"), Some(6));
    assert_eq!(m.counter("records_spilled"), Some(6));
    assert_eq!(m.counter("partition_records_read"), Some(6));
    assert_eq!(m.counter("distinct_items"), Some(3));
    assert_eq!(m.counter("result_lines"), Some(2));
    for phase in ["map", "reduce", "merge"] {
        assert!(m.phase(phase).is_some(), "missing phase {phase}");
    }
    assert!(m.elapsed().is_some());

    let json = m.to_json();
    assert_eq!(json["counters"]["input_lines"], 6);
    assert!(json["execution_time_ms"].is_number());

    let metrics_path = dir.path().join("metrics.json");
    m.save_to_file(&metrics_path)?;
    let parsed: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&metrics_path)?)?;
    assert_eq!(parsed["counters"]["distinct_items"], 3);
    Ok(())
}

#[test]
fn result_file_name_follows_convention() {
    assert_eq!(
        result_file_name("/data", 100),
        Path::new("/data").join("top-100-result")
    );
}
