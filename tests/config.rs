use anyhow::Result;
use topn::runner::{GIB, KIB, MIB};
use topn::{Compression, DataSize, RecordFormat, SpillCodec, TopNConfig, buffer_size_for_budget};

#[test]
fn buffer_size_divides_budget_across_workers_and_partitions() {
    assert_eq!(buffer_size_for_budget(GIB, 4, 500), 536_870);
    assert_eq!(buffer_size_for_budget(GIB, 1, 1), GIB as usize);
    // Zero divisors are treated as one.
    assert_eq!(buffer_size_for_budget(GIB, 0, 0), GIB as usize);
}

#[test]
fn buffer_size_never_drops_to_zero() {
    assert_eq!(buffer_size_for_budget(10, 4, 500), 1);
    assert_eq!(buffer_size_for_budget(0, 1, 1), 1);
}

#[test]
fn default_config_is_valid() -> Result<()> {
    let cfg = TopNConfig::default();
    cfg.validate()?;
    assert_eq!(cfg.n, 100);
    assert_eq!(cfg.n_reduce, 500);
    assert!(cfg.workers >= 1);
    assert_eq!(cfg.buffer_size, buffer_size_for_budget(GIB, cfg.workers, 500));
    assert_eq!(cfg.codec, SpillCodec::default());
    assert!(cfg.concurrent_spills);
    assert!(!cfg.keep_work_dir);
    Ok(())
}

#[test]
fn builders_set_fields() {
    let codec = SpillCodec::new(RecordFormat::Binary, Compression::Zstd);
    let cfg = TopNConfig::default()
        .with_n(7)
        .with_partitions(3)
        .with_workers(2)
        .with_buffer_size(11)
        .with_codec(codec)
        .with_concurrent_spills(false)
        .with_keep_work_dir(true);
    assert_eq!(
        (cfg.n, cfg.n_reduce, cfg.workers, cfg.buffer_size),
        (7, 3, 2, 11)
    );
    assert_eq!(cfg.codec, codec);
    assert!(!cfg.concurrent_spills);
    assert!(cfg.keep_work_dir);
}

#[test]
fn zero_settings_fail_validation() {
    assert!(TopNConfig::default().with_partitions(0).validate().is_err());
    assert!(TopNConfig::default().with_workers(0).validate().is_err());
    assert!(TopNConfig::default().with_buffer_size(0).validate().is_err());
    // n = 0 is allowed and yields an empty result.
    assert!(TopNConfig::default().with_n(0).validate().is_ok());
}

#[test]
fn data_size_parses_units() -> Result<()> {
    assert_eq!("1GB".parse::<DataSize>()?, DataSize(GIB));
    assert_eq!("512MB".parse::<DataSize>()?, DataSize(512 * MIB));
    assert_eq!("64k".parse::<DataSize>()?, DataSize(64 * KIB));
    assert_eq!(" 2 gb ".parse::<DataSize>()?, DataSize(2 * GIB));
    assert_eq!("100".parse::<DataSize>()?, DataSize(100));
    assert_eq!("100B".parse::<DataSize>()?, DataSize(100));
    Ok(())
}

#[test]
fn data_size_rejects_garbage() {
    for bad in ["", "GB", "abc", "5TB", "1.5GB", "-1MB", "99999999999999999999GB"] {
        assert!(bad.parse::<DataSize>().is_err(), "{bad:?} parsed");
    }
}

#[test]
fn data_size_displays_largest_whole_unit() {
    assert_eq!(DataSize(512).to_string(), "512byte");
    assert_eq!(DataSize(3 * KIB).to_string(), "3KB");
    assert_eq!(DataSize(700 * MIB).to_string(), "700MB");
    assert_eq!(DataSize(GIB).to_string(), "1GB");
}
