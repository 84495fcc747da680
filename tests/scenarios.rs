//! Integration tests reproducing the concrete end-to-end scenarios, driven
//! entirely through the public `confluo` API (no `crate::` internals).

use confluo::{ConfluoError, EngineConfig, MetadataRecord, Multilog, TimeSeries};

fn fields() -> Vec<(String, confluo::DataType)> {
    use confluo::DataType;
    vec![("a".into(), DataType::Bool), ("b".into(), DataType::Int), ("d".into(), DataType::Long)]
}

fn record(ts: u64, a: bool, b: i32, d: i64) -> Vec<u8> {
    let mut bytes = vec![0u8; 8 + 1 + 4 + 8];
    bytes[0..8].copy_from_slice(&ts.to_ne_bytes());
    bytes[8] = a as u8;
    bytes[9..13].copy_from_slice(&b.to_ne_bytes());
    bytes[13..21].copy_from_slice(&d.to_ne_bytes());
    bytes
}

/// S1 — minimal round trip: append then read back the same bytes.
#[test]
fn s1_minimal_round_trip() {
    let m = Multilog::new("s1", fields(), EngineConfig::default());
    let off = m.append(&record(0, true, 1, 2)).unwrap();
    assert_eq!(m.read(off).unwrap(), record(0, true, 1, 2));
}

/// S2 — filter + aggregate: SUM(d) over records where a == true is 32.
#[test]
fn s2_filter_and_aggregate_sum() {
    let m = Multilog::new("s2", fields(), EngineConfig::default());
    m.add_filter("f1", "a == true").unwrap();
    m.add_aggregate("agg1", "f1", "SUM(d)").unwrap();
    for (i, (a, d)) in [(false, 0), (true, 2), (false, 4), (true, 6), (false, 8), (true, 10), (false, 12), (true, 14)]
        .into_iter()
        .enumerate()
    {
        m.append(&record(i as u64, a, 0, d)).unwrap();
    }
    assert_eq!(m.get_aggregate("agg1", 0, u64::MAX).unwrap().format(), "32");
}

/// S3 — index range query: `d > 4` over an indexed column returns 3 records.
#[test]
fn s3_index_range_query() {
    let m = Multilog::new("s3", fields(), EngineConfig::default());
    m.add_index("d", 1.0).unwrap();
    for i in 0..8i64 {
        m.append(&record(i as u64, false, 0, i)).unwrap();
    }
    let results = m.execute_filter("d > 4").unwrap();
    assert_eq!(results.len(), 3);
}

/// S4 — trigger firing + alert dedup.
#[test]
fn s4_trigger_fires_and_dedups() {
    let cfg = EngineConfig { monitor_tick_ms: 1, monitor_window_ms: 1000, ..EngineConfig::default() };
    let m = Multilog::new("s4", fields(), cfg);
    m.add_filter("f1", "a == true").unwrap();
    m.add_aggregate("agg1", "f1", "SUM(d)").unwrap();
    m.install_trigger("t1", "agg1 >= 10", 10).unwrap();
    for (i, (a, d)) in [(false, 0), (true, 2), (false, 4), (true, 6), (false, 8), (true, 10), (false, 12), (true, 14)]
        .into_iter()
        .enumerate()
    {
        m.append(&record(i as u64, a, 0, d)).unwrap();
    }
    m.run_monitor_tick(20);
    let alerts = m.get_alerts(0, 1000, Some("t1")).unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].value.format(), "32");

    // Dedup: a second monitor tick over the same window does not grow the set.
    m.run_monitor_tick(30);
    let alerts_again = m.get_alerts(0, 1000, Some("t1")).unwrap();
    assert_eq!(alerts_again.len(), 1);
}

/// S5 — compound query: indexes on both `a` and `b`; the planner picks the
/// cheaper-`approx_count` index for `"a == true && b > 4"`, scans it, and
/// applies the full minterm as a residual filter. Records 5 and 7 have
/// `a == true && b > 4`; everything else fails at least one conjunct.
#[test]
fn s5_compound_query_via_planner() {
    let m = Multilog::new("s5", fields(), EngineConfig::default());
    m.add_index("a", 1.0).unwrap();
    m.add_index("b", 1.0).unwrap();
    // b values chosen so exactly records 5 and 7 satisfy a==true && b>4.
    let rows = [
        (false, 0), (true, 1), (false, 2), (true, 3),
        (false, 6), (true, 6), (false, 8), (true, 9),
    ];
    for (i, (a, b)) in rows.into_iter().enumerate() {
        m.append(&record(i as u64, a, b, 0)).unwrap();
    }
    let results = m.execute_filter("a == true && b > 4").unwrap();
    assert_eq!(results.len(), 2);
    for r in &results {
        assert_eq!(r[8], 1); // a == true
        let b = i32::from_ne_bytes(r[9..13].try_into().unwrap());
        assert!(b > 4);
    }
}

/// A record that is a range-candidate under two OR'd minterms over the same
/// indexed column must be tried against both: the first (sorted) minterm's
/// residual test failing must not suppress the second minterm's match.
#[test]
fn overlapping_or_minterms_over_shared_index_do_not_drop_matches() {
    let m = Multilog::new("overlap", fields(), EngineConfig::default());
    m.add_index("d", 1.0).unwrap();
    m.append(&record(0, false, 999, 0)).unwrap();
    let results = m.execute_filter("(a == true && d == 999) || (d >= 0)").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0], record(0, false, 999, 0));
}

/// S6 — remove idempotence: a second `remove_filter` on the same name fails
/// with the exact management error, even though the filter object persists
/// (merely invalidated) underneath.
#[test]
fn s6_remove_filter_is_idempotent_failure() {
    let m = Multilog::new("s6", fields(), EngineConfig::default());
    m.add_filter("f", "d > 0").unwrap();
    m.remove_filter("f").unwrap();
    let err = m.remove_filter("f").unwrap_err();
    assert_eq!(err, ConfluoError::ManagementError("Filter f does not exist.".into()));
}

/// A metadata checkpoint survives a round trip through disk and rebuilds a
/// multilog whose structure (index + filter + aggregate) reproduces S3/S2.
#[test]
fn metadata_checkpoint_round_trip_rebuilds_structure() {
    use confluo::DataType;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s2.meta");

    {
        let mut log = confluo::MetadataLog::open(&path).unwrap();
        log.append(&MetadataRecord::Schema {
            columns: vec![
                ("timestamp".into(), DataType::ULong.type_id(), DataType::ULong.byte_size()),
                ("a".into(), DataType::Bool.type_id(), DataType::Bool.byte_size()),
                ("b".into(), DataType::Int.type_id(), DataType::Int.byte_size()),
                ("d".into(), DataType::Long.type_id(), DataType::Long.byte_size()),
            ],
        })
        .unwrap();
        log.append(&MetadataRecord::Index { field: "d".into(), bucket_size: 1.0 }).unwrap();
        log.append(&MetadataRecord::Filter { name: "f1".into(), expr: "a == true".into() }).unwrap();
        log.append(&MetadataRecord::Aggregate {
            name: "agg1".into(),
            filter_name: "f1".into(),
            expr: "SUM(d)".into(),
        })
        .unwrap();
    }

    let mut log = confluo::MetadataLog::open(&path).unwrap();
    let records = log.replay().unwrap();
    let m = Multilog::rebuild("s2-rebuilt", EngineConfig::default(), &records).unwrap();

    for (i, (a, d)) in [(false, 0), (true, 2), (false, 4), (true, 6), (false, 8), (true, 10), (false, 12), (true, 14)]
        .into_iter()
        .enumerate()
    {
        m.append(&record(i as u64, a, 0, d)).unwrap();
    }
    assert_eq!(m.get_aggregate("agg1", 0, u64::MAX).unwrap().format(), "32");
    assert_eq!(m.execute_filter("d > 4").unwrap().len(), 3);
}

/// `TimeSeries::get_range`/`get_nearest` over a plain append-only stream.
#[test]
fn time_series_range_and_nearest() {
    use confluo::DataType;
    let ts = TimeSeries::new("ticks", vec![("v".into(), DataType::Int)], EngineConfig::default());
    for (t, v) in [(0u64, 0i32), (10, 1), (20, 2), (30, 3), (40, 4)] {
        let mut bytes = vec![0u8; 8 + 4];
        bytes[0..8].copy_from_slice(&t.to_ne_bytes());
        bytes[8..12].copy_from_slice(&v.to_ne_bytes());
        ts.multilog().append(&bytes).unwrap();
    }
    let ranged = ts.get_range(15, 35).unwrap();
    assert_eq!(ranged.len(), 2);

    let nearest = ts.get_nearest(26).unwrap().unwrap();
    let ts_value = u64::from_ne_bytes(nearest[0..8].try_into().unwrap());
    assert_eq!(ts_value, 30);
}
