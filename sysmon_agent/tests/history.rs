//! Bounded history ring.

use sysmon_agent::history::{HistoryBuffer, DEFAULT_HISTORY_CAPACITY};
use sysmon_agent::types::{HistoryPoint, Snapshot};

fn point(t: i64) -> HistoryPoint {
    HistoryPoint {
        timestamp: t,
        cpu_avg: t as f64,
        mem_percent: 50.0,
    }
}

fn stamps(h: &HistoryBuffer) -> Vec<i64> {
    h.snapshot().iter().map(|p| p.timestamp).collect()
}

#[test]
fn keeps_only_the_most_recent_samples() {
    let h = HistoryBuffer::new(5);
    for t in 0..12 {
        h.append(point(t));
        assert!(h.len() <= 5);
    }
    assert_eq!(stamps(&h), vec![7, 8, 9, 10, 11]);
}

#[test]
fn partial_fill_keeps_everything_in_order() {
    let h = HistoryBuffer::new(10);
    for t in 0..3 {
        h.append(point(t));
    }
    assert_eq!(stamps(&h), vec![0, 1, 2]);
}

#[test]
fn shrinking_truncates_to_newest() {
    let h = HistoryBuffer::new(10);
    for t in 0..10 {
        h.append(point(t));
    }
    h.set_capacity(3);
    assert_eq!(h.capacity(), 3);
    assert_eq!(stamps(&h), vec![7, 8, 9]);

    h.set_capacity(6);
    h.append(point(10));
    assert_eq!(stamps(&h), vec![7, 8, 9, 10]);
}

#[test]
fn zero_capacity_is_ignored() {
    let h = HistoryBuffer::new(4);
    h.append(point(1));
    h.set_capacity(0);
    assert_eq!(h.capacity(), 4);
    assert_eq!(h.len(), 1);
    assert_eq!(HistoryBuffer::new(0).capacity(), DEFAULT_HISTORY_CAPACITY);
}

#[test]
fn snapshot_is_a_copy() {
    let h = HistoryBuffer::new(4);
    h.append(point(1));
    let before = h.snapshot();
    h.append(point(2));
    assert_eq!(before.len(), 1);
    assert_eq!(h.len(), 2);
}

#[test]
fn point_from_snapshot_uses_seconds() {
    let mut snap = Snapshot {
        timestamp: 1_700_000_000_999,
        ..Default::default()
    };
    snap.cpu.avg_usage = 12.5;
    snap.memory.used_percent = 40.0;
    let p = HistoryPoint::from(&snap);
    assert_eq!(p.timestamp, 1_700_000_000);
    assert_eq!(p.cpu_avg, 12.5);
    assert_eq!(p.mem_percent, 40.0);

    let js = serde_json::to_value(p).unwrap();
    assert_eq!(js["t"], 1_700_000_000);
    assert_eq!(js["c"], 12.5);
    assert_eq!(js["m"], 40.0);
}
