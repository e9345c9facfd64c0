use core_types::PositionSnapshot;
use serde_json::Value;
use std::collections::BTreeMap;

/// Parses decoded records into snapshots, discarding records without a
/// timestamp or a positions array.
pub fn snapshots_from_records<'a>(
    records: impl IntoIterator<Item = &'a Value>,
) -> Vec<PositionSnapshot> {
    let mut discarded = 0usize;
    let snapshots: Vec<PositionSnapshot> = records
        .into_iter()
        .filter_map(|record| {
            let snapshot = PositionSnapshot::from_json(record);
            if snapshot.is_none() {
                discarded += 1;
            }
            snapshot
        })
        .collect();
    if discarded > 0 {
        tracing::debug!(
            discarded,
            kept = snapshots.len(),
            "Discarded records that are not position snapshots."
        );
    }
    snapshots
}

/// Indexes snapshots by timestamp and returns them in ascending timestamp order.
///
/// Arrival order is irrelevant except for duplicate timestamps, where the
/// snapshot that arrived last wins.
pub fn order_snapshots(snapshots: &[PositionSnapshot]) -> Vec<&PositionSnapshot> {
    let by_timestamp: BTreeMap<i64, &PositionSnapshot> =
        snapshots.iter().map(|s| (s.timestamp, s)).collect();
    by_timestamp.into_values().collect()
}
