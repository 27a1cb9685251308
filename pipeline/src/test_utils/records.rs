use serde_json::Value;

use crate::types::Record;

/// Field holding the identifier of test records.
pub const ID_FIELD: &str = "id";

pub fn record_with_id(id: u64) -> Record {
    Record::new()
        .with(ID_FIELD, id)
        .with("name", format!("record-{id}"))
}

/// Records with ids `0..count`.
pub fn records_with_ids(count: u64) -> Vec<Record> {
    (0..count).map(record_with_id).collect()
}

pub fn record_id(record: &Record) -> Option<u64> {
    record.get(ID_FIELD).and_then(Value::as_u64)
}

/// Ids of `records`, sorted.
pub fn sorted_ids(records: &[Record]) -> Vec<u64> {
    let mut ids = records.iter().filter_map(record_id).collect::<Vec<_>>();
    ids.sort_unstable();

    ids
}
