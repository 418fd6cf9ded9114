use crate::gen::Record;
use std::fmt::Write;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("batch size must be greater than zero")]
    ZeroBatchSize,

    #[error("no records to batch")]
    NoRecords,
}

/// One pre-rendered multi-row upsert covering a contiguous slice of the
/// record sequence; a single network round-trip when executed.
///
/// The statement increments `bytes` and `hits` on key collisions, so
/// replaying a batch merges instead of corrupting — workers cycle through
/// their subset indefinitely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBatch {
    /// Position of this batch in the build order.
    pub index: usize,
    /// Number of rows covered by this batch.
    pub rows: u64,
    pub sql: String,
}

/// Splits `records` into `ceil(n / batch_size)` batches of contiguous
/// slices, in input order; the last batch may be shorter. Pure function of
/// the input sequence and the batch size.
pub fn build_batches(
    table: &str,
    records: &[Record],
    batch_size: usize,
) -> Result<Vec<QueryBatch>, QueryError> {
    if batch_size == 0 {
        return Err(QueryError::ZeroBatchSize);
    }
    if records.is_empty() {
        return Err(QueryError::NoRecords);
    }

    let mut batches = Vec::with_capacity(records.len().div_ceil(batch_size));
    for (index, chunk) in records.chunks(batch_size).enumerate() {
        batches.push(QueryBatch {
            index,
            rows: chunk.len() as u64,
            sql: render_upsert(table, chunk),
        });
    }
    Ok(batches)
}

fn render_upsert(table: &str, rows: &[Record]) -> String {
    let mut sql = format!(
        "insert into {} (customer_code, subcustomer_id, geographic_region, \
         billing_flag, ip_address, bytes, hits) values ",
        table
    );
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            sql.push(',');
        }
        // Generated strings are uppercase letters and dotted digits, so
        // inline quoting needs no escaping.
        let _ = write!(
            sql,
            "({}, '{}', {}, {}, '{}', {}, {})",
            row.customer_code,
            row.subcustomer_id,
            row.geographic_region,
            row.billing_flag,
            row.ip_address,
            row.bytes,
            row.hits
        );
    }
    sql.push_str(
        " on duplicate key update bytes = values(bytes) + bytes, \
         hits = values(hits) + hits",
    );
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gen::generate_records;

    fn value_tuples(sql: &str) -> usize {
        // One "('" per rendered row: the subcustomer_id is the first quoted
        // column of every tuple.
        sql.matches(", '").count() / 2
    }

    #[test]
    fn test_batch_count_is_ceiling() {
        let records = generate_records(10, 3);
        for batch_size in [1usize, 2, 3, 4, 10, 11] {
            let batches = build_batches("records", &records, batch_size).unwrap();
            assert_eq!(batches.len(), (10 + batch_size - 1) / batch_size);
        }
    }

    #[test]
    fn test_batches_partition_the_input() {
        let records = generate_records(10, 3);
        let batches = build_batches("records", &records, 4).unwrap();
        assert_eq!(
            batches.iter().map(|b| b.rows).collect::<Vec<_>>(),
            vec![4, 4, 2]
        );
        let total: u64 = batches.iter().map(|b| b.rows).sum();
        assert_eq!(total, 10);
        for (i, batch) in batches.iter().enumerate() {
            assert_eq!(batch.index, i);
            assert_eq!(value_tuples(&batch.sql), batch.rows as usize);
        }
        // First record of the input renders into the first batch, last into
        // the last: slices are contiguous and in order.
        assert!(batches[0].sql.contains(&records[0].subcustomer_id));
        assert!(batches[2].sql.contains(&records[9].subcustomer_id));
    }

    #[test]
    fn test_batches_are_deterministic() {
        let records = generate_records(20, 5);
        let a = build_batches("records", &records, 7).unwrap();
        let b = build_batches("records", &records, 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_batches_are_replay_safe_upserts() {
        let records = generate_records(3, 1);
        let batches = build_batches("records", &records, 2).unwrap();
        for batch in &batches {
            assert!(batch.sql.starts_with("insert into records "));
            assert!(batch.sql.ends_with("hits = values(hits) + hits"));
        }
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let records = generate_records(3, 1);
        assert!(matches!(
            build_batches("records", &records, 0),
            Err(QueryError::ZeroBatchSize)
        ));
        assert!(matches!(
            build_batches("records", &[], 5),
            Err(QueryError::NoRecords)
        ));
    }
}
