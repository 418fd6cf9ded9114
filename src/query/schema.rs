//! Schema setup and teardown statements for the benchmark database.
//!
//! Kept as plain statement builders so the engine never depends on them;
//! the CLI decides when (and whether) to run setup and cleanup.

pub fn create_database(database: &str) -> String {
    format!("create database if not exists {} partitions 20", database)
}

pub fn create_table(database: &str, table: &str) -> String {
    format!(
        "create table if not exists {}.{} (\
         customer_code int unsigned not null, \
         timestamp_of_data timestamp default current_timestamp, \
         subcustomer_id char(12), \
         geographic_region int unsigned not null, \
         billing_flag int unsigned not null, \
         ip_address char(20), \
         bytes bigint unsigned not null, \
         hits bigint unsigned not null, \
         primary key (timestamp_of_data, customer_code, subcustomer_id, \
         geographic_region, billing_flag, ip_address))",
        database, table
    )
}

pub fn drop_database(database: &str) -> String {
    format!("drop database {}", database)
}

/// Statements run once before the workload so the first measured batch does
/// not pay connection or transaction-mode setup costs.
pub fn warmup(database: &str) -> Vec<String> {
    vec![
        format!("use {}", database),
        "set global multistatement_transactions = 0".to_string(),
    ]
}
