//! Benchmark data generators.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tessera_sql::data::{schema_of, ColumnDataType, RecordBatch, ScalarValue, SchemaRef};
use tessera_sql::datasource::MemoryDataSource;
use tessera_sql::QueryEngine;

const REGIONS: [&str; 4] = ["eu", "us", "apac", "latam"];

/// Schema of the generated `orders` table.
pub fn orders_schema() -> SchemaRef {
    schema_of(&[
        ("id", ColumnDataType::Long),
        ("customer_id", ColumnDataType::Long),
        ("amount", ColumnDataType::Double),
        ("region", ColumnDataType::Utf8),
    ])
}

/// Schema of the generated `customers` table.
pub fn customers_schema() -> SchemaRef {
    schema_of(&[("id", ColumnDataType::Long), ("name", ColumnDataType::Utf8)])
}

/// Generates `count` order rows spread over `customers` customer ids.
pub fn generate_orders(count: usize, customers: usize) -> Vec<Vec<ScalarValue>> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|i| {
            vec![
                ScalarValue::from(i as i64),
                ScalarValue::from(rng.gen_range(0..customers.max(1)) as i64),
                ScalarValue::from(rng.gen_range(0.0..500.0)),
                ScalarValue::from(REGIONS[rng.gen_range(0..REGIONS.len())]),
            ]
        })
        .collect()
}

/// Generates `count` customer rows.
pub fn generate_customers(count: usize) -> Vec<Vec<ScalarValue>> {
    (0..count)
        .map(|i| {
            vec![
                ScalarValue::from(i as i64),
                ScalarValue::from(format!("customer_{:06}", i)),
            ]
        })
        .collect()
}

/// Integer values that start small and grow, forcing a column through
/// each width.
pub fn widening_values(count: usize) -> Vec<ScalarValue> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..count)
        .map(|i| {
            let bound = match i * 4 / count.max(1) {
                0 => i64::from(u8::MAX),
                1 => i64::from(i16::MAX),
                2 => i64::from(i32::MAX),
                _ => i64::MAX,
            };
            ScalarValue::from(rng.gen_range(0..bound))
        })
        .collect()
}

/// Builds the orders table as one batch.
pub fn orders_batch(count: usize, customers: usize) -> RecordBatch {
    match RecordBatch::from_rows(orders_schema(), generate_orders(count, customers)) {
        Ok(batch) => batch,
        Err(e) => panic!("generated orders do not fit their schema: {e}"),
    }
}

/// Creates an engine with `orders` and `customers` registered.
pub fn shop_engine(orders: usize, customers: usize) -> QueryEngine {
    let engine = QueryEngine::default();
    engine.register_table(
        "orders",
        orders_schema(),
        Arc::new(MemoryDataSource::new(
            orders_schema(),
            generate_orders(orders, customers),
        )),
    );
    engine.register_table(
        "customers",
        customers_schema(),
        Arc::new(MemoryDataSource::new(
            customers_schema(),
            generate_customers(customers),
        )),
    );
    engine
}
