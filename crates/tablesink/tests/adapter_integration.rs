//! End-to-end tests for the write adapter against the in-memory store.
//!
//! Covers the ack/fail contract, put versioning, the write-then-increment
//! ordering, and the startup configuration layers.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tablesink::{
    AdapterOptions, ColumnList, DeliveryId, Durability, MemoryCollector, MemoryTable,
    MemoryTableClient, Outcome, PipelineConfig, Record, RecordMapper, Result, SinkError,
    StoreError, WriteAdapter,
};

// ============================================================================
// Helpers
// ============================================================================

/// Maps `{id: N}` to row `"rowN"` with whatever the `script` field asks for:
/// `cols` cells with versions from `ts`, `ctrs` counters of `delta`, or a
/// mapping failure when `malformed` is set.
struct ScriptedMapper;

impl RecordMapper for ScriptedMapper {
    fn row_key(&self, record: &Record) -> Result<Bytes> {
        if record.get("malformed").and_then(|v| v.as_bool()) == Some(true) {
            return Err(SinkError::Mapping("malformed record".to_string()));
        }
        let id = record
            .require("id")?
            .as_u64()
            .ok_or_else(|| SinkError::Mapping("id must be an integer".to_string()))?;
        Ok(Bytes::from(format!("row{}", id)))
    }

    fn columns(&self, record: &Record) -> Result<ColumnList> {
        let int = |name: &str| record.get(name).and_then(|v| v.as_i64()).unwrap_or(0);
        let mut cols = ColumnList::new();
        for i in 0..int("cols") {
            let value = record
                .get("value")
                .and_then(|v| v.as_str())
                .unwrap_or("x")
                .to_string();
            cols.add_column_at("c", format!("v{}", i), int("ts"), value);
        }
        for i in 0..int("ctrs") {
            cols.add_counter("c", format!("n{}", i), int("delta"));
        }
        Ok(cols)
    }
}

async fn prepare(
    client: &MemoryTableClient,
    durability: Durability,
) -> (WriteAdapter<MemoryTable>, MemoryCollector) {
    let collector = MemoryCollector::new();
    let options = AdapterOptions::builder("t", ScriptedMapper)
        .durability(durability)
        .build()
        .unwrap();
    let adapter = WriteAdapter::prepare(options, &PipelineConfig::new(), client, collector.clone())
        .await
        .unwrap();
    (adapter, collector)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn single_unversioned_write_is_acked() {
    let client = MemoryTableClient::with_tables(["t"]);
    let (adapter, collector) = prepare(&client, Durability::Wal).await;

    let record = Record::new(1).with_field("id", 1).with_field("cols", 1);
    assert_eq!(adapter.process(&record).await, Outcome::Acked);

    let puts = client.put_log();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].row, Bytes::from("row1"));
    assert_eq!(puts[0].cells.len(), 1);
    assert_eq!(puts[0].cells[0].family, Bytes::from("c"));
    assert_eq!(puts[0].cells[0].qualifier, Bytes::from("v0"));
    assert_eq!(puts[0].cells[0].value, Bytes::from("x"));
    assert_eq!(puts[0].cells[0].version, None);
    assert!(client.increment_log().is_empty());
    assert_eq!(collector.signals(), vec![(DeliveryId(1), Outcome::Acked)]);
}

#[tokio::test]
async fn single_increment_is_acked_without_write() {
    let client = MemoryTableClient::with_tables(["t"]);
    let (adapter, collector) = prepare(&client, Durability::Wal).await;

    let record = Record::new(2)
        .with_field("id", 2)
        .with_field("ctrs", 1)
        .with_field("delta", 5);
    assert_eq!(adapter.process(&record).await, Outcome::Acked);

    let increments = client.increment_log();
    assert_eq!(increments.len(), 1);
    assert_eq!(increments[0].row, Bytes::from("row2"));
    assert_eq!(increments[0].deltas[0].family, Bytes::from("c"));
    assert_eq!(increments[0].deltas[0].qualifier, Bytes::from("n0"));
    assert_eq!(increments[0].deltas[0].delta, 5);
    assert!(client.put_log().is_empty());
    assert_eq!(client.counter("t", b"row2", b"c", b"n0"), Some(5));
    assert_eq!(collector.signals(), vec![(DeliveryId(2), Outcome::Acked)]);
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn row_key_is_deterministic() {
    let client = MemoryTableClient::with_tables(["t"]);
    let (adapter, _collector) = prepare(&client, Durability::Wal).await;

    let record = Record::new(9).with_field("id", 77).with_field("cols", 2);
    let first = adapter.row_key(&record).unwrap();
    for _ in 0..100 {
        assert_eq!(adapter.row_key(&record).unwrap(), first);
    }
}

#[tokio::test]
async fn versions_follow_timestamp_sign() {
    let client = MemoryTableClient::with_tables(["t"]);
    let (adapter, _collector) = prepare(&client, Durability::Wal).await;

    for (id, ts) in [(1u64, 0i64), (2, -7), (3, 1_234)] {
        let record = Record::new(id)
            .with_field("id", id)
            .with_field("cols", 2)
            .with_field("ts", ts);
        assert_eq!(adapter.process(&record).await, Outcome::Acked);
    }

    let puts = client.put_log();
    assert!(puts[0].cells.iter().all(|c| c.version.is_none()));
    assert!(puts[1].cells.iter().all(|c| c.version.is_none()));
    assert!(puts[2].cells.iter().all(|c| c.version == Some(1_234)));

    let versions = client.cell_versions("t", b"row3", b"c", b"v0");
    assert_eq!(versions, vec![(1_234, Bytes::from("x"))]);
}

#[tokio::test]
async fn empty_mutation_set_is_acked_without_store_calls() {
    let client = MemoryTableClient::with_tables(["t"]);
    let (adapter, collector) = prepare(&client, Durability::Wal).await;
    // Queued failures must stay untouched: nothing reaches the store.
    client.fail_next_put(StoreError::Io("should not be hit".to_string()));

    for id in 0..10u64 {
        let record = Record::new(id).with_field("id", id);
        assert_eq!(adapter.process(&record).await, Outcome::Acked);
    }

    assert_eq!(collector.acked(), 10);
    assert_eq!(collector.failed(), 0);
    assert!(client.put_log().is_empty());
    assert!(client.increment_log().is_empty());
}

#[tokio::test]
async fn write_failure_fails_record_and_skips_increment() {
    let client = MemoryTableClient::with_tables(["t"]);
    let (adapter, collector) = prepare(&client, Durability::Wal).await;
    client.fail_next_put(StoreError::RetriesExhausted {
        failed: 2,
        first_cause: "NotServingRegion".to_string(),
    });

    let record = Record::new(5)
        .with_field("id", 5)
        .with_field("cols", 2)
        .with_field("ctrs", 1)
        .with_field("delta", 1);
    assert_eq!(adapter.process(&record).await, Outcome::Failed);

    assert_eq!(client.put_log().len(), 1);
    assert!(client.increment_log().is_empty());
    assert_eq!(client.counter("t", b"row5", b"c", b"n0"), None);
    assert_eq!(collector.signals(), vec![(DeliveryId(5), Outcome::Failed)]);
}

#[tokio::test]
async fn increment_failure_fails_record() {
    let client = MemoryTableClient::with_tables(["t"]);
    let (adapter, collector) = prepare(&client, Durability::Wal).await;

    // Increment only.
    client.fail_next_increment(StoreError::Timeout(Duration::from_secs(60)));
    let counters_only = Record::new(1)
        .with_field("id", 1)
        .with_field("ctrs", 1)
        .with_field("delta", 3);
    assert_eq!(adapter.process(&counters_only).await, Outcome::Failed);

    // Write succeeds, increment fails.
    client.fail_next_increment(StoreError::Io("connection reset".to_string()));
    let both = Record::new(2)
        .with_field("id", 2)
        .with_field("cols", 1)
        .with_field("ctrs", 1)
        .with_field("delta", 3);
    assert_eq!(adapter.process(&both).await, Outcome::Failed);
    assert_eq!(client.cell("t", b"row2", b"c", b"v0"), Some(Bytes::from("x")));

    assert_eq!(
        collector.signals(),
        vec![
            (DeliveryId(1), Outcome::Failed),
            (DeliveryId(2), Outcome::Failed)
        ]
    );
}

#[tokio::test]
async fn mapping_failure_fails_without_store_access() {
    let client = MemoryTableClient::with_tables(["t"]);
    let (adapter, collector) = prepare(&client, Durability::Wal).await;

    let record = Record::new(3)
        .with_field("id", 3)
        .with_field("cols", 1)
        .with_field("malformed", true);
    assert_eq!(adapter.process(&record).await, Outcome::Failed);
    assert!(client.put_log().is_empty());
    assert_eq!(collector.signals_for(DeliveryId(3)), vec![Outcome::Failed]);
}

#[tokio::test]
async fn exactly_one_signal_per_record_under_random_failures() {
    let client = MemoryTableClient::with_tables(["t"]);
    let (adapter, collector) = prepare(&client, Durability::SkipWal).await;
    let mut rng = StdRng::seed_from_u64(0x5EED);

    let mut expected: HashMap<DeliveryId, Outcome> = HashMap::new();
    let mut expected_puts = 0;
    let mut expected_increments = 0;

    for id in 0..1000u64 {
        let cols: i64 = rng.gen_range(0..3);
        let ctrs: i64 = rng.gen_range(0..3);
        let malformed = rng.gen_bool(0.05);

        let record = Record::new(id)
            .with_field("id", id)
            .with_field("cols", cols)
            .with_field("ctrs", ctrs)
            .with_field("delta", rng.gen_range(-10i64..10))
            .with_field("ts", rng.gen_range(-5i64..5))
            .with_field("malformed", malformed);

        // Only inject failures a call will actually consume.
        let put_fails = !malformed && cols > 0 && rng.gen_bool(0.2);
        let inc_fails = !malformed && !put_fails && ctrs > 0 && rng.gen_bool(0.2);
        if put_fails {
            client.fail_next_put(StoreError::Io(format!("injected put failure {}", id)));
        }
        if inc_fails {
            client.fail_next_increment(StoreError::Timeout(Duration::from_millis(id)));
        }

        if !malformed && cols > 0 {
            expected_puts += 1;
        }
        if !malformed && !put_fails && ctrs > 0 {
            expected_increments += 1;
        }

        let outcome = if malformed || put_fails || inc_fails {
            Outcome::Failed
        } else {
            Outcome::Acked
        };
        expected.insert(record.id(), outcome);

        assert_eq!(adapter.process(&record).await, outcome, "record {}", id);
    }

    let signals = collector.signals();
    assert_eq!(signals.len(), 1000);
    let unique: HashSet<DeliveryId> = signals.iter().map(|(id, _)| *id).collect();
    assert_eq!(unique.len(), 1000);
    for (id, outcome) in &signals {
        assert_eq!(expected.get(id), Some(outcome), "record {}", id);
    }

    assert_eq!(client.put_log().len(), expected_puts);
    assert_eq!(client.increment_log().len(), expected_increments);
    assert!(client
        .put_log()
        .iter()
        .all(|p| p.durability == Durability::SkipWal));

    let stats = adapter.stats();
    assert_eq!(stats.processed, 1000);
    assert_eq!(stats.acked + stats.failed, 1000);
    assert_eq!(stats.acked as usize, collector.acked());
}

// ============================================================================
// Startup and shutdown
// ============================================================================

#[tokio::test]
async fn open_failure_aborts_startup() {
    let client = MemoryTableClient::with_tables(["t"]);
    client.fail_next_open(StoreError::Io("coordinator unreachable".to_string()));
    let collector = MemoryCollector::new();

    let options = AdapterOptions::builder("t", ScriptedMapper).build().unwrap();
    let result =
        WriteAdapter::prepare(options, &PipelineConfig::new(), &client, collector.clone()).await;

    match result {
        Err(SinkError::Init { table, source }) => {
            assert_eq!(table, "t");
            assert!(matches!(source, StoreError::Io(_)));
        }
        Err(other) => panic!("expected init error, got {}", other),
        Ok(_) => panic!("expected init error"),
    }
    assert!(collector.signals().is_empty());
    assert_eq!(client.close_count(), 0);
}

#[tokio::test]
async fn config_layers_reach_the_storage_client() {
    let client = MemoryTableClient::with_tables(["t"]);
    let options = AdapterOptions::builder("t", ScriptedMapper)
        .property("root.location", "hdfs://props/hbase")
        .property("coordinator.quorum", "zk1,zk2")
        .property("cluster.distributed", "false")
        .build()
        .unwrap();
    let pipeline = PipelineConfig::from([(
        "root.location".to_string(),
        "hdfs://pipeline/hbase".to_string(),
    )]);

    let adapter = WriteAdapter::prepare(options, &pipeline, &client, MemoryCollector::new())
        .await
        .unwrap();

    let config = adapter.store_config();
    assert_eq!(config.root_location, "hdfs://pipeline/hbase");
    assert_eq!(config.coordinator_quorum, "zk1,zk2");
    assert!(!config.cluster_distributed);
}

#[tokio::test]
async fn handle_closed_exactly_once() {
    let client = MemoryTableClient::with_tables(["t"]);

    let (adapter, _collector) = prepare(&client, Durability::Wal).await;
    adapter.shutdown();
    assert_eq!(client.close_count(), 1);

    let (adapter, _collector) = prepare(&client, Durability::Wal).await;
    drop(adapter);
    assert_eq!(client.close_count(), 2);
}
