//! Registry store integration tests.
//!
//! Several store instances share one in-memory log, standing in for several
//! processes attached to the same compacted topic.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hookdb::config::Config;
use hookdb::log::{LogClient, MemoryLog};
use hookdb::model::{derive_key, FunctionConfig, Status};
use hookdb::store::{RegistryStore, ReplayConfig, ReplayHealth, StoreError};

fn test_config(log_name: &str) -> Config {
    let mut config = Config::for_test();
    config.log.name = log_name.to_string();
    config.replay = ReplayConfig {
        min_delay_ms: 1,
        max_delay_ms: 10,
        max_restarts: 5,
    };
    config
}

fn open_node(log: &Arc<MemoryLog>, log_name: &str) -> RegistryStore {
    RegistryStore::from_config(log.clone(), &test_config(log_name))
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

mod shared_log {
    use super::*;

    #[tokio::test]
    async fn test_writes_propagate_between_nodes() {
        let log = Arc::new(MemoryLog::new());
        let a = open_node(&log, "functions");
        let b = open_node(&log, "functions");

        let mut doc = FunctionConfig::new("acme", "orders");
        doc.function_status = Status::Activated;
        let key = a.create(doc).await.unwrap();

        let (node, k) = (&b, &key);
        eventually(|| async move { node.get_by_key(k).await.is_ok() }).await;
        assert_eq!(
            b.get_by_key(&key).await.unwrap(),
            a.get_by_key(&key).await.unwrap()
        );

        b.delete("acme", "orders").await.unwrap();
        let (node, k) = (&a, &key);
        eventually(|| async move { node.get_by_key(k).await.is_err() }).await;
        assert!(a.load().await.is_empty());

        a.close().await.unwrap();
        b.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected_after_replay() {
        let log = Arc::new(MemoryLog::new());
        let a = open_node(&log, "functions");
        let key = a.create(FunctionConfig::new("t1", "fn1")).await.unwrap();

        let b = open_node(&log, "functions");
        let (node, k) = (&b, &key);
        eventually(|| async move { node.get_by_key(k).await.is_ok() }).await;

        assert!(matches!(
            b.create(FunctionConfig::new("t1", "fn1")).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_logs_are_isolated_by_name() {
        let log = Arc::new(MemoryLog::new());
        let a = open_node(&log, "functions-a");
        let b = open_node(&log, "functions-b");

        a.create(FunctionConfig::new("t1", "fn1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(a.len().await, 1);
        assert!(b.is_empty().await);
    }

    #[tokio::test]
    async fn test_restarted_node_rebuilds_from_compacted_log() {
        let log = Arc::new(MemoryLog::new());
        let writer = open_node(&log, "functions");

        for i in 0..5 {
            let name = format!("fn-{i}");
            writer.create(FunctionConfig::new("t1", &name)).await.unwrap();
            let mut update = FunctionConfig::new("t1", &name);
            update.function_status = Status::Activated;
            writer.update(update).await.unwrap();
        }
        writer.delete("t1", "fn-0").await.unwrap();
        drop(writer);

        assert_eq!(log.compact("functions").await, 6);
        assert_eq!(log.records("functions").await.len(), 5);

        let node = open_node(&log, "functions");
        let n = &node;
        eventually(|| async move { n.len().await == 4 }).await;
        for doc in node.load().await {
            assert_eq!(doc.function_status, Status::Activated);
        }
        assert!(node.get_by_topic("t1", "fn-0").await.is_err());
    }
}

mod outages {
    use super::*;

    #[tokio::test]
    async fn test_view_catches_up_after_outage() {
        let log = Arc::new(MemoryLog::new());
        let node = open_node(&log, "functions");
        let mut health = node.health_watch();
        health.wait_for(|h| h.is_tailing()).await.unwrap();

        log.set_fail_opens(true).await;
        log.disconnect_readers().await;
        health
            .wait_for(|h| !h.is_tailing())
            .await
            .unwrap();

        // Another process keeps writing while this node is cut off.
        let mut doc = FunctionConfig::new("t9", "late");
        doc.id = derive_key("t9", "late");
        doc.function_status = Status::Suspended;
        log.append("functions", doc.id.as_str(), serde_json::to_vec(&doc).unwrap())
            .await
            .unwrap();

        log.set_fail_opens(false).await;
        health.wait_for(|h| h.is_tailing()).await.unwrap();

        let (n, k) = (&node, &doc.id);
        eventually(|| async move { n.get_by_key(k).await.is_ok() }).await;
        assert_eq!(
            node.get_by_key(&doc.id).await.unwrap().function_status,
            Status::Suspended
        );
    }

    #[tokio::test]
    async fn test_append_outage_surfaces_to_caller() {
        let log = Arc::new(MemoryLog::new());
        let node = open_node(&log, "functions");
        log.set_fail_appends(true).await;

        assert!(matches!(
            node.create(FunctionConfig::new("t1", "fn1")).await,
            Err(StoreError::LogUnavailable(_))
        ));
        assert!(node.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_close_stops_replay() {
        let log = Arc::new(MemoryLog::new());
        let node = open_node(&log, "functions");
        node.health_watch()
            .wait_for(|h| h.is_tailing())
            .await
            .unwrap();

        node.close().await.unwrap();
        assert_eq!(node.health(), ReplayHealth::Stopped);
        assert_eq!(log.open_readers(), 0);
    }
}
