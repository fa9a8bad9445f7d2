//! Dispatch loop integration tests
//!
//! End-to-end cycles against the in-memory source: command dispatch,
//! batch acknowledgment, failure isolation, redelivery and concurrent
//! handler execution.

use a3s_command::{
    AckStatus, CommandDispatcher, CommandError, CommandRegistry, DispatchConfig, DispatchLoop,
    FailureHandler, FetchParams, LoopOutcome, MemoryFailureHandler, MemorySource, Message,
    MessageEntity, PollingRunner, RunnerConfig, Update, UpdateSource,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn no_wait() -> DispatchConfig {
    DispatchConfig {
        poll_timeout_secs: 0,
        ..Default::default()
    }
}

fn echo_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    registry
        .register_fn("start", |_| async { Ok(serde_json::json!("welcome")) })
        .unwrap();
    registry
        .register_fn("echo", |invocation| async move {
            Ok(serde_json::json!(invocation.arguments))
        })
        .unwrap();
    registry
        .register_fn("broken", |_| async { Err("database unavailable".into()) })
        .unwrap();
    registry
}

fn test_loop(source: Arc<dyn UpdateSource>, config: DispatchConfig) -> DispatchLoop {
    DispatchLoop::new(source, CommandDispatcher::new(echo_registry()))
        .with_config(config)
        .unwrap()
}

/// Memory source that appends to a shared log and can fail acknowledgments
struct LoggedSource {
    inner: MemorySource,
    log: Arc<Mutex<Vec<String>>>,
    fail_ack: bool,
}

impl LoggedSource {
    fn new(inner: MemorySource, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            inner,
            log,
            fail_ack: false,
        }
    }
}

#[async_trait]
impl UpdateSource for LoggedSource {
    async fn fetch_updates(&self, params: &FetchParams) -> a3s_command::Result<Vec<Update>> {
        self.inner.fetch_updates(params).await
    }

    async fn webhook_update(&self) -> a3s_command::Result<Update> {
        self.inner.webhook_update().await
    }

    fn name(&self) -> &str {
        "logged"
    }

    async fn advance_cursor(&self, offset: i64) -> a3s_command::Result<Vec<Update>> {
        self.log.lock().unwrap().push(format!("ack:{}", offset));
        if self.fail_ack {
            return Err(CommandError::Acquisition("connection reset".to_string()));
        }
        self.inner.advance_cursor(offset).await
    }
}

// ─── Pull Cycle ──────────────────────────────────────────────────

#[tokio::test]
async fn test_every_update_gets_a_record() {
    let source = Arc::new(
        MemorySource::with_updates(vec![
            Update::with_text(10, 1, "/start"),
            Update::with_text(11, 1, "hello"),
        ])
        .await,
    );
    let dispatch_loop = test_loop(source.clone(), no_wait());

    let report = dispatch_loop.process_updates().await.unwrap();

    let ids: Vec<i64> = report.records.iter().map(|r| r.update_id).collect();
    assert_eq!(ids, vec![10, 11]);
    assert_eq!(report.records[0].values(), vec![&serde_json::json!("welcome")]);
    assert!(report.records[1].outputs.is_empty());
    assert_eq!(report.ack, AckStatus::Confirmed { offset: 12 });

    // The confirmation request is a zero-timeout single-update fetch
    let requests = source.requests().await;
    let ack = requests.last().unwrap();
    assert_eq!(ack.offset, Some(12));
    assert_eq!(ack.limit, Some(1));
    assert_eq!(ack.timeout_secs, 0);
    assert!(source.pending().await.is_empty());
}

#[tokio::test]
async fn test_acknowledges_max_id_for_unordered_ids() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let inner = MemorySource::new();
    inner.push(Update::with_text(3, 1, "/start")).await;
    inner.push(Update::with_text(9, 1, "/start")).await;
    inner.push(Update::with_text(5, 1, "/start")).await;
    let source = Arc::new(LoggedSource::new(inner, log.clone()));

    let report = test_loop(source, no_wait()).process_updates().await.unwrap();
    assert_eq!(report.ack, AckStatus::Confirmed { offset: 10 });
    assert_eq!(*log.lock().unwrap(), vec!["ack:10".to_string()]);
}

#[tokio::test]
async fn test_empty_batch_is_not_acknowledged() {
    let source = Arc::new(MemorySource::new());
    let report = test_loop(source.clone(), no_wait())
        .process_updates()
        .await
        .unwrap();

    assert!(report.records.is_empty());
    assert_eq!(report.ack, AckStatus::Skipped);
    assert_eq!(source.requests().await.len(), 1);
    assert!(source.acknowledgments().await.is_empty());
}

#[tokio::test]
async fn test_multiple_commands_in_one_message() {
    let message = Message {
        entities: vec![
            MessageEntity::bot_command(0, 6),
            MessageEntity::bot_command(7, 5),
        ],
        ..Message::text(1, 1, "/start /echo hi")
    };
    let source = Arc::new(MemorySource::with_updates(vec![Update::with_message(20, message)]).await);

    let report = test_loop(source, no_wait()).process_updates().await.unwrap();
    let names: Vec<&str> = report.records[0]
        .outputs
        .iter()
        .map(|o| o.command())
        .collect();
    assert_eq!(names, vec!["start", "echo"]);
    assert_eq!(report.records[0].outputs[1].value().unwrap(), "hi");
}

// ─── Failures ────────────────────────────────────────────────────

#[tokio::test]
async fn test_failed_handler_does_not_block_batch_acknowledgment() {
    let source = Arc::new(
        MemorySource::with_updates(vec![
            Update::with_text(5, 1, "/broken"),
            Update::with_text(6, 1, "/start"),
        ])
        .await,
    );
    let sink = Arc::new(MemoryFailureHandler::default());
    let dispatch_loop = test_loop(source.clone(), no_wait()).with_failure_handler(sink.clone());

    let report = dispatch_loop.process_updates().await.unwrap();

    assert!(report.records[0].outputs[0].is_failed());
    assert_eq!(report.records[1].values(), vec![&serde_json::json!("welcome")]);
    assert_eq!(report.ack, AckStatus::Confirmed { offset: 7 });
    assert_eq!(sink.count().await.unwrap(), 1);
    assert_eq!(sink.list(1).await.unwrap()[0].reason, "Command 'broken' failed: database unavailable");
}

#[tokio::test]
async fn test_malformed_entity_does_not_abort_batch() {
    let malformed = Message {
        entities: vec![MessageEntity::bot_command(usize::MAX, 2)],
        ..Message::text(5, 1, "/start")
    };
    let source = Arc::new(
        MemorySource::with_updates(vec![
            Update::with_message(5, malformed),
            Update::with_text(6, 1, "/start"),
        ])
        .await,
    );

    let report = test_loop(source.clone(), no_wait())
        .process_updates()
        .await
        .unwrap();

    assert_eq!(report.records.len(), 2);
    assert!(report.records[0].outputs.is_empty());
    assert_eq!(report.records[1].values(), vec![&serde_json::json!("welcome")]);
    assert_eq!(report.ack, AckStatus::Confirmed { offset: 7 });
    assert!(source.pending().await.is_empty());
}

#[tokio::test]
async fn test_acknowledgment_failure_keeps_records() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let inner = MemorySource::with_updates(vec![Update::with_text(1, 1, "/start")]).await;
    let source = Arc::new(LoggedSource {
        fail_ack: true,
        ..LoggedSource::new(inner, log)
    });
    let dispatch_loop = test_loop(source.clone(), no_wait());

    let report = dispatch_loop.process_updates().await.unwrap();
    assert_eq!(report.records.len(), 1);
    assert!(matches!(report.ack, AckStatus::Failed { offset: 2, .. }));
    assert!(matches!(
        report.ack.clone().into_result(),
        Err(CommandError::Acknowledgment { offset: 2, .. })
    ));

    // Not confirmed, so the next cycle sees the same update again
    let again = dispatch_loop.process_updates().await.unwrap();
    assert_eq!(again.records[0].update_id, 1);
}

#[tokio::test]
async fn test_acquisition_failure_dispatches_nothing() {
    let source = Arc::new(MemorySource::with_updates(vec![Update::with_text(1, 1, "/start")]).await);
    source.fail_next_fetch("network unreachable").await;

    let err = test_loop(source.clone(), no_wait())
        .process_updates()
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::Acquisition(_)));
    assert!(source.acknowledgments().await.is_empty());
    assert_eq!(source.pending().await.len(), 1);
}

// ─── Redelivery ──────────────────────────────────────────────────

#[tokio::test]
async fn test_acknowledged_updates_are_not_redelivered() {
    let source = Arc::new(
        MemorySource::with_updates(vec![
            Update::with_text(1, 1, "/start"),
            Update::with_text(2, 1, "/start"),
        ])
        .await,
    );
    let dispatch_loop = test_loop(source.clone(), no_wait());

    let first = dispatch_loop.process_updates().await.unwrap();

    // A late duplicate of an acknowledged update is never delivered
    source.push(Update::with_text(2, 1, "/start")).await;
    source.push(Update::with_text(3, 1, "/start")).await;
    let second = dispatch_loop.process_updates().await.unwrap();

    let first_ids: Vec<i64> = first.records.iter().map(|r| r.update_id).collect();
    let second_ids: Vec<i64> = second.records.iter().map(|r| r.update_id).collect();
    assert_eq!(first_ids, vec![1, 2]);
    assert_eq!(second_ids, vec![3]);
    assert_eq!(source.acknowledgments().await, vec![3, 4]);
}

// ─── Webhook & Manual Trigger ────────────────────────────────────

#[tokio::test]
async fn test_webhook_update_dispatched_without_acknowledgment() {
    let source = Arc::new(MemorySource::new());
    source.push_webhook(Update::with_text(50, 9, "/echo from hook")).await;

    let outcome = test_loop(source.clone(), no_wait())
        .commands_handler(true)
        .await
        .unwrap();

    let LoopOutcome::Webhook(outputs) = outcome else {
        panic!("expected webhook outcome");
    };
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].value().unwrap(), "from hook");
    assert!(source.acknowledgments().await.is_empty());
}

#[tokio::test]
async fn test_trigger_command_without_entity() {
    let dispatch_loop = test_loop(Arc::new(MemorySource::new()), no_wait());
    let update = Update::with_text(1, 1, "/echo manual");

    let value = dispatch_loop
        .trigger_command("echo", &update, None)
        .await
        .unwrap();
    assert_eq!(value, "manual");

    let err = dispatch_loop
        .trigger_command("missing", &update, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::UnknownCommand(ref name) if name == "missing"));
}

// ─── Concurrency ─────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_handlers_finish_before_acknowledgment() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut registry = CommandRegistry::new();
    {
        let log = log.clone();
        registry
            .register_fn("slow", move |invocation| {
                let log = log.clone();
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    log.lock()
                        .unwrap()
                        .push(format!("done:{}", invocation.update.update_id));
                    Ok(serde_json::json!(peak.load(Ordering::SeqCst)))
                }
            })
            .unwrap();
    }

    let inner = MemorySource::with_updates((1..=4).map(|i| Update::with_text(i, 1, "/slow"))).await;
    let source = Arc::new(LoggedSource::new(inner, log.clone()));
    let dispatch_loop = DispatchLoop::new(source, CommandDispatcher::new(registry))
        .with_config(DispatchConfig {
            poll_timeout_secs: 0,
            max_concurrency: 4,
            ..Default::default()
        })
        .unwrap();

    let report = dispatch_loop.process_updates().await.unwrap();

    // Records keep batch order even when handlers overlap
    let ids: Vec<i64> = report.records.iter().map(|r| r.update_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert!(report.records.iter().any(|r| r.values()[0].as_u64().unwrap() > 1));

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 5);
    assert_eq!(log.last().unwrap(), "ack:5");
}

#[tokio::test]
async fn test_overlapping_cycles_are_serialized() {
    let source = Arc::new(
        MemorySource::with_updates((1..=3).map(|i| Update::with_text(i, 1, "/start"))).await,
    );
    let dispatch_loop = Arc::new(test_loop(source.clone(), no_wait()));

    let a = tokio::spawn({
        let dispatch_loop = dispatch_loop.clone();
        async move { dispatch_loop.process_updates().await }
    });
    let b = tokio::spawn({
        let dispatch_loop = dispatch_loop.clone();
        async move { dispatch_loop.process_updates().await }
    });

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();

    // One cycle took the batch; the other ran after its acknowledgment
    assert_eq!(a.records.len() + b.records.len(), 3);
    assert!(a.records.is_empty() || b.records.is_empty());
}

// ─── Polling Runner ──────────────────────────────────────────────

#[tokio::test]
async fn test_runner_drains_and_stops_on_shutdown() {
    let source = Arc::new(
        MemorySource::with_updates((1..=3).map(|i| Update::with_text(i, 1, "/start"))).await,
    );
    let dispatch_loop = Arc::new(test_loop(source.clone(), no_wait()));
    let runner = PollingRunner::new(dispatch_loop).with_config(RunnerConfig {
        idle_delay_ms: 5,
        ..Default::default()
    });

    let (tx, rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(async move { runner.run(rx).await });

    // Batch fetch, acknowledgment, then the next cycle's fetch
    while source.requests().await.len() < 3 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    tx.send(true).unwrap();

    let summary = handle.await.unwrap().unwrap();
    assert_eq!(summary.updates, 3);
    assert_eq!(summary.errors, 0);
    assert_eq!(source.confirmed_offset().await, Some(4));
}
