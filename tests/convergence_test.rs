//! 偏移量收敛检测测试
//!
//! 使用内存 Broker 驱动末端偏移量与消费组提交，验证检测器的判断、快速路径、
//! 超时、取消与错误传播行为。

use async_trait::async_trait;
use flare_kafka_testkit::admin::memory::AdminOperation;
use flare_kafka_testkit::{
    BrokerAdmin, ConsumerGroupOffsetMap, ConvergenceConfig, ConvergenceDetector, ConvergenceMemo,
    ConvergenceScope, ErrorCode, GroupId, InMemoryBroker, MemoKey, PartitionOffsetMap, Result,
    TestkitError, TopicPartition,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

/// 测试用的快速配置
fn fast_config(max_attempts: u32) -> ConvergenceConfig {
    ConvergenceConfig::new()
        .with_max_attempts(max_attempts)
        .with_wait_interval(Duration::from_millis(1))
}

fn detector(broker: &Arc<InMemoryBroker>, max_attempts: u32) -> ConvergenceDetector {
    ConvergenceDetector::new(broker.clone()).with_config(fast_config(max_attempts))
}

/// 创建 topic 并向每个分区写入指定数量的记录
fn topic_with_records(broker: &InMemoryBroker, topic: &str, records_per_partition: &[u32]) {
    broker.create_topic(topic, records_per_partition.len() as i32);
    for (partition, count) in records_per_partition.iter().enumerate() {
        broker.produce(&TopicPartition::new(topic, partition as i32), *count);
    }
}

#[tokio::test]
async fn test_converges_when_every_group_caught_up() {
    let broker = Arc::new(InMemoryBroker::new());
    topic_with_records(&broker, "orders", &[3, 2]);
    broker.commit_to_end("billing", "orders");
    broker.commit_to_end("shipping", "orders");

    let outcome = assert_ok!(
        detector(&broker, 5)
            .await_convergence(&ConvergenceScope::topics(["orders"]))
            .await
    );

    assert_eq!(outcome.attempts, 1);
    assert!(!outcome.fast_path);
    assert_eq!(outcome.total, 5);
    // 对比通过后会再查一次末端偏移量
    assert_eq!(broker.calls().end_offsets, 2);
    assert_eq!(broker.calls().committed_offsets, 1);
}

#[tokio::test]
async fn test_second_call_without_production_takes_fast_path() {
    let broker = Arc::new(InMemoryBroker::new());
    topic_with_records(&broker, "orders", &[4]);
    broker.commit_to_end("billing", "orders");
    let detector = detector(&broker, 5);
    let scope = ConvergenceScope::topics(["orders"]);

    assert_ok!(detector.await_convergence(&scope).await);
    let before = broker.calls();

    let outcome = assert_ok!(detector.await_convergence(&scope).await);
    assert!(outcome.fast_path);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(broker.calls().committed_offsets, before.committed_offsets);
    assert_eq!(broker.calls().end_offsets, before.end_offsets + 1);
}

#[tokio::test]
async fn test_new_production_invalidates_fast_path() {
    let broker = Arc::new(InMemoryBroker::new());
    topic_with_records(&broker, "orders", &[1]);
    broker.commit_to_end("billing", "orders");
    let detector = detector(&broker, 3);
    let scope = ConvergenceScope::topics(["orders"]);
    assert_ok!(detector.await_convergence(&scope).await);

    broker.produce(&TopicPartition::new("orders", 0), 2);
    let err = assert_err!(detector.await_convergence(&scope).await);
    assert_eq!(err.code(), ErrorCode::ConvergenceTimeout);

    broker.commit_to_end("billing", "orders");
    let outcome = assert_ok!(detector.await_convergence(&scope).await);
    assert!(!outcome.fast_path);
    assert_eq!(outcome.total, 3);
}

#[tokio::test]
async fn test_convergence_follows_committed_and_end_offsets() {
    // (committed, end) per partition, expected verdict
    let cases: Vec<(Vec<(i64, u32)>, bool)> = vec![
        (vec![(5, 5)], true),
        (vec![(4, 5)], false),
        (vec![(3, 0)], true),
        (vec![(5, 5), (1, 2)], false),
        (vec![(0, 0), (7, 7)], true),
        (vec![(2, 2), (0, 3), (9, 9)], false),
    ];

    for (tuples, expected) in cases {
        let broker = Arc::new(InMemoryBroker::new());
        let ends: Vec<u32> = tuples.iter().map(|(_, end)| *end).collect();
        topic_with_records(&broker, "ledger", &ends);
        let mut partitions = BTreeSet::new();
        for (partition, (committed, _)) in tuples.iter().enumerate() {
            let tp = TopicPartition::new("ledger", partition as i32);
            broker.commit("auditor", &tp, *committed);
            partitions.insert(tp);
        }

        let scope = ConvergenceScope::PartitionsAndGroups {
            partitions,
            groups: ["auditor".to_string()].into(),
        };
        let result = detector(&broker, 2).await_convergence(&scope).await;
        assert_eq!(result.is_ok(), expected, "case {:?}", tuples);
    }
}

#[tokio::test]
async fn test_groups_and_partitions_without_commits_are_ignored() {
    let broker = Arc::new(InMemoryBroker::new());
    topic_with_records(&broker, "orders", &[3, 8]);
    broker.register_group("idle");
    broker.commit("billing", &TopicPartition::new("orders", 0), 3);

    let outcome = assert_ok!(
        detector(&broker, 2)
            .await_convergence(&ConvergenceScope::topics(["orders"]))
            .await
    );
    assert_eq!(outcome.total, 11);
}

#[tokio::test]
async fn test_never_converging_fails_after_max_attempts() {
    let broker = Arc::new(InMemoryBroker::new());
    topic_with_records(&broker, "orders", &[10]);
    broker.commit("billing", &TopicPartition::new("orders", 0), 4);

    let started = Instant::now();
    let err = assert_err!(
        detector(&broker, 3)
            .await_convergence(&ConvergenceScope::topics(["orders"]))
            .await
    );
    // 3 次尝试、间隔 1ms
    assert!(started.elapsed() < Duration::from_millis(200));

    match &err {
        TestkitError::ConvergenceTimeout { attempts, snapshot } => {
            assert_eq!(*attempts, 3);
            assert_eq!(snapshot.attempt, 3);
            let lagging: Vec<_> = snapshot.unsettled().collect();
            assert_eq!(lagging.len(), 1);
            assert_eq!(lagging[0].committed, 4);
            assert_eq!(lagging[0].end, Some(10));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_retryable());
    assert!(err.to_string().contains("billing"));
    assert_eq!(broker.calls().committed_offsets, 3);
    // 未收敛时不做复查
    assert_eq!(broker.calls().end_offsets, 3);
}

#[tokio::test]
async fn test_broker_errors_propagate_without_retry() {
    let broker = Arc::new(InMemoryBroker::new());
    topic_with_records(&broker, "orders", &[2]);
    broker.commit("billing", &TopicPartition::new("orders", 0), 1);
    broker.fail_on(AdminOperation::CommittedOffsets, "group coordinator not available");

    let err = assert_err!(
        detector(&broker, 50)
            .await_convergence(&ConvergenceScope::topics(["orders"]))
            .await
    );
    assert!(matches!(
        err,
        TestkitError::Broker {
            operation: "committed_offsets",
            ..
        }
    ));
    assert_eq!(err.code(), ErrorCode::BrokerRequestFailed);
    assert_eq!(broker.calls().committed_offsets, 1);
}

#[tokio::test]
async fn test_unknown_topic_is_a_broker_error() {
    let broker = Arc::new(InMemoryBroker::new());
    let err = assert_err!(
        detector(&broker, 5)
            .await_convergence(&ConvergenceScope::topics(["missing"]))
            .await
    );
    assert!(err.to_string().contains("unknown topic 'missing'"));
}

#[tokio::test]
async fn test_cancellation_during_wait_is_reported() {
    let broker = Arc::new(InMemoryBroker::new());
    topic_with_records(&broker, "orders", &[5]);
    broker.commit("billing", &TopicPartition::new("orders", 0), 1);

    let token = CancellationToken::new();
    let detector = ConvergenceDetector::new(broker.clone())
        .with_config(
            ConvergenceConfig::new()
                .with_max_attempts(200)
                .with_wait_interval(Duration::from_secs(30)),
        )
        .with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let started = Instant::now();
    let err = assert_err!(
        detector
            .await_convergence(&ConvergenceScope::topics(["orders"]))
            .await
    );
    assert!(matches!(err, TestkitError::Cancelled { attempt: 1 }));
    assert_eq!(err.code(), ErrorCode::WaitCancelled);
    assert!(started.elapsed() < Duration::from_secs(10));
    canceller.await.unwrap();
}

#[tokio::test]
async fn test_memo_is_shared_and_resettable() {
    let broker = Arc::new(InMemoryBroker::new());
    topic_with_records(&broker, "orders", &[6]);
    broker.commit_to_end("billing", "orders");
    let memo = Arc::new(ConvergenceMemo::new());
    let scope = ConvergenceScope::topics(["orders"]);

    let first = detector(&broker, 3).with_memo(memo.clone());
    assert!(!assert_ok!(first.await_convergence(&scope).await).fast_path);

    let second = detector(&broker, 3).with_memo(memo.clone());
    assert!(assert_ok!(second.await_convergence(&scope).await).fast_path);

    memo.reset();
    assert!(!assert_ok!(second.await_convergence(&scope).await).fast_path);
}

#[tokio::test]
async fn test_matching_total_in_another_scope_is_not_a_fast_path() {
    let broker = Arc::new(InMemoryBroker::new());
    topic_with_records(&broker, "orders", &[5]);
    topic_with_records(&broker, "refunds", &[5]);
    broker.commit_to_end("billing", "orders");
    broker.commit("billing", &TopicPartition::new("refunds", 0), 2);
    let detector = detector(&broker, 2);

    assert_ok!(
        detector
            .await_convergence(&ConvergenceScope::topics(["orders"]))
            .await
    );
    // 两个范围的末端总和相同，但 refunds 仍有积压
    let err = assert_err!(
        detector
            .await_convergence(&ConvergenceScope::topics(["refunds"]))
            .await
    );
    assert_eq!(err.code(), ErrorCode::ConvergenceTimeout);
}

#[tokio::test]
async fn test_other_explicit_groups_on_same_partitions_are_checked() {
    let broker = Arc::new(InMemoryBroker::new());
    topic_with_records(&broker, "orders", &[5]);
    let tp = TopicPartition::new("orders", 0);
    broker.commit("billing", &tp, 5);
    broker.commit("shipping", &tp, 1);
    let detector = detector(&broker, 2);
    let partitions: BTreeSet<_> = [tp].into();

    let billing = ConvergenceScope::PartitionsAndGroups {
        partitions: partitions.clone(),
        groups: ["billing".to_string()].into(),
    };
    assert_ok!(detector.await_convergence(&billing).await);

    // 分区与末端总和都相同，但 shipping 仍有积压
    let shipping = ConvergenceScope::PartitionsAndGroups {
        partitions,
        groups: ["shipping".to_string()].into(),
    };
    let err = assert_err!(detector.await_convergence(&shipping).await);
    assert_eq!(err.code(), ErrorCode::ConvergenceTimeout);

    // billing 本身仍走快速路径
    assert!(assert_ok!(detector.await_convergence(&billing).await).fast_path);
}

#[tokio::test]
async fn test_all_topics_scope_covers_every_topic() {
    let broker = Arc::new(InMemoryBroker::new());
    topic_with_records(&broker, "orders", &[2, 2]);
    topic_with_records(&broker, "audit", &[1]);
    broker.commit_to_end("billing", "orders");
    broker.commit_to_end("auditor", "audit");

    let outcome = assert_ok!(
        detector(&broker, 3)
            .await_convergence(&ConvergenceScope::AllTopics)
            .await
    );
    assert_eq!(outcome.total, 5);
    assert_eq!(broker.calls().list_topics, 1);
    assert_eq!(broker.calls().list_consumer_groups, 1);
}

#[tokio::test]
async fn test_end_offsets_never_decrease_under_concurrent_production() {
    let broker = Arc::new(InMemoryBroker::new());
    topic_with_records(&broker, "orders", &[0]);
    let tp = TopicPartition::new("orders", 0);
    let scope: BTreeSet<_> = [tp.clone()].into();

    let producer = {
        let broker = broker.clone();
        let tp = tp.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                broker.produce(&tp, 1);
                tokio::task::yield_now().await;
            }
        })
    };

    let mut polls = Vec::new();
    while !producer.is_finished() {
        polls.push(broker.end_offsets(&scope).await.unwrap()[&tp]);
        tokio::task::yield_now().await;
    }
    producer.await.unwrap();
    polls.push(broker.end_offsets(&scope).await.unwrap()[&tp]);

    assert!(polls.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(polls.last(), Some(&50));
}

/// 在复查末端偏移量时写入新消息，模拟对比期间生产者仍在写入
struct RacingBroker {
    inner: Arc<InMemoryBroker>,
    partition: TopicPartition,
    group: String,
    end_queries: AtomicU32,
    raced: AtomicBool,
}

#[async_trait]
impl BrokerAdmin for RacingBroker {
    async fn list_topics(&self) -> Result<BTreeSet<String>> {
        self.inner.list_topics().await
    }

    async fn describe_topics(&self, topics: &BTreeSet<String>) -> Result<BTreeMap<String, i32>> {
        self.inner.describe_topics(topics).await
    }

    async fn end_offsets(
        &self,
        partitions: &BTreeSet<TopicPartition>,
    ) -> Result<PartitionOffsetMap> {
        if self.end_queries.fetch_add(1, Ordering::SeqCst) == 1 {
            self.inner.produce(&self.partition, 1);
            self.raced.store(true, Ordering::SeqCst);
        }
        self.inner.end_offsets(partitions).await
    }

    async fn list_consumer_groups(&self) -> Result<BTreeSet<GroupId>> {
        self.inner.list_consumer_groups().await
    }

    async fn committed_offsets(
        &self,
        groups: &BTreeSet<GroupId>,
        partitions: &BTreeSet<TopicPartition>,
    ) -> Result<ConsumerGroupOffsetMap> {
        // 消费者随后追上新写入的消息
        if self.raced.load(Ordering::SeqCst) {
            self.inner.commit_to_end(self.group.clone(), &self.partition.topic);
        }
        self.inner.committed_offsets(groups, partitions).await
    }
}

#[tokio::test]
async fn test_production_during_check_forces_another_attempt() {
    let inner = Arc::new(InMemoryBroker::new());
    topic_with_records(&inner, "orders", &[5]);
    inner.commit_to_end("billing", "orders");
    let broker = Arc::new(RacingBroker {
        inner: inner.clone(),
        partition: TopicPartition::new("orders", 0),
        group: "billing".to_string(),
        end_queries: AtomicU32::new(0),
        raced: AtomicBool::new(false),
    });
    let memo = Arc::new(ConvergenceMemo::new());

    let outcome = assert_ok!(
        ConvergenceDetector::new(broker)
            .with_config(fast_config(5))
            .with_memo(memo.clone())
            .await_convergence(&ConvergenceScope::topics(["orders"]))
            .await
    );

    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.total, 6);
    let scope: BTreeSet<_> = [TopicPartition::new("orders", 0)].into();
    assert_eq!(memo.total(&MemoKey::partitions(scope)), Some(6));
}
