//! 偏移量收敛检测器
//!
//! 反复对比分区末端偏移量与各消费组的已提交偏移量，直到所有有提交记录的
//! (消费组, 分区) 都已追上末端，或超过最大尝试次数。
//!
//! 每次尝试的流程：
//! 1. 解析目标分区与消费组
//! 2. 查询末端偏移量并求和；总和与收敛记忆一致时直接返回（快速路径）
//! 3. 查询各消费组已提交偏移量并逐项对比
//! 4. 对比通过后再查一次末端偏移量，总和变化说明期间有新消息写入，视为未收敛
//! 5. 未收敛时输出诊断表格，等待后重试

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::memo::{ConvergenceMemo, MemoKey};
use super::snapshot::ConvergenceSnapshot;
use crate::admin::BrokerAdmin;
use crate::config::ConvergenceConfig;
use crate::error::{Result, TestkitError};
use crate::resolver::PartitionResolver;
use crate::types::{
    ConsumerGroupOffsetMap, GroupId, Offset, PartitionOffsetMap, TopicPartition, offsets_total,
};

/// 收敛检测的目标范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceScope {
    /// 集群中的所有 topic，所有消费组
    AllTopics,
    /// 指定 topic 的所有分区，所有消费组
    Topics(BTreeSet<String>),
    /// 指定分区，所有消费组
    Partitions(BTreeSet<TopicPartition>),
    /// 指定分区与指定消费组
    PartitionsAndGroups {
        partitions: BTreeSet<TopicPartition>,
        groups: BTreeSet<GroupId>,
    },
}

impl ConvergenceScope {
    /// 由 topic 名构造范围
    pub fn topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ConvergenceScope::Topics(topics.into_iter().map(Into::into).collect())
    }
}

/// 一次成功等待的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceOutcome {
    /// 实际使用的尝试次数
    pub attempts: u32,
    /// 是否命中快速路径（未查询已提交偏移量）
    pub fast_path: bool,
    /// 收敛时的末端偏移量总和
    pub total: Offset,
    pub elapsed: Duration,
}

/// 偏移量收敛检测器
///
/// # 使用示例
/// ```rust,no_run
/// use std::sync::Arc;
/// use flare_kafka_testkit::{ConvergenceDetector, ConvergenceMemo, ConvergenceScope, InMemoryBroker};
///
/// # async fn example() -> flare_kafka_testkit::Result<()> {
/// let broker = Arc::new(InMemoryBroker::new());
/// let memo = Arc::new(ConvergenceMemo::new());
/// let detector = ConvergenceDetector::new(broker).with_memo(memo.clone());
///
/// detector.await_convergence(&ConvergenceScope::topics(["orders"])).await?;
/// // 用例之间需要隔离时
/// memo.reset();
/// # Ok(())
/// # }
/// ```
pub struct ConvergenceDetector {
    admin: Arc<dyn BrokerAdmin>,
    resolver: PartitionResolver,
    memo: Arc<ConvergenceMemo>,
    config: ConvergenceConfig,
    cancel: CancellationToken,
}

impl ConvergenceDetector {
    /// 创建检测器（默认配置、独立的收敛记忆）
    pub fn new(admin: Arc<dyn BrokerAdmin>) -> Self {
        Self {
            resolver: PartitionResolver::new(admin.clone()),
            admin,
            memo: Arc::new(ConvergenceMemo::new()),
            config: ConvergenceConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// 注入测试会话持有的收敛记忆
    pub fn with_memo(mut self, memo: Arc<ConvergenceMemo>) -> Self {
        self.memo = memo;
        self
    }

    pub fn with_config(mut self, config: ConvergenceConfig) -> Self {
        self.config = config;
        self
    }

    /// 使用外部的取消令牌，取消后等待间隔立即以 `Cancelled` 结束
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn memo(&self) -> &Arc<ConvergenceMemo> {
        &self.memo
    }

    pub fn config(&self) -> &ConvergenceConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 等待目标范围内的所有消费组处理完已写入的消息
    ///
    /// # 错误
    /// * `ConvergenceTimeout` - 超过最大尝试次数，携带最后一次快照
    /// * `Broker` - 管理接口调用失败，不重试
    /// * `Cancelled` - 等待间隔中收到取消请求
    pub async fn await_convergence(&self, scope: &ConvergenceScope) -> Result<ConvergenceOutcome> {
        let started = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let mut previous_ends = PartitionOffsetMap::new();
        let mut last_snapshot = ConvergenceSnapshot::default();

        for attempt in 1..=max_attempts {
            debug!(attempt, "Waiting for offset commit is requested");
            let (partitions, groups) = self.resolve(scope).await?;
            let key = memo_key(scope, &partitions);

            let end_offsets = self.admin.end_offsets(&partitions).await?;
            watch_regressions(&mut previous_ends, &end_offsets);
            let total = offsets_total(&end_offsets);

            if self.memo.total(&key) == Some(total) {
                debug!(
                    attempt,
                    total,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Topic offsets unchanged since last convergence, skipping commit check"
                );
                return Ok(ConvergenceOutcome {
                    attempts: attempt,
                    fast_path: true,
                    total,
                    elapsed: started.elapsed(),
                });
            }

            let group_offsets = if groups.is_empty() {
                ConsumerGroupOffsetMap::new()
            } else {
                self.admin.committed_offsets(&groups, &partitions).await?
            };
            let snapshot =
                ConvergenceSnapshot::evaluate(attempt, &groups, &partitions, end_offsets, group_offsets);

            let mut settled = snapshot.is_settled();
            if settled {
                let recheck = self.admin.end_offsets(&partitions).await?;
                watch_regressions(&mut previous_ends, &recheck);
                let recheck_total = offsets_total(&recheck);
                if recheck_total != total {
                    debug!(
                        attempt,
                        total,
                        recheck_total,
                        "End offsets moved while comparing, re-evaluating"
                    );
                    settled = false;
                }
            }

            if settled {
                self.memo.record(&key, total);
                info!(
                    attempts = attempt,
                    total,
                    partitions = partitions.len(),
                    groups = groups.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Waiting for offset commit is finished"
                );
                return Ok(ConvergenceOutcome {
                    attempts: attempt,
                    fast_path: false,
                    total,
                    elapsed: started.elapsed(),
                });
            }

            warn!(
                attempt,
                max_attempts,
                unsettled = snapshot.unsettled().count(),
                "Some offsets are not equal, waiting for further message processing before re-evaluating"
            );
            debug!("{}", snapshot);
            last_snapshot = snapshot;

            if attempt < max_attempts {
                self.pause(attempt).await?;
            }
        }

        Err(TestkitError::ConvergenceTimeout {
            attempts: max_attempts,
            snapshot: Box::new(last_snapshot),
        })
    }

    async fn resolve(
        &self,
        scope: &ConvergenceScope,
    ) -> Result<(BTreeSet<TopicPartition>, BTreeSet<GroupId>)> {
        match scope {
            ConvergenceScope::AllTopics => {
                let topics = self.resolver.all_topics().await?;
                let partitions = self.resolver.partitions_for_topics(&topics).await?;
                Ok((partitions, self.resolver.active_consumer_groups().await?))
            }
            ConvergenceScope::Topics(topics) => {
                let partitions = self.resolver.partitions_for_topics(topics).await?;
                Ok((partitions, self.resolver.active_consumer_groups().await?))
            }
            ConvergenceScope::Partitions(partitions) => Ok((
                partitions.clone(),
                self.resolver.active_consumer_groups().await?,
            )),
            ConvergenceScope::PartitionsAndGroups { partitions, groups } => {
                Ok((partitions.clone(), groups.clone()))
            }
        }
    }

    async fn pause(&self, attempt: u32) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!(attempt, "Waiting for offset commit is cancelled");
                Err(TestkitError::Cancelled { attempt })
            }
            _ = tokio::time::sleep(self.config.wait_interval()) => Ok(()),
        }
    }
}

// 显式指定的消费组属于范围的一部分，换一组消费组不能复用之前的结论
fn memo_key(scope: &ConvergenceScope, partitions: &BTreeSet<TopicPartition>) -> MemoKey {
    match scope {
        ConvergenceScope::PartitionsAndGroups { groups, .. } => {
            MemoKey::new(partitions.clone(), Some(groups.clone()))
        }
        _ => MemoKey::partitions(partitions.clone()),
    }
}

// 末端偏移量回退只告警（例如 topic 在测试中被重建），不影响判断
fn watch_regressions(previous: &mut PartitionOffsetMap, current: &PartitionOffsetMap) {
    for (tp, end) in current {
        if let Some(before) = previous.insert(tp.clone(), *end) {
            if before > *end {
                warn!(partition = %tp, before, after = *end, "End offset moved backwards");
            }
        }
    }
}
