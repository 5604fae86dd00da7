//! 收敛记忆
//!
//! 记录每个检测范围最近一次确认收敛时的末端偏移量总和。
//! 范围由分区集合与显式指定的消费组集合共同确定。
//! 只是快速路径的优化，不具有权威性：由测试会话持有并注入检测器，
//! 需要隔离的用例之间调用 `reset`。

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};

use crate::types::{GroupId, Offset, TopicPartition};

/// 收敛记忆的键
///
/// `groups` 只在范围显式指定消费组时为 `Some`；其余范围每次从 broker 列出消费组
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoKey {
    pub partitions: BTreeSet<TopicPartition>,
    pub groups: Option<BTreeSet<GroupId>>,
}

impl MemoKey {
    pub fn new(partitions: BTreeSet<TopicPartition>, groups: Option<BTreeSet<GroupId>>) -> Self {
        Self { partitions, groups }
    }

    /// 不限定消费组的分区范围
    pub fn partitions(partitions: BTreeSet<TopicPartition>) -> Self {
        Self::new(partitions, None)
    }
}

/// 收敛记忆
#[derive(Debug, Default)]
pub struct ConvergenceMemo {
    totals: Mutex<HashMap<MemoKey, Offset>>,
}

impl ConvergenceMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// 该范围上次确认收敛时的偏移量总和
    pub fn total(&self, scope: &MemoKey) -> Option<Offset> {
        self.totals.lock().get(scope).copied()
    }

    /// 记录确认收敛后的偏移量总和
    pub fn record(&self, scope: &MemoKey, total: Offset) {
        self.totals.lock().insert(scope.clone(), total);
    }

    /// 忘记单个范围
    pub fn forget(&self, scope: &MemoKey) {
        self.totals.lock().remove(scope);
    }

    /// 清空所有记录
    pub fn reset(&self) {
        self.totals.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.totals.lock().is_empty()
    }
}
