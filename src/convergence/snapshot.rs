//! 单次轮询的偏移量对比快照与诊断表格渲染

use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

use crate::types::{ConsumerGroupOffsetMap, GroupId, Offset, PartitionOffsetMap, TopicPartition};

/// 单个 (消费组, 分区) 的对比结论
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OffsetVerdict {
    pub group: GroupId,
    pub partition: TopicPartition,
    pub committed: Offset,
    /// 分区末端偏移量，未知时为 None
    pub end: Option<Offset>,
    pub settled: bool,
}

impl OffsetVerdict {
    /// 末端未知、末端为 0 或已提交偏移量等于末端时视为已收敛
    pub fn is_settled(committed: Offset, end: Option<Offset>) -> bool {
        match end {
            None | Some(0) => true,
            Some(end) => end == committed,
        }
    }
}

/// 一次轮询的不可变快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConvergenceSnapshot {
    pub attempt: u32,
    #[serde(serialize_with = "serialize_partition_offsets")]
    pub end_offsets: PartitionOffsetMap,
    #[serde(serialize_with = "serialize_group_offsets")]
    pub group_offsets: ConsumerGroupOffsetMap,
    /// 按消费组分组的对比结论（组内按分区排序）
    pub verdicts: Vec<Vec<OffsetVerdict>>,
}

impl ConvergenceSnapshot {
    /// 对给定的消费组与分区做对比
    ///
    /// 只有消费组在该分区上有提交记录时才参与判断
    pub fn evaluate(
        attempt: u32,
        groups: &BTreeSet<GroupId>,
        partitions: &BTreeSet<TopicPartition>,
        end_offsets: PartitionOffsetMap,
        group_offsets: ConsumerGroupOffsetMap,
    ) -> Self {
        let verdicts = groups
            .iter()
            .map(|group| {
                let Some(commits) = group_offsets.get(group) else {
                    return Vec::new();
                };
                partitions
                    .iter()
                    .filter_map(|tp| {
                        let committed = *commits.get(tp)?;
                        let end = end_offsets.get(tp).copied();
                        Some(OffsetVerdict {
                            group: group.clone(),
                            partition: tp.clone(),
                            committed,
                            end,
                            settled: OffsetVerdict::is_settled(committed, end),
                        })
                    })
                    .collect()
            })
            .collect();

        Self {
            attempt,
            end_offsets,
            group_offsets,
            verdicts,
        }
    }

    /// 所有参与对比的 (消费组, 分区) 是否都已收敛
    pub fn is_settled(&self) -> bool {
        self.verdicts.iter().flatten().all(|v| v.settled)
    }

    /// 未收敛的对比项
    pub fn unsettled(&self) -> impl Iterator<Item = &OffsetVerdict> {
        self.verdicts.iter().flatten().filter(|v| !v.settled)
    }

    /// 末端偏移量总和
    pub fn end_total(&self) -> Offset {
        crate::types::offsets_total(&self.end_offsets)
    }
}

impl fmt::Display for ConvergenceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_snapshot(self))
    }
}

// JSON 的 map 键只能是字符串，分区偏移量按 {topic, partition, offset} 列表输出
#[derive(Serialize)]
struct PartitionOffsetEntry<'a> {
    topic: &'a str,
    partition: i32,
    offset: Offset,
}

struct PartitionOffsets<'a>(&'a PartitionOffsetMap);

impl Serialize for PartitionOffsets<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_partition_offsets(self.0, serializer)
    }
}

fn serialize_partition_offsets<S: Serializer>(
    offsets: &PartitionOffsetMap,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(offsets.iter().map(|(tp, offset)| PartitionOffsetEntry {
        topic: &tp.topic,
        partition: tp.partition,
        offset: *offset,
    }))
}

fn serialize_group_offsets<S: Serializer>(
    groups: &ConsumerGroupOffsetMap,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(
        groups
            .iter()
            .map(|(group, offsets)| (group, PartitionOffsets(offsets))),
    )
}

const GROUP_WIDTH: usize = 28;
const PARTITION_WIDTH: usize = 48;
const OFFSET_WIDTH: usize = 10;
const MISMATCH_MARKER: &str = "<-- mismatch";

/// 把快照渲染为定宽表格
///
/// 每个消费组一段，段之间用分隔线隔开；列依次为消费组、分区、已提交偏移量、末端偏移量
pub fn render_snapshot(snapshot: &ConvergenceSnapshot) -> String {
    let rule = format!(
        " {}\n",
        "-".repeat(GROUP_WIDTH + PARTITION_WIDTH + OFFSET_WIDTH * 2 + 11)
    );
    let mut out = format!("Offset comparison frame (attempt {})\n", snapshot.attempt);
    out.push_str(&rule);
    out.push_str(&format!(
        "| {:<gw$} | {:<pw$} | {:>ow$} | {:>ow$} |\n",
        "Consumer group",
        "Partition",
        "Committed",
        "End",
        gw = GROUP_WIDTH,
        pw = PARTITION_WIDTH,
        ow = OFFSET_WIDTH,
    ));
    out.push_str(&rule);

    for group in snapshot.verdicts.iter().filter(|rows| !rows.is_empty()) {
        for verdict in group {
            let end = verdict
                .end
                .map(|end| end.to_string())
                .unwrap_or_else(|| "?".to_string());
            out.push_str(&format!(
                "| {:<gw$} | {:<pw$} | {:>ow$} | {:>ow$} | {}\n",
                fit(&verdict.group, GROUP_WIDTH),
                fit(&verdict.partition.to_string(), PARTITION_WIDTH),
                verdict.committed,
                end,
                if verdict.settled { "" } else { MISMATCH_MARKER },
                gw = GROUP_WIDTH,
                pw = PARTITION_WIDTH,
                ow = OFFSET_WIDTH,
            ));
        }
        out.push_str(&rule);
    }
    out
}

// 超长的名字截断到列宽
fn fit(value: &str, width: usize) -> String {
    value.chars().take(width).collect()
}
