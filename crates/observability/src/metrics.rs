//! 事件管道指标模块
//!
//! 为 Prometheus 注册指标说明，并汇总一次运行的统计数据。
//! 指标本身由 stream / dispatcher crate 通过 `metrics` 宏直接记录。

use std::collections::BTreeMap;
use std::time::Duration;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram, gauge};

/// 注册所有管道指标的说明
///
/// 在安装 Prometheus recorder 之后调用，使 `/metrics` 输出带有 HELP 行。
pub fn describe_metrics() {
    describe_gauge!(
        "nes_commit_index",
        "Highest event index handled by the stream consumer"
    );
    describe_counter!(
        "nes_commit_index_saves_total",
        "Commit index save attempts by status"
    );
    describe_counter!(
        "nes_stream_events_total",
        "Events handed to the event handler"
    );
    describe_counter!(
        "nes_stream_events_filtered_total",
        "Events dropped by the client-side topic filter"
    );
    describe_counter!(
        "nes_stream_heartbeats_total",
        "Heartbeat frames received from the event feed"
    );
    describe_counter!(
        "nes_stream_reconnects_total",
        "Reconnect attempts after a stream failure"
    );
    describe_gauge!(
        "nes_stream_generation",
        "Number of successful event feed connections"
    );
    describe_counter!(
        "nes_batch_flushes_total",
        "Batches flushed by the batch worker, by reason"
    );
    describe_histogram!("nes_batch_size", Unit::Count, "Events per flushed batch");
    describe_counter!(
        "nes_provider_push_total",
        "Batch pushes per provider, by status"
    );
}

/// 写入运行结束时的汇总 gauge
pub fn record_run_totals(totals: &RunTotals) {
    gauge!("nes_run_events_delivered").set(totals.events_delivered as f64);
    gauge!("nes_run_events_flushed").set(totals.events_flushed as f64);
    gauge!("nes_run_partial_batches").set(totals.partial_batches as f64);
    for (name, provider) in &totals.providers {
        gauge!("nes_run_provider_failures", "provider" => name.clone())
            .set((provider.failures + provider.timeouts) as f64);
    }
}

/// 单个 provider 的累计数据
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderTotals {
    /// 成功推送的批次数
    pub batches: u64,
    /// 成功推送的事件数
    pub events: u64,
    /// 推送失败次数
    pub failures: u64,
    /// 推送超时次数
    pub timeouts: u64,
}

impl ProviderTotals {
    /// 失败率 (%)，按尝试次数计算
    pub fn failure_rate(&self) -> f64 {
        let attempts = self.batches + self.failures + self.timeouts;
        if attempts == 0 {
            0.0
        } else {
            (self.failures + self.timeouts) as f64 / attempts as f64 * 100.0
        }
    }
}

/// 一次运行的汇总
#[derive(Debug, Clone, Default)]
pub struct RunTotals {
    /// 运行时长
    pub duration: Duration,
    /// 最后记录的 commit index
    pub commit_index: Option<u64>,
    /// 成功连接次数
    pub generations: u64,
    /// 重连次数
    pub reconnects: u64,
    /// 收到的帧数（不含心跳）
    pub frames: u64,
    /// 心跳数
    pub heartbeats: u64,
    /// 交给批处理的事件数
    pub events_delivered: u64,
    /// 被 topic 过滤的事件数
    pub events_filtered: u64,
    /// flush 的批次数
    pub batches_flushed: u64,
    /// flush 的事件数
    pub events_flushed: u64,
    /// 至少一个 provider 未确认的批次数
    pub partial_batches: u64,
    /// 各 provider 数据
    pub providers: BTreeMap<String, ProviderTotals>,
}

impl RunTotals {
    /// 创建空汇总
    pub fn new() -> Self {
        Self::default()
    }

    /// 每秒投递事件数
    pub fn events_per_sec(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.events_delivered as f64 / secs
        } else {
            0.0
        }
    }

    /// 平均批大小
    pub fn mean_batch_size(&self) -> f64 {
        if self.batches_flushed == 0 {
            0.0
        } else {
            self.events_flushed as f64 / self.batches_flushed as f64
        }
    }

    /// 合并一个 provider 的数据
    pub fn add_provider(&mut self, name: impl Into<String>, totals: ProviderTotals) {
        let entry = self.providers.entry(name.into()).or_default();
        entry.batches += totals.batches;
        entry.events += totals.events;
        entry.failures += totals.failures;
        entry.timeouts += totals.timeouts;
    }
}

impl std::fmt::Display for RunTotals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Event Pipeline Summary ===")?;
        writeln!(f, "Duration: {:.2}s", self.duration.as_secs_f64())?;
        match self.commit_index {
            Some(index) => writeln!(f, "Commit index: {}", index)?,
            None => writeln!(f, "Commit index: none")?,
        }
        writeln!(
            f,
            "Connections: {} (reconnects: {})",
            self.generations, self.reconnects
        )?;
        writeln!(f, "Frames: {} (heartbeats: {})", self.frames, self.heartbeats)?;
        writeln!(
            f,
            "Events delivered: {} ({:.2}/s, filtered: {})",
            self.events_delivered,
            self.events_per_sec(),
            self.events_filtered
        )?;
        writeln!(
            f,
            "Batches flushed: {} (mean size {:.1}, partial: {})",
            self.batches_flushed,
            self.mean_batch_size(),
            self.partial_batches
        )?;

        if !self.providers.is_empty() {
            writeln!(f, "Providers:")?;
            for (name, p) in &self.providers {
                writeln!(
                    f,
                    "  {}: batches={} events={} failures={} timeouts={} ({:.2}% failed)",
                    name,
                    p.batches,
                    p.events,
                    p.failures,
                    p.timeouts,
                    p.failure_rate()
                )?;
            }
        }

        Ok(())
    }
}
