//! Append-only record of every tool execution in a session.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use toolweave_core::message::CallSource;
use toolweave_core::tool::ToolResult;

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub round: u32,
    pub tool_name: String,
    pub service: String,
    pub arguments: serde_json::Value,
    pub success: bool,
    pub output: String,
    pub source: CallSource,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl ToolCallRecord {
    pub fn new(round: u32, result: &ToolResult, arguments: serde_json::Value, source: CallSource) -> Self {
        Self {
            round,
            tool_name: result.tool_name.clone(),
            service: result.service.clone(),
            arguments,
            success: result.success,
            output: result.output.clone(),
            source,
            duration_ms: result.duration_ms,
            timestamp: result.timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ToolStats {
    pub calls: usize,
    pub successes: usize,
    pub total_duration_ms: u64,
}

impl ToolStats {
    pub fn failures(&self) -> usize {
        self.calls - self.successes
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolCallLog {
    records: Vec<ToolCallRecord>,
}

impl ToolCallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: ToolCallRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ToolCallRecord] {
        &self.records
    }

    /// Records appended at or after `index`.
    pub fn since(&self, index: usize) -> &[ToolCallRecord] {
        self.records.get(index..).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Per-tool counts, keyed by tool name.
    pub fn stats(&self) -> BTreeMap<String, ToolStats> {
        let mut stats: BTreeMap<String, ToolStats> = BTreeMap::new();
        for record in &self.records {
            let entry = stats.entry(record.tool_name.clone()).or_default();
            entry.calls += 1;
            entry.successes += usize::from(record.success);
            entry.total_duration_ms += record.duration_ms;
        }
        stats
    }

    pub fn success_count(&self) -> usize {
        self.records.iter().filter(|r| r.success).count()
    }

    /// Fraction of successful calls, or `None` before the first call.
    pub fn success_rate(&self) -> Option<f64> {
        success_rate(&self.records)
    }
}

pub(crate) fn success_rate(records: &[ToolCallRecord]) -> Option<f64> {
    if records.is_empty() {
        return None;
    }
    let ok = records.iter().filter(|r| r.success).count();
    Some(ok as f64 / records.len() as f64)
}
