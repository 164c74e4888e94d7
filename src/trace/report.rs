//! Textual rendering of a collected interleaving trace.
//!
//! The failure report has three sections:
//!
//! 1. the scenario table: one column of actors per worker;
//! 2. the interleaving table: every switch, event, and marker placed in its
//!    worker's column;
//! 3. the detailed trace: the same events with call-stack indentation, with
//!    a `/* The following events repeat infinitely: */` header before each
//!    worker's spin-cycle body.

use crate::error::Failure;
use crate::trace::{SwitchReason, TraceEntry};
use serde_json::json;
use std::fmt::Write as _;

/// A failure together with the interleaving that produced it.
#[derive(Debug, Clone)]
pub struct TraceReport {
    /// The reported failure.
    pub failure: Failure,
    /// Actor names, one column per worker.
    pub actor_names: Vec<Vec<String>>,
    /// The recorded trace, in total order.
    pub entries: Vec<TraceEntry>,
}

impl TraceReport {
    /// Builds a report.
    #[must_use]
    pub const fn new(
        failure: Failure,
        actor_names: Vec<Vec<String>>,
        entries: Vec<TraceEntry>,
    ) -> Self {
        Self {
            failure,
            actor_names,
            entries,
        }
    }

    /// Renders the full textual failure report.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn to_text(&self) -> String {
        let width = self.actor_names.len().max(1);
        let mut out = String::new();
        let _ = writeln!(out, "= {} =", self.failure);
        let _ = writeln!(out);

        // Scenario table.
        let rows = self
            .actor_names
            .iter()
            .map(Vec::len)
            .max()
            .unwrap_or(0);
        let mut col_width = self
            .actor_names
            .iter()
            .flatten()
            .map(String::len)
            .max()
            .unwrap_or(4)
            .max(4);
        col_width += 2;
        let header: Vec<String> = (0..width).map(|w| format!("Worker {w}")).collect();
        let _ = writeln!(out, "{}", render_row(&header, col_width));
        let _ = writeln!(out, "{}", render_separator(width, col_width));
        for row in 0..rows {
            let cells: Vec<String> = (0..width)
                .map(|w| {
                    self.actor_names
                        .get(w)
                        .and_then(|column| column.get(row))
                        .cloned()
                        .unwrap_or_default()
                })
                .collect();
            let _ = writeln!(out, "{}", render_row(&cells, col_width));
        }
        let _ = writeln!(out);

        // Interleaving table: one line per entry, placed in its column.
        let _ = writeln!(out, "Interleaving:");
        let event_width = col_width.max(28);
        for entry in &self.entries {
            let cell = interleaving_cell(entry);
            let worker = entry.worker().index().min(width - 1);
            let cells: Vec<String> = (0..width)
                .map(|w| if w == worker { cell.clone() } else { String::new() })
                .collect();
            let _ = writeln!(out, "{}", render_row(&cells, event_width));
        }
        let _ = writeln!(out);

        // Detailed trace with call-stack indentation.
        let _ = writeln!(out, "Detailed trace:");
        for entry in &self.entries {
            match entry {
                TraceEntry::SpinCycleStart { worker, stack, .. } => {
                    let indent = "  ".repeat(stack.len() + 1);
                    let _ = writeln!(
                        out,
                        "{indent}[{worker}] /* The following events repeat infinitely: */"
                    );
                }
                TraceEntry::CodeLocation { point, stack } => {
                    let indent = "  ".repeat(stack.len() + 1);
                    let _ = writeln!(out, "{indent}[{}] {point}", point.worker);
                }
                TraceEntry::Switch {
                    worker,
                    reason,
                    stack,
                    ..
                } => {
                    let indent = "  ".repeat(stack.len() + 1);
                    let _ = writeln!(out, "{indent}[{worker}] {reason}");
                }
                TraceEntry::StateRepresentation {
                    worker,
                    representation,
                    stack,
                    ..
                } => {
                    let indent = "  ".repeat(stack.len() + 1);
                    let _ = writeln!(out, "{indent}[{worker}] /* state: {representation} */");
                }
                TraceEntry::ObstructionFreedomAbort { worker, stack, .. } => {
                    let indent = "  ".repeat(stack.len() + 1);
                    let _ = writeln!(
                        out,
                        "{indent}[{worker}] /* obstruction-freedom violated here */"
                    );
                }
                TraceEntry::Finish { worker } => {
                    let _ = writeln!(out, "  [{worker}] finished");
                }
            }
        }
        out
    }

    /// Structured summary for artifact storage.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let entries: Vec<serde_json::Value> = self
            .entries
            .iter()
            .map(|entry| match entry {
                TraceEntry::Switch { worker, reason, .. } => json!({
                    "kind": "switch",
                    "worker": worker.index(),
                    "reason": format!("{reason}"),
                }),
                TraceEntry::CodeLocation { point, stack } => json!({
                    "kind": point.kind.stable_name(),
                    "worker": point.worker.index(),
                    "label": point.label,
                    "value": point.value,
                    "depth": stack.len(),
                }),
                TraceEntry::StateRepresentation {
                    worker,
                    representation,
                    ..
                } => json!({
                    "kind": "state",
                    "worker": worker.index(),
                    "representation": representation,
                }),
                TraceEntry::SpinCycleStart { worker, .. } => json!({
                    "kind": "spin_cycle_start",
                    "worker": worker.index(),
                }),
                TraceEntry::ObstructionFreedomAbort { worker, .. } => json!({
                    "kind": "obstruction_freedom_abort",
                    "worker": worker.index(),
                }),
                TraceEntry::Finish { worker } => json!({
                    "kind": "finish",
                    "worker": worker.index(),
                }),
            })
            .collect();
        json!({
            "failure": self.failure.kind().stable_name(),
            "message": format!("{}", self.failure),
            "workers": self.actor_names.len(),
            "events": entries.len(),
            "trace": entries,
        })
    }
}

fn render_row(cells: &[String], width: usize) -> String {
    let mut row = String::from("|");
    for cell in cells {
        let _ = write!(row, " {cell:<width$} |", width = width);
    }
    row
}

fn render_separator(columns: usize, width: usize) -> String {
    let mut row = String::from("|");
    for _ in 0..columns {
        let _ = write!(row, " {} |", "-".repeat(width));
    }
    row
}

fn interleaving_cell(entry: &TraceEntry) -> String {
    match entry {
        TraceEntry::Switch { reason, .. } => format!("{reason}"),
        TraceEntry::CodeLocation { point, .. } => format!("{point}"),
        TraceEntry::StateRepresentation { representation, .. } => {
            format!("/* state: {representation} */")
        }
        TraceEntry::SpinCycleStart { .. } => "/* spin cycle starts */".to_string(),
        TraceEntry::ObstructionFreedomAbort { .. } => {
            "/* obstruction-freedom violated */".to_string()
        }
        TraceEntry::Finish { .. } => "finished".to_string(),
    }
}

/// True when the reason marks a spin-cycle switch.
#[must_use]
pub const fn is_active_lock(reason: SwitchReason) -> bool {
    matches!(
        reason,
        SwitchReason::ActiveLock | SwitchReason::ActiveLockRecursive
    )
}
