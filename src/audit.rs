//! Provenance / Audit Ledger - append-only lifecycle log.
//!
//! Every synthesized statement must trace back to source text. Each log
//! call appends one JSON line to a durable file and bumps the session
//! counters; `close()` flushes and writes a session summary alongside
//! the log. Entries are totally ordered by write sequence, not wall
//! clock. One logger instance owns the log file per run.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::types::{
    Axiom, Principle, PrincipleRef, ProvenanceAxiom, ProvenanceChain, ProvenanceSignal, Signal,
};

/// One immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    /// Id of the entity the entry is about
    pub subject: String,
    pub details: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<ProvenanceChain>,
}

/// Running aggregates for one logging session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSession {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub entry_count: u64,
    pub action_counts: HashMap<String, u64>,
}

/// Append-only audit logger writing line-delimited JSON
pub struct AuditLogger {
    path: PathBuf,
    writer: BufWriter<File>,
    session: AuditSession,
}

impl AuditLogger {
    /// Open (or create) the audit log at `path`, appending to any
    /// existing content.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create audit directory {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            session: AuditSession {
                session_id: format!("session_{}", Uuid::new_v4()),
                started_at: Utc::now(),
                ended_at: None,
                entry_count: 0,
                action_counts: HashMap::new(),
            },
        })
    }

    /// Current session aggregates
    pub fn session(&self) -> &AuditSession {
        &self.session
    }

    fn append(
        &mut self,
        action: &str,
        subject: &str,
        details: Value,
        provenance: Option<ProvenanceChain>,
    ) -> Result<AuditEntry> {
        let entry = AuditEntry {
            id: format!("audit_{}", Uuid::new_v4()),
            timestamp: Utc::now(),
            action: action.to_string(),
            subject: subject.to_string(),
            details,
            provenance,
        };

        let line = serde_json::to_string(&entry).context("Failed to serialize audit entry")?;
        writeln!(self.writer, "{}", line)
            .with_context(|| format!("Failed to append to {}", self.path.display()))?;

        self.session.entry_count += 1;
        *self
            .session
            .action_counts
            .entry(action.to_string())
            .or_insert(0) += 1;

        Ok(entry)
    }

    pub fn log_signal_extracted(&mut self, signal: &Signal) -> Result<AuditEntry> {
        self.append(
            "signal_extracted",
            &signal.id,
            json!({
                "text": signal.text,
                "type": signal.signal_type,
                "dimension": signal.dimension,
                "confidence": signal.confidence,
                "file": signal.source.file,
            }),
            None,
        )
    }

    pub fn log_principle_created(&mut self, principle: &Principle) -> Result<AuditEntry> {
        self.append(
            "principle_created",
            &principle.id,
            json!({
                "text": principle.text,
                "dimension": principle.dimension,
                "n_count": principle.n_count,
            }),
            None,
        )
    }

    pub fn log_principle_reinforced(
        &mut self,
        principle_id: &str,
        signal_id: &str,
        similarity: f32,
    ) -> Result<AuditEntry> {
        self.append(
            "principle_reinforced",
            principle_id,
            json!({
                "signal_id": signal_id,
                "similarity": similarity,
            }),
            None,
        )
    }

    /// Log a promotion with the full provenance chain back to signals
    pub fn log_axiom_promoted(
        &mut self,
        axiom: &Axiom,
        principles: &[Principle],
    ) -> Result<AuditEntry> {
        let chain = build_provenance_chain(axiom, principles);
        self.append(
            "axiom_promoted",
            &axiom.id,
            json!({
                "text": axiom.text,
                "tier": axiom.tier,
                "dimension": axiom.dimension,
            }),
            Some(chain),
        )
    }

    pub fn log_pipeline_started(&mut self, details: Value) -> Result<AuditEntry> {
        let subject = self.session.session_id.clone();
        self.append("pipeline_started", &subject, details, None)
    }

    pub fn log_pipeline_completed(&mut self, details: Value) -> Result<AuditEntry> {
        let subject = self.session.session_id.clone();
        self.append("pipeline_completed", &subject, details, None)
    }

    /// Flush the log and write the session summary next to it.
    /// The summary is only ever written by this explicit close.
    pub fn close(mut self) -> Result<AuditSession> {
        self.writer.flush().context("Failed to flush audit log")?;

        self.session.ended_at = Some(Utc::now());
        let summary_path = session_summary_path(&self.path);
        let summary = serde_json::to_string_pretty(&self.session)
            .context("Failed to serialize session summary")?;
        std::fs::write(&summary_path, summary)
            .with_context(|| format!("Failed to write {}", summary_path.display()))?;

        info!(
            "Audit session {} closed: {} entries",
            self.session.session_id, self.session.entry_count
        );
        Ok(self.session)
    }
}

/// Path of the session summary written at close: `foo.jsonl` ->
/// `foo-session.json`.
pub fn session_summary_path(log_path: &Path) -> PathBuf {
    let stem = log_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audit");
    log_path.with_file_name(format!("{}-session.json", stem))
}

/// Compute the provenance join axiom -> principles -> signals
pub fn build_provenance_chain(axiom: &Axiom, principles: &[Principle]) -> ProvenanceChain {
    let backing: Vec<&Principle> = axiom
        .derived_from
        .principles
        .iter()
        .filter_map(|pref| principles.iter().find(|p| p.id == pref.id))
        .collect();

    ProvenanceChain {
        axiom: ProvenanceAxiom {
            id: axiom.id.clone(),
            text: axiom.text.clone(),
        },
        principles: backing
            .iter()
            .map(|p| PrincipleRef {
                id: p.id.clone(),
                text: p.text.clone(),
                n_count: p.n_count,
            })
            .collect(),
        signals: backing
            .iter()
            .flat_map(|p| p.derived_from.signals.iter())
            .map(|s| ProvenanceSignal {
                id: s.id.clone(),
                similarity: s.similarity,
                source: s.source.clone(),
            })
            .collect(),
    }
}

/// Read all entries back from a JSONL audit log, skipping unparseable
/// lines rather than failing.
pub fn read_audit_log(path: &Path) -> Result<Vec<AuditEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect())
}

/// One-line human-readable render of an entry
pub fn format_audit_entry(entry: &AuditEntry) -> String {
    let action = entry.action.replace('_', " ");
    let detail = entry
        .details
        .get("text")
        .and_then(|v| v.as_str())
        .map(|t| format!(" — {}", t))
        .unwrap_or_default();
    format!(
        "[{}] {}: {}{}",
        entry.timestamp.format("%H:%M:%S"),
        action,
        entry.subject,
        detail
    )
}

/// Pure aggregation over audit entries
#[derive(Debug, Clone, Serialize)]
pub struct AuditStats {
    pub total_entries: usize,
    pub by_action: HashMap<String, usize>,
    /// Counts keyed by the details-embedded "dimension" field
    pub by_dimension: HashMap<String, usize>,
    /// Entries ordered by timestamp; ties keep original log order
    pub timeline: Vec<TimelineEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub subject: String,
}

pub fn generate_audit_stats(entries: &[AuditEntry]) -> AuditStats {
    let mut by_action: HashMap<String, usize> = HashMap::new();
    let mut by_dimension: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        *by_action.entry(entry.action.clone()).or_insert(0) += 1;
        if let Some(dimension) = entry.details.get("dimension").and_then(|v| v.as_str()) {
            *by_dimension.entry(dimension.to_string()).or_insert(0) += 1;
        }
    }

    let mut timeline: Vec<TimelineEntry> = entries
        .iter()
        .map(|e| TimelineEntry {
            timestamp: e.timestamp,
            action: e.action.clone(),
            subject: e.subject.clone(),
        })
        .collect();
    // Stable sort: equal timestamps keep write order
    timeline.sort_by_key(|e| e.timestamp);

    AuditStats {
        total_entries: entries.len(),
        by_action,
        by_dimension,
        timeline,
    }
}
