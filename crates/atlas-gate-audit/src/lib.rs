//! Audit Log (spec.md §4.E) — append hash-chained records under file lock;
//! read/verify the chain.
//!
//! Grounded on the hash-chain discipline of
//! `other_examples/…process_triage…audit-writer.rs.rs` (`GENESIS` sentinel,
//! `prev_hash` chaining, recompute-on-read verification), adapted to this
//! spec's directory-lock (`atlas_gate_core::lock`) instead of an
//! in-process mutex, and to canonical-JSON hashing instead of
//! field-order-as-written JSON.

use atlas_gate_core::canonical::to_canonical_json_excluding;
use atlas_gate_core::lock::LockGuard;
use atlas_gate_core::{ErrorCode, GateError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

const TOOL: &str = "audit_log";

/// Sentinel `prev_hash` for the first record in a log.
pub const GENESIS: &str = "GENESIS";

/// One append-only, hash-chained audit record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditRecord {
    pub seq: u64,
    pub ts: String,
    pub session_id: String,
    pub role: String,
    pub tool: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub plan_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub phase_id: Option<String>,
    pub args_hash: String,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub invariant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub notes: Option<String>,
    pub prev_hash: String,
    pub entry_hash: String,
}

/// The caller-supplied fields of a new record; `seq`, `ts`, `prev_hash`,
/// and `entry_hash` are computed by `append`.
#[derive(Debug, Clone, Default)]
pub struct NewAuditRecord {
    pub session_id: String,
    pub role: String,
    pub tool: String,
    pub event_type: String,
    pub plan_hash: Option<String>,
    pub phase_id: Option<String>,
    pub args_hash: String,
    pub result: String,
    pub error_code: Option<String>,
    pub invariant_id: Option<String>,
    pub result_hash: Option<String>,
    pub notes: Option<String>,
}

fn sha256_hex(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

/// Read the last non-empty line of `log_path`, if any, parsed as an
/// `AuditRecord`. Returns `Ok(None)` for a missing or empty file.
fn read_predecessor(log_path: &Path) -> Result<Option<AuditRecord>> {
    if !log_path.exists() {
        return Ok(None);
    }
    let file = std::fs::File::open(log_path)
        .map_err(|e| GateError::from_unknown(e, TOOL, "failed to open audit log for reading"))?;
    let reader = BufReader::new(file);
    let mut last_line: Option<String> = None;
    for line in reader.lines() {
        let line = line.map_err(|e| GateError::from_unknown(e, TOOL, "failed to read audit log line"))?;
        if !line.trim().is_empty() {
            last_line = Some(line);
        }
    }
    match last_line {
        None => Ok(None),
        Some(line) => {
            let record: AuditRecord = serde_json::from_str(&line).map_err(|e| {
                GateError::new(
                    ErrorCode::AuditAppendFailed,
                    TOOL,
                    format!("audit log tail is not valid JSON, refusing to chain off it: {}", e),
                )
            })?;
            Ok(Some(record))
        }
    }
}

/// Append one record to the hash chain under the audit lock. Any
/// filesystem error is re-raised as `AUDIT_APPEND_FAILED` — a fatal,
/// classified failure in the surrounding pipeline.
pub fn append(
    log_path: &Path,
    lock_path: &Path,
    lock_retry_ms: u64,
    lock_max_retries: u32,
    entry: NewAuditRecord,
) -> Result<AuditRecord> {
    let _guard = LockGuard::acquire(lock_path, lock_retry_ms, lock_max_retries)?;

    let predecessor = read_predecessor(log_path)?;
    let (seq, prev_hash) = match &predecessor {
        Some(p) => (p.seq + 1, p.entry_hash.clone()),
        None => (1, GENESIS.to_string()),
    };

    let mut record = AuditRecord {
        seq,
        ts: chrono::Utc::now().to_rfc3339(),
        session_id: entry.session_id,
        role: entry.role,
        tool: entry.tool,
        event_type: entry.event_type,
        plan_hash: entry.plan_hash,
        phase_id: entry.phase_id,
        args_hash: entry.args_hash,
        result: entry.result,
        error_code: entry.error_code,
        invariant_id: entry.invariant_id,
        result_hash: entry.result_hash,
        notes: entry.notes,
        prev_hash,
        entry_hash: String::new(),
    };

    let value = serde_json::to_value(&record).map_err(|e| GateError::from_unknown(e, TOOL, "failed to serialize audit record"))?;
    let canonical = to_canonical_json_excluding(&value, &["entry_hash"]);
    record.entry_hash = sha256_hex(&canonical);

    let line = serde_json::to_string(&record).map_err(|e| GateError::from_unknown(e, TOOL, "failed to serialize audit record"))?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| GateError::new(ErrorCode::AuditAppendFailed, TOOL, format!("failed to open audit log: {}", e)).with_cause(e))?;
    file.write_all(format!("{}\n", line).as_bytes())
        .map_err(|e| GateError::new(ErrorCode::AuditAppendFailed, TOOL, format!("failed to write audit record: {}", e)).with_cause(e))?;

    Ok(record)
}

/// A single detected tamper/consistency finding from `verify_chain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TamperFinding {
    InvalidJson { line_number: usize, detail: String },
    BrokenChain { seq: u64, expected_prev: String, found_prev: String },
    RecomputationMismatch { seq: u64 },
    SeqGap { expected: u64, found: u64 },
}

impl TamperFinding {
    pub fn code(&self) -> &'static str {
        match self {
            TamperFinding::InvalidJson { .. } => "TAMPER_DETECTED_INVALID_JSON",
            TamperFinding::BrokenChain { .. } => "TAMPER_DETECTED_BROKEN_HASH_CHAIN",
            TamperFinding::RecomputationMismatch { .. } => "TAMPER_DETECTED_RECOMPUTATION_MISMATCH",
            TamperFinding::SeqGap { .. } => "TAMPER_DETECTED_SEQ_GAP",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChainVerification {
    pub records: Vec<AuditRecord>,
    pub findings: Vec<TamperFinding>,
}

impl ChainVerification {
    pub fn is_valid(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Walk the log, recomputing each record's `entry_hash` and checking
/// `prev_hash`/`seq` continuity. Parse failures are recorded as findings,
/// not fatal errors — the walk continues past a corrupt line.
pub fn verify_chain(log_path: &Path) -> Result<ChainVerification> {
    let mut out = ChainVerification::default();
    if !log_path.exists() {
        return Ok(out);
    }
    let file = std::fs::File::open(log_path).map_err(|e| GateError::from_unknown(e, TOOL, "failed to open audit log"))?;
    let reader = BufReader::new(file);

    let mut expected_seq = 1u64;
    let mut expected_prev = GENESIS.to_string();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| GateError::from_unknown(e, TOOL, "failed to read audit log line"))?;
        if line.trim().is_empty() {
            continue;
        }
        let line_number = idx + 1;
        let record: AuditRecord = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                out.findings.push(TamperFinding::InvalidJson {
                    line_number,
                    detail: e.to_string(),
                });
                continue;
            }
        };

        if record.seq != expected_seq {
            out.findings.push(TamperFinding::SeqGap {
                expected: expected_seq,
                found: record.seq,
            });
        }
        if record.prev_hash != expected_prev {
            out.findings.push(TamperFinding::BrokenChain {
                seq: record.seq,
                expected_prev: expected_prev.clone(),
                found_prev: record.prev_hash.clone(),
            });
        }

        let value = serde_json::to_value(&record).map_err(|e| GateError::from_unknown(e, TOOL, "failed to serialize audit record"))?;
        let canonical = to_canonical_json_excluding(&value, &["entry_hash"]);
        let recomputed = sha256_hex(&canonical);
        if recomputed != record.entry_hash {
            out.findings.push(TamperFinding::RecomputationMismatch { seq: record.seq });
        }

        expected_seq = record.seq + 1;
        expected_prev = record.entry_hash.clone();
        out.records.push(record);
    }

    Ok(out)
}
