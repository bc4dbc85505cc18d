//! Attestation Bundle (spec.md §4.N) — deterministic digest of workspace
//! evidence, HMAC-signed, with an offline verifier.

use atlas_gate_audit::verify_chain;
use atlas_gate_core::canonical::{to_canonical_json, to_canonical_json_excluding};
use atlas_gate_core::{ErrorCode, GateError, PathResolver, Result};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;

type HmacSha256 = Hmac<Sha256>;

const TOOL: &str = "attestation_bundle";
const SECRET_ENV_VAR: &str = "KAIZA_ATTESTATION_SECRET";
const EXCLUDED_FROM_SIGNING: &[&str] = &["signature", "bundle_id", "generated_timestamp"];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuditMetrics {
    pub total_records: u64,
    pub failures: u64,
    pub first_ts: Option<String>,
    pub last_ts: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PolicySummary {
    pub writes_passed: u64,
    pub writes_failed: u64,
    pub pass_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IntentCoverage {
    pub intent_file_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub plan_hash_filter: Option<String>,
    pub workspace_root_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationBundle {
    pub bundle_id: String,
    pub generated_timestamp: String,
    pub workspace_root_hash: String,
    pub audit_log_root_hash: String,
    pub plan_hashes: Vec<String>,
    pub audit_metrics: AuditMetrics,
    pub audit_metric_hash: String,
    pub policy_summary: PolicySummary,
    pub policy_summary_hash: String,
    pub intent_coverage: IntentCoverage,
    pub replay_verdict: String,
    pub replay_finding_count: u64,
    pub maturity_score: f64,
    pub maturity_hash: String,
    pub signature: String,
}

fn sha256_hex(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

fn section_hash(value: &impl Serialize) -> String {
    sha256_hex(&to_canonical_json(value))
}

fn resolve_secret(resolver: &PathResolver) -> Result<(Vec<u8>, bool)> {
    if let Ok(v) = std::env::var(SECRET_ENV_VAR) {
        if !v.is_empty() {
            return Ok((v.into_bytes(), false));
        }
    }
    let secret_path = resolver.attestation_secret_path()?;
    if let Ok(content) = std::fs::read_to_string(&secret_path) {
        if let Ok(parsed) = serde_json::from_str::<Value>(&content) {
            if let Some(secret) = parsed.get("attestation_secret").and_then(|v| v.as_str()) {
                if !secret.is_empty() {
                    return Ok((secret.as_bytes().to_vec(), false));
                }
            }
        }
    }
    tracing::warn!(
        "no KAIZA_ATTESTATION_SECRET or {} found; signing with an ephemeral, unrecoverable secret",
        secret_path.display()
    );
    let mut ephemeral = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut ephemeral);
    Ok((ephemeral.to_vec(), true))
}

fn hmac_hex(secret: &[u8], message: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|e| GateError::from_unknown(e, TOOL, "invalid HMAC key length"))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn list_plan_hashes(resolver: &PathResolver) -> Result<Vec<String>> {
    let dir = resolver.plans_dir()?;
    let mut hashes = Vec::new();
    if dir.is_dir() {
        for entry in std::fs::read_dir(&dir).map_err(|e| GateError::from_unknown(e, TOOL, "failed to list plans directory"))? {
            let entry = entry.map_err(|e| GateError::from_unknown(e, TOOL, "failed to read plans directory entry"))?;
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if entry.path().extension().and_then(|e| e.to_str()) == Some("md") {
                    hashes.push(stem.to_string());
                }
            }
        }
    }
    hashes.sort();
    Ok(hashes)
}

fn count_intent_files(root: &Path) -> u64 {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".intent.md"))
        .count() as u64
}

fn workspace_root_hash(root: &Path) -> String {
    sha256_hex(&root.to_string_lossy())
}

/// Generate a deterministic, signed attestation bundle over the current
/// workspace state.
pub fn generate(resolver: &PathResolver, options: GenerateOptions) -> Result<AttestationBundle> {
    let root = resolver.root()?;
    let log_path = resolver.audit_log_path()?;
    let chain = verify_chain(&log_path)?;

    let audit_log_root_hash = chain
        .records
        .last()
        .map(|r| r.entry_hash.clone())
        .unwrap_or_else(|| atlas_gate_audit::GENESIS.to_string());

    let total_records = chain.records.len() as u64;
    let failures = chain.records.iter().filter(|r| r.result != "ok").count() as u64;
    let audit_metrics = AuditMetrics {
        total_records,
        failures,
        first_ts: chain.records.first().map(|r| r.ts.clone()),
        last_ts: chain.records.last().map(|r| r.ts.clone()),
    };
    let audit_metric_hash = section_hash(&audit_metrics);

    let write_records: Vec<_> = chain.records.iter().filter(|r| r.event_type == "write_policy").collect();
    let writes_passed = write_records.iter().filter(|r| r.result == "ok").count() as u64;
    let writes_failed = write_records.iter().filter(|r| r.result != "ok").count() as u64;
    let total_writes = writes_passed + writes_failed;
    let policy_summary = PolicySummary {
        writes_passed,
        writes_failed,
        pass_rate: if total_writes == 0 { 1.0 } else { writes_passed as f64 / total_writes as f64 },
    };
    let policy_summary_hash = section_hash(&policy_summary);

    let plan_hashes = list_plan_hashes(resolver)?;
    let intent_coverage = IntentCoverage { intent_file_count: count_intent_files(&root) };

    let replay_plan_hash = options.plan_hash_filter.clone().or_else(|| plan_hashes.first().cloned());
    let (replay_verdict, replay_finding_count) = match &replay_plan_hash {
        Some(hash) => {
            let root_label = options.workspace_root_label.clone().unwrap_or_else(|| root.to_string_lossy().to_string());
            match atlas_gate_replay::replay(&root_label, &log_path, hash, atlas_gate_replay::ReplayFilter::default()) {
                Ok(report) => (
                    if report.verdict == atlas_gate_replay::Verdict::Pass { "PASS" } else { "FAIL" }.to_string(),
                    report.findings.len() as u64,
                ),
                Err(_) => ("FAIL".to_string(), 0),
            }
        }
        None => ("PASS".to_string(), 0),
    };

    let tamper_free = chain.findings.is_empty();
    let maturity_score = maturity_score(policy_summary.pass_rate, replay_verdict == "PASS", tamper_free, intent_coverage.intent_file_count, total_writes);
    let maturity_hash = sha256_hex(&format!("{:.6}", maturity_score));

    let mut bundle = AttestationBundle {
        bundle_id: String::new(),
        generated_timestamp: chrono::Utc::now().to_rfc3339(),
        workspace_root_hash: workspace_root_hash(&root),
        audit_log_root_hash,
        plan_hashes,
        audit_metrics,
        audit_metric_hash,
        policy_summary,
        policy_summary_hash,
        intent_coverage,
        replay_verdict,
        replay_finding_count,
        maturity_score,
        maturity_hash,
        signature: String::new(),
    };

    let (secret, _ephemeral) = resolve_secret(resolver)?;
    let value = serde_json::to_value(&bundle).map_err(|e| GateError::from_unknown(e, TOOL, "failed to serialize attestation bundle"))?;
    let canonical = to_canonical_json_excluding(&value, EXCLUDED_FROM_SIGNING);
    bundle.bundle_id = sha256_hex(&canonical);
    bundle.signature = hmac_hex(&secret, &canonical)?;

    Ok(bundle)
}

fn maturity_score(pass_rate: f64, replay_pass: bool, tamper_free: bool, intent_files: u64, total_writes: u64) -> f64 {
    let replay_component = if replay_pass { 1.0 } else { 0.0 };
    let tamper_component = if tamper_free { 1.0 } else { 0.0 };
    let coverage_component = if total_writes == 0 { 1.0 } else { (intent_files as f64 / total_writes as f64).min(1.0) };
    ((pass_rate + replay_component + tamper_component + coverage_component) / 4.0 * 1000.0).round() / 1000.0
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyFailure {
    BundleIdMismatch,
    SignatureVerification,
    AuditMetricHashMismatch,
    MaturityHashMismatch,
    PolicySummaryHashMismatch,
}

impl VerifyFailure {
    pub fn code(&self) -> &'static str {
        match self {
            VerifyFailure::BundleIdMismatch => "BUNDLE_ID_MISMATCH",
            VerifyFailure::SignatureVerification => "SIGNATURE_VERIFICATION",
            VerifyFailure::AuditMetricHashMismatch => "AUDIT_METRIC_HASH_MISMATCH",
            VerifyFailure::MaturityHashMismatch => "MATURITY_HASH_MISMATCH",
            VerifyFailure::PolicySummaryHashMismatch => "POLICY_SUMMARY_HASH_MISMATCH",
        }
    }
}

/// Offline-verify a previously generated bundle. Checks run in order and
/// the first failing check is returned; the rest are not evaluated.
pub fn verify(bundle: &AttestationBundle, resolver: &PathResolver) -> Result<()> {
    let value = serde_json::to_value(bundle).map_err(|e| GateError::from_unknown(e, TOOL, "failed to serialize attestation bundle"))?;
    let canonical = to_canonical_json_excluding(&value, EXCLUDED_FROM_SIGNING);

    let recomputed_id = sha256_hex(&canonical);
    if recomputed_id != bundle.bundle_id {
        return Err(verify_error(VerifyFailure::BundleIdMismatch));
    }

    let (secret, _ephemeral) = resolve_secret(resolver)?;
    let recomputed_sig = hmac_hex(&secret, &canonical)?;
    if !constant_time_eq(&recomputed_sig, &bundle.signature) {
        return Err(verify_error(VerifyFailure::SignatureVerification));
    }

    if section_hash(&bundle.audit_metrics) != bundle.audit_metric_hash {
        return Err(verify_error(VerifyFailure::AuditMetricHashMismatch));
    }
    if section_hash(&bundle.policy_summary) != bundle.policy_summary_hash {
        return Err(verify_error(VerifyFailure::PolicySummaryHashMismatch));
    }
    if sha256_hex(&format!("{:.6}", bundle.maturity_score)) != bundle.maturity_hash {
        return Err(verify_error(VerifyFailure::MaturityHashMismatch));
    }

    Ok(())
}

fn verify_error(failure: VerifyFailure) -> GateError {
    let code = match failure {
        VerifyFailure::BundleIdMismatch => ErrorCode::BundleIdMismatch,
        VerifyFailure::SignatureVerification => ErrorCode::SignatureVerification,
        VerifyFailure::AuditMetricHashMismatch => ErrorCode::AuditMetricHashMismatch,
        VerifyFailure::MaturityHashMismatch => ErrorCode::MaturityHashMismatch,
        VerifyFailure::PolicySummaryHashMismatch => ErrorCode::PolicySummaryHashMismatch,
    };
    GateError::new(code, TOOL, format!("attestation verification failed at {}", failure.code()))
}

/// Stable-indent JSON export.
pub fn export_json(bundle: &AttestationBundle) -> Result<String> {
    serde_json::to_string_pretty(bundle).map_err(|e| GateError::from_unknown(e, TOOL, "failed to render attestation bundle as JSON"))
}

/// A short, documented Markdown summary export.
pub fn export_markdown(bundle: &AttestationBundle) -> String {
    format!(
        "# Attestation Bundle {}\n\n- Generated: {}\n- Workspace root hash: {}\n- Audit log root hash: {}\n- Plans: {}\n- Audit records: {} ({} failures)\n- Policy pass rate: {:.2}%\n- Intent files: {}\n- Replay verdict: {} ({} findings)\n- Maturity score: {:.3}\n",
        bundle.bundle_id,
        bundle.generated_timestamp,
        bundle.workspace_root_hash,
        bundle.audit_log_root_hash,
        bundle.plan_hashes.len(),
        bundle.audit_metrics.total_records,
        bundle.audit_metrics.failures,
        bundle.policy_summary.pass_rate * 100.0,
        bundle.intent_coverage.intent_file_count,
        bundle.replay_verdict,
        bundle.replay_finding_count,
        bundle.maturity_score,
    )
}
