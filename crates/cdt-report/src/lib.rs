#![forbid(unsafe_code)]

pub mod table;

use cdt_matrix::{ClassifyError, ConfusionMatrix, matrix_from_output};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

pub const REPORT_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub diff_tool: PathBuf,
    pub diff_subcommand: Vec<String>,
    pub results_root: PathBuf,
}

impl ReportConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        let repo_root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
        Self {
            diff_tool: resolve_diff_tool(&repo_root),
            diff_subcommand: vec!["diff-results".to_string()],
            results_root: repo_root.join("frontend"),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

fn resolve_diff_tool(repo_root: &Path) -> PathBuf {
    std::env::var("CDT_DIFF_TOOL")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map_or_else(
            || repo_root.join("frontend/target/release/frontend"),
            PathBuf::from,
        )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub implementation: String,
    pub original_path: PathBuf,
    pub reimplemented_path: PathBuf,
}

impl ReportEntry {
    #[must_use]
    pub fn new(implementation: &str, original: &str, reimplemented: &str) -> Self {
        Self {
            implementation: implementation.to_string(),
            original_path: PathBuf::from(original),
            reimplemented_path: PathBuf::from(reimplemented),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteSpec {
    pub suite: String,
    pub entries: Vec<ReportEntry>,
}

/// The embedded report configuration: which result-file pairs are compared,
/// per suite, in publication order.
#[must_use]
pub fn default_report_spec() -> Vec<SuiteSpec> {
    vec![
        SuiteSpec {
            suite: "CT".to_string(),
            entries: vec![
                ReportEntry::new(
                    "Chrome",
                    "diff-results/chrome-v2.txt",
                    "diff-results/verdict-chrome-v11.txt",
                ),
                ReportEntry::new(
                    "Firefox",
                    "diff-results/firefox-no-required-tls-features.txt",
                    "diff-results/verdict-firefox-v6.txt",
                ),
                ReportEntry::new(
                    "OpenSSL",
                    "diff-results/openssl-v3.txt",
                    "diff-results/verdict-openssl-v5.txt",
                ),
            ],
        },
        SuiteSpec {
            suite: "Limbo".to_string(),
            entries: vec![
                ReportEntry::new(
                    "Chrome",
                    "limbo-results/chrome.txt",
                    "limbo-results/verdict-chrome-v12.txt",
                ),
                ReportEntry::new(
                    "Firefox",
                    "limbo-results/firefox.txt",
                    "limbo-results/verdict-firefox-v2.txt",
                ),
                ReportEntry::new(
                    "OpenSSL",
                    "limbo-results/openssl-v3-has-domain.txt",
                    "limbo-results/verdict-openssl-v3-has-domain.txt",
                ),
            ],
        },
    ]
}

#[derive(Debug)]
pub enum ReportError {
    Invocation {
        tool: PathBuf,
        original: PathBuf,
        reimplemented: PathBuf,
        detail: String,
    },
    Classify {
        suite: String,
        implementation: String,
        original: PathBuf,
        reimplemented: PathBuf,
        source: ClassifyError,
    },
    Evidence {
        detail: String,
    },
}

impl ReportError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Invocation { .. } => "diff_tool_invocation_failed",
            Self::Classify { source, .. } => source.reason_code(),
            Self::Evidence { .. } => "diff_evidence_log_failed",
        }
    }
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invocation {
                tool,
                original,
                reimplemented,
                detail,
            } => write!(
                f,
                "failed to invoke diff tool {} for {} vs {}: {detail}",
                tool.display(),
                original.display(),
                reimplemented.display()
            ),
            Self::Classify {
                suite,
                implementation,
                original,
                reimplemented,
                source,
            } => write!(
                f,
                "failure to diff {} and {} (suite {suite}, impl {implementation}): {source}",
                original.display(),
                reimplemented.display()
            ),
            Self::Evidence { detail } => write!(f, "evidence log append failed: {detail}"),
        }
    }
}

impl std::error::Error for ReportError {}

/// Runs the external comparison tool on one result-file pair and captures its
/// stdout. The call is a pure boundary: no retry, no timeout, no
/// interpretation of the captured text. An unsuccessful exit is an error only
/// when the tool produced no output at all; otherwise the classifier decides.
pub fn invoke_diff_tool(
    config: &ReportConfig,
    original: &Path,
    reimplemented: &Path,
) -> Result<String, ReportError> {
    let invocation_error = |detail: String| ReportError::Invocation {
        tool: config.diff_tool.clone(),
        original: original.to_path_buf(),
        reimplemented: reimplemented.to_path_buf(),
        detail,
    };

    let output = Command::new(&config.diff_tool)
        .args(&config.diff_subcommand)
        .arg(original)
        .arg(reimplemented)
        .output()
        .map_err(|err| invocation_error(err.to_string()))?;

    if !output.status.success() && output.stdout.is_empty() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(invocation_error(format!(
            "status={} stderr={}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplMatrix {
    pub implementation: String,
    pub matrix: ConfusionMatrix,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteMatrices {
    pub suite: String,
    pub rows: Vec<ImplMatrix>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceLogEntry {
    pub suite: String,
    pub implementation: String,
    pub original_path: String,
    pub reimplemented_path: String,
    pub tt: u64,
    pub tf: u64,
    pub ft: u64,
    pub ff: u64,
    pub total: u64,
    pub output_sha256: String,
}

static EVIDENCE_LOG_PATH: OnceLock<Mutex<Option<PathBuf>>> = OnceLock::new();

pub fn set_evidence_log_path(path: Option<PathBuf>) {
    let cell = EVIDENCE_LOG_PATH.get_or_init(|| Mutex::new(None));
    if let Ok(mut slot) = cell.lock() {
        *slot = path;
    }
}

fn maybe_append_evidence_log(entry: &EvidenceLogEntry) -> Result<(), String> {
    let configured = EVIDENCE_LOG_PATH
        .get()
        .and_then(|cell| cell.lock().ok())
        .and_then(|slot| slot.clone());
    let from_env = std::env::var_os("CDT_EVIDENCE_LOG_PATH").map(PathBuf::from);
    let Some(path) = configured.or(from_env) else {
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed creating {}: {err}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| format!("failed opening {}: {err}", path.display()))?;
    let line = serde_json::to_string(entry)
        .map_err(|err| format!("failed serializing evidence log entry: {err}"))?;
    let mut payload = line.into_bytes();
    payload.push(b'\n');
    file.write_all(&payload)
        .map_err(|err| format!("failed appending evidence log {}: {err}", path.display()))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

/// Processes every pair strictly in spec order: invoke, classify, build.
/// The first failing pair aborts the whole report with its context attached;
/// no partial table is produced.
pub fn run_report(
    config: &ReportConfig,
    spec: &[SuiteSpec],
) -> Result<Vec<SuiteMatrices>, ReportError> {
    let mut suites = Vec::with_capacity(spec.len());

    for suite_spec in spec {
        let mut rows = Vec::with_capacity(suite_spec.entries.len());
        for entry in &suite_spec.entries {
            let original = config.results_root.join(&entry.original_path);
            let reimplemented = config.results_root.join(&entry.reimplemented_path);

            let stdout = invoke_diff_tool(config, &original, &reimplemented)?;
            let matrix = matrix_from_output(&stdout).map_err(|source| ReportError::Classify {
                suite: suite_spec.suite.clone(),
                implementation: entry.implementation.clone(),
                original: original.clone(),
                reimplemented: reimplemented.clone(),
                source,
            })?;

            maybe_append_evidence_log(&EvidenceLogEntry {
                suite: suite_spec.suite.clone(),
                implementation: entry.implementation.clone(),
                original_path: original.display().to_string(),
                reimplemented_path: reimplemented.display().to_string(),
                tt: matrix.tt,
                tf: matrix.tf,
                ft: matrix.ft,
                ff: matrix.ff,
                total: matrix.total(),
                output_sha256: sha256_hex(stdout.as_bytes()),
            })
            .map_err(|detail| ReportError::Evidence { detail })?;

            rows.push(ImplMatrix {
                implementation: entry.implementation.clone(),
                matrix,
            });
        }
        suites.push(SuiteMatrices {
            suite: suite_spec.suite.clone(),
            rows,
        });
    }

    Ok(suites)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffReport {
    pub schema_version: u8,
    pub generated_at_unix_ms: u128,
    pub diff_tool: String,
    pub suites: Vec<SuiteMatrices>,
}

impl DiffReport {
    #[must_use]
    pub fn new(config: &ReportConfig, suites: Vec<SuiteMatrices>) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            generated_at_unix_ms: now_unix_ms(),
            diff_tool: config.diff_tool.display().to_string(),
            suites,
        }
    }
}

pub fn write_diff_report(path: &Path, report: &DiffReport) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed creating {}: {err}", parent.display()))?;
    }

    let raw = serde_json::to_string_pretty(report)
        .map_err(|err| format!("failed to serialize diff report: {err}"))?;
    fs::write(path, raw).map_err(|err| format!("failed writing {}: {err}", path.display()))
}
