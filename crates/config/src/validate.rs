//! Configuration validation.
//!
//! Detects unknown or misspelled fields in TOML files and reports settings
//! that parse but cannot work.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::schema::{ParleyConfig, StorageKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// One of "syntax", "unknown-field", "type-error", "semantic", "file-ref".
    pub category: &'static str,
    /// Dotted path, e.g. "storage.database_url"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} [{}] {}", self.severity, self.category, self.message)
        } else {
            write!(
                f,
                "{} [{}] {}: {}",
                self.severity, self.category, self.path, self.message
            )
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    Leaf,
}

/// Mirrors every field in `schema.rs`.
fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Struct};

    Struct(HashMap::from([
        (
            "broker",
            Struct(HashMap::from([
                ("auto_request", Leaf),
                ("reject_if_no_aggregation", Leaf),
                ("history_capacity", Leaf),
            ])),
        ),
        (
            "storage",
            Struct(HashMap::from([("backend", Leaf), ("database_url", Leaf)])),
        ),
        (
            "relay",
            Struct(HashMap::from([
                ("command_prefix", Leaf),
                ("notify_aggregation", Leaf),
            ])),
        ),
    ]))
}

fn check_unknown_fields(
    value: &toml::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (toml::Value::Table(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };
    let known_keys: Vec<&str> = fields.keys().copied().collect();
    for (key, child) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match fields.get(key.as_str()) {
            Some(child_schema) => check_unknown_fields(child, child_schema, &path, diagnostics),
            None => {
                let message = match suggest(key, &known_keys, 3) {
                    Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
                    None => "unknown field".to_string(),
                };
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    "unknown-field",
                    path,
                    message,
                ));
            },
        }
    }
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance` edits, excluding exact matches.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d > 0 && *d <= max_distance)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate the config file at `path`, or the discovered one if `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Info,
                "file-ref",
                "",
                "no config file found; using defaults",
            )],
            config_path: None,
        };
    };

    let is_toml = actual_path
        .extension()
        .and_then(|e| e.to_str())
        .is_none_or(|e| e == "toml");

    let mut result = if is_toml {
        match std::fs::read_to_string(&actual_path) {
            Ok(content) => validate_toml_str(&crate::env_subst::substitute_env(&content)),
            Err(e) => ValidationResult {
                diagnostics: vec![Diagnostic::new(
                    Severity::Error,
                    "syntax",
                    "",
                    format!("failed to read config file: {e}"),
                )],
                config_path: None,
            },
        }
    } else {
        match crate::loader::load_config(&actual_path) {
            Ok(config) => ValidationResult {
                diagnostics: validate_config(&config),
                config_path: None,
            },
            Err(e) => ValidationResult {
                diagnostics: vec![Diagnostic::new(
                    Severity::Error,
                    "type-error",
                    "",
                    e.to_string(),
                )],
                config_path: None,
            },
        }
    };
    result.config_path = Some(actual_path);
    result
}

/// Validate TOML text without touching the file system.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let toml_value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("TOML syntax error: {e}"),
            ));
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&toml_value, &build_schema_map(), "", &mut diagnostics);

    match toml::from_str::<ParleyConfig>(toml_str) {
        Ok(config) => diagnostics.extend(validate_config(&config)),
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Semantic checks on an already parsed config.
#[must_use]
pub fn validate_config(config: &ParleyConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if config.storage.backend == StorageKind::Sqlite {
        let url = config.storage.database_url.trim();
        if url.is_empty() {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "semantic",
                "storage.database_url",
                "database URL is empty",
            ));
        } else if !url.starts_with("sqlite:") {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "semantic",
                "storage.database_url",
                "only sqlite: URLs are supported",
            ));
        }
    }

    if config.broker.history_capacity == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "semantic",
            "broker.history_capacity",
            "capacity 0 is raised to 1",
        ));
    }

    if config.relay.command_prefix.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "semantic",
            "relay.command_prefix",
            "command prefix must not be empty",
        ));
    }

    if config.broker.reject_if_no_aggregation && !config.broker.auto_request {
        diagnostics.push(Diagnostic::new(
            Severity::Info,
            "semantic",
            "broker.reject_if_no_aggregation",
            "has no effect on the relay while auto_request is off",
        ));
    }

    diagnostics
}
