//! Configuration validation: unknown field detection and semantic checks.

use serde_json::Value;

use super::Config;

/// Known top-level config field names, paired with the fields each section accepts.
const KNOWN_SECTIONS: &[(&str, &[&str])] = &[
    ("agents", &["defaults"]),
    ("memory", &["token_budget", "summary_max_failures"]),
    ("providers", &["openai"]),
    (
        "gateway",
        &["host", "port", "dedup_ttl_secs", "dedup_max_entries", "max_body_bytes"],
    ),
    (
        "notifications",
        &["project", "new_mail_topic", "escalation_topic", "buffer_size"],
    ),
    ("tools", &["research"]),
    ("mailbox", &["address", "drafts_dir", "smtp"]),
    ("logging", &["format", "level", "file"]),
];

const KNOWN_AGENTS_DEFAULTS: &[&str] = &[
    "model",
    "max_tokens",
    "temperature",
    "max_tool_iterations",
    "model_timeout_secs",
    "tool_timeout_secs",
    "model_max_attempts",
    "retry_base_delay_ms",
    "retry_max_delay_ms",
    "system_prompt",
    "assistant_name",
    "assistant_role",
];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Edit distance over chars, for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i + 1; b_chars.len() + 1];
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            current[j + 1] = (prev[j + 1] + 1).min(current[j] + 1).min(prev[j] + cost);
        }
        prev = current;
    }
    prev[b_chars.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn unknown_field(path: String, key: &str, known: &[&str]) -> Diagnostic {
    let message = match suggest_field(key, known) {
        Some(suggestion) => format!("Unknown field '{}' ({})", key, suggestion),
        None => format!("Unknown field '{}'", key),
    };
    Diagnostic::new(DiagnosticLevel::Error, path, message)
}

/// Validate a raw JSON config value against known field names.
pub fn validate_raw(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match raw.as_object() {
        Some(o) => o,
        None => {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "",
                "Config must be a JSON object",
            ));
            return diagnostics;
        }
    };

    diagnostics.push(Diagnostic::new(DiagnosticLevel::Ok, "", "Valid JSON"));

    let top_level: Vec<&str> = KNOWN_SECTIONS.iter().map(|(name, _)| *name).collect();
    let mut has_unknown = false;

    for (key, value) in obj {
        let Some((_, fields)) = KNOWN_SECTIONS.iter().find(|(name, _)| name == key) else {
            has_unknown = true;
            diagnostics.push(unknown_field(key.clone(), key, &top_level));
            continue;
        };

        let Some(section) = value.as_object() else {
            continue;
        };
        for field in section.keys() {
            if !fields.contains(&field.as_str()) {
                has_unknown = true;
                diagnostics.push(unknown_field(format!("{}.{}", key, field), field, fields));
            }
        }
    }

    if let Some(defaults) = obj
        .get("agents")
        .and_then(|v| v.get("defaults"))
        .and_then(|v| v.as_object())
    {
        for field in defaults.keys() {
            if !KNOWN_AGENTS_DEFAULTS.contains(&field.as_str()) {
                has_unknown = true;
                diagnostics.push(unknown_field(
                    format!("agents.defaults.{}", field),
                    field,
                    KNOWN_AGENTS_DEFAULTS,
                ));
            }
        }
    }

    if !has_unknown {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Ok,
            "",
            "All fields recognized",
        ));
    }

    diagnostics
}

/// Check a loaded config for values that would make sessions unusable.
pub fn validate_config(config: &Config) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let defaults = &config.agents.defaults;

    if defaults.model.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "agents.defaults.model",
            "Model must not be empty",
        ));
    }
    if defaults.max_tool_iterations == 0 {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "agents.defaults.max_tool_iterations",
            "Step ceiling must be at least 1",
        ));
    }
    if defaults.model_max_attempts == 0 {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "agents.defaults.model_max_attempts",
            "At least one model attempt is required",
        ));
    }
    if defaults.model_timeout_secs == 0 || defaults.tool_timeout_secs == 0 {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "agents.defaults",
            "Timeouts must be at least 1 second",
        ));
    }
    if config.memory.token_budget < crate::memory::MIN_TOKEN_BUDGET {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "memory.token_budget",
            format!(
                "Budget {} is below the minimum of {} tokens",
                config.memory.token_budget,
                crate::memory::MIN_TOKEN_BUDGET
            ),
        ));
    }

    if config.openai_api_key().is_none() {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "providers.openai.api_key",
            "Not set; sessions will fail until an API key is configured",
        ));
    }
    if config
        .tools
        .research
        .brave_api_key
        .as_deref()
        .map_or(true, |k| k.trim().is_empty())
    {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Warn,
            "tools.research.brave_api_key",
            "Not set; ProspectResearch will report LookupUnavailable",
        ));
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn errors(diagnostics: &[Diagnostic]) -> Vec<&Diagnostic> {
        diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .collect()
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("memory", "memory"), 0);
        assert_eq!(levenshtein("memroy", "memory"), 2);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("gatewya", "gateway"), 2);
    }

    #[test]
    fn test_suggest_field() {
        let known = &["token_budget", "summary_max_failures"];
        assert_eq!(
            suggest_field("token_budgt", known),
            Some("did you mean 'token_budget'?".to_string())
        );
        assert!(suggest_field("completely_else", known).is_none());
    }

    #[test]
    fn test_validate_raw_clean() {
        let raw = json!({"memory": {"token_budget": 500}, "gateway": {"port": 1}});
        let diagnostics = validate_raw(&raw);
        assert!(errors(&diagnostics).is_empty());
        assert!(diagnostics
            .iter()
            .any(|d| d.message == "All fields recognized"));
    }

    #[test]
    fn test_validate_raw_unknown_section_and_field() {
        let raw = json!({
            "memroy": {},
            "gateway": {"prot": 80},
            "agents": {"defaults": {"modle": "x"}}
        });
        let diagnostics = validate_raw(&raw);
        let errs = errors(&diagnostics);
        assert_eq!(errs.len(), 3);
        assert!(errs.iter().any(|d| d.path == "memroy" && d.message.contains("memory")));
        assert!(errs.iter().any(|d| d.path == "gateway.prot"));
        assert!(errs.iter().any(|d| d.path == "agents.defaults.modle"));
    }

    #[test]
    fn test_validate_raw_not_object() {
        let diagnostics = validate_raw(&json!([1, 2]));
        assert_eq!(errors(&diagnostics).len(), 1);
    }

    #[test]
    fn test_validate_config_flags_zero_ceiling_and_tiny_budget() {
        let mut config = Config::default();
        config.agents.defaults.max_tool_iterations = 0;
        config.memory.token_budget = 1;
        let diagnostics = validate_config(&config);
        let errs = errors(&diagnostics);
        assert!(errs.iter().any(|d| d.path == "agents.defaults.max_tool_iterations"));
        assert!(errs.iter().any(|d| d.path == "memory.token_budget"));
    }

    #[test]
    fn test_validate_config_warns_on_missing_keys() {
        let diagnostics = validate_config(&Config::default());
        assert!(errors(&diagnostics).is_empty());
        assert!(diagnostics
            .iter()
            .any(|d| d.level == DiagnosticLevel::Warn && d.path == "providers.openai.api_key"));
    }
}
