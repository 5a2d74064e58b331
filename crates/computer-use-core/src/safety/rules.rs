//! Built-in rule sets
//!
//! Rules are compiled once per process. Every pattern is matched
//! case-insensitively against both the raw text and its compatibility-folded
//! form (see [`fold_compat`](super::validator::fold_compat)).

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Maximum compiled size of a single rule
const MAX_RULE_SIZE: usize = 1_048_576;

/// Rule category reported on rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    DangerousCommand,
    Credential,
    PathTraversal,
    Injection,
    PrivilegeEscalation,
}

impl RuleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCategory::DangerousCommand => "dangerous_command",
            RuleCategory::Credential => "credential",
            RuleCategory::PathTraversal => "path_traversal",
            RuleCategory::Injection => "injection",
            RuleCategory::PrivilegeEscalation => "privilege_escalation",
        }
    }
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A compiled pattern with its category
#[derive(Debug, Clone)]
pub struct SafetyRule {
    pub pattern: String,
    pub category: RuleCategory,
    pub severity: Severity,
    regex: Regex,
}

impl SafetyRule {
    /// Compiles `pattern` case-insensitively with a size limit
    pub fn compile(
        pattern: &str,
        category: RuleCategory,
        severity: Severity,
    ) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .size_limit(MAX_RULE_SIZE)
            .build()?;
        Ok(Self {
            pattern: pattern.to_string(),
            category,
            severity,
            regex,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

use RuleCategory::*;
use Severity::*;

/// Pattern table, evaluated in order; the first hit decides the category
const RULE_TABLE: &[(&str, RuleCategory, Severity)] = &[
    // Injection: SQL
    (r#"['"]\s*;\s*(drop|delete|update|insert|select)\b"#, Injection, High),
    (r#"['"]?\s+or\s+['"]?1['"]?\s*=\s*['"]?1"#, Injection, High),
    (r#"['"]?\s+and\s+['"]?1['"]?\s*=\s*['"]?1"#, Injection, High),
    (r"\bunion\s+(all\s+)?select\b", Injection, High),
    (r";\s*drop\s+(table|database)\b", Injection, High),
    (r#"['"]\s*--\s*$"#, Injection, Medium),
    // Injection: XSS
    (r"<\s*script\b", Injection, High),
    (r"<\s*iframe\b", Injection, High),
    (r"javascript\s*:", Injection, High),
    (r"\bon(error|load|click|mouseover|focus)\s*=", Injection, High),
    // Injection: LDAP, NoSQL, template
    (r"\)\s*\(\s*(cn|uid)\s*=", Injection, Medium),
    (r#"\{\s*['"]?\$(ne|gt|lt|regex|where)['"]?\s*:"#, Injection, High),
    (r"\{\{\s*\d+\s*[*+/-]", Injection, Medium),
    (r"\{\{\s*config\s*\}\}", Injection, Medium),
    (r"\{%.*%\}", Injection, Medium),
    (r"<%=", Injection, Medium),
    (r"\$\{[^}]*[*+/-]", Injection, Medium),
    // Injection: shell substitution
    (r"\$\([^)]+\)", Injection, High),
    (r"`[^`]*`", Injection, High),
    (r";\s*(rm|del|format|chmod|chown|nc|netcat)\b", Injection, Critical),
    // Dangerous commands: destruction
    (r"\brm\s+-[a-z]*(rf|fr)[a-z]*\s+[/~*]", DangerousCommand, Critical),
    (r"\brm\s+(-r\s+-f|-f\s+-r)\s+[/~*]", DangerousCommand, Critical),
    (r"\bdel\s+/f\s+/s\s+/q", DangerousCommand, Critical),
    (r"\bdel\s+.*system32", DangerousCommand, Critical),
    (r"\bformat\s+[a-z]:", DangerousCommand, Critical),
    (r"\bdd\s+if=/dev/(zero|random|urandom)\s+of=/dev/", DangerousCommand, Critical),
    (r"\bmkfs(\.\w+)?\s", DangerousCommand, Critical),
    (r">{1,2}\s*/dev/(sd|hd|nvme)", DangerousCommand, Critical),
    (r"\bchmod\s+(-r\s+)?777\s+/", DangerousCommand, High),
    (r"\bchown\s+(-r|--recursive)\b", DangerousCommand, High),
    (r":\s*\(\s*\)\s*\{.*:\s*\|\s*:", DangerousCommand, Critical),
    (r"\bwhile\s*true.*do.*done", DangerousCommand, Medium),
    (r"\bkill\s+-9\s+-1\b", DangerousCommand, High),
    (r"\bkillall\b", DangerousCommand, Medium),
    (r"\bpkill\s+-9\b", DangerousCommand, Medium),
    (r"\bgit\s+reset\s+--hard\b", DangerousCommand, Medium),
    (r"\bgit\s+push\b.*--force", DangerousCommand, Medium),
    (r"\bshutdown\s+(-h|-r|/s|/r|now)", DangerousCommand, High),
    (r"\|\s*(bash|sh|zsh|ksh)\b", DangerousCommand, High),
    // Dangerous commands: network tools and reverse shells
    (r"^\s*(nc|netcat|ncat|socat|telnet|nmap|masscan)\s+", DangerousCommand, High),
    (r"^\s*(curl|wget|aria2c)\s+", DangerousCommand, Medium),
    (r"/dev/tcp/", DangerousCommand, Critical),
    (r"\b(bash|sh|zsh)\s+-i\s+>&", DangerousCommand, Critical),
    (r"\bmkfifo\s+\S+", DangerousCommand, High),
    (r"python3?\s+.*-m\s+(SimpleHTTPServer|http\.server)", DangerousCommand, Medium),
    (r"\bngrok\s+(tcp|http)", DangerousCommand, Medium),
    (r"\b(tar|zip|base64)\b.*\|\s*(nc|netcat|curl|wget)\b", DangerousCommand, High),
    // Privilege escalation
    (r"(^|[;&|]\s*)(sudo|su|pkexec|doas|runas)\s", PrivilegeEscalation, Critical),
    (r"\busermod\b.*-a?G\s*(sudo|wheel|admin)\b", PrivilegeEscalation, Critical),
    (r"\bpasswd\s+(root|admin)\b", PrivilegeEscalation, High),
    (r"\bvisudo\b", PrivilegeEscalation, High),
    (r"\bchmod\s+[ugo]*\+s\b", PrivilegeEscalation, High),
    // Credentials
    (r"password\s*[:=]\s*\S+", Credential, High),
    (r"--pass(word)?[=\s]+\S+", Credential, High),
    (r"\b(pgpassword|mysql_pwd)=", Credential, High),
    (r"\bapi[_-]?key\s*[:=]", Credential, High),
    (r"\b(access|auth|api)[_-]?token\s*[:=]", Credential, High),
    (r"\b(secret[_-]?key|client[_-]?secret)\s*[:=]", Credential, High),
    (r"\bsk-[a-z0-9]{40,}", Credential, High),
    (r"\bgh[pos]_[a-z0-9]{16,}", Credential, High),
    (r"\bglpat-[a-z0-9_-]{20,}", Credential, High),
    (r"\bakia[0-9a-z]{16}\b", Credential, High),
    (r"\baws[_-]?secret[_-]?access[_-]?key\b", Credential, High),
    (r"authorization\s*:\s*(bearer|basic)\s+\S+", Credential, High),
    (r"-----begin[a-z0-9 ]*private\s+key", Credential, Critical),
    (r"\b(mysql|mariadb|mongodb|postgres(ql)?|redis|ftp|sftp)://[^:/\s]+:[^@\s]+@", Credential, High),
    // Path traversal and sensitive files
    (r"\.\.[/\\]", PathTraversal, High),
    (r"%2e%2e[/\\%]", PathTraversal, High),
    (r"%252e%252e", PathTraversal, High),
    (r"\.\.%(2f|5c)", PathTraversal, High),
    (r"/etc/(passwd|shadow|sudoers)\b", PathTraversal, High),
    (r"/proc/self/environ", PathTraversal, High),
    (r"\.ssh/(id_\w+|authorized_keys)", PathTraversal, High),
];

/// Literal commands rejected wherever they appear (compared lowercased)
pub const BLOCKED_COMMANDS: &[&str] = &[
    "rm -rf /",
    "sudo rm -rf /",
    "format c:",
    ":(){:|:&};:",
    "git push --force origin main",
    "chmod 777 /",
    "chmod -r 777 /",
    "chown -r nobody:nobody /",
    "del /f /s /q *",
    "dd if=/dev/zero of=/dev/sda",
    "mkfs.ext4 /dev/sda",
];

/// Zero-width, direction-override and invisible separator characters
pub const BYPASS_CHARS: &[char] = &[
    '\u{200b}', '\u{200c}', '\u{200d}', '\u{200e}', '\u{200f}', '\u{202a}', '\u{202b}',
    '\u{202c}', '\u{202d}', '\u{202e}', '\u{2060}', '\u{2061}', '\u{2062}', '\u{2063}',
    '\u{2064}', '\u{2066}', '\u{2067}', '\u{2068}', '\u{2069}', '\u{2028}', '\u{2029}',
    '\u{feff}',
];

/// Built-in rules compiled once
pub static BUILTIN_RULES: Lazy<Vec<SafetyRule>> = Lazy::new(|| {
    RULE_TABLE
        .iter()
        .filter_map(|(pattern, category, severity)| {
            SafetyRule::compile(pattern, *category, *severity)
                .map_err(|e| tracing::error!("Built-in safety rule failed to compile: {}", e))
                .ok()
        })
        .collect()
});

/// Digest of the built-in rule set; changes whenever a rule changes
pub static BUILTIN_RULES_DIGEST: Lazy<[u8; 32]> = Lazy::new(|| {
    let mut hasher = Sha256::new();
    for (pattern, category, _) in RULE_TABLE {
        hasher.update(category.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(pattern.as_bytes());
        hasher.update([0]);
    }
    for command in BLOCKED_COMMANDS {
        hasher.update(command.as_bytes());
        hasher.update([0]);
    }
    hasher.finalize().into()
});

pub(crate) fn rule_table_len() -> usize {
    RULE_TABLE.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_builtin_rules_compile() {
        assert_eq!(BUILTIN_RULES.len(), rule_table_len());
    }

    #[test]
    fn test_rules_are_case_insensitive() {
        let rule = SafetyRule::compile(r"\bunion\s+select\b", Injection, High).unwrap();
        assert!(rule.is_match("1 UNION SELECT password"));
        assert!(rule.is_match("1 union select password"));
    }

    #[test]
    fn test_category_display_matches_serde() {
        for category in [DangerousCommand, Credential, PathTraversal, Injection, PrivilegeEscalation] {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category));
        }
    }

    #[test]
    fn test_every_category_has_rules() {
        for category in [DangerousCommand, Credential, PathTraversal, Injection, PrivilegeEscalation] {
            assert!(BUILTIN_RULES.iter().any(|r| r.category == category), "{category}");
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Critical > High);
        assert!(Medium > Low);
    }
}
