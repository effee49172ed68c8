//! # Policy Compilation
//!
//! Turns policy source text into an immutable [`Policy`].
//!
//! [`RegoSourceCompiler`] checks the structural shape of a Rego module:
//! a leading `package` declaration, balanced delimiters and at least one
//! top-level rule. Evaluation semantics belong to the policy engine that
//! consumes the compiled artifact.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("policy {name} failed to compile at line {line}: {reason}")]
pub struct CompileError {
    pub name: String,
    pub line: usize,
    pub reason: String,
}

/// Compiled policy artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    name: String,
    package: String,
    rules: Vec<String>,
    source: String,
    trace: bool,
}

impl Policy {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted package path, e.g. `rode.image_scan`
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Top-level rule names in declaration order, without duplicates
    #[must_use]
    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn trace(&self) -> bool {
        self.trace
    }
}

/// Compiles a named policy source
pub trait PolicyCompiler: Send + Sync {
    fn compile(&self, name: &str, source: &str, trace: bool) -> Result<Policy, CompileError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RegoSourceCompiler;

impl PolicyCompiler for RegoSourceCompiler {
    fn compile(&self, name: &str, source: &str, trace: bool) -> Result<Policy, CompileError> {
        let fail = |line: usize, reason: String| CompileError {
            name: name.to_string(),
            line,
            reason,
        };

        let mut package: Option<String> = None;
        let mut rules: Vec<String> = Vec::new();
        let mut open: Vec<(char, usize)> = Vec::new();
        let mut in_raw_string = false;

        for (index, raw_line) in source.lines().enumerate() {
            let line_no = index + 1;
            let at_top_level = open.is_empty() && !in_raw_string;
            let code = scan_line(raw_line, line_no, &mut open, &mut in_raw_string)
                .map_err(|reason| fail(line_no, reason))?;
            let statement = code.trim();

            if !at_top_level || statement.is_empty() {
                continue;
            }

            if package.is_none() {
                let path = statement
                    .strip_prefix("package ")
                    .map(str::trim)
                    .ok_or_else(|| fail(line_no, "expected package declaration".to_string()))?;
                if !is_package_path(path) {
                    return Err(fail(line_no, format!("invalid package path `{path}`")));
                }
                package = Some(path.to_string());
                continue;
            }

            if statement.starts_with("import ") {
                continue;
            }

            let head = statement.strip_prefix("default ").unwrap_or(statement).trim_start();
            let rule = rule_name(head)
                .ok_or_else(|| fail(line_no, format!("expected rule or import, found `{statement}`")))?;
            if !rules.iter().any(|existing| existing == rule) {
                rules.push(rule.to_string());
            }
        }

        if in_raw_string {
            return Err(fail(source.lines().count(), "unterminated raw string".to_string()));
        }
        if let Some((delimiter, line)) = open.first() {
            return Err(fail(*line, format!("unclosed `{delimiter}`")));
        }
        let package =
            package.ok_or_else(|| fail(1, "missing package declaration".to_string()))?;
        if rules.is_empty() {
            return Err(fail(source.lines().count(), "policy declares no rules".to_string()));
        }

        Ok(Policy {
            name: name.to_string(),
            package,
            rules,
            source: source.to_string(),
            trace,
        })
    }
}

/// Track delimiters on one line and return the line with comments and
/// string contents removed.
fn scan_line(
    line: &str,
    line_no: usize,
    open: &mut Vec<(char, usize)>,
    in_raw_string: &mut bool,
) -> Result<String, String> {
    let mut code = String::with_capacity(line.len());
    let mut chars = line.chars();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if *in_raw_string {
            if c == '`' {
                *in_raw_string = false;
            }
            continue;
        }
        if in_string {
            match c {
                '\\' => {
                    chars.next();
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '#' => break,
            '"' => in_string = true,
            '`' => *in_raw_string = true,
            '{' | '[' | '(' => open.push((c, line_no)),
            '}' | ']' | ')' => {
                let expected = match c {
                    '}' => '{',
                    ']' => '[',
                    _ => '(',
                };
                match open.pop() {
                    Some((opener, _)) if opener == expected => {}
                    _ => return Err(format!("unexpected `{c}`")),
                }
            }
            _ => {}
        }
        code.push(c);
    }

    if in_string {
        return Err("unterminated string".to_string());
    }
    Ok(code)
}

fn is_package_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('.').all(|segment| {
            segment
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Leading identifier of a rule head, if the statement starts with one
fn rule_name(head: &str) -> Option<&str> {
    let end = head
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(head.len());
    let name = &head[..end];
    let first = name.chars().next()?;
    (first.is_ascii_alphabetic() || first == '_').then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"package rode.image_scan

import input.violations

# deny anything with findings
default allow = false

allow {
    count(input.violations) == 0
}

deny[msg] {
    v := input.violations[_]
    msg := sprintf("found %v", [v.id])
}

allow {
    input.override == "approved"
}
"#;

    fn compile(source: &str) -> Result<Policy, CompileError> {
        RegoSourceCompiler.compile("image-scan", source, false)
    }

    #[test]
    fn test_compiles_valid_policy() {
        let policy = compile(VALID).unwrap();
        assert_eq!(policy.name(), "image-scan");
        assert_eq!(policy.package(), "rode.image_scan");
        assert_eq!(policy.rules(), ["allow".to_string(), "deny".to_string()]);
        assert!(!policy.trace());
    }

    #[test]
    fn test_compilation_is_deterministic() {
        assert_eq!(compile(VALID).unwrap(), compile(VALID).unwrap());
    }

    #[test]
    fn test_trace_flag_is_carried() {
        let policy = RegoSourceCompiler.compile("p", VALID, true).unwrap();
        assert!(policy.trace());
    }

    #[test]
    fn test_rejects_empty_source() {
        let err = compile("").unwrap_err();
        assert_eq!(err.reason, "missing package declaration");
    }

    #[test]
    fn test_rejects_missing_package() {
        let err = compile("allow {\n  true\n}\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.reason, "expected package declaration");
    }

    #[test]
    fn test_rejects_invalid_package_path() {
        let err = compile("package rode..scan\nallow { true }\n").unwrap_err();
        assert!(err.reason.contains("invalid package path"));
    }

    #[test]
    fn test_rejects_unbalanced_braces() {
        let err = compile("package p\n\nallow {\n  true\n").unwrap_err();
        assert_eq!(err.reason, "unclosed `{`");
    }

    #[test]
    fn test_rejects_unexpected_closer() {
        let err = compile("package p\nallow { true ]\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.reason, "unexpected `]`");
    }

    #[test]
    fn test_ignores_delimiters_in_strings_and_comments() {
        let source = "package p\n# { not code\nallow { input.x == \"}\" }\n";
        assert_eq!(compile(source).unwrap().rules(), ["allow".to_string()]);
    }

    #[test]
    fn test_rejects_policy_without_rules() {
        let err = compile("package p\nimport input\n").unwrap_err();
        assert_eq!(err.reason, "policy declares no rules");
    }

    #[test]
    fn test_error_message_names_policy_and_line() {
        let err = compile("package p\n}\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "policy image-scan failed to compile at line 2: unexpected `}`"
        );
    }
}
