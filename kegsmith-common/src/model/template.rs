// kegsmith-common/src/model/template.rs
//! `{placeholder}` substitution for post-install messages and caveats.
use std::path::Path;

use crate::error::{KegError, Result};

pub const PLACEHOLDERS: [&str; 5] = ["name", "version", "prefix", "libexec", "bin"];

/// Values substituted into message templates.
#[derive(Debug, Clone)]
pub struct TemplateVars<'a> {
    pub name: &'a str,
    pub version: &'a str,
    pub prefix: &'a Path,
    pub libexec: &'a Path,
    pub bin: &'a Path,
}

impl TemplateVars<'_> {
    fn lookup(&self, key: &str) -> Option<String> {
        match key {
            "name" => Some(self.name.to_string()),
            "version" => Some(self.version.to_string()),
            "prefix" => Some(self.prefix.display().to_string()),
            "libexec" => Some(self.libexec.display().to_string()),
            "bin" => Some(self.bin.display().to_string()),
            _ => None,
        }
    }
}

enum Piece<'t> {
    Literal(&'t str),
    Brace(char),
    Placeholder(&'t str),
}

fn parse(template: &str) -> Result<Vec<Piece<'_>>> {
    let mut pieces = Vec::new();
    let mut rest = template;
    while let Some(idx) = rest.find(['{', '}']) {
        if idx > 0 {
            pieces.push(Piece::Literal(&rest[..idx]));
        }
        let tail = &rest[idx..];
        if tail.starts_with("{{") {
            pieces.push(Piece::Brace('{'));
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            pieces.push(Piece::Brace('}'));
            rest = &tail[2..];
        } else if tail.starts_with('{') {
            let end = tail.find('}').ok_or_else(|| {
                KegError::Config(format!("Unclosed '{{' in template: {template:?}"))
            })?;
            let key = &tail[1..end];
            if !PLACEHOLDERS.contains(&key) {
                return Err(KegError::Config(format!(
                    "Unknown placeholder '{{{key}}}' in template {template:?} (known: {})",
                    PLACEHOLDERS.join(", ")
                )));
            }
            pieces.push(Piece::Placeholder(key));
            rest = &tail[end + 1..];
        } else {
            return Err(KegError::Config(format!(
                "Unmatched '}}' in template: {template:?}"
            )));
        }
    }
    if !rest.is_empty() {
        pieces.push(Piece::Literal(rest));
    }
    Ok(pieces)
}

/// Checks a template for unknown placeholders without rendering it.
pub fn check(template: &str) -> Result<()> {
    parse(template).map(|_| ())
}

pub fn render(template: &str, vars: &TemplateVars<'_>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    for piece in parse(template)? {
        match piece {
            Piece::Literal(s) => out.push_str(s),
            Piece::Brace(c) => out.push(c),
            Piece::Placeholder(key) => {
                // parse() only yields known keys
                if let Some(value) = vars.lookup(key) {
                    out.push_str(&value);
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn with_vars<T>(f: impl FnOnce(&TemplateVars<'_>) -> T) -> T {
        let prefix = PathBuf::from("/opt/ks/Cellar/founder-os/1.0.0");
        let libexec = prefix.join("libexec");
        let bin = PathBuf::from("/opt/ks/bin");
        f(&TemplateVars {
            name: "founder-os",
            version: "1.0.0",
            prefix: &prefix,
            libexec: &libexec,
            bin: &bin,
        })
    }

    #[test]
    fn substitutes_prefix() {
        let out = with_vars(|v| render("cd {prefix} && claude", v)).unwrap();
        assert_eq!(out, "cd /opt/ks/Cellar/founder-os/1.0.0 && claude");
    }

    #[test]
    fn doubled_braces_are_literal() {
        let out = with_vars(|v| render("{{name}} is {name}", v)).unwrap();
        assert_eq!(out, "{name} is founder-os");
    }

    #[test]
    fn unknown_placeholder_is_a_config_error() {
        assert!(matches!(check("cd {home}"), Err(KegError::Config(_))));
        assert!(matches!(check("oops {prefix"), Err(KegError::Config(_))));
        assert!(matches!(check("oops }"), Err(KegError::Config(_))));
    }

    #[test]
    fn plain_text_passes_through() {
        let out = with_vars(|v| render("\"Help me with my emails\"", v)).unwrap();
        assert_eq!(out, "\"Help me with my emails\"");
    }
}
