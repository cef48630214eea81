// kegsmith-core/src/hooks.rs
use std::path::Path;

use kegsmith_common::error::{KegError, Result};
use kegsmith_common::model::template::render;
use kegsmith_common::model::{Formula, TemplateVars, TestAssertion};
use tracing::{debug, warn};

use crate::runtime::{RuntimeHandle, RuntimeProvider};

fn render_or_raw(template: &str, vars: &TemplateVars<'_>) -> String {
    render(template, vars).unwrap_or_else(|e| {
        // Templates are checked at load time; this only trips on hand-built formulas.
        warn!("Could not render template '{}': {}", template, e);
        template.to_string()
    })
}

/// Messages to show once the keg is ready. Never fails.
pub fn post_install(formula: &Formula, vars: &TemplateVars<'_>) -> Vec<String> {
    formula
        .post_install
        .iter()
        .map(|line| render_or_raw(line, vars))
        .collect()
}

pub fn caveats(formula: &Formula, vars: &TemplateVars<'_>) -> Option<String> {
    formula
        .caveats
        .as_deref()
        .map(|text| render_or_raw(text, vars))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionResult {
    pub assertion: TestAssertion,
    pub passed: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReport {
    pub formula: String,
    pub results: Vec<AssertionResult>,
}

impl TestReport {
    /// True unless at least one assertion failed.
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &AssertionResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            return Ok(self);
        }
        Err(KegError::TestAssertionFailure {
            formula: self.formula.clone(),
            failed: self
                .failures()
                .map(|r| match &r.detail {
                    Some(detail) => format!("{}: {}", r.assertion, detail),
                    None => r.assertion.to_string(),
                })
                .collect(),
        })
    }
}

/// Runs every assertion of `formula` against an installed keg. All assertions
/// run even after one fails, so the report is complete.
pub async fn run_test<R: RuntimeProvider>(
    provider: &R,
    runtime: &RuntimeHandle,
    formula: &Formula,
    prefix: &Path,
) -> TestReport {
    let mut results = Vec::with_capacity(formula.test.len());
    for assertion in &formula.test {
        let (passed, detail) = match assertion {
            TestAssertion::Importable { module } => {
                match provider.check_import(runtime, module).await {
                    Ok(true) => (true, None),
                    Ok(false) => (false, Some("module not importable".to_string())),
                    Err(e) => (false, Some(e.to_string())),
                }
            }
            TestAssertion::FileExists { path } => {
                let full = prefix.join(path);
                if full.exists() {
                    (true, None)
                } else {
                    (false, Some(format!("{} is missing", full.display())))
                }
            }
        };
        debug!(
            "Test '{}' for {}: {}",
            assertion,
            formula.name(),
            if passed { "passed" } else { "failed" }
        );
        results.push(AssertionResult {
            assertion: assertion.clone(),
            passed,
            detail,
        });
    }
    TestReport {
        formula: formula.name().to_string(),
        results,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::test_support::{sample_formula, FakeRuntime};

    fn vars_for<'a>(
        formula: &'a Formula,
        prefix: &'a Path,
        libexec: &'a Path,
        bin: &'a Path,
    ) -> TemplateVars<'a> {
        formula.template_vars(prefix, libexec, bin)
    }

    #[test]
    fn messages_substitute_prefix() {
        let mut formula = sample_formula(&[], b"src");
        formula.post_install = vec!["Installed to {prefix}".to_string()];
        formula.caveats = Some("Run {bin}/{name} from {{anywhere}}".to_string());
        let prefix = PathBuf::from("/k/Cellar/founder-os/1.0.0");
        let libexec = prefix.join("libexec");
        let bin = PathBuf::from("/k/bin");
        let vars = vars_for(&formula, &prefix, &libexec, &bin);

        assert_eq!(
            post_install(&formula, &vars),
            vec!["Installed to /k/Cellar/founder-os/1.0.0"]
        );
        assert_eq!(
            caveats(&formula, &vars).as_deref(),
            Some("Run /k/bin/founder-os from {anywhere}")
        );
    }

    #[tokio::test]
    async fn report_fails_iff_an_assertion_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "").unwrap();
        let runtime = RuntimeHandle::for_libexec(dir.path().join("libexec"));
        let mut formula = sample_formula(&[], b"src");
        formula.test = vec![
            TestAssertion::Importable {
                module: "google.auth".to_string(),
            },
            TestAssertion::FileExists {
                path: "main.py".to_string(),
            },
        ];

        let provider = FakeRuntime::default().with_modules(&["google.auth"]);
        let report = run_test(&provider, &runtime, &formula, dir.path()).await;
        assert!(report.passed());
        assert_eq!(report.results.len(), 2);

        let provider = FakeRuntime::default();
        let report = run_test(&provider, &runtime, &formula, dir.path()).await;
        assert!(!report.passed());
        assert_eq!(report.failures().count(), 1);
        match report.into_result().unwrap_err() {
            KegError::TestAssertionFailure { formula, failed } => {
                assert_eq!(formula, "founder-os");
                assert_eq!(failed, vec!["import google.auth: module not importable"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_test_block_passes() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = RuntimeHandle::for_libexec(dir.path().join("libexec"));
        let mut formula = sample_formula(&[], b"src");
        formula.test.clear();
        let report = run_test(&FakeRuntime::default(), &runtime, &formula, dir.path()).await;
        assert!(report.passed());
    }
}
