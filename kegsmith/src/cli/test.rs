// kegsmith/src/cli/test.rs
use clap::Args;
use colored::Colorize;
use kegsmith_common::config::Config;
use kegsmith_common::error::Result;
use kegsmith_common::formulary::Formulary;
use kegsmith_common::keg::KegRegistry;
use kegsmith_core::{run_test, PythonVenvProvider, RuntimeProvider};

use crate::cli::status::heading;

#[derive(Debug, Args)]
pub struct TestArgs {
    /// Name of an installed formula
    name: String,
}

impl TestArgs {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let keg = KegRegistry::new(config.clone()).require_installed_keg(&self.name)?;
        let formula = Formulary::new().load_installed(&keg)?;
        let provider = PythonVenvProvider::new(config);
        let runtime = provider.open_runtime(&keg.path)?;

        println!(
            "{}",
            heading(&format!("Testing {} {}", keg.name, keg.version_str))
        );
        let report = run_test(&provider, &runtime, &formula, &keg.path).await;
        for result in &report.results {
            if result.passed {
                println!("  {} {}", "✓".green(), result.assertion);
            } else {
                let detail = result.detail.as_deref().unwrap_or("failed");
                println!("  {} {} ({})", "✗".red(), result.assertion, detail.dimmed());
            }
        }
        report.into_result().map(|_| ())
    }
}
