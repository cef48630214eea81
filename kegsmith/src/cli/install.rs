// kegsmith/src/cli/install.rs
use std::path::PathBuf;

use clap::Args;
use kegsmith_common::config::Config;
use kegsmith_common::error::Result;
use kegsmith_common::formulary::Formulary;
use kegsmith_core::{InstallReport, Installer, PythonVenvProvider};
use kegsmith_net::UrlSource;
use tokio::sync::broadcast;
use tracing::instrument;

use crate::cli::status::{self, heading};

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Formula definition (.json or .toml)
    #[arg(required = true, value_name = "FORMULA_FILE")]
    formula_file: PathBuf,
}

impl InstallArgs {
    #[instrument(skip(self, config), fields(formula_file = %self.formula_file.display()))]
    pub async fn run(&self, config: &Config) -> Result<()> {
        let formula = Formulary::new().load_path(&self.formula_file)?;

        let (event_tx, event_rx) = broadcast::channel(128);
        let status_handle = tokio::spawn(status::handle_events(event_rx));

        let result = {
            let source = UrlSource::new(config)?;
            let provider = PythonVenvProvider::new(config);
            let mut installer =
                Installer::new(config.clone(), source, provider)?.with_events(event_tx);
            installer.install(&formula).await
        };
        // The installer (and its sender) is gone; the status task drains and exits.
        if let Err(e) = status_handle.await {
            tracing::warn!("Status display task failed: {}", e);
        }

        let report = result?;
        print_lifecycle_messages(&report);
        Ok(())
    }
}

fn print_lifecycle_messages(report: &InstallReport) {
    if !report.post_install.is_empty() {
        println!();
        for line in &report.post_install {
            println!("{}", heading(line));
        }
    }
    if let Some(caveats) = &report.caveats {
        println!();
        println!("{}", heading("Caveats"));
        println!("{caveats}");
    }
}
