// kegsmith/src/cli/info.rs
use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use kegsmith_common::config::Config;
use kegsmith_common::error::Result;
use kegsmith_common::formulary::Formulary;
use kegsmith_common::keg::KegRegistry;
use prettytable::{format, Cell, Row, Table};

use crate::cli::status::heading;

#[derive(Args, Debug)]
pub struct Info {
    /// Formula definition (.json or .toml)
    #[arg(value_name = "FORMULA_FILE")]
    pub formula_file: PathBuf,

    /// Print the parsed formula as JSON
    #[arg(long)]
    pub json: bool,
}

impl Info {
    pub fn run(&self, config: &Config) -> Result<()> {
        let formula = Formulary::new().load_path(&self.formula_file)?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(formula.as_ref())?);
            return Ok(());
        }

        println!(
            "{}",
            heading(&format!("{} {}", formula.name(), formula.version_str()))
        );
        if let Some(desc) = &formula.desc {
            println!("{desc}");
        }
        if let Some(homepage) = &formula.homepage {
            println!("{homepage}");
        }
        if let Some(license) = &formula.license {
            println!("{} {}", "License:".bold(), license);
        }
        println!("{} {}", "Source:".bold(), formula.source_url());
        if let Some(head) = &formula.head {
            match &head.branch {
                Some(branch) => println!("{} {} ({})", "Head:".bold(), head.url, branch),
                None => println!("{} {}", "Head:".bold(), head.url),
            }
        }

        let registry = KegRegistry::new(config.clone());
        match registry.get_installed_keg(formula.name())? {
            Some(keg) => println!(
                "{} {} ({})",
                "Installed:".bold(),
                keg.version_str.green(),
                keg.path.display()
            ),
            None => println!("{} {}", "Installed:".bold(), "no".dimmed()),
        }

        if !formula.dependencies.is_empty() {
            println!();
            println!("{}", heading("Dependencies"));
            println!("{}", formula.dependencies.join(", "));
        }

        if !formula.resources().is_empty() {
            println!();
            println!("{}", heading(&format!("Resources ({})", formula.resources().len())));
            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
            table.add_row(Row::new(vec![
                Cell::new("Name").style_spec("b"),
                Cell::new("SHA256").style_spec("b"),
            ]));
            for resource in formula.resources() {
                table.add_row(Row::new(vec![
                    Cell::new(&resource.name).style_spec("Fc"),
                    Cell::new(&resource.sha256[..12.min(resource.sha256.len())]),
                ]));
            }
            table.printstd();
        }

        let plan = formula.install_plan()?;
        if !plan.launchers.is_empty() {
            println!();
            println!("{}", heading("Launchers"));
            for launcher in &plan.launchers {
                println!(
                    "{} -> {}",
                    config.launcher_path(&launcher.name).display(),
                    launcher.entry_point
                );
            }
        }
        Ok(())
    }
}
