// kegsmith/src/cli/list.rs
use clap::Args;
use colored::Colorize;
use kegsmith_common::config::Config;
use kegsmith_common::error::Result;
use kegsmith_common::keg::KegRegistry;
use prettytable::{format, Cell, Row, Table};

#[derive(Args, Debug)]
pub struct List {
    /// Also show the keg path of each install
    #[arg(long)]
    pub paths: bool,
}

impl List {
    pub fn run(&self, config: &Config) -> Result<()> {
        let installed = KegRegistry::new(config.clone()).list_installed_kegs()?;
        if installed.is_empty() {
            println!("{}", "0 formulas installed".yellow());
            return Ok(());
        }

        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
        let mut header = vec![
            Cell::new("Name").style_spec("b"),
            Cell::new("Version").style_spec("b"),
        ];
        if self.paths {
            header.push(Cell::new("Prefix").style_spec("b"));
        }
        table.add_row(Row::new(header));

        for keg in &installed {
            let mut row = vec![
                Cell::new(&keg.name).style_spec("Fc"),
                Cell::new(&keg.version_str),
            ];
            if self.paths {
                row.push(Cell::new(&keg.path.display().to_string()));
            }
            table.add_row(Row::new(row));
        }
        table.printstd();
        println!("{}", format!("{} formulas installed", installed.len()).bold());
        Ok(())
    }
}
