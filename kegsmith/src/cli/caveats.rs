// kegsmith/src/cli/caveats.rs
use clap::Args;
use colored::Colorize;
use kegsmith_common::config::Config;
use kegsmith_common::error::Result;
use kegsmith_common::formulary::Formulary;
use kegsmith_common::keg::KegRegistry;

#[derive(Debug, Args)]
pub struct Caveats {
    /// Name of an installed formula
    name: String,
}

impl Caveats {
    pub fn run(&self, config: &Config) -> Result<()> {
        let keg = KegRegistry::new(config.clone()).require_installed_keg(&self.name)?;
        let formula = Formulary::new().load_installed(&keg)?;
        let libexec = keg.libexec_path();
        let bin = config.bin_dir();
        let vars = formula.template_vars(&keg.path, &libexec, &bin);

        match kegsmith_core::caveats(&formula, &vars) {
            Some(text) => println!("{text}"),
            None => println!("{}", format!("{} has no caveats.", keg.name).dimmed()),
        }
        Ok(())
    }
}
