use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use disflow_core::config::DisConfig;

use super::PresetArg;

#[derive(Args)]
pub struct ConfigArgs {
    /// Preset the printed config starts from
    #[arg(long, value_enum, default_value = "balanced")]
    pub preset: PresetArg,

    /// Write config to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Print or save the full config of a preset as TOML.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let config = DisConfig::from_preset(args.preset.into());
    let toml_str = toml::to_string_pretty(&config)?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &toml_str)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        println!("Config saved to {}", path.display());
    } else {
        print!("{}", toml_str);
    }

    Ok(())
}
