pub mod config;
pub mod flow;

use clap::ValueEnum;
use disflow_core::config::Preset;

#[derive(Clone, Copy, Default, ValueEnum)]
pub enum PresetArg {
    Fastest,
    #[default]
    Balanced,
    HigherQuality,
}

impl From<PresetArg> for Preset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Fastest => Preset::Fastest,
            PresetArg::Balanced => Preset::Balanced,
            PresetArg::HigherQuality => Preset::HigherQuality,
        }
    }
}
