use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use disflow_core::config::DisConfig;
use disflow_core::flow::DisOpticalFlow;
use disflow_core::frame::FlowField;
use disflow_core::io::{load_flo, load_image, save_flo, save_flow_visualization};
use indicatif::{ProgressBar, ProgressStyle};

use super::PresetArg;
use crate::summary::{print_config_summary, print_flow_summary};

#[derive(Args)]
pub struct FlowArgs {
    /// First frame
    pub frame0: PathBuf,

    /// Second frame
    pub frame1: PathBuf,

    /// Parameter preset
    #[arg(long, value_enum, default_value = "balanced")]
    pub preset: PresetArg,

    /// Flow config file (TOML), replaces the preset
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Finest pyramid scale (0 = full resolution)
    #[arg(long)]
    pub finest_scale: Option<usize>,

    /// Patch size in pixels
    #[arg(long)]
    pub patch_size: Option<usize>,

    /// Patch stride in pixels
    #[arg(long)]
    pub patch_stride: Option<usize>,

    /// Gradient descent iterations per patch
    #[arg(long)]
    pub iterations: Option<usize>,

    /// Variational refinement iterations (0 disables)
    #[arg(long)]
    pub variational_iterations: Option<usize>,

    /// Disable patch mean normalization
    #[arg(long)]
    pub no_mean_normalization: bool,

    /// Disable spatial propagation
    #[arg(long)]
    pub no_spatial_propagation: bool,

    /// Worker threads (defaults to one per core)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Initial flow estimate (.flo)
    #[arg(long)]
    pub initial_flow: Option<PathBuf>,

    /// Write the flow as a Middlebury .flo file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write a colour-coded PNG of the flow
    #[arg(long)]
    pub visualize: Option<PathBuf>,

    /// Magnitude mapped to full brightness in the visualization
    #[arg(long)]
    pub max_magnitude: Option<f32>,
}

pub fn run(args: &FlowArgs) -> Result<()> {
    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure the thread pool")?;
    }

    let config = build_config(args)?;
    config.validate().context("Invalid flow config")?;

    let frame0 = load_image(&args.frame0)
        .with_context(|| format!("Failed to load {}", args.frame0.display()))?;
    let frame1 = load_image(&args.frame1)
        .with_context(|| format!("Failed to load {}", args.frame1.display()))?;

    let mut flow = match args.initial_flow {
        Some(ref path) => {
            load_flo(path).with_context(|| format!("Failed to load {}", path.display()))?
        }
        None => FlowField::default(),
    };

    print_config_summary(&config, &args.frame0, &args.frame1);

    let mut dis = DisOpticalFlow::new(config);
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("Scales [{bar:40}] {pos}%")?
            .progress_chars("=> "),
    );

    let start = Instant::now();
    dis.calc_with_progress(frame0.view(), frame1.view(), &mut flow, |progress| {
        pb.set_position((progress * 100.0) as u64);
    })
    .context("Flow computation failed")?;
    pb.finish();
    let elapsed = start.elapsed();

    print_flow_summary(&flow, dis.last_plan(), elapsed);

    if let Some(ref path) = args.output {
        save_flo(&flow, path).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Flow saved to {}", path.display());
    }
    if let Some(ref path) = args.visualize {
        save_flow_visualization(&flow, path, args.max_magnitude)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Visualization saved to {}", path.display());
    }

    Ok(())
}

fn build_config(args: &FlowArgs) -> Result<DisConfig> {
    let mut config = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        toml::from_str(&contents).context("Invalid flow config")?
    } else {
        DisConfig::from_preset(args.preset.into())
    };

    if let Some(v) = args.finest_scale {
        config.finest_scale = v;
    }
    if let Some(v) = args.patch_size {
        config.patch_size = v;
    }
    if let Some(v) = args.patch_stride {
        config.patch_stride = v;
    }
    if let Some(v) = args.iterations {
        config.grad_descent_iterations = v;
    }
    if let Some(v) = args.variational_iterations {
        config.variational.iterations = v;
    }
    if args.no_mean_normalization {
        config.use_mean_normalization = false;
    }
    if args.no_spatial_propagation {
        config.use_spatial_propagation = false;
    }

    Ok(config)
}
