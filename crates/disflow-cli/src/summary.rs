use std::path::Path;
use std::time::Duration;

use console::Style;
use disflow_core::config::DisConfig;
use disflow_core::flow::ScalePlan;
use disflow_core::frame::FlowField;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

fn on_off(s: &Styles, enabled: bool) -> String {
    if enabled {
        s.value.apply_to("on").to_string()
    } else {
        s.disabled.apply_to("off").to_string()
    }
}

pub fn print_config_summary(config: &DisConfig, frame0: &Path, frame1: &Path) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("DIS Optical Flow"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(16)));
    println!();

    println!("  {:<14}{}", s.label.apply_to("Frame 0"), s.path.apply_to(frame0.display()));
    println!("  {:<14}{}", s.label.apply_to("Frame 1"), s.path.apply_to(frame1.display()));
    println!();

    println!("  {}", s.header.apply_to("Patches"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Size"),
        s.value.apply_to(format!("{}px, stride {}", config.patch_size, config.patch_stride))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Descent"),
        s.value.apply_to(format!("{} iterations", config.grad_descent_iterations))
    );
    println!("    {:<12}{}", s.label.apply_to("Mean norm"), on_off(&s, config.use_mean_normalization));
    println!("    {:<12}{}", s.label.apply_to("Propagate"), on_off(&s, config.use_spatial_propagation));
    println!();

    let var = &config.variational;
    if var.is_enabled() {
        println!("  {}", s.header.apply_to("Refinement"));
        println!(
            "    {:<12}{}",
            s.label.apply_to("Iterations"),
            s.value.apply_to(format!("{} x {} SOR", var.iterations, var.sor_iterations))
        );
        println!(
            "    {:<12}{}",
            s.label.apply_to("Weights"),
            s.value.apply_to(format!("alpha {} gamma {} delta {}", var.alpha, var.gamma, var.delta))
        );
    } else {
        println!("  {:<14}{}", s.header.apply_to("Refinement"), s.disabled.apply_to("disabled"));
    }
    println!();
}

pub fn print_flow_summary(flow: &FlowField, plan: Option<ScalePlan>, elapsed: Duration) {
    let s = Styles::new();
    let stats = flow.stats();

    println!();
    println!("  {}", s.header.apply_to("Result"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Size"),
        s.value.apply_to(format!("{}x{}", flow.width(), flow.height()))
    );
    if let Some(plan) = plan {
        let auto = if plan.auto_selected { " (auto)" } else { "" };
        println!(
            "    {:<12}{}",
            s.label.apply_to("Scales"),
            s.value.apply_to(format!(
                "{}..={}, patch {}{}",
                plan.finest_scale, plan.coarsest_scale, plan.patch_size, auto
            ))
        );
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Mean"),
        s.value.apply_to(format!("({:.3}, {:.3})", stats.mean_dx, stats.mean_dy))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Magnitude"),
        s.value.apply_to(format!(
            "mean {:.3}, max {:.3}",
            stats.mean_magnitude, stats.max_magnitude
        ))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Elapsed"),
        s.value.apply_to(format!("{:.1} ms", elapsed.as_secs_f64() * 1000.0))
    );
    println!();
}
