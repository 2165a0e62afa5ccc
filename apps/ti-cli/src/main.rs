mod error;
mod models;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use ti_core::timing::{self, Timer};
use ti_integrate::{
    ControllerLaw, DerivativeOrder, Integrator, IntegratorConfig, IntegratorStats, Method,
    RunOptions, SimProgress, SimRecord, run_with_progress,
};

use crate::error::{CliError, CliResult};
use crate::models::{DemoModel, ModelKind};

#[derive(Parser)]
#[command(name = "ti-cli")]
#[command(about = "Time integration CLI - run built-in models with any integration method", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available integration methods
    Methods,
    /// Run a built-in model
    Run(RunArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Model to integrate
    #[arg(value_enum)]
    model: ModelKind,
    /// Integration method (see `methods`)
    #[arg(long)]
    method: Option<Method>,
    /// Step-size control law for adaptive methods
    #[arg(long, value_parser = parse_law)]
    law: Option<ControllerLaw>,
    /// Stencil points used for derived quantities (2, 3 or 4)
    #[arg(long, value_parser = parse_stencil)]
    stencil: Option<DerivativeOrder>,
    /// Initial internal time step in seconds
    #[arg(long)]
    dt: Option<f64>,
    /// End time in seconds
    #[arg(long)]
    t_end: Option<f64>,
    /// Recording interval in seconds
    #[arg(long)]
    frame: Option<f64>,
    /// Relative error tolerance
    #[arg(long)]
    rel_tol: Option<f64>,
    /// Absolute error tolerance
    #[arg(long)]
    abs_tol: Option<f64>,
    /// YAML file with `integrator` and `run` sections
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
    /// Pace the run against wall-clock time
    #[arg(long)]
    realtime: bool,
    /// Reuse the last stage of FSAL methods
    #[arg(long)]
    fsal: bool,
    /// Report wall time per integration phase
    #[arg(long)]
    timing: bool,
    /// Output CSV file path for the recorded series
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Contents of a `--config` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RunFile {
    integrator: IntegratorConfig,
    run: RunOptions,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    model: String,
    method: Method,
    frames: usize,
    t_final: f64,
    labels: &'a [&'a str],
    state: Vec<f64>,
    max_abs_error: Option<f64>,
    stats: IntegratorStats,
}

fn main() -> CliResult<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Methods => cmd_methods(),
        Commands::Run(args) => cmd_run(&args),
    }
}

fn parse_law(s: &str) -> Result<ControllerLaw, String> {
    match s.to_ascii_lowercase().as_str() {
        "press" => Ok(ControllerLaw::Press),
        "gustafsson" | "pi" => Ok(ControllerLaw::Gustafsson),
        other => Err(format!("unknown control law '{other}' (press, gustafsson)")),
    }
}

fn parse_stencil(s: &str) -> Result<DerivativeOrder, String> {
    match s {
        "2" => Ok(DerivativeOrder::TwoPoint),
        "3" => Ok(DerivativeOrder::ThreePoint),
        "4" => Ok(DerivativeOrder::FourPoint),
        other => Err(format!("stencil must be 2, 3 or 4, got '{other}'")),
    }
}

fn cmd_methods() -> CliResult<()> {
    println!("Integration methods:");
    for method in Method::ALL {
        let kind = if method.is_adaptive() {
            "adaptive"
        } else if method.is_multistep() {
            "multistep"
        } else {
            "fixed"
        };
        let stages = method
            .tableau()
            .map(|t| format!("{} stages", t.stages()))
            .unwrap_or_else(|| "2 evaluations".to_string());
        println!(
            "  {:<14} {:<28} {:<9} {}",
            method.short_name(),
            method.display_name(),
            kind,
            stages
        );
    }
    Ok(())
}

fn load_run_file(path: &Path) -> CliResult<RunFile> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| CliError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Merge command-line overrides on top of the config file.
fn resolve(args: &RunArgs) -> CliResult<(IntegratorConfig, RunOptions)> {
    let RunFile {
        mut integrator,
        mut run,
    } = match &args.config {
        Some(path) => load_run_file(path)?,
        None => RunFile::default(),
    };

    if let Some(method) = args.method {
        integrator.method = method;
    }
    if let Some(law) = args.law {
        integrator.law = law;
    }
    if let Some(order) = args.stencil {
        integrator.derivative_order = order;
    }
    if let Some(dt) = args.dt {
        integrator.time_step_init = dt;
        integrator.time_step_max = integrator.time_step_max.max(dt);
    }
    if let Some(rel) = args.rel_tol {
        integrator.tolerances.rel = rel;
    }
    if let Some(abs) = args.abs_tol {
        integrator.tolerances.abs = abs;
    }
    integrator.real_time |= args.realtime;
    integrator.fsal_reuse |= args.fsal;

    if let Some(t_end) = args.t_end {
        run.t_end = t_end;
    }
    if let Some(frame) = args.frame {
        run.frame = frame;
    }

    integrator.validate()?;
    run.validate()?;
    Ok((integrator, run))
}

fn cmd_run(args: &RunArgs) -> CliResult<()> {
    let (config, opts) = resolve(args)?;
    tracing::debug!(?config, ?opts, "resolved run configuration");
    let method = config.method;
    if !args.json {
        println!("Running {:?} with {}", args.model, method.display_name());
        println!(
            "  dt = {:.3e} s, t_end = {:.3} s, frame = {:.3} s",
            config.time_step_init, opts.t_end, opts.frame
        );
    }

    if args.timing {
        timing::enable_timing();
    }
    let run_timer = Timer::start("run");

    let mut integ = Integrator::new(config)?;
    let mut model = args.model.build()?;
    let mut handle: &mut dyn DemoModel = model.as_mut();

    let mut last_emit = Instant::now();
    let quiet = args.json;
    let record = run_with_progress(
        &mut integ,
        &mut handle,
        &opts,
        |m| m.snapshot(),
        |p| {
            if !quiet && last_emit.elapsed().as_millis() >= 100 {
                render_progress(p, opts.t_start);
                last_emit = Instant::now();
            }
        },
    )?;
    if !quiet {
        clear_progress_line();
    }

    let max_abs_error = record
        .t
        .iter()
        .zip(&record.x)
        .filter_map(|(&t, x)| {
            let exact = handle.exact(t)?;
            x.iter()
                .zip(&exact)
                .map(|(a, b)| (a - b).abs())
                .reduce(f64::max)
        })
        .reduce(f64::max);

    if let Some(path) = &args.output {
        write_csv(path, handle.labels(), &record)?;
    }

    let (t_final, state) = record
        .last()
        .map(|(t, x)| (t, x.clone()))
        .unwrap_or((opts.t_start, Vec::new()));
    let summary = RunSummary {
        model: format!("{:?}", args.model),
        method,
        frames: record.len().saturating_sub(1),
        t_final,
        labels: handle.labels(),
        state,
        max_abs_error,
        stats: integ.stats().clone(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
        run_timer.stop_and_print();
        timing::step_timing::print_summary();
    }
    Ok(())
}

fn clear_progress_line() {
    print!("\r{}\r", " ".repeat(100));
    let _ = io::stdout().flush();
}

fn render_progress(p: &SimProgress, t_start: f64) {
    let fraction = p.fraction(t_start);
    let width = 28usize;
    let filled = ((fraction * width as f64).round() as usize).min(width);
    print!(
        "\r[{}{}] {:>6.2}%  t={:.3}/{:.3}s  steps={}  rejected={}",
        "#".repeat(filled),
        "-".repeat(width - filled),
        fraction * 100.0,
        p.t,
        p.t_end,
        p.stats.accepted_steps,
        p.stats.rejected_steps
    );
    let _ = io::stdout().flush();
}

fn print_summary(summary: &RunSummary<'_>) {
    println!("✓ Reached t = {:.6} s in {} frames", summary.t_final, summary.frames);
    for (label, value) in summary.labels.iter().zip(&summary.state) {
        println!("  {:<6} = {:.9e}", label, value);
    }
    if let Some(err) = summary.max_abs_error {
        println!("  Max error vs exact: {:.3e}", err);
    }

    let stats = &summary.stats;
    println!("\nStep summary:");
    println!("  Accepted steps: {}", stats.accepted_steps);
    println!("  Rejected steps: {}", stats.rejected_steps);
    println!("  Evaluations:    {}", stats.evaluations);
    if stats.fsal_reuses > 0 {
        println!("  FSAL reuses:    {}", stats.fsal_reuses);
    }
    println!("  Wall time:      {:.3}s", stats.wall_time_s);
}

fn write_csv(path: &Path, labels: &[&str], record: &SimRecord<Vec<f64>>) -> CliResult<()> {
    let mut csv = format!("time_s,{}\n", labels.join(","));
    for (t, x) in record.t.iter().zip(&record.x) {
        let row: Vec<String> = x.iter().map(|v| v.to_string()).collect();
        csv.push_str(&format!("{},{}\n", t, row.join(",")));
    }
    std::fs::write(path, csv).map_err(|source| CliError::OutputWrite {
        path: path.to_path_buf(),
        source,
    })?;
    println!("✓ Exported {} frames to {}", record.len(), path.display());
    Ok(())
}
