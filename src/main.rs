use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use netlayout::engine::PhysicsEngine;
use netlayout::events::TracingSink;
use netlayout::io::{self, Format, LayoutReport};
use netlayout::options::{SimulationOptions, SolverKind};
use netlayout::stabilization::EnginePhase;

/// Force-directed layout for network graphs.
#[derive(Parser)]
#[command(name = "netlayout")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stabilize a graph and write the final node positions
    Stabilize {
        /// Input graph file (.json, .yaml, .yml)
        #[arg(short, long)]
        input: PathBuf,

        /// Output positions file (.json, .yaml, .yml)
        #[arg(short, long)]
        output: PathBuf,

        /// Options file (.json, .yaml, .yml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured solver
        #[arg(short, long, value_enum)]
        solver: Option<SolverArg>,

        /// Stabilization iteration budget (defaults to the configured one)
        #[arg(long)]
        iterations: Option<usize>,

        /// Live ticks to run after an unconverged stabilization
        #[arg(long, default_value = "0")]
        frames: usize,
    },
    /// Print the default options
    Options {
        #[arg(short, long, value_enum, default_value = "json")]
        format: FormatArg,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SolverArg {
    BarnesHut,
    Repulsion,
    HierarchicalRepulsion,
    #[value(name = "force-atlas2-based")]
    ForceAtlas2Based,
}

impl From<SolverArg> for SolverKind {
    fn from(arg: SolverArg) -> Self {
        match arg {
            SolverArg::BarnesHut => SolverKind::BarnesHut,
            SolverArg::Repulsion => SolverKind::Repulsion,
            SolverArg::HierarchicalRepulsion => SolverKind::HierarchicalRepulsion,
            SolverArg::ForceAtlas2Based => SolverKind::ForceAtlas2Based,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Json,
    Yaml,
}

impl From<FormatArg> for Format {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => Format::Json,
            FormatArg::Yaml => Format::Yaml,
        }
    }
}

struct StabilizeArgs<'a> {
    input: &'a Path,
    output: &'a Path,
    config: Option<&'a Path>,
    solver: Option<SolverArg>,
    iterations: Option<usize>,
    frames: usize,
}

fn stabilize(args: StabilizeArgs<'_>) -> anyhow::Result<LayoutReport> {
    let mut options = match args.config {
        Some(path) => io::load_options(path)
            .with_context(|| format!("failed to load options from {}", path.display()))?,
        None => SimulationOptions::default(),
    };
    if let Some(solver) = args.solver {
        options.solver = solver.into();
    }
    if !options.enabled {
        warn!("physics is disabled in the options, positions are written unchanged");
    }

    let mut graph = io::load_graph(args.input)
        .with_context(|| format!("failed to load graph from {}", args.input.display()))?;

    let mut engine = PhysicsEngine::new(options);
    let mut sink = TracingSink;
    engine.update_physics_data(&mut graph);
    if engine.is_enabled() {
        engine.stabilize(args.iterations, &mut graph, &mut sink);
    }
    let outcome = engine.run_to_stable(&mut graph, &mut sink);

    let mut frames = 0;
    while frames < args.frames && engine.phase() == EnginePhase::Simulating {
        engine.poll(&mut graph, &mut sink);
        frames += 1;
    }
    engine.stop_simulation(&mut graph, &mut sink);
    if frames > 0 {
        info!(frames, stabilized = engine.is_stabilized(), "live simulation finished");
    }

    let report = LayoutReport::new(&graph, outcome);
    report
        .write(args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    Ok(report)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Stabilize {
            input,
            output,
            config,
            solver,
            iterations,
            frames,
        } => {
            let report = stabilize(StabilizeArgs {
                input: &input,
                output: &output,
                config: config.as_deref(),
                solver,
                iterations,
                frames,
            })?;
            println!(
                "{} {} nodes after {} iterations, written to {}",
                if report.converged {
                    "Stabilized"
                } else {
                    "Laid out"
                },
                report.positions.len(),
                report.iterations,
                output.display()
            );
        }
        Commands::Options { format } => {
            print!("{}", io::default_options_text(format.into())?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_stabilize() {
        let cli = Cli::try_parse_from([
            "netlayout",
            "stabilize",
            "--input",
            "graph.json",
            "--output",
            "positions.json",
            "--solver",
            "force-atlas2-based",
            "--iterations",
            "200",
        ])
        .unwrap();

        match cli.command {
            Commands::Stabilize {
                input,
                output,
                config,
                solver,
                iterations,
                frames,
            } => {
                assert_eq!(input, PathBuf::from("graph.json"));
                assert_eq!(output, PathBuf::from("positions.json"));
                assert_eq!(config, None);
                assert_eq!(solver, Some(SolverArg::ForceAtlas2Based));
                assert_eq!(iterations, Some(200));
                assert_eq!(frames, 0);
            }
            Commands::Options { .. } => panic!("Expected Stabilize command"),
        }
    }

    #[test]
    fn cli_parses_short_flags() {
        let cli = Cli::try_parse_from([
            "netlayout",
            "stabilize",
            "-i",
            "g.yaml",
            "-o",
            "out.yaml",
            "-c",
            "opts.yml",
            "-s",
            "hierarchical-repulsion",
        ])
        .unwrap();

        match cli.command {
            Commands::Stabilize { config, solver, .. } => {
                assert_eq!(config, Some(PathBuf::from("opts.yml")));
                assert_eq!(solver, Some(SolverArg::HierarchicalRepulsion));
            }
            Commands::Options { .. } => panic!("Expected Stabilize command"),
        }
    }

    #[test]
    fn cli_requires_input_and_output() {
        assert!(Cli::try_parse_from(["netlayout", "stabilize", "--input", "g.json"]).is_err());
    }

    #[test]
    fn cli_rejects_unknown_solver() {
        let result = Cli::try_parse_from([
            "netlayout", "stabilize", "-i", "g.json", "-o", "p.json", "-s", "verlet",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_parses_options_format() {
        let cli = Cli::try_parse_from(["netlayout", "options", "--format", "yaml"]).unwrap();
        match cli.command {
            Commands::Options { format } => assert_eq!(format, FormatArg::Yaml),
            Commands::Stabilize { .. } => panic!("Expected Options command"),
        }
    }

    #[test]
    fn solver_arg_maps_to_kind() {
        assert_eq!(SolverKind::from(SolverArg::BarnesHut), SolverKind::BarnesHut);
        assert_eq!(
            SolverKind::from(SolverArg::ForceAtlas2Based),
            SolverKind::ForceAtlas2Based
        );
    }

    #[test]
    fn stabilize_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("graph.json");
        let output = dir.path().join("positions.json");
        std::fs::write(
            &input,
            r#"{ "nodes": [{ "id": "a" }, { "id": "b" }], "edges": [{ "from": "a", "to": "b" }] }"#,
        )
        .unwrap();

        let report = stabilize(StabilizeArgs {
            input: &input,
            output: &output,
            config: None,
            solver: Some(SolverArg::Repulsion),
            iterations: Some(50),
            frames: 0,
        })
        .unwrap();

        assert!(report.iterations <= 50);
        assert!(output.exists());
        assert_eq!(report.positions.len(), 2);
    }
}
