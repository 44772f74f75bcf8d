use clap::{Parser, Subcommand, crate_version};
use logtrack::activity::{EventSink, JsonLinesSink};
use logtrack::engine::{AttributeMap, Instruction, Tracker, TrackerConfig, classify};
use logtrack::log::{Level, init_tracing};
use miette::{IntoDiagnostic, Result, WrapErr};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    color = clap::ColorChoice::Auto,
    about = format!("logtrack {}: activity tracking from annotated log messages", crate_version!())
)]
struct Cli {
    #[arg(short, long, global = true, help = "Enable debug log level.")]
    verbose: bool,

    #[arg(
        short,
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Silence all diagnostics."
    )]
    quiet: bool,

    #[arg(
        short,
        long,
        global = true,
        env = "LOGTRACK_CONFIG",
        help = "Tracker configuration (YAML)."
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Print the annotations of a message as JSON.")]
    Parse {
        message: String,

        #[arg(long, help = "Annotation sigil, defaults to the configured one.")]
        sigil: Option<char>,
    },

    #[command(about = "Replay a log file (`LEVEL [thread] message` per line) and print what it tracks.")]
    Replay {
        file: PathBuf,

        #[arg(short, long, help = "Append JSON lines to this file instead of stdout.")]
        output: Option<PathBuf>,
    },

    #[command(about = "Track a short annotated session emitted through tracing.")]
    Demo {
        #[arg(short, long, help = "Append JSON lines to this file instead of stdout.")]
        output: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<TrackerConfig> {
    match path {
        Some(path) => TrackerConfig::load(path)
            .wrap_err_with(|| format!("Failed to load {}", path.display())),
        None => Ok(TrackerConfig::default()),
    }
}

fn sink_for(output: Option<PathBuf>) -> Arc<dyn EventSink> {
    match output {
        Some(path) => Arc::new(JsonLinesSink::file(path)),
        None => Arc::new(JsonLinesSink::writer(std::io::stdout())),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::Debug
    } else if cli.quiet {
        Level::Silent
    } else {
        Level::default()
    };
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Parse { message, sigil } => {
            init_tracing(level, None);
            let attrs = AttributeMap::parse(&message, sigil.unwrap_or(config.sigil));
            let kind = match classify(&attrs) {
                Instruction::Activity { .. } => "activity",
                Instruction::Event => "event",
            };
            let output = serde_json::json!({
                "instruction": kind,
                "attributes": attrs,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&output).into_diagnostic()?
            );
        }
        Commands::Replay { file, output } => {
            init_tracing(level, None);
            let input = File::open(&file)
                .into_diagnostic()
                .wrap_err_with(|| format!("Failed to open {}", file.display()))?;

            let tracker = Tracker::new(config, sink_for(output));
            tracker.start().wrap_err("Failed to start tracker")?;
            let stats = logtrack::replay::replay(&tracker, BufReader::new(input))
                .into_diagnostic()
                .wrap_err_with(|| format!("Failed to replay {}", file.display()))?;
            tracker.stop();

            tracing::info!(
                target: "logtrack::replay",
                records = stats.records,
                rejected = stats.rejected,
                "replay finished"
            );
        }
        Commands::Demo { output } => {
            let tracker = Arc::new(Tracker::new(config, sink_for(output)));
            init_tracing(level, Some(tracker.clone()));
            tracker.start().wrap_err("Failed to start tracker")?;
            logtrack::demo::run();
            tracker.stop();
        }
    }

    Ok(())
}
