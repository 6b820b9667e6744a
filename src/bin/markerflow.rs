use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    rc::Rc,
    sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use markerflow::Clock as _;
use tracing::level_filters::LevelFilter;

#[derive(Parser, Debug)]
#[command(name = "markerflow", version)]
struct Cli {
    /// More log output (repeat for more).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a position feed through the engine and print the diagnostics report.
    Simulate(SimulateArgs),
    /// Validate an engine configuration file.
    CheckConfig(CheckConfigArgs),
}

#[derive(Parser, Debug)]
struct SimulateArgs {
    /// Position feed: JSON array of `{markerId, coordinate, timestamp}`.
    #[arg(long)]
    feed: PathBuf,

    /// Engine configuration JSON. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frame rate of the simulated display.
    #[arg(long, default_value_t = 60.0)]
    fps: f64,

    /// Keep running this long after the last update, in milliseconds.
    #[arg(long, default_value_t = 1000.0)]
    tail_ms: f64,

    /// Pace the replay on the wall clock instead of virtual time.
    #[arg(long)]
    realtime: bool,

    /// Report as if the map were in debug mode.
    #[arg(long)]
    debug_mode: bool,

    /// Write the report here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct CheckConfigArgs {
    /// Engine configuration JSON.
    #[arg(long)]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    match cli.cmd {
        Command::Simulate(args) => cmd_simulate(args),
        Command::CheckConfig(args) => cmd_check_config(args),
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::ERROR,
        (false, 0) => LevelFilter::WARN,
        (false, 1) => LevelFilter::INFO,
        (false, 2) => LevelFilter::DEBUG,
        (false, _) => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<markerflow::EngineConfig> {
    match path {
        Some(path) => markerflow::EngineConfig::from_path(path)
            .with_context(|| format!("load config '{}'", path.display())),
        None => Ok(markerflow::EngineConfig::default()),
    }
}

fn read_feed(path: &Path) -> anyhow::Result<Vec<markerflow::PositionUpdate>> {
    let f = File::open(path).with_context(|| format!("open feed '{}'", path.display()))?;
    let r = BufReader::new(f);
    let mut feed: Vec<markerflow::PositionUpdate> =
        serde_json::from_reader(r).with_context(|| "parse feed JSON")?;
    // Stable: same-timestamp updates keep their file order.
    feed.sort_by_key(|u| u.timestamp);
    Ok(feed)
}

fn cmd_check_config(args: CheckConfigArgs) -> anyhow::Result<()> {
    let config = load_config(Some(&args.config))?;
    eprintln!("{}: ok", args.config.display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_simulate(args: SimulateArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let feed = read_feed(&args.feed)?;
    if !(args.fps.is_finite() && args.fps > 0.0) {
        anyhow::bail!("--fps must be > 0, got {}", args.fps);
    }
    let frame_ms = 1000.0 / args.fps;
    let first_ts = feed.first().map_or(0, |u| u.timestamp);

    let report = if args.realtime {
        let clock = Arc::new(markerflow::SystemClock::new());
        let engine = markerflow::Engine::new(config, clock.clone())?;
        let surface = Rc::new(markerflow::MemorySurface::new());
        engine.set_surface(Some(surface as Rc<dyn markerflow::MapSurface>));

        for update in &feed {
            let due = (update.timestamp - first_ts) as f64;
            while clock.now_ms() < due {
                engine.tick();
                std::thread::sleep(std::time::Duration::from_secs_f64(frame_ms / 1000.0));
            }
            ingest(&engine, update)?;
        }
        let ticks = engine.frames().run_until_idle(frame_ms, args.tail_ms);
        tracing::info!(updates = feed.len(), ticks, "realtime replay finished");
        engine.report(args.debug_mode)
    } else {
        let clock = Arc::new(markerflow::ManualClock::new(first_ts as f64));
        let engine = markerflow::Engine::new(config, clock.clone())?;
        let surface = Rc::new(markerflow::MemorySurface::new());
        engine.set_surface(Some(surface as Rc<dyn markerflow::MapSurface>));

        let mut ticks = 0;
        for update in &feed {
            let gap = update.timestamp as f64 - clock.now_ms();
            ticks += engine.frames().run_virtual(&clock, gap, frame_ms);
            ingest(&engine, update)?;
        }
        ticks += engine.frames().run_virtual(&clock, args.tail_ms, frame_ms);
        tracing::info!(updates = feed.len(), ticks, "virtual replay finished");
        engine.report(args.debug_mode)
    };

    let json = serde_json::to_string_pretty(&report)?;
    match args.out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create output dir '{}'", parent.display()))?;
            }
            std::fs::write(&out, json)
                .with_context(|| format!("write report '{}'", out.display()))?;
            eprintln!("wrote {}", out.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Markers appear where they are first reported.
fn ingest(engine: &markerflow::Engine, update: &markerflow::PositionUpdate) -> anyhow::Result<()> {
    let id = update.marker_id.as_str();
    if engine.marker(id).is_none() {
        engine.register_marker(
            id,
            Rc::new(markerflow::MemoryMarker::new(update.coordinate)),
        );
    }
    engine
        .ingest(update)
        .with_context(|| format!("ingest update for '{id}' at {}", update.timestamp))?;
    Ok(())
}
