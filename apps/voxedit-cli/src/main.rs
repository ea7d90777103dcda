use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use voxedit_common::{Block, BlockPos, SessionId};
use voxedit_engine::{Command, CommandOutput, EditEngine, EngineConfig};

#[derive(Parser)]
#[command(name = "voxedit-cli", about = "Drive the edit engine from a simulated host loop")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Engine config (.yaml, .yml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and effective configuration
    Info,
    /// Fill a cube and run ticks until it is done
    Fill {
        /// Edge length of the cube
        #[arg(short, long, default_value = "32")]
        size: i32,
        /// Block to place
        #[arg(short, long, default_value = "stone")]
        block: String,
        /// Print the progress bar every N ticks
        #[arg(long, default_value = "5")]
        report_every: u64,
    },
    /// Start a fill, cancel it part way and check the world is untouched
    Cancel {
        #[arg(short, long, default_value = "32")]
        size: i32,
        /// Ticks to run before cancelling
        #[arg(short, long, default_value = "3")]
        after: u64,
    },
    /// Apply several fills, then undo and redo all of them
    Undo {
        /// Number of edits
        #[arg(short, long, default_value = "3")]
        edits: i32,
    },
}

const MAX_TICKS: u64 = 100_000;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Info => {
            println!("voxedit-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("time budget: {:?}/tick", config.time_budget());
            println!("history: {} records per session", config.max_history_size);
            println!("change limit: {}", describe_limit(config.default_change_limit));
            println!("max change limit: {}", describe_limit(config.max_change_limit));
            println!("session kept for {} ticks after leaving", config.ticks_to_delete_session);
            println!("compressed snapshots: {}", config.compress_snapshots);
            println!("chunk loads per tick: {}", config.chunk_loads_per_tick);
            println!("largest fill: {} blocks", config.max_region_volume);
        }
        Commands::Fill {
            size,
            block,
            report_every,
        } => {
            let mut engine = EditEngine::new(config);
            let session = engine.join("cli");
            select_cube(&mut engine, session, BlockPos::ZERO, size)?;
            let out = engine.dispatch(
                session,
                Command::Set {
                    region: None,
                    block: Some(Block::new(block)),
                },
            )?;
            println!("{out}");

            let ticks = run_to_idle(&mut engine, session, report_every.max(1))?;
            let timer = engine.scheduler().timer();
            println!(
                "Done after {ticks} ticks: {} blocks, pump avg {:?}, max {:?}",
                engine.world().block_count(),
                timer.average(),
                timer.max()
            );
        }
        Commands::Cancel { size, after } => {
            let mut engine = EditEngine::new(config);
            let session = engine.join("cli");
            let before = engine.world().state_hash();
            select_cube(&mut engine, session, BlockPos::ZERO, size)?;
            let CommandOutput::Started { job } = engine.dispatch(
                session,
                Command::Set {
                    region: None,
                    block: Some(Block::new("stone")),
                },
            )?
            else {
                anyhow::bail!("fill did not start a job");
            };

            for _ in 0..after {
                engine.tick();
            }
            println!(
                "Before cancel: tick={}, blocks={}",
                engine.world().tick(),
                engine.world().block_count()
            );
            println!("{}", engine.dispatch(session, Command::Cancel(job))?);
            run_to_idle(&mut engine, session, u64::MAX)?;

            let restored = engine.world().state_hash() == before;
            println!(
                "After cancel: blocks={}, restored: {}",
                engine.world().block_count(),
                if restored { "OK" } else { "MISMATCH" }
            );
        }
        Commands::Undo { edits } => {
            let mut engine = EditEngine::new(config);
            let session = engine.join("cli");
            let mut hashes = vec![engine.world().state_hash()];
            for i in 0..edits {
                select_cube(&mut engine, session, BlockPos::new(i * 4, 0, 0), 3)?;
                engine.dispatch(
                    session,
                    Command::Set {
                        region: None,
                        block: Some(Block::new(format!("wool_{i}"))),
                    },
                )?;
                run_to_idle(&mut engine, session, u64::MAX)?;
                hashes.push(engine.world().state_hash());
            }
            println!("Applied {edits} edits: blocks={}", engine.world().block_count());

            let mut matched = true;
            for expected in hashes.iter().rev().skip(1) {
                println!("{}", engine.dispatch(session, Command::Undo)?);
                matched &= engine.world().state_hash() == *expected;
            }
            println!("{}", engine.dispatch(session, Command::Undo)?);
            for expected in hashes.iter().skip(1) {
                println!("{}", engine.dispatch(session, Command::Redo)?);
                matched &= engine.world().state_hash() == *expected;
            }
            println!("Undo/redo match: {}", if matched { "OK" } else { "MISMATCH" });
        }
    }

    Ok(())
}

fn describe_limit(limit: i64) -> String {
    if limit < 0 {
        "unlimited".to_string()
    } else {
        format!("{limit} blocks")
    }
}

fn select_cube(
    engine: &mut EditEngine,
    session: SessionId,
    origin: BlockPos,
    size: i32,
) -> anyhow::Result<()> {
    let far = far_corner(origin, size)?;
    engine.dispatch(session, Command::Select { corner: 0, pos: origin })?;
    let out = engine.dispatch(session, Command::Select { corner: 1, pos: far })?;
    tracing::debug!(%out, "selected");
    Ok(())
}

/// Opposite corner of a cube with edge `size` starting at `origin`.
fn far_corner(origin: BlockPos, size: i32) -> anyhow::Result<BlockPos> {
    anyhow::ensure!(size > 0, "cube size must be positive, got {size}");
    let reach = size - 1;
    let shift = |axis: i32| {
        axis.checked_add(reach)
            .ok_or_else(|| anyhow::anyhow!("cube of size {size} at {origin} leaves the world"))
    };
    Ok(BlockPos::new(shift(origin.x)?, shift(origin.y)?, shift(origin.z)?))
}

/// Tick until every job has finished. Returns the number of ticks run.
fn run_to_idle(engine: &mut EditEngine, session: SessionId, report_every: u64) -> anyhow::Result<u64> {
    let mut ticks = 0;
    while !engine.scheduler().is_empty() {
        anyhow::ensure!(ticks < MAX_TICKS, "jobs still running after {MAX_TICKS} ticks");
        let report = engine.tick();
        ticks += 1;
        for job in &report.pump.finished {
            match &job.error {
                Some(error) => println!("Job {} failed: {error}", job.id),
                None => println!("Job {} {:?}", job.id, job.state),
            }
        }
        if ticks % report_every == 0 {
            if let Some(text) = engine.progress_report(session) {
                println!("[tick {}]\n{text}", report.tick);
            }
        }
    }
    Ok(ticks)
}
