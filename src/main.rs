use clap::{Parser, Subcommand};
use mufits::convert::{self, ConvertOptions, DEFAULT_DIGITS, DEFAULT_PRESSURE_SCALE};
use mufits::{BlockKind, MvsFile, SumFile};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mufits", about = "Read and convert MUFITS .SUM / .MVS containers")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert snapshot steps to raw pressure/temperature arrays
    Convert {
        sim_name: String,
        sum_dir:  PathBuf,
        out_dir:  PathBuf,
        id_start: u64,
        id_end:   u64,
        /// Minimum zero-padded width of the step number
        #[arg(long, default_value_t = DEFAULT_DIGITS)]
        digits: usize,
        /// Factor applied to pressure values (bar → Pa by default)
        #[arg(long, default_value_t = DEFAULT_PRESSURE_SCALE)]
        pressure_scale: f64,
    },
    /// Show the description of a .SUM or .MVS file
    Info {
        path: PathBuf,
        /// Print the description as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {

        // ── Convert ──────────────────────────────────────────────────────────
        Commands::Convert { sim_name, sum_dir, out_dir, id_start, id_end, digits, pressure_scale } => {
            let opts = ConvertOptions { digits, pressure_scale };
            let steps = convert::run(&sim_name, &sum_dir, &out_dir, id_start, id_end, &opts)?;
            println!("Converted {steps} step(s) into {}", out_dir.display());
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { path, json } => match extension(&path).as_deref() {
            Some("SUM") => print_sum(&path, json)?,
            Some("MVS") => print_mvs(&path, json)?,
            _ => return Err(format!("{}: expected a .SUM or .MVS file", path.display()).into()),
        },
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn extension(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_ascii_uppercase())
}

fn print_sum(path: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let sum = SumFile::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let desc = sum.description()?;
    if json {
        println!("{}", serde_json::to_string_pretty(desc)?);
        return Ok(());
    }

    println!("── MUFITS snapshot ──────────────────────────────────────");
    println!("  Path           {}", path.display());
    if let Some(time) = &desc.time {
        println!("  Time           {} {}", time.value, time.unit);
    }
    if let Some(date) = &desc.date {
        match date.to_naive_date() {
            Some(d) => println!("  Date           {d}"),
            None    => println!("  Date           {} {} {}", date.day, date.month, date.year),
        }
    }
    for kind in BlockKind::ALL {
        let Some(block) = desc.block(kind) else { continue };
        println!("  {:<8}       {} objects, {} properties", kind.mnemonic(), block.num_objects, block.properties.len());
        for p in &block.properties {
            println!(
                "    {:<8} {:<8} {:<5} {:?} {:?}",
                p.name, p.unit, p.data_type.tag(), p.arity, p.phase_mode
            );
        }
    }
    Ok(())
}

fn print_mvs(path: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mvs = MvsFile::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let desc = mvs.description()?;
    if json {
        println!("{}", serde_json::to_string_pretty(desc)?);
        return Ok(());
    }

    println!("── MUFITS mesh ──────────────────────────────────────────");
    println!("  Path           {}", path.display());
    println!("  Vertices       {}", desc.num_vertices);
    println!("  Cells          {}", desc.num_cells);
    Ok(())
}
