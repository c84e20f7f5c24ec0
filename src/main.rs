use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "highway", about = "Path-indexed CAR container CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Canonicalize a CAR and wrap it with a path index
    Index {
        src: PathBuf,
        /// Write output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check whether a CAR's block order is already canonical
    Validate {
        src: PathBuf,
    },
    /// List the path index of an indexed container
    Inspect {
        src: PathBuf,
    },
    /// Extract one path (or the whole archive) from an indexed container
    Export {
        src: PathBuf,
        /// Path to look up; empty for the whole embedded archive
        #[arg(default_value = "")]
        path: String,
        /// Write output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    match Cli::parse().command {
        // ── Index ────────────────────────────────────────────────────────────
        Commands::Index { src, output } => {
            let data = std::fs::read(&src)?;
            let canonical = highway::canonicalize(&data)?;
            let container = highway::to_container(&canonical)?;
            write_output(&output, &container)?;
            if let Some(out) = &output {
                println!("Created: {}", out.display());
            }
        }

        // ── Validate ─────────────────────────────────────────────────────────
        Commands::Validate { src } => {
            let data = std::fs::read(&src)?;
            if highway::validate(&data)? {
                println!("canonical");
            } else {
                println!("not canonical");
                std::process::exit(1);
            }
        }

        // ── Inspect ──────────────────────────────────────────────────────────
        Commands::Inspect { src } => {
            let mut file = File::open(&src)?;
            let records = highway::inspect(&mut file)?;
            println!(
                "{:<32} {:<72} {:>10} {:>10}",
                "Path", "CID", "Offset", "Length"
            );
            for record in &records {
                let path = if record.path.is_empty() {
                    "/"
                } else {
                    record.path.as_str()
                };
                println!(
                    "{:<32} {:<72} {:>10} {:>10}",
                    path,
                    record.cid.to_string(),
                    record.offset,
                    record.length
                );
            }
        }

        // ── Export ───────────────────────────────────────────────────────────
        Commands::Export { src, path, output } => {
            let mut file = File::open(&src)?;
            match &output {
                Some(out_path) => {
                    let mut out = File::create(out_path)?;
                    highway::export(&mut file, &path, &mut out)?;
                    println!("Exported: {}", out_path.display());
                }
                None => {
                    let stdout = io::stdout();
                    highway::export(&mut file, &path, &mut stdout.lock())?;
                }
            }
        }
    }

    Ok(())
}

fn write_output(output: &Option<PathBuf>, bytes: &[u8]) -> io::Result<()> {
    match output {
        Some(path) => std::fs::write(path, bytes),
        None => io::stdout().lock().write_all(bytes),
    }
}
