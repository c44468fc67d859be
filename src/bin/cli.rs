//! starpack CLI
//!
//! Command-line wrapper around unpack/repack: save file ⇄ JSON.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use starpack::save::SaveDb;
use starpack::{FileKind, Map, PackError, Result, Sections, Value, VersionedValue};
use tracing_subscriber::{fmt, EnvFilter};

/// starpack CLI
#[derive(Parser, Debug)]
#[command(name = "starpack")]
#[command(about = "Unpack and repack game save files")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode a save file to JSON
    Unpack {
        /// Save file to read
        src: PathBuf,

        /// Write JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit JSON without indentation
        #[arg(long)]
        compact: bool,
    },

    /// Encode JSON into a save file
    Repack {
        /// JSON produced by `unpack`
        json: PathBuf,

        /// Save file to write (replaced atomically)
        dest: PathBuf,

        /// Write a standalone SBVJ01 file instead of a paged database
        #[arg(long)]
        versioned: bool,
    },

    /// Print header, sections and page statistics
    Info {
        /// Save file to inspect
        file: PathBuf,
    },

    /// Compare the decoded contents of two save files
    Diff {
        /// Baseline save file
        a: PathBuf,

        /// Save file compared against the baseline
        b: PathBuf,
    },
}

fn main() -> ExitCode {
    // Logs go to stderr so stdout stays clean for JSON
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,starpack=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("starpack: {}: {}", e.kind(), e);
            ExitCode::from(2)
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let config = starpack::Config::from_env()?;

    match args.command {
        Commands::Unpack { src, output, compact } => {
            let dump = match starpack::detect_kind(&src)? {
                FileKind::Paged => to_json(&starpack::unpack(&src, &config)?, compact)?,
                FileKind::Versioned => to_json(&starpack::unpack_versioned(&src, &config)?, compact)?,
            };
            match output {
                Some(path) => {
                    let mut out = BufWriter::new(File::create(path)?);
                    out.write_all(dump.as_bytes())?;
                    out.flush()?;
                }
                None => println!("{dump}"),
            }
        }

        Commands::Repack { json, dest, versioned } => {
            let reader = BufReader::new(File::open(&json)?);
            if versioned {
                let value: VersionedValue = serde_json::from_reader(reader).map_err(json_error)?;
                starpack::repack_versioned(&dest, &value, &config)?;
            } else {
                let sections: Sections = serde_json::from_reader(reader).map_err(json_error)?;
                starpack::repack(&dest, &sections, &config)?;
            }
        }

        Commands::Info { file } => print_info(&file, &config)?,

        Commands::Diff { a, b } => {
            let left = load_any(&a, &config)?;
            let right = load_any(&b, &config)?;
            let diffs = starpack::diff(&left, &right, "base");
            println!("{diffs} difference(s)");
            if diffs > 0 {
                return Ok(ExitCode::from(1));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn to_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<String> {
    let dump = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    dump.map_err(json_error)
}

fn json_error(e: serde_json::Error) -> PackError {
    PackError::Serialization(e.to_string())
}

/// Either file kind as one value tree
fn load_any(path: &Path, config: &starpack::Config) -> Result<Value> {
    match starpack::detect_kind(path)? {
        FileKind::Paged => Ok(Value::Map(starpack::unpack(path, config)?)),
        FileKind::Versioned => {
            let file = starpack::unpack_versioned(path, config)?;
            let mut map = Map::new();
            map.insert("identifier".to_string(), Value::String(file.identifier));
            map.insert(
                "version".to_string(),
                file.version.map_or(Value::Null, |v| Value::Integer(i64::from(v))),
            );
            map.insert("content".to_string(), file.content);
            Ok(Value::Map(map))
        }
    }
}

fn print_info(path: &Path, config: &starpack::Config) -> Result<()> {
    match starpack::detect_kind(path)? {
        FileKind::Versioned => {
            let file = starpack::unpack_versioned(path, config)?;
            println!("kind:        SBVJ01 versioned value");
            println!("identifier:  {}", file.identifier);
            match file.version {
                Some(v) => println!("version:     {v}"),
                None => println!("version:     (none)"),
            }
            println!("content:     {}", file.content.type_name());
        }
        FileKind::Paged => {
            let db = SaveDb::open_read_only(path, config)?;
            let header = db.store().header();
            let stats = db.stats()?;
            println!("kind:        paged database");
            println!("page size:   {}", header.page_size);
            println!("page count:  {}", header.page_count);
            println!(
                "pages:       {} metadata, {} index, {} leaf, {} overflow, {} free",
                stats.metadata, stats.index, stats.leaf, stats.overflow, stats.free
            );
            println!("sections:    {}", header.sections.len());
            for (name, section) in &header.sections {
                println!("  {name:<20} root={:<8} records={}", section.root, section.record_count);
            }
        }
    }
    Ok(())
}
