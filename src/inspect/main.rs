//! Standalone inspector for sync manifests.
//!
//! Parses a manifest strictly and reports problems that would make the next
//! sync misbehave: duplicate entries, tracks without an id and tracks that
//! expand to the same file.

use std::process::ExitCode;

use clap::Parser;

use spotify_sync_bot::library::{DEFAULT_EXTENSION, QueryKind, derive_path};
use spotify_sync_bot::sync::{Manifest, ManifestStore};

/// Sync manifest inspector.
#[derive(Parser, Debug)]
#[command(name = "inspect_manifest")]
#[command(about = "Validates the sync manifest of the Spotify sync bot")]
#[command(version)]
struct Args {
    /// Path to the manifest file.
    #[arg(short, long, default_value = "sync.json")]
    file: String,

    /// Audio format the files were downloaded in.
    #[arg(long, default_value = DEFAULT_EXTENSION)]
    format: String,

    /// Also report tracked files that are missing on disk.
    #[arg(long)]
    check_files: bool,

    /// Show every tracked query.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    inspect(&args)
}

fn inspect(args: &Args) -> ExitCode {
    println!("Inspecting: {}\n", args.file);

    let manifest = match ManifestStore::new(&args.file).read_strict() {
        Ok(m) => m,
        Err(e) => {
            eprintln!("✗ Failed to load manifest: {e}");
            return ExitCode::FAILURE;
        }
    };

    if args.verbose {
        for entry in &manifest.queries {
            println!(
                "[{}] {} ({} tracks)\n  → {}",
                QueryKind::classify(&entry.query),
                entry.query,
                entry.songs.len(),
                entry.output
            );
        }
        println!();
    }

    let issues = manifest.validate(&args.format);
    for issue in &issues {
        println!("  ✗ Error: {issue}");
    }

    let missing = if args.check_files {
        missing_files(&manifest, &args.format, args.verbose)
    } else {
        0
    };

    println!();
    let total = manifest.queries.len();
    let tracks = manifest.track_count();

    if issues.is_empty() && missing == 0 {
        println!("✓ Manifest is valid: {total} queries, {tracks} tracks");
        ExitCode::SUCCESS
    } else {
        println!(
            "✗ Inspection failed: {} error(s), {missing} missing file(s) in {total} queries",
            issues.len()
        );
        ExitCode::FAILURE
    }
}

fn missing_files(manifest: &Manifest, extension: &str, verbose: bool) -> usize {
    let mut missing = 0;
    for entry in &manifest.queries {
        for song in &entry.songs {
            let path = derive_path(song, &entry.output, extension);
            if !path.exists() {
                missing += 1;
                println!("  ⚠ Missing: {} ({})", path.display(), entry.query);
            } else if verbose {
                println!("  ✓ {}", path.display());
            }
        }
    }
    missing
}
