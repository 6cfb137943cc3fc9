use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, info, warn};

use soundtrace::batch::{format_file_size, run_batch, BatchEntry, DirectorySink, FileStatus, UploadQueue};
use soundtrace::scan::ScanClient;
use soundtrace::spotify::SpotifyClient;
use soundtrace::storage::{self, SoundtraceConfig};
use soundtrace::wav_header::WavHeader;
use soundtrace::SnippetExtractor;

#[derive(Parser)]
#[command(name = "soundtrace", about = "Prepare audio snippets and scan them for matches")]
struct Cli {
    /// Config file to use instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write one WAV snippet per input file into a directory
    Snip {
        files: Vec<PathBuf>,
        #[arg(short, long, default_value = "snippets")]
        out: PathBuf,
    },
    /// Prepare snippets and submit them to the scan endpoint
    Scan {
        files: Vec<PathBuf>,
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long)]
        token: Option<String>,
    },
    /// Print the header of a WAV file
    Inspect { file: PathBuf },
    /// Look up followers, popularity and genres of a Spotify artist
    Artist { id: String },
}

fn build_queue(files: &[PathBuf], config: &SoundtraceConfig) -> UploadQueue {
    let mut queue = UploadQueue::new(config.snippet.max_file_bytes);
    for path in files {
        match queue.add_path(path) {
            Ok(Ok(())) => {}
            Ok(Err(rejection)) => warn!("skipping {}: {}", path.display(), rejection),
            Err(err) => error!("could not read {}: {}", path.display(), err),
        }
    }
    queue
}

fn print_status(index: usize, name: &str, status: &FileStatus) {
    match status {
        FileStatus::Error(message) => println!("[{}] {}: error: {}", index + 1, name, message),
        other => println!("[{}] {}: {:?}", index + 1, name, other),
    }
}

fn print_summary<R>(entries: &[BatchEntry<R>]) {
    let failed = entries
        .iter()
        .filter(|e| matches!(e.status, FileStatus::Error(_)))
        .count();
    println!("{} file(s) processed, {} failed", entries.len(), failed);
}

fn inspect(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)?;
    let header = WavHeader::parse(&bytes)?;
    println!("{}", path.display());
    println!("  format:      {}", header.format_type);
    println!("  channels:    {}", header.number_of_channels);
    println!("  sample rate: {} Hz", header.sample_rate);
    println!("  bits:        {}", header.bits_per_sample);
    println!("  data:        {}", format_file_size(header.data_size as u64));
    if header.sample_rate > 0 {
        println!(
            "  duration:    {:.3}s",
            header.frames() as f64 / header.sample_rate as f64
        );
    }
    Ok(())
}

async fn run_soundtrace(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => storage::load_config_from(path)?,
        None => storage::load_config()?,
    };

    match cli.command {
        Command::Snip { files, out } => {
            let queue = build_queue(&files, &config);
            if queue.is_empty() {
                return Err("no usable audio files given".into());
            }
            let extractor = Arc::new(SnippetExtractor::native(config.snippet.clone()));
            let sink = DirectorySink::new(out);
            let entries = run_batch(extractor, queue, &sink, print_status).await;
            for entry in &entries {
                if let Some(path) = &entry.receipt {
                    println!("{} -> {}", entry.name, path.display());
                }
            }
            print_summary(&entries);
        }
        Command::Scan {
            files,
            endpoint,
            token,
        } => {
            let queue = build_queue(&files, &config);
            if queue.is_empty() {
                return Err("no usable audio files given".into());
            }
            let endpoint = endpoint.unwrap_or_else(|| config.scan_endpoint.clone());
            let client = ScanClient::new(endpoint, token.or_else(|| config.auth_token.clone()));
            info!("scanning {} file(s) via {}", queue.len(), client.endpoint());

            let extractor = Arc::new(SnippetExtractor::native(config.snippet.clone()));
            let entries = run_batch(extractor, queue, &client, print_status).await;
            for entry in &entries {
                let Some(result) = &entry.receipt else { continue };
                if result.matches.is_empty() {
                    println!("{}: no matches", entry.name);
                }
                for m in &result.matches {
                    println!(
                        "{}: {} - {} ({}, confidence {})",
                        entry.name, m.artist, m.title, m.album, m.match_confidence
                    );
                }
            }
            print_summary(&entries);
        }
        Command::Inspect { file } => inspect(&file)?,
        Command::Artist { id } => {
            let (Some(client_id), Some(client_secret)) =
                (config.spotify_client_id.clone(), config.spotify_client_secret.clone())
            else {
                return Err("spotify_client_id and spotify_client_secret must be set in config".into());
            };
            let details = SpotifyClient::new(client_id, client_secret)
                .artist_details(&id)
                .await?;
            println!("{}", serde_json::to_string_pretty(&details)?);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::init();
    if let Err(err) = run_soundtrace(Cli::parse()).await {
        error!("{}", err);
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
