//! Example: reading fragments of a remote file with HTTP range requests.
//!
//! Reads a window from the head and the trailer of a resource, then reads the head again to
//! show that the second pass is served from the local cache.
//!
//! # Usage
//!
//! ```bash
//! # With a local file (for testing)
//! cargo run --example remote_read -- local path/to/file.zip
//!
//! # With an HTTP URL
//! cargo run --example remote_read -- http https://cdn.example.com/archive.zip
//!
//! # More detail
//! RUST_LOG=remote_io=debug cargo run --example remote_read -- http https://...
//! ```

use std::env;
use std::io::SeekFrom;

use remote_io::{HttpUpstream, LocalCache, LocalUpstream, ReadLength, RemoteStream, Upstream};
use tracing::metadata::LevelFilter;
use tracing_subscriber::EnvFilter;

const WINDOW: u64 = 64;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: remote_read <local|http> <path_or_url>");
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  remote_read local ./data/archive.zip");
        eprintln!("  remote_read http https://cdn.example.com/archive.zip");
        std::process::exit(1);
    }

    let mode = &args[1];
    let source = &args[2];

    match mode.as_str() {
        "local" => run(RemoteStream::new(LocalUpstream::open(source)?)),
        "http" => run(RemoteStream::new(HttpUpstream::from_url(source.as_str())?)),
        _ => {
            eprintln!("Unknown mode: {mode}. Use 'local' or 'http'.");
            std::process::exit(1);
        }
    }
}

fn run<U: Upstream, C: LocalCache>(
    mut stream: RemoteStream<U, C>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Source: {}", stream.upstream().source_id());

    match stream.resolve_size() {
        Some(size) => println!("Size: {size} bytes"),
        None => println!("Size: unknown"),
    }
    println!();

    let head = stream.read_bytes(ReadLength::Bounded(WINDOW))?;
    print_window("Head", 0, head.bytes());

    if let Some(size) = stream.known_size() {
        let back = i64::try_from(WINDOW.min(size))?;
        let offset = stream.seek(SeekFrom::End(-back))?;
        let tail = stream.read_bytes(ReadLength::ToEnd)?;
        print_window("Tail", offset, tail.bytes());
    }

    let fetched = stream.upstream_bytes();
    stream.seek(SeekFrom::Start(0))?;
    let again = stream.read_bytes(ReadLength::Bounded(WINDOW))?;
    println!(
        "Re-read {} head bytes, {} new bytes fetched",
        again.len(),
        stream.upstream_bytes() - fetched
    );

    println!();
    println!("=== Transfer ===");
    println!("  Bytes fetched: {}", stream.upstream_bytes());
    for range in stream.cached_ranges() {
        println!("  Cached: {range}");
    }

    stream.close();
    Ok(())
}

fn print_window(label: &str, offset: u64, bytes: &[u8]) {
    println!("=== {label} ({} bytes at {offset}) ===", bytes.len());
    for (i, line) in bytes.chunks(16).enumerate() {
        let hex: Vec<String> = line.iter().map(|b| format!("{b:02x}")).collect();
        println!("  {:08x}  {}", offset + (i as u64) * 16, hex.join(" "));
    }
    println!();
}
