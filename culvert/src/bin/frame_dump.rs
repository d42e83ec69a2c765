// Offline diagnostic: decode a captured wire dump and print the event
// timeline plus the finalized tool calls.
// Usage: cargo run --bin frame-dump -- capture.bin
// Usage: cargo run --bin frame-dump -- capture.bin --chunk-size 512

use clap::Parser;
use culvert::stream::EventStreamDecoder;

#[derive(Parser)]
#[command(name = "frame-dump", about = "Decode a captured wire dump")]
struct Cli {
    /// Path to the captured bytes
    path: std::path::PathBuf,

    /// Feed the decoder in chunks of this size to mimic transport pacing
    #[arg(long, default_value_t = 4096)]
    chunk_size: usize,
}

fn main() {
    let cli = Cli::parse();

    let bytes = match std::fs::read(&cli.path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("failed to read {}: {e}", cli.path.display());
            std::process::exit(1);
        }
    };

    let mut decoder = EventStreamDecoder::new();
    let mut emitted = 0usize;
    for chunk in bytes.chunks(cli.chunk_size.max(1)) {
        for event in decoder.feed(chunk) {
            emitted += 1;
            println!("{}", serde_json::to_string(&event).expect("event serializes"));
        }
    }

    let calls = decoder.finalized_tool_calls();
    for call in &calls {
        println!("{}", serde_json::to_string(call).expect("tool call serializes"));
    }

    eprintln!(
        "{} byte(s), {} event(s), {} finalized tool call(s), usage seen: {}",
        bytes.len(),
        emitted,
        calls.len(),
        decoder.is_complete()
    );
}
