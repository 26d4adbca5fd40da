use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use kfplink_frame::{DecoderStats, Frame, FrameFormat};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    /// Board console dump with a hex payload.
    Hex,
    /// Board console dump with printable payload bytes.
    Ascii,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    link: &'a str,
    id: String,
    payload: String,
    timestamp: String,
}

#[derive(Serialize)]
struct EncodedOutput {
    id: String,
    payload: String,
    wire: String,
    wire_len: usize,
}

#[derive(Serialize)]
struct DecodeOutput {
    frames: Vec<DecodedFrame>,
    stats: StatsOutput,
}

#[derive(Serialize)]
struct DecodedFrame {
    id: String,
    payload: String,
}

#[derive(Serialize)]
struct StatsOutput {
    frames: u64,
    discarded: u64,
    stray: u64,
    invalid_escapes: u64,
    overflow_bytes: u64,
}

impl From<DecoderStats> for StatsOutput {
    fn from(stats: DecoderStats) -> Self {
        Self {
            frames: stats.frames,
            discarded: stats.discarded,
            stray: stats.stray,
            invalid_escapes: stats.invalid_escapes,
            overflow_bytes: stats.overflow_bytes,
        }
    }
}

/// Print one received frame.
pub fn print_frame(frame: &Frame, link: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                link,
                id: hex(frame.id.as_bytes()),
                payload: hex(frame.payload.as_bytes()),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = frame_table(&["LINK", "ID", "PAYLOAD"]);
            table.add_row(vec![
                link.to_string(),
                hex(frame.id.as_bytes()),
                hex(frame.payload.as_bytes()),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "link={} id={} payload={}",
                link,
                hex(frame.id.as_bytes()),
                hex(frame.payload.as_bytes())
            );
        }
        OutputFormat::Hex => println!("{}", frame.display(FrameFormat::Hex)),
        OutputFormat::Ascii => println!("{}", frame.display(FrameFormat::Ascii)),
    }
}

/// Print a frame together with its wire encoding.
pub fn print_encoded(frame: &Frame, wire: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&EncodedOutput {
            id: hex(frame.id.as_bytes()),
            payload: hex(frame.payload.as_bytes()),
            wire: hex(wire),
            wire_len: wire.len(),
        }),
        OutputFormat::Table => {
            let mut table = frame_table(&["ID", "PAYLOAD", "WIRE", "LEN"]);
            table.add_row(vec![
                hex(frame.id.as_bytes()),
                hex(frame.payload.as_bytes()),
                hex(wire),
                wire.len().to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("wire={} len={}", hex(wire), wire.len()),
        OutputFormat::Hex | OutputFormat::Ascii => println!("{}", hex(wire)),
    }
}

/// Print the frames recovered from a byte dump and the decoder totals.
pub fn print_decoded(frames: &[Frame], stats: DecoderStats, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&DecodeOutput {
            frames: frames
                .iter()
                .map(|frame| DecodedFrame {
                    id: hex(frame.id.as_bytes()),
                    payload: hex(frame.payload.as_bytes()),
                })
                .collect(),
            stats: stats.into(),
        }),
        OutputFormat::Table => {
            let mut table = frame_table(&["#", "ID", "PAYLOAD"]);
            for (index, frame) in frames.iter().enumerate() {
                table.add_row(vec![
                    index.to_string(),
                    hex(frame.id.as_bytes()),
                    hex(frame.payload.as_bytes()),
                ]);
            }
            println!("{table}");
            println!("{}", stats_line(&stats));
        }
        OutputFormat::Pretty => {
            for frame in frames {
                println!(
                    "id={} payload={}",
                    hex(frame.id.as_bytes()),
                    hex(frame.payload.as_bytes())
                );
            }
            println!("{}", stats_line(&stats));
        }
        OutputFormat::Hex | OutputFormat::Ascii => {
            let display = match format {
                OutputFormat::Ascii => FrameFormat::Ascii,
                _ => FrameFormat::Hex,
            };
            for frame in frames {
                println!("{}", frame.display(display));
            }
        }
    }
}

/// Lowercase hex bytes separated by spaces.
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn stats_line(stats: &DecoderStats) -> String {
    format!(
        "frames={} discarded={} stray={} invalid_escapes={} overflow_bytes={}",
        stats.frames, stats.discarded, stats.stray, stats.invalid_escapes, stats.overflow_bytes
    )
}

fn frame_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
