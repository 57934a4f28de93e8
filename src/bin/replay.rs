//! Replays recorded detections through the tracker.
//!
//! Input is one frame per line: a JSON array of detections, optionally
//! prefixed with a timestamp and `:` (`1650000000123:[...]`). Confirmed
//! tracks are printed as one JSON object per frame.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use serde_derive::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use reidtrack::detector::DetectionFilter;
use reidtrack::{Detection, Error, PipelineConfig, TrackReport, Tracker};

#[derive(Parser, Debug)]
#[command(name = "reidtrack-replay", about = "Track recorded detections")]
struct Args {
    /// Newline-delimited detection frames
    input: PathBuf,

    /// Pipeline configuration (JSON); the tracker and detector sections are used
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also print frames without confirmed tracks
    #[arg(long)]
    all_frames: bool,
}

#[derive(Serialize)]
struct FrameTracks<'a> {
    frame: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<u64>,
    tracks: &'a [TrackReport],
}

fn parse_line(line: &str) -> Result<(Option<u64>, Vec<Detection>), Error> {
    let line = line.trim();

    if let Some(idx) = line.find(':') {
        let (ts, rest) = line.split_at(idx);
        if let Ok(ts) = ts.trim().parse::<u64>() {
            return Ok((Some(ts), serde_json::from_str(&rest[1..])?));
        }
    }

    Ok((None, serde_json::from_str(line)?))
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => PipelineConfig::default(),
    };

    let filter = DetectionFilter::new(config.detector)?;
    let mut tracker = Tracker::new(config.tracker)?;
    let reader = BufReader::new(File::open(&args.input)?);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let mut frame = 0u64;
    let mut skipped = 0u64;

    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let (ts, detections) = match parse_line(&line) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(line = lineno + 1, "wrong file format: {}", err);
                skipped += 1;
                continue;
            }
        };

        frame += 1;
        tracker.update(filter.apply(detections));

        let tracks = tracker.reports();
        if tracks.is_empty() && !args.all_frames {
            continue;
        }

        serde_json::to_writer(&mut out, &FrameTracks { frame, ts, tracks: &tracks })?;
        out.write_all(b"\n")?;
    }

    out.flush()?;
    info!(frames = frame, skipped, live_tracks = tracker.tracks().len(), "replay finished");

    Ok(())
}
