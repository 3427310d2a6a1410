use std::fs::File;
use std::io::BufReader;

use anyhow::{Context, Result};
use dsdio::{DsdReader, ReaderOptions, StreamInfo, open_reader};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;

use super::command::{Cli, InfoArgs};
use crate::display::{rate_label, time_str};

#[derive(Debug, Serialize)]
struct InfoReport {
    format: String,
    sample_rate: u32,
    rate: String,
    channels: u16,
    compressed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    dst_frame_size: Option<usize>,
    audio_bytes: u64,
    samples_per_channel: u64,
    duration: String,
    chunks: Vec<ChunkReport>,
}

#[derive(Debug, Serialize)]
struct ChunkReport {
    id: String,
    size: u64,
}

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing DSD file: {}", args.input.display());

    let options = ReaderOptions {
        decoder_threads: 1,
        fail_level: cli.fail_level(),
        ..ReaderOptions::default()
    };
    let input = File::open(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;
    let mut reader = open_reader(BufReader::new(input), &options)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("Scanning chunks...");
            Some(pb)
        }
        None => None,
    };

    let chunks = scan_chunks(reader.as_mut());
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let report = InfoReport::new(reader.info(), chunks?);
    reader.close()?;

    if args.yaml {
        print!("{}", serde_yaml_ng::to_string(&report)?);
    } else {
        display_report(&report);
    }
    Ok(())
}

/// Lists the chunks after the audio without decoding the audio itself.
fn scan_chunks(reader: &mut dyn DsdReader) -> Result<Vec<ChunkReport>> {
    let mut chunks = Vec::new();
    let mut buf = vec![0u8; 64 * 1024];
    while let Some(id) = reader.next_chunk()? {
        let mut size = 0u64;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            size += n as u64;
        }
        log::debug!("Chunk {id}: {size} bytes");
        chunks.push(ChunkReport {
            id: String::from_utf8_lossy(id.as_bytes()).into_owned(),
            size,
        });
    }
    Ok(chunks)
}

impl InfoReport {
    fn new(info: &StreamInfo, chunks: Vec<ChunkReport>) -> Self {
        Self {
            format: info.format.to_string(),
            sample_rate: info.sample_rate,
            rate: rate_label(info.sample_rate),
            channels: info.channel_count,
            compressed: info.compressed,
            dst_frame_size: info.frame_size,
            audio_bytes: info.data_length,
            samples_per_channel: info.sample_count(),
            duration: time_str(info.duration_secs()),
            chunks,
        }
    }
}

fn display_report(report: &InfoReport) {
    println!();
    println!("DSD Stream Information");
    println!("======================");
    println!();
    println!("  Container                 {}", report.format);
    println!(
        "  Sampling rate             {} Hz ({})",
        report.sample_rate, report.rate
    );
    println!("  Channels                  {}", report.channels);
    println!("  DST compressed            {}", report.compressed);
    if let Some(frame_size) = report.dst_frame_size {
        println!("  DST frame size            {frame_size} bytes");
    }
    println!("  Audio size                {} bytes", report.audio_bytes);
    println!("  Samples per channel       {}", report.samples_per_channel);
    println!("  Duration                  {}", report.duration);
    println!();

    if report.chunks.is_empty() {
        println!("No chunks after the audio");
    } else {
        println!("Chunks after the audio");
        for chunk in &report.chunks {
            println!("  {:26}{} bytes", format!("'{}'", chunk.id), chunk.size);
        }
    }
    println!();
}
