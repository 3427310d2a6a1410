use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use dsdio::dst::PlainFrameCodec;
use dsdio::{ChunkId, ContainerFormat, DsdReader, DsdWriter, ReaderOptions, open_reader, open_writer};
use indicatif::{MultiProgress, ProgressBar};

use super::command::{Cli, ConvertArgs};
use super::progress::create_progress_bar;
use crate::display::{rate_label, time_str};

const ID3: ChunkId = ChunkId::new(b"ID3 ");

/// Transfer buffer size; grows to hold several DST frames.
const BUFFER_SIZE: usize = 262_144;

pub fn cmd_convert(args: &ConvertArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let format = match args.format {
        Some(format) => ContainerFormat::from(format),
        None => ContainerFormat::from_path(&args.output).with_context(|| {
            format!(
                "Cannot tell the output format from {}; use --format",
                args.output.display()
            )
        })?,
    };

    if same_file(&args.input, &args.output) {
        bail!("Input and output are the same file: {}", args.input.display());
    }

    let mut options = ReaderOptions {
        codec: Arc::new(PlainFrameCodec),
        fail_level: cli.fail_level(),
        ..ReaderOptions::default()
    };
    if let Some(threads) = args.threads {
        options.decoder_threads = threads.max(1);
    }

    log::info!(
        "Converting {} to {format} (strict mode: {})",
        args.input.display(),
        cli.strict
    );

    let input = File::open(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;
    let mut reader = open_reader(BufReader::new(input), &options)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let info = reader.info().clone();
    log::info!(
        "Source: {}, {} Hz ({}), {} channels, {} audio bytes, {}{}",
        info.format,
        info.sample_rate,
        rate_label(info.sample_rate),
        info.channel_count,
        info.data_length,
        time_str(info.duration_secs()),
        if info.compressed { ", DST compressed" } else { "" }
    );

    let output = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let result = open_writer(output, format, info.sample_rate, info.channel_count)
        .map_err(anyhow::Error::from)
        .and_then(|mut writer| {
            let pb = match multi {
                Some(multi) => Some(create_progress_bar(multi, Some(info.data_length))?),
                None => None,
            };
            let buffer_size = BUFFER_SIZE.max(info.frame_size.unwrap_or(0) * 4);
            let copied = transfer(reader.as_mut(), writer.as_mut(), buffer_size, args, pb.as_ref());
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
            copied?;
            writer.close()?;
            Ok(writer.bytes_written())
        });
    reader.close()?;

    match result {
        Ok(bytes) => {
            log::info!("Wrote {} ({bytes} bytes)", args.output.display());
            Ok(())
        }
        Err(e) => {
            if let Err(remove) = fs::remove_file(&args.output) {
                log::warn!(
                    "Could not remove partial output {}: {remove}",
                    args.output.display()
                );
            }
            Err(e.context(format!("Conversion to {} failed", args.output.display())))
        }
    }
}

/// Copies the audio and then every following chunk the writer accepts.
fn transfer(
    reader: &mut dyn DsdReader,
    writer: &mut dyn DsdWriter,
    buffer_size: usize,
    args: &ConvertArgs,
    pb: Option<&ProgressBar>,
) -> Result<()> {
    let mut buf = vec![0u8; buffer_size];

    let audio = copy_chunk(reader, writer, &mut buf, pb)?;
    log::debug!("Copied {audio} audio bytes");

    while let Some(id) = reader.next_chunk()? {
        if args.ignore_tags && id == ID3 {
            log::info!("Skipping {id} chunk");
            continue;
        }
        if !writer.next_chunk(id)? {
            log::info!("Output format has no place for chunk {id}, dropping it");
            continue;
        }
        let copied = copy_chunk(reader, writer, &mut buf, None)?;
        log::debug!("Copied chunk {id} ({copied} bytes)");
    }
    Ok(())
}

fn copy_chunk(
    reader: &mut dyn DsdReader,
    writer: &mut dyn DsdWriter,
    buf: &mut [u8],
    pb: Option<&ProgressBar>,
) -> Result<u64> {
    let mut total = 0u64;
    loop {
        let n = reader.read(buf)?;
        if n == 0 {
            return Ok(total);
        }
        writer.write(&buf[..n])?;
        total += n as u64;
        if let Some(pb) = pb {
            pb.inc(n as u64);
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
