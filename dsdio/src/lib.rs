#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Streaming access to the two common DSD (1-bit audio) containers.
//!
//! ### Containers
//!
//! - **DSDIFF** (`.dff`): big-endian `FRM8` form. Audio is either raw
//!   (`DSD ` chunk) or DST compressed (`DST ` chunk of frame records).
//!   Any number of chunks may follow the audio.
//! - **DSF** (`.dsf`): little-endian, fixed layout, 4096-byte blocks per
//!   channel, optional trailing ID3v2 tag.
//!
//! ### Interchange Form
//!
//! Readers yield and writers take audio byte-interleaved across channels,
//! most significant bit first. Conversion between any reader and any writer
//! is a plain byte copy.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::fs::File;
//! use std::io::BufReader;
//! use dsdio::container::{open_reader, open_writer, ContainerFormat, ReaderOptions};
//!
//! let input = BufReader::new(File::open("in.dff")?);
//! let mut reader = open_reader(input, &ReaderOptions::default())?;
//! let info = reader.info().clone();
//! let mut writer = open_writer(
//!     File::create("out.dsf")?,
//!     ContainerFormat::Dsf,
//!     info.sample_rate,
//!     info.channel_count,
//! )?;
//!
//! let mut buf = vec![0u8; 1 << 18];
//! loop {
//!     let n = reader.read(&mut buf)?;
//!     if n == 0 {
//!         match reader.next_chunk()? {
//!             Some(id) if writer.next_chunk(id)? => continue,
//!             Some(_) => {
//!                 while reader.read(&mut buf)? > 0 {}
//!                 continue;
//!             }
//!             None => break,
//!         }
//!     }
//!     writer.write(&buf[..n])?;
//! }
//! writer.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Chunk headers and the alignment rules of each container.
pub mod chunk;

/// Reader/writer traits, stream metadata and the format dispatcher.
pub mod container;

/// DSDIFF reading and writing.
pub mod dff;

/// DSF reading and writing.
pub mod dsf;

/// DST frame decoding: worker pool, reader bridge and codecs.
pub mod dst;

pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use chunk::ChunkId;
pub use container::{
    ContainerFormat, DsdReader, DsdWriter, ReaderOptions, StreamInfo, open_reader, open_writer,
};
pub use utils::errors::{DsdError, FrameError, Result};
