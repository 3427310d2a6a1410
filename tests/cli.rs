use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

use assert_cmd::Command;
use dsdio::dff::writer::DffWriter;
use dsdio::{ChunkId, ReaderOptions, open_reader};
use tempfile::TempDir;

fn write_dff(path: &Path, channels: u16, audio: &[u8], tag: Option<&[u8]>) {
    let mut writer = DffWriter::new(File::create(path).unwrap(), 2_822_400, channels).unwrap();
    writer.write(audio).unwrap();
    writer.next_chunk(ChunkId(*b"DIIN")).unwrap();
    writer.write(b"edit master").unwrap();
    if let Some(tag) = tag {
        writer.next_chunk(ChunkId(*b"ID3 ")).unwrap();
        writer.write(tag).unwrap();
    }
    writer.finish().unwrap();
}

fn read_audio(path: &Path) -> Vec<u8> {
    let file = BufReader::new(File::open(path).unwrap());
    let mut reader = open_reader(file, &ReaderOptions::default()).unwrap();
    let mut audio = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).unwrap();
        if n == 0 {
            return audio;
        }
        audio.extend_from_slice(&buf[..n]);
    }
}

fn dsdunpack() -> Command {
    let mut cmd = Command::cargo_bin("dsdunpack").unwrap();
    cmd.arg("--loglevel").arg("warn");
    cmd
}

#[test]
fn converts_dsdiff_to_dsf_by_extension() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.dff");
    let output = dir.path().join("out.dsf");
    let audio: Vec<u8> = (0..2 * 3000).map(|i| (i % 255) as u8).collect();
    write_dff(&input, 2, &audio, Some(b"ID3\x04\x00tag"));

    dsdunpack()
        .arg("convert")
        .arg(&input)
        .arg(&output)
        .assert()
        .success();

    let bytes = fs::read(&output).unwrap();
    assert_eq!(&bytes[..4], b"DSD ");
    assert!(bytes.ends_with(b"ID3\x04\x00tag"));
    assert_eq!(read_audio(&output), audio);
}

#[test]
fn ignore_tags_drops_id3() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.dff");
    let output = dir.path().join("copy.dff");
    write_dff(&input, 1, &[0x69; 33], Some(b"ID3tag"));

    dsdunpack()
        .args(["convert", "--ignore-tags"])
        .arg(&input)
        .arg(&output)
        .assert()
        .success();

    let mut bytes = Vec::new();
    File::open(&output)
        .unwrap()
        .read_to_end(&mut bytes)
        .unwrap();
    assert!(bytes.windows(4).any(|w| w == b"DIIN"));
    assert!(!bytes.windows(4).any(|w| w == b"ID3 "));
    assert_eq!(read_audio(&output), vec![0x69; 33]);
}

#[test]
fn explicit_format_overrides_extension() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.dff");
    let output = dir.path().join("out.bin");
    write_dff(&input, 6, &[0x96; 60], None);

    dsdunpack()
        .args(["convert", "--format", "dsf"])
        .arg(&input)
        .arg(&output)
        .assert()
        .success();
    assert_eq!(&fs::read(&output).unwrap()[..4], b"DSD ");
}

#[test]
fn unknown_output_extension_fails() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.dff");
    write_dff(&input, 2, &[0; 8], None);

    dsdunpack()
        .arg("convert")
        .arg(&input)
        .arg(dir.path().join("out.wav"))
        .assert()
        .failure();
}

#[test]
fn rejects_non_dsd_input() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.dff");
    let output = dir.path().join("out.dsf");
    fs::write(&input, b"RIFF\0\0\0\0WAVEfmt ").unwrap();

    dsdunpack()
        .arg("convert")
        .arg(&input)
        .arg(&output)
        .assert()
        .failure();
    assert!(!output.exists());
}

#[test]
fn info_reports_yaml() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.dff");
    write_dff(&input, 2, &[0; 2 * 100], Some(b"ID3tag"));

    let output = dsdunpack()
        .args(["info", "--yaml"])
        .arg(&input)
        .output()
        .unwrap();
    assert!(output.status.success());

    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.contains("format: DSDIFF"));
    assert!(text.contains("sample_rate: 2822400"));
    assert!(text.contains("channels: 2"));
    assert!(text.contains("audio_bytes: 200"));
    assert!(text.contains("id: DIIN"));
    assert!(text.contains("size: 11"));
}
