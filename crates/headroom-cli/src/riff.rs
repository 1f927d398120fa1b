// SPDX-License-Identifier: LGPL-3.0-or-later

//! RIFF metadata passthrough.
//!
//! The WAV library handles `fmt `/`data` but does not model descriptive
//! chunks, so string tags (`LIST`), cue points (`cue `), broadcast info
//! (`bext`) and friends are copied byte-for-byte from the source RIFF to
//! the finished destination file, after which the RIFF size field is
//! patched to cover the appended chunks.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};

/// Chunk identifiers carried over to the destination.
const COPY_IDS: [&[u8; 4]; 6] = [b"bext", b"cue ", b"LIST", b"iXML", b"axml", b"ID3 "];

/// One raw chunk: identifier, original size field, and payload (including
/// the pad byte when the size is odd).
#[derive(Debug, Clone, PartialEq)]
struct Chunk {
    id: [u8; 4],
    size: u32,
    data: Vec<u8>,
}

/// Collect the metadata chunks of a RIFF/WAVE file.
fn read_meta_chunks(path: &Path) -> Result<Vec<Chunk>> {
    let mut file =
        File::open(path).with_context(|| format!("cannot reopen '{}'", path.display()))?;

    let mut header = [0u8; 12];
    file.read_exact(&mut header)
        .with_context(|| format!("'{}' is too short for a RIFF header", path.display()))?;
    if &header[0..4] != b"RIFF" || &header[8..12] != b"WAVE" {
        bail!("'{}' is not a RIFF/WAVE file", path.display());
    }

    let mut chunks = Vec::new();
    let mut hdr = [0u8; 8];
    loop {
        match file.read_exact(&mut hdr) {
            Ok(()) => {}
            // A clean end of the chunk list.
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let id: [u8; 4] = hdr[0..4].try_into().unwrap();
        let size = u32::from_le_bytes(hdr[4..8].try_into().unwrap()) as u64;
        // Chunks are word-aligned; odd sizes carry a pad byte.
        let padded = size + (size & 1);

        if COPY_IDS.contains(&&id) {
            let mut data = vec![0u8; padded as usize];
            match file.read_exact(&mut data) {
                Ok(()) => chunks.push(Chunk {
                    id,
                    size: size as u32,
                    data,
                }),
                // Truncated trailing chunk: ignore it.
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
        } else if file.seek(SeekFrom::Current(padded as i64)).is_err() {
            break;
        }
    }
    Ok(chunks)
}

/// Copy the source's metadata chunks onto the end of the finished
/// destination WAV and patch its RIFF size. Returns the number of chunks
/// copied.
pub fn copy_metadata(src: &Path, dst: &Path) -> Result<usize> {
    let chunks = read_meta_chunks(src)?;
    if chunks.is_empty() {
        return Ok(0);
    }

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(dst)
        .with_context(|| format!("cannot reopen '{}' for metadata", dst.display()))?;

    let mut header = [0u8; 12];
    file.read_exact(&mut header)?;
    if &header[0..4] != b"RIFF" || &header[8..12] != b"WAVE" {
        bail!("'{}' is not a RIFF/WAVE file", dst.display());
    }

    let mut end = file.seek(SeekFrom::End(0))?;
    for c in &chunks {
        // The size field excludes the pad byte; the payload includes it.
        file.write_all(&c.id)?;
        file.write_all(&c.size.to_le_bytes())?;
        file.write_all(&c.data)?;
        end += 8 + c.data.len() as u64;
    }

    let riff_size = u32::try_from(end - 8).context("output file exceeds the RIFF size limit")?;
    file.seek(SeekFrom::Start(4))?;
    file.write_all(&riff_size.to_le_bytes())?;
    file.flush()?;
    Ok(chunks.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("headroom-riff-{}-{name}", std::process::id()))
    }

    /// Minimal mono 16-bit WAV with the given extra chunks appended.
    fn write_wav(path: &Path, extra: &[(&[u8; 4], &[u8])]) {
        let mut body = Vec::new();
        body.extend_from_slice(b"WAVE");
        // fmt chunk
        body.extend_from_slice(b"fmt ");
        body.extend_from_slice(&16u32.to_le_bytes());
        body.extend_from_slice(&1u16.to_le_bytes()); // PCM
        body.extend_from_slice(&1u16.to_le_bytes()); // mono
        body.extend_from_slice(&48000u32.to_le_bytes());
        body.extend_from_slice(&96000u32.to_le_bytes());
        body.extend_from_slice(&2u16.to_le_bytes());
        body.extend_from_slice(&16u16.to_le_bytes());
        // data chunk, 2 samples
        body.extend_from_slice(b"data");
        body.extend_from_slice(&4u32.to_le_bytes());
        body.extend_from_slice(&[0u8; 4]);
        for (id, data) in extra {
            body.extend_from_slice(*id);
            body.extend_from_slice(&(data.len() as u32).to_le_bytes());
            body.extend_from_slice(data);
            if data.len() % 2 == 1 {
                body.push(0);
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        std::fs::write(path, out).unwrap();
    }

    #[test]
    fn test_copies_known_chunks_and_patches_size() {
        let src = temp_path("src1.wav");
        let dst = temp_path("dst1.wav");
        let info = b"INFOIART\x06\x00\x00\x00artist";
        write_wav(&src, &[(b"LIST", info), (b"junk", b"ignored")]);
        write_wav(&dst, &[]);

        let n = copy_metadata(&src, &dst).unwrap();
        assert_eq!(n, 1, "only the LIST chunk should be copied");

        let bytes = std::fs::read(&dst).unwrap();
        let riff_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        assert_eq!(riff_size + 8, bytes.len(), "RIFF size must cover the appendix");
        assert!(
            bytes.windows(4).any(|w| w == b"LIST"),
            "LIST chunk missing from destination"
        );
        assert!(
            !bytes.windows(4).any(|w| w == b"junk"),
            "unknown chunks must not be copied"
        );

        std::fs::remove_file(&src).ok();
        std::fs::remove_file(&dst).ok();
    }

    #[test]
    fn test_no_metadata_leaves_destination_untouched() {
        let src = temp_path("src2.wav");
        let dst = temp_path("dst2.wav");
        write_wav(&src, &[]);
        write_wav(&dst, &[]);
        let before = std::fs::read(&dst).unwrap();

        let n = copy_metadata(&src, &dst).unwrap();
        assert_eq!(n, 0);
        assert_eq!(std::fs::read(&dst).unwrap(), before);

        std::fs::remove_file(&src).ok();
        std::fs::remove_file(&dst).ok();
    }

    #[test]
    fn test_odd_sized_chunk_keeps_word_alignment() {
        let src = temp_path("src3.wav");
        let dst = temp_path("dst3.wav");
        write_wav(&src, &[(b"iXML", b"<x/>x")]); // 5 bytes, padded to 6
        write_wav(&dst, &[]);

        assert_eq!(copy_metadata(&src, &dst).unwrap(), 1);
        let bytes = std::fs::read(&dst).unwrap();
        assert_eq!(bytes.len() % 2, 0, "destination must stay word-aligned");
        let riff_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        assert_eq!(riff_size + 8, bytes.len());

        std::fs::remove_file(&src).ok();
        std::fs::remove_file(&dst).ok();
    }

    #[test]
    fn test_non_wav_source_is_an_error() {
        let src = temp_path("src4.bin");
        let dst = temp_path("dst4.wav");
        std::fs::write(&src, b"definitely not a riff file").unwrap();
        write_wav(&dst, &[]);

        assert!(copy_metadata(&src, &dst).is_err());

        std::fs::remove_file(&src).ok();
        std::fs::remove_file(&dst).ok();
    }
}
