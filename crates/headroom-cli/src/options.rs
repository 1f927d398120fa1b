// SPDX-License-Identifier: LGPL-3.0-or-later

//! Command-line option parsing and validation.

use anyhow::{Result, bail};

pub const USAGE: &str = "\
headroom - an audio file digital peak limiter.

Usage: headroom [ OPTIONS ] <src> <dst>

Options:
  -i, --input-gain <dB>      input gain in dB (-10 .. 30, default 0)
  -t, --threshold <dB>       threshold in dBFS, or dBTP with --true-peak
                             (-10 .. 0, default -1)
  -r, --release-time <ms>    release time in ms (1 .. 1000, default 50)
  -p, --true-peak            limit the 4x oversampled inter-sample peak
  -a, --auto-gain            measure the stream peak first and derive the
                             input gain so the output lands on the threshold
  -v, --verbose              show processing information (repeat for more)
  -h, --help                 display this help and exit
  -V, --version              print version information and exit

The destination file gets the same sample rate, channel count and bit
depth as the source, and file metadata is copied. Source and destination
must be distinct. Standard I/O is supported, use '-' as file name.

Examples:
  headroom -i 3 -t -1.2 my-music.wav my-louder-music.wav
  cat file.wav | headroom -v - output.wav
";

/// Parsed and validated command-line options.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub src: String,
    pub dst: String,
    /// Input gain in dB.
    pub input_gain: f32,
    /// Threshold in dBFS (dBTP with `true_peak`).
    pub threshold: f32,
    /// Release time in milliseconds.
    pub release_ms: f32,
    pub true_peak: bool,
    pub auto_gain: bool,
    /// Count of `-v` flags.
    pub verbose: u8,
}

/// Outcome of parsing: either run with options, or an informational exit.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Run(Options),
    Help,
    Version,
}

fn parse_value(name: &str, inline: Option<&str>, rest: &mut std::slice::Iter<String>) -> Result<f32> {
    let text = match inline {
        Some(v) => v.to_string(),
        None => match rest.next() {
            Some(v) => v.clone(),
            None => bail!("option '{name}' requires a value"),
        },
    };
    match text.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => bail!("invalid value '{text}' for option '{name}'"),
    }
}

/// Parse the argument list (without the program name).
pub fn parse(args: &[String]) -> Result<Parsed> {
    let mut input_gain = 0.0f32;
    let mut threshold = -1.0f32;
    let mut release_ms = 50.0f32;
    let mut true_peak = false;
    let mut auto_gain = false;
    let mut verbose = 0u8;
    let mut positional: Vec<String> = Vec::new();

    let mut it = args.iter();
    while let Some(arg) = it.next() {
        let (name, inline) = match arg.split_once('=') {
            Some((n, v)) if n.starts_with("--") => (n, Some(v)),
            _ => (arg.as_str(), None),
        };
        match name {
            "-h" | "--help" => return Ok(Parsed::Help),
            "-V" | "--version" => return Ok(Parsed::Version),
            "-v" | "--verbose" => verbose = verbose.saturating_add(1),
            "-p" | "--true-peak" => true_peak = true,
            "-a" | "--auto-gain" => auto_gain = true,
            "-i" | "--input-gain" => input_gain = parse_value(name, inline, &mut it)?,
            "-t" | "--threshold" => threshold = parse_value(name, inline, &mut it)?,
            "-r" | "--release-time" => release_ms = parse_value(name, inline, &mut it)?,
            _ if name.starts_with('-') && name.len() > 1 => {
                bail!("unrecognized option '{arg}', see --help for usage")
            }
            _ => positional.push(arg.clone()),
        }
    }

    if positional.len() != 2 {
        bail!("expected <src> and <dst>, see --help for usage");
    }
    let src = positional.remove(0);
    let dst = positional.remove(0);

    if src == dst && src != "-" {
        bail!("input and output must be distinct files");
    }
    if !(1.0..=1000.0).contains(&release_ms) {
        bail!("release time is out of bounds (1 <= r <= 1000) [ms]");
    }
    if !(-10.0..=0.0).contains(&threshold) {
        bail!("threshold is out of bounds (-10 <= t <= 0) [dB]");
    }
    if !(-10.0..=30.0).contains(&input_gain) {
        bail!("input gain is out of bounds (-10 <= i <= 30) [dB]");
    }

    Ok(Parsed::Run(Options {
        src,
        dst,
        input_gain,
        threshold,
        release_ms,
        true_peak,
        auto_gain,
        verbose,
    }))
}
