// SPDX-License-Identifier: LGPL-3.0-or-later

//! WAV processing pipeline.
//!
//! Reads the source stream in blocks, drives the limiter, discards the
//! first `latency()` output frames and flushes the delay line with zero
//! input at end of stream, so the destination lines up sample-exactly
//! with the source. The destination keeps the source's sample rate,
//! channel count and bit depth.

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use headroom_dsp::dynamics::peak_limiter::{MAX_CHANNELS, PeakLimiter};
use headroom_dsp::meters::true_peak::{self, TruePeakUpsampler};
use headroom_dsp::units::gain_to_db;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, info, warn};

use crate::options::Options;
use crate::riff;

/// Frames per processing block.
const BLOCK_FRAMES: usize = 4096;

/// How samples convert between the file's format and `f32`.
#[derive(Debug, Clone, Copy)]
enum SampleCodec {
    Float,
    Int { scale: f32 },
}

impl SampleCodec {
    fn for_spec(spec: &WavSpec) -> Result<Self> {
        match spec.sample_format {
            SampleFormat::Float if spec.bits_per_sample == 32 => Ok(Self::Float),
            SampleFormat::Float => {
                bail!("unsupported float depth: {} bit", spec.bits_per_sample)
            }
            SampleFormat::Int if (8..=32).contains(&spec.bits_per_sample) => Ok(Self::Int {
                scale: (1i64 << (spec.bits_per_sample - 1)) as f32,
            }),
            SampleFormat::Int => {
                bail!("unsupported integer depth: {} bit", spec.bits_per_sample)
            }
        }
    }
}

fn coeff_to_db(coeff: f32) -> f32 {
    if coeff < 1e-15 {
        f32::NEG_INFINITY
    } else {
        gain_to_db(coeff)
    }
}

fn open_source<'a>(src: &str, buffered: Option<&'a [u8]>) -> Result<WavReader<Box<dyn Read + 'a>>> {
    let raw: Box<dyn Read + 'a> = match buffered {
        Some(data) => Box::new(Cursor::new(data)),
        None if src == "-" => Box::new(io::stdin().lock()),
        None => Box::new(BufReader::new(
            File::open(src).with_context(|| format!("cannot open '{src}' for reading"))?,
        )),
    };
    WavReader::new(raw).with_context(|| format!("cannot read '{src}' as WAV"))
}

/// Read up to `buf.len()` samples as `f32`, returning the count read.
fn fill_block<R: Read>(
    reader: &mut WavReader<R>,
    codec: SampleCodec,
    buf: &mut [f32],
) -> Result<usize> {
    let mut n = 0;
    match codec {
        SampleCodec::Float => {
            for s in reader.samples::<f32>().take(buf.len()) {
                buf[n] = s.context("error reading samples")?;
                n += 1;
            }
        }
        SampleCodec::Int { scale } => {
            for s in reader.samples::<i32>().take(buf.len()) {
                buf[n] = s.context("error reading samples")? as f32 / scale;
                n += 1;
            }
        }
    }
    Ok(n)
}

/// Write samples back in the destination's format. Any write failure is
/// fatal; a short output file must never pass as success.
fn write_block<W: Write + Seek>(
    writer: &mut WavWriter<W>,
    codec: SampleCodec,
    samples: &[f32],
) -> Result<()> {
    match codec {
        SampleCodec::Float => {
            for &x in samples {
                writer.write_sample(x).context("short write on output")?;
            }
        }
        SampleCodec::Int { scale } => {
            for &x in samples {
                let v = (x * scale).round().clamp(-scale, scale - 1.0) as i32;
                writer.write_sample(v).context("short write on output")?;
            }
        }
    }
    Ok(())
}

/// Auto-gain pre-pass: the largest sample magnitude of the stream, or the
/// largest 4× oversampled magnitude in true-peak mode.
fn measure_peak<R: Read>(reader: &mut WavReader<R>, true_peak: bool) -> Result<f32> {
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        bail!("input has no channels");
    }
    let codec = SampleCodec::for_spec(&spec)?;
    let mut buf = vec![0.0f32; BLOCK_FRAMES * channels];
    let mut peak = 0.0f32;

    if true_peak {
        let mut ups = vec![TruePeakUpsampler::new(); channels];
        loop {
            let n = fill_block(reader, codec, &mut buf)?;
            if n == 0 {
                break;
            }
            for (i, &x) in buf[..n].iter().enumerate() {
                peak = peak.max(ups[i % channels].process_one(x));
            }
        }
        // Drain the FIR so trailing inter-sample peaks are seen too.
        for up in &mut ups {
            for _ in 0..true_peak::LATENCY {
                peak = peak.max(up.process_one(0.0));
            }
        }
    } else {
        loop {
            let n = fill_block(reader, codec, &mut buf)?;
            if n == 0 {
                break;
            }
            for &x in &buf[..n] {
                peak = peak.max(x.abs());
            }
        }
    }
    Ok(peak)
}

fn process_stream<R: Read, W: Write + Seek>(
    reader: &mut WavReader<R>,
    writer: &mut WavWriter<W>,
    limiter: &mut PeakLimiter,
    codec: SampleCodec,
    block_stats: bool,
) -> Result<()> {
    let channels = limiter.channels();
    let mut inp = vec![0.0f32; BLOCK_FRAMES * channels];
    let mut out = vec![0.0f32; BLOCK_FRAMES * channels];
    let mut discard = limiter.latency();

    loop {
        let n = fill_block(reader, codec, &mut inp)?;
        if n == 0 {
            break;
        }
        let frames = n / channels;
        if frames * channels != n {
            warn!("dropping a trailing partial frame ({} samples)", n - frames * channels);
            if frames == 0 {
                break;
            }
        }

        limiter.process(&mut out[..frames * channels], &inp[..frames * channels]);

        let skip = discard.min(frames);
        discard -= skip;
        write_block(writer, codec, &out[skip * channels..frames * channels])?;

        if block_stats && discard == 0 {
            let s = limiter.stats();
            debug!(
                "level below thresh: {:6.1} dB, max gain: {:4.1} dB, min gain: {:4.1} dB",
                coeff_to_db(s.peak),
                coeff_to_db(s.gain_max),
                coeff_to_db(s.gain_min)
            );
        }
    }

    // End of stream: push zeros until the delay line has drained.
    inp.fill(0.0);
    let mut remaining = limiter.latency();
    while remaining > 0 {
        let frames = remaining.min(BLOCK_FRAMES);
        limiter.process(&mut out[..frames * channels], &inp[..frames * channels]);
        let skip = discard.min(frames);
        discard -= skip;
        write_block(writer, codec, &out[skip * channels..frames * channels])?;
        remaining -= frames;
    }
    Ok(())
}

/// Run the full source → limiter → destination pipeline.
pub fn run(opts: &Options) -> Result<()> {
    // Standard input is buffered only when the auto-gain pre-pass needs
    // to read the stream twice.
    let stdin_buf: Option<Vec<u8>> = if opts.src == "-" && opts.auto_gain {
        let mut data = Vec::new();
        io::stdin()
            .lock()
            .read_to_end(&mut data)
            .context("error reading standard input")?;
        Some(data)
    } else {
        None
    };

    let mut gain_db = opts.input_gain;
    if opts.auto_gain {
        let mut reader = open_source(&opts.src, stdin_buf.as_deref())?;
        let peak = measure_peak(&mut reader, opts.true_peak)?;
        if peak > 0.0 {
            let peak_db = gain_to_db(peak);
            gain_db = (opts.threshold - peak_db + opts.input_gain).clamp(-10.0, 30.0);
            info!(
                "measured peak {peak_db:.2} {}, using input gain {gain_db:.2} dB",
                if opts.true_peak { "dBTP" } else { "dBFS" }
            );
        } else {
            warn!("input is silent, input gain stays at {gain_db:.2} dB");
        }
    }

    let mut reader = open_source(&opts.src, stdin_buf.as_deref())?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        bail!("input has no channels");
    }
    if channels > MAX_CHANNELS {
        bail!("only up to {MAX_CHANNELS} channels are supported");
    }
    let codec = SampleCodec::for_spec(&spec)?;

    info!("input       : {}", opts.src);
    info!("sample rate : {}", spec.sample_rate);
    info!("channels    : {channels}");
    info!("frames      : {}", reader.duration());

    let mut limiter = PeakLimiter::new();
    limiter.init(spec.sample_rate as f32, channels);
    limiter.set_input_gain(gain_db);
    limiter.set_threshold(opts.threshold);
    limiter.set_release(opts.release_ms / 1000.0);
    limiter.set_true_peak(opts.true_peak);

    let block_stats = opts.verbose >= 2;

    if opts.dst == "-" {
        // WAV finalisation needs seeking, which a pipe cannot do; build
        // the stream in memory and dump it in one go.
        let mut cursor = Cursor::new(Vec::new());
        let mut writer =
            WavWriter::new(&mut cursor, spec).context("cannot prepare WAV stream")?;
        process_stream(&mut reader, &mut writer, &mut limiter, codec, block_stats)?;
        writer.finalize().context("cannot finalise WAV stream")?;

        let stdout = io::stdout();
        let mut lock = stdout.lock();
        lock.write_all(cursor.get_ref())
            .context("short write on standard output")?;
        lock.flush().context("cannot flush standard output")?;
    } else {
        let dst = Path::new(&opts.dst);
        let mut writer = WavWriter::create(dst, spec)
            .with_context(|| format!("cannot open '{}' for writing", opts.dst))?;
        process_stream(&mut reader, &mut writer, &mut limiter, codec, block_stats)?;
        writer
            .finalize()
            .with_context(|| format!("cannot finalise '{}'", opts.dst))?;

        if opts.src != "-" {
            match riff::copy_metadata(Path::new(&opts.src), dst) {
                Ok(0) => {}
                Ok(n) => info!("copied {n} metadata chunk(s)"),
                Err(e) => warn!("metadata not copied: {e:#}"),
            }
        }
    }

    let s = limiter.stats();
    info!("output          : {}", opts.dst);
    info!("max attenuation : {:.2} dB", coeff_to_db(s.gain_min));
    Ok(())
}
