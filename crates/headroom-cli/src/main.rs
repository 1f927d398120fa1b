// SPDX-License-Identifier: LGPL-3.0-or-later

//! `headroom`: command-line peak limiter for audio files.
//!
//! Reads a WAV file (or standard input), constrains its level with the
//! look-ahead limiter from [`headroom_dsp`], and writes the result with
//! the source's format and metadata preserved.

mod audio;
mod options;
mod riff;

use anyhow::Result;
use log::LevelFilter;
use options::Parsed;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match options::parse(&args)? {
        Parsed::Help => print!("{}", options::USAGE),
        Parsed::Version => println!("headroom {}", env!("CARGO_PKG_VERSION")),
        Parsed::Run(opts) => {
            let level = match opts.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                _ => LevelFilter::Debug,
            };
            // Diagnostics go to standard error, keeping standard output
            // clean for '-' destinations.
            simple_logger::SimpleLogger::new()
                .with_level(level)
                .init()
                .ok();
            audio::run(&opts)?;
        }
    }
    Ok(())
}
