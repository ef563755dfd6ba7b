// This file is part of Reliquary.
//
// Reliquary is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Reliquary is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Reliquary.  If not, see <http://www.gnu.org/licenses/>.
use anyhow::{anyhow, Result};
use cache::{spoof_cache_crc, verify_cache, CacheFile};
use std::path::PathBuf;
use structopt::StructOpt;

fn parse_crc(s: &str) -> Result<u32> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|_| anyhow!("'{}' is not a 32-bit hex CRC", s))
}

/// Verify a cache file's CRC32, or forge it to a chosen value
#[derive(Debug, StructOpt)]
#[structopt(name = "spoof-crc")]
struct Opt {
    /// Rewrite the random number word so the cache CRC becomes this
    /// value (hex)
    #[structopt(short, long, parse(try_from_str = parse_crc))]
    forge: Option<u32>,

    /// Write the forged cache here instead of back over the input
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Print progress while solving
    #[structopt(short, long)]
    progress: bool,

    /// The cache file to verify or forge
    #[structopt(parse(from_os_str))]
    map: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();
    let mut cache = CacheFile::from_path(&opt.map)?;

    match opt.forge {
        None => {
            let verdict = verify_cache(&cache)?;
            println!("0x{:08X}", verdict.crc);
            match verdict.clean {
                Some(true) => println!("clean"),
                Some(false) => println!("dirty (header says 0x{:08X})", cache.header.crc32),
                None => println!(
                    "no CRC defined for the {} engine",
                    cache.header.engine.name()
                ),
            }
        }
        Some(desired) => {
            let outcome = spoof_cache_crc(&mut cache, desired, opt.progress)?;
            let target = opt.output.as_ref().unwrap_or(&opt.map);
            vault::write_file_atomic(target, cache.data())?;
            println!("crc:    0x{:08X}", outcome.crc);
            println!("random: 0x{:08X}", outcome.random_number);
            println!("saved {}", target.display());
        }
    }
    Ok(())
}
