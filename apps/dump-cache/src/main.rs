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
use anyhow::Result;
use cache::{verify_cache, CacheEngine, CacheFile};
use std::path::PathBuf;
use structopt::StructOpt;

/// Show cache file metadata
#[derive(Debug, StructOpt)]
#[structopt(name = "dump-cache")]
struct Opt {
    /// The cache file to inspect
    #[structopt(parse(from_os_str))]
    map: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();
    let cache = CacheFile::from_path(&opt.map)?;
    let header = &cache.header;

    println!("{:<19}{}", "Scenario name:", header.scenario_name);
    if !header.build_string.is_empty() {
        println!("{:<19}{}", "Build:", header.build_string);
    }
    println!("{:<19}{}", "Engine:", header.engine.name());
    if header.engine == CacheEngine::Anniversary {
        println!(
            "{:<19}{}",
            "Classic:",
            if header.classic_only { "Yes" } else { "No" }
        );
        if !header.timestamp.is_empty() {
            println!("{:<19}{}", "Timestamp:", header.timestamp);
        }
    }
    println!(
        "{:<19}{}",
        "Map type:",
        match header.map_type {
            0 => "singleplayer",
            1 => "multiplayer",
            2 => "user interface",
            _ => "unknown",
        }
    );
    println!("{:<19}{}", "Tags:", cache.tag_count()?);
    let actual = cache.data().len();
    let promised = header.decompressed_size as usize;
    println!(
        "{:<19}{:.2} MiB ({})",
        "Uncompressed size:",
        actual as f64 / 1024. / 1024.,
        if actual == promised {
            "matches header"
        } else {
            "MISMATCHED"
        }
    );
    if cache.was_compressed {
        println!("{:<19}Yes (deflate)", "Compressed:");
    } else {
        println!("{:<19}No", "Compressed:");
    }

    let verdict = verify_cache(&cache)?;
    match verdict.clean {
        Some(clean) => {
            println!(
                "{:<19}0x{:08X} ({})",
                "CRC32:",
                verdict.crc,
                if verdict.crc == header.crc32 {
                    "matches header"
                } else {
                    "MISMATCHED"
                }
            );
            println!(
                "{:<19}{}",
                "Integrity:",
                if clean {
                    "Clean"
                } else {
                    "Dirty (map may be corrupted or modified)"
                }
            );
        }
        None => println!(
            "{:<19}not defined for the {} engine",
            "CRC32:",
            header.engine.name()
        ),
    }
    Ok(())
}
