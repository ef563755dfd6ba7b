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
use anyhow::{bail, ensure, Result};
use bitmap::{build_bitmap_tag, BuildOptions, EncodingFormat, MipmapScaleType};
use plate::{BitmapType, BitmapUsage, SUPPORTED_EXTENSIONS};
use std::path::PathBuf;
use structopt::StructOpt;
use vault::BuildContext;

/// Create or modify a bitmap tag
#[derive(Debug, StructOpt)]
#[structopt(name = "pack-bitmap")]
struct Opt {
    /// Use the specified data directory
    #[structopt(short, long, default_value = "data", parse(from_os_str))]
    data: PathBuf,

    /// Use the specified tags directory
    #[structopt(short, long, default_value = "tags", parse(from_os_str))]
    tags: PathBuf,

    /// Pixel format: 32-bit, 16-bit, monochrome, dxt5, dxt3, dxt1, or
    /// auto (the best lossless format)
    #[structopt(short = "F", long)]
    format: Option<String>,

    /// Bitmap type: 2d_textures, 3d_textures, cube_maps,
    /// interface_bitmaps, or sprites
    #[structopt(short = "T", long = "type")]
    bitmap_type: Option<BitmapType>,

    /// Bitmap usage: alpha_blend, default, height_map, detail_map,
    /// light_map, vector_map
    #[structopt(short = "u", long)]
    usage: Option<BitmapUsage>,

    /// Maximum mipmap count
    #[structopt(short = "M", long)]
    mipmap_count: Option<u16>,

    /// Mipmap scale type: linear, nearest_alpha, nearest
    #[structopt(short = "s", long)]
    mipmap_scale: Option<MipmapScaleType>,

    /// Detail fade factor from 0.0 to 1.0
    #[structopt(short = "f", long)]
    detail_fade: Option<f32>,

    /// Maximum sprite sheet length: 32, 64, 128, 256, 512, or 1024
    #[structopt(short = "B", long)]
    budget: Option<u32>,

    /// Maximum sprite sheet count; 0 disables budgeting
    #[structopt(short = "C", long)]
    budget_count: Option<u32>,

    /// Force square sprite sheets
    #[structopt(short = "S", long = "square-sheets")]
    square_sheets: bool,

    /// Palettize height maps: on or off
    #[structopt(short = "p", long)]
    bump_palettize: Option<String>,

    /// Apparent bumpmap height from 0.0 to 1.0
    #[structopt(short = "H", long)]
    bump_height: Option<f32>,

    /// Alpha bias from -1.0 to 1.0
    #[structopt(short = "A", long)]
    alpha_bias: Option<f32>,

    /// Dither channels: a, rgb, argb, or none
    #[structopt(short = "D", long)]
    dithering: Option<String>,

    /// Ignore sequence borders when computing registration points: on
    /// or off
    #[structopt(short = "r", long)]
    reg_point_hack: Option<String>,

    /// Treat the argument as a filesystem path
    #[structopt(short = "P", long = "fs-path")]
    fs_path: bool,

    /// Ignore the tag data if the tag exists
    #[structopt(short = "I", long)]
    ignore_tag: bool,

    /// Rebuild from the tag's archived color plate data
    #[structopt(short = "R", long)]
    regenerate: bool,

    /// The bitmap tag to build
    bitmap_tag: String,
}

fn parse_switch(name: &str, value: &str) -> Result<bool> {
    match value {
        "on" => Ok(true),
        "off" => Ok(false),
        _ => bail!("unknown {} setting '{}'; expected on or off", name, value),
    }
}

fn options_from(opt: &Opt) -> Result<BuildOptions> {
    let mut options = BuildOptions {
        bitmap_type: opt.bitmap_type,
        usage: opt.usage,
        max_mipmap_count: opt.mipmap_count,
        scale_type: opt.mipmap_scale,
        mipmap_fade: opt.detail_fade,
        sprite_budget: opt.budget,
        sprite_budget_count: opt.budget_count,
        sprite_spacing: None,
        force_square_sprite_sheets: opt.square_sheets,
        bump_height: opt.bump_height,
        alpha_bias: opt.alpha_bias,
        ignore_tag_data: opt.ignore_tag,
        regenerate: opt.regenerate,
        ..BuildOptions::default()
    };

    if let Some(format) = &opt.format {
        if format == "auto" {
            options.auto_format = Some(true);
        } else {
            options.format = Some(format.parse::<EncodingFormat>()?);
            options.auto_format = Some(false);
        }
    }
    if let Some(fade) = opt.detail_fade {
        ensure!(
            (0.0..=1.0).contains(&fade),
            "detail fade must be between 0.0 and 1.0"
        );
    }
    if let Some(bias) = opt.alpha_bias {
        ensure!(
            (-1.0..=1.0).contains(&bias),
            "alpha bias must be between -1.0 and 1.0"
        );
    }
    if let Some(budget) = opt.budget {
        ensure!(
            matches!(budget, 32 | 64 | 128 | 256 | 512 | 1024),
            "invalid sprite budget {}",
            budget
        );
    }
    if let Some(setting) = &opt.bump_palettize {
        options.palettize = Some(parse_switch("palettize", setting)?);
    }
    if let Some(setting) = &opt.reg_point_hack {
        options.filthy_sprite_bug_fix = Some(parse_switch("registration point hack", setting)?);
    }
    if let Some(channels) = &opt.dithering {
        match channels.as_str() {
            "a" => options.dither_alpha = true,
            "rgb" => options.dither_color = true,
            "argb" => {
                options.dither_alpha = true;
                options.dither_color = true;
            }
            "none" => {}
            _ => bail!("unknown dither type '{}'", channels),
        }
    }
    Ok(options)
}

/// Resolve the positional argument to a logical tag path, stripping a
/// tag or image extension if one was given.
fn resolve_tag_path(ctx: &BuildContext, opt: &Opt) -> Result<String> {
    let raw = if opt.fs_path {
        let host = PathBuf::from(&opt.bitmap_tag);
        match ctx.host_path_to_tag_path(&host) {
            Some(tag_path) => tag_path,
            None => bail!(
                "{} lies under neither {} nor {}",
                host.display(),
                ctx.tags.display(),
                ctx.data.display()
            ),
        }
    } else {
        vault::host_path_to_engine(&opt.bitmap_tag)
    };

    if let Some(dot) = raw.rfind('.') {
        let extension = &raw[dot + 1..];
        if extension == "bitmap" || extension == "bitm" || SUPPORTED_EXTENSIONS.contains(&extension)
        {
            return Ok(raw[..dot].to_owned());
        }
    }
    Ok(raw)
}

fn main() {
    env_logger::init();
    let opt = Opt::from_args();
    if let Err(e) = run(&opt) {
        eprintln!("failed to build {}: {:#}", opt.bitmap_tag, e);
        std::process::exit(1);
    }
}

fn run(opt: &Opt) -> Result<()> {
    ensure!(
        opt.tags.is_dir(),
        "directory {} was not found or is not a directory",
        opt.tags.display()
    );
    let ctx = BuildContext::new(opt.data.clone(), opt.tags.clone());
    let options = options_from(opt)?;
    let tag_path = resolve_tag_path(&ctx, opt)?;
    let written = build_bitmap_tag(&ctx, &tag_path, &options)?;
    println!("saved {}", written.display());
    Ok(())
}
