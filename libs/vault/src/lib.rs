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

// The two-root workspace: a data tree holding source assets and a tags
// tree holding compiled tags. Logical tag paths use backslashes; host
// paths use whatever the platform wants. Everything that maps between the
// two lives here, as does bulk tag discovery.

use anyhow::Result;
use log::trace;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tag::TagClass;

pub const ENGINE_SEPARATOR: char = '\\';

/// Directory recursion limit for discovery walks.
const MAX_SCAN_DEPTH: usize = 256;

fn is_separator(c: char) -> bool {
    c == '\\' || c == '/' || c == std::path::MAIN_SEPARATOR
}

/// Rewrite every separator variant to the host separator.
pub fn engine_path_to_host(tag_path: &str) -> String {
    tag_path
        .chars()
        .map(|c| {
            if is_separator(c) {
                std::path::MAIN_SEPARATOR
            } else {
                c
            }
        })
        .collect()
}

/// Rewrite every separator variant to the engine's backslash.
pub fn host_path_to_engine(tag_path: &str) -> String {
    tag_path
        .chars()
        .map(|c| if is_separator(c) { ENGINE_SEPARATOR } else { c })
        .collect()
}

/// Split a logical path into its backslash-separated words. Duplicate
/// separators collapse; a trailing separator yields no empty final word.
pub fn split_tag_path(tag_path: &str) -> Vec<String> {
    host_path_to_engine(tag_path)
        .split(ENGINE_SEPARATOR)
        .filter(|word| !word.is_empty())
        .map(|word| word.to_owned())
        .collect()
}

/// Strip all trailing separators.
pub fn strip_trailing_separators(path: &str) -> String {
    path.trim_end_matches(is_separator).to_owned()
}

pub fn strip_duplicate_separators(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut last_was_separator = false;
    for c in path.chars() {
        if is_separator(c) {
            if !last_was_separator {
                out.push(c);
            }
            last_was_separator = true;
        } else {
            out.push(c);
            last_was_separator = false;
        }
    }
    out
}

/// Final path word, optionally without its extension.
pub fn base_name(tag_path: &str, drop_extension: bool) -> String {
    let base = tag_path
        .rsplit(is_separator)
        .next()
        .unwrap_or(tag_path);
    if drop_extension {
        if let Some(dot) = base.rfind('.') {
            return base[..dot].to_owned();
        }
    }
    base.to_owned()
}

/// Split `<logical>.<fourcc>` into the logical path and the tag class.
pub fn split_class_extension(tag_path: &str) -> Option<(String, TagClass)> {
    let dot = tag_path.rfind('.')?;
    let class = TagClass::from_extension(&tag_path[dot + 1..])?;
    Some((tag_path[..dot].to_owned(), class))
}

/// Match a path against a `*`/`?` pattern. Any separator matches any
/// separator, so patterns written with backslashes hit host paths too.
pub fn path_matches(path: &str, pattern: &str) -> bool {
    fn inner(path: &[char], pattern: &[char]) -> bool {
        match (pattern.first(), path.first()) {
            (None, None) => true,
            (None, Some(_)) => false,
            (Some(&'*'), _) => {
                let rest = {
                    let mut p = pattern;
                    while p.first() == Some(&'*') {
                        p = &p[1..];
                    }
                    p
                };
                if rest.is_empty() {
                    return true;
                }
                (0..=path.len()).any(|skip| inner(&path[skip..], rest))
            }
            (Some(_), None) => false,
            (Some(&pc), Some(&c)) => {
                let hit = pc == '?'
                    || pc == c
                    || (is_separator(pc) && is_separator(c));
                hit && inner(&path[1..], &pattern[1..])
            }
        }
    }
    let path: Vec<char> = path.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    inner(&path, &pattern)
}

/// Explicit build-wide options; no process globals.
#[derive(Clone, Debug)]
pub struct BuildContext {
    pub data: PathBuf,
    pub tags: PathBuf,
    pub verbose: bool,
}

impl BuildContext {
    pub fn new(data: PathBuf, tags: PathBuf) -> Self {
        Self {
            data,
            tags,
            verbose: false,
        }
    }

    /// Host path of a compiled tag: `<tags>/<logical>.<fourcc>`.
    pub fn tag_host_path(&self, tag_path: &str, class: TagClass) -> PathBuf {
        let mut p = self.tags.join(engine_path_to_host(tag_path));
        let name = format!(
            "{}.{}",
            p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
            class.extension()
        );
        p.set_file_name(name);
        p
    }

    /// Host path of a source asset, sans extension; loaders probe from here.
    pub fn data_host_path(&self, tag_path: &str) -> PathBuf {
        self.data.join(engine_path_to_host(tag_path))
    }

    /// Lift a host path to a logical tag path by relativizing against the
    /// tags root, then the data root. No match yields None.
    pub fn host_path_to_tag_path(&self, host_path: &Path) -> Option<String> {
        for root in [&self.tags, &self.data] {
            if let Ok(relative) = host_path.strip_prefix(root) {
                return Some(host_path_to_engine(&relative.to_string_lossy()));
            }
        }
        None
    }
}

/// Shared progress counter a GUI worker may poll during discovery.
#[derive(Default)]
pub struct TagScanProgress {
    counter: Mutex<usize>,
}

impl TagScanProgress {
    pub fn add(&self, found: usize) {
        *self.counter.lock().expect("progress lock poisoned") += found;
    }

    pub fn found(&self) -> usize {
        *self.counter.lock().expect("progress lock poisoned")
    }
}

#[derive(Clone, Debug)]
pub struct TagFileEntry {
    pub host_path: PathBuf,
    pub tag_path: String,
    pub class: TagClass,
    /// Index of the root the entry came from.
    pub root: usize,
}

/// Walk each root and index every recognized tag file. Unreadable
/// directories are counted, not fatal; the walk continues past them.
pub fn discover_tags(
    roots: &[PathBuf],
    progress: Option<&TagScanProgress>,
) -> (Vec<TagFileEntry>, usize) {
    let mut entries = Vec::new();
    let mut errors = 0;
    for (root_index, root) in roots.iter().enumerate() {
        scan_directory(
            root,
            root,
            root_index,
            0,
            progress,
            &mut entries,
            &mut errors,
        );
    }
    (entries, errors)
}

fn scan_directory(
    dir: &Path,
    root: &Path,
    root_index: usize,
    depth: usize,
    progress: Option<&TagScanProgress>,
    entries: &mut Vec<TagFileEntry>,
    errors: &mut usize,
) {
    if depth == MAX_SCAN_DEPTH {
        return;
    }
    let listing = match fs::read_dir(dir) {
        Ok(listing) => listing,
        Err(e) => {
            trace!("discovery: cannot list {}: {}", dir.display(), e);
            *errors += 1;
            return;
        }
    };
    let mut found = 0;
    for item in listing {
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                trace!("discovery: bad entry under {}: {}", dir.display(), e);
                *errors += 1;
                continue;
            }
        };
        let path = item.path();
        if path.is_dir() {
            scan_directory(&path, root, root_index, depth + 1, progress, entries, errors);
            continue;
        }
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let Some(class) = TagClass::from_extension(extension) else {
            continue;
        };
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let logical = host_path_to_engine(&relative.with_extension("").to_string_lossy());
        entries.push(TagFileEntry {
            host_path: path,
            tag_path: logical,
            class,
            root: root_index,
        });
        found += 1;
    }
    if found > 0 {
        if let Some(progress) = progress {
            progress.add(found);
        }
    }
}

/// Read a whole file, with the failing path in the error.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))
}

/// Write a file atomically: stage next to the target, then rename into
/// place, so a failed build never leaves a partial tag behind.
pub fn write_file_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let staged = path.with_extension("partial");
    fs::write(&staged, bytes)
        .map_err(|e| anyhow::anyhow!("cannot write {}: {}", staged.display(), e))?;
    fs::rename(&staged, path)
        .map_err(|e| anyhow::anyhow!("cannot move into place {}: {}", path.display(), e))?;
    Ok(())
}
