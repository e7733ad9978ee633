// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::config::ImageConfig;
use crate::image::FlashImage;

/// What happened to a single layout entry while composing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The binary was copied in; `len` bytes starting at the entry's offset
    /// now hold its contents.
    Inserted { len: usize },
    /// The binary was not there.  Its region keeps the erase value.
    SkippedMissing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    pub name: String,
    pub offset: usize,
    pub source: PathBuf,
    pub outcome: Outcome,
}

/// Builds the image in memory without writing anything.
///
/// Entries are visited in layout order.  A source file that does not exist
/// is skipped with a warning; any other read failure, or a binary that does
/// not fit its region, aborts the whole build.
pub fn build_image(cfg: &ImageConfig) -> Result<(FlashImage, Vec<Placement>)> {
    cfg.validate()?;

    let mut image = FlashImage::new(cfg.size, cfg.erase_value);
    let mut placements = Vec::with_capacity(cfg.layout.len());

    for (entry, region) in cfg.regions() {
        let source = cfg.source_path(entry);
        let outcome = match fs::read(&source) {
            Ok(data) => {
                image.program(&entry.name, entry.offset, &data, region.end)?;
                info!(
                    "inserted {} ({} bytes) at {:#x}",
                    source.display(),
                    data.len(),
                    entry.offset
                );
                Outcome::Inserted { len: data.len() }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("binary not found: {}", source.display());
                Outcome::SkippedMissing
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("could not read {}", source.display())
                });
            }
        };
        placements.push(Placement {
            name: entry.name.clone(),
            offset: entry.offset,
            source,
            outcome,
        });
    }

    Ok((image, placements))
}

/// Writes `image` to `dest`, replacing whatever was there.
///
/// The data goes to a `.partial` file next to `dest` first and is renamed
/// into place once complete, so `dest` is never left half-written.  If either
/// step fails the `.partial` file is removed again.
pub fn write_image(image: &FlashImage, dest: &Path) -> Result<()> {
    let mut tmp_path = dest.as_os_str().to_owned();
    tmp_path.push(".partial");
    let tmp_path = PathBuf::from(tmp_path);

    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("could not create {}", tmp_path.display()))?;
    let written = file
        .write_all(image.as_bytes())
        .and_then(|()| file.sync_all());
    drop(file);

    let result = written
        .with_context(|| format!("could not write {}", tmp_path.display()))
        .and_then(|()| {
            fs::rename(&tmp_path, dest).with_context(|| {
                format!("could not move image into place at {}", dest.display())
            })
        });
    if result.is_err() {
        // Best effort; the original error is the one worth reporting
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

/// Composes the flash image described by `cfg` and writes it to
/// `cfg.output`.
///
/// Returns one [`Placement`] per layout entry, in layout order.  On error
/// the output file is not touched.
pub fn compose(cfg: &ImageConfig) -> Result<Vec<Placement>> {
    let (image, placements) = build_image(cfg)?;
    write_image(&image, &cfg.output)?;
    info!("image written: {}", cfg.output.display());
    Ok(placements)
}
