// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::ImageError;
use crate::image::ERASE_VALUE;

/// Size of the flash device QEMU's ESP32 machine expects: 4 MiB.
pub const DEFAULT_FLASH_SIZE: usize = 4 * 1024 * 1024;

/// Largest flash part QEMU's ESP32 machine can be given: 16 MiB.
pub const MAX_FLASH_SIZE: usize = 16 * 1024 * 1024;

/// File name of the composed image, relative to the build directory.
pub const DEFAULT_OUTPUT: &str = "qemu_flash.bin";

/// A `RawConfig` represents a `flash.toml` file that has been deserialized,
/// but whose paths have not yet been resolved against a build directory.
///
/// The flash geometry is not configurable here; file-loaded images are always
/// [`DEFAULT_FLASH_SIZE`] bytes.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    output: Option<PathBuf>,
    #[serde(default)]
    erase_value: Option<u8>,
    layout: IndexMap<String, RawEntry>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawEntry {
    offset: usize,
    file: PathBuf,
}

/// One binary and the place it belongs in flash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutEntry {
    pub name: String,
    pub offset: usize,
    /// Source binary, relative to [`ImageConfig::input_dir`] unless absolute.
    pub file: PathBuf,
}

impl LayoutEntry {
    pub fn new(
        name: impl Into<String>,
        offset: usize,
        file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            offset,
            file: file.into(),
        }
    }
}

/// Everything needed to compose one flash image.
///
/// It should be trivial to construct and is never modified while an image is
/// being built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageConfig {
    /// Directory the layout's source binaries are read from
    pub input_dir: PathBuf,

    /// Where the finished image is written
    pub output: PathBuf,

    /// Binaries to place, in ascending offset order
    pub layout: Vec<LayoutEntry>,

    /// Byte used for every location no binary covers
    pub erase_value: u8,

    /// Total image size in bytes
    pub size: usize,
}

impl ImageConfig {
    /// The ESP32 boot layout: second-stage bootloader at `0x1000`, partition
    /// table at `0x8000` and the application at `0x10000`, as produced in an
    /// ESP-IDF / PlatformIO build directory.
    pub fn esp32_qemu(build_dir: &Path) -> Self {
        Self {
            input_dir: build_dir.to_path_buf(),
            output: build_dir.join(DEFAULT_OUTPUT),
            layout: vec![
                LayoutEntry::new("bootloader", 0x1000, "bootloader.bin"),
                LayoutEntry::new("partitions", 0x8000, "partitions.bin"),
                LayoutEntry::new("firmware", 0x10000, "firmware.bin"),
            ],
            erase_value: ERASE_VALUE,
            size: DEFAULT_FLASH_SIZE,
        }
    }

    /// Loads a `flash.toml` file.  Relative paths in it are taken relative to
    /// `build_dir`, not to the file itself.
    pub fn from_file(cfg: &Path, build_dir: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(cfg)
            .with_context(|| format!("could not read {}", cfg.display()))?;
        Self::from_toml(&text, build_dir)
            .with_context(|| format!("could not load {}", cfg.display()))
    }

    pub fn from_toml(text: &str, build_dir: &Path) -> Result<Self> {
        let raw: RawConfig = toml::from_str(text)?;

        let output = raw.output.unwrap_or_else(|| DEFAULT_OUTPUT.into());
        let layout = raw
            .layout
            .into_iter()
            .map(|(name, e)| LayoutEntry::new(name, e.offset, e.file))
            .collect();

        let config = Self {
            input_dir: build_dir.to_path_buf(),
            output: build_dir.join(output),
            layout,
            erase_value: raw.erase_value.unwrap_or(ERASE_VALUE),
            size: DEFAULT_FLASH_SIZE,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that the layout is usable: an image between one byte and
    /// [`MAX_FLASH_SIZE`], and entries that start inside it in strictly
    /// ascending order.  Whether the binaries fit
    /// can only be known once they are read.
    pub fn validate(&self) -> Result<(), ImageError> {
        if self.size == 0 {
            return Err(ImageError::EmptyImage);
        }
        if self.size > MAX_FLASH_SIZE {
            return Err(ImageError::ImageTooLarge {
                size: self.size,
                max: MAX_FLASH_SIZE,
            });
        }

        let mut prev: Option<&LayoutEntry> = None;
        for entry in &self.layout {
            if entry.offset >= self.size {
                return Err(ImageError::OffsetOutOfRange {
                    name: entry.name.clone(),
                    offset: entry.offset,
                    size: self.size,
                });
            }
            if let Some(p) = prev {
                if entry.offset <= p.offset {
                    return Err(ImageError::UnorderedLayout {
                        name: entry.name.clone(),
                        offset: entry.offset,
                        prev_name: p.name.clone(),
                        prev_offset: p.offset,
                    });
                }
            }
            prev = Some(entry);
        }
        Ok(())
    }

    /// Pairs each entry with the span of flash it may occupy, which runs up
    /// to the next entry or the end of the image.
    pub fn regions(
        &self,
    ) -> impl Iterator<Item = (&LayoutEntry, Range<usize>)> + '_ {
        self.layout.iter().enumerate().map(move |(i, entry)| {
            let end = self
                .layout
                .get(i + 1)
                .map(|next| next.offset)
                .unwrap_or(self.size);
            (entry, entry.offset..end)
        })
    }

    pub fn source_path(&self, entry: &LayoutEntry) -> PathBuf {
        self.input_dir.join(&entry.file)
    }
}
