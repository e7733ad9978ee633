// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Failures that are specific to laying out a flash image.
///
/// I/O failures are not represented here; they travel as `anyhow` errors with
/// the offending path attached as context.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ImageError {
    /// A binary would be written past the end of the image, or past the start
    /// of the next layout entry's region.
    #[error(
        "{name}: {len:#x} bytes at {offset:#x} overrun its region, \
         which ends at {limit:#x}"
    )]
    BufferOverflow {
        name: String,
        offset: usize,
        len: usize,
        limit: usize,
    },

    /// Layout entries must appear with strictly increasing offsets.
    #[error(
        "layout entry {name} at {offset:#x} does not follow \
         {prev_name} at {prev_offset:#x}"
    )]
    UnorderedLayout {
        name: String,
        offset: usize,
        prev_name: String,
        prev_offset: usize,
    },

    #[error(
        "layout entry {name} at {offset:#x} is outside a {size:#x}-byte image"
    )]
    OffsetOutOfRange {
        name: String,
        offset: usize,
        size: usize,
    },

    #[error("flash image size must be non-zero")]
    EmptyImage,

    #[error("flash image size {size:#x} exceeds the {max:#x}-byte maximum")]
    ImageTooLarge { size: usize, max: usize },
}
