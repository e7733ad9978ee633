// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Composes a flat flash image for QEMU out of separately built binaries
//!
//! An ESP32 firmware build produces a second-stage bootloader, a partition
//! table and the application as three loose files.  QEMU wants one file the
//! size of the flash chip, with each binary at its boot address and every
//! other byte erased.  [`compose`] builds that file from an [`ImageConfig`].
//!
//! Nothing is ever written outside a binary's region: a binary that would run
//! into the next region (or off the end of flash) fails the build with
//! [`ImageError::BufferOverflow`] instead of silently corrupting its
//! neighbour.

mod compose;
mod config;
mod error;
mod image;

pub use compose::{build_image, compose, write_image, Outcome, Placement};
pub use config::{
    ImageConfig, LayoutEntry, DEFAULT_FLASH_SIZE, DEFAULT_OUTPUT,
    MAX_FLASH_SIZE,
};
pub use error::ImageError;
pub use image::{FlashImage, ERASE_VALUE};
