// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::error::ImageError;

/// Value an erased NOR flash cell reads back as.
pub const ERASE_VALUE: u8 = 0xff;

/// An in-memory copy of the whole flash device.
///
/// Every byte starts out at the erase value; binaries are then programmed in
/// at their offsets with [`FlashImage::program`], which never writes outside
/// the bounds it is given.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlashImage {
    data: Vec<u8>,
}

impl FlashImage {
    pub fn new(size: usize, erase_value: u8) -> Self {
        Self {
            data: vec![erase_value; size],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Copies `data` into the image at `offset`.
    ///
    /// `limit` is the first byte the write may not touch, normally the start
    /// of the next region; it is clamped to the end of the image.  On
    /// overflow the image is left unmodified.
    pub fn program(
        &mut self,
        name: &str,
        offset: usize,
        data: &[u8],
        limit: usize,
    ) -> Result<(), ImageError> {
        let limit = limit.min(self.data.len());
        let overflow = || ImageError::BufferOverflow {
            name: name.to_string(),
            offset,
            len: data.len(),
            limit,
        };

        let end = offset.checked_add(data.len()).ok_or_else(overflow)?;
        if offset > limit || end > limit {
            return Err(overflow());
        }

        self.data[offset..end].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_erased() {
        let image = FlashImage::new(64, ERASE_VALUE);
        assert_eq!(image.len(), 64);
        assert!(image.as_bytes().iter().all(|&b| b == 0xff));

        let image = FlashImage::new(8, 0x00);
        assert_eq!(image.into_bytes(), vec![0; 8]);
    }

    #[test]
    fn program_in_bounds() {
        let mut image = FlashImage::new(16, ERASE_VALUE);
        image.program("blob", 4, &[1, 2, 3], 8).unwrap();

        let mut expected = vec![0xff; 16];
        expected[4..7].copy_from_slice(&[1, 2, 3]);
        assert_eq!(image.as_bytes(), &expected[..]);
    }

    #[test]
    fn program_fills_region_exactly() {
        let mut image = FlashImage::new(16, ERASE_VALUE);
        image.program("blob", 8, &[0xaa; 8], 16).unwrap();
        assert_eq!(&image.as_bytes()[8..], &[0xaa; 8]);
    }

    #[test]
    fn program_past_limit() {
        let mut image = FlashImage::new(16, ERASE_VALUE);
        let err = image.program("blob", 4, &[0; 5], 8).unwrap_err();
        assert_eq!(
            err,
            ImageError::BufferOverflow {
                name: "blob".to_string(),
                offset: 4,
                len: 5,
                limit: 8,
            }
        );
        // Nothing was written
        assert!(image.as_bytes().iter().all(|&b| b == 0xff));
    }

    #[test]
    fn limit_is_clamped_to_image() {
        let mut image = FlashImage::new(16, ERASE_VALUE);
        let err = image.program("blob", 12, &[0; 5], usize::MAX).unwrap_err();
        assert!(matches!(
            err,
            ImageError::BufferOverflow { limit: 16, .. }
        ));
    }

    #[test]
    fn empty_write_at_end() {
        let mut image = FlashImage::new(16, ERASE_VALUE);
        image.program("blob", 16, &[], 16).unwrap();
        assert!(image.program("blob", 17, &[], 32).is_err());
    }
}
