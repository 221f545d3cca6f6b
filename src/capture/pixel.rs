//! Native pixel format decoding
//!
//! The server describes its pixel layout at runtime with one bit-mask per
//! channel. Masks may sit anywhere in the sample and have any width, so the
//! shift is derived from the mask instead of assuming byte-aligned channels.

use std::fmt;

/// Pixel format errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormatError {
    /// A channel mask with no bits set
    EmptyMask,
}

impl fmt::Display for PixelFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormatError::EmptyMask => write!(f, "channel mask has no bits set"),
        }
    }
}

impl std::error::Error for PixelFormatError {}

/// One channel's bit-mask with its derived shift and width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMask {
    mask: u32,
    shift: u32,
    width: u32,
}

impl ChannelMask {
    pub fn new(mask: u32) -> Result<Self, PixelFormatError> {
        if mask == 0 {
            return Err(PixelFormatError::EmptyMask);
        }
        let shift = mask.trailing_zeros();
        let width = 32 - (mask >> shift).leading_zeros();
        Ok(Self { mask, shift, width })
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn shift(&self) -> u32 {
        self.shift
    }

    /// Bits between the lowest and highest set bit, inclusive
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Right-justified channel value truncated to its low 8 bits.
    ///
    /// Narrow fields come back unscaled, so a 5-bit channel tops out at 0x1f.
    #[inline]
    pub fn extract(&self, sample: u32) -> u8 {
        ((sample & self.mask) >> self.shift) as u8
    }
}

/// Red, green and blue masks of a visual
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub red: ChannelMask,
    pub green: ChannelMask,
    pub blue: ChannelMask,
}

impl PixelFormat {
    pub fn from_masks(red: u32, green: u32, blue: u32) -> Result<Self, PixelFormatError> {
        Ok(Self {
            red: ChannelMask::new(red)?,
            green: ChannelMask::new(green)?,
            blue: ChannelMask::new(blue)?,
        })
    }

    #[inline]
    pub fn decode(&self, sample: u32) -> [u8; 3] {
        [
            self.red.extract(sample),
            self.green.extract(sample),
            self.blue.extract(sample),
        ]
    }
}

/// Decode one raw sample against explicit channel masks
pub fn decode(
    sample: u32,
    red_mask: u32,
    green_mask: u32,
    blue_mask: u32,
) -> Result<[u8; 3], PixelFormatError> {
    Ok(PixelFormat::from_masks(red_mask, green_mask, blue_mask)?.decode(sample))
}
