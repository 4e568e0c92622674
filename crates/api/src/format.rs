//! Pixel formats.
//!
//! Discriminants follow the DXGI numbering. Formats only D3D9 knows about use
//! FourCC codes above the DXGI range.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromPrimitive)]
#[repr(u32)]
pub enum Format {
    #[default]
    Unknown = 0,

    R32G32B32A32Typeless = 1,
    R32G32B32A32Float = 2,
    R32G32B32A32Uint = 3,
    R32G32B32A32Sint = 4,

    R32G32B32Typeless = 5,
    R32G32B32Float = 6,
    R32G32B32Uint = 7,
    R32G32B32Sint = 8,

    R16G16B16A16Typeless = 9,
    R16G16B16A16Float = 10,
    R16G16B16A16Unorm = 11,
    R16G16B16A16Uint = 12,
    R16G16B16A16Snorm = 13,
    R16G16B16A16Sint = 14,

    R32G32Typeless = 15,
    R32G32Float = 16,
    R32G32Uint = 17,
    R32G32Sint = 18,

    R32G8Typeless = 19,
    D32FloatS8Uint = 20,
    R32FloatX8Uint = 21,
    X32FloatG8Uint = 22,

    R10G10B10A2Typeless = 23,
    R10G10B10A2Unorm = 24,
    R10G10B10A2Uint = 25,
    R11G11B10Float = 26,

    R8G8B8A8Typeless = 27,
    R8G8B8A8Unorm = 28,
    R8G8B8A8UnormSrgb = 29,
    R8G8B8A8Uint = 30,
    R8G8B8A8Snorm = 31,
    R8G8B8A8Sint = 32,

    R16G16Typeless = 33,
    R16G16Float = 34,
    R16G16Unorm = 35,
    R16G16Uint = 36,
    R16G16Snorm = 37,
    R16G16Sint = 38,

    R32Typeless = 39,
    D32Float = 40,
    R32Float = 41,
    R32Uint = 42,
    R32Sint = 43,

    R24G8Typeless = 44,
    D24UnormS8Uint = 45,
    R24UnormX8Uint = 46,
    X24UnormG8Uint = 47,

    R8G8Typeless = 48,
    R8G8Unorm = 49,
    R8G8Uint = 50,
    R8G8Snorm = 51,
    R8G8Sint = 52,

    R16Typeless = 53,
    R16Float = 54,
    D16Unorm = 55,
    R16Unorm = 56,
    R16Uint = 57,
    R16Snorm = 58,
    R16Sint = 59,

    R8Typeless = 60,
    R8Unorm = 61,
    R8Uint = 62,
    R8Snorm = 63,
    R8Sint = 64,
    A8Unorm = 65,
    R1Unorm = 66,

    R9G9B9E5 = 67,
    R8G8B8G8Unorm = 68,
    G8R8G8B8Unorm = 69,

    Bc1Typeless = 70,
    Bc1Unorm = 71,
    Bc1UnormSrgb = 72,
    Bc2Typeless = 73,
    Bc2Unorm = 74,
    Bc2UnormSrgb = 75,
    Bc3Typeless = 76,
    Bc3Unorm = 77,
    Bc3UnormSrgb = 78,
    Bc4Typeless = 79,
    Bc4Unorm = 80,
    Bc4Snorm = 81,
    Bc5Typeless = 82,
    Bc5Unorm = 83,
    Bc5Snorm = 84,

    B5G6R5Unorm = 85,
    B5G5R5A1Unorm = 86,
    B8G8R8A8Unorm = 87,
    B8G8R8X8Unorm = 88,
    R10G10B10XrBiasA2Unorm = 89,
    B8G8R8A8Typeless = 90,
    B8G8R8A8UnormSrgb = 91,
    B8G8R8X8Typeless = 92,
    B8G8R8X8UnormSrgb = 93,

    Bc6hTypeless = 94,
    Bc6hUf16 = 95,
    Bc6hSf16 = 96,
    Bc7Typeless = 97,
    Bc7Unorm = 98,
    Bc7UnormSrgb = 99,

    B4G4R4A4Unorm = 115,

    // FourCC, D3D9 only
    L8Unorm = 0x3030_384C,
    L8A8Unorm = 0x3038_414C,
    L16Unorm = 0x3036_314C,
    Intz = 0x5A54_4E49,
}

impl Format {
    pub fn from_raw(raw: u32) -> Self {
        Self::from_u32(raw).unwrap_or(Self::Unknown)
    }

    /// The typeless member of this format's family.
    ///
    /// Views may only reinterpret a resource within the same family.
    pub const fn typeless(self) -> Self {
        use Format::*;

        match self {
            R32G32B32A32Float | R32G32B32A32Uint | R32G32B32A32Sint => R32G32B32A32Typeless,
            R32G32B32Float | R32G32B32Uint | R32G32B32Sint => R32G32B32Typeless,
            R16G16B16A16Float | R16G16B16A16Unorm | R16G16B16A16Uint | R16G16B16A16Snorm
            | R16G16B16A16Sint => R16G16B16A16Typeless,
            R32G32Float | R32G32Uint | R32G32Sint => R32G32Typeless,
            D32FloatS8Uint | R32FloatX8Uint | X32FloatG8Uint => R32G8Typeless,
            R10G10B10A2Unorm | R10G10B10A2Uint => R10G10B10A2Typeless,
            R8G8B8A8Unorm | R8G8B8A8UnormSrgb | R8G8B8A8Uint | R8G8B8A8Snorm | R8G8B8A8Sint => {
                R8G8B8A8Typeless
            }
            R16G16Float | R16G16Unorm | R16G16Uint | R16G16Snorm | R16G16Sint => R16G16Typeless,
            D32Float | R32Float | R32Uint | R32Sint => R32Typeless,
            D24UnormS8Uint | R24UnormX8Uint | X24UnormG8Uint | Intz => R24G8Typeless,
            R8G8Unorm | R8G8Uint | R8G8Snorm | R8G8Sint => R8G8Typeless,
            R16Float | D16Unorm | R16Unorm | R16Uint | R16Snorm | R16Sint => R16Typeless,
            R8Unorm | R8Uint | R8Snorm | R8Sint => R8Typeless,
            Bc1Unorm | Bc1UnormSrgb => Bc1Typeless,
            Bc2Unorm | Bc2UnormSrgb => Bc2Typeless,
            Bc3Unorm | Bc3UnormSrgb => Bc3Typeless,
            Bc4Unorm | Bc4Snorm => Bc4Typeless,
            Bc5Unorm | Bc5Snorm => Bc5Typeless,
            B8G8R8A8Unorm | B8G8R8A8UnormSrgb => B8G8R8A8Typeless,
            B8G8R8X8Unorm | B8G8R8X8UnormSrgb => B8G8R8X8Typeless,
            Bc6hUf16 | Bc6hSf16 => Bc6hTypeless,
            Bc7Unorm | Bc7UnormSrgb => Bc7Typeless,
            other => other,
        }
    }

    /// The linear typed format a typeless or sRGB format is usually viewed as.
    pub const fn default_typed(self) -> Self {
        use Format::*;

        match self {
            R32G32B32A32Typeless => R32G32B32A32Float,
            R32G32B32Typeless => R32G32B32Float,
            R16G16B16A16Typeless => R16G16B16A16Float,
            R32G32Typeless => R32G32Float,
            R32G8Typeless => D32FloatS8Uint,
            R10G10B10A2Typeless => R10G10B10A2Unorm,
            R8G8B8A8Typeless | R8G8B8A8UnormSrgb => R8G8B8A8Unorm,
            R16G16Typeless => R16G16Float,
            R32Typeless => R32Float,
            R24G8Typeless => D24UnormS8Uint,
            R8G8Typeless => R8G8Unorm,
            R16Typeless => R16Float,
            R8Typeless => R8Unorm,
            Bc1Typeless | Bc1UnormSrgb => Bc1Unorm,
            Bc2Typeless | Bc2UnormSrgb => Bc2Unorm,
            Bc3Typeless | Bc3UnormSrgb => Bc3Unorm,
            Bc4Typeless => Bc4Unorm,
            Bc5Typeless => Bc5Unorm,
            B8G8R8A8Typeless | B8G8R8A8UnormSrgb => B8G8R8A8Unorm,
            B8G8R8X8Typeless | B8G8R8X8UnormSrgb => B8G8R8X8Unorm,
            Bc6hTypeless => Bc6hUf16,
            Bc7Typeless | Bc7UnormSrgb => Bc7Unorm,
            other => other,
        }
    }

    /// The sRGB variant of [`Format::default_typed`], or the same format if no sRGB variant exists.
    pub const fn default_typed_srgb(self) -> Self {
        use Format::*;

        match self.default_typed() {
            R8G8B8A8Unorm => R8G8B8A8UnormSrgb,
            Bc1Unorm => Bc1UnormSrgb,
            Bc2Unorm => Bc2UnormSrgb,
            Bc3Unorm => Bc3UnormSrgb,
            B8G8R8A8Unorm => B8G8R8A8UnormSrgb,
            B8G8R8X8Unorm => B8G8R8X8UnormSrgb,
            Bc7Unorm => Bc7UnormSrgb,
            other => other,
        }
    }

    pub const fn is_typeless(self) -> bool {
        use Format::*;

        matches!(
            self,
            R32G32B32A32Typeless
                | R32G32B32Typeless
                | R16G16B16A16Typeless
                | R32G32Typeless
                | R32G8Typeless
                | R10G10B10A2Typeless
                | R8G8B8A8Typeless
                | R16G16Typeless
                | R32Typeless
                | R24G8Typeless
                | R8G8Typeless
                | R16Typeless
                | R8Typeless
                | Bc1Typeless
                | Bc2Typeless
                | Bc3Typeless
                | Bc4Typeless
                | Bc5Typeless
                | B8G8R8A8Typeless
                | B8G8R8X8Typeless
                | Bc6hTypeless
                | Bc7Typeless
        )
    }

    pub const fn is_srgb(self) -> bool {
        use Format::*;

        matches!(
            self,
            R8G8B8A8UnormSrgb
                | Bc1UnormSrgb
                | Bc2UnormSrgb
                | Bc3UnormSrgb
                | B8G8R8A8UnormSrgb
                | B8G8R8X8UnormSrgb
                | Bc7UnormSrgb
        )
    }

    pub const fn is_depth_stencil(self) -> bool {
        use Format::*;

        matches!(
            self,
            D32FloatS8Uint | D32Float | D24UnormS8Uint | D16Unorm | Intz
        )
    }

    pub const fn has_stencil(self) -> bool {
        matches!(self, Self::D32FloatS8Uint | Self::D24UnormS8Uint | Self::Intz)
    }

    pub const fn is_compressed(self) -> bool {
        self.block_size() > 0
    }

    /// Bytes per 4x4 block for block compressed formats, `0` otherwise.
    const fn block_size(self) -> u32 {
        use Format::*;

        match self {
            Bc1Typeless | Bc1Unorm | Bc1UnormSrgb | Bc4Typeless | Bc4Unorm | Bc4Snorm => 8,
            Bc2Typeless | Bc2Unorm | Bc2UnormSrgb | Bc3Typeless | Bc3Unorm | Bc3UnormSrgb
            | Bc5Typeless | Bc5Unorm | Bc5Snorm | Bc6hTypeless | Bc6hUf16 | Bc6hSf16
            | Bc7Typeless | Bc7Unorm | Bc7UnormSrgb => 16,
            _ => 0,
        }
    }

    /// Bytes per pixel for uncompressed formats, `0` for unknown or compressed ones.
    pub const fn bytes_per_pixel(self) -> u32 {
        use Format::*;

        match self {
            R32G32B32A32Typeless | R32G32B32A32Float | R32G32B32A32Uint | R32G32B32A32Sint => 16,
            R32G32B32Typeless | R32G32B32Float | R32G32B32Uint | R32G32B32Sint => 12,
            R16G16B16A16Typeless | R16G16B16A16Float | R16G16B16A16Unorm | R16G16B16A16Uint
            | R16G16B16A16Snorm | R16G16B16A16Sint | R32G32Typeless | R32G32Float
            | R32G32Uint | R32G32Sint | R32G8Typeless | D32FloatS8Uint | R32FloatX8Uint
            | X32FloatG8Uint => 8,
            R8G8Typeless | R8G8Unorm | R8G8Uint | R8G8Snorm | R8G8Sint | R16Typeless
            | R16Float | D16Unorm | R16Unorm | R16Uint | R16Snorm | R16Sint | B5G6R5Unorm
            | B5G5R5A1Unorm | B4G4R4A4Unorm | L8A8Unorm | L16Unorm => 2,
            R8Typeless | R8Unorm | R8Uint | R8Snorm | R8Sint | A8Unorm | R1Unorm | L8Unorm => 1,
            Unknown => 0,
            _ if self.is_compressed() => 0,
            _ => 4,
        }
    }

    /// Bytes between two rows of pixels (or blocks) of the given width.
    pub const fn row_pitch(self, width: u32) -> u32 {
        let block = self.block_size();
        if block > 0 {
            width.div_ceil(4) * block
        } else {
            width * self.bytes_per_pixel()
        }
    }

    /// Bytes of one depth slice with the given row pitch.
    pub const fn slice_pitch(self, row_pitch: u32, height: u32) -> u32 {
        if self.is_compressed() {
            row_pitch * height.div_ceil(4)
        } else {
            row_pitch * height
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Format;

    #[test]
    fn srgb_pairs() {
        assert_eq!(Format::B8G8R8A8Unorm.default_typed(), Format::B8G8R8A8Unorm);
        assert_eq!(
            Format::B8G8R8A8Unorm.default_typed_srgb(),
            Format::B8G8R8A8UnormSrgb
        );
        assert_eq!(Format::R8G8B8A8UnormSrgb.default_typed(), Format::R8G8B8A8Unorm);
        assert_eq!(
            Format::R16G16B16A16Float.default_typed_srgb(),
            Format::R16G16B16A16Float
        );
    }

    #[test]
    fn families() {
        assert_eq!(Format::D24UnormS8Uint.typeless(), Format::R24G8Typeless);
        assert_eq!(Format::R8G8B8A8UnormSrgb.typeless(), Format::R8G8B8A8Typeless);
        assert!(Format::R32Typeless.is_typeless());
        assert!(!Format::R32Float.is_typeless());
        assert!(!Format::Unknown.is_typeless());
    }

    #[test]
    fn pitches() {
        assert_eq!(Format::R8G8B8A8Unorm.row_pitch(256), 1024);
        assert_eq!(Format::Bc1Unorm.row_pitch(10), 24);
        assert_eq!(Format::Bc1Unorm.slice_pitch(24, 10), 72);
        assert_eq!(Format::from_raw(87), Format::B8G8R8A8Unorm);
        assert_eq!(Format::from_raw(1234), Format::Unknown);
    }
}
