use num_derive::FromPrimitive;

/// Texture filter, numerically equal to `D3D11_FILTER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromPrimitive)]
#[repr(u32)]
pub enum FilterMode {
    #[default]
    MinMagMipPoint = 0,
    MinMagPointMipLinear = 0x1,
    MinPointMagLinearMipPoint = 0x4,
    MinPointMagMipLinear = 0x5,
    MinLinearMagMipPoint = 0x10,
    MinLinearMagPointMipLinear = 0x11,
    MinMagLinearMipPoint = 0x14,
    MinMagMipLinear = 0x15,
    Anisotropic = 0x55,
    CompareMinMagMipPoint = 0x80,
    CompareMinMagPointMipLinear = 0x81,
    CompareMinPointMagLinearMipPoint = 0x84,
    CompareMinPointMagMipLinear = 0x85,
    CompareMinLinearMagMipPoint = 0x90,
    CompareMinLinearMagPointMipLinear = 0x91,
    CompareMinMagLinearMipPoint = 0x94,
    CompareMinMagMipLinear = 0x95,
    CompareAnisotropic = 0xd5,
}

impl FilterMode {
    pub const fn min_linear(self) -> bool {
        self as u32 & 0x10 != 0
    }

    pub const fn mag_linear(self) -> bool {
        self as u32 & 0x4 != 0
    }

    pub const fn mip_linear(self) -> bool {
        self as u32 & 0x1 != 0
    }

    pub const fn is_anisotropic(self) -> bool {
        self as u32 & 0x40 != 0
    }

    pub const fn is_compare(self) -> bool {
        self as u32 & 0x80 != 0
    }

    /// Rebuilds a filter from its components.
    pub fn from_parts(min: bool, mag: bool, mip: bool, anisotropic: bool, compare: bool) -> Self {
        use num_traits::FromPrimitive;

        let mut bits = if anisotropic {
            0x55
        } else {
            (min as u32) << 4 | (mag as u32) << 2 | mip as u32
        };
        if compare {
            bits |= 0x80;
        }

        Self::from_u32(bits).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromPrimitive)]
#[repr(u32)]
pub enum TextureAddressMode {
    #[default]
    Wrap = 1,
    Mirror = 2,
    Clamp = 3,
    Border = 4,
    MirrorOnce = 5,
}

/// Comparison function, numerically equal to `D3D11_COMPARISON_FUNC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromPrimitive)]
#[repr(u32)]
pub enum CompareOp {
    Never = 1,
    Less = 2,
    Equal = 3,
    LessEqual = 4,
    Greater = 5,
    NotEqual = 6,
    GreaterEqual = 7,
    #[default]
    Always = 8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub filter: FilterMode,
    pub address_u: TextureAddressMode,
    pub address_v: TextureAddressMode,
    pub address_w: TextureAddressMode,
    pub mip_lod_bias: f32,
    pub max_anisotropy: f32,
    pub compare_op: CompareOp,
    pub border_color: [f32; 4],
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: FilterMode::MinMagMipLinear,
            address_u: TextureAddressMode::Clamp,
            address_v: TextureAddressMode::Clamp,
            address_w: TextureAddressMode::Clamp,
            mip_lod_bias: 0.0,
            max_anisotropy: 1.0,
            compare_op: CompareOp::Always,
            border_color: [0.0; 4],
            min_lod: -f32::MAX,
            max_lod: f32::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FilterMode;

    #[test]
    fn filter_parts() {
        let filter = FilterMode::MinLinearMagPointMipLinear;
        assert!(filter.min_linear());
        assert!(!filter.mag_linear());
        assert!(filter.mip_linear());
        assert_eq!(
            FilterMode::from_parts(true, false, true, false, false),
            filter
        );
        assert_eq!(
            FilterMode::from_parts(false, false, false, true, true),
            FilterMode::CompareAnisotropic
        );
    }
}
