//! Pipeline descriptions and fixed-function state.
//!
//! D3D9 through D3D11 create shader stages and state blocks one by one while Vulkan bakes
//! them into a single object, so [`PipelineDesc`] covers both the full pipelines and
//! each partial state object.

use bitflags::bitflags;
use num_derive::FromPrimitive;

use crate::{Format, Resource, ResourceView, sampler::CompareOp};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStage: u32 {
        const VERTEX = 0x1;
        const HULL = 0x2;
        const DOMAIN = 0x4;
        const GEOMETRY = 0x8;
        const PIXEL = 0x10;
        const COMPUTE = 0x20;
        const ALL_GRAPHICS = 0x1f;
        const ALL = 0x7fff_ffff;
    }
}

bitflags! {
    /// Pipeline stages a pipeline object is bound to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineStage: u32 {
        const INPUT_ASSEMBLER = 0x2;
        const VERTEX_SHADER = 0x8;
        const HULL_SHADER = 0x10;
        const DOMAIN_SHADER = 0x20;
        const GEOMETRY_SHADER = 0x40;
        const PIXEL_SHADER = 0x80;
        const RASTERIZER = 0x100;
        const DEPTH_STENCIL = 0x200;
        const OUTPUT_MERGER = 0x400;
        const COMPUTE_SHADER = 0x800;
        const ALL_SHADER_STAGES = 0x8f8;
        const ALL_GRAPHICS = 0x7fe;
        const ALL = 0x7fff_ffff;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineType {
    Compute,
    Graphics,
    VertexShader,
    HullShader,
    DomainShader,
    GeometryShader,
    PixelShader,
    InputLayout,
    BlendState,
    RasterizerState,
    DepthStencilState,
}

impl PipelineType {
    /// Pipeline stages an object of this type binds to.
    pub const fn stages(self) -> PipelineStage {
        match self {
            Self::Compute => PipelineStage::COMPUTE_SHADER,
            Self::Graphics => PipelineStage::ALL_GRAPHICS,
            Self::VertexShader => PipelineStage::VERTEX_SHADER,
            Self::HullShader => PipelineStage::HULL_SHADER,
            Self::DomainShader => PipelineStage::DOMAIN_SHADER,
            Self::GeometryShader => PipelineStage::GEOMETRY_SHADER,
            Self::PixelShader => PipelineStage::PIXEL_SHADER,
            Self::InputLayout => PipelineStage::INPUT_ASSEMBLER,
            Self::BlendState => PipelineStage::OUTPUT_MERGER,
            Self::RasterizerState => PipelineStage::RASTERIZER,
            Self::DepthStencilState => PipelineStage::DEPTH_STENCIL,
        }
    }
}

/// Render and pipeline states that can be set on a command list directly.
///
/// Values below 1000 equal the matching `D3DRENDERSTATETYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u32)]
pub enum PipelineState {
    Unknown = 0,
    DepthTest = 7,
    FillMode = 8,
    DepthWriteMask = 14,
    AlphaTest = 15,
    SrcColorBlendFactor = 19,
    DstColorBlendFactor = 20,
    CullMode = 22,
    DepthFunc = 23,
    AlphaReferenceValue = 24,
    AlphaFunc = 25,
    BlendEnable = 27,
    StencilTest = 52,
    FrontStencilFail = 53,
    FrontStencilDepthFail = 54,
    FrontStencilPass = 55,
    FrontStencilFunc = 56,
    StencilReferenceValue = 57,
    StencilReadMask = 58,
    StencilWriteMask = 59,
    DepthClip = 136,
    Multisample = 161,
    SampleMask = 162,
    RenderTargetWriteMask = 168,
    ColorBlendOp = 171,
    DepthBiasSlopeScaled = 175,
    ScissorTest = 174,
    AntialiasedLine = 176,
    BackStencilFail = 186,
    BackStencilDepthFail = 187,
    BackStencilPass = 188,
    BackStencilFunc = 189,
    BlendConstant = 193,
    SrgbWrite = 194,
    DepthBias = 195,
    SrcAlphaBlendFactor = 207,
    DstAlphaBlendFactor = 208,
    AlphaBlendOp = 209,

    PrimitiveTopology = 1000,
    FrontCounterClockwise = 1001,
    DepthBiasClamp = 1002,
    AlphaToCoverage = 1003,
    LogicOp = 1004,
    Viewport = 1005,
    Scissor = 1006,
}

impl PipelineState {
    /// State with the numeric value `raw`, `None` for values outside the unified model.
    pub fn from_raw(raw: u32) -> Option<Self> {
        use num_traits::FromPrimitive;

        Self::from_u32(raw).filter(|state| *state != Self::Unknown)
    }
}

/// States a pipeline leaves to be set by the command list.
pub type DynamicState = PipelineState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromPrimitive)]
#[repr(u32)]
pub enum FillMode {
    #[default]
    Solid = 0,
    Wireframe = 1,
    Point = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromPrimitive)]
#[repr(u32)]
pub enum CullMode {
    None = 0,
    Front = 1,
    #[default]
    Back = 2,
    FrontAndBack = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromPrimitive)]
#[repr(u32)]
pub enum LogicOp {
    Clear = 0,
    And = 1,
    AndReverse = 2,
    #[default]
    Copy = 3,
    AndInverted = 4,
    Noop = 5,
    Xor = 6,
    Or = 7,
    Nor = 8,
    Equivalent = 9,
    Invert = 10,
    OrReverse = 11,
    CopyInverted = 12,
    OrInverted = 13,
    Nand = 14,
    Set = 15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromPrimitive)]
#[repr(u32)]
pub enum BlendOp {
    #[default]
    Add = 0,
    Subtract = 1,
    ReverseSubtract = 2,
    Min = 3,
    Max = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromPrimitive)]
#[repr(u32)]
pub enum BlendFactor {
    #[default]
    Zero = 0,
    One = 1,
    SourceColor = 2,
    OneMinusSourceColor = 3,
    DestColor = 4,
    OneMinusDestColor = 5,
    SourceAlpha = 6,
    OneMinusSourceAlpha = 7,
    DestAlpha = 8,
    OneMinusDestAlpha = 9,
    ConstantColor = 10,
    OneMinusConstantColor = 11,
    ConstantAlpha = 12,
    OneMinusConstantAlpha = 13,
    SourceAlphaSaturate = 14,
    Source1Color = 15,
    OneMinusSource1Color = 16,
    Source1Alpha = 17,
    OneMinusSource1Alpha = 18,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromPrimitive)]
#[repr(u32)]
pub enum StencilOp {
    #[default]
    Keep = 0,
    Zero = 1,
    Replace = 2,
    IncrementSaturate = 3,
    DecrementSaturate = 4,
    Invert = 5,
    Increment = 6,
    Decrement = 7,
}

/// Primitive topology, numerically equal to `D3D_PRIMITIVE_TOPOLOGY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    #[default]
    Undefined,
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    TriangleFan,
    LineListAdj,
    LineStripAdj,
    TriangleListAdj,
    TriangleStripAdj,
    /// Patch list with 1 to 32 control points.
    PatchList(u8),
}

impl PrimitiveTopology {
    pub const fn to_raw(self) -> u32 {
        match self {
            Self::Undefined => 0,
            Self::PointList => 1,
            Self::LineList => 2,
            Self::LineStrip => 3,
            Self::TriangleList => 4,
            Self::TriangleStrip => 5,
            Self::TriangleFan => 6,
            Self::LineListAdj => 10,
            Self::LineStripAdj => 11,
            Self::TriangleListAdj => 12,
            Self::TriangleStripAdj => 13,
            Self::PatchList(points) => 32 + points as u32,
        }
    }

    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::PointList,
            2 => Self::LineList,
            3 => Self::LineStrip,
            4 => Self::TriangleList,
            5 => Self::TriangleStrip,
            6 => Self::TriangleFan,
            10 => Self::LineListAdj,
            11 => Self::LineStripAdj,
            12 => Self::TriangleListAdj,
            13 => Self::TriangleStripAdj,
            33..=64 => Self::PatchList((raw - 32) as u8),
            _ => Self::Undefined,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShaderDesc<'a> {
    pub code: &'a [u8],
    pub entry_point: Option<&'a str>,
}

impl<'a> ShaderDesc<'a> {
    pub const fn new(code: &'a [u8]) -> Self {
        Self {
            code,
            entry_point: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InputElement<'a> {
    pub location: u32,
    pub semantic: &'a str,
    pub semantic_index: u32,
    pub format: Format,
    pub buffer_binding: u32,
    pub offset: u32,
    pub stride: u32,
    /// `0` for per-vertex data.
    pub instance_step_rate: u32,
}

pub const MAX_INPUT_ELEMENTS: usize = 16;
pub const MAX_RENDER_TARGETS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendDesc {
    pub alpha_to_coverage_enable: bool,
    pub blend_enable: [bool; MAX_RENDER_TARGETS],
    pub logic_op_enable: [bool; MAX_RENDER_TARGETS],
    pub source_color_blend_factor: [BlendFactor; MAX_RENDER_TARGETS],
    pub dest_color_blend_factor: [BlendFactor; MAX_RENDER_TARGETS],
    pub color_blend_op: [BlendOp; MAX_RENDER_TARGETS],
    pub source_alpha_blend_factor: [BlendFactor; MAX_RENDER_TARGETS],
    pub dest_alpha_blend_factor: [BlendFactor; MAX_RENDER_TARGETS],
    pub alpha_blend_op: [BlendOp; MAX_RENDER_TARGETS],
    pub logic_op: [LogicOp; MAX_RENDER_TARGETS],
    /// Packed RGBA8.
    pub blend_constant: u32,
    pub render_target_write_mask: [u8; MAX_RENDER_TARGETS],
}

impl Default for BlendDesc {
    fn default() -> Self {
        Self {
            alpha_to_coverage_enable: false,
            blend_enable: [false; MAX_RENDER_TARGETS],
            logic_op_enable: [false; MAX_RENDER_TARGETS],
            source_color_blend_factor: [BlendFactor::One; MAX_RENDER_TARGETS],
            dest_color_blend_factor: [BlendFactor::Zero; MAX_RENDER_TARGETS],
            color_blend_op: [BlendOp::Add; MAX_RENDER_TARGETS],
            source_alpha_blend_factor: [BlendFactor::One; MAX_RENDER_TARGETS],
            dest_alpha_blend_factor: [BlendFactor::Zero; MAX_RENDER_TARGETS],
            alpha_blend_op: [BlendOp::Add; MAX_RENDER_TARGETS],
            logic_op: [LogicOp::Copy; MAX_RENDER_TARGETS],
            blend_constant: 0xffff_ffff,
            render_target_write_mask: [0xf; MAX_RENDER_TARGETS],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerDesc {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_counter_clockwise: bool,
    pub depth_bias: f32,
    pub depth_bias_clamp: f32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clip_enable: bool,
    pub scissor_enable: bool,
    pub multisample_enable: bool,
    pub antialiased_line_enable: bool,
}

impl Default for RasterizerDesc {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::Back,
            front_counter_clockwise: false,
            depth_bias: 0.0,
            depth_bias_clamp: 0.0,
            slope_scaled_depth_bias: 0.0,
            depth_clip_enable: true,
            scissor_enable: false,
            multisample_enable: false,
            antialiased_line_enable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFace {
    pub fail_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub func: CompareOp,
}

impl Default for StencilFace {
    fn default() -> Self {
        Self {
            fail_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            func: CompareOp::Always,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilDesc {
    pub depth_enable: bool,
    pub depth_write_mask: bool,
    pub depth_func: CompareOp,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub stencil_reference_value: u8,
    pub front: StencilFace,
    pub back: StencilFace,
}

impl Default for DepthStencilDesc {
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write_mask: true,
            depth_func: CompareOp::Less,
            stencil_enable: false,
            stencil_read_mask: 0xff,
            stencil_write_mask: 0xff,
            stencil_reference_value: 0,
            front: StencilFace::default(),
            back: StencilFace::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsDesc<'a> {
    pub vertex_shader: Option<ShaderDesc<'a>>,
    pub hull_shader: Option<ShaderDesc<'a>>,
    pub domain_shader: Option<ShaderDesc<'a>>,
    pub geometry_shader: Option<ShaderDesc<'a>>,
    pub pixel_shader: Option<ShaderDesc<'a>>,
    pub input_layout: Vec<InputElement<'a>>,
    pub blend_state: BlendDesc,
    pub rasterizer_state: RasterizerDesc,
    pub depth_stencil_state: DepthStencilDesc,
    pub topology: PrimitiveTopology,
    pub sample_mask: u32,
    pub sample_count: u32,
    pub viewport_count: u32,
    pub render_target_formats: [Format; MAX_RENDER_TARGETS],
    pub depth_stencil_format: Format,
    pub dynamic_states: Vec<DynamicState>,
}

impl Default for GraphicsDesc<'_> {
    fn default() -> Self {
        Self {
            vertex_shader: None,
            hull_shader: None,
            domain_shader: None,
            geometry_shader: None,
            pixel_shader: None,
            input_layout: Vec::new(),
            blend_state: BlendDesc::default(),
            rasterizer_state: RasterizerDesc::default(),
            depth_stencil_state: DepthStencilDesc::default(),
            topology: PrimitiveTopology::TriangleList,
            sample_mask: u32::MAX,
            sample_count: 1,
            viewport_count: 1,
            render_target_formats: [Format::Unknown; MAX_RENDER_TARGETS],
            depth_stencil_format: Format::Unknown,
            dynamic_states: Vec::new(),
        }
    }
}

impl GraphicsDesc<'_> {
    pub fn render_target_count(&self) -> usize {
        self.render_target_formats
            .iter()
            .take_while(|format| **format != Format::Unknown)
            .count()
    }
}

/// A full pipeline or one partial state object.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineDesc<'a> {
    Compute(ShaderDesc<'a>),
    Graphics(Box<GraphicsDesc<'a>>),
    VertexShader(ShaderDesc<'a>),
    HullShader(ShaderDesc<'a>),
    DomainShader(ShaderDesc<'a>),
    GeometryShader(ShaderDesc<'a>),
    PixelShader(ShaderDesc<'a>),
    InputLayout(Vec<InputElement<'a>>),
    BlendState(BlendDesc),
    RasterizerState(RasterizerDesc),
    DepthStencilState(DepthStencilDesc),
}

impl PipelineDesc<'_> {
    pub const fn ty(&self) -> PipelineType {
        match self {
            Self::Compute(_) => PipelineType::Compute,
            Self::Graphics(_) => PipelineType::Graphics,
            Self::VertexShader(_) => PipelineType::VertexShader,
            Self::HullShader(_) => PipelineType::HullShader,
            Self::DomainShader(_) => PipelineType::DomainShader,
            Self::GeometryShader(_) => PipelineType::GeometryShader,
            Self::PixelShader(_) => PipelineType::PixelShader,
            Self::InputLayout(_) => PipelineType::InputLayout,
            Self::BlendState(_) => PipelineType::BlendState,
            Self::RasterizerState(_) => PipelineType::RasterizerState,
            Self::DepthStencilState(_) => PipelineType::DepthStencilState,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn width(&self) -> u32 {
        (self.right - self.left) as u32
    }

    pub const fn height(&self) -> u32 {
        (self.bottom - self.top) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadOp {
    #[default]
    Load,
    Clear,
    Discard,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    #[default]
    Store,
    Discard,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderPassRenderTarget {
    pub view: ResourceView,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_color: [f32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderPassDepthStencil {
    pub view: ResourceView,
    pub depth_load_op: LoadOp,
    pub depth_store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub clear_depth: f32,
    pub clear_stencil: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndirectCommand {
    Draw,
    DrawIndexed,
    Dispatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromPrimitive)]
#[repr(u32)]
pub enum QueryType {
    #[default]
    Occlusion = 0,
    BinaryOcclusion = 1,
    Timestamp = 2,
    PipelineStatistics = 3,
}

/// A buffer bound as vertex or index input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferBinding {
    pub buffer: Resource,
    pub offset: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_desc_tag() {
        let code = [0u8; 4];
        assert_eq!(
            PipelineDesc::PixelShader(ShaderDesc::new(&code)).ty(),
            PipelineType::PixelShader
        );

        let graphics = PipelineDesc::Graphics(Box::default());
        assert_eq!(graphics.ty(), PipelineType::Graphics);
        assert_eq!(graphics.ty().stages(), PipelineStage::ALL_GRAPHICS);
    }

    #[test]
    fn topology_raw() {
        assert_eq!(PrimitiveTopology::from_raw(4), PrimitiveTopology::TriangleList);
        assert_eq!(PrimitiveTopology::PatchList(3).to_raw(), 35);
        assert_eq!(PrimitiveTopology::from_raw(64), PrimitiveTopology::PatchList(32));
        assert_eq!(PrimitiveTopology::from_raw(7), PrimitiveTopology::Undefined);
    }

    #[test]
    fn render_target_count_stops_at_gap() {
        let mut desc = GraphicsDesc::default();
        desc.render_target_formats[0] = Format::R8G8B8A8Unorm;
        desc.render_target_formats[1] = Format::R16G16B16A16Float;
        assert_eq!(desc.render_target_count(), 2);
    }
}
