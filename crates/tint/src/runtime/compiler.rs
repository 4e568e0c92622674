//! Contract of the external effect compiler.

use thiserror::Error;
use tint_api::{
    pipeline::{BlendDesc, PrimitiveTopology, ShaderStage},
    resource::ResourceDesc,
    sampler::SamplerDesc,
};

/// Shader binary or source language the compiler emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderFormat {
    Dxbc,
    Dxil,
    SpirV,
    Hlsl,
    Glsl,
}

impl ShaderFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Dxbc | Self::Dxil | Self::SpirV => "cso",
            Self::Hlsl => "hlsl",
            Self::Glsl => "glsl",
        }
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    /// Diagnostics of a source the compiler rejected.
    #[error("effect failed to compile:\n{0}")]
    Source(String),

    #[error("target {0:?} is not supported by this compiler")]
    UnsupportedTarget(ShaderFormat),
}

/// Compiles a preprocessed effect.
pub trait EffectCompiler: Send + Sync {
    /// Returns entry point binaries plus the reflection of the effect.
    ///
    /// `stages` limits which entry points are generated.
    fn compile(
        &self,
        source: &str,
        stages: ShaderStage,
        format: ShaderFormat,
    ) -> Result<EffectModule, CompileError>;
}

#[derive(Debug, Clone, Default)]
pub struct EffectModule {
    pub entry_points: Vec<EntryPoint>,
    pub uniforms: Vec<Uniform>,
    pub textures: Vec<TextureInfo>,
    pub samplers: Vec<SamplerInfo>,
    pub storages: Vec<StorageInfo>,
    pub techniques: Vec<TechniqueInfo>,
    /// Bytes of the uniform block.
    pub uniform_size: u32,
}

impl EffectModule {
    pub fn entry_point(&self, name: &str) -> Option<&EntryPoint> {
        self.entry_points.iter().find(|entry| entry.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct EntryPoint {
    pub name: String,
    pub stage: ShaderStage,
    /// Empty if the compiler expects the cached binary of a previous run to be used.
    pub code: Vec<u8>,
    pub disassembly: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Uniform {
    pub name: String,
    pub offset: u32,
    pub size: u32,
    /// Initial value, `size` bytes.
    pub initializer: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureInfo {
    /// Name unique across every effect sharing the texture.
    pub unique_name: String,
    pub desc: ResourceDesc,
    /// Texture bound by the runtime instead of created, `COLOR` for the back buffer.
    pub semantic: Option<String>,
    /// Other effects declaring the same name use this texture too.
    pub shared: bool,
}

impl TextureInfo {
    pub fn is_back_buffer(&self) -> bool {
        self.semantic.as_deref() == Some("COLOR")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerInfo {
    pub binding: u32,
    pub texture_name: String,
    pub desc: SamplerDesc,
    pub srgb: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageInfo {
    pub binding: u32,
    pub texture_name: String,
    pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TechniqueInfo {
    pub name: String,
    pub enabled_by_default: bool,
    pub passes: Vec<PassInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassInfo {
    pub name: String,
    pub vs_entry_point: String,
    pub ps_entry_point: String,
    /// Compute passes only carry this entry point.
    pub cs_entry_point: String,
    /// Render target texture names. Empty renders to the back buffer.
    pub render_targets: Vec<String>,
    pub clear_render_targets: bool,
    pub srgb_write_enable: bool,
    pub generate_mipmaps: bool,
    pub blend: BlendDesc,
    pub topology: PrimitiveTopology,
    pub num_vertices: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub viewport_dispatch_z: u32,
}

impl Default for PassInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            vs_entry_point: String::new(),
            ps_entry_point: String::new(),
            cs_entry_point: String::new(),
            render_targets: Vec::new(),
            clear_render_targets: false,
            srgb_write_enable: false,
            generate_mipmaps: true,
            blend: BlendDesc::default(),
            topology: PrimitiveTopology::TriangleList,
            num_vertices: 3,
            viewport_width: 0,
            viewport_height: 0,
            viewport_dispatch_z: 1,
        }
    }
}

impl PassInfo {
    pub fn is_compute(&self) -> bool {
        !self.cs_entry_point.is_empty()
    }
}
