//! [`Device`] implementation over an `ID3D11Device`.
//!
//! Handles of resources, views, samplers and state objects are the native COM pointers.
//! Application objects are borrowed and dropped from the tables when their destruction
//! notifier fires. Composite graphics pipelines, layouts, descriptor sets and query pools
//! have no native counterpart and get odd counter handles.

use core::{
    ffi::c_void,
    mem, ptr,
    sync::atomic::{AtomicU64, Ordering},
};
use std::ffi::CString;

use parking_lot::Mutex;
use tint_api::{
    AnyHandle, DescriptorSet, DescriptorSetLayout, Device, DeviceApi, DeviceCaps, Error, Format,
    Pipeline, PipelineLayout, QueryPool, Resource, ResourceView, Result, Sampler,
    descriptor::{DescriptorRange, DescriptorSetUpdate, DescriptorType, PipelineLayoutParam},
    device::MappedSubresource,
    pipeline::{PipelineDesc, PipelineType, QueryType, ShaderDesc},
    resource::{
        MapAccess, MemoryHeap, ResourceDesc, ResourceDimension, ResourceUsage, ResourceViewDesc,
        ResourceViewType, SubresourceBox, SubresourceData, check_view_compatible,
    },
    sampler::SamplerDesc,
};
use tint_event::Registry;
use tracing::{debug, trace};
use windows::{
    Win32::{
        Foundation::{E_OUTOFMEMORY, S_OK},
        Graphics::{
            Direct3D::{D3D_SRV_DIMENSION, ID3DDestructionNotifier, WKPDID_D3DDebugObjectName},
            Direct3D11::*,
            Dxgi::{
                Common::{DXGI_FORMAT, DXGI_SAMPLE_DESC},
                DXGI_ERROR_DEVICE_HUNG, DXGI_ERROR_DEVICE_REMOVED, DXGI_ERROR_DEVICE_RESET,
            },
        },
    },
    core::{BOOL, IUnknown, Interface, PCSTR},
};

use super::{
    conv::{
        self, BufferDesc, NativeBlend, NativeDepthStencil, NativeInputElement, NativeRasterizer,
        NativeSampler, NativeStencilFace, NativeTargetBlend, Texture1dDesc, Texture2dDesc,
        Texture3dDesc, ViewDesc, ViewKind,
    },
    descriptor::{PushConstants, SetData},
};
pub(crate) use crate::com::Com;
use crate::{dispatch, map::HandleTable, passthrough};

const ASYNC_GETDATA_DONOTFLUSH: u32 = 0x1;

pub(crate) struct ResourceData {
    pub desc: ResourceDesc,
    pub native: Com<ID3D11Resource>,
}

pub(crate) struct ViewData {
    pub resource: Resource,
    pub desc: ResourceViewDesc,
    pub kind: ViewKind,
    pub native: Com<ID3D11View>,
}

pub(crate) struct SamplerData {
    pub desc: SamplerDesc,
    pub native: Com<ID3D11SamplerState>,
}

/// Every stage and state of a pipeline created through [`Device::create_pipeline`].
#[derive(Default)]
pub(crate) struct GraphicsPipeline {
    pub vertex_shader: Option<ID3D11VertexShader>,
    pub hull_shader: Option<ID3D11HullShader>,
    pub domain_shader: Option<ID3D11DomainShader>,
    pub geometry_shader: Option<ID3D11GeometryShader>,
    pub pixel_shader: Option<ID3D11PixelShader>,
    pub input_layout: Option<ID3D11InputLayout>,
    pub blend_state: Option<ID3D11BlendState>,
    pub rasterizer_state: Option<ID3D11RasterizerState>,
    pub depth_stencil_state: Option<ID3D11DepthStencilState>,
    /// `D3D11_PRIMITIVE_TOPOLOGY`
    pub topology: u32,
    pub sample_mask: u32,
    pub blend_constant: [f32; 4],
    pub stencil_reference: u32,
}

pub(crate) enum PipelineData {
    /// One shader stage or state object, `PipelineType` tells which interface it is.
    Object(PipelineType, Com<ID3D11DeviceChild>),
    Graphics(Box<GraphicsPipeline>),
}

/// Native buffer and CPU copy of one push constant parameter.
#[derive(Default)]
pub(crate) struct PushConstantBuffer {
    pub values: PushConstants,
    pub buffer: Option<ID3D11Buffer>,
}

pub(crate) struct LayoutData {
    pub params: Vec<PipelineLayoutParam>,
    pub constants: Mutex<Vec<PushConstantBuffer>>,
}

pub(crate) struct QueryPoolData {
    pub ty: QueryType,
    pub queries: Vec<ID3D11Query>,
}

/// Table an application object is tracked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tracked {
    Resource,
    View,
    Sampler,
    Pipeline,
}

pub struct DeviceImpl {
    pub(crate) device: ID3D11Device,
    pub(crate) context: ID3D11DeviceContext,
    pub(crate) feature_level: u32,

    pub(crate) resources: HandleTable<ResourceData>,
    pub(crate) views: HandleTable<ViewData>,
    pub(crate) samplers: HandleTable<SamplerData>,
    pub(crate) pipelines: HandleTable<PipelineData>,
    pub(crate) pipeline_layouts: HandleTable<LayoutData>,
    pub(crate) set_layouts: HandleTable<DescriptorRange>,
    pub(crate) descriptor_sets: HandleTable<SetData>,
    pub(crate) query_pools: HandleTable<QueryPoolData>,
    next_id: AtomicU64,
}

// ID3D11Device is free threaded, the immediate context is used where the application uses it
unsafe impl Send for DeviceImpl {}
unsafe impl Sync for DeviceImpl {}

/// Maps a failed native call to the unified error.
pub(crate) fn native_error(err: windows::core::Error) -> Error {
    let code = err.code();
    if code == E_OUTOFMEMORY {
        Error::OutOfMemory
    } else if code == DXGI_ERROR_DEVICE_REMOVED || code == DXGI_ERROR_DEVICE_RESET || code == DXGI_ERROR_DEVICE_HUNG
    {
        Error::DeviceLost
    } else {
        Error::Native(code.0)
    }
}

#[inline]
fn raw_of(object: &impl Interface) -> u64 {
    object.as_raw() as u64
}

pub(crate) fn mirror_buffer_desc(desc: &D3D11_BUFFER_DESC) -> BufferDesc {
    BufferDesc {
        byte_width: desc.ByteWidth,
        usage: desc.Usage.0 as u32,
        bind_flags: desc.BindFlags as u32,
        cpu_access_flags: desc.CPUAccessFlags as u32,
        misc_flags: desc.MiscFlags as u32,
        structure_byte_stride: desc.StructureByteStride,
    }
}

pub(crate) fn native_buffer_desc(desc: &BufferDesc) -> D3D11_BUFFER_DESC {
    D3D11_BUFFER_DESC {
        ByteWidth: desc.byte_width,
        Usage: D3D11_USAGE(desc.usage as _),
        BindFlags: desc.bind_flags as _,
        CPUAccessFlags: desc.cpu_access_flags as _,
        MiscFlags: desc.misc_flags as _,
        StructureByteStride: desc.structure_byte_stride,
    }
}

pub(crate) fn mirror_texture_1d_desc(desc: &D3D11_TEXTURE1D_DESC) -> Texture1dDesc {
    Texture1dDesc {
        width: desc.Width,
        mip_levels: desc.MipLevels,
        array_size: desc.ArraySize,
        format: desc.Format.0 as u32,
        usage: desc.Usage.0 as u32,
        bind_flags: desc.BindFlags as u32,
        cpu_access_flags: desc.CPUAccessFlags as u32,
        misc_flags: desc.MiscFlags as u32,
    }
}

pub(crate) fn native_texture_1d_desc(desc: &Texture1dDesc) -> D3D11_TEXTURE1D_DESC {
    D3D11_TEXTURE1D_DESC {
        Width: desc.width,
        MipLevels: desc.mip_levels,
        ArraySize: desc.array_size,
        Format: DXGI_FORMAT(desc.format as _),
        Usage: D3D11_USAGE(desc.usage as _),
        BindFlags: desc.bind_flags as _,
        CPUAccessFlags: desc.cpu_access_flags as _,
        MiscFlags: desc.misc_flags as _,
    }
}

pub(crate) fn mirror_texture_2d_desc(desc: &D3D11_TEXTURE2D_DESC) -> Texture2dDesc {
    Texture2dDesc {
        width: desc.Width,
        height: desc.Height,
        mip_levels: desc.MipLevels,
        array_size: desc.ArraySize,
        format: desc.Format.0 as u32,
        sample_count: desc.SampleDesc.Count,
        sample_quality: desc.SampleDesc.Quality,
        usage: desc.Usage.0 as u32,
        bind_flags: desc.BindFlags as u32,
        cpu_access_flags: desc.CPUAccessFlags as u32,
        misc_flags: desc.MiscFlags as u32,
    }
}

pub(crate) fn native_texture_2d_desc(desc: &Texture2dDesc) -> D3D11_TEXTURE2D_DESC {
    D3D11_TEXTURE2D_DESC {
        Width: desc.width,
        Height: desc.height,
        MipLevels: desc.mip_levels,
        ArraySize: desc.array_size,
        Format: DXGI_FORMAT(desc.format as _),
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: desc.sample_count,
            Quality: desc.sample_quality,
        },
        Usage: D3D11_USAGE(desc.usage as _),
        BindFlags: desc.bind_flags as _,
        CPUAccessFlags: desc.cpu_access_flags as _,
        MiscFlags: desc.misc_flags as _,
    }
}

pub(crate) fn mirror_texture_3d_desc(desc: &D3D11_TEXTURE3D_DESC) -> Texture3dDesc {
    Texture3dDesc {
        width: desc.Width,
        height: desc.Height,
        depth: desc.Depth,
        mip_levels: desc.MipLevels,
        format: desc.Format.0 as u32,
        usage: desc.Usage.0 as u32,
        bind_flags: desc.BindFlags as u32,
        cpu_access_flags: desc.CPUAccessFlags as u32,
        misc_flags: desc.MiscFlags as u32,
    }
}

pub(crate) fn native_texture_3d_desc(desc: &Texture3dDesc) -> D3D11_TEXTURE3D_DESC {
    D3D11_TEXTURE3D_DESC {
        Width: desc.width,
        Height: desc.height,
        Depth: desc.depth,
        MipLevels: desc.mip_levels,
        Format: DXGI_FORMAT(desc.format as _),
        Usage: D3D11_USAGE(desc.usage as _),
        BindFlags: desc.bind_flags as _,
        CPUAccessFlags: desc.cpu_access_flags as _,
        MiscFlags: desc.misc_flags as _,
    }
}

/// First four words of a view description's dimension union.
fn union_words<U>(union: &U) -> [u32; 4] {
    let mut words = [0u32; 4];
    let len = (mem::size_of::<U>() / 4).min(4);
    // The unions only hold u32 fields
    unsafe { ptr::copy_nonoverlapping(ptr::from_ref(union).cast::<u32>(), words.as_mut_ptr(), len) };
    words
}

fn set_union_words<U>(union: &mut U, words: [u32; 4]) {
    let len = (mem::size_of::<U>() / 4).min(4);
    unsafe { ptr::copy_nonoverlapping(words.as_ptr(), ptr::from_mut(union).cast::<u32>(), len) };
}

macro_rules! view_desc_conversions {
    ($($kind:ident: $desc:ty, $dimension:ident, $mirror:ident, $native:ident;)*) => {$(
        pub(crate) fn $mirror(desc: &$desc) -> ViewDesc {
            ViewDesc::from_words(
                ViewKind::$kind,
                desc.Format.0 as u32,
                desc.ViewDimension.0 as u32,
                union_words(&desc.Anonymous),
            )
        }

        pub(crate) fn $native(view: &ViewDesc) -> $desc {
            let mut desc = <$desc>::default();
            desc.Format = DXGI_FORMAT(view.format as _);
            desc.ViewDimension = $dimension(view.dimension as _);
            set_union_words(&mut desc.Anonymous, view.words(ViewKind::$kind));
            desc
        }
    )*};
}

view_desc_conversions! {
    ShaderResource: D3D11_SHADER_RESOURCE_VIEW_DESC, D3D_SRV_DIMENSION, mirror_srv_desc, native_srv_desc;
    RenderTarget: D3D11_RENDER_TARGET_VIEW_DESC, D3D11_RTV_DIMENSION, mirror_rtv_desc, native_rtv_desc;
    DepthStencil: D3D11_DEPTH_STENCIL_VIEW_DESC, D3D11_DSV_DIMENSION, mirror_dsv_desc, native_dsv_desc;
    UnorderedAccess: D3D11_UNORDERED_ACCESS_VIEW_DESC, D3D11_UAV_DIMENSION, mirror_uav_desc, native_uav_desc;
}

pub(crate) fn mirror_sampler_desc(desc: &D3D11_SAMPLER_DESC) -> NativeSampler {
    NativeSampler {
        filter: desc.Filter.0 as u32,
        address: [desc.AddressU.0 as u32, desc.AddressV.0 as u32, desc.AddressW.0 as u32],
        mip_lod_bias: desc.MipLODBias,
        max_anisotropy: desc.MaxAnisotropy,
        comparison_func: desc.ComparisonFunc.0 as u32,
        border_color: desc.BorderColor,
        min_lod: desc.MinLOD,
        max_lod: desc.MaxLOD,
    }
}

pub(crate) fn native_sampler_desc(desc: &NativeSampler) -> D3D11_SAMPLER_DESC {
    D3D11_SAMPLER_DESC {
        Filter: D3D11_FILTER(desc.filter as _),
        AddressU: D3D11_TEXTURE_ADDRESS_MODE(desc.address[0] as _),
        AddressV: D3D11_TEXTURE_ADDRESS_MODE(desc.address[1] as _),
        AddressW: D3D11_TEXTURE_ADDRESS_MODE(desc.address[2] as _),
        MipLODBias: desc.mip_lod_bias,
        MaxAnisotropy: desc.max_anisotropy,
        ComparisonFunc: D3D11_COMPARISON_FUNC(desc.comparison_func as _),
        BorderColor: desc.border_color,
        MinLOD: desc.min_lod,
        MaxLOD: desc.max_lod,
    }
}

pub(crate) fn mirror_blend_desc(desc: &D3D11_BLEND_DESC) -> NativeBlend {
    let mut native = NativeBlend {
        alpha_to_coverage: desc.AlphaToCoverageEnable.as_bool(),
        independent_blend: desc.IndependentBlendEnable.as_bool(),
        ..Default::default()
    };
    for (target, desc) in native.targets.iter_mut().zip(&desc.RenderTarget) {
        *target = NativeTargetBlend {
            blend_enable: desc.BlendEnable.as_bool(),
            src_blend: desc.SrcBlend.0 as u32,
            dest_blend: desc.DestBlend.0 as u32,
            blend_op: desc.BlendOp.0 as u32,
            src_blend_alpha: desc.SrcBlendAlpha.0 as u32,
            dest_blend_alpha: desc.DestBlendAlpha.0 as u32,
            blend_op_alpha: desc.BlendOpAlpha.0 as u32,
            write_mask: desc.RenderTargetWriteMask,
        };
    }
    native
}

pub(crate) fn native_blend_desc(native: &NativeBlend) -> D3D11_BLEND_DESC {
    let mut desc = D3D11_BLEND_DESC {
        AlphaToCoverageEnable: BOOL::from(native.alpha_to_coverage),
        IndependentBlendEnable: BOOL::from(native.independent_blend),
        ..Default::default()
    };
    for (desc, target) in desc.RenderTarget.iter_mut().zip(&native.targets) {
        *desc = D3D11_RENDER_TARGET_BLEND_DESC {
            BlendEnable: BOOL::from(target.blend_enable),
            SrcBlend: D3D11_BLEND(target.src_blend as _),
            DestBlend: D3D11_BLEND(target.dest_blend as _),
            BlendOp: D3D11_BLEND_OP(target.blend_op as _),
            SrcBlendAlpha: D3D11_BLEND(target.src_blend_alpha as _),
            DestBlendAlpha: D3D11_BLEND(target.dest_blend_alpha as _),
            BlendOpAlpha: D3D11_BLEND_OP(target.blend_op_alpha as _),
            RenderTargetWriteMask: target.write_mask,
        };
    }
    desc
}

pub(crate) fn mirror_rasterizer_desc(desc: &D3D11_RASTERIZER_DESC) -> NativeRasterizer {
    NativeRasterizer {
        fill_mode: desc.FillMode.0 as u32,
        cull_mode: desc.CullMode.0 as u32,
        front_counter_clockwise: desc.FrontCounterClockwise.as_bool(),
        depth_bias: desc.DepthBias,
        depth_bias_clamp: desc.DepthBiasClamp,
        slope_scaled_depth_bias: desc.SlopeScaledDepthBias,
        depth_clip_enable: desc.DepthClipEnable.as_bool(),
        scissor_enable: desc.ScissorEnable.as_bool(),
        multisample_enable: desc.MultisampleEnable.as_bool(),
        antialiased_line_enable: desc.AntialiasedLineEnable.as_bool(),
    }
}

pub(crate) fn native_rasterizer_desc(native: &NativeRasterizer) -> D3D11_RASTERIZER_DESC {
    D3D11_RASTERIZER_DESC {
        FillMode: D3D11_FILL_MODE(native.fill_mode as _),
        CullMode: D3D11_CULL_MODE(native.cull_mode as _),
        FrontCounterClockwise: BOOL::from(native.front_counter_clockwise),
        DepthBias: native.depth_bias,
        DepthBiasClamp: native.depth_bias_clamp,
        SlopeScaledDepthBias: native.slope_scaled_depth_bias,
        DepthClipEnable: BOOL::from(native.depth_clip_enable),
        ScissorEnable: BOOL::from(native.scissor_enable),
        MultisampleEnable: BOOL::from(native.multisample_enable),
        AntialiasedLineEnable: BOOL::from(native.antialiased_line_enable),
    }
}

fn mirror_stencil_face(desc: &D3D11_DEPTH_STENCILOP_DESC) -> NativeStencilFace {
    NativeStencilFace {
        fail_op: desc.StencilFailOp.0 as u32,
        depth_fail_op: desc.StencilDepthFailOp.0 as u32,
        pass_op: desc.StencilPassOp.0 as u32,
        func: desc.StencilFunc.0 as u32,
    }
}

fn native_stencil_face(face: &NativeStencilFace) -> D3D11_DEPTH_STENCILOP_DESC {
    D3D11_DEPTH_STENCILOP_DESC {
        StencilFailOp: D3D11_STENCIL_OP(face.fail_op as _),
        StencilDepthFailOp: D3D11_STENCIL_OP(face.depth_fail_op as _),
        StencilPassOp: D3D11_STENCIL_OP(face.pass_op as _),
        StencilFunc: D3D11_COMPARISON_FUNC(face.func as _),
    }
}

pub(crate) fn mirror_depth_stencil_desc(desc: &D3D11_DEPTH_STENCIL_DESC) -> NativeDepthStencil {
    NativeDepthStencil {
        depth_enable: desc.DepthEnable.as_bool(),
        depth_write: desc.DepthWriteMask == D3D11_DEPTH_WRITE_MASK_ALL,
        depth_func: desc.DepthFunc.0 as u32,
        stencil_enable: desc.StencilEnable.as_bool(),
        stencil_read_mask: desc.StencilReadMask,
        stencil_write_mask: desc.StencilWriteMask,
        front: mirror_stencil_face(&desc.FrontFace),
        back: mirror_stencil_face(&desc.BackFace),
    }
}

pub(crate) fn native_depth_stencil_desc(native: &NativeDepthStencil) -> D3D11_DEPTH_STENCIL_DESC {
    D3D11_DEPTH_STENCIL_DESC {
        DepthEnable: BOOL::from(native.depth_enable),
        DepthWriteMask: if native.depth_write {
            D3D11_DEPTH_WRITE_MASK_ALL
        } else {
            D3D11_DEPTH_WRITE_MASK_ZERO
        },
        DepthFunc: D3D11_COMPARISON_FUNC(native.depth_func as _),
        StencilEnable: BOOL::from(native.stencil_enable),
        StencilReadMask: native.stencil_read_mask,
        StencilWriteMask: native.stencil_write_mask,
        FrontFace: native_stencil_face(&native.front),
        BackFace: native_stencil_face(&native.back),
    }
}

/// Semantic names of native input elements, owned so the mirrors can borrow them.
///
/// # Safety
/// every element must carry a valid semantic name.
pub(crate) unsafe fn semantic_names(elements: &[D3D11_INPUT_ELEMENT_DESC]) -> Vec<String> {
    elements
        .iter()
        .map(|element| unsafe { element.SemanticName.to_string() }.unwrap_or_default())
        .collect()
}

pub(crate) fn mirror_input_elements<'a>(
    elements: &[D3D11_INPUT_ELEMENT_DESC],
    names: &'a [String],
) -> Vec<NativeInputElement<'a>> {
    elements
        .iter()
        .zip(names)
        .map(|(element, name)| NativeInputElement {
            semantic: name.as_str(),
            semantic_index: element.SemanticIndex,
            format: element.Format.0 as u32,
            input_slot: element.InputSlot,
            aligned_byte_offset: element.AlignedByteOffset,
            input_slot_class: element.InputSlotClass.0 as u32,
            instance_data_step_rate: element.InstanceDataStepRate,
        })
        .collect()
}

/// Native elements of `elements`. The returned names must outlive the descriptions.
pub(crate) fn native_input_elements(
    elements: &[NativeInputElement<'_>],
) -> (Vec<CString>, Vec<D3D11_INPUT_ELEMENT_DESC>) {
    let names: Vec<CString> = elements
        .iter()
        .map(|element| CString::new(element.semantic).unwrap_or_default())
        .collect();
    let native = elements
        .iter()
        .zip(&names)
        .map(|(element, name)| D3D11_INPUT_ELEMENT_DESC {
            SemanticName: PCSTR(name.as_ptr().cast()),
            SemanticIndex: element.semantic_index,
            Format: DXGI_FORMAT(element.format as _),
            InputSlot: element.input_slot,
            AlignedByteOffset: element.aligned_byte_offset,
            InputSlotClass: D3D11_INPUT_CLASSIFICATION(element.input_slot_class as _),
            InstanceDataStepRate: element.instance_data_step_rate,
        })
        .collect();
    (names, native)
}

pub(crate) fn native_box(b: &SubresourceBox) -> D3D11_BOX {
    D3D11_BOX {
        left: b.left as u32,
        top: b.top as u32,
        front: b.front as u32,
        right: b.right as u32,
        bottom: b.bottom as u32,
        back: b.back as u32,
    }
}

/// Context passed to a destruction notifier.
struct Watch {
    device: u64,
    tracked: Tracked,
    raw: u64,
}

extern "system" fn object_destroyed(data: *mut c_void) {
    let watch = unsafe { Box::from_raw(data.cast::<Watch>()) };
    trace!("{:?} {:#x} destroyed", watch.tracked, watch.raw);
    super::hook::forget_object(watch.device, watch.tracked, watch.raw);
}

/// New reference to `raw` for the application.
fn hand_out_raw(raw: *mut c_void) -> Option<*mut c_void> {
    unsafe { IUnknown::from_raw_borrowed(&raw) }
        .cloned()
        .map(IUnknown::into_raw)
}

impl DeviceImpl {
    pub(crate) fn new(device: ID3D11Device) -> windows::core::Result<Self> {
        let (feature_level, context) =
            passthrough::call(|| unsafe { (device.GetFeatureLevel(), device.GetImmediateContext()) });

        Ok(Self {
            device,
            context: context?,
            feature_level: feature_level.0 as u32,
            resources: HandleTable::new(),
            views: HandleTable::new(),
            samplers: HandleTable::new(),
            pipelines: HandleTable::new(),
            pipeline_layouts: HandleTable::new(),
            set_layouts: HandleTable::new(),
            descriptor_sets: HandleTable::new(),
            query_pools: HandleTable::new(),
            next_id: AtomicU64::new(0),
        })
    }

    #[inline]
    pub fn raw(&self) -> u64 {
        raw_of(&self.device)
    }

    /// Handle for an object without a native counterpart. Odd, so it never equals a pointer.
    fn next_handle(&self) -> u64 {
        (self.next_id.fetch_add(1, Ordering::Relaxed) << 1) | 1
    }

    /// Registers a callback dropping the application object `raw` from its table once the
    /// runtime destroys it. Objects without a notifier stay until their address is reused.
    fn watch(&self, tracked: Tracked, raw: *mut c_void) {
        let Some(object) = (unsafe { IUnknown::from_raw_borrowed(&raw) }) else {
            return;
        };
        let Ok(notifier) = passthrough::call(|| object.cast::<ID3DDestructionNotifier>()) else {
            trace!("{tracked:?} {raw:p} has no destruction notifier");
            return;
        };

        let watch = Box::new(Watch {
            device: self.raw(),
            tracked,
            raw: raw as u64,
        });
        let data = Box::into_raw(watch);
        let res = passthrough::call(|| unsafe {
            // registered without a reference to the object
            notifier.RegisterDestructionCallback(Some(object_destroyed), data.cast())
        });
        if let Err(err) = res {
            debug!("cannot watch {tracked:?} {raw:p}. err: {err:?}");
            drop(unsafe { Box::from_raw(data) });
        }
    }

    /// Drops a destroyed application object, firing its destroy event.
    pub(crate) fn forget(&self, registry: &Registry, tracked: Tracked, raw: u64) {
        match tracked {
            Tracked::Resource => {
                if self.resources.remove(raw).is_some() {
                    dispatch::destroy_resource(registry, self, Resource::from_raw(raw));
                }
            }
            Tracked::View => {
                if self.views.remove(raw).is_some() {
                    dispatch::destroy_resource_view(registry, self, ResourceView::from_raw(raw));
                }
            }
            Tracked::Sampler => {
                if self.samplers.remove(raw).is_some() {
                    dispatch::destroy_sampler(registry, self, Sampler::from_raw(raw));
                }
            }
            Tracked::Pipeline => {
                if self.pipelines.remove(raw).is_some() {
                    dispatch::destroy_pipeline(registry, self, Pipeline::from_raw(raw));
                }
            }
        }
    }

    /// Tracks a resource the application created through a hook.
    ///
    /// A previous entry at the same address belonged to an object released since, it is
    /// reported destroyed first.
    pub(crate) fn track_resource(
        &self,
        registry: &Registry,
        raw: *mut c_void,
        desc: ResourceDesc,
        initial_state: ResourceUsage,
    ) -> Resource {
        self.forget(registry, Tracked::Resource, raw as u64);

        let resource = Resource::from_raw(raw as u64);
        self.resources.insert(
            resource.raw(),
            ResourceData {
                desc,
                native: Com::Borrowed(raw),
            },
        );
        self.watch(Tracked::Resource, raw);
        dispatch::init_resource(registry, self, &desc, initial_state, resource);
        resource
    }

    pub(crate) fn track_view(
        &self,
        registry: &Registry,
        raw: *mut c_void,
        resource: Resource,
        kind: ViewKind,
        desc: ResourceViewDesc,
    ) -> ResourceView {
        self.forget(registry, Tracked::View, raw as u64);

        let view = ResourceView::from_raw(raw as u64);
        self.views.insert(
            view.raw(),
            ViewData {
                resource,
                desc,
                kind,
                native: Com::Borrowed(raw),
            },
        );
        self.watch(Tracked::View, raw);
        dispatch::init_resource_view(registry, self, resource, kind.usage(), &desc, view);
        view
    }

    pub(crate) fn track_sampler(&self, registry: &Registry, raw: *mut c_void, desc: SamplerDesc) -> Sampler {
        self.forget(registry, Tracked::Sampler, raw as u64);

        let sampler = Sampler::from_raw(raw as u64);
        self.samplers.insert(
            sampler.raw(),
            SamplerData {
                desc,
                native: Com::Borrowed(raw),
            },
        );
        self.watch(Tracked::Sampler, raw);
        dispatch::init_sampler(registry, self, &desc, sampler);
        sampler
    }

    /// Tracks a shader stage or state object the application created through a hook.
    pub(crate) fn track_pipeline(
        &self,
        registry: &Registry,
        raw: *mut c_void,
        desc: &PipelineDesc<'_>,
    ) -> Pipeline {
        self.forget(registry, Tracked::Pipeline, raw as u64);

        let pipeline = Pipeline::from_raw(raw as u64);
        self.pipelines
            .insert(pipeline.raw(), PipelineData::Object(desc.ty(), Com::Borrowed(raw)));
        self.watch(Tracked::Pipeline, raw);
        dispatch::init_pipeline(registry, self, PipelineLayout::NULL, desc, pipeline);
        pipeline
    }

    /// Tracks a swapchain back buffer, which no creation hook sees.
    pub(crate) fn adopt_texture_2d(&self, texture: &ID3D11Texture2D) -> (Resource, ResourceDesc) {
        let raw = raw_of(texture);
        if let Some(desc) = self.resources.with(raw, |data| data.desc) {
            return (Resource::from_raw(raw), desc);
        }

        let mut native = D3D11_TEXTURE2D_DESC::default();
        passthrough::call(|| unsafe { texture.GetDesc(&mut native) });
        let desc = conv::texture_2d_to_desc(&mirror_texture_2d_desc(&native));
        self.resources.insert(
            raw,
            ResourceData {
                desc,
                native: Com::Borrowed(texture.as_raw()),
            },
        );
        (Resource::from_raw(raw), desc)
    }

    pub(crate) fn hand_out_resource(&self, resource: Resource) -> Option<*mut c_void> {
        hand_out_raw(self.resources.with(resource.raw(), |data| data.native.as_raw())?)
    }

    pub(crate) fn hand_out_view(&self, view: ResourceView) -> Option<*mut c_void> {
        hand_out_raw(self.views.with(view.raw(), |data| data.native.as_raw())?)
    }

    pub(crate) fn hand_out_sampler(&self, sampler: Sampler) -> Option<*mut c_void> {
        hand_out_raw(self.samplers.with(sampler.raw(), |data| data.native.as_raw())?)
    }

    /// New reference to a substitute shader or state object. Composite pipelines have none.
    pub(crate) fn hand_out_pipeline(&self, pipeline: Pipeline) -> Option<*mut c_void> {
        let raw = self.pipelines.with(pipeline.raw(), |data| match data {
            PipelineData::Object(_, com) => Some(com.as_raw()),
            PipelineData::Graphics(_) => None,
        })??;
        hand_out_raw(raw)
    }

    pub(crate) fn resource(&self, resource: Resource) -> Option<ID3D11Resource> {
        self.resources.get(resource.raw())?.native.cloned()
    }

    pub(crate) fn buffer_size(&self, buffer: Resource) -> u64 {
        self.resources
            .with(buffer.raw(), |data| match data.desc.dimension {
                ResourceDimension::Buffer { size, .. } => size,
                _ => 0,
            })
            .unwrap_or_default()
    }

    fn create_native_resource(
        &self,
        desc: &ResourceDesc,
        initial_data: Option<&[SubresourceData<'_>]>,
    ) -> Result<(ID3D11Resource, ResourceDesc)> {
        let data: Vec<D3D11_SUBRESOURCE_DATA> = initial_data
            .unwrap_or_default()
            .iter()
            .map(|data| D3D11_SUBRESOURCE_DATA {
                pSysMem: data.data.as_ptr().cast(),
                SysMemPitch: data.row_pitch,
                SysMemSlicePitch: data.slice_pitch,
            })
            .collect();
        let data = (!data.is_empty()).then_some(data.as_ptr());
        let mut created = *desc;

        unsafe {
            match desc.dimension {
                ResourceDimension::Buffer { .. } => {
                    let mut native = BufferDesc::default();
                    if !conv::apply_buffer_desc(desc, &mut native) {
                        return Err(Error::Unsupported("buffer larger than 4 GiB"));
                    }
                    // Immutable buffers need their data at creation
                    if desc.heap == MemoryHeap::GpuOnly && data.is_some() && !desc.usage.contains(ResourceUsage::COPY_DEST) {
                        native.usage = conv::usage::IMMUTABLE;
                    }

                    let mut buffer = None;
                    self.device
                        .CreateBuffer(&native_buffer_desc(&native), data, Some(&mut buffer))
                        .map_err(native_error)?;
                    let buffer = buffer.ok_or(Error::OutOfMemory)?;
                    Ok((buffer.into(), created))
                }
                ResourceDimension::Texture1d { .. } => {
                    let mut native = Texture1dDesc::default();
                    if !conv::apply_texture_1d_desc(desc, &mut native) {
                        return Err(Error::Unsupported("1D texture description"));
                    }

                    let mut texture = None;
                    self.device
                        .CreateTexture1D(&native_texture_1d_desc(&native), data, Some(&mut texture))
                        .map_err(native_error)?;
                    let texture = texture.ok_or(Error::OutOfMemory)?;

                    let mut actual = D3D11_TEXTURE1D_DESC::default();
                    texture.GetDesc(&mut actual);
                    created.dimension = conv::texture_1d_to_desc(&mirror_texture_1d_desc(&actual)).dimension;
                    Ok((texture.into(), created))
                }
                ResourceDimension::Texture2d { .. } => {
                    let mut native = Texture2dDesc::default();
                    if !conv::apply_texture_2d_desc(desc, &mut native) {
                        return Err(Error::Unsupported("2D texture description"));
                    }

                    let mut texture = None;
                    self.device
                        .CreateTexture2D(&native_texture_2d_desc(&native), data, Some(&mut texture))
                        .map_err(native_error)?;
                    let texture = texture.ok_or(Error::OutOfMemory)?;

                    let mut actual = D3D11_TEXTURE2D_DESC::default();
                    texture.GetDesc(&mut actual);
                    created.dimension = conv::texture_2d_to_desc(&mirror_texture_2d_desc(&actual)).dimension;
                    Ok((texture.into(), created))
                }
                ResourceDimension::Texture3d { .. } => {
                    let mut native = Texture3dDesc::default();
                    if !conv::apply_texture_3d_desc(desc, &mut native) {
                        return Err(Error::Unsupported("3D texture description"));
                    }

                    let mut texture = None;
                    self.device
                        .CreateTexture3D(&native_texture_3d_desc(&native), data, Some(&mut texture))
                        .map_err(native_error)?;
                    let texture = texture.ok_or(Error::OutOfMemory)?;

                    let mut actual = D3D11_TEXTURE3D_DESC::default();
                    texture.GetDesc(&mut actual);
                    created.dimension = conv::texture_3d_to_desc(&mirror_texture_3d_desc(&actual)).dimension;
                    Ok((texture.into(), created))
                }
            }
        }
    }

    fn create_native_view(
        &self,
        kind: ViewKind,
        resource: &ID3D11Resource,
        native: Option<&ViewDesc>,
    ) -> Result<ID3D11View> {
        unsafe {
            match kind {
                ViewKind::ShaderResource => {
                    let desc = native.map(native_srv_desc);
                    let mut view = None;
                    self.device
                        .CreateShaderResourceView(resource, desc.as_ref().map(ptr::from_ref), Some(&mut view))
                        .map_err(native_error)?;
                    view.map(Into::into).ok_or(Error::OutOfMemory)
                }
                ViewKind::RenderTarget => {
                    let desc = native.map(native_rtv_desc);
                    let mut view = None;
                    self.device
                        .CreateRenderTargetView(resource, desc.as_ref().map(ptr::from_ref), Some(&mut view))
                        .map_err(native_error)?;
                    view.map(Into::into).ok_or(Error::OutOfMemory)
                }
                ViewKind::DepthStencil => {
                    let desc = native.map(native_dsv_desc);
                    let mut view = None;
                    self.device
                        .CreateDepthStencilView(resource, desc.as_ref().map(ptr::from_ref), Some(&mut view))
                        .map_err(native_error)?;
                    view.map(Into::into).ok_or(Error::OutOfMemory)
                }
                ViewKind::UnorderedAccess => {
                    let desc = native.map(native_uav_desc);
                    let mut view = None;
                    self.device
                        .CreateUnorderedAccessView(resource, desc.as_ref().map(ptr::from_ref), Some(&mut view))
                        .map_err(native_error)?;
                    view.map(Into::into).ok_or(Error::OutOfMemory)
                }
            }
        }
    }

    fn create_shader(&self, ty: PipelineType, shader: &ShaderDesc<'_>) -> Result<ID3D11DeviceChild> {
        let code = shader.code;
        unsafe {
            macro_rules! create {
                ($method:ident) => {{
                    let mut object = None;
                    self.device.$method(code, None, Some(&mut object)).map_err(native_error)?;
                    object.map(Into::into).ok_or(Error::OutOfMemory)
                }};
            }

            match ty {
                PipelineType::VertexShader => create!(CreateVertexShader),
                PipelineType::HullShader => create!(CreateHullShader),
                PipelineType::DomainShader => create!(CreateDomainShader),
                PipelineType::GeometryShader => create!(CreateGeometryShader),
                PipelineType::PixelShader => create!(CreatePixelShader),
                PipelineType::Compute => create!(CreateComputeShader),
                _ => Err(Error::Unsupported("not a shader stage")),
            }
        }
    }

    fn create_input_layout(&self, elements: &[tint_api::pipeline::InputElement<'_>], code: &[u8]) -> Result<ID3D11InputLayout> {
        let mirrored = conv::input_elements_from_desc(elements);
        let (_names, native) = native_input_elements(&mirrored);
        let mut layout = None;
        unsafe { self.device.CreateInputLayout(&native, code, Some(&mut layout)) }.map_err(native_error)?;
        layout.ok_or(Error::OutOfMemory)
    }

    fn create_blend_state(&self, desc: &tint_api::pipeline::BlendDesc) -> Result<ID3D11BlendState> {
        let mut state = None;
        unsafe {
            self.device
                .CreateBlendState(&native_blend_desc(&conv::blend_from_desc(desc)), Some(&mut state))
        }
        .map_err(native_error)?;
        state.ok_or(Error::OutOfMemory)
    }

    fn create_rasterizer_state(&self, desc: &tint_api::pipeline::RasterizerDesc) -> Result<ID3D11RasterizerState> {
        let mut state = None;
        unsafe {
            self.device.CreateRasterizerState(
                &native_rasterizer_desc(&conv::rasterizer_from_desc(desc)),
                Some(&mut state),
            )
        }
        .map_err(native_error)?;
        state.ok_or(Error::OutOfMemory)
    }

    fn create_depth_stencil_state(
        &self,
        desc: &tint_api::pipeline::DepthStencilDesc,
    ) -> Result<ID3D11DepthStencilState> {
        let mut state = None;
        unsafe {
            self.device.CreateDepthStencilState(
                &native_depth_stencil_desc(&conv::depth_stencil_from_desc(desc)),
                Some(&mut state),
            )
        }
        .map_err(native_error)?;
        state.ok_or(Error::OutOfMemory)
    }

    fn create_graphics_pipeline(&self, desc: &tint_api::pipeline::GraphicsDesc<'_>) -> Result<GraphicsPipeline> {
        macro_rules! stage {
            ($shader:expr, $ty:expr, $interface:ty) => {
                match &$shader {
                    Some(shader) => Some(self.create_shader($ty, shader)?.cast::<$interface>().map_err(native_error)?),
                    None => None,
                }
            };
        }

        let input_layout = match (&desc.vertex_shader, desc.input_layout.is_empty()) {
            (Some(shader), false) => Some(self.create_input_layout(&desc.input_layout, shader.code)?),
            _ => None,
        };

        Ok(GraphicsPipeline {
            vertex_shader: stage!(desc.vertex_shader, PipelineType::VertexShader, ID3D11VertexShader),
            hull_shader: stage!(desc.hull_shader, PipelineType::HullShader, ID3D11HullShader),
            domain_shader: stage!(desc.domain_shader, PipelineType::DomainShader, ID3D11DomainShader),
            geometry_shader: stage!(desc.geometry_shader, PipelineType::GeometryShader, ID3D11GeometryShader),
            pixel_shader: stage!(desc.pixel_shader, PipelineType::PixelShader, ID3D11PixelShader),
            input_layout,
            blend_state: Some(self.create_blend_state(&desc.blend_state)?),
            rasterizer_state: Some(self.create_rasterizer_state(&desc.rasterizer_state)?),
            depth_stencil_state: Some(self.create_depth_stencil_state(&desc.depth_stencil_state)?),
            topology: conv::topology_to_d3d(desc.topology),
            sample_mask: desc.sample_mask,
            blend_constant: desc.blend_state.blend_constant.to_le_bytes().map(|c| c as f32 / 255.0),
            stencil_reference: desc.depth_stencil_state.stencil_reference_value as u32,
        })
    }
}

impl Device for DeviceImpl {
    fn api(&self) -> DeviceApi {
        DeviceApi::D3D11
    }

    fn check_capability(&self, cap: DeviceCaps) -> bool {
        super::capability(cap, self.feature_level)
    }

    fn check_format_support(&self, format: Format, usage: ResourceUsage) -> bool {
        let native = conv::format_to_dxgi(format);
        if native == 0 {
            return false;
        }
        let Ok(support) =
            passthrough::call(|| unsafe { self.device.CheckFormatSupport(DXGI_FORMAT(native as _)) })
        else {
            return false;
        };

        let support = support as i32;
        let required = [
            (ResourceUsage::RENDER_TARGET, D3D11_FORMAT_SUPPORT_RENDER_TARGET.0),
            (ResourceUsage::DEPTH_STENCIL, D3D11_FORMAT_SUPPORT_DEPTH_STENCIL.0),
            (ResourceUsage::SHADER_RESOURCE, D3D11_FORMAT_SUPPORT_SHADER_SAMPLE.0),
            (
                ResourceUsage::UNORDERED_ACCESS,
                D3D11_FORMAT_SUPPORT_TYPED_UNORDERED_ACCESS_VIEW.0,
            ),
            (ResourceUsage::RESOLVE_DEST, D3D11_FORMAT_SUPPORT_MULTISAMPLE_RESOLVE.0),
        ];
        required
            .iter()
            .filter(|(unified, _)| usage.intersects(*unified))
            .all(|(_, bit)| support & *bit as i32 != 0)
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Sampler> {
        let native = native_sampler_desc(&conv::sampler_from_desc(desc));
        let sampler = passthrough::call(|| {
            let mut sampler = None;
            unsafe { self.device.CreateSamplerState(&native, Some(&mut sampler)) }.map_err(native_error)?;
            sampler.ok_or(Error::OutOfMemory)
        })?;

        let raw = raw_of(&sampler);
        self.samplers.insert(
            raw,
            SamplerData {
                desc: *desc,
                native: Com::Owned(sampler),
            },
        );
        Ok(Sampler::from_raw(raw))
    }

    fn destroy_sampler(&self, sampler: Sampler) {
        let removed = self.samplers.remove(sampler.raw());
        passthrough::call(|| drop(removed));
    }

    fn create_resource(
        &self,
        desc: &ResourceDesc,
        initial_data: Option<&[SubresourceData<'_>]>,
        _initial_state: ResourceUsage,
    ) -> Result<Resource> {
        let (native, desc) = passthrough::call(|| self.create_native_resource(desc, initial_data))?;

        let raw = raw_of(&native);
        self.resources.insert(
            raw,
            ResourceData {
                desc,
                native: Com::Owned(native),
            },
        );
        debug!("resource {raw:#x} created");
        Ok(Resource::from_raw(raw))
    }

    fn destroy_resource(&self, resource: Resource) {
        let removed = self.resources.remove(resource.raw());
        passthrough::call(|| drop(removed));
    }

    fn get_resource_desc(&self, resource: Resource) -> Option<ResourceDesc> {
        self.resources.with(resource.raw(), |data| data.desc)
    }

    fn create_resource_view(
        &self,
        resource: Resource,
        usage: ResourceUsage,
        desc: &ResourceViewDesc,
    ) -> Result<ResourceView> {
        let kind = ViewKind::from_usage(usage).ok_or(Error::Unsupported("view usage"))?;
        let (resource_desc, native_resource) = {
            let data = self.resources.get(resource.raw()).ok_or(Error::InvalidHandle)?;
            (data.desc, data.native.cloned().ok_or(Error::InvalidHandle)?)
        };

        let (native, desc) = if desc.ty == ResourceViewType::Unknown {
            (None, ResourceViewDesc::whole(&resource_desc))
        } else {
            check_view_compatible(&resource_desc, desc)?;
            let mut desc = *desc;
            if desc.format == Format::Unknown {
                desc.format = resource_desc.format;
            }
            let native = conv::apply_view_desc(kind, &desc, super::element_size(&resource_desc))
                .ok_or(Error::Unsupported("view dimension"))?;
            (Some(native), desc)
        };

        let view = passthrough::call(|| self.create_native_view(kind, &native_resource, native.as_ref()))?;
        drop(native_resource);

        let raw = raw_of(&view);
        self.views.insert(
            raw,
            ViewData {
                resource,
                desc,
                kind,
                native: Com::Owned(view),
            },
        );
        Ok(ResourceView::from_raw(raw))
    }

    fn destroy_resource_view(&self, view: ResourceView) {
        let removed = self.views.remove(view.raw());
        passthrough::call(|| drop(removed));
    }

    fn get_resource_from_view(&self, view: ResourceView) -> Option<Resource> {
        self.views.with(view.raw(), |data| data.resource)
    }

    fn create_pipeline(&self, _layout: PipelineLayout, desc: &PipelineDesc<'_>) -> Result<Pipeline> {
        let data = passthrough::call(|| -> Result<PipelineData> {
            let object: ID3D11DeviceChild = match desc {
                PipelineDesc::Graphics(graphics) => {
                    return Ok(PipelineData::Graphics(Box::new(self.create_graphics_pipeline(graphics)?)));
                }
                PipelineDesc::Compute(shader)
                | PipelineDesc::VertexShader(shader)
                | PipelineDesc::HullShader(shader)
                | PipelineDesc::DomainShader(shader)
                | PipelineDesc::GeometryShader(shader)
                | PipelineDesc::PixelShader(shader) => self.create_shader(desc.ty(), shader)?,
                PipelineDesc::InputLayout(_) => {
                    return Err(Error::Unsupported("input layouts without vertex shader code"));
                }
                PipelineDesc::BlendState(blend) => self.create_blend_state(blend)?.into(),
                PipelineDesc::RasterizerState(rasterizer) => self.create_rasterizer_state(rasterizer)?.into(),
                PipelineDesc::DepthStencilState(depth_stencil) => {
                    self.create_depth_stencil_state(depth_stencil)?.into()
                }
            };
            Ok(PipelineData::Object(desc.ty(), Com::Owned(object)))
        })?;

        let raw = match &data {
            PipelineData::Object(_, com) => com.as_raw() as u64,
            PipelineData::Graphics(_) => self.next_handle(),
        };
        self.pipelines.insert(raw, data);
        Ok(Pipeline::from_raw(raw))
    }

    fn destroy_pipeline(&self, pipeline: Pipeline) {
        let removed = self.pipelines.remove(pipeline.raw());
        passthrough::call(|| drop(removed));
    }

    fn create_pipeline_layout(&self, params: &[PipelineLayoutParam]) -> Result<PipelineLayout> {
        for param in params {
            if !param.is_single_type() {
                return Err(Error::Unsupported("descriptor tables mixing descriptor types"));
            }
            let combined = match param {
                PipelineLayoutParam::PushConstants(_) => false,
                PipelineLayoutParam::PushDescriptors(range) => range.ty == DescriptorType::SamplerWithResourceView,
                PipelineLayoutParam::DescriptorTable(ranges) => ranges
                    .iter()
                    .any(|range| range.ty == DescriptorType::SamplerWithResourceView),
            };
            if combined {
                return Err(Error::Unsupported("combined sampler and view descriptors"));
            }
        }

        let raw = self.next_handle();
        self.pipeline_layouts.insert(
            raw,
            LayoutData {
                params: params.to_vec(),
                constants: Mutex::new(params.iter().map(|_| PushConstantBuffer::default()).collect()),
            },
        );
        Ok(PipelineLayout::from_raw(raw))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayout) {
        let removed = self.pipeline_layouts.remove(layout.raw());
        passthrough::call(|| drop(removed));
    }

    fn create_descriptor_set_layout(
        &self,
        ranges: &[DescriptorRange],
        _push_descriptors: bool,
    ) -> Result<DescriptorSetLayout> {
        let [range] = ranges else {
            return Err(Error::Unsupported("descriptor set layouts with several ranges"));
        };
        if range.ty == DescriptorType::SamplerWithResourceView {
            return Err(Error::Unsupported("combined sampler and view descriptors"));
        }

        let raw = self.next_handle();
        self.set_layouts.insert(raw, *range);
        Ok(DescriptorSetLayout::from_raw(raw))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayout) {
        self.set_layouts.remove(layout.raw());
    }

    fn create_query_pool(&self, ty: QueryType, size: u32) -> Result<QueryPool> {
        let native = match ty {
            QueryType::Occlusion => D3D11_QUERY_OCCLUSION,
            QueryType::BinaryOcclusion => D3D11_QUERY_OCCLUSION_PREDICATE,
            QueryType::Timestamp => D3D11_QUERY_TIMESTAMP,
            QueryType::PipelineStatistics => return Err(Error::Unsupported("pipeline statistics queries")),
        };
        let desc = D3D11_QUERY_DESC {
            Query: native,
            MiscFlags: 0,
        };

        let queries = passthrough::call(|| {
            (0..size)
                .map(|_| {
                    let mut query = None;
                    unsafe { self.device.CreateQuery(&desc, Some(&mut query)) }.map_err(native_error)?;
                    query.ok_or(Error::OutOfMemory)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let raw = self.next_handle();
        self.query_pools.insert(raw, QueryPoolData { ty, queries });
        Ok(QueryPool::from_raw(raw))
    }

    fn destroy_query_pool(&self, pool: QueryPool) {
        let removed = self.query_pools.remove(pool.raw());
        passthrough::call(|| drop(removed));
    }

    fn create_descriptor_sets(&self, layout: DescriptorSetLayout, count: usize) -> Result<Vec<DescriptorSet>> {
        let range = self.set_layouts.get_copied(layout.raw()).ok_or(Error::InvalidHandle)?;

        Ok((0..count)
            .map(|_| {
                let raw = self.next_handle();
                self.descriptor_sets.insert(raw, SetData::new(range));
                DescriptorSet::from_raw(raw)
            })
            .collect())
    }

    fn destroy_descriptor_sets(&self, sets: &[DescriptorSet]) {
        for set in sets {
            self.descriptor_sets.remove(set.raw());
        }
    }

    fn update_descriptor_sets(&self, updates: &[DescriptorSetUpdate<'_>]) {
        for update in updates {
            let Some(mut set) = self.descriptor_sets.get_mut(update.set.raw()) else {
                debug!("update of unknown descriptor set {:?}", update.set);
                continue;
            };
            set.update(update.binding, update.array_offset, &update.descriptors);
        }
    }

    fn map_resource(&self, resource: Resource, subresource: u32, access: MapAccess) -> Result<MappedSubresource> {
        let native = self.resource(resource).ok_or(Error::InvalidHandle)?;
        let map = match access {
            MapAccess::ReadOnly => D3D11_MAP_READ,
            MapAccess::WriteOnly => D3D11_MAP_WRITE,
            MapAccess::ReadWrite => D3D11_MAP_READ_WRITE,
            MapAccess::WriteDiscard => D3D11_MAP_WRITE_DISCARD,
        };

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        passthrough::call(|| unsafe { self.context.Map(&native, subresource, map, 0, Some(&mut mapped)) })
            .map_err(native_error)?;
        Ok(MappedSubresource {
            data: mapped.pData.cast(),
            row_pitch: mapped.RowPitch,
            slice_pitch: mapped.DepthPitch,
        })
    }

    fn unmap_resource(&self, resource: Resource, subresource: u32) {
        let Some(native) = self.resource(resource) else {
            return;
        };
        passthrough::call(|| unsafe { self.context.Unmap(&native, subresource) });
    }

    fn upload_buffer_region(&self, data: &[u8], dst: Resource, dst_offset: u64) -> Result<()> {
        let (desc, native) = {
            let entry = self.resources.get(dst.raw()).ok_or(Error::InvalidHandle)?;
            (entry.desc, entry.native.cloned().ok_or(Error::InvalidHandle)?)
        };
        let offset = u32::try_from(dst_offset).map_err(|_| Error::Unsupported("buffer offset"))?;

        passthrough::call(|| unsafe {
            if desc.heap == MemoryHeap::CpuToGpu {
                // Dynamic buffers can't be updated by the GPU
                let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
                self.context
                    .Map(&native, 0, D3D11_MAP_WRITE_NO_OVERWRITE, 0, Some(&mut mapped))
                    .map_err(native_error)?;
                ptr::copy_nonoverlapping(data.as_ptr(), mapped.pData.cast::<u8>().add(offset as usize), data.len());
                self.context.Unmap(&native, 0);
                return Ok(());
            }

            let region = D3D11_BOX {
                left: offset,
                top: 0,
                front: 0,
                right: offset + data.len() as u32,
                bottom: 1,
                back: 1,
            };
            self.context
                .UpdateSubresource(&native, 0, Some(&region), data.as_ptr().cast(), 0, 0);
            Ok(())
        })
    }

    fn upload_texture_region(
        &self,
        data: &SubresourceData<'_>,
        dst: Resource,
        dst_subresource: u32,
        dst_box: Option<&SubresourceBox>,
    ) -> Result<()> {
        let native = self.resource(dst).ok_or(Error::InvalidHandle)?;
        let region = dst_box.map(native_box);

        passthrough::call(|| unsafe {
            self.context.UpdateSubresource(
                &native,
                dst_subresource,
                region.as_ref().map(ptr::from_ref),
                data.data.as_ptr().cast(),
                data.row_pitch,
                data.slice_pitch,
            )
        });
        Ok(())
    }

    fn get_query_pool_results(&self, pool: QueryPool, first: u32, results: &mut [u64]) -> bool {
        let Some(data) = self.query_pools.get(pool.raw()) else {
            return false;
        };
        let size = match data.ty {
            QueryType::BinaryOcclusion => 4,
            _ => 8,
        };

        passthrough::call(|| {
            for (index, result) in results.iter_mut().enumerate() {
                let Some(query) = data.queries.get(first as usize + index) else {
                    return false;
                };

                *result = 0;
                let hr = unsafe {
                    (Interface::vtable(&self.context).GetData)(
                        Interface::as_raw(&self.context),
                        Interface::as_raw(query),
                        ptr::from_mut(result).cast(),
                        size,
                        ASYNC_GETDATA_DONOTFLUSH,
                    )
                };
                if hr != S_OK {
                    return false;
                }
            }
            true
        })
    }

    fn set_resource_name(&self, resource: Resource, name: &str) {
        let Some(native) = self.resource(resource) else {
            return;
        };

        let res = passthrough::call(|| unsafe {
            native.SetPrivateData(&WKPDID_D3DDebugObjectName, name.len() as u32, Some(name.as_ptr().cast()))
        });
        if let Err(err) = res {
            debug!("cannot name {resource:?}. err: {err:?}");
        }
    }

    fn wait_idle(&self) {
        passthrough::call(|| unsafe {
            let desc = D3D11_QUERY_DESC {
                Query: D3D11_QUERY_EVENT,
                MiscFlags: 0,
            };
            let mut query = None;
            if self.device.CreateQuery(&desc, Some(&mut query)).is_err() {
                return;
            }
            let Some(query) = query else {
                return;
            };
            self.context.End(&query);

            loop {
                let hr = (Interface::vtable(&self.context).GetData)(
                    Interface::as_raw(&self.context),
                    query.as_raw(),
                    ptr::null_mut(),
                    0,
                    0,
                );
                if hr == S_OK || hr.is_err() {
                    break;
                }
                std::thread::yield_now();
            }
        })
    }

    fn is_valid(&self, handle: AnyHandle) -> bool {
        match handle {
            AnyHandle::Resource(resource) => self.resources.contains(resource.raw()),
            AnyHandle::ResourceView(view) => self.views.contains(view.raw()),
            AnyHandle::Pipeline(pipeline) => self.pipelines.contains(pipeline.raw()),
            AnyHandle::PipelineLayout(layout) => self.pipeline_layouts.contains(layout.raw()),
            AnyHandle::DescriptorSet(set) => self.descriptor_sets.contains(set.raw()),
            AnyHandle::DescriptorSetLayout(layout) => self.set_layouts.contains(layout.raw()),
            AnyHandle::Sampler(sampler) => self.samplers.contains(sampler.raw()),
            AnyHandle::QueryPool(pool) => self.query_pools.contains(pool.raw()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_2d_mirror_round_trip() {
        let native = D3D11_TEXTURE2D_DESC {
            Width: 1920,
            Height: 1080,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT(Format::R24G8Typeless as _),
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: (D3D11_BIND_DEPTH_STENCIL.0 | D3D11_BIND_SHADER_RESOURCE.0) as _,
            CPUAccessFlags: 0,
            MiscFlags: 0,
        };
        let desc = conv::texture_2d_to_desc(&mirror_texture_2d_desc(&native));
        assert!(desc.usage.contains(ResourceUsage::DEPTH_STENCIL | ResourceUsage::SHADER_RESOURCE));

        let mut back = Texture2dDesc::default();
        assert!(conv::apply_texture_2d_desc(&desc, &mut back));
        let back = native_texture_2d_desc(&back);
        assert_eq!(back.Format, native.Format);
        assert_eq!(back.BindFlags, native.BindFlags);
        assert_eq!(back.SampleDesc.Count, 1);
    }

    #[test]
    fn view_desc_union_mirror() {
        let native = D3D11_RENDER_TARGET_VIEW_DESC {
            Format: DXGI_FORMAT(Format::R8G8B8A8UnormSrgb as _),
            ViewDimension: D3D11_RTV_DIMENSION_TEXTURE2DARRAY,
            Anonymous: D3D11_RENDER_TARGET_VIEW_DESC_0 {
                Texture2DArray: D3D11_TEX2D_ARRAY_RTV {
                    MipSlice: 1,
                    FirstArraySlice: 2,
                    ArraySize: 3,
                },
            },
        };
        let view = mirror_rtv_desc(&native);
        assert_eq!((view.first, view.first_layer, view.layers), (1, 2, 3));

        let back = native_rtv_desc(&view);
        assert_eq!(back.ViewDimension, native.ViewDimension);
        assert_eq!(unsafe { back.Anonymous.Texture2DArray.ArraySize }, 3);
    }

    #[test]
    fn input_element_names_survive() {
        let elements = [NativeInputElement {
            semantic: "TEXCOORD",
            semantic_index: 1,
            format: Format::R32G32Float as u32,
            ..Default::default()
        }];
        let (names, native) = native_input_elements(&elements);
        assert_eq!(names[0].to_str().ok(), Some("TEXCOORD"));

        let mirrored_names = unsafe { semantic_names(&native) };
        let mirrored = mirror_input_elements(&native, &mirrored_names);
        assert_eq!(mirrored[0], elements[0]);
    }
}
