//! [`Device`] implementation over an `IDirect3DDevice9`.
//!
//! Application objects are tracked by their COM pointer and borrowed without a reference,
//! so `Reset` keeps working while tint knows about them. Objects created through the
//! [`Device`] trait are owned. Every native call runs inside [`passthrough::call`] so the
//! vtable hooks don't report it back.

use core::{
    ffi::c_void,
    ptr,
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use tint_api::{
    AnyHandle, DescriptorSet, DescriptorSetLayout, Device, DeviceApi, DeviceCaps, Error, Format,
    Pipeline, PipelineLayout, QueryPool, Resource, ResourceView, Result, Sampler,
    descriptor::{DescriptorRange, DescriptorSetUpdate, Descriptors, PipelineLayoutParam},
    device::MappedSubresource,
    pipeline::{PipelineDesc, PrimitiveTopology, QueryType, Rect},
    resource::{
        MapAccess, ResourceDesc, ResourceDimension, ResourceFlags, ResourceUsage,
        ResourceViewDesc, ResourceViewType, SubresourceBox, SubresourceData, ViewRange,
        check_view_compatible,
    },
    sampler::SamplerDesc,
};
use tint_event::Registry;
use tracing::{debug, trace};
use windows::{
    Win32::{
        Foundation::{E_OUTOFMEMORY, POINT, RECT, S_FALSE, S_OK},
        Graphics::{Direct3D::WKPDID_D3DDebugObjectName, Direct3D9::*},
    },
    core::Interface,
};

use super::conv::{
    self, IndexBufferDesc, SurfaceDesc, VertexBufferDesc, VertexElement, VolumeDesc, fmt,
    pool, rtype, usage,
};
pub(crate) use crate::com::Com;
use crate::{dispatch, map::HandleTable, passthrough};

const LOCK_DISCARD: u32 = 0x2000;
const LOCK_READONLY: u32 = 0x10;
pub(crate) const ISSUE_END: u32 = 0x1;
pub(crate) const ISSUE_BEGIN: u32 = 0x2;
const GETDATA_FLUSH: u32 = 0x1;

/// `D3DDECLTYPE_FLOAT1`
const DECLTYPE_FLOAT1: u8 = 0;
/// `D3DDECLUSAGE_TEXCOORD`
const DECLUSAGE_TEXCOORD: u8 = 5;

pub(crate) enum NativeResource {
    Texture(Com<IDirect3DTexture9>),
    CubeTexture(Com<IDirect3DCubeTexture9>),
    VolumeTexture(Com<IDirect3DVolumeTexture9>),
    Surface(Com<IDirect3DSurface9>),
    VertexBuffer(Com<IDirect3DVertexBuffer9>),
    IndexBuffer(Com<IDirect3DIndexBuffer9>),
}

impl NativeResource {
    pub fn as_raw(&self) -> *mut c_void {
        match self {
            Self::Texture(com) => com.as_raw(),
            Self::CubeTexture(com) => com.as_raw(),
            Self::VolumeTexture(com) => com.as_raw(),
            Self::Surface(com) => com.as_raw(),
            Self::VertexBuffer(com) => com.as_raw(),
            Self::IndexBuffer(com) => com.as_raw(),
        }
    }

    fn resource(&self) -> Option<&IDirect3DResource9> {
        Some(match self {
            Self::Texture(com) => com.get()?,
            Self::CubeTexture(com) => com.get()?,
            Self::VolumeTexture(com) => com.get()?,
            Self::Surface(com) => com.get()?,
            Self::VertexBuffer(com) => com.get()?,
            Self::IndexBuffer(com) => com.get()?,
        })
    }

    fn base_texture(&self) -> Option<&IDirect3DBaseTexture9> {
        Some(match self {
            Self::Texture(com) => com.get()?,
            Self::CubeTexture(com) => com.get()?,
            Self::VolumeTexture(com) => com.get()?,
            _ => return None,
        })
    }
}

pub(crate) struct ResourceData {
    pub desc: ResourceDesc,
    pub native: NativeResource,
}

impl ResourceData {
    /// Layer and level of subresource `index`.
    fn split(&self, index: u32) -> (u32, u32) {
        let levels = self.desc.levels().max(1) as u32;
        (index / levels, index % levels)
    }

    /// Surface backing subresource `index` of a 2D resource.
    pub fn surface(&self, index: u32) -> Result<IDirect3DSurface9> {
        let (layer, level) = self.split(index);
        unsafe {
            match &self.native {
                NativeResource::Texture(com) => com
                    .get()
                    .ok_or(Error::InvalidHandle)?
                    .GetSurfaceLevel(level)
                    .map_err(native_error),
                NativeResource::CubeTexture(com) => com
                    .get()
                    .ok_or(Error::InvalidHandle)?
                    .GetCubeMapSurface(D3DCUBEMAP_FACES(layer as _), level)
                    .map_err(native_error),
                NativeResource::Surface(com) if index == 0 => {
                    com.get().cloned().ok_or(Error::InvalidHandle)
                }
                _ => Err(Error::Unsupported("subresource has no surface")),
            }
        }
    }
}

/// What a view handle stands for. D3D9 has no view objects.
pub(crate) enum NativeView {
    /// Render target or depth-stencil surface.
    Surface(Com<IDirect3DSurface9>),
    /// Texture bound for sampling.
    Texture(Com<IDirect3DBaseTexture9>),
}

pub(crate) struct ViewData {
    pub resource: Resource,
    pub desc: ResourceViewDesc,
    pub native: NativeView,
    /// Creations sharing the handle.
    refs: u32,
}

/// Handle of a view over `object`. The low bit of the pointer marks sRGB views.
#[inline]
fn view_handle(object: *mut c_void, format: Format) -> ResourceView {
    ResourceView::from_raw(object as u64 | format.is_srgb() as u64)
}

#[inline]
pub(crate) fn is_srgb_view(view: ResourceView) -> bool {
    view.raw() & 1 != 0
}

pub(crate) struct GraphicsPipeline {
    pub vertex_shader: Option<IDirect3DVertexShader9>,
    pub pixel_shader: Option<IDirect3DPixelShader9>,
    pub declaration: Option<IDirect3DVertexDeclaration9>,
    pub states: Vec<(u32, u32)>,
    pub topology: u32,
    /// Vertex shader reads the vertex index from stream 0.
    pub vertex_ids: bool,
}

pub(crate) enum PipelineData {
    VertexShader(Com<IDirect3DVertexShader9>),
    PixelShader(Com<IDirect3DPixelShader9>),
    InputLayout(Com<IDirect3DVertexDeclaration9>),
    /// Render states of a blend, rasterizer or depth-stencil state.
    States(Vec<(u32, u32)>),
    Graphics(Box<GraphicsPipeline>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Descriptor {
    Empty,
    Sampler(Sampler),
    View(ResourceView),
    SamplerWithView(Sampler, ResourceView),
}

pub(crate) struct SetData {
    pub range: DescriptorRange,
    pub slots: Vec<Descriptor>,
}

pub(crate) struct QueryPoolData {
    pub ty: QueryType,
    pub queries: Vec<IDirect3DQuery9>,
}

/// Command list state the native device doesn't keep.
pub(crate) struct CommandState {
    /// `D3DPRIMITIVETYPE` of the next draw.
    pub topology: u32,
    pub vertex_ids: bool,
    /// Buffer of vertex indices as floats and its vertex count.
    pub vertex_id_buffer: Option<(IDirect3DVertexBuffer9, u32)>,
}

pub struct DeviceImpl {
    pub(crate) device: IDirect3DDevice9,
    d3d: IDirect3D9,
    adapter: u32,
    device_type: D3DDEVTYPE,
    adapter_format: D3DFORMAT,
    raster_caps: u32,
    misc_caps: u32,
    pub(crate) max_render_targets: u32,

    pub(crate) resources: HandleTable<ResourceData>,
    pub(crate) views: HandleTable<ViewData>,
    pub(crate) samplers: HandleTable<SamplerDesc>,
    pub(crate) pipelines: HandleTable<PipelineData>,
    pub(crate) pipeline_layouts: HandleTable<Vec<PipelineLayoutParam>>,
    pub(crate) set_layouts: HandleTable<DescriptorRange>,
    pub(crate) descriptor_sets: HandleTable<SetData>,
    pub(crate) query_pools: HandleTable<QueryPoolData>,
    pub(crate) state: Mutex<CommandState>,
    next_id: AtomicU64,
}

// D3D9 devices are used from the thread the application renders on
unsafe impl Send for DeviceImpl {}
unsafe impl Sync for DeviceImpl {}

/// Maps a failed native call to the unified error.
pub(crate) fn native_error(err: windows::core::Error) -> Error {
    let code = err.code();
    if code == D3DERR_OUTOFVIDEOMEMORY || code == E_OUTOFMEMORY {
        Error::OutOfMemory
    } else if code == D3DERR_DEVICELOST {
        Error::DeviceLost
    } else {
        Error::Native(code.0)
    }
}

pub(crate) fn mirror_surface_desc(desc: &D3DSURFACE_DESC) -> SurfaceDesc {
    SurfaceDesc {
        format: desc.Format.0 as u32,
        ty: desc.Type.0 as u32,
        usage: desc.Usage,
        pool: desc.Pool.0 as u32,
        multisample_type: desc.MultiSampleType.0 as u32,
        multisample_quality: desc.MultiSampleQuality,
        width: desc.Width,
        height: desc.Height,
    }
}

pub(crate) fn mirror_volume_desc(desc: &D3DVOLUME_DESC) -> VolumeDesc {
    VolumeDesc {
        format: desc.Format.0 as u32,
        ty: desc.Type.0 as u32,
        usage: desc.Usage,
        pool: desc.Pool.0 as u32,
        width: desc.Width,
        height: desc.Height,
        depth: desc.Depth,
    }
}

pub(crate) fn mirror_vertex_buffer_desc(desc: &D3DVERTEXBUFFER_DESC) -> VertexBufferDesc {
    VertexBufferDesc {
        format: desc.Format.0 as u32,
        ty: desc.Type.0 as u32,
        usage: desc.Usage,
        pool: desc.Pool.0 as u32,
        size: desc.Size,
        fvf: desc.FVF,
    }
}

pub(crate) fn mirror_index_buffer_desc(desc: &D3DINDEXBUFFER_DESC) -> IndexBufferDesc {
    IndexBufferDesc {
        format: desc.Format.0 as u32,
        ty: desc.Type.0 as u32,
        usage: desc.Usage,
        pool: desc.Pool.0 as u32,
        size: desc.Size,
    }
}

pub(crate) fn native_elements(declaration: &[VertexElement]) -> Vec<D3DVERTEXELEMENT9> {
    declaration
        .iter()
        .map(|element| D3DVERTEXELEMENT9 {
            Stream: element.stream,
            Offset: element.offset,
            Type: element.ty,
            Method: element.method,
            Usage: element.usage,
            UsageIndex: element.usage_index,
        })
        .collect()
}

/// Declaration behind a native element array, up to and including `D3DDECL_END()`.
///
/// # Safety
/// elements must point to a terminated declaration.
pub(crate) unsafe fn mirror_elements(elements: *const D3DVERTEXELEMENT9) -> Vec<VertexElement> {
    let mut declaration = Vec::new();
    for index in 0.. {
        let element = unsafe { &*elements.add(index) };
        let element = VertexElement {
            stream: element.Stream,
            offset: element.Offset,
            ty: element.Type,
            method: element.Method,
            usage: element.Usage,
            usage_index: element.UsageIndex,
        };
        declaration.push(element);
        if element.stream == VertexElement::END.stream {
            break;
        }
    }

    declaration
}

pub(crate) fn rect(rect: &Rect) -> RECT {
    RECT {
        left: rect.left,
        top: rect.top,
        right: rect.right,
        bottom: rect.bottom,
    }
}

pub(crate) fn box_rect(b: &SubresourceBox) -> RECT {
    RECT {
        left: b.left,
        top: b.top,
        right: b.right,
        bottom: b.bottom,
    }
}

/// Copies `rows` rows of `row_bytes` each from `data` to a locked pointer.
///
/// # Safety
/// dst must be valid for `rows` rows of `dst_pitch` bytes.
unsafe fn copy_rows(dst: *mut u8, dst_pitch: usize, data: &SubresourceData<'_>, row_bytes: usize, rows: usize) {
    let src_pitch = data.row_pitch as usize;
    for row in 0..rows {
        let Some(src) = data.data.get(row * src_pitch..row * src_pitch + row_bytes) else {
            break;
        };
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst.add(row * dst_pitch), row_bytes) };
    }
}

/// Row size and row count of a `width` x `height` region.
fn region_rows(format: Format, width: u32, height: u32) -> (usize, usize) {
    let row_bytes = format.row_pitch(width);
    let rows = format.slice_pitch(row_bytes, height) / row_bytes.max(1);
    (row_bytes as usize, rows as usize)
}

impl DeviceImpl {
    pub(crate) fn new(device: IDirect3DDevice9) -> windows::core::Result<Self> {
        let mut caps = D3DCAPS9::default();
        let mut params = D3DDEVICE_CREATION_PARAMETERS::default();
        let mut mode = D3DDISPLAYMODE::default();
        let d3d = passthrough::call(|| unsafe {
            device.GetDeviceCaps(&mut caps)?;
            device.GetCreationParameters(&mut params)?;
            _ = device.GetDisplayMode(0, &mut mode);
            device.GetDirect3D()
        })?;

        Ok(Self {
            device,
            d3d,
            adapter: params.AdapterOrdinal,
            device_type: params.DeviceType,
            adapter_format: mode.Format,
            raster_caps: caps.RasterCaps,
            misc_caps: caps.PrimitiveMiscCaps,
            max_render_targets: caps.NumSimultaneousRTs.max(1),
            resources: HandleTable::new(),
            views: HandleTable::new(),
            samplers: HandleTable::new(),
            pipelines: HandleTable::new(),
            pipeline_layouts: HandleTable::new(),
            set_layouts: HandleTable::new(),
            descriptor_sets: HandleTable::new(),
            query_pools: HandleTable::new(),
            state: Mutex::new(CommandState {
                topology: conv::topology_to_d3d(PrimitiveTopology::TriangleList),
                vertex_ids: false,
                vertex_id_buffer: None,
            }),
            next_id: AtomicU64::new(0),
        })
    }

    #[inline]
    pub fn raw(&self) -> u64 {
        self.device.as_raw() as u64
    }

    /// Handle for an object without a native counterpart. Odd, so it never equals a pointer.
    fn next_handle(&self) -> u64 {
        (self.next_id.fetch_add(1, Ordering::Relaxed) << 1) | 1
    }

    /// Tracks an application resource. Returns `false` if it was known already.
    pub(crate) fn adopt_resource(&self, native: NativeResource, desc: ResourceDesc) -> bool {
        let raw = native.as_raw() as u64;
        if self.resources.contains(raw) {
            return false;
        }

        self.resources.insert(raw, ResourceData { desc, native })
    }

    /// Tracks an application surface as a resource, reading its description.
    pub(crate) fn adopt_surface(&self, surface: &IDirect3DSurface9) -> Option<(Resource, ResourceDesc)> {
        let raw = surface.as_raw() as u64;
        if let Some(desc) = self.resources.with(raw, |data| data.desc) {
            return Some((Resource::from_raw(raw), desc));
        }

        let mut native = D3DSURFACE_DESC::default();
        passthrough::call(|| unsafe { surface.GetDesc(&mut native) }).ok()?;
        let desc = conv::surface_to_desc(&mirror_surface_desc(&native), 1);
        self.adopt_resource(
            NativeResource::Surface(Com::Borrowed(surface.as_raw())),
            desc,
        );

        Some((Resource::from_raw(raw), desc))
    }

    /// View handle of a bound application surface, tracking it on first use.
    ///
    /// Surfaces that are texture levels report the texture as their resource.
    pub(crate) fn adopt_surface_view(&self, surface: &IDirect3DSurface9, usage: ResourceUsage) -> ResourceView {
        let handle = ResourceView::from_raw(surface.as_raw() as u64);
        if self.views.contains(handle.raw()) {
            return handle;
        }

        let container = passthrough::call(|| unsafe { surface.GetContainer::<IDirect3DBaseTexture9>() })
            .ok()
            .map(|texture| texture.as_raw() as u64)
            .filter(|raw| self.resources.contains(*raw));
        let (resource, format) = match container {
            Some(raw) => {
                let format = self.resources.with(raw, |data| data.desc.format).unwrap_or_default();
                (Resource::from_raw(raw), format)
            }
            None => match self.adopt_surface(surface) {
                Some((resource, desc)) => (resource, desc.format),
                None => (Resource::from_raw(surface.as_raw() as u64), Format::Unknown),
            },
        };

        let ty = if usage.intersects(ResourceUsage::RENDER_TARGET | ResourceUsage::DEPTH_STENCIL) {
            ResourceViewType::Texture2d
        } else {
            Default::default()
        };
        self.views.insert(
            handle.raw(),
            ViewData {
                resource,
                desc: ResourceViewDesc::new(ty, format, ViewRange::ALL),
                native: NativeView::Surface(Com::Borrowed(surface.as_raw())),
                refs: 1,
            },
        );
        handle
    }

    /// Tracks an application shader or declaration created through a hook.
    pub(crate) fn adopt_pipeline(&self, data: PipelineData) -> Pipeline {
        let raw = match &data {
            PipelineData::VertexShader(com) => com.as_raw() as u64,
            PipelineData::PixelShader(com) => com.as_raw() as u64,
            PipelineData::InputLayout(com) => com.as_raw() as u64,
            PipelineData::States(_) | PipelineData::Graphics(_) => self.next_handle(),
        };
        self.pipelines.insert(raw, data);
        Pipeline::from_raw(raw)
    }

    /// Tracks a resource the application created through a hook.
    ///
    /// A previous entry at the same address belonged to an object released since, it is
    /// reported destroyed first.
    pub(crate) fn track_resource(
        &self,
        registry: &Registry,
        native: NativeResource,
        desc: ResourceDesc,
        initial_state: ResourceUsage,
    ) -> Resource {
        let resource = Resource::from_raw(native.as_raw() as u64);
        if self.resources.remove(resource.raw()).is_some() {
            dispatch::destroy_resource(registry, self, resource);
        }

        self.resources.insert(resource.raw(), ResourceData { desc, native });
        dispatch::init_resource(registry, self, &desc, initial_state, resource);
        resource
    }

    /// Tracks a shader or declaration the application created through a hook.
    pub(crate) fn track_pipeline(
        &self,
        registry: &Registry,
        data: PipelineData,
        desc: &PipelineDesc<'_>,
    ) -> Pipeline {
        let pipeline = match &data {
            PipelineData::VertexShader(com) => Pipeline::from_raw(com.as_raw() as u64),
            PipelineData::PixelShader(com) => Pipeline::from_raw(com.as_raw() as u64),
            PipelineData::InputLayout(com) => Pipeline::from_raw(com.as_raw() as u64),
            PipelineData::States(_) | PipelineData::Graphics(_) => return self.adopt_pipeline(data),
        };
        if self.pipelines.remove(pipeline.raw()).is_some() {
            dispatch::destroy_pipeline(registry, self, pipeline);
        }

        self.pipelines.insert(pipeline.raw(), data);
        dispatch::init_pipeline(registry, self, PipelineLayout::NULL, desc, pipeline);
        pipeline
    }

    /// New reference to the native object of a substitute resource, for the application.
    pub(crate) fn hand_out_resource(&self, resource: Resource) -> Option<*mut c_void> {
        let raw = self.resources.with(resource.raw(), |data| data.native.as_raw())?;
        unsafe { windows::core::IUnknown::from_raw_borrowed(&raw) }
            .cloned()
            .map(windows::core::IUnknown::into_raw)
    }

    /// New reference to the native object of a substitute shader or declaration.
    pub(crate) fn hand_out_pipeline(&self, pipeline: Pipeline) -> Option<*mut c_void> {
        let raw = self.pipelines.with(pipeline.raw(), |data| match data {
            PipelineData::VertexShader(com) => Some(com.as_raw()),
            PipelineData::PixelShader(com) => Some(com.as_raw()),
            PipelineData::InputLayout(com) => Some(com.as_raw()),
            PipelineData::States(_) | PipelineData::Graphics(_) => None,
        })??;
        unsafe { windows::core::IUnknown::from_raw_borrowed(&raw) }
            .cloned()
            .map(windows::core::IUnknown::into_raw)
    }

    /// View handle of a texture the application binds for sampling.
    pub(crate) fn adopt_texture_view(&self, texture: &IDirect3DBaseTexture9, srgb: bool) -> ResourceView {
        let resource = Resource::from_raw(texture.as_raw() as u64);
        let mut format = self
            .resources
            .with(resource.raw(), |data| data.desc.format)
            .unwrap_or_default();
        if srgb {
            format = format.default_typed_srgb();
        }

        let handle = view_handle(texture.as_raw(), format);
        if !self.views.contains(handle.raw()) {
            self.views.insert(
                handle.raw(),
                ViewData {
                    resource,
                    desc: ResourceViewDesc::new(Default::default(), format, ViewRange::ALL),
                    native: NativeView::Texture(Com::Borrowed(texture.as_raw())),
                    refs: 1,
                },
            );
        }
        handle
    }

    /// Resource and subresource index an application surface belongs to.
    pub(crate) fn surface_subresource(&self, surface: &IDirect3DSurface9) -> (Resource, u32) {
        passthrough::call(|| unsafe {
            if let Ok(texture) = surface.GetContainer::<IDirect3DTexture9>() {
                let levels = texture.GetLevelCount();
                let level = (0..levels).find(|&level| {
                    texture
                        .GetSurfaceLevel(level)
                        .is_ok_and(|level| level.as_raw() == surface.as_raw())
                });
                if let Some(level) = level {
                    return (Resource::from_raw(texture.as_raw() as u64), level);
                }
            }

            if let Ok(cube) = surface.GetContainer::<IDirect3DCubeTexture9>() {
                let levels = cube.GetLevelCount();
                for face in 0..6 {
                    for level in 0..levels {
                        let found = cube
                            .GetCubeMapSurface(D3DCUBEMAP_FACES(face), level)
                            .is_ok_and(|level| level.as_raw() == surface.as_raw());
                        if found {
                            return (
                                Resource::from_raw(cube.as_raw() as u64),
                                face as u32 * levels + level,
                            );
                        }
                    }
                }
            }

            (Resource::from_raw(surface.as_raw() as u64), 0)
        })
    }

    /// Drops every tracked object ahead of `Reset`, firing destroy events first.
    pub(crate) fn release_tracked(&self, registry: &Registry) {
        for (raw, _) in self.views.drain() {
            dispatch::destroy_resource_view(registry, self, ResourceView::from_raw(raw));
        }
        for (raw, _) in self.resources.drain() {
            dispatch::destroy_resource(registry, self, Resource::from_raw(raw));
        }
        for (raw, _) in self.pipelines.drain() {
            dispatch::destroy_pipeline(registry, self, Pipeline::from_raw(raw));
        }

        let mut state = self.state.lock();
        state.vertex_id_buffer = None;
        state.vertex_ids = false;
    }

    /// Surface behind a render target or depth-stencil view.
    pub(crate) fn view_surface(&self, view: ResourceView) -> Option<IDirect3DSurface9> {
        self.views.get(view.raw()).and_then(|data| match &data.native {
            NativeView::Surface(com) => com.get().cloned(),
            NativeView::Texture(_) => None,
        })
    }

    pub(crate) fn view_texture(&self, view: ResourceView) -> Option<IDirect3DBaseTexture9> {
        self.views.get(view.raw()).and_then(|data| match &data.native {
            NativeView::Texture(com) => com.get().cloned(),
            NativeView::Surface(_) => None,
        })
    }

    pub(crate) fn resource_surface(&self, resource: Resource, index: u32) -> Result<IDirect3DSurface9> {
        self.resources
            .get(resource.raw())
            .ok_or(Error::InvalidHandle)?
            .surface(index)
    }

    /// Vertex buffer holding the floats `0..count`, grown on demand.
    pub(crate) fn vertex_id_buffer(&self, state: &mut CommandState, count: u32) -> Option<IDirect3DVertexBuffer9> {
        if let Some((buffer, len)) = &state.vertex_id_buffer {
            if *len >= count {
                return Some(buffer.clone());
            }
        }

        let count = count.next_power_of_two().max(1024);
        let mut buffer = None;
        unsafe {
            self.device
                .CreateVertexBuffer(
                    count * 4,
                    usage::WRITEONLY,
                    0,
                    D3DPOOL(pool::MANAGED as _),
                    &mut buffer,
                    ptr::null_mut(),
                )
                .ok()?;
        }
        let buffer = buffer?;

        let mut data = ptr::null_mut();
        unsafe { buffer.Lock(0, 0, &mut data, 0) }.ok()?;
        let ids = unsafe { core::slice::from_raw_parts_mut(data.cast::<f32>(), count as usize) };
        for (index, id) in ids.iter_mut().enumerate() {
            *id = index as f32;
        }
        _ = unsafe { buffer.Unlock() };

        trace!("vertex id buffer grown to {count} vertices");
        state.vertex_id_buffer = Some((buffer.clone(), count));
        Some(buffer)
    }

    fn create_texture(&self, desc: &ResourceDesc, native: &SurfaceDesc, levels: u32) -> Result<NativeResource> {
        let format = D3DFORMAT(native.format as _);
        let pool = D3DPOOL(native.pool as _);
        unsafe {
            match native.ty {
                rtype::CUBETEXTURE => {
                    let mut texture = None;
                    self.device
                        .CreateCubeTexture(native.width, levels, native.usage, format, pool, &mut texture, ptr::null_mut())
                        .map_err(native_error)?;
                    let texture = texture.ok_or(Error::OutOfMemory)?;
                    Ok(NativeResource::CubeTexture(Com::Owned(texture)))
                }
                rtype::TEXTURE => {
                    let mut texture = None;
                    self.device
                        .CreateTexture(
                            native.width,
                            native.height,
                            levels,
                            native.usage,
                            format,
                            pool,
                            &mut texture,
                            ptr::null_mut(),
                        )
                        .map_err(native_error)?;
                    let texture = texture.ok_or(Error::OutOfMemory)?;
                    Ok(NativeResource::Texture(Com::Owned(texture)))
                }
                _ => {
                    let mut surface = None;
                    let multisample = D3DMULTISAMPLE_TYPE(native.multisample_type as _);
                    if desc.usage.intersects(ResourceUsage::DEPTH_STENCIL) {
                        self.device.CreateDepthStencilSurface(
                            native.width,
                            native.height,
                            format,
                            multisample,
                            native.multisample_quality,
                            false,
                            &mut surface,
                            ptr::null_mut(),
                        )
                    } else if desc.usage.contains(ResourceUsage::RENDER_TARGET) {
                        self.device.CreateRenderTarget(
                            native.width,
                            native.height,
                            format,
                            multisample,
                            native.multisample_quality,
                            false,
                            &mut surface,
                            ptr::null_mut(),
                        )
                    } else {
                        self.device.CreateOffscreenPlainSurface(
                            native.width,
                            native.height,
                            format,
                            pool,
                            &mut surface,
                            ptr::null_mut(),
                        )
                    }
                    .map_err(native_error)?;
                    let surface = surface.ok_or(Error::OutOfMemory)?;
                    Ok(NativeResource::Surface(Com::Owned(surface)))
                }
            }
        }
    }

    fn create_native_resource(&self, desc: &ResourceDesc) -> Result<(NativeResource, ResourceDesc)> {
        let mut desc = *desc;
        match desc.dimension {
            ResourceDimension::Buffer { size, .. } => {
                let size = u32::try_from(size).map_err(|_| Error::Unsupported("buffer larger than 4 GiB"))?;
                let usage = conv::usage_to_d3d(desc.usage, desc.flags) | usage::WRITEONLY;
                let pool = D3DPOOL(conv::pool_from_heap(desc.heap, desc.usage, desc.flags) as _);
                unsafe {
                    if desc.usage.contains(ResourceUsage::INDEX_BUFFER) {
                        let format = if desc.format == Format::R32Uint {
                            fmt::INDEX32
                        } else {
                            fmt::INDEX16
                        };
                        let mut buffer = None;
                        self.device
                            .CreateIndexBuffer(size, usage, D3DFORMAT(format as _), pool, &mut buffer, ptr::null_mut())
                            .map_err(native_error)?;
                        let buffer = buffer.ok_or(Error::OutOfMemory)?;
                        Ok((NativeResource::IndexBuffer(Com::Owned(buffer)), desc))
                    } else {
                        let mut buffer = None;
                        self.device
                            .CreateVertexBuffer(size, usage, 0, pool, &mut buffer, ptr::null_mut())
                            .map_err(native_error)?;
                        let buffer = buffer.ok_or(Error::OutOfMemory)?;
                        Ok((NativeResource::VertexBuffer(Com::Owned(buffer)), desc))
                    }
                }
            }
            ResourceDimension::Texture2d { layers, samples, .. } => {
                let cube = layers == 6 && desc.flags.contains(ResourceFlags::CUBE_COMPATIBLE);
                if layers != 1 && !cube {
                    return Err(Error::Unsupported("texture arrays"));
                }

                let attachment =
                    desc.usage.intersects(ResourceUsage::RENDER_TARGET | ResourceUsage::DEPTH_STENCIL);
                let sampled = desc.usage.intersects(ResourceUsage::SHADER_RESOURCE);
                let ty = if cube {
                    rtype::CUBETEXTURE
                } else if samples > 1 || (attachment && !sampled) || desc.usage.is_empty() {
                    rtype::SURFACE
                } else {
                    rtype::TEXTURE
                };

                let mut native = SurfaceDesc {
                    ty,
                    ..Default::default()
                };
                let levels = conv::apply_surface_desc(&desc, &mut native)
                    .ok_or(Error::Unsupported("texture format"))?;

                // StretchRect only writes render target textures
                if ty != rtype::SURFACE
                    && native.pool == pool::DEFAULT
                    && !desc.format.is_depth_stencil()
                    && desc.usage.intersects(ResourceUsage::COPY_DEST | ResourceUsage::RESOLVE_DEST)
                {
                    native.usage |= usage::RENDERTARGET;
                }

                let resource = self.create_texture(&desc, &native, levels)?;
                if let Some(texture) = resource.base_texture() {
                    let created = unsafe { texture.GetLevelCount() } as u16;
                    if let ResourceDimension::Texture2d { levels, .. } = &mut desc.dimension {
                        *levels = created;
                    }
                }
                Ok((resource, desc))
            }
            ResourceDimension::Texture3d { .. } => {
                let mut native = VolumeDesc::default();
                let levels =
                    conv::apply_volume_desc(&desc, &mut native).ok_or(Error::Unsupported("volume format"))?;

                let mut texture = None;
                unsafe {
                    self.device
                        .CreateVolumeTexture(
                            native.width,
                            native.height,
                            native.depth,
                            levels,
                            native.usage,
                            D3DFORMAT(native.format as _),
                            D3DPOOL(native.pool as _),
                            &mut texture,
                            ptr::null_mut(),
                        )
                        .map_err(native_error)?;
                }
                let texture = texture.ok_or(Error::OutOfMemory)?;
                let created = unsafe { texture.GetLevelCount() } as u16;
                if let ResourceDimension::Texture3d { levels, .. } = &mut desc.dimension {
                    *levels = created;
                }
                Ok((NativeResource::VolumeTexture(Com::Owned(texture)), desc))
            }
            ResourceDimension::Texture1d { .. } => Err(Error::Unsupported("1D textures")),
        }
    }

    /// Writes `initial_data` into a freshly created resource.
    fn upload_initial_data(&self, data: &ResourceData, initial_data: &[SubresourceData<'_>]) -> Result<()> {
        match &data.native {
            NativeResource::VertexBuffer(_) | NativeResource::IndexBuffer(_) => {
                let Some(first) = initial_data.first() else {
                    return Ok(());
                };
                self.write_buffer(data, first.data, 0)
            }
            NativeResource::Texture(_) | NativeResource::CubeTexture(_) | NativeResource::Surface(_) => {
                for (index, subresource) in initial_data.iter().enumerate() {
                    self.write_texture(data, subresource, index as u32, None)?;
                }
                Ok(())
            }
            NativeResource::VolumeTexture(_) => Err(Error::Unsupported("volume texture initial data")),
        }
    }

    fn write_buffer(&self, data: &ResourceData, bytes: &[u8], offset: u64) -> Result<()> {
        let offset = u32::try_from(offset).map_err(|_| Error::Unsupported("buffer offset"))?;
        let size = bytes.len() as u32;
        let mut mapped = ptr::null_mut();
        unsafe {
            match &data.native {
                NativeResource::VertexBuffer(com) => {
                    let buffer = com.get().ok_or(Error::InvalidHandle)?;
                    buffer.Lock(offset, size, &mut mapped, 0).map_err(native_error)?;
                    ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.cast::<u8>(), bytes.len());
                    buffer.Unlock().map_err(native_error)
                }
                NativeResource::IndexBuffer(com) => {
                    let buffer = com.get().ok_or(Error::InvalidHandle)?;
                    buffer.Lock(offset, size, &mut mapped, 0).map_err(native_error)?;
                    ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.cast::<u8>(), bytes.len());
                    buffer.Unlock().map_err(native_error)
                }
                _ => Err(Error::Unsupported("buffer upload into a texture")),
            }
        }
    }

    /// Writes one 2D subresource. Default pool textures go through a system memory surface.
    fn write_texture(
        &self,
        data: &ResourceData,
        subresource: &SubresourceData<'_>,
        index: u32,
        dst_box: Option<&SubresourceBox>,
    ) -> Result<()> {
        let (_, level) = data.split(index);
        let (width, height, _) = data.desc.extent();
        let (width, height) = dst_box.map_or(
            ((width >> level).max(1), (height >> level).max(1)),
            |b| (b.width(), b.height()),
        );
        let (row_bytes, rows) = region_rows(data.desc.format, width, height);

        let surface = data.surface(index)?;
        let mut native = D3DSURFACE_DESC::default();
        unsafe { surface.GetDesc(&mut native) }.map_err(native_error)?;

        if native.Pool.0 as u32 != pool::DEFAULT {
            let region = dst_box.map(box_rect);
            let mut locked = D3DLOCKED_RECT::default();
            unsafe {
                surface
                    .LockRect(&mut locked, region.as_ref().map_or(ptr::null(), |r| r as *const RECT), 0)
                    .map_err(native_error)?;
                copy_rows(locked.pBits.cast(), locked.Pitch as usize, subresource, row_bytes, rows);
                return surface.UnlockRect().map_err(native_error);
            }
        }

        let mut staging = None;
        unsafe {
            self.device
                .CreateOffscreenPlainSurface(
                    width,
                    height,
                    native.Format,
                    D3DPOOL(pool::SYSTEMMEM as _),
                    &mut staging,
                    ptr::null_mut(),
                )
                .map_err(native_error)?;
            let staging = staging.ok_or(Error::OutOfMemory)?;

            let mut locked = D3DLOCKED_RECT::default();
            staging.LockRect(&mut locked, ptr::null(), 0).map_err(native_error)?;
            copy_rows(locked.pBits.cast(), locked.Pitch as usize, subresource, row_bytes, rows);
            staging.UnlockRect().map_err(native_error)?;

            let point = dst_box.map(|b| POINT { x: b.left, y: b.top });
            self.device
                .UpdateSurface(
                    &staging,
                    ptr::null(),
                    &surface,
                    point.as_ref().map_or(ptr::null(), |p| p as *const POINT),
                )
                .map_err(native_error)
        }
    }
}

impl Device for DeviceImpl {
    fn api(&self) -> DeviceApi {
        DeviceApi::D3D9
    }

    fn check_capability(&self, cap: DeviceCaps) -> bool {
        super::capability(cap, self.raster_caps, self.misc_caps)
    }

    fn check_format_support(&self, format: Format, usage: ResourceUsage) -> bool {
        let native = conv::format_to_d3d(format, false);
        if native == fmt::UNKNOWN {
            return false;
        }

        let mut bits = 0;
        if usage.contains(ResourceUsage::RENDER_TARGET) {
            bits |= self::usage::RENDERTARGET;
        }
        if usage.intersects(ResourceUsage::DEPTH_STENCIL) {
            bits |= self::usage::DEPTHSTENCIL;
        }
        let ty = if usage.intersects(ResourceUsage::SHADER_RESOURCE) {
            rtype::TEXTURE
        } else {
            rtype::SURFACE
        };

        passthrough::call(|| unsafe {
            self.d3d.CheckDeviceFormat(
                self.adapter,
                self.device_type,
                self.adapter_format,
                bits,
                D3DRESOURCETYPE(ty as _),
                D3DFORMAT(native as _),
            )
        })
        .is_ok()
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Sampler> {
        if desc.filter.is_compare() {
            return Err(Error::Unsupported("comparison samplers"));
        }

        let raw = self.next_handle();
        self.samplers.insert(raw, *desc);
        Ok(Sampler::from_raw(raw))
    }

    fn destroy_sampler(&self, sampler: Sampler) {
        self.samplers.remove(sampler.raw());
    }

    fn create_resource(
        &self,
        desc: &ResourceDesc,
        initial_data: Option<&[SubresourceData<'_>]>,
        _initial_state: ResourceUsage,
    ) -> Result<Resource> {
        passthrough::call(|| {
            let (native, desc) = self.create_native_resource(desc)?;
            let data = ResourceData { desc, native };
            if let Some(initial_data) = initial_data {
                self.upload_initial_data(&data, initial_data)?;
            }

            let raw = data.native.as_raw() as u64;
            self.resources.insert(raw, data);
            debug!("resource {raw:#x} created");
            Ok(Resource::from_raw(raw))
        })
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
        let data = self.resources.get(resource.raw()).ok_or(Error::InvalidHandle)?;
        check_view_compatible(&data.desc, desc)?;

        let format = if desc.format == Format::Unknown {
            data.desc.format
        } else {
            desc.format
        };
        let (first_level, first_layer) = match desc.range {
            ViewRange::Texture {
                first_level,
                first_layer,
                ..
            } => (first_level, first_layer),
            ViewRange::Buffer { .. } => {
                return Err(Error::Unsupported("buffer views"));
            }
        };

        let native = passthrough::call(|| -> Result<NativeView> {
            if usage.intersects(ResourceUsage::RENDER_TARGET | ResourceUsage::DEPTH_STENCIL) {
                let levels = data.desc.levels().max(1) as u32;
                let surface = data.surface(first_layer * levels + first_level)?;
                Ok(NativeView::Surface(Com::Owned(surface)))
            } else if usage.intersects(ResourceUsage::SHADER_RESOURCE) {
                let texture = data
                    .native
                    .base_texture()
                    .ok_or(Error::Unsupported("surfaces can't be sampled"))?;
                Ok(NativeView::Texture(Com::Owned(texture.clone())))
            } else {
                Err(Error::Unsupported("view usage"))
            }
        })?;
        drop(data);

        let object = match &native {
            NativeView::Surface(com) => com.as_raw(),
            NativeView::Texture(com) => com.as_raw(),
        };
        let handle = view_handle(object, format);
        if let Some(mut existing) = self.views.get_mut(handle.raw()) {
            existing.refs += 1;
            passthrough::call(|| drop(native));
            return Ok(handle);
        }

        self.views.insert(
            handle.raw(),
            ViewData {
                resource,
                desc: ResourceViewDesc { format, ..*desc },
                native,
                refs: 1,
            },
        );
        Ok(handle)
    }

    fn destroy_resource_view(&self, view: ResourceView) {
        let last = match self.views.get_mut(view.raw()) {
            Some(mut data) => {
                data.refs -= 1;
                data.refs == 0
            }
            None => false,
        };
        if last {
            let removed = self.views.remove(view.raw());
            passthrough::call(|| drop(removed));
        }
    }

    fn get_resource_from_view(&self, view: ResourceView) -> Option<Resource> {
        self.views.with(view.raw(), |data| data.resource)
    }

    fn create_pipeline(&self, _layout: PipelineLayout, desc: &PipelineDesc<'_>) -> Result<Pipeline> {
        let data = passthrough::call(|| -> Result<PipelineData> {
            unsafe {
                match desc {
                    PipelineDesc::VertexShader(shader) => {
                        let shader = self
                            .device
                            .CreateVertexShader(shader.code.as_ptr().cast())
                            .map_err(native_error)?;
                        Ok(PipelineData::VertexShader(Com::Owned(shader)))
                    }
                    PipelineDesc::PixelShader(shader) => {
                        let shader = self
                            .device
                            .CreatePixelShader(shader.code.as_ptr().cast())
                            .map_err(native_error)?;
                        Ok(PipelineData::PixelShader(Com::Owned(shader)))
                    }
                    PipelineDesc::InputLayout(elements) => {
                        let declaration = conv::vertex_elements(elements)
                            .ok_or(Error::Unsupported("input element"))?;
                        let declaration = self
                            .device
                            .CreateVertexDeclaration(native_elements(&declaration).as_ptr())
                            .map_err(native_error)?;
                        Ok(PipelineData::InputLayout(Com::Owned(declaration)))
                    }
                    PipelineDesc::BlendState(blend) => Ok(PipelineData::States(conv::blend_states(blend))),
                    PipelineDesc::RasterizerState(rasterizer) => {
                        Ok(PipelineData::States(conv::rasterizer_states(rasterizer)))
                    }
                    PipelineDesc::DepthStencilState(depth_stencil) => {
                        Ok(PipelineData::States(conv::depth_stencil_states(depth_stencil)))
                    }
                    PipelineDesc::Graphics(graphics) => {
                        if graphics.hull_shader.is_some()
                            || graphics.domain_shader.is_some()
                            || graphics.geometry_shader.is_some()
                        {
                            return Err(Error::Unsupported("tessellation and geometry shaders"));
                        }

                        let vertex_shader = match &graphics.vertex_shader {
                            Some(shader) => Some(
                                self.device
                                    .CreateVertexShader(shader.code.as_ptr().cast())
                                    .map_err(native_error)?,
                            ),
                            None => None,
                        };
                        let pixel_shader = match &graphics.pixel_shader {
                            Some(shader) => Some(
                                self.device
                                    .CreatePixelShader(shader.code.as_ptr().cast())
                                    .map_err(native_error)?,
                            ),
                            None => None,
                        };

                        let vertex_ids = graphics.input_layout.is_empty();
                        let declaration = if vertex_ids {
                            vec![
                                VertexElement {
                                    stream: 0,
                                    offset: 0,
                                    ty: DECLTYPE_FLOAT1,
                                    method: 0,
                                    usage: DECLUSAGE_TEXCOORD,
                                    usage_index: 0,
                                },
                                VertexElement::END,
                            ]
                        } else {
                            conv::vertex_elements(&graphics.input_layout)
                                .ok_or(Error::Unsupported("input element"))?
                        };
                        let declaration = self
                            .device
                            .CreateVertexDeclaration(native_elements(&declaration).as_ptr())
                            .map_err(native_error)?;

                        let mut states = conv::blend_states(&graphics.blend_state);
                        states.extend(conv::rasterizer_states(&graphics.rasterizer_state));
                        states.extend(conv::depth_stencil_states(&graphics.depth_stencil_state));
                        states.push((conv::rs::MULTISAMPLEMASK, graphics.sample_mask));

                        Ok(PipelineData::Graphics(Box::new(GraphicsPipeline {
                            vertex_shader,
                            pixel_shader,
                            declaration: Some(declaration),
                            states,
                            topology: conv::topology_to_d3d(graphics.topology),
                            vertex_ids,
                        })))
                    }
                    PipelineDesc::Compute(_)
                    | PipelineDesc::HullShader(_)
                    | PipelineDesc::DomainShader(_)
                    | PipelineDesc::GeometryShader(_) => Err(Error::Unsupported("shader stage")),
                }
            }
        })?;

        Ok(self.adopt_pipeline(data))
    }

    fn destroy_pipeline(&self, pipeline: Pipeline) {
        let removed = self.pipelines.remove(pipeline.raw());
        passthrough::call(|| drop(removed));
    }

    fn create_pipeline_layout(&self, params: &[PipelineLayoutParam]) -> Result<PipelineLayout> {
        let raw = self.next_handle();
        self.pipeline_layouts.insert(raw, params.to_vec());
        Ok(PipelineLayout::from_raw(raw))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayout) {
        self.pipeline_layouts.remove(layout.raw());
    }

    fn create_descriptor_set_layout(
        &self,
        ranges: &[DescriptorRange],
        _push_descriptors: bool,
    ) -> Result<DescriptorSetLayout> {
        let [range] = ranges else {
            return Err(Error::Unsupported("descriptor set layouts with several ranges"));
        };

        let raw = self.next_handle();
        self.set_layouts.insert(raw, *range);
        Ok(DescriptorSetLayout::from_raw(raw))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayout) {
        self.set_layouts.remove(layout.raw());
    }

    fn create_query_pool(&self, ty: QueryType, size: u32) -> Result<QueryPool> {
        let native = match ty {
            QueryType::Occlusion | QueryType::BinaryOcclusion => D3DQUERYTYPE_OCCLUSION,
            QueryType::Timestamp => D3DQUERYTYPE_TIMESTAMP,
            QueryType::PipelineStatistics => return Err(Error::Unsupported("pipeline statistics queries")),
        };

        let queries = passthrough::call(|| {
            (0..size)
                .map(|_| unsafe { self.device.CreateQuery(native) }.map_err(native_error))
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
                self.descriptor_sets.insert(
                    raw,
                    SetData {
                        range,
                        slots: vec![Descriptor::Empty; range.count as usize],
                    },
                );
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
            let first = (update.binding.saturating_sub(set.range.binding) + update.array_offset) as usize;
            write_descriptors(&mut set.slots, first, &update.descriptors);
        }
    }

    fn map_resource(&self, resource: Resource, subresource: u32, access: MapAccess) -> Result<MappedSubresource> {
        let data = self.resources.get(resource.raw()).ok_or(Error::InvalidHandle)?;
        let flags = match access {
            MapAccess::ReadOnly => LOCK_READONLY,
            MapAccess::WriteDiscard if data.desc.flags.contains(ResourceFlags::DYNAMIC) => LOCK_DISCARD,
            _ => 0,
        };
        let (layer, level) = data.split(subresource);

        passthrough::call(|| unsafe {
            let mut locked = D3DLOCKED_RECT::default();
            match &data.native {
                NativeResource::VertexBuffer(com) => {
                    let mut mapped = ptr::null_mut();
                    let buffer = com.get().ok_or(Error::InvalidHandle)?;
                    buffer.Lock(0, 0, &mut mapped, flags).map_err(native_error)?;
                    let (size, _, _) = data.desc.extent();
                    return Ok(MappedSubresource {
                        data: mapped.cast(),
                        row_pitch: size,
                        slice_pitch: size,
                    });
                }
                NativeResource::IndexBuffer(com) => {
                    let mut mapped = ptr::null_mut();
                    let buffer = com.get().ok_or(Error::InvalidHandle)?;
                    buffer.Lock(0, 0, &mut mapped, flags).map_err(native_error)?;
                    let (size, _, _) = data.desc.extent();
                    return Ok(MappedSubresource {
                        data: mapped.cast(),
                        row_pitch: size,
                        slice_pitch: size,
                    });
                }
                NativeResource::VolumeTexture(com) => {
                    let mut locked = D3DLOCKED_BOX::default();
                    com.get()
                        .ok_or(Error::InvalidHandle)?
                        .LockBox(level, &mut locked, ptr::null(), flags)
                        .map_err(native_error)?;
                    return Ok(MappedSubresource {
                        data: locked.pBits.cast(),
                        row_pitch: locked.RowPitch as u32,
                        slice_pitch: locked.SlicePitch as u32,
                    });
                }
                NativeResource::Texture(com) => com
                    .get()
                    .ok_or(Error::InvalidHandle)?
                    .LockRect(level, &mut locked, ptr::null(), flags),
                NativeResource::CubeTexture(com) => com.get().ok_or(Error::InvalidHandle)?.LockRect(
                    D3DCUBEMAP_FACES(layer as _),
                    level,
                    &mut locked,
                    ptr::null(),
                    flags,
                ),
                NativeResource::Surface(com) => com
                    .get()
                    .ok_or(Error::InvalidHandle)?
                    .LockRect(&mut locked, ptr::null(), flags),
            }
            .map_err(native_error)?;

            let (_, height, _) = data.desc.extent();
            let pitch = locked.Pitch as u32;
            Ok(MappedSubresource {
                data: locked.pBits.cast(),
                row_pitch: pitch,
                slice_pitch: data.desc.format.slice_pitch(pitch, (height >> level).max(1)),
            })
        })
    }

    fn unmap_resource(&self, resource: Resource, subresource: u32) {
        let Some(data) = self.resources.get(resource.raw()) else {
            return;
        };
        let (layer, level) = data.split(subresource);

        let res = passthrough::call(|| unsafe {
            match &data.native {
                NativeResource::VertexBuffer(com) => com.get().map(|buffer| buffer.Unlock()),
                NativeResource::IndexBuffer(com) => com.get().map(|buffer| buffer.Unlock()),
                NativeResource::VolumeTexture(com) => com.get().map(|texture| texture.UnlockBox(level)),
                NativeResource::Texture(com) => com.get().map(|texture| texture.UnlockRect(level)),
                NativeResource::CubeTexture(com) => com
                    .get()
                    .map(|texture| texture.UnlockRect(D3DCUBEMAP_FACES(layer as _), level)),
                NativeResource::Surface(com) => com.get().map(|surface| surface.UnlockRect()),
            }
        });
        if let Some(Err(err)) = res {
            debug!("unmap of {resource:?} failed. err: {err:?}");
        }
    }

    fn upload_buffer_region(&self, data: &[u8], dst: Resource, dst_offset: u64) -> Result<()> {
        let resource = self.resources.get(dst.raw()).ok_or(Error::InvalidHandle)?;
        passthrough::call(|| self.write_buffer(&resource, data, dst_offset))
    }

    fn upload_texture_region(
        &self,
        data: &SubresourceData<'_>,
        dst: Resource,
        dst_subresource: u32,
        dst_box: Option<&SubresourceBox>,
    ) -> Result<()> {
        let resource = self.resources.get(dst.raw()).ok_or(Error::InvalidHandle)?;
        passthrough::call(|| self.write_texture(&resource, data, dst_subresource, dst_box))
    }

    fn get_query_pool_results(&self, pool: QueryPool, first: u32, results: &mut [u64]) -> bool {
        let Some(data) = self.query_pools.get(pool.raw()) else {
            return false;
        };
        let size = match data.ty {
            QueryType::Timestamp => 8,
            _ => 4,
        };

        passthrough::call(|| {
            for (index, result) in results.iter_mut().enumerate() {
                let Some(query) = data.queries.get(first as usize + index) else {
                    return false;
                };

                *result = 0;
                let hr = unsafe {
                    (Interface::vtable(query).GetData)(
                        Interface::as_raw(query),
                        ptr::from_mut(result).cast(),
                        size,
                        0,
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
        let Some(data) = self.resources.get(resource.raw()) else {
            return;
        };
        let Some(native) = data.native.resource() else {
            return;
        };

        let res = passthrough::call(|| unsafe {
            native.SetPrivateData(
                &WKPDID_D3DDebugObjectName,
                name.as_ptr().cast(),
                name.len() as u32,
                0,
            )
        });
        if let Err(err) = res {
            debug!("cannot name {resource:?}. err: {err:?}");
        }
    }

    fn wait_idle(&self) {
        passthrough::call(|| unsafe {
            let Ok(query) = self.device.CreateQuery(D3DQUERYTYPE_EVENT) else {
                return;
            };
            if query.Issue(ISSUE_END).is_err() {
                return;
            }

            loop {
                let hr = (Interface::vtable(&query).GetData)(
                    Interface::as_raw(&query),
                    ptr::null_mut(),
                    0,
                    GETDATA_FLUSH,
                );
                if hr != S_FALSE {
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

/// Writes `descriptors` into `slots` from `first` on, dropping what doesn't fit.
pub(crate) fn write_descriptors(slots: &mut [Descriptor], first: usize, descriptors: &Descriptors<'_>) {
    let values: Vec<Descriptor> = match descriptors {
        Descriptors::Samplers(samplers) => samplers.iter().map(|s| Descriptor::Sampler(*s)).collect(),
        Descriptors::SamplersWithViews(pairs) => pairs
            .iter()
            .map(|&(sampler, view)| Descriptor::SamplerWithView(sampler, view))
            .collect(),
        Descriptors::ShaderResourceViews(views) => views.iter().map(|v| Descriptor::View(*v)).collect(),
        Descriptors::UnorderedAccessViews(_) | Descriptors::ConstantBuffers(_) => {
            debug!("{:?} descriptors are not supported", descriptors.ty());
            return;
        }
    };

    for (slot, value) in slots.iter_mut().skip(first).zip(values) {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_writes_stay_in_range() {
        let mut slots = vec![Descriptor::Empty; 3];
        let views = [ResourceView::from_raw(0x10), ResourceView::from_raw(0x20), ResourceView::from_raw(0x30)];
        write_descriptors(&mut slots, 1, &Descriptors::ShaderResourceViews(&views));

        assert_eq!(
            slots,
            [
                Descriptor::Empty,
                Descriptor::View(ResourceView::from_raw(0x10)),
                Descriptor::View(ResourceView::from_raw(0x20)),
            ]
        );

        let pairs = [(Sampler::from_raw(3), ResourceView::from_raw(0x41))];
        write_descriptors(&mut slots, 0, &Descriptors::SamplersWithViews(&pairs));
        assert_eq!(
            slots[0],
            Descriptor::SamplerWithView(Sampler::from_raw(3), ResourceView::from_raw(0x41))
        );
        assert!(is_srgb_view(ResourceView::from_raw(0x41)));
    }

    #[test]
    fn srgb_views_are_marked() {
        let object = 0x1000 as *mut c_void;
        assert_eq!(view_handle(object, Format::B8G8R8A8Unorm).raw(), 0x1000);
        assert_eq!(view_handle(object, Format::B8G8R8A8UnormSrgb).raw(), 0x1001);
    }

    #[test]
    fn compressed_rows() {
        assert_eq!(region_rows(Format::B8G8R8A8Unorm, 16, 8), (64, 8));
        assert_eq!(region_rows(Format::Bc1Unorm, 16, 8), (32, 2));
    }
}
