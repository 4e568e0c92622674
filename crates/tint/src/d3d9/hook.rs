//! `IDirect3DDevice9` vtable hooks.
//!
//! The vtable is shared by every device of the process, so it is patched once through a
//! dummy device. Devices are picked up lazily by the first hooked call made on them.
//! State binds are reported after the native call, draws, copies and clears before it.

use core::{ffi::c_void, ptr, slice};
use std::sync::Arc;

use anyhow::{Context, bail};
use dashmap::mapref::entry::Entry;
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use scopeguard::defer;
use tint_api::{
    CommandQueue, DescriptorSet, Device, Pipeline, PipelineLayout, Resource, ResourceView,
    descriptor::{DescriptorSetUpdate, Descriptors},
    pipeline::{PipelineDesc, PipelineStage, PipelineState, Rect, ShaderDesc, ShaderStage, Viewport},
    resource::{ResourceDesc, ResourceDimension, ResourceUsage, SubresourceBox},
    sampler::FilterMode,
};
use tint_event::{Event, EventKind, Flow, Registry};
use tint_hook::{HookResult, VtableHook, vtable_slot};
use tracing::{debug, error, trace, warn};
use windows::{
    Win32::{
        Foundation::{HANDLE, HWND, POINT, RECT, S_OK},
        Graphics::{Direct3D9::*, Gdi::RGNDATA},
        UI::WindowsAndMessaging::GetDesktopWindow,
    },
    core::{BOOL, HRESULT, Interface},
};

use super::{
    SurfacePlan, clear,
    conv::{
        self, IndexBufferDesc, SurfaceDesc, VertexBufferDesc, VolumeDesc, fmt, pool, rtype, samp,
        texf, usage,
    },
    device::{Com, DeviceImpl, NativeResource, PipelineData, mirror_elements, native_elements},
    plan_surface,
};
use crate::{
    dispatch::{self, Creation},
    map::IntDashMap,
    passthrough,
    runtime::{EffectRuntime, compiler::ShaderFormat},
};

type ResetFn = unsafe extern "system" fn(*mut c_void, *mut D3DPRESENT_PARAMETERS) -> HRESULT;
type PresentFn =
    unsafe extern "system" fn(*mut c_void, *const RECT, *const RECT, HWND, *const RGNDATA) -> HRESULT;
type CreateTextureFn = unsafe extern "system" fn(
    *mut c_void,
    u32,
    u32,
    u32,
    u32,
    D3DFORMAT,
    D3DPOOL,
    *mut *mut c_void,
    *mut HANDLE,
) -> HRESULT;
type CreateVolumeTextureFn = unsafe extern "system" fn(
    *mut c_void,
    u32,
    u32,
    u32,
    u32,
    u32,
    D3DFORMAT,
    D3DPOOL,
    *mut *mut c_void,
    *mut HANDLE,
) -> HRESULT;
type CreateCubeTextureFn = unsafe extern "system" fn(
    *mut c_void,
    u32,
    u32,
    u32,
    D3DFORMAT,
    D3DPOOL,
    *mut *mut c_void,
    *mut HANDLE,
) -> HRESULT;
type CreateVertexBufferFn =
    unsafe extern "system" fn(*mut c_void, u32, u32, u32, D3DPOOL, *mut *mut c_void, *mut HANDLE) -> HRESULT;
type CreateIndexBufferFn = unsafe extern "system" fn(
    *mut c_void,
    u32,
    u32,
    D3DFORMAT,
    D3DPOOL,
    *mut *mut c_void,
    *mut HANDLE,
) -> HRESULT;
type CreateSurfaceFn = unsafe extern "system" fn(
    *mut c_void,
    u32,
    u32,
    D3DFORMAT,
    D3DMULTISAMPLE_TYPE,
    u32,
    BOOL,
    *mut *mut c_void,
    *mut HANDLE,
) -> HRESULT;
type UpdateSurfaceFn =
    unsafe extern "system" fn(*mut c_void, *mut c_void, *const RECT, *mut c_void, *const POINT) -> HRESULT;
type UpdateTextureFn = unsafe extern "system" fn(*mut c_void, *mut c_void, *mut c_void) -> HRESULT;
type StretchRectFn = unsafe extern "system" fn(
    *mut c_void,
    *mut c_void,
    *const RECT,
    *mut c_void,
    *const RECT,
    D3DTEXTUREFILTERTYPE,
) -> HRESULT;
type ClearFn = unsafe extern "system" fn(*mut c_void, u32, *const D3DRECT, u32, u32, f32, u32) -> HRESULT;
type SetViewportFn = unsafe extern "system" fn(*mut c_void, *const D3DVIEWPORT9) -> HRESULT;
type SetRenderStateFn = unsafe extern "system" fn(*mut c_void, D3DRENDERSTATETYPE, u32) -> HRESULT;
type SetTextureFn = unsafe extern "system" fn(*mut c_void, u32, *mut c_void) -> HRESULT;
type SetScissorRectFn = unsafe extern "system" fn(*mut c_void, *const RECT) -> HRESULT;
type DrawPrimitiveFn = unsafe extern "system" fn(*mut c_void, D3DPRIMITIVETYPE, u32, u32) -> HRESULT;
type DrawIndexedPrimitiveFn =
    unsafe extern "system" fn(*mut c_void, D3DPRIMITIVETYPE, i32, u32, u32, u32, u32) -> HRESULT;
type DrawPrimitiveUpFn =
    unsafe extern "system" fn(*mut c_void, D3DPRIMITIVETYPE, u32, *const c_void, u32) -> HRESULT;
type DrawIndexedPrimitiveUpFn = unsafe extern "system" fn(
    *mut c_void,
    D3DPRIMITIVETYPE,
    u32,
    u32,
    u32,
    *const c_void,
    D3DFORMAT,
    *const c_void,
    u32,
) -> HRESULT;
type CreateVertexDeclarationFn =
    unsafe extern "system" fn(*mut c_void, *const D3DVERTEXELEMENT9, *mut *mut c_void) -> HRESULT;
type CreateShaderFn = unsafe extern "system" fn(*mut c_void, *const u32, *mut *mut c_void) -> HRESULT;
type SetShaderFn = unsafe extern "system" fn(*mut c_void, *mut c_void) -> HRESULT;
type SetStreamSourceFn = unsafe extern "system" fn(*mut c_void, u32, *mut c_void, u32, u32) -> HRESULT;
type SetIndicesFn = unsafe extern "system" fn(*mut c_void, *mut c_void) -> HRESULT;

macro_rules! device_hooks {
    ($($name:ident: $ty:ty = $index:literal => $detour:ident,)*) => {
        struct Hooks {
            $($name: VtableHook<$ty>,)*
        }

        impl Hooks {
            /// # Safety
            /// device must be a live `IDirect3DDevice9`.
            unsafe fn attach(device: *mut c_void) -> HookResult<Self> {
                Ok(Self {
                    $($name: unsafe {
                        VtableHook::attach(vtable_slot::<$ty>(device, $index), $detour as $ty)?
                    },)*
                })
            }
        }
    };
}

device_hooks! {
    reset: ResetFn = 16 => reset,
    present: PresentFn = 17 => present,
    create_texture: CreateTextureFn = 23 => create_texture,
    create_volume_texture: CreateVolumeTextureFn = 24 => create_volume_texture,
    create_cube_texture: CreateCubeTextureFn = 25 => create_cube_texture,
    create_vertex_buffer: CreateVertexBufferFn = 26 => create_vertex_buffer,
    create_index_buffer: CreateIndexBufferFn = 27 => create_index_buffer,
    create_render_target: CreateSurfaceFn = 28 => create_render_target,
    create_depth_stencil_surface: CreateSurfaceFn = 29 => create_depth_stencil_surface,
    update_surface: UpdateSurfaceFn = 30 => update_surface,
    update_texture: UpdateTextureFn = 31 => update_texture,
    stretch_rect: StretchRectFn = 34 => stretch_rect,
    clear: ClearFn = 43 => clear,
    set_viewport: SetViewportFn = 47 => set_viewport,
    set_render_state: SetRenderStateFn = 57 => set_render_state,
    set_texture: SetTextureFn = 65 => set_texture,
    set_scissor_rect: SetScissorRectFn = 75 => set_scissor_rect,
    draw_primitive: DrawPrimitiveFn = 81 => draw_primitive,
    draw_indexed_primitive: DrawIndexedPrimitiveFn = 82 => draw_indexed_primitive,
    draw_primitive_up: DrawPrimitiveUpFn = 83 => draw_primitive_up,
    draw_indexed_primitive_up: DrawIndexedPrimitiveUpFn = 84 => draw_indexed_primitive_up,
    create_vertex_declaration: CreateVertexDeclarationFn = 86 => create_vertex_declaration,
    create_vertex_shader: CreateShaderFn = 91 => create_vertex_shader,
    set_vertex_shader: SetShaderFn = 92 => set_vertex_shader,
    set_stream_source: SetStreamSourceFn = 100 => set_stream_source,
    set_indices: SetIndicesFn = 104 => set_indices,
    create_pixel_shader: CreateShaderFn = 106 => create_pixel_shader,
    set_pixel_shader: SetShaderFn = 107 => set_pixel_shader,
}

static HOOKS: OnceCell<Hooks> = OnceCell::new();

/// Original function of a hooked slot. Calls racing the installation fail.
macro_rules! original {
    ($name:ident) => {
        match HOOKS.get() {
            Some(hooks) => hooks.$name.original_fn(),
            None => return D3DERR_INVALIDCALL,
        }
    };
}

/// Patches the `IDirect3DDevice9` vtable.
pub fn install() -> anyhow::Result<()> {
    if HOOKS.get().is_some() {
        bail!("Direct3D 9 hooks already installed");
    }

    let device = dummy_device()?;
    let hooks = unsafe { Hooks::attach(device.as_raw()) }.context("Cannot hook IDirect3DDevice9")?;
    if HOOKS.set(hooks).is_err() {
        bail!("Direct3D 9 hooks already installed");
    }

    debug!("Direct3D 9 hooks installed");
    Ok(())
}

/// Device used only to reach the vtable
fn dummy_device() -> anyhow::Result<IDirect3DDevice9> {
    unsafe {
        let d3d = Direct3DCreate9(D3D_SDK_VERSION).context("Cannot create IDirect3D9")?;

        let window = GetDesktopWindow();
        let mut device = None;
        d3d.CreateDevice(
            D3DADAPTER_DEFAULT,
            D3DDEVTYPE_NULLREF,
            window,
            D3DCREATE_SOFTWARE_VERTEXPROCESSING as _,
            &mut D3DPRESENT_PARAMETERS {
                Windowed: BOOL(1),
                SwapEffect: D3DSWAPEFFECT_DISCARD,
                hDeviceWindow: window,
                ..Default::default()
            },
            &mut device,
        )?;

        device.context("Cannot create IDirect3DDevice9")
    }
}

#[derive(Default)]
struct SwapchainState {
    initialized: bool,
    runtime: Option<Arc<EffectRuntime>>,
    /// Application state saved around effect rendering.
    state_block: Option<IDirect3DStateBlock9>,
}

unsafe impl Send for SwapchainState {}

struct DeviceEntry {
    device: Arc<DeviceImpl>,
    swapchain: Mutex<SwapchainState>,
}

/// Devices seen through a hook, keyed by interface pointer.
static DEVICES: Lazy<IntDashMap<u64, Arc<DeviceEntry>>> = Lazy::new(IntDashMap::default);

fn get_device(this: *mut c_void) -> Option<Arc<DeviceEntry>> {
    if let Some(entry) = DEVICES.get(&(this as u64)) {
        return Some(entry.clone());
    }

    let device = unsafe { IDirect3DDevice9::from_raw_borrowed(&this) }?.clone();
    let device = match DeviceImpl::new(device) {
        Ok(device) => Arc::new(device),
        Err(err) => {
            error!("cannot track device {this:?}. err: {err:?}");
            return None;
        }
    };

    let entry = match DEVICES.entry(this as u64) {
        Entry::Occupied(entry) => return Some(entry.get().clone()),
        Entry::Vacant(entry) => entry
            .insert(Arc::new(DeviceEntry {
                device,
                swapchain: Mutex::new(SwapchainState::default()),
            }))
            .clone(),
    };

    debug!("device {this:?} found");
    let registry = crate::registry();
    let device = &*entry.device;
    registry.dispatch(&mut Event::InitDevice { device });
    registry.dispatch(&mut Event::InitCommandQueue { queue: device });
    registry.dispatch(&mut Event::InitCommandList { cmd_list: device });
    Some(entry)
}

/// Runs `f` for a call the application made, `None` for calls tint made itself.
fn with_device<R>(this: *mut c_void, f: impl FnOnce(&Registry, &DeviceImpl) -> R) -> Option<R> {
    if passthrough::active() {
        return None;
    }

    let entry = get_device(this)?;
    Some(f(crate::registry(), &entry.device))
}

/// Reports a state the native call just bound, if anyone listens.
fn report(this: *mut c_void, kind: EventKind, f: impl FnOnce(&Registry, &DeviceImpl)) {
    if passthrough::active() || !crate::registry().has_listeners(kind) {
        return;
    }

    with_device(this, f);
}

impl DeviceEntry {
    /// Creates the effect runtime on the implicit swapchain's back buffer.
    fn init_swapchain(&self, registry: &Registry, state: &mut SwapchainState) {
        state.initialized = true;

        let device = &self.device;
        let back_buffer = match passthrough::call(|| unsafe {
            device.device.GetBackBuffer(0, 0, D3DBACKBUFFER_TYPE_MONO)
        }) {
            Ok(back_buffer) => back_buffer,
            Err(err) => {
                debug!("no back buffer. err: {err:?}");
                return;
            }
        };
        let Some((resource, _)) = device.adopt_surface(&back_buffer) else {
            return;
        };

        registry.dispatch(&mut Event::InitSwapchain {
            device: &**device,
            swapchain: device.raw(),
        });

        let runtime = EffectRuntime::new(
            device.raw(),
            device.clone() as Arc<dyn Device>,
            device.clone() as Arc<dyn CommandQueue>,
            crate::effect_compiler(),
            ShaderFormat::Dxbc,
            &crate::config().effects,
        );
        match runtime.on_init(registry, &[resource]) {
            Ok(()) => state.runtime = Some(Arc::new(runtime)),
            Err(err) => error!("effect runtime initialization failed. err: {err:?}"),
        }
    }

    fn present(&self, registry: &Registry, source: Option<Rect>, dest: Option<Rect>) {
        let device = &self.device;
        registry.dispatch(&mut Event::Present {
            queue: &**device,
            swapchain: device.raw(),
            source_rect: source,
            dest_rect: dest,
        });

        let (runtime, state_block) = {
            let mut state = self.swapchain.lock();
            if !state.initialized {
                self.init_swapchain(registry, &mut state);
            }
            let Some(runtime) = state.runtime.clone() else {
                return;
            };

            if state.state_block.is_none() {
                state.state_block =
                    passthrough::call(|| unsafe { device.device.CreateStateBlock(D3DSBT_ALL) })
                        .inspect_err(|err| debug!("cannot create state block. err: {err:?}"))
                        .ok();
            }
            (runtime, state.state_block.clone())
        };

        passthrough::call(|| unsafe {
            if let Some(block) = &state_block {
                _ = block.Capture();
            }
            _ = device.device.BeginScene();
        });
        defer!(passthrough::call(|| unsafe {
            _ = device.device.EndScene();
            if let Some(block) = &state_block {
                _ = block.Apply();
            }
        }));

        runtime.on_present(registry, 0);
    }

    /// Releases everything tied to the swapchain buffers ahead of `Reset`.
    fn reset(&self, registry: &Registry) {
        let device = &self.device;
        let mut state = self.swapchain.lock();
        if let Some(runtime) = state.runtime.take() {
            runtime.on_reset(registry);
        }
        if state.initialized {
            registry.dispatch(&mut Event::DestroySwapchain {
                device: &**device,
                swapchain: device.raw(),
            });
        }
        *state = SwapchainState::default();
        drop(state);

        device.release_tracked(registry);
    }
}

fn to_rect(rect: &RECT) -> Rect {
    Rect {
        left: rect.left,
        top: rect.top,
        right: rect.right,
        bottom: rect.bottom,
    }
}

fn rect_box(rect: &RECT) -> SubresourceBox {
    SubresourceBox {
        left: rect.left,
        top: rect.top,
        front: 0,
        right: rect.right,
        bottom: rect.bottom,
        back: 1,
    }
}

fn is_multisampled(desc: &ResourceDesc) -> bool {
    matches!(desc.dimension, ResourceDimension::Texture2d { samples, .. } if samples > 1)
}

/// Gives the application a reference to a substitute object.
fn hand_out(object: Option<*mut c_void>, out: *mut *mut c_void) -> HRESULT {
    match object {
        Some(raw) => {
            unsafe { *out = raw };
            S_OK
        }
        None => {
            debug!("substitute object has no native object to hand out");
            D3DERR_INVALIDCALL
        }
    }
}

#[tracing::instrument]
extern "system" fn reset(this: *mut c_void, params: *mut D3DPRESENT_PARAMETERS) -> HRESULT {
    trace!("IDirect3DDevice9::Reset called");

    let original = original!(reset);
    if passthrough::active() {
        return unsafe { original(this, params) };
    }

    let registry = crate::registry();
    let entry = DEVICES.get(&(this as u64)).map(|entry| entry.clone());
    if let Some(entry) = &entry {
        entry.reset(registry);
    }

    let hr = unsafe { original(this, params) };
    if hr.is_ok()
        && let (Some(entry), Some(params)) = (&entry, unsafe { params.as_ref() })
    {
        registry.dispatch(&mut Event::Resize {
            swapchain: entry.device.raw(),
            width: params.BackBufferWidth,
            height: params.BackBufferHeight,
        });
    }
    hr
}

#[tracing::instrument]
extern "system" fn present(
    this: *mut c_void,
    source: *const RECT,
    dest: *const RECT,
    window: HWND,
    dirty_region: *const RGNDATA,
) -> HRESULT {
    trace!("IDirect3DDevice9::Present called");

    let original = original!(present);
    if !passthrough::active() {
        if let Some(entry) = get_device(this) {
            let source = unsafe { source.as_ref() }.map(to_rect);
            let dest = unsafe { dest.as_ref() }.map(to_rect);
            entry.present(crate::registry(), source, dest);
        }
    }

    unsafe { original(this, source, dest, window, dirty_region) }
}

/// Creation event around a texture, cube texture or standalone surface creation.
///
/// `forward` runs the native call with a description and level count.
fn create_surface_backed(
    this: *mut c_void,
    out: *mut *mut c_void,
    mut native: SurfaceDesc,
    mut levels: u32,
    forward: impl Fn(&SurfaceDesc, u32) -> HRESULT,
) -> HRESULT {
    if passthrough::active() || out.is_null() {
        return forward(&native, levels);
    }
    let Some(entry) = get_device(this) else {
        return forward(&native, levels);
    };
    let device = &*entry.device;
    let registry = crate::registry();

    let desc = conv::surface_to_desc(&native, levels);
    match dispatch::create_resource(registry, device, &desc, ResourceUsage::GENERAL) {
        Creation::Unchanged => {}
        Creation::Modified(edited) => {
            let mut edited_native = native;
            match conv::apply_surface_desc(&edited, &mut edited_native) {
                Some(edited_levels) => {
                    native = edited_native;
                    levels = edited_levels;
                }
                None => warn!("texture description edit can't be expressed in Direct3D 9, ignoring it"),
            }
        }
        Creation::Substitute(resource) => return hand_out(device.hand_out_resource(resource), out),
        Creation::Failed => return D3DERR_INVALIDCALL,
    }

    let hr = forward(&native, levels);
    if hr.is_err() {
        return hr;
    }

    let raw = unsafe { *out };
    let (resource, levels) = passthrough::call(|| unsafe {
        if native.ty == rtype::CUBETEXTURE {
            let levels = IDirect3DCubeTexture9::from_raw_borrowed(&raw).map_or(levels, |cube| cube.GetLevelCount());
            (NativeResource::CubeTexture(Com::Borrowed(raw)), levels)
        } else {
            let levels = IDirect3DTexture9::from_raw_borrowed(&raw).map_or(levels, |texture| texture.GetLevelCount());
            (NativeResource::Texture(Com::Borrowed(raw)), levels)
        }
    });
    device.track_resource(
        registry,
        resource,
        conv::surface_to_desc(&native, levels),
        ResourceUsage::GENERAL,
    );
    hr
}

#[tracing::instrument]
extern "system" fn create_texture(
    this: *mut c_void,
    width: u32,
    height: u32,
    levels: u32,
    usage: u32,
    format: D3DFORMAT,
    pool: D3DPOOL,
    texture: *mut *mut c_void,
    shared: *mut HANDLE,
) -> HRESULT {
    trace!("IDirect3DDevice9::CreateTexture called");

    let original = original!(create_texture);
    let native = SurfaceDesc {
        format: format.0 as u32,
        ty: rtype::TEXTURE,
        usage,
        pool: pool.0 as u32,
        multisample_type: 0,
        multisample_quality: 0,
        width,
        height,
    };

    create_surface_backed(this, texture, native, levels, |native, levels| unsafe {
        original(
            this,
            native.width,
            native.height,
            levels,
            native.usage,
            D3DFORMAT(native.format as _),
            D3DPOOL(native.pool as _),
            texture,
            shared,
        )
    })
}

#[tracing::instrument]
extern "system" fn create_cube_texture(
    this: *mut c_void,
    edge_length: u32,
    levels: u32,
    usage: u32,
    format: D3DFORMAT,
    pool: D3DPOOL,
    texture: *mut *mut c_void,
    shared: *mut HANDLE,
) -> HRESULT {
    trace!("IDirect3DDevice9::CreateCubeTexture called");

    let original = original!(create_cube_texture);
    let native = SurfaceDesc {
        format: format.0 as u32,
        ty: rtype::CUBETEXTURE,
        usage,
        pool: pool.0 as u32,
        multisample_type: 0,
        multisample_quality: 0,
        width: edge_length,
        height: edge_length,
    };

    create_surface_backed(this, texture, native, levels, |native, levels| unsafe {
        original(
            this,
            native.width,
            levels,
            native.usage,
            D3DFORMAT(native.format as _),
            D3DPOOL(native.pool as _),
            texture,
            shared,
        )
    })
}

#[tracing::instrument]
extern "system" fn create_volume_texture(
    this: *mut c_void,
    width: u32,
    height: u32,
    depth: u32,
    levels: u32,
    usage: u32,
    format: D3DFORMAT,
    pool: D3DPOOL,
    texture: *mut *mut c_void,
    shared: *mut HANDLE,
) -> HRESULT {
    trace!("IDirect3DDevice9::CreateVolumeTexture called");

    let original = original!(create_volume_texture);
    let mut native = VolumeDesc {
        format: format.0 as u32,
        ty: rtype::VOLUMETEXTURE,
        usage,
        pool: pool.0 as u32,
        width,
        height,
        depth,
    };
    let forward = |native: &VolumeDesc, levels: u32| unsafe {
        original(
            this,
            native.width,
            native.height,
            native.depth,
            levels,
            native.usage,
            D3DFORMAT(native.format as _),
            D3DPOOL(native.pool as _),
            texture,
            shared,
        )
    };

    if passthrough::active() || texture.is_null() {
        return forward(&native, levels);
    }
    let Some(entry) = get_device(this) else {
        return forward(&native, levels);
    };
    let device = &*entry.device;
    let registry = crate::registry();

    let mut levels = levels;
    let desc = conv::volume_to_desc(&native, levels);
    match dispatch::create_resource(registry, device, &desc, ResourceUsage::GENERAL) {
        Creation::Unchanged => {}
        Creation::Modified(edited) => {
            let mut edited_native = native;
            match conv::apply_volume_desc(&edited, &mut edited_native) {
                Some(edited_levels) => {
                    native = edited_native;
                    levels = edited_levels;
                }
                None => warn!("volume description edit can't be expressed in Direct3D 9, ignoring it"),
            }
        }
        Creation::Substitute(resource) => return hand_out(device.hand_out_resource(resource), texture),
        Creation::Failed => return D3DERR_INVALIDCALL,
    }

    let hr = forward(&native, levels);
    if hr.is_ok() {
        let raw = unsafe { *texture };
        let levels = passthrough::call(|| unsafe {
            IDirect3DVolumeTexture9::from_raw_borrowed(&raw).map_or(levels, |texture| texture.GetLevelCount())
        });
        device.track_resource(
            registry,
            NativeResource::VolumeTexture(Com::Borrowed(raw)),
            conv::volume_to_desc(&native, levels),
            ResourceUsage::GENERAL,
        );
    }
    hr
}

#[tracing::instrument]
extern "system" fn create_vertex_buffer(
    this: *mut c_void,
    length: u32,
    usage: u32,
    fvf: u32,
    pool: D3DPOOL,
    buffer: *mut *mut c_void,
    shared: *mut HANDLE,
) -> HRESULT {
    trace!("IDirect3DDevice9::CreateVertexBuffer called");

    let original = original!(create_vertex_buffer);
    let mut native = VertexBufferDesc {
        format: fmt::VERTEXDATA,
        ty: rtype::VERTEXBUFFER,
        usage,
        pool: pool.0 as u32,
        size: length,
        fvf,
    };
    let forward = |native: &VertexBufferDesc| unsafe {
        original(
            this,
            native.size,
            native.usage,
            native.fvf,
            D3DPOOL(native.pool as _),
            buffer,
            shared,
        )
    };

    if passthrough::active() || buffer.is_null() {
        return forward(&native);
    }
    let Some(entry) = get_device(this) else {
        return forward(&native);
    };
    let device = &*entry.device;
    let registry = crate::registry();

    let desc = conv::vertex_buffer_to_desc(&native);
    let initial_state = ResourceUsage::VERTEX_BUFFER;
    match dispatch::create_resource(registry, device, &desc, initial_state) {
        Creation::Unchanged => {}
        Creation::Modified(edited) => {
            let mut edited_native = native;
            if conv::apply_vertex_buffer_desc(&edited, &mut edited_native) {
                native = edited_native;
            } else {
                warn!("vertex buffer description edit can't be expressed in Direct3D 9, ignoring it");
            }
        }
        Creation::Substitute(resource) => return hand_out(device.hand_out_resource(resource), buffer),
        Creation::Failed => return D3DERR_INVALIDCALL,
    }

    let hr = forward(&native);
    if hr.is_ok() {
        device.track_resource(
            registry,
            NativeResource::VertexBuffer(Com::Borrowed(unsafe { *buffer })),
            conv::vertex_buffer_to_desc(&native),
            initial_state,
        );
    }
    hr
}

#[tracing::instrument]
extern "system" fn create_index_buffer(
    this: *mut c_void,
    length: u32,
    usage: u32,
    format: D3DFORMAT,
    pool: D3DPOOL,
    buffer: *mut *mut c_void,
    shared: *mut HANDLE,
) -> HRESULT {
    trace!("IDirect3DDevice9::CreateIndexBuffer called");

    let original = original!(create_index_buffer);
    let mut native = IndexBufferDesc {
        format: format.0 as u32,
        ty: rtype::INDEXBUFFER,
        usage,
        pool: pool.0 as u32,
        size: length,
    };
    let forward = |native: &IndexBufferDesc| unsafe {
        original(
            this,
            native.size,
            native.usage,
            D3DFORMAT(native.format as _),
            D3DPOOL(native.pool as _),
            buffer,
            shared,
        )
    };

    if passthrough::active() || buffer.is_null() {
        return forward(&native);
    }
    let Some(entry) = get_device(this) else {
        return forward(&native);
    };
    let device = &*entry.device;
    let registry = crate::registry();

    let desc = conv::index_buffer_to_desc(&native);
    let initial_state = ResourceUsage::INDEX_BUFFER;
    match dispatch::create_resource(registry, device, &desc, initial_state) {
        Creation::Unchanged => {}
        Creation::Modified(edited) => {
            let mut edited_native = native;
            if conv::apply_index_buffer_desc(&edited, &mut edited_native) {
                native = edited_native;
            } else {
                warn!("index buffer description edit can't be expressed in Direct3D 9, ignoring it");
            }
        }
        Creation::Substitute(resource) => return hand_out(device.hand_out_resource(resource), buffer),
        Creation::Failed => return D3DERR_INVALIDCALL,
    }

    let hr = forward(&native);
    if hr.is_ok() {
        device.track_resource(
            registry,
            NativeResource::IndexBuffer(Com::Borrowed(unsafe { *buffer })),
            conv::index_buffer_to_desc(&native),
            initial_state,
        );
    }
    hr
}

/// Creation of a render target or depth-stencil surface, replaced by a texture level when
/// a listener asks for a sampled surface.
fn create_standalone_surface(
    this: *mut c_void,
    out: *mut *mut c_void,
    native: SurfaceDesc,
    forward: impl Fn(&SurfaceDesc) -> HRESULT,
) -> HRESULT {
    if passthrough::active() || out.is_null() {
        return forward(&native);
    }
    let Some(entry) = get_device(this) else {
        return forward(&native);
    };
    let device = &*entry.device;
    let registry = crate::registry();
    let initial_state = if native.usage & usage::DEPTHSTENCIL != 0 {
        ResourceUsage::DEPTH_STENCIL_WRITE
    } else {
        ResourceUsage::RENDER_TARGET
    };

    match plan_surface(registry, device, &native) {
        SurfacePlan::Surface(native) => {
            let hr = forward(&native);
            if hr.is_ok() {
                device.track_resource(
                    registry,
                    NativeResource::Surface(Com::Borrowed(unsafe { *out })),
                    conv::surface_to_desc(&native, 1),
                    initial_state,
                );
            }
            hr
        }
        SurfacePlan::Texture { texture, .. } => {
            let created = passthrough::call(|| unsafe {
                let mut created = None;
                device
                    .device
                    .CreateTexture(
                        texture.width,
                        texture.height,
                        1,
                        texture.usage,
                        D3DFORMAT(texture.format as _),
                        D3DPOOL(texture.pool as _),
                        &mut created,
                        ptr::null_mut(),
                    )
                    .map(|()| created)
            });
            let created = match created {
                Ok(Some(created)) => created,
                Ok(None) => return D3DERR_INVALIDCALL,
                Err(err) => {
                    debug!("replacement texture creation failed. err: {err:?}");
                    return err.code();
                }
            };

            let surface = match passthrough::call(|| unsafe { created.GetSurfaceLevel(0) }) {
                Ok(surface) => surface,
                Err(err) => return err.code(),
            };
            debug!("surface replaced by a {}x{} texture", texture.width, texture.height);
            device.track_resource(
                registry,
                NativeResource::Texture(Com::Owned(created)),
                conv::surface_to_desc(&texture, 1),
                initial_state,
            );

            // The level keeps its texture alive
            unsafe { *out = surface.into_raw() };
            S_OK
        }
        SurfacePlan::Substitute(resource) => hand_out(
            device
                .resource_surface(resource, 0)
                .ok()
                .map(IDirect3DSurface9::into_raw),
            out,
        ),
        SurfacePlan::Failed => D3DERR_INVALIDCALL,
    }
}

#[tracing::instrument]
extern "system" fn create_render_target(
    this: *mut c_void,
    width: u32,
    height: u32,
    format: D3DFORMAT,
    multisample: D3DMULTISAMPLE_TYPE,
    multisample_quality: u32,
    lockable: BOOL,
    surface: *mut *mut c_void,
    shared: *mut HANDLE,
) -> HRESULT {
    trace!("IDirect3DDevice9::CreateRenderTarget called");

    let original = original!(create_render_target);
    let native = SurfaceDesc {
        format: format.0 as u32,
        ty: rtype::SURFACE,
        usage: usage::RENDERTARGET,
        pool: pool::DEFAULT,
        multisample_type: multisample.0 as u32,
        multisample_quality,
        width,
        height,
    };

    create_standalone_surface(this, surface, native, |native| unsafe {
        original(
            this,
            native.width,
            native.height,
            D3DFORMAT(native.format as _),
            D3DMULTISAMPLE_TYPE(native.multisample_type as _),
            native.multisample_quality,
            lockable,
            surface,
            shared,
        )
    })
}

#[tracing::instrument]
extern "system" fn create_depth_stencil_surface(
    this: *mut c_void,
    width: u32,
    height: u32,
    format: D3DFORMAT,
    multisample: D3DMULTISAMPLE_TYPE,
    multisample_quality: u32,
    discard: BOOL,
    surface: *mut *mut c_void,
    shared: *mut HANDLE,
) -> HRESULT {
    trace!("IDirect3DDevice9::CreateDepthStencilSurface called");

    let original = original!(create_depth_stencil_surface);
    let native = SurfaceDesc {
        format: format.0 as u32,
        ty: rtype::SURFACE,
        usage: usage::DEPTHSTENCIL,
        pool: pool::DEFAULT,
        multisample_type: multisample.0 as u32,
        multisample_quality,
        width,
        height,
    };

    create_standalone_surface(this, surface, native, |native| unsafe {
        original(
            this,
            native.width,
            native.height,
            D3DFORMAT(native.format as _),
            D3DMULTISAMPLE_TYPE(native.multisample_type as _),
            native.multisample_quality,
            discard,
            surface,
            shared,
        )
    })
}

/// Creation event around a shader creation. `desc` wraps the shader code.
fn create_shader<'a>(
    this: *mut c_void,
    function: *const u32,
    out: *mut *mut c_void,
    original: CreateShaderFn,
    wrap: fn(ShaderDesc<'a>) -> PipelineDesc<'a>,
    track: fn(*mut c_void) -> PipelineData,
) -> HRESULT {
    if passthrough::active() || function.is_null() || out.is_null() {
        return unsafe { original(this, function, out) };
    }
    let Some(entry) = get_device(this) else {
        return unsafe { original(this, function, out) };
    };
    let device = &*entry.device;
    let registry = crate::registry();

    let tokens = conv::shader_token_count(|index| unsafe { *function.add(index) });
    let code = unsafe { slice::from_raw_parts(function.cast::<u8>(), tokens * 4) };
    let desc = wrap(ShaderDesc::new(code));

    let (hr, desc) = match dispatch::create_pipeline(registry, device, PipelineLayout::NULL, &desc) {
        Creation::Unchanged => (unsafe { original(this, function, out) }, desc),
        Creation::Modified(edited) => {
            let code = match &edited {
                PipelineDesc::VertexShader(shader) | PipelineDesc::PixelShader(shader) => shader.code,
                _ => code,
            };
            let tokens: Vec<u32> = code
                .chunks_exact(4)
                .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect();
            (unsafe { original(this, tokens.as_ptr(), out) }, edited)
        }
        Creation::Substitute(pipeline) => return hand_out(device.hand_out_pipeline(pipeline), out),
        Creation::Failed => return D3DERR_INVALIDCALL,
    };

    if hr.is_ok() {
        device.track_pipeline(registry, track(unsafe { *out }), &desc);
    }
    hr
}

#[tracing::instrument]
extern "system" fn create_vertex_shader(
    this: *mut c_void,
    function: *const u32,
    shader: *mut *mut c_void,
) -> HRESULT {
    trace!("IDirect3DDevice9::CreateVertexShader called");

    let original = original!(create_vertex_shader);
    create_shader(this, function, shader, original, PipelineDesc::VertexShader, |raw| {
        PipelineData::VertexShader(Com::Borrowed(raw))
    })
}

#[tracing::instrument]
extern "system" fn create_pixel_shader(
    this: *mut c_void,
    function: *const u32,
    shader: *mut *mut c_void,
) -> HRESULT {
    trace!("IDirect3DDevice9::CreatePixelShader called");

    let original = original!(create_pixel_shader);
    create_shader(this, function, shader, original, PipelineDesc::PixelShader, |raw| {
        PipelineData::PixelShader(Com::Borrowed(raw))
    })
}

#[tracing::instrument]
extern "system" fn create_vertex_declaration(
    this: *mut c_void,
    elements: *const D3DVERTEXELEMENT9,
    declaration: *mut *mut c_void,
) -> HRESULT {
    trace!("IDirect3DDevice9::CreateVertexDeclaration called");

    let original = original!(create_vertex_declaration);
    if passthrough::active() || elements.is_null() || declaration.is_null() {
        return unsafe { original(this, elements, declaration) };
    }
    let Some(entry) = get_device(this) else {
        return unsafe { original(this, elements, declaration) };
    };
    let device = &*entry.device;
    let registry = crate::registry();

    let native = unsafe { mirror_elements(elements) };
    let desc = PipelineDesc::InputLayout(conv::input_elements(&native));
    let (hr, desc) = match dispatch::create_pipeline(registry, device, PipelineLayout::NULL, &desc) {
        Creation::Unchanged => (unsafe { original(this, elements, declaration) }, desc),
        Creation::Modified(edited) => {
            let edited_native = match &edited {
                PipelineDesc::InputLayout(input) => conv::vertex_elements(input),
                _ => None,
            };
            match edited_native {
                Some(edited_native) => {
                    let edited_native = native_elements(&edited_native);
                    (unsafe { original(this, edited_native.as_ptr(), declaration) }, edited)
                }
                None => {
                    warn!("input layout edit can't be expressed in Direct3D 9, ignoring it");
                    (unsafe { original(this, elements, declaration) }, desc)
                }
            }
        }
        Creation::Substitute(pipeline) => {
            return hand_out(device.hand_out_pipeline(pipeline), declaration);
        }
        Creation::Failed => return D3DERR_INVALIDCALL,
    };

    if hr.is_ok() {
        device.track_pipeline(
            registry,
            PipelineData::InputLayout(Com::Borrowed(unsafe { *declaration })),
            &desc,
        );
    }
    hr
}

#[tracing::instrument]
extern "system" fn set_viewport(this: *mut c_void, viewport: *const D3DVIEWPORT9) -> HRESULT {
    trace!("IDirect3DDevice9::SetViewport called");

    let original = original!(set_viewport);
    let hr = unsafe { original(this, viewport) };
    if hr.is_err() {
        return hr;
    }

    if let Some(viewport) = unsafe { viewport.as_ref() } {
        report(this, EventKind::BindViewports, |registry, device| {
            registry.dispatch(&mut Event::BindViewports {
                cmd_list: device,
                first: 0,
                viewports: &[Viewport {
                    x: viewport.X as f32,
                    y: viewport.Y as f32,
                    width: viewport.Width as f32,
                    height: viewport.Height as f32,
                    min_depth: viewport.MinZ,
                    max_depth: viewport.MaxZ,
                }],
            });
        });
    }
    hr
}

#[tracing::instrument]
extern "system" fn set_scissor_rect(this: *mut c_void, rect: *const RECT) -> HRESULT {
    trace!("IDirect3DDevice9::SetScissorRect called");

    let original = original!(set_scissor_rect);
    let hr = unsafe { original(this, rect) };
    if hr.is_err() {
        return hr;
    }

    if let Some(rect) = unsafe { rect.as_ref() } {
        report(this, EventKind::BindScissorRects, |registry, device| {
            registry.dispatch(&mut Event::BindScissorRects {
                cmd_list: device,
                first: 0,
                rects: &[to_rect(rect)],
            });
        });
    }
    hr
}

#[tracing::instrument]
extern "system" fn set_render_state(this: *mut c_void, state: D3DRENDERSTATETYPE, value: u32) -> HRESULT {
    trace!("IDirect3DDevice9::SetRenderState called");

    let original = original!(set_render_state);
    let hr = unsafe { original(this, state, value) };
    if hr.is_err() {
        return hr;
    }

    // Render states below 1000 share their numbering with the unified states
    if let Some(state) = PipelineState::from_raw(state.0 as u32).filter(|state| (*state as u32) < 1000) {
        report(this, EventKind::BindPipelineStates, |registry, device| {
            registry.dispatch(&mut Event::BindPipelineStates {
                cmd_list: device,
                states: &[state],
                values: &[value],
            });
        });
    }
    hr
}

#[tracing::instrument]
extern "system" fn set_texture(this: *mut c_void, stage: u32, texture: *mut c_void) -> HRESULT {
    trace!("IDirect3DDevice9::SetTexture called");

    let original = original!(set_texture);
    let hr = unsafe { original(this, stage, texture) };
    if hr.is_err() {
        return hr;
    }

    report(this, EventKind::PushDescriptors, |registry, device| {
        // D3DVERTEXTEXTURESAMPLER0
        let (stages, binding) = if stage >= 257 {
            (ShaderStage::VERTEX, stage - 257)
        } else {
            (ShaderStage::PIXEL, stage)
        };

        let view = match unsafe { IDirect3DBaseTexture9::from_raw_borrowed(&texture) } {
            Some(texture) => {
                let mut srgb = 0;
                _ = passthrough::call(|| unsafe {
                    device.device.GetSamplerState(
                        stage,
                        D3DSAMPLERSTATETYPE(samp::SRGBTEXTURE as _),
                        &mut srgb,
                    )
                });
                device.adopt_texture_view(texture, srgb != 0)
            }
            None => ResourceView::NULL,
        };

        registry.dispatch(&mut Event::PushDescriptors {
            cmd_list: device,
            stages,
            layout: PipelineLayout::NULL,
            param: 0,
            update: DescriptorSetUpdate {
                set: DescriptorSet::NULL,
                binding,
                array_offset: 0,
                descriptors: Descriptors::ShaderResourceViews(&[view]),
            },
        });
    });
    hr
}

fn report_shader(this: *mut c_void, stages: PipelineStage, shader: *mut c_void) {
    report(this, EventKind::BindPipeline, |registry, device| {
        registry.dispatch(&mut Event::BindPipeline {
            cmd_list: device,
            stages,
            pipeline: Pipeline::from_raw(shader as u64),
        });
    });
}

#[tracing::instrument]
extern "system" fn set_vertex_shader(this: *mut c_void, shader: *mut c_void) -> HRESULT {
    trace!("IDirect3DDevice9::SetVertexShader called");

    let original = original!(set_vertex_shader);
    let hr = unsafe { original(this, shader) };
    if hr.is_ok() {
        report_shader(this, PipelineStage::VERTEX_SHADER, shader);
    }
    hr
}

#[tracing::instrument]
extern "system" fn set_pixel_shader(this: *mut c_void, shader: *mut c_void) -> HRESULT {
    trace!("IDirect3DDevice9::SetPixelShader called");

    let original = original!(set_pixel_shader);
    let hr = unsafe { original(this, shader) };
    if hr.is_ok() {
        report_shader(this, PipelineStage::PIXEL_SHADER, shader);
    }
    hr
}

#[tracing::instrument]
extern "system" fn set_stream_source(
    this: *mut c_void,
    stream: u32,
    buffer: *mut c_void,
    offset: u32,
    stride: u32,
) -> HRESULT {
    trace!("IDirect3DDevice9::SetStreamSource called");

    let original = original!(set_stream_source);
    let hr = unsafe { original(this, stream, buffer, offset, stride) };
    if hr.is_err() {
        return hr;
    }

    report(this, EventKind::BindVertexBuffers, |registry, device| {
        registry.dispatch(&mut Event::BindVertexBuffers {
            cmd_list: device,
            first: stream,
            buffers: &[Resource::from_raw(buffer as u64)],
            offsets: &[offset as u64],
            strides: &[stride],
        });
    });
    hr
}

#[tracing::instrument]
extern "system" fn set_indices(this: *mut c_void, buffer: *mut c_void) -> HRESULT {
    trace!("IDirect3DDevice9::SetIndices called");

    let original = original!(set_indices);
    let hr = unsafe { original(this, buffer) };
    if hr.is_err() {
        return hr;
    }

    report(this, EventKind::BindIndexBuffer, |registry, device| {
        let buffer = Resource::from_raw(buffer as u64);
        let index_size = match device.get_resource_desc(buffer) {
            Some(desc) if desc.format == tint_api::Format::R32Uint => 4,
            Some(_) => 2,
            None => 0,
        };

        registry.dispatch(&mut Event::BindIndexBuffer {
            cmd_list: device,
            buffer,
            offset: 0,
            index_size,
        });
    });
    hr
}

/// Remembers the primitive type of a draw, reporting it when it changed.
fn sync_topology(registry: &Registry, device: &DeviceImpl, prim_type: u32) {
    let previous = core::mem::replace(&mut device.state.lock().topology, prim_type);
    if previous != prim_type && registry.has_listeners(EventKind::BindPipelineStates) {
        registry.dispatch(&mut Event::BindPipelineStates {
            cmd_list: device,
            states: &[PipelineState::PrimitiveTopology],
            values: &[conv::topology_from_d3d(prim_type).to_raw()],
        });
    }
}

#[tracing::instrument]
extern "system" fn draw_primitive(
    this: *mut c_void,
    prim_type: D3DPRIMITIVETYPE,
    start_vertex: u32,
    primitive_count: u32,
) -> HRESULT {
    trace!("IDirect3DDevice9::DrawPrimitive called");

    let original = original!(draw_primitive);
    let flow = with_device(this, |registry, device| {
        sync_topology(registry, device, prim_type.0 as u32);
        registry.dispatch(&mut Event::Draw {
            cmd_list: device,
            vertex_count: conv::vertex_count(prim_type.0 as u32, primitive_count),
            instance_count: 1,
            first_vertex: start_vertex,
            first_instance: 0,
        })
    });
    if flow == Some(Flow::Handled) {
        return S_OK;
    }

    unsafe { original(this, prim_type, start_vertex, primitive_count) }
}

#[tracing::instrument]
extern "system" fn draw_indexed_primitive(
    this: *mut c_void,
    prim_type: D3DPRIMITIVETYPE,
    base_vertex: i32,
    min_index: u32,
    vertex_count: u32,
    start_index: u32,
    primitive_count: u32,
) -> HRESULT {
    trace!("IDirect3DDevice9::DrawIndexedPrimitive called");

    let original = original!(draw_indexed_primitive);
    let flow = with_device(this, |registry, device| {
        sync_topology(registry, device, prim_type.0 as u32);
        registry.dispatch(&mut Event::DrawIndexed {
            cmd_list: device,
            index_count: conv::vertex_count(prim_type.0 as u32, primitive_count),
            instance_count: 1,
            first_index: start_index,
            vertex_offset: base_vertex,
            first_instance: 0,
        })
    });
    if flow == Some(Flow::Handled) {
        return S_OK;
    }

    unsafe {
        original(
            this,
            prim_type,
            base_vertex,
            min_index,
            vertex_count,
            start_index,
            primitive_count,
        )
    }
}

#[tracing::instrument]
extern "system" fn draw_primitive_up(
    this: *mut c_void,
    prim_type: D3DPRIMITIVETYPE,
    primitive_count: u32,
    vertex_data: *const c_void,
    stride: u32,
) -> HRESULT {
    trace!("IDirect3DDevice9::DrawPrimitiveUP called");

    let original = original!(draw_primitive_up);
    let flow = with_device(this, |registry, device| {
        sync_topology(registry, device, prim_type.0 as u32);
        registry.dispatch(&mut Event::Draw {
            cmd_list: device,
            vertex_count: conv::vertex_count(prim_type.0 as u32, primitive_count),
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        })
    });
    if flow == Some(Flow::Handled) {
        return S_OK;
    }

    unsafe { original(this, prim_type, primitive_count, vertex_data, stride) }
}

#[tracing::instrument]
extern "system" fn draw_indexed_primitive_up(
    this: *mut c_void,
    prim_type: D3DPRIMITIVETYPE,
    min_index: u32,
    vertex_count: u32,
    primitive_count: u32,
    index_data: *const c_void,
    index_format: D3DFORMAT,
    vertex_data: *const c_void,
    stride: u32,
) -> HRESULT {
    trace!("IDirect3DDevice9::DrawIndexedPrimitiveUP called");

    let original = original!(draw_indexed_primitive_up);
    let flow = with_device(this, |registry, device| {
        sync_topology(registry, device, prim_type.0 as u32);
        registry.dispatch(&mut Event::DrawIndexed {
            cmd_list: device,
            index_count: conv::vertex_count(prim_type.0 as u32, primitive_count),
            instance_count: 1,
            first_index: 0,
            vertex_offset: 0,
            first_instance: 0,
        })
    });
    if flow == Some(Flow::Handled) {
        return S_OK;
    }

    unsafe {
        original(
            this,
            prim_type,
            min_index,
            vertex_count,
            primitive_count,
            index_data,
            index_format,
            vertex_data,
            stride,
        )
    }
}

#[tracing::instrument]
extern "system" fn stretch_rect(
    this: *mut c_void,
    src: *mut c_void,
    src_rect: *const RECT,
    dst: *mut c_void,
    dst_rect: *const RECT,
    filter: D3DTEXTUREFILTERTYPE,
) -> HRESULT {
    trace!("IDirect3DDevice9::StretchRect called");

    let original = original!(stretch_rect);
    let flow = with_device(this, |registry, device| {
        if !registry.has_listeners(EventKind::CopyTextureRegion)
            && !registry.has_listeners(EventKind::ResolveTextureRegion)
        {
            return Flow::Continue;
        }
        let (Some(src), Some(dst)) = unsafe {
            (
                IDirect3DSurface9::from_raw_borrowed(&src),
                IDirect3DSurface9::from_raw_borrowed(&dst),
            )
        } else {
            return Flow::Continue;
        };

        let (src, src_subresource) = device.surface_subresource(src);
        let (dst, dst_subresource) = device.surface_subresource(dst);
        let src_box = unsafe { src_rect.as_ref() }.map(rect_box);
        let dst_rect = unsafe { dst_rect.as_ref() };

        match device.get_resource_desc(src) {
            Some(desc) if is_multisampled(&desc) => registry.dispatch(&mut Event::ResolveTextureRegion {
                cmd_list: device,
                src,
                src_subresource,
                src_box,
                dst,
                dst_subresource,
                dst_offset: dst_rect.map_or([0; 3], |rect| [rect.left, rect.top, 0]),
                format: desc.format,
            }),
            _ => registry.dispatch(&mut Event::CopyTextureRegion {
                cmd_list: device,
                src,
                src_subresource,
                src_box,
                dst,
                dst_subresource,
                dst_box: dst_rect.map(rect_box),
                filter: if filter.0 as u32 == texf::LINEAR {
                    FilterMode::MinMagMipLinear
                } else {
                    FilterMode::MinMagMipPoint
                },
            }),
        }
    });
    if flow == Some(Flow::Handled) {
        return S_OK;
    }

    unsafe { original(this, src, src_rect, dst, dst_rect, filter) }
}

#[tracing::instrument]
extern "system" fn update_surface(
    this: *mut c_void,
    src: *mut c_void,
    src_rect: *const RECT,
    dst: *mut c_void,
    dst_point: *const POINT,
) -> HRESULT {
    trace!("IDirect3DDevice9::UpdateSurface called");

    let original = original!(update_surface);
    let flow = with_device(this, |registry, device| {
        if !registry.has_listeners(EventKind::CopyTextureRegion) {
            return Flow::Continue;
        }
        let (Some(src), Some(dst)) = unsafe {
            (
                IDirect3DSurface9::from_raw_borrowed(&src),
                IDirect3DSurface9::from_raw_borrowed(&dst),
            )
        } else {
            return Flow::Continue;
        };

        let src_box = unsafe { src_rect.as_ref() }.map(rect_box);
        let (width, height) = match src_box {
            Some(src_box) => (src_box.width() as i32, src_box.height() as i32),
            None => {
                let mut desc = D3DSURFACE_DESC::default();
                _ = passthrough::call(|| unsafe { src.GetDesc(&mut desc) });
                (desc.Width as i32, desc.Height as i32)
            }
        };
        let dst_box = unsafe { dst_point.as_ref() }.map(|point| SubresourceBox {
            left: point.x,
            top: point.y,
            front: 0,
            right: point.x + width,
            bottom: point.y + height,
            back: 1,
        });

        let (src, src_subresource) = device.surface_subresource(src);
        let (dst, dst_subresource) = device.surface_subresource(dst);
        registry.dispatch(&mut Event::CopyTextureRegion {
            cmd_list: device,
            src,
            src_subresource,
            src_box,
            dst,
            dst_subresource,
            dst_box,
            filter: FilterMode::MinMagMipPoint,
        })
    });
    if flow == Some(Flow::Handled) {
        return S_OK;
    }

    unsafe { original(this, src, src_rect, dst, dst_point) }
}

#[tracing::instrument]
extern "system" fn update_texture(this: *mut c_void, src: *mut c_void, dst: *mut c_void) -> HRESULT {
    trace!("IDirect3DDevice9::UpdateTexture called");

    let original = original!(update_texture);
    let flow = with_device(this, |registry, device| {
        registry.dispatch(&mut Event::CopyResource {
            cmd_list: device,
            src: Resource::from_raw(src as u64),
            dst: Resource::from_raw(dst as u64),
        })
    });
    if flow == Some(Flow::Handled) {
        return S_OK;
    }

    unsafe { original(this, src, dst) }
}

#[tracing::instrument]
extern "system" fn clear(
    this: *mut c_void,
    count: u32,
    rects: *const D3DRECT,
    flags: u32,
    color: u32,
    depth: f32,
    stencil: u32,
) -> HRESULT {
    trace!("IDirect3DDevice9::Clear called");

    let original = original!(clear);
    let remaining = with_device(this, |registry, device| {
        if !registry.has_listeners(EventKind::ClearRenderTargetView)
            && !registry.has_listeners(EventKind::ClearDepthStencilView)
        {
            return flags;
        }

        let render_targets: Vec<ResourceView> = (0..device.max_render_targets)
            .filter_map(|index| passthrough::call(|| unsafe { device.device.GetRenderTarget(index) }).ok())
            .map(|surface| device.adopt_surface_view(&surface, ResourceUsage::RENDER_TARGET))
            .collect();
        let depth_stencil = passthrough::call(|| unsafe { device.device.GetDepthStencilSurface() })
            .ok()
            .map(|surface| device.adopt_surface_view(&surface, ResourceUsage::DEPTH_STENCIL));
        let rects: Vec<Rect> = if rects.is_null() {
            Vec::new()
        } else {
            unsafe { slice::from_raw_parts(rects, count as usize) }
                .iter()
                .map(|rect| Rect {
                    left: rect.x1,
                    top: rect.y1,
                    right: rect.x2,
                    bottom: rect.y2,
                })
                .collect()
        };

        clear::Clear {
            flags,
            render_targets: &render_targets,
            color: conv::color_to_rgba(color),
            depth_stencil,
            depth,
            stencil: stencil as u8,
            rects: &rects,
        }
        .dispatch(registry, device)
    })
    .unwrap_or(flags);

    if remaining == 0 {
        return S_OK;
    }
    unsafe { original(this, count, rects, remaining, color, depth, stencil) }
}
