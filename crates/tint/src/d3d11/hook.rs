//! `ID3D11Device`, `ID3D11DeviceContext` and `IDXGISwapChain` vtable hooks.
//!
//! Every object of these classes shares one vtable per interface, so the slots are patched
//! once through dummy objects. Devices are picked up by the first hooked call made on them
//! or on their immediate context. Deferred contexts are not tracked.
//! State binds are reported after the native call, draws, copies and clears before it.

use core::{ffi::c_void, ptr, slice};
use std::sync::Arc;

use anyhow::{Context, bail};
use dashmap::mapref::entry::Entry;
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use scopeguard::defer;
use tint_api::{
    CommandQueue, Device, Pipeline, PipelineLayout, Resource, ResourceView,
    pipeline::{
        IndirectCommand, LoadOp, PipelineDesc, PipelineStage, PipelineState, Rect,
        RenderPassDepthStencil, RenderPassRenderTarget, ShaderDesc, StoreOp, Viewport,
    },
    resource::{ResourceDesc, ResourceDimension, ResourceUsage, SubresourceBox},
    sampler::FilterMode,
};
use tint_event::{Event, EventKind, Flow, Registry};
use tint_hook::{HookResult, VtableHook, vtable_slot};
use tracing::{debug, error, trace, warn};
use windows::{
    Win32::{
        Foundation::{E_FAIL, E_INVALIDARG, HMODULE, RECT, S_OK},
        Graphics::{
            Direct3D::{D3D_DRIVER_TYPE_UNKNOWN, D3D_FEATURE_LEVEL_11_0, D3D_PRIMITIVE_TOPOLOGY, ID3DDestructionNotifier},
            Direct3D11::*,
            Dxgi::{
                Common::{DXGI_FORMAT, DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_MODE_DESC, DXGI_SAMPLE_DESC},
                CreateDXGIFactory1, DXGI_PRESENT, DXGI_PRESENT_PARAMETERS, DXGI_PRESENT_TEST,
                DXGI_SWAP_CHAIN_DESC, DXGI_SWAP_EFFECT_DISCARD, DXGI_USAGE_RENDER_TARGET_OUTPUT,
                IDXGIFactory1, IDXGISwapChain, IDXGISwapChain1,
            },
        },
        UI::WindowsAndMessaging::GetDesktopWindow,
    },
    core::{BOOL, HRESULT, Interface},
};

use super::{
    Plan,
    command::CommandListImpl,
    conv::{self, ViewDesc, ViewKind},
    device::{
        DeviceImpl, Tracked, mirror_blend_desc, mirror_buffer_desc, mirror_depth_stencil_desc,
        mirror_dsv_desc, mirror_input_elements, mirror_rasterizer_desc, mirror_rtv_desc,
        mirror_sampler_desc, mirror_srv_desc, mirror_texture_1d_desc, mirror_texture_2d_desc,
        mirror_texture_3d_desc, mirror_uav_desc, native_blend_desc, native_buffer_desc,
        native_depth_stencil_desc, native_dsv_desc, native_input_elements, native_rasterizer_desc,
        native_rtv_desc, native_sampler_desc, native_srv_desc, native_texture_1d_desc,
        native_texture_2d_desc, native_texture_3d_desc, native_uav_desc, semantic_names,
    },
    plan_resource, plan_view,
};
use crate::{
    dispatch::{self, Creation},
    map::IntDashMap,
    passthrough,
    runtime::{EffectRuntime, compiler::ShaderFormat},
};

type CreateBufferFn = unsafe extern "system" fn(
    *mut c_void,
    *const D3D11_BUFFER_DESC,
    *const D3D11_SUBRESOURCE_DATA,
    *mut *mut c_void,
) -> HRESULT;
type CreateTexture1dFn = unsafe extern "system" fn(
    *mut c_void,
    *const D3D11_TEXTURE1D_DESC,
    *const D3D11_SUBRESOURCE_DATA,
    *mut *mut c_void,
) -> HRESULT;
type CreateTexture2dFn = unsafe extern "system" fn(
    *mut c_void,
    *const D3D11_TEXTURE2D_DESC,
    *const D3D11_SUBRESOURCE_DATA,
    *mut *mut c_void,
) -> HRESULT;
type CreateTexture3dFn = unsafe extern "system" fn(
    *mut c_void,
    *const D3D11_TEXTURE3D_DESC,
    *const D3D11_SUBRESOURCE_DATA,
    *mut *mut c_void,
) -> HRESULT;
type CreateSrvFn = unsafe extern "system" fn(
    *mut c_void,
    *mut c_void,
    *const D3D11_SHADER_RESOURCE_VIEW_DESC,
    *mut *mut c_void,
) -> HRESULT;
type CreateUavFn = unsafe extern "system" fn(
    *mut c_void,
    *mut c_void,
    *const D3D11_UNORDERED_ACCESS_VIEW_DESC,
    *mut *mut c_void,
) -> HRESULT;
type CreateRtvFn = unsafe extern "system" fn(
    *mut c_void,
    *mut c_void,
    *const D3D11_RENDER_TARGET_VIEW_DESC,
    *mut *mut c_void,
) -> HRESULT;
type CreateDsvFn = unsafe extern "system" fn(
    *mut c_void,
    *mut c_void,
    *const D3D11_DEPTH_STENCIL_VIEW_DESC,
    *mut *mut c_void,
) -> HRESULT;
type CreateInputLayoutFn = unsafe extern "system" fn(
    *mut c_void,
    *const D3D11_INPUT_ELEMENT_DESC,
    u32,
    *const c_void,
    usize,
    *mut *mut c_void,
) -> HRESULT;
type CreateShaderFn =
    unsafe extern "system" fn(*mut c_void, *const c_void, usize, *mut c_void, *mut *mut c_void) -> HRESULT;
type CreateBlendStateFn =
    unsafe extern "system" fn(*mut c_void, *const D3D11_BLEND_DESC, *mut *mut c_void) -> HRESULT;
type CreateDepthStencilStateFn =
    unsafe extern "system" fn(*mut c_void, *const D3D11_DEPTH_STENCIL_DESC, *mut *mut c_void) -> HRESULT;
type CreateRasterizerStateFn =
    unsafe extern "system" fn(*mut c_void, *const D3D11_RASTERIZER_DESC, *mut *mut c_void) -> HRESULT;
type CreateSamplerStateFn =
    unsafe extern "system" fn(*mut c_void, *const D3D11_SAMPLER_DESC, *mut *mut c_void) -> HRESULT;

type SetShaderFn = unsafe extern "system" fn(*mut c_void, *mut c_void, *const *mut c_void, u32);
type SetObjectFn = unsafe extern "system" fn(*mut c_void, *mut c_void);
type DrawFn = unsafe extern "system" fn(*mut c_void, u32, u32);
type DrawIndexedFn = unsafe extern "system" fn(*mut c_void, u32, u32, i32);
type DrawIndexedInstancedFn = unsafe extern "system" fn(*mut c_void, u32, u32, u32, i32, u32);
type DrawInstancedFn = unsafe extern "system" fn(*mut c_void, u32, u32, u32, u32);
type IndirectFn = unsafe extern "system" fn(*mut c_void, *mut c_void, u32);
type DispatchFn = unsafe extern "system" fn(*mut c_void, u32, u32, u32);
type SetVertexBuffersFn =
    unsafe extern "system" fn(*mut c_void, u32, u32, *const *mut c_void, *const u32, *const u32);
type SetIndexBufferFn = unsafe extern "system" fn(*mut c_void, *mut c_void, DXGI_FORMAT, u32);
type SetTopologyFn = unsafe extern "system" fn(*mut c_void, D3D_PRIMITIVE_TOPOLOGY);
type SetRenderTargetsFn = unsafe extern "system" fn(*mut c_void, u32, *const *mut c_void, *mut c_void);
type SetBlendStateFn = unsafe extern "system" fn(*mut c_void, *mut c_void, *const [f32; 4], u32);
type SetDepthStencilStateFn = unsafe extern "system" fn(*mut c_void, *mut c_void, u32);
type SetViewportsFn = unsafe extern "system" fn(*mut c_void, u32, *const D3D11_VIEWPORT);
type SetScissorRectsFn = unsafe extern "system" fn(*mut c_void, u32, *const RECT);
type CopySubresourceRegionFn =
    unsafe extern "system" fn(*mut c_void, *mut c_void, u32, u32, u32, u32, *mut c_void, u32, *const D3D11_BOX);
type CopyResourceFn = unsafe extern "system" fn(*mut c_void, *mut c_void, *mut c_void);
type ResolveSubresourceFn = unsafe extern "system" fn(*mut c_void, *mut c_void, u32, *mut c_void, u32, DXGI_FORMAT);
type ClearRtvFn = unsafe extern "system" fn(*mut c_void, *mut c_void, *const [f32; 4]);
type ClearUavUintFn = unsafe extern "system" fn(*mut c_void, *mut c_void, *const [u32; 4]);
type ClearUavFloatFn = unsafe extern "system" fn(*mut c_void, *mut c_void, *const [f32; 4]);
type ClearDsvFn = unsafe extern "system" fn(*mut c_void, *mut c_void, u32, f32, u8);

type PresentFn = unsafe extern "system" fn(*mut c_void, u32, DXGI_PRESENT) -> HRESULT;
type Present1Fn =
    unsafe extern "system" fn(*mut c_void, u32, DXGI_PRESENT, *const DXGI_PRESENT_PARAMETERS) -> HRESULT;
type ResizeBuffersFn = unsafe extern "system" fn(*mut c_void, u32, u32, u32, DXGI_FORMAT, u32) -> HRESULT;

macro_rules! vtable_hooks {
    ($hooks:ident { $($name:ident: $ty:ty = $index:literal => $detour:ident,)* }) => {
        struct $hooks {
            $($name: VtableHook<$ty>,)*
        }

        impl $hooks {
            /// # Safety
            /// object must be a live instance of the hooked interface.
            unsafe fn attach(object: *mut c_void) -> HookResult<Self> {
                Ok(Self {
                    $($name: unsafe {
                        VtableHook::attach(vtable_slot::<$ty>(object, $index), $detour as $ty)?
                    },)*
                })
            }
        }
    };
}

vtable_hooks!(DeviceHooks {
    create_buffer: CreateBufferFn = 3 => create_buffer,
    create_texture_1d: CreateTexture1dFn = 4 => create_texture_1d,
    create_texture_2d: CreateTexture2dFn = 5 => create_texture_2d,
    create_texture_3d: CreateTexture3dFn = 6 => create_texture_3d,
    create_srv: CreateSrvFn = 7 => create_shader_resource_view,
    create_uav: CreateUavFn = 8 => create_unordered_access_view,
    create_rtv: CreateRtvFn = 9 => create_render_target_view,
    create_dsv: CreateDsvFn = 10 => create_depth_stencil_view,
    create_input_layout: CreateInputLayoutFn = 11 => create_input_layout,
    create_vertex_shader: CreateShaderFn = 12 => create_vertex_shader,
    create_geometry_shader: CreateShaderFn = 13 => create_geometry_shader,
    create_pixel_shader: CreateShaderFn = 15 => create_pixel_shader,
    create_hull_shader: CreateShaderFn = 16 => create_hull_shader,
    create_domain_shader: CreateShaderFn = 17 => create_domain_shader,
    create_compute_shader: CreateShaderFn = 18 => create_compute_shader,
    create_blend_state: CreateBlendStateFn = 20 => create_blend_state,
    create_depth_stencil_state: CreateDepthStencilStateFn = 21 => create_depth_stencil_state,
    create_rasterizer_state: CreateRasterizerStateFn = 22 => create_rasterizer_state,
    create_sampler_state: CreateSamplerStateFn = 23 => create_sampler_state,
});

vtable_hooks!(ContextHooks {
    ps_set_shader: SetShaderFn = 9 => ps_set_shader,
    vs_set_shader: SetShaderFn = 11 => vs_set_shader,
    draw_indexed: DrawIndexedFn = 12 => draw_indexed,
    draw: DrawFn = 13 => draw,
    ia_set_input_layout: SetObjectFn = 17 => ia_set_input_layout,
    ia_set_vertex_buffers: SetVertexBuffersFn = 18 => ia_set_vertex_buffers,
    ia_set_index_buffer: SetIndexBufferFn = 19 => ia_set_index_buffer,
    draw_indexed_instanced: DrawIndexedInstancedFn = 20 => draw_indexed_instanced,
    draw_instanced: DrawInstancedFn = 21 => draw_instanced,
    ia_set_primitive_topology: SetTopologyFn = 24 => ia_set_primitive_topology,
    om_set_render_targets: SetRenderTargetsFn = 33 => om_set_render_targets,
    om_set_blend_state: SetBlendStateFn = 35 => om_set_blend_state,
    om_set_depth_stencil_state: SetDepthStencilStateFn = 36 => om_set_depth_stencil_state,
    draw_indexed_instanced_indirect: IndirectFn = 39 => draw_indexed_instanced_indirect,
    draw_instanced_indirect: IndirectFn = 40 => draw_instanced_indirect,
    dispatch: DispatchFn = 41 => dispatch,
    dispatch_indirect: IndirectFn = 42 => dispatch_indirect,
    rs_set_state: SetObjectFn = 43 => rs_set_state,
    rs_set_viewports: SetViewportsFn = 44 => rs_set_viewports,
    rs_set_scissor_rects: SetScissorRectsFn = 45 => rs_set_scissor_rects,
    copy_subresource_region: CopySubresourceRegionFn = 46 => copy_subresource_region,
    copy_resource: CopyResourceFn = 47 => copy_resource,
    clear_render_target_view: ClearRtvFn = 50 => clear_render_target_view,
    clear_uav_uint: ClearUavUintFn = 51 => clear_unordered_access_view_uint,
    clear_uav_float: ClearUavFloatFn = 52 => clear_unordered_access_view_float,
    clear_depth_stencil_view: ClearDsvFn = 53 => clear_depth_stencil_view,
    generate_mips: SetObjectFn = 54 => generate_mips,
    resolve_subresource: ResolveSubresourceFn = 57 => resolve_subresource,
    cs_set_shader: SetShaderFn = 69 => cs_set_shader,
});

vtable_hooks!(SwapchainHooks {
    present: PresentFn = 8 => present,
    resize_buffers: ResizeBuffersFn = 13 => resize_buffers,
});

struct Hooks {
    device: DeviceHooks,
    context: ContextHooks,
    swapchain: SwapchainHooks,
    /// `IDXGISwapChain1::Present1`, absent before DXGI 1.2.
    present1: Option<VtableHook<Present1Fn>>,
}

static HOOKS: OnceCell<Hooks> = OnceCell::new();

/// Original function of a hooked slot. Calls racing the installation return `$fail`.
macro_rules! original {
    ($group:ident . $name:ident) => {
        original!($group.$name, ())
    };
    ($group:ident . $name:ident, $fail:expr) => {
        match HOOKS.get() {
            Some(hooks) => hooks.$group.$name.original_fn(),
            None => return $fail,
        }
    };
}

/// Patches the `ID3D11Device`, `ID3D11DeviceContext` and `IDXGISwapChain` vtables.
pub fn install() -> anyhow::Result<()> {
    if HOOKS.get().is_some() {
        bail!("Direct3D 11 hooks already installed");
    }

    let (device, context, swapchain) = dummy_objects()?;
    let hooks = unsafe {
        let present1 = match swapchain.cast::<IDXGISwapChain1>() {
            Ok(swapchain1) => Some(
                VtableHook::attach(
                    vtable_slot::<Present1Fn>(swapchain1.as_raw(), 22),
                    present1 as Present1Fn,
                )
                .context("Cannot hook IDXGISwapChain1::Present1")?,
            ),
            Err(_) => None,
        };

        Hooks {
            device: DeviceHooks::attach(device.as_raw()).context("Cannot hook ID3D11Device")?,
            context: ContextHooks::attach(context.as_raw()).context("Cannot hook ID3D11DeviceContext")?,
            swapchain: SwapchainHooks::attach(swapchain.as_raw()).context("Cannot hook IDXGISwapChain")?,
            present1,
        }
    };
    if HOOKS.set(hooks).is_err() {
        bail!("Direct3D 11 hooks already installed");
    }

    debug!("Direct3D 11 hooks installed");
    Ok(())
}

/// Device, immediate context and swapchain used only to reach the vtables
fn dummy_objects() -> anyhow::Result<(ID3D11Device, ID3D11DeviceContext, IDXGISwapChain)> {
    unsafe {
        let factory = CreateDXGIFactory1::<IDXGIFactory1>()?;
        let adapter = factory.EnumAdapters1(0)?;

        let desc = DXGI_SWAP_CHAIN_DESC {
            BufferCount: 1,
            BufferDesc: DXGI_MODE_DESC {
                Format: DXGI_FORMAT_R8G8B8A8_UNORM,
                ..Default::default()
            },
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                ..Default::default()
            },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            OutputWindow: GetDesktopWindow(),
            Windowed: BOOL(1),
            SwapEffect: DXGI_SWAP_EFFECT_DISCARD,
            ..Default::default()
        };

        let mut swapchain = None;
        let mut device = None;
        let mut context = None;
        D3D11CreateDeviceAndSwapChain(
            &adapter,
            D3D_DRIVER_TYPE_UNKNOWN,
            HMODULE(ptr::null_mut()),
            D3D11_CREATE_DEVICE_FLAG(0),
            None,
            D3D11_SDK_VERSION,
            Some(&desc),
            Some(&mut swapchain),
            Some(&mut device),
            None,
            Some(&mut context),
        )?;

        Ok((
            device.context("Cannot create ID3D11Device")?,
            context.context("Cannot create ID3D11DeviceContext")?,
            swapchain.context("Cannot create IDXGISwapChain")?,
        ))
    }
}

struct DeviceEntry {
    device: Arc<DeviceImpl>,
    /// Immediate context, also the device's only queue.
    cmd_list: Arc<CommandListImpl>,
}

/// Devices seen through a hook, keyed by interface pointer.
static DEVICES: Lazy<IntDashMap<u64, Arc<DeviceEntry>>> = Lazy::new(IntDashMap::default);

/// Device of every context seen, `0` for deferred contexts.
static CONTEXTS: Lazy<IntDashMap<u64, u64>> = Lazy::new(IntDashMap::default);

fn get_device(this: *mut c_void) -> Option<Arc<DeviceEntry>> {
    if let Some(entry) = DEVICES.get(&(this as u64)) {
        return Some(entry.clone());
    }

    let device = unsafe { ID3D11Device::from_raw_borrowed(&this) }?.clone();
    let device = match DeviceImpl::new(device) {
        Ok(device) => Arc::new(device),
        Err(err) => {
            error!("cannot track device {this:?}. err: {err:?}");
            return None;
        }
    };
    let context = device.context.as_raw() as u64;

    let entry = match DEVICES.entry(this as u64) {
        Entry::Occupied(entry) => return Some(entry.get().clone()),
        Entry::Vacant(entry) => entry
            .insert(Arc::new(DeviceEntry {
                cmd_list: Arc::new(CommandListImpl::new(device.clone())),
                device,
            }))
            .clone(),
    };
    CONTEXTS.insert(context, this as u64);

    debug!("device {this:?} found");
    let registry = crate::registry();
    registry.dispatch(&mut Event::InitDevice { device: &*entry.device });
    registry.dispatch(&mut Event::InitCommandQueue { queue: &*entry.cmd_list });
    registry.dispatch(&mut Event::InitCommandList {
        cmd_list: &*entry.cmd_list,
    });
    Some(entry)
}

fn get_context(this: *mut c_void) -> Option<Arc<DeviceEntry>> {
    if let Some(device) = CONTEXTS.get(&(this as u64)).map(|device| *device) {
        return DEVICES.get(&device).map(|entry| entry.clone());
    }

    let context = unsafe { ID3D11DeviceContext::from_raw_borrowed(&this) }?;
    let device = passthrough::call(|| unsafe {
        if context.GetType() == D3D11_DEVICE_CONTEXT_IMMEDIATE {
            context.GetDevice().ok()
        } else {
            None
        }
    });
    let Some(device) = device else {
        trace!("deferred context {this:?} is not tracked");
        CONTEXTS.insert(this as u64, 0);
        return None;
    };

    get_device(device.as_raw())
}

/// Runs `f` for a call the application made on an immediate context.
fn with_context<R>(this: *mut c_void, f: impl FnOnce(&Registry, &DeviceEntry) -> R) -> Option<R> {
    if passthrough::active() {
        return None;
    }

    let entry = get_context(this)?;
    Some(f(crate::registry(), &entry))
}

/// Reports a state the native call just bound, if anyone listens.
fn report(this: *mut c_void, kind: EventKind, f: impl FnOnce(&Registry, &CommandListImpl)) {
    if passthrough::active() || !crate::registry().has_listeners(kind) {
        return;
    }

    with_context(this, |registry, entry| f(registry, &entry.cmd_list));
}

/// Fires an overridable command event, `true` when a listener skipped the native call.
fn vetoed(this: *mut c_void, kind: EventKind, f: impl FnOnce(&Registry, &DeviceEntry) -> Flow) -> bool {
    if passthrough::active() || !crate::registry().has_listeners(kind) {
        return false;
    }

    with_context(this, f) == Some(Flow::Handled)
}

/// Drops an application object the runtime just destroyed.
pub(crate) fn forget_object(device: u64, tracked: Tracked, raw: u64) {
    let Some(entry) = DEVICES.get(&device).map(|entry| entry.clone()) else {
        return;
    };

    entry.device.forget(crate::registry(), tracked, raw);
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
            E_INVALIDARG
        }
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

fn to_box(b: &D3D11_BOX) -> SubresourceBox {
    SubresourceBox {
        left: b.left as i32,
        top: b.top as i32,
        front: b.front as i32,
        right: b.right as i32,
        bottom: b.bottom as i32,
        back: b.back as i32,
    }
}

fn to_viewport(viewport: &D3D11_VIEWPORT) -> Viewport {
    Viewport {
        x: viewport.TopLeftX,
        y: viewport.TopLeftY,
        width: viewport.Width,
        height: viewport.Height,
        min_depth: viewport.MinDepth,
        max_depth: viewport.MaxDepth,
    }
}

/// Blend factor as an 8-bit RGBA value.
fn pack_color(color: &[f32; 4]) -> u32 {
    u32::from_le_bytes(color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
}

/// Bytes per index of an index buffer format.
fn index_size(format: u32) -> u32 {
    match format {
        // DXGI_FORMAT_R32_UINT
        42 => 4,
        // DXGI_FORMAT_R16_UINT
        57 => 2,
        _ => 0,
    }
}

/// Width, height and depth of the mip level `subresource` addresses.
fn subresource_extent(desc: &ResourceDesc, subresource: u32) -> [u32; 3] {
    let (width, height, depth, levels) = match desc.dimension {
        ResourceDimension::Buffer { size, .. } => return [size as u32, 1, 1],
        ResourceDimension::Texture1d { width, levels, .. } => (width, 1, 1, levels),
        ResourceDimension::Texture2d {
            width, height, levels, ..
        } => (width, height, 1, levels),
        ResourceDimension::Texture3d {
            width,
            height,
            depth,
            levels,
        } => (width, height, u32::from(depth), levels),
    };

    let level = subresource % u32::from(levels.max(1));
    [
        (width >> level).max(1),
        (height >> level).max(1),
        (depth >> level).max(1),
    ]
}

/// Description of a resource a view is created on, adopting untracked 2D textures.
fn view_resource_desc(device: &DeviceImpl, raw: *mut c_void) -> Option<ResourceDesc> {
    if let Some(desc) = device.resources.with(raw as u64, |data| data.desc) {
        return Some(desc);
    }

    let resource = unsafe { ID3D11Resource::from_raw_borrowed(&raw) }?;
    let texture = passthrough::call(|| resource.cast::<ID3D11Texture2D>()).ok()?;
    Some(device.adopt_texture_2d(&texture).1)
}

macro_rules! describe {
    ($($name:ident: $interface:ty, $native:ty, $mirror:ident -> $desc:ty;)*) => {$(
        /// Description of the created object, with the levels the runtime picked.
        fn $name(raw: *mut c_void) -> Option<$desc> {
            let object = unsafe { <$interface>::from_raw_borrowed(&raw) }?;
            let mut desc = <$native>::default();
            passthrough::call(|| unsafe { object.GetDesc(&mut desc) });
            Some($mirror(&desc))
        }
    )*};
}

describe! {
    describe_buffer: ID3D11Buffer, D3D11_BUFFER_DESC, mirror_buffer_desc -> conv::BufferDesc;
    describe_texture_1d: ID3D11Texture1D, D3D11_TEXTURE1D_DESC, mirror_texture_1d_desc -> conv::Texture1dDesc;
    describe_texture_2d: ID3D11Texture2D, D3D11_TEXTURE2D_DESC, mirror_texture_2d_desc -> conv::Texture2dDesc;
    describe_texture_3d: ID3D11Texture3D, D3D11_TEXTURE3D_DESC, mirror_texture_3d_desc -> conv::Texture3dDesc;
}

/// Creation event around a buffer or texture creation.
///
/// `forward` runs the native call, with the application's description for `None`.
fn create_resource<T: Copy>(
    this: *mut c_void,
    out: *mut *mut c_void,
    native: Option<T>,
    to_desc: fn(&T) -> ResourceDesc,
    apply: fn(&ResourceDesc, &mut T) -> bool,
    describe: fn(*mut c_void) -> Option<T>,
    forward: impl Fn(Option<&T>) -> HRESULT,
) -> HRESULT {
    let Some(native) = native else {
        return forward(None);
    };
    if passthrough::active() || out.is_null() {
        return forward(None);
    }
    let Some(entry) = get_device(this) else {
        return forward(None);
    };
    let device = &*entry.device;
    let registry = crate::registry();

    let (plan, desc) = plan_resource(registry, device, &native, to_desc, apply);
    let hr = match &plan {
        Plan::Forward => forward(None),
        Plan::Create(edited) => forward(Some(edited)),
        Plan::Substitute(resource) => return hand_out(device.hand_out_resource(*resource), out),
        Plan::Failed => return E_INVALIDARG,
    };
    if hr.is_ok() {
        let raw = unsafe { *out };
        let desc = describe(raw).map_or(desc, |created| to_desc(&created));
        device.track_resource(registry, raw, desc, ResourceUsage::GENERAL);
    }
    hr
}

#[tracing::instrument]
extern "system" fn create_buffer(
    this: *mut c_void,
    desc: *const D3D11_BUFFER_DESC,
    data: *const D3D11_SUBRESOURCE_DATA,
    buffer: *mut *mut c_void,
) -> HRESULT {
    trace!("ID3D11Device::CreateBuffer called");

    let original = original!(device.create_buffer, E_FAIL);
    let native = unsafe { desc.as_ref() }.map(mirror_buffer_desc);
    create_resource(
        this,
        buffer,
        native,
        conv::buffer_to_desc,
        conv::apply_buffer_desc,
        describe_buffer,
        |edited| unsafe {
            match edited {
                Some(edited) => original(this, &native_buffer_desc(edited), data, buffer),
                None => original(this, desc, data, buffer),
            }
        },
    )
}

#[tracing::instrument]
extern "system" fn create_texture_1d(
    this: *mut c_void,
    desc: *const D3D11_TEXTURE1D_DESC,
    data: *const D3D11_SUBRESOURCE_DATA,
    texture: *mut *mut c_void,
) -> HRESULT {
    trace!("ID3D11Device::CreateTexture1D called");

    let original = original!(device.create_texture_1d, E_FAIL);
    let native = unsafe { desc.as_ref() }.map(mirror_texture_1d_desc);
    create_resource(
        this,
        texture,
        native,
        conv::texture_1d_to_desc,
        conv::apply_texture_1d_desc,
        describe_texture_1d,
        |edited| unsafe {
            match edited {
                Some(edited) => original(this, &native_texture_1d_desc(edited), data, texture),
                None => original(this, desc, data, texture),
            }
        },
    )
}

#[tracing::instrument]
extern "system" fn create_texture_2d(
    this: *mut c_void,
    desc: *const D3D11_TEXTURE2D_DESC,
    data: *const D3D11_SUBRESOURCE_DATA,
    texture: *mut *mut c_void,
) -> HRESULT {
    trace!("ID3D11Device::CreateTexture2D called");

    let original = original!(device.create_texture_2d, E_FAIL);
    let native = unsafe { desc.as_ref() }.map(mirror_texture_2d_desc);
    create_resource(
        this,
        texture,
        native,
        conv::texture_2d_to_desc,
        conv::apply_texture_2d_desc,
        describe_texture_2d,
        |edited| unsafe {
            match edited {
                Some(edited) => original(this, &native_texture_2d_desc(edited), data, texture),
                None => original(this, desc, data, texture),
            }
        },
    )
}

#[tracing::instrument]
extern "system" fn create_texture_3d(
    this: *mut c_void,
    desc: *const D3D11_TEXTURE3D_DESC,
    data: *const D3D11_SUBRESOURCE_DATA,
    texture: *mut *mut c_void,
) -> HRESULT {
    trace!("ID3D11Device::CreateTexture3D called");

    let original = original!(device.create_texture_3d, E_FAIL);
    let native = unsafe { desc.as_ref() }.map(mirror_texture_3d_desc);
    create_resource(
        this,
        texture,
        native,
        conv::texture_3d_to_desc,
        conv::apply_texture_3d_desc,
        describe_texture_3d,
        |edited| unsafe {
            match edited {
                Some(edited) => original(this, &native_texture_3d_desc(edited), data, texture),
                None => original(this, desc, data, texture),
            }
        },
    )
}

/// Creation event around a view creation. `native` is `None` for a view of the whole resource.
fn create_view(
    this: *mut c_void,
    resource: *mut c_void,
    kind: ViewKind,
    native: Option<ViewDesc>,
    out: *mut *mut c_void,
    forward: impl Fn(Option<&ViewDesc>) -> HRESULT,
) -> HRESULT {
    if passthrough::active() || resource.is_null() || out.is_null() {
        return forward(None);
    }
    let Some(entry) = get_device(this) else {
        return forward(None);
    };
    let device = &*entry.device;
    let registry = crate::registry();

    let Some(resource_desc) = view_resource_desc(device, resource) else {
        trace!("view of untracked resource {resource:?}");
        return forward(None);
    };
    let handle = Resource::from_raw(resource as u64);

    let (plan, desc) = plan_view(registry, device, handle, &resource_desc, kind, native.as_ref());
    let hr = match &plan {
        Plan::Forward => forward(None),
        Plan::Create(edited) => forward(Some(edited)),
        Plan::Substitute(view) => return hand_out(device.hand_out_view(*view), out),
        Plan::Failed => return E_INVALIDARG,
    };
    if hr.is_ok() {
        device.track_view(registry, unsafe { *out }, handle, kind, desc);
    }
    hr
}

#[tracing::instrument]
extern "system" fn create_shader_resource_view(
    this: *mut c_void,
    resource: *mut c_void,
    desc: *const D3D11_SHADER_RESOURCE_VIEW_DESC,
    view: *mut *mut c_void,
) -> HRESULT {
    trace!("ID3D11Device::CreateShaderResourceView called");

    let original = original!(device.create_srv, E_FAIL);
    let native = unsafe { desc.as_ref() }.map(mirror_srv_desc);
    create_view(this, resource, ViewKind::ShaderResource, native, view, |edited| unsafe {
        match edited {
            Some(edited) => original(this, resource, &native_srv_desc(edited), view),
            None => original(this, resource, desc, view),
        }
    })
}

#[tracing::instrument]
extern "system" fn create_unordered_access_view(
    this: *mut c_void,
    resource: *mut c_void,
    desc: *const D3D11_UNORDERED_ACCESS_VIEW_DESC,
    view: *mut *mut c_void,
) -> HRESULT {
    trace!("ID3D11Device::CreateUnorderedAccessView called");

    let original = original!(device.create_uav, E_FAIL);
    let native = unsafe { desc.as_ref() }.map(mirror_uav_desc);
    create_view(this, resource, ViewKind::UnorderedAccess, native, view, |edited| unsafe {
        match edited {
            Some(edited) => original(this, resource, &native_uav_desc(edited), view),
            None => original(this, resource, desc, view),
        }
    })
}

#[tracing::instrument]
extern "system" fn create_render_target_view(
    this: *mut c_void,
    resource: *mut c_void,
    desc: *const D3D11_RENDER_TARGET_VIEW_DESC,
    view: *mut *mut c_void,
) -> HRESULT {
    trace!("ID3D11Device::CreateRenderTargetView called");

    let original = original!(device.create_rtv, E_FAIL);
    let native = unsafe { desc.as_ref() }.map(mirror_rtv_desc);
    create_view(this, resource, ViewKind::RenderTarget, native, view, |edited| unsafe {
        match edited {
            Some(edited) => original(this, resource, &native_rtv_desc(edited), view),
            None => original(this, resource, desc, view),
        }
    })
}

#[tracing::instrument]
extern "system" fn create_depth_stencil_view(
    this: *mut c_void,
    resource: *mut c_void,
    desc: *const D3D11_DEPTH_STENCIL_VIEW_DESC,
    view: *mut *mut c_void,
) -> HRESULT {
    trace!("ID3D11Device::CreateDepthStencilView called");

    let original = original!(device.create_dsv, E_FAIL);
    let native = unsafe { desc.as_ref() }.map(mirror_dsv_desc);
    create_view(this, resource, ViewKind::DepthStencil, native, view, |edited| unsafe {
        match edited {
            Some(edited) => original(this, resource, &native_dsv_desc(edited), view),
            None => original(this, resource, desc, view),
        }
    })
}

#[tracing::instrument]
extern "system" fn create_sampler_state(
    this: *mut c_void,
    desc: *const D3D11_SAMPLER_DESC,
    sampler: *mut *mut c_void,
) -> HRESULT {
    trace!("ID3D11Device::CreateSamplerState called");

    let original = original!(device.create_sampler_state, E_FAIL);
    let Some(native) = (unsafe { desc.as_ref() }) else {
        return unsafe { original(this, desc, sampler) };
    };
    if passthrough::active() || sampler.is_null() {
        return unsafe { original(this, desc, sampler) };
    }
    let Some(entry) = get_device(this) else {
        return unsafe { original(this, desc, sampler) };
    };
    let device = &*entry.device;
    let registry = crate::registry();

    let original_desc = conv::sampler_to_desc(&mirror_sampler_desc(native));
    let (hr, desc) = match dispatch::create_sampler(registry, device, &original_desc) {
        Creation::Unchanged => (unsafe { original(this, desc, sampler) }, original_desc),
        Creation::Modified(edited) => {
            let edited_native = native_sampler_desc(&conv::sampler_from_desc(&edited));
            (unsafe { original(this, &edited_native, sampler) }, edited)
        }
        Creation::Substitute(substitute) => return hand_out(device.hand_out_sampler(substitute), sampler),
        Creation::Failed => return E_INVALIDARG,
    };

    if hr.is_ok() {
        device.track_sampler(registry, unsafe { *sampler }, desc);
    }
    hr
}

/// Creation event around a shader, input layout or state object creation.
///
/// `forward` runs the native call, with the application's arguments for `None`.
fn create_pipeline_object<'a>(
    this: *mut c_void,
    out: *mut *mut c_void,
    desc: PipelineDesc<'a>,
    forward: impl Fn(Option<&PipelineDesc<'_>>) -> HRESULT,
) -> HRESULT {
    if passthrough::active() || out.is_null() {
        return forward(None);
    }
    let Some(entry) = get_device(this) else {
        return forward(None);
    };
    let device = &*entry.device;
    let registry = crate::registry();

    let (hr, desc) = match dispatch::create_pipeline(registry, device, PipelineLayout::NULL, &desc) {
        Creation::Unchanged => (forward(None), desc),
        Creation::Modified(edited) if edited.ty() == desc.ty() => (forward(Some(&edited)), edited),
        Creation::Modified(_) => {
            warn!("{:?} edit changes the object type, ignoring it", desc.ty());
            (forward(None), desc)
        }
        Creation::Substitute(pipeline) => return hand_out(device.hand_out_pipeline(pipeline), out),
        Creation::Failed => return E_INVALIDARG,
    };

    if hr.is_ok() {
        device.track_pipeline(registry, unsafe { *out }, &desc);
    }
    hr
}

/// Shader creation through `original`, `wrap` names the stage.
fn create_shader<'a>(
    this: *mut c_void,
    code: *const c_void,
    len: usize,
    linkage: *mut c_void,
    out: *mut *mut c_void,
    original: CreateShaderFn,
    wrap: fn(ShaderDesc<'a>) -> PipelineDesc<'a>,
) -> HRESULT {
    if code.is_null() {
        return unsafe { original(this, code, len, linkage, out) };
    }

    let bytes = unsafe { slice::from_raw_parts(code.cast::<u8>(), len) };
    create_pipeline_object(this, out, wrap(ShaderDesc::new(bytes)), |edited| {
        let code = match edited {
            Some(
                PipelineDesc::VertexShader(shader)
                | PipelineDesc::HullShader(shader)
                | PipelineDesc::DomainShader(shader)
                | PipelineDesc::GeometryShader(shader)
                | PipelineDesc::PixelShader(shader)
                | PipelineDesc::Compute(shader),
            ) => shader.code,
            _ => bytes,
        };
        unsafe { original(this, code.as_ptr().cast(), code.len(), linkage, out) }
    })
}

macro_rules! shader_detours {
    ($($detour:ident: $hook:ident, $variant:ident, $method:literal;)*) => {$(
        #[tracing::instrument]
        extern "system" fn $detour(
            this: *mut c_void,
            code: *const c_void,
            len: usize,
            linkage: *mut c_void,
            shader: *mut *mut c_void,
        ) -> HRESULT {
            trace!(concat!("ID3D11Device::", $method, " called"));

            let original = original!(device.$hook, E_FAIL);
            create_shader(this, code, len, linkage, shader, original, PipelineDesc::$variant)
        }
    )*};
}

shader_detours! {
    create_vertex_shader: create_vertex_shader, VertexShader, "CreateVertexShader";
    create_hull_shader: create_hull_shader, HullShader, "CreateHullShader";
    create_domain_shader: create_domain_shader, DomainShader, "CreateDomainShader";
    create_geometry_shader: create_geometry_shader, GeometryShader, "CreateGeometryShader";
    create_pixel_shader: create_pixel_shader, PixelShader, "CreatePixelShader";
    create_compute_shader: create_compute_shader, Compute, "CreateComputeShader";
}

#[tracing::instrument]
extern "system" fn create_input_layout(
    this: *mut c_void,
    elements: *const D3D11_INPUT_ELEMENT_DESC,
    count: u32,
    code: *const c_void,
    len: usize,
    layout: *mut *mut c_void,
) -> HRESULT {
    trace!("ID3D11Device::CreateInputLayout called");

    let original = original!(device.create_input_layout, E_FAIL);
    if elements.is_null() || passthrough::active() {
        return unsafe { original(this, elements, count, code, len, layout) };
    }

    let native = unsafe { slice::from_raw_parts(elements, count as usize) };
    let names = unsafe { semantic_names(native) };
    let mirrored = mirror_input_elements(native, &names);
    let desc = PipelineDesc::InputLayout(conv::input_elements_to_desc(&mirrored));

    create_pipeline_object(this, layout, desc, |edited| match edited {
        Some(PipelineDesc::InputLayout(input)) => {
            let edited = conv::input_elements_from_desc(input);
            let (_names, edited) = native_input_elements(&edited);
            unsafe { original(this, edited.as_ptr(), edited.len() as u32, code, len, layout) }
        }
        _ => unsafe { original(this, elements, count, code, len, layout) },
    })
}

#[tracing::instrument]
extern "system" fn create_blend_state(
    this: *mut c_void,
    desc: *const D3D11_BLEND_DESC,
    state: *mut *mut c_void,
) -> HRESULT {
    trace!("ID3D11Device::CreateBlendState called");

    let original = original!(device.create_blend_state, E_FAIL);
    let Some(native) = (unsafe { desc.as_ref() }) else {
        return unsafe { original(this, desc, state) };
    };

    let unified = PipelineDesc::BlendState(conv::blend_to_desc(&mirror_blend_desc(native)));
    create_pipeline_object(this, state, unified, |edited| match edited {
        Some(PipelineDesc::BlendState(edited)) => unsafe {
            original(this, &native_blend_desc(&conv::blend_from_desc(edited)), state)
        },
        _ => unsafe { original(this, desc, state) },
    })
}

#[tracing::instrument]
extern "system" fn create_rasterizer_state(
    this: *mut c_void,
    desc: *const D3D11_RASTERIZER_DESC,
    state: *mut *mut c_void,
) -> HRESULT {
    trace!("ID3D11Device::CreateRasterizerState called");

    let original = original!(device.create_rasterizer_state, E_FAIL);
    let Some(native) = (unsafe { desc.as_ref() }) else {
        return unsafe { original(this, desc, state) };
    };

    let unified = PipelineDesc::RasterizerState(conv::rasterizer_to_desc(&mirror_rasterizer_desc(native)));
    create_pipeline_object(this, state, unified, |edited| match edited {
        Some(PipelineDesc::RasterizerState(edited)) => unsafe {
            original(this, &native_rasterizer_desc(&conv::rasterizer_from_desc(edited)), state)
        },
        _ => unsafe { original(this, desc, state) },
    })
}

#[tracing::instrument]
extern "system" fn create_depth_stencil_state(
    this: *mut c_void,
    desc: *const D3D11_DEPTH_STENCIL_DESC,
    state: *mut *mut c_void,
) -> HRESULT {
    trace!("ID3D11Device::CreateDepthStencilState called");

    let original = original!(device.create_depth_stencil_state, E_FAIL);
    let Some(native) = (unsafe { desc.as_ref() }) else {
        return unsafe { original(this, desc, state) };
    };

    let unified =
        PipelineDesc::DepthStencilState(conv::depth_stencil_to_desc(&mirror_depth_stencil_desc(native)));
    create_pipeline_object(this, state, unified, |edited| match edited {
        Some(PipelineDesc::DepthStencilState(edited)) => unsafe {
            original(
                this,
                &native_depth_stencil_desc(&conv::depth_stencil_from_desc(edited)),
                state,
            )
        },
        _ => unsafe { original(this, desc, state) },
    })
}

fn report_pipeline(this: *mut c_void, stages: PipelineStage, object: *mut c_void) {
    report(this, EventKind::BindPipeline, |registry, cmd_list| {
        registry.dispatch(&mut Event::BindPipeline {
            cmd_list,
            stages,
            pipeline: Pipeline::from_raw(object as u64),
        });
    });
}

fn report_states(this: *mut c_void, states: &[PipelineState], values: &[u32]) {
    report(this, EventKind::BindPipelineStates, |registry, cmd_list| {
        registry.dispatch(&mut Event::BindPipelineStates {
            cmd_list,
            states,
            values,
        });
    });
}

macro_rules! set_shader_detours {
    ($($detour:ident: $stage:ident, $method:literal;)*) => {$(
        #[tracing::instrument]
        extern "system" fn $detour(
            this: *mut c_void,
            shader: *mut c_void,
            class_instances: *const *mut c_void,
            class_instance_count: u32,
        ) {
            trace!(concat!("ID3D11DeviceContext::", $method, " called"));

            let original = original!(context.$detour);
            unsafe { original(this, shader, class_instances, class_instance_count) };
            report_pipeline(this, PipelineStage::$stage, shader);
        }
    )*};
}

set_shader_detours! {
    vs_set_shader: VERTEX_SHADER, "VSSetShader";
    ps_set_shader: PIXEL_SHADER, "PSSetShader";
    cs_set_shader: COMPUTE_SHADER, "CSSetShader";
}

#[tracing::instrument]
extern "system" fn ia_set_input_layout(this: *mut c_void, layout: *mut c_void) {
    trace!("ID3D11DeviceContext::IASetInputLayout called");

    let original = original!(context.ia_set_input_layout);
    unsafe { original(this, layout) };
    report_pipeline(this, PipelineStage::INPUT_ASSEMBLER, layout);
}

#[tracing::instrument]
extern "system" fn rs_set_state(this: *mut c_void, state: *mut c_void) {
    trace!("ID3D11DeviceContext::RSSetState called");

    let original = original!(context.rs_set_state);
    unsafe { original(this, state) };
    report_pipeline(this, PipelineStage::RASTERIZER, state);
}

#[tracing::instrument]
extern "system" fn om_set_blend_state(
    this: *mut c_void,
    state: *mut c_void,
    factor: *const [f32; 4],
    sample_mask: u32,
) {
    trace!("ID3D11DeviceContext::OMSetBlendState called");

    let original = original!(context.om_set_blend_state);
    unsafe { original(this, state, factor, sample_mask) };

    let factor = unsafe { factor.as_ref() }.copied();
    with_context(this, |_, entry| {
        entry.cmd_list.record_blend_state(state as u64, factor, sample_mask);
    });
    report_pipeline(this, PipelineStage::OUTPUT_MERGER, state);
    report_states(
        this,
        &[PipelineState::BlendConstant, PipelineState::SampleMask],
        &[pack_color(&factor.unwrap_or([1.0; 4])), sample_mask],
    );
}

#[tracing::instrument]
extern "system" fn om_set_depth_stencil_state(this: *mut c_void, state: *mut c_void, stencil_reference: u32) {
    trace!("ID3D11DeviceContext::OMSetDepthStencilState called");

    let original = original!(context.om_set_depth_stencil_state);
    unsafe { original(this, state, stencil_reference) };

    with_context(this, |_, entry| {
        entry.cmd_list.record_depth_stencil_state(state as u64, stencil_reference);
    });
    report_pipeline(this, PipelineStage::DEPTH_STENCIL, state);
    report_states(this, &[PipelineState::StencilReferenceValue], &[stencil_reference]);
}

#[tracing::instrument]
extern "system" fn ia_set_primitive_topology(this: *mut c_void, topology: D3D_PRIMITIVE_TOPOLOGY) {
    trace!("ID3D11DeviceContext::IASetPrimitiveTopology called");

    let original = original!(context.ia_set_primitive_topology);
    unsafe { original(this, topology) };
    report_states(
        this,
        &[PipelineState::PrimitiveTopology],
        &[conv::topology_from_d3d(topology.0 as u32).to_raw()],
    );
}

#[tracing::instrument]
extern "system" fn ia_set_vertex_buffers(
    this: *mut c_void,
    first: u32,
    count: u32,
    buffers: *const *mut c_void,
    strides: *const u32,
    offsets: *const u32,
) {
    trace!("ID3D11DeviceContext::IASetVertexBuffers called");

    let original = original!(context.ia_set_vertex_buffers);
    unsafe { original(this, first, count, buffers, strides, offsets) };

    report(this, EventKind::BindVertexBuffers, |registry, cmd_list| {
        let count = count as usize;
        let read = |values: *const u32| -> Vec<u32> {
            if values.is_null() {
                vec![0; count]
            } else {
                unsafe { slice::from_raw_parts(values, count) }.to_vec()
            }
        };
        let resources: Vec<Resource> = if buffers.is_null() {
            vec![Resource::NULL; count]
        } else {
            unsafe { slice::from_raw_parts(buffers, count) }
                .iter()
                .map(|buffer| Resource::from_raw(*buffer as u64))
                .collect()
        };
        let offsets: Vec<u64> = read(offsets).into_iter().map(u64::from).collect();

        registry.dispatch(&mut Event::BindVertexBuffers {
            cmd_list,
            first,
            buffers: &resources,
            offsets: &offsets,
            strides: &read(strides),
        });
    });
}

#[tracing::instrument]
extern "system" fn ia_set_index_buffer(this: *mut c_void, buffer: *mut c_void, format: DXGI_FORMAT, offset: u32) {
    trace!("ID3D11DeviceContext::IASetIndexBuffer called");

    let original = original!(context.ia_set_index_buffer);
    unsafe { original(this, buffer, format, offset) };

    report(this, EventKind::BindIndexBuffer, |registry, cmd_list| {
        registry.dispatch(&mut Event::BindIndexBuffer {
            cmd_list,
            buffer: Resource::from_raw(buffer as u64),
            offset: u64::from(offset),
            index_size: if buffer.is_null() { 0 } else { index_size(format.0 as u32) },
        });
    });
}

#[tracing::instrument]
extern "system" fn om_set_render_targets(
    this: *mut c_void,
    count: u32,
    rtvs: *const *mut c_void,
    dsv: *mut c_void,
) {
    trace!("ID3D11DeviceContext::OMSetRenderTargets called");

    let original = original!(context.om_set_render_targets);
    unsafe { original(this, count, rtvs, dsv) };

    report(this, EventKind::BeginRenderPass, |registry, cmd_list| {
        let render_targets: Vec<RenderPassRenderTarget> = if rtvs.is_null() {
            Vec::new()
        } else {
            unsafe { slice::from_raw_parts(rtvs, count as usize) }
                .iter()
                .map(|rtv| RenderPassRenderTarget {
                    view: ResourceView::from_raw(*rtv as u64),
                    load_op: LoadOp::Load,
                    store_op: StoreOp::Store,
                    clear_color: [0.0; 4],
                })
                .collect()
        };
        let depth_stencil = (!dsv.is_null()).then(|| RenderPassDepthStencil {
            view: ResourceView::from_raw(dsv as u64),
            ..Default::default()
        });

        registry.dispatch(&mut Event::BeginRenderPass {
            cmd_list,
            render_targets: &render_targets,
            depth_stencil,
        });
    });
}

#[tracing::instrument]
extern "system" fn rs_set_viewports(this: *mut c_void, count: u32, viewports: *const D3D11_VIEWPORT) {
    trace!("ID3D11DeviceContext::RSSetViewports called");

    let original = original!(context.rs_set_viewports);
    unsafe { original(this, count, viewports) };
    if viewports.is_null() {
        return;
    }

    report(this, EventKind::BindViewports, |registry, cmd_list| {
        let viewports: Vec<Viewport> = unsafe { slice::from_raw_parts(viewports, count as usize) }
            .iter()
            .map(to_viewport)
            .collect();
        registry.dispatch(&mut Event::BindViewports {
            cmd_list,
            first: 0,
            viewports: &viewports,
        });
    });
}

#[tracing::instrument]
extern "system" fn rs_set_scissor_rects(this: *mut c_void, count: u32, rects: *const RECT) {
    trace!("ID3D11DeviceContext::RSSetScissorRects called");

    let original = original!(context.rs_set_scissor_rects);
    unsafe { original(this, count, rects) };
    if rects.is_null() {
        return;
    }

    report(this, EventKind::BindScissorRects, |registry, cmd_list| {
        let rects: Vec<Rect> = unsafe { slice::from_raw_parts(rects, count as usize) }
            .iter()
            .map(to_rect)
            .collect();
        registry.dispatch(&mut Event::BindScissorRects {
            cmd_list,
            first: 0,
            rects: &rects,
        });
    });
}

#[tracing::instrument]
extern "system" fn draw(this: *mut c_void, vertex_count: u32, first_vertex: u32) {
    trace!("ID3D11DeviceContext::Draw called");

    let original = original!(context.draw);
    let skip = vetoed(this, EventKind::Draw, |registry, entry| {
        registry.dispatch(&mut Event::Draw {
            cmd_list: &*entry.cmd_list,
            vertex_count,
            instance_count: 1,
            first_vertex,
            first_instance: 0,
        })
    });
    if !skip {
        unsafe { original(this, vertex_count, first_vertex) };
    }
}

#[tracing::instrument]
extern "system" fn draw_indexed(this: *mut c_void, index_count: u32, first_index: u32, vertex_offset: i32) {
    trace!("ID3D11DeviceContext::DrawIndexed called");

    let original = original!(context.draw_indexed);
    let skip = vetoed(this, EventKind::DrawIndexed, |registry, entry| {
        registry.dispatch(&mut Event::DrawIndexed {
            cmd_list: &*entry.cmd_list,
            index_count,
            instance_count: 1,
            first_index,
            vertex_offset,
            first_instance: 0,
        })
    });
    if !skip {
        unsafe { original(this, index_count, first_index, vertex_offset) };
    }
}

#[tracing::instrument]
extern "system" fn draw_instanced(
    this: *mut c_void,
    vertex_count: u32,
    instance_count: u32,
    first_vertex: u32,
    first_instance: u32,
) {
    trace!("ID3D11DeviceContext::DrawInstanced called");

    let original = original!(context.draw_instanced);
    let skip = vetoed(this, EventKind::Draw, |registry, entry| {
        registry.dispatch(&mut Event::Draw {
            cmd_list: &*entry.cmd_list,
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        })
    });
    if !skip {
        unsafe { original(this, vertex_count, instance_count, first_vertex, first_instance) };
    }
}

#[tracing::instrument]
extern "system" fn draw_indexed_instanced(
    this: *mut c_void,
    index_count: u32,
    instance_count: u32,
    first_index: u32,
    vertex_offset: i32,
    first_instance: u32,
) {
    trace!("ID3D11DeviceContext::DrawIndexedInstanced called");

    let original = original!(context.draw_indexed_instanced);
    let skip = vetoed(this, EventKind::DrawIndexed, |registry, entry| {
        registry.dispatch(&mut Event::DrawIndexed {
            cmd_list: &*entry.cmd_list,
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        })
    });
    if !skip {
        unsafe {
            original(
                this,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        };
    }
}

#[tracing::instrument]
extern "system" fn dispatch(this: *mut c_void, x: u32, y: u32, z: u32) {
    trace!("ID3D11DeviceContext::Dispatch called");

    let original = original!(context.dispatch);
    let skip = vetoed(this, EventKind::Dispatch, |registry, entry| {
        registry.dispatch(&mut Event::Dispatch {
            cmd_list: &*entry.cmd_list,
            x,
            y,
            z,
        })
    });
    if !skip {
        unsafe { original(this, x, y, z) };
    }
}

/// Fires the event of one indirect command read from `buffer`.
fn indirect_vetoed(this: *mut c_void, ty: IndirectCommand, buffer: *mut c_void, offset: u32) -> bool {
    vetoed(this, EventKind::DrawOrDispatchIndirect, |registry, entry| {
        registry.dispatch(&mut Event::DrawOrDispatchIndirect {
            cmd_list: &*entry.cmd_list,
            ty,
            buffer: Resource::from_raw(buffer as u64),
            offset: u64::from(offset),
            draw_count: 1,
            stride: 0,
        })
    })
}

#[tracing::instrument]
extern "system" fn draw_instanced_indirect(this: *mut c_void, buffer: *mut c_void, offset: u32) {
    trace!("ID3D11DeviceContext::DrawInstancedIndirect called");

    let original = original!(context.draw_instanced_indirect);
    if !indirect_vetoed(this, IndirectCommand::Draw, buffer, offset) {
        unsafe { original(this, buffer, offset) };
    }
}

#[tracing::instrument]
extern "system" fn draw_indexed_instanced_indirect(this: *mut c_void, buffer: *mut c_void, offset: u32) {
    trace!("ID3D11DeviceContext::DrawIndexedInstancedIndirect called");

    let original = original!(context.draw_indexed_instanced_indirect);
    if !indirect_vetoed(this, IndirectCommand::DrawIndexed, buffer, offset) {
        unsafe { original(this, buffer, offset) };
    }
}

#[tracing::instrument]
extern "system" fn dispatch_indirect(this: *mut c_void, buffer: *mut c_void, offset: u32) {
    trace!("ID3D11DeviceContext::DispatchIndirect called");

    let original = original!(context.dispatch_indirect);
    if !indirect_vetoed(this, IndirectCommand::Dispatch, buffer, offset) {
        unsafe { original(this, buffer, offset) };
    }
}

#[tracing::instrument]
extern "system" fn copy_resource(this: *mut c_void, dst: *mut c_void, src: *mut c_void) {
    trace!("ID3D11DeviceContext::CopyResource called");

    let original = original!(context.copy_resource);
    let skip = vetoed(this, EventKind::CopyResource, |registry, entry| {
        registry.dispatch(&mut Event::CopyResource {
            cmd_list: &*entry.cmd_list,
            src: Resource::from_raw(src as u64),
            dst: Resource::from_raw(dst as u64),
        })
    });
    if !skip {
        unsafe { original(this, dst, src) };
    }
}

#[tracing::instrument]
extern "system" fn copy_subresource_region(
    this: *mut c_void,
    dst: *mut c_void,
    dst_subresource: u32,
    dst_x: u32,
    dst_y: u32,
    dst_z: u32,
    src: *mut c_void,
    src_subresource: u32,
    src_box: *const D3D11_BOX,
) {
    trace!("ID3D11DeviceContext::CopySubresourceRegion called");

    let original = original!(context.copy_subresource_region);
    let flow = with_context(this, |registry, entry| {
        let cmd_list = &*entry.cmd_list;
        let (src_resource, dst_resource) = (Resource::from_raw(src as u64), Resource::from_raw(dst as u64));
        let src_region = unsafe { src_box.as_ref() }.map(to_box);
        let src_desc = entry.device.get_resource_desc(src_resource);

        match src_desc {
            Some(ResourceDesc {
                dimension: ResourceDimension::Buffer { size, .. },
                ..
            }) => {
                if !registry.has_listeners(EventKind::CopyBufferRegion) {
                    return Flow::Continue;
                }
                let (src_offset, size) = match src_region {
                    Some(region) => (region.left as u64, u64::from(region.width())),
                    None => (0, size),
                };
                registry.dispatch(&mut Event::CopyBufferRegion {
                    cmd_list,
                    src: src_resource,
                    src_offset,
                    dst: dst_resource,
                    dst_offset: u64::from(dst_x),
                    size,
                })
            }
            _ => {
                if !registry.has_listeners(EventKind::CopyTextureRegion) {
                    return Flow::Continue;
                }
                let extent = match (&src_region, &src_desc) {
                    (Some(region), _) => Some([region.width(), region.height(), region.depth()]),
                    (None, Some(desc)) => Some(subresource_extent(desc, src_subresource)),
                    (None, None) => None,
                };
                let dst_box = extent
                    .filter(|_| src_region.is_some() || dst_x != 0 || dst_y != 0 || dst_z != 0)
                    .map(|[width, height, depth]| SubresourceBox {
                        left: dst_x as i32,
                        top: dst_y as i32,
                        front: dst_z as i32,
                        right: (dst_x + width) as i32,
                        bottom: (dst_y + height) as i32,
                        back: (dst_z + depth) as i32,
                    });

                registry.dispatch(&mut Event::CopyTextureRegion {
                    cmd_list,
                    src: src_resource,
                    src_subresource,
                    src_box: src_region,
                    dst: dst_resource,
                    dst_subresource,
                    dst_box,
                    filter: FilterMode::MinMagMipPoint,
                })
            }
        }
    });
    if flow == Some(Flow::Handled) {
        return;
    }

    unsafe {
        original(
            this,
            dst,
            dst_subresource,
            dst_x,
            dst_y,
            dst_z,
            src,
            src_subresource,
            src_box,
        )
    };
}

#[tracing::instrument]
extern "system" fn resolve_subresource(
    this: *mut c_void,
    dst: *mut c_void,
    dst_subresource: u32,
    src: *mut c_void,
    src_subresource: u32,
    format: DXGI_FORMAT,
) {
    trace!("ID3D11DeviceContext::ResolveSubresource called");

    let original = original!(context.resolve_subresource);
    let skip = vetoed(this, EventKind::ResolveTextureRegion, |registry, entry| {
        registry.dispatch(&mut Event::ResolveTextureRegion {
            cmd_list: &*entry.cmd_list,
            src: Resource::from_raw(src as u64),
            src_subresource,
            src_box: None,
            dst: Resource::from_raw(dst as u64),
            dst_subresource,
            dst_offset: [0; 3],
            format: conv::format_from_dxgi(format.0 as u32),
        })
    });
    if !skip {
        unsafe { original(this, dst, dst_subresource, src, src_subresource, format) };
    }
}

#[tracing::instrument]
extern "system" fn clear_render_target_view(this: *mut c_void, rtv: *mut c_void, color: *const [f32; 4]) {
    trace!("ID3D11DeviceContext::ClearRenderTargetView called");

    let original = original!(context.clear_render_target_view);
    let skip = vetoed(this, EventKind::ClearRenderTargetView, |registry, entry| {
        registry.dispatch(&mut Event::ClearRenderTargetView {
            cmd_list: &*entry.cmd_list,
            rtv: ResourceView::from_raw(rtv as u64),
            color: unsafe { color.as_ref() }.copied().unwrap_or_default(),
            rects: &[],
        })
    });
    if !skip {
        unsafe { original(this, rtv, color) };
    }
}

#[tracing::instrument]
extern "system" fn clear_depth_stencil_view(this: *mut c_void, dsv: *mut c_void, flags: u32, depth: f32, stencil: u8) {
    trace!("ID3D11DeviceContext::ClearDepthStencilView called");

    let original = original!(context.clear_depth_stencil_view);
    let skip = vetoed(this, EventKind::ClearDepthStencilView, |registry, entry| {
        registry.dispatch(&mut Event::ClearDepthStencilView {
            cmd_list: &*entry.cmd_list,
            dsv: ResourceView::from_raw(dsv as u64),
            depth: (flags & D3D11_CLEAR_DEPTH.0 as u32 != 0).then_some(depth),
            stencil: (flags & D3D11_CLEAR_STENCIL.0 as u32 != 0).then_some(stencil),
            rects: &[],
        })
    });
    if !skip {
        unsafe { original(this, dsv, flags, depth, stencil) };
    }
}

#[tracing::instrument]
extern "system" fn clear_unordered_access_view_uint(this: *mut c_void, uav: *mut c_void, values: *const [u32; 4]) {
    trace!("ID3D11DeviceContext::ClearUnorderedAccessViewUint called");

    let original = original!(context.clear_uav_uint);
    let skip = vetoed(this, EventKind::ClearUnorderedAccessViewUint, |registry, entry| {
        registry.dispatch(&mut Event::ClearUnorderedAccessViewUint {
            cmd_list: &*entry.cmd_list,
            uav: ResourceView::from_raw(uav as u64),
            values: unsafe { values.as_ref() }.copied().unwrap_or_default(),
            rects: &[],
        })
    });
    if !skip {
        unsafe { original(this, uav, values) };
    }
}

#[tracing::instrument]
extern "system" fn clear_unordered_access_view_float(this: *mut c_void, uav: *mut c_void, values: *const [f32; 4]) {
    trace!("ID3D11DeviceContext::ClearUnorderedAccessViewFloat called");

    let original = original!(context.clear_uav_float);
    let skip = vetoed(this, EventKind::ClearUnorderedAccessViewFloat, |registry, entry| {
        registry.dispatch(&mut Event::ClearUnorderedAccessViewFloat {
            cmd_list: &*entry.cmd_list,
            uav: ResourceView::from_raw(uav as u64),
            values: unsafe { values.as_ref() }.copied().unwrap_or_default(),
            rects: &[],
        })
    });
    if !skip {
        unsafe { original(this, uav, values) };
    }
}

#[tracing::instrument]
extern "system" fn generate_mips(this: *mut c_void, srv: *mut c_void) {
    trace!("ID3D11DeviceContext::GenerateMips called");

    let original = original!(context.generate_mips);
    let skip = vetoed(this, EventKind::GenerateMipmaps, |registry, entry| {
        registry.dispatch(&mut Event::GenerateMipmaps {
            cmd_list: &*entry.cmd_list,
            srv: ResourceView::from_raw(srv as u64),
        })
    });
    if !skip {
        unsafe { original(this, srv) };
    }
}

#[derive(Default)]
struct SwapchainState {
    initialized: bool,
    device: Option<Arc<DeviceEntry>>,
    runtime: Option<Arc<EffectRuntime>>,
    back_buffer: Resource,
    /// Context state the effects render with, leaving the application's untouched.
    context_state: Option<ID3DDeviceContextState>,
}

unsafe impl Send for SwapchainState {}

/// Swapchains presented through a hook, keyed by interface pointer.
static SWAPCHAINS: Lazy<IntDashMap<u64, Arc<Mutex<SwapchainState>>>> = Lazy::new(IntDashMap::default);

fn swapchain_state(swapchain: &IDXGISwapChain) -> Arc<Mutex<SwapchainState>> {
    let raw = swapchain.as_raw() as u64;
    match SWAPCHAINS.entry(raw) {
        Entry::Occupied(entry) => entry.get().clone(),
        Entry::Vacant(entry) => {
            let state = entry.insert(Default::default()).clone();
            watch_swapchain(swapchain);
            state
        }
    }
}

extern "system" fn swapchain_destroyed(data: *mut c_void) {
    let raw = data as u64;
    trace!("swapchain {raw:#x} destroyed");

    let Some((_, state)) = SWAPCHAINS.remove(&raw) else {
        return;
    };
    reset_swapchain(crate::registry(), raw, &mut state.lock());
}

fn watch_swapchain(swapchain: &IDXGISwapChain) {
    let Ok(notifier) = passthrough::call(|| swapchain.cast::<ID3DDestructionNotifier>()) else {
        debug!("swapchain {:?} has no destruction notifier", swapchain.as_raw());
        return;
    };

    let res = passthrough::call(|| unsafe {
        // registered with the swapchain pointer, without a reference
        notifier.RegisterDestructionCallback(Some(swapchain_destroyed), swapchain.as_raw())
    });
    if let Err(err) = res {
        debug!("cannot watch swapchain {:?}. err: {err:?}", swapchain.as_raw());
    }
}

/// Context state for effect rendering, single threaded when the device is.
fn create_context_state(device: &ID3D11Device) -> Option<ID3DDeviceContextState> {
    passthrough::call(|| unsafe {
        let device1 = device.cast::<ID3D11Device1>().ok()?;
        let flags = if device.GetCreationFlags() & D3D11_CREATE_DEVICE_SINGLETHREADED.0 as u32 != 0 {
            D3D11_1_CREATE_DEVICE_CONTEXT_STATE_SINGLETHREADED.0 as u32
        } else {
            0
        };

        let mut state = None;
        if let Err(err) = device1.CreateDeviceContextState(
            flags,
            &[D3D_FEATURE_LEVEL_11_0],
            D3D11_SDK_VERSION,
            &ID3D11Device::IID,
            None,
            Some(&mut state),
        ) {
            debug!("cannot create context state. err: {err:?}");
        }
        state
    })
}

/// Creates the effect runtime on the swapchain's back buffer.
fn init_swapchain(registry: &Registry, entry: &Arc<DeviceEntry>, swapchain: &IDXGISwapChain, state: &mut SwapchainState) {
    state.initialized = true;

    let device = &entry.device;
    let back_buffer = match passthrough::call(|| unsafe { swapchain.GetBuffer::<ID3D11Texture2D>(0) }) {
        Ok(back_buffer) => back_buffer,
        Err(err) => {
            debug!("no back buffer. err: {err:?}");
            return;
        }
    };
    let (resource, _) = device.adopt_texture_2d(&back_buffer);
    state.back_buffer = resource;

    let raw = swapchain.as_raw() as u64;
    registry.dispatch(&mut Event::InitSwapchain {
        device: &**device,
        swapchain: raw,
    });
    state.device = Some(entry.clone());

    state.context_state = create_context_state(&device.device);
    let runtime = EffectRuntime::new(
        raw,
        device.clone() as Arc<dyn Device>,
        entry.cmd_list.clone() as Arc<dyn CommandQueue>,
        crate::effect_compiler(),
        ShaderFormat::Dxbc,
        &crate::config().effects,
    );
    match runtime.on_init(registry, &[resource]) {
        Ok(()) => state.runtime = Some(Arc::new(runtime)),
        Err(err) => error!("effect runtime initialization failed. err: {err:?}"),
    }
}

/// Releases everything tied to the swapchain buffers.
fn reset_swapchain(registry: &Registry, raw: u64, state: &mut SwapchainState) {
    if let Some(runtime) = state.runtime.take() {
        runtime.on_reset(registry);
    }
    if let Some(entry) = state.device.take() {
        registry.dispatch(&mut Event::DestroySwapchain {
            device: &*entry.device,
            swapchain: raw,
        });
        entry.device.resources.remove(state.back_buffer.raw());
    }

    *state = SwapchainState::default();
}

fn present_swapchain(this: *mut c_void) {
    let Some(swapchain) = (unsafe { IDXGISwapChain::from_raw_borrowed(&this) }) else {
        return;
    };
    // swapchains of other APIs
    let Ok(device) = passthrough::call(|| unsafe { swapchain.GetDevice::<ID3D11Device>() }) else {
        return;
    };
    let Some(entry) = get_device(device.as_raw()) else {
        return;
    };
    let registry = crate::registry();

    registry.dispatch(&mut Event::Present {
        queue: &*entry.cmd_list,
        swapchain: this as u64,
        source_rect: None,
        dest_rect: None,
    });

    let (runtime, context_state) = {
        let state = swapchain_state(swapchain);
        let mut state = state.lock();
        if !state.initialized {
            init_swapchain(registry, &entry, swapchain, &mut state);
        }
        let Some(runtime) = state.runtime.clone() else {
            return;
        };
        (runtime, state.context_state.clone())
    };

    let context1 = passthrough::call(|| entry.device.context.cast::<ID3D11DeviceContext1>()).ok();
    let previous = match (&context1, &context_state) {
        (Some(cx), Some(state)) => passthrough::call(|| unsafe {
            let mut previous = None;
            cx.SwapDeviceContextState(state, Some(&mut previous));
            previous
        }),
        _ => None,
    };
    defer!(if let (Some(cx), Some(previous)) = (&context1, &previous) {
        passthrough::call(|| unsafe { cx.SwapDeviceContextState(previous, None) });
    });

    runtime.on_present(registry, 0);
}

#[tracing::instrument]
extern "system" fn present(this: *mut c_void, sync_interval: u32, flags: DXGI_PRESENT) -> HRESULT {
    trace!("IDXGISwapChain::Present called");

    let original = original!(swapchain.present, E_FAIL);
    if !flags.contains(DXGI_PRESENT_TEST) && !passthrough::active() {
        present_swapchain(this);
    }

    unsafe { original(this, sync_interval, flags) }
}

#[tracing::instrument]
extern "system" fn present1(
    this: *mut c_void,
    sync_interval: u32,
    flags: DXGI_PRESENT,
    params: *const DXGI_PRESENT_PARAMETERS,
) -> HRESULT {
    trace!("IDXGISwapChain1::Present1 called");

    let Some(original) = HOOKS
        .get()
        .and_then(|hooks| hooks.present1.as_ref())
        .map(VtableHook::original_fn)
    else {
        return E_FAIL;
    };
    if !flags.contains(DXGI_PRESENT_TEST) && !passthrough::active() {
        present_swapchain(this);
    }

    unsafe { original(this, sync_interval, flags, params) }
}

#[tracing::instrument]
extern "system" fn resize_buffers(
    this: *mut c_void,
    buffer_count: u32,
    width: u32,
    height: u32,
    format: DXGI_FORMAT,
    flags: u32,
) -> HRESULT {
    trace!("IDXGISwapChain::ResizeBuffers called");

    let original = original!(swapchain.resize_buffers, E_FAIL);
    if passthrough::active() {
        return unsafe { original(this, buffer_count, width, height, format, flags) };
    }

    let registry = crate::registry();
    let state = SWAPCHAINS.get(&(this as u64)).map(|state| state.clone());
    if let Some(state) = &state {
        reset_swapchain(registry, this as u64, &mut state.lock());
    }

    let hr = unsafe { original(this, buffer_count, width, height, format, flags) };
    if hr.is_ok() && state.is_some() {
        // zero sizes take the window's
        let (width, height) = match unsafe { IDXGISwapChain::from_raw_borrowed(&this) } {
            Some(swapchain) if width == 0 || height == 0 => passthrough::call(|| unsafe { swapchain.GetDesc() })
                .map_or((width, height), |desc| (desc.BufferDesc.Width, desc.BufferDesc.Height)),
            _ => (width, height),
        };
        registry.dispatch(&mut Event::Resize {
            swapchain: this as u64,
            width,
            height,
        });
    }
    hr
}

#[cfg(test)]
mod tests {
    use tint_api::{
        Format,
        resource::{MemoryHeap, ResourceDesc},
    };

    use super::*;

    #[test]
    fn blend_factor_packs_as_rgba8() {
        assert_eq!(pack_color(&[1.0; 4]), u32::MAX);
        assert_eq!(pack_color(&[0.0; 4]), 0);
        assert_eq!(pack_color(&[1.0, 0.0, 0.5, 2.0]), 0xff80_00ff);
    }

    #[test]
    fn index_sizes() {
        assert_eq!(index_size(57), 2);
        assert_eq!(index_size(42), 4);
        assert_eq!(index_size(0), 0);
    }

    #[test]
    fn mip_level_extent() {
        let desc = ResourceDesc {
            dimension: ResourceDimension::Texture2d {
                width: 256,
                height: 64,
                layers: 2,
                levels: 9,
                samples: 1,
            },
            ..ResourceDesc::buffer(0, MemoryHeap::GpuOnly, ResourceUsage::SHADER_RESOURCE)
        };
        assert_eq!(subresource_extent(&desc, 0), [256, 64, 1]);
        assert_eq!(subresource_extent(&desc, 2), [64, 16, 1]);
        // second layer, level 7
        assert_eq!(subresource_extent(&desc, 16), [2, 1, 1]);

        let buffer = ResourceDesc::buffer(4096, MemoryHeap::GpuOnly, ResourceUsage::VERTEX_BUFFER);
        assert_eq!(subresource_extent(&buffer, 0), [4096, 1, 1]);
        assert_eq!(buffer.format, Format::Unknown);
    }

    #[test]
    fn viewport_mirror() {
        let viewport = to_viewport(&D3D11_VIEWPORT {
            TopLeftX: 8.0,
            TopLeftY: 4.0,
            Width: 1280.0,
            Height: 720.0,
            MinDepth: 0.0,
            MaxDepth: 1.0,
        });
        assert_eq!(viewport.x, 8.0);
        assert_eq!(viewport.height, 720.0);
        assert_eq!(viewport.max_depth, 1.0);
    }
}
