//! [`CommandList`] and [`CommandQueue`] of a D3D9 device.
//!
//! D3D9 records nothing, so the device is its own immediate command list and every
//! command executes right away.

use core::ptr;

use tint_api::{
    CommandList, CommandQueue, DescriptorSet, Device, Format, Pipeline, PipelineLayout,
    QueryPool, Resource, ResourceView, Sampler,
    descriptor::{DescriptorRange, DescriptorSetUpdate, PipelineLayoutParam},
    device::QueueType,
    pipeline::{
        LoadOp, PipelineStage, PipelineState, PrimitiveTopology, QueryType, Rect, RenderPassDepthStencil,
        RenderPassRenderTarget, ShaderStage, Viewport,
    },
    resource::{ResourceUsage, SubresourceBox},
    sampler::FilterMode,
};
use tracing::debug;
use windows::{
    Win32::{Foundation::RECT, Graphics::Direct3D9::*},
    core::HSTRING,
};

use super::{
    clear::{STENCIL, ZBUFFER},
    conv::{self, rs, samp, texf},
    device::{
        Descriptor, DeviceImpl, ISSUE_BEGIN, ISSUE_END, NativeResource, PipelineData, box_rect,
        is_srgb_view, native_error, rect, write_descriptors,
    },
};
use crate::passthrough;

/// `D3DVERTEXTEXTURESAMPLER0`
const VERTEX_TEXTURE_SAMPLER0: u32 = 257;

fn check(what: &str, res: windows::core::Result<()>) {
    if let Err(err) = res {
        debug!("{what} failed. err: {err:?}");
    }
}

#[inline]
fn opt_ptr<T>(value: &Option<T>) -> *const T {
    value.as_ref().map_or(ptr::null(), ptr::from_ref)
}

impl DeviceImpl {
    fn set_render_states(&self, states: &[(u32, u32)]) {
        for &(state, value) in states {
            check("SetRenderState", unsafe {
                self.device.SetRenderState(D3DRENDERSTATETYPE(state as _), value)
            });
        }
    }

    fn apply_sampler(&self, stage: u32, sampler: Sampler) {
        let Some(desc) = self.samplers.get_copied(sampler.raw()) else {
            debug!("unknown sampler {sampler:?}");
            return;
        };

        for (ty, value) in conv::sampler_states(&desc) {
            check("SetSamplerState", unsafe {
                self.device.SetSamplerState(stage, D3DSAMPLERSTATETYPE(ty as _), value)
            });
        }
    }

    fn apply_texture(&self, stage: u32, view: ResourceView) {
        let texture = self.view_texture(view);
        unsafe {
            check("SetTexture", self.device.SetTexture(stage, texture.as_ref()));
            check(
                "SetSamplerState",
                self.device.SetSamplerState(
                    stage,
                    D3DSAMPLERSTATETYPE(samp::SRGBTEXTURE as _),
                    is_srgb_view(view) as u32,
                ),
            );
        }
    }

    /// Binds `slots` of `range`, the first one at register `first` of the range.
    fn bind_slots(&self, range: &DescriptorRange, stages: ShaderStage, first: u32, slots: &[Descriptor]) {
        let visibility = range.visibility & stages;
        let mut bases = Vec::with_capacity(2);
        if visibility.contains(ShaderStage::PIXEL) {
            bases.push(range.dx_register_index);
        }
        if visibility.contains(ShaderStage::VERTEX) {
            bases.push(VERTEX_TEXTURE_SAMPLER0 + range.dx_register_index);
        }

        for base in bases {
            for (index, slot) in slots.iter().enumerate() {
                let stage = base + first + index as u32;
                match *slot {
                    Descriptor::Empty => {}
                    Descriptor::Sampler(sampler) => self.apply_sampler(stage, sampler),
                    Descriptor::View(view) => self.apply_texture(stage, view),
                    Descriptor::SamplerWithView(sampler, view) => {
                        self.apply_sampler(stage, sampler);
                        self.apply_texture(stage, view);
                    }
                }
            }
        }
    }

    fn stretch(
        &self,
        src: Resource,
        src_subresource: u32,
        src_rect: Option<RECT>,
        dst: Resource,
        dst_subresource: u32,
        dst_rect: Option<RECT>,
        filter: u32,
    ) -> tint_api::Result<()> {
        let src = self.resource_surface(src, src_subresource)?;
        let dst = self.resource_surface(dst, dst_subresource)?;
        unsafe {
            self.device.StretchRect(
                &src,
                opt_ptr(&src_rect),
                &dst,
                opt_ptr(&dst_rect),
                D3DTEXTUREFILTERTYPE(filter as _),
            )
        }
        .map_err(native_error)
    }

    fn query(&self, pool: QueryPool, index: u32) -> Option<IDirect3DQuery9> {
        self.query_pools
            .get(pool.raw())
            .and_then(|data| data.queries.get(index as usize).cloned())
    }
}

impl CommandList for DeviceImpl {
    fn barrier(&self, _resources: &[Resource], _old_states: &[ResourceUsage], _new_states: &[ResourceUsage]) {}

    fn begin_render_pass(
        &self,
        render_targets: &[RenderPassRenderTarget],
        depth_stencil: Option<&RenderPassDepthStencil>,
    ) {
        passthrough::call(|| unsafe {
            for index in 0..self.max_render_targets {
                let target = render_targets.get(index as usize);
                let surface = target.and_then(|target| self.view_surface(target.view));
                if index == 0 && surface.is_none() {
                    debug!("render pass without a first render target");
                    continue;
                }
                check("SetRenderTarget", self.device.SetRenderTarget(index, surface.as_ref()));

                if let (Some(target), Some(surface)) = (target, &surface) {
                    if index == 0 {
                        self.set_render_states(&[(rs::SRGBWRITEENABLE, is_srgb_view(target.view) as u32)]);
                    }
                    if target.load_op == LoadOp::Clear {
                        check(
                            "ColorFill",
                            self.device
                                .ColorFill(surface, ptr::null(), conv::rgba_to_color(&target.clear_color)),
                        );
                    }
                }
            }

            let surface = depth_stencil.and_then(|ds| self.view_surface(ds.view));
            check("SetDepthStencilSurface", self.device.SetDepthStencilSurface(surface.as_ref()));

            if let (Some(ds), Some(_)) = (depth_stencil, &surface) {
                let mut flags = 0;
                if ds.depth_load_op == LoadOp::Clear {
                    flags |= ZBUFFER;
                }
                if ds.stencil_load_op == LoadOp::Clear {
                    flags |= STENCIL;
                }
                if flags != 0 {
                    check(
                        "Clear",
                        self.device.Clear(
                            0,
                            ptr::null(),
                            flags,
                            0,
                            ds.clear_depth,
                            ds.clear_stencil as u32,
                        ),
                    );
                }
            }
        })
    }

    fn finish_render_pass(&self) {}

    fn bind_pipeline(&self, stages: PipelineStage, pipeline: Pipeline) {
        passthrough::call(|| unsafe {
            if pipeline.is_null() {
                if stages.contains(PipelineStage::VERTEX_SHADER) {
                    check(
                        "SetVertexShader",
                        self.device.SetVertexShader(None::<&IDirect3DVertexShader9>),
                    );
                }
                if stages.contains(PipelineStage::PIXEL_SHADER) {
                    check(
                        "SetPixelShader",
                        self.device.SetPixelShader(None::<&IDirect3DPixelShader9>),
                    );
                }
                return;
            }

            let Some(data) = self.pipelines.get(pipeline.raw()) else {
                debug!("bind of unknown pipeline {pipeline:?}");
                return;
            };
            match &*data {
                PipelineData::VertexShader(com) => {
                    check("SetVertexShader", self.device.SetVertexShader(com.get()));
                }
                PipelineData::PixelShader(com) => {
                    check("SetPixelShader", self.device.SetPixelShader(com.get()));
                }
                PipelineData::InputLayout(com) => {
                    check("SetVertexDeclaration", self.device.SetVertexDeclaration(com.get()));
                    self.state.lock().vertex_ids = false;
                }
                PipelineData::States(states) => self.set_render_states(states),
                PipelineData::Graphics(graphics) => {
                    check(
                        "SetVertexShader",
                        self.device.SetVertexShader(graphics.vertex_shader.as_ref()),
                    );
                    check(
                        "SetPixelShader",
                        self.device.SetPixelShader(graphics.pixel_shader.as_ref()),
                    );
                    check(
                        "SetVertexDeclaration",
                        self.device.SetVertexDeclaration(graphics.declaration.as_ref()),
                    );
                    self.set_render_states(&graphics.states);

                    let mut state = self.state.lock();
                    state.topology = graphics.topology;
                    state.vertex_ids = graphics.vertex_ids;
                }
            }
        })
    }

    fn bind_pipeline_states(&self, states: &[PipelineState], values: &[u32]) {
        passthrough::call(|| {
            for (&state, &value) in states.iter().zip(values) {
                match state {
                    PipelineState::PrimitiveTopology => {
                        self.state.lock().topology =
                            conv::topology_to_d3d(PrimitiveTopology::from_raw(value));
                    }
                    state if (state as u32) < 1000 => self.set_render_states(&[(state as u32, value)]),
                    state => debug!("{state:?} can't be set on D3D9"),
                }
            }
        })
    }

    fn bind_viewports(&self, first: u32, viewports: &[Viewport]) {
        let (0, Some(viewport)) = (first, viewports.first()) else {
            debug!("D3D9 binds a single viewport");
            return;
        };

        let viewport = D3DVIEWPORT9 {
            X: viewport.x as u32,
            Y: viewport.y as u32,
            Width: viewport.width as u32,
            Height: viewport.height as u32,
            MinZ: viewport.min_depth,
            MaxZ: viewport.max_depth,
        };
        check(
            "SetViewport",
            passthrough::call(|| unsafe { self.device.SetViewport(&viewport) }),
        );
    }

    fn bind_scissor_rects(&self, first: u32, rects: &[Rect]) {
        let (0, Some(scissor)) = (first, rects.first()) else {
            debug!("D3D9 binds a single scissor rectangle");
            return;
        };

        let scissor = rect(scissor);
        check(
            "SetScissorRect",
            passthrough::call(|| unsafe { self.device.SetScissorRect(&scissor) }),
        );
    }

    fn push_constants(&self, stages: ShaderStage, layout: PipelineLayout, param: u32, first: u32, values: &[u32]) {
        let Some(range) = self.pipeline_layouts.with(layout.raw(), |params| match params.get(param as usize) {
            Some(PipelineLayoutParam::PushConstants(range)) => Some(*range),
            _ => None,
        })
        .flatten() else {
            debug!("parameter {param} of {layout:?} holds no constants");
            return;
        };
        if first % 4 != 0 {
            debug!("push constants must start at a register boundary");
            return;
        }

        // Registers hold four values, pad the last one
        let mut padded = values.to_vec();
        padded.resize(values.len().div_ceil(4) * 4, 0);
        let register = range.dx_register_index + first / 4;
        let count = padded.len() as u32 / 4;
        let visibility = range.visibility & stages;

        passthrough::call(|| unsafe {
            if visibility.contains(ShaderStage::VERTEX) {
                check(
                    "SetVertexShaderConstantF",
                    self.device
                        .SetVertexShaderConstantF(register, padded.as_ptr().cast(), count),
                );
            }
            if visibility.contains(ShaderStage::PIXEL) {
                check(
                    "SetPixelShaderConstantF",
                    self.device
                        .SetPixelShaderConstantF(register, padded.as_ptr().cast(), count),
                );
            }
        })
    }

    fn push_descriptors(
        &self,
        stages: ShaderStage,
        layout: PipelineLayout,
        param: u32,
        update: &DescriptorSetUpdate<'_>,
    ) {
        let Some(range) = self.pipeline_layouts.with(layout.raw(), |params| match params.get(param as usize) {
            Some(PipelineLayoutParam::PushDescriptors(range)) => Some(*range),
            Some(PipelineLayoutParam::DescriptorTable(ranges)) => ranges
                .iter()
                .find(|range| range.binding == update.binding)
                .copied(),
            _ => None,
        })
        .flatten() else {
            debug!("parameter {param} of {layout:?} holds no descriptors");
            return;
        };

        let mut slots = vec![Descriptor::Empty; update.descriptors.len()];
        write_descriptors(&mut slots, 0, &update.descriptors);
        passthrough::call(|| {
            self.bind_slots(
                &range,
                stages,
                update.binding.saturating_sub(range.binding) + update.array_offset,
                &slots,
            )
        });
    }

    fn bind_descriptor_sets(&self, stages: ShaderStage, _layout: PipelineLayout, _first: u32, sets: &[DescriptorSet]) {
        passthrough::call(|| {
            for set in sets {
                let Some(data) = self.descriptor_sets.get(set.raw()) else {
                    debug!("bind of unknown descriptor set {set:?}");
                    continue;
                };
                self.bind_slots(&data.range, stages, 0, &data.slots);
            }
        })
    }

    fn bind_index_buffer(&self, buffer: Resource, offset: u64, _index_size: u32) {
        if offset != 0 {
            debug!("D3D9 index buffers can't be bound at an offset");
        }

        let native = self.resources.get(buffer.raw()).and_then(|data| match &data.native {
            NativeResource::IndexBuffer(com) => com.get().cloned(),
            _ => None,
        });
        check(
            "SetIndices",
            passthrough::call(|| unsafe { self.device.SetIndices(native.as_ref()) }),
        );
    }

    fn bind_vertex_buffers(&self, first: u32, buffers: &[Resource], offsets: &[u64], strides: &[u32]) {
        passthrough::call(|| {
            for (index, &buffer) in buffers.iter().enumerate() {
                let native = self.resources.get(buffer.raw()).and_then(|data| match &data.native {
                    NativeResource::VertexBuffer(com) => com.get().cloned(),
                    _ => None,
                });
                let offset = offsets.get(index).copied().unwrap_or_default() as u32;
                let stride = strides.get(index).copied().unwrap_or_default();

                check("SetStreamSource", unsafe {
                    self.device
                        .SetStreamSource(first + index as u32, native.as_ref(), offset, stride)
                });
            }
        })
    }

    fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, _first_instance: u32) {
        if instance_count > 1 {
            debug!("D3D9 draws a single instance");
        }

        passthrough::call(|| {
            let mut state = self.state.lock();
            let topology = state.topology;
            if state.vertex_ids {
                if let Some(buffer) = self.vertex_id_buffer(&mut state, first_vertex + vertex_count) {
                    check("SetStreamSource", unsafe {
                        self.device.SetStreamSource(0, &buffer, 0, 4)
                    });
                }
            }
            drop(state);

            check("DrawPrimitive", unsafe {
                self.device.DrawPrimitive(
                    D3DPRIMITIVETYPE(topology as _),
                    first_vertex,
                    conv::primitive_count(topology, vertex_count),
                )
            });
        })
    }

    fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        _first_instance: u32,
    ) {
        if instance_count > 1 {
            debug!("D3D9 draws a single instance");
        }

        let topology = self.state.lock().topology;
        check(
            "DrawIndexedPrimitive",
            passthrough::call(|| unsafe {
                self.device.DrawIndexedPrimitive(
                    D3DPRIMITIVETYPE(topology as _),
                    vertex_offset,
                    0,
                    u16::MAX as u32,
                    first_index,
                    conv::primitive_count(topology, index_count),
                )
            }),
        );
    }

    fn copy_resource(&self, src: Resource, dst: Resource) {
        let Some(desc) = self.get_resource_desc(src) else {
            debug!("copy from unknown resource {src:?}");
            return;
        };
        if desc.is_buffer() {
            debug!("D3D9 can't copy buffers on the GPU");
            return;
        }

        let count = desc.levels() as u32 * desc.layers() as u32;
        passthrough::call(|| {
            for index in 0..count {
                if let Err(err) = self.stretch(src, index, None, dst, index, None, texf::NONE) {
                    debug!("copy of subresource {index} failed. err: {err:?}");
                    break;
                }
            }
        })
    }

    fn copy_texture_region(
        &self,
        src: Resource,
        src_subresource: u32,
        src_box: Option<&SubresourceBox>,
        dst: Resource,
        dst_subresource: u32,
        dst_box: Option<&SubresourceBox>,
        filter: FilterMode,
    ) {
        let filter = if filter.min_linear() || filter.mag_linear() {
            texf::LINEAR
        } else {
            texf::POINT
        };

        let res = passthrough::call(|| {
            self.stretch(
                src,
                src_subresource,
                src_box.map(box_rect),
                dst,
                dst_subresource,
                dst_box.map(box_rect),
                filter,
            )
        });
        if let Err(err) = res {
            debug!("texture region copy failed. err: {err:?}");
        }
    }

    fn resolve_texture_region(
        &self,
        src: Resource,
        src_subresource: u32,
        src_box: Option<&SubresourceBox>,
        dst: Resource,
        dst_subresource: u32,
        dst_offset: [i32; 3],
        _format: Format,
    ) {
        let Some(desc) = self.get_resource_desc(src) else {
            debug!("resolve from unknown resource {src:?}");
            return;
        };

        let (width, height, _) = desc.extent();
        let src_rect = src_box.map_or(
            RECT {
                left: 0,
                top: 0,
                right: width as i32,
                bottom: height as i32,
            },
            box_rect,
        );
        let dst_rect = RECT {
            left: dst_offset[0],
            top: dst_offset[1],
            right: dst_offset[0] + (src_rect.right - src_rect.left),
            bottom: dst_offset[1] + (src_rect.bottom - src_rect.top),
        };

        let res = passthrough::call(|| {
            self.stretch(
                src,
                src_subresource,
                Some(src_rect),
                dst,
                dst_subresource,
                Some(dst_rect),
                texf::NONE,
            )
        });
        if let Err(err) = res {
            debug!("resolve failed. err: {err:?}");
        }
    }

    fn clear_depth_stencil_view(&self, dsv: ResourceView, depth: Option<f32>, stencil: Option<u8>, rects: &[Rect]) {
        let Some(surface) = self.view_surface(dsv) else {
            debug!("clear of unknown depth-stencil view {dsv:?}");
            return;
        };

        let mut flags = 0;
        if depth.is_some() {
            flags |= ZBUFFER;
        }
        if stencil.is_some() {
            flags |= STENCIL;
        }
        let rects: Vec<D3DRECT> = rects
            .iter()
            .map(|r| D3DRECT {
                x1: r.left,
                y1: r.top,
                x2: r.right,
                y2: r.bottom,
            })
            .collect();

        passthrough::call(|| unsafe {
            let previous = self.device.GetDepthStencilSurface().ok();
            check("SetDepthStencilSurface", self.device.SetDepthStencilSurface(&surface));
            check(
                "Clear",
                self.device.Clear(
                    rects.len() as u32,
                    if rects.is_empty() {
                        ptr::null()
                    } else {
                        rects.as_ptr()
                    },
                    flags,
                    0,
                    depth.unwrap_or(1.0),
                    stencil.unwrap_or_default() as u32,
                ),
            );
            check(
                "SetDepthStencilSurface",
                self.device.SetDepthStencilSurface(previous.as_ref()),
            );
        })
    }

    fn clear_render_target_view(&self, rtv: ResourceView, color: &[f32; 4], rects: &[Rect]) {
        let Some(surface) = self.view_surface(rtv) else {
            debug!("clear of unknown render target view {rtv:?}");
            return;
        };

        let color = conv::rgba_to_color(color);
        passthrough::call(|| unsafe {
            if rects.is_empty() {
                check("ColorFill", self.device.ColorFill(&surface, ptr::null(), color));
            }
            for r in rects {
                check("ColorFill", self.device.ColorFill(&surface, &rect(r), color));
            }
        })
    }

    fn generate_mipmaps(&self, srv: ResourceView) {
        let Some(texture) = self.view_texture(srv) else {
            debug!("mipmap generation of unknown view {srv:?}");
            return;
        };

        passthrough::call(|| unsafe { texture.GenerateMipSubLevels() })
    }

    fn begin_query(&self, pool: QueryPool, ty: QueryType, index: u32) {
        if ty == QueryType::Timestamp {
            return;
        }

        if let Some(query) = self.query(pool, index) {
            check("Issue", passthrough::call(|| unsafe { query.Issue(ISSUE_BEGIN) }));
        }
    }

    fn end_query(&self, pool: QueryPool, _ty: QueryType, index: u32) {
        if let Some(query) = self.query(pool, index) {
            check("Issue", passthrough::call(|| unsafe { query.Issue(ISSUE_END) }));
        }
    }

    fn begin_debug_event(&self, label: &str, color: [f32; 4]) {
        unsafe { D3DPERF_BeginEvent(conv::rgba_to_color(&color), &HSTRING::from(label)) };
    }

    fn end_debug_event(&self) {
        unsafe { D3DPERF_EndEvent() };
    }

    fn insert_debug_marker(&self, label: &str, color: [f32; 4]) {
        unsafe { D3DPERF_SetMarker(conv::rgba_to_color(&color), &HSTRING::from(label)) };
    }
}

impl CommandQueue for DeviceImpl {
    fn queue_type(&self) -> QueueType {
        QueueType::GRAPHICS | QueueType::COPY
    }

    fn immediate_command_list(&self) -> Option<&dyn CommandList> {
        Some(self)
    }

    fn flush_immediate_command_list(&self) {}

    fn wait_idle(&self) {
        Device::wait_idle(self);
    }
}
