//! [`CommandList`] and [`CommandQueue`] of the immediate `ID3D11DeviceContext`.

use core::ffi::c_void;
use std::sync::Arc;

use parking_lot::Mutex;

use tint_api::{
    CommandList, CommandQueue, DescriptorSet, Device, Format, Pipeline, PipelineLayout, QueryPool,
    Resource, ResourceView,
    descriptor::{DescriptorRange, DescriptorSetUpdate, DescriptorType, PipelineLayoutParam},
    device::QueueType,
    pipeline::{
        IndirectCommand, LoadOp, PipelineStage, PipelineState, PipelineType, PrimitiveTopology, QueryType,
        Rect, RenderPassDepthStencil, RenderPassRenderTarget, ShaderStage, Viewport,
    },
    resource::{ResourceUsage, SubresourceBox},
    sampler::FilterMode,
};
use tracing::debug;
use windows::{
    Win32::{
        Foundation::RECT,
        Graphics::{
            Direct3D::D3D_PRIMITIVE_TOPOLOGY,
            Direct3D11::*,
            Dxgi::Common::{DXGI_FORMAT, DXGI_FORMAT_R16_UINT, DXGI_FORMAT_R32_UINT, DXGI_FORMAT_UNKNOWN},
        },
    },
    core::{HSTRING, Interface},
};

use super::{
    conv,
    descriptor::{Slot, bound_stages, constant_window, slots},
    device::{DeviceImpl, GraphicsPipeline, PipelineData, native_box},
};
use crate::passthrough;

/// Calls the method of `$stage` out of one per shader stage.
macro_rules! stage_call {
    ($cx:expr, $stage:expr, [$vs:ident, $hs:ident, $ds:ident, $gs:ident, $ps:ident, $cs:ident]($($arg:expr),*)) => {{
        let stage = $stage;
        if stage == ShaderStage::VERTEX {
            $cx.$vs($($arg),*)
        } else if stage == ShaderStage::HULL {
            $cx.$hs($($arg),*)
        } else if stage == ShaderStage::DOMAIN {
            $cx.$ds($($arg),*)
        } else if stage == ShaderStage::GEOMETRY {
            $cx.$gs($($arg),*)
        } else if stage == ShaderStage::PIXEL {
            $cx.$ps($($arg),*)
        } else {
            $cx.$cs($($arg),*)
        }
    }};
}

/// New reference to the native object behind a pointer handle.
fn object<T: Interface>(raw: u64) -> Option<T> {
    let raw = raw as *mut c_void;
    unsafe { T::from_raw_borrowed(&raw) }.cloned()
}

fn native_rect(rect: &Rect) -> RECT {
    RECT {
        left: rect.left,
        top: rect.top,
        right: rect.right,
        bottom: rect.bottom,
    }
}

/// Command list over the immediate context of a device.
///
/// Direct3D 11 executes immediate context calls in order, so this is also the device's
/// only queue.
pub struct CommandListImpl {
    pub(crate) device: Arc<DeviceImpl>,
    context1: Option<ID3D11DeviceContext1>,
    annotation: Option<ID3DUserDefinedAnnotation>,
    output: Mutex<OutputState>,
}

/// Output merger values bound next to their state objects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct OutputState {
    pub blend_state: u64,
    pub blend_factor: [f32; 4],
    pub sample_mask: u32,
    pub depth_stencil_state: u64,
    pub stencil_reference: u32,
}

impl Default for OutputState {
    fn default() -> Self {
        Self {
            blend_state: 0,
            blend_factor: [1.0; 4],
            sample_mask: u32::MAX,
            depth_stencil_state: 0,
            stencil_reference: 0,
        }
    }
}

unsafe impl Send for CommandListImpl {}
unsafe impl Sync for CommandListImpl {}

impl CommandListImpl {
    pub(crate) fn new(device: Arc<DeviceImpl>) -> Self {
        let (context1, annotation) = passthrough::call(|| {
            (
                device.context.cast::<ID3D11DeviceContext1>().ok(),
                device.context.cast::<ID3DUserDefinedAnnotation>().ok(),
            )
        });

        Self {
            device,
            context1,
            annotation,
            output: Mutex::new(OutputState::default()),
        }
    }

    /// Remembers a blend state the application bound.
    pub(crate) fn record_blend_state(&self, blend_state: u64, factor: Option<[f32; 4]>, sample_mask: u32) {
        let mut output = self.output.lock();
        output.blend_state = blend_state;
        output.blend_factor = factor.unwrap_or([1.0; 4]);
        output.sample_mask = sample_mask;
    }

    /// Remembers a depth-stencil state the application bound.
    pub(crate) fn record_depth_stencil_state(&self, depth_stencil_state: u64, stencil_reference: u32) {
        let mut output = self.output.lock();
        output.depth_stencil_state = depth_stencil_state;
        output.stencil_reference = stencil_reference;
    }

    fn apply_blend_state(&self, output: &OutputState) {
        unsafe {
            self.cx().OMSetBlendState(
                object::<ID3D11BlendState>(output.blend_state).as_ref(),
                Some(&output.blend_factor),
                output.sample_mask,
            )
        };
    }

    fn apply_depth_stencil_state(&self, output: &OutputState) {
        unsafe {
            self.cx().OMSetDepthStencilState(
                object::<ID3D11DepthStencilState>(output.depth_stencil_state).as_ref(),
                output.stencil_reference,
            )
        };
    }

    #[inline]
    fn cx(&self) -> &ID3D11DeviceContext {
        &self.device.context
    }

    fn bind_graphics(&self, pipeline: &GraphicsPipeline) {
        let cx = self.cx();
        unsafe {
            cx.VSSetShader(pipeline.vertex_shader.as_ref(), None);
            cx.HSSetShader(pipeline.hull_shader.as_ref(), None);
            cx.DSSetShader(pipeline.domain_shader.as_ref(), None);
            cx.GSSetShader(pipeline.geometry_shader.as_ref(), None);
            cx.PSSetShader(pipeline.pixel_shader.as_ref(), None);
            cx.IASetInputLayout(pipeline.input_layout.as_ref());
            cx.IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY(pipeline.topology as _));
            cx.RSSetState(pipeline.rasterizer_state.as_ref());
        }

        let mut output = self.output.lock();
        *output = OutputState {
            blend_state: pipeline.blend_state.as_ref().map_or(0, |state| state.as_raw() as u64),
            blend_factor: pipeline.blend_constant,
            sample_mask: pipeline.sample_mask,
            depth_stencil_state: pipeline.depth_stencil_state.as_ref().map_or(0, |state| state.as_raw() as u64),
            stencil_reference: pipeline.stencil_reference,
        };
        self.apply_blend_state(&output);
        self.apply_depth_stencil_state(&output);
    }

    /// Binds one shader stage or state object, a null `raw` unbinds.
    fn bind_object(&self, ty: PipelineType, raw: u64) {
        let cx = self.cx();
        unsafe {
            match ty {
                PipelineType::VertexShader => cx.VSSetShader(object::<ID3D11VertexShader>(raw).as_ref(), None),
                PipelineType::HullShader => cx.HSSetShader(object::<ID3D11HullShader>(raw).as_ref(), None),
                PipelineType::DomainShader => cx.DSSetShader(object::<ID3D11DomainShader>(raw).as_ref(), None),
                PipelineType::GeometryShader => {
                    cx.GSSetShader(object::<ID3D11GeometryShader>(raw).as_ref(), None)
                }
                PipelineType::PixelShader => cx.PSSetShader(object::<ID3D11PixelShader>(raw).as_ref(), None),
                PipelineType::Compute => cx.CSSetShader(object::<ID3D11ComputeShader>(raw).as_ref(), None),
                PipelineType::InputLayout => cx.IASetInputLayout(object::<ID3D11InputLayout>(raw).as_ref()),
                PipelineType::BlendState => {
                    let mut output = self.output.lock();
                    output.blend_state = raw;
                    self.apply_blend_state(&output);
                }
                PipelineType::RasterizerState => cx.RSSetState(object::<ID3D11RasterizerState>(raw).as_ref()),
                PipelineType::DepthStencilState => {
                    let mut output = self.output.lock();
                    output.depth_stencil_state = raw;
                    self.apply_depth_stencil_state(&output);
                }
                PipelineType::Graphics => {}
            }
        }
    }

    /// Binds `slots` of `range` to every stage of `stages` it is visible to.
    fn bind_slots(&self, range: &DescriptorRange, stages: ShaderStage, first: u32, slots: &[Slot]) {
        let cx = self.cx();
        let start = range.dx_register_index + first;

        match range.ty {
            DescriptorType::Sampler => {
                let samplers: Vec<Option<ID3D11SamplerState>> =
                    slots.iter().map(|slot| object(slot.raw())).collect();
                for stage in bound_stages(range.visibility, stages) {
                    unsafe {
                        stage_call!(cx, stage, [
                            VSSetSamplers, HSSetSamplers, DSSetSamplers, GSSetSamplers, PSSetSamplers, CSSetSamplers
                        ](start, Some(samplers.as_slice())))
                    };
                }
            }
            DescriptorType::ShaderResourceView => {
                let views: Vec<Option<ID3D11ShaderResourceView>> =
                    slots.iter().map(|slot| object(slot.raw())).collect();
                for stage in bound_stages(range.visibility, stages) {
                    unsafe {
                        stage_call!(cx, stage, [
                            VSSetShaderResources, HSSetShaderResources, DSSetShaderResources,
                            GSSetShaderResources, PSSetShaderResources, CSSetShaderResources
                        ](start, Some(views.as_slice())))
                    };
                }
            }
            DescriptorType::UnorderedAccessView => {
                if !(range.visibility & stages).contains(ShaderStage::COMPUTE) {
                    debug!("unordered access views are only bound to the compute stage");
                    return;
                }
                let views: Vec<Option<ID3D11UnorderedAccessView>> =
                    slots.iter().map(|slot| object(slot.raw())).collect();
                unsafe { cx.CSSetUnorderedAccessViews(start, views.len() as u32, Some(views.as_ptr()), None) };
            }
            DescriptorType::ConstantBuffer => self.bind_constant_buffers(range, stages, start, slots),
            DescriptorType::SamplerWithResourceView => {
                debug!("combined sampler and view descriptors can't be bound on Direct3D 11");
            }
        }
    }

    fn bind_constant_buffers(&self, range: &DescriptorRange, stages: ShaderStage, start: u32, slots: &[Slot]) {
        let cx = self.cx();
        let buffers: Vec<Option<ID3D11Buffer>> = slots.iter().map(|slot| object(slot.raw())).collect();
        let windows: Vec<Option<(u32, u32)>> = slots
            .iter()
            .map(|slot| match slot {
                Slot::ConstantBuffer(buffer) => constant_window(buffer, self.device.buffer_size(buffer.buffer)),
                _ => None,
            })
            .collect();

        let windowed = windows.iter().any(Option::is_some);
        let context1 = match (&self.context1, windowed) {
            (Some(context1), true) => Some(context1),
            (None, true) => {
                debug!("constant buffer ranges need ID3D11DeviceContext1, binding whole buffers");
                None
            }
            _ => None,
        };

        for stage in bound_stages(range.visibility, stages) {
            unsafe {
                match context1 {
                    Some(context1) => {
                        let (first, count): (Vec<u32>, Vec<u32>) =
                            windows.iter().map(|window| window.unwrap_or((0, 4096))).unzip();
                        stage_call!(context1, stage, [
                            VSSetConstantBuffers1, HSSetConstantBuffers1, DSSetConstantBuffers1,
                            GSSetConstantBuffers1, PSSetConstantBuffers1, CSSetConstantBuffers1
                        ](
                            start,
                            buffers.len() as u32,
                            Some(buffers.as_ptr()),
                            Some(first.as_ptr()),
                            Some(count.as_ptr())
                        ))
                    }
                    None => stage_call!(cx, stage, [
                        VSSetConstantBuffers, HSSetConstantBuffers, DSSetConstantBuffers,
                        GSSetConstantBuffers, PSSetConstantBuffers, CSSetConstantBuffers
                    ](start, Some(buffers.as_slice()))),
                }
            }
        }
    }

    /// Writes push constants to the buffer of their layout parameter, creating it as needed.
    fn push_constant_buffer(&self, layout: PipelineLayout, param: u32, first: u32, values: &[u32]) -> Option<ID3D11Buffer> {
        let data = self.device.pipeline_layouts.get(layout.raw())?;
        let mut constants = data.constants.lock();
        let entry = constants.get_mut(param as usize)?;

        let grown = entry.values.write(first, values);
        if grown || entry.buffer.is_none() {
            let desc = D3D11_BUFFER_DESC {
                ByteWidth: entry.values.byte_size(),
                Usage: D3D11_USAGE_DYNAMIC,
                BindFlags: D3D11_BIND_CONSTANT_BUFFER.0 as _,
                CPUAccessFlags: D3D11_CPU_ACCESS_WRITE.0 as _,
                ..Default::default()
            };
            let mut buffer = None;
            if let Err(err) = unsafe { self.device.device.CreateBuffer(&desc, None, Some(&mut buffer)) } {
                debug!("cannot create push constant buffer. err: {err:?}");
                return None;
            }
            entry.buffer = buffer;
        }
        let buffer = entry.buffer.clone()?;

        let bytes = entry.values.as_bytes();
        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            if let Err(err) = self.cx().Map(&buffer, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut mapped)) {
                debug!("cannot map push constant buffer. err: {err:?}");
                return None;
            }
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.pData.cast::<u8>(), bytes.len());
            self.cx().Unmap(&buffer, 0);
        }
        Some(buffer)
    }

    fn query(&self, pool: QueryPool, index: u32) -> Option<ID3D11Query> {
        self.device
            .query_pools
            .get(pool.raw())
            .and_then(|data| data.queries.get(index as usize).cloned())
    }
}

impl CommandList for CommandListImpl {
    // Direct3D 11 tracks resource hazards on its own
    fn barrier(&self, _resources: &[Resource], _old_states: &[ResourceUsage], _new_states: &[ResourceUsage]) {}

    fn begin_render_pass(
        &self,
        render_targets: &[RenderPassRenderTarget],
        depth_stencil: Option<&RenderPassDepthStencil>,
    ) {
        let cx = self.cx();
        let rtvs: Vec<Option<ID3D11RenderTargetView>> =
            render_targets.iter().map(|target| object(target.view.raw())).collect();
        let dsv: Option<ID3D11DepthStencilView> = depth_stencil.and_then(|ds| object(ds.view.raw()));

        passthrough::call(|| unsafe {
            cx.OMSetRenderTargets(Some(rtvs.as_slice()), dsv.as_ref());

            for (target, rtv) in render_targets.iter().zip(&rtvs) {
                if let (LoadOp::Clear, Some(rtv)) = (target.load_op, rtv) {
                    cx.ClearRenderTargetView(rtv, &target.clear_color);
                }
            }

            if let (Some(ds), Some(dsv)) = (depth_stencil, &dsv) {
                let mut flags = 0;
                if ds.depth_load_op == LoadOp::Clear {
                    flags |= D3D11_CLEAR_DEPTH.0;
                }
                if ds.stencil_load_op == LoadOp::Clear {
                    flags |= D3D11_CLEAR_STENCIL.0;
                }
                if flags != 0 {
                    cx.ClearDepthStencilView(dsv, flags as u32, ds.clear_depth, ds.clear_stencil);
                }
            }
        })
    }

    fn finish_render_pass(&self) {}

    fn bind_pipeline(&self, stages: PipelineStage, pipeline: Pipeline) {
        passthrough::call(|| {
            if pipeline.is_null() {
                let unbind = [
                    (PipelineStage::VERTEX_SHADER, PipelineType::VertexShader),
                    (PipelineStage::HULL_SHADER, PipelineType::HullShader),
                    (PipelineStage::DOMAIN_SHADER, PipelineType::DomainShader),
                    (PipelineStage::GEOMETRY_SHADER, PipelineType::GeometryShader),
                    (PipelineStage::PIXEL_SHADER, PipelineType::PixelShader),
                    (PipelineStage::COMPUTE_SHADER, PipelineType::Compute),
                    (PipelineStage::INPUT_ASSEMBLER, PipelineType::InputLayout),
                ];
                for (stage, ty) in unbind {
                    if stages.contains(stage) {
                        self.bind_object(ty, 0);
                    }
                }
                return;
            }

            let Some(data) = self.device.pipelines.get(pipeline.raw()) else {
                debug!("bind of unknown pipeline {pipeline:?}");
                return;
            };
            match &*data {
                PipelineData::Object(ty, com) => self.bind_object(*ty, com.as_raw() as u64),
                PipelineData::Graphics(graphics) => self.bind_graphics(graphics),
            }
        })
    }

    fn bind_pipeline_states(&self, states: &[PipelineState], values: &[u32]) {
        passthrough::call(|| {
            let mut output = self.output.lock();
            let (mut blend, mut depth_stencil) = (false, false);

            for (&state, &value) in states.iter().zip(values) {
                match state {
                    PipelineState::PrimitiveTopology => unsafe {
                        self.cx().IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY(
                            conv::topology_to_d3d(PrimitiveTopology::from_raw(value)) as _,
                        ))
                    },
                    PipelineState::BlendConstant => {
                        output.blend_factor = value.to_le_bytes().map(|c| c as f32 / 255.0);
                        blend = true;
                    }
                    PipelineState::SampleMask => {
                        output.sample_mask = value;
                        blend = true;
                    }
                    PipelineState::StencilReferenceValue => {
                        output.stencil_reference = value;
                        depth_stencil = true;
                    }
                    state => debug!("{state:?} is baked into Direct3D 11 state objects"),
                }
            }

            if blend {
                self.apply_blend_state(&output);
            }
            if depth_stencil {
                self.apply_depth_stencil_state(&output);
            }
        })
    }

    fn bind_viewports(&self, first: u32, viewports: &[Viewport]) {
        if first != 0 {
            debug!("Direct3D 11 binds viewports from the first one on");
            return;
        }

        let viewports: Vec<D3D11_VIEWPORT> = viewports
            .iter()
            .map(|viewport| D3D11_VIEWPORT {
                TopLeftX: viewport.x,
                TopLeftY: viewport.y,
                Width: viewport.width,
                Height: viewport.height,
                MinDepth: viewport.min_depth,
                MaxDepth: viewport.max_depth,
            })
            .collect();
        passthrough::call(|| unsafe { self.cx().RSSetViewports(Some(viewports.as_slice())) });
    }

    fn bind_scissor_rects(&self, first: u32, rects: &[Rect]) {
        if first != 0 {
            debug!("Direct3D 11 binds scissor rectangles from the first one on");
            return;
        }

        let rects: Vec<RECT> = rects.iter().map(native_rect).collect();
        passthrough::call(|| unsafe { self.cx().RSSetScissorRects(Some(rects.as_slice())) });
    }

    fn push_constants(&self, stages: ShaderStage, layout: PipelineLayout, param: u32, first: u32, values: &[u32]) {
        let Some(range) = self
            .device
            .pipeline_layouts
            .with(layout.raw(), |data| match data.params.get(param as usize) {
                Some(PipelineLayoutParam::PushConstants(range)) => Some(*range),
                _ => None,
            })
            .flatten()
        else {
            debug!("parameter {param} of {layout:?} holds no constants");
            return;
        };

        passthrough::call(|| {
            let Some(buffer) = self.push_constant_buffer(layout, param, first, values) else {
                return;
            };
            let buffers = [Some(buffer)];
            for stage in bound_stages(range.visibility, stages) {
                unsafe {
                    stage_call!(self.cx(), stage, [
                        VSSetConstantBuffers, HSSetConstantBuffers, DSSetConstantBuffers,
                        GSSetConstantBuffers, PSSetConstantBuffers, CSSetConstantBuffers
                    ](range.dx_register_index, Some(buffers.as_slice())))
                };
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
        let range = if layout.is_null() {
            // Native binding of the application, registers are the bindings
            Some(DescriptorRange {
                binding: 0,
                dx_register_index: 0,
                dx_register_space: 0,
                count: u32::MAX,
                visibility: stages,
                ty: update.descriptors.ty(),
            })
        } else {
            self.device
                .pipeline_layouts
                .with(layout.raw(), |data| match data.params.get(param as usize) {
                    Some(PipelineLayoutParam::PushDescriptors(range)) => Some(*range),
                    Some(PipelineLayoutParam::DescriptorTable(ranges)) => ranges
                        .iter()
                        .find(|range| range.binding <= update.binding && update.binding < range.binding + range.count)
                        .copied(),
                    _ => None,
                })
                .flatten()
        };
        let Some(range) = range else {
            debug!("parameter {param} of {layout:?} holds no descriptors");
            return;
        };
        let Some(slots) = slots(&update.descriptors) else {
            debug!("combined sampler and view descriptors can't be bound on Direct3D 11");
            return;
        };

        let first = update.binding.saturating_sub(range.binding) + update.array_offset;
        passthrough::call(|| self.bind_slots(&range, stages, first, &slots));
    }

    fn bind_descriptor_sets(&self, stages: ShaderStage, _layout: PipelineLayout, _first: u32, sets: &[DescriptorSet]) {
        passthrough::call(|| {
            for set in sets {
                let Some(data) = self.device.descriptor_sets.get(set.raw()) else {
                    debug!("bind of unknown descriptor set {set:?}");
                    continue;
                };
                self.bind_slots(&data.range, stages, 0, &data.slots);
            }
        })
    }

    fn bind_index_buffer(&self, buffer: Resource, offset: u64, index_size: u32) {
        let format = match index_size {
            2 => DXGI_FORMAT_R16_UINT,
            4 => DXGI_FORMAT_R32_UINT,
            _ => DXGI_FORMAT_UNKNOWN,
        };
        let buffer: Option<ID3D11Buffer> = object(buffer.raw());
        passthrough::call(|| unsafe { self.cx().IASetIndexBuffer(buffer.as_ref(), format, offset as u32) });
    }

    fn bind_vertex_buffers(&self, first: u32, buffers: &[Resource], offsets: &[u64], strides: &[u32]) {
        let native: Vec<Option<ID3D11Buffer>> = buffers.iter().map(|buffer| object(buffer.raw())).collect();
        let offsets: Vec<u32> = (0..buffers.len())
            .map(|index| offsets.get(index).copied().unwrap_or_default() as u32)
            .collect();
        let strides: Vec<u32> = (0..buffers.len())
            .map(|index| strides.get(index).copied().unwrap_or_default())
            .collect();

        passthrough::call(|| unsafe {
            self.cx().IASetVertexBuffers(
                first,
                native.len() as u32,
                Some(native.as_ptr()),
                Some(strides.as_ptr()),
                Some(offsets.as_ptr()),
            )
        });
    }

    fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        passthrough::call(|| unsafe {
            self.cx()
                .DrawInstanced(vertex_count, instance_count, first_vertex, first_instance)
        });
    }

    fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        passthrough::call(|| unsafe {
            self.cx()
                .DrawIndexedInstanced(index_count, instance_count, first_index, vertex_offset, first_instance)
        });
    }

    fn dispatch(&self, x: u32, y: u32, z: u32) {
        passthrough::call(|| unsafe { self.cx().Dispatch(x, y, z) });
    }

    fn draw_or_dispatch_indirect(
        &self,
        ty: IndirectCommand,
        buffer: Resource,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        let Some(buffer) = object::<ID3D11Buffer>(buffer.raw()) else {
            debug!("indirect arguments in unknown buffer {buffer:?}");
            return;
        };

        passthrough::call(|| unsafe {
            for index in 0..draw_count {
                let offset = (offset + index as u64 * stride as u64) as u32;
                match ty {
                    IndirectCommand::Draw => self.cx().DrawInstancedIndirect(&buffer, offset),
                    IndirectCommand::DrawIndexed => self.cx().DrawIndexedInstancedIndirect(&buffer, offset),
                    IndirectCommand::Dispatch => self.cx().DispatchIndirect(&buffer, offset),
                }
            }
        })
    }

    fn copy_resource(&self, src: Resource, dst: Resource) {
        let (Some(src), Some(dst)) = (self.device.resource(src), self.device.resource(dst)) else {
            debug!("copy between unknown resources");
            return;
        };
        passthrough::call(|| unsafe { self.cx().CopyResource(&dst, &src) });
    }

    fn copy_buffer_region(&self, src: Resource, src_offset: u64, dst: Resource, dst_offset: u64, size: u64) {
        let (Some(src), Some(dst)) = (self.device.resource(src), self.device.resource(dst)) else {
            debug!("copy between unknown buffers");
            return;
        };

        let region = D3D11_BOX {
            left: src_offset as u32,
            top: 0,
            front: 0,
            right: (src_offset + size) as u32,
            bottom: 1,
            back: 1,
        };
        passthrough::call(|| unsafe {
            self.cx()
                .CopySubresourceRegion(&dst, 0, dst_offset as u32, 0, 0, &src, 0, Some(&region))
        });
    }

    fn copy_texture_region(
        &self,
        src: Resource,
        src_subresource: u32,
        src_box: Option<&SubresourceBox>,
        dst: Resource,
        dst_subresource: u32,
        dst_box: Option<&SubresourceBox>,
        _filter: FilterMode,
    ) {
        if let (Some(src_box), Some(dst_box)) = (src_box, dst_box) {
            if (src_box.width(), src_box.height(), src_box.depth()) != (dst_box.width(), dst_box.height(), dst_box.depth())
            {
                debug!("Direct3D 11 can't scale texture copies");
                return;
            }
        }
        let (Some(src), Some(dst)) = (self.device.resource(src), self.device.resource(dst)) else {
            debug!("copy between unknown textures");
            return;
        };

        let region = src_box.map(native_box);
        let [x, y, z] = dst_box.map_or([0; 3], |b| [b.left as u32, b.top as u32, b.front as u32]);
        passthrough::call(|| unsafe {
            self.cx().CopySubresourceRegion(
                &dst,
                dst_subresource,
                x,
                y,
                z,
                &src,
                src_subresource,
                region.as_ref().map(core::ptr::from_ref),
            )
        });
    }

    fn resolve_texture_region(
        &self,
        src: Resource,
        src_subresource: u32,
        src_box: Option<&SubresourceBox>,
        dst: Resource,
        dst_subresource: u32,
        dst_offset: [i32; 3],
        format: Format,
    ) {
        if src_box.is_some() || dst_offset != [0; 3] {
            debug!("Direct3D 11 resolves whole subresources");
            return;
        }
        let (Some(src), Some(dst)) = (self.device.resource(src), self.device.resource(dst)) else {
            debug!("resolve between unknown textures");
            return;
        };

        let format = DXGI_FORMAT(conv::format_to_dxgi(format) as _);
        passthrough::call(|| unsafe {
            self.cx()
                .ResolveSubresource(&dst, dst_subresource, &src, src_subresource, format)
        });
    }

    fn clear_depth_stencil_view(&self, dsv: ResourceView, depth: Option<f32>, stencil: Option<u8>, rects: &[Rect]) {
        if !rects.is_empty() {
            debug!("Direct3D 11 clears whole depth-stencil views");
        }
        let Some(view) = object::<ID3D11DepthStencilView>(dsv.raw()) else {
            debug!("clear of unknown depth-stencil view {dsv:?}");
            return;
        };

        let mut flags = 0;
        if depth.is_some() {
            flags |= D3D11_CLEAR_DEPTH.0;
        }
        if stencil.is_some() {
            flags |= D3D11_CLEAR_STENCIL.0;
        }
        passthrough::call(|| unsafe {
            self.cx().ClearDepthStencilView(
                &view,
                flags as u32,
                depth.unwrap_or(1.0),
                stencil.unwrap_or_default(),
            )
        });
    }

    fn clear_render_target_view(&self, rtv: ResourceView, color: &[f32; 4], rects: &[Rect]) {
        let Some(view) = object::<ID3D11RenderTargetView>(rtv.raw()) else {
            debug!("clear of unknown render target view {rtv:?}");
            return;
        };

        passthrough::call(|| unsafe {
            match (&self.context1, rects.is_empty()) {
                (_, true) => self.cx().ClearRenderTargetView(&view, color),
                (Some(context1), false) => {
                    let rects: Vec<RECT> = rects.iter().map(native_rect).collect();
                    context1.ClearView(&view, color, Some(rects.as_slice()));
                }
                (None, false) => debug!("clearing regions needs ID3D11DeviceContext1"),
            }
        });
    }

    fn clear_unordered_access_view_uint(&self, uav: ResourceView, values: &[u32; 4], rects: &[Rect]) {
        if !rects.is_empty() {
            debug!("Direct3D 11 clears whole unordered access views");
        }
        let Some(view) = object::<ID3D11UnorderedAccessView>(uav.raw()) else {
            debug!("clear of unknown unordered access view {uav:?}");
            return;
        };
        passthrough::call(|| unsafe { self.cx().ClearUnorderedAccessViewUint(&view, values) });
    }

    fn clear_unordered_access_view_float(&self, uav: ResourceView, values: &[f32; 4], rects: &[Rect]) {
        if !rects.is_empty() {
            debug!("Direct3D 11 clears whole unordered access views");
        }
        let Some(view) = object::<ID3D11UnorderedAccessView>(uav.raw()) else {
            debug!("clear of unknown unordered access view {uav:?}");
            return;
        };
        passthrough::call(|| unsafe { self.cx().ClearUnorderedAccessViewFloat(&view, values) });
    }

    fn generate_mipmaps(&self, srv: ResourceView) {
        let Some(view) = object::<ID3D11ShaderResourceView>(srv.raw()) else {
            debug!("mipmap generation of unknown view {srv:?}");
            return;
        };
        passthrough::call(|| unsafe { self.cx().GenerateMips(&view) });
    }

    fn begin_query(&self, pool: QueryPool, ty: QueryType, index: u32) {
        if ty == QueryType::Timestamp {
            return;
        }
        if let Some(query) = self.query(pool, index) {
            passthrough::call(|| unsafe { self.cx().Begin(&query) });
        }
    }

    fn end_query(&self, pool: QueryPool, _ty: QueryType, index: u32) {
        if let Some(query) = self.query(pool, index) {
            passthrough::call(|| unsafe { self.cx().End(&query) });
        }
    }

    fn begin_debug_event(&self, label: &str, _color: [f32; 4]) {
        if let Some(annotation) = &self.annotation {
            unsafe { annotation.BeginEvent(&HSTRING::from(label)) };
        }
    }

    fn end_debug_event(&self) {
        if let Some(annotation) = &self.annotation {
            unsafe { annotation.EndEvent() };
        }
    }

    fn insert_debug_marker(&self, label: &str, _color: [f32; 4]) {
        if let Some(annotation) = &self.annotation {
            unsafe { annotation.SetMarker(&HSTRING::from(label)) };
        }
    }
}

impl CommandQueue for CommandListImpl {
    fn queue_type(&self) -> QueueType {
        QueueType::GRAPHICS | QueueType::COMPUTE | QueueType::COPY
    }

    fn immediate_command_list(&self) -> Option<&dyn CommandList> {
        Some(self)
    }

    fn flush_immediate_command_list(&self) {
        passthrough::call(|| unsafe { self.cx().Flush() });
    }

    fn wait_idle(&self) {
        Device::wait_idle(&*self.device);
    }
}
