//! Effect runtime.
//!
//! Loads effect files through an external [`EffectCompiler`] and renders the enabled techniques
//! onto the back buffer at every present, using nothing but the unified [`Device`] and
//! [`CommandList`] interfaces.
//!
//! Techniques refer to their effect by index and shared textures list the effects using them,
//! so nothing in here holds a reference into another collection.

pub mod cache;
pub mod compiler;
pub mod loader;

use core::sync::atomic::{AtomicBool, Ordering};
use std::{path::PathBuf, sync::Arc, thread};

use anyhow::Context;
use parking_lot::Mutex;
use scopeguard::ScopeGuard;
use tint_api::{
    CommandList, CommandQueue, DescriptorSet, DescriptorSetLayout, Device, DeviceCaps, Format,
    Pipeline, PipelineLayout, Resource, ResourceView, Sampler,
    descriptor::{
        ConstantRange, DescriptorRange, DescriptorSetUpdate, DescriptorType, Descriptors,
        PipelineLayoutParam,
    },
    pipeline::{
        GraphicsDesc, LoadOp, PipelineDesc, PipelineStage, Rect, RenderPassRenderTarget,
        ShaderDesc, ShaderStage, StoreOp, Viewport,
    },
    resource::{ResourceDesc, ResourceFlags, ResourceUsage, ResourceViewDesc},
};
use tint_event::{Event, Registry};
use tracing::{debug, error, info, warn};

use crate::config::EffectConfig;
use cache::EffectCache;
use compiler::{EffectCompiler, EffectModule, PassInfo, ShaderFormat, TechniqueInfo, TextureInfo};
use loader::{Discovered, LoadContext};

/// One loaded effect file.
#[derive(Debug)]
pub struct Effect {
    pub name: String,
    pub source_file: PathBuf,
    /// Hash of the preprocessed source.
    pub hash: u64,
    pub module: EffectModule,
    pub compiled: bool,
    pub errors: String,
    /// Number of enabled techniques of the effect.
    pub rendering: u32,
    objects: EffectObjects,
    uniform_data: Vec<u32>,
}

/// Device objects of an initialized effect.
#[derive(Debug, Default)]
struct EffectObjects {
    layout: PipelineLayout,
    set_layouts: Vec<DescriptorSetLayout>,
    sets: Vec<DescriptorSet>,
    samplers: Vec<Sampler>,
}

impl Effect {
    pub(crate) fn new(name: String, source_file: PathBuf) -> Self {
        Self {
            name,
            source_file,
            hash: 0,
            module: EffectModule::default(),
            compiled: false,
            errors: String::new(),
            rendering: 0,
            objects: EffectObjects::default(),
            uniform_data: Vec::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        !self.objects.layout.is_null()
    }
}

#[derive(Debug)]
pub struct Technique {
    pub name: String,
    pub effect_index: usize,
    pub enabled: bool,
    pub enabled_by_default: bool,
    pub passes: Vec<PassInfo>,
    /// One per pass once the effect is initialized.
    pub pipelines: Vec<Pipeline>,
}

impl Technique {
    pub(crate) fn new(effect_index: usize, info: &TechniqueInfo) -> Self {
        Self {
            name: info.name.clone(),
            effect_index,
            enabled: false,
            enabled_by_default: info.enabled_by_default,
            passes: info.passes.clone(),
            pipelines: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct Texture {
    pub info: TextureInfo,
    /// Effect that declared the texture first.
    pub effect_index: usize,
    /// Every effect using the texture. The texture is destroyed once this is empty.
    pub shared_by: Vec<usize>,
    pub resource: Resource,
    pub srv: ResourceView,
    pub srv_srgb: ResourceView,
    pub rtv: ResourceView,
}

impl Texture {
    pub(crate) fn new(effect_index: usize, info: TextureInfo) -> Self {
        Self {
            info,
            effect_index,
            shared_by: vec![effect_index],
            resource: Resource::NULL,
            srv: ResourceView::NULL,
            srv_srgb: ResourceView::NULL,
            rtv: ResourceView::NULL,
        }
    }

    fn used_by(&self, effect_index: usize) -> bool {
        self.shared_by.contains(&effect_index)
    }

    fn destroy(&mut self, device: &dyn Device) {
        for view in [self.srv, self.srv_srgb, self.rtv] {
            if !view.is_null() {
                device.destroy_resource_view(view);
            }
        }
        if !self.resource.is_null() {
            device.destroy_resource(self.resource);
        }

        self.resource = Resource::NULL;
        self.srv = ResourceView::NULL;
        self.srv_srgb = ResourceView::NULL;
        self.rtv = ResourceView::NULL;
    }
}

#[derive(Debug, Clone, Copy)]
struct BackBuffer {
    resource: Resource,
    rtv: ResourceView,
    rtv_srgb: ResourceView,
}

#[derive(Default)]
struct State {
    initialized: bool,
    width: u32,
    height: u32,
    format: Format,
    back_buffers: Vec<BackBuffer>,
    /// Copy of the back buffer effects sample from.
    back_buffer_copy: Resource,
    back_buffer_srv: ResourceView,
    back_buffer_srv_srgb: ResourceView,
    effects: Vec<Effect>,
    techniques: Vec<Technique>,
    textures: Vec<Texture>,
    frame_count: u64,
}

pub struct EffectRuntime {
    id: u64,
    device: Arc<dyn Device>,
    queue: Arc<dyn CommandQueue>,
    compiler: Option<Arc<dyn EffectCompiler>>,
    format: ShaderFormat,
    config: EffectConfig,
    cache: Option<EffectCache>,
    effects_enabled: AtomicBool,
    abort: AtomicBool,
    state: Mutex<State>,
}

impl EffectRuntime {
    /// Runtime identified by `id`, the raw swapchain handle it presents to.
    pub fn new(
        id: u64,
        device: Arc<dyn Device>,
        queue: Arc<dyn CommandQueue>,
        compiler: Option<Arc<dyn EffectCompiler>>,
        format: ShaderFormat,
        config: &EffectConfig,
    ) -> Self {
        let cache = config
            .cache_dir
            .as_ref()
            .and_then(|dir| match EffectCache::new(dir) {
                Ok(cache) => Some(cache),
                Err(err) => {
                    warn!("effect cache disabled. err: {err:?}");
                    None
                }
            });

        Self {
            id,
            device,
            queue,
            compiler,
            format,
            config: config.clone(),
            cache,
            effects_enabled: AtomicBool::new(true),
            abort: AtomicBool::new(false),
            state: Mutex::new(State::default()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device(&self) -> &dyn Device {
        &*self.device
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn set_effects_enabled(&self, enabled: bool) {
        self.effects_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn back_buffer_size(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.width, state.height)
    }

    /// Sets up rendering onto `back_buffers`, which all share one description.
    pub fn on_init(&self, registry: &Registry, back_buffers: &[Resource]) -> anyhow::Result<()> {
        let device = &*self.device;
        let Some(&first) = back_buffers.first() else {
            anyhow::bail!("swapchain without buffers");
        };
        let desc = device
            .get_resource_desc(first)
            .context("back buffer is not a known resource")?;
        let (width, height, _) = desc.extent();

        let mut state = self.state.lock();
        if state.initialized {
            drop(state);
            self.on_reset(registry);
            state = self.state.lock();
        }
        // Partially created objects are released if any step fails
        let mut state = scopeguard::guard(state, |mut state| release_back_buffers(device, &mut state));

        for &resource in back_buffers {
            let rtv = create_view(device, resource, ResourceUsage::RENDER_TARGET, &desc, desc.format.default_typed())
                .context("cannot create back buffer view")?;
            let rtv = scopeguard::guard(rtv, |rtv| device.destroy_resource_view(rtv));
            let rtv_srgb = create_view(
                device,
                resource,
                ResourceUsage::RENDER_TARGET,
                &desc,
                desc.format.default_typed_srgb(),
            )
            .context("cannot create back buffer sRGB view")?;
            state.back_buffers.push(BackBuffer {
                resource,
                rtv: ScopeGuard::into_inner(rtv),
                rtv_srgb,
            });
        }

        let copy_desc = ResourceDesc {
            format: desc.format.typeless(),
            usage: ResourceUsage::SHADER_RESOURCE | ResourceUsage::COPY_DEST,
            flags: ResourceFlags::empty(),
            ..ResourceDesc::texture_2d(width, height, 1, desc.format, desc.heap, desc.usage)
        };
        state.back_buffer_copy = device
            .create_resource(&copy_desc, None, ResourceUsage::SHADER_RESOURCE)
            .context("cannot create back buffer copy")?;
        state.back_buffer_srv = create_view(
            device,
            state.back_buffer_copy,
            ResourceUsage::SHADER_RESOURCE,
            &copy_desc,
            desc.format.default_typed(),
        )?;
        state.back_buffer_srv_srgb = create_view(
            device,
            state.back_buffer_copy,
            ResourceUsage::SHADER_RESOURCE,
            &copy_desc,
            desc.format.default_typed_srgb(),
        )?;

        state.width = width;
        state.height = height;
        state.format = desc.format;
        state.frame_count = 0;
        state.initialized = true;
        self.abort.store(false, Ordering::Release);
        drop(ScopeGuard::into_inner(state));

        registry.dispatch(&mut Event::InitEffectRuntime {
            device,
            runtime: self.id,
        });
        info!("effect runtime {:#x} initialized at {width}x{height}", self.id);
        Ok(())
    }

    /// Unloads every effect and releases the back buffer objects.
    pub fn on_reset(&self, registry: &Registry) {
        self.abort.store(true, Ordering::Release);

        let device = &*self.device;
        let mut state = self.state.lock();
        if !state.initialized {
            return;
        }

        state.initialized = false;
        device.wait_idle();
        unload_all(device, &mut state);
        release_back_buffers(device, &mut state);
        drop(state);

        registry.dispatch(&mut Event::DestroyEffectRuntime {
            device,
            runtime: self.id,
        });
        info!("effect runtime {:#x} destroyed", self.id);
    }

    /// Renders the enabled techniques into back buffer `index`.
    ///
    /// The first present loads the effects.
    pub fn on_present(&self, registry: &Registry, index: usize) {
        let first_frame = {
            let mut state = self.state.lock();
            if !state.initialized {
                return;
            }
            state.frame_count += 1;
            state.frame_count == 1
        };
        if first_frame {
            self.load_effects();
        }

        if !self.effects_enabled.load(Ordering::Relaxed) {
            return;
        }

        let Some(cmd_list) = self.queue.immediate_command_list() else {
            return;
        };

        let state = self.state.lock();
        let Some(&back_buffer) = state.back_buffers.get(index) else {
            warn!("back buffer {index} is unknown to runtime {:#x}", self.id);
            return;
        };
        if !state.techniques.iter().any(|technique| technique.enabled) {
            return;
        }

        let present = [ResourceUsage::PRESENT];
        let render_target = [ResourceUsage::RENDER_TARGET];
        cmd_list.barrier(&[back_buffer.resource], &present, &render_target);

        registry.dispatch(&mut Event::BeginEffects {
            runtime: self.id,
            cmd_list,
            rtv: back_buffer.rtv,
            rtv_srgb: back_buffer.rtv_srgb,
        });

        for technique in state.techniques.iter().filter(|technique| technique.enabled) {
            render_technique(&state, technique, cmd_list, &back_buffer);
        }

        registry.dispatch(&mut Event::FinishEffects {
            runtime: self.id,
            cmd_list,
            rtv: back_buffer.rtv,
            rtv_srgb: back_buffer.rtv_srgb,
        });

        cmd_list.barrier(&[back_buffer.resource], &render_target, &present);
        drop(state);

        self.queue.flush_immediate_command_list();
    }

    /// Compiles every effect in the search paths. Returns the number of effects that compiled.
    pub fn load_effects(&self) -> usize {
        let Some(compiler) = self.compiler.as_deref() else {
            debug!("no effect compiler available");
            return 0;
        };

        let files = loader::find_effect_files(&self.config.search_paths);
        if files.is_empty() {
            return 0;
        }

        let offset = self.state.lock().effects.len();
        let available = thread::available_parallelism().map_or(1, |count| count.get());
        let workers = self.config.compile_threads(available);

        let ctx = LoadContext {
            compiler,
            format: self.format,
            definitions: &self.config.preprocessor_definitions,
            cache: self.cache.as_ref(),
            abort: &self.abort,
        };
        let discovered = Mutex::new(Discovered::default());
        let loaded = loader::load_effects(&ctx, &files, offset, workers, &discovered);
        let discovered = discovered.into_inner();

        let mut state = self.state.lock();
        if !state.initialized || state.effects.len() != offset {
            debug!("discarding effects loaded for a reset runtime");
            return 0;
        }

        let mut compiled = 0;
        for (effect, path) in loaded.into_iter().zip(files) {
            let effect = effect.unwrap_or_else(|| {
                let name = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Effect::new(name, path)
            });
            compiled += usize::from(effect.compiled);
            state.effects.push(effect);
        }
        merge_textures(&mut state.textures, discovered.textures);
        state.techniques.extend(discovered.techniques);

        let defaults: Vec<usize> = state
            .techniques
            .iter()
            .enumerate()
            .filter(|(_, technique)| technique.enabled_by_default && !technique.enabled)
            .map(|(index, _)| index)
            .collect();
        for index in defaults {
            enable(&*self.device, &mut state, index);
        }

        info!("loaded {compiled} of {} effects", state.effects.len() - offset);
        compiled
    }

    pub fn reload_effects(&self) -> usize {
        self.unload_effects();
        self.load_effects()
    }

    pub fn unload_effects(&self) {
        let mut state = self.state.lock();
        self.device.wait_idle();
        unload_all(&*self.device, &mut state);
    }

    /// Releases the objects of one effect. Its techniques are removed, its slot stays.
    pub fn unload_effect(&self, effect_index: usize) {
        let mut state = self.state.lock();
        if effect_index >= state.effects.len() {
            return;
        }

        self.device.wait_idle();
        unload_one(&*self.device, &mut state, effect_index);
    }

    pub fn find_technique(&self, name: &str) -> Option<usize> {
        self.state
            .lock()
            .techniques
            .iter()
            .position(|technique| technique.name == name)
    }

    /// Enables a technique, initializing its effect on first use.
    ///
    /// Returns `false` if the effect failed to compile or initialize.
    pub fn enable_technique(&self, index: usize) -> bool {
        let mut state = self.state.lock();
        enable(&*self.device, &mut state, index)
    }

    /// Disables a technique. Effect objects stay alive until the effect is unloaded.
    pub fn disable_technique(&self, index: usize) {
        let mut state = self.state.lock();
        let Some(technique) = state.techniques.get_mut(index) else {
            return;
        };

        if technique.enabled {
            technique.enabled = false;
            let effect_index = technique.effect_index;
            let effect = &mut state.effects[effect_index];
            effect.rendering = effect.rendering.saturating_sub(1);
        }
    }

    pub fn is_technique_enabled(&self, index: usize) -> bool {
        self.state
            .lock()
            .techniques
            .get(index)
            .is_some_and(|technique| technique.enabled)
    }

    /// Pipelines of a technique, empty before its effect is initialized.
    pub fn technique_pipelines(&self, index: usize) -> Vec<Pipeline> {
        self.state
            .lock()
            .techniques
            .get(index)
            .map(|technique| technique.pipelines.clone())
            .unwrap_or_default()
    }

    pub fn effect_rendering(&self, effect_index: usize) -> Option<u32> {
        self.state
            .lock()
            .effects
            .get(effect_index)
            .map(|effect| effect.rendering)
    }

    pub fn effect_errors(&self, effect_index: usize) -> Option<String> {
        self.state
            .lock()
            .effects
            .get(effect_index)
            .map(|effect| effect.errors.clone())
    }

    pub fn effect_count(&self) -> usize {
        self.state.lock().effects.len()
    }

    pub fn clear_effect_cache(&self) -> anyhow::Result<usize> {
        match &self.cache {
            Some(cache) => cache.clear(),
            None => Ok(0),
        }
    }
}

fn create_view(
    device: &dyn Device,
    resource: Resource,
    usage: ResourceUsage,
    desc: &ResourceDesc,
    format: Format,
) -> anyhow::Result<ResourceView> {
    let view = ResourceViewDesc {
        format,
        ..ResourceViewDesc::whole(desc)
    };
    Ok(device.create_resource_view(resource, usage, &view)?)
}

/// Adds newly discovered textures, merging shared ones that already exist.
fn merge_textures(textures: &mut Vec<Texture>, discovered: Vec<Texture>) {
    for texture in discovered {
        match textures
            .iter_mut()
            .find(|existing| existing.info.unique_name == texture.info.unique_name)
        {
            Some(existing) if existing.info.shared && texture.info.shared => {
                for effect_index in texture.shared_by {
                    if !existing.shared_by.contains(&effect_index) {
                        existing.shared_by.push(effect_index);
                    }
                }
            }
            Some(_) => warn!("texture {} declared twice", texture.info.unique_name),
            None => textures.push(texture),
        }
    }
}

fn enable(device: &dyn Device, state: &mut State, index: usize) -> bool {
    let Some(effect_index) = state.techniques.get(index).map(|technique| technique.effect_index) else {
        return false;
    };
    if !state.effects[effect_index].compiled {
        return false;
    }

    if !state.effects[effect_index].is_initialized() {
        if let Err(err) = init_effect(device, state, effect_index) {
            error!("failed to initialize {}. err: {err:?}", state.effects[effect_index].name);
            let effect = &mut state.effects[effect_index];
            effect.compiled = false;
            effect.errors = format!("{err:#}");
            return false;
        }
    }

    let technique = &mut state.techniques[index];
    if !technique.enabled {
        technique.enabled = true;
        state.effects[effect_index].rendering += 1;
    }
    true
}

/// Creates textures, layout, descriptor sets and pipelines of an effect.
fn init_effect(device: &dyn Device, state: &mut State, effect_index: usize) -> anyhow::Result<()> {
    for texture in state
        .textures
        .iter_mut()
        .filter(|texture| texture.used_by(effect_index) && !texture.info.is_back_buffer())
    {
        if texture.resource.is_null() {
            init_texture(device, texture)
                .with_context(|| format!("cannot create texture {}", texture.info.unique_name))?;
        }
    }

    let module = &state.effects[effect_index].module;
    let sampler_with_view = device.check_capability(DeviceCaps::SamplerWithResourceView);
    let sampler_count = module.samplers.len() as u32;
    let mut params = vec![PipelineLayoutParam::PushConstants(ConstantRange {
        offset: 0,
        dx_register_index: 0,
        dx_register_space: 0,
        count: module.uniform_size.div_ceil(4),
        visibility: ShaderStage::ALL,
    })];
    let mut tables = Vec::new();
    if sampler_count > 0 {
        if sampler_with_view {
            tables.push(table_range(DescriptorType::SamplerWithResourceView, sampler_count));
        } else {
            tables.push(table_range(DescriptorType::Sampler, sampler_count));
            tables.push(table_range(DescriptorType::ShaderResourceView, sampler_count));
        }
    }
    if !module.storages.is_empty() {
        tables.push(table_range(
            DescriptorType::UnorderedAccessView,
            module.storages.len() as u32,
        ));
    }
    params.extend(
        tables
            .iter()
            .map(|range| PipelineLayoutParam::DescriptorTable(vec![*range])),
    );

    let mut objects = EffectObjects::default();
    if let Err(err) = create_effect_objects(device, state, effect_index, &params, &tables, &mut objects) {
        destroy_effect_objects(device, &mut objects);
        return Err(err);
    }

    let effect = &mut state.effects[effect_index];
    let mut uniform_data = vec![0u32; effect.module.uniform_size.div_ceil(4) as usize];
    {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut uniform_data);
        for uniform in &effect.module.uniforms {
            let start = uniform.offset as usize;
            let len = uniform.initializer.len().min(uniform.size as usize);
            if let Some(dst) = bytes.get_mut(start..start + len) {
                dst.copy_from_slice(&uniform.initializer[..len]);
            }
        }
    }
    effect.uniform_data = uniform_data;
    effect.objects = objects;
    debug!("effect {} initialized", effect.name);
    Ok(())
}

fn table_range(ty: DescriptorType, count: u32) -> DescriptorRange {
    DescriptorRange {
        binding: 0,
        dx_register_index: 0,
        dx_register_space: 0,
        count,
        visibility: ShaderStage::ALL,
        ty,
    }
}

fn init_texture(device: &dyn Device, texture: &mut Texture) -> anyhow::Result<()> {
    let mut desc = texture.info.desc;
    let format = desc.format;
    desc.format = format.typeless();
    desc.usage |= ResourceUsage::SHADER_RESOURCE | ResourceUsage::COPY_DEST;
    // Shared textures may be a render target in another effect
    if texture.info.shared {
        desc.usage |= ResourceUsage::RENDER_TARGET;
    }
    if desc.levels() > 1 {
        desc.flags |= ResourceFlags::GENERATE_MIPMAPS;
    }

    texture.resource = device.create_resource(&desc, None, ResourceUsage::SHADER_RESOURCE)?;
    let result = (|| {
        texture.srv = create_view(
            device,
            texture.resource,
            ResourceUsage::SHADER_RESOURCE,
            &desc,
            format.default_typed(),
        )?;
        texture.srv_srgb = if format.default_typed_srgb() == format.default_typed() {
            ResourceView::NULL
        } else {
            create_view(
                device,
                texture.resource,
                ResourceUsage::SHADER_RESOURCE,
                &desc,
                format.default_typed_srgb(),
            )?
        };
        if desc.usage.contains(ResourceUsage::RENDER_TARGET) {
            texture.rtv = create_view(
                device,
                texture.resource,
                ResourceUsage::RENDER_TARGET,
                &desc,
                format.default_typed(),
            )?;
        }
        anyhow::Ok(())
    })();

    if result.is_err() {
        texture.destroy(device);
    }
    result
}

fn create_effect_objects(
    device: &dyn Device,
    state: &mut State,
    effect_index: usize,
    params: &[PipelineLayoutParam],
    tables: &[DescriptorRange],
    objects: &mut EffectObjects,
) -> anyhow::Result<()> {
    let module = &state.effects[effect_index].module;

    for sampler in &module.samplers {
        objects.samplers.push(device.create_sampler(&sampler.desc)?);
    }

    for range in tables {
        let layout = device.create_descriptor_set_layout(core::slice::from_ref(range), false)?;
        objects.set_layouts.push(layout);
        objects.sets.extend(device.create_descriptor_sets(layout, 1)?);
    }

    let texture_view = |name: &str, srgb: bool| {
        if let Some(texture) = state
            .textures
            .iter()
            .find(|texture| texture.info.unique_name == name)
        {
            if texture.info.is_back_buffer() {
                return if srgb {
                    state.back_buffer_srv_srgb
                } else {
                    state.back_buffer_srv
                };
            }
            if srgb && !texture.srv_srgb.is_null() {
                return texture.srv_srgb;
            }
            return texture.srv;
        }
        ResourceView::NULL
    };
    let views: Vec<ResourceView> = module
        .samplers
        .iter()
        .map(|sampler| texture_view(&sampler.texture_name, sampler.srgb))
        .collect();
    let storages: Vec<ResourceView> = module
        .storages
        .iter()
        .map(|storage| texture_view(&storage.texture_name, false))
        .collect();
    let pairs: Vec<(Sampler, ResourceView)> = objects
        .samplers
        .iter()
        .copied()
        .zip(views.iter().copied())
        .collect();

    let mut updates = Vec::new();
    for (range, &set) in tables.iter().zip(&objects.sets) {
        let descriptors = match range.ty {
            DescriptorType::SamplerWithResourceView => Descriptors::SamplersWithViews(&pairs),
            DescriptorType::Sampler => Descriptors::Samplers(&objects.samplers),
            DescriptorType::ShaderResourceView => Descriptors::ShaderResourceViews(&views),
            DescriptorType::UnorderedAccessView => Descriptors::UnorderedAccessViews(&storages),
            DescriptorType::ConstantBuffer => continue,
        };
        updates.push(DescriptorSetUpdate {
            set,
            binding: 0,
            array_offset: 0,
            descriptors,
        });
    }
    device.update_descriptor_sets(&updates);

    objects.layout = device.create_pipeline_layout(params)?;

    let mut created: Vec<(usize, Vec<Pipeline>)> = Vec::new();
    let result = (|| {
        for (technique_index, technique) in state
            .techniques
            .iter()
            .enumerate()
            .filter(|(_, technique)| technique.effect_index == effect_index)
        {
            let mut pipelines = Vec::with_capacity(technique.passes.len());
            created.push((technique_index, Vec::new()));
            for pass in &technique.passes {
                let pipeline = create_pass_pipeline(device, state, module, objects.layout, pass)
                    .with_context(|| format!("technique {} pass {}", technique.name, pass.name));
                match pipeline {
                    Ok(pipeline) => pipelines.push(pipeline),
                    Err(err) => {
                        for pipeline in pipelines {
                            device.destroy_pipeline(pipeline);
                        }
                        return Err(err);
                    }
                }
            }
            if let Some(last) = created.last_mut() {
                last.1 = pipelines;
            }
        }
        anyhow::Ok(())
    })();

    if let Err(err) = result {
        for pipeline in created.into_iter().flat_map(|(_, pipelines)| pipelines) {
            device.destroy_pipeline(pipeline);
        }
        return Err(err);
    }

    for (technique_index, pipelines) in created {
        state.techniques[technique_index].pipelines = pipelines;
    }
    Ok(())
}

fn create_pass_pipeline(
    device: &dyn Device,
    state: &State,
    module: &EffectModule,
    layout: PipelineLayout,
    pass: &PassInfo,
) -> anyhow::Result<Pipeline> {
    let shader = |name: &str| pass_shader(module, name);

    if pass.is_compute() {
        let desc = PipelineDesc::Compute(shader(&pass.cs_entry_point)?);
        return Ok(device.create_pipeline(layout, &desc)?);
    }

    let mut graphics = GraphicsDesc {
        vertex_shader: Some(shader(&pass.vs_entry_point)?),
        pixel_shader: Some(shader(&pass.ps_entry_point)?),
        blend_state: pass.blend,
        topology: pass.topology,
        ..GraphicsDesc::default()
    };

    if pass.render_targets.is_empty() {
        graphics.render_target_formats[0] = if pass.srgb_write_enable {
            state.format.default_typed_srgb()
        } else {
            state.format.default_typed()
        };
    } else {
        for (slot, name) in graphics
            .render_target_formats
            .iter_mut()
            .zip(&pass.render_targets)
        {
            let texture = state
                .textures
                .iter()
                .find(|texture| &texture.info.unique_name == name)
                .with_context(|| format!("unknown render target {name}"))?;
            *slot = texture.info.desc.format.default_typed();
        }
    }

    Ok(device.create_pipeline(layout, &PipelineDesc::Graphics(Box::new(graphics)))?)
}

fn pass_shader<'a>(module: &'a EffectModule, name: &str) -> anyhow::Result<ShaderDesc<'a>> {
    let entry = module
        .entry_point(name)
        .with_context(|| format!("missing entry point {name}"))?;
    Ok(ShaderDesc {
        code: &entry.code,
        entry_point: Some(&entry.name),
    })
}

fn destroy_effect_objects(device: &dyn Device, objects: &mut EffectObjects) {
    if !objects.sets.is_empty() {
        device.destroy_descriptor_sets(&objects.sets);
    }
    for layout in objects.set_layouts.drain(..) {
        device.destroy_descriptor_set_layout(layout);
    }
    for sampler in objects.samplers.drain(..) {
        device.destroy_sampler(sampler);
    }
    if !objects.layout.is_null() {
        device.destroy_pipeline_layout(objects.layout);
    }
    *objects = EffectObjects::default();
}

fn unload_one(device: &dyn Device, state: &mut State, effect_index: usize) {
    for technique in state
        .techniques
        .iter_mut()
        .filter(|technique| technique.effect_index == effect_index)
    {
        for pipeline in technique.pipelines.drain(..) {
            device.destroy_pipeline(pipeline);
        }
    }
    state
        .techniques
        .retain(|technique| technique.effect_index != effect_index);

    state.textures.retain_mut(|texture| {
        texture.shared_by.retain(|&index| index != effect_index);
        if texture.shared_by.is_empty() {
            texture.destroy(device);
            return false;
        }
        true
    });

    let effect = &mut state.effects[effect_index];
    destroy_effect_objects(device, &mut effect.objects);
    effect.uniform_data.clear();
    effect.rendering = 0;
    debug!("effect {} unloaded", effect.name);
}

/// Destroys the back buffer views and copy, leaving `state` uninitialized.
fn release_back_buffers(device: &dyn Device, state: &mut State) {
    for back_buffer in state.back_buffers.drain(..) {
        device.destroy_resource_view(back_buffer.rtv);
        device.destroy_resource_view(back_buffer.rtv_srgb);
    }
    device.destroy_resource_view(state.back_buffer_srv);
    device.destroy_resource_view(state.back_buffer_srv_srgb);
    device.destroy_resource(state.back_buffer_copy);
    *state = State::default();
}

fn unload_all(device: &dyn Device, state: &mut State) {
    for index in 0..state.effects.len() {
        unload_one(device, state, index);
    }
    state.effects.clear();
    state.techniques.clear();
    for mut texture in state.textures.drain(..) {
        texture.destroy(device);
    }
}

fn render_technique(
    state: &State,
    technique: &Technique,
    cmd_list: &dyn CommandList,
    back_buffer: &BackBuffer,
) {
    let effect = &state.effects[technique.effect_index];
    if technique.pipelines.len() != technique.passes.len() {
        return;
    }

    cmd_list.begin_debug_event(&technique.name, [1.0, 0.8, 0.8, 1.0]);

    let layout = effect.objects.layout;
    if !effect.uniform_data.is_empty() {
        cmd_list.push_constants(ShaderStage::ALL, layout, 0, 0, &effect.uniform_data);
    }
    if !effect.objects.sets.is_empty() {
        cmd_list.bind_descriptor_sets(ShaderStage::ALL_GRAPHICS, layout, 1, &effect.objects.sets);
    }

    let copy_resources = [back_buffer.resource, state.back_buffer_copy];
    let copy_old = [ResourceUsage::RENDER_TARGET, ResourceUsage::SHADER_RESOURCE];
    let copy_new = [ResourceUsage::COPY_SOURCE, ResourceUsage::COPY_DEST];
    let mut needs_back_buffer_copy = true;

    for (pass, &pipeline) in technique.passes.iter().zip(&technique.pipelines) {
        if needs_back_buffer_copy {
            cmd_list.barrier(&copy_resources, &copy_old, &copy_new);
            cmd_list.copy_resource(back_buffer.resource, state.back_buffer_copy);
            cmd_list.barrier(&copy_resources, &copy_new, &copy_old);
        }

        let (width, height) = match (pass.viewport_width, pass.viewport_height) {
            (0, _) | (_, 0) => (state.width, state.height),
            size => size,
        };

        if pass.is_compute() {
            needs_back_buffer_copy = false;
            cmd_list.bind_pipeline(PipelineStage::COMPUTE_SHADER, pipeline);
            if !effect.objects.sets.is_empty() {
                cmd_list.bind_descriptor_sets(ShaderStage::COMPUTE, layout, 1, &effect.objects.sets);
            }
            cmd_list.dispatch(width, height, pass.viewport_dispatch_z);
            continue;
        }

        cmd_list.bind_pipeline(PipelineStage::ALL_GRAPHICS, pipeline);

        let targets: Vec<&Texture> = pass
            .render_targets
            .iter()
            .filter_map(|name| {
                state
                    .textures
                    .iter()
                    .find(|texture| &texture.info.unique_name == name)
            })
            .collect();
        let views: Vec<ResourceView> = if pass.render_targets.is_empty() {
            needs_back_buffer_copy = true;
            vec![if pass.srgb_write_enable {
                back_buffer.rtv_srgb
            } else {
                back_buffer.rtv
            }]
        } else {
            needs_back_buffer_copy = false;
            targets.iter().map(|texture| texture.rtv).collect()
        };
        let resources: Vec<Resource> = targets.iter().map(|texture| texture.resource).collect();
        let shader_resource = vec![ResourceUsage::SHADER_RESOURCE; resources.len()];
        let render_target = vec![ResourceUsage::RENDER_TARGET; resources.len()];
        if !resources.is_empty() {
            cmd_list.barrier(&resources, &shader_resource, &render_target);
        }

        let color = [0.0; 4];
        if pass.clear_render_targets {
            for &view in &views {
                cmd_list.clear_render_target_view(view, &color, &[]);
            }
        }

        let render_targets: Vec<RenderPassRenderTarget> = views
            .iter()
            .map(|&view| RenderPassRenderTarget {
                view,
                load_op: LoadOp::Load,
                store_op: StoreOp::Store,
                clear_color: color,
            })
            .collect();
        cmd_list.begin_render_pass(&render_targets, None);
        cmd_list.bind_viewports(
            0,
            &[Viewport {
                x: 0.0,
                y: 0.0,
                width: width as f32,
                height: height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            }],
        );
        cmd_list.bind_scissor_rects(
            0,
            &[Rect {
                left: 0,
                top: 0,
                right: width as i32,
                bottom: height as i32,
            }],
        );
        cmd_list.draw(pass.num_vertices, 1, 0, 0);
        cmd_list.finish_render_pass();

        if !resources.is_empty() {
            cmd_list.barrier(&resources, &render_target, &shader_resource);
        }

        if pass.generate_mipmaps {
            for texture in targets.iter().filter(|texture| texture.info.desc.levels() > 1) {
                cmd_list.generate_mipmaps(texture.srv);
            }
        }
    }

    cmd_list.end_debug_event();
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tint_api::{
        AnyHandle,
        resource::{MemoryHeap, ResourceDimension},
    };

    use super::*;
    use crate::{
        config::Config,
        testing::{NullDevice, RecordingQueue},
    };
    use compiler::{CompileError, EntryPoint, SamplerInfo};

    struct FakeCompiler;

    impl EffectCompiler for FakeCompiler {
        fn compile(
            &self,
            source: &str,
            _stages: ShaderStage,
            _format: ShaderFormat,
        ) -> Result<EffectModule, CompileError> {
            if source.contains("syntax error") {
                return Err(CompileError::Source("line 1: syntax error".to_string()));
            }

            let entry = |name: &str, stage| EntryPoint {
                name: name.to_string(),
                stage,
                code: vec![0x03, 0x02, 0x23, 0x07],
                disassembly: String::new(),
            };
            let technique = |name: &str| TechniqueInfo {
                name: name.to_string(),
                enabled_by_default: false,
                passes: vec![PassInfo {
                    name: "Main".to_string(),
                    vs_entry_point: "VS".to_string(),
                    ps_entry_point: "PS".to_string(),
                    ..PassInfo::default()
                }],
            };

            Ok(EffectModule {
                entry_points: vec![entry("VS", ShaderStage::VERTEX), entry("PS", ShaderStage::PIXEL)],
                textures: vec![
                    TextureInfo {
                        unique_name: "BackBuffer".to_string(),
                        desc: ResourceDesc::texture_2d(
                            0,
                            0,
                            1,
                            Format::Unknown,
                            MemoryHeap::GpuOnly,
                            ResourceUsage::SHADER_RESOURCE,
                        ),
                        semantic: Some("COLOR".to_string()),
                        shared: true,
                    },
                    TextureInfo {
                        unique_name: "Noise".to_string(),
                        desc: ResourceDesc::texture_2d(
                            64,
                            64,
                            1,
                            Format::R8G8B8A8Unorm,
                            MemoryHeap::GpuOnly,
                            ResourceUsage::SHADER_RESOURCE,
                        ),
                        semantic: None,
                        shared: true,
                    },
                ],
                samplers: vec![SamplerInfo {
                    binding: 0,
                    texture_name: "BackBuffer".to_string(),
                    desc: Default::default(),
                    srgb: false,
                }],
                techniques: vec![technique("Sharpen"), technique("Vignette")],
                uniform_size: 16,
                ..EffectModule::default()
            })
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        device: Arc<NullDevice>,
        queue: Arc<RecordingQueue>,
        runtime: EffectRuntime,
        back_buffer: Resource,
    }

    fn fixture(files: &[(&str, &str)]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        for (name, source) in files {
            fs::write(dir.path().join(name), source).unwrap();
        }

        let device = Arc::new(NullDevice::default());
        let queue = Arc::new(RecordingQueue::default());
        let back_buffer = device
            .create_resource(
                &ResourceDesc::texture_2d(
                    1280,
                    720,
                    1,
                    Format::B8G8R8A8Unorm,
                    MemoryHeap::GpuOnly,
                    ResourceUsage::RENDER_TARGET,
                ),
                None,
                ResourceUsage::PRESENT,
            )
            .unwrap();

        let config = Config::default().effects;
        let config = EffectConfig {
            search_paths: vec![dir.path().to_path_buf()],
            cache_dir: Some(dir.path().join("cache")),
            max_compile_threads: 2,
            ..config
        };
        let runtime = EffectRuntime::new(
            0x5c,
            device.clone(),
            queue.clone(),
            Some(Arc::new(FakeCompiler)),
            ShaderFormat::SpirV,
            &config,
        );

        let registry = Registry::new();
        runtime.on_init(&registry, &[back_buffer]).unwrap();

        Fixture {
            _dir: dir,
            device,
            queue,
            runtime,
            back_buffer,
        }
    }

    #[test]
    fn disabling_last_technique_keeps_pipelines() {
        let fixture = fixture(&[("Sharpen.fx", "// sharpen")]);
        let runtime = &fixture.runtime;
        assert_eq!(runtime.load_effects(), 1);

        let sharpen = runtime.find_technique("Sharpen").unwrap();
        let vignette = runtime.find_technique("Vignette").unwrap();
        assert!(runtime.enable_technique(sharpen));
        assert!(runtime.enable_technique(vignette));
        assert_eq!(runtime.effect_rendering(0), Some(2));

        runtime.disable_technique(vignette);
        runtime.disable_technique(sharpen);
        assert_eq!(runtime.effect_rendering(0), Some(0));

        let pipelines = runtime.technique_pipelines(sharpen);
        assert_eq!(pipelines.len(), 1);
        assert!(fixture.device.is_valid(AnyHandle::Pipeline(pipelines[0])));

        assert!(runtime.enable_technique(sharpen));
        assert_eq!(runtime.effect_rendering(0), Some(1));
        assert_eq!(runtime.technique_pipelines(sharpen), pipelines);

        runtime.unload_effect(0);
        assert!(!fixture.device.is_valid(AnyHandle::Pipeline(pipelines[0])));
        assert_eq!(runtime.effect_rendering(0), Some(0));
        assert!(runtime.find_technique("Sharpen").is_none());
    }

    #[test]
    fn shared_texture_lives_until_last_user_unloads() {
        let fixture = fixture(&[("A.fx", "// a"), ("B.fx", "// b")]);
        let runtime = &fixture.runtime;
        assert_eq!(runtime.load_effects(), 2);

        {
            let state = runtime.state.lock();
            let noise = state
                .textures
                .iter()
                .find(|texture| texture.info.unique_name == "Noise")
                .unwrap();
            assert_eq!(noise.shared_by.len(), 2);
        }

        // Both effects declare a Sharpen technique
        let sharpen: Vec<usize> = {
            let state = runtime.state.lock();
            state
                .techniques
                .iter()
                .enumerate()
                .filter(|(_, technique)| technique.name == "Sharpen")
                .map(|(index, _)| index)
                .collect()
        };
        for &index in &sharpen {
            assert!(runtime.enable_technique(index));
        }

        let noise_resource = |runtime: &EffectRuntime| {
            runtime
                .state
                .lock()
                .textures
                .iter()
                .find(|texture| texture.info.unique_name == "Noise")
                .map(|texture| texture.resource)
        };
        let resource = noise_resource(runtime).unwrap();
        assert!(fixture.device.is_valid(AnyHandle::Resource(resource)));

        runtime.unload_effect(0);
        assert!(fixture.device.is_valid(AnyHandle::Resource(resource)));

        runtime.unload_effect(1);
        assert!(!fixture.device.is_valid(AnyHandle::Resource(resource)));
        assert_eq!(noise_resource(runtime), None);
    }

    #[test]
    fn failed_effect_keeps_its_errors() {
        let fixture = fixture(&[("Broken.fx", "syntax error"), ("Good.fx", "// ok")]);
        let runtime = &fixture.runtime;
        assert_eq!(runtime.load_effects(), 1);
        assert_eq!(runtime.effect_count(), 2);
        assert!(runtime.effect_errors(0).unwrap().contains("syntax error"));
        assert!(runtime.effect_errors(1).unwrap().is_empty());
    }

    #[test]
    fn present_renders_enabled_techniques() {
        let fixture = fixture(&[("Sharpen.fx", "// sharpen")]);
        let registry = Registry::new();
        let runtime = &fixture.runtime;

        // First present loads, nothing is enabled yet
        runtime.on_present(&registry, 0);
        assert!(fixture.queue.list.take().is_empty());

        let sharpen = runtime.find_technique("Sharpen").unwrap();
        assert!(runtime.enable_technique(sharpen));
        runtime.on_present(&registry, 0);

        let commands = fixture.queue.list.take();
        assert_eq!(
            commands,
            [
                "barrier",
                "push_constants",
                "bind_descriptor_sets",
                "barrier",
                "copy_resource",
                "barrier",
                "bind_pipeline",
                "begin_render_pass",
                "bind_viewports",
                "bind_scissor_rects",
                "draw",
                "finish_render_pass",
                "barrier",
            ]
        );
        assert_eq!(fixture.queue.flushes.load(Ordering::Relaxed), 1);

        runtime.set_effects_enabled(false);
        runtime.on_present(&registry, 0);
        assert!(fixture.queue.list.take().is_empty());
    }

    #[test]
    fn reset_releases_everything() {
        let fixture = fixture(&[("Sharpen.fx", "// sharpen")]);
        let runtime = &fixture.runtime;
        runtime.load_effects();
        let sharpen = runtime.find_technique("Sharpen").unwrap();
        assert!(runtime.enable_technique(sharpen));

        runtime.on_reset(&Registry::new());
        assert!(!runtime.is_initialized());

        let device = &fixture.device;
        assert_eq!(device.resources.keys(), vec![fixture.back_buffer.raw()]);
        assert!(device.views.is_empty());
        assert!(device.pipelines.is_empty());
        assert!(device.layouts.is_empty());
        assert!(device.samplers.is_empty());
        assert!(device.wait_idle_calls.load(Ordering::Relaxed) > 0);

        let desc = device.get_resource_desc(fixture.back_buffer).unwrap();
        assert!(matches!(desc.dimension, ResourceDimension::Texture2d { width: 1280, .. }));
    }

    #[test]
    fn failed_init_releases_partial_objects() {
        let fixture = fixture(&[]);
        let registry = Registry::new();
        let device = &fixture.device;
        fixture.runtime.on_reset(&registry);
        assert!(device.views.is_empty());
        assert_eq!(device.resources.len(), 1);

        assert!(
            fixture
                .runtime
                .on_init(&registry, &[fixture.back_buffer, Resource::from_raw(0xdead0)])
                .is_err()
        );
        assert!(device.views.is_empty());
        assert_eq!(device.resources.len(), 1);
        assert!(fixture.runtime.state.lock().back_buffers.is_empty());

        fixture.runtime.on_reset(&registry);
        assert!(device.views.is_empty());

        fixture.runtime.on_init(&registry, &[fixture.back_buffer]).unwrap();
        assert_eq!(fixture.runtime.state.lock().back_buffers.len(), 1);
    }
}
