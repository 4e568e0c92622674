//! Command queues and the submit/present hooks.
//!
//! Every graphics capable queue owns an immediate command list the layer records its own work
//! into. A present flushes that list so it waits on the application's semaphores and signals
//! the semaphore the present itself waits on.

use core::ffi::c_void;
use std::sync::Arc;

use ash::vk::{self, Handle};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use tint::map::IntDashMap;
use tint_api::{CommandList, CommandQueue, Error, Result, device::QueueType};
use tint_event::Event;
use tracing::{debug, error, trace};

use super::{CommandListImpl, DeviceImpl, command, render_pass::raw_slice, swapchain};
use crate::conv;

/// Queues of every managed device.
static QUEUE_MAP: Lazy<IntDashMap<u64, Arc<CommandQueueImpl>>> = Lazy::new(IntDashMap::default);

pub(crate) fn register_queue(queue: Arc<CommandQueueImpl>) {
    QUEUE_MAP.insert(queue.handle.as_raw(), queue);
}

#[inline]
pub(crate) fn get_queue(queue: vk::Queue) -> Option<Arc<CommandQueueImpl>> {
    QUEUE_MAP.get(&queue.as_raw()).map(|queue| queue.clone())
}

/// Removes and returns every queue of `device`.
pub(crate) fn unregister_device_queues(device: vk::Device) -> Vec<Arc<CommandQueueImpl>> {
    let mut removed = Vec::new();
    QUEUE_MAP.retain(|_, queue| {
        if queue.device.handle == device {
            removed.push(queue.clone());
            return false;
        }
        true
    });
    removed
}

pub(crate) fn queue_type(flags: vk::QueueFlags) -> QueueType {
    let mut ty = QueueType::empty();
    if flags.contains(vk::QueueFlags::GRAPHICS) {
        ty |= QueueType::GRAPHICS | QueueType::COPY;
    }
    if flags.contains(vk::QueueFlags::COMPUTE) {
        ty |= QueueType::COMPUTE | QueueType::COPY;
    }
    if flags.contains(vk::QueueFlags::TRANSFER) {
        ty |= QueueType::COPY;
    }
    ty
}

#[derive(Default)]
struct ImmediateState {
    recording: bool,
    /// A submission signals `fence` and nobody waited on it yet.
    pending: bool,
    /// Application semaphores of the present in progress, consumed by the next flush.
    present_waits: Option<Vec<vk::Semaphore>>,
    /// The flush during the present in progress signaled `semaphore`.
    signaled: bool,
}

struct Immediate {
    list: CommandListImpl,
    fence: vk::Fence,
    semaphore: vk::Semaphore,
    state: Mutex<ImmediateState>,
}

pub struct CommandQueueImpl {
    pub(crate) handle: vk::Queue,
    pub(crate) device: Arc<DeviceImpl>,
    pub(crate) family_index: u32,
    flags: vk::QueueFlags,
    immediate: OnceCell<Immediate>,
}

impl CommandQueueImpl {
    pub(crate) fn new(
        device: Arc<DeviceImpl>,
        handle: vk::Queue,
        family_index: u32,
        flags: vk::QueueFlags,
    ) -> Self {
        Self {
            handle,
            device,
            family_index,
            flags,
            immediate: OnceCell::new(),
        }
    }

    fn immediate(&self) -> Result<&Immediate> {
        if !self.flags.contains(vk::QueueFlags::GRAPHICS) {
            return Err(Error::Unsupported("immediate command list on a non graphics queue"));
        }

        self.immediate.get_or_try_init(|| self.create_immediate())
    }

    fn create_immediate(&self) -> Result<Immediate> {
        debug!("creating immediate command list for queue {:?}", self.handle);
        let fp = &self.device.fp;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(self.family_index);
        let pool = unsafe { fp.create_command_pool(&pool_info, None) }.map_err(conv::map_error)?;
        let pool = scopeguard::guard(pool, |pool| unsafe { fp.destroy_command_pool(pool, None) });

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { fp.allocate_command_buffers(&alloc_info) }.map_err(conv::map_error)?;
        let Some(&cmd) = buffers.first() else {
            return Err(Error::OutOfMemory);
        };
        // Dispatchable handles the layer allocates carry the device's loader dispatch pointer
        unsafe {
            *(cmd.as_raw() as *mut *const c_void) =
                *(self.device.handle.as_raw() as *const *const c_void);
        }

        let fence = unsafe { fp.create_fence(&vk::FenceCreateInfo::default(), None) }
            .map_err(conv::map_error)?;
        let fence = scopeguard::guard(fence, |fence| unsafe { fp.destroy_fence(fence, None) });
        let semaphore = unsafe { fp.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .map_err(conv::map_error)?;

        let list = CommandListImpl::new(
            self.device.clone(),
            cmd,
            scopeguard::ScopeGuard::into_inner(pool),
            vk::CommandBufferLevel::PRIMARY,
        );
        Ok(Immediate {
            list,
            fence: scopeguard::ScopeGuard::into_inner(fence),
            semaphore,
            state: Mutex::new(ImmediateState::default()),
        })
    }

    /// Starts recording unless already recording, waiting for the previous submission first.
    fn begin(&self, immediate: &Immediate, state: &mut ImmediateState) -> Result<()> {
        if state.recording {
            return Ok(());
        }

        let fp = &self.device.fp;
        unsafe {
            if state.pending {
                fp.wait_for_fences(&[immediate.fence], true, u64::MAX)
                    .map_err(conv::map_error)?;
                fp.reset_fences(&[immediate.fence]).map_err(conv::map_error)?;
                state.pending = false;
            }

            fp.reset_command_buffer(immediate.list.handle, vk::CommandBufferResetFlags::empty())
                .map_err(conv::map_error)?;
            let info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            fp.begin_command_buffer(immediate.list.handle, &info)
                .map_err(conv::map_error)?;
        }

        state.recording = true;
        Ok(())
    }

    fn flush(&self, immediate: &Immediate, state: &mut ImmediateState) -> Result<()> {
        if !state.recording {
            return Ok(());
        }
        state.recording = false;

        let fp = &self.device.fp;
        unsafe { fp.end_command_buffer(immediate.list.handle) }.map_err(conv::map_error)?;

        let waits = state.present_waits.take();
        let wait_semaphores = waits.as_deref().unwrap_or_default();
        let wait_stages = vec![vk::PipelineStageFlags::ALL_COMMANDS; wait_semaphores.len()];
        let signal = [immediate.semaphore];
        let buffers = [immediate.list.handle];
        let mut submit = vk::SubmitInfo::default()
            .command_buffers(&buffers)
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(&wait_stages);
        if waits.is_some() {
            submit = submit.signal_semaphores(&signal);
        }

        unsafe { fp.queue_submit(self.handle, &[submit], immediate.fence) }
            .map_err(conv::map_error)?;
        state.pending = true;
        state.signaled |= waits.is_some();
        Ok(())
    }

    /// Records through `f` on the immediate list and waits for the GPU to finish it.
    pub(crate) fn submit_immediate<R>(&self, f: impl FnOnce(&CommandListImpl) -> R) -> Result<R> {
        let immediate = self.immediate()?;
        let mut state = immediate.state.lock();
        self.begin(immediate, &mut state)?;
        let res = f(&immediate.list);
        self.flush(immediate, &mut state)?;

        unsafe {
            let fp = &self.device.fp;
            fp.wait_for_fences(&[immediate.fence], true, u64::MAX)
                .map_err(conv::map_error)?;
            fp.reset_fences(&[immediate.fence]).map_err(conv::map_error)?;
        }
        state.pending = false;
        Ok(res)
    }

    /// Routes the next flush through the application's present semaphores.
    fn begin_present(&self, waits: &[vk::Semaphore]) {
        if let Some(immediate) = self.immediate.get() {
            let mut state = immediate.state.lock();
            state.present_waits = Some(waits.to_vec());
            state.signaled = false;
        }
    }

    /// Semaphore the present has to wait on instead of the application's, if a flush consumed them.
    fn end_present(&self) -> Option<vk::Semaphore> {
        let immediate = self.immediate.get()?;
        let mut state = immediate.state.lock();
        if let Err(err) = self.flush(immediate, &mut state) {
            error!("failed to flush immediate command list. err: {err}");
        }

        state.present_waits = None;
        core::mem::take(&mut state.signaled).then_some(immediate.semaphore)
    }

    /// Releases the immediate list. The device must be idle.
    pub(crate) fn destroy(&self) {
        let Some(immediate) = self.immediate.get() else {
            return;
        };

        let fp = &self.device.fp;
        unsafe {
            _ = fp.queue_wait_idle(self.handle);
            fp.destroy_semaphore(immediate.semaphore, None);
            fp.destroy_fence(immediate.fence, None);
            fp.destroy_command_pool(immediate.list.pool, None);
        }
    }
}

impl CommandQueue for CommandQueueImpl {
    fn queue_type(&self) -> QueueType {
        queue_type(self.flags)
    }

    fn immediate_command_list(&self) -> Option<&dyn CommandList> {
        let immediate = match self.immediate() {
            Ok(immediate) => immediate,
            Err(err) => {
                trace!("no immediate command list. err: {err}");
                return None;
            }
        };

        if let Err(err) = self.begin(immediate, &mut immediate.state.lock()) {
            error!("failed to begin immediate command list. err: {err}");
            return None;
        }
        Some(&immediate.list)
    }

    fn flush_immediate_command_list(&self) {
        let Some(immediate) = self.immediate.get() else {
            return;
        };

        if let Err(err) = self.flush(immediate, &mut immediate.state.lock()) {
            error!("failed to flush immediate command list. err: {err}");
        }
    }

    fn wait_idle(&self) {
        self.flush_immediate_command_list();
        if let Err(err) = unsafe { self.device.fp.queue_wait_idle(self.handle) } {
            error!("vkQueueWaitIdle failed. err: {err:?}");
        }
    }
}

#[tracing::instrument]
pub(super) extern "system" fn queue_submit(
    queue: vk::Queue,
    submit_count: u32,
    submits: *const vk::SubmitInfo<'_>,
    fence: vk::Fence,
) -> vk::Result {
    trace!("vkQueueSubmit called");

    let Some(queue_impl) = get_queue(queue) else {
        error!("vkQueueSubmit on unknown queue {queue:?}");
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };

    // Layer work recorded so far runs before the application's
    queue_impl.flush_immediate_command_list();

    let registry = tint::registry();
    for submit in unsafe { raw_slice(submits, submit_count) } {
        for &cmd in unsafe { raw_slice(submit.p_command_buffers, submit.command_buffer_count) } {
            if let Some(cmd_list) = command::get_command_list(cmd) {
                registry.dispatch(&mut Event::ExecuteCommandList {
                    queue: &*queue_impl,
                    cmd_list: &*cmd_list,
                });
            }
        }
    }

    unsafe { (queue_impl.device.fp.fp_v1_0().queue_submit)(queue, submit_count, submits, fence) }
}

#[tracing::instrument]
pub(super) extern "system" fn queue_present(
    queue: vk::Queue,
    info: *const vk::PresentInfoKHR<'_>,
) -> vk::Result {
    trace!("vkQueuePresentKHR called");

    let Some(queue_impl) = get_queue(queue) else {
        error!("vkQueuePresentKHR on unknown queue {queue:?}");
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let Some(present_info) = (unsafe { info.as_ref() }) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };

    let swapchains =
        unsafe { raw_slice(present_info.p_swapchains, present_info.swapchain_count) };
    let indices = unsafe { raw_slice(present_info.p_image_indices, present_info.swapchain_count) };
    let wait_semaphores = unsafe {
        raw_slice(
            present_info.p_wait_semaphores,
            present_info.wait_semaphore_count,
        )
    };

    queue_impl.begin_present(wait_semaphores);

    let registry = tint::registry();
    for (&swapchain, &index) in swapchains.iter().zip(indices) {
        registry.dispatch(&mut Event::Present {
            queue: &*queue_impl,
            swapchain: swapchain.as_raw(),
            source_rect: None,
            dest_rect: None,
        });

        if let Some(runtime) = swapchain::get_runtime(swapchain) {
            runtime.on_present(registry, index as usize);
        }
    }

    let res = match queue_impl.end_present() {
        Some(semaphore) => {
            let waits = [semaphore];
            let mut patched = *present_info;
            patched.wait_semaphore_count = 1;
            patched.p_wait_semaphores = waits.as_ptr();
            unsafe { (queue_impl.device.swapchain_fn.queue_present_khr)(queue, &patched) }
        }
        None => unsafe { (queue_impl.device.swapchain_fn.queue_present_khr)(queue, info) },
    };

    queue_impl.device.rotate_transient_pools();
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::device_impl::tests::offline_device;

    #[test]
    fn queue_flags_map_to_types() {
        assert_eq!(
            queue_type(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            QueueType::GRAPHICS | QueueType::COMPUTE | QueueType::COPY
        );
        assert_eq!(queue_type(vk::QueueFlags::TRANSFER), QueueType::COPY);
        assert_eq!(queue_type(vk::QueueFlags::SPARSE_BINDING), QueueType::empty());
    }

    #[test]
    fn device_queues_unregister_together() {
        let device = Arc::new(offline_device(None));
        let graphics = Arc::new(CommandQueueImpl::new(
            device.clone(),
            vk::Queue::from_raw(0x7100),
            0,
            vk::QueueFlags::GRAPHICS,
        ));
        let transfer = Arc::new(CommandQueueImpl::new(
            device.clone(),
            vk::Queue::from_raw(0x7200),
            1,
            vk::QueueFlags::TRANSFER,
        ));
        register_queue(graphics.clone());
        register_queue(transfer.clone());
        assert!(get_queue(graphics.handle).is_some());

        // Without a graphics family there is nothing to record into
        assert!(transfer.immediate_command_list().is_none());

        let mut removed: Vec<u64> = unregister_device_queues(device.handle)
            .iter()
            .map(|queue| queue.handle.as_raw())
            .collect();
        removed.sort_unstable();
        assert_eq!(removed, [0x7100, 0x7200]);
        assert!(get_queue(graphics.handle).is_none());
    }
}
