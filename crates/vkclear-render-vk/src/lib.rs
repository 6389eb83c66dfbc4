// SPDX-License-Identifier: CEPL-1.0
//! [`Driver`] implementation over the system Vulkan loader via `ash`.
//!
//! The driver holds the dispatch tables for at most one instance and one
//! device at a time. They are installed by `create_instance` and
//! `create_device` and dropped again by the matching destroy call.

use std::cell::{Ref, RefCell};
use std::ffi::{c_char, c_void, CStr, CString};

use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::prelude::VkResult;
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use tracing::{debug, error, info, trace, warn};

use vkclear_render::driver::{
    AdapterProperties, DebugMessengerDesc, DeviceDesc, Driver, ImageBarrier, ImageViewDesc,
    InstanceDesc, SubmitDesc, SwapchainDesc,
};
use vkclear_render::PresentTarget;

const NOT_LOADED: vk::Result = vk::Result::ERROR_INITIALIZATION_FAILED;

struct InstanceFns {
    raw: ash::Instance,
    surface: surface::Instance,
    debug_utils: debug_utils::Instance,
}

struct DeviceFns {
    raw: ash::Device,
    swapchain: swapchain::Device,
}

pub struct AshDriver {
    entry: Entry,
    instance: RefCell<Option<InstanceFns>>,
    device: RefCell<Option<DeviceFns>>,
}

impl AshDriver {
    /// Loads the Vulkan loader library at runtime.
    pub fn load() -> Result<Self, ash::LoadingError> {
        // SAFETY: the loader is a system library; nothing else in the
        // process unloads it while the entry is alive.
        let entry = unsafe { Entry::load() }?;
        debug!("Vulkan loader ready");
        Ok(Self {
            entry,
            instance: RefCell::new(None),
            device: RefCell::new(None),
        })
    }

    fn instance(&self) -> VkResult<Ref<'_, InstanceFns>> {
        Ref::filter_map(self.instance.borrow(), Option::as_ref).map_err(|_| NOT_LOADED)
    }

    fn device(&self) -> VkResult<Ref<'_, DeviceFns>> {
        Ref::filter_map(self.device.borrow(), Option::as_ref).map_err(|_| NOT_LOADED)
    }
}

/// Owned copy of a fixed-size, NUL-terminated name field.
fn fixed_name(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn c_strings(names: &[String]) -> VkResult<Vec<CString>> {
    names
        .iter()
        .map(|n| CString::new(n.as_str()).map_err(|_| vk::Result::ERROR_INITIALIZATION_FAILED))
        .collect()
}

fn pointers(names: &[CString]) -> Vec<*const c_char> {
    names.iter().map(|n| n.as_ptr()).collect()
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "{types:?}: {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "{types:?}: {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!(target: "vulkan", "{types:?}: {msg}");
    } else {
        trace!(target: "vulkan", "{types:?}: {msg}");
    }
    vk::FALSE
}

impl Driver for AshDriver {
    fn instance_version(&self) -> VkResult<u32> {
        // SAFETY: global command, no handles involved.
        let version = unsafe { self.entry.try_enumerate_instance_version() }?;
        Ok(version.unwrap_or(vk::API_VERSION_1_0))
    }

    fn instance_layers(&self) -> VkResult<Vec<String>> {
        // SAFETY: global command.
        let props = unsafe { self.entry.enumerate_instance_layer_properties() }?;
        Ok(props.iter().map(|p| fixed_name(&p.layer_name)).collect())
    }

    fn instance_extensions(&self) -> VkResult<Vec<String>> {
        // SAFETY: global command.
        let props = unsafe { self.entry.enumerate_instance_extension_properties(None) }?;
        Ok(props.iter().map(|p| fixed_name(&p.extension_name)).collect())
    }

    fn surface_extensions(&self, display: RawDisplayHandle) -> VkResult<Vec<String>> {
        let names = ash_window::enumerate_required_extensions(display)?;
        Ok(names
            .iter()
            // SAFETY: ash-window hands out pointers to static NUL-terminated names.
            .map(|&p| unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned())
            .collect())
    }

    unsafe fn create_instance(&self, desc: &InstanceDesc<'_>) -> VkResult<vk::Instance> {
        if self.instance.borrow().is_some() {
            return Err(NOT_LOADED);
        }
        let app_name = CString::new(desc.app_name).map_err(|_| NOT_LOADED)?;
        let layers = c_strings(desc.layers)?;
        let extensions = c_strings(desc.extensions)?;
        let layer_ptrs = pointers(&layers);
        let extension_ptrs = pointers(&extensions);

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(0)
            .engine_name(&app_name)
            .engine_version(0)
            .api_version(desc.api_version);
        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let raw = self.entry.create_instance(&create_info, None)?;
        let handle = raw.handle();
        *self.instance.borrow_mut() = Some(InstanceFns {
            surface: surface::Instance::new(&self.entry, &raw),
            debug_utils: debug_utils::Instance::new(&self.entry, &raw),
            raw,
        });
        Ok(handle)
    }

    unsafe fn destroy_instance(&self, instance: vk::Instance) {
        if let Some(fns) = self.instance.borrow_mut().take() {
            debug_assert_eq!(fns.raw.handle(), instance);
            fns.raw.destroy_instance(None);
        }
    }

    unsafe fn create_debug_messenger(
        &self,
        instance: vk::Instance,
        desc: &DebugMessengerDesc,
    ) -> VkResult<vk::DebugUtilsMessengerEXT> {
        let fns = self.instance()?;
        debug_assert_eq!(fns.raw.handle(), instance);
        let info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(desc.severity)
            .message_type(desc.types)
            .pfn_user_callback(Some(debug_callback));
        fns.debug_utils.create_debug_utils_messenger(&info, None)
    }

    unsafe fn destroy_debug_messenger(
        &self,
        _instance: vk::Instance,
        messenger: vk::DebugUtilsMessengerEXT,
    ) {
        if let Ok(fns) = self.instance() {
            fns.debug_utils.destroy_debug_utils_messenger(messenger, None);
        }
    }

    unsafe fn create_surface(
        &self,
        instance: vk::Instance,
        target: &PresentTarget,
    ) -> VkResult<vk::SurfaceKHR> {
        let fns = self.instance()?;
        debug_assert_eq!(fns.raw.handle(), instance);
        ash_window::create_surface(&self.entry, &fns.raw, target.display, target.window, None)
    }

    unsafe fn destroy_surface(&self, _instance: vk::Instance, surface: vk::SurfaceKHR) {
        if let Ok(fns) = self.instance() {
            fns.surface.destroy_surface(surface, None);
        }
    }

    unsafe fn physical_devices(&self, instance: vk::Instance) -> VkResult<Vec<vk::PhysicalDevice>> {
        let fns = self.instance()?;
        debug_assert_eq!(fns.raw.handle(), instance);
        fns.raw.enumerate_physical_devices()
    }

    unsafe fn adapter_properties(&self, phys: vk::PhysicalDevice) -> VkResult<AdapterProperties> {
        let props = self.instance()?.raw.get_physical_device_properties(phys);
        Ok(AdapterProperties {
            name: fixed_name(&props.device_name),
            device_type: props.device_type,
            api_version: props.api_version,
        })
    }

    unsafe fn device_layers(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<String>> {
        let props = self.instance()?.raw.enumerate_device_layer_properties(phys)?;
        Ok(props.iter().map(|p| fixed_name(&p.layer_name)).collect())
    }

    unsafe fn device_extensions(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<String>> {
        let props = self.instance()?.raw.enumerate_device_extension_properties(phys)?;
        Ok(props.iter().map(|p| fixed_name(&p.extension_name)).collect())
    }

    unsafe fn queue_families(
        &self,
        phys: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::QueueFamilyProperties>> {
        Ok(self
            .instance()?
            .raw
            .get_physical_device_queue_family_properties(phys))
    }

    unsafe fn surface_support(
        &self,
        phys: vk::PhysicalDevice,
        family: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        self.instance()?
            .surface
            .get_physical_device_surface_support(phys, family, surface)
    }

    unsafe fn surface_capabilities(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        self.instance()?
            .surface
            .get_physical_device_surface_capabilities(phys, surface)
    }

    unsafe fn surface_formats(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        self.instance()?
            .surface
            .get_physical_device_surface_formats(phys, surface)
    }

    unsafe fn present_modes(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>> {
        self.instance()?
            .surface
            .get_physical_device_surface_present_modes(phys, surface)
    }

    unsafe fn create_device(
        &self,
        phys: vk::PhysicalDevice,
        desc: &DeviceDesc<'_>,
    ) -> VkResult<vk::Device> {
        if self.device.borrow().is_some() {
            return Err(NOT_LOADED);
        }
        let fns = self.instance()?;
        let layers = c_strings(desc.layers)?;
        let extensions = c_strings(desc.extensions)?;
        let layer_ptrs = pointers(&layers);
        let extension_ptrs = pointers(&extensions);

        let priorities = [1.0f32];
        let queue_infos: Vec<_> = desc
            .queue_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
            })
            .collect();
        // Device layers are ignored by current loaders but still passed for
        // older ones.
        #[allow(deprecated)]
        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let raw = fns.raw.create_device(phys, &create_info, None)?;
        let handle = raw.handle();
        *self.device.borrow_mut() = Some(DeviceFns {
            swapchain: swapchain::Device::new(&fns.raw, &raw),
            raw,
        });
        Ok(handle)
    }

    unsafe fn destroy_device(&self, device: vk::Device) {
        if let Some(fns) = self.device.borrow_mut().take() {
            debug_assert_eq!(fns.raw.handle(), device);
            fns.raw.destroy_device(None);
        }
    }

    unsafe fn device_queue(&self, device: vk::Device, family: u32) -> VkResult<vk::Queue> {
        let fns = self.device()?;
        debug_assert_eq!(fns.raw.handle(), device);
        Ok(fns.raw.get_device_queue(family, 0))
    }

    unsafe fn device_wait_idle(&self, _device: vk::Device) -> VkResult<()> {
        self.device()?.raw.device_wait_idle()
    }

    unsafe fn create_swapchain(
        &self,
        _device: vk::Device,
        desc: &SwapchainDesc,
    ) -> VkResult<vk::SwapchainKHR> {
        let info = vk::SwapchainCreateInfoKHR::default()
            .surface(desc.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.format.format)
            .image_color_space(desc.format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(desc.usage)
            .image_sharing_mode(desc.sharing_mode)
            .queue_family_indices(&desc.queue_family_indices)
            .pre_transform(desc.pre_transform)
            .composite_alpha(desc.composite_alpha)
            .present_mode(desc.present_mode)
            .clipped(true)
            .old_swapchain(desc.old_swapchain);
        self.device()?.swapchain.create_swapchain(&info, None)
    }

    unsafe fn destroy_swapchain(&self, _device: vk::Device, swapchain: vk::SwapchainKHR) {
        if let Ok(fns) = self.device() {
            fns.swapchain.destroy_swapchain(swapchain, None);
        }
    }

    unsafe fn swapchain_images(
        &self,
        _device: vk::Device,
        swapchain: vk::SwapchainKHR,
    ) -> VkResult<Vec<vk::Image>> {
        self.device()?.swapchain.get_swapchain_images(swapchain)
    }

    unsafe fn create_image_view(
        &self,
        _device: vk::Device,
        desc: &ImageViewDesc,
    ) -> VkResult<vk::ImageView> {
        let info = vk::ImageViewCreateInfo {
            image: desc.image,
            view_type: desc.view_type,
            format: desc.format,
            components: vk::ComponentMapping::default(),
            subresource_range: desc.range,
            ..Default::default()
        };
        self.device()?.raw.create_image_view(&info, None)
    }

    unsafe fn destroy_image_view(&self, _device: vk::Device, view: vk::ImageView) {
        if let Ok(fns) = self.device() {
            fns.raw.destroy_image_view(view, None);
        }
    }

    unsafe fn create_command_pool(
        &self,
        _device: vk::Device,
        family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> VkResult<vk::CommandPool> {
        let info = vk::CommandPoolCreateInfo {
            flags,
            queue_family_index: family,
            ..Default::default()
        };
        self.device()?.raw.create_command_pool(&info, None)
    }

    unsafe fn destroy_command_pool(&self, _device: vk::Device, pool: vk::CommandPool) {
        if let Ok(fns) = self.device() {
            fns.raw.destroy_command_pool(pool, None);
        }
    }

    unsafe fn reset_command_pool(&self, _device: vk::Device, pool: vk::CommandPool) -> VkResult<()> {
        self.device()?
            .raw
            .reset_command_pool(pool, vk::CommandPoolResetFlags::empty())
    }

    unsafe fn allocate_command_buffer(
        &self,
        _device: vk::Device,
        pool: vk::CommandPool,
    ) -> VkResult<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo {
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        self.device()?
            .raw
            .allocate_command_buffers(&info)?
            .into_iter()
            .next()
            .ok_or(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
    }

    unsafe fn free_command_buffer(
        &self,
        _device: vk::Device,
        pool: vk::CommandPool,
        cmd: vk::CommandBuffer,
    ) {
        if let Ok(fns) = self.device() {
            fns.raw.free_command_buffers(pool, &[cmd]);
        }
    }

    unsafe fn create_semaphore(&self, _device: vk::Device) -> VkResult<vk::Semaphore> {
        self.device()?
            .raw
            .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
    }

    unsafe fn destroy_semaphore(&self, _device: vk::Device, semaphore: vk::Semaphore) {
        if let Ok(fns) = self.device() {
            fns.raw.destroy_semaphore(semaphore, None);
        }
    }

    unsafe fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> VkResult<()> {
        let info = vk::CommandBufferBeginInfo {
            flags,
            ..Default::default()
        };
        self.device()?.raw.begin_command_buffer(cmd, &info)
    }

    unsafe fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, barrier: &ImageBarrier) {
        let Ok(fns) = self.device() else { return };
        let image_barrier = vk::ImageMemoryBarrier {
            src_access_mask: barrier.src_access,
            dst_access_mask: barrier.dst_access,
            old_layout: barrier.old_layout,
            new_layout: barrier.new_layout,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: barrier.image,
            subresource_range: barrier.range,
            ..Default::default()
        };
        fns.raw.cmd_pipeline_barrier(
            cmd,
            barrier.src_stage,
            barrier.dst_stage,
            vk::DependencyFlags::BY_REGION,
            &[],
            &[],
            &[image_barrier],
        );
    }

    unsafe fn cmd_clear_color_image(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: [f32; 4],
        range: vk::ImageSubresourceRange,
    ) {
        let Ok(fns) = self.device() else { return };
        let clear = vk::ClearColorValue { float32: color };
        fns.raw.cmd_clear_color_image(cmd, image, layout, &clear, &[range]);
    }

    unsafe fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.device()?.raw.end_command_buffer(cmd)
    }

    unsafe fn acquire_next_image(
        &self,
        _device: vk::Device,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        self.device()?
            .swapchain
            .acquire_next_image(swapchain, u64::MAX, signal, vk::Fence::null())
    }

    unsafe fn queue_submit(&self, queue: vk::Queue, submit: &SubmitDesc) -> VkResult<()> {
        let waits = [submit.wait_semaphore];
        let stages = [submit.wait_stage];
        let cmds = [submit.command_buffer];
        let signals = [submit.signal_semaphore];
        let info = vk::SubmitInfo::default()
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&stages)
            .command_buffers(&cmds)
            .signal_semaphores(&signals);
        self.device()?
            .raw
            .queue_submit(queue, &[info], vk::Fence::null())
    }

    unsafe fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let waits = [wait];
        let swapchains = [swapchain];
        let indices = [image_index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);
        self.device()?.swapchain.queue_present(queue, &info)
    }
}

impl Drop for AshDriver {
    fn drop(&mut self) {
        if self.device.get_mut().is_some() || self.instance.get_mut().is_some() {
            warn!("Vulkan driver dropped with live instance or device");
        } else {
            info!("Vulkan driver released");
        }
    }
}
