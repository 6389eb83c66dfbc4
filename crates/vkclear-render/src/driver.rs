// SPDX-License-Identifier: CEPL-1.0
//! The seam between the bring-up logic and the Vulkan loader.
//!
//! One method per entry point the renderer needs. Handles are plain
//! `vk::*` values; an implementation keeps whatever dispatch tables it
//! needs internally (see `vkclear-render-vk`). Every method that takes a
//! handle is `unsafe`: the caller guarantees the handle is alive and was
//! created through the same driver. The owning wrappers in this crate are
//! the only callers.

use ash::prelude::VkResult;
use ash::vk;
use raw_window_handle::RawDisplayHandle;

use crate::PresentTarget;

pub struct InstanceDesc<'a> {
    pub app_name: &'a str,
    pub api_version: u32,
    pub layers: &'a [String],
    pub extensions: &'a [String],
}

#[derive(Clone, Copy, Debug)]
pub struct DebugMessengerDesc {
    pub severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    pub types: vk::DebugUtilsMessageTypeFlagsEXT,
}

#[derive(Clone, Debug)]
pub struct AdapterProperties {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
}

pub struct DeviceDesc<'a> {
    /// Distinct families, one queue each.
    pub queue_families: &'a [u32],
    pub layers: &'a [String],
    pub extensions: &'a [String],
}

#[derive(Clone, Debug)]
pub struct SwapchainDesc {
    pub surface: vk::SurfaceKHR,
    pub min_image_count: u32,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub sharing_mode: vk::SharingMode,
    pub queue_family_indices: Vec<u32>,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub present_mode: vk::PresentModeKHR,
    pub old_swapchain: vk::SwapchainKHR,
}

#[derive(Clone, Copy, Debug)]
pub struct ImageViewDesc {
    pub image: vk::Image,
    pub view_type: vk::ImageViewType,
    pub format: vk::Format,
    pub range: vk::ImageSubresourceRange,
}

#[derive(Clone, Copy, Debug)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub range: vk::ImageSubresourceRange,
}

#[derive(Clone, Copy, Debug)]
pub struct SubmitDesc {
    pub wait_semaphore: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub command_buffer: vk::CommandBuffer,
    pub signal_semaphore: vk::Semaphore,
}

pub trait Driver {
    // Loader scope.
    fn instance_version(&self) -> VkResult<u32>;
    fn instance_layers(&self) -> VkResult<Vec<String>>;
    fn instance_extensions(&self) -> VkResult<Vec<String>>;
    /// Instance extensions needed to create a surface on `display`.
    fn surface_extensions(&self, display: RawDisplayHandle) -> VkResult<Vec<String>>;

    unsafe fn create_instance(&self, desc: &InstanceDesc<'_>) -> VkResult<vk::Instance>;
    unsafe fn destroy_instance(&self, instance: vk::Instance);

    unsafe fn create_debug_messenger(
        &self,
        instance: vk::Instance,
        desc: &DebugMessengerDesc,
    ) -> VkResult<vk::DebugUtilsMessengerEXT>;
    unsafe fn destroy_debug_messenger(
        &self,
        instance: vk::Instance,
        messenger: vk::DebugUtilsMessengerEXT,
    );

    unsafe fn create_surface(
        &self,
        instance: vk::Instance,
        target: &PresentTarget,
    ) -> VkResult<vk::SurfaceKHR>;
    unsafe fn destroy_surface(&self, instance: vk::Instance, surface: vk::SurfaceKHR);

    // Adapter queries.
    unsafe fn physical_devices(&self, instance: vk::Instance) -> VkResult<Vec<vk::PhysicalDevice>>;
    unsafe fn adapter_properties(&self, phys: vk::PhysicalDevice) -> VkResult<AdapterProperties>;
    unsafe fn device_layers(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<String>>;
    unsafe fn device_extensions(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<String>>;
    unsafe fn queue_families(
        &self,
        phys: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::QueueFamilyProperties>>;
    unsafe fn surface_support(
        &self,
        phys: vk::PhysicalDevice,
        family: u32,
        surface: vk::SurfaceKHR,
    ) -> VkResult<bool>;
    unsafe fn surface_capabilities(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR>;
    unsafe fn surface_formats(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>>;
    unsafe fn present_modes(
        &self,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>>;

    // Device scope.
    unsafe fn create_device(
        &self,
        phys: vk::PhysicalDevice,
        desc: &DeviceDesc<'_>,
    ) -> VkResult<vk::Device>;
    unsafe fn destroy_device(&self, device: vk::Device);
    unsafe fn device_queue(&self, device: vk::Device, family: u32) -> VkResult<vk::Queue>;
    unsafe fn device_wait_idle(&self, device: vk::Device) -> VkResult<()>;

    unsafe fn create_swapchain(
        &self,
        device: vk::Device,
        desc: &SwapchainDesc,
    ) -> VkResult<vk::SwapchainKHR>;
    unsafe fn destroy_swapchain(&self, device: vk::Device, swapchain: vk::SwapchainKHR);
    unsafe fn swapchain_images(
        &self,
        device: vk::Device,
        swapchain: vk::SwapchainKHR,
    ) -> VkResult<Vec<vk::Image>>;

    unsafe fn create_image_view(
        &self,
        device: vk::Device,
        desc: &ImageViewDesc,
    ) -> VkResult<vk::ImageView>;
    unsafe fn destroy_image_view(&self, device: vk::Device, view: vk::ImageView);

    unsafe fn create_command_pool(
        &self,
        device: vk::Device,
        family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> VkResult<vk::CommandPool>;
    unsafe fn destroy_command_pool(&self, device: vk::Device, pool: vk::CommandPool);
    unsafe fn reset_command_pool(&self, device: vk::Device, pool: vk::CommandPool) -> VkResult<()>;
    unsafe fn allocate_command_buffer(
        &self,
        device: vk::Device,
        pool: vk::CommandPool,
    ) -> VkResult<vk::CommandBuffer>;
    unsafe fn free_command_buffer(
        &self,
        device: vk::Device,
        pool: vk::CommandPool,
        cmd: vk::CommandBuffer,
    );

    unsafe fn create_semaphore(&self, device: vk::Device) -> VkResult<vk::Semaphore>;
    unsafe fn destroy_semaphore(&self, device: vk::Device, semaphore: vk::Semaphore);

    // Recording.
    unsafe fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> VkResult<()>;
    unsafe fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, barrier: &ImageBarrier);
    unsafe fn cmd_clear_color_image(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: [f32; 4],
        range: vk::ImageSubresourceRange,
    );
    unsafe fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;

    // Queue operations.
    /// Blocks without timeout. Returns the image index and the suboptimal flag.
    unsafe fn acquire_next_image(
        &self,
        device: vk::Device,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;
    unsafe fn queue_submit(&self, queue: vk::Queue, submit: &SubmitDesc) -> VkResult<()>;
    /// Returns the suboptimal flag.
    unsafe fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool>;
}
