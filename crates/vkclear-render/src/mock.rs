// SPDX-License-Identifier: CEPL-1.0
//! Recording driver for tests. Queries answer from a fixed profile; object
//! lifetimes and queue operations are appended to a call log.

use std::cell::RefCell;

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use raw_window_handle::{
    RawDisplayHandle, RawWindowHandle, XlibDisplayHandle, XlibWindowHandle,
};

use crate::caps::{DEBUG_UTILS_EXTENSION, SWAPCHAIN_EXTENSION, VALIDATION_LAYER};
use crate::driver::{
    AdapterProperties, DebugMessengerDesc, DeviceDesc, Driver, ImageBarrier, ImageViewDesc,
    InstanceDesc, SubmitDesc, SwapchainDesc,
};
use crate::{PresentTarget, RenderSize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Object {
    Instance,
    DebugMessenger,
    Surface,
    Device,
    Swapchain,
    ImageView,
    CommandPool,
    CommandBuffer,
    Semaphore,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Create(Object, u64),
    Destroy(Object, u64),
    Acquire {
        signal: vk::Semaphore,
    },
    ResetPool,
    Begin(vk::CommandBufferUsageFlags),
    Barrier(Transition),
    Clear([f32; 4]),
    End,
    Submit {
        wait: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal: vk::Semaphore,
    },
    Present {
        index: u32,
        wait: vk::Semaphore,
    },
    WaitIdle,
}

/// Stages, access masks and layouts of one recorded image barrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

#[derive(Clone, Debug)]
pub struct MockAdapter {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub layers: Vec<String>,
    pub extensions: Vec<String>,
    /// Queue flags and whether the family can present to the surface.
    pub families: Vec<(vk::QueueFlags, bool)>,
}

impl MockAdapter {
    fn new(name: &str, device_type: vk::PhysicalDeviceType) -> Self {
        Self {
            name: name.to_owned(),
            device_type,
            api_version: vk::API_VERSION_1_3,
            layers: Vec::new(),
            extensions: vec![SWAPCHAIN_EXTENSION.to_owned()],
            families: vec![(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, true)],
        }
    }

    pub fn discrete(name: &str) -> Self {
        Self::new(name, vk::PhysicalDeviceType::DISCRETE_GPU)
    }

    pub fn integrated(name: &str) -> Self {
        Self::new(name, vk::PhysicalDeviceType::INTEGRATED_GPU)
    }
}

const ADAPTER_BASE: u64 = 0x1000;
const QUEUE_BASE: u64 = 0x9000;

#[derive(Default)]
struct State {
    next_handle: u64,
    calls: Vec<Call>,
    image_count: u32,
    next_image: u32,
    views_created: usize,
    fail_view_at: Option<usize>,
    fail_acquire: Option<vk::Result>,
    present_suboptimal: bool,
    last_submit_queue: Option<vk::Queue>,
    last_present_queue: Option<vk::Queue>,
    last_old_swapchain: Option<vk::SwapchainKHR>,
    device_families: Option<Vec<u32>>,
}

pub struct MockDriver {
    version: u32,
    layers: Vec<String>,
    extensions: Vec<String>,
    surface_extensions: Vec<String>,
    adapters: Vec<MockAdapter>,
    caps: vk::SurfaceCapabilitiesKHR,
    formats: Vec<vk::SurfaceFormatKHR>,
    modes: Vec<vk::PresentModeKHR>,
    state: RefCell<State>,
}

impl Default for MockDriver {
    fn default() -> Self {
        let surface_extensions = vec!["VK_KHR_surface".to_owned(), "VK_KHR_xlib_surface".to_owned()];
        let mut extensions = surface_extensions.clone();
        extensions.push(DEBUG_UTILS_EXTENSION.to_owned());
        Self {
            version: vk::API_VERSION_1_3,
            layers: vec![VALIDATION_LAYER.to_owned()],
            extensions,
            surface_extensions,
            adapters: vec![MockAdapter::discrete("mock gpu")],
            caps: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 4,
                current_extent: vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                max_image_array_layers: 1,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                ..Default::default()
            },
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            state: RefCell::new(State {
                next_handle: 1,
                ..Default::default()
            }),
        }
    }
}

impl MockDriver {
    pub fn with_instance_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_instance_layers(mut self, layers: &[&str]) -> Self {
        self.layers = layers.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_adapters(mut self, adapters: Vec<MockAdapter>) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// The `n`th image view creation (0-based) fails.
    pub fn fail_image_view_at(&self, n: usize) {
        self.state.borrow_mut().fail_view_at = Some(n);
    }

    pub fn fail_acquire(&self, result: vk::Result) {
        self.state.borrow_mut().fail_acquire = Some(result);
    }

    pub fn present_suboptimal(&self) {
        self.state.borrow_mut().present_suboptimal = true;
    }

    pub fn last_submit_queue(&self) -> Option<vk::Queue> {
        self.state.borrow().last_submit_queue
    }

    pub fn last_present_queue(&self) -> Option<vk::Queue> {
        self.state.borrow().last_present_queue
    }

    pub fn last_old_swapchain(&self) -> Option<vk::SwapchainKHR> {
        self.state.borrow().last_old_swapchain
    }

    pub fn device_queue_families(&self) -> Option<Vec<u32>> {
        self.state.borrow().device_families.clone()
    }

    fn log(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }

    fn create<H: Handle>(&self, kind: Object) -> H {
        let mut state = self.state.borrow_mut();
        let raw = state.next_handle;
        state.next_handle += 1;
        state.calls.push(Call::Create(kind, raw));
        H::from_raw(raw)
    }

    fn destroy<H: Handle>(&self, kind: Object, handle: H) {
        self.log(Call::Destroy(kind, handle.as_raw()));
    }

    fn adapter(&self, phys: vk::PhysicalDevice) -> VkResult<&MockAdapter> {
        phys.as_raw()
            .checked_sub(ADAPTER_BASE)
            .and_then(|i| self.adapters.get(i as usize))
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }
}

pub fn target() -> PresentTarget {
    PresentTarget {
        display: RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0)),
        window: RawWindowHandle::Xlib(XlibWindowHandle::new(1)),
        size: RenderSize {
            width: 640,
            height: 480,
        },
    }
}

impl Driver for MockDriver {
    fn instance_version(&self) -> VkResult<u32> {
        Ok(self.version)
    }

    fn instance_layers(&self) -> VkResult<Vec<String>> {
        Ok(self.layers.clone())
    }

    fn instance_extensions(&self) -> VkResult<Vec<String>> {
        Ok(self.extensions.clone())
    }

    fn surface_extensions(&self, _display: RawDisplayHandle) -> VkResult<Vec<String>> {
        Ok(self.surface_extensions.clone())
    }

    unsafe fn create_instance(&self, _desc: &InstanceDesc<'_>) -> VkResult<vk::Instance> {
        Ok(self.create(Object::Instance))
    }

    unsafe fn destroy_instance(&self, instance: vk::Instance) {
        self.destroy(Object::Instance, instance);
    }

    unsafe fn create_debug_messenger(
        &self,
        _instance: vk::Instance,
        _desc: &DebugMessengerDesc,
    ) -> VkResult<vk::DebugUtilsMessengerEXT> {
        Ok(self.create(Object::DebugMessenger))
    }

    unsafe fn destroy_debug_messenger(
        &self,
        _instance: vk::Instance,
        messenger: vk::DebugUtilsMessengerEXT,
    ) {
        self.destroy(Object::DebugMessenger, messenger);
    }

    unsafe fn create_surface(
        &self,
        _instance: vk::Instance,
        _target: &PresentTarget,
    ) -> VkResult<vk::SurfaceKHR> {
        Ok(self.create(Object::Surface))
    }

    unsafe fn destroy_surface(&self, _instance: vk::Instance, surface: vk::SurfaceKHR) {
        self.destroy(Object::Surface, surface);
    }

    unsafe fn physical_devices(&self, _instance: vk::Instance) -> VkResult<Vec<vk::PhysicalDevice>> {
        Ok((0..self.adapters.len() as u64)
            .map(|i| vk::PhysicalDevice::from_raw(ADAPTER_BASE + i))
            .collect())
    }

    unsafe fn adapter_properties(&self, phys: vk::PhysicalDevice) -> VkResult<AdapterProperties> {
        let adapter = self.adapter(phys)?;
        Ok(AdapterProperties {
            name: adapter.name.clone(),
            device_type: adapter.device_type,
            api_version: adapter.api_version,
        })
    }

    unsafe fn device_layers(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<String>> {
        Ok(self.adapter(phys)?.layers.clone())
    }

    unsafe fn device_extensions(&self, phys: vk::PhysicalDevice) -> VkResult<Vec<String>> {
        Ok(self.adapter(phys)?.extensions.clone())
    }

    unsafe fn queue_families(
        &self,
        phys: vk::PhysicalDevice,
    ) -> VkResult<Vec<vk::QueueFamilyProperties>> {
        Ok(self
            .adapter(phys)?
            .families
            .iter()
            .map(|&(queue_flags, _)| vk::QueueFamilyProperties {
                queue_flags,
                queue_count: 1,
                ..Default::default()
            })
            .collect())
    }

    unsafe fn surface_support(
        &self,
        phys: vk::PhysicalDevice,
        family: u32,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<bool> {
        Ok(self
            .adapter(phys)?
            .families
            .get(family as usize)
            .is_some_and(|&(_, present)| present))
    }

    unsafe fn surface_capabilities(
        &self,
        _phys: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        Ok(self.caps)
    }

    unsafe fn surface_formats(
        &self,
        _phys: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.formats.clone())
    }

    unsafe fn present_modes(
        &self,
        _phys: vk::PhysicalDevice,
        _surface: vk::SurfaceKHR,
    ) -> VkResult<Vec<vk::PresentModeKHR>> {
        Ok(self.modes.clone())
    }

    unsafe fn create_device(
        &self,
        _phys: vk::PhysicalDevice,
        desc: &DeviceDesc<'_>,
    ) -> VkResult<vk::Device> {
        self.state.borrow_mut().device_families = Some(desc.queue_families.to_vec());
        Ok(self.create(Object::Device))
    }

    unsafe fn destroy_device(&self, device: vk::Device) {
        self.destroy(Object::Device, device);
    }

    unsafe fn device_queue(&self, _device: vk::Device, family: u32) -> VkResult<vk::Queue> {
        Ok(vk::Queue::from_raw(QUEUE_BASE + u64::from(family)))
    }

    unsafe fn device_wait_idle(&self, _device: vk::Device) -> VkResult<()> {
        self.log(Call::WaitIdle);
        Ok(())
    }

    unsafe fn create_swapchain(
        &self,
        _device: vk::Device,
        desc: &SwapchainDesc,
    ) -> VkResult<vk::SwapchainKHR> {
        {
            let mut state = self.state.borrow_mut();
            state.image_count = desc.min_image_count;
            state.next_image = 0;
            state.last_old_swapchain = Some(desc.old_swapchain);
        }
        Ok(self.create(Object::Swapchain))
    }

    unsafe fn destroy_swapchain(&self, _device: vk::Device, swapchain: vk::SwapchainKHR) {
        self.destroy(Object::Swapchain, swapchain);
    }

    unsafe fn swapchain_images(
        &self,
        _device: vk::Device,
        _swapchain: vk::SwapchainKHR,
    ) -> VkResult<Vec<vk::Image>> {
        let mut state = self.state.borrow_mut();
        let count = state.image_count;
        let images = (0..count)
            .map(|_| {
                let raw = state.next_handle;
                state.next_handle += 1;
                vk::Image::from_raw(raw)
            })
            .collect();
        Ok(images)
    }

    unsafe fn create_image_view(
        &self,
        _device: vk::Device,
        _desc: &ImageViewDesc,
    ) -> VkResult<vk::ImageView> {
        {
            let mut state = self.state.borrow_mut();
            let n = state.views_created;
            state.views_created += 1;
            if state.fail_view_at == Some(n) {
                return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
            }
        }
        Ok(self.create(Object::ImageView))
    }

    unsafe fn destroy_image_view(&self, _device: vk::Device, view: vk::ImageView) {
        self.destroy(Object::ImageView, view);
    }

    unsafe fn create_command_pool(
        &self,
        _device: vk::Device,
        _family: u32,
        _flags: vk::CommandPoolCreateFlags,
    ) -> VkResult<vk::CommandPool> {
        Ok(self.create(Object::CommandPool))
    }

    unsafe fn destroy_command_pool(&self, _device: vk::Device, pool: vk::CommandPool) {
        self.destroy(Object::CommandPool, pool);
    }

    unsafe fn reset_command_pool(&self, _device: vk::Device, _pool: vk::CommandPool) -> VkResult<()> {
        self.log(Call::ResetPool);
        Ok(())
    }

    unsafe fn allocate_command_buffer(
        &self,
        _device: vk::Device,
        _pool: vk::CommandPool,
    ) -> VkResult<vk::CommandBuffer> {
        Ok(self.create(Object::CommandBuffer))
    }

    unsafe fn free_command_buffer(
        &self,
        _device: vk::Device,
        _pool: vk::CommandPool,
        cmd: vk::CommandBuffer,
    ) {
        self.destroy(Object::CommandBuffer, cmd);
    }

    unsafe fn create_semaphore(&self, _device: vk::Device) -> VkResult<vk::Semaphore> {
        Ok(self.create(Object::Semaphore))
    }

    unsafe fn destroy_semaphore(&self, _device: vk::Device, semaphore: vk::Semaphore) {
        self.destroy(Object::Semaphore, semaphore);
    }

    unsafe fn begin_command_buffer(
        &self,
        _cmd: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> VkResult<()> {
        self.log(Call::Begin(flags));
        Ok(())
    }

    unsafe fn cmd_image_barrier(&self, _cmd: vk::CommandBuffer, barrier: &ImageBarrier) {
        self.log(Call::Barrier(Transition {
            src_stage: barrier.src_stage,
            dst_stage: barrier.dst_stage,
            src_access: barrier.src_access,
            dst_access: barrier.dst_access,
            old_layout: barrier.old_layout,
            new_layout: barrier.new_layout,
        }));
    }

    unsafe fn cmd_clear_color_image(
        &self,
        _cmd: vk::CommandBuffer,
        _image: vk::Image,
        _layout: vk::ImageLayout,
        color: [f32; 4],
        _range: vk::ImageSubresourceRange,
    ) {
        self.log(Call::Clear(color));
    }

    unsafe fn end_command_buffer(&self, _cmd: vk::CommandBuffer) -> VkResult<()> {
        self.log(Call::End);
        Ok(())
    }

    unsafe fn acquire_next_image(
        &self,
        _device: vk::Device,
        _swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Acquire { signal });
        if let Some(err) = state.fail_acquire {
            return Err(err);
        }
        let index = state.next_image;
        state.next_image = (index + 1) % state.image_count.max(1);
        Ok((index, false))
    }

    unsafe fn queue_submit(&self, queue: vk::Queue, submit: &SubmitDesc) -> VkResult<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Submit {
            wait: submit.wait_semaphore,
            wait_stage: submit.wait_stage,
            signal: submit.signal_semaphore,
        });
        state.last_submit_queue = Some(queue);
        Ok(())
    }

    unsafe fn queue_present(
        &self,
        queue: vk::Queue,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call::Present {
            index: image_index,
            wait,
        });
        state.last_present_queue = Some(queue);
        Ok(state.present_suboptimal)
    }
}
