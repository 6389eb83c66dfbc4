// SPDX-License-Identifier: CEPL-1.0
//! Vulkan bring-up and a clear-and-present frame loop, written against the
//! [`Driver`] seam so the ordering rules can be exercised without a GPU.
//!
//! Object hierarchy, in creation order:
//!
//! ```text
//! Instance
//! ├── DebugMessenger (validation only)
//! ├── Surface
//! └── Device
//!     ├── Swapchain ── ImageView[]
//!     ├── CommandPool ── CommandBuffer
//!     └── Semaphore (image-available, render-finished)
//! ```
//!
//! Children hold their parents through `Rc`, so a parent outlives every
//! child. Siblings are released in reverse creation order by field order.
#![deny(unsafe_op_in_unsafe_fn)]

pub mod caps;
pub mod device;
pub mod driver;
pub mod error;
pub mod frame;
pub mod instance;
pub mod renderer;
pub mod select;
pub mod swapchain;

#[cfg(test)]
pub(crate) mod mock;

pub use ash::vk;
pub use driver::Driver;
pub use error::{Error, Result};
pub use frame::LoopSignal;
pub use renderer::Renderer;

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

/// Native handles of the window the swapchain presents into.
#[derive(Clone, Copy, Debug)]
pub struct PresentTarget {
    pub display: RawDisplayHandle,
    pub window: RawWindowHandle,
    pub size: RenderSize,
}

#[derive(Clone, Debug)]
pub struct RenderConfig {
    pub app_name: String,
    /// Lowest Vulkan version accepted for the instance and the adapter.
    pub api_version: u32,
    /// Enables `VK_LAYER_KHRONOS_validation` and a debug messenger. Both
    /// become hard requirements when set.
    pub validation: bool,
    pub clear_color: [f32; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            app_name: "vkclear".to_owned(),
            api_version: vk::API_VERSION_1_2,
            validation: cfg!(debug_assertions),
            clear_color: [1.0, 0.0, 0.0, 1.0],
        }
    }
}

/// `major.minor.patch` rendering of a packed Vulkan version.
pub fn version_string(version: u32) -> String {
    format!(
        "{}.{}.{}",
        vk::api_version_major(version),
        vk::api_version_minor(version),
        vk::api_version_patch(version)
    )
}
