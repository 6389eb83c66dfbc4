// SPDX-License-Identifier: CEPL-1.0
use std::fmt;

use ash::vk;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Instance,
    Device,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scope::Instance => "instance",
            Scope::Device => "device",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Capability {
    Layer(String),
    Extension(String),
    ApiVersion { required: u32, found: u32 },
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Layer(name) => write!(f, "layer '{name}'"),
            Capability::Extension(name) => write!(f, "extension '{name}'"),
            Capability::ApiVersion { required, found } => write!(
                f,
                "API version {} (found {})",
                crate::version_string(*required),
                crate::version_string(*found)
            ),
        }
    }
}

/// Every variant is fatal. There is no retry path.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported {scope} {capability}")]
    MissingCapability { scope: Scope, capability: Capability },
    #[error("no suitable physical device")]
    NoSuitableDevice,
    #[error("{op} failed: {result}")]
    QueryFailed { op: &'static str, result: vk::Result },
    #[error("{op} failed: {result}")]
    ResourceCreationFailed { op: &'static str, result: vk::Result },
    #[error("{op} failed: {result}")]
    SwapchainCreationFailed { op: &'static str, result: vk::Result },
    #[error("{op} failed: {result}")]
    FrameOperationFailed { op: &'static str, result: vk::Result },
}

impl Error {
    pub(crate) fn query(op: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Error::QueryFailed { op, result }
    }

    pub(crate) fn create(op: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Error::ResourceCreationFailed { op, result }
    }

    pub(crate) fn swapchain(op: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Error::SwapchainCreationFailed { op, result }
    }

    pub(crate) fn frame(op: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Error::FrameOperationFailed { op, result }
    }

    /// The Vulkan status behind the failure, when there is one.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            Error::QueryFailed { result, .. }
            | Error::ResourceCreationFailed { result, .. }
            | Error::SwapchainCreationFailed { result, .. }
            | Error::FrameOperationFailed { result, .. } => Some(*result),
            Error::MissingCapability { .. } | Error::NoSuitableDevice => None,
        }
    }
}
