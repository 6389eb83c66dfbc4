// SPDX-License-Identifier: CEPL-1.0
//! Required-vs-available checks for layers, extensions and the API floor.

use crate::error::{Capability, Error, Result, Scope};

pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";
pub const DEBUG_UTILS_EXTENSION: &str = "VK_EXT_debug_utils";
pub const SWAPCHAIN_EXTENSION: &str = "VK_KHR_swapchain";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Layer,
    Extension,
}

/// Succeeds iff every entry of `required` appears in `available`. The first
/// missing entry, in `required` order, is the one reported.
pub fn require<S: AsRef<str>>(
    scope: Scope,
    kind: Kind,
    required: &[S],
    available: &[String],
) -> Result<()> {
    let missing = required
        .iter()
        .map(AsRef::as_ref)
        .find(|want| !available.iter().any(|have| have == want));

    match missing {
        None => Ok(()),
        Some(name) => Err(Error::MissingCapability {
            scope,
            capability: match kind {
                Kind::Layer => Capability::Layer(name.to_owned()),
                Kind::Extension => Capability::Extension(name.to_owned()),
            },
        }),
    }
}

pub fn require_version(scope: Scope, required: u32, found: u32) -> Result<()> {
    if found < required {
        return Err(Error::MissingCapability {
            scope,
            capability: Capability::ApiVersion { required, found },
        });
    }
    Ok(())
}

/// What the instance has to be created with.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstanceRequirements {
    pub api_version: u32,
    pub layers: Vec<String>,
    pub extensions: Vec<String>,
}

impl InstanceRequirements {
    pub fn new(api_version: u32, surface_extensions: Vec<String>, validation: bool) -> Self {
        let mut layers = Vec::new();
        let mut extensions = surface_extensions;
        if validation {
            layers.push(VALIDATION_LAYER.to_owned());
            extensions.push(DEBUG_UTILS_EXTENSION.to_owned());
        }
        Self {
            api_version,
            layers,
            extensions,
        }
    }

    /// API floor first, then layers, then extensions.
    pub fn check(&self, version: u32, layers: &[String], extensions: &[String]) -> Result<()> {
        require_version(Scope::Instance, self.api_version, version)?;
        require(Scope::Instance, Kind::Layer, &self.layers, layers)?;
        require(Scope::Instance, Kind::Extension, &self.extensions, extensions)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceRequirements {
    pub api_version: u32,
    pub layers: Vec<String>,
    pub extensions: Vec<String>,
}

impl DeviceRequirements {
    pub fn new(api_version: u32) -> Self {
        Self {
            api_version,
            layers: Vec::new(),
            extensions: vec![SWAPCHAIN_EXTENSION.to_owned()],
        }
    }
}
