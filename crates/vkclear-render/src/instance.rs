// SPDX-License-Identifier: CEPL-1.0
use std::rc::Rc;

use ash::vk;
use tracing::{debug, info};

use crate::caps::InstanceRequirements;
use crate::driver::{DebugMessengerDesc, Driver, InstanceDesc};
use crate::error::{Error, Result};
use crate::{version_string, PresentTarget, RenderConfig};

/// Connection to the Vulkan runtime. Destroyed last.
pub struct Instance<D: Driver> {
    driver: Rc<D>,
    raw: vk::Instance,
}

impl<D: Driver> Instance<D> {
    /// Negotiates the API floor, layers and extensions, then creates the
    /// instance. A missing requirement is fatal; nothing is substituted.
    pub fn new(driver: Rc<D>, cfg: &RenderConfig, target: &PresentTarget) -> Result<Rc<Self>> {
        let version = driver
            .instance_version()
            .map_err(Error::query("vkEnumerateInstanceVersion"))?;
        let surface_exts = driver
            .surface_extensions(target.display)
            .map_err(Error::query("enumerate_required_extensions"))?;
        let layers = driver
            .instance_layers()
            .map_err(Error::query("vkEnumerateInstanceLayerProperties"))?;
        let extensions = driver
            .instance_extensions()
            .map_err(Error::query("vkEnumerateInstanceExtensionProperties"))?;

        let requirements = InstanceRequirements::new(cfg.api_version, surface_exts, cfg.validation);
        requirements.check(version, &layers, &extensions)?;
        debug!(
            "instance layers {:?}, extensions {:?}",
            requirements.layers, requirements.extensions
        );

        let desc = InstanceDesc {
            app_name: &cfg.app_name,
            api_version: cfg.api_version,
            layers: &requirements.layers,
            extensions: &requirements.extensions,
        };
        // SAFETY: every layer and extension in `desc` was checked above.
        let raw = unsafe { driver.create_instance(&desc) }.map_err(Error::create("vkCreateInstance"))?;
        info!(
            "created Vulkan instance (runtime {}, requested {})",
            version_string(version),
            version_string(cfg.api_version)
        );

        Ok(Rc::new(Self { driver, raw }))
    }

    pub fn raw(&self) -> vk::Instance {
        self.raw
    }

    pub fn driver(&self) -> &Rc<D> {
        &self.driver
    }
}

impl<D: Driver> Drop for Instance<D> {
    fn drop(&mut self) {
        // SAFETY: every child holds an Rc to us, so none is alive here.
        unsafe { self.driver.destroy_instance(self.raw) };
    }
}

/// Validation-layer callback registration.
pub struct DebugMessenger<D: Driver> {
    instance: Rc<Instance<D>>,
    raw: vk::DebugUtilsMessengerEXT,
}

impl<D: Driver> DebugMessenger<D> {
    pub fn new(instance: &Rc<Instance<D>>) -> Result<Self> {
        let desc = DebugMessengerDesc {
            severity: vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            types: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        };
        // SAFETY: the instance was created with VK_EXT_debug_utils when
        // validation is on, which is the only path that gets here.
        let raw = unsafe { instance.driver.create_debug_messenger(instance.raw, &desc) }
            .map_err(Error::create("vkCreateDebugUtilsMessengerEXT"))?;
        info!("created debug messenger");
        Ok(Self {
            instance: Rc::clone(instance),
            raw,
        })
    }
}

impl<D: Driver> Drop for DebugMessenger<D> {
    fn drop(&mut self) {
        // SAFETY: created from this instance, which is still alive.
        unsafe {
            self.instance
                .driver
                .destroy_debug_messenger(self.instance.raw, self.raw)
        };
    }
}

/// Presentable target bound to a native window.
pub struct Surface<D: Driver> {
    instance: Rc<Instance<D>>,
    raw: vk::SurfaceKHR,
}

impl<D: Driver> Surface<D> {
    pub fn new(instance: &Rc<Instance<D>>, target: &PresentTarget) -> Result<Rc<Self>> {
        // SAFETY: the surface extensions for this display were required at
        // instance creation; the window outlives the renderer.
        let raw = unsafe { instance.driver.create_surface(instance.raw, target) }
            .map_err(Error::create("vkCreateSurfaceKHR"))?;
        info!("created surface");
        Ok(Rc::new(Self {
            instance: Rc::clone(instance),
            raw,
        }))
    }

    pub fn raw(&self) -> vk::SurfaceKHR {
        self.raw
    }
}

impl<D: Driver> Drop for Surface<D> {
    fn drop(&mut self) {
        // SAFETY: swapchains hold an Rc to the surface, so none remain.
        unsafe { self.instance.driver.destroy_surface(self.instance.raw, self.raw) };
    }
}
