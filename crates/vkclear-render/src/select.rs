// SPDX-License-Identifier: CEPL-1.0
//! Physical device selection.
//!
//! Greedy single pass: the first discrete GPU that satisfies every
//! requirement wins immediately, otherwise the last viable adapter scanned
//! is kept. This is not a ranking.

use ash::vk;
use tracing::{debug, info};

use crate::caps::{self, DeviceRequirements, Kind};
use crate::driver::Driver;
use crate::error::{Error, Result, Scope};
use crate::version_string;

/// The chosen GPU and the queue families the renderer will use.
#[derive(Clone, Debug)]
pub struct Adapter {
    pub raw: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub graphics_family: u32,
    pub present_family: u32,
}

impl Adapter {
    pub fn shares_family(&self) -> bool {
        self.graphics_family == self.present_family
    }

    /// Distinct families, graphics first.
    pub fn queue_families(&self) -> Vec<u32> {
        if self.shares_family() {
            vec![self.graphics_family]
        } else {
            vec![self.graphics_family, self.present_family]
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueRoles {
    pub graphics: u32,
    pub present: u32,
}

/// Prefers a family that does both. Without one, graphics is the last
/// graphics-capable family and present the first presenting family.
pub fn find_queue_roles(
    families: &[vk::QueueFamilyProperties],
    mut can_present: impl FnMut(u32) -> Result<bool>,
) -> Result<Option<QueueRoles>> {
    let mut graphics = None;
    let mut present = None;

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics = Some(i);
            if can_present(i)? {
                present = Some(i);
                break;
            }
        }
    }

    if present.is_none() {
        for i in 0..families.len() as u32 {
            if can_present(i)? {
                present = Some(i);
                break;
            }
        }
    }

    Ok(match (graphics, present) {
        (Some(graphics), Some(present)) => Some(QueueRoles { graphics, present }),
        _ => None,
    })
}

/// # Safety
/// `instance` and `surface` must be live handles created through `driver`.
pub unsafe fn select_adapter<D: Driver>(
    driver: &D,
    instance: vk::Instance,
    surface: vk::SurfaceKHR,
    req: &DeviceRequirements,
) -> Result<Adapter> {
    // SAFETY: caller guarantees the handles; the adapters come from this instance.
    let adapters = unsafe { driver.physical_devices(instance) }
        .map_err(Error::query("vkEnumeratePhysicalDevices"))?;
    let mut chosen: Option<Adapter> = None;

    for phys in adapters {
        // SAFETY: `phys` was just enumerated from a live instance.
        let Some(candidate) = (unsafe { evaluate(driver, phys, surface, req)? }) else {
            continue;
        };
        let discrete = candidate.device_type == vk::PhysicalDeviceType::DISCRETE_GPU;
        chosen = Some(candidate);
        if discrete {
            break;
        }
    }

    let adapter = chosen.ok_or(Error::NoSuitableDevice)?;
    info!(
        "chose physical device '{}' ({:?}, Vulkan {}, graphics family {}, present family {})",
        adapter.name,
        adapter.device_type,
        version_string(adapter.api_version),
        adapter.graphics_family,
        adapter.present_family
    );
    Ok(adapter)
}

unsafe fn evaluate<D: Driver>(
    driver: &D,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    req: &DeviceRequirements,
) -> Result<Option<Adapter>> {
    // SAFETY (whole body): `phys` and `surface` are live, see `select_adapter`.
    let props = unsafe { driver.adapter_properties(phys) }
        .map_err(Error::query("vkGetPhysicalDeviceProperties"))?;

    let layers = unsafe { driver.device_layers(phys) }
        .map_err(Error::query("vkEnumerateDeviceLayerProperties"))?;
    if let Err(e) = caps::require(Scope::Device, Kind::Layer, &req.layers, &layers) {
        debug!("skipping '{}': {e}", props.name);
        return Ok(None);
    }

    let extensions = unsafe { driver.device_extensions(phys) }
        .map_err(Error::query("vkEnumerateDeviceExtensionProperties"))?;
    if let Err(e) = caps::require(Scope::Device, Kind::Extension, &req.extensions, &extensions) {
        debug!("skipping '{}': {e}", props.name);
        return Ok(None);
    }

    let families = unsafe { driver.queue_families(phys) }
        .map_err(Error::query("vkGetPhysicalDeviceQueueFamilyProperties"))?;
    let roles = find_queue_roles(&families, |i| {
        unsafe { driver.surface_support(phys, i, surface) }
            .map_err(Error::query("vkGetPhysicalDeviceSurfaceSupportKHR"))
    })?;
    let Some(roles) = roles else {
        debug!("skipping '{}': no graphics + present queue families", props.name);
        return Ok(None);
    };

    if let Err(e) = caps::require_version(Scope::Device, req.api_version, props.api_version) {
        debug!("skipping '{}': {e}", props.name);
        return Ok(None);
    }

    Ok(Some(Adapter {
        raw: phys,
        name: props.name,
        device_type: props.device_type,
        api_version: props.api_version,
        graphics_family: roles.graphics,
        present_family: roles.present,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAdapter, MockDriver};
    use ash::vk::Handle;

    const GFX: vk::QueueFlags = vk::QueueFlags::GRAPHICS;
    const XFER: vk::QueueFlags = vk::QueueFlags::TRANSFER;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn select(mock: &MockDriver) -> Result<Adapter> {
        let req = DeviceRequirements::new(vk::API_VERSION_1_2);
        unsafe {
            select_adapter(
                mock,
                vk::Instance::from_raw(1),
                vk::SurfaceKHR::from_raw(2),
                &req,
            )
        }
    }

    #[test]
    fn combined_family_is_preferred() {
        let families = [family(GFX), family(GFX | XFER)];
        let roles = find_queue_roles(&families, |i| Ok(i == 1)).unwrap();
        assert_eq!(
            roles,
            Some(QueueRoles {
                graphics: 1,
                present: 1
            })
        );
    }

    #[test]
    fn separate_families_when_none_combines() {
        let families = [family(GFX), family(XFER), family(GFX), family(XFER)];
        let roles = find_queue_roles(&families, |i| Ok(i == 1 || i == 3)).unwrap();
        assert_eq!(
            roles,
            Some(QueueRoles {
                graphics: 2,
                present: 1
            })
        );
    }

    #[test]
    fn unfilled_role_yields_none() {
        let roles = find_queue_roles(&[family(XFER)], |_| Ok(true)).unwrap();
        assert_eq!(roles, None);
        let roles = find_queue_roles(&[family(GFX)], |_| Ok(false)).unwrap();
        assert_eq!(roles, None);
    }

    #[test]
    fn discrete_beats_integrated() {
        let mock = MockDriver::default().with_adapters(vec![
            MockAdapter::integrated("igpu"),
            MockAdapter::discrete("dgpu"),
        ]);
        assert_eq!(select(&mock).unwrap().name, "dgpu");

        let mock = MockDriver::default().with_adapters(vec![
            MockAdapter::discrete("dgpu"),
            MockAdapter::integrated("igpu"),
        ]);
        assert_eq!(select(&mock).unwrap().name, "dgpu");
    }

    #[test]
    fn last_integrated_wins_without_discrete() {
        let mock = MockDriver::default().with_adapters(vec![
            MockAdapter::integrated("first"),
            MockAdapter::integrated("second"),
        ]);
        assert_eq!(select(&mock).unwrap().name, "second");
    }

    #[test]
    fn first_discrete_short_circuits() {
        let mock = MockDriver::default().with_adapters(vec![
            MockAdapter::discrete("a"),
            MockAdapter::discrete("b"),
        ]);
        assert_eq!(select(&mock).unwrap().name, "a");
    }

    #[test]
    fn no_valid_adapter() {
        let mock = MockDriver::default().with_adapters(vec![]);
        assert!(matches!(select(&mock), Err(Error::NoSuitableDevice)));

        let mut no_swapchain = MockAdapter::discrete("no-swapchain");
        no_swapchain.extensions.clear();
        let mut old = MockAdapter::discrete("old");
        old.api_version = vk::API_VERSION_1_0;
        let mut headless = MockAdapter::discrete("headless");
        headless.families = vec![(GFX, false)];
        let mock = MockDriver::default().with_adapters(vec![no_swapchain, old, headless]);
        assert!(matches!(select(&mock), Err(Error::NoSuitableDevice)));
    }

    #[test]
    fn invalid_discrete_does_not_beat_valid_integrated() {
        let mut broken = MockAdapter::discrete("broken");
        broken.families = vec![(XFER, true)];
        let mock = MockDriver::default()
            .with_adapters(vec![MockAdapter::integrated("igpu"), broken]);
        assert_eq!(select(&mock).unwrap().name, "igpu");
    }

    #[test]
    fn split_families_are_reported() {
        let mut split = MockAdapter::discrete("split");
        split.families = vec![(GFX, false), (XFER, true)];
        let mock = MockDriver::default().with_adapters(vec![split]);
        let adapter = select(&mock).unwrap();
        assert_eq!((adapter.graphics_family, adapter.present_family), (0, 1));
        assert!(!adapter.shares_family());
        assert_eq!(adapter.queue_families(), vec![0, 1]);
    }
}
