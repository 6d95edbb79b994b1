//! Driver registry and factory for conduit components.
//!
//! This crate maps component type tags to the factories that build their
//! drivers. A [`DriverRegistry`] is created once at startup, handed to each
//! [`Topology`](conduit_core::Topology) as its
//! [`DriverLookup`](conduit_core::DriverLookup), and shut down explicitly
//! when the firmware stops.
//!
//! # Features
//!
//! - **Driver Discovery**: List all registered drivers with metadata
//! - **Factory Pattern**: Build components from descriptors at runtime
//! - **Category System**: Drivers organized by role (endpoint, processing, analysis)
//! - **Out-of-tree Drivers**: Register factories for `ComponentType::Custom` tags
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use conduit_core::{ComponentDescriptor, ComponentType, DomainConfig, Services, Topology};
//! use conduit_registry::DriverRegistry;
//!
//! let registry = Arc::new(DriverRegistry::new());
//! for driver in registry.all_drivers() {
//!     println!("{}: {}", driver.tag, driver.description);
//! }
//!
//! let services = Services::default().with_drivers(registry.clone());
//! let mut topo = Topology::new(DomainConfig::default(), services);
//! topo.new_component(&ComponentDescriptor::new(12, 1, ComponentType::Volume)).unwrap();
//!
//! registry.shutdown();
//! ```

use conduit_components::{DaiEndpoint, HostEndpoint, LevelDetector, Mixer, RateConverter, Volume};
use conduit_core::{ComponentDescriptor, ComponentError, ComponentFactory, ComponentOps, ComponentType, DriverLookup};
use parking_lot::RwLock;
use thiserror::Error;

/// Role of a driver, for organization and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverCategory {
    /// Pipeline endpoints facing the host or the hardware
    Endpoint,
    /// Components that transform the audio
    Processing,
    /// Components that observe the audio and report to the host
    Analysis,
}

impl DriverCategory {
    /// Returns a human-readable name for the category.
    pub const fn name(&self) -> &'static str {
        match self {
            DriverCategory::Endpoint => "Endpoint",
            DriverCategory::Processing => "Processing",
            DriverCategory::Analysis => "Analysis",
        }
    }

    /// Returns a description of the category.
    pub const fn description(&self) -> &'static str {
        match self {
            DriverCategory::Endpoint => "Host and DAI endpoints that move audio in and out of a pipeline",
            DriverCategory::Processing => "Gain, mixing, rate conversion and other transforms",
            DriverCategory::Analysis => "Detectors and meters that raise host events",
        }
    }
}

/// Describes a driver in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverDescriptor {
    /// Component type the driver handles.
    pub kind: ComponentType,
    /// Type tag used in topology files.
    pub tag: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// Brief description of the driver.
    pub description: &'static str,
    /// Category for organization.
    pub category: DriverCategory,
    /// Descriptor parameters the driver reads.
    pub params: &'static [&'static str],
}

/// Errors raised while registering drivers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A driver for this type is already registered.
    #[error("a driver for '{0}' is already registered")]
    Duplicate(ComponentType),

    /// The registry has been shut down.
    #[error("driver registry is shut down")]
    ShutDown,
}

/// Internal entry in the registry.
struct RegistryEntry {
    descriptor: DriverDescriptor,
    factory: ComponentFactory,
}

struct Entries {
    list: Vec<RegistryEntry>,
    open: bool,
}

/// Registry of component drivers.
///
/// Shared by every topology of the process. Registration and shutdown take
/// `&self`, so drivers can be added after the registry was handed out.
pub struct DriverRegistry {
    entries: RwLock<Entries>,
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverRegistry {
    /// Create a new registry with all built-in drivers registered.
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register_builtin_drivers();
        registry
    }

    /// Create a registry with no drivers.
    pub fn empty() -> Self {
        Self {
            entries: RwLock::new(Entries {
                list: Vec::with_capacity(6),
                open: true,
            }),
        }
    }

    /// Register all built-in drivers.
    fn register_builtin_drivers(&self) {
        let builtins: [(DriverDescriptor, ComponentFactory); 6] = [
            (
                DriverDescriptor {
                    kind: ComponentType::Host,
                    tag: "host",
                    name: "Host Endpoint",
                    description: "Moves audio between the host DMA ring and the pipeline",
                    category: DriverCategory::Endpoint,
                    params: &[],
                },
                |desc| Ok(Box::new(HostEndpoint::new(desc)?)),
            ),
            (
                DriverDescriptor {
                    kind: ComponentType::Dai,
                    tag: "dai",
                    name: "DAI Endpoint",
                    description: "Digital audio interface; raises xruns on starvation",
                    category: DriverCategory::Endpoint,
                    params: &[],
                },
                |desc| Ok(Box::new(DaiEndpoint::new(desc)?)),
            ),
            (
                DriverDescriptor {
                    kind: ComponentType::Volume,
                    tag: "volume",
                    name: "Volume",
                    description: "Fixed gain stage",
                    category: DriverCategory::Processing,
                    params: &["gain_db"],
                },
                |desc| Ok(Box::new(Volume::new(desc)?)),
            ),
            (
                DriverDescriptor {
                    kind: ComponentType::Src,
                    tag: "src",
                    name: "Sample-Rate Converter",
                    description: "Linear-interpolating rate converter",
                    category: DriverCategory::Processing,
                    params: &["rate"],
                },
                |desc| Ok(Box::new(RateConverter::new(desc)?)),
            ),
            (
                DriverDescriptor {
                    kind: ComponentType::Mixer,
                    tag: "mixer",
                    name: "Mixer",
                    description: "Sums several sources into one sink",
                    category: DriverCategory::Processing,
                    params: &[],
                },
                |desc| Ok(Box::new(Mixer::new(desc)?)),
            ),
            (
                DriverDescriptor {
                    kind: ComponentType::Detect,
                    tag: "detect",
                    name: "Level Detector",
                    description: "Raises a host event when the level crosses a threshold",
                    category: DriverCategory::Analysis,
                    params: &["threshold_db"],
                },
                |desc| Ok(Box::new(LevelDetector::new(desc)?)),
            ),
        ];

        let mut entries = self.entries.write();
        for (descriptor, factory) in builtins {
            entries.list.push(RegistryEntry { descriptor, factory });
        }
    }

    /// Register a driver.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Duplicate`] if the type already has a driver,
    /// [`RegistryError::ShutDown`] after [`shutdown`](Self::shutdown).
    pub fn register(&self, descriptor: DriverDescriptor, factory: ComponentFactory) -> Result<(), RegistryError> {
        let mut entries = self.entries.write();
        if !entries.open {
            return Err(RegistryError::ShutDown);
        }
        if entries.list.iter().any(|e| e.descriptor.kind == descriptor.kind) {
            return Err(RegistryError::Duplicate(descriptor.kind));
        }
        tracing::debug!(kind = %descriptor.kind, tag = descriptor.tag, "driver registered");
        entries.list.push(RegistryEntry { descriptor, factory });
        Ok(())
    }

    /// Returns descriptors for all registered drivers.
    pub fn all_drivers(&self) -> Vec<DriverDescriptor> {
        self.entries.read().list.iter().map(|e| e.descriptor.clone()).collect()
    }

    /// Returns descriptors for drivers in a specific category.
    pub fn drivers_in_category(&self, category: DriverCategory) -> Vec<DriverDescriptor> {
        self.entries
            .read()
            .list
            .iter()
            .filter(|e| e.descriptor.category == category)
            .map(|e| e.descriptor.clone())
            .collect()
    }

    /// Get a descriptor by type tag.
    pub fn get(&self, tag: &str) -> Option<DriverDescriptor> {
        self.entries
            .read()
            .list
            .iter()
            .find(|e| e.descriptor.tag == tag)
            .map(|e| e.descriptor.clone())
    }

    /// Build a driver for `desc`.
    ///
    /// Returns `None` if no driver handles the descriptor's type.
    pub fn create(&self, desc: &ComponentDescriptor) -> Option<Result<Box<dyn ComponentOps>, ComponentError>> {
        self.lookup(desc.kind).map(|factory| factory(desc))
    }

    /// Drops every driver and refuses further registration.
    ///
    /// Topologies holding the registry can no longer create components;
    /// components already built are unaffected.
    pub fn shutdown(&self) {
        let mut entries = self.entries.write();
        tracing::debug!(drivers = entries.list.len(), "driver registry shutdown");
        entries.list.clear();
        entries.open = false;
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        !self.entries.read().open
    }

    /// Returns the number of registered drivers.
    pub fn len(&self) -> usize {
        self.entries.read().list.len()
    }

    /// Returns true if no drivers are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().list.is_empty()
    }
}

impl DriverLookup for DriverRegistry {
    fn lookup(&self, kind: ComponentType) -> Option<ComponentFactory> {
        self.entries
            .read()
            .list
            .iter()
            .find(|e| e.descriptor.kind == kind)
            .map(|e| e.factory)
    }
}

#[cfg(test)]
mod tests {
    use conduit_core::{NodeContext, PathStatus};

    use super::*;

    struct Silence;

    impl ComponentOps for Silence {
        fn copy(&mut self, _ctx: &mut NodeContext<'_>) -> Result<PathStatus, ComponentError> {
            Ok(PathStatus::Continue)
        }
    }

    fn custom(code: u32) -> DriverDescriptor {
        DriverDescriptor {
            kind: ComponentType::Custom(code),
            tag: "silence",
            name: "Silence",
            description: "Does nothing",
            category: DriverCategory::Processing,
            params: &[],
        }
    }

    #[test]
    fn test_registry_creation() {
        let registry = DriverRegistry::new();
        assert_eq!(registry.len(), 6);
        assert!(DriverRegistry::empty().is_empty());
    }

    #[test]
    fn test_get_driver() {
        let registry = DriverRegistry::new();

        let src = registry.get("src").unwrap();
        assert_eq!(src.kind, ComponentType::Src);
        assert_eq!(src.params, &["rate"]);

        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_drivers_by_category() {
        let registry = DriverRegistry::new();
        assert_eq!(registry.drivers_in_category(DriverCategory::Endpoint).len(), 2);
        assert_eq!(registry.drivers_in_category(DriverCategory::Processing).len(), 3);
        assert_eq!(registry.drivers_in_category(DriverCategory::Analysis).len(), 1);
    }

    #[test]
    fn test_category_names() {
        assert_eq!(DriverCategory::Endpoint.name(), "Endpoint");
        assert_eq!(DriverCategory::Analysis.name(), "Analysis");
    }

    #[test]
    fn test_tags_parse_back_to_their_type() {
        let registry = DriverRegistry::new();
        for driver in registry.all_drivers() {
            assert_eq!(driver.tag.parse::<ComponentType>().unwrap(), driver.kind);
        }
    }

    #[test]
    fn test_all_parameterless_drivers_can_be_created() {
        let registry = DriverRegistry::new();

        for driver in registry.all_drivers() {
            let desc = ComponentDescriptor::new(1, 1, driver.kind);
            let created = registry.create(&desc).unwrap();
            // The rate converter cannot guess its target rate.
            assert_eq!(created.is_ok(), driver.kind != ComponentType::Src, "{}", driver.tag);
        }
    }

    #[test]
    fn test_factory_reports_bad_params() {
        let registry = DriverRegistry::new();
        let desc = ComponentDescriptor::new(1, 1, ComponentType::Volume).with_param("gain_db", "x");
        assert!(matches!(registry.create(&desc), Some(Err(ComponentError::InvalidParams(_)))));
    }

    #[test]
    fn test_register_custom_driver() {
        let registry = DriverRegistry::new();
        registry.register(custom(7), |_| Ok(Box::new(Silence))).unwrap();
        assert_eq!(registry.len(), 7);
        assert!(registry.lookup(ComponentType::Custom(7)).is_some());

        let err = registry.register(custom(7), |_| Ok(Box::new(Silence))).unwrap_err();
        assert_eq!(err, RegistryError::Duplicate(ComponentType::Custom(7)));
    }

    #[test]
    fn test_shutdown_clears_and_closes() {
        let registry = DriverRegistry::new();
        registry.shutdown();
        assert!(registry.is_shut_down());
        assert!(registry.is_empty());
        assert!(registry.lookup(ComponentType::Host).is_none());
        assert_eq!(
            registry.register(custom(1), |_| Ok(Box::new(Silence))),
            Err(RegistryError::ShutDown)
        );
    }
}
