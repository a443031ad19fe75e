#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod asset_paths;
pub mod build;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod naming;
pub mod partition;
pub mod providers;
pub mod selection;
pub mod settings;

pub use build::{BuildOutcome, PackedBuilder, VirtualBuilder};
pub use catalog::{CatalogBuilder, ContentCatalogData, Location};
pub use config::{ConfigError, PipelineConfig};
pub use engine::{ArchiveEngine, BundleEngine};
pub use error::{BuildError, BuildResult};
pub use naming::BundleNameResolver;
pub use partition::GroupPartitioner;
pub use providers::ResourceProviderRegistrar;
pub use selection::{AllGroups, DEFAULT_SELECTION_FILE, GroupInclusion, GroupSelection};
pub use settings::{RuntimeSettings, write_runtime_pointer};
