//! lip package manager core
//!
//! This crate provides the engine behind the `lip` package manager:
//! - Go module path and version grammar, and module proxy URLs
//! - Package identifiers and specifiers
//! - Manifest parsing (tooth.json), templating and variant selection
//! - Migration of older manifest generations
//! - Package lock parsing and dependency graph analysis
//! - File sources, cache layout and runtime configuration

pub mod cache;
pub mod config;
pub mod identifier;
pub mod lockfile;
pub mod manifest;
pub mod migration;
pub mod module;
pub mod resolver;
pub mod semver;
pub mod source;
pub mod template;
pub mod validate;

pub use cache::{CacheError, CacheLayout};
pub use config::{ConfigError, RuntimeConfig};
pub use identifier::{IdentifierError, PackageIdentifier, PackageSpecifier};
pub use lockfile::{LockedPackage, LockfileError, PackageLock};
pub use manifest::{
    Asset, AssetType, Info, Manifest, ManifestError, ParseContext, Placement, PlacementType,
    SchemaViolation, Scripts, Variant, FORMAT_UUID, FORMAT_VERSION,
};
pub use migration::{MigrationContext, MigrationError, Migrator};
pub use resolver::{
    get_unnecessary_packages, topo_sort, DependencyResolver, LockGraph, MemoryIndex, PackageIndex,
    ResolverError,
};
pub use semver::{SemverError, Version, VersionRange};
pub use source::{
    DirectoryFileSource, FileSource, FileSourceEntry, PrefixedFileSource, SourceError,
    StandaloneFileSource,
};
