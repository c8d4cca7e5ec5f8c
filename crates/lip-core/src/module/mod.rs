//! Go module grammar
//!
//! Tooth paths are Go module paths and tooth versions are published through Go
//! module proxies, so lip speaks the same version and path grammar.

pub mod path;
pub mod proxy;
pub mod semver;

pub use path::{
    canonical_version, check_file_path, check_import_path, check_path, check_path_major,
    escape_path, escape_version, match_path_major, split_path_version, unescape_path,
    unescape_version, PathError, PathKind,
};
pub use proxy::{archive_prefix, parse_version_list, proxy_version, ModuleProxy, ProxyError};
