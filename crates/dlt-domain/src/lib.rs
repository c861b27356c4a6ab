#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod filename;
pub mod hosted;
pub mod manifest;
pub mod range;
pub mod spec;

pub use filename::{has_tarball_extension, ArtifactName, TARBALL_EXTENSIONS};
pub use hosted::{parse_git_url, GitHost, HostedGit};
pub use manifest::{
    name_from_install_path, BundledDependencies, DependencyMap, LockedPackage, PackageManifest,
    Shrinkwrap, ShrinkwrapEntry,
};
pub use range::{clean as clean_version, max_satisfying, parse_version, NpmRange, RangeError};
pub use spec::{is_valid_package_name, PackageSpec, SpecError, SpecKind};
