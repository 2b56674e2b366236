//! Build and install native third-party components from source.
//!
//! Each component is a [`Package`]: a name, a version, the archives its
//! sources come from and the capabilities (autotools, CMake, make) that know
//! how to configure, compile and install it. Packages are built through a
//! fixed sequence of [`Stage`]s into a directory layout shared by all of them,
//! so later packages can find the headers and libraries of earlier ones.

pub mod catalogue;
pub mod layout;
pub mod package;
pub mod platform;
pub mod util;

pub use catalogue::Catalogue;
pub use layout::Layout;
pub use package::{BuildContext, BuildError, Package, Stage};
pub use platform::{OsFamily, PlatformContext};
pub use util::context::GlobalContext;
