//! # Hermitcrab: The Shell
//!
//! **Concrete backends for the rusty-curator engine.**
//!
//! Hermitcrab supplies everything the engine treats as an external
//! collaborator: it fetches the catalog and release archives over HTTP,
//! keeps track of registry packages in a project manifest, and stores
//! imported archives inside the project.
//!
//! ## Backends
//!
//! - [`SurfFetcher`]: `RemoteFetcher` over surf, with redirect following for
//!   release downloads.
//! - [`ProjectRegistry`]: `RegistryBackend` over `Packages/manifest.json`,
//!   reporting checked-in packages as embedded.
//! - [`DirectoryStore`]: `ArchiveStore` importing archives under
//!   `Assets/Imported/<reference_id>/`, indexed in `Library/curator-store.toml`.
//!
//! ## Usage
//!
//! ```no_run
//! use hermitcrab::{config, DirectoryStore, ProjectRegistry};
//! use rusty_curator_core::backend::ArchiveStore;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = config::load_settings()?;
//!     let store = DirectoryStore::new(&settings.project_dir)?;
//!     let _registry = ProjectRegistry::new(&settings.project_dir);
//!
//!     println!("installed: {}", store.exists("2b5c1f9e"));
//!     Ok(())
//! }
//! ```

/// Settings file and environment resolution.
pub mod config;

/// HTTP transport.
pub mod fetch;

/// Project-manifest registry backend.
pub mod registry;

/// Directory-backed archive store.
pub mod store;

pub use fetch::SurfFetcher;
pub use registry::ProjectRegistry;
pub use store::DirectoryStore;
