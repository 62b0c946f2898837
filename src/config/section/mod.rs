//! Configuration section definitions.
//!
//! Each module corresponds to a section in `edgeshift.toml`:
//!
//! | Module   | TOML Section | Purpose                                  |
//! |----------|--------------|------------------------------------------|
//! | `site`   | `[site]`     | Site URL, document root, directories     |
//! | `cache`  | `[cache]`    | Static file delivery toggles and scans   |
//! | `assets` | `[assets]`   | Registered external asset paths          |
//! | `remote` | `[remote]`   | Remote store folder and mirror           |
//! | `store`  | `[store]`    | Persisted state directory                |
//! | `serve`  | `[serve]`    | Rewrite/admin server                     |

mod assets;
mod cache;
mod remote;
mod serve;
mod site;
mod store;

pub use assets::{AssetPathEntry, AssetsSectionConfig};
pub use cache::{CacheSectionConfig, PluginEntry, ThemeEntry};
pub use remote::RemoteSectionConfig;
pub use serve::ServeConfig;
pub use site::{SiteDirs, SiteSectionConfig};
pub use store::{DEFAULT_STORE_DIR, StoreSectionConfig};
