//! Remote backends of a referenced site.
//!
//! Backends are resolved by type selector through a `PluginResolver` and
//! created lazily by a `BackendHandle`.

mod handle;
mod registry;
mod traits;

pub use handle::{BackendHandle, Backends, RoleState};
pub use registry::{FactoryListener, PluginRegistry, PluginResolver, Resolution, SubscriptionId};
pub use traits::{
    BackendFactory, BackendInstance, BackendRole, EntityDereferencer, EntitySearcher, SiteBackend,
};
