//! Lazily created backend instances of one site.
//!
//! A `BackendHandle` creates at most one dereferencer and one searcher for
//! its site, on first use. A single creation mutex covers both roles, since
//! creating the searcher may also satisfy the dereferencer role when one
//! instance serves both. Readers only take the read side of the slot lock,
//! never the creation mutex.
//!
//! Factories that are not registered yet are awaited through a one-shot
//! subscription on the `PluginResolver`; creation then completes on the
//! registering thread, under the same mutex and with the same idempotence.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use crate::config::SiteConfiguration;

use super::registry::{FactoryListener, PluginResolver, Resolution, SubscriptionId};
use super::traits::{
    BackendFactory, BackendInstance, BackendRole, EntityDereferencer, EntitySearcher, SiteBackend,
};

/// Lifecycle of one backend role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleState {
    /// No type selector configured for this role.
    Unconfigured,
    /// Configured, creation not attempted yet.
    Uninitialized,
    /// Waiting for the factory to be registered.
    Pending,
    /// An instance serves this role.
    Ready,
    /// Creation failed; the role stays unavailable.
    Unavailable { reason: String },
    /// The handle was shut down.
    Closed,
}

/// Instances currently serving the two roles.
///
/// `Shared` is used when one instance serves both roles (same URI and same
/// type selector for dereferencer and searcher).
#[derive(Clone)]
pub enum Backends {
    Distinct {
        dereferencer: Option<Arc<dyn EntityDereferencer>>,
        searcher: Option<Arc<dyn EntitySearcher>>,
    },
    Shared(Arc<dyn SiteBackend>),
}

impl Default for Backends {
    fn default() -> Self {
        Self::Distinct {
            dereferencer: None,
            searcher: None,
        }
    }
}

impl Backends {
    #[must_use]
    pub fn dereferencer(&self) -> Option<Arc<dyn EntityDereferencer>> {
        match self {
            Self::Distinct { dereferencer, .. } => dereferencer.clone(),
            Self::Shared(backend) => Some(Arc::clone(backend).into_dereferencer()),
        }
    }

    #[must_use]
    pub fn searcher(&self) -> Option<Arc<dyn EntitySearcher>> {
        match self {
            Self::Distinct { searcher, .. } => searcher.clone(),
            Self::Shared(backend) => Some(Arc::clone(backend).into_searcher()),
        }
    }

    #[must_use]
    pub const fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Distinct {
                dereferencer,
                searcher,
            } => f
                .debug_struct("Distinct")
                .field("dereferencer", &dereferencer.as_ref().map(|d| d.backend_type().to_string()))
                .field("searcher", &searcher.as_ref().map(|s| s.backend_type().to_string()))
                .finish(),
            Self::Shared(backend) => f
                .debug_tuple("Shared")
                .field(&EntityDereferencer::backend_type(&**backend))
                .finish(),
        }
    }
}

#[derive(Debug)]
struct Creation {
    started: bool,
    closed: bool,
    subscriptions: Vec<(BackendRole, SubscriptionId)>,
    instances: Vec<BackendInstance>,
}

/// State readers see. Written only with the creation lock held.
#[derive(Debug)]
struct Slots {
    backends: Backends,
    dereferencer: RoleState,
    searcher: RoleState,
}

impl Slots {
    fn state(&self, role: BackendRole) -> &RoleState {
        match role {
            BackendRole::Dereferencer => &self.dereferencer,
            BackendRole::Searcher => &self.searcher,
        }
    }

    fn state_mut(&mut self, role: BackendRole) -> &mut RoleState {
        match role {
            BackendRole::Dereferencer => &mut self.dereferencer,
            BackendRole::Searcher => &mut self.searcher,
        }
    }

    /// Installs `instance` in `role` if it implements it.
    fn serve(&mut self, role: BackendRole, instance: &BackendInstance) -> bool {
        let served = match (role, &mut self.backends) {
            (BackendRole::Dereferencer, Backends::Distinct { dereferencer, .. }) => {
                *dereferencer = instance.dereferencer();
                dereferencer.is_some()
            }
            (BackendRole::Searcher, Backends::Distinct { searcher, .. }) => {
                *searcher = instance.searcher();
                searcher.is_some()
            }
            (_, Backends::Shared(_)) => false,
        };
        *self.state_mut(role) = if served {
            RoleState::Ready
        } else {
            RoleState::Unavailable {
                reason: format!("instance does not implement the {role} role"),
            }
        };
        served
    }
}

struct HandleInner {
    config: Arc<SiteConfiguration>,
    resolver: Arc<dyn PluginResolver>,
    shared: bool,
    started: AtomicBool,
    creation: Mutex<Creation>,
    slots: RwLock<Slots>,
}

/// Thread-safe, lazily initialised dereferencer/searcher pair of one site.
pub struct BackendHandle {
    inner: Arc<HandleInner>,
}

impl BackendHandle {
    /// Creates a handle; nothing is resolved until first use.
    #[must_use]
    pub fn new(config: Arc<SiteConfiguration>, resolver: Arc<dyn PluginResolver>) -> Self {
        let initial = |selector: Option<&str>| {
            if selector.is_some() {
                RoleState::Uninitialized
            } else {
                RoleState::Unconfigured
            }
        };
        let slots = Slots {
            backends: Backends::default(),
            dereferencer: initial(config.dereferencer_type()),
            searcher: initial(config.searcher_type()),
        };
        Self {
            inner: Arc::new(HandleInner {
                shared: config.shares_backend(),
                config,
                resolver,
                started: AtomicBool::new(false),
                creation: Mutex::new(Creation {
                    started: false,
                    closed: false,
                    subscriptions: Vec::new(),
                    instances: Vec::new(),
                }),
                slots: RwLock::new(slots),
            }),
        }
    }

    /// The dereferencer, creating it on first use. `None` while its factory is
    /// pending, after creation failed, or if none is configured.
    #[must_use]
    pub fn dereferencer(&self) -> Option<Arc<dyn EntityDereferencer>> {
        self.ensure_started();
        self.inner.read_slots(|s| s.backends.dereferencer())
    }

    /// The searcher, creating it on first use.
    #[must_use]
    pub fn searcher(&self) -> Option<Arc<dyn EntitySearcher>> {
        self.ensure_started();
        self.inner.read_slots(|s| s.backends.searcher())
    }

    /// Snapshot of the instances serving the two roles.
    #[must_use]
    pub fn backends(&self) -> Backends {
        self.ensure_started();
        self.current()
    }

    /// Instances created so far. Does not trigger creation.
    #[must_use]
    pub fn current(&self) -> Backends {
        self.inner.read_slots(|s| s.backends.clone())
    }

    /// Current lifecycle state of `role`. Does not trigger creation and never
    /// waits for one in progress.
    #[must_use]
    pub fn state(&self, role: BackendRole) -> RoleState {
        self.inner.read_slots(|s| s.state(role).clone())
    }

    /// Disposes created instances, cancels pending subscriptions and clears
    /// both roles. Idempotent.
    pub fn shutdown(&self) {
        let mut creation = self.inner.lock_creation();
        if creation.closed {
            return;
        }
        creation.closed = true;
        creation.started = true;
        self.inner.started.store(true, Ordering::Release);

        for (_, id) in creation.subscriptions.drain(..) {
            self.inner.resolver.unsubscribe(id);
        }
        for instance in creation.instances.drain(..) {
            instance.close();
        }
        self.inner.write_slots(|s| {
            *s = Slots {
                backends: Backends::default(),
                dereferencer: RoleState::Closed,
                searcher: RoleState::Closed,
            };
        });
        tracing::debug!(site = %self.inner.config.id(), "backends shut down");
    }

    fn ensure_started(&self) {
        if self.inner.started.load(Ordering::Acquire) {
            return;
        }
        let mut creation = self.inner.lock_creation();
        if creation.started {
            return;
        }
        creation.started = true;
        self.inner.start(&mut creation);
        self.inner.started.store(true, Ordering::Release);
    }
}

impl fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendHandle")
            .field("site", &self.inner.config.id())
            .field("shared", &self.inner.shared)
            .field("backends", &self.current())
            .finish_non_exhaustive()
    }
}

impl HandleInner {
    fn lock_creation(&self) -> MutexGuard<'_, Creation> {
        // Creation state is only mutated by infallible bookkeeping, so a
        // poisoned lock still holds consistent data.
        self.creation.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn read_slots<R>(&self, read: impl FnOnce(&Slots) -> R) -> R {
        let guard = self.slots.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        read(&guard)
    }

    fn write_slots<R>(&self, update: impl FnOnce(&mut Slots) -> R) -> R {
        let mut guard = self.slots.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        update(&mut guard)
    }

    /// Roles an instance created for `role` is expected to serve.
    fn roles_for(&self, role: BackendRole) -> &'static [BackendRole] {
        match role {
            BackendRole::Searcher if self.shared => &[BackendRole::Searcher, BackendRole::Dereferencer],
            BackendRole::Searcher => &[BackendRole::Searcher],
            BackendRole::Dereferencer => &[BackendRole::Dereferencer],
        }
    }

    fn selector(&self, role: BackendRole) -> Option<&str> {
        match role {
            BackendRole::Dereferencer => self.config.dereferencer_type(),
            BackendRole::Searcher => self.config.searcher_type(),
        }
    }

    /// Resolves both roles. Called once, with the creation lock held.
    fn start(self: &Arc<Self>, creation: &mut Creation) {
        // A shared instance is created through the searcher role.
        let roles: &[BackendRole] = if self.shared {
            &[BackendRole::Searcher]
        } else {
            &[BackendRole::Searcher, BackendRole::Dereferencer]
        };
        for &role in roles {
            let Some(selector) = self.selector(role) else {
                continue;
            };
            match self.resolver.resolve_or_subscribe(selector, self.listener(role)) {
                Resolution::Ready(factory) => self.create(creation, role, factory.as_ref()),
                Resolution::Pending(id) => {
                    creation.subscriptions.push((role, id));
                    self.write_slots(|s| {
                        for &r in self.roles_for(role) {
                            *s.state_mut(r) = RoleState::Pending;
                        }
                    });
                }
            }
        }
    }

    fn listener(self: &Arc<Self>, role: BackendRole) -> FactoryListener {
        let weak: Weak<Self> = Arc::downgrade(self);
        Box::new(move |factory| {
            if let Some(inner) = weak.upgrade() {
                inner.complete(role, factory.as_ref());
            }
        })
    }

    /// Completes creation for a factory that became available later.
    fn complete(&self, role: BackendRole, factory: &dyn BackendFactory) {
        let mut creation = self.lock_creation();
        if creation.closed {
            return;
        }
        creation.subscriptions.retain(|(r, _)| *r != role);
        tracing::info!(site = %self.config.id(), %role, "backend factory became available");
        self.create(&mut creation, role, factory);
    }

    fn create(&self, creation: &mut Creation, role: BackendRole, factory: &dyn BackendFactory) {
        let roles = self.roles_for(role);
        if self.read_slots(|s| roles.iter().any(|&r| *s.state(r) == RoleState::Ready)) {
            return;
        }
        let instance = match factory.create(&self.config) {
            Ok(instance) => instance,
            Err(e) => {
                tracing::error!(site = %self.config.id(), %role, selector = ?self.selector(role), error = %e, "unable to create backend");
                let reason = e.to_string();
                self.write_slots(|s| {
                    for &r in roles {
                        *s.state_mut(r) = RoleState::Unavailable {
                            reason: reason.clone(),
                        };
                    }
                });
                return;
            }
        };

        if self.shared {
            if let BackendInstance::Both(backend) = &instance {
                let backend = Arc::clone(backend);
                self.write_slots(|s| {
                    s.backends = Backends::Shared(backend);
                    s.searcher = RoleState::Ready;
                    s.dereferencer = RoleState::Ready;
                });
                tracing::debug!(site = %self.config.id(), "created shared dereferencer/searcher");
                creation.instances.push(instance);
                return;
            }
        }

        let mut used = false;
        for &r in roles {
            if self.write_slots(|s| s.serve(r, &instance)) {
                tracing::debug!(site = %self.config.id(), role = %r, "created backend");
                used = true;
            } else {
                tracing::error!(site = %self.config.id(), role = %r, instance = ?instance, "factory did not produce this role");
            }
        }
        if used {
            creation.instances.push(instance);
        } else {
            instance.close();
        }
    }
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        let creation = self
            .creation
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for (_, id) in creation.subscriptions.drain(..) {
            self.resolver.unsubscribe(id);
        }
    }
}
