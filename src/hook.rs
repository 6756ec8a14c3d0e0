//! Hook descriptors and their install/remove lifecycle
//!
//! A [`Hook`] pairs a symbol name with a replacement function and an
//! [`Original`] slot the replacement calls through. It walks the stages
//!
//! ```text
//! Unresolved -> Resolved -> Installed -> Active -> Removed
//! ```
//!
//! `Installed` (filter set, not registered) only outlives a call when tearing
//! the filter down failed; `remove` can then be retried.

use crate::{
    Error, Result,
    error::{config_error, invalid_state},
    intercept::Interceptor,
    ops::{CallThrough, OpsFlags, TraceOps},
    symbol::{self, Address, SymbolLookup},
};
use alloc::{borrow::Cow, boxed::Box};
use core::{fmt::Debug, sync::atomic::Ordering};

#[cfg(not(feature = "portable-atomic"))]
use core::sync::atomic::AtomicUsize;
#[cfg(feature = "portable-atomic")]
use portable_atomic::AtomicUsize;

/// The cell a replacement reads to reach the original function.
///
/// Declared as a `static` next to the replacement and bound to exactly one
/// [`Hook`]. The hook writes it once per install, before the hook goes live,
/// and never while the hook is active, so readers need no lock.
///
/// # Examples
/// ```rust
/// use ftrace_hook::Original;
///
/// static REAL_OPEN: Original = Original::new();
///
/// extern "C" fn open_hook(flags: i32) -> i32 {
///     match unsafe { REAL_OPEN.get_fn::<extern "C" fn(i32) -> i32>() } {
///         Some(real) => real(flags),
///         None => -1,
///     }
/// }
/// # let _ = open_hook;
/// ```
pub struct Original {
    addr: AtomicUsize,
}

impl Original {
    /// Creates an empty slot.
    pub const fn new() -> Self {
        Self {
            addr: AtomicUsize::new(0),
        }
    }

    /// Gets the original entry point, `None` until the bound hook resolves.
    #[inline]
    pub fn get(&self) -> Option<Address> {
        Address::new(self.addr.load(Ordering::Acquire))
    }

    /// Gets the original entry point as a function pointer of type `F`.
    ///
    /// # Safety
    /// `F` must be a function pointer type matching the original's signature,
    /// and the hook must not have been removed since the address was stored.
    ///
    /// # Panics
    /// If `F` is not pointer-sized.
    #[inline]
    pub unsafe fn get_fn<F: Copy>(&self) -> Option<F> {
        assert_eq!(
            size_of::<F>(),
            size_of::<usize>(),
            "original entry read as a non pointer-sized type"
        );
        let addr = self.get()?.get();
        Some(unsafe { *(&addr as *const usize as *const F) })
    }

    #[inline]
    pub(crate) fn set(&self, addr: Address) {
        self.addr.store(addr.get(), Ordering::Release);
    }
}

impl Default for Original {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Original {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Original").field(&self.get()).finish()
    }
}

/// Observable lifecycle stage of a [`Hook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStatus {
    /// No address has been looked up yet.
    Unresolved,
    /// The address is known and the original slot is populated.
    Resolved,
    /// The filter is set but the ops are not registered.
    Installed,
    /// Calls to the symbol are redirected to the replacement.
    Active,
    /// The hook was torn down; installing again re-resolves.
    Removed,
}

enum Stage {
    Unresolved,
    Resolved { address: Address },
    Installed { address: Address, ops: Box<TraceOps> },
    Active { address: Address, ops: Box<TraceOps> },
    Removed { address: Address },
}

impl Stage {
    fn status(&self) -> HookStatus {
        match self {
            Stage::Unresolved => HookStatus::Unresolved,
            Stage::Resolved { .. } => HookStatus::Resolved,
            Stage::Installed { .. } => HookStatus::Installed,
            Stage::Active { .. } => HookStatus::Active,
            Stage::Removed { .. } => HookStatus::Removed,
        }
    }

    fn address(&self) -> Option<Address> {
        match self {
            Stage::Unresolved => None,
            Stage::Resolved { address }
            | Stage::Installed { address, .. }
            | Stage::Active { address, .. }
            | Stage::Removed { address } => Some(*address),
        }
    }
}

/// One interception: a symbol, its replacement and the slot to call through.
pub struct Hook {
    name: Cow<'static, str>,
    replacement: Address,
    original: &'static Original,
    flags: OpsFlags,
    call_through: Option<CallThrough>,
    stage: Stage,
}

impl Hook {
    /// Creates an unresolved hook.
    ///
    /// Fails with [`Error::Config`] for an empty name or a null replacement.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        replacement: *const (),
        original: &'static Original,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(config_error("hook name must not be empty"));
        }
        let Some(replacement) = Address::from_ptr(replacement) else {
            return Err(config_error(alloc::format!(
                "hook [{name}] has a null replacement"
            )));
        };
        Ok(Self {
            name,
            replacement,
            original,
            flags: OpsFlags::empty(),
            call_through: None,
            stage: Stage::Unresolved,
        })
    }

    /// Requests extra subsystem capabilities on top of `SAVE_REGS | IPMODIFY`.
    pub fn with_flags(mut self, flags: OpsFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Chooses how the replacement reaches the original.
    ///
    /// Required before the hook can resolve, unless a [`RegistryBuilder`]
    /// supplies it.
    ///
    /// [`RegistryBuilder`]: crate::RegistryBuilder
    pub fn with_call_through(mut self, call_through: CallThrough) -> Self {
        self.call_through = Some(call_through);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn replacement(&self) -> Address {
        self.replacement
    }

    /// Gets the slot this hook populates.
    #[inline]
    pub fn original(&self) -> &'static Original {
        self.original
    }

    /// Gets the resolved address of the symbol, if resolution succeeded.
    #[inline]
    pub fn address(&self) -> Option<Address> {
        self.stage.address()
    }

    #[inline]
    pub fn status(&self) -> HookStatus {
        self.stage.status()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self.stage, Stage::Active { .. })
    }

    #[inline]
    pub fn call_through(&self) -> Option<&CallThrough> {
        self.call_through.as_ref()
    }

    /// Gets the subsystem state, present while installed or active.
    pub fn ops(&self) -> Option<&TraceOps> {
        match &self.stage {
            Stage::Installed { ops, .. } | Stage::Active { ops, .. } => Some(ops),
            _ => None,
        }
    }

    pub(crate) fn set_defaults(&mut self, flags: OpsFlags, call_through: Option<&CallThrough>) {
        self.flags |= flags;
        if self.call_through.is_none() {
            self.call_through = call_through.cloned();
        }
    }

    /// Checks that the replacement can call through to the original.
    pub(crate) fn checked_call_through(&self) -> Result<&CallThrough> {
        match &self.call_through {
            None => Err(config_error(alloc::format!(
                "hook [{}] has no call-through mode",
                self.name
            ))),
            Some(mode) if !mode.is_usable() => Err(config_error(alloc::format!(
                "hook [{}] guards an empty caller range",
                self.name
            ))),
            Some(mode) => Ok(mode),
        }
    }

    /// Looks the symbol up and populates the original slot.
    ///
    /// On failure the hook is left untouched. A hook without a usable
    /// call-through mode fails with [`Error::Config`] before any lookup.
    pub fn resolve<L: SymbolLookup + ?Sized>(&mut self, lookup: &L) -> Result<Address> {
        let call_through = self.checked_call_through()?;
        match self.stage {
            Stage::Unresolved | Stage::Resolved { .. } | Stage::Removed { .. } => {}
            _ => {
                return Err(invalid_state(
                    &self.name,
                    "unresolved, resolved or removed",
                    self.status(),
                ));
            }
        }
        let address = symbol::resolve(lookup, &self.name)?;
        let Some(entry) = call_through.original_entry(address) else {
            return Err(crate::error::symbol_not_found(&self.name));
        };
        // the slot is published before the hook can go live
        self.original.set(entry);
        self.stage = Stage::Resolved { address };
        #[cfg(feature = "log")]
        log::debug!(
            "[Hook] [{}] resolved to {}, original entry {}",
            self.name,
            address,
            entry
        );
        Ok(address)
    }

    /// Resolves the symbol and redirects it to the replacement.
    ///
    /// On success the hook is [`HookStatus::Active`]. A failed registration
    /// clears the filter again before the error is returned; if that also fails
    /// the hook stays [`HookStatus::Installed`] so [`remove`](Self::remove) can
    /// retry, and the registration error is still the one reported.
    pub fn install<L, I>(&mut self, lookup: &L, interceptor: &mut I) -> Result<()>
    where
        L: SymbolLookup + ?Sized,
        I: Interceptor + ?Sized,
    {
        let call_through = self.checked_call_through()?.clone();
        let address = self
            .resolve(lookup)
            .map_err(|err| match err {
                err @ (Error::InvalidState { .. } | Error::Config { .. }) => err,
                err => Error::ResolutionFailed {
                    name: self.name.clone(),
                    source: Box::new(err),
                },
            })?;

        let ops = Box::new(TraceOps::new(
            address,
            self.replacement,
            self.flags,
            call_through,
        ));

        if let Err(errno) = interceptor.enable_filter(&ops, address) {
            #[cfg(feature = "log")]
            log::debug!("[Hook] [{}] filter rejected: {}", self.name, errno);
            return Err(Error::FilterConfigFailed {
                name: self.name.clone(),
                errno,
            });
        }
        #[cfg(feature = "log")]
        log::trace!("[Hook] [{}] filter set at {}", self.name, address);

        if let Err(errno) = interceptor.register_active(&ops) {
            #[cfg(feature = "log")]
            log::debug!("[Hook] [{}] registration rejected: {}", self.name, errno);
            match interceptor.disable_filter(&ops, address) {
                Ok(()) => self.stage = Stage::Resolved { address },
                Err(_teardown) => {
                    #[cfg(feature = "log")]
                    log::error!(
                        "[Hook] [{}] failed to clear filter after rejected registration: {}",
                        self.name,
                        _teardown
                    );
                    self.stage = Stage::Installed { address, ops };
                }
            }
            return Err(Error::ActivationFailed {
                name: self.name.clone(),
                errno,
            });
        }

        self.stage = Stage::Active { address, ops };
        #[cfg(feature = "log")]
        log::debug!(
            "[Hook] [{}] active: {} -> {}",
            self.name,
            address,
            self.replacement
        );
        Ok(())
    }

    /// Stops redirection and releases the subsystem state.
    ///
    /// Stops at the first failing step. A failed unregistration leaves the hook
    /// [`HookStatus::Active`]; a failed filter teardown leaves it
    /// [`HookStatus::Installed`]. The original slot keeps its value, but the
    /// replacement must not call it once the hook is removed.
    pub fn remove<I: Interceptor + ?Sized>(&mut self, interceptor: &mut I) -> Result<()> {
        let stage = core::mem::replace(&mut self.stage, Stage::Unresolved);
        let (address, ops) = match stage {
            Stage::Active { address, ops } => {
                if let Err(errno) = interceptor.unregister_active(&ops) {
                    self.stage = Stage::Active { address, ops };
                    return Err(Error::DeactivationFailed {
                        name: self.name.clone(),
                        errno,
                    });
                }
                #[cfg(feature = "log")]
                log::trace!("[Hook] [{}] unregistered", self.name);
                (address, ops)
            }
            Stage::Installed { address, ops } => (address, ops),
            stage => {
                self.stage = stage;
                return Err(invalid_state(
                    &self.name,
                    "active or installed",
                    self.status(),
                ));
            }
        };

        if let Err(errno) = interceptor.disable_filter(&ops, address) {
            self.stage = Stage::Installed { address, ops };
            return Err(Error::FilterTeardownFailed {
                name: self.name.clone(),
                errno,
            });
        }

        drop(ops);
        self.stage = Stage::Removed { address };
        #[cfg(feature = "log")]
        log::debug!("[Hook] [{}] removed", self.name);
        Ok(())
    }
}

impl Drop for Hook {
    fn drop(&mut self) {
        // the subsystem may still reference attached ops
        match core::mem::replace(&mut self.stage, Stage::Unresolved) {
            Stage::Installed { ops, .. } | Stage::Active { ops, .. } => {
                #[cfg(feature = "log")]
                log::warn!(
                    "[Hook] [{}] dropped while attached, leaking its ops",
                    self.name
                );
                core::mem::forget(ops);
            }
            _ => {}
        }
    }
}

impl Debug for Hook {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("replacement", &self.replacement)
            .field("status", &self.status())
            .field("address", &self.address())
            .finish()
    }
}
