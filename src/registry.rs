//! Hook tables and bulk install/remove
//!
//! A [`HookRegistry`] owns the hooks of one module. Installing is
//! all-or-nothing: the first failure rolls back every hook the batch already
//! attached. Removing is best-effort: every attached hook is tried and all
//! failures are reported together.

use crate::{
    Error, Result,
    error::config_error,
    hook::{Hook, HookStatus, Original},
    intercept::Interceptor,
    ops::{CallThrough, OpsFlags},
    symbol::SymbolLookup,
};
use alloc::{borrow::Cow, format, vec::Vec};
use hashbrown::HashSet;

/// A validated collection of hooks with unique names and distinct slots.
#[derive(Debug, Default)]
pub struct HookRegistry {
    hooks: Vec<Hook>,
}

impl HookRegistry {
    /// Creates a builder for a hook table.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Wraps `hooks` after checking that no two share a name or a slot and
    /// that every hook has a usable call-through mode.
    pub fn new(hooks: Vec<Hook>) -> Result<Self> {
        validate(&hooks)?;
        Ok(Self { hooks })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Hook> {
        self.hooks.iter()
    }

    /// Gets the hook for symbol `name`.
    pub fn get(&self, name: &str) -> Option<&Hook> {
        self.hooks.iter().find(|hook| hook.name() == name)
    }

    /// Number of hooks currently redirecting their symbol.
    pub fn active_count(&self) -> usize {
        self.hooks.iter().filter(|hook| hook.is_active()).count()
    }

    /// Installs every hook in table order.
    ///
    /// On the first failure, every hook this call attached is removed again in
    /// reverse order and the failure is returned. A rollback step that fails is
    /// logged and skipped so the original error still surfaces.
    pub fn install_all<L, I>(&mut self, lookup: &L, interceptor: &mut I) -> Result<()>
    where
        L: SymbolLookup + ?Sized,
        I: Interceptor + ?Sized,
    {
        for idx in 0..self.hooks.len() {
            if let Err(err) = self.hooks[idx].install(lookup, interceptor) {
                #[cfg(feature = "log")]
                log::error!("[Registry] install aborted at [{}]: {}", self.hooks[idx].name(), err);
                self.rollback(idx, interceptor);
                return Err(err);
            }
        }
        #[cfg(feature = "log")]
        log::debug!("[Registry] installed {} hooks", self.hooks.len());
        Ok(())
    }

    fn rollback<I: Interceptor + ?Sized>(&mut self, installed: usize, interceptor: &mut I) {
        for hook in self.hooks[..installed].iter_mut().rev() {
            if let Err(_err) = hook.remove(interceptor) {
                #[cfg(feature = "log")]
                log::warn!("[Registry] rollback of [{}] failed: {}", hook.name(), _err);
            }
        }
    }

    /// Removes every attached hook.
    ///
    /// Hooks that are not attached are skipped. Every attached hook is tried
    /// even after a failure; all failures are returned as
    /// [`Error::RemoveAll`] in table order.
    pub fn remove_all<I: Interceptor + ?Sized>(&mut self, interceptor: &mut I) -> Result<()> {
        let mut failures = Vec::new();
        for hook in self.hooks.iter_mut() {
            if !matches!(hook.status(), HookStatus::Active | HookStatus::Installed) {
                continue;
            }
            if let Err(err) = hook.remove(interceptor) {
                #[cfg(feature = "log")]
                log::warn!("[Registry] failed to detach [{}]: {}", hook.name(), err);
                failures.push(err);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::RemoveAll { failures })
        }
    }
}

fn validate(hooks: &[Hook]) -> Result<()> {
    let mut names = HashSet::with_capacity(hooks.len());
    let mut slots = HashSet::with_capacity(hooks.len());
    for hook in hooks {
        hook.checked_call_through()?;
        if !names.insert(hook.name()) {
            return Err(config_error(format!(
                "symbol [{}] is hooked more than once",
                hook.name()
            )));
        }
        if !slots.insert(hook.original() as *const Original as usize) {
            return Err(config_error(format!(
                "hook [{}] shares its original slot with another hook",
                hook.name()
            )));
        }
    }
    Ok(())
}

impl<'a> IntoIterator for &'a HookRegistry {
    type Item = &'a Hook;
    type IntoIter = core::slice::Iter<'a, Hook>;

    fn into_iter(self) -> Self::IntoIter {
        self.hooks.iter()
    }
}

enum Entry {
    Declared {
        name: Cow<'static, str>,
        replacement: *const (),
        original: &'static Original,
    },
    Built(Hook),
}

/// A builder for a [`HookRegistry`].
///
/// Entries are validated when [`build`](Self::build) runs, so a table can be
/// declared in one expression.
///
/// # Examples
/// ```rust
/// use ftrace_hook::{CallThrough, HookRegistry, Original, ops::OpsFlags};
///
/// static REAL_OPEN: Original = Original::new();
/// static REAL_KILL: Original = Original::new();
///
/// extern "C" fn open_hook() {}
/// extern "C" fn kill_hook() {}
///
/// let registry = HookRegistry::builder()
///     .hook("do_sys_openat2", open_hook as *const (), &REAL_OPEN)
///     .hook("__x64_sys_kill", kill_hook as *const (), &REAL_KILL)
///     .flags(OpsFlags::RECURSION)
///     .call_through(CallThrough::SkipFentry)
///     .build()
///     .unwrap();
/// assert_eq!(registry.len(), 2);
/// ```
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<Entry>,
    flags: OpsFlags,
    call_through: Option<CallThrough>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hook redirecting `name` to `replacement`.
    pub fn hook(
        mut self,
        name: impl Into<Cow<'static, str>>,
        replacement: *const (),
        original: &'static Original,
    ) -> Self {
        self.entries.push(Entry::Declared {
            name: name.into(),
            replacement,
            original,
        });
        self
    }

    /// Adds an already configured hook.
    pub fn push(mut self, hook: Hook) -> Self {
        self.entries.push(Entry::Built(hook));
        self
    }

    /// Extra subsystem flags requested for every hook.
    pub fn flags(mut self, flags: OpsFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Call-through mode for hooks that do not set their own.
    pub fn call_through(mut self, call_through: CallThrough) -> Self {
        self.call_through = Some(call_through);
        self
    }

    /// Validates the entries and builds the registry.
    ///
    /// Hooks keep the order in which `hook` and `push` were called. Every hook
    /// must end up with a usable call-through mode, its own or the builder's.
    pub fn build(self) -> Result<HookRegistry> {
        let mut hooks = Vec::with_capacity(self.entries.len());
        for entry in self.entries {
            let mut hook = match entry {
                Entry::Declared {
                    name,
                    replacement,
                    original,
                } => Hook::new(name, replacement, original)?,
                Entry::Built(hook) => hook,
            };
            hook.set_defaults(self.flags, self.call_through.as_ref());
            hooks.push(hook);
        }
        HookRegistry::new(hooks)
    }
}
