//! Module load/unload glue
//!
//! [`HookModule`] binds a [`HookRegistry`] to the lifecycle of the module that
//! owns it: `on_load` attaches every hook, `on_unload` detaches them.

use crate::{
    Result,
    error::module_error,
    intercept::Interceptor,
    registry::HookRegistry,
    symbol::SymbolLookup,
};

/// The hooks of one loadable module together with the collaborators needed
/// to attach and detach them.
pub struct HookModule<L, I>
where
    L: SymbolLookup,
    I: Interceptor,
{
    registry: HookRegistry,
    lookup: L,
    interceptor: I,
    loaded: bool,
}

impl<L, I> HookModule<L, I>
where
    L: SymbolLookup,
    I: Interceptor,
{
    pub fn new(registry: HookRegistry, lookup: L, interceptor: I) -> Self {
        Self {
            registry,
            lookup,
            interceptor,
            loaded: false,
        }
    }

    /// Installs every hook. Nothing stays attached if this fails.
    pub fn on_load(&mut self) -> Result<()> {
        if self.loaded {
            return Err(module_error("module is already loaded"));
        }
        self.registry
            .install_all(&self.lookup, &mut self.interceptor)?;
        self.loaded = true;
        #[cfg(feature = "log")]
        log::info!("[Module] loaded with {} hooks", self.registry.len());
        Ok(())
    }

    /// Removes every hook, reporting all hooks that failed to detach.
    ///
    /// If any hook stays attached the module stays loaded, and a later
    /// `on_unload` retries only the hooks that are still attached.
    pub fn on_unload(&mut self) -> Result<()> {
        if !self.loaded {
            return Err(module_error("module is not loaded"));
        }
        self.registry.remove_all(&mut self.interceptor)?;
        self.loaded = false;
        #[cfg(feature = "log")]
        log::info!("[Module] unloaded");
        Ok(())
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    #[inline]
    pub fn registry(&self) -> &HookRegistry {
        &self.registry
    }

    #[inline]
    pub fn interceptor(&self) -> &I {
        &self.interceptor
    }

    #[inline]
    pub fn interceptor_mut(&mut self) -> &mut I {
        &mut self.interceptor
    }
}

impl<L, I> Drop for HookModule<L, I>
where
    L: SymbolLookup,
    I: Interceptor,
{
    fn drop(&mut self) {
        if self.loaded {
            if let Err(_err) = self.on_unload() {
                #[cfg(feature = "log")]
                log::error!("[Module] unload on drop: {}", _err);
            }
        }
    }
}
