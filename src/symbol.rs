//! Symbol resolution
//!
//! This module maps a symbol name to its runtime address through a
//! [`SymbolLookup`] oracle. The oracle is usually the kernel's own symbol table
//! (`kallsyms_lookup_name`), a parsed [`KallsymsTable`](crate::kallsyms::KallsymsTable),
//! or a closure in tests.
//!
//! Resolution never hands out address zero: [`Address`] is non-zero by
//! construction, so an empty lookup result can only surface as an error.

use crate::{Result, error::symbol_not_found};
use core::{
    fmt::{Debug, Display, LowerHex},
    num::NonZeroUsize,
};

#[cfg(not(feature = "portable-atomic"))]
use alloc::sync::Arc;
#[cfg(feature = "portable-atomic")]
use portable_atomic_util::Arc;

/// A non-zero runtime address of code in the running system.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(NonZeroUsize);

impl Address {
    /// Wraps `addr`, returning `None` for address zero.
    #[inline]
    pub const fn new(addr: usize) -> Option<Self> {
        match NonZeroUsize::new(addr) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Wraps a code pointer, returning `None` for a null pointer.
    #[inline]
    pub fn from_ptr(ptr: *const ()) -> Option<Self> {
        Self::new(ptr as usize)
    }

    /// Gets the raw address.
    #[inline]
    pub const fn get(self) -> usize {
        self.0.get()
    }

    /// Gets the address as a code pointer.
    #[inline]
    pub fn as_ptr(self) -> *const () {
        self.get() as *const ()
    }

    /// Offsets the address by `bytes`, failing on overflow.
    #[inline]
    pub fn checked_add(self, bytes: usize) -> Option<Self> {
        self.0.checked_add(bytes).map(Self)
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:x}", self.get())
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:x}", self.get())
    }
}

impl LowerHex for Address {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        LowerHex::fmt(&self.get(), f)
    }
}

/// A trait for looking up symbols in the running system.
///
/// Implement this trait to provide the live symbol table the hooks are resolved
/// against. Returning `None` or a null pointer both mean "not found".
///
/// # Examples
///
/// Using a closure for simple lookups:
/// ```rust
/// use ftrace_hook::symbol::SymbolLookup;
///
/// let lookup = |name: &str| match name {
///     "do_sys_open" => Some(0xffff_ffff_8123_4560_usize as *const ()),
///     _ => None,
/// };
/// assert!(lookup.lookup("do_sys_open").is_some());
/// ```
///
/// Wrapping the kernel's own lookup routine:
/// ```rust,ignore
/// struct Kallsyms;
///
/// impl SymbolLookup for Kallsyms {
///     fn lookup(&self, name: &str) -> Option<*const ()> {
///         let name = CString::new(name).ok()?;
///         let addr = unsafe { kallsyms_lookup_name(name.as_ptr()) };
///         Some(addr as *const ())
///     }
/// }
/// ```
pub trait SymbolLookup {
    /// Finds the address of a symbol by its name.
    ///
    /// # Arguments
    /// * `name` - The symbol name to resolve.
    ///
    /// # Returns
    /// * `Some(ptr)` - The symbol's address if found.
    /// * `None` - Symbol not found.
    fn lookup(&self, name: &str) -> Option<*const ()>;
}

impl<F: ?Sized> SymbolLookup for F
where
    F: Fn(&str) -> Option<*const ()>,
{
    fn lookup(&self, name: &str) -> Option<*const ()> {
        self(name)
    }
}

impl<S: SymbolLookup + ?Sized> SymbolLookup for Arc<S> {
    fn lookup(&self, name: &str) -> Option<*const ()> {
        (**self).lookup(name)
    }
}

impl SymbolLookup for () {
    fn lookup(&self, _name: &str) -> Option<*const ()> {
        None
    }
}

/// Resolves `name` to its current runtime address.
///
/// An empty name is rejected without consulting `lookup`. A lookup that
/// returns nothing, or returns a null pointer, yields
/// [`Error::SymbolNotFound`](crate::Error::SymbolNotFound).
pub fn resolve<L: SymbolLookup + ?Sized>(lookup: &L, name: &str) -> Result<Address> {
    if name.is_empty() {
        return Err(symbol_not_found(name));
    }
    match lookup.lookup(name).and_then(Address::from_ptr) {
        Some(addr) => {
            #[cfg(feature = "log")]
            log::trace!("[Resolve] symbol [{}] at {}", name, addr);
            Ok(addr)
        }
        None => {
            #[cfg(feature = "log")]
            log::debug!("[Resolve] symbol [{}] not found", name);
            Err(symbol_not_found(name))
        }
    }
}
