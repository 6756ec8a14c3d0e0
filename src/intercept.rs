//! The interception subsystem seam
//!
//! The crate does not redirect instructions itself. It drives an existing
//! subsystem (ftrace in the kernel) through the [`Interceptor`] trait, which
//! exposes the four calls a hook's lifecycle needs:
//!
//! | call                | kernel counterpart                          |
//! |---------------------|---------------------------------------------|
//! | `enable_filter`     | `ftrace_set_filter_ip(ops, ip, 0, 0)`       |
//! | `disable_filter`    | `ftrace_set_filter_ip(ops, ip, 1, 0)`       |
//! | `register_active`   | `register_ftrace_function(ops)`             |
//! | `unregister_active` | `unregister_ftrace_function(ops)`           |

use crate::{ops::TraceOps, symbol::Address};
use alloc::boxed::Box;
use core::{ffi::c_int, fmt::Display};

/// An error code reported by the interception subsystem.
///
/// Stored as the positive errno value; kernel calls report `-errno`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(c_int);

impl Errno {
    pub const EPERM: Errno = Errno(1);
    pub const ENOENT: Errno = Errno(2);
    pub const ENOMEM: Errno = Errno(12);
    pub const EBUSY: Errno = Errno(16);
    pub const EEXIST: Errno = Errno(17);
    pub const ENODEV: Errno = Errno(19);
    pub const EINVAL: Errno = Errno(22);

    /// Wraps a positive errno value.
    #[inline]
    pub const fn new(code: c_int) -> Self {
        Self(code)
    }

    /// Gets the positive errno value.
    #[inline]
    pub const fn code(self) -> c_int {
        self.0
    }

    /// Converts a kernel-style return value: `0` is success, `-errno` fails.
    ///
    /// A positive return is treated as success, matching how the ftrace
    /// registration calls are checked in practice.
    #[inline]
    pub fn from_ret(ret: c_int) -> core::result::Result<(), Errno> {
        if ret < 0 {
            Err(Errno(ret.wrapping_neg()))
        } else {
            Ok(())
        }
    }
}

impl Display for Errno {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match *self {
            Errno::EPERM => "EPERM",
            Errno::ENOENT => "ENOENT",
            Errno::ENOMEM => "ENOMEM",
            Errno::EBUSY => "EBUSY",
            Errno::EEXIST => "EEXIST",
            Errno::ENODEV => "ENODEV",
            Errno::EINVAL => "EINVAL",
            _ => return write!(f, "errno {}", self.0),
        };
        write!(f, "{name} ({})", self.0)
    }
}

/// A trait for the platform interception subsystem.
///
/// Every call receives the hook's [`TraceOps`]. The ops live in a heap
/// allocation owned by the hook, so a backend may hand `ops` to the kernel by
/// address: it stays valid and unmoved from `enable_filter` until the matching
/// `disable_filter` returns successfully.
///
/// Calls must return promptly; a failing call reports an [`Errno`] instead of
/// blocking.
///
/// # Example
/// ```rust,ignore
/// struct Ftrace;
///
/// impl Interceptor for Ftrace {
///     fn enable_filter(&mut self, ops: &TraceOps, ip: Address) -> Result<(), Errno> {
///         let raw = self.raw_ops(ops);
///         Errno::from_ret(unsafe { ftrace_set_filter_ip(raw, ip.get() as _, 0, 0) })
///     }
///     // ...
/// }
/// ```
pub trait Interceptor {
    /// Narrows interception for `ops` to exactly `ip`.
    fn enable_filter(&mut self, ops: &TraceOps, ip: Address) -> Result<(), Errno>;

    /// Drops `ip` from the filter of `ops`.
    fn disable_filter(&mut self, ops: &TraceOps, ip: Address) -> Result<(), Errno>;

    /// Makes `ops` live: entering a filtered address now runs its callback.
    fn register_active(&mut self, ops: &TraceOps) -> Result<(), Errno>;

    /// Stops dispatching to `ops`.
    fn unregister_active(&mut self, ops: &TraceOps) -> Result<(), Errno>;
}

impl<I: Interceptor + ?Sized> Interceptor for &mut I {
    fn enable_filter(&mut self, ops: &TraceOps, ip: Address) -> Result<(), Errno> {
        (**self).enable_filter(ops, ip)
    }

    fn disable_filter(&mut self, ops: &TraceOps, ip: Address) -> Result<(), Errno> {
        (**self).disable_filter(ops, ip)
    }

    fn register_active(&mut self, ops: &TraceOps) -> Result<(), Errno> {
        (**self).register_active(ops)
    }

    fn unregister_active(&mut self, ops: &TraceOps) -> Result<(), Errno> {
        (**self).unregister_active(ops)
    }
}

impl<I: Interceptor + ?Sized> Interceptor for Box<I> {
    fn enable_filter(&mut self, ops: &TraceOps, ip: Address) -> Result<(), Errno> {
        (**self).enable_filter(ops, ip)
    }

    fn disable_filter(&mut self, ops: &TraceOps, ip: Address) -> Result<(), Errno> {
        (**self).disable_filter(ops, ip)
    }

    fn register_active(&mut self, ops: &TraceOps) -> Result<(), Errno> {
        (**self).register_active(ops)
    }

    fn unregister_active(&mut self, ops: &TraceOps) -> Result<(), Errno> {
        (**self).unregister_active(ops)
    }
}
