//! Per-hook subsystem state
//!
//! A [`TraceOps`] is what the interception subsystem keeps for one installed
//! hook: which address is filtered, where execution is redirected, and with
//! which capabilities. Its [`redirect`](TraceOps::redirect) method is the body
//! of the entry callback the subsystem runs each time the filtered address is
//! entered.

use crate::symbol::Address;
use bitflags::bitflags;
use core::ops::Range;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        /// Size of the `call __fentry__` site at the start of a traced function.
        pub const FENTRY_INSN_SIZE: usize = 5;
    } else if #[cfg(target_arch = "aarch64")] {
        /// Size of the patchable entry (`mov x9, x30; bl ftrace_caller`).
        pub const FENTRY_INSN_SIZE: usize = 8;
    } else if #[cfg(target_arch = "riscv64")] {
        /// Size of the patchable entry (`auipc t0; jalr t0`).
        pub const FENTRY_INSN_SIZE: usize = 8;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    /// Capability flags requested from the interception subsystem.
    ///
    /// The values match the kernel's `FTRACE_OPS_FL_*` bits.
    pub struct OpsFlags: u32 {
        /// Pass the full saved register set to the callback.
        const SAVE_REGS = 1 << 2;
        /// Save registers only where the architecture supports it.
        const SAVE_REGS_IF_SUPPORTED = 1 << 3;
        /// Ask the subsystem to guard the callback against recursion.
        const RECURSION = 1 << 4;
        /// The callback may rewrite the saved instruction pointer.
        const IPMODIFY = 1 << 12;
        /// The ops may not be disabled through the global ftrace switch.
        const PERMANENT = 1 << 13;
    }
}

impl OpsFlags {
    /// Flags every hook needs to redirect execution.
    pub const REDIRECT: OpsFlags = OpsFlags::SAVE_REGS.union(OpsFlags::IPMODIFY);
}

/// Access to the register state saved at a traced function's entry.
pub trait TraceRegs {
    /// Gets the saved instruction pointer.
    fn ip(&self) -> usize;

    /// Sets the instruction pointer execution resumes at.
    fn set_ip(&mut self, ip: usize);
}

/// How a replacement reaches the original function without being redirected
/// back into itself.
///
/// There is no default: a hook must name the mode it relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallThrough {
    /// Calls made from `range` (usually the hooking module's text) are not
    /// redirected. The original slot holds the function's real address, so
    /// `range` must cover the replacement or calling through the slot lands
    /// back in the replacement.
    GuardCaller(Range<usize>),
    /// The original slot points past the patched call site, so calls through
    /// it never reach the filter. Every entry at the address is redirected.
    SkipFentry,
}

impl CallThrough {
    /// Whether calls through the original slot can reach the original.
    ///
    /// An empty guard range exempts no caller, so the replacement's own call
    /// would be redirected again.
    #[inline]
    pub fn is_usable(&self) -> bool {
        match self {
            CallThrough::GuardCaller(range) => !range.is_empty(),
            CallThrough::SkipFentry => true,
        }
    }

    /// The entry point the original slot is populated with.
    #[inline]
    pub fn original_entry(&self, target: Address) -> Option<Address> {
        match self {
            CallThrough::GuardCaller(_) => Some(target),
            CallThrough::SkipFentry => target.checked_add(FENTRY_INSN_SIZE),
        }
    }
}

/// Subsystem state of one hook.
///
/// Created when the hook is installed and dropped once the subsystem no
/// longer references it.
#[derive(Debug, Clone)]
pub struct TraceOps {
    target: Address,
    replacement: Address,
    flags: OpsFlags,
    call_through: CallThrough,
}

impl TraceOps {
    pub(crate) fn new(
        target: Address,
        replacement: Address,
        flags: OpsFlags,
        call_through: CallThrough,
    ) -> Self {
        Self {
            target,
            replacement,
            flags: flags | OpsFlags::REDIRECT,
            call_through,
        }
    }

    /// Gets the filtered address.
    #[inline]
    pub fn target(&self) -> Address {
        self.target
    }

    /// Gets the address execution is redirected to.
    #[inline]
    pub fn replacement(&self) -> Address {
        self.replacement
    }

    #[inline]
    pub fn flags(&self) -> OpsFlags {
        self.flags
    }

    #[inline]
    pub fn call_through(&self) -> &CallThrough {
        &self.call_through
    }

    /// Entry callback: sends execution to the replacement.
    ///
    /// `parent_ip` is the return address of the traced call. Returns whether
    /// the saved instruction pointer was rewritten.
    ///
    /// Runs concurrently on every CPU that enters the filtered address, so it
    /// only reads `self`.
    #[inline]
    pub fn redirect<R: TraceRegs + ?Sized>(&self, parent_ip: usize, regs: &mut R) -> bool {
        if let CallThrough::GuardCaller(range) = &self.call_through {
            if range.contains(&parent_ip) {
                return false;
            }
        }
        regs.set_ip(self.replacement.get());
        true
    }
}
