//! # ftrace_hook
//! Redirect functions of a running kernel to replacement implementations.
//! ## Usage
//! A [`Hook`] names a kernel symbol, the function that should run instead, and
//! an [`Original`] slot through which the replacement can still call the real
//! function. Hooks are collected in a [`HookRegistry`], which installs them
//! all-or-nothing and removes them best-effort.
//!
//! The crate does not patch instructions itself. It resolves symbols through a
//! [`SymbolLookup`] oracle and drives the kernel's ftrace subsystem through the
//! [`Interceptor`] trait, so both can be supplied by the module that links it.
//! ## Example
//! ```rust,ignore
//! static REAL_KILL: Original = Original::new();
//!
//! extern "C" fn kill_hook(regs: *const PtRegs) -> i64 {
//!     let real = unsafe { REAL_KILL.get_fn::<extern "C" fn(*const PtRegs) -> i64>() };
//!     real.map_or(-1, |real| real(regs))
//! }
//!
//! let registry = hook_registry! {
//!     call_through = CallThrough::GuardCaller(THIS_MODULE.text());
//!     "__x64_sys_kill" => kill_hook, REAL_KILL;
//! }?;
//! let mut module = HookModule::new(registry, Kallsyms, Ftrace);
//! module.on_load()?;
//! ```
#![no_std]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "aarch64",
    target_arch = "riscv64",
)))]
compile_error!("unsupport arch");

mod error;
pub mod hook;
pub mod intercept;
pub mod kallsyms;
mod macros;
pub mod module;
pub mod ops;
pub mod registry;
pub mod symbol;

pub use error::Error;
pub use hook::{Hook, HookStatus, Original};
pub use intercept::{Errno, Interceptor};
pub use kallsyms::{KallsymsTable, KernelSymbol};
pub use module::HookModule;
pub use ops::{CallThrough, OpsFlags, TraceOps, TraceRegs};
pub use registry::{HookRegistry, RegistryBuilder};
pub use symbol::{Address, SymbolLookup, resolve};

pub type Result<T> = core::result::Result<T, Error>;
