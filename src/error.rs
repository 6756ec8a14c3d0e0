use crate::{hook::HookStatus, intercept::Errno};
use alloc::{borrow::Cow, boxed::Box, vec::Vec};
use core::fmt::Display;

/// Error types used throughout the `ftrace_hook` library.
///
/// Every failure carries the name of the hook (or symbol) it concerns so that
/// a batch operation can report exactly which entry went wrong.
#[derive(Debug)]
pub enum Error {
    /// The symbol table has no usable entry for the name.
    ///
    /// Both an absent entry and a zero address count as "not found".
    SymbolNotFound {
        /// The symbol that was looked up.
        name: Cow<'static, str>,
    },

    /// Resolution failed while installing a hook.
    ResolutionFailed {
        /// The hook being installed.
        name: Cow<'static, str>,
        /// The underlying resolver error.
        source: Box<Error>,
    },

    /// The interception subsystem refused to filter the resolved address.
    FilterConfigFailed {
        /// The hook being installed.
        name: Cow<'static, str>,
        /// The code reported by the subsystem.
        errno: Errno,
    },

    /// The interception subsystem refused to register the hook.
    ActivationFailed {
        /// The hook being installed.
        name: Cow<'static, str>,
        /// The code reported by the subsystem.
        errno: Errno,
    },

    /// The interception subsystem refused to unregister the hook.
    DeactivationFailed {
        /// The hook being removed.
        name: Cow<'static, str>,
        /// The code reported by the subsystem.
        errno: Errno,
    },

    /// The interception subsystem refused to drop the address filter.
    FilterTeardownFailed {
        /// The hook being removed.
        name: Cow<'static, str>,
        /// The code reported by the subsystem.
        errno: Errno,
    },

    /// The operation is not allowed in the hook's current lifecycle stage.
    InvalidState {
        /// The hook the operation was attempted on.
        name: Cow<'static, str>,
        /// What the operation needs.
        expected: &'static str,
        /// Where the hook actually is.
        found: HookStatus,
    },

    /// One or more hooks failed to detach during a batch removal.
    RemoveAll {
        /// Every failure, in registry order.
        failures: Vec<Error>,
    },

    /// A hook table was rejected while being built.
    Config {
        /// A descriptive message about the rejected entry.
        msg: Cow<'static, str>,
    },

    /// A symbol table could not be parsed.
    Parse {
        /// 1-based line number of the offending entry.
        line: usize,
        /// A descriptive message about the parse error.
        msg: Cow<'static, str>,
    },

    /// A module lifecycle call arrived out of order.
    Module {
        /// A descriptive message about the lifecycle error.
        msg: Cow<'static, str>,
    },

    /// An error occurred while reading a symbol table from disk.
    #[cfg(feature = "std")]
    Io {
        /// A descriptive message about the I/O error.
        msg: Cow<'static, str>,
    },
}

impl Error {
    /// Name of the hook or symbol this error concerns, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Error::SymbolNotFound { name }
            | Error::ResolutionFailed { name, .. }
            | Error::FilterConfigFailed { name, .. }
            | Error::ActivationFailed { name, .. }
            | Error::DeactivationFailed { name, .. }
            | Error::FilterTeardownFailed { name, .. }
            | Error::InvalidState { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The subsystem code behind this error, if the subsystem reported one.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Error::FilterConfigFailed { errno, .. }
            | Error::ActivationFailed { errno, .. }
            | Error::DeactivationFailed { errno, .. }
            | Error::FilterTeardownFailed { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::SymbolNotFound { name } => write!(f, "symbol [{name}] not found"),
            Error::ResolutionFailed { name, source } => {
                write!(f, "failed to resolve hook [{name}]: {source}")
            }
            Error::FilterConfigFailed { name, errno } => {
                write!(f, "failed to set ftrace filter for [{name}]: {errno}")
            }
            Error::ActivationFailed { name, errno } => {
                write!(f, "failed to register ftrace ops for [{name}]: {errno}")
            }
            Error::DeactivationFailed { name, errno } => {
                write!(f, "failed to unregister ftrace ops for [{name}]: {errno}")
            }
            Error::FilterTeardownFailed { name, errno } => {
                write!(f, "failed to clear ftrace filter for [{name}]: {errno}")
            }
            Error::InvalidState {
                name,
                expected,
                found,
            } => write!(f, "hook [{name}] is {found:?}, expected {expected}"),
            Error::RemoveAll { failures } => {
                write!(f, "{} hook(s) failed to detach", failures.len())?;
                for failure in failures {
                    write!(f, "; {failure}")?;
                }
                Ok(())
            }
            Error::Config { msg } => write!(f, "Hook table error: {msg}"),
            Error::Parse { line, msg } => write!(f, "Symbol table parse error at line {line}: {msg}"),
            Error::Module { msg } => write!(f, "Module lifecycle error: {msg}"),
            #[cfg(feature = "std")]
            Error::Io { msg } => write!(f, "I/O error: {msg}"),
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Error::ResolutionFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

#[cold]
#[inline(never)]
pub(crate) fn symbol_not_found(name: &str) -> Error {
    Error::SymbolNotFound {
        name: Cow::Owned(name.into()),
    }
}

#[cold]
#[inline(never)]
pub(crate) fn invalid_state(
    name: &Cow<'static, str>,
    expected: &'static str,
    found: HookStatus,
) -> Error {
    Error::InvalidState {
        name: name.clone(),
        expected,
        found,
    }
}

/// Creates a hook table error with the specified message.
#[cold]
#[inline(never)]
pub(crate) fn config_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Config { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn parse_error(line: usize, msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Parse {
        line,
        msg: msg.into(),
    }
}

#[cold]
#[inline(never)]
pub(crate) fn module_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Module { msg: msg.into() }
}

/// Creates an I/O error with the specified message.
#[cfg(feature = "std")]
#[cold]
#[inline(never)]
pub(crate) fn io_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Io { msg: msg.into() }
}
