//! Kernel symbol table snapshots
//!
//! This module parses the text format the kernel exports through
//! `/proc/kallsyms` into an in-memory table that can serve as a
//! [`SymbolLookup`] oracle:
//!
//! ```text
//! ffffffff81000000 T _stext
//! ffffffff81234560 t do_sys_openat2
//! ffffffffc0a01000 t ext4_fill_super	[ext4]
//! ```
//!
//! When `kptr_restrict` hides addresses from the reader every address reads
//! as zero. Such entries are kept, but a lookup treats them as absent.

use crate::{Result, error::parse_error, symbol::SymbolLookup};
use alloc::{borrow::ToOwned, boxed::Box, format};
use hashbrown::{HashMap, hash_map::Entry};

/// One entry of a kernel symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSymbol {
    address: usize,
    kind: char,
    module: Option<Box<str>>,
}

impl KernelSymbol {
    /// Creates a symbol entry.
    pub fn new(address: usize, kind: char, module: Option<&str>) -> Self {
        Self {
            address,
            kind,
            module: module.map(Into::into),
        }
    }

    /// Gets the address. Zero means the address was hidden from the reader.
    #[inline]
    pub fn address(&self) -> usize {
        self.address
    }

    /// Gets the `nm`-style type character (`T`, `t`, `D`, ...).
    #[inline]
    pub fn kind(&self) -> char {
        self.kind
    }

    /// Gets the owning module, `None` for the core kernel image.
    #[inline]
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    /// Whether the symbol lives in a text section.
    #[inline]
    pub fn is_function(&self) -> bool {
        matches!(self.kind, 't' | 'T' | 'w' | 'W')
    }

    /// Whether the symbol is visible outside its translation unit.
    #[inline]
    pub fn is_global(&self) -> bool {
        self.kind.is_ascii_uppercase()
    }
}

/// An in-memory kernel symbol table.
#[derive(Debug, Default, Clone)]
pub struct KallsymsTable {
    symbols: HashMap<Box<str>, KernelSymbol>,
}

impl KallsymsTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a table in `/proc/kallsyms` format.
    ///
    /// Blank lines are skipped. When a name appears more than once (static
    /// functions in different files), the first entry wins, the same as the
    /// kernel's own `kallsyms_lookup_name`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut table = Self::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let (name, symbol) = parse_line(idx + 1, line)?;
            table.insert_first(name, symbol);
        }
        #[cfg(feature = "log")]
        log::debug!(
            "[Kallsyms] parsed {} symbols, restricted: {}",
            table.len(),
            table.is_restricted()
        );
        Ok(table)
    }

    /// Reads and parses a table from `path`.
    #[cfg(feature = "std")]
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| crate::error::io_error(format!("{}: {}", path.display(), err)))?;
        Self::parse(&text)
    }

    /// Reads the live table of the running kernel.
    #[cfg(feature = "std")]
    pub fn load() -> Result<Self> {
        Self::from_path("/proc/kallsyms")
    }

    /// Inserts or replaces a symbol.
    pub fn insert(&mut self, name: &str, symbol: KernelSymbol) -> Option<KernelSymbol> {
        self.symbols.insert(name.into(), symbol)
    }

    fn insert_first(&mut self, name: &str, symbol: KernelSymbol) {
        if let Entry::Vacant(entry) = self.symbols.entry(name.into()) {
            entry.insert(symbol);
        }
    }

    /// Gets the entry for `name`, including entries with hidden addresses.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&KernelSymbol> {
        self.symbols.get(name)
    }

    /// Number of distinct names in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Whether every address in a non-empty table is hidden.
    pub fn is_restricted(&self) -> bool {
        !self.symbols.is_empty() && self.symbols.values().all(|sym| sym.address == 0)
    }

    /// Iterates over `(name, symbol)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &KernelSymbol)> {
        self.symbols.iter().map(|(name, sym)| (&**name, sym))
    }
}

impl SymbolLookup for KallsymsTable {
    fn lookup(&self, name: &str) -> Option<*const ()> {
        self.get(name)
            .filter(|sym| sym.address != 0)
            .map(|sym| sym.address as *const ())
    }
}

fn parse_line(line_no: usize, line: &str) -> Result<(&str, KernelSymbol)> {
    let (fields, module) = match line.split_once('\t') {
        Some((fields, rest)) => (fields, Some(parse_module(line_no, rest.trim())?)),
        None => (line, None),
    };
    let mut parts = fields.split_ascii_whitespace();
    let (Some(addr), Some(kind), Some(name)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(parse_error(line_no, "expected `<address> <type> <name>`"));
    };
    if parts.next().is_some() {
        return Err(parse_error(line_no, "trailing fields after symbol name"));
    }
    let address = usize::from_str_radix(addr, 16)
        .map_err(|_| parse_error(line_no, format!("invalid address [{addr}]")))?;
    let mut chars = kind.chars();
    let (Some(kind), None) = (chars.next(), chars.next()) else {
        return Err(parse_error(line_no, format!("invalid symbol type [{kind}]")));
    };
    Ok((
        name,
        KernelSymbol {
            address,
            kind,
            module: module.map(|m| m.to_owned().into_boxed_str()),
        },
    ))
}

fn parse_module(line_no: usize, field: &str) -> Result<&str> {
    field
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .filter(|name| !name.is_empty())
        .ok_or_else(|| parse_error(line_no, format!("invalid module field [{field}]")))
}
