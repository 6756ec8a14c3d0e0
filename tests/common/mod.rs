#![allow(dead_code)]

use ftrace_hook::{Address, CallThrough, Errno, Interceptor, Original, TraceOps, TraceRegs};
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

/// Return address used for calls that do not come from the hooking module.
pub const OUTSIDE_CALLER: usize = 0x1000;

/// Stand-in for the hooking module's text section.
pub const MODULE_TEXT: Range<usize> = 0x4000..0x5000;

pub fn module_guard() -> CallThrough {
    CallThrough::GuardCaller(MODULE_TEXT)
}

pub extern "C" fn real_foo(x: i32) -> i32 {
    x + 1
}

pub extern "C" fn real_bar(x: i32) -> i32 {
    x * 2
}

pub extern "C" fn real_baz(x: i32) -> i32 {
    x - 3
}

pub extern "C" fn real_qux(x: i32) -> i32 {
    x ^ 5
}

pub extern "C" fn noop_replacement(x: i32) -> i32 {
    x
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn get_symbol_map() -> Arc<HashMap<&'static str, usize>> {
    let mut map = HashMap::new();
    map.insert("foo", real_foo as *const () as usize);
    map.insert("bar", real_bar as *const () as usize);
    map.insert("baz", real_baz as *const () as usize);
    map.insert("qux", real_qux as *const () as usize);
    map.insert("hidden", 0);
    Arc::new(map)
}

pub fn get_lookup() -> Arc<impl Fn(&str) -> Option<*const ()> + Send + Sync + 'static> {
    let map = get_symbol_map();
    Arc::new(move |name: &str| -> Option<*const ()> {
        map.get(name).copied().map(|p| p as *const ())
    })
}

/// A fresh original slot for tests that must not share one.
pub fn slot() -> &'static Original {
    Box::leak(Box::new(Original::new()))
}

pub fn addr(value: usize) -> Address {
    Address::new(value).unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    EnableFilter(usize),
    DisableFilter(usize),
    Register(usize),
    Unregister(usize),
}

pub struct MockRegs {
    pub ip: usize,
}

impl TraceRegs for MockRegs {
    fn ip(&self) -> usize {
        self.ip
    }

    fn set_ip(&mut self, ip: usize) {
        self.ip = ip;
    }
}

/// An in-memory stand-in for ftrace that records every call and can be told
/// to reject specific ones.
#[derive(Default)]
pub struct MockInterceptor {
    pub calls: Vec<Call>,
    filters: HashSet<usize>,
    active: HashMap<usize, TraceOps>,
    failures: HashMap<Call, Errno>,
}

impl MockInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&mut self, call: Call, errno: Errno) {
        self.failures.insert(call, errno);
    }

    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    pub fn is_filtered(&self, ip: usize) -> bool {
        self.filters.contains(&ip)
    }

    pub fn is_registered(&self, ip: usize) -> bool {
        self.active.contains_key(&ip)
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    pub fn registered_count(&self) -> usize {
        self.active.len()
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    /// Emulates entering `ip` from a call whose return address is `parent_ip`
    /// and returns where execution continues.
    pub fn enter(&self, ip: usize, parent_ip: usize) -> usize {
        let mut regs = MockRegs { ip };
        if self.filters.contains(&ip) {
            if let Some(ops) = self.active.get(&ip) {
                ops.redirect(parent_ip, &mut regs);
            }
        }
        regs.ip()
    }

    fn check(&mut self, call: Call) -> Result<(), Errno> {
        self.calls.push(call);
        match self.failures.get(&call) {
            Some(errno) => Err(*errno),
            None => Ok(()),
        }
    }
}

impl Interceptor for MockInterceptor {
    fn enable_filter(&mut self, _ops: &TraceOps, ip: Address) -> Result<(), Errno> {
        self.check(Call::EnableFilter(ip.get()))?;
        self.filters.insert(ip.get());
        Ok(())
    }

    fn disable_filter(&mut self, _ops: &TraceOps, ip: Address) -> Result<(), Errno> {
        self.check(Call::DisableFilter(ip.get()))?;
        if !self.filters.remove(&ip.get()) {
            return Err(Errno::ENOENT);
        }
        Ok(())
    }

    fn register_active(&mut self, ops: &TraceOps) -> Result<(), Errno> {
        let ip = ops.target().get();
        self.check(Call::Register(ip))?;
        if self.active.contains_key(&ip) {
            return Err(Errno::EBUSY);
        }
        self.active.insert(ip, ops.clone());
        Ok(())
    }

    fn unregister_active(&mut self, ops: &TraceOps) -> Result<(), Errno> {
        let ip = ops.target().get();
        self.check(Call::Unregister(ip))?;
        if self.active.remove(&ip).is_none() {
            return Err(Errno::EINVAL);
        }
        Ok(())
    }
}
