/// Declare a hook table
///
/// An optional leading `call_through = <mode>;` sets the mode for every entry.
/// # Example
/// ```rust
/// use ftrace_hook::{CallThrough, hook_registry, Original};
///
/// static REAL_OPEN: Original = Original::new();
/// static REAL_KILL: Original = Original::new();
///
/// extern "C" fn open_hook() {}
/// extern "C" fn kill_hook() {}
///
/// let registry = hook_registry! {
///     call_through = CallThrough::SkipFentry;
///     "do_sys_openat2" => open_hook, REAL_OPEN;
///     "__x64_sys_kill" => kill_hook, REAL_KILL;
/// }
/// .unwrap();
/// assert_eq!(registry.len(), 2);
/// ```
#[macro_export]
macro_rules! hook_registry {
    (call_through = $mode:expr; $($name:expr => $replacement:expr, $original:expr);* $(;)?) => {
        $crate::HookRegistry::builder()
            .call_through($mode)
            $(.hook($name, $replacement as *const (), &$original))*
            .build()
    };
    ($($name:expr => $replacement:expr, $original:expr);* $(;)?) => {
        $crate::HookRegistry::builder()
            $(.hook($name, $replacement as *const (), &$original))*
            .build()
    };
}
