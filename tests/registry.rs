mod common;

use common::{
    Call, MODULE_TEXT, MockInterceptor, OUTSIDE_CALLER, get_lookup, init_logger, module_guard,
    noop_replacement, real_bar, real_baz, real_foo, real_qux, slot,
};
use ftrace_hook::{
    CallThrough, Errno, Error, Hook, HookRegistry, HookStatus, Original, OpsFlags, hook_registry,
};
use rstest::rstest;

const NAMES: [&str; 4] = ["foo", "bar", "baz", "qux"];

fn targets() -> [usize; 4] {
    [
        real_foo as *const () as usize,
        real_bar as *const () as usize,
        real_baz as *const () as usize,
        real_qux as *const () as usize,
    ]
}

fn four_hooks() -> HookRegistry {
    let mut builder = HookRegistry::builder().call_through(module_guard());
    for name in NAMES {
        builder = builder.hook(name, noop_replacement as *const (), slot());
    }
    builder.build().unwrap()
}

static REAL_FOO: Original = Original::new();
static REAL_BAR: Original = Original::new();

extern "C" fn r1(x: i32) -> i32 {
    let real = unsafe { REAL_FOO.get_fn::<extern "C" fn(i32) -> i32>() }.unwrap();
    real(x) * 10
}

extern "C" fn r2(x: i32) -> i32 {
    let real = unsafe { REAL_BAR.get_fn::<extern "C" fn(i32) -> i32>() }.unwrap();
    real(x) + 100
}

#[rstest]
fn install_all_redirects_every_symbol() {
    init_logger();
    let lookup = get_lookup();
    let mut mock = MockInterceptor::new();
    let r1_entry = r1 as *const () as usize;
    let r2_entry = r2 as *const () as usize;
    let module_text = r1_entry.min(r2_entry)..r1_entry.max(r2_entry) + 0x100;
    let mut registry = hook_registry! {
        call_through = CallThrough::GuardCaller(module_text);
        "foo" => r1, REAL_FOO;
        "bar" => r2, REAL_BAR;
    }
    .unwrap();

    registry.install_all(&lookup, &mut mock).unwrap();
    assert_eq!(registry.active_count(), 2);
    assert!(registry.iter().all(|hook| hook.status() == HookStatus::Active));
    assert_eq!(REAL_FOO.get().unwrap().get(), real_foo as *const () as usize);
    assert_eq!(REAL_BAR.get().unwrap().get(), real_bar as *const () as usize);

    // entering foo runs r1, which calls through to the true foo
    let next = mock.enter(real_foo as *const () as usize, OUTSIDE_CALLER);
    assert_eq!(next, r1 as *const () as usize);
    let entered: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(next) };
    assert_eq!(entered(1), 20);
    // r1 calling through its slot reaches the true foo instead of itself
    let slot = REAL_FOO.get().unwrap().get();
    assert_eq!(mock.enter(slot, r1_entry + 4), real_foo as *const () as usize);

    let next = mock.enter(real_bar as *const () as usize, OUTSIDE_CALLER);
    assert_eq!(next, r2 as *const () as usize);
    let entered: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(next) };
    assert_eq!(entered(4), 108);
    let slot = REAL_BAR.get().unwrap().get();
    assert_eq!(mock.enter(slot, r2_entry + 4), real_bar as *const () as usize);

    registry.remove_all(&mut mock).unwrap();
    assert_eq!(registry.active_count(), 0);
    assert_eq!(mock.filter_count(), 0);
    assert_eq!(mock.registered_count(), 0);
}

#[rstest]
fn missing_symbol_rolls_back_batch() {
    init_logger();
    let lookup = get_lookup();
    let mut mock = MockInterceptor::new();
    let mut registry = HookRegistry::builder()
        .call_through(module_guard())
        .hook("foo", noop_replacement as *const (), slot())
        .hook("does_not_exist", noop_replacement as *const (), slot())
        .build()
        .unwrap();

    match registry.install_all(&lookup, &mut mock) {
        Err(Error::ResolutionFailed { name, .. }) => assert_eq!(name, "does_not_exist"),
        other => panic!("expected ResolutionFailed, got {other:?}"),
    }
    assert_eq!(registry.active_count(), 0);
    assert_eq!(registry.get("foo").unwrap().status(), HookStatus::Removed);
    assert_eq!(
        registry.get("does_not_exist").unwrap().status(),
        HookStatus::Unresolved
    );
    assert_eq!(mock.filter_count(), 0);
    assert_eq!(mock.registered_count(), 0);
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
#[case(3)]
fn install_failure_at_any_entry_leaves_nothing_active(#[case] k: usize) {
    let lookup = get_lookup();
    let mut mock = MockInterceptor::new();
    let targets = targets();
    mock.fail_on(Call::Register(targets[k]), Errno::EBUSY);
    let mut registry = four_hooks();

    let err = registry.install_all(&lookup, &mut mock).unwrap_err();
    assert!(matches!(err, Error::ActivationFailed { .. }));
    assert_eq!(err.name(), Some(NAMES[k]));
    assert_eq!(registry.active_count(), 0);
    assert_eq!(mock.filter_count(), 0);
    assert_eq!(mock.registered_count(), 0);

    // entries after k were never touched
    for target in &targets[k + 1..] {
        assert_eq!(mock.count(Call::EnableFilter(*target)), 0);
    }
    // entries before k were rolled back, last installed first
    let unregistered: Vec<_> = mock
        .calls
        .iter()
        .filter_map(|call| match call {
            Call::Unregister(ip) => Some(*ip),
            _ => None,
        })
        .collect();
    let expected: Vec<_> = targets[..k].iter().rev().copied().collect();
    assert_eq!(unregistered, expected);
}

#[rstest]
fn failed_rollback_does_not_mask_root_cause() {
    init_logger();
    let lookup = get_lookup();
    let mut mock = MockInterceptor::new();
    let targets = targets();
    mock.fail_on(Call::Unregister(targets[0]), Errno::ENOMEM);
    mock.fail_on(Call::EnableFilter(targets[2]), Errno::EINVAL);
    let mut registry = four_hooks();

    let err = registry.install_all(&lookup, &mut mock).unwrap_err();
    assert!(matches!(err, Error::FilterConfigFailed { .. }));
    assert_eq!(err.name(), Some("baz"));
    // bar was rolled back even though foo could not be
    assert_eq!(registry.get("bar").unwrap().status(), HookStatus::Removed);
    assert_eq!(registry.get("foo").unwrap().status(), HookStatus::Active);

    mock.clear_failures();
    registry.remove_all(&mut mock).unwrap();
    assert_eq!(registry.active_count(), 0);
    assert_eq!(mock.filter_count(), 0);
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
#[case(3)]
fn remove_all_continues_past_failures(#[case] k: usize) {
    let lookup = get_lookup();
    let mut mock = MockInterceptor::new();
    let targets = targets();
    let mut registry = four_hooks();
    registry.install_all(&lookup, &mut mock).unwrap();
    mock.fail_on(Call::Unregister(targets[k]), Errno::EBUSY);

    match registry.remove_all(&mut mock) {
        Err(Error::RemoveAll { failures }) => {
            assert_eq!(failures.len(), 1);
            assert!(matches!(failures[0], Error::DeactivationFailed { .. }));
            assert_eq!(failures[0].name(), Some(NAMES[k]));
        }
        other => panic!("expected RemoveAll, got {other:?}"),
    }
    for (idx, hook) in registry.iter().enumerate() {
        let expected = if idx == k {
            HookStatus::Active
        } else {
            HookStatus::Removed
        };
        assert_eq!(hook.status(), expected);
    }
    for target in &targets {
        assert_eq!(mock.count(Call::Unregister(*target)), 1);
    }
}

#[rstest]
fn remove_all_reports_every_failure() {
    let lookup = get_lookup();
    let mut mock = MockInterceptor::new();
    let targets = targets();
    let mut registry = four_hooks();
    registry.install_all(&lookup, &mut mock).unwrap();
    mock.fail_on(Call::Unregister(targets[0]), Errno::EBUSY);
    mock.fail_on(Call::DisableFilter(targets[2]), Errno::ENOMEM);
    mock.fail_on(Call::Unregister(targets[3]), Errno::EINVAL);

    let err = registry.remove_all(&mut mock).unwrap_err();
    let Error::RemoveAll { failures } = &err else {
        panic!("expected RemoveAll, got {err:?}");
    };
    let names: Vec<_> = failures.iter().map(|f| f.name().unwrap()).collect();
    assert_eq!(names, ["foo", "baz", "qux"]);
    assert!(matches!(failures[1], Error::FilterTeardownFailed { .. }));
    assert_eq!(registry.get("bar").unwrap().status(), HookStatus::Removed);
    assert_eq!(registry.get("baz").unwrap().status(), HookStatus::Installed);
    assert!(err.to_string().starts_with("3 hook(s) failed to detach"));

    // a second pass only touches what is still attached
    mock.clear_failures();
    registry.remove_all(&mut mock).unwrap();
    assert_eq!(mock.count(Call::Unregister(targets[1])), 1);
    assert_eq!(mock.filter_count(), 0);
}

#[rstest]
fn remove_all_skips_detached_hooks() {
    let mut mock = MockInterceptor::new();
    let mut registry = four_hooks();
    registry.remove_all(&mut mock).unwrap();
    assert!(mock.calls.is_empty());
}

#[rstest]
fn duplicate_names_are_rejected() {
    let err = HookRegistry::builder()
        .call_through(module_guard())
        .hook("foo", noop_replacement as *const (), slot())
        .hook("foo", noop_replacement as *const (), slot())
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}

#[rstest]
fn shared_slots_are_rejected() {
    let shared = slot();
    let err = HookRegistry::builder()
        .call_through(module_guard())
        .hook("foo", noop_replacement as *const (), shared)
        .hook("bar", noop_replacement as *const (), shared)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));

    let hooks = vec![
        Hook::new("foo", noop_replacement as *const (), shared)
            .unwrap()
            .with_call_through(module_guard()),
        Hook::new("bar", noop_replacement as *const (), shared)
            .unwrap()
            .with_call_through(module_guard()),
    ];
    match HookRegistry::new(hooks) {
        Err(Error::Config { msg }) => assert!(msg.contains("[bar]")),
        other => panic!("expected Config, got {other:?}"),
    }
}

#[rstest]
fn invalid_entries_fail_the_build() {
    assert!(
        HookRegistry::builder()
            .hook("", noop_replacement as *const (), slot())
            .build()
            .is_err()
    );
    assert!(
        HookRegistry::builder()
            .hook("foo", core::ptr::null(), slot())
            .build()
            .is_err()
    );
}

#[rstest]
fn builder_defaults_apply_to_every_hook() {
    let lookup = get_lookup();
    let mut mock = MockInterceptor::new();
    let custom = Hook::new("qux", noop_replacement as *const (), slot())
        .unwrap()
        .with_call_through(CallThrough::GuardCaller(0x10..0x20));
    let mut registry = HookRegistry::builder()
        .push(custom)
        .hook("foo", noop_replacement as *const (), slot())
        .flags(OpsFlags::RECURSION)
        .call_through(CallThrough::SkipFentry)
        .build()
        .unwrap();
    let order: Vec<_> = registry.iter().map(|hook| hook.name()).collect();
    assert_eq!(order, ["qux", "foo"]);

    registry.install_all(&lookup, &mut mock).unwrap();
    for hook in &registry {
        assert!(hook.ops().unwrap().flags().contains(OpsFlags::RECURSION));
    }
    let qux = registry.get("qux").unwrap().ops().unwrap();
    assert_eq!(qux.call_through(), &CallThrough::GuardCaller(0x10..0x20));
    let foo = registry.get("foo").unwrap().ops().unwrap();
    assert_eq!(foo.call_through(), &CallThrough::SkipFentry);
    registry.remove_all(&mut mock).unwrap();
}

#[rstest]
fn builder_keeps_call_order() {
    let lookup = get_lookup();
    let mut mock = MockInterceptor::new();
    let bar = Hook::new("bar", noop_replacement as *const (), slot()).unwrap();
    let mut registry = HookRegistry::builder()
        .hook("foo", noop_replacement as *const (), slot())
        .push(bar)
        .hook("baz", noop_replacement as *const (), slot())
        .call_through(module_guard())
        .build()
        .unwrap();
    let order: Vec<_> = registry.iter().map(|hook| hook.name()).collect();
    assert_eq!(order, ["foo", "bar", "baz"]);

    registry.install_all(&lookup, &mut mock).unwrap();
    let registered: Vec<_> = mock
        .calls
        .iter()
        .filter_map(|call| match call {
            Call::Register(ip) => Some(*ip),
            _ => None,
        })
        .collect();
    assert_eq!(registered, &targets()[..3]);
    registry.remove_all(&mut mock).unwrap();
}

#[rstest]
fn missing_call_through_fails_the_build() {
    let err = HookRegistry::builder()
        .hook("foo", noop_replacement as *const (), slot())
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));

    let err = hook_registry! {
        call_through = CallThrough::GuardCaller(0..0);
        "foo" => noop_replacement, *slot();
    }
    .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}

#[rstest]
fn explicit_call_through_is_never_overridden() {
    let empty = Hook::new("foo", noop_replacement as *const (), slot())
        .unwrap()
        .with_call_through(CallThrough::GuardCaller(0..0));
    let err = HookRegistry::builder()
        .push(empty)
        .call_through(CallThrough::SkipFentry)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Config { .. }));

    let guarded = Hook::new("foo", noop_replacement as *const (), slot())
        .unwrap()
        .with_call_through(module_guard());
    let registry = HookRegistry::builder()
        .push(guarded)
        .hook("bar", noop_replacement as *const (), slot())
        .call_through(CallThrough::SkipFentry)
        .build()
        .unwrap();
    assert_eq!(
        registry.get("foo").unwrap().call_through(),
        Some(&CallThrough::GuardCaller(MODULE_TEXT))
    );
    assert_eq!(
        registry.get("bar").unwrap().call_through(),
        Some(&CallThrough::SkipFentry)
    );
}
