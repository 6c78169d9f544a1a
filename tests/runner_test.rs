//! 运行器集成测试
//!
//! 覆盖依赖顺序启动/关闭、逐帧分发过滤、延迟增删与完整重建

use std::cell::RefCell;
use std::sync::{Arc, Mutex};
use std::task::Poll;
use std::time::Duration;

use features_core::module::{
    ComponentProfile, FeatureCatalog, FeatureDescriptor, FeatureModule, ModuleEvent,
    ModuleProfile, Runner, StartupContext, Submodule, SubmoduleState, TickContext, Tickable,
    TypeKey,
};
use features_core::{Result, RunnerConfig};

thread_local! {
    static LOG: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

fn record(entry: String) {
    LOG.with(|l| l.borrow_mut().push(entry));
}

fn take_log() -> Vec<String> {
    LOG.with(|l| std::mem::take(&mut *l.borrow_mut()))
}

/// 记录启动、tick、关闭的子模块，可声明依赖
macro_rules! recorder {
    ($name:ident) => {
        recorder!($name, []);
    };
    ($name:ident, [$($dep:ty),*]) => {
        #[derive(Default)]
        struct $name;

        impl FeatureDescriptor for $name {
            fn dependencies() -> Vec<TypeKey> {
                vec![$(TypeKey::of::<$dep>()),*]
            }
        }

        impl Submodule for $name {
            fn on_startup(&mut self, _ctx: &mut StartupContext<'_>) -> Poll<Result<()>> {
                record(format!("start:{}", stringify!($name)));
                Poll::Ready(Ok(()))
            }

            fn on_shutdown(&mut self) {
                record(format!("shutdown:{}", stringify!($name)));
            }

            fn as_tickable(&mut self) -> Option<&mut dyn Tickable> {
                Some(self)
            }
        }

        impl Tickable for $name {
            fn tick(&mut self, _ctx: &mut TickContext<'_>) {
                record(format!("tick:{}", stringify!($name)));
            }
        }
    };
}

recorder!(Sa);
recorder!(Sb);
recorder!(Sc);
recorder!(Sd);
recorder!(Se, [Absent]);
recorder!(Sf, [C]);
recorder!(Sg, [Sd]);
recorder!(Sh, [Broken]);

/// 从未注册的模块类型
struct Absent;

struct A;
impl FeatureDescriptor for A {
    const MENU_PATH: Option<&'static str> = Some("Feature/A");
}

struct B;
impl FeatureDescriptor for B {
    const MENU_PATH: Option<&'static str> = Some("Feature/B");
    fn dependencies() -> Vec<TypeKey> {
        vec![TypeKey::of::<A>()]
    }
}

struct C;
impl FeatureDescriptor for C {
    const MENU_PATH: Option<&'static str> = Some("Feature/C");
}

struct Faulty;
impl FeatureDescriptor for Faulty {
    const MENU_PATH: Option<&'static str> = Some("Feature/Faulty");
}

struct D;
impl FeatureDescriptor for D {
    const MENU_PATH: Option<&'static str> = Some("Feature/D");
}

struct E;
impl FeatureDescriptor for E {
    const MENU_PATH: Option<&'static str> = Some("Feature/E");
}

#[derive(Default)]
struct Broken;
impl FeatureDescriptor for Broken {}
impl Submodule for Broken {
    fn on_startup(&mut self, _ctx: &mut StartupContext<'_>) -> Poll<Result<()>> {
        Poll::Ready(Err(anyhow::anyhow!("device missing").into()))
    }
    fn as_tickable(&mut self) -> Option<&mut dyn Tickable> {
        Some(self)
    }
}
impl Tickable for Broken {
    fn tick(&mut self, _ctx: &mut TickContext<'_>) {
        record("tick:Broken".to_string());
    }
}

fn catalog() -> Arc<FeatureCatalog> {
    let mut catalog = FeatureCatalog::new();
    catalog
        .register_module::<A>()
        .register_submodule::<A, Sa>()
        .register_module::<B>()
        .register_submodule::<B, Sb>()
        .register_module::<C>()
        .register_submodule::<C, Sc>()
        .register_module::<Faulty>()
        .register_submodule::<Faulty, Broken>()
        .register_module::<D>()
        .register_submodule::<D, Sd>()
        .register_submodule::<D, Se>()
        .register_submodule::<D, Sf>()
        .register_submodule::<D, Sg>()
        .register_module::<E>()
        .register_submodule::<E, Sh>();
    catalog.into_shared()
}

/// 按给定顺序注册模块
fn runner(keys: &[TypeKey], config: RunnerConfig) -> Runner {
    take_log();
    let catalog = catalog();
    let mut modules = ModuleProfile::new(Arc::clone(&catalog));
    for key in keys {
        modules
            .add(FeatureModule::with_catalog_defaults(*key, &catalog), false)
            .unwrap();
    }
    Runner::new(modules, ComponentProfile::new()).with_config(config)
}

fn frame(runner: &mut Runner) {
    runner.update_with_delta(Duration::from_millis(16));
}

fn key<T: 'static>() -> TypeKey {
    TypeKey::of::<T>()
}

fn index_of(log: &[String], entry: &str) -> usize {
    log.iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("missing log entry {entry}: {log:?}"))
}

#[test]
fn test_scenario_dependents_start_after_dependencies() {
    let mut runner = runner(&[key::<B>(), key::<A>()], RunnerConfig::default());
    assert_eq!(runner.modules().keys(), vec![key::<A>(), key::<B>()]);

    runner.enable();
    frame(&mut runner);

    let log = take_log();
    assert_eq!(log, vec!["start:Sa", "start:Sb", "tick:Sa", "tick:Sb"]);
}

#[test]
fn test_scenario_missing_dependency_is_skipped() {
    let mut runner = runner(&[key::<B>(), key::<C>()], RunnerConfig::default());
    runner.enable();
    frame(&mut runner);
    frame(&mut runner);

    let log = take_log();
    assert!(!log.iter().any(|e| e.ends_with("Sb")), "{log:?}");
    assert_eq!(log, vec!["start:Sc", "tick:Sc", "tick:Sc"]);
}

#[test]
fn test_skip_dependency_checks_outside_design_mode() {
    let config = RunnerConfig {
        skip_dependency_checks: true,
        ..RunnerConfig::default()
    };
    let mut runner = runner(&[key::<B>()], config);
    runner.enable();
    frame(&mut runner);
    assert_eq!(take_log(), vec!["start:Sb", "tick:Sb"]);

    let config = RunnerConfig {
        skip_dependency_checks: true,
        design_mode: true,
        ..RunnerConfig::default()
    };
    let mut runner = self::runner(&[key::<B>()], config);
    runner.enable();
    frame(&mut runner);
    assert!(take_log().is_empty());
}

#[test]
fn test_shutdown_runs_in_reverse_dependency_order() {
    let mut runner = runner(&[key::<A>(), key::<B>()], RunnerConfig::default());
    runner.enable();
    frame(&mut runner);
    take_log();

    runner.disable();
    assert_eq!(take_log(), vec!["shutdown:Sb", "shutdown:Sa"]);
    assert!(!runner.is_running());

    // 停用后不再分发
    frame(&mut runner);
    assert!(take_log().is_empty());
}

#[test]
fn test_shutdown_order_holds_after_dependency_reactivation() {
    let mut runner = runner(&[key::<A>(), key::<B>()], RunnerConfig::default());
    runner.enable();
    frame(&mut runner);

    // 停用不级联，B 保持运行
    assert!(runner.set_module_active("Feature/A", false));
    frame(&mut runner);
    assert!(runner.set_module_active("Feature/A", true));
    frame(&mut runner);
    assert!(runner.get_module_active("Feature/A"));
    take_log();

    runner.disable();
    assert_eq!(take_log(), vec!["shutdown:Sb", "shutdown:Sa"]);
}

#[test]
fn test_submodule_with_unmet_dependency_is_skipped() {
    let mut runner = runner(&[key::<C>(), key::<D>()], RunnerConfig::default());
    runner
        .modules_mut()
        .get_mut(key::<C>())
        .unwrap()
        .set_active(false);

    runner.enable();
    frame(&mut runner);

    // Se 依赖未注册的模块，Sf 依赖停用的模块，兄弟子模块照常启动
    assert_eq!(
        take_log(),
        vec!["start:Sd", "start:Sg", "tick:Sd", "tick:Sg"]
    );
    for skipped in [key::<Se>(), key::<Sf>()] {
        assert!(runner.find_submodule(skipped).is_none());
        let r = runner
            .all_submodules()
            .iter()
            .copied()
            .find(|r| runner.submodule(*r).map(|s| s.key()) == Some(skipped))
            .unwrap();
        assert_eq!(
            runner.submodule(r).map(|s| s.state()),
            Some(SubmoduleState::Uninitialized)
        );
    }
}

#[test]
fn test_failed_submodule_dependency_blocks_dependent() {
    let mut runner = runner(&[key::<E>(), key::<Faulty>()], RunnerConfig::default());
    assert_eq!(runner.modules().keys(), vec![key::<Faulty>(), key::<E>()]);

    runner.enable();
    frame(&mut runner);

    assert!(take_log().is_empty());
    assert!(runner.find_submodule(key::<Sh>()).is_none());
}

#[test]
fn test_add_module_is_deferred_to_next_cycle() {
    let config = RunnerConfig {
        startup_modules: vec!["C".to_string()],
        ..RunnerConfig::default()
    };
    let mut runner = runner(&[key::<A>(), key::<B>(), key::<C>()], config);
    // 没有依赖的模块插在最前
    assert_eq!(runner.modules().keys(), vec![key::<C>(), key::<A>(), key::<B>()]);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    runner.subscribe(Arc::new(move |e: &ModuleEvent| sink.lock().unwrap().push(*e)));

    runner.enable();
    frame(&mut runner);
    assert_eq!(take_log(), vec!["start:Sc", "tick:Sc"]);
    events.lock().unwrap().clear();

    // B 依赖的 A 尚未运行，会被递归地先行加入
    assert!(runner.add_module("Feature/B"));
    assert_eq!(runner.running_modules(), &[key::<C>()]);
    assert_eq!(runner.tickables().len(), 1);

    frame(&mut runner);
    let log = take_log();
    assert_eq!(&log[..2], &["start:Sa", "start:Sb"]);
    assert_eq!(
        runner.running_modules(),
        &[key::<C>(), key::<A>(), key::<B>()]
    );
    assert_eq!(
        *events.lock().unwrap(),
        vec![ModuleEvent::Added(key::<A>()), ModuleEvent::Added(key::<B>())]
    );
    // 按注册表顺序分发
    assert_eq!(&log[2..], &["tick:Sc", "tick:Sa", "tick:Sb"]);
}

#[test]
fn test_remove_module_evicts_running_dependents_first() {
    let mut runner = runner(&[key::<A>(), key::<B>(), key::<C>()], RunnerConfig::default());
    runner.enable();
    frame(&mut runner);
    take_log();

    assert!(runner.remove_module("Feature/A"));
    assert!(runner.get_module_active("Feature/A"));

    frame(&mut runner);
    let log = take_log();
    assert!(index_of(&log, "shutdown:Sb") < index_of(&log, "shutdown:Sa"));
    assert_eq!(log.last().map(String::as_str), Some("tick:Sc"));
    assert_eq!(runner.running_modules(), &[key::<C>()]);
    assert!(!runner.get_module_active("Feature/A"));

    // 同一帧内加入再移除，互相抵消
    assert!(runner.add_module("Feature/A"));
    assert!(runner.remove_module("Feature/A"));
    frame(&mut runner);
    assert_eq!(runner.running_modules(), &[key::<C>()]);
}

#[test]
fn test_inactive_module_and_disabled_submodule_never_tick() {
    let mut runner = runner(&[key::<A>(), key::<C>()], RunnerConfig::default());
    runner.enable();
    frame(&mut runner);
    take_log();

    assert!(runner.set_module_active("Feature/A", false));
    frame(&mut runner);
    assert_eq!(take_log(), vec!["shutdown:Sa", "tick:Sc"]);
    assert!(!runner.get_module_active("Feature/A"));
    // 停用的模块仍在运行集合中
    assert!(runner.running_modules().contains(&key::<A>()));

    assert_eq!(runner.set_submodule_enabled(key::<Sc>(), false), 1);
    frame(&mut runner);
    assert_eq!(take_log(), vec!["shutdown:Sc"]);

    assert!(runner.set_module_active("Feature/A", true));
    runner.set_submodule_enabled(key::<Sc>(), true);
    frame(&mut runner);
    assert_eq!(
        take_log(),
        vec!["start:Sa", "start:Sc", "tick:Sc", "tick:Sa"]
    );
}

#[test]
fn test_dirty_profile_triggers_full_rebuild() {
    let mut runner = runner(&[key::<A>(), key::<B>()], RunnerConfig::default());
    let resets = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&resets);
    runner.subscribe(Arc::new(move |e: &ModuleEvent| {
        if *e == ModuleEvent::Reset {
            *sink.lock().unwrap() += 1;
        }
    }));

    runner.enable();
    frame(&mut runner);
    take_log();

    let catalog = Arc::clone(runner.modules().catalog());
    runner
        .modules_mut()
        .add(FeatureModule::with_catalog_defaults(key::<C>(), &catalog), false)
        .unwrap();

    frame(&mut runner);
    let log = take_log();
    assert_eq!(
        &log[..5],
        &["shutdown:Sb", "shutdown:Sa", "start:Sc", "start:Sa", "start:Sb"]
    );
    assert_eq!(&log[5..], &["tick:Sc", "tick:Sa", "tick:Sb"]);
    assert_eq!(*resets.lock().unwrap(), 2);
}

#[test]
fn test_startup_failure_is_soft() {
    let mut runner = runner(&[key::<Faulty>(), key::<C>()], RunnerConfig::default());
    runner.enable();
    frame(&mut runner);

    assert_eq!(take_log(), vec!["start:Sc", "tick:Sc"]);
    let broken = runner
        .all_submodules()
        .iter()
        .find(|r| r.module == key::<Faulty>())
        .copied()
        .unwrap();
    assert_eq!(
        runner.submodule(broken).map(|s| s.state()),
        Some(SubmoduleState::Failed)
    );
    assert!(runner.find_submodule(key::<Broken>()).is_none());
}

#[test]
fn test_unresolved_menu_paths_return_false() {
    let mut runner = runner(&[key::<A>()], RunnerConfig::default());
    runner.enable();

    assert!(!runner.add_module("Feature/Missing"));
    assert!(!runner.remove_module("Feature/Missing"));
    assert!(!runner.set_module_active("Feature/Missing", true));
    assert!(!runner.get_module_active("Feature/Missing"));
    assert!(runner.get_module_active("Feature/A"));
}

#[test]
fn test_metrics_are_recorded() {
    let mut runner = runner(&[key::<A>()], RunnerConfig::default());
    runner.enable();
    frame(&mut runner);
    frame(&mut runner);
    runner.disable();

    let report = runner.metrics().export();
    let tick = report.phase(features_core::utils::Phase::Tick).unwrap();
    assert_eq!(tick.count, 2);
    assert!(report.phase(features_core::utils::Phase::Startup).unwrap().count >= 1);
    assert!(report.to_json().unwrap().contains("\"tick\""));
}
