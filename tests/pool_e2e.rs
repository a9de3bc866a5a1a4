//! End-to-end tests: warm-up, borrowing and readiness working together

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use scripter_pool::{
    Dynamic, EnvironmentBuilder, EnvironmentFactory, EnvironmentPool, Error, PoolLifecycle, PoolSettings,
    PoolStatus, Result, StatusReporter, WarmupCoordinator,
};

#[derive(Debug)]
struct FakeEnvironment {
    serial: usize,
}

/// Fails the listed attempts (1-based), succeeds otherwise
struct ScriptedFactory {
    fail_on: Vec<usize>,
    attempts: AtomicUsize,
    delay: Duration,
}

impl ScriptedFactory {
    fn new(fail_on: Vec<usize>) -> Self {
        Self {
            fail_on,
            attempts: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl EnvironmentFactory for ScriptedFactory {
    type Environment = FakeEnvironment;

    fn build(&self, _settings: &PoolSettings) -> Result<FakeEnvironment> {
        thread::sleep(self.delay);
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&attempt) {
            return Err(Error::build(Error::Script(format!("entrypoint failed on attempt {}", attempt))));
        }
        Ok(FakeEnvironment { serial: attempt })
    }
}

fn settings(size: usize) -> PoolSettings {
    PoolSettings::builder()
        .base_dir("/srv/scripts")
        .install_name("fbs")
        .pool_size(size)
        .build()
}

#[test]
fn test_partial_warmup_scenario() {
    let pool = Arc::new(EnvironmentPool::new());
    let reporter = StatusReporter::new(pool.clone());
    let coordinator = WarmupCoordinator::new(Arc::new(ScriptedFactory::new(vec![2, 5])), Arc::clone(&pool));

    assert_eq!(reporter.report(), PoolStatus::NotAvailable);

    let report = coordinator.start(&settings(5)).unwrap().unwrap().join();
    assert_eq!(report.built, 3);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(reporter.report(), PoolStatus::Creating);
    assert_eq!(pool.lifecycle(), PoolLifecycle::Partial);

    let mut seen = HashSet::new();
    for _ in 0..3 {
        let env = pool.acquire();
        seen.insert(env.serial);
    }

    let expected: HashSet<usize> = [1, 3, 4].into_iter().collect();
    assert_eq!(seen, expected);
    assert_eq!(pool.idle_count(), 3);
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn test_acquire_waits_for_background_warmup() {
    let pool = Arc::new(EnvironmentPool::new());
    let factory = ScriptedFactory::new(vec![]).with_delay(Duration::from_millis(20));
    let coordinator = WarmupCoordinator::new(Arc::new(factory), Arc::clone(&pool));

    let handle = coordinator.start(&settings(5)).unwrap().unwrap();

    // Returns as soon as the first environment lands, long before warm-up ends
    let env = pool.acquire();
    assert!(env.serial >= 1);
    drop(env);

    let report = handle.join();
    assert!(report.is_complete());
    assert_eq!(pool.status(), PoolStatus::Ok);
    assert_eq!(pool.lifecycle(), PoolLifecycle::Ready);
}

#[test]
fn test_concurrent_borrowers_under_exhaustion() {
    let pool = Arc::new(EnvironmentPool::new());
    let coordinator = WarmupCoordinator::new(Arc::new(ScriptedFactory::new(vec![])), Arc::clone(&pool));
    coordinator.start(&settings(5)).unwrap().unwrap().join();

    let in_use = Arc::new(parking_lot::Mutex::new(HashSet::new()));
    let peak = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..20)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let in_use = Arc::clone(&in_use);
            let peak = Arc::clone(&peak);
            thread::spawn(move || {
                for _ in 0..20 {
                    let env = pool.acquire();
                    {
                        let mut held = in_use.lock();
                        assert!(held.insert(env.serial), "environment {} lent twice", env.serial);
                        peak.fetch_max(held.len(), Ordering::SeqCst);
                    }
                    thread::sleep(Duration::from_micros(200));
                    in_use.lock().remove(&env.serial);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 5);
    assert_eq!(pool.idle_count(), 5);
}

#[test]
fn test_duplicate_lifecycle_callbacks() {
    let factory = Arc::new(ScriptedFactory::new(vec![]));
    let pool = Arc::new(EnvironmentPool::new());
    let coordinator = Arc::new(WarmupCoordinator::new(Arc::clone(&factory), Arc::clone(&pool)));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || coordinator.start(&settings(7)).unwrap())
        })
        .collect::<Vec<_>>()
        .into_iter()
        .filter_map(|t| t.join().unwrap())
        .collect();

    assert_eq!(handles.len(), 1);
    for handle in handles {
        handle.join();
    }

    assert_eq!(factory.attempts.load(Ordering::SeqCst), 7);
    assert_eq!(pool.initialized_count(), 7);
}

fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

#[test]
fn test_script_environments_from_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path();
    write(root, "distributions/common/src/settings.properties", "modules.search.path=validation\n");
    write(
        root,
        "distributions/common/src/validation/fields.rhai",
        r#"fn required() { ["001", "245"] }"#,
    );
    write(
        root,
        "distributions/fbs/src/entrypoints/update/entrypoint.rhai",
        r#"
        import "fields" as fields;
        let required = fields::required();

        fn initTemplates(settings) { settings.len() }

        fn validateRecord(tags) {
            let missing = [];
            for tag in ["001", "245"] {
                if !tags.contains(tag) { missing.push(tag); }
            }
            missing.len()
        }
        "#,
    );

    let settings = PoolSettings::builder()
        .base_dir(root)
        .install_name("fbs")
        .pool_size(5)
        .property("javascript.install.name", "fbs")
        .build_validated()
        .unwrap();

    let pool = Arc::new(EnvironmentPool::new());
    let coordinator = WarmupCoordinator::new(Arc::new(EnvironmentBuilder::new()), Arc::clone(&pool));
    let report = coordinator.start(&settings).unwrap().unwrap().join();
    assert!(report.is_complete(), "failures: {:?}", report.failures);

    let mut env = pool.acquire();
    assert_eq!(env.global("required").unwrap().into_array().unwrap().len(), 2);

    let tags: Dynamic = vec![Dynamic::from("001".to_string())].into();
    let missing = env.call_function("validateRecord", vec![tags]).unwrap();
    assert_eq!(missing.as_int().unwrap(), 1);

    let err = env.call_function("noSuchRule", vec![]).unwrap_err();
    assert!(matches!(err, Error::Script(_)));
}

#[test]
fn test_broken_distribution_degrades_gracefully() {
    let dir = tempfile::TempDir::new().unwrap();
    write(
        dir.path(),
        "distributions/fbs/src/entrypoints/update/entrypoint.rhai",
        r#"import "missing_module" as m;"#,
    );

    let settings = PoolSettings::builder()
        .base_dir(dir.path())
        .install_name("fbs")
        .pool_size(5)
        .build();

    let pool = Arc::new(EnvironmentPool::new());
    let coordinator = WarmupCoordinator::new(Arc::new(EnvironmentBuilder::new()), Arc::clone(&pool));
    let report = coordinator.start(&settings).unwrap().unwrap().join();

    assert_eq!(report.built, 0);
    assert!(report.failures.iter().all(|f| f.error.contains("missing_module")));
    assert_eq!(pool.status(), PoolStatus::NotAvailable);
    assert!(pool.acquire_timeout(Duration::from_millis(10)).unwrap_err().is_exhausted());
}
