//! Extension Registry Tests
//!
//! Exercises the registry against an in-process module loader and a
//! scripted transport:
//! - Load/unload bookkeeping and handle release
//! - Install, update and remove against the remote index
//! - Index refresh cooldown and update flags

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nonbiri_core::extension::{
    compute_sha256, index_url, parse_index, render_index, Capabilities, ErrorKind,
    ExtensionError, ExtensionRegistry, VersionChange,
};
use nonbiri_testing::{MockModuleLoader, MockTransport, ModuleBehavior, ModuleSpec};
use serde_json::json;
use tempfile::TempDir;

const BASE: &str = "http://index.test/releases";

struct Fixture {
    dir: TempDir,
    transport: Arc<MockTransport>,
    loader: MockModuleLoader,
    registry: ExtensionRegistry,
}

impl Fixture {
    fn new() -> Self {
        Self::with_cooldown(Duration::from_secs(600))
    }

    fn with_cooldown(cooldown: Duration) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let loader = MockModuleLoader::new();
        let registry = ExtensionRegistry::new(
            Capabilities::new(transport.clone()),
            dir.path().join("extensions"),
        )
        .with_loader(loader.clone())
        .with_index_base_url(BASE)
        .with_index_cooldown(cooldown);

        Self {
            dir,
            transport,
            loader,
            registry,
        }
    }

    /// Write a module file outside the install directory.
    fn module(&self, spec: ModuleSpec) -> std::path::PathBuf {
        let name = format!("lib{}-{}.so", spec.id, spec.version);
        spec.write(self.dir.path(), &name).unwrap()
    }

    fn install_dir(&self) -> &Path {
        self.registry.install_dir()
    }

    /// Publish an index listing `(id, version)` pairs and serve their files.
    fn publish(&self, modules: &[(&str, &str)]) {
        let mut document = serde_json::Map::new();
        for (id, version) in modules {
            let path = format!("linux/lib{}.so", id);
            document.insert(
                id.to_string(),
                json!({
                    "name": id.to_uppercase(),
                    "baseUrl": format!("https://{}.example", id),
                    "language": "en",
                    "version": version,
                    "isNsfw": false,
                    "path": path,
                }),
            );
            self.transport.respond(
                format!("{}/{}", BASE, path),
                200,
                ModuleSpec::new(id, version).to_bytes(),
            );
        }
        self.transport.respond(
            index_url(BASE),
            200,
            serde_json::to_vec(&document).unwrap(),
        );
    }
}

// ============================================================================
// Load / unload
// ============================================================================

#[test]
fn test_load_and_get() {
    let fx = Fixture::new();
    let path = fx.module(ModuleSpec::new("alpha", "1.0.0"));

    let loaded = fx.registry.load(&path).unwrap();
    assert_eq!(loaded.id(), "alpha");
    assert_eq!(loaded.path(), path.as_path());

    let got = fx.registry.get("alpha").unwrap();
    assert_eq!(got.metadata().version, "1.0.0");
    assert!(fx.registry.get("beta").is_none());

    let handles = fx.loader.handles();
    assert_eq!(handles.live(), 1);
    assert_eq!(handles.initialized(), 1);
    assert_eq!(fx.registry.list().len(), 1);
}

#[test]
fn test_load_twice_is_conflict() {
    let fx = Fixture::new();
    let path = fx.module(ModuleSpec::new("alpha", "1.0.0"));
    let other = fx.module(ModuleSpec::new("alpha", "2.0.0"));

    fx.registry.load(&path).unwrap();
    let err = fx.registry.load(&other).unwrap_err();
    assert!(matches!(err, ExtensionError::AlreadyLoaded(ref id) if id == "alpha"));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // The rejected copy was released; the original is untouched.
    let handles = fx.loader.handles();
    assert_eq!(handles.opened(), 2);
    assert_eq!(handles.released(), 1);
    assert_eq!(fx.registry.get("alpha").unwrap().metadata().version, "1.0.0");
}

#[test]
fn test_failed_loads_release_handles() {
    let fx = Fixture::new();
    let broken = [
        ModuleSpec::new("a", "1.0.0").with_behavior(ModuleBehavior::MissingInit),
        ModuleSpec::new("b", "1.0.0").with_behavior(ModuleBehavior::MissingCreate),
        ModuleSpec::new("c", "1.0.0").with_behavior(ModuleBehavior::NullInstance),
        ModuleSpec::new("d", "1.0.0").with_abi(99),
    ];

    for spec in broken {
        let path = fx.module(spec);
        let err = fx.registry.load(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Abi, "unexpected error: {}", err);
    }

    let handles = fx.loader.handles();
    assert_eq!(handles.opened(), 4);
    assert_eq!(handles.released(), 4);
    assert!(fx.registry.list().is_empty());
}

#[test]
fn test_load_missing_file() {
    let fx = Fixture::new();
    let err = fx
        .registry
        .load(&fx.dir.path().join("libnothing.so"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(fx.loader.handles().opened(), 0);
}

#[test]
fn test_unload_is_not_idempotent() {
    let fx = Fixture::new();
    fx.registry
        .load(&fx.module(ModuleSpec::new("alpha", "1.0.0")))
        .unwrap();
    fx.registry
        .load(&fx.module(ModuleSpec::new("beta", "1.0.0")))
        .unwrap();

    fx.registry.unload("alpha").unwrap();
    assert_eq!(fx.loader.handles().live(), 1);

    let err = fx.registry.unload("alpha").unwrap_err();
    assert!(matches!(err, ExtensionError::NotLoaded(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    // Registry otherwise unchanged
    assert!(fx.registry.get("beta").is_some());
    assert_eq!(fx.registry.list().len(), 1);
}

#[test]
fn test_unload_waits_for_outstanding_references() {
    let fx = Fixture::new();
    fx.registry
        .load(&fx.module(ModuleSpec::new("alpha", "1.0.0")))
        .unwrap();

    let in_use = fx.registry.get("alpha").unwrap();
    fx.registry.unload("alpha").unwrap();
    assert!(fx.registry.get("alpha").is_none());
    assert_eq!(fx.loader.handles().live(), 1);

    // Still callable while held.
    assert!(in_use.extension().latest(1).is_ok());
    drop(in_use);
    assert_eq!(fx.loader.handles().live(), 0);
}

#[test]
fn test_concurrent_loads_keep_at_most_one() {
    let fx = Arc::new(Fixture::new());
    let path = fx.module(ModuleSpec::new("alpha", "1.0.0"));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let fx = Arc::clone(&fx);
            let path = path.clone();
            thread::spawn(move || fx.registry.load(&path).is_ok())
        })
        .collect();
    let successes = workers
        .into_iter()
        .map(|w| w.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(successes, 1);
    assert_eq!(fx.registry.list().len(), 1);
    assert_eq!(fx.loader.handles().live(), 1);
}

#[test]
fn test_discover_skips_bad_modules() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.install_dir()).unwrap();
    ModuleSpec::new("beta", "1.0.0")
        .write(fx.install_dir(), "libbeta.so")
        .unwrap();
    ModuleSpec::new("alpha", "1.0.0")
        .write(fx.install_dir(), "libalpha.so")
        .unwrap();
    ModuleSpec::new("gamma", "1.0.0")
        .with_behavior(ModuleBehavior::NullInstance)
        .write(fx.install_dir(), "libgamma.so")
        .unwrap();
    std::fs::write(fx.install_dir().join("README.md"), "not a module").unwrap();

    let ids = fx.registry.discover();
    assert_eq!(ids, vec!["alpha".to_string(), "beta".to_string()]);
    assert_eq!(fx.loader.handles().live(), 2);
}

// ============================================================================
// Index
// ============================================================================

#[test]
fn test_refresh_respects_cooldown() {
    let fx = Fixture::new();
    fx.publish(&[("alpha", "1.0.0")]);

    assert!(fx.registry.refresh_index().unwrap());
    assert!(!fx.registry.refresh_index().unwrap());
    assert_eq!(fx.transport.requests_to(&index_url(BASE)), 1);
    assert_eq!(fx.registry.list_index().len(), 1);
}

#[test]
fn test_force_refresh_ignores_cooldown() {
    let fx = Fixture::new();
    fx.publish(&[("alpha", "1.0.0")]);

    fx.registry.refresh_index().unwrap();
    assert!(fx.registry.force_refresh_index().unwrap());
    assert_eq!(fx.transport.requests_to(&index_url(BASE)), 2);
}

#[test]
fn test_failed_refresh_still_starts_cooldown() {
    let fx = Fixture::new();

    let err = fx.registry.refresh_index().unwrap_err();
    assert!(matches!(err, ExtensionError::DownloadFailed { status: 404, .. }));
    assert_eq!(err.kind(), ErrorKind::Transport);

    fx.publish(&[("alpha", "1.0.0")]);
    assert!(!fx.registry.refresh_index().unwrap());
    assert_eq!(fx.transport.request_count(), 1);
}

#[test]
fn test_refresh_replaces_index() {
    let fx = Fixture::with_cooldown(Duration::ZERO);
    fx.publish(&[("alpha", "1.0.0"), ("beta", "1.0.0")]);
    fx.registry.refresh_index().unwrap();
    assert!(fx.registry.descriptor("beta").is_some());

    fx.transport.respond(
        index_url(BASE),
        200,
        serde_json::to_vec(&json!({
            "alpha": { "name": "ALPHA", "version": "1.1.0", "path": "linux/libalpha.so" }
        }))
        .unwrap(),
    );
    fx.registry.refresh_index().unwrap();

    assert!(fx.registry.descriptor("beta").is_none());
    assert_eq!(fx.registry.descriptor("alpha").unwrap().version, "1.1.0");
}

#[test]
fn test_refresh_recomputes_update_flags() {
    let fx = Fixture::with_cooldown(Duration::ZERO);
    fx.registry
        .load(&fx.module(ModuleSpec::new("alpha", "1.0.0")))
        .unwrap();
    assert!(!fx.registry.get("alpha").unwrap().has_update());

    fx.publish(&[("alpha", "1.1.0"), ("beta", "1.0.0")]);
    fx.registry.refresh_index().unwrap();

    let alpha = fx.registry.get("alpha").unwrap();
    assert!(alpha.has_update());

    let info = &fx.registry.list()[0];
    assert!(info.has_update);
    assert_eq!(info.latest_version.as_deref(), Some("1.1.0"));
    assert_eq!(info.version_change, Some(VersionChange::Upgrade));

    let entries = fx.registry.list_index();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].id, "alpha");
    assert!(entries[0].installed);
    assert!(entries[0].has_update);
    assert_eq!(entries[0].installed_version.as_deref(), Some("1.0.0"));
    assert!(!entries[1].installed);

    // Same version published again clears the flag.
    fx.publish(&[("alpha", "1.0.0")]);
    fx.registry.refresh_index().unwrap();
    assert!(!alpha.has_update());
}

// ============================================================================
// Install / update / remove
// ============================================================================

#[test]
fn test_install_downloads_and_loads() {
    let fx = Fixture::new();
    fx.publish(&[("alpha", "1.0.0")]);
    fx.registry.refresh_index().unwrap();

    let loaded = fx.registry.install("alpha", false).unwrap();
    assert_eq!(loaded.id(), "alpha");
    assert!(fx.install_dir().join("libalpha.so").is_file());
    assert!(!fx.install_dir().join("libalpha.so.part").exists());
    assert_eq!(
        fx.transport
            .requests_to(&format!("{}/linux/libalpha.so", BASE)),
        1
    );

    let err = fx.registry.install("alpha", false).unwrap_err();
    assert!(matches!(err, ExtensionError::AlreadyInstalled(_)));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test]
fn test_install_unknown_id() {
    let fx = Fixture::new();
    fx.publish(&[("alpha", "1.0.0")]);
    fx.registry.refresh_index().unwrap();

    let err = fx.registry.install("missing", false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(fx.transport.request_count(), 1);
}

#[test]
fn test_install_download_failure_leaves_no_state() {
    let fx = Fixture::new();
    fx.publish(&[("alpha", "1.0.0")]);
    fx.registry.refresh_index().unwrap();
    fx.transport
        .respond(format!("{}/linux/libalpha.so", BASE), 503, Vec::new());

    let err = fx.registry.install("alpha", false).unwrap_err();
    assert!(matches!(err, ExtensionError::DownloadFailed { status: 503, .. }));
    assert!(fx.registry.get("alpha").is_none());
    assert!(!fx.install_dir().join("libalpha.so").exists());
}

#[test]
fn test_install_timeout_is_transport_failure() {
    let fx = Fixture::new();
    fx.publish(&[("alpha", "1.0.0")]);
    fx.registry.refresh_index().unwrap();
    fx.transport.timeout(format!("{}/linux/libalpha.so", BASE));

    let err = fx.registry.install("alpha", false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(fx.registry.get("alpha").is_none());
}

#[test]
fn test_install_verifies_checksum() {
    let fx = Fixture::new();
    let bytes = ModuleSpec::new("alpha", "1.0.0").to_bytes();
    fx.transport
        .respond(format!("{}/linux/libalpha.so", BASE), 200, bytes);
    fx.transport.respond(
        index_url(BASE),
        200,
        serde_json::to_vec(&json!({
            "alpha": {
                "name": "ALPHA",
                "version": "1.0.0",
                "path": "linux/libalpha.so",
                "sha256": "00".repeat(32),
            }
        }))
        .unwrap(),
    );
    fx.registry.refresh_index().unwrap();

    let err = fx.registry.install("alpha", false).unwrap_err();
    assert!(matches!(err, ExtensionError::ChecksumMismatch { .. }));
    assert!(!fx.install_dir().join("libalpha.so").exists());
}

#[test]
fn test_update_replaces_loaded_module() {
    let fx = Fixture::with_cooldown(Duration::ZERO);
    fx.publish(&[("alpha", "1.0.0")]);
    fx.registry.refresh_index().unwrap();
    fx.registry.install("alpha", false).unwrap();

    fx.publish(&[("alpha", "2.0.0")]);
    fx.registry.refresh_index().unwrap();
    assert!(fx.registry.get("alpha").unwrap().has_update());

    let updated = fx.registry.update("alpha").unwrap();
    assert_eq!(updated.metadata().version, "2.0.0");
    assert!(!updated.has_update());
    assert_eq!(fx.registry.list().len(), 1);
    assert_eq!(fx.loader.handles().live(), 1);
}

#[test]
fn test_install_replaces_stale_file() {
    let fx = Fixture::new();
    fx.publish(&[("alpha", "1.1.0")]);
    fx.registry.refresh_index().unwrap();

    std::fs::create_dir_all(fx.install_dir()).unwrap();
    ModuleSpec::new("alpha", "0.9.0")
        .write(fx.install_dir(), "libalpha.so")
        .unwrap();

    let loaded = fx.registry.install("alpha", false).unwrap();
    assert_eq!(loaded.metadata().version, "1.1.0");
}

#[test]
fn test_remove_unloads_and_deletes() {
    let fx = Fixture::new();
    fx.publish(&[("alpha", "1.0.0")]);
    fx.registry.refresh_index().unwrap();
    fx.registry.install("alpha", false).unwrap();

    fx.registry.remove("alpha").unwrap();
    assert!(fx.registry.get("alpha").is_none());
    assert!(!fx.install_dir().join("libalpha.so").exists());
    assert_eq!(fx.loader.handles().live(), 0);

    let err = fx.registry.remove("alpha").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ============================================================================
// Index builder
// ============================================================================

#[test]
fn test_build_index_describes_loaded_modules() {
    let dir = tempfile::tempdir().unwrap();
    let modules = dir.path().join("linux");
    std::fs::create_dir_all(&modules).unwrap();
    ModuleSpec::new("beta", "0.2.0")
        .write(&modules, "libbeta.so")
        .unwrap();
    ModuleSpec::new("alpha", "1.0.0")
        .write(&modules, "libalpha.so")
        .unwrap();

    let builder = ExtensionRegistry::new(
        Capabilities::new(Arc::new(MockTransport::new())),
        &modules,
    )
    .with_loader(MockModuleLoader::new());
    assert_eq!(builder.discover().len(), 2);

    let descriptors = builder.build_index().unwrap();
    assert_eq!(descriptors.len(), 2);
    assert_eq!(descriptors[0].id, "alpha");
    assert_eq!(descriptors[0].path, "linux/libalpha.so");
    assert_eq!(descriptors[1].version, "0.2.0");

    // The rendered document is what a refresh consumes.
    let document = render_index(&descriptors).unwrap();
    let parsed = parse_index(document.as_bytes()).unwrap();
    assert_eq!(parsed["beta"].path, "linux/libbeta.so");
    assert_eq!(
        parsed["alpha"].sha256.as_deref(),
        Some(compute_sha256(&ModuleSpec::new("alpha", "1.0.0").to_bytes()).as_str())
    );
}
