//! End-to-end tests for lazy loading
//!
//! Each test lays out component folders in a temporary directory, starts a
//! loader over them and checks what gets bound, when, and what survives
//! updates and resets.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use lazytree::{
    Bindings, ConfigError, FolderOptions, LoadContext, LoadError, Loader, LoaderConfig,
    LoaderError, ProtectionError, Resolution, ResolutionError, SharedLoader,
};
use tempfile::TempDir;

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn touch_later(path: &Path) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(60)).unwrap();
}

/// `framework` (namespace `Framework`) and `framework.extensions`
/// (namespace `Extensions`), each with its own folder.
fn framework() -> (TempDir, Loader) {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "lib/framework/klass.def", "standard_method\noverridden_method = 1\n");
    write(dir.path(), "lib/framework/klass2.def", "other_method\n");
    write(dir.path(), "lib/extensions/blog.def", "publish\n");

    let mut loader = Loader::new(LoaderConfig::new().with_base(dir.path()));
    loader
        .declare_component("framework")
        .unwrap()
        .namespace("Framework")
        .unwrap()
        .folder("lib/framework", FolderOptions::default())
        .unwrap();
    loader
        .declare_component("framework.extensions")
        .unwrap()
        .namespace("Extensions")
        .unwrap()
        .folder("lib/extensions", FolderOptions::default())
        .unwrap();
    loader.start().unwrap();
    (dir, loader)
}

// ============================================================================
// TRACKING
// ============================================================================

#[test]
fn test_framework_resources_tracked() {
    let (_dir, loader) = framework();

    for name in [
        "Framework",
        "Framework::Extensions",
        "Framework::Extensions::Blog",
        "Framework::Klass",
        "Framework::Klass2",
    ] {
        assert!(loader.find(name).is_some(), "{name} should be tracked");
        assert!(!loader.is_bound(name), "{name} should not be bound yet");
    }

    let framework = loader.find("Framework").unwrap();
    assert!(framework.is_implicitly_defined());
    assert!(framework.is_namespace());
    assert_eq!(framework.files().len(), 0);
    assert_eq!(loader.find("Framework::Klass").unwrap().files().len(), 1);
}

#[test]
fn test_component_namespaces_inherited() {
    let (_dir, loader) = framework();

    assert_eq!(loader.component("framework").unwrap().namespace().as_str(), "Framework");
    assert_eq!(
        loader.component("framework.extensions").unwrap().namespace().as_str(),
        "Framework::Extensions"
    );
}

// ============================================================================
// RESOLUTION
// ============================================================================

#[test]
fn test_resolve_binds_parents_only() {
    let (_dir, mut loader) = framework();

    let blog = loader.resolve("Framework::Extensions::Blog").unwrap();

    assert!(blog.has_member("publish"));
    assert!(loader.is_bound("Framework"));
    assert!(loader.is_bound("Framework::Extensions"));
    assert!(!loader.is_bound("Framework::Klass"));
    assert!(!loader.is_bound("Framework::Klass2"));
}

#[test]
fn test_resolve_is_idempotent() {
    let (_dir, mut loader) = framework();

    let first = loader.resolve("Framework::Klass").unwrap();
    let second = loader.resolve("Framework::Klass").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.member("overridden_method"), Some("1"));
}

#[test]
fn test_unload_then_resolve_round_trip() {
    let (_dir, mut loader) = framework();

    let before = loader.resolve("Framework::Klass").unwrap();
    loader.unload("Framework::Klass").unwrap();
    loader.unload("Framework::Klass").unwrap();
    assert!(!loader.is_bound("Framework::Klass"));
    assert!(loader.is_bound("Framework"));

    let after = loader.resolve("Framework::Klass").unwrap();
    assert_eq!(*before, *after);
}

#[test]
fn test_unknown_name_not_found() {
    let (_dir, mut loader) = framework();

    let err = loader.resolve("Framework::Missing").unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(
        loader.resolve("not a name").unwrap_err(),
        LoaderError::Resolution(ResolutionError::InvalidName { .. })
    ));
}

#[test]
fn test_on_unresolved_name_uses_scope() {
    let (_dir, mut loader) = framework();

    match loader.on_unresolved_name("Framework::Extensions", "Klass").unwrap() {
        Resolution::Bound { name, binding } => {
            assert_eq!(name.as_str(), "Framework::Klass");
            assert!(binding.has_member("standard_method"));
        }
        Resolution::Continue => panic!("Klass should resolve from an enclosing namespace"),
    }
    assert_eq!(
        loader.on_unresolved_name("Framework", "Nope").unwrap(),
        Resolution::Continue
    );
}

#[test]
fn test_related_files_load_together() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "lib/klass.def", "standard_method\noverridden_method = 1\n");
    write(dir.path(), "lib/klass_ext.def", "overridden_method = 2\nextension_method\n");

    let mut loader = Loader::new(LoaderConfig::new().with_base(dir.path()));
    loader
        .declare_component("app")
        .unwrap()
        .folder("lib", FolderOptions::default())
        .unwrap()
        .file("klass_ext.def", ["Klass"])
        .unwrap();
    loader.start().unwrap();

    assert!(loader.find("KlassExt").is_none());
    assert_eq!(loader.find("Klass").unwrap().files().len(), 2);

    let klass = loader.resolve("Klass").unwrap();
    assert!(klass.has_member("standard_method"));
    assert!(klass.has_member("extension_method"));
    assert_eq!(klass.sources().len(), 2);
}

#[test]
fn test_middle_name_provided_by_another_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "lib/a.def", "outer\n[A::B::C]\nleaf\n");
    write(dir.path(), "lib/b.def", "middle\n");

    let mut loader = Loader::new(LoaderConfig::new().with_base(dir.path()));
    loader
        .declare_component("app")
        .unwrap()
        .folder("lib", FolderOptions::explicit())
        .unwrap()
        .file("a.def", ["A", "A::B::C"])
        .unwrap()
        .file("b.def", ["A::B"])
        .unwrap();
    loader.start().unwrap();

    assert!(loader.resolve("A::B::C").unwrap().has_member("leaf"));
    assert!(loader.binding("A").unwrap().has_member("outer"));
    assert!(loader.binding("A::B").unwrap().has_member("middle"));
}

#[test]
fn test_namespace_file_defines_namespace() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "framework.def", "version = 2\n");
    write(dir.path(), "lib/framework/klass.def", "standard_method\n");

    let mut loader = Loader::new(LoaderConfig::new().with_base(dir.path()));
    loader
        .declare_component("framework")
        .unwrap()
        .namespace("Framework")
        .unwrap()
        .namespace_file("framework.def")
        .unwrap()
        .folder("lib/framework", FolderOptions::default())
        .unwrap();
    loader.start().unwrap();

    assert!(!loader.find("Framework").unwrap().is_implicitly_defined());
    assert!(loader.resolve("Framework::Klass").unwrap().has_member("standard_method"));
    let framework = loader.binding("Framework").unwrap();
    assert_eq!(framework.member("version"), Some("2"));
    assert_eq!(framework.sources(), &[dir.path().join("framework.def")]);
}

#[test]
fn test_explicit_folder_ignores_unlisted_files() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "lib/klass.def", "standard_method\n");
    write(dir.path(), "lib/klass_ext.def", "extension_method\n");
    write(dir.path(), "lib/ignored.def", "nothing\n");

    let mut loader = Loader::new(LoaderConfig::new().with_base(dir.path()));
    loader
        .declare_component("app")
        .unwrap()
        .folder("lib", FolderOptions::explicit())
        .unwrap()
        .file("klass.def", ["Klass"])
        .unwrap()
        .file("klass_ext.def", ["Klass"])
        .unwrap();
    loader.start().unwrap();

    assert!(loader.find("Ignored").is_none());
    let klass = loader.resolve("Klass").unwrap();
    assert!(klass.has_member("standard_method"));
    assert!(klass.has_member("extension_method"));
}

#[test]
fn test_custom_effect() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("generated")).unwrap();

    let mut loader = Loader::new(LoaderConfig::new().with_base(dir.path()));
    loader
        .declare_component("app")
        .unwrap()
        .folder("generated", FolderOptions::explicit())
        .unwrap()
        .file_with_effect(
            "virtual.def",
            ["Generated"],
            |cx: &mut LoadContext<'_>| -> Result<(), LoadError> {
                let name = cx.provides()[0].clone();
                cx.define(&name)?.set_member("generated", "yes");
                Ok(())
            },
        )
        .unwrap();
    loader.start().unwrap();

    let generated = loader.resolve("Generated").unwrap();
    assert_eq!(generated.member("generated"), Some("yes"));
}

// ============================================================================
// FAILURES
// ============================================================================

#[test]
fn test_failed_load_leaves_resource_unbound() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "lib/broken.def", "ok\n[Broken\n");

    let mut loader = Loader::new(LoaderConfig::new().with_base(dir.path()));
    loader
        .declare_component("app")
        .unwrap()
        .folder("lib", FolderOptions::default())
        .unwrap();
    loader.start().unwrap();

    match loader.resolve("Broken").unwrap_err() {
        LoaderError::Load(LoadError::Parse { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected a parse error, got {other:?}"),
    }
    assert!(!loader.is_bound("Broken"));

    write(dir.path(), "lib/broken.def", "ok\n");
    assert!(loader.resolve("Broken").unwrap().has_member("ok"));
}

#[test]
fn test_missing_folder_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut loader = Loader::new(LoaderConfig::new().with_base(dir.path()));
    loader
        .declare_component("app")
        .unwrap()
        .folder("nowhere", FolderOptions::default())
        .unwrap();

    assert!(matches!(
        loader.start().unwrap_err(),
        LoaderError::Config(ConfigError::MissingFolder { .. })
    ));
}

#[test]
fn test_declare_after_start_rejected() {
    let (_dir, mut loader) = framework();

    assert!(matches!(
        loader.declare_component("late").err().unwrap(),
        LoaderError::Protection(ProtectionError::Started)
    ));
    let mut handle = loader.component_mut("framework").unwrap();
    assert!(matches!(
        handle.namespace("Other").err().unwrap(),
        LoaderError::Protection(ProtectionError::Frozen { .. })
    ));
}

// ============================================================================
// PRELOAD AND PRE-EXISTING NAMES
// ============================================================================

#[test]
fn test_preload_folder_bound_after_start() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "preload/eager.def", "ready\n");
    write(dir.path(), "lib/lazy.def", "later\n");

    let mut loader = Loader::new(LoaderConfig::new().with_base(dir.path()));
    loader
        .declare_component("app")
        .unwrap()
        .folder("preload", FolderOptions::default().with_preload(true))
        .unwrap();
    loader
        .declare_component("app")
        .err()
        .expect("duplicate declarations are rejected");
    loader
        .component_mut("app")
        .unwrap()
        .folder("lib", FolderOptions::default())
        .unwrap();
    loader.start().unwrap();

    assert!(loader.is_bound("Eager"));
    assert!(!loader.is_bound("Lazy"));

    loader.unload("Eager").unwrap();
    let report = loader.update().unwrap();
    assert_eq!(report.preloaded.len(), 1);
    assert!(loader.is_bound("Eager"));
}

#[test]
fn test_pre_existing_extension_applied_and_kept() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "ext/string.def", "titleize\n");

    let bindings = Bindings::with_globals(["String"]).unwrap();
    let mut loader = Loader::with_bindings(LoaderConfig::new().with_base(dir.path()), bindings);
    loader
        .declare_component("extensions")
        .unwrap()
        .folder("ext", FolderOptions::default())
        .unwrap();
    loader.start().unwrap();

    assert!(loader.find("String").unwrap().is_pre_existing());
    assert!(loader.binding("String").unwrap().has_member("titleize"));

    loader.unload("String").unwrap();
    assert!(loader.is_bound("String"));

    loader.reset();
    assert!(loader.is_bound("String"));
    assert!(loader.find("String").is_none());
}

// ============================================================================
// UPDATE AND RESET
// ============================================================================

#[test]
fn test_update_tracks_added_and_removed_files() {
    let (dir, mut loader) = framework();
    loader.resolve("Framework::Klass2").unwrap();

    write(dir.path(), "lib/framework/klass3.def", "fresh\n");
    fs::remove_file(dir.path().join("lib/framework/klass2.def")).unwrap();
    let report = loader.update().unwrap();

    assert_eq!(report.added, vec![dir.path().join("lib/framework/klass3.def")]);
    assert_eq!(report.removed, vec![dir.path().join("lib/framework/klass2.def")]);
    assert!(loader.find("Framework::Klass2").is_none());
    assert!(!loader.is_bound("Framework::Klass2"));
    assert!(loader.resolve("Framework::Klass3").unwrap().has_member("fresh"));

    assert!(loader.update().unwrap().is_empty());
}

#[test]
fn test_removed_declared_file_leaves_remaining_one() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "lib/klass.def", "standard_method\n");
    write(dir.path(), "lib/klass_ext.def", "extension_method\n");

    let mut loader = Loader::new(LoaderConfig::new().with_base(dir.path()));
    loader
        .declare_component("app")
        .unwrap()
        .folder("lib", FolderOptions::default())
        .unwrap()
        .file("klass_ext.def", ["Klass"])
        .unwrap();
    loader.start().unwrap();
    assert!(loader.resolve("Klass").unwrap().has_member("extension_method"));

    let ext_path = dir.path().join("lib/klass_ext.def");
    fs::remove_file(&ext_path).unwrap();
    let report = loader.update().unwrap();
    assert_eq!(report.removed, vec![ext_path.clone()]);
    assert_eq!(loader.find("Klass").unwrap().files().len(), 1);

    let klass = loader.reload("Klass").unwrap();
    assert_eq!(klass.sources(), &[dir.path().join("lib/klass.def")]);
    assert!(klass.has_member("standard_method"));
    assert!(!klass.has_member("extension_method"));

    write(dir.path(), "lib/klass_ext.def", "extension_method\n");
    let report = loader.update().unwrap();
    assert_eq!(report.added, vec![ext_path]);
    assert!(loader.find("KlassExt").is_none());
    assert_eq!(loader.find("Klass").unwrap().files().len(), 2);
}

#[test]
fn test_removed_inferred_file_leaves_remaining_one() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "lib/klass.def", "standard_method\n");
    write(dir.path(), "lib/more/klass.def", "more_method\n");

    let mut loader = Loader::new(LoaderConfig::new().with_base(dir.path()));
    loader
        .declare_component("app")
        .unwrap()
        .folder("lib", FolderOptions::default().with_nested_namespaces(false))
        .unwrap();
    loader.start().unwrap();
    assert_eq!(loader.resolve("Klass").unwrap().sources().len(), 2);

    fs::remove_file(dir.path().join("lib/more/klass.def")).unwrap();
    let report = loader.update().unwrap();
    assert_eq!(report.removed, vec![dir.path().join("lib/more/klass.def")]);

    let klass = loader.reload("Klass").unwrap();
    assert_eq!(klass.sources(), &[dir.path().join("lib/klass.def")]);
    assert!(!klass.has_member("more_method"));
}

#[test]
fn test_update_reloads_related_files_once() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "lib/klass.def", "standard_method\n");
    write(dir.path(), "lib/klass_ext.def", "extension_method\n");

    let mut loader = Loader::new(LoaderConfig::new().with_base(dir.path()));
    loader
        .declare_component("app")
        .unwrap()
        .folder("lib", FolderOptions::default())
        .unwrap()
        .file("klass_ext.def", ["Klass"])
        .unwrap();
    loader.start().unwrap();
    loader.resolve("Klass").unwrap();

    write(dir.path(), "lib/klass.def", "changed_method\n");
    write(dir.path(), "lib/klass_ext.def", "changed_extension\n");
    touch_later(&dir.path().join("lib/klass.def"));
    touch_later(&dir.path().join("lib/klass_ext.def"));
    let report = loader.update().unwrap();

    assert_eq!(report.reloaded.len(), 1);
    let klass = loader.binding("Klass").unwrap();
    assert!(klass.has_member("changed_method"));
    assert!(klass.has_member("changed_extension"));
    assert!(!klass.has_member("standard_method"));
}

#[test]
fn test_update_reapplies_extension_after_unload() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "ext/string.def", "titleize\n");

    let bindings = Bindings::with_globals(["String"]).unwrap();
    let mut loader = Loader::with_bindings(LoaderConfig::new().with_base(dir.path()), bindings);
    loader
        .declare_component("extensions")
        .unwrap()
        .folder("ext", FolderOptions::default())
        .unwrap();
    loader.start().unwrap();
    loader.unload("String").unwrap();

    let path = dir.path().join("ext/string.def");
    write(dir.path(), "ext/string.def", "titleize\ncapitalize\n");
    touch_later(&path);
    let report = loader.update().unwrap();

    assert_eq!(report.reloaded, vec![path]);
    assert!(loader.binding("String").unwrap().has_member("capitalize"));
}

#[test]
fn test_update_reloads_modified_loaded_files() {
    let (dir, mut loader) = framework();
    let klass_path = dir.path().join("lib/framework/klass.def");
    loader.resolve("Framework::Klass").unwrap();

    write(dir.path(), "lib/framework/klass.def", "standard_method\noverridden_method = 2\n");
    touch_later(&klass_path);
    write(dir.path(), "lib/framework/klass2.def", "changed_but_never_loaded\n");
    touch_later(&dir.path().join("lib/framework/klass2.def"));
    let report = loader.update().unwrap();

    assert_eq!(report.reloaded, vec![klass_path]);
    assert_eq!(
        loader.binding("Framework::Klass").unwrap().member("overridden_method"),
        Some("2")
    );
    assert!(!loader.is_bound("Framework::Klass2"));
}

#[test]
fn test_reset_releases_bindings_and_components() {
    let (_dir, mut loader) = framework();
    loader.resolve("Framework::Klass").unwrap();

    loader.reset();

    assert!(!loader.is_started());
    assert!(!loader.is_bound("Framework"));
    assert!(loader.find("Framework::Klass").is_none());
    assert!(loader.declare_component("framework").is_ok());
}

#[test]
fn test_load_component_loads_children() {
    let (_dir, mut loader) = framework();

    loader.load_component("framework").unwrap();

    assert!(loader.is_bound("Framework::Klass"));
    assert!(loader.is_bound("Framework::Klass2"));
    assert!(loader.is_bound("Framework::Extensions::Blog"));
    assert!(matches!(
        loader.load_component("nope").unwrap_err(),
        LoaderError::Resolution(ResolutionError::UnknownComponent { .. })
    ));
}

// ============================================================================
// SHARED LOADER
// ============================================================================

#[test]
fn test_shared_loader_resolves_across_threads() {
    let (_dir, loader) = framework();
    let shared = SharedLoader::new(loader);

    let handles: Vec<_> = (0..4)
        .map(|index| {
            let shared = shared.clone();
            std::thread::spawn(move || {
                let name = if index % 2 == 0 {
                    "Framework::Klass"
                } else {
                    "Framework::Extensions::Blog"
                };
                shared.resolve(name).is_ok()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert!(shared.is_bound("Framework::Klass"));
    assert!(shared.is_bound("Framework::Extensions::Blog"));
}
