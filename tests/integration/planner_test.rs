use std::path::{Path, PathBuf};

use ib::config::{CcConfig, Cfg};
use ib::job::JobKind;
use ib::planner::Planner;
use ib::script;
use ib::spec::{Kind, Spec};

fn fixtures_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Pre-populates a source's header-cache side-car so planning never shells
/// out to a real compiler; `headers` are relpaths rooted at `fixtures_root()`.
fn seed_header_cache(out_root: &Path, source_relpath: &str, headers: &[&str]) {
    let mut name = std::ffi::OsString::from(source_relpath);
    name.push(".ib_hdrs");
    let path = out_root.join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let body = headers.iter().map(|h| format!("{}\n", h)).collect::<String>();
    std::fs::write(path, body).unwrap();
}

fn seed_all_caches(out_root: &Path) {
    seed_header_cache(out_root, "examples/basic.c", &[]);
    seed_header_cache(
        out_root,
        "examples/hello.cc",
        &[
            "examples/hello_world/hello.h",
            "examples/hello_world/follow_headers.h",
            "examples/hello_world/world.h",
        ],
    );
    seed_header_cache(
        out_root,
        "examples/hello_world/hello.cc",
        &["examples/hello_world/hello.h", "examples/hello_world/follow_headers.h"],
    );
    seed_header_cache(out_root, "examples/hello_world/world.cc", &["examples/hello_world/world.h"]);
    seed_header_cache(
        out_root,
        "examples/hello_world/follow_headers.cc",
        &["examples/hello_world/follow_headers.h"],
    );
    seed_header_cache(out_root, "examples/hello_world/hello.h", &["examples/hello_world/follow_headers.h"]);
    seed_header_cache(out_root, "examples/hello_world/world.h", &[]);
    seed_header_cache(out_root, "examples/hello_world/follow_headers.h", &[]);
}

fn new_planner(out_root: &Path) -> Planner {
    Planner::new(fixtures_root(), out_root.to_path_buf(), String::new(), CcConfig::default())
}

#[test]
fn convert_target_resolves_absolute_and_relative_the_same() {
    let out = tempfile::tempdir().unwrap();
    let planner = new_planner(out.path());

    let relative = planner.convert_target("examples/hello").unwrap();
    let absolute = planner.convert_target("/examples/hello").unwrap();
    assert_eq!(relative, absolute);
    assert_eq!(relative, Spec::new("examples", "hello", ""));
    assert_eq!(relative.kind().unwrap(), Kind::Executable);
}

#[test]
fn convert_target_so_suffix_resolves_to_shared_library() {
    let out = tempfile::tempdir().unwrap();
    let planner = new_planner(out.path());

    let spec = planner.convert_target("/examples/hello.so").unwrap();
    assert_eq!(spec, Spec::new("examples", "hello", ".so"));
    assert_eq!(spec.kind().unwrap(), Kind::SharedLibrary);
}

#[test]
fn yield_waves_produces_one_compile_wave_then_one_link_wave() {
    let out = tempfile::tempdir().unwrap();
    seed_all_caches(out.path());
    let mut planner = new_planner(out.path());

    let targets = ["examples/hello", "examples/basic", "/examples/hello.so", "/examples/basic.so"];
    let specs: Vec<Spec> = targets.iter().map(|t| planner.convert_target(t).unwrap()).collect();

    let waves: Vec<Vec<_>> = planner.yield_waves(&specs).unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(waves.len(), 2, "expected exactly two waves");

    let wave1_kinds: Vec<JobKind> = waves[0].iter().map(|j| j.borrow().job_kind).collect();
    assert_eq!(wave1_kinds.len(), 5);
    assert!(wave1_kinds.iter().all(|k| *k == JobKind::Compile));

    let wave2_kinds: Vec<JobKind> = waves[1].iter().map(|j| j.borrow().job_kind).collect();
    assert_eq!(wave2_kinds.iter().filter(|k| **k == JobKind::LinkExe).count(), 2);
    assert_eq!(wave2_kinds.iter().filter(|k| **k == JobKind::LinkSo).count(), 2);
}

#[test]
fn first_wave_script_depends_on_every_translation_units_object() {
    let out = tempfile::tempdir().unwrap();
    seed_all_caches(out.path());
    let mut planner = new_planner(out.path());
    let cfg = Cfg::load(&fixtures_root(), "debug").unwrap();

    let targets = ["examples/hello", "examples/basic", "/examples/hello.so", "/examples/basic.so"];
    let specs: Vec<Spec> = targets.iter().map(|t| planner.convert_target(t).unwrap()).collect();
    let mut waves = planner.yield_waves(&specs).unwrap();
    let wave1 = waves.next().unwrap().unwrap();

    let rendered = script::render_wave(&mut planner, &cfg, &wave1, false).unwrap();
    for expected in [
        "examples/basic.o",
        "examples/hello.o",
        "examples/hello_world/hello.o",
        "examples/hello_world/world.o",
        "examples/hello_world/follow_headers.o",
    ] {
        assert!(
            rendered.contains(expected),
            "expected wave 1 script to depend on {}, got:\n{}",
            expected,
            rendered
        );
    }
}

#[test]
fn header_implied_by_cpp_source_pulls_its_object_into_the_link() {
    let out = tempfile::tempdir().unwrap();
    seed_all_caches(out.path());
    let mut planner = new_planner(out.path());

    let hello_object = Spec::new("examples", "hello", ".o");
    let objects = planner.transitive_objects(&hello_object).unwrap();
    let follow_headers_object = Spec::new("examples/hello_world", "follow_headers", ".o");
    assert!(
        objects.contains(&follow_headers_object),
        "follow_headers.o (implied via follow_headers.h, included from hello.cc) should be in \
         the object set linked into examples/hello, got {:?}",
        objects
    );
}

#[test]
fn no_progress_is_reported_for_an_unresolvable_target() {
    let out = tempfile::tempdir().unwrap();
    let mut planner = new_planner(out.path());
    let spec = planner.convert_target("/examples/nonexistent").unwrap();
    let err = planner.yield_waves(&[spec]);
    assert!(err.is_err());
}
