//! Front-door flows: render a snapshot to disk, preview and apply a
//! request, and report usages, all through `recast::cli`.

use std::fs;
use std::path::Path;

use recast::cli::{load_program, load_request, run_refactor, run_render, run_usages, RefactorOptions};
use recast::config::EngineConfig;
use recast::error::{OutputErrorCode, RecastError};
use recast::java::apply::render_all;
use recast::java::builder::ProgramBuilder;
use recast::java::{Program, SearchScope};

/// `p.Counter` with a field `count` written in `reset()` and read in
/// `p.Main.show(Counter)`.
fn counter() -> Program {
    let mut b = ProgramBuilder::new();
    let file = b.file("src/p/Counter.java", "p");
    let counter = b.class(file, "Counter");
    let count = b.field(counter, "count", "int");
    let reset = b.method(counter, "reset", None);
    let this = b.this();
    let target = b.field_of(this, count);
    let zero = b.int(0);
    let assign = b.assign(target, zero);
    let stmt = b.expr_stmt(assign);
    b.set_body(reset, vec![stmt]);

    let main_file = b.file("src/p/Main.java", "p");
    let main = b.class(main_file, "Main");
    let show = b.method(main, "show", Some("int"));
    let c = b.param(show, "c", "Counter");
    let receiver = b.name(c);
    let read = b.field_of(receiver, count);
    let ret = b.ret(Some(read));
    b.set_body(show, vec![ret]);
    b.finish()
}

fn write_json(path: &Path, value: &impl serde::Serialize) {
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

#[test]
fn snapshot_round_trips_through_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("program.json");
    let program = counter();
    write_json(&path, &program);
    let loaded = load_program(&path).unwrap();
    assert_eq!(render_all(&loaded), render_all(&program));
}

#[test]
fn missing_request_is_file_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_request(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, RecastError::FileNotFound { .. }));
    assert_eq!(OutputErrorCode::from(&err).code(), 3);
}

#[test]
fn usages_report_access_modes() {
    let response = run_usages(
        &counter(),
        "p.Counter.count",
        &SearchScope::Project,
        &EngineConfig::default(),
    )
    .unwrap();
    assert!(response.complete);
    assert_eq!(response.usages.len(), 2);
    let json = serde_json::to_value(&response).unwrap();
    let modes: Vec<_> = json["usages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["mode"].as_str().unwrap().to_string())
        .collect();
    assert!(modes.contains(&"WRITE".to_string()), "{modes:?}");
    assert!(modes.contains(&"READ".to_string()), "{modes:?}");
}

#[test]
fn unknown_symbol_is_an_error() {
    let err = run_usages(
        &counter(),
        "p.Counter.missing",
        &SearchScope::Project,
        &EngineConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, RecastError::SymbolNotFound { .. }), "{err:?}");
}

#[test]
fn preview_then_apply_rename() {
    let dir = tempfile::tempdir().unwrap();
    let program = counter();
    let rendered = run_render(&program, Some(dir.path())).unwrap();
    assert_eq!(rendered.files.len(), 2);
    let main_path = dir.path().join("src/p/Main.java");
    let before = fs::read_to_string(&main_path).unwrap();
    assert!(before.contains("c.count"));

    let request = r#"{
        "operation": "rename",
        "symbol": { "qualified_name": "p.Counter.count" },
        "new_name": "total"
    }"#;
    let request_path = dir.path().join("rename.json");
    fs::write(&request_path, request).unwrap();

    let preview = run_refactor(
        program.clone(),
        load_request(&request_path).unwrap(),
        EngineConfig::default(),
        RefactorOptions::default(),
    )
    .unwrap();
    assert_eq!(preview.status, "preview");
    assert!(preview.unified_diff().contains("return c.total;"));
    assert_eq!(fs::read_to_string(&main_path).unwrap(), before);

    let applied = run_refactor(
        program,
        load_request(&request_path).unwrap(),
        EngineConfig::default(),
        RefactorOptions {
            apply_to: Some(dir.path()),
            confirm: false,
        },
    )
    .unwrap();
    assert_eq!(applied.status, "applied");
    assert!(applied.undo_token.is_some());
    assert_eq!(applied.changes.len(), 2);
    assert!(fs::read_to_string(&main_path).unwrap().contains("c.total"));
}

#[test]
fn blocked_request_maps_to_exit_code() {
    let request = r#"{
        "operation": "rename",
        "symbol": { "qualified_name": "p.Counter.count" },
        "new_name": "class"
    }"#;
    let err = run_refactor(
        counter(),
        serde_json::from_str(request).unwrap(),
        EngineConfig::default(),
        RefactorOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, RecastError::Blocked { .. }));
    assert_eq!(OutputErrorCode::from(&err).code(), 6);
}
