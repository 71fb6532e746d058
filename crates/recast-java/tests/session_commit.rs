// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! End-to-end sessions: JSON requests, disk commits, undo and symbol
//! revalidation across commits.

use std::fs;
use std::sync::Arc;

use recast_core::config::EngineConfig;
use recast_core::workspace::{DiskFileStore, FileStore, MemoryFileStore};
use recast_java::builder::ProgramBuilder;
use recast_java::ops::{MemberSpec, PushDown, Rename};
use recast_java::{DeclId, Program, Refactoring, SessionState, SymbolRef, Workspace};

struct Shapes {
    program: Program,
    base: DeclId,
    area: DeclId,
}

/// `Shape` with `int area()` and an unused `count`, subclasses `Square`
/// and `Circle`, and `Main` calling `area` on a `Square`.
fn shapes() -> Shapes {
    let mut b = ProgramBuilder::new();
    let file = b.file("src/p/Shape.java", "p");
    let base = b.class(file, "Shape");
    b.field(base, "count", "int");
    let area = b.method(base, "area", Some("int"));
    let zero = b.int(0);
    let ret = b.ret(Some(zero));
    b.set_body(area, vec![ret]);
    for name in ["Square", "Circle"] {
        let file = b.file(&format!("src/p/{name}.java"), "p");
        let sub = b.class(file, name);
        b.extends(sub, base);
    }
    let main_file = b.file("src/p/Main.java", "p");
    let main = b.class(main_file, "Main");
    let run = b.method(main, "run", Some("int"));
    let square = b.param(run, "s", "Square");
    let receiver = b.name(square);
    let call = b.call(Some(receiver), area, vec![]);
    let ret = b.ret(Some(call));
    b.set_body(run, vec![ret]);
    Shapes {
        program: b.finish(),
        base,
        area,
    }
}

fn push_down(s: &Shapes) -> Refactoring {
    Refactoring::PushDown(PushDown {
        source: SymbolRef::of(&s.program, s.base).unwrap(),
        members: vec![MemberSpec::new(SymbolRef::of(&s.program, s.area).unwrap())],
    })
}

#[test]
fn disk_commit_and_undo() {
    let dir = tempfile::tempdir().unwrap();
    let s = shapes();
    let store = Arc::new(DiskFileStore::open(dir.path()).unwrap());
    let ws = Workspace::materialize(s.program.clone(), store, EngineConfig::default()).unwrap();
    let shape_path = dir.path().join("src/p/Shape.java");
    let original = fs::read_to_string(&shape_path).unwrap();

    let mut session = ws.session(push_down(&s));
    let problems = session.do_refactoring(true).unwrap();
    assert_eq!(session.state(), SessionState::Committed, "{problems:?}");
    assert!(!fs::read_to_string(&shape_path).unwrap().contains("area"));
    let square = fs::read_to_string(dir.path().join("src/p/Square.java")).unwrap();
    assert!(square.contains("int area() {"));

    session.undo().unwrap();
    assert_eq!(fs::read_to_string(&shape_path).unwrap(), original);
}

#[test]
fn json_request_runs_against_a_workspace() {
    let s = shapes();
    let store = Arc::new(MemoryFileStore::new());
    let ws = Workspace::materialize(s.program, store.clone(), EngineConfig::default()).unwrap();
    let request = r#"{
        "operation": "safe_delete",
        "symbols": [{ "qualified_name": "p.Shape.count" }]
    }"#;
    let refactoring: Refactoring = serde_json::from_str(request).unwrap();

    let mut session = ws.session(refactoring);
    let problems = session.do_refactoring(false).unwrap();
    assert!(problems.is_empty(), "{problems:?}");
    let shape = store.read("src/p/Shape.java").unwrap().unwrap();
    assert!(!shape.contains("count"));
}

#[test]
fn symbol_refs_survive_a_commit() {
    let s = shapes();
    let store = Arc::new(MemoryFileStore::new());
    let ws = Workspace::materialize(s.program.clone(), store.clone(), EngineConfig::default()).unwrap();
    let area = SymbolRef::of(&s.program, s.area).unwrap();

    let rename = Rename {
        symbol: area.clone(),
        new_name: "surface".to_string(),
    };
    ws.session(Refactoring::Rename(rename)).do_refactoring(false).unwrap();

    let current = ws.snapshot();
    assert!(area.is_stale(&current));
    let fresh = area.revalidate(&current).unwrap();
    assert_eq!(fresh.qualified_name, "p.Shape.surface");
    assert!(store.read("src/p/Main.java").unwrap().unwrap().contains("s.surface()"));

    // A by-name reference taken before the commit no longer binds.
    let by_name = SymbolRef::named("p.Shape.area");
    assert!(by_name.resolve(&current).is_err());
}

#[test]
fn fatal_problems_leave_the_store_untouched() {
    let s = shapes();
    let store = Arc::new(MemoryFileStore::new());
    let ws = Workspace::materialize(s.program, store.clone(), EngineConfig::default()).unwrap();
    let before = store.snapshot();

    let rename = Rename {
        symbol: SymbolRef::named("p.Shape.area"),
        new_name: "class".to_string(),
    };
    let mut session = ws.session(Refactoring::Rename(rename));
    let problems = session.do_refactoring(true).unwrap();
    assert!(problems.iter().any(|p| p.is_fatal()));
    assert_eq!(session.state(), SessionState::Aborted);
    assert_eq!(store.snapshot(), before);
    assert!(session.refactoring_elements().is_empty());
}
