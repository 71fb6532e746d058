// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Usage classifier.
//!
//! `find_usages` lists every occurrence of a declaration in a search scope
//! with its access mode:
//!
//! - `x = …` is a WRITE; `x += …`, `++x` and `x--` are one READ_WRITE.
//! - `a[i] = …` writes `a`; `a[i] += 1` is READ_WRITE on `a`.
//! - Calls on a collection-typed variable follow the configured method
//!   table; methods absent from the table are UNCLASSIFIED.
//! - Qualifiers, invocations, type positions, `new` and imports are
//!   UNCLASSIFIED. Imports set `in_import`; comment matches set
//!   `in_comment`.

use std::collections::HashMap;

use recast_core::config::CollectionSemantics;
use recast_core::patch::{FileId, Span};
use recast_core::text::{byte_offset_to_position, find_identifier};
use recast_core::types::Location;
use recast_core::util::CancellationFlag;
use serde::Serialize;
use tracing::{debug, info_span};

use crate::ast::NodeId;
use crate::frontend::{FrontEnd, SearchScope};
use crate::model::{DeclId, Program};
use crate::printer::render_file;
use crate::visit::{RefSite, RefWalker};

pub use crate::visit::AccessMode;

/// One occurrence of a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Usage {
    #[serde(skip)]
    pub file: FileId,
    pub path: String,
    /// Tree node of the reference; `None` for comment matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    #[serde(skip)]
    pub owner: Option<DeclId>,
    pub span: Span,
    pub line: u32,
    pub col: u32,
    pub mode: AccessMode,
    pub in_import: bool,
    pub in_comment: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement: Option<NodeId>,
    /// Position among this declaration's usages in the same statement.
    pub ordinal: u32,
}

impl Usage {
    pub fn location(&self) -> Location {
        Location::with_span(
            self.path.clone(),
            self.line,
            self.col,
            self.span.start,
            self.span.end,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageSet {
    pub usages: Vec<Usage>,
    /// `false` when the scan was cancelled before covering the scope.
    pub complete: bool,
}

impl UsageSet {
    pub fn len(&self) -> usize {
        self.usages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usages.is_empty()
    }

    /// Usages in code, excluding imports and comments.
    pub fn code(&self) -> impl Iterator<Item = &Usage> {
        self.usages.iter().filter(|u| !u.in_import && !u.in_comment)
    }

    pub fn count(&self, mode: AccessMode) -> usize {
        self.code().filter(|u| u.mode == mode).count()
    }
}

/// Options for a usage query.
#[derive(Debug, Clone, Default)]
pub struct UsageOptions<'a> {
    pub include_comments: bool,
    pub collections: Option<&'a CollectionSemantics>,
    pub cancel: Option<&'a CancellationFlag>,
}

/// Find every usage of `decl` in `scope`.
pub fn find_usages(
    program: &Program,
    decl: DeclId,
    scope: &SearchScope,
    options: &UsageOptions<'_>,
) -> UsageSet {
    let span = info_span!("find_usages", decl = %decl);
    let _guard = span.enter();

    let default_table = CollectionSemantics::default();
    let collections = options.collections.unwrap_or(&default_table);
    let name = program.name_of(decl).to_string();
    let mut set = UsageSet {
        usages: Vec::new(),
        complete: true,
    };

    for file in program.files_in(scope) {
        if options.cancel.is_some_and(|c| c.is_cancelled()) {
            set.complete = false;
            break;
        }
        let Some(rendered) = render_file(program, file) else {
            continue;
        };
        let path = program
            .file(file)
            .map(|f| f.path.clone())
            .unwrap_or_default();

        let mut sites: Vec<RefSite> = Vec::new();
        let finished = RefWalker::new(program, collections, file, |site| {
            if site.decl == decl {
                sites.push(site);
            }
        })
        .with_cancel(options.cancel)
        .walk_unit();

        let bytes = rendered.text.as_bytes();
        let mut file_usages: Vec<Usage> = sites
            .into_iter()
            .filter_map(|site| {
                let span = *rendered.spans.get(&site.node)?;
                let (line, col) = byte_offset_to_position(bytes, span.start as usize);
                Some(Usage {
                    file,
                    path: path.clone(),
                    node: Some(site.node),
                    owner: site.owner,
                    span,
                    line,
                    col,
                    mode: site.mode,
                    in_import: site.in_import,
                    in_comment: false,
                    statement: site.statement,
                    ordinal: 0,
                })
            })
            .collect();

        if options.include_comments {
            for comment in &rendered.comments {
                let text = &rendered.text[comment.span.start as usize..comment.span.end as usize];
                for offset in find_identifier(text, &name) {
                    let start = comment.span.start + offset as u64;
                    let span = Span::new(start, start + name.len() as u64);
                    let (line, col) = byte_offset_to_position(bytes, start as usize);
                    file_usages.push(Usage {
                        file,
                        path: path.clone(),
                        node: None,
                        owner: Some(comment.owner),
                        span,
                        line,
                        col,
                        mode: AccessMode::Unclassified,
                        in_import: false,
                        in_comment: true,
                        statement: comment.stmt,
                        ordinal: 0,
                    });
                }
            }
        }

        file_usages.sort_by_key(|u| (u.span.start, u.span.end));
        let mut per_statement: HashMap<NodeId, u32> = HashMap::new();
        for usage in &mut file_usages {
            if let Some(stmt) = usage.statement {
                let next = per_statement.entry(stmt).or_insert(0);
                usage.ordinal = *next;
                *next += 1;
            }
        }
        set.usages.extend(file_usages);

        if !finished {
            set.complete = false;
            break;
        }
    }

    debug!(count = set.usages.len(), complete = set.complete, "usages found");
    set
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AssignOp, UnaryOp};
    use crate::builder::ProgramBuilder;

    fn modes(set: &UsageSet) -> Vec<AccessMode> {
        set.code().map(|u| u.mode).collect()
    }

    mod classification_tests {
        use super::*;

        #[test]
        fn assignment_forms() {
            let mut b = ProgramBuilder::new();
            let file = b.file("p/A.java", "p");
            let a = b.class(file, "A");
            let x = b.field(a, "x", "int");
            let m = b.method(a, "m", None);

            let (t, v) = (b.name(x), b.int(1));
            let write = b.assign(t, v);
            let (t, v) = (b.name(x), b.int(2));
            let compound = b.compound(AssignOp::Add, t, v);
            let t = b.name(x);
            let inc = b.unary(UnaryOp::PostInc, t);
            let r = b.name(x);
            let ret = b.ret(Some(r));
            let stmts = vec![b.expr_stmt(write), b.expr_stmt(compound), b.expr_stmt(inc), ret];
            b.set_body(m, stmts);
            let program = b.finish();

            let set = find_usages(&program, x, &SearchScope::Project, &UsageOptions::default());
            assert!(set.complete);
            assert_eq!(
                modes(&set),
                vec![
                    AccessMode::Write,
                    AccessMode::ReadWrite,
                    AccessMode::ReadWrite,
                    AccessMode::Read
                ]
            );
        }

        #[test]
        fn array_element_assignment_writes_array_then_reads() {
            let mut b = ProgramBuilder::new();
            let file = b.file("p/A.java", "p");
            let a = b.class(file, "A");
            let arr = b.field(a, "a", "int[]");
            let m = b.method(a, "m", None);
            let (lhs_arr, four) = (b.name(arr), b.int(4));
            let lhs = b.index(lhs_arr, four);
            let (rhs_arr, five) = (b.name(arr), b.int(5));
            let rhs = b.index(rhs_arr, five);
            let assign = b.assign(lhs, rhs);
            let stmt = b.expr_stmt(assign);
            let (arr2, i) = (b.name(arr), b.int(0));
            let elem = b.index(arr2, i);
            let one = b.int(1);
            let bump = b.compound(AssignOp::Add, elem, one);
            let stmt2 = b.expr_stmt(bump);
            b.set_body(m, vec![stmt, stmt2]);
            let program = b.finish();

            let set = find_usages(&program, arr, &SearchScope::Project, &UsageOptions::default());
            assert_eq!(
                modes(&set),
                vec![AccessMode::Write, AccessMode::Read, AccessMode::ReadWrite]
            );
            let first: Vec<u32> = set.usages.iter().take(2).map(|u| u.ordinal).collect();
            assert_eq!(first, vec![0, 1]);
            assert_eq!(set.usages[0].statement, set.usages[1].statement);
        }

        #[test]
        fn sorted_map_calls_follow_table() {
            let mut b = ProgramBuilder::new();
            let file = b.file("p/A.java", "p");
            let a = b.class(file, "A");
            let map = b.field(a, "index", "TreeMap<String, Integer>");
            let m = b.method(a, "m", None);
            let mut stmts = Vec::new();
            for method in ["put", "firstKey", "remove", "equals"] {
                let target = b.name(map);
                let call = b.call_unresolved(Some(target), method, Vec::new());
                stmts.push(b.expr_stmt(call));
            }
            b.set_body(m, stmts);
            let program = b.finish();

            let set = find_usages(&program, map, &SearchScope::Project, &UsageOptions::default());
            assert_eq!(
                modes(&set),
                vec![
                    AccessMode::ReadWrite,
                    AccessMode::Read,
                    AccessMode::Write,
                    AccessMode::Unclassified
                ]
            );
        }

        #[test]
        fn qualifier_and_invocation_are_unclassified() {
            let mut b = ProgramBuilder::new();
            let file = b.file("p/A.java", "p");
            let a = b.class(file, "A");
            let peer = b.field(a, "peer", "A");
            let size = b.field(a, "size", "int");
            let run = b.method(a, "run", None);
            let m = b.method(a, "m", None);
            let target = b.name(peer);
            let access = b.field_of(target, size);
            let read = b.expr_stmt(access);
            let call = b.call(None, run, Vec::new());
            let call = b.expr_stmt(call);
            b.set_body(m, vec![read, call]);
            let program = b.finish();

            let peers = find_usages(&program, peer, &SearchScope::Project, &UsageOptions::default());
            assert_eq!(modes(&peers), vec![AccessMode::Unclassified]);
            let sizes = find_usages(&program, size, &SearchScope::Project, &UsageOptions::default());
            assert_eq!(modes(&sizes), vec![AccessMode::Read]);
            let runs = find_usages(&program, run, &SearchScope::Project, &UsageOptions::default());
            assert_eq!(modes(&runs), vec![AccessMode::Unclassified]);
        }
    }

    mod scope_tests {
        use super::*;

        #[test]
        fn imports_and_comments_are_flagged() {
            let mut b = ProgramBuilder::new();
            let f1 = b.file("p/Target.java", "p");
            let target = b.class(f1, "Target");
            let f2 = b.file("q/User.java", "q");
            b.import(f2, "p.Target");
            let user = b.class(f2, "User");
            b.doc(user, "Wraps a Target.");
            b.field(user, "t", "Target");
            let program = b.finish();

            let options = UsageOptions {
                include_comments: true,
                ..Default::default()
            };
            let set = find_usages(&program, target, &SearchScope::Project, &options);
            let flags: Vec<(bool, bool)> =
                set.usages.iter().map(|u| (u.in_import, u.in_comment)).collect();
            assert_eq!(flags, vec![(true, false), (false, true), (false, false)]);
            assert!(set.usages.iter().all(|u| u.path == "q/User.java"));
            assert_eq!(set.usages[0].line, 3);
        }

        #[test]
        fn cancelled_scan_is_incomplete() {
            let mut b = ProgramBuilder::new();
            let file = b.file("p/A.java", "p");
            let a = b.class(file, "A");
            let x = b.field(a, "x", "int");
            let m = b.method(a, "m", None);
            let r = b.name(x);
            let ret = b.ret(Some(r));
            b.set_body(m, vec![ret]);
            let program = b.finish();

            let cancel = CancellationFlag::new();
            cancel.cancel();
            let options = UsageOptions {
                cancel: Some(&cancel),
                ..Default::default()
            };
            let set = find_usages(&program, x, &SearchScope::Project, &options);
            assert!(!set.complete);
            assert!(set.is_empty());
        }
    }
}
