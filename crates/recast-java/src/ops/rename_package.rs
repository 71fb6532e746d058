// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Rename a package, or a package folder with everything below it.
//!
//! Every contained file gets the new package declaration and moves to the
//! matching directory. Imports and qualified names follow from the types'
//! new package when the files are rendered; documentation mentions of the
//! old package are rewritten textually. A case-only rename is planned like
//! any other and split into two store moves at commit time.

use std::collections::BTreeSet;

use recast_core::config::EngineConfig;
use recast_core::problem::{Problem, ProblemKind, ProblemList};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_package, invalid_input, Planner};
use crate::model::{source_path, DeclId, Program};
use crate::plan::{EditPlan, PlannedChange, TreeEdit, VisibilityPolicy};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenamePackage {
    pub from: String,
    pub to: String,
    /// Rename subpackages too (the folder variant).
    #[serde(default)]
    pub recursive: bool,
    /// Rewrite mentions of the package in documentation comments.
    #[serde(default = "default_true")]
    pub update_docs: bool,
}

impl RenamePackage {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        RenamePackage {
            from: from.into(),
            to: to.into(),
            recursive: false,
            update_docs: true,
        }
    }

    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    /// The new name of `package`, if this rename covers it.
    fn renamed(&self, package: &str) -> Option<String> {
        if package == self.from {
            return Some(self.to.clone());
        }
        if !self.recursive {
            return None;
        }
        package
            .strip_prefix(self.from.as_str())
            .filter(|rest| rest.starts_with('.'))
            .map(|rest| format!("{}{rest}", self.to))
    }

    fn affected(&self, program: &Program) -> Vec<String> {
        program
            .packages()
            .into_iter()
            .filter(|p| self.renamed(p).is_some())
            .collect()
    }

    /// Rewrite qualified mentions of renamed packages in `doc`.
    fn rewrite_doc(&self, doc: &str, program: &Program, pattern: &Regex) -> String {
        let packages = program.packages();
        pattern
            .replace_all(doc, |caps: &Captures<'_>| {
                let next = caps.name("next").map_or("", |m| m.as_str());
                let whole = format!("{}{next}", self.from);
                // A mention of an untouched subpackage stays as written.
                if !next.is_empty() && packages.contains(&whole) && self.renamed(&whole).is_none() {
                    return caps[0].to_string();
                }
                format!("{}{}{next}", &caps["pre"], self.to)
            })
            .into_owned()
    }
}

impl Planner for RenamePackage {
    fn label(&self) -> String {
        format!("Rename package {} to {}", self.from, self.to)
    }

    fn pre_check(&self, program: &Program, _config: &EngineConfig) -> ProblemList {
        let mut problems = ProblemList::new();
        check_package(&self.to, &mut problems);
        if self.from == self.to {
            problems.push(invalid_input(format!("`{}` is already named `{}`", self.from, self.to)));
        }
        if self.recursive && self.to.starts_with(&format!("{}.", self.from)) {
            problems.push(invalid_input(format!(
                "cannot move `{}` into its own subpackage `{}`",
                self.from, self.to
            )));
        }
        if self.affected(program).is_empty() {
            problems.push(
                Problem::fatal(
                    ProblemKind::UnresolvableSymbol,
                    format!("package not found: {}", self.from),
                )
                .for_symbol(self.from.clone()),
            );
        }
        problems
    }

    fn prepare(&self, program: &Program, _config: &EngineConfig, problems: &mut ProblemList) -> EditPlan {
        let mut plan = EditPlan::new(program, self.label());
        let affected: BTreeSet<String> = self.affected(program).into_iter().collect();
        let mut moved: Vec<DeclId> = Vec::new();

        for unit in program.files() {
            if !affected.contains(&unit.package) {
                continue;
            }
            let Some(package) = self.renamed(&unit.package) else {
                continue;
            };
            for ty in &unit.types {
                let name = program.name_of(*ty);
                let clash = program
                    .type_by_qualified_name(&format!("{package}.{name}"))
                    .filter(|other| !affected.contains(program.package_of(*other)));
                if let Some(other) = clash {
                    problems.push(
                        Problem::fatal(
                            ProblemKind::NameClash,
                            format!("type `{package}.{name}` already exists"),
                        )
                        .for_symbol(program.qualified_name(other)),
                    );
                }
            }
            let stem = unit.file_name().strip_suffix(".java").unwrap_or(unit.file_name());
            let path = source_path(unit, &package, stem);
            debug!(from = %unit.path, to = %path, "moving package file");
            plan.push(
                unit.id,
                TreeEdit::SetPackage {
                    file: unit.id,
                    package,
                },
            );
            plan.push(unit.id, TreeEdit::MoveFile { file: unit.id, path });
            moved.extend(unit.types.iter().copied());
        }

        if self.update_docs {
            let pattern = format!(
                r"(?P<pre>^|[^\w.]){}(?P<next>\.[\p{{L}}_$][\p{{L}}\p{{N}}_$]*)?\b",
                regex::escape(&self.from)
            );
            match Regex::new(&pattern) {
                Ok(pattern) => {
                    for decl in program.decls() {
                        let Some(doc) = &decl.doc else {
                            continue;
                        };
                        let rewritten = self.rewrite_doc(doc, program, &pattern);
                        if &rewritten != doc {
                            plan.edit_decl(
                                program,
                                decl.id,
                                TreeEdit::SetDoc {
                                    decl: decl.id,
                                    doc: Some(rewritten),
                                },
                            );
                        }
                    }
                }
                Err(err) => problems.push(invalid_input(err.to_string())),
            }
        }

        plan.change(PlannedChange::RelocateTypes {
            types: moved,
            policy: VisibilityPolicy::AsIs,
        });
        plan
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;
    use crate::ops::test_support::run_clean;
    use crate::ops::Refactoring;

    /// `a.t.X` used from `a.Main`, plus the subpackage `a.t.sub`.
    fn layout() -> Program {
        let mut b = ProgramBuilder::new();
        let file = b.file("src/a/t/X.java", "a.t");
        let x = b.class(file, "X");
        b.doc(x, "Entry point of a.t; see a.t.sub.Y for helpers.");
        let sub_file = b.file("src/a/t/sub/Y.java", "a.t.sub");
        b.class(sub_file, "Y");
        let main_file = b.file("src/a/Main.java", "a");
        let main = b.class(main_file, "Main");
        b.import(main_file, "a.t.X");
        b.field(main, "x", "X");
        b.finish()
    }

    #[test]
    fn files_move_and_imports_follow() {
        let program = layout();
        let op = Refactoring::RenamePackage(RenamePackage::new("a.t", "a.u"));
        let (_, texts) = run_clean(&program, op);
        let x = &texts["src/a/u/X.java"];
        assert!(x.starts_with("package a.u;"), "{x}");
        assert!(texts["src/a/Main.java"].contains("import a.u.X;"));
        assert!(texts.contains_key("src/a/t/sub/Y.java"));
    }

    #[test]
    fn docs_keep_untouched_subpackages() {
        let program = layout();
        let op = Refactoring::RenamePackage(RenamePackage::new("a.t", "a.u"));
        let (_, texts) = run_clean(&program, op);
        let x = &texts["src/a/u/X.java"];
        assert!(x.contains("Entry point of a.u; see a.t.sub.Y for helpers."), "{x}");
    }

    #[test]
    fn recursive_rename_moves_subpackages() {
        let program = layout();
        let op = Refactoring::RenamePackage(RenamePackage::new("a.t", "b").recursive());
        let (_, texts) = run_clean(&program, op);
        assert!(texts["src/b/sub/Y.java"].starts_with("package b.sub;"));
        assert!(texts["src/b/X.java"].contains("see b.sub.Y"));
    }

    #[test]
    fn case_only_rename_changes_paths() {
        let program = layout();
        let op = Refactoring::RenamePackage(RenamePackage::new("a.t", "a.T"));
        let (prepared, _) = run_clean(&program, op);
        let output = prepared.output.unwrap();
        let change = output.changes.iter().find(|c| c.path == "src/a/T/X.java").unwrap();
        assert_eq!(change.old_path.as_deref(), Some("src/a/t/X.java"));
    }

    #[test]
    fn existing_type_in_target_is_a_clash() {
        let mut b = ProgramBuilder::from_program(layout());
        let file = b.file("src/a/u/X.java", "a.u");
        b.class(file, "X");
        let program = b.finish();
        let op = Refactoring::RenamePackage(RenamePackage::new("a.t", "a.u"));
        let prepared = op.prepare(&program, &EngineConfig::default()).unwrap();
        assert!(prepared.problems.kinds().contains(&ProblemKind::NameClash));
    }

    #[test]
    fn unknown_package_fails_pre_check() {
        let program = layout();
        let op = Refactoring::RenamePackage(RenamePackage::new("z", "y"));
        assert!(op.pre_check(&program, &EngineConfig::default()).has_fatal());
    }
}
