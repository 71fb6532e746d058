// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Rename a type, method, field, parameter or local variable.
//!
//! Methods are renamed together with their whole override family. Renaming
//! a constructor renames its type. A top-level type whose file is named
//! after it has its file renamed too.

use recast_core::config::EngineConfig;
use recast_core::problem::ProblemList;
use serde::{Deserialize, Serialize};

use super::{check_identifier, invalid_input, resolve, Planner};
use crate::frontend::SymbolRef;
use crate::model::{DeclId, DeclKind, Program};
use crate::plan::{EditPlan, PlannedChange, TreeEdit};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rename {
    pub symbol: SymbolRef,
    pub new_name: String,
}

impl Rename {
    fn target(program: &Program, decl: DeclId) -> DeclId {
        match program.decl(decl) {
            Some(d) if d.kind == DeclKind::Constructor => d.parent.unwrap_or(decl),
            _ => decl,
        }
    }
}

impl Planner for Rename {
    fn label(&self) -> String {
        format!("Rename {} to {}", self.symbol.qualified_name, self.new_name)
    }

    fn pre_check(&self, program: &Program, _config: &EngineConfig) -> ProblemList {
        let mut problems = ProblemList::new();
        check_identifier(&self.new_name, &mut problems);
        if let Some(decl) = resolve(program, &self.symbol, &mut problems) {
            if program.name_of(Self::target(program, decl)) == self.new_name {
                problems.push(invalid_input(format!(
                    "`{}` is already named `{}`",
                    self.symbol.qualified_name, self.new_name
                )));
            }
        }
        problems
    }

    fn prepare(&self, program: &Program, _config: &EngineConfig, problems: &mut ProblemList) -> EditPlan {
        let mut plan = EditPlan::new(program, self.label());
        let Some(decl) = resolve(program, &self.symbol, problems) else {
            return plan;
        };
        let decl = Self::target(program, decl);
        let targets = if program.kind_of(decl) == Some(DeclKind::Method) {
            program.override_family(decl)
        } else {
            vec![decl]
        };

        for target in targets {
            plan.edit_decl(
                program,
                target,
                TreeEdit::Rename {
                    decl: target,
                    name: self.new_name.clone(),
                },
            );
            plan.change(PlannedChange::Place { decl: target });
        }

        let file = program
            .decl(decl)
            .filter(|d| d.is_type() && d.parent.is_none())
            .and_then(|d| program.file(d.file));
        if let Some(unit) = file {
            let old_name = format!("{}.java", program.name_of(decl));
            if unit.file_name() == old_name {
                let folder = unit.folder();
                let path = if folder.is_empty() {
                    format!("{}.java", self.new_name)
                } else {
                    format!("{folder}/{}.java", self.new_name)
                };
                plan.push(unit.id, TreeEdit::MoveFile { file: unit.id, path });
            }
        }
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
    use crate::ops::test_support::{run_clean, sym};
    use crate::ops::Refactoring;
    use recast_core::problem::ProblemKind;

    #[test]
    fn renames_override_family_and_call_sites() {
        let mut b = ProgramBuilder::new();
        let file = b.file("p/Shapes.java", "p");
        let shape = b.class(file, "Shape");
        let area = b.method(shape, "area", Some("int"));
        let zero = b.int(0);
        let ret = b.ret(Some(zero));
        b.set_body(area, vec![ret]);
        let square = b.class(file, "Square");
        b.extends(square, shape);
        let square_area = b.method(square, "area", Some("int"));
        b.modify(square_area, |m| m.is_override = true);
        let one = b.int(1);
        let ret = b.ret(Some(one));
        b.set_body(square_area, vec![ret]);
        let user = b.method(square, "twice", Some("int"));
        let call = b.call(None, area, vec![]);
        let ret = b.ret(Some(call));
        b.set_body(user, vec![ret]);
        let program = b.finish();

        let op = Refactoring::Rename(Rename {
            symbol: sym(&program, area),
            new_name: "surface".into(),
        });
        let (_, texts) = run_clean(&program, op);
        let text = &texts["p/Shapes.java"];
        assert!(!text.contains("area"), "{text}");
        assert_eq!(text.matches("int surface()").count(), 2);
        assert!(text.contains("return surface();"));
    }

    #[test]
    fn renaming_a_type_renames_its_file() {
        let mut b = ProgramBuilder::new();
        let file = b.file("src/p/Old.java", "p");
        let old = b.class(file, "Old");
        let program = b.finish();

        let op = Refactoring::Rename(Rename {
            symbol: sym(&program, old),
            new_name: "Fresh".into(),
        });
        let (prepared, _) = run_clean(&program, op);
        let output = prepared.output.unwrap();
        assert_eq!(output.changes.len(), 1);
        assert_eq!(output.changes[0].path, "src/p/Fresh.java");
        assert_eq!(output.changes[0].old_path.as_deref(), Some("src/p/Old.java"));
    }

    #[test]
    fn sibling_clash_is_fatal() {
        let mut b = ProgramBuilder::new();
        let file = b.file("A.java", "");
        let a = b.class(file, "A");
        let x = b.field(a, "x", "int");
        b.field(a, "y", "int");
        let program = b.finish();

        let op = Refactoring::Rename(Rename {
            symbol: sym(&program, x),
            new_name: "y".into(),
        });
        let config = EngineConfig::default();
        assert!(op.pre_check(&program, &config).is_empty());
        let prepared = op.prepare(&program, &config).unwrap();
        assert!(prepared.problems.kinds().contains(&ProblemKind::NameClash));
    }

    #[test]
    fn invalid_name_fails_pre_check() {
        let mut b = ProgramBuilder::new();
        let file = b.file("A.java", "");
        let a = b.class(file, "A");
        let program = b.finish();
        let op = Refactoring::Rename(Rename {
            symbol: sym(&program, a),
            new_name: "class".into(),
        });
        let problems = op.pre_check(&program, &EngineConfig::default());
        assert!(problems.has_fatal());
    }
}
