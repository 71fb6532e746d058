// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Extract an interface from a type.
//!
//! The new interface gets a new file next to the source type (or in the
//! requested package). Selected methods contribute abstract signatures,
//! selected constants move. The source then implements the interface and
//! its retained implementations get `@Override`.

use recast_core::config::EngineConfig;
use recast_core::problem::ProblemList;
use serde::{Deserialize, Serialize};

use super::{
    check_identifier, check_package, resolve_members, resolve_type, type_exists,
    used_type_params, MemberSpec, Planner,
};
use crate::ast::{IdSource, TypeParam, TypeRef};
use crate::frontend::SymbolRef;
use crate::model::{
    source_path, CompilationUnit, DeclId, DeclKind, Declaration, Modifiers, Program, Visibility,
};
use crate::plan::{EditPlan, PlannedChange, TreeEdit, VisibilityPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractInterface {
    pub source: SymbolRef,
    pub name: String,
    pub members: Vec<MemberSpec>,
    /// Package of the new interface; the source's package when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}

impl ExtractInterface {
    fn package(&self, program: &Program, source: DeclId) -> String {
        self.package
            .clone()
            .unwrap_or_else(|| program.package_of(source).to_string())
    }
}

impl Planner for ExtractInterface {
    fn label(&self) -> String {
        format!("Extract interface {} from {}", self.name, self.source.qualified_name)
    }

    fn pre_check(&self, program: &Program, _config: &EngineConfig) -> ProblemList {
        let mut problems = ProblemList::new();
        check_identifier(&self.name, &mut problems);
        if let Some(package) = &self.package {
            check_package(package, &mut problems);
        }
        if let Some(source) = resolve_type(program, &self.source, &mut problems) {
            resolve_members(program, source, &self.members, &mut problems);
        }
        problems
    }

    fn prepare(&self, program: &Program, _config: &EngineConfig, problems: &mut ProblemList) -> EditPlan {
        let mut plan = EditPlan::new(program, self.label());
        let Some(source) = resolve_type(program, &self.source, problems) else {
            return plan;
        };
        let infos = resolve_members(program, source, &self.members, problems);
        plan.member_infos = infos.clone();
        let package = self.package(program, source);
        if type_exists(program, &package, &self.name, problems) {
            return plan;
        }
        let Some(unit) = program
            .top_level_type(source)
            .and_then(|t| program.decl(t))
            .and_then(|t| program.file(t.file))
        else {
            return plan;
        };

        let file = plan.file_id();
        let path = source_path(unit, &package, &self.name);
        plan.add_file(CompilationUnit::new(file, path, package));

        let selected: Vec<DeclId> = infos.iter().map(|i| i.member).collect();
        let iface_id = plan.decl_id();
        let mut iface = Declaration::new(iface_id, DeclKind::Interface, &self.name, file, None);
        iface.modifiers = Modifiers::public();
        let type_params = used_type_params(program, source, &selected, &[]);
        iface.type_params = type_params
            .iter()
            .map(|tp| TypeParam {
                name: tp.name.clone(),
                bounds: tp.bounds.iter().map(|b| plan.copy_type(b)).collect(),
            })
            .collect();
        plan.add_decl(iface);
        plan.push(file, TreeEdit::AddType { file, ty: iface_id });
        plan.change(PlannedChange::Place { decl: iface_id });

        for info in &infos {
            let member = info.member;
            plan.change(PlannedChange::ExtractToInterface { member });
            match program.kind_of(member) {
                Some(DeclKind::Method) => {
                    let copy = plan.copy_signature(program, member, iface_id, file);
                    if let Some(decl) = plan.new_decl_mut(copy) {
                        decl.modifiers = Modifiers {
                            is_abstract: true,
                            ..Modifiers::public()
                        };
                    }
                    plan.push(
                        file,
                        TreeEdit::AddMember {
                            owner: iface_id,
                            member: copy,
                            index: None,
                        },
                    );
                    if let Some(mut modifiers) = plan.planned_modifiers(program, member) {
                        modifiers.is_override = true;
                        modifiers.visibility = Visibility::Public;
                        plan.set_modifiers(program, member, modifiers);
                    }
                }
                Some(DeclKind::Field) => {
                    plan.edit_decl(program, member, TreeEdit::MoveMember { member, to: iface_id });
                    if let Some(mut modifiers) = plan.planned_modifiers(program, member) {
                        modifiers.visibility = Visibility::Public;
                        modifiers.is_static = true;
                        modifiers.is_final = true;
                        plan.set_modifiers(program, member, modifiers);
                    }
                    plan.change(PlannedChange::Relocate {
                        member,
                        from: source,
                        to: iface_id,
                        policy: VisibilityPolicy::Public,
                        receiver: None,
                    });
                }
                _ => {}
            }
        }

        let args = type_params
            .iter()
            .map(|tp| TypeRef::named(&mut plan, tp.name.clone()))
            .collect();
        let implemented = TypeRef::to_decl(&mut plan, self.name.clone(), iface_id).with_args(args);
        plan.edit_decl(
            program,
            source,
            TreeEdit::AddImplements {
                ty: source,
                iface: implemented,
            },
        );
        plan
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use recast_core::problem::ProblemKind;
    use crate::builder::ProgramBuilder;
    use crate::ops::test_support::{run_clean, sym};
    use crate::ops::Refactoring;

    fn circle() -> (Program, DeclId, DeclId, DeclId) {
        let mut b = ProgramBuilder::new();
        let file = b.file("src/p/Circle.java", "p");
        let circle = b.class(file, "Circle");
        let sides = b.field(circle, "SIDES", "int");
        b.modify(sides, |m| {
            m.visibility = Visibility::Public;
            m.is_static = true;
            m.is_final = true;
        });
        let zero = b.int(0);
        b.set_init(sides, zero);
        let area = b.method(circle, "area", Some("double"));
        b.modify(area, |m| m.visibility = Visibility::Public);
        b.doc(area, "Area in square units.");
        let r = b.param(area, "scale", "int");
        let read = b.name(r);
        let ret = b.ret(Some(read));
        b.set_body(area, vec![ret]);
        (b.finish(), circle, sides, area)
    }

    fn extract(program: &Program, source: DeclId, name: &str, members: &[DeclId]) -> Refactoring {
        Refactoring::ExtractInterface(ExtractInterface {
            source: sym(program, source),
            name: name.into(),
            members: members.iter().map(|m| MemberSpec::new(sym(program, *m))).collect(),
            package: None,
        })
    }

    #[test]
    fn creates_interface_with_signatures_and_constants() {
        let (program, circle, sides, area) = circle();
        let op = extract(&program, circle, "Shape", &[sides, area]);
        let (prepared, texts) = run_clean(&program, op);

        let shape = &texts["src/p/Shape.java"];
        assert!(shape.starts_with("package p;"));
        assert!(shape.contains("public interface Shape {"));
        assert!(shape.contains("    int SIDES = 0;"), "{shape}");
        assert!(shape.contains("     * Area in square units."));
        assert!(shape.contains("    double area(int scale);"));

        let source = &texts["src/p/Circle.java"];
        assert!(source.contains("public class Circle implements Shape {"));
        assert!(source.contains("@Override"));
        assert!(!source.contains("SIDES"));

        let output = prepared.output.unwrap();
        let created = output
            .changes
            .iter()
            .find(|c| c.path == "src/p/Shape.java")
            .unwrap();
        assert_eq!(created.kind, crate::apply::ChangeKind::Create);
    }

    #[test]
    fn generic_parameters_follow_the_signatures() {
        let mut b = ProgramBuilder::new();
        let file = b.file("p/Box.java", "p");
        let boxed = b.class(file, "Box");
        b.type_param(boxed, "T", &[]);
        let get = b.method(boxed, "get", Some("T"));
        let null = Expr::null(&mut b);
        let ret = b.ret(Some(null));
        b.set_body(get, vec![ret]);
        let program = b.finish();

        let (_, texts) = run_clean(&program, extract(&program, boxed, "Getter", &[get]));
        assert!(texts["p/Getter.java"].contains("public interface Getter<T> {"));
        assert!(texts["p/Box.java"].contains("public class Box<T> implements Getter<T> {"));
    }

    #[test]
    fn static_method_is_fatal() {
        let (program, circle, _, _) = circle();
        let mut b = ProgramBuilder::from_program(program);
        let util = b.method(circle, "unit", Some("int"));
        b.modify(util, |m| m.is_static = true);
        let program = b.finish();

        let op = extract(&program, circle, "Shape", &[util]);
        let prepared = op.prepare(&program, &EngineConfig::default()).unwrap();
        assert!(prepared
            .problems
            .kinds()
            .contains(&ProblemKind::OverrideIntegrityViolation));
    }

    #[test]
    fn existing_type_name_is_fatal() {
        let (program, circle, _, area) = circle();
        let op = extract(&program, circle, "Circle", &[area]);
        let prepared = op.prepare(&program, &EngineConfig::default()).unwrap();
        assert!(prepared.output.is_none());
        assert!(prepared.problems.kinds().contains(&ProblemKind::NameClash));
    }
}
