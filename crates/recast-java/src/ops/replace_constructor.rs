// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Replace a constructor with a static factory method or a builder class.
//!
//! Every `new T(..)` that resolves to the constructor is rewritten to the new
//! protocol. Explicit type arguments at a site carry over to the factory
//! call or the builder instantiation.

use recast_core::config::EngineConfig;
use recast_core::problem::{Problem, ProblemKind, ProblemList};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_identifier, invalid_input, resolve_kind, self_type, type_exists, Planner};
use crate::ast::{AssignOp, Block, Expr, ExprKind, IdSource, Stmt, TypeParam, TypeRef};
use crate::frontend::SymbolRef;
use crate::model::{
    source_path, CompilationUnit, DeclId, DeclKind, Declaration, Modifiers, Program, Visibility,
};
use crate::plan::{EditPlan, PlannedChange, TreeEdit};
use crate::visit::{references_to, RefSite};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstructorReplacement {
    #[default]
    Factory,
    Builder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaceConstructor {
    pub constructor: SymbolRef,
    #[serde(default)]
    pub mode: ConstructorReplacement,
    /// Factory method name, or builder class name. Defaults to `create`
    /// and `<Type>Builder`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Make the constructor private once the factory exists.
    #[serde(default)]
    pub make_private: bool,
}

fn capitalized(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn copy_type_params(plan: &mut EditPlan, params: &[TypeParam]) -> Vec<TypeParam> {
    params
        .iter()
        .map(|tp| TypeParam {
            name: tp.name.clone(),
            bounds: tp.bounds.iter().map(|b| plan.copy_type(b)).collect(),
        })
        .collect()
}

/// `name<P..>` for a declaration the plan is creating.
fn generic_ref(plan: &mut EditPlan, name: &str, decl: DeclId, params: &[TypeParam]) -> TypeRef {
    let args = params
        .iter()
        .map(|tp| TypeRef::named(plan, tp.name.clone()))
        .collect();
    TypeRef::to_decl(plan, name, decl).with_args(args)
}

impl ReplaceConstructor {
    fn creation_sites(program: &Program, ctor: DeclId) -> Vec<RefSite> {
        references_to(program, &[ctor])
            .into_iter()
            .filter(|s| {
                !s.in_import
                    && program
                        .find_expr(s.node)
                        .is_some_and(|(_, e)| matches!(e.kind, ExprKind::New { .. }))
            })
            .collect()
    }

    fn plan_factory(
        &self,
        plan: &mut EditPlan,
        program: &Program,
        ctor: &Declaration,
        owner: &Declaration,
        problems: &mut ProblemList,
    ) {
        let name = self.name.clone().unwrap_or_else(|| "create".to_string());
        let factory = plan.decl_id();
        let mut method = Declaration::new(factory, DeclKind::Method, &name, owner.file, Some(owner.id));
        method.modifiers = Modifiers {
            visibility: ctor.modifiers.visibility,
            is_static: true,
            ..Modifiers::default()
        };
        method.type_params = copy_type_params(plan, &owner.type_params);
        method.ty = Some(self_type(plan, program, owner.id));
        method.throws = ctor.throws.iter().map(|t| plan.copy_type(t)).collect();
        method.doc = ctor.doc.clone();

        let mut args = Vec::new();
        for param in &ctor.params {
            let Some(p) = program.decl(*param) else {
                continue;
            };
            let id = plan.decl_id();
            let mut copy = Declaration::new(id, DeclKind::Parameter, &p.name, owner.file, Some(factory));
            copy.ty = p.ty.as_ref().map(|t| plan.copy_type(t));
            copy.modifiers = p.modifiers.clone();
            plan.add_decl(copy);
            method.params.push(id);
            args.push(Expr::name(plan, p.name.clone(), Some(id)));
        }
        let created = self_type(plan, program, owner.id);
        let new = Expr::new_object(plan, created, Some(ctor.id), args);
        method.body = Some(Block::new(vec![Stmt::ret(plan, Some(new))]));
        plan.add_decl(method);

        let index = program
            .members(owner.id)
            .iter()
            .position(|m| *m == ctor.id)
            .map(|i| i + 1);
        plan.edit_decl(
            program,
            owner.id,
            TreeEdit::AddMember {
                owner: owner.id,
                member: factory,
                index,
            },
        );
        plan.change(PlannedChange::Place { decl: factory });

        let sites = Self::creation_sites(program, ctor.id);
        debug!(sites = sites.len(), factory = %name, "rewriting creation sites");
        for site in &sites {
            let Some((_, expr)) = program.find_expr(site.node) else {
                continue;
            };
            let ExprKind::New { ty, args, .. } = &expr.kind else {
                continue;
            };
            let raw = TypeRef::to_decl(plan, owner.name.clone(), owner.id);
            let target = Expr::type_name(plan, raw);
            let call = Expr {
                id: expr.id,
                kind: ExprKind::Call {
                    target: Some(Box::new(target)),
                    name: name.clone(),
                    method: Some(factory),
                    type_args: ty.args.clone(),
                    args: args.clone(),
                },
            };
            plan.replace_expr(program, site.node, call);
        }

        if self.make_private {
            // Subclass constructors chain to this one through `super(..)`.
            let chained = references_to(program, &[ctor.id])
                .into_iter()
                .filter(|s| !s.in_import && !sites.iter().any(|c| c.node == s.node))
                .filter_map(|s| s.owner)
                .find(|o| program.enclosing_type(*o) != Some(owner.id));
            if let Some(user) = chained {
                problems.push(
                    Problem::fatal(
                        ProblemKind::VisibilityViolation,
                        format!(
                            "`{}` chains to the constructor, which cannot become private",
                            program.display_name(user)
                        ),
                    )
                    .for_symbol(program.qualified_name(ctor.id)),
                );
                return;
            }
            let mut modifiers = ctor.modifiers.clone();
            modifiers.visibility = Visibility::Private;
            plan.set_modifiers(program, ctor.id, modifiers);
        }
    }

    fn plan_builder(
        &self,
        plan: &mut EditPlan,
        program: &Program,
        ctor: &Declaration,
        owner: &Declaration,
        problems: &mut ProblemList,
    ) {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| format!("{}Builder", owner.name));
        let package = program.package_of(owner.id).to_string();
        if type_exists(program, &package, &name, problems) {
            return;
        }
        let Some(unit) = program
            .top_level_type(owner.id)
            .and_then(|t| program.decl(t))
            .and_then(|t| program.file(t.file))
        else {
            return;
        };
        let file = plan.file_id();
        plan.add_file(CompilationUnit::new(
            file,
            source_path(unit, &package, &name),
            package,
        ));

        let builder = plan.decl_id();
        let mut class = Declaration::new(builder, DeclKind::Class, &name, file, None);
        class.modifiers = Modifiers::public();
        class.type_params = copy_type_params(plan, &owner.type_params);
        let type_params = class.type_params.clone();

        let mut setters = Vec::new();
        let mut fields = Vec::new();
        for param in &ctor.params {
            let Some(p) = program.decl(*param) else {
                continue;
            };
            let field = plan.decl_id();
            let mut f = Declaration::new(field, DeclKind::Field, &p.name, file, Some(builder));
            f.modifiers.visibility = Visibility::Private;
            f.ty = p.ty.as_ref().map(|t| plan.copy_type(t));
            plan.add_decl(f);
            class.members.push(field);
            fields.push((field, p.name.clone()));

            let setter = plan.decl_id();
            let value = plan.decl_id();
            let mut v = Declaration::new(value, DeclKind::Parameter, &p.name, file, Some(setter));
            v.ty = p.ty.as_ref().map(|t| plan.copy_type(t));
            plan.add_decl(v);
            let mut s = Declaration::new(
                setter,
                DeclKind::Method,
                format!("set{}", capitalized(&p.name)),
                file,
                Some(builder),
            );
            s.modifiers = Modifiers::public();
            s.ty = Some(generic_ref(plan, &name, builder, &type_params));
            s.params = vec![value];
            let this = Expr::this(plan);
            let lhs = Expr::field(plan, this, p.name.clone(), Some(field));
            let rhs = Expr::name(plan, p.name.clone(), Some(value));
            let assign = Expr::assign(plan, AssignOp::Assign, lhs, rhs);
            let this = Expr::this(plan);
            s.body = Some(Block::new(vec![Stmt::expr(plan, assign), Stmt::ret(plan, Some(this))]));
            plan.add_decl(s);
            setters.push((setter, format!("set{}", capitalized(&p.name))));
        }
        class.members.extend(setters.iter().map(|(s, _)| *s));

        let create = plan.decl_id();
        let create_name = format!("create{}", owner.name);
        let mut c = Declaration::new(create, DeclKind::Method, &create_name, file, Some(builder));
        c.modifiers = Modifiers::public();
        c.ty = Some(generic_ref(plan, &owner.name, owner.id, &type_params));
        let args = fields
            .iter()
            .map(|(field, name)| Expr::name(plan, name.clone(), Some(*field)))
            .collect();
        let created = generic_ref(plan, &owner.name, owner.id, &type_params);
        let new = Expr::new_object(plan, created, Some(ctor.id), args);
        c.body = Some(Block::new(vec![Stmt::ret(plan, Some(new))]));
        plan.add_decl(c);
        class.members.push(create);

        plan.add_decl(class);
        plan.push(file, TreeEdit::AddType { file, ty: builder });
        plan.change(PlannedChange::Place { decl: builder });

        for site in Self::creation_sites(program, ctor.id) {
            let Some((_, expr)) = program.find_expr(site.node) else {
                continue;
            };
            let ExprKind::New { ty, args, .. } = &expr.kind else {
                continue;
            };
            let builder_ty = TypeRef::to_decl(plan, name.clone(), builder).with_args(ty.args.clone());
            let mut chain = Expr::new_object(plan, builder_ty, None, Vec::new());
            for ((setter, setter_name), arg) in setters.iter().zip(args) {
                chain = Expr::call(plan, Some(chain), setter_name.clone(), Some(*setter), vec![arg.clone()]);
            }
            let finished = Expr::call(plan, Some(chain), create_name.clone(), Some(create), Vec::new());
            plan.replace_expr(
                program,
                site.node,
                Expr {
                    id: expr.id,
                    kind: finished.kind,
                },
            );
        }
    }
}

impl Planner for ReplaceConstructor {
    fn label(&self) -> String {
        let mode = match self.mode {
            ConstructorReplacement::Factory => "factory",
            ConstructorReplacement::Builder => "builder",
        };
        format!("Replace constructor {} with {mode}", self.constructor.qualified_name)
    }

    fn pre_check(&self, program: &Program, _config: &EngineConfig) -> ProblemList {
        let mut problems = ProblemList::new();
        if let Some(name) = &self.name {
            check_identifier(name, &mut problems);
        }
        let Some(ctor) = resolve_kind(program, &self.constructor, &[DeclKind::Constructor], &mut problems) else {
            return problems;
        };
        let Some(owner) = program.decl(ctor).and_then(|c| c.parent).and_then(|p| program.decl(p)) else {
            return problems;
        };
        if owner.is_abstract() {
            problems.push(invalid_input(format!("`{}` is abstract", owner.name)));
        }
        if self.mode == ConstructorReplacement::Builder {
            if program.decl(ctor).is_some_and(|c| c.visibility() == Visibility::Private) {
                problems.push(
                    Problem::fatal(
                        ProblemKind::VisibilityViolation,
                        format!(
                            "a builder cannot call private constructor `{}`",
                            program.display_name(ctor)
                        ),
                    )
                    .for_symbol(self.constructor.qualified_name.clone()),
                );
            }
            if self.make_private {
                problems.push(invalid_input("a builder needs the constructor to stay visible"));
            }
        }
        problems
    }

    fn prepare(&self, program: &Program, _config: &EngineConfig, problems: &mut ProblemList) -> EditPlan {
        let mut plan = EditPlan::new(program, self.label());
        let Some(ctor) = resolve_kind(program, &self.constructor, &[DeclKind::Constructor], problems) else {
            return plan;
        };
        let Some(ctor) = program.decl(ctor) else {
            return plan;
        };
        let Some(owner) = ctor.parent.and_then(|p| program.decl(p)) else {
            return plan;
        };
        match self.mode {
            ConstructorReplacement::Factory => self.plan_factory(&mut plan, program, ctor, owner, problems),
            ConstructorReplacement::Builder => self.plan_builder(&mut plan, program, ctor, owner, problems),
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
    use crate::ops::{InlineFactory, Refactoring};
    use crate::printer::render_file;

    struct Point {
        program: Program,
        point: DeclId,
        ctor: DeclId,
    }

    fn point() -> Point {
        let mut b = ProgramBuilder::new();
        let file = b.file("p/Point.java", "p");
        let point = b.class(file, "Point");
        let x = b.field(point, "x", "int");
        let ctor = b.constructor(point);
        let px = b.param(ctor, "x", "int");
        b.param(ctor, "y", "int");
        let this = b.this();
        let target = b.field_of(this, x);
        let value = b.name(px);
        let assign = b.assign(target, value);
        let stmt = b.expr_stmt(assign);
        b.set_body(ctor, vec![stmt]);

        let main_file = b.file("p/Main.java", "p");
        let main = b.class(main_file, "Main");
        let run = b.method(main, "run", Some("Point"));
        let one = b.int(1);
        let two = b.int(2);
        let new = b.new_object(point, Some(ctor), vec![one, two]);
        let ret = b.ret(Some(new));
        b.set_body(run, vec![ret]);
        Point {
            program: b.finish(),
            point,
            ctor,
        }
    }

    fn replace(program: &Program, ctor: DeclId, mode: ConstructorReplacement) -> ReplaceConstructor {
        ReplaceConstructor {
            constructor: sym(program, ctor),
            mode,
            name: None,
            make_private: false,
        }
    }

    mod factory_tests {
        use super::*;

        #[test]
        fn creation_sites_call_the_factory() {
            let p = point();
            let mut request = replace(&p.program, p.ctor, ConstructorReplacement::Factory);
            request.make_private = true;
            let (_, texts) = run_clean(&p.program, Refactoring::ReplaceConstructor(request));
            let point = &texts["p/Point.java"];
            assert!(point.contains("private Point(int x, int y) {"), "{point}");
            assert!(point.contains("public static Point create(int x, int y) {"));
            assert!(point.contains("return new Point(x, y);"));
            assert!(texts["p/Main.java"].contains("return Point.create(1, 2);"));
        }

        #[test]
        fn inlining_the_factory_restores_the_call_sites() {
            let mut b = ProgramBuilder::new();
            let file = b.file("p/Box.java", "p");
            let boxed = b.class(file, "Box");
            b.type_param(boxed, "T", &[]);
            let ctor = b.constructor(boxed);
            b.param(ctor, "value", "T");
            let main_file = b.file("p/Main.java", "p");
            let main = b.class(main_file, "Main");
            let run = b.method(main, "run", None);
            let string = b.ty("String");
            let ty = b.type_ref(boxed).with_args(vec![string]);
            let label = b.str("a");
            let new = b.new_of(ty, Some(ctor), vec![label]);
            let stmt = b.expr_stmt(new);
            b.set_body(run, vec![stmt]);
            let program = b.finish();
            let before = render_file(&program, main_file).unwrap().text;
            assert!(before.contains("new Box<String>(\"a\");"));

            let request = replace(&program, ctor, ConstructorReplacement::Factory);
            let (prepared, texts) = run_clean(&program, Refactoring::ReplaceConstructor(request));
            assert!(texts["p/Box.java"].contains("public static <T> Box<T> create(T value) {"));
            assert!(texts["p/Main.java"].contains("Box.<String>create(\"a\");"));

            let factored = prepared.output.unwrap().program;
            let factory = factored.find_by_qualified_name("p.Box.create", None).unwrap();
            let inline = Refactoring::InlineFactory(InlineFactory {
                factory: sym(&factored, factory),
                keep_factory: false,
            });
            let (_, texts) = run_clean(&factored, inline);
            assert_eq!(texts["p/Main.java"], before);
        }

        #[test]
        fn private_constructor_chained_from_subclass_stays() {
            let p = point();
            let mut b = ProgramBuilder::from_program(p.program);
            let file = b.file("p/Pixel.java", "p");
            let pixel = b.class(file, "Pixel");
            b.extends(pixel, p.point);
            let ctor = b.constructor(pixel);
            let zero = b.int(0);
            let one = b.int(1);
            let sup = b.super_();
            let chain = b.call(Some(sup), p.ctor, vec![zero, one]);
            let stmt = b.expr_stmt(chain);
            b.set_body(ctor, vec![stmt]);
            let program = b.finish();

            let mut request = replace(&program, p.ctor, ConstructorReplacement::Factory);
            request.make_private = true;
            let prepared = Refactoring::ReplaceConstructor(request)
                .prepare(&program, &EngineConfig::default())
                .unwrap();
            assert!(prepared.problems.kinds().contains(&ProblemKind::VisibilityViolation));
        }
    }

    mod builder_tests {
        use super::*;

        #[test]
        fn builder_class_replaces_construction() {
            let p = point();
            let request = replace(&p.program, p.ctor, ConstructorReplacement::Builder);
            let (_, texts) = run_clean(&p.program, Refactoring::ReplaceConstructor(request));
            let builder = &texts["p/PointBuilder.java"];
            assert!(builder.contains("public class PointBuilder {"), "{builder}");
            assert!(builder.contains("private int x;"));
            assert!(builder.contains("public PointBuilder setX(int x) {"));
            assert!(builder.contains("this.x = x;"));
            assert!(builder.contains("return this;"));
            assert!(builder.contains("public Point createPoint() {"));
            assert!(builder.contains("return new Point(x, y);"));
            assert!(texts["p/Main.java"]
                .contains("return new PointBuilder().setX(1).setY(2).createPoint();"));
        }

        #[test]
        fn private_constructor_is_fatal() {
            let p = point();
            let mut b = ProgramBuilder::from_program(p.program);
            b.modify(p.ctor, |m| m.visibility = Visibility::Private);
            let program = b.finish();
            let request = replace(&program, p.ctor, ConstructorReplacement::Builder);
            let problems = Refactoring::ReplaceConstructor(request).pre_check(&program, &EngineConfig::default());
            assert!(problems.kinds().contains(&ProblemKind::VisibilityViolation));
        }
    }
}
