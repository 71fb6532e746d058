// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Refactoring operations.
//!
//! Every operation is a request type implementing [`Planner`]; the
//! [`Refactoring`] enum tags them for dispatch and for JSON requests. The
//! pipeline is the same for all of them:
//!
//! 1. `pre_check`: resolve symbols and validate input. Any problem is fatal.
//! 2. `prepare`: the planner builds an [`EditPlan`] and may report its own
//!    problems; the plan is applied to a working copy and the conflict rules
//!    run over the before and after programs.

pub mod change_parameters;
pub mod extract_interface;
pub mod extract_superclass;
pub mod inline_factory;
pub mod introduce_parameter;
pub mod invert_boolean;
pub mod move_element;
pub mod pull_up;
pub mod push_down;
pub mod rename;
pub mod rename_package;
pub mod replace_constructor;
pub mod safe_delete;

use std::collections::{BTreeSet, HashMap};

use recast_core::config::EngineConfig;
use recast_core::problem::{Problem, ProblemKind, ProblemList};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span};

use crate::apply::{apply_plan, ApplyOutput};
use crate::ast::{Expr, ExprKind, IdSource, NodeId, TypeParam, TypeRef};
use crate::conflict::ConflictDetector;
use crate::error::ApplyError;
use crate::frontend::SymbolRef;
use crate::model::{DeclId, DeclKind, Program, Visibility};
use crate::plan::{EditPlan, MemberGroup, MemberInfo, VisibilityPolicy};
use crate::validation::{validate_identifier, validate_package_name};

pub use change_parameters::{ChangeParameters, ParameterSpec};
pub use extract_interface::ExtractInterface;
pub use extract_superclass::ExtractSuperclass;
pub use inline_factory::InlineFactory;
pub use introduce_parameter::IntroduceParameter;
pub use invert_boolean::InvertBoolean;
pub use move_element::{MoveElement, MoveTarget};
pub use pull_up::PullUp;
pub use push_down::PushDown;
pub use rename::Rename;
pub use rename_package::RenamePackage;
pub use replace_constructor::{ConstructorReplacement, ReplaceConstructor};
pub use safe_delete::SafeDelete;

// ============================================================================
// Requests
// ============================================================================

/// A member selected for a transformation, as supplied by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSpec {
    pub symbol: SymbolRef,
    #[serde(default)]
    pub make_abstract: bool,
    #[serde(default)]
    pub visibility: VisibilityPolicy,
    #[serde(default)]
    pub group: MemberGroup,
}

impl MemberSpec {
    pub fn new(symbol: SymbolRef) -> Self {
        MemberSpec {
            symbol,
            make_abstract: false,
            visibility: VisibilityPolicy::default(),
            group: MemberGroup::Member,
        }
    }

    pub fn abstract_(mut self) -> Self {
        self.make_abstract = true;
        self
    }

    pub fn implements(mut self) -> Self {
        self.group = MemberGroup::Implements;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Refactoring {
    ExtractInterface(ExtractInterface),
    ExtractSuperclass(ExtractSuperclass),
    PushDown(PushDown),
    PullUp(PullUp),
    Move(MoveElement),
    IntroduceParameter(IntroduceParameter),
    ChangeParameters(ChangeParameters),
    InvertBoolean(InvertBoolean),
    ReplaceConstructor(ReplaceConstructor),
    InlineFactory(InlineFactory),
    SafeDelete(SafeDelete),
    RenamePackage(RenamePackage),
    Rename(Rename),
}

/// One refactoring kind's planning logic.
pub trait Planner {
    /// Short human-readable description used for undo history and logs.
    fn label(&self) -> String;

    /// Resolve and validate the request. Every reported problem is fatal.
    fn pre_check(&self, program: &Program, config: &EngineConfig) -> ProblemList;

    /// Build the edit plan. Called only after a clean pre-check.
    fn prepare(
        &self,
        program: &Program,
        config: &EngineConfig,
        problems: &mut ProblemList,
    ) -> EditPlan;
}

/// Outcome of the prepare phase.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub plan: EditPlan,
    /// The applied plan; `None` when the planner reported a fatal problem.
    pub output: Option<ApplyOutput>,
    pub problems: ProblemList,
}

impl Refactoring {
    fn planner(&self) -> &dyn Planner {
        match self {
            Refactoring::ExtractInterface(op) => op,
            Refactoring::ExtractSuperclass(op) => op,
            Refactoring::PushDown(op) => op,
            Refactoring::PullUp(op) => op,
            Refactoring::Move(op) => op,
            Refactoring::IntroduceParameter(op) => op,
            Refactoring::ChangeParameters(op) => op,
            Refactoring::InvertBoolean(op) => op,
            Refactoring::ReplaceConstructor(op) => op,
            Refactoring::InlineFactory(op) => op,
            Refactoring::SafeDelete(op) => op,
            Refactoring::RenamePackage(op) => op,
            Refactoring::Rename(op) => op,
        }
    }

    pub fn label(&self) -> String {
        self.planner().label()
    }

    pub fn pre_check(&self, program: &Program, config: &EngineConfig) -> ProblemList {
        let span = info_span!("pre_check", operation = %self.label());
        let _guard = span.enter();
        let problems = self.planner().pre_check(program, config);
        debug!(problems = problems.len(), "pre-check finished");
        problems
    }

    /// Plan, apply to a working copy, and run the conflict rules.
    pub fn prepare(&self, program: &Program, config: &EngineConfig) -> Result<Prepared, ApplyError> {
        let span = info_span!("prepare", operation = %self.label());
        let _guard = span.enter();
        let mut problems = ProblemList::new();
        let plan = self.planner().prepare(program, config, &mut problems);
        debug!(
            edits = plan.edit_count(),
            new_decls = plan.new_decls.len(),
            new_files = plan.new_files.len(),
            "plan built"
        );
        if problems.has_fatal() {
            return Ok(Prepared {
                plan,
                output: None,
                problems,
            });
        }
        let output = apply_plan(program, &plan, config)?;
        problems.extend(ConflictDetector::default().check(program, &output.program, &plan));
        Ok(Prepared {
            plan,
            output: Some(output),
            problems,
        })
    }
}

// ============================================================================
// Shared Checks
// ============================================================================

pub(crate) fn invalid_input(message: impl Into<String>) -> Problem {
    Problem::fatal(ProblemKind::InvalidInput, message)
}

/// Resolve a symbol, reporting a fatal problem when it does not bind.
pub(crate) fn resolve(program: &Program, symbol: &SymbolRef, problems: &mut ProblemList) -> Option<DeclId> {
    match symbol.resolve(program) {
        Ok(decl) => Some(decl),
        Err(err) => {
            problems.push(
                Problem::fatal(ProblemKind::UnresolvableSymbol, err.to_string())
                    .for_symbol(symbol.qualified_name.clone()),
            );
            None
        }
    }
}

/// Resolve a symbol that must be one of `kinds`.
pub(crate) fn resolve_kind(
    program: &Program,
    symbol: &SymbolRef,
    kinds: &[DeclKind],
    problems: &mut ProblemList,
) -> Option<DeclId> {
    let decl = resolve(program, symbol, problems)?;
    let kind = program.kind_of(decl)?;
    if kinds.contains(&kind) {
        return Some(decl);
    }
    let expected: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
    problems.push(
        invalid_input(format!(
            "`{}` is a {kind}, expected {}",
            symbol.qualified_name,
            expected.join(" or ")
        ))
        .for_symbol(symbol.qualified_name.clone()),
    );
    None
}

pub(crate) fn resolve_type(program: &Program, symbol: &SymbolRef, problems: &mut ProblemList) -> Option<DeclId> {
    resolve_kind(program, symbol, &[DeclKind::Class, DeclKind::Interface], problems)
}

pub(crate) fn check_identifier(name: &str, problems: &mut ProblemList) {
    if let Err(err) = validate_identifier(name) {
        problems.push(invalid_input(err.to_string()));
    }
}

pub(crate) fn check_package(name: &str, problems: &mut ProblemList) {
    if let Err(err) = validate_package_name(name) {
        problems.push(invalid_input(err.to_string()));
    }
}

/// Resolve member specs that must belong to `owner`.
pub(crate) fn resolve_members(
    program: &Program,
    owner: DeclId,
    specs: &[MemberSpec],
    problems: &mut ProblemList,
) -> Vec<MemberInfo> {
    let mut infos = Vec::new();
    for spec in specs {
        let Some(decl) = resolve(program, &spec.symbol, problems) else {
            continue;
        };
        let info = MemberInfo {
            member: decl,
            make_abstract: spec.make_abstract,
            visibility: spec.visibility,
            group: spec.group,
        };
        match spec.group {
            MemberGroup::Implements => {
                let implemented = program
                    .decl(owner)
                    .is_some_and(|o| o.implements.iter().any(|t| t.decl == Some(decl)));
                if !implemented {
                    problems.push(invalid_input(format!(
                        "`{}` does not implement `{}`",
                        program.name_of(owner),
                        spec.symbol.qualified_name
                    )));
                    continue;
                }
            }
            MemberGroup::Member => {
                let kind = program.kind_of(decl);
                let is_member = program.decl(decl).and_then(|d| d.parent) == Some(owner);
                if !is_member || !matches!(kind, Some(DeclKind::Method | DeclKind::Field)) {
                    problems.push(
                        invalid_input(format!(
                            "`{}` is not a method or field of `{}`",
                            spec.symbol.qualified_name,
                            program.name_of(owner)
                        ))
                        .for_symbol(spec.symbol.qualified_name.clone()),
                    );
                    continue;
                }
                if spec.make_abstract && kind != Some(DeclKind::Method) {
                    problems.push(invalid_input(format!(
                        "only methods can be made abstract, `{}` is a field",
                        spec.symbol.qualified_name
                    )));
                    continue;
                }
            }
        }
        infos.push(info);
    }
    infos
}

// ============================================================================
// Shared Planning Helpers
// ============================================================================

/// A type reference to `decl`, with the type's own parameters as arguments.
pub(crate) fn self_type(ids: &mut impl IdSource, program: &Program, decl: DeclId) -> TypeRef {
    let name = program.name_of(decl).to_string();
    let params: Vec<String> = program
        .decl(decl)
        .map(|d| d.type_params.iter().map(|p| p.name.clone()).collect())
        .unwrap_or_default();
    let args = params.into_iter().map(|p| TypeRef::named(ids, p)).collect();
    TypeRef::to_decl(ids, name, decl).with_args(args)
}

/// Report a fatal clash when `package.name` already names a type.
pub(crate) fn type_exists(program: &Program, package: &str, name: &str, problems: &mut ProblemList) -> bool {
    let qualified = if package.is_empty() {
        name.to_string()
    } else {
        format!("{package}.{name}")
    };
    if program.type_by_qualified_name(&qualified).is_none() {
        return false;
    }
    problems.push(
        Problem::fatal(ProblemKind::NameClash, format!("type `{qualified}` already exists"))
            .for_symbol(qualified),
    );
    true
}

/// Type parameters of `owner` mentioned by the headers of `decls` (and
/// their parameters) or by `extra`.
pub(crate) fn used_type_params(
    program: &Program,
    owner: DeclId,
    decls: &[DeclId],
    extra: &[&TypeRef],
) -> Vec<TypeParam> {
    let mut names = BTreeSet::new();
    let mut note = |ty: &TypeRef| {
        ty.for_each(&mut |t| {
            names.insert(t.name.clone());
        })
    };
    for decl in decls {
        let Some(d) = program.decl(*decl) else {
            continue;
        };
        d.header_types().into_iter().for_each(&mut note);
        for param in &d.params {
            if let Some(p) = program.decl(*param) {
                p.header_types().into_iter().for_each(&mut note);
            }
        }
    }
    for ty in extra {
        note(*ty);
    }
    program
        .decl(owner)
        .map(|d| {
            d.type_params
                .iter()
                .filter(|tp| names.contains(&tp.name))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// Lowest visibility that lets every user in `users` reach a member
/// declared in `owner`.
pub(crate) fn required_visibility(
    program: &Program,
    owner: DeclId,
    users: impl IntoIterator<Item = DeclId>,
) -> Visibility {
    users
        .into_iter()
        .map(|user| {
            [
                Visibility::Private,
                Visibility::Package,
                Visibility::Protected,
            ]
            .into_iter()
            .find(|v| program.is_accessible_from(owner, *v, user))
            .unwrap_or(Visibility::Public)
        })
        .max()
        .unwrap_or(Visibility::Private)
}

/// Apply a visibility policy to a declaration that needs at least
/// `required` to stay reachable.
pub(crate) fn apply_policy(
    plan: &mut EditPlan,
    program: &Program,
    decl: DeclId,
    policy: VisibilityPolicy,
    required: Visibility,
) {
    match policy {
        VisibilityPolicy::Escalate => plan.escalate(program, decl, required),
        VisibilityPolicy::Public => plan.escalate(program, decl, Visibility::Public),
        VisibilityPolicy::AsIs => {}
    }
}

/// Replace declaration bindings inside an expression tree in place.
pub(crate) fn rebind(expr: &mut Expr, map: &HashMap<DeclId, DeclId>) {
    expr.walk_mut(&mut |e| rebind_node(e, map));
}

/// Rebind every expression in a planned declaration's body and initializer.
pub(crate) fn rebind_new_decl(plan: &mut EditPlan, decl: DeclId, map: &HashMap<DeclId, DeclId>) {
    let Some(d) = plan.new_decl_mut(decl) else {
        return;
    };
    if let Some(init) = &mut d.init {
        rebind(init, map);
    }
    if let Some(body) = &mut d.body {
        body.walk_exprs_mut(&mut |e| rebind_node(e, map));
    }
}

/// Rebind the reference at `node` to `to`, keeping the node's id and its
/// children. With `drop_super`, a `super.` qualifier is removed.
pub(crate) fn rebind_site(
    plan: &mut EditPlan,
    program: &Program,
    node: NodeId,
    to: DeclId,
    drop_super: bool,
) {
    let Some((_, expr)) = program.find_expr(node) else {
        return;
    };
    let mut expr = expr.clone();
    let map = HashMap::from([(expr.referenced_decl().unwrap_or(to), to)]);
    rebind_node(&mut expr, &map);
    if drop_super {
        let unqualified = match &mut expr.kind {
            ExprKind::Call { target, .. } => {
                if target.as_deref().is_some_and(|t| matches!(t.kind, ExprKind::Super)) {
                    *target = None;
                }
                None
            }
            ExprKind::FieldAccess { target, name, decl } if matches!(target.kind, ExprKind::Super) => {
                Some(ExprKind::Name {
                    name: name.clone(),
                    decl: *decl,
                })
            }
            _ => None,
        };
        if let Some(kind) = unqualified {
            expr.kind = kind;
        }
    }
    plan.replace_expr(program, node, expr);
}

/// The assignment inside `owner` whose target is the node `target`.
pub(crate) fn assignment_to(program: &Program, owner: DeclId, target: NodeId) -> Option<&Expr> {
    let decl = program.decl(owner)?;
    let mut found = None;
    let mut visit = |e: &Expr| {
        if let ExprKind::Assign { target: t, .. } = &e.kind {
            if t.id == target {
                found = Some(e.id);
            }
        }
    };
    if let Some(init) = &decl.init {
        init.walk(&mut visit);
    }
    if let Some(body) = &decl.body {
        body.walk_exprs(&mut visit);
    }
    found.and_then(|id| program.find_expr(id)).map(|(_, e)| e)
}

fn rebind_node(e: &mut Expr, map: &HashMap<DeclId, DeclId>) {
    let binding = match &mut e.kind {
        ExprKind::Name { decl, .. } | ExprKind::FieldAccess { decl, .. } => decl,
        ExprKind::Call { method, .. } => method,
        ExprKind::New { ctor, .. } => ctor,
        _ => return,
    };
    if let Some(to) = binding.and_then(|d| map.get(&d).copied()) {
        *binding = Some(to);
    }
}

/// Copy `expr` with fresh ids, substituting parameter references with
/// copies of the supplied arguments and routing implicit instance access
/// through `receiver`.
pub(crate) struct Instantiate<'a> {
    pub program: &'a Program,
    pub args: &'a HashMap<DeclId, Expr>,
    pub receiver: Option<&'a Expr>,
}

impl Instantiate<'_> {
    fn is_instance_member(&self, decl: DeclId) -> bool {
        self.program.decl(decl).is_some_and(|d| {
            matches!(d.kind, DeclKind::Field | DeclKind::Method) && !d.is_static()
        })
    }

    pub fn expr(&self, plan: &mut EditPlan, expr: &Expr) -> Expr {
        let mut copy = plan.copy_expr(expr);
        self.substitute(plan, &mut copy);
        copy
    }

    fn substitute(&self, plan: &mut EditPlan, expr: &mut Expr) {
        if let ExprKind::Name {
            decl: Some(d),
            name,
        } = &expr.kind
        {
            let (decl, name) = (*d, name.clone());
            if let Some(arg) = self.args.get(&decl) {
                *expr = plan.copy_expr(arg);
            } else if let Some(receiver) = self.receiver.filter(|_| self.is_instance_member(decl)) {
                let target = plan.copy_expr(receiver);
                *expr = Expr::field(plan, target, name, Some(decl));
            }
            return;
        }
        if matches!(expr.kind, ExprKind::This) {
            if let Some(receiver) = self.receiver {
                *expr = plan.copy_expr(receiver);
            }
            return;
        }
        let implicit_instance_call = matches!(
            &expr.kind,
            ExprKind::Call { target: None, method: Some(m), .. } if self.is_instance_member(*m)
        );
        if let (true, Some(receiver)) = (implicit_instance_call, self.receiver) {
            let copied = plan.copy_expr(receiver);
            if let ExprKind::Call { target, .. } = &mut expr.kind {
                *target = Some(Box::new(copied));
            }
        }
        for child in expr.children_mut() {
            self.substitute(plan, child);
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use recast_core::config::EngineConfig;

    use super::*;
    use crate::printer::render_file;

    /// Run pre-check and prepare, asserting both are clean, and return the
    /// rendered text of every changed file keyed by path.
    pub fn run_clean(program: &Program, op: Refactoring) -> (Prepared, HashMap<String, String>) {
        let config = EngineConfig::default();
        let pre = op.pre_check(program, &config);
        assert!(pre.is_empty(), "pre-check problems: {pre:?}");
        let prepared = op.prepare(program, &config).unwrap();
        assert!(!prepared.problems.has_fatal(), "problems: {:?}", prepared.problems);
        let output = prepared.output.as_ref().unwrap();
        let texts = output
            .program
            .files()
            .into_iter()
            .filter_map(|f| render_file(&output.program, f.id).map(|r| (f.path.clone(), r.text)))
            .collect();
        (prepared, texts)
    }

    pub fn sym(program: &Program, decl: DeclId) -> SymbolRef {
        SymbolRef::of(program, decl).unwrap()
    }
}
