// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Conflict detection.
//!
//! Each [`ConflictRule`] inspects a plan together with the program before
//! and after the plan is applied, and reports [`Problem`]s. Rules are
//! independent; the detector merges their output into one [`ProblemList`],
//! which collapses repeated reports of the same site.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

use recast_core::config::CollectionSemantics;
use recast_core::patch::{FileId, Span};
use recast_core::problem::{Problem, ProblemKind, ProblemList};
use recast_core::text::byte_offset_to_position;
use recast_core::types::Location;
use tracing::debug;

use crate::ast::{ExprKind, NodeId};
use crate::frontend::SearchScope;
use crate::model::{type_key, DeclId, DeclKind, Program, Visibility};
use crate::plan::{EditPlan, PlannedChange, VisibilityPolicy};
use crate::printer::{render_file, Rendered};
use crate::usage::{find_usages, UsageOptions};
use crate::visit::{references_within, Receiver, RefWalker};

// ============================================================================
// Locator
// ============================================================================

/// Turns declarations and nodes into source locations, rendering each file
/// at most once.
pub struct Locator<'a> {
    program: &'a Program,
    cache: RefCell<HashMap<FileId, Option<Rendered>>>,
}

impl<'a> Locator<'a> {
    pub fn new(program: &'a Program) -> Self {
        Locator {
            program,
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn locate(&self, file: FileId, pick: impl FnOnce(&Rendered) -> Option<Span>) -> Option<Location> {
        let mut cache = self.cache.borrow_mut();
        let rendered = cache
            .entry(file)
            .or_insert_with(|| render_file(self.program, file))
            .as_ref()?;
        let span = pick(rendered)?;
        let path = self.program.file(file)?.path.clone();
        let (line, col) = byte_offset_to_position(rendered.text.as_bytes(), span.start as usize);
        Some(Location::with_span(path, line, col, span.start, span.end))
    }

    /// Location of a declaration's name.
    pub fn decl(&self, decl: DeclId) -> Option<Location> {
        let file = self.program.decl(decl)?.file;
        self.locate(file, |r| r.decl_spans.get(&decl).cloned())
    }

    /// Location of a reference node.
    pub fn node(&self, file: FileId, node: NodeId) -> Option<Location> {
        self.locate(file, |r| r.spans.get(&node).cloned())
    }
}

fn located(problem: Problem, location: Option<Location>) -> Problem {
    match location {
        Some(location) => problem.at(location),
        None => problem,
    }
}

// ============================================================================
// Rule Framework
// ============================================================================

/// Everything a rule may look at.
pub struct ConflictContext<'a> {
    pub before: &'a Program,
    pub after: &'a Program,
    pub plan: &'a EditPlan,
    pub before_locator: Locator<'a>,
    pub after_locator: Locator<'a>,
}

impl<'a> ConflictContext<'a> {
    pub fn new(before: &'a Program, after: &'a Program, plan: &'a EditPlan) -> Self {
        ConflictContext {
            before,
            after,
            plan,
            before_locator: Locator::new(before),
            after_locator: Locator::new(after),
        }
    }

    /// Relocated declarations with the visibility policy they move under.
    fn relocated(&self) -> Vec<(DeclId, VisibilityPolicy)> {
        let mut out = Vec::new();
        for change in &self.plan.changes {
            match change {
                PlannedChange::Relocate { member, policy, .. } => out.push((*member, *policy)),
                PlannedChange::RelocateTypes { types, policy } => {
                    out.extend(types.iter().map(|t| (*t, *policy)))
                }
                _ => {}
            }
        }
        out
    }
}

pub trait ConflictRule {
    fn name(&self) -> &'static str;
    fn check(&self, cx: &ConflictContext<'_>, problems: &mut ProblemList);
}

/// Runs a set of rules over a plan.
pub struct ConflictDetector {
    rules: Vec<Box<dyn ConflictRule>>,
}

impl Default for ConflictDetector {
    fn default() -> Self {
        ConflictDetector {
            rules: vec![
                Box::new(NameClashRule),
                Box::new(AccessibilityRule),
                Box::new(OverrideIntegrityRule),
                Box::new(StaticContextRule),
                Box::new(ReferenceBeforeDeleteRule),
                Box::new(SupersededImplementsRule),
            ],
        }
    }
}

impl ConflictDetector {
    pub fn empty() -> Self {
        ConflictDetector { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: Box<dyn ConflictRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn check(&self, before: &Program, after: &Program, plan: &EditPlan) -> ProblemList {
        let cx = ConflictContext::new(before, after, plan);
        let mut problems = ProblemList::new();
        for rule in &self.rules {
            let start = problems.len();
            rule.check(&cx, &mut problems);
            debug!(rule = rule.name(), found = problems.len() - start, "conflict rule");
        }
        problems
    }
}

// ============================================================================
// Name Clash
// ============================================================================

pub struct NameClashRule;

impl NameClashRule {
    fn clashes_with(after: &Program, decl: DeclId) -> Vec<DeclId> {
        let Some(d) = after.decl(decl) else {
            return Vec::new();
        };
        if !after.is_live(decl) || d.kind == DeclKind::Constructor {
            return Vec::new();
        }
        let siblings: Vec<DeclId> = match (d.kind, d.parent) {
            (DeclKind::Parameter | DeclKind::Local, Some(_)) => {
                let Some(exec) = d.parent.and_then(|p| after.enclosing_executable(p)) else {
                    return Vec::new();
                };
                let mut vars = after.params(exec).to_vec();
                if let Some(body) = after.decl(exec).and_then(|e| e.body.as_ref()) {
                    vars.extend(body.locals());
                }
                vars
            }
            (_, Some(parent)) => after.members(parent).to_vec(),
            (_, None) => after.types_in_package(after.package_of(decl)),
        };
        let signature = after.signature(decl);
        siblings
            .into_iter()
            .filter(|s| *s != decl)
            .filter(|s| {
                after.decl(*s).is_some_and(|other| {
                    other.name == d.name
                        && match d.kind {
                            DeclKind::Method => {
                                other.kind == DeclKind::Method && after.signature(*s) == signature
                            }
                            DeclKind::Field => other.kind == DeclKind::Field,
                            DeclKind::Parameter | DeclKind::Local => other.kind.is_variable(),
                            _ => other.is_type(),
                        }
                })
            })
            .collect()
    }
}

impl ConflictRule for NameClashRule {
    fn name(&self) -> &'static str {
        "name_clash"
    }

    fn check(&self, cx: &ConflictContext<'_>, problems: &mut ProblemList) {
        let mut placed: Vec<DeclId> = Vec::new();
        for change in &cx.plan.changes {
            match change {
                PlannedChange::Place { decl } => placed.push(*decl),
                PlannedChange::Relocate { member, .. } => placed.push(*member),
                PlannedChange::RelocateTypes { types, .. } => placed.extend(types.iter().copied()),
                _ => {}
            }
        }
        let mut reported = BTreeSet::new();
        for decl in placed {
            for other in Self::clashes_with(cx.after, decl) {
                if !reported.insert((decl.min(other), decl.max(other))) {
                    continue;
                }
                let scope = match cx.after.decl(decl).and_then(|d| d.parent) {
                    Some(parent) => cx.after.qualified_name(parent),
                    None => match cx.after.package_of(decl) {
                        "" => "the default package".to_string(),
                        package => format!("package {package}"),
                    },
                };
                let problem = Problem::fatal(
                    ProblemKind::NameClash,
                    format!(
                        "`{}` already exists in {scope}",
                        cx.after.display_name(decl)
                    ),
                )
                .for_symbol(cx.after.qualified_name(decl));
                problems.push(located(problem, cx.after_locator.decl(other)));
            }
        }
    }
}

// ============================================================================
// Accessibility
// ============================================================================

pub struct AccessibilityRule;

impl ConflictRule for AccessibilityRule {
    fn name(&self) -> &'static str {
        "accessibility"
    }

    fn check(&self, cx: &ConflictContext<'_>, problems: &mut ProblemList) {
        let relocated = cx.relocated();
        if relocated.is_empty() {
            return;
        }
        let moved = |program: &Program, d: DeclId| {
            relocated
                .iter()
                .find(|(root, _)| program.is_within(d, *root))
                .map(|(_, policy)| *policy)
        };
        let collections = CollectionSemantics::default();
        for unit in cx.after.files() {
            let mut sites = Vec::new();
            RefWalker::new(cx.after, &collections, unit.id, |s| sites.push(s)).walk_unit();
            for site in sites {
                let Some(from) = site.owner.filter(|_| !site.in_import) else {
                    continue;
                };
                let Some(target) = cx.after.decl(site.decl) else {
                    continue;
                };
                if target.kind.is_variable() && target.kind != DeclKind::Field {
                    continue;
                }
                let Some(policy) = moved(cx.after, site.decl).or_else(|| moved(cx.after, from)) else {
                    continue;
                };
                let owner = target.parent.unwrap_or(target.id);
                let visibility = target.visibility();
                if cx.after.is_accessible_from(owner, visibility, from) {
                    continue;
                }
                let was_accessible = cx.before.decl(site.decl).is_some_and(|old| {
                    cx.before.contains(from)
                        && cx.before.is_accessible_from(
                            old.parent.unwrap_or(old.id),
                            old.visibility(),
                            from,
                        )
                });
                if !was_accessible && cx.before.contains(from) {
                    continue;
                }

                let name = cx.after.display_name(site.decl);
                let user = cx
                    .after
                    .enclosing_type(from)
                    .map(|t| cx.after.qualified_name(t))
                    .unwrap_or_default();
                let crosses_package = cx.after.package_of(owner) != cx.after.package_of(from);
                let problem = match visibility {
                    Visibility::Private => Problem::fatal(
                        ProblemKind::VisibilityViolation,
                        format!("`{name}` is private and cannot be accessed from `{user}`"),
                    ),
                    Visibility::Package | Visibility::Protected
                        if crosses_package && policy == VisibilityPolicy::AsIs =>
                    {
                        Problem::warning(
                            ProblemKind::VisibilityViolation,
                            format!("`{user}` accesses package-private feature `{name}`"),
                        )
                    }
                    _ => Problem::fatal(
                        ProblemKind::VisibilityViolation,
                        format!("`{name}` is not accessible from `{user}`"),
                    ),
                }
                .for_symbol(cx.after.qualified_name(site.decl));
                problems.push(located(problem, cx.after_locator.node(site.file, site.node)));
            }
        }
    }
}

// ============================================================================
// Override Integrity
// ============================================================================

pub struct OverrideIntegrityRule;

impl ConflictRule for OverrideIntegrityRule {
    fn name(&self) -> &'static str {
        "override_integrity"
    }

    fn check(&self, cx: &ConflictContext<'_>, problems: &mut ProblemList) {
        for change in &cx.plan.changes {
            match change {
                PlannedChange::ExtractToInterface { member } => {
                    let Some(decl) = cx.before.decl(*member) else {
                        continue;
                    };
                    let message = match decl.kind {
                        DeclKind::Method if decl.is_static() => format!(
                            "static method `{}` cannot be extracted to an interface",
                            cx.before.display_name(*member)
                        ),
                        DeclKind::Field if !(decl.is_static() && decl.modifiers.is_final) => {
                            format!(
                                "field `{}` is not a static final constant and cannot move to an interface",
                                decl.name
                            )
                        }
                        _ => continue,
                    };
                    let problem = Problem::fatal(ProblemKind::OverrideIntegrityViolation, message)
                        .for_symbol(cx.before.qualified_name(*member));
                    problems.push(located(problem, cx.before_locator.decl(*member)));
                }
                PlannedChange::HostBody { member, target } => {
                    let is_interface = cx.after.decl(*target).is_some_and(|t| t.is_interface());
                    let Some(decl) = cx.after.decl(*member) else {
                        continue;
                    };
                    if is_interface
                        && decl.kind == DeclKind::Method
                        && decl.body.is_some()
                        && !decl.modifiers.is_default
                        && !decl.is_static()
                    {
                        let problem = Problem::fatal(
                            ProblemKind::OverrideIntegrityViolation,
                            format!(
                                "method `{}` has a body but `{}` is an interface; make it abstract or default",
                                cx.after.display_name(*member),
                                cx.after.name_of(*target)
                            ),
                        )
                        .for_symbol(cx.after.qualified_name(*member));
                        problems.push(located(problem, cx.after_locator.decl(*member)));
                    }
                }
                _ => {}
            }
        }
    }
}

// ============================================================================
// Static Context
// ============================================================================

pub struct StaticContextRule;

impl StaticContextRule {
    /// Instance members of `from` (or its supertypes) in `before`.
    fn is_instance_state(before: &Program, decl: DeclId, from: DeclId) -> bool {
        before.decl(decl).is_some_and(|d| {
            matches!(d.kind, DeclKind::Field | DeclKind::Method)
                && !d.is_static()
                && d.parent.is_some_and(|p| p == from || before.is_subtype_of(from, p))
        })
    }
}

impl ConflictRule for StaticContextRule {
    fn name(&self) -> &'static str {
        "static_context"
    }

    fn check(&self, cx: &ConflictContext<'_>, problems: &mut ProblemList) {
        for change in &cx.plan.changes {
            let PlannedChange::Relocate {
                member,
                from,
                to,
                receiver,
                ..
            } = change
            else {
                continue;
            };
            // A new superclass only exists after the plan, so check both sides.
            let related = [cx.before, cx.after]
                .iter()
                .any(|p| p.is_subtype_of(*to, *from) || p.is_subtype_of(*from, *to));
            let Some(decl) = cx.after.decl(*member) else {
                continue;
            };
            let symbol = cx.after.qualified_name(*member);

            if decl.kind == DeclKind::Field {
                let Some(init) = &decl.init else {
                    continue;
                };
                let mut calls = Vec::new();
                init.walk(&mut |e| {
                    if let ExprKind::Call {
                        method: Some(m),
                        target: None,
                        ..
                    } = &e.kind
                    {
                        calls.push(*m);
                    }
                });
                for m in calls {
                    let available = cx
                        .after
                        .decl(m)
                        .and_then(|d| d.parent)
                        .is_some_and(|p| p == *to || cx.after.is_subtype_of(*to, p));
                    if Self::is_instance_state(cx.before, m, *from) && !available {
                        let problem = Problem::warning(
                            ProblemKind::StaticContextViolation,
                            format!(
                                "initializer of `{}` calls instance method `{}` that is not available in `{}`",
                                decl.name,
                                cx.before.display_name(m),
                                cx.after.name_of(*to)
                            ),
                        )
                        .for_symbol(symbol.clone());
                        problems.push(located(problem, cx.after_locator.decl(*member)));
                    }
                }
                continue;
            }

            if related || receiver.is_some() {
                continue;
            }
            let uses_instance_state = references_within(cx.after, *member).iter().any(|site| {
                matches!(site.receiver, Receiver::Implicit | Receiver::This)
                    && !cx.after.is_within(site.decl, *member)
                    && Self::is_instance_state(cx.before, site.decl, *from)
            });
            let mut uses_this = false;
            if let Some(body) = &decl.body {
                body.walk_exprs(&mut |e| {
                    if matches!(e.kind, ExprKind::This) {
                        uses_this = true;
                    }
                });
            }
            if uses_instance_state || uses_this {
                let problem = Problem::fatal(
                    ProblemKind::StaticContextViolation,
                    format!(
                        "`{}` uses instance state of `{}` and cannot move to `{}` without a receiver parameter",
                        cx.after.display_name(*member),
                        cx.before.name_of(*from),
                        cx.after.name_of(*to)
                    ),
                )
                .for_symbol(symbol);
                problems.push(located(problem, cx.after_locator.decl(*member)));
            }
        }
    }
}

// ============================================================================
// Reference Before Delete
// ============================================================================

pub struct ReferenceBeforeDeleteRule;

impl ConflictRule for ReferenceBeforeDeleteRule {
    fn name(&self) -> &'static str {
        "reference_before_delete"
    }

    fn check(&self, cx: &ConflictContext<'_>, problems: &mut ProblemList) {
        for change in &cx.plan.changes {
            let PlannedChange::Delete {
                decls,
                search_comments,
            } = change
            else {
                continue;
            };
            let deleted = |d: DeclId| decls.iter().any(|root| cx.before.is_within(d, *root));
            let options = UsageOptions {
                include_comments: *search_comments,
                ..Default::default()
            };
            for target in decls {
                // Parameters are removed with their call-site arguments.
                let is_param = cx.before.kind_of(*target) == Some(DeclKind::Parameter);
                let usages = find_usages(cx.before, *target, &SearchScope::Project, &options);
                let mut users = BTreeSet::new();
                let mut sites = Vec::new();
                let mut commented = BTreeSet::new();
                for usage in &usages.usages {
                    if usage.in_import || usage.owner.is_some_and(deleted) {
                        continue;
                    }
                    if usage.in_comment {
                        commented.insert(usage.path.clone());
                        continue;
                    }
                    if is_param && usage.owner.is_none() {
                        continue;
                    }
                    let user = usage
                        .owner
                        .and_then(|o| cx.before.top_level_type(o))
                        .map(|t| cx.before.qualified_name(t))
                        .unwrap_or_else(|| usage.path.clone());
                    users.insert(user);
                    sites.push(format!("{}:{}:{}", usage.path, usage.line, usage.col));
                }
                let name = cx.before.display_name(*target);
                let symbol = cx.before.qualified_name(*target);
                let location = cx.before_locator.decl(*target);

                if !users.is_empty() {
                    let users = users.into_iter().collect::<Vec<_>>().join(", ");
                    let sole_ctor = cx.before.kind_of(*target) == Some(DeclKind::Constructor)
                        && cx
                            .before
                            .decl(*target)
                            .and_then(|d| d.parent)
                            .is_some_and(|ty| cx.before.constructors(ty).len() == 1);
                    let problem = if sole_ctor {
                        Problem::fatal(
                            ProblemKind::UnreferencedPreconditionViolation,
                            format!("`{name}` is the only constructor and is invoked from {users}"),
                        )
                    } else {
                        Problem::warning(
                            ProblemKind::UnreferencedPreconditionViolation,
                            format!(
                                "references found: `{name}` is used by {users} at {}",
                                sites.join(", ")
                            ),
                        )
                    };
                    problems.push(located(problem.for_symbol(symbol.clone()), location.clone()));
                }
                if !commented.is_empty() {
                    let paths = commented.into_iter().collect::<Vec<_>>().join(", ");
                    let problem = Problem::warning(
                        ProblemKind::UnreferencedPreconditionViolation,
                        format!("`{name}` is mentioned in comments in {paths}"),
                    )
                    .for_symbol(format!("{symbol} (comments)"));
                    problems.push(located(problem, location));
                }
            }
        }
    }
}

// ============================================================================
// Superseded Interface Implements
// ============================================================================

pub struct SupersededImplementsRule;

impl ConflictRule for SupersededImplementsRule {
    fn name(&self) -> &'static str {
        "superseded_implements"
    }

    fn check(&self, cx: &ConflictContext<'_>, problems: &mut ProblemList) {
        for change in &cx.plan.changes {
            let PlannedChange::PropagateImplements { iface, subclasses } = change else {
                continue;
            };
            let methods: Vec<DeclId> = cx
                .before
                .members(*iface)
                .iter()
                .copied()
                .filter(|m| cx.before.kind_of(*m) == Some(DeclKind::Method))
                .collect();
            for sub in subclasses {
                for method in &methods {
                    let Some(decl) = cx.before.decl(*method) else {
                        continue;
                    };
                    let signature = cx.before.signature(*method);
                    let expected = decl.ty.as_ref().map(type_key);
                    let conflicting = cx.after.members(*sub).iter().copied().find(|m| {
                        cx.after.decl(*m).is_some_and(|d| {
                            d.kind == DeclKind::Method
                                && d.name == decl.name
                                && cx.after.signature(*m) == signature
                                && (d.is_static() || d.ty.as_ref().map(type_key) != expected)
                        })
                    });
                    if let Some(conflict) = conflicting {
                        let problem = Problem::fatal(
                            ProblemKind::OverrideIntegrityViolation,
                            format!(
                                "`{}` declares `{}` incompatibly with `{}`, which it now implements",
                                cx.after.name_of(*sub),
                                cx.after.display_name(conflict),
                                cx.before.qualified_name(*iface)
                            ),
                        )
                        .for_symbol(cx.after.qualified_name(conflict));
                        problems.push(located(problem, cx.after_locator.decl(conflict)));
                    }
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
