/*
 * Copyright 2020 Nikhil Marathe <nsm.nikhil@gmail.com>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! The scheduler.
//!
//! `make` schedules the requested dependency, which matches it to a rule, synthesizes the rule's
//! inputs and recursively schedules those, parking a [`Dependent`] on every input that is not yet
//! resolved. Dependents whose inputs are all resolved go on a LIFO ready stack, which is drained
//! one at a time until the request resolves. Rule actions may call `make` again; that simply
//! drives the same state machine further.

use std::{
    collections::{HashMap, HashSet},
    rc::Rc,
    time::Instant,
};

use crate::{
    dependency::Dependency,
    disk_interface::{DiskInterface, SystemDiskInterface},
    error::{MakeError, MakeResult},
    graph::{BuildGraph, Edge},
    metrics::{Metric, Metrics},
    rule::Rule,
    spec::Spec,
    value::Value,
};

/// Tunables for an [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How many times a single product may be redirected to another dependency before the chain
    /// is treated as a cycle.
    pub max_indirections: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_indirections: 64,
        }
    }
}

#[derive(Debug)]
enum Slot {
    /// Being scheduled right now. Seeing this again while scheduling means a cycle.
    InProgress,
    Resolved(Value),
}

/// A pending output and the inputs it waits on.
#[derive(Debug)]
struct Dependent {
    rule: Rc<Rule>,
    output: Dependency,
    inputs: Vec<Dependency>,
    unresolved: usize,
    indirections: usize,
}

type DependentId = usize;

/// Named rules in insertion order. Re-adding a name replaces the rule in place.
#[derive(Debug, Default)]
struct RuleTable {
    rules: Vec<(String, Rc<Rule>)>,
}

impl RuleTable {
    fn insert(&mut self, name: String, rule: Rule) {
        let rule = Rc::new(rule);
        match self.rules.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = rule,
            None => self.rules.push((name, rule)),
        }
    }

    fn remove(&mut self, name: &str) -> Option<Rc<Rule>> {
        let index = self.rules.iter().position(|(n, _)| n == name)?;
        Some(self.rules.remove(index).1)
    }

    /// The single rule whose produces-spec matches, if any.
    fn find(&self, dependency: &Dependency) -> MakeResult<Option<(&str, Rc<Rule>)>> {
        let mut found: Option<(&str, &Rc<Rule>)> = None;
        for (name, rule) in &self.rules {
            if !rule.produces().matches(dependency) {
                continue;
            }
            if let Some((first, _)) = found {
                return Err(MakeError::AmbiguousRule {
                    dependency: dependency.clone(),
                    first: first.to_owned(),
                    second: name.clone(),
                });
            }
            found = Some((name.as_str(), rule));
        }
        Ok(found.map(|(name, rule)| (name, rule.clone())))
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(n, _)| n.as_str())
    }
}

pub struct Engine {
    config: EngineConfig,
    disk: Box<dyn DiskInterface>,

    rules: RuleTable,
    default_rules: RuleTable,
    /// Real rules waiting for their gates, by name.
    gated_rules: HashMap<String, Rule>,
    /// Extra inputs for every product matching the spec.
    extra_dependencies: Vec<(Spec, Vec<Spec>)>,
    next_rule: usize,

    resolved: HashMap<Dependency, Slot>,
    /// Outputs whose rule action is running. Scheduling one of them again means a cycle.
    applying: HashSet<Dependency>,
    waiting: HashMap<Dependency, Vec<DependentId>>,
    dependents: Vec<Option<Dependent>>,
    ready: Vec<DependentId>,

    graph: BuildGraph,
    metrics: Metrics,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("rules", &self.rules)
            .field("default_rules", &self.default_rules)
            .field("resolved", &self.resolved)
            .field("ready", &self.ready)
            .finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl Engine {
    pub fn new() -> Engine {
        Engine::with_disk(Box::new(SystemDiskInterface))
    }

    pub fn with_disk(disk: Box<dyn DiskInterface>) -> Engine {
        Engine::with_config(EngineConfig::default(), disk)
    }

    pub fn with_config(config: EngineConfig, disk: Box<dyn DiskInterface>) -> Engine {
        let mut engine = Engine {
            config,
            disk,
            rules: RuleTable::default(),
            default_rules: RuleTable::default(),
            gated_rules: HashMap::new(),
            extra_dependencies: vec![],
            next_rule: 1,
            resolved: HashMap::new(),
            applying: HashSet::new(),
            waiting: HashMap::new(),
            dependents: vec![],
            ready: vec![],
            graph: BuildGraph::default(),
            metrics: Metrics::default(),
        };
        engine.add_default_rule("make_target", Rule::target());
        engine.add_default_rule("make_optional", Rule::make_optional());
        engine.add_default_rule("check_file_exists", Rule::check_file_exists());
        engine.add_default_rule("make_dependencies", Rule::make_composite());
        engine.add_default_rule("as_dependency", Rule::make_indirect());
        engine
    }

    pub fn disk(&self) -> &dyn DiskInterface {
        &*self.disk
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn graph(&self) -> &BuildGraph {
        &self.graph
    }

    pub fn add_rule<S: Into<String>>(&mut self, name: S, rule: Rule) {
        let name = name.into();
        tracing::debug!(%name, produces = %rule.produces(), "add rule");
        self.rules.insert(name, rule);
    }

    /// Default rules are only consulted when no user rule matches.
    pub fn add_default_rule<S: Into<String>>(&mut self, name: S, rule: Rule) {
        self.default_rules.insert(name.into(), rule);
    }

    /// Adds a rule named after its literal target, or `#N` otherwise. Returns the name.
    pub fn rule(&mut self, rule: Rule) -> String {
        let name = match rule.target_name() {
            Some(target) => target.to_owned(),
            None => format!("#{}", self.next_rule),
        };
        self.next_rule += 1;
        self.add_rule(name.clone(), rule);
        name
    }

    /// Registers `rule` so that it only becomes active after its gates have been tried.
    ///
    /// Until then a placeholder producing `rule(name)` stands in for it, and is scheduled right
    /// away as an optional dependency.
    pub fn gated_rule<S: Into<String>>(
        &mut self,
        name: S,
        gates: Vec<Spec>,
        rule: Rule,
    ) -> MakeResult<()> {
        let name = name.into();
        tracing::warn!(%name, "creating a dynamic rule");
        self.gated_rules.insert(name.clone(), rule);
        self.add_rule(name.clone(), Rule::gate(&name, gates));
        let placeholder = Dependency::optional(Dependency::rule(name));
        self.rolling_back(|engine| engine.schedule(&placeholder))
    }

    /// Moves a gated rule into the active rule table, replacing its placeholder. Only the first
    /// call for a name has any effect.
    pub(crate) fn install_gated_rule(&mut self, name: &str) {
        if let Some(rule) = self.gated_rules.remove(name) {
            tracing::warn!(%name, "adding dynamic rule");
            self.rules.remove(name);
            self.rules.insert(name.to_owned(), rule);
        }
    }

    /// Forgets a gated rule whose placeholder could not be made, so it stops holding up
    /// scheduling.
    pub(crate) fn drop_gated_rule(&mut self, name: &str) {
        if self.gated_rules.remove(name).is_some() {
            tracing::warn!(%name, "gates cannot be made, dropping dynamic rule");
            self.rules.remove(name);
        }
    }

    /// Adds inputs to every product matching `produces`, on top of what its rule declares.
    pub fn depends(&mut self, produces: Spec, needs: Vec<Spec>) {
        match self
            .extra_dependencies
            .iter_mut()
            .find(|(spec, _)| *spec == produces)
        {
            Some((_, existing)) => existing.extend(needs),
            None => self.extra_dependencies.push((produces, needs)),
        }
    }

    /// User rules, then default rules. A gated rule is listed under its name from the moment it is
    /// registered, first as its placeholder.
    pub fn rule_names(&self) -> Vec<String> {
        self.rules
            .names()
            .chain(self.default_rules.names())
            .map(str::to_owned)
            .collect()
    }

    pub fn is_resolved(&self, dependency: &Dependency) -> bool {
        matches!(self.resolved.get(dependency), Some(Slot::Resolved(_)))
    }

    /// The memoized product, without building anything.
    pub fn value(&self, dependency: &Dependency) -> Option<&Value> {
        match self.resolved.get(dependency) {
            Some(Slot::Resolved(ref v)) => Some(v),
            _ => None,
        }
    }

    pub fn make(&mut self, dependency: &Dependency) -> MakeResult<Value> {
        let mut values = self.make_all(std::slice::from_ref(dependency))?;
        Ok(values.remove(0))
    }

    /// Everything is scheduled before anything is forced, so inputs shared across the batch are
    /// built once.
    pub fn make_all(&mut self, dependencies: &[Dependency]) -> MakeResult<Vec<Value>> {
        tracing::info!(?dependencies, "make");
        self.rolling_back(|engine| {
            for d in dependencies {
                engine.schedule(d)?;
            }
            for d in dependencies {
                engine.execute_until(|engine| engine.is_resolved(d))?;
            }
            dependencies.iter().map(|d| engine.force(d)).collect()
        })
    }

    /// Runs `f`, and if it fails discards every dependent it created, so none of that work runs
    /// later on behalf of another request.
    fn rolling_back<T, F>(&mut self, f: F) -> MakeResult<T>
    where
        F: FnOnce(&mut Engine) -> MakeResult<T>,
    {
        let watermark = self.dependents.len();
        let result = f(self);
        if result.is_err() && self.dependents.len() > watermark {
            tracing::debug!(
                discarded = self.dependents.len() - watermark,
                "rolling back failed request"
            );
            self.ready.retain(|&id| id < watermark);
            self.waiting.retain(|_, ids| {
                ids.retain(|&id| id < watermark);
                !ids.is_empty()
            });
            self.dependents.truncate(watermark);
        }
        result
    }

    /// Follows products that name other dependencies until a final value turns up.
    fn force(&mut self, dependency: &Dependency) -> MakeResult<Value> {
        let mut current = dependency.clone();
        let mut seen = HashSet::new();
        seen.insert(current.clone());
        for _ in 0..=self.config.max_indirections {
            let next = match self.value(&current) {
                Some(Value::Dependency(next)) => next.clone(),
                Some(value) => return Ok(value.clone()),
                None => return Err(MakeError::UnresolvedDependency(current)),
            };
            if !seen.insert(next.clone()) {
                return Err(MakeError::CircularDependency(next));
            }
            tracing::debug!(from = %current, to = %next, "product is a dependency, making it");
            self.schedule(&next)?;
            self.execute_until(|engine| engine.is_resolved(&next))?;
            current = next;
        }
        Err(MakeError::CircularDependency(dependency.clone()))
    }

    fn match_dependency(&mut self, dependency: &Dependency) -> MakeResult<(String, Rc<Rule>)> {
        let start = Instant::now();
        let found = match self.rules.find(dependency)? {
            Some((name, rule)) => Some((name.to_owned(), rule)),
            None => self
                .default_rules
                .find(dependency)?
                .map(|(name, rule)| (name.to_owned(), rule)),
        };
        self.metrics.record(Metric::Match, start.elapsed());
        match found {
            Some((name, rule)) => {
                tracing::debug!(%dependency, rule = %name, "found a match");
                Ok((name, rule))
            }
            None => Err(MakeError::NoMatchingRule(dependency.clone())),
        }
    }

    /// Binds the free variables of `target` under `produces` and synthesizes each needed spec.
    fn resolve_specs(
        &self,
        target: &Dependency,
        produces: &Spec,
        needs: &[Spec],
    ) -> MakeResult<Vec<Dependency>> {
        if needs.is_empty() {
            return Ok(vec![]);
        }
        let variables = produces.find_variables(target);
        needs
            .iter()
            .map(|spec| spec.to_dependency(self, target, &variables))
            .collect()
    }

    fn resolve_extra_dependencies(&self, dependency: &Dependency) -> MakeResult<Vec<Dependency>> {
        let mut extra = vec![];
        for (spec, needs) in &self.extra_dependencies {
            if spec.matches(dependency) {
                tracing::debug!(%dependency, count = needs.len(), "adding extra dependencies");
                extra.extend(self.resolve_specs(dependency, spec, needs)?);
            }
        }
        Ok(extra)
    }

    fn schedule(&mut self, dependency: &Dependency) -> MakeResult<()> {
        if !self.gated_rules.is_empty() {
            // Let pending placeholders install their rules before anything is matched.
            self.execute_until(|_| false)?;
        }
        match self.resolved.get(dependency) {
            Some(Slot::InProgress) => {
                return Err(MakeError::CircularDependency(dependency.clone()))
            }
            Some(Slot::Resolved(_)) => {
                tracing::debug!(%dependency, "already resolved");
                self.notify_resolved(dependency);
                return Ok(());
            }
            None => {}
        }
        if self.applying.contains(dependency) {
            return Err(MakeError::CircularDependency(dependency.clone()));
        }

        let start = Instant::now();
        let result = self.schedule_new(dependency);
        self.metrics.record(Metric::Schedule, start.elapsed());
        result
    }

    fn schedule_new(&mut self, dependency: &Dependency) -> MakeResult<()> {
        self.resolved.insert(dependency.clone(), Slot::InProgress);
        let result = self.match_dependency(dependency).and_then(|(_, rule)| {
            let mut inputs = self.resolve_specs(dependency, rule.produces(), rule.dependencies())?;
            inputs.extend(self.resolve_extra_dependencies(dependency)?);
            self.enqueue(rule, dependency.clone(), inputs, 0)
        });
        self.clear_in_progress(dependency);
        result
    }

    /// Schedules `output` against a concrete input list. Used by rescheduling, which already has
    /// the inputs and must not consult the rule's specs again.
    fn schedule_with_inputs(
        &mut self,
        rule: Rc<Rule>,
        output: Dependency,
        inputs: Vec<Dependency>,
        indirections: usize,
    ) -> MakeResult<()> {
        self.resolved.insert(output.clone(), Slot::InProgress);
        let result = self.enqueue(rule, output.clone(), inputs, indirections);
        self.clear_in_progress(&output);
        result
    }

    /// A node may already have resolved while it was being scheduled, in which case the mark is
    /// long gone and the value must stay.
    fn clear_in_progress(&mut self, dependency: &Dependency) {
        if let Some(Slot::InProgress) = self.resolved.get(dependency) {
            self.resolved.remove(dependency);
        }
    }

    fn enqueue(
        &mut self,
        rule: Rc<Rule>,
        output: Dependency,
        inputs: Vec<Dependency>,
        indirections: usize,
    ) -> MakeResult<()> {
        tracing::debug!(%output, inputs = ?inputs, "dependencies");
        for input in &inputs {
            self.graph.add_edge(&output, input, Edge::Requires);
        }
        let id = self.dependents.len();
        let unresolved = inputs.len();
        self.dependents.push(Some(Dependent {
            rule,
            output,
            inputs: inputs.clone(),
            unresolved,
            indirections,
        }));

        if unresolved == 0 {
            self.ready.push(id);
            return Ok(());
        }
        for input in &inputs {
            self.waiting.entry(input.clone()).or_default().push(id);
            if self.is_resolved(input) {
                self.notify_resolved(input);
            }
        }
        for input in &inputs {
            self.schedule(input)?;
        }
        Ok(())
    }

    /// Releases everyone parked on `dependency`.
    fn notify_resolved(&mut self, dependency: &Dependency) {
        let ids = match self.waiting.remove(dependency) {
            Some(ids) => ids,
            None => return,
        };
        for id in ids {
            if let Some(dependent) = self.dependents[id].as_mut() {
                dependent.unresolved -= 1;
                if dependent.unresolved == 0 {
                    tracing::debug!(output = %dependent.output, "ready");
                    self.ready.push(id);
                }
            }
        }
    }

    fn resolve(&mut self, dependency: &Dependency, value: Value) {
        if self.is_resolved(dependency) {
            return;
        }
        tracing::debug!(%dependency, %value, "resolved");
        self.resolved.insert(dependency.clone(), Slot::Resolved(value));
        self.notify_resolved(dependency);
    }

    /// Runs ready dependents until `until` holds or nothing is ready. Returns whether `until`
    /// held.
    fn execute_until<F>(&mut self, until: F) -> MakeResult<bool>
    where
        F: Fn(&Engine) -> bool,
    {
        loop {
            if until(self) {
                return Ok(true);
            }
            let id = match self.ready.pop() {
                Some(id) => id,
                None => return Ok(false),
            };
            let dependent = match self.dependents[id].take() {
                Some(dependent) => dependent,
                None => continue,
            };
            self.execute(dependent)?;
        }
    }

    fn execute(&mut self, dependent: Dependent) -> MakeResult<()> {
        let Dependent {
            rule,
            output,
            inputs,
            indirections,
            ..
        } = dependent;
        if self.is_resolved(&output) {
            tracing::debug!(%output, "already resolved, not applying rule");
            return Ok(());
        }
        if self.applying.contains(&output) {
            // The running application resolves it and wakes everyone parked on it.
            tracing::debug!(%output, "rule already being applied");
            return Ok(());
        }

        let mut substituted = inputs.clone();
        let mut values = Vec::with_capacity(inputs.len());
        let mut reschedule = false;
        for (i, input) in inputs.iter().enumerate() {
            match self.value(input) {
                Some(Value::Dependency(next)) => {
                    substituted[i] = next.clone();
                    reschedule = true;
                }
                Some(value) => values.push(value.clone()),
                None => return Err(MakeError::UnresolvedDependency(input.clone())),
            }
        }

        if reschedule {
            if indirections >= self.config.max_indirections {
                return Err(MakeError::CircularDependency(output));
            }
            tracing::debug!(%output, "reschedule");
            for (from, to) in inputs.iter().zip(&substituted) {
                if from != to {
                    self.graph.add_edge(from, to, Edge::Redirects);
                }
            }
            let start = Instant::now();
            let result = self.schedule_with_inputs(rule, output, substituted, indirections + 1);
            self.metrics.record(Metric::Reschedule, start.elapsed());
            return result;
        }

        let start = Instant::now();
        let existing = if Dependency::is_older_than(&output, &inputs, self.disk()) {
            None
        } else {
            output.existing_product(self.disk())
        };
        let product = match existing {
            Some(product) => {
                tracing::debug!(%output, "up to date");
                self.metrics.record(Metric::Reuse, start.elapsed());
                product
            }
            None => {
                tracing::info!(%output, "applying rule");
                self.applying.insert(output.clone());
                let result = rule.apply(&output, &values, self);
                self.applying.remove(&output);
                let product = result?;
                self.metrics.record(Metric::Apply, start.elapsed());
                if product == Value::Dependency(output.clone()) {
                    tracing::debug!(%output, "rule produced its own dependency, using nil");
                    Value::Nil
                } else {
                    product
                }
            }
        };
        self.resolve(&output, product);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::disk_interface::MapDiskInterface;

    #[test]
    fn builtins_are_installed() {
        let engine = Engine::new();
        assert_eq!(
            engine.rule_names(),
            vec![
                "make_target",
                "make_optional",
                "check_file_exists",
                "make_dependencies",
                "as_dependency"
            ]
        );
    }

    #[test]
    fn rule_naming() {
        let mut engine = Engine::new();
        assert_eq!(engine.rule(Rule::new(Spec::target("all"))), "all");
        assert_eq!(engine.rule(Rule::new("main")), "#2");
        assert_eq!(engine.rule(Rule::new("lib.a")), "#3");
        // same name replaces.
        engine.add_rule("all", Rule::new(Spec::target("all")).needs("main"));
        assert_eq!(&engine.rule_names()[..3], &["all", "#2", "#3"]);
    }

    #[test]
    fn depends_accumulates() {
        let mut engine = Engine::new();
        engine.depends(Spec::from("objects/%.o"), vec![Spec::from("brickfile")]);
        engine.depends(Spec::from("objects/%.o"), vec![Spec::from("config.h")]);
        engine.depends(Spec::from("main"), vec![Spec::from("link.ld")]);
        assert_eq!(engine.extra_dependencies.len(), 2);
        assert_eq!(engine.extra_dependencies[0].1.len(), 2);
        let extra = engine
            .resolve_extra_dependencies(&"objects/x.o".into())
            .expect("synthesizable");
        assert_eq!(
            extra,
            vec![Dependency::file("brickfile"), Dependency::file("config.h")]
        );
    }

    #[test]
    fn user_rules_shadow_defaults() {
        let mut engine = Engine::new();
        engine.add_rule("all", Rule::new(Spec::target("all")));
        let (name, _) = engine
            .match_dependency(&Dependency::target("all"))
            .expect("match");
        assert_eq!(name, "all");
        let (name, _) = engine
            .match_dependency(&Dependency::target("other"))
            .expect("match");
        assert_eq!(name, "make_target");
    }

    #[test]
    fn in_progress_mark_is_cleared_on_failure() {
        let mut engine = Engine::new();
        engine.add_rule("x", Rule::new(Spec::target("x")).needs(Dependency::rule("nobody")));
        assert!(matches!(
            engine.make(&Dependency::target("x")),
            Err(MakeError::NoMatchingRule(_))
        ));
        assert!(engine.resolved.get(&Dependency::target("x")).is_none());
        assert!(engine.resolved.get(&Dependency::rule("nobody")).is_none());
        // a retry fails the same way instead of reporting a cycle.
        assert!(matches!(
            engine.make(&Dependency::target("x")),
            Err(MakeError::NoMatchingRule(_))
        ));
    }

    #[test]
    fn failed_requests_leave_nothing_queued() {
        let mut engine = Engine::with_disk(Box::new(MapDiskInterface::default()));
        engine.add_rule("x", Rule::new(Spec::target("x")).needs("bad1").needs("bad2"));
        assert!(matches!(
            engine.make(&Dependency::target("x")),
            Err(MakeError::MissingProduct(_))
        ));
        assert!(engine.ready.is_empty());
        assert!(engine.waiting.is_empty());
        assert!(engine.dependents.is_empty());
    }

    #[test]
    fn unsynthesizable_gates_drop_the_rule() {
        let mut engine = Engine::with_disk(Box::new(MapDiskInterface::default()));
        engine
            .gated_rule(
                "later",
                vec![Spec::rule("other")],
                Rule::new(Spec::target("x")).action(|_, _, _| Ok(Value::from("x"))),
            )
            .expect("scheduled");
        let err = engine.make(&Dependency::target("x")).expect_err("never installed");
        assert!(matches!(err, MakeError::MissingProduct(ref p) if p == "x"));
        assert!(engine.gated_rules.is_empty());
        assert!(!engine.rule_names().iter().any(|n| n == "later"));
        assert!(engine.ready.is_empty());
    }

    #[test]
    fn applying_output_is_not_rescheduled() {
        let mut engine = Engine::new();
        engine.rule(Rule::new(Spec::target("loop")).action(|product, _, engine| {
            Ok(engine.make(product)?)
        }));
        let err = engine.make(&Dependency::target("loop")).expect_err("cycle");
        assert!(matches!(
            err,
            MakeError::CircularDependency(ref d) if *d == Dependency::target("loop")
        ));
        assert!(engine.applying.is_empty());
        assert!(!engine.is_resolved(&Dependency::target("loop")));
    }
}
