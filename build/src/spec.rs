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

//! Patterns over dependencies.
//!
//! A spec is used on both sides of a rule. On the produces side it decides whether the rule can
//! build a dependency and extracts free variables from it. On the needs side it synthesizes a
//! concrete dependency from those variables.

use std::{fmt::Display, rc::Rc};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    dependency::Dependency,
    engine::Engine,
    error::{MakeError, MakeResult},
};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\d+)\}").expect("known valid"));

/// Replaces `{N}` with the N-th variable. Unbound placeholders are left alone.
fn substitute(template: &str, variables: &[String]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| variables.get(i))
                .cloned()
                .unwrap_or_else(|| caps[0].to_owned())
        })
        .into_owned()
}

#[derive(Debug, Clone)]
pub enum FileSpec {
    Any,
    Literal(String),
    /// A template with `%` wildcards, compiled to an anchored regex with one capture each.
    Pattern { template: String, regex: Regex },
}

impl FileSpec {
    pub fn new<S: Into<String>>(template: S) -> FileSpec {
        let template = template.into();
        if !template.contains('%') {
            return FileSpec::Literal(template);
        }
        let body = template
            .split('%')
            .map(|piece| regex::escape(piece))
            .collect::<Vec<_>>()
            .join("(.+)");
        let regex = Regex::new(&format!("^{}$", body)).expect("escaped pattern is valid");
        tracing::debug!(%template, %regex, "compiled file pattern");
        FileSpec::Pattern { template, regex }
    }

    fn template(&self) -> Option<&str> {
        match self {
            FileSpec::Any => None,
            FileSpec::Literal(ref t) => Some(t),
            FileSpec::Pattern { ref template, .. } => Some(template),
        }
    }
}

impl PartialEq for FileSpec {
    fn eq(&self, other: &Self) -> bool {
        self.template() == other.template()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TargetSpec {
    Any,
    Literal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperKind {
    Make,
    Optional,
}

impl WrapperKind {
    fn wrap(self, dependency: Dependency) -> Dependency {
        match self {
            WrapperKind::Make => Dependency::make(dependency),
            WrapperKind::Optional => Dependency::optional(dependency),
        }
    }

    fn unwrap(self, dependency: &Dependency) -> Option<&Dependency> {
        match (self, dependency) {
            (WrapperKind::Make, Dependency::Make(ref d)) => Some(d),
            (WrapperKind::Optional, Dependency::Optional(ref d)) => Some(d),
            _ => None,
        }
    }
}

pub type SpecFn = dyn Fn(&Dependency, &[String], &Engine) -> anyhow::Result<Dependency>;

/// Computes an input from the product being built, e.g. a probe of the current platform.
#[derive(Clone)]
pub struct FunctionalSpec(Rc<SpecFn>);

impl std::fmt::Debug for FunctionalSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FunctionalSpec{{}}")
    }
}

impl PartialEq for FunctionalSpec {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Spec {
    File(FileSpec),
    Target(TargetSpec),
    Rule(String),
    /// Exactly this dependency.
    Dependency(Dependency),
    /// Any composite dependency.
    Composite,
    /// Never matches; only synthesizes.
    Functional(FunctionalSpec),
    /// A wrapped dependency of `kind`. Without an inner spec any such wrapper matches.
    Wrapper(WrapperKind, Option<Box<Spec>>),
}

impl Spec {
    pub fn file<S: Into<String>>(template: S) -> Spec {
        Spec::File(FileSpec::new(template))
    }

    pub fn any_file() -> Spec {
        Spec::File(FileSpec::Any)
    }

    pub fn target<S: Into<String>>(name: S) -> Spec {
        Spec::Target(TargetSpec::Literal(name.into()))
    }

    pub fn any_target() -> Spec {
        Spec::Target(TargetSpec::Any)
    }

    pub fn rule<S: Into<String>>(name: S) -> Spec {
        Spec::Rule(name.into())
    }

    pub fn functional<F>(f: F) -> Spec
    where
        F: Fn(&Dependency, &[String], &Engine) -> anyhow::Result<Dependency> + 'static,
    {
        Spec::Functional(FunctionalSpec(Rc::new(f)))
    }

    /// The product of `inner` names further dependencies to build.
    pub fn make<S: Into<Spec>>(inner: S) -> Spec {
        Spec::Wrapper(WrapperKind::Make, Some(Box::new(inner.into())))
    }

    pub fn optional<S: Into<Spec>>(inner: S) -> Spec {
        Spec::Wrapper(WrapperKind::Optional, Some(Box::new(inner.into())))
    }

    pub fn matches(&self, dependency: &Dependency) -> bool {
        match (self, dependency) {
            (Spec::File(FileSpec::Any), Dependency::File(_)) => true,
            (Spec::File(FileSpec::Literal(ref l)), Dependency::File(ref path)) => l == path,
            (Spec::File(FileSpec::Pattern { ref regex, .. }), Dependency::File(ref path)) => {
                regex.is_match(path)
            }
            (Spec::Target(TargetSpec::Any), Dependency::Target(_)) => true,
            (Spec::Target(TargetSpec::Literal(ref l)), Dependency::Target(ref name)) => l == name,
            (Spec::Rule(ref l), Dependency::Rule(ref name)) => l == name,
            (Spec::Dependency(ref d), other) => d == other,
            (Spec::Composite, Dependency::Composite(_)) => true,
            (Spec::Wrapper(kind, ref inner), other) => match kind.unwrap(other) {
                Some(unwrapped) => inner.as_ref().map_or(true, |s| s.matches(unwrapped)),
                None => false,
            },
            _ => false,
        }
    }

    /// Free variables of a dependency this spec matches. Variable 0 is the whole name.
    pub fn find_variables(&self, dependency: &Dependency) -> Vec<String> {
        match (self, dependency) {
            (Spec::File(FileSpec::Pattern { ref regex, .. }), Dependency::File(ref path)) => {
                match regex.captures(path) {
                    Some(caps) => caps
                        .iter()
                        .map(|c| c.map_or_else(String::new, |m| m.as_str().to_owned()))
                        .collect(),
                    None => vec![],
                }
            }
            (Spec::File(_), Dependency::File(ref path)) => vec![path.clone()],
            (Spec::Target(_), Dependency::Target(ref name)) => vec![name.clone()],
            (Spec::Wrapper(kind, Some(ref inner)), other) => match kind.unwrap(other) {
                Some(unwrapped) => inner.find_variables(unwrapped),
                None => vec![],
            },
            _ => vec![],
        }
    }

    /// Synthesizes the concrete dependency this spec stands for, given the variables bound from
    /// `product`.
    pub fn to_dependency(
        &self,
        engine: &Engine,
        product: &Dependency,
        variables: &[String],
    ) -> MakeResult<Dependency> {
        match self {
            Spec::File(FileSpec::Literal(ref template)) => {
                Ok(Dependency::File(substitute(template, variables)))
            }
            Spec::Target(TargetSpec::Literal(ref template)) => {
                Ok(Dependency::Target(substitute(template, variables)))
            }
            Spec::Dependency(ref d) => Ok(d.clone()),
            Spec::Functional(FunctionalSpec(ref f)) => {
                (**f)(product, variables, engine).map_err(|e| MakeError::from_action(product, e))
            }
            Spec::Wrapper(kind, Some(ref inner)) => Ok(kind.wrap(inner.to_dependency(
                engine, product, variables,
            )?)),
            other => Err(MakeError::NotSynthesizable(other.to_string())),
        }
    }
}

impl Display for Spec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Spec::File(FileSpec::Any) => write!(f, "file(*)"),
            Spec::File(FileSpec::Literal(t)) | Spec::File(FileSpec::Pattern { template: t, .. }) => {
                write!(f, "file({})", t)
            }
            Spec::Target(TargetSpec::Any) => write!(f, ":*"),
            Spec::Target(TargetSpec::Literal(t)) => write!(f, ":{}", t),
            Spec::Rule(name) => write!(f, "rule({})", name),
            Spec::Dependency(d) => write!(f, "={}", d),
            Spec::Composite => write!(f, "[*]"),
            Spec::Functional(_) => write!(f, "fn(..)"),
            Spec::Wrapper(kind, inner) => {
                let prefix = match kind {
                    WrapperKind::Make => "make",
                    WrapperKind::Optional => "optional",
                };
                match inner {
                    Some(inner) => write!(f, "{}({})", prefix, inner),
                    None => write!(f, "{}(*)", prefix),
                }
            }
        }
    }
}

impl From<&str> for Spec {
    fn from(template: &str) -> Self {
        Spec::file(template)
    }
}

impl From<String> for Spec {
    fn from(template: String) -> Self {
        Spec::file(template)
    }
}

impl From<Dependency> for Spec {
    fn from(dependency: Dependency) -> Self {
        Spec::Dependency(dependency)
    }
}
