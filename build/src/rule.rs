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

use std::path::Path;

use crate::{
    dependency::Dependency,
    engine::Engine,
    error::{MakeError, MakeResult},
    spec::{Spec, WrapperKind},
    value::Value,
};

/// User supplied build step. Receives the product being built and the values of its inputs in
/// declaration order.
pub type Action = dyn Fn(&Dependency, &[Value], &mut Engine) -> anyhow::Result<Value>;

pub enum RuleVariant {
    /// Runs the action, or produces the list of input values if there is none.
    General(Option<Box<Action>>),
    /// Makes the wrapped dependency, swallowing any failure.
    MakeOptional,
    CheckFileExists,
    /// A target nobody has a rule for is the file of the same name.
    Target,
    MakeComposite,
    /// Makes the wrapped dependency and hands back its product as further dependencies.
    MakeIndirect,
    /// Placeholder for a gated rule. Installs the real rule once the gates have been tried.
    Gate(String),
}

impl std::fmt::Debug for RuleVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleVariant::General(Some(_)) => write!(f, "General(<action>)"),
            RuleVariant::General(None) => write!(f, "General"),
            RuleVariant::MakeOptional => write!(f, "MakeOptional"),
            RuleVariant::CheckFileExists => write!(f, "CheckFileExists"),
            RuleVariant::Target => write!(f, "Target"),
            RuleVariant::MakeComposite => write!(f, "MakeComposite"),
            RuleVariant::MakeIndirect => write!(f, "MakeIndirect"),
            RuleVariant::Gate(name) => write!(f, "Gate({})", name),
        }
    }
}

#[derive(Debug)]
pub struct Rule {
    produces: Spec,
    dependencies: Vec<Spec>,
    variant: RuleVariant,
}

impl Rule {
    /// A rule with no inputs and no action. Add them with [`Rule::needs`] and [`Rule::action`].
    pub fn new<S: Into<Spec>>(produces: S) -> Rule {
        Rule {
            produces: produces.into(),
            dependencies: vec![],
            variant: RuleVariant::General(None),
        }
    }

    pub fn needs<S: Into<Spec>>(mut self, spec: S) -> Rule {
        self.dependencies.push(spec.into());
        self
    }

    pub fn needs_all<I, S>(mut self, specs: I) -> Rule
    where
        I: IntoIterator<Item = S>,
        S: Into<Spec>,
    {
        self.dependencies.extend(specs.into_iter().map(Into::into));
        self
    }

    pub fn action<F>(mut self, action: F) -> Rule
    where
        F: Fn(&Dependency, &[Value], &mut Engine) -> anyhow::Result<Value> + 'static,
    {
        self.variant = RuleVariant::General(Some(Box::new(action)));
        self
    }

    pub fn make_optional() -> Rule {
        Rule::builtin(Spec::Wrapper(WrapperKind::Optional, None), RuleVariant::MakeOptional)
    }

    pub fn check_file_exists() -> Rule {
        Rule::builtin(Spec::any_file(), RuleVariant::CheckFileExists)
    }

    pub fn target() -> Rule {
        Rule::builtin(Spec::any_target(), RuleVariant::Target)
    }

    pub fn make_composite() -> Rule {
        Rule::builtin(Spec::Composite, RuleVariant::MakeComposite)
    }

    pub fn make_indirect() -> Rule {
        Rule::builtin(Spec::Wrapper(WrapperKind::Make, None), RuleVariant::MakeIndirect)
    }

    /// Gate failures are tolerated: each gate is needed as an optional dependency.
    pub(crate) fn gate(name: &str, gates: Vec<Spec>) -> Rule {
        Rule {
            produces: Spec::rule(name),
            dependencies: gates.into_iter().map(Spec::optional).collect(),
            variant: RuleVariant::Gate(name.to_owned()),
        }
    }

    fn builtin(produces: Spec, variant: RuleVariant) -> Rule {
        Rule {
            produces,
            dependencies: vec![],
            variant,
        }
    }

    pub fn produces(&self) -> &Spec {
        &self.produces
    }

    pub fn dependencies(&self) -> &[Spec] {
        &self.dependencies
    }

    pub fn variant(&self) -> &RuleVariant {
        &self.variant
    }

    /// The literal target name this rule produces, if any.
    pub(crate) fn target_name(&self) -> Option<&str> {
        match self.produces {
            Spec::Target(crate::spec::TargetSpec::Literal(ref name)) => Some(name),
            _ => None,
        }
    }

    pub(crate) fn apply(
        &self,
        product: &Dependency,
        inputs: &[Value],
        engine: &mut Engine,
    ) -> MakeResult<Value> {
        match self.variant {
            RuleVariant::General(None) => Ok(Value::List(inputs.to_vec())),
            RuleVariant::General(Some(ref action)) => {
                action(product, inputs, engine).map_err(|e| MakeError::from_action(product, e))
            }
            RuleVariant::MakeOptional => {
                let wrapped = product.unwrapped();
                match engine.make(wrapped) {
                    Ok(value) => Ok(value),
                    Err(e) => {
                        tracing::warn!(dependency = %wrapped, error = %e, "optional dependency failed");
                        if let Dependency::Rule(name) = wrapped {
                            engine.drop_gated_rule(name);
                        }
                        Ok(Value::Nil)
                    }
                }
            }
            RuleVariant::CheckFileExists => match product {
                Dependency::File(ref path) if engine.disk().exists(Path::new(path)) => {
                    Ok(Value::Text(path.clone()))
                }
                Dependency::File(ref path) => Err(MakeError::MissingProduct(path.clone())),
                other => Err(MakeError::NoMatchingRule(other.clone())),
            },
            RuleVariant::Target => match product {
                Dependency::Target(ref name) => Ok(Value::Dependency(Dependency::file(name.as_str()))),
                other => Err(MakeError::NoMatchingRule(other.clone())),
            },
            RuleVariant::MakeComposite => match product {
                Dependency::Composite(ref dependencies) => {
                    Ok(Value::List(engine.make_all(dependencies)?))
                }
                other => Err(MakeError::NoMatchingRule(other.clone())),
            },
            RuleVariant::MakeIndirect => {
                let value = engine.make(product.unwrapped())?;
                Ok(Value::Dependency(Dependency::from_value(&value)?))
            }
            RuleVariant::Gate(ref name) => {
                engine.install_gated_rule(name);
                Ok(Value::Text(name.clone()))
            }
        }
    }
}
