use thiserror::Error;

use crate::dependency::Dependency;

#[derive(Error, Debug)]
pub enum MakeError {
    #[error("no rule to make {0}")]
    NoMatchingRule(Dependency),
    #[error("ambiguous rules {first} and {second} for {dependency}")]
    AmbiguousRule {
        dependency: Dependency,
        first: String,
        second: String,
    },
    #[error("circular dependency involving {0}")]
    CircularDependency(Dependency),
    #[error("failed to resolve {0}")]
    UnresolvedDependency(Dependency),
    #[error("failed to make {dependency}: {source}")]
    ActionFailure {
        dependency: Dependency,
        #[source]
        source: anyhow::Error,
    },
    #[error("file does not exist: {0}")]
    MissingProduct(String),
    #[error("cannot create a dependency from {0}")]
    NotSynthesizable(String),
    #[error("product {0} does not name a dependency")]
    InvalidProduct(String),
}

impl MakeError {
    /// Errors from user actions keep their identity if they already came from the engine.
    pub(crate) fn from_action(dependency: &Dependency, error: anyhow::Error) -> MakeError {
        match error.downcast::<MakeError>() {
            Ok(e) => e,
            Err(source) => MakeError::ActionFailure {
                dependency: dependency.clone(),
                source,
            },
        }
    }
}

pub type MakeResult<T> = Result<T, MakeError>;
