//! Registry of named validators with declared prerequisites.
//!
//! Validators are ordered once, at build time, so that every validator runs
//! after all of its prerequisites. Ties keep registration order, which makes
//! evaluation order deterministic.

use std::collections::{HashMap, HashSet};
use std::fmt;

use thiserror::Error;

pub trait Validator<C>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Validators that must run and pass before this one
    fn prerequisites(&self) -> &[&'static str] {
        &[]
    }

    /// `Err(reason)` rejects the context
    fn validate(&self, context: &C) -> Result<(), String>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("validator '{0}' registered twice")]
    Duplicate(&'static str),

    #[error("validator '{validator}' requires unknown validator '{prerequisite}'")]
    UnknownPrerequisite {
        validator: &'static str,
        prerequisite: &'static str,
    },

    #[error("validators form a cycle: {}", .0.join(", "))]
    Cycle(Vec<&'static str>),
}

/// First rejection raised during evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub validator: &'static str,
    pub reason: String,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

pub struct ValidatorRegistry<C> {
    ordered: Vec<Box<dyn Validator<C>>>,
}

impl<C> ValidatorRegistry<C> {
    pub fn builder() -> ValidatorRegistryBuilder<C> {
        ValidatorRegistryBuilder {
            validators: Vec::new(),
        }
    }

    /// Evaluation order
    pub fn names(&self) -> Vec<&'static str> {
        self.ordered.iter().map(|v| v.name()).collect()
    }

    /// Run every validator in order, stopping at the first rejection
    pub fn evaluate(&self, context: &C) -> Result<(), Rejection> {
        for validator in &self.ordered {
            validator.validate(context).map_err(|reason| Rejection {
                validator: validator.name(),
                reason,
            })?;
        }
        Ok(())
    }
}

pub struct ValidatorRegistryBuilder<C> {
    validators: Vec<Box<dyn Validator<C>>>,
}

impl<C> ValidatorRegistryBuilder<C> {
    pub fn register(mut self, validator: impl Validator<C> + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    pub fn build(self) -> Result<ValidatorRegistry<C>, RegistryError> {
        let mut index: HashMap<&'static str, usize> = HashMap::new();
        for (i, validator) in self.validators.iter().enumerate() {
            if index.insert(validator.name(), i).is_some() {
                return Err(RegistryError::Duplicate(validator.name()));
            }
        }

        let mut pending: Vec<usize> = Vec::with_capacity(self.validators.len());
        for (i, validator) in self.validators.iter().enumerate() {
            for prerequisite in validator.prerequisites() {
                if !index.contains_key(prerequisite) {
                    return Err(RegistryError::UnknownPrerequisite {
                        validator: validator.name(),
                        prerequisite: *prerequisite,
                    });
                }
            }
            pending.push(i);
        }

        // Kahn's algorithm, always taking the earliest registered ready validator
        let mut placed: HashSet<&'static str> = HashSet::new();
        let mut order: Vec<usize> = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let ready = pending.iter().position(|&i| {
                self.validators[i]
                    .prerequisites()
                    .iter()
                    .all(|p| placed.contains(p))
            });

            match ready {
                Some(position) => {
                    let i = pending.remove(position);
                    placed.insert(self.validators[i].name());
                    order.push(i);
                }
                None => {
                    let names = pending
                        .iter()
                        .map(|&i| self.validators[i].name())
                        .collect();
                    return Err(RegistryError::Cycle(names));
                }
            }
        }

        let mut slots: Vec<Option<Box<dyn Validator<C>>>> =
            self.validators.into_iter().map(Some).collect();
        let ordered = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();

        Ok(ValidatorRegistry { ordered })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fake {
        name: &'static str,
        prerequisites: Vec<&'static str>,
        reject: bool,
        calls: Arc<AtomicUsize>,
    }

    impl Fake {
        fn new(name: &'static str, prerequisites: &[&'static str]) -> Self {
            Self {
                name,
                prerequisites: prerequisites.to_vec(),
                reject: false,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn rejecting(mut self) -> Self {
            self.reject = true;
            self
        }
    }

    impl Validator<()> for Fake {
        fn name(&self) -> &'static str {
            self.name
        }

        fn prerequisites(&self) -> &[&'static str] {
            &self.prerequisites
        }

        fn validate(&self, _: &()) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                Err(format!("{} failed", self.name))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_prerequisites_run_first() {
        let registry = ValidatorRegistry::builder()
            .register(Fake::new("require_sso", &["single_org"]))
            .register(Fake::new("single_org", &[]))
            .build()
            .unwrap();

        assert_eq!(registry.names(), vec!["single_org", "require_sso"]);
    }

    #[test]
    fn test_registration_order_breaks_ties() {
        let registry = ValidatorRegistry::builder()
            .register(Fake::new("c", &[]))
            .register(Fake::new("a", &[]))
            .register(Fake::new("b", &["c"]))
            .build()
            .unwrap();

        assert_eq!(registry.names(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_unknown_prerequisite() {
        let result = ValidatorRegistry::builder()
            .register(Fake::new("require_sso", &["single_org"]))
            .build();

        assert_eq!(
            result.err(),
            Some(RegistryError::UnknownPrerequisite {
                validator: "require_sso",
                prerequisite: "single_org",
            })
        );
    }

    #[test]
    fn test_cycle_and_duplicate() {
        let cycle = ValidatorRegistry::builder()
            .register(Fake::new("a", &["b"]))
            .register(Fake::new("b", &["a"]))
            .build();
        assert!(matches!(cycle, Err(RegistryError::Cycle(_))));

        let duplicate = ValidatorRegistry::builder()
            .register(Fake::new("a", &[]))
            .register(Fake::new("a", &[]))
            .build();
        assert_eq!(duplicate.err(), Some(RegistryError::Duplicate("a")));
    }

    #[test]
    fn test_dependents_skipped_after_rejection() {
        let dependent = Fake::new("dependent", &["base"]);
        let calls = dependent.calls.clone();
        let registry = ValidatorRegistry::builder()
            .register(Fake::new("base", &[]).rejecting())
            .register(dependent)
            .build()
            .unwrap();

        let rejection = registry.evaluate(&()).unwrap_err();
        assert_eq!(rejection.validator, "base");
        assert_eq!(rejection.to_string(), "base failed");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
