//! Predicate evaluation for goal and subtask checking.
//!
//! A [`PredicateRegistry`] maps predicate names (case-insensitive) to
//! callables of arity 1 or 2 over entity-state handles. The registry is
//! mutable at runtime so task suites can register their own predicates; it
//! is passed by reference into the task domain rather than living in
//! process-wide state.

pub mod builtins;

use std::collections::HashMap;

use crate::error::PredicateError;
use crate::states::EntityState;

/// A named boolean relation over entity states.
pub trait PredicateFn: Send + Sync {
    /// Expected argument count, or `None` for any arity (constants).
    fn arity(&self) -> Option<usize>;

    /// Evaluates the relation over resolved entity handles.
    fn eval(&self, args: &[&EntityState]) -> Result<bool, PredicateError>;
}

/// Mutable registry of predicate functions.
pub struct PredicateRegistry {
    predicates: HashMap<String, Box<dyn PredicateFn>>,
}

impl PredicateRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            predicates: HashMap::new(),
        }
    }

    /// Creates a registry holding all built-in predicates.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtins::register_builtins(&mut registry);
        registry
    }

    /// Registers a predicate under a case-insensitive name, replacing any
    /// existing registration.
    pub fn register(&mut self, name: impl AsRef<str>, predicate: Box<dyn PredicateFn>) {
        self.predicates
            .insert(name.as_ref().to_lowercase(), predicate);
    }

    /// True if a predicate is registered under this name.
    pub fn contains(&self, name: &str) -> bool {
        self.predicates.contains_key(&name.to_lowercase())
    }

    /// Number of registered predicates.
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Evaluates a predicate by name over resolved entity handles.
    ///
    /// # Errors
    /// Returns `UnknownPredicate` for unregistered names (never a default
    /// boolean) and `ArityMismatch` when the argument count is wrong.
    pub fn evaluate(
        &self,
        name: &str,
        args: &[&EntityState],
    ) -> Result<bool, PredicateError> {
        let key = name.to_lowercase();
        let predicate = self
            .predicates
            .get(&key)
            .ok_or_else(|| PredicateError::UnknownPredicate(name.to_string()))?;
        if let Some(expected) = predicate.arity() {
            if args.len() != expected {
                return Err(PredicateError::ArityMismatch {
                    name: name.to_string(),
                    expected,
                    actual: args.len(),
                });
            }
        }
        predicate.eval(args)
    }
}

impl Default for PredicateRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
