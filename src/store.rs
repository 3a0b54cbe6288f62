//! State and transition-rule storage.

use crate::error::EngineError;
use crate::program::TransitionProgram;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Result of invoking a transition rule.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    /// Target state name.
    pub to: String,

    /// Optional payload carried by the transition.
    pub data: Option<Value>,
}

impl TransitionOutcome {
    /// Outcome with no payload.
    pub fn new(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            data: None,
        }
    }

    /// Outcome carrying a payload.
    pub fn with_data(to: impl Into<String>, data: Value) -> Self {
        Self {
            to: to.into(),
            data: Some(data),
        }
    }
}

type NativeRule = Box<dyn Fn(&Value, &str) -> TransitionOutcome + Send + Sync>;

/// A transition rule attached to a state.
///
/// Rules come in two forms: native closures supplied by calling code, and
/// programs compiled from the transition text of a declarative document.
/// Compiled rules can fail at invocation time (their result must be an
/// object with a string `to`); native rules cannot.
pub enum TransitionRule {
    /// Closure supplied by calling code.
    Native(NativeRule),

    /// Program compiled from declarative source text.
    Compiled(TransitionProgram),
}

impl TransitionRule {
    /// Wraps a closure as a native rule.
    pub fn native<F>(rule: F) -> Self
    where
        F: Fn(&Value, &str) -> TransitionOutcome + Send + Sync + 'static,
    {
        Self::Native(Box::new(rule))
    }

    /// Invokes the rule with the step input and the state being left.
    pub fn invoke(&self, input: &Value, state: &str) -> Result<TransitionOutcome, EngineError> {
        match self {
            TransitionRule::Native(rule) => Ok(rule(input, state)),
            TransitionRule::Compiled(program) => outcome_from_value(program.eval(input, state)?),
        }
    }
}

fn outcome_from_value(value: Value) -> Result<TransitionOutcome, EngineError> {
    let mut map = match value {
        Value::Object(map) => map,
        other => {
            return Err(EngineError::ProgramFailed {
                reason: format!("program result is not an object: {}", other),
            })
        }
    };

    let to = match map.remove("to") {
        Some(Value::String(to)) => to,
        _ => {
            return Err(EngineError::ProgramFailed {
                reason: "program result has no string 'to' member".to_string(),
            })
        }
    };

    Ok(TransitionOutcome {
        to,
        data: map.remove("data"),
    })
}

impl fmt::Debug for TransitionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionRule::Native(_) => f.write_str("TransitionRule::Native"),
            TransitionRule::Compiled(program) => f
                .debug_tuple("TransitionRule::Compiled")
                .field(&program.source())
                .finish(),
        }
    }
}

/// Insertion-ordered state set with acceptance marks and per-state rules.
#[derive(Debug, Default)]
pub struct StateStore {
    order: Vec<String>,
    known: HashSet<String>,
    acceptance: HashSet<String>,
    rules: HashMap<String, TransitionRule>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a state. No-op on an empty name. Re-adding an existing
    /// state is allowed; acceptance marks are only ever added, never
    /// removed.
    pub fn add_state(&mut self, name: &str, acceptance: bool) {
        if name.is_empty() {
            return;
        }
        if self.known.insert(name.to_string()) {
            self.order.push(name.to_string());
        }
        if acceptance {
            self.acceptance.insert(name.to_string());
        }
    }

    /// Attaches a rule to a state. Returns false if the state is unknown
    /// or already has a rule; the first registration wins.
    pub fn add_rule(&mut self, from: &str, rule: TransitionRule) -> bool {
        if !self.known.contains(from) || self.rules.contains_key(from) {
            return false;
        }
        self.rules.insert(from.to_string(), rule);
        true
    }

    /// Returns the rule for a state, if any.
    pub fn rule(&self, state: &str) -> Option<&TransitionRule> {
        self.rules.get(state)
    }

    pub fn has_rule(&self, state: &str) -> bool {
        self.rules.contains_key(state)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.known.contains(name)
    }

    pub fn is_acceptance(&self, name: &str) -> bool {
        self.acceptance.contains(name)
    }

    pub fn state_count(&self) -> usize {
        self.order.len()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// State names in insertion order.
    pub fn states(&self) -> &[String] {
        &self.order
    }

    /// Removes all states, marks and rules.
    pub fn clear(&mut self) {
        self.order.clear();
        self.known.clear();
        self.acceptance.clear();
        self.rules.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_add_state_idempotent() {
        let mut store = StateStore::new();
        store.add_state("a", false);
        store.add_state("a", false);
        store.add_state("b", false);

        assert_eq!(store.state_count(), 2);
        assert_eq!(store.states(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_add_state_empty_name_is_noop() {
        let mut store = StateStore::new();
        store.add_state("", true);
        assert_eq!(store.state_count(), 0);
    }

    #[test]
    fn test_acceptance_mark_never_removed() {
        let mut store = StateStore::new();
        store.add_state("a", true);
        store.add_state("a", false);
        assert!(store.is_acceptance("a"));
    }

    #[test]
    fn test_acceptance_mark_added_on_readd() {
        let mut store = StateStore::new();
        store.add_state("a", false);
        assert!(!store.is_acceptance("a"));
        store.add_state("a", true);
        assert!(store.is_acceptance("a"));
        assert_eq!(store.state_count(), 1);
    }

    #[test]
    fn test_add_rule_unknown_state() {
        let mut store = StateStore::new();
        let added = store.add_rule("ghost", TransitionRule::native(|_, _| TransitionOutcome::new("a")));
        assert!(!added);
        assert_eq!(store.rule_count(), 0);
    }

    #[test]
    fn test_add_rule_first_registration_wins() {
        let mut store = StateStore::new();
        store.add_state("a", false);

        assert!(store.add_rule("a", TransitionRule::native(|_, _| TransitionOutcome::new("x"))));
        assert!(!store.add_rule("a", TransitionRule::native(|_, _| TransitionOutcome::new("y"))));

        let outcome = store.rule("a").unwrap().invoke(&json!(null), "a").unwrap();
        assert_eq!(outcome.to, "x");
    }

    #[test]
    fn test_native_rule_sees_input_and_state() {
        let mut store = StateStore::new();
        store.add_state("a", false);
        store.add_rule(
            "a",
            TransitionRule::native(|input, state| {
                TransitionOutcome::with_data(state, json!({"echo": input.clone()}))
            }),
        );

        let outcome = store.rule("a").unwrap().invoke(&json!(7), "a").unwrap();
        assert_eq!(outcome.to, "a");
        assert_eq!(outcome.data, Some(json!({"echo": 7})));
    }

    #[test]
    fn test_compiled_rule_invocation() {
        let program = TransitionProgram::parse("if data == '0' then {to: 'b'} else {to: 'a'}").unwrap();
        let mut store = StateStore::new();
        store.add_state("a", false);
        store.add_rule("a", TransitionRule::Compiled(program));

        let outcome = store.rule("a").unwrap().invoke(&json!("0"), "a").unwrap();
        assert_eq!(outcome.to, "b");
        assert_eq!(outcome.data, None);
    }

    #[test]
    fn test_compiled_rule_requires_string_to() {
        let program = TransitionProgram::parse("{data: 1}").unwrap();
        let rule = TransitionRule::Compiled(program);
        let result = rule.invoke(&json!(null), "a");
        assert!(matches!(result, Err(EngineError::ProgramFailed { .. })));

        let program = TransitionProgram::parse("42").unwrap();
        let rule = TransitionRule::Compiled(program);
        let result = rule.invoke(&json!(null), "a");
        assert!(matches!(result, Err(EngineError::ProgramFailed { .. })));
    }

    #[test]
    fn test_clear() {
        let mut store = StateStore::new();
        store.add_state("a", true);
        store.add_rule("a", TransitionRule::native(|_, _| TransitionOutcome::new("a")));
        store.clear();

        assert_eq!(store.state_count(), 0);
        assert_eq!(store.rule_count(), 0);
        assert!(!store.contains("a"));
        assert!(!store.is_acceptance("a"));
    }

    proptest! {
        #[test]
        fn prop_state_count_counts_distinct_names(names in proptest::collection::vec("[a-z]{1,8}", 0..32)) {
            let mut store = StateStore::new();
            for name in &names {
                store.add_state(name, false);
            }
            let distinct: std::collections::HashSet<_> = names.iter().collect();
            prop_assert_eq!(store.state_count(), distinct.len());
        }

        #[test]
        fn prop_rule_count_never_exceeds_state_count(names in proptest::collection::vec("[a-z]{1,4}", 0..16)) {
            let mut store = StateStore::new();
            for name in &names {
                store.add_state(name, false);
                store.add_rule(name, TransitionRule::native(|_, _| TransitionOutcome::new("x")));
                // A second registration must always be rejected.
                prop_assert!(!store.add_rule(name, TransitionRule::native(|_, _| TransitionOutcome::new("y"))));
            }
            prop_assert!(store.rule_count() <= store.state_count());
        }
    }
}
