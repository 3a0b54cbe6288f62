//! The machine engine - orchestrates the store, compiled programs and the
//! notification channel.

use crate::channel::{EventChannel, Subscription, TransitionEvent};
use crate::document::{self, LoadReport};
use crate::program;
use crate::store::{StateStore, TransitionRule};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder occupying the current state before any state is
/// established.
pub const NO_STATE: &str = "noState";

/// Result of a successful step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// State the machine moved to.
    pub to: String,

    /// Payload produced by the rule, or an echo of the step input when the
    /// rule produced none.
    pub data: Value,
}

/// A finite state machine.
///
/// A machine is populated either programmatically ([`Machine::add_state`]
/// and [`Machine::add_transition`]) or atomically from a declarative
/// document ([`Machine::from_json`]). Stepping is Mealy-style: the rule
/// for the current state receives the step input and the state name, and
/// decides the target state and payload. Every successful step publishes
/// one [`TransitionEvent`] before the state mutates.
///
/// All operations are synchronous and run to completion; the machine is
/// not designed for concurrent mutation. Callers sharing one across
/// threads must supply their own synchronization.
pub struct Machine {
    name: String,
    current: String,
    store: StateStore,
    alphabet: Option<Vec<String>>,
    initial_state: String,
    initial_data: Option<Value>,
    checksum: Option<String>,
    channel: EventChannel,
    subscriptions: Vec<Subscription>,
}

impl Machine {
    /// Creates an empty machine: sentinel current state, no states, no
    /// rules, no subscribers.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            current: NO_STATE.to_string(),
            store: StateStore::new(),
            alphabet: None,
            initial_state: NO_STATE.to_string(),
            initial_data: None,
            checksum: None,
            channel: EventChannel::new(),
            subscriptions: Vec::new(),
        }
    }

    /// Builds a machine from a declarative document. Returns `None` on
    /// any validation failure. A caller-supplied `name` overrides the
    /// document's.
    pub fn create(doc: Option<&Value>, name: Option<&str>) -> Option<Self> {
        let mut machine = Machine::default();
        if !machine.from_json(doc).success {
            return None;
        }
        if let Some(name) = name {
            machine.name = name.to_string();
        }
        Some(machine)
    }

    // =========================================================================
    // Declarative loading
    // =========================================================================

    /// Loads a declarative document, replacing the machine's name,
    /// alphabet, initial state/data, states and rules wholesale.
    ///
    /// Loading is atomic: the entire document is validated - every state
    /// descriptor, every compiled transition program, the `initialData`
    /// shape - before the machine is mutated, so a failed load leaves the
    /// machine exactly as it was. Subscribers survive a load; only
    /// [`Machine::clear`] tears down the channel.
    pub fn from_json(&mut self, doc: Option<&Value>) -> LoadReport {
        let loaded = match document::validate(doc) {
            Ok(loaded) => loaded,
            Err(report) => {
                tracing::warn!(status = report.status.code(), "document rejected");
                return report;
            }
        };

        self.store.clear();
        self.name = loaded.name;
        self.alphabet = Some(loaded.alphabet);
        self.initial_state = loaded
            .initial_state
            .unwrap_or_else(|| NO_STATE.to_string());
        self.initial_data = loaded.initial_data;
        self.checksum = Some(loaded.checksum);
        self.current = self.initial_state.clone();

        for state in loaded.states {
            self.store.add_state(&state.name, state.acceptance);
            let _ = self
                .store
                .add_rule(&state.name, TransitionRule::Compiled(state.program));
        }

        tracing::debug!(
            name = %self.name,
            states = self.store.state_count(),
            "document loaded"
        );
        LoadReport::valid()
    }

    // =========================================================================
    // Programmatic construction
    // =========================================================================

    /// Registers a state. No-op on an empty name; re-adding an existing
    /// state is allowed. Acceptance marks are only ever added, never
    /// removed.
    pub fn add_state(&mut self, name: &str, acceptance: bool) {
        self.store.add_state(name, acceptance);
    }

    /// Attaches a transition rule to a state. Returns false if the state
    /// is unknown or already has a rule; the first registration wins.
    pub fn add_transition(&mut self, from: &str, rule: TransitionRule) -> bool {
        self.store.add_rule(from, rule)
    }

    /// Attaches a listener for transition events. The registration is
    /// retained internally; it is torn down only by [`Machine::clear`].
    pub fn add_subscriber<F>(&mut self, listener: F)
    where
        F: Fn(&TransitionEvent) + Send + Sync + 'static,
    {
        let subscription = self.channel.subscribe(listener);
        self.subscriptions.push(subscription);
    }

    // =========================================================================
    // Stepping
    // =========================================================================

    /// Advances the machine one step.
    ///
    /// A non-empty `override_state` forces the current state first, with
    /// no validation - the explicit capability to seed or force a state.
    /// Returns `None` when no rule exists for the current state (including
    /// the sentinel); that is the normal terminal condition for machines
    /// with partial rule coverage, not an error. The transition event is
    /// published before the current state mutates, so subscribers observe
    /// the state being left.
    pub fn next(&mut self, input: &Value, override_state: Option<&str>) -> Option<StepResult> {
        if let Some(forced) = override_state {
            if !forced.is_empty() {
                self.current = forced.to_string();
            }
        }

        let rule = self.store.rule(&self.current)?;
        let outcome = match rule.invoke(input, &self.current) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(state = %self.current, error = %e, "transition rule failed");
                return None;
            }
        };

        // A falsy payload is reported as absent in the event; the caller
        // instead gets the original input echoed back.
        let data = outcome.data.filter(program::is_truthy);
        let event = TransitionEvent {
            from: self.current.clone(),
            to: outcome.to.clone(),
            data: data.clone(),
        };
        self.channel.publish(&event);
        tracing::debug!(from = %event.from, to = %event.to, "transition");

        self.current = outcome.to;
        Some(StepResult {
            to: self.current.clone(),
            data: data.unwrap_or_else(|| input.clone()),
        })
    }

    /// Returns the machine to its empty condition, keeping only `name`.
    /// All subscriptions are torn down: the channel is closed (stale
    /// handles become inert) and replaced with a fresh one.
    pub fn clear(&mut self) {
        self.store.clear();
        self.current = NO_STATE.to_string();
        self.alphabet = None;
        self.initial_state = NO_STATE.to_string();
        self.initial_data = None;
        self.checksum = None;
        self.subscriptions.clear();
        self.channel.close();
        self.channel = EventChannel::new();
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_state(&self) -> &str {
        &self.current
    }

    pub fn num_states(&self) -> usize {
        self.store.state_count()
    }

    pub fn num_transitions(&self) -> usize {
        self.store.rule_count()
    }

    /// State names in insertion order.
    pub fn states(&self) -> &[String] {
        self.store.states()
    }

    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    /// Independent copy of the initial data; mutating it does not affect
    /// the machine.
    pub fn initial_data(&self) -> Option<Value> {
        self.initial_data.clone()
    }

    /// Independent copy of the alphabet.
    pub fn alphabet(&self) -> Option<Vec<String>> {
        self.alphabet.clone()
    }

    /// True if the current state carries an acceptance mark.
    pub fn is_acceptance(&self) -> bool {
        self.store.is_acceptance(&self.current)
    }

    /// Checksum of the last successfully loaded document.
    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new("")
    }
}
