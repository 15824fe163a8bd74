//! Host Invocation Service: the seam between the interpreter and the
//! host platform's reflection layer. That layer itself — scanning
//! host classes/methods, marshaling values across the FFI boundary —
//! is out of scope; this module only
//! defines the *contract* the evaluator calls through, plus the
//! overload-ranking algorithm that picks among candidates the host
//! reports.

use crate::error::{RuntimeError, RuntimeResult};
use crate::value::{TypeDescriptor, Value};

/// A single host-side callable candidate, as reported by whatever
/// scans the host platform (out of scope here). Mirrors the shape of a
/// `DeclaredFunction` but with host-typed parameters instead of a
/// parse-tree body.
#[derive(Debug, Clone)]
pub struct Invocable {
    pub qualified_name: String,
    pub parameter_types: Vec<TypeDescriptor>,
    pub is_variadic: bool,
}

impl Invocable {
    fn accepts(&self, args: &[Value]) -> bool {
        if self.is_variadic {
            if args.len() < self.parameter_types.len().saturating_sub(1) {
                return false;
            }
        } else if args.len() != self.parameter_types.len() {
            return false;
        }
        self.parameter_types
            .iter()
            .zip(args.iter())
            .all(|(expected, actual)| type_accepts(expected, actual))
    }

    /// Number of parameters whose declared type exactly matches the
    /// argument's runtime type — used to break ties between candidates
    /// that both accept the call, so the most-specific match wins.
    fn specificity(&self, args: &[Value]) -> usize {
        self.parameter_types
            .iter()
            .zip(args.iter())
            .filter(|(expected, actual)| **expected == actual.type_descriptor())
            .count()
    }
}

fn type_accepts(expected: &TypeDescriptor, actual: &Value) -> bool {
    match expected {
        TypeDescriptor::None => matches!(actual, Value::None),
        _ => *expected == actual.type_descriptor(),
    }
}

/// Implemented by whatever maintains the live view of the host's
/// reflection surface; the runtime core only depends on this trait, not
/// on any concrete host-scanning mechanism. `Send + Sync` because an
/// `ExecutionEnv` forked for a spawned task carries its `Arc<dyn
/// HostInvocationService>` onto a fresh OS thread.
pub trait HostInvocationService: Send + Sync {
    fn candidates(&self, name: &str) -> Vec<Invocable>;
    fn invoke(&self, invocable: &Invocable, args: &[Value]) -> RuntimeResult<Value>;
    fn construct(&self, qualified_type: &str, args: &[Value]) -> RuntimeResult<Value>;
}

/// Resolves `name(args)` against every candidate the host reports for
/// that name: filters to candidates whose arity and parameter types
/// accept the call, ranks the survivors by specificity (an exact type
/// match beats one reached only by widening), and among a tie in
/// specificity picks the first in the order the host reported them:
/// exact matches win over widening, and ties resolve by source order
/// rather than an ambiguity error. `InvocableAmbiguous` is
/// reserved for the user-function overload path (`evaluator::expr`),
/// which has no type information to rank candidates by at all.
pub fn resolve_and_invoke(
    host: &dyn HostInvocationService,
    name: &str,
    args: &[Value],
) -> RuntimeResult<Value> {
    let candidates = host.candidates(name);
    let accepting: Vec<&Invocable> = candidates.iter().filter(|c| c.accepts(args)).collect();
    if accepting.is_empty() {
        return Err(RuntimeError::invocable_not_found(name, None));
    }
    // `Iterator::max_by_key` keeps the *last* maximal element on a tie;
    // source order requires the *first*, so the fold tracks it by hand.
    let mut best: Option<(&Invocable, usize)> = None;
    for c in &accepting {
        let score = c.specificity(args);
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((c, score));
        }
    }
    let (best, _) = best.expect("accepting is non-empty");
    host.invoke(best, args)
}

/// An explicit ordinal suffix (`name#2(args)`) selects a specific
/// overload by its position in the host's reported candidate list
/// instead of going through specificity ranking.
pub fn resolve_and_invoke_ordinal(
    host: &dyn HostInvocationService,
    name: &str,
    ordinal: usize,
    args: &[Value],
) -> RuntimeResult<Value> {
    let candidates = host.candidates(name);
    let chosen = candidates
        .get(ordinal)
        .ok_or_else(|| RuntimeError::invocable_not_found(format!("{}#{}", name, ordinal), None))?;
    host.invoke(chosen, args)
}

/// State of the host's reflection scan. The scan itself — walking
/// host classes/methods — is out of scope here; this only gates
/// readers of the tables it populates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Unbootstrapped,
    Scanning,
    Bootstrapped,
    Failed,
}

/// Publishes `BootstrapState` transitions and blocks readers while the
/// scan is in flight, publishing process-wide tables atomically only
/// after they're fully populated. A
/// `HostInvocationService` whose candidate tables are filled in by a
/// background scan can hold one of these and call `await_ready` before
/// answering `candidates`.
pub struct BootstrapGate {
    state: parking_lot::Mutex<BootstrapState>,
    ready: parking_lot::Condvar,
}

impl Default for BootstrapGate {
    fn default() -> Self {
        Self::new()
    }
}

impl BootstrapGate {
    pub fn new() -> Self {
        Self {
            state: parking_lot::Mutex::new(BootstrapState::Unbootstrapped),
            ready: parking_lot::Condvar::new(),
        }
    }

    pub fn state(&self) -> BootstrapState {
        *self.state.lock()
    }

    /// Marks the scan as started. Readers calling `await_ready` from
    /// this point block until `finish` is called.
    pub fn begin_scanning(&self) {
        *self.state.lock() = BootstrapState::Scanning;
    }

    /// Publishes the scan's outcome and wakes every blocked reader.
    pub fn finish(&self, succeeded: bool) {
        let mut guard = self.state.lock();
        *guard = if succeeded {
            BootstrapState::Bootstrapped
        } else {
            BootstrapState::Failed
        };
        self.ready.notify_all();
    }

    /// Blocks while the state is `Scanning`, then returns the resting
    /// state (`Unbootstrapped` if `begin_scanning` was never called,
    /// `Bootstrapped` or `Failed` otherwise).
    pub fn await_ready(&self) -> BootstrapState {
        let mut guard = self.state.lock();
        while *guard == BootstrapState::Scanning {
            self.ready.wait(&mut guard);
        }
        *guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct FakeHost {
        registered: Vec<Invocable>,
        invoked: RefCell<Vec<String>>,
    }

    impl HostInvocationService for FakeHost {
        fn candidates(&self, name: &str) -> Vec<Invocable> {
            self.registered
                .iter()
                .filter(|c| c.qualified_name.starts_with(name))
                .cloned()
                .collect()
        }

        fn invoke(&self, invocable: &Invocable, _args: &[Value]) -> RuntimeResult<Value> {
            self.invoked
                .borrow_mut()
                .push(invocable.qualified_name.clone());
            Ok(Value::int(1))
        }

        fn construct(&self, _qualified_type: &str, _args: &[Value]) -> RuntimeResult<Value> {
            unimplemented!()
        }
    }

    #[test]
    fn resolves_unique_candidate() {
        let host = FakeHost {
            registered: vec![Invocable {
                qualified_name: "len#List".into(),
                parameter_types: vec![TypeDescriptor::List],
                is_variadic: false,
            }],
            invoked: RefCell::new(vec![]),
        };
        let args = vec![Value::list(vec![])];
        let result = resolve_and_invoke(&host, "len", &args).unwrap();
        assert_eq!(result.to_string(), "1");
    }

    #[test]
    fn no_matching_candidate_is_not_found() {
        let host = FakeHost {
            registered: vec![],
            invoked: RefCell::new(vec![]),
        };
        let err = resolve_and_invoke(&host, "missing", &[]).unwrap_err();
        assert!(matches!(err, RuntimeError::InvocableNotFound { .. }));
    }

    #[test]
    fn equal_specificity_is_resolved_by_source_order() {
        let host = FakeHost {
            registered: vec![
                Invocable {
                    qualified_name: "show#A".into(),
                    parameter_types: vec![TypeDescriptor::Text],
                    is_variadic: false,
                },
                Invocable {
                    qualified_name: "show#B".into(),
                    parameter_types: vec![TypeDescriptor::Text],
                    is_variadic: false,
                },
            ],
            invoked: RefCell::new(vec![]),
        };
        let args = vec![Value::text("x")];
        resolve_and_invoke(&host, "show", &args).unwrap();
        assert_eq!(host.invoked.borrow().as_slice(), ["show#A"]);
    }

    #[test]
    fn exact_match_is_preferred_over_a_wider_candidate() {
        let host = FakeHost {
            registered: vec![
                Invocable {
                    qualified_name: "f#any".into(),
                    parameter_types: vec![TypeDescriptor::Number],
                    is_variadic: false,
                },
                Invocable {
                    qualified_name: "f#text".into(),
                    parameter_types: vec![TypeDescriptor::Text],
                    is_variadic: false,
                },
            ],
            invoked: RefCell::new(vec![]),
        };
        let args = vec![Value::text("x")];
        resolve_and_invoke(&host, "f", &args).unwrap();
        assert_eq!(host.invoked.borrow().as_slice(), ["f#text"]);
    }

    #[test]
    fn explicit_ordinal_picks_the_indexed_candidate() {
        let host = FakeHost {
            registered: vec![
                Invocable {
                    qualified_name: "show#A".into(),
                    parameter_types: vec![],
                    is_variadic: true,
                },
                Invocable {
                    qualified_name: "show#B".into(),
                    parameter_types: vec![],
                    is_variadic: true,
                },
            ],
            invoked: RefCell::new(vec![]),
        };
        resolve_and_invoke_ordinal(&host, "show", 1, &[]).unwrap();
        assert_eq!(host.invoked.borrow().as_slice(), ["show#B"]);
    }

    #[test]
    fn bootstrap_gate_starts_unbootstrapped() {
        let gate = BootstrapGate::new();
        assert_eq!(gate.state(), BootstrapState::Unbootstrapped);
    }

    #[test]
    fn bootstrap_gate_releases_readers_once_scanning_finishes() {
        let gate = std::sync::Arc::new(BootstrapGate::new());
        gate.begin_scanning();
        let waiter = {
            let gate = gate.clone();
            std::thread::spawn(move || gate.await_ready())
        };
        std::thread::sleep(std::time::Duration::from_millis(10));
        gate.finish(true);
        assert_eq!(waiter.join().unwrap(), BootstrapState::Bootstrapped);
    }

    #[test]
    fn bootstrap_gate_reports_failure_to_blocked_readers() {
        let gate = BootstrapGate::new();
        gate.begin_scanning();
        gate.finish(false);
        assert_eq!(gate.await_ready(), BootstrapState::Failed);
    }
}
