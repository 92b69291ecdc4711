//! Edge predicate language
//!
//! Conditional edges carry a predicate as free text. Predicates are compiled
//! into a closed expression tree and interpreted against the run state; there
//! is no path from a predicate to anything beyond state values and the
//! builtin functions `len`, `exists`, `lower`, `upper` and `matches`.
//!
//! ```text
//! "state['anomaly_count'] > 0"
//!         │
//!         ▼  lexer::tokenize
//! [Ident(state), LBracket, Str(anomaly_count), RBracket, Gt, Int(0)]
//!         │
//!         ▼  parser::parse
//! Binary(Gt, Index(State, "anomaly_count"), Literal(0))
//!         │
//!         ▼  ConditionEvaluator::evaluate(&state)
//! true / false
//! ```
//!
//! Every failure (syntax error, missing key, type mismatch) makes the
//! predicate evaluate to `false`. The error is logged, never propagated.

pub mod lexer;
pub mod parser;

mod eval;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::state::{is_truthy, State};
use eval::{Interpreter, RegexCache};
use parser::Expr;

/// Why a predicate could not be compiled or evaluated
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConditionError {
    #[error("predicate is empty")]
    Empty,

    #[error("unexpected character '{ch}' at {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unterminated string starting at {pos}")]
    UnterminatedString { pos: usize },

    #[error("invalid number: {0}")]
    InvalidNumber(String),

    #[error("unexpected token '{found}' at {pos}")]
    UnexpectedToken { found: String, pos: usize },

    #[error("unexpected end of predicate")]
    UnexpectedEnd,

    #[error("predicate is {len} bytes, limit is {limit}")]
    TooLong { len: usize, limit: usize },

    #[error("predicate nests deeper than {limit} levels")]
    TooDeep { limit: usize },

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("{func}() takes {expected} argument(s), got {found}")]
    Arity {
        func: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("key not found: {0}")]
    MissingKey(String),

    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("unsupported operand types for {op}: {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic result is not a finite number")]
    NonFinite,

    #[error("invalid regex: {0}")]
    InvalidRegex(String),
}

impl ConditionError {
    /// Errors raised before any state is consulted
    pub fn is_syntax(&self) -> bool {
        matches!(
            self,
            ConditionError::Empty
                | ConditionError::UnexpectedChar { .. }
                | ConditionError::UnterminatedString { .. }
                | ConditionError::InvalidNumber(_)
                | ConditionError::UnexpectedToken { .. }
                | ConditionError::UnexpectedEnd
                | ConditionError::TooLong { .. }
                | ConditionError::TooDeep { .. }
                | ConditionError::UnknownFunction(_)
                | ConditionError::Arity { .. }
        )
    }
}

pub type ConditionResult<T> = std::result::Result<T, ConditionError>;

/// Compile a predicate without evaluating it
pub fn compile(predicate: &str) -> ConditionResult<Expr> {
    parser::parse(predicate)
}

/// Compiled predicates kept per evaluator
pub const PREDICATE_CACHE_CAPACITY: usize = 1024;

/// Evaluates edge predicates, caching compiled expressions by source text.
///
/// The cache holds at most [`PREDICATE_CACHE_CAPACITY`] predicates; an
/// arbitrary entry is evicted to make room.
pub struct ConditionEvaluator {
    compiled: RwLock<HashMap<String, Arc<Expr>>>,
    capacity: usize,
    regexes: RegexCache,
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::with_capacity(PREDICATE_CACHE_CAPACITY)
    }
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            compiled: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            regexes: RegexCache::default(),
        }
    }

    /// Evaluate `predicate` against `state`; any error yields `false`
    pub fn evaluate(&self, predicate: &str, state: &State) -> bool {
        match self.try_evaluate(predicate, state) {
            Ok(result) => result,
            Err(e) => {
                warn!(predicate = %predicate, error = %e, "Condition evaluation failed, treating as false");
                false
            }
        }
    }

    /// Evaluate `predicate`, surfacing the error instead of collapsing it
    pub fn try_evaluate(&self, predicate: &str, state: &State) -> ConditionResult<bool> {
        let expr = self.compiled_expr(predicate)?;
        let interpreter = Interpreter {
            state,
            regexes: &self.regexes,
        };
        let value = interpreter.eval(&expr)?;
        let result = is_truthy(&value);
        debug!(predicate = %predicate, result, "Condition evaluated");
        Ok(result)
    }

    fn compiled_expr(&self, predicate: &str) -> ConditionResult<Arc<Expr>> {
        if let Some(expr) = self.compiled.read().get(predicate) {
            return Ok(Arc::clone(expr));
        }
        let expr = Arc::new(parser::parse(predicate)?);
        let mut compiled = self.compiled.write();
        if compiled.len() >= self.capacity && !compiled.contains_key(predicate) {
            if let Some(victim) = compiled.keys().next().cloned() {
                compiled.remove(&victim);
            }
        }
        compiled.insert(predicate.to_string(), Arc::clone(&expr));
        Ok(expr)
    }

    /// Number of compiled predicates currently cached
    pub fn cached(&self) -> usize {
        self.compiled.read().len()
    }

    /// Number of compiled regex patterns currently cached
    pub fn cached_regexes(&self) -> usize {
        self.regexes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::from_value;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_evaluate_true_and_false() {
        let evaluator = ConditionEvaluator::new();
        let state = from_value(json!({"anomaly_count": 3}));

        assert!(evaluator.evaluate("state['anomaly_count'] > 0", &state));
        assert!(evaluator.evaluate("anomaly_count > 0", &state));
        assert!(!evaluator.evaluate("anomaly_count == 0", &state));
    }

    #[test]
    fn test_errors_evaluate_to_false() {
        let evaluator = ConditionEvaluator::new();
        let state = from_value(json!({"x": "text"}));

        assert!(!evaluator.evaluate("missing > 1", &state));
        assert!(!evaluator.evaluate("x > 1", &state));
        assert!(!evaluator.evaluate("x >", &state));
        assert!(!evaluator.evaluate("", &state));
        assert!(!evaluator.evaluate("__import__('os').system('true')", &state));
    }

    #[test]
    fn test_try_evaluate_reports_error() {
        let evaluator = ConditionEvaluator::new();
        let err = evaluator.try_evaluate("count >= 1", &State::new()).unwrap_err();
        assert_eq!(err, ConditionError::MissingKey("count".into()));
        assert!(!err.is_syntax());
        assert!(compile("count >=").unwrap_err().is_syntax());
    }

    #[test]
    fn test_non_boolean_results_use_truthiness() {
        let evaluator = ConditionEvaluator::new();
        let state = from_value(json!({"items": [1], "empty": []}));

        assert!(evaluator.evaluate("items", &state));
        assert!(!evaluator.evaluate("empty", &state));
        assert!(!evaluator.evaluate("None", &state));
    }

    #[test]
    fn test_compiled_predicates_are_cached() {
        let evaluator = ConditionEvaluator::new();
        let state = from_value(json!({"x": 1}));

        evaluator.evaluate("x == 1", &state);
        evaluator.evaluate("x == 1", &state);
        evaluator.evaluate("x == 2", &state);
        assert_eq!(evaluator.cached(), 2);
    }

    #[test]
    fn test_deeply_nested_predicates_evaluate_to_false() {
        let evaluator = ConditionEvaluator::new();
        let state = from_value(json!({"x": true}));

        let parens = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(!evaluator.evaluate(&parens, &state));
        let nots = format!("{}x", "not ".repeat(10_000));
        assert!(!evaluator.evaluate(&nots, &state));
        let nots = format!("{}x", "not ".repeat(1_000));
        let err = evaluator.try_evaluate(&nots, &state).unwrap_err();
        assert!(err.is_syntax());
        assert_eq!(evaluator.cached(), 0);
    }

    #[test]
    fn test_predicate_cache_is_bounded() {
        let evaluator = ConditionEvaluator::with_capacity(8);
        let state = from_value(json!({"x": 1}));

        for i in 0..100 {
            assert!(!evaluator.evaluate(&format!("x == {}", i + 2), &state));
        }
        assert_eq!(evaluator.cached(), 8);
        assert!(evaluator.evaluate("x == 1", &state));
    }

    #[test]
    fn test_patterns_from_state_are_not_cached() {
        let evaluator = ConditionEvaluator::new();

        for i in 0..500 {
            let state = from_value(json!({"s": format!("id-{}", i), "p": format!("^id-{}$", i)}));
            assert!(evaluator.evaluate("matches(s, p)", &state));
        }
        assert_eq!(evaluator.cached(), 1);
        assert_eq!(evaluator.cached_regexes(), 0);

        let state = from_value(json!({"s": "id-7"}));
        assert!(evaluator.evaluate("matches(s, '^id-[0-9]+$')", &state));
        assert!(evaluator.evaluate("matches(s, '^id-[0-9]+$')", &state));
        assert_eq!(evaluator.cached_regexes(), 1);
    }

    proptest! {
        #[test]
        fn prop_arbitrary_predicates_never_panic(source in "\\PC{0,40}", x in any::<i64>()) {
            let evaluator = ConditionEvaluator::new();
            let state = from_value(json!({"x": x, "s": "abc", "l": [1, 2, 3]}));
            let _ = evaluator.evaluate(&source, &state);
        }

        #[test]
        fn prop_grammar_shaped_predicates_never_panic(
            left in prop::sample::select(vec!["x", "state.x", "len(l)", "l[0]", "s", "-x", "x % 7"]),
            op in prop::sample::select(vec!["==", "!=", "<", "<=", ">", ">=", "in", "+", "*", "/", "and", "or"]),
            right in prop::sample::select(vec!["0", "1.5", "'abc'", "[1, 2]", "x", "True", "None"]),
            x in any::<i64>(),
        ) {
            let evaluator = ConditionEvaluator::new();
            let state = from_value(json!({"x": x, "s": "abc", "l": [1, 2, 3]}));
            let source = format!("{} {} {}", left, op, right);
            let _ = evaluator.evaluate(&source, &state);
        }
    }
}
