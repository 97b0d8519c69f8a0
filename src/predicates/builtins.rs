//! Built-in predicate functions.
//!
//! Spatial relations (`in`, `on`, `up`), articulation checks (`open`,
//! `close`, `turnon`, `turnoff`), grasp checks (`grasp`, `grasptolerant`,
//! `nograsp`), the `true`/`false` constants, and the `printjointstate`
//! diagnostic.

use tracing::info;

use crate::error::PredicateError;
use crate::predicates::{PredicateFn, PredicateRegistry};
use crate::states::EntityState;

/// Registers every built-in predicate into `registry`.
pub fn register_builtins(registry: &mut PredicateRegistry) {
    registry.register("true", Box::new(TruePredicate));
    registry.register("false", Box::new(FalsePredicate));
    registry.register("in", Box::new(In));
    registry.register("on", Box::new(On));
    registry.register("up", Box::new(Up));
    registry.register("open", Box::new(Open));
    registry.register("close", Box::new(Close));
    registry.register("turnon", Box::new(TurnOn));
    registry.register("turnoff", Box::new(TurnOff));
    registry.register("grasp", Box::new(Grasp));
    registry.register("grasptolerant", Box::new(GraspTolerant));
    registry.register("nograsp", Box::new(NoGrasp));
    registry.register("printjointstate", Box::new(PrintJointState));
}

struct TruePredicate;

impl PredicateFn for TruePredicate {
    fn arity(&self) -> Option<usize> {
        None
    }
    fn eval(&self, _args: &[&EntityState]) -> Result<bool, PredicateError> {
        Ok(true)
    }
}

struct FalsePredicate;

impl PredicateFn for FalsePredicate {
    fn arity(&self) -> Option<usize> {
        None
    }
    fn eval(&self, _args: &[&EntityState]) -> Result<bool, PredicateError> {
        Ok(false)
    }
}

/// `(in a b)`: a's position lies inside b's bounds.
struct In;

impl PredicateFn for In {
    fn arity(&self) -> Option<usize> {
        Some(2)
    }
    fn eval(&self, args: &[&EntityState]) -> Result<bool, PredicateError> {
        args[1].check_contain(args[0])
    }
}

/// `(on a b)`: a rests on top of b.
struct On;

impl PredicateFn for On {
    fn arity(&self) -> Option<usize> {
        Some(2)
    }
    fn eval(&self, args: &[&EntityState]) -> Result<bool, PredicateError> {
        args[1].check_ontop(args[0])
    }
}

/// `(up a)`: a's local up axis is aligned with world up.
struct Up;

impl PredicateFn for Up {
    fn arity(&self) -> Option<usize> {
        Some(1)
    }
    fn eval(&self, args: &[&EntityState]) -> Result<bool, PredicateError> {
        args[0].is_upright()
    }
}

struct Open;

impl PredicateFn for Open {
    fn arity(&self) -> Option<usize> {
        Some(1)
    }
    fn eval(&self, args: &[&EntityState]) -> Result<bool, PredicateError> {
        args[0].is_open()
    }
}

struct Close;

impl PredicateFn for Close {
    fn arity(&self) -> Option<usize> {
        Some(1)
    }
    fn eval(&self, args: &[&EntityState]) -> Result<bool, PredicateError> {
        args[0].is_close()
    }
}

struct TurnOn;

impl PredicateFn for TurnOn {
    fn arity(&self) -> Option<usize> {
        Some(1)
    }
    fn eval(&self, args: &[&EntityState]) -> Result<bool, PredicateError> {
        args[0].turn_on()
    }
}

struct TurnOff;

impl PredicateFn for TurnOff {
    fn arity(&self) -> Option<usize> {
        Some(1)
    }
    fn eval(&self, args: &[&EntityState]) -> Result<bool, PredicateError> {
        args[0].turn_off()
    }
}

/// `(grasp a)`: the gripper holds a (default geometry set).
struct Grasp;

impl PredicateFn for Grasp {
    fn arity(&self) -> Option<usize> {
        Some(1)
    }
    fn eval(&self, args: &[&EntityState]) -> Result<bool, PredicateError> {
        args[0].check_grasp()
    }
}

/// `(grasptolerant a)`: grasp check over alternate finger-geometry subsets,
/// for slippery or irregular geometry.
struct GraspTolerant;

impl PredicateFn for GraspTolerant {
    fn arity(&self) -> Option<usize> {
        Some(1)
    }
    fn eval(&self, args: &[&EntityState]) -> Result<bool, PredicateError> {
        args[0].check_grasp_tolerant()
    }
}

/// `(nograsp a)`: no finger-geometry subset holds a.
struct NoGrasp;

impl PredicateFn for NoGrasp {
    fn arity(&self) -> Option<usize> {
        Some(1)
    }
    fn eval(&self, args: &[&EntityState]) -> Result<bool, PredicateError> {
        Ok(!args[0].check_grasp_tolerant()?)
    }
}

/// Diagnostic predicate: logs the entity's joint state and always holds.
/// Useful when tuning articulation thresholds in a task file; not a check.
struct PrintJointState;

impl PredicateFn for PrintJointState {
    fn arity(&self) -> Option<usize> {
        Some(1)
    }
    fn eval(&self, args: &[&EntityState]) -> Result<bool, PredicateError> {
        match args[0].joint_state() {
            Ok(joints) => info!(entity = args[0].name(), ?joints, "joint state"),
            Err(err) => info!(entity = args[0].name(), %err, "joint state unavailable"),
        }
        Ok(true)
    }
}
