//! Shared black-box test harness: a minimal host exposing just enough
//! built-ins (`sleep`, `divide`) to drive the end-to-end scenarios
//! without a parser or a real standard library in front of the
//! evaluator.

use qalam_core::{
    registry, ContextId, ExecutionEnv, ExecutionStats, HostInvocationService, Invocable,
    RuntimeConfig, RuntimeError, RuntimeResult, Value,
};
use std::sync::Arc;
use std::time::Duration;

pub struct ScenarioHost;

impl HostInvocationService for ScenarioHost {
    fn candidates(&self, name: &str) -> Vec<Invocable> {
        match name {
            "sleep" => vec![Invocable {
                qualified_name: "sleep".into(),
                parameter_types: vec![qalam_core::Value::int(0).type_descriptor()],
                is_variadic: false,
            }],
            "divide" => vec![Invocable {
                qualified_name: "divide".into(),
                parameter_types: vec![
                    Value::int(0).type_descriptor(),
                    Value::int(0).type_descriptor(),
                ],
                is_variadic: false,
            }],
            _ => vec![],
        }
    }

    fn invoke(&self, invocable: &Invocable, args: &[Value]) -> RuntimeResult<Value> {
        match invocable.qualified_name.as_str() {
            "sleep" => {
                let millis = match &args[0] {
                    Value::Number(n) => n.as_f64() as u64,
                    other => {
                        return Err(RuntimeError::type_mismatch(
                            format!("sleep expects a number, got {:?}", other.type_descriptor()),
                            None,
                        ))
                    }
                };
                std::thread::sleep(Duration::from_millis(millis));
                Ok(Value::None)
            }
            "divide" => {
                let (a, b) = match (&args[0], &args[1]) {
                    (Value::Number(a), Value::Number(b)) => (a.clone(), b.clone()),
                    _ => {
                        return Err(RuntimeError::type_mismatch(
                            "divide expects two numbers",
                            None,
                        ))
                    }
                };
                a.div(&b)
                    .map(Value::Number)
                    .ok_or_else(|| RuntimeError::division_by_zero(None))
            }
            other => Err(RuntimeError::invocable_not_found(other, None)),
        }
    }

    fn construct(&self, qualified_type: &str, _args: &[Value]) -> RuntimeResult<Value> {
        Err(RuntimeError::invocable_not_found(qualified_type, None))
    }
}

/// A fresh root context plus an `ExecutionEnv` over it, wired to
/// `ScenarioHost`. Every scenario test builds its own `Node` tree by
/// hand and drives it through `qalam_core::eval`/`eval_program`.
pub fn scenario_env() -> (ContextId, ExecutionEnv) {
    let root = registry::register(None);
    let env = ExecutionEnv::new(
        root,
        Arc::new(RuntimeConfig::default()),
        Arc::new(ExecutionStats::new()),
        Arc::new(ScenarioHost),
    );
    (root, env)
}
