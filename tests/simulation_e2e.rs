use std::sync::Arc;

use paramscope::{
    resolve_context, ComponentType, Composition, ContextFlags, ExecutionContext, ExecutionId, ExecutionTime,
    LogCondition, ParameterAttrs, StoreError, Value,
};

struct Controller {
    id: ExecutionId,
}

impl Composition for Controller {
    fn name(&self) -> &str {
        "controller"
    }

    fn default_execution_id(&self) -> ExecutionId {
        self.id.clone()
    }

    fn execution_time(&self, _context: &ExecutionContext) -> Option<ExecutionTime> {
        Some(ExecutionTime::new(1, 2, 0, 3))
    }
}

fn accumulator() -> Arc<ComponentType> {
    ComponentType::builder("Accumulator")
        .declare(
            "value",
            ParameterAttrs::new(0.0)
                .history_max_length(2)
                .log_condition(LogCondition::EXECUTION),
        )
        .declare("trace", ParameterAttrs::new(0).retain_old_simulation_data(true))
        .declare("seed", ParameterAttrs::new(42).stateful(false))
        .build()
        .unwrap()
}

#[test]
fn simulate_then_discard_leaves_base_untouched() {
    let mech = accumulator().instantiate("acc").unwrap();
    let base = ExecutionContext::builder()
        .execution_id("base")
        .execution_phase(ContextFlags::PROCESSING)
        .source(ContextFlags::COMPOSITION)
        .build()
        .unwrap();
    mech.set("value", 1.0, &base).unwrap();
    mech.set("value", 2.0, &base).unwrap();
    let before = mech.snapshot(&base).unwrap();

    let branch = mech.fork_context(&base, ExecutionId::derived(&ExecutionId::from("base"), "sim-0")).unwrap();
    assert!(branch.is_simulation());
    assert_eq!(branch.execution_phase(), ContextFlags::PROCESSING | ContextFlags::SIMULATION);
    assert_eq!(mech.get("value", &branch).unwrap(), Some(Value::Float(2.0)));
    assert_eq!(mech.get_previous("value", &branch, 1).unwrap(), Some(Value::Float(1.0)));

    mech.set("value", 10.0, &branch).unwrap();
    mech.set("trace", 7, &branch).unwrap();

    let after = mech.snapshot(&base).unwrap();
    assert_eq!(before.digest().unwrap(), after.digest().unwrap());

    mech.discard_context(&branch).unwrap();
    assert_eq!(mech.get("value", &branch).unwrap(), None);
    assert_eq!(mech.get("trace", &branch).unwrap(), Some(Value::Int(7)));
    assert_eq!(mech.get("value", &base).unwrap(), Some(Value::Float(2.0)));
}

#[test]
fn derived_branch_ids_are_deterministic() {
    let base = ExecutionId::from("base");
    assert_eq!(ExecutionId::derived(&base, "sim-0"), ExecutionId::derived(&base, "sim-0"));
    assert_ne!(ExecutionId::derived(&base, "sim-0"), ExecutionId::derived(&base, "sim-1"));
}

#[test]
fn non_stateful_slot_is_shared_across_branches() {
    let mech = accumulator().instantiate("acc").unwrap();
    let base = ExecutionContext::new("base");
    let branch = mech.fork_context(&base, "branch").unwrap();

    mech.set("seed", 7, &branch).unwrap();
    assert_eq!(mech.get("seed", &base).unwrap(), Some(Value::Int(7)));
}

#[test]
fn composition_candidate_resolves_to_default_execution_id() {
    let controller: Arc<dyn Composition> = Arc::new(Controller {
        id: ExecutionId::from("controller-run"),
    });
    let mech = accumulator().instantiate("acc").unwrap();

    mech.set("value", 3.0, &controller).unwrap();
    assert_eq!(mech.get("value", "controller-run").unwrap(), Some(Value::Float(3.0)));

    let ctx = resolve_context(&controller, ContextFlags::COMMAND_LINE, ContextFlags::IDLE).unwrap();
    assert_eq!(ctx.log_time(), ExecutionTime::new(1, 2, 0, 3));
    assert!(ctx.require_composition("simulate").is_ok());
    assert!(ExecutionContext::new("bare").require_composition("simulate").is_err());
}

#[test]
fn log_entries_carry_scheduler_time() {
    let controller: Arc<dyn Composition> = Arc::new(Controller {
        id: ExecutionId::from("run"),
    });
    let ctx = ExecutionContext::builder()
        .execution_id("run")
        .execution_phase(ContextFlags::PROCESSING)
        .source(ContextFlags::COMPOSITION)
        .composition(&controller)
        .build()
        .unwrap();
    let mech = accumulator().instantiate("acc").unwrap();
    mech.set("value", 1.5, &ctx).unwrap();

    let entries = mech.log_entries("value", &ctx).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].as_tuple().0, ExecutionTime::new(1, 2, 0, 3));
}

#[test]
fn snapshot_json_roundtrip_and_digest() {
    let mech = accumulator().instantiate("acc").unwrap();
    let ctx = ExecutionContext::new("A");
    mech.set("value", 0.25, &ctx).unwrap();

    let snap = mech.snapshot(&ctx).unwrap();
    assert_eq!(snap.values.get("value"), Some(&Value::Float(0.25)));
    assert_eq!(snap.values.get("seed"), Some(&Value::Int(42)));
    assert!(!snap.values.contains_key("trace"));

    let json = snap.to_json_pretty().unwrap();
    let decoded = paramscope::ContextSnapshot::from_json(&json).unwrap();
    assert_eq!(decoded.digest().unwrap(), snap.digest().unwrap());

    let err = paramscope::ContextSnapshot::from_json("not json").unwrap_err();
    assert!(matches!(err, StoreError::Serialization { .. }));
}

#[test]
fn duplicated_component_gets_independent_owned_values() {
    let mech = accumulator().instantiate("acc").unwrap();
    let ctx = ExecutionContext::new("A");
    mech.set("value", 1.0, &ctx).unwrap();

    let copy = mech.duplicate("acc-copy");
    copy.set("value", 5.0, &ctx).unwrap();
    assert_eq!(mech.get("value", &ctx).unwrap(), Some(Value::Float(1.0)));
    assert_eq!(copy.get("value", &ctx).unwrap(), Some(Value::Float(5.0)));
    assert_eq!(copy.get_previous("value", &ctx, 1).unwrap(), Some(Value::Float(1.0)));
}
