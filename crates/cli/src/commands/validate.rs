use std::collections::BTreeSet;
use std::path::Path;

use toolplan_core::{ArgValue, Plan};

use crate::commands::{plan_error_class, read_plan, CommandResult};

pub fn run(plan_path: &Path) -> CommandResult {
    let plan = match read_plan(plan_path) {
        Ok(plan) => plan,
        Err(error) => {
            return CommandResult::failure(
                "validate",
                plan_error_class(&error),
                format!("{error:#}"),
                4,
            );
        }
    };

    if let Some(message) = first_unbound_reference(&plan) {
        return CommandResult::failure("validate", "reference_not_found", message, 4);
    }

    let bindings: Vec<&str> = plan.bindings().collect();
    let binds = if bindings.is_empty() { "none".to_string() } else { bindings.join(", ") };
    CommandResult::success(
        "validate",
        format!("plan is valid: {} step(s), binds {binds}", plan.len()),
    )
}

/// A reference is unbound when no earlier step saves under its name.
fn first_unbound_reference(plan: &Plan) -> Option<String> {
    let mut bound: BTreeSet<&str> = BTreeSet::new();

    for (offset, step) in plan.steps.iter().enumerate() {
        for (arg, value) in &step.args {
            if let ArgValue::Reference(reference) = value {
                if !bound.contains(reference.name()) {
                    return Some(format!(
                        "step {} ({}) arg '{arg}': variable '{}' is not bound by an earlier step",
                        offset + 1,
                        step.tool,
                        reference.name()
                    ));
                }
            }
        }
        if let Some(name) = step.binding_name() {
            bound.insert(name);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use toolplan_core::Plan;

    use super::first_unbound_reference;

    #[test]
    fn references_to_earlier_bindings_are_accepted() {
        let plan = Plan::from_json_str(
            r#"{"steps": [
                {"tool": "get_id", "save_as": "id"},
                {"tool": "list_items", "args": {"compartment_id": "$id.value", "limit": 5}}
            ]}"#,
        )
        .expect("plan should parse");

        assert_eq!(first_unbound_reference(&plan), None);
    }

    #[test]
    fn forward_and_self_references_are_reported() {
        let forward = Plan::from_json_str(
            r#"{"steps": [
                {"tool": "list_items", "args": {"compartment_id": "$id"}},
                {"tool": "get_id", "save_as": "id"}
            ]}"#,
        )
        .expect("plan should parse");
        let message = first_unbound_reference(&forward).expect("forward reference is unbound");
        assert!(message.contains("step 1 (list_items)"));
        assert!(message.contains("variable 'id'"));

        let self_ref = Plan::from_json_str(
            r#"{"steps": [{"tool": "echo", "args": {"value": "$x"}, "save_as": "x"}]}"#,
        )
        .expect("plan should parse");
        assert!(first_unbound_reference(&self_ref).is_some());
    }
}
