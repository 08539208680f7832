//! A walk through annotation stacks running on the local scheduler.
//!
//! This example demonstrates:
//! - Declaring function tasks and binary-backed ones
//! - Stacking hooks and constraints onto the same task descriptor
//! - Transforming an argument through an asynchronous unit
//! - Inspecting what the scheduler received

use serde_json::json;
use std::sync::Arc;
use taskweave::prelude::*;

// ============================================================================
// Task Bodies
// ============================================================================

fn square() -> UserFunction {
    UserFunction::new(taskweave::signature!("demo.square(x)"), |inv| {
        let x = inv.require("x")?.as_i64().unwrap_or_default();
        Ok(json!(x * x))
    })
}

fn simulate() -> UserFunction {
    UserFunction::new(taskweave::signature!("demo.simulate(steps=10)"), |inv| {
        let steps = inv.arg("steps").and_then(ArgValue::as_i64).unwrap_or_default();
        Ok(json!(format!("simulated {steps} steps")))
    })
}

#[tokio::main]
async fn main() -> Result<(), TaskError> {
    println!("=== Taskweave: annotated tasks ===");

    let scheduler = Arc::new(LocalScheduler::new().with_max_computing_units(Some(8)));
    let runtime = Runtime::new(scheduler.clone());
    runtime.bootstrap(Scope::Master, false)?;

    // --- Example 1: A constrained task with a prolog ---
    println!("\n--- Example 1: constraint + prolog + task ---");
    let squared = AnnotationStack::new(&runtime)
        .with(Prolog::new(json!({"binary": "echo", "params": "preparing"}))?)
        .with(Constraint::new(json!({"computing_units": 2, "memory_size": 4}))?)
        .with(Task::new(json!({"returns": 1}))?)
        .apply(square());

    for x in 1..=3 {
        let out = squared.call(&runtime, Arguments::new().arg(x)).await?;
        println!("  square({x}) = {out}");
    }

    // --- Example 2: An MPI binary ---
    println!("\n--- Example 2: mpi + task ---");
    let simulation = AnnotationStack::new(&runtime)
        .with(Mpi::new(json!({
            "runner": "mpirun",
            "binary": "simulator",
            "processesPerNode": 4,
        }))?)
        .with(Task::new(json!({}))?)
        .apply(simulate());
    let out = simulation
        .call(&runtime, Arguments::new().kwarg("steps", 100))
        .await?;
    println!("  {out}");

    // --- Example 3: A transformed argument ---
    println!("\n--- Example 3: data transformation ---");
    let plus_one = TransformFn::inline(|v, _| Ok(json!(v.as_i64().unwrap_or_default() + 1)));
    let shifted = AnnotationStack::new(&runtime)
        .with(DataTransformation::new("x", plus_one))
        .with(Task::new(json!({}))?)
        .apply(square());
    let out = shifted.call(&runtime, Arguments::new().arg(4)).await?;
    println!("  square(4 + 1) = {out}");

    // --- What the scheduler saw ---
    println!("\nRegistrations:");
    for registration in scheduler.registrations() {
        let descriptor = &registration.descriptor;
        println!(
            "  {} -> {} {:?} constraints={:?} pending={:?}",
            registration.function,
            descriptor.impl_signature().unwrap_or_default(),
            descriptor.impl_type_args(),
            descriptor.constraints(),
            registration.pending,
        );
    }
    println!("Units submitted: {}", scheduler.units().len());

    runtime.teardown()?;
    println!("\n=== Done ===");
    Ok(())
}
