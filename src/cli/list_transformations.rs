// src/cli/list_transformations.rs
use super::CliError;
use crate::settings::io::load_or_default;
use crate::transformations::TransformationRegistry;

pub fn run() -> Result<(), CliError> {
    let settings = load_or_default();
    let registry = TransformationRegistry::with_builtins(&settings);

    println!("{:<24} {:<40} {:<30} {}", "Name", "Inputs", "Outputs", "Re-runnable");
    println!("{}", "-".repeat(110));
    for info in registry.list_available_transformations() {
        println!(
            "{:<24} {:<40} {:<30} {}",
            info.name,
            info.inputs.join(", "),
            info.outputs.join(", "),
            if info.idempotent { "yes" } else { "no" }
        );
        if !info.description.is_empty() {
            println!("    {}", info.description);
        }
    }
    Ok(())
}
