//! `policy-agent tools`: list the registered tools in presentation order.

use policy_agent_config::AppConfig;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    let registry = policy_agent_tools::default_registry(config)?;

    for (i, spec) in registry.list_specs().into_iter().enumerate() {
        println!("{}. {}", i + 1, spec.name);
        println!("   {}", spec.description);
        for param in &spec.params {
            let required = if param.required { "required" } else { "optional" };
            println!(
                "   - {} ({}, {required}): {}",
                param.name,
                param.param_type.json_type(),
                param.description
            );
        }
        println!();
    }
    Ok(())
}
