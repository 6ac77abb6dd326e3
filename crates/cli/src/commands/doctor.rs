//! `policy-agent doctor`: diagnose configuration and credentials.

use policy_agent_config::{AppConfig, CredentialStatus};
use std::path::Path;

pub fn run(config_path: &Path, config: &AppConfig) {
    println!("🩺 Policy Agent Doctor: System Diagnostics");
    println!("=========================================\n");

    let mut issues = 0;

    if config_path.exists() {
        println!("  ✅ Config file: {}", config_path.display());
    } else {
        println!("  ℹ️  No config file at {}, using defaults", config_path.display());
    }

    println!("  ✅ Model: {} at {}", config.llm.model, config.llm.base_url);
    println!();

    for credential in config.credential_report() {
        let (icon, label) = match credential.status {
            CredentialStatus::Configured => ("✅", "configured"),
            CredentialStatus::Missing if credential.required => ("❌", "missing"),
            CredentialStatus::Missing => ("⚠️ ", "missing"),
            CredentialStatus::Placeholder => ("⚠️ ", "placeholder value"),
        };
        if credential.status != CredentialStatus::Configured && credential.required {
            issues += 1;
        }
        println!(
            "  {icon} {:<18} {label:<18} ({})",
            credential.env_var, credential.used_by
        );
    }

    println!();
    match policy_agent_tools::default_registry(config) {
        Ok(registry) => println!("  ✅ Tools registered: {}", registry.names().join(", ")),
        Err(e) => {
            println!("  ❌ Tool registration failed: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 Ready to chat!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. Set the missing values in .env or the config file.");
    }
}
