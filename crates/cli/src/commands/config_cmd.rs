//! `policy-agent config`: configuration inspection commands.

use policy_agent_config::AppConfig;

const REDACTED: &str = "********";

/// The loaded config with every secret masked.
fn redacted(config: &AppConfig) -> AppConfig {
    let mask = |value: &mut Option<String>| {
        if value.is_some() {
            *value = Some(REDACTED.to_string());
        }
    };

    let mut config = config.clone();
    mask(&mut config.llm.api_key);
    mask(&mut config.translate.secret_key);
    mask(&mut config.email.password);
    config
}

pub fn show(config: &AppConfig) -> anyhow::Result<()> {
    println!("{}", toml::to_string_pretty(&redacted(config))?);
    Ok(())
}

pub fn defaults() {
    println!("{}", AppConfig::default_toml());
}

pub fn path() {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains(".policy-agent"));
    }

    #[test]
    fn show_masks_secrets() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("sk-live".into());
        config.email.password = Some("auth-code".into());

        let text = toml::to_string_pretty(&redacted(&config)).unwrap();
        assert!(!text.contains("sk-live"));
        assert!(!text.contains("auth-code"));
        assert!(text.contains(REDACTED));
    }
}
