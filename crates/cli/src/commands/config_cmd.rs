//! `ragent config`: Configuration management commands.

use ragent_config::AppConfig;
use std::path::Path;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ok  Config parsed and validated");

            let mut warnings = Vec::new();
            if !config.has_api_key() {
                warnings.push("No API key set (set RAGENT_API_KEY or OPENAI_API_KEY)");
            }
            if let Some(path) = &config.retrieval.corpus_path {
                if !path.exists() {
                    warnings.push("retrieval.corpus_path does not exist");
                }
            }
            if config
                .tools
                .enabled
                .as_ref()
                .is_some_and(|names| !names.iter().any(|n| n == "result"))
            {
                warnings.push("tools.enabled omits `result`; the model can only answer with a response block");
            }

            for w in &warnings {
                println!("   warn  {w}");
            }

            println!();
            println!("   Endpoint:    {}", config.api_url);
            println!("   Model:       {}", config.generation.model);
            println!("   Grammar:     {:?}", config.agent_loop.grammar);
            println!("   Iterations:  {}", config.agent_loop.max_iterations);
            println!("   Token budget: {}", config.budget.max_tokens);
        }
        Err(e) => {
            println!("   error  {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.api_key.is_some() {
        config.api_key = Some("[REDACTED]".into());
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

pub async fn init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    write_default(&config_path, force)?;
    println!("Wrote {}", config_path.display());
    Ok(())
}

fn write_default(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains("config.toml"));
    }

    #[test]
    fn init_writes_loadable_defaults_once() {
        let dir = std::env::temp_dir().join(format!("ragent-cli-{}", std::process::id()));
        let path = dir.join("config.toml");

        write_default(&path, false).unwrap();
        assert!(write_default(&path, false).is_err());
        write_default(&path, true).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.agent_loop.max_iterations, 10);
        std::fs::remove_dir_all(&dir).ok();
    }
}
