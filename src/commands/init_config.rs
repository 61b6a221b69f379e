use anyhow::Result;
use eventmap_core::AppConfig;
use owo_colors::OwoColorize;

pub fn run(force: bool) -> Result<()> {
    let config_path = AppConfig::config_path()?;

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}\n\n\
            Use --force to overwrite it.",
            config_path.display()
        );
    }

    AppConfig::create_default_config(&config_path)?;
    tracing::info!(path = %config_path.display(), "wrote default config");
    println!("{} {}", "Wrote".green(), config_path.display());

    Ok(())
}
