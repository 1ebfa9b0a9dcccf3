use crate::Config;
use anyhow::Result;
use std::path::Path;

pub fn run(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Pass --force to overwrite it.",
            path.display()
        );
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let content = Config::default().to_toml()?;
    std::fs::write(path, content)?;

    tracing::info!("Created webhook configuration at {:?}", path);
    tracing::info!("Run 'webhook-events serve' to start the dispatcher");

    Ok(())
}
