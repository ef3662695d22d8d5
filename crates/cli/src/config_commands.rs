use std::path::Path;

use {
    anyhow::Result,
    clap::Subcommand,
    pagewatch_config::PagewatchConfig,
    secrecy::Secret,
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the config file in use and the effective configuration.
    Show,
}

pub fn handle_config(
    explicit: Option<&Path>,
    config: &PagewatchConfig,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => show(explicit, config),
    }
}

fn show(explicit: Option<&Path>, config: &PagewatchConfig) -> Result<()> {
    let source = explicit
        .map(Path::to_path_buf)
        .or_else(pagewatch_config::find_config_file);
    match source {
        Some(path) => eprintln!("# config: {}", path.display()),
        None => eprintln!("# no config file found; showing defaults"),
    }
    eprintln!("# database: {}", config.database_url());
    eprintln!("# screenshots: {}\n", config.screenshots_folder().display());

    println!("{}", render(config)?);
    Ok(())
}

/// TOML rendering of `config` with the bot token masked.
fn render(config: &PagewatchConfig) -> Result<String> {
    let mut redacted = config.clone();
    if redacted.telegram.token.is_some() {
        redacted.telegram.token = Some(Secret::new("[REDACTED]".to_string()));
    }
    Ok(toml::to_string_pretty(&redacted)?)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_masks_token() {
        let mut config = PagewatchConfig::default();
        config.telegram.token = Some(Secret::new("123:very-secret".into()));
        config.telegram.chat_id = Some(7);

        let out = render(&config).unwrap();
        assert!(!out.contains("very-secret"));
        assert!(out.contains("[REDACTED]"));
        assert!(out.contains("max_concurrent_runs = 10"));
    }
}
