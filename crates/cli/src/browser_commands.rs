//! CLI subcommands for the capture browser.

use {anyhow::Result, clap::Subcommand, pagewatch_config::PagewatchConfig};

#[derive(Subcommand)]
pub enum BrowserAction {
    /// Show browser configuration and whether Chromium was found.
    Status,
}

pub fn handle_browser(config: &PagewatchConfig, action: BrowserAction) -> Result<()> {
    match action {
        BrowserAction::Status => status(config),
    }
}

fn status(config: &PagewatchConfig) -> Result<()> {
    let browser = &config.browser;

    println!("Browser configuration:");
    println!("  headless:       {}", browser.headless);
    println!(
        "  viewport:       {}x{}",
        browser.viewport_width, browser.viewport_height
    );
    println!("  full_page:      {}", browser.full_page);
    println!("  timeout:        {}ms", browser.navigation_timeout_ms);

    if let Some(ref path) = browser.chrome_path {
        println!("  chrome_path:    {path}");
    } else {
        println!("  chrome_path:    (auto-detect)");
    }

    match pagewatch_browser::detect::detect_browser(browser.chrome_path.as_deref()) {
        Ok(path) => println!("  detected:       {}", path.display()),
        Err(e) => {
            eprintln!("\n{e}");
            std::process::exit(1);
        },
    }
    Ok(())
}
