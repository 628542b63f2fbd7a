use core::time::Duration;

use rand::seq::IndexedRandom;

pub mod baidu;
pub mod douban;
pub mod puppeteer;

pub const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
];

/// How long to wait for the first matching element after navigation.
pub const RENDER_TIMEOUT: Duration = Duration::from_secs(20);

#[must_use]
pub fn pick_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Browser options shared by the collectors.
#[derive(Debug, Clone, clap::Args)]
pub struct BrowserArgs {
    /// Show the browser window
    #[arg(long)]
    pub no_headless: bool,
    /// Forward browser traffic through this proxy, e.g. `http://127.0.0.1:8080`
    #[arg(long, env = "PROXY_SERVER")]
    pub proxy: Option<String>,
}
