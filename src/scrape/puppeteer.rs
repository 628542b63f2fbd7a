use std::{borrow::Cow, ffi::OsStr, sync::Arc, time::Duration};

use headless_chrome::{Browser, LaunchOptions, Tab, browser::tab::NoElementFound};
use tokio::{
    task::spawn_blocking,
    time::{Instant, sleep},
};

use super::{BrowserArgs, RENDER_TIMEOUT, pick_user_agent};

pub fn puppeteer(headless: bool, proxy: Option<&str>) -> anyhow::Result<Browser> {
    Browser::new(LaunchOptions {
        args: vec![OsStr::new("--disable-blink-features=AutomationControlled")],
        headless,
        proxy_server: proxy,
        ..LaunchOptions::default()
    })
}

#[allow(clippy::significant_drop_tightening)]
pub fn first_tab(browser: &Browser) -> anyhow::Result<Arc<Tab>> {
    let tab = browser.new_tab()?;

    {
        let tabs_guard = browser
            .get_tabs()
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        for remain in &*tabs_guard {
            if !Arc::ptr_eq(&tab, remain) {
                remain.close(true)?;
            }
        }
    }

    Ok(tab)
}

/// Launches a browser and returns it with its only tab, user agent set.
///
/// The browser must outlive the tab: dropping it kills the process.
pub fn launch(args: &BrowserArgs) -> anyhow::Result<(Browser, Arc<Tab>)> {
    let browser = puppeteer(!args.no_headless, args.proxy.as_deref())?;
    let tab = first_tab(&browser)?;

    let user_agent = pick_user_agent();
    tracing::info!(target: "browser", "choosing user-agent \x1b[1;36m{user_agent}\x1b[0m ...");
    tab.set_user_agent(user_agent, None, None)?;

    Ok((browser, tab))
}

pub async fn navigate_to(tab: &Arc<Tab>, url: Cow<'static, str>) -> anyhow::Result<()> {
    let tab = tab.clone();

    spawn_blocking(move || {
        tab.navigate_to(&url)?.wait_until_navigated()?;
        Ok::<_, anyhow::Error>(())
    })
    .await?
}

async fn exists(tab: &Arc<Tab>, selector: Cow<'static, str>) -> anyhow::Result<bool> {
    let tab = tab.clone();

    spawn_blocking(move || match tab.find_element(&selector) {
        Ok(_) => Ok(true),
        Err(err) if err.is::<NoElementFound>() => Ok(false),
        Err(err) => Err(err),
    })
    .await?
}

/// Polls until `selector` matches, giving up after [`RENDER_TIMEOUT`].
pub async fn wait_for_async(tab: &Arc<Tab>, selector: Cow<'static, str>) -> anyhow::Result<()> {
    const PERIOD: Duration = Duration::from_millis(1832 / 4);

    let deadline = Instant::now() + RENDER_TIMEOUT;
    loop {
        if exists(tab, selector.clone()).await? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            anyhow::bail!("`{selector}` did not appear within {RENDER_TIMEOUT:?}");
        }
        sleep(PERIOD).await;
    }
}

/// The rendered document, after scripts have run.
pub async fn page_source(tab: &Arc<Tab>) -> anyhow::Result<String> {
    let tab = tab.clone();

    spawn_blocking(move || tab.get_content()).await?
}
