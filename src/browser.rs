//! Shared headless browser session.
//!
//! One Chrome process serves every browser-backed engine. Each search opens
//! its own logical page, bounded by a semaphore, and closes it when done.
//! Releasing the session first drains open pages so the process is never
//! torn down under an in-flight navigation.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::{Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::page::{ElementHandle, Navigator, PageHandle};
use crate::{user_agent, Result, SearchError};

/// How long to wait for the process to exit after a polite close.
const EXIT_WAIT: Duration = Duration::from_secs(5);

/// Launch and anti-detection options for the session.
#[derive(Debug, Clone)]
pub struct BrowserSessionConfig {
    pub headless: bool,
    /// Hide automation fingerprints (`navigator.webdriver`, headless UA).
    pub stealth: bool,
    /// Kill the process on release instead of trusting it to exit.
    pub leakless: bool,
    pub leave_page_open: bool,
    pub proxy_url: Option<String>,
    /// Accept invalid certificates.
    pub insecure: bool,
    pub chrome_path: Option<String>,
    /// Maximum number of concurrently open pages.
    pub max_pages: usize,
    /// How long `release` waits for open pages to close.
    pub drain_timeout: Duration,
    pub extra_args: Vec<String>,
}

impl Default for BrowserSessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            stealth: true,
            leakless: true,
            leave_page_open: false,
            proxy_url: None,
            insecure: false,
            chrome_path: None,
            max_pages: 8,
            drain_timeout: Duration::from_secs(10),
            extra_args: Vec::new(),
        }
    }
}

impl BrowserSessionConfig {
    /// Command-line switches passed to Chrome on top of the launcher's own.
    /// Headless mode is chosen on the launcher.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--user-agent={}", user_agent::browser_default()),
            "--disable-gpu".to_string(),
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-extensions".to_string(),
            "--disable-background-networking".to_string(),
            "--disable-default-apps".to_string(),
            "--disable-sync".to_string(),
            "--mute-audio".to_string(),
            "--no-first-run".to_string(),
        ];
        if self.stealth {
            args.push("--disable-blink-features=AutomationControlled".to_string());
        }
        if let Some(proxy) = self.proxy_url.as_deref().filter(|p| !p.is_empty()) {
            args.push(format!("--proxy-server={}", proxy));
        }
        if self.insecure {
            args.push("--ignore-certificate-errors".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// The shared browser process and its page budget.
pub struct BrowserSession {
    config: BrowserSessionConfig,
    browser: RwLock<Option<Browser>>,
    handler: std::sync::Mutex<Option<JoinHandle<()>>>,
    pages: Arc<Semaphore>,
    closing: AtomicBool,
    released: Mutex<bool>,
}

impl BrowserSession {
    /// Starts the browser. Failure here is fatal to the process.
    pub async fn launch(config: BrowserSessionConfig) -> Result<Self> {
        let chrome = crate::browser_setup::find_chrome(config.chrome_path.as_deref())?;

        let mut builder = BrowserConfig::builder().chrome_executable(chrome);
        builder = if config.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };
        for arg in config.launch_args() {
            builder = builder.arg(arg);
        }
        let browser_config = builder
            .build()
            .map_err(|e| SearchError::Browser(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| SearchError::Browser(format!("Failed to launch browser: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser CDP handler error: {}", e);
                }
            }
            debug!("Browser CDP handler exited");
        });

        info!(
            headless = config.headless,
            stealth = config.stealth,
            max_pages = config.max_pages,
            "Browser session started"
        );
        Ok(Self {
            pages: Arc::new(Semaphore::new(config.max_pages.max(1))),
            config,
            browser: RwLock::new(Some(browser)),
            handler: std::sync::Mutex::new(Some(handler)),
            closing: AtomicBool::new(false),
            released: Mutex::new(false),
        })
    }

    pub fn config(&self) -> &BrowserSessionConfig {
        &self.config
    }

    async fn open_blank(&self) -> Result<Page> {
        let guard = self.browser.read().await;
        let browser = guard
            .as_ref()
            .ok_or_else(|| SearchError::NotInitialized("browser session released".to_string()))?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SearchError::Browser(format!("Failed to open page: {}", e)))?;
        drop(guard);

        if self.config.stealth {
            if let Err(e) = page
                .enable_stealth_mode_with_agent(user_agent::browser_default())
                .await
            {
                warn!("Failed to enable stealth mode: {}", e);
            }
        }
        Ok(page)
    }
}

/// Takes a page slot, then runs `open` before `deadline`. The slot goes back
/// to the pool if opening fails or runs late.
async fn claim_page<T, F>(
    pages: &Arc<Semaphore>,
    deadline: Instant,
    open: F,
) -> Result<(OwnedSemaphorePermit, T)>
where
    F: Future<Output = Result<T>>,
{
    let permit = Arc::clone(pages)
        .acquire_owned()
        .await
        .map_err(|_| SearchError::NotInitialized("browser session released".to_string()))?;
    match timeout_at(deadline, open).await {
        Ok(opened) => Ok((permit, opened?)),
        Err(_) => {
            warn!("Opening a page did not finish in time");
            Err(SearchError::NavigationTimeout)
        }
    }
}

async fn close_quietly(page: Page) {
    if let Err(e) = page.close().await {
        debug!("Failed to close page: {}", e);
    }
}

#[async_trait]
impl Navigator for BrowserSession {
    async fn navigate(&self, url: &str, limit: Duration) -> Result<Box<dyn PageHandle>> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(SearchError::NotInitialized(
                "browser session is shutting down".to_string(),
            ));
        }
        let deadline = Instant::now() + limit;
        let (permit, page) = claim_page(&self.pages, deadline, self.open_blank()).await?;
        let load = async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };
        let outcome = timeout_at(deadline, load).await;
        match outcome {
            Ok(Ok(())) => Ok(Box::new(ChromePage {
                page,
                url: url.to_string(),
                _permit: permit,
            })),
            Ok(Err(e)) => {
                close_quietly(page).await;
                Err(SearchError::Navigation(e.to_string()))
            }
            Err(_) => {
                close_quietly(page).await;
                Err(SearchError::NavigationTimeout)
            }
        }
    }

    fn is_live(&self) -> bool {
        !self.closing.load(Ordering::SeqCst)
    }

    fn leave_page_open(&self) -> bool {
        self.config.leave_page_open
    }

    async fn release(&self) {
        let mut released = self.released.lock().await;
        if *released {
            return;
        }
        self.closing.store(true, Ordering::SeqCst);

        let budget = self.config.max_pages.max(1) as u32;
        match timeout(self.config.drain_timeout, self.pages.acquire_many(budget)).await {
            Ok(Ok(permits)) => permits.forget(),
            Ok(Err(_)) => {}
            Err(_) => warn!("Open pages did not close within the grace period"),
        }
        self.pages.close();

        if let Some(mut browser) = self.browser.write().await.take() {
            if let Err(e) = browser.close().await {
                warn!("Browser close error: {}", e);
            }
            let exited = matches!(timeout(EXIT_WAIT, browser.wait()).await, Ok(Ok(_)));
            if self.config.leakless || !exited {
                if let Some(Err(e)) = browser.kill().await {
                    debug!("Browser kill: {}", e);
                }
            }
            info!("Browser closed");
        }
        if let Ok(mut handler) = self.handler.lock() {
            if let Some(handle) = handler.take() {
                handle.abort();
            }
        }
        *released = true;
    }
}

/// A page opened by the session. Holds one page permit until closed.
struct ChromePage {
    page: Page,
    url: String,
    _permit: OwnedSemaphorePermit,
}

fn query_error(e: chromiumoxide::error::CdpError) -> SearchError {
    SearchError::Navigation(e.to_string())
}

#[async_trait]
impl PageHandle for ChromePage {
    fn url(&self) -> &str {
        &self.url
    }

    async fn find_all(&self, css: &str) -> Result<Vec<Box<dyn ElementHandle>>> {
        let elements = self.page.find_elements(css).await.map_err(query_error)?;
        Ok(elements
            .into_iter()
            .map(|inner| Box::new(ChromeElement { inner }) as Box<dyn ElementHandle>)
            .collect())
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.map_err(query_error)
    }

    async fn evaluate(&self, script: &str) -> Result<()> {
        self.page.evaluate(script).await.map_err(query_error)?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromePage { page, _permit, .. } = *self;
        page.close()
            .await
            .map_err(|e| SearchError::Browser(format!("Failed to close page: {}", e)))
    }
}

struct ChromeElement {
    inner: Element,
}

#[async_trait]
impl ElementHandle for ChromeElement {
    async fn find(&self, css: &str) -> Result<Option<Box<dyn ElementHandle>>> {
        let found = self.inner.find_elements(css).await.map_err(query_error)?;
        Ok(found
            .into_iter()
            .next()
            .map(|inner| Box::new(ChromeElement { inner }) as Box<dyn ElementHandle>))
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>> {
        self.inner.attribute(name).await.map_err(query_error)
    }

    async fn text(&self) -> Result<String> {
        Ok(self
            .inner
            .inner_text()
            .await
            .map_err(query_error)?
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = BrowserSessionConfig::default();
        assert!(config.headless);
        assert!(config.stealth);
        assert!(config.leakless);
        assert!(!config.leave_page_open);
        assert!(!config.insecure);
        assert_eq!(config.max_pages, 8);
    }

    #[tokio::test]
    async fn test_hung_page_open_times_out_and_frees_slot() {
        let pages = Arc::new(Semaphore::new(1));
        let deadline = Instant::now() + Duration::from_millis(50);
        let err = claim_page(&pages, deadline, std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::NavigationTimeout));
        assert_eq!(pages.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_failed_page_open_frees_slot() {
        let pages = Arc::new(Semaphore::new(1));
        let deadline = Instant::now() + Duration::from_secs(1);
        let err = claim_page(&pages, deadline, async {
            Err::<(), _>(SearchError::Browser("target closed".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, SearchError::Browser(_)));
        assert_eq!(pages.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_opened_page_holds_slot() {
        let pages = Arc::new(Semaphore::new(1));
        let deadline = Instant::now() + Duration::from_secs(1);
        let (permit, value) = claim_page(&pages, deadline, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(pages.available_permits(), 0);
        drop(permit);
        assert_eq!(pages.available_permits(), 1);

        pages.close();
        let err = claim_page(&pages, deadline, async { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, SearchError::NotInitialized(_)));
    }

    #[test]
    fn test_launch_args_default() {
        let args = BrowserSessionConfig::default().launch_args();
        assert!(args.contains(&"--disable-blink-features=AutomationControlled".to_string()));
        assert!(args.iter().any(|a| a.starts_with("--user-agent=") && !a.contains("Headless")));
        assert!(!args.iter().any(|a| a.starts_with("--proxy-server")));
        assert!(!args.contains(&"--ignore-certificate-errors".to_string()));
    }

    #[test]
    fn test_launch_args_options() {
        let config = BrowserSessionConfig {
            headless: false,
            stealth: false,
            proxy_url: Some("socks5://127.0.0.1:9050".to_string()),
            insecure: true,
            extra_args: vec!["--lang=en-US".to_string()],
            ..Default::default()
        };
        let args = config.launch_args();
        assert!(!args.iter().any(|a| a.contains("AutomationControlled")));
        assert!(args.contains(&"--proxy-server=socks5://127.0.0.1:9050".to_string()));
        assert!(args.contains(&"--ignore-certificate-errors".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--lang=en-US"));
    }

    #[test]
    fn test_launch_args_skip_empty_proxy() {
        let config = BrowserSessionConfig {
            proxy_url: Some(String::new()),
            ..Default::default()
        };
        assert!(!config.launch_args().iter().any(|a| a.starts_with("--proxy-server")));
    }

    #[tokio::test]
    #[ignore] // Requires a local Chrome installation
    async fn test_live_navigate_and_release() {
        let session = BrowserSession::launch(BrowserSessionConfig {
            max_pages: 2,
            drain_timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .await
        .unwrap();
        assert!(session.is_live());

        let page = session
            .navigate("data:text/html,<p class='x'>hi</p>", Duration::from_secs(10))
            .await
            .unwrap();
        let found = page.find_all("p.x").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text().await.unwrap(), "hi");
        page.close().await.unwrap();

        session.release().await;
        session.release().await;
        assert!(!session.is_live());
        let err = session
            .navigate("about:blank", Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SearchError::NotInitialized(_)));
    }
}
