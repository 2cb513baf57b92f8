//! Pool of real-looking desktop browser user agents.

use rand::seq::SliceRandom;
use rand::Rng;

const CHROME_VERSIONS: &[&str] = &[
    "124.0.0.0",
    "125.0.0.0",
    "126.0.0.0",
    "127.0.0.0",
    "128.0.0.0",
    "129.0.0.0",
    "130.0.0.0",
    "131.0.0.0",
];

const FIREFOX_VERSIONS: &[&str] = &["127.0", "128.0", "129.0", "130.0", "131.0", "132.0"];

const SAFARI_VERSIONS: &[&str] = &["17.4", "17.5", "17.6", "18.0", "18.1"];

const PLATFORMS: &[&str] = &[
    "Windows NT 10.0; Win64; x64",
    "Macintosh; Intel Mac OS X 10_15_7",
    "X11; Linux x86_64",
    "X11; Ubuntu; Linux x86_64",
];

fn pick<'a, R: Rng>(rng: &mut R, items: &[&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

/// Returns a random user agent, weighted towards Chrome.
pub fn random() -> String {
    let mut rng = rand::thread_rng();
    let platform = pick(&mut rng, PLATFORMS);

    match rng.gen_range(0..10u8) {
        0..=5 => format!(
            "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{} Safari/537.36",
            platform,
            pick(&mut rng, CHROME_VERSIONS)
        ),
        6..=8 => {
            let version = pick(&mut rng, FIREFOX_VERSIONS);
            format!(
                "Mozilla/5.0 ({}; rv:{}) Gecko/20100101 Firefox/{}",
                platform, version, version
            )
        }
        _ => format!(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{} Safari/605.1.15",
            pick(&mut rng, SAFARI_VERSIONS)
        ),
    }
}

/// User agent the headless browser reports instead of `HeadlessChrome`.
pub fn browser_default() -> &'static str {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36"
}
