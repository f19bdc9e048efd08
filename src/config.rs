#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub(crate) allowed_caching: bool,
    pub(crate) cache_refresh_interval: std::time::Duration,
    pub(crate) cache_ttl: std::time::Duration,
    pub(crate) max_concurrent_fetches: usize,
    pub(crate) hn_base_url: String,
    pub(crate) listen_addr: std::net::SocketAddr,
    pub(crate) log_to_console: bool,
}

const DEFAULT_REFRESH_INTERVAL_MINUTES: u64 = 30;
const DEFAULT_TTL_MINUTES: u64 = 30;
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
/// One year.
const MAX_MINUTES: u64 = 365 * 24 * 60;

impl Config {
    /// Reads the environment, including a `.env` file when there is one.
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(anyhow::anyhow!("Failed to load .env file: {e}"));
            }
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let refresh_minutes: u64 = parse_or(
            &lookup,
            "CACHE_REFRESH_INTERVAL_MINUTES",
            DEFAULT_REFRESH_INTERVAL_MINUTES,
        )?;
        if refresh_minutes == 0 {
            anyhow::bail!("CACHE_REFRESH_INTERVAL_MINUTES must be greater than 0");
        }

        let ttl_minutes: u64 = parse_or(&lookup, "CACHE_TTL_MINUTES", DEFAULT_TTL_MINUTES)?;

        Ok(Self {
            allowed_caching: parse_or(&lookup, "ALLOWED_CACHING", false)?,
            cache_refresh_interval: minutes(
                "CACHE_REFRESH_INTERVAL_MINUTES",
                refresh_minutes,
            )?,
            cache_ttl: minutes("CACHE_TTL_MINUTES", ttl_minutes)?,
            max_concurrent_fetches: parse_or(
                &lookup,
                "MAX_CONCURRENT_FETCHES",
                default_concurrency(),
            )?
            .max(1),
            hn_base_url: lookup("HN_BASE_URL")
                .unwrap_or_else(|| crate::hn_api::DEFAULT_BASE_URL.to_string()),
            listen_addr: parse_or(
                &lookup,
                "LISTEN_ADDR",
                DEFAULT_LISTEN_ADDR.parse::<std::net::SocketAddr>()?,
            )?,
            log_to_console: parse_or(&lookup, "LOG_TO_CONSOLE", false)?,
        })
    }
}

fn minutes(key: &str, minutes: u64) -> anyhow::Result<std::time::Duration> {
    if minutes > MAX_MINUTES {
        anyhow::bail!("{key} must be at most {MAX_MINUTES}, got {minutes}");
    }
    Ok(std::time::Duration::from_secs(minutes * 60))
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value {raw:?} for {key}: {e}")),
    }
}

/// Leaves two cores for the rest of the host on machines that have them.
fn default_concurrency() -> usize {
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
    concurrency_for_cores(cores)
}

fn concurrency_for_cores(cores: usize) -> usize {
    if cores <= 2 { cores.max(1) } else { cores - 2 }
}
