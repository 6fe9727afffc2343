use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use crate::{DocumentStore, Result};
use crate::engine::Registry;
use crate::sdk::Client;

/// Environment variable naming a `flatdoc-stored` address; selects Remote Mode when set.
pub const STORE_ADDR_ENV: &str = "FLATDOC_STORE_ADDR";
/// Environment variable overriding the embedded data directory.
pub const DATA_DIR_ENV: &str = "FLATDOC_DATA_DIR";
/// Default embedded data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Which backend [`new`] builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the embedded store's collection files.
    pub data_dir: PathBuf,
    /// Address of a remote daemon. `None` means Embedded Mode.
    pub addr: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            addr: None,
        }
    }
}

impl Config {
    /// Embedded Mode rooted at `data_dir`.
    pub fn embedded<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self { data_dir: data_dir.into(), addr: None }
    }

    /// Reads `FLATDOC_DATA_DIR` and `FLATDOC_STORE_ADDR`. An empty address counts as unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let data_dir = lookup(DATA_DIR_ENV)
            .filter(|d| !d.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let addr = lookup(STORE_ADDR_ENV).filter(|a| !a.is_empty());
        Self { data_dir, addr }
    }
}

/// Builds the [`DocumentStore`] described by `config`.
///
/// 1. If an address is configured, it attempts to connect to that daemon in **Remote Mode**.
/// 2. Otherwise, or if the daemon is unreachable, it returns an embedded [`Registry`]
///    rooted at `config.data_dir` in **Embedded Mode**.
///
/// The choice is made once; the returned store is shared by reference from then on.
///
/// # Examples
///
/// ```no_run
/// use flatdoc::sdk::{self, Config};
/// use flatdoc::Filter;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let store = sdk::new(&Config::from_env()).await?;
///     let products = store.collection("ecommerce_db", "products");
///     let all = products.find(&Filter::all()).await?;
///     println!("{} products", all.len());
///     Ok(())
/// }
/// ```
pub async fn new(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    if let Some(addr) = &config.addr {
        match Client::connect(addr).await {
            Ok(client) => {
                log::info!("Using remote store at {}", addr);
                return Ok(Arc::new(client));
            }
            Err(e) => {
                log::warn!("Could not reach store at {} ({}); falling back to embedded mode", addr, e);
            }
        }
    }

    log::info!("Using embedded store in {:?}", config.data_dir);
    Ok(Arc::new(Registry::new(&config.data_dir)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert!(config.addr.is_none());
    }

    #[test]
    fn test_config_from_vars() {
        let config = Config::from_lookup(lookup(&[
            (DATA_DIR_ENV, "/var/lib/flatdoc"),
            (STORE_ADDR_ENV, "127.0.0.1:7017"),
        ]));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/flatdoc"));
        assert_eq!(config.addr.as_deref(), Some("127.0.0.1:7017"));
    }

    #[test]
    fn test_empty_addr_means_embedded() {
        let config = Config::from_lookup(lookup(&[(STORE_ADDR_ENV, "")]));
        assert!(config.addr.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_addr_falls_back_to_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let config = Config { data_dir: dir.path().to_path_buf(), addr: Some(addr) };
        let store = new(&config).await.unwrap();

        use crate::Filter;
        let products = store.collection("shop", "products");
        products.insert_one(serde_json::Map::new()).await.unwrap();
        assert_eq!(products.count_documents(&Filter::all()).await.unwrap(), 1);
        assert!(dir.path().join("shop").join("products.json").exists());
    }
}
