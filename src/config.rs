use serde::{Deserialize, Serialize};
use std::fs;

use crate::catalog::CatalogEntry;
use crate::types::{Amount, CustomerId};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,

    /// The single customer id with privileged authority.
    pub admin_id: CustomerId,

    /// One-time credit granted to both sides of a referral on contact
    /// verification.
    #[serde(default = "default_referral_bonus")]
    pub referral_bonus: Amount,

    #[serde(default)]
    pub store: StoreConfig,

    /// Static product catalog: key, display label, price.
    #[serde(default = "default_catalog")]
    pub catalog: Vec<CatalogEntry>,
}

fn default_referral_bonus() -> Amount {
    4000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    pub data_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
        }
    }
}

fn default_catalog() -> Vec<CatalogEntry> {
    [
        ("India", "India", 18_000),
        ("USA", "USA", 20_000),
        ("Canada", "Canada", 20_000),
        ("Uzbekistan", "Uzbekistan", 25_000),
        ("UK", "UK", 25_000),
        ("Turkey", "Turkey", 28_000),
    ]
    .into_iter()
    .map(|(key, label, price)| CatalogEntry {
        key: key.to_string(),
        label: label.to_string(),
        price,
    })
    .collect()
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|_| panic!("Failed to read config file: {}", config_path));
        serde_yaml::from_str(&content).expect("Failed to parse config yaml")
    }
}
