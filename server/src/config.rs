//! Server tunables and the category pools drawn from each round

use std::time::Duration;

pub const DEFAULT_PLAYER_LIMIT: usize = 8;
pub const MIN_PLAYER_LIMIT: usize = 2;

/// A category label and the concrete prompts that can stand in for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPool {
    pub label: String,
    pub prompts: Vec<String>,
}

impl CategoryPool {
    pub fn new(label: &str, prompts: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            prompts: prompts.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Runtime configuration for one game session server
///
/// The three stop-race timings bound how long a round may hang after the first
/// STOP: the caller waits `stop_grace` before notifying the other players,
/// then at most `collection_window` for their answers. Players who submit after
/// the caller wait at most `trailing_wait` for the ranking.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub player_limit: usize,
    pub stop_grace: Duration,
    pub collection_window: Duration,
    pub trailing_wait: Duration,
    pub start_broadcast_delay: Duration,
    pub pools: Vec<CategoryPool>,
}

impl ServerConfig {
    pub fn with_player_limit(mut self, limit: usize) -> Self {
        self.player_limit = limit.max(MIN_PLAYER_LIMIT);
        self
    }

    pub fn with_timings(
        mut self,
        stop_grace: Duration,
        collection_window: Duration,
        trailing_wait: Duration,
    ) -> Self {
        self.stop_grace = stop_grace;
        self.collection_window = collection_window;
        self.trailing_wait = trailing_wait;
        self
    }

    pub fn with_pools(mut self, pools: Vec<CategoryPool>) -> Self {
        self.pools = pools;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            player_limit: DEFAULT_PLAYER_LIMIT,
            stop_grace: Duration::from_millis(500),
            collection_window: Duration::from_secs(5),
            trailing_wait: Duration::from_millis(7500),
            start_broadcast_delay: Duration::from_millis(200),
            pools: default_pools(),
        }
    }
}

/// The ten stock pools; no prompt appears in more than one of them
pub fn default_pools() -> Vec<CategoryPool> {
    vec![
        CategoryPool::new("Name", &["Name", "Nickname", "Surname"]),
        CategoryPool::new("Place", &["City", "Country", "River"]),
        CategoryPool::new("Animal", &["Animal", "Bird", "Insect"]),
        CategoryPool::new("Object", &["Object", "Tool", "Toy"]),
        CategoryPool::new("Color", &["Color", "Flower", "Gemstone"]),
        CategoryPool::new("Food", &["Fruit", "Vegetable", "Dessert"]),
        CategoryPool::new("Work", &["Profession", "Sport", "Hobby"]),
        CategoryPool::new("Team", &["Football Club", "Band", "Brand"]),
        CategoryPool::new("Nation", &["Nationality", "Capital", "Language"]),
        CategoryPool::new("Screen", &["Movie", "Series", "Cartoon"]),
    ]
}
