//! Runtime list of webhook destination URLs.

use std::sync::Arc;

use tokio::sync::RwLock;

/// Shared, mutable list of destination URLs.
///
/// Cloning yields another handle to the same list; the dispatcher reads it
/// on every dispatch so additions take effect immediately.
#[derive(Debug, Clone, Default)]
pub struct DestinationRegistry {
    urls: Arc<RwLock<Vec<String>>>,
}

impl DestinationRegistry {
    pub fn new(urls: impl IntoIterator<Item = String>) -> Self {
        let mut cleaned: Vec<String> = Vec::new();
        for url in urls {
            let url = url.trim();
            if !url.is_empty() && !cleaned.iter().any(|u| u == url) {
                cleaned.push(url.to_string());
            }
        }
        Self {
            urls: Arc::new(RwLock::new(cleaned)),
        }
    }

    /// Builds a registry from a comma-separated list.
    pub fn from_csv(list: &str) -> Self {
        Self::new(list.split(',').map(str::to_string))
    }

    pub async fn list(&self) -> Vec<String> {
        self.urls.read().await.clone()
    }

    /// Adds `url`; returns `false` if it was already registered.
    pub async fn add(&self, url: &str) -> bool {
        let url = url.trim();
        let mut urls = self.urls.write().await;
        if url.is_empty() || urls.iter().any(|u| u == url) {
            return false;
        }
        urls.push(url.to_string());
        true
    }

    pub async fn len(&self) -> usize {
        self.urls.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.urls.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_csv_trims_and_dedups() {
        let registry =
            DestinationRegistry::from_csv(" http://a/hook ,,http://b/hook,http://a/hook");

        assert_eq!(registry.list().await, vec!["http://a/hook", "http://b/hook"]);
    }

    #[tokio::test]
    async fn test_add_dedups_across_handles() {
        let registry = DestinationRegistry::default();
        assert!(registry.is_empty().await);

        assert!(registry.add("http://a/hook").await);
        assert!(!registry.add("http://a/hook").await);
        assert_eq!(registry.len().await, 1);

        let other_handle = registry.clone();
        assert!(!other_handle.add(" http://a/hook ").await);
        assert!(other_handle.add("http://b/hook").await);
        assert_eq!(registry.list().await, vec!["http://a/hook", "http://b/hook"]);
    }
}
