use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::error::AppError;

/// The most recently registered set of image URLs.
///
/// Readers take a snapshot `Arc`; `refresh` swaps in a whole new list under
/// the write lock, so nobody ever sees a half-cleared set.
#[derive(Debug, Default)]
pub struct ImageCache {
    current: RwLock<Arc<Vec<String>>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a raw `image_urls` value and replace the cache with it.
    pub fn refresh(&self, raw: Option<&Value>) -> Result<Vec<String>, AppError> {
        let urls = validate_urls(raw)?;
        self.replace(urls.clone());
        Ok(urls)
    }

    /// Discard everything and store `urls`. Returns the stored count.
    pub fn replace(&self, urls: Vec<String>) -> usize {
        let count = urls.len();
        let snapshot = Arc::new(urls);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = snapshot;
        count
    }

    pub fn list_all(&self) -> Arc<Vec<String>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// `image_urls` must be a non-empty list of strings.
pub fn validate_urls(raw: Option<&Value>) -> Result<Vec<String>, AppError> {
    let invalid = || AppError::InvalidInput("Invalid or missing image_urls".to_string());
    let items = match raw {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => return Err(invalid()),
    };
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
        .collect()
}
