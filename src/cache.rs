use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use image::RgbaImage;
use parking_lot::{Condvar, Mutex};

use crate::{
    color::{accent_from_image, AccentColor},
    error::ResourceError,
    resource::ResourceProvider,
};

pub const DEFAULT_CAPACITY: usize = 50;

/// Decoded album art together with the accent color extracted from it.
#[derive(Clone, Debug)]
pub struct Artwork {
    pub image: Arc<RgbaImage>,
    pub accent: AccentColor,
}

#[derive(Default)]
struct Entries {
    map: HashMap<String, Artwork>,
    /// Insertion order; lookups never reorder it.
    order: VecDeque<String>,
    inflight: HashSet<String>,
}

impl Entries {
    fn insert(&mut self, url: &str, artwork: Artwork, capacity: usize) {
        if self.map.insert(url.to_string(), artwork).is_none() {
            self.order.push_back(url.to_string());
        }
        while self.map.len() > capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.map.remove(&oldest);
            log::debug!("artwork cache evicted {oldest}");
        }
    }
}

/// Bounded artwork cache keyed by URL, evicting the oldest insertion first.
///
/// Concurrent `get_or_fetch` calls for the same URL are coalesced: one caller
/// fetches while the others wait for it to settle.
pub struct ArtworkCache {
    capacity: usize,
    provider: Arc<dyn ResourceProvider>,
    entries: Mutex<Entries>,
    settled: Condvar,
}

impl ArtworkCache {
    pub fn new(capacity: usize, provider: Arc<dyn ResourceProvider>) -> Self {
        Self {
            capacity: capacity.max(1),
            provider,
            entries: Mutex::new(Entries::default()),
            settled: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.lock().map.contains_key(url)
    }

    /// Cached URLs, oldest insertion first.
    pub fn urls(&self) -> Vec<String> {
        self.entries.lock().order.iter().cloned().collect()
    }

    pub fn peek(&self, url: &str) -> Option<Artwork> {
        self.entries.lock().map.get(url).cloned()
    }

    pub fn get_or_fetch(&self, url: &str) -> Result<Artwork, ResourceError> {
        {
            let mut entries = self.entries.lock();
            loop {
                if let Some(hit) = entries.map.get(url) {
                    log::debug!("artwork cache hit {url}");
                    return Ok(hit.clone());
                }
                if entries.inflight.insert(url.to_string()) {
                    break;
                }
                self.settled.wait(&mut entries);
            }
        }

        log::debug!("artwork cache miss {url}");
        let result = self.load(url);

        {
            let mut entries = self.entries.lock();
            entries.inflight.remove(url);
            if let Ok(artwork) = &result {
                entries.insert(url, artwork.clone(), self.capacity);
            }
        }
        self.settled.notify_all();

        result
    }

    fn load(&self, url: &str) -> Result<Artwork, ResourceError> {
        let bytes = self.provider.fetch_bytes(url)?;
        let image = image::load_from_memory(&bytes)?.to_rgba8();
        let accent = accent_from_image(&image)?;
        Ok(Artwork {
            image: Arc::new(image),
            accent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::{
        io::Cursor,
        sync::atomic::{AtomicUsize, Ordering},
        thread,
        time::Duration,
    };

    struct CountingProvider {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ResourceProvider for CountingProvider {
        fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ResourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if url.contains("broken") {
                return Err(ResourceError::Fetch {
                    url: url.to_string(),
                    reason: "HTTP 404".into(),
                });
            }
            let image = RgbaImage::from_pixel(2, 2, Rgba([180, 40, 90, 255]));
            let mut bytes = Cursor::new(Vec::new());
            image.write_to(&mut bytes, ImageFormat::Png).unwrap();
            Ok(bytes.into_inner())
        }
    }

    fn cache(capacity: usize, delay: Duration) -> (ArtworkCache, Arc<CountingProvider>) {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            delay,
        });
        (ArtworkCache::new(capacity, provider.clone()), provider)
    }

    #[test]
    fn second_lookup_is_served_from_cache() {
        let (cache, provider) = cache(4, Duration::ZERO);
        let first = cache.get_or_fetch("a").unwrap();
        let second = cache.get_or_fetch("a").unwrap();
        assert!(Arc::ptr_eq(&first.image, &second.image));
        assert_eq!(first.accent, AccentColor::rgb(180, 40, 90));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn eviction_is_by_insertion_order_not_access() {
        let (cache, _) = cache(3, Duration::ZERO);
        for url in ["a", "b", "c"] {
            cache.get_or_fetch(url).unwrap();
        }
        // Touching "a" must not protect it.
        cache.get_or_fetch("a").unwrap();
        cache.get_or_fetch("d").unwrap();

        assert_eq!(cache.urls(), vec!["b", "c", "d"]);
        assert!(!cache.contains("a"));
    }

    #[test]
    fn failed_fetch_is_not_cached() {
        let (cache, provider) = cache(3, Duration::ZERO);
        assert!(cache.get_or_fetch("broken").is_err());
        assert!(cache.get_or_fetch("broken").is_err());
        assert!(cache.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_fetches_are_coalesced() {
        let (cache, provider) = cache(3, Duration::from_millis(100));
        let cache = Arc::new(cache);
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || cache.get_or_fetch("shared").unwrap())
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        struct Garbage;
        impl ResourceProvider for Garbage {
            fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>, ResourceError> {
                Ok(vec![0, 1, 2, 3])
            }
        }
        let cache = ArtworkCache::new(2, Arc::new(Garbage));
        assert!(matches!(
            cache.get_or_fetch("x"),
            Err(ResourceError::Decode(_))
        ));
    }
}
