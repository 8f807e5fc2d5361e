// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Offset pagination over cursor-paginated sources.
//!
//! Backends that only page by cursor synthesize `offset` by walking pages and
//! discarding the first `offset` items. Every skipped item is still fetched,
//! so a large offset costs as much as reading everything before it.

use async_trait::async_trait;
use tracing::debug;

use super::traits::ProviderResult;
use super::types::Page;

/// Something that serves pages by opaque cursor.
#[async_trait]
pub trait CursorSource: Send + Sync {
    type Item: Send;

    async fn page(&self, cursor: Option<&str>, page_size: usize) -> ProviderResult<Page<Self::Item>>;
}

/// Skip `offset` items, then collect up to `limit` (all remaining if `None`).
pub async fn fetch_with_offset<S: CursorSource + ?Sized>(
    source: &S,
    offset: usize,
    limit: Option<usize>,
    page_size: usize,
) -> ProviderResult<Vec<S::Item>> {
    let page_size = page_size.max(1);
    let wanted = limit.unwrap_or(usize::MAX);
    let mut to_skip = offset;
    let mut out = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        if out.len() >= wanted {
            break;
        }
        let page = source.page(cursor.as_deref(), page_size).await?;
        pages += 1;

        let mut items = page.items.into_iter();
        if to_skip > 0 {
            let available = items.len();
            let skipped = to_skip.min(available);
            items.by_ref().take(skipped).for_each(drop);
            to_skip -= skipped;
        }
        out.extend(items.take(wanted - out.len()));

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    debug!(offset, pages, returned = out.len(), "Emulated offset over cursor pages");
    Ok(out)
}

/// Drain every page of a source.
pub async fn fetch_all<S: CursorSource + ?Sized>(
    source: &S,
    page_size: usize,
) -> ProviderResult<Vec<S::Item>> {
    fetch_with_offset(source, 0, None, page_size).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Numbers 0..n served in pages; cursor is the next start index.
    struct Numbers {
        n: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CursorSource for Numbers {
        type Item = usize;

        async fn page(&self, cursor: Option<&str>, page_size: usize) -> ProviderResult<Page<usize>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let start: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
            let end = (start + page_size).min(self.n);
            Ok(Page {
                items: (start..end).collect(),
                next_cursor: (end < self.n).then(|| end.to_string()),
            })
        }
    }

    fn numbers(n: usize) -> Numbers {
        Numbers { n, calls: AtomicUsize::new(0) }
    }

    #[tokio::test]
    async fn test_offset_spanning_pages() {
        let source = numbers(25);
        let items = fetch_with_offset(&source, 12, Some(5), 5).await.unwrap();

        assert_eq!(items, vec![12, 13, 14, 15, 16]);
        // Pages 0-4, 5-9, 10-14, 15-19
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_offset_past_end() {
        let items = fetch_with_offset(&numbers(7), 50, Some(3), 4).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_all() {
        let items = fetch_all(&numbers(11), 3).await.unwrap();
        assert_eq!(items, (0..11).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_zero_limit_fetches_nothing() {
        let source = numbers(10);
        let items = fetch_with_offset(&source, 0, Some(0), 5).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
