//! Paged listing
//!
//! The caller supplies a page fetcher taking the cursor of the page to load
//! (`None` for the first). Listing stops when a page carries no next cursor,
//! or when the upstream hands back a cursor it already gave.

use crate::context::Context;
use crate::error::Result;
use futures_util::stream::{self, Stream, TryStreamExt};
use std::collections::HashSet;
use std::future::Future;
use std::pin::pin;

/// Position of the next page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cursor {
    /// Opaque marker, usually the last item's ID
    Marker(String),
    /// Item offset
    Offset(u64),
}

impl Cursor {
    pub fn marker(&self) -> Option<&str> {
        match self {
            Cursor::Marker(m) => Some(m),
            Cursor::Offset(_) => None,
        }
    }

    pub fn offset(&self) -> Option<u64> {
        match self {
            Cursor::Offset(o) => Some(*o),
            Cursor::Marker(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<Cursor>,
}

impl<T> Page<T> {
    /// Last page.
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }

    /// Page of a marker-based listing. An empty or absent marker ends it.
    pub fn with_marker(items: Vec<T>, next_marker: Option<String>) -> Self {
        let next = next_marker
            .filter(|m| !m.is_empty())
            .map(Cursor::Marker);
        Self { items, next }
    }

    /// Page of an offset/limit listing. A short page ends it.
    pub fn with_offset(items: Vec<T>, offset: u64, limit: u64) -> Self {
        let next = if limit > 0 && items.len() as u64 >= limit {
            Some(Cursor::Offset(offset + items.len() as u64))
        } else {
            None
        };
        Self { items, next }
    }
}

struct PageState<F> {
    fetch: F,
    cursor: Option<Cursor>,
    seen: HashSet<Cursor>,
    done: bool,
}

/// Stream of pages. The stream ends after the first error.
pub fn pages<T, F, Fut>(ctx: &Context, fetch: F) -> impl Stream<Item = Result<Page<T>>>
where
    F: FnMut(Option<Cursor>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let state = PageState {
        fetch,
        cursor: None,
        seen: HashSet::new(),
        done: false,
    };
    stream::unfold(state, move |mut st| async move {
        if st.done {
            return None;
        }
        if let Err(e) = ctx.check() {
            st.done = true;
            return Some((Err(e), st));
        }
        match (st.fetch)(st.cursor.clone()).await {
            Err(e) => {
                st.done = true;
                Some((Err(e), st))
            }
            Ok(page) => {
                match &page.next {
                    None => st.done = true,
                    Some(next) if !st.seen.insert(next.clone()) => {
                        tracing::warn!(cursor = ?next, "Upstream repeated a page cursor, stopping");
                        st.done = true;
                    }
                    Some(next) => st.cursor = Some(next.clone()),
                }
                Some((Ok(page), st))
            }
        }
    })
}

/// Fetch every page and return all items.
pub async fn all_pages<T, F, Fut>(ctx: &Context, fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<Cursor>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut stream = pin!(pages(ctx, fetch));
    let mut items = Vec::new();
    let mut count = 0usize;
    while let Some(page) = stream.try_next().await? {
        count += 1;
        items.extend(page.items);
    }
    tracing::debug!(pages = count, items = items.len(), "Listed all pages");
    Ok(items)
}

/// Visit pages one at a time; `visit` returns `false` to stop early.
pub async fn each_page<T, F, Fut, V>(ctx: &Context, fetch: F, mut visit: V) -> Result<()>
where
    F: FnMut(Option<Cursor>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
    V: FnMut(Vec<T>) -> Result<bool>,
{
    let mut stream = pin!(pages(ctx, fetch));
    while let Some(page) = stream.try_next().await? {
        if !visit(page.items)? {
            break;
        }
    }
    Ok(())
}

/// First item matching `predicate`, fetching only as many pages as needed.
pub async fn find<T, F, Fut, P>(ctx: &Context, fetch: F, mut predicate: P) -> Result<Option<T>>
where
    F: FnMut(Option<Cursor>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
    P: FnMut(&T) -> bool,
{
    let mut found = None;
    each_page(ctx, fetch, |items| {
        found = items.into_iter().find(|item| predicate(item));
        Ok(found.is_none())
    })
    .await?;
    Ok(found)
}

/// Client-side filter for upstreams without server-side selection.
pub fn filter<T>(items: Vec<T>, mut predicate: impl FnMut(&T) -> bool) -> Vec<T> {
    items.into_iter().filter(|item| predicate(item)).collect()
}
