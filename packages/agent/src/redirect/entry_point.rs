// packages/agent/src/redirect/entry_point.rs
//! A single redirectable entry point

use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

type Handler<A, R> = Arc<dyn Fn(A) -> R + Send + Sync>;

/// Handle to the pre-existing implementation of an entry point
pub struct Original<A, R> {
    handler: Handler<A, R>,
}

impl<A, R> Original<A, R> {
    pub(crate) fn new<F>(handler: F) -> Self
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Invoke the host's original behavior
    pub fn call(&self, args: A) -> R {
        (self.handler)(args)
    }
}

impl<A, R> Clone for Original<A, R> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

/// Named operation whose implementation can be redirected once
pub struct EntryPoint<A, R> {
    id: String,
    original: Original<A, R>,
    replacement: OnceCell<Handler<A, R>>,
}

impl<A: 'static, R: 'static> EntryPoint<A, R> {
    pub(crate) fn new<F>(id: impl Into<String>, original: F) -> Self
    where
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            original: Original::new(original),
            replacement: OnceCell::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Call through the entry point (replacement if installed)
    pub fn call(&self, args: A) -> R {
        match self.replacement.get() {
            Some(replacement) => replacement(args),
            None => self.original.call(args),
        }
    }

    /// Handle to the original implementation
    pub fn original(&self) -> Original<A, R> {
        self.original.clone()
    }

    pub fn is_redirected(&self) -> bool {
        self.replacement.get().is_some()
    }

    /// Install a replacement; returns false if one is already installed.
    ///
    /// Concurrent callers race on a single cell, so exactly one wins.
    pub(crate) fn redirect<F>(&self, replacement: F) -> bool
    where
        F: Fn(&Original<A, R>, A) -> R + Send + Sync + 'static,
    {
        if self.replacement.get().is_some() {
            return false;
        }

        let original = self.original.clone();
        let handler: Handler<A, R> = Arc::new(move |args| replacement(&original, args));
        self.replacement.set(handler).is_ok()
    }
}

impl<A, R> fmt::Debug for EntryPoint<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoint")
            .field("id", &self.id)
            .field("redirected", &self.replacement.get().is_some())
            .finish()
    }
}
