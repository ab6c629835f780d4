//! Observer registry and synchronous broadcaster.
//!
//! A [`Subject`] owns an ordered list of [`Observer`] handles and notifies
//! them one at a time, in subscription order, on the caller's thread.
//!
//! # Policies
//!
//! - **Duplicates**: subscribing the same observer twice registers it twice,
//!   and it is notified twice per broadcast.
//! - **Unsubscribe**: removes every registration of that observer instance
//!   (compared by pointer identity). Unknown observers are a no-op.
//! - **Failures**: a failing observer does not stop the broadcast. Every
//!   remaining observer is still notified, and all failures are returned
//!   together as a [`BroadcastError`] afterwards.
//! - **Re-entrancy**: observers only receive `&E` while the subject is
//!   borrowed, so they cannot subscribe, unsubscribe, or trigger a nested
//!   broadcast on the same subject mid-notification.

use std::sync::Arc;

use crate::error::{BroadcastError, ObserverError, ObserverFailure};

/// Anything that can be notified with an event payload.
///
/// Closures of the form `Fn(&E) -> Result<(), ObserverError>` implement this
/// trait directly.
pub trait Observer<E>: Send + Sync {
    /// Name used when reporting failures.
    fn name(&self) -> &str {
        "observer"
    }

    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError`] if the observer could not handle the event.
    fn update(&self, event: &E) -> Result<(), ObserverError>;
}

impl<E, F> Observer<E> for F
where
    F: Fn(&E) -> Result<(), ObserverError> + Send + Sync,
{
    fn update(&self, event: &E) -> Result<(), ObserverError> {
        self(event)
    }
}

/// Shared handle to a registered observer.
pub type ObserverHandle<E> = Arc<dyn Observer<E>>;

/// Ordered observer registry.
pub struct Subject<E> {
    observers: Vec<ObserverHandle<E>>,
}

impl<E> Subject<E> {
    /// Create a subject with no observers.
    pub const fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    /// Append an observer to the registration list.
    pub fn subscribe(&mut self, observer: ObserverHandle<E>) {
        self.observers.push(observer);
    }

    /// Remove every registration of `observer`.
    ///
    /// Returns how many registrations were removed.
    pub fn unsubscribe<O>(&mut self, observer: &Arc<O>) -> usize
    where
        O: Observer<E> + ?Sized,
    {
        let target = Arc::as_ptr(observer);
        let before = self.observers.len();
        self.observers
            .retain(|registered| !std::ptr::addr_eq(Arc::as_ptr(registered), target));
        before.saturating_sub(self.observers.len())
    }

    /// Notify every registered observer with `event`, in subscription order.
    ///
    /// Returns the number of observers notified successfully.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError`] listing every observer that failed. The
    /// error is only produced after all observers have been invoked.
    pub fn broadcast(&self, event: &E) -> Result<usize, BroadcastError> {
        let mut failures = Vec::new();
        let mut delivered: usize = 0;

        for (position, observer) in self.observers.iter().enumerate() {
            match observer.update(event) {
                Ok(()) => delivered = delivered.saturating_add(1),
                Err(source) => failures.push(ObserverFailure {
                    position,
                    observer: observer.name().to_owned(),
                    source,
                }),
            }
        }

        if failures.is_empty() {
            Ok(delivered)
        } else {
            Err(BroadcastError { failures })
        }
    }

    /// Number of registrations (duplicates included).
    pub const fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether no observer is registered.
    pub const fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl<E> Default for Subject<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> core::fmt::Debug for Subject<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let names: Vec<&str> = self.observers.iter().map(|o| o.name()).collect();
        f.debug_struct("Subject").field("observers", &names).finish()
    }
}
