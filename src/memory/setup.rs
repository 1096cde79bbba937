//! Reservation, backing store and alias mapping.
//!
//! Building a region is a strict sequence: reserve the 258-bank range, create
//! the 256-bank backing object, map it at the base, then map its first bank
//! twice more directly behind it. Each step needs the previous one; each
//! success records its undo action so that a failure anywhere leaves nothing
//! behind.

use super::config::BankMemoryConfig;
use super::layout::{PRIMARY_LEN, TOTAL_LEN, Window};
use super::rollback::Rollback;
use super::{AliasBackend, NativeError};
use crate::error::{Error, Result};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-process counter for backing store names.
static STORE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Process-unique debug name for a backing object.
fn backing_store_name(prefix: &str) -> String {
    let seq = STORE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{}", prefix, std::process::id(), seq)
}

/// Address of `window` inside the reservation at `base`.
#[inline]
fn window_addr(base: NonNull<u8>, window: Window) -> NonNull<u8> {
    // SAFETY: every window offset lies inside the TOTAL_LEN reservation.
    unsafe { base.add(window.offset()) }
}

fn unmap_step(window: Window) -> &'static str {
    match window {
        Window::Primary => "unmap primary window",
        Window::FirstAlias => "unmap first alias window",
        Window::SecondAlias => "unmap second alias window",
    }
}

/// A fully mapped region. Both addresses are fixed at construction.
#[derive(Debug)]
pub(crate) struct Region<S> {
    pub(crate) base: NonNull<u8>,
    pub(crate) alias: NonNull<u8>,
    pub(crate) store: S,
}

// SAFETY: the pointers address process-wide mappings owned by this region
// alone; thread safety reduces to that of the store handle.
unsafe impl<S: Send> Send for Region<S> {}
unsafe impl<S: Sync> Sync for Region<S> {}

impl<S> Region<S> {
    /// Unmap every window, close the store and release the reservation.
    ///
    /// A backend that holds its reservation gets the whole range back in one
    /// release call, which takes the windows with it. Unmapping the windows
    /// first would leave holes that another mapping could fill before the
    /// release. Probe-only backends have nothing to release, so their windows
    /// are unmapped one by one, second alias first.
    ///
    /// Returns the number of steps that failed; failures are logged and do
    /// not stop later steps.
    pub(crate) fn teardown<B>(self, backend: &B) -> usize
    where
        B: AliasBackend<Store = S>,
    {
        let Region { base, store, .. } = self;

        let mut steps = Rollback::new();
        if B::HOLDS_RESERVATION {
            steps.push("close backing store", move || {
                drop(store);
                Ok(())
            });
            steps.push("release reservation", move || unsafe {
                backend.release(base, TOTAL_LEN)
            });
        } else {
            steps.push("release reservation", move || unsafe {
                backend.release(base, TOTAL_LEN)
            });
            steps.push("close backing store", move || {
                drop(store);
                Ok(())
            });
            for window in Window::ALL {
                let addr = window_addr(base, window);
                steps.push(unmap_step(window), move || unsafe {
                    backend.unmap(addr, window.len())
                });
            }
        }

        steps.unwind()
    }
}

/// Map one window and check that it landed exactly at `target`.
///
/// # Safety
///
/// `target` must be the window's address inside the live reservation at
/// `base`.
unsafe fn map_window<B: AliasBackend>(
    backend: &B,
    store: &B::Store,
    base: NonNull<u8>,
    window: Window,
    target: NonNull<u8>,
) -> std::result::Result<NonNull<u8>, NativeError> {
    let mapped = unsafe {
        match window {
            Window::Primary => backend.map_primary(store, target)?,
            Window::FirstAlias | Window::SecondAlias => backend.map_alias(store, target)?,
        }
    };

    if mapped != target {
        let start = base.as_ptr() as usize;
        let stray = mapped.as_ptr() as usize;
        let inside = stray >= start && stray + window.len() <= start + TOTAL_LEN;

        // A stray mapping inside a held reservation goes away with it.
        if inside && B::HOLDS_RESERVATION {
            tracing::debug!(addr = ?mapped, "misplaced mapping left to the reservation release");
        } else if let Err(source) = unsafe { backend.unmap(mapped, window.len()) } {
            let err = Error::CleanupFailed {
                step: unmap_step(window),
                source,
            };
            tracing::warn!(error = %err, "could not remove misplaced mapping");
        }
        return Err(NativeError::Misplaced {
            requested: target.as_ptr() as usize,
            actual: mapped.as_ptr() as usize,
        });
    }

    Ok(mapped)
}

fn establish_once<B: AliasBackend>(backend: &B, name: &str) -> Result<Region<B::Store>> {
    // Unwind order on failure is the reverse of declaration order below:
    // `mappings`, then `store`, then `reservation`.
    let mut reservation = Rollback::new();
    let base = backend
        .reserve(TOTAL_LEN)
        .map_err(|source| Error::ReservationFailed {
            len: TOTAL_LEN,
            lost_race: false,
            source,
        })?;
    tracing::debug!(base = ?base, len = TOTAL_LEN, "reserved address range");
    reservation.push("release reservation", move || unsafe {
        backend.release(base, TOTAL_LEN)
    });

    let store = backend
        .create_backing_store(name, PRIMARY_LEN)
        .map_err(|source| Error::BackingStoreCreationFailed {
            name: name.to_string(),
            source,
        })?;
    tracing::debug!(len = PRIMARY_LEN, "created backing store");

    // Windows inside a held reservation are removed by releasing it; only
    // probe-only backends unmap them individually.
    let mut mappings = Rollback::new();
    for window in Window::ALL {
        let target = window_addr(base, window);
        let mapped =
            unsafe { map_window(backend, &store, base, window, target) }.map_err(|source| {
                if window == Window::Primary && !B::HOLDS_RESERVATION {
                    Error::ReservationFailed {
                        len: TOTAL_LEN,
                        lost_race: true,
                        source,
                    }
                } else {
                    Error::mapping(window, target.as_ptr() as usize, source)
                }
            })?;
        tracing::debug!(%window, addr = ?mapped, len = window.len(), "mapped window");
        if !B::HOLDS_RESERVATION {
            mappings.push(unmap_step(window), move || unsafe {
                backend.unmap(mapped, window.len())
            });
        }
    }

    mappings.disarm();
    reservation.disarm();

    Ok(Region {
        base,
        alias: window_addr(base, Window::FirstAlias),
        store,
    })
}

#[cfg(unix)]
fn page_size() -> usize {
    rustix::param::page_size()
}

#[cfg(not(unix))]
fn page_size() -> usize {
    4096
}

/// Touch every page of the primary window.
fn prefault(base: NonNull<u8>) {
    let page_size = page_size();
    let ptr = base.as_ptr();
    for offset in (0..PRIMARY_LEN).step_by(page_size) {
        unsafe {
            // Volatile read to prevent optimization
            std::ptr::read_volatile(ptr.add(offset));
        }
    }
}

/// Build a complete region or nothing.
pub(crate) fn establish<B: AliasBackend>(
    backend: &B,
    config: &BankMemoryConfig,
) -> Result<Region<B::Store>> {
    let name = backing_store_name(&config.name_prefix);
    let span = tracing::debug_span!("bank_memory.establish", name = %name);
    let _enter = span.enter();

    let attempts = if B::HOLDS_RESERVATION {
        1
    } else {
        config.attempts()
    };

    let mut attempt = 1;
    let region = loop {
        match establish_once(backend, &name) {
            Err(err @ Error::ReservationFailed { lost_race: true, .. }) if attempt < attempts => {
                tracing::debug!(attempt, error = %err, "probed range was taken, probing again");
                attempt += 1;
            }
            result => break result?,
        }
    };

    if config.prefault {
        prefault(region.base);
    }

    tracing::info!(
        base = ?region.base,
        alias = ?region.alias,
        attempts = attempt,
        "bank memory ready"
    );
    Ok(region)
}
