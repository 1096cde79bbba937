//! Integration tests for all-or-nothing construction.
//!
//! A counting backend wraps the host backend, keeps a live count of every
//! reservation, backing store and mapping, and can be told to fail any step.
//! After each failed construction every count must be back at zero and the
//! error must carry the injected native cause.

use bank_memory::memory::{
    AliasBackend, BANK_SIZE, HostBackend, KernReturn, NativeError, PRIMARY_LEN, Window,
};
use bank_memory::{BankMemory, BankMemoryConfig, Error, ErrorKind};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const INJECTED: NativeError = NativeError::Kern(KernReturn::NO_SPACE);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

// ============================================================================
// Counting backend
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Reserve,
    Store,
    Primary,
    FirstAlias,
    SecondAlias,
}

#[derive(Debug, Default)]
struct Counters {
    reservations: AtomicIsize,
    stores: AtomicIsize,
    /// Start addresses of live windows.
    mappings: Mutex<Vec<usize>>,
    reserve_calls: AtomicUsize,
    unmap_calls: AtomicUsize,
}

impl Counters {
    fn live(&self) -> (isize, isize, isize) {
        (
            self.reservations.load(Ordering::SeqCst),
            self.stores.load(Ordering::SeqCst),
            self.mappings.lock().unwrap().len() as isize,
        )
    }
}

struct CountedStore {
    inner: <HostBackend as AliasBackend>::Store,
    counters: Arc<Counters>,
}

impl Drop for CountedStore {
    fn drop(&mut self) {
        self.counters.stores.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Host backend with live counts and failure injection.
///
/// `HOLDS` overrides whether the backend claims to keep its reservation,
/// which decides whether a failed primary mapping is retried and whether
/// windows are unmapped one by one. The host placeholder stays in place
/// either way so fixed mappings never land on someone else's pages.
struct CountingBackend<const HOLDS: bool = true> {
    host: HostBackend,
    counters: Arc<Counters>,
    fail_at: Option<Step>,
    primary_failures: AtomicU32,
    fail_cleanup: AtomicBool,
    misplace_first_alias: bool,
    intrude: bool,
    intruders: Mutex<Vec<usize>>,
    base: AtomicUsize,
    windows_placed: AtomicBool,
    misplaced: Mutex<Option<(usize, usize)>>,
}

impl<const HOLDS: bool> CountingBackend<HOLDS> {
    fn new() -> Self {
        Self {
            host: HostBackend::default(),
            counters: Arc::new(Counters::default()),
            fail_at: None,
            primary_failures: AtomicU32::new(0),
            fail_cleanup: AtomicBool::new(false),
            misplace_first_alias: false,
            intrude: false,
            intruders: Mutex::new(Vec::new()),
            base: AtomicUsize::new(0),
            windows_placed: AtomicBool::new(false),
            misplaced: Mutex::new(None),
        }
    }

    fn failing_at(step: Step) -> Self {
        Self {
            fail_at: Some(step),
            ..Self::new()
        }
    }

    fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    fn window_of(&self, target: NonNull<u8>) -> Window {
        match target.as_ptr() as usize - self.base.load(Ordering::SeqCst) {
            0 => Window::Primary,
            PRIMARY_LEN => Window::FirstAlias,
            _ => Window::SecondAlias,
        }
    }

    fn injects(&self, window: Window) -> bool {
        let step = match window {
            Window::Primary => Step::Primary,
            Window::FirstAlias => Step::FirstAlias,
            Window::SecondAlias => Step::SecondAlias,
        };
        if self.fail_at == Some(step) {
            return true;
        }
        window == Window::Primary
            && self
                .primary_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }
}

impl<const HOLDS: bool> AliasBackend for CountingBackend<HOLDS> {
    type Store = CountedStore;

    const HOLDS_RESERVATION: bool = HOLDS;

    fn reserve(&self, len: usize) -> Result<NonNull<u8>, NativeError> {
        self.counters.reserve_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(Step::Reserve) {
            return Err(INJECTED);
        }
        let base = self.host.reserve(len)?;
        self.base.store(base.as_ptr() as usize, Ordering::SeqCst);
        self.windows_placed.store(false, Ordering::SeqCst);
        self.counters.reservations.fetch_add(1, Ordering::SeqCst);
        Ok(base)
    }

    unsafe fn release(&self, base: NonNull<u8>, len: usize) -> Result<(), NativeError> {
        self.counters.reservations.fetch_sub(1, Ordering::SeqCst);

        // The three windows cover the whole range, so once one was placed a
        // probe-only backend leaves the host range to the window unmaps.
        if HOLDS || !self.windows_placed.load(Ordering::SeqCst) {
            unsafe { self.host.release(base, len)? };
        }

        // Releasing a held range takes every window inside it along.
        if HOLDS {
            let start = base.as_ptr() as usize;
            self.counters
                .mappings
                .lock()
                .unwrap()
                .retain(|&addr| addr < start || addr >= start + len);
        }

        if self.fail_cleanup.load(Ordering::SeqCst) {
            return Err(NativeError::Kern(KernReturn::INVALID_ADDRESS));
        }
        Ok(())
    }

    fn create_backing_store(&self, name: &str, len: usize) -> Result<CountedStore, NativeError> {
        if self.fail_at == Some(Step::Store) {
            return Err(INJECTED);
        }
        let inner = self.host.create_backing_store(name, len)?;
        self.counters.stores.fetch_add(1, Ordering::SeqCst);
        Ok(CountedStore {
            inner,
            counters: self.counters(),
        })
    }

    unsafe fn map_fixed(
        &self,
        store: &CountedStore,
        target: NonNull<u8>,
        len: usize,
    ) -> Result<NonNull<u8>, NativeError> {
        let window = self.window_of(target);
        if self.injects(window) {
            return Err(INJECTED);
        }

        let mapped = unsafe { self.host.map_fixed(&store.inner, target, len)? };
        self.windows_placed.store(true, Ordering::SeqCst);
        self.counters
            .mappings
            .lock()
            .unwrap()
            .push(mapped.as_ptr() as usize);

        if self.misplace_first_alias && window == Window::FirstAlias {
            // Report the neighbouring window instead of where it really went.
            let reported = unsafe { mapped.add(BANK_SIZE) };
            *self.misplaced.lock().unwrap() =
                Some((reported.as_ptr() as usize, mapped.as_ptr() as usize));
            return Ok(reported);
        }
        Ok(mapped)
    }

    unsafe fn unmap(&self, addr: NonNull<u8>, len: usize) -> Result<(), NativeError> {
        let mut addr = addr;
        if let Some((reported, real)) = self.misplaced.lock().unwrap().take() {
            if addr.as_ptr() as usize == reported {
                addr = unsafe { addr.sub(reported - real) };
            }
        }

        self.counters.unmap_calls.fetch_add(1, Ordering::SeqCst);
        unsafe { self.host.unmap(addr, len)? };
        let start = addr.as_ptr() as usize;
        self.counters
            .mappings
            .lock()
            .unwrap()
            .retain(|&a| a != start);

        if self.intrude {
            // Another mapping in the process claims the freed range at once.
            self.intruders.lock().unwrap().extend(map_foreign_page(start));
        }

        if self.fail_cleanup.load(Ordering::SeqCst) {
            return Err(NativeError::Kern(KernReturn::INVALID_ADDRESS));
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn map_foreign_page(addr: usize) -> Option<usize> {
    use rustix::mm::{MapFlags, ProtFlags};

    let ptr = unsafe {
        rustix::mm::mmap_anonymous(
            addr as *mut _,
            4096,
            ProtFlags::READ | ProtFlags::WRITE,
            MapFlags::PRIVATE | MapFlags::FIXED_NOREPLACE,
        )
    }
    .ok()?;
    Some(ptr as usize)
}

#[cfg(not(target_os = "linux"))]
fn map_foreign_page(_addr: usize) -> Option<usize> {
    None
}

fn build<const HOLDS: bool>(
    backend: CountingBackend<HOLDS>,
    config: &BankMemoryConfig,
) -> (Result<BankMemory<CountingBackend<HOLDS>>, Error>, Arc<Counters>) {
    let counters = backend.counters();
    (BankMemory::with_backend(backend, config), counters)
}

// ============================================================================
// Success path
// ============================================================================

#[test]
fn test_success_holds_everything_until_drop() {
    let (memory, counters) = build(CountingBackend::<true>::new(), &BankMemoryConfig::default());
    let memory = memory.unwrap();

    assert_eq!(counters.live(), (1, 1, 3));
    unsafe {
        *memory.primary_ptr() = 0xAA;
        assert_eq!(*memory.alias_ptr().add(BANK_SIZE), 0xAA);
    }

    drop(memory);
    assert_eq!(counters.live(), (0, 0, 0));
}

#[test]
fn test_teardown_releases_everything() {
    let (memory, counters) = build(CountingBackend::<true>::new(), &BankMemoryConfig::default());
    let mut memory = memory.unwrap();

    memory.teardown();
    assert_eq!(counters.live(), (0, 0, 0));
    memory.teardown();
    assert_eq!(counters.live(), (0, 0, 0));
}

/// A held reservation is released in one call; the windows are never
/// unmapped on their own, so no hole opens inside the range.
#[test]
fn test_held_range_is_released_whole() {
    let (memory, counters) = build(CountingBackend::<true>::new(), &BankMemoryConfig::default());
    let mut memory = memory.unwrap();

    memory.teardown();
    assert_eq!(counters.unmap_calls.load(Ordering::SeqCst), 0);
    assert_eq!(counters.live(), (0, 0, 0));
}

/// Pages another mapping places where a window used to be survive teardown.
#[cfg(target_os = "linux")]
fn assert_foreign_pages_survive<const HOLDS: bool>() -> usize {
    let mut backend = CountingBackend::<HOLDS>::new();
    backend.intrude = true;
    let (memory, counters) = build(backend, &BankMemoryConfig::default());
    let mut memory = memory.unwrap();

    memory.teardown();
    assert_eq!(counters.live(), (0, 0, 0));

    let pages = std::mem::take(&mut *memory.backend().intruders.lock().unwrap());
    for &page in &pages {
        unsafe {
            let result =
                rustix::mm::mprotect(page as *mut _, 4096, rustix::mm::MprotectFlags::READ);
            assert!(result.is_ok(), "foreign page at {page:#x} was unmapped");
            rustix::mm::munmap(page as *mut _, 4096).unwrap();
        }
    }
    pages.len()
}

#[cfg(target_os = "linux")]
#[test]
fn test_teardown_leaves_foreign_mappings_alone() {
    // Held range: nothing is freed before the single release, so nothing
    // can move in.
    assert_eq!(assert_foreign_pages_survive::<true>(), 0);

    // Probe-only: each unmapped window is claimed by someone else at once.
    assert_eq!(assert_foreign_pages_survive::<false>(), 3);
}

/// Failing steps during teardown are logged and the rest still run.
#[test]
fn test_teardown_continues_past_failures() {
    init_tracing();

    let (memory, counters) = build(CountingBackend::<true>::new(), &BankMemoryConfig::default());
    let mut memory = memory.unwrap();
    memory.backend().fail_cleanup.store(true, Ordering::SeqCst);

    memory.teardown();
    assert!(memory.primary_ptr().is_null());
    assert!(memory.alias_ptr().is_null());
    assert_eq!(counters.live(), (0, 0, 0));
}

/// Same for a probe-only backend, where every window is unmapped on its own.
#[test]
fn test_probe_only_teardown_continues_past_failures() {
    init_tracing();

    let (memory, counters) = build(CountingBackend::<false>::new(), &BankMemoryConfig::default());
    let mut memory = memory.unwrap();
    memory.backend().fail_cleanup.store(true, Ordering::SeqCst);

    memory.teardown();
    assert!(memory.primary_ptr().is_null());
    assert!(memory.alias_ptr().is_null());
    assert_eq!(counters.unmap_calls.load(Ordering::SeqCst), 3);
    assert_eq!(counters.live(), (0, 0, 0));
}

// ============================================================================
// Injected failures
// ============================================================================

fn assert_rolled_back(step: Step, expected: ErrorKind) {
    let (result, counters) = build(
        CountingBackend::<true>::failing_at(step),
        &BankMemoryConfig::default(),
    );
    let err = result.unwrap_err();

    assert_eq!(err.kind(), expected, "failing at {step:?}");
    assert_eq!(err.native(), INJECTED, "failing at {step:?}");
    assert_eq!(counters.live(), (0, 0, 0), "failing at {step:?}");
}

#[test]
fn test_reserve_failure() {
    assert_rolled_back(Step::Reserve, ErrorKind::ReservationFailed);
}

#[test]
fn test_store_failure_releases_reservation() {
    assert_rolled_back(Step::Store, ErrorKind::BackingStoreCreationFailed);
}

#[test]
fn test_primary_failure_rolls_back() {
    assert_rolled_back(Step::Primary, ErrorKind::MappingFailed);
}

#[test]
fn test_first_alias_failure_rolls_back() {
    assert_rolled_back(Step::FirstAlias, ErrorKind::AliasMappingFailed);
}

#[test]
fn test_second_alias_failure_rolls_back() {
    assert_rolled_back(Step::SecondAlias, ErrorKind::AliasMappingFailed);
}

#[test]
fn test_alias_error_names_window() {
    let (result, _) = build(
        CountingBackend::<true>::failing_at(Step::SecondAlias),
        &BankMemoryConfig::default(),
    );
    match result.unwrap_err() {
        Error::AliasMappingFailed { window, .. } => assert_eq!(window, Window::SecondAlias),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_store_error_carries_name() {
    let config = BankMemoryConfig::default().with_name_prefix("vram");
    let (result, _) = build(CountingBackend::<true>::failing_at(Step::Store), &config);
    match result.unwrap_err() {
        Error::BackingStoreCreationFailed { name, .. } => assert!(name.starts_with("vram-")),
        other => panic!("unexpected error: {other}"),
    }
}

/// A failing undo step is logged; the caller still sees the original error.
#[test]
fn test_cleanup_failure_keeps_original_error() {
    init_tracing();

    let backend = CountingBackend::<true>::failing_at(Step::SecondAlias);
    backend.fail_cleanup.store(true, Ordering::SeqCst);
    let (result, counters) = build(backend, &BankMemoryConfig::default());
    let err = result.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AliasMappingFailed);
    assert_eq!(err.native(), INJECTED);
    assert_eq!(counters.live(), (0, 0, 0));
}

#[test]
fn test_misplaced_mapping_is_rejected() {
    let mut backend = CountingBackend::<true>::new();
    backend.misplace_first_alias = true;
    let (result, counters) = build(backend, &BankMemoryConfig::default());

    match result.unwrap_err() {
        Error::AliasMappingFailed {
            window,
            target,
            source: NativeError::Misplaced { requested, actual },
        } => {
            assert_eq!(window, Window::FirstAlias);
            assert_eq!(requested, target);
            assert_eq!(actual, target + BANK_SIZE);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(counters.live(), (0, 0, 0));
}

// ============================================================================
// Lost race on probe-only backends
// ============================================================================

#[test]
fn test_lost_race_is_retried() {
    init_tracing();

    let backend = CountingBackend::<false>::new();
    backend.primary_failures.store(2, Ordering::SeqCst);
    let (result, counters) = build(backend, &BankMemoryConfig::default());
    let memory = result.unwrap();

    assert_eq!(counters.reserve_calls.load(Ordering::SeqCst), 3);
    assert_eq!(counters.live(), (1, 1, 3));

    drop(memory);
    assert_eq!(counters.live(), (0, 0, 0));
}

#[test]
fn test_lost_race_gives_up_after_probe_attempts() {
    let backend = CountingBackend::<false>::new();
    backend.primary_failures.store(2, Ordering::SeqCst);
    let config = BankMemoryConfig {
        probe_attempts: 2,
        ..BankMemoryConfig::default()
    };
    let (result, counters) = build(backend, &config);

    match result.unwrap_err() {
        Error::ReservationFailed {
            lost_race, source, ..
        } => {
            assert!(lost_race);
            assert_eq!(source, INJECTED);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(counters.reserve_calls.load(Ordering::SeqCst), 2);
    assert_eq!(counters.live(), (0, 0, 0));
}

#[test]
fn test_holding_backend_does_not_retry() {
    let backend = CountingBackend::<true>::new();
    backend.primary_failures.store(1, Ordering::SeqCst);
    let (result, counters) = build(backend, &BankMemoryConfig::default());

    assert_eq!(result.unwrap_err().kind(), ErrorKind::MappingFailed);
    assert_eq!(counters.reserve_calls.load(Ordering::SeqCst), 1);
    assert_eq!(counters.live(), (0, 0, 0));
}
