// packages/agent/src/interception/fault.rs
//! Fault interceptor
//!
//! Two capture paths feed one recorder: a panic hook chained in front of the
//! previous hook, and (on unix) handlers for fatal signals. Every report is
//! flushed to the durable slot before the store append, since the process is
//! usually about to end. The next start surfaces the flushed report once.

use crate::capture::{CaptureStore, Captured, FaultKind, FaultReport};
use crate::interception::fault_slot::FaultSlot;
use crate::interception::Interceptor;
use crate::redirect::RedirectionTable;
use crate::registry::features::InterceptorId;
use crate::utils::errors::{AgentError, Result};
use chrono::Utc;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Hook id for the panic path
pub const PANIC_HOOK: &str = "fault.panic_hook";

/// Hook id for the fatal-signal path
pub const SIGNAL_HOOK: &str = "fault.signal_handlers";

/// Default wait before a caught panic counts as survived
pub const DEFAULT_SURVIVAL_GRACE: Duration = Duration::from_secs(2);

/// Where the current thread is in capturing a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Idle,
    /// Nothing persisted yet
    Building,
    /// Flushed to the slot, store append still running
    Persisted,
}

thread_local! {
    static CAPTURE: Cell<Capture> = Cell::new(Capture::Idle);
}

// Resets the thread's capture phase even if the append unwinds
struct CaptureGuard;

impl CaptureGuard {
    fn enter() -> Self {
        CAPTURE.with(|c| c.set(Capture::Building));
        Self
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURE.with(|c| c.set(Capture::Idle));
    }
}

/// Builds, persists and stores fault reports
pub struct FaultRecorder {
    store: Arc<CaptureStore<FaultReport>>,
    slot: FaultSlot,
    survival_grace: Duration,
}

impl FaultRecorder {
    pub fn new(store: Arc<CaptureStore<FaultReport>>, slot: FaultSlot) -> Self {
        Self {
            store,
            slot,
            survival_grace: DEFAULT_SURVIVAL_GRACE,
        }
    }

    pub fn with_survival_grace(mut self, grace: Duration) -> Self {
        self.survival_grace = grace;
        self
    }

    pub fn slot(&self) -> &FaultSlot {
        &self.slot
    }

    /// Capture a fault.
    ///
    /// Faults on different threads are captured independently. A fault
    /// raised on a thread that is already capturing one is not handled
    /// again and `FaultDuringFaultHandling` is returned; if the outer report
    /// had not reached the slot yet, the nested one is persisted as partial.
    pub fn record(
        &self,
        kind: FaultKind,
        reason: impl Into<String>,
        location: Option<String>,
    ) -> Result<FaultReport> {
        let reason = reason.into();

        let phase = CAPTURE.with(|c| c.get());
        if phase != Capture::Idle {
            if phase == Capture::Building {
                let partial = Self::report(kind, reason.clone(), location, Vec::new(), true);
                let _ = self.slot.store(&partial);
            }
            return Err(AgentError::FaultDuringFaultHandling(reason));
        }

        let _guard = CaptureGuard::enter();
        let report = Self::report(kind, reason, location, capture_backtrace(), false);
        let persisted = self.slot.store(&report);
        if persisted.is_ok() {
            CAPTURE.with(|c| c.set(Capture::Persisted));
        }
        self.store.append(report.clone());

        persisted.map_err(|e| AgentError::StorageFailed(e.to_string()))?;
        Ok(report)
    }

    fn report(
        kind: FaultKind,
        reason: String,
        location: Option<String>,
        backtrace: Vec<String>,
        partial: bool,
    ) -> FaultReport {
        FaultReport {
            kind,
            reason,
            backtrace,
            thread: std::thread::current().name().map(str::to_string),
            location,
            captured_at: Utc::now(),
            recovered: false,
            partial,
            survived: false,
        }
    }

    /// Mark `report` as survived if the slot still holds exactly it
    pub fn mark_survived(&self, report: &FaultReport) -> Result<bool> {
        match self.slot.peek()? {
            Some(persisted) if persisted == *report => {
                self.slot.store(&FaultReport {
                    survived: true,
                    ..persisted
                })?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Surface a report flushed by a previous run, then empty the slot
    pub fn recover_pending(&self) -> Result<Option<Captured<FaultReport>>> {
        let Some(mut report) = self.slot.take()? else {
            return Ok(None);
        };

        if report.survived {
            info!(
                "Recovered fault report from previous run (caught, run continued): {}",
                report.reason
            );
        } else {
            info!("Recovered fault report from previous run: {}", report.reason);
        }
        report.recovered = true;
        Ok(Some(self.store.append(report)))
    }
}

fn capture_backtrace() -> Vec<String> {
    Backtrace::force_capture()
        .to_string()
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Extract a panic message from its payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

// The hook cannot tell a caught panic from a fatal one, so every panic is
// persisted and a watcher flags the report once the run outlives the grace
// period.
fn install_panic_hook(recorder: Arc<FaultRecorder>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let reason = panic_message(info.payload());
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));

        match recorder.record(FaultKind::Panic, reason, location) {
            Ok(report) => watch_survival(Arc::clone(&recorder), report),
            Err(e) => error!("Fault capture incomplete: {}", e),
        }

        previous(info);
    }));
}

fn watch_survival(recorder: Arc<FaultRecorder>, report: FaultReport) {
    let spawned = std::thread::Builder::new()
        .name("periscope-fault-survival".to_string())
        .spawn(move || {
            std::thread::sleep(recorder.survival_grace);
            match recorder.mark_survived(&report) {
                Ok(true) => debug!("Panic report marked as survived: {}", report.reason),
                Ok(false) => {}
                Err(e) => warn!("Could not mark panic report as survived: {}", e),
            }
        });
    if let Err(e) = spawned {
        warn!("Could not start panic survival watcher: {}", e);
    }
}

#[cfg(unix)]
mod signals {
    use super::FaultRecorder;
    use crate::capture::FaultKind;
    use crate::utils::errors::{AgentError, Result};
    use nix::sys::signal::{raise, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
    use once_cell::sync::OnceCell;
    use std::sync::Arc;
    use tracing::debug;

    pub(super) const FATAL_SIGNALS: [Signal; 6] = [
        Signal::SIGSEGV,
        Signal::SIGBUS,
        Signal::SIGILL,
        Signal::SIGFPE,
        Signal::SIGABRT,
        Signal::SIGTRAP,
    ];

    static RECORDER: OnceCell<Arc<FaultRecorder>> = OnceCell::new();
    static PREVIOUS: OnceCell<Vec<(Signal, SigAction)>> = OnceCell::new();

    pub(super) fn signal_name(number: i32) -> String {
        Signal::try_from(number)
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|_| format!("SIG{}", number))
    }

    extern "C" fn handle_signal(number: libc::c_int) {
        if let Some(recorder) = RECORDER.get() {
            let name = signal_name(number);
            let reason = format!("Fatal signal {} received", name);
            let _ = recorder.record(FaultKind::Signal { number, name }, reason, None);
        }
        restore_and_raise(number);
    }

    // Hand the signal to whoever owned it before us
    fn restore_and_raise(number: libc::c_int) {
        let Ok(signal) = Signal::try_from(number) else {
            return;
        };
        let action = PREVIOUS
            .get()
            .and_then(|previous| previous.iter().find(|(s, _)| *s == signal))
            .map(|(_, action)| *action)
            .unwrap_or_else(|| {
                SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty())
            });
        unsafe {
            let _ = sigaction(signal, &action);
        }
        let _ = raise(signal);
    }

    /// Install handlers for every fatal signal; the first recorder wins
    pub(super) fn install(recorder: Arc<FaultRecorder>) -> Result<()> {
        if RECORDER.set(recorder).is_err() {
            debug!("Signal handlers already owned by another recorder");
            return Ok(());
        }

        let action = SigAction::new(
            SigHandler::Handler(handle_signal),
            SaFlags::SA_ONSTACK,
            SigSet::empty(),
        );

        let mut previous = Vec::with_capacity(FATAL_SIGNALS.len());
        for signal in FATAL_SIGNALS {
            let old = unsafe { sigaction(signal, &action) }.map_err(|e| {
                AgentError::InterceptionFailed(format!("sigaction({}) failed: {}", signal, e))
            })?;
            previous.push((signal, old));
        }
        let _ = PREVIOUS.set(previous);

        debug!("Installed handlers for {} fatal signals", FATAL_SIGNALS.len());
        Ok(())
    }
}

/// Fault interceptor
#[derive(Clone)]
pub struct FaultInterceptor {
    recorder: Arc<FaultRecorder>,
    capture_signals: bool,
}

impl FaultInterceptor {
    pub fn new(recorder: Arc<FaultRecorder>, capture_signals: bool) -> Self {
        Self {
            recorder,
            capture_signals,
        }
    }

    pub fn recorder(&self) -> &Arc<FaultRecorder> {
        &self.recorder
    }

    pub fn recover_pending(&self) -> Result<Option<Captured<FaultReport>>> {
        self.recorder.recover_pending()
    }
}

impl Interceptor for FaultInterceptor {
    fn id(&self) -> InterceptorId {
        InterceptorId::Fault
    }

    fn enable(&self, table: &RedirectionTable) -> Result<bool> {
        let owner = InterceptorId::Fault.as_str();

        let recorder = Arc::clone(&self.recorder);
        let panic_installed = table.install_hook(PANIC_HOOK, owner, || {
            install_panic_hook(recorder);
            Ok(())
        })?;

        let mut signals_installed = false;
        if self.capture_signals {
            #[cfg(unix)]
            {
                let recorder = Arc::clone(&self.recorder);
                signals_installed =
                    table.install_hook(SIGNAL_HOOK, owner, || signals::install(recorder))?;
            }
            #[cfg(not(unix))]
            tracing::warn!("Fatal signal capture is only available on unix");
        }

        Ok(panic_installed || signals_installed)
    }
}
