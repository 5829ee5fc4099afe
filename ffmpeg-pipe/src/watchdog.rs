//! Deadline watchdog for blocking demux reads.
//!
//! Installed as the AVIOInterruptCB of a capture context so that a device
//! read cannot stall the pipeline forever: the driver arms a deadline before
//! each blocking call and FFmpeg aborts the call with AVERROR_EXIT once the
//! deadline passes.

use std::os::raw::{c_int, c_void};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub(crate) struct Watchdog {
    epoch: Instant,
    /// Milliseconds since `epoch`; 0 means disarmed.
    deadline_ms: AtomicU64,
}

impl Watchdog {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            deadline_ms: AtomicU64::new(0),
        }
    }

    pub fn arm(&self, timeout: Duration) {
        let deadline = self.epoch.elapsed() + timeout;
        self.deadline_ms
            .store((deadline.as_millis() as u64).max(1), Ordering::Release);
    }

    pub fn disarm(&self) {
        self.deadline_ms.store(0, Ordering::Release);
    }

    fn expired(&self) -> bool {
        let deadline = self.deadline_ms.load(Ordering::Acquire);
        deadline != 0 && self.epoch.elapsed().as_millis() as u64 > deadline
    }

    /// Points the context's interrupt callback at this watchdog. The Arc must
    /// outlive the context; `CameraSource` keeps both and drops the context
    /// first.
    pub fn install(self: &Arc<Self>, input: &mut ffmpeg_next::format::context::Input) {
        let callback = ffmpeg_next::ffi::AVIOInterruptCB {
            callback: Some(interrupt_poll),
            opaque: Arc::as_ptr(self) as *mut c_void,
        };
        unsafe {
            (*input.as_mut_ptr()).interrupt_callback = callback;
        }
    }
}

unsafe extern "C" fn interrupt_poll(opaque: *mut c_void) -> c_int {
    let watchdog = unsafe { &*(opaque as *const Watchdog) };
    watchdog.expired() as c_int
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arms_and_expires() {
        let watchdog = Watchdog::new();
        assert!(!watchdog.expired());

        watchdog.arm(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));
        assert!(watchdog.expired());

        watchdog.disarm();
        assert!(!watchdog.expired());
    }
}
