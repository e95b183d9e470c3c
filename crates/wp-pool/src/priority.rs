//! Loader thread priority elevation
//!
//! Streaming decode competes with everything else on the machine; loader
//! jobs bump their worker thread so a note-on's tail arrives before the
//! resident head runs out.

/// Raise the current thread's scheduling priority.
///
/// `percent` (0..=100) maps linearly into the platform's round-robin
/// priority range. Failures (typically missing privileges) are logged at
/// debug and otherwise ignored.
pub fn raise_current_thread_priority(percent: u8) {
    platform_raise(percent.min(100));
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn platform_raise(percent: u8) {
    unsafe {
        let thread = libc::pthread_self();
        let mut policy: libc::c_int = 0;
        let mut param: libc::sched_param = std::mem::zeroed();

        if libc::pthread_getschedparam(thread, &mut policy, &mut param) != 0 {
            log::debug!("cannot read loader thread scheduling parameters");
            return;
        }

        let min = libc::sched_get_priority_min(libc::SCHED_RR);
        let max = libc::sched_get_priority_max(libc::SCHED_RR);
        if min < 0 || max < min {
            log::debug!("no usable SCHED_RR priority range");
            return;
        }

        param.sched_priority = min + percent as libc::c_int * (max - min) / 100;
        if libc::pthread_setschedparam(thread, libc::SCHED_RR, &param) != 0 {
            log::debug!("cannot raise loader thread priority (missing privileges?)");
        }
    }
}

#[cfg(target_os = "windows")]
fn platform_raise(_percent: u8) {
    use windows::Win32::System::Threading::{
        GetCurrentThread, SetThreadPriority, THREAD_PRIORITY_ABOVE_NORMAL,
    };

    let result = unsafe { SetThreadPriority(GetCurrentThread(), THREAD_PRIORITY_ABOVE_NORMAL) };
    if result.is_err() {
        log::debug!("cannot raise loader thread priority");
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn platform_raise(_percent: u8) {}
