use std::io;

/// Switches the calling thread to `SCHED_RR` at `priority`.
pub(crate) fn set_realtime_priority(priority: i32) -> io::Result<()> {
    // SAFETY: sched_param is plain data; zeroed is a valid value on every libc.
    let mut param: libc::sched_param = unsafe { core::mem::zeroed() };
    param.sched_priority = priority;

    // SAFETY: pthread_self() is always a valid handle for the calling thread and
    // param outlives the call.
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_RR, &param) };
    match rc {
        0 => Ok(()),
        errno => Err(io::Error::from_raw_os_error(errno)),
    }
}
