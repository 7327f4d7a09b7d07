//! OS-level real-time setup for the loop thread
//!
//! All of these act on the calling thread (or process, for memory locking) and
//! are meant to run once, before the first cycle. None of them are required:
//! the loop keeps its cadence semantics without them, only with more jitter.

use crate::error::{AmlsError, AmlsResult};
use log::info;

const PAGE_SIZE: usize = 4096;

/// Switch the calling thread to SCHED_FIFO at `priority` (1-99)
///
/// Needs CAP_SYS_NICE or root; an RT-PREEMPT kernel gives the tightest bound.
pub fn set_realtime_priority(priority: i32) -> AmlsResult<()> {
    if !(1..=99).contains(&priority) {
        return Err(AmlsError::config("Priority must be between 1 and 99"));
    }

    #[cfg(target_os = "linux")]
    {
        use libc::{sched_param, sched_setscheduler, SCHED_FIFO};

        let param = sched_param {
            sched_priority: priority,
        };

        // SAFETY: pid 0 targets the calling thread and `param` outlives the call.
        if unsafe { sched_setscheduler(0, SCHED_FIFO, &param) } != 0 {
            let err = std::io::Error::last_os_error();
            return Err(AmlsError::Internal(format!(
                "Failed to set real-time priority: {}. \
                 Ensure CAP_SYS_NICE or run as root.",
                err
            )));
        }

        info!("Real-time priority set to {} (SCHED_FIFO)", priority);
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(AmlsError::Unsupported(
            "Real-time priority scheduling is only supported on Linux".to_string(),
        ))
    }
}

/// Restrict the calling thread to one CPU core
pub fn pin_to_cpu(cpu_id: usize) -> AmlsResult<()> {
    #[cfg(target_os = "linux")]
    {
        use libc::{cpu_set_t, sched_setaffinity, CPU_SET, CPU_SETSIZE, CPU_ZERO};

        if cpu_id >= CPU_SETSIZE as usize {
            return Err(AmlsError::config(format!(
                "CPU id {} out of range (max {})",
                cpu_id,
                CPU_SETSIZE - 1
            )));
        }

        // SAFETY: cpu_set_t is plain data; zeroed is its empty state and
        // cpu_id was range-checked above.
        let rc = unsafe {
            let mut cpuset: cpu_set_t = std::mem::zeroed();
            CPU_ZERO(&mut cpuset);
            CPU_SET(cpu_id, &mut cpuset);
            sched_setaffinity(0, std::mem::size_of::<cpu_set_t>(), &cpuset)
        };

        if rc != 0 {
            let err = std::io::Error::last_os_error();
            return Err(AmlsError::Internal(format!(
                "Failed to set CPU affinity: {}",
                err
            )));
        }

        info!("Loop thread pinned to CPU core {}", cpu_id);
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = cpu_id;
        Err(AmlsError::Unsupported(
            "CPU pinning is only supported on Linux".to_string(),
        ))
    }
}

/// Lock all current and future pages into RAM
///
/// Needs CAP_IPC_LOCK or a large enough `ulimit -l`.
pub fn lock_memory() -> AmlsResult<()> {
    #[cfg(target_os = "linux")]
    {
        use libc::{mlockall, MCL_CURRENT, MCL_FUTURE};

        // SAFETY: mlockall takes only flags.
        if unsafe { mlockall(MCL_CURRENT | MCL_FUTURE) } != 0 {
            let err = std::io::Error::last_os_error();
            return Err(AmlsError::Internal(format!(
                "Failed to lock memory: {}. \
                 Check ulimit -l and ensure CAP_IPC_LOCK capability.",
                err
            )));
        }

        info!("Memory locked");
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(AmlsError::Unsupported(
            "Memory locking is only supported on Linux".to_string(),
        ))
    }
}

/// Touch `bytes` of stack so the pages are resident before the first cycle
///
/// Combine with [`lock_memory`] to keep them resident.
pub fn prefault_stack(bytes: usize) -> AmlsResult<()> {
    const CHUNK: usize = 64 * 1024;

    #[inline(never)]
    fn touch(remaining: usize) {
        let mut chunk = [0u8; CHUNK];
        for offset in (0..CHUNK).step_by(PAGE_SIZE) {
            // SAFETY: offset < CHUNK, so the pointer stays inside `chunk`.
            unsafe { std::ptr::write_volatile(chunk.as_mut_ptr().add(offset), 0xFF) };
        }
        std::hint::black_box(&chunk);
        if remaining > CHUNK {
            touch(remaining - CHUNK);
        }
    }

    if bytes == 0 {
        return Ok(());
    }
    touch(bytes);

    info!("Pre-faulted {} KB of stack", bytes / 1024);
    Ok(())
}
