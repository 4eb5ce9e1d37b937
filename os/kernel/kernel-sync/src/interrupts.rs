//! Interrupt masking for the executing core.
//!
//! A core holding a spin lock must not take an interrupt whose handler could
//! try to acquire the same lock; it would spin on itself forever. The guard
//! here snapshots the interrupt state, masks, and restores the snapshot on
//! drop, so guards nest correctly as long as they drop in LIFO order.
//!
//! Hosted targets (unit tests run in user space) have no interrupts to mask;
//! there the operations compile to no-ops.

#[cfg(all(target_os = "none", target_arch = "x86_64"))]
mod arch {
    /// Reads `RFLAGS` (via `pushfq`/`pop`); bit 9 is `IF`.
    #[inline]
    #[must_use]
    pub fn interrupts_enabled() -> bool {
        let rflags: u64;
        // SAFETY: reading the flags register has no side effects.
        unsafe {
            core::arch::asm!("pushfq; pop {}", out(reg) rflags, options(nostack, preserves_flags));
        }
        rflags & (1 << 9) != 0
    }

    /// Masks interrupts (`cli`). Requires a privileged context.
    #[inline]
    pub fn disable_interrupts() {
        // SAFETY: `cli` is legal in ring 0; this crate only runs there.
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    /// Unmasks interrupts (`sti`). Requires a privileged context.
    #[inline]
    pub fn enable_interrupts() {
        // SAFETY: `sti` is legal in ring 0; this crate only runs there.
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }
}

#[cfg(all(target_os = "none", target_arch = "riscv64"))]
mod arch {
    /// Supervisor interrupt enable.
    const SSTATUS_SIE: u64 = 1 << 1;

    #[inline]
    #[must_use]
    pub fn interrupts_enabled() -> bool {
        let sstatus: u64;
        // SAFETY: reading `sstatus` has no side effects.
        unsafe { core::arch::asm!("csrr {}, sstatus", out(reg) sstatus, options(nomem, nostack)) };
        sstatus & SSTATUS_SIE != 0
    }

    /// Clears `sstatus.SIE`. Requires supervisor mode.
    #[inline]
    pub fn disable_interrupts() {
        // SAFETY: legal in supervisor mode; this crate only runs there.
        unsafe { core::arch::asm!("csrci sstatus, 2", options(nomem, nostack)) }
    }

    /// Sets `sstatus.SIE`. Requires supervisor mode.
    #[inline]
    pub fn enable_interrupts() {
        // SAFETY: legal in supervisor mode; this crate only runs there.
        unsafe { core::arch::asm!("csrsi sstatus, 2", options(nomem, nostack)) }
    }
}

/// Fallback for hosted targets: user space cannot (and need not) mask.
#[cfg(not(target_os = "none"))]
mod arch {
    #[inline]
    #[must_use]
    pub const fn interrupts_enabled() -> bool {
        false
    }

    #[inline]
    pub const fn disable_interrupts() {}

    #[inline]
    pub const fn enable_interrupts() {}
}

pub use arch::{disable_interrupts, enable_interrupts, interrupts_enabled};

/// RAII guard that masks interrupts on creation and restores the prior
/// state on drop.
///
/// Restoration is conditional: interrupts are re-enabled only if they were
/// enabled when the guard was created. A guard created inside another
/// guard's scope therefore leaves interrupts masked, which is what makes
/// nested spin-lock acquisition safe without a per-core depth counter.
///
/// # Examples
///
/// ```
/// use kernel_sync::InterruptGuard;
///
/// {
///     let _masked = InterruptGuard::disable();
///     // no interrupt can preempt this section on the executing core
/// }
/// // prior interrupt state restored here
/// ```
pub struct InterruptGuard {
    /// Interrupt state found at construction.
    were_enabled: bool,
}

impl InterruptGuard {
    /// Masks interrupts if they are currently enabled and remembers the
    /// state found.
    #[inline]
    #[must_use]
    pub fn disable() -> Self {
        let were_enabled = interrupts_enabled();
        if were_enabled {
            disable_interrupts();
        }
        Self { were_enabled }
    }
}

impl Drop for InterruptGuard {
    /// Unmasks only if interrupts were enabled at construction.
    fn drop(&mut self) {
        if self.were_enabled {
            enable_interrupts();
        }
    }
}
