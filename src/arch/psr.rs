//! Processor status word.
//!
//! Each process carries its own copy; the dispatcher swaps it along with
//! the execution context. Only the mode and interrupt-enable bits are
//! modelled, each with a saved "previous" copy.

bitflags::bitflags! {
    /// Mode and interrupt bits of a process.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Psr: u8 {
        const KERNEL_MODE      = 0b0000_0001;
        const INTERRUPTS       = 0b0000_0010;
        const PREV_KERNEL_MODE = 0b0000_0100;
        const PREV_INTERRUPTS  = 0b0000_1000;
    }
}

impl Psr {
    /// Status word of a freshly created process: kernel mode, interrupts off.
    pub const INITIAL: Psr = Psr::KERNEL_MODE;

    pub fn in_kernel_mode(self) -> bool {
        self.contains(Psr::KERNEL_MODE)
    }

    pub fn interrupts_enabled(self) -> bool {
        self.contains(Psr::INTERRUPTS)
    }

    /// Set the interrupt-enable bit, keeping the old one as the previous bit.
    pub fn with_interrupts(self, enabled: bool) -> Psr {
        let mut next = self.shift(Psr::INTERRUPTS, Psr::PREV_INTERRUPTS);
        next.set(Psr::INTERRUPTS, enabled);
        next
    }

    /// Drop to user mode, keeping the old mode as the previous bit.
    pub fn with_user_mode(self) -> Psr {
        let mut next = self.shift(Psr::KERNEL_MODE, Psr::PREV_KERNEL_MODE);
        next.remove(Psr::KERNEL_MODE);
        next
    }

    fn shift(self, current: Psr, previous: Psr) -> Psr {
        let mut next = self - previous;
        if self.contains(current) {
            next |= previous;
        }
        next
    }
}

impl core::fmt::Display for Psr {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let mode = if self.in_kernel_mode() { "K" } else { "U" };
        let ints = if self.interrupts_enabled() { "I" } else { "-" };
        write!(f, "{}{}", mode, ints)
    }
}
