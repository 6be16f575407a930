// Copyright (c) 2021 Quark Container Authors / 2018 The gVisor Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub struct SysErr {}

impl SysErr {
    pub const EPERM: i32 = 1;
    pub const ESRCH: i32 = 3;
    pub const EINTR: i32 = 4;
    pub const EAGAIN: i32 = 11;
    pub const ENOMEM: i32 = 12;
    pub const EFAULT: i32 = 14;
    pub const EINVAL: i32 = 22;
    pub const ERANGE: i32 = 34;
    pub const ENOSYS: i32 = 38;
    pub const ETIMEDOUT: i32 = 110;

    // restart the syscall after signal handling, not visible to userspace
    pub const ERESTARTNOHAND: i32 = 514;
    pub const ERESTART_RESTARTBLOCK: i32 = 516;
}

pub type UID = u32;
pub type GID = u32;
pub type ThreadID = i32;
pub type ProcessGroupID = i32;
pub type SessionID = i32;

// the thread id of the init process in the root pid namespace. Signals
// that reach default disposition there are swallowed, even SIGKILL.
pub const INIT_TID: ThreadID = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, PartialOrd, Ord)]
pub struct Signal(pub i32);

impl Signal {
    pub const SIGHUP: Signal = Signal(1);
    pub const SIGINT: Signal = Signal(2);
    pub const SIGQUIT: Signal = Signal(3);
    pub const SIGILL: Signal = Signal(4);
    pub const SIGTRAP: Signal = Signal(5);
    pub const SIGABRT: Signal = Signal(6);
    pub const SIGIOT: Signal = Signal(6);
    pub const SIGBUS: Signal = Signal(7);
    pub const SIGFPE: Signal = Signal(8);
    pub const SIGKILL: Signal = Signal(9);
    pub const SIGUSR1: Signal = Signal(10);
    pub const SIGSEGV: Signal = Signal(11);
    pub const SIGUSR2: Signal = Signal(12);
    pub const SIGPIPE: Signal = Signal(13);
    pub const SIGALRM: Signal = Signal(14);
    pub const SIGTERM: Signal = Signal(15);
    pub const SIGSTKFLT: Signal = Signal(16);
    pub const SIGCHLD: Signal = Signal(17);
    pub const SIGCONT: Signal = Signal(18);
    pub const SIGSTOP: Signal = Signal(19);
    pub const SIGTSTP: Signal = Signal(20);
    pub const SIGTTIN: Signal = Signal(21);
    pub const SIGTTOU: Signal = Signal(22);
    pub const SIGURG: Signal = Signal(23);
    pub const SIGXCPU: Signal = Signal(24);
    pub const SIGXFSZ: Signal = Signal(25);
    pub const SIGVTALRM: Signal = Signal(26);
    pub const SIGPROF: Signal = Signal(27);
    pub const SIGWINCH: Signal = Signal(28);
    pub const SIGIO: Signal = Signal(29);
    pub const SIGPOLL: Signal = Signal(29);
    pub const SIGPWR: Signal = Signal(30);
    pub const SIGSYS: Signal = Signal(31);

    pub const SIGNAL_MAX: i32 = 64;
    pub const FIRST_STD_SIGNAL: i32 = 1;
    pub const LAST_STD_SIGNAL: i32 = 31;
    pub const FIRST_RT_SIGNAL: i32 = 32;
    pub const LAST_RT_SIGNAL: i32 = 64;

    pub fn New(val: i32) -> Self {
        return Self(val);
    }

    pub fn IsValid(&self) -> bool {
        return 0 < self.0 && self.0 <= Self::SIGNAL_MAX;
    }

    pub fn Maskable(&self) -> bool {
        return self.0 != Self::SIGKILL.0 && self.0 != Self::SIGSTOP.0;
    }

    pub fn IsStandard(&self) -> bool {
        return self.0 <= Self::LAST_STD_SIGNAL;
    }

    pub fn IsRealtime(&self) -> bool {
        return self.0 >= Self::FIRST_RT_SIGNAL;
    }

    // Index returns the index for signal s into arrays of both standard and
    // realtime signals (0 for SIGHUP).
    pub fn Index(&self) -> usize {
        return (self.0 - 1) as usize;
    }

    pub fn Mask(&self) -> u64 {
        return 1 << self.Index();
    }

    pub fn IsStopSignal(&self) -> bool {
        return self.0 == Self::SIGSTOP.0
            || self.0 == Self::SIGTSTP.0
            || self.0 == Self::SIGTTIN.0
            || self.0 == Self::SIGTTOU.0;
    }
}

// sigaction handler sentinels.
pub const SIG_DFL: u64 = 0;
pub const SIG_IGN: u64 = 1;

pub struct SigHow {}

impl SigHow {
    pub const SIG_BLOCK: u64 = 0;
    pub const SIG_UNBLOCK: u64 = 1;
    pub const SIG_SETMASK: u64 = 2;
}

// si_code values. Positive codes are reserved for the kernel; userspace
// queueing uses negative codes.
pub struct SignalCode {}

impl SignalCode {
    pub const SI_USER: i32 = 0;
    pub const SI_KERNEL: i32 = 0x80;
    pub const SI_QUEUE: i32 = -1;
    pub const SI_TIMER: i32 = -2;
    pub const SI_MESGQ: i32 = -3;
    pub const SI_ASYNCIO: i32 = -4;
    pub const SI_SIGIO: i32 = -5;
    pub const SI_TKILL: i32 = -6;
}

// SIGCHLD si_code values.
pub struct CldCode {}

impl CldCode {
    pub const CLD_EXITED: i32 = 1;
    pub const CLD_KILLED: i32 = 2;
    pub const CLD_DUMPED: i32 = 3;
    pub const CLD_TRAPPED: i32 = 4;
    pub const CLD_STOPPED: i32 = 5;
    pub const CLD_CONTINUED: i32 = 6;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timespec {
    pub tv_sec: i64,
    pub tv_nsec: i64,
}

impl Timespec {
    pub fn IsValid(&self) -> bool {
        return self.tv_sec >= 0 && 0 <= self.tv_nsec && self.tv_nsec < 1_000_000_000;
    }

    pub fn ToNs(&self) -> i64 {
        return self.tv_sec * 1_000_000_000 + self.tv_nsec;
    }
}
