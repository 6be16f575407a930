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

use alloc::boxed::Box;
use alloc::collections::linked_list::LinkedList;
use bit_field::BitField;
use core::fmt;

use super::auth::*;
use super::common::*;
use super::linux_def::*;

pub const UNMASKABLE_MASK: u64 =
    1 << (Signal::SIGKILL.0 - 1) | 1 << (Signal::SIGSTOP.0 - 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalSet(pub u64);

impl Default for SignalSet {
    fn default() -> Self {
        return Self(0);
    }
}

impl SignalSet {
    pub fn New(sig: Signal) -> Self {
        return SignalSet(1 << sig.Index());
    }

    pub fn MakeSignalSet(sigs: &[Signal]) -> Self {
        let mut res = Self::default();
        for sig in sigs {
            res.Add(*sig)
        }

        return res;
    }

    pub fn Add(&mut self, sig: Signal) {
        self.0.set_bit(sig.Index(), true);
    }

    pub fn Remove(&mut self, sig: Signal) {
        self.0.set_bit(sig.Index(), false);
    }

    pub fn RemoveSet(&mut self, set: SignalSet) {
        self.0 &= !set.0;
    }

    pub fn Contains(&self, sig: Signal) -> bool {
        return self.0.get_bit(sig.Index());
    }

    pub fn Empty(&self) -> bool {
        return self.0 == 0;
    }

    // FirstSignal returns the lowest-numbered signal in the set. Dequeue
    // order scans from the low bit up, so standard signals beat realtime
    // ones and SIGHUP beats everything.
    pub fn FirstSignal(&self) -> Option<Signal> {
        if self.0 == 0 {
            return None;
        }

        return Some(Signal(self.0.trailing_zeros() as i32 + 1));
    }

    pub fn ForEachSignal(&self, mut f: impl FnMut(Signal)) {
        for i in 0..64 {
            if self.0 & (1 << i) != 0 {
                f(Signal(i as i32 + 1))
            }
        }
    }
}

lazy_static! {
    // the signals which suspend a thread group from the terminal's
    // point of view
    pub static ref STOP_SIGNALS: SignalSet = SignalSet::MakeSignalSet(&[
        Signal::SIGSTOP,
        Signal::SIGTSTP,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
    ]);
}

// SignalDetails carries the siginfo payload for the class of signal being
// described. Send paths construct it through SignalOrigin so kernel and
// userspace provenance stay distinguishable without sentinel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDetails {
    None,
    Kill { pid: ThreadID, uid: UID },
    SigChld { pid: ThreadID, uid: UID, status: i32 },
    SigRt { pid: ThreadID, uid: UID, value: u64 },
    SigFault { addr: u64 },
}

impl Default for SignalDetails {
    fn default() -> Self {
        return Self::None;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalInfo {
    pub Signo: i32,
    pub Errno: i32,
    pub Code: i32,
    pub Details: SignalDetails,
}

impl fmt::Debug for SignalInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalInfo")
            .field("Signo", &self.Signo)
            .field("Code", &self.Code)
            .field("Details", &self.Details)
            .finish()
    }
}

impl SignalInfo {
    // SignalInfoPriv builds the record for a signal raised by the kernel
    // itself (SI_KERNEL).
    pub fn SignalInfoPriv(sig: Signal) -> Self {
        return Self {
            Signo: sig.0,
            Code: SignalCode::SI_KERNEL,
            ..Default::default()
        };
    }

    pub fn SignalInfoUser(sig: Signal, pid: ThreadID, uid: UID) -> Self {
        return Self {
            Signo: sig.0,
            Code: SignalCode::SI_USER,
            Details: SignalDetails::Kill { pid: pid, uid: uid },
            ..Default::default()
        };
    }

    pub fn SignalInfoTkill(sig: Signal, pid: ThreadID, uid: UID) -> Self {
        return Self {
            Signo: sig.0,
            Code: SignalCode::SI_TKILL,
            Details: SignalDetails::Kill { pid: pid, uid: uid },
            ..Default::default()
        };
    }

    pub fn SignalInfoChld(code: i32, pid: ThreadID, uid: UID, status: i32) -> Self {
        return Self {
            Signo: Signal::SIGCHLD.0,
            Code: code,
            Details: SignalDetails::SigChld {
                pid: pid,
                uid: uid,
                status: status,
            },
            ..Default::default()
        };
    }

    pub fn Sig(&self) -> Signal {
        return Signal(self.Signo);
    }
}

// SignalOrigin tags every send with its provenance. The delivery engine
// keys allocation pressure and permission handling off the tag instead of
// overloading the info record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalOrigin {
    // a kill()/raise() class syscall; builds an SI_USER record
    UserSpace { pid: ThreadID, uid: UID },
    // raised by the kernel; charged like any other send
    KernelGeneric,
    // SIGKILL/SIGSTOP style forcing; bypasses queueing, never dropped
    KernelForced,
    // caller-supplied record (rt_sigqueueinfo, child-status notification)
    Explicit(SignalInfo),
}

impl SignalOrigin {
    pub fn IsForced(&self) -> bool {
        match self {
            Self::KernelForced => return true,
            _ => return false,
        }
    }

    pub fn BuildInfo(&self, sig: Signal) -> SignalInfo {
        match self {
            Self::UserSpace { pid, uid } => {
                return SignalInfo::SignalInfoUser(sig, *pid, *uid)
            }
            Self::KernelGeneric | Self::KernelForced => {
                return SignalInfo::SignalInfoPriv(sig)
            }
            Self::Explicit(info) => return *info,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SigFlag(pub u64);

impl SigFlag {
    pub const SIGNAL_FLAG_NO_CLD_STOP: u64 = 0x00000001;
    pub const SIGNAL_FLAG_NO_CLD_WAIT: u64 = 0x00000002;
    pub const SIGNAL_FLAG_SIG_INFO: u64 = 0x00000004;
    pub const SIGNAL_FLAG_RESTORER: u64 = 0x04000000;
    pub const SIGNAL_FLAG_ON_STACK: u64 = 0x08000000;
    pub const SIGNAL_FLAG_RESTART: u64 = 0x10000000;
    pub const SIGNAL_FLAG_NO_DEFER: u64 = 0x40000000;
    pub const SIGNAL_FLAG_RESET_HANDLER: u64 = 0x80000000;

    pub fn IsNoCldStop(&self) -> bool {
        return self.0 & Self::SIGNAL_FLAG_NO_CLD_STOP != 0;
    }

    pub fn IsSigInfo(&self) -> bool {
        return self.0 & Self::SIGNAL_FLAG_SIG_INFO != 0;
    }

    pub fn IsNoDefer(&self) -> bool {
        return self.0 & Self::SIGNAL_FLAG_NO_DEFER != 0;
    }

    pub fn IsRestart(&self) -> bool {
        return self.0 & Self::SIGNAL_FLAG_RESTART != 0;
    }

    pub fn IsResetHandler(&self) -> bool {
        return self.0 & Self::SIGNAL_FLAG_RESET_HANDLER != 0;
    }

    pub fn IsOnStack(&self) -> bool {
        return self.0 & Self::SIGNAL_FLAG_ON_STACK != 0;
    }

    pub fn HasRestorer(&self) -> bool {
        return self.0 & Self::SIGNAL_FLAG_RESTORER != 0;
    }
}

#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct SigAct {
    pub handler: u64,
    pub flags: SigFlag,
    pub restorer: u64,
    pub mask: u64,
}

impl SigAct {
    // SIG_DFL: the default behavior for the signal is taken.
    pub const SIGNAL_ACT_DEFAULT: u64 = 0;

    // SIG_IGN: the signal is ignored.
    pub const SIGNAL_ACT_IGNORE: u64 = 1;
}

bitflags! {
    pub struct SignalStackFlags: u32 {
        const ON_STACK = 1;
        const DISABLE = 2;
        const AUTO_DISARM = 0x80000000;
    }
}

pub const MINSIGSTKSZ: u64 = 2048;

#[derive(Debug, Clone, Copy)]
pub struct SignalStack {
    pub addr: u64,
    pub flags: u32,
    pub size: u64,
}

impl Default for SignalStack {
    fn default() -> Self {
        return Self {
            addr: 0,
            flags: SignalStackFlags::DISABLE.bits(),
            size: 0,
        };
    }
}

impl SignalStack {
    pub fn Contains(&self, sp: u64) -> bool {
        return self.addr < sp && sp <= self.addr + self.size;
    }

    pub fn SetOnStack(&mut self) {
        self.flags |= SignalStackFlags::ON_STACK.bits();
    }

    pub fn IsEnable(&self) -> bool {
        return self.flags & SignalStackFlags::DISABLE.bits() == 0;
    }

    pub fn Top(&self) -> u64 {
        return self.addr + self.size;
    }
}

pub const SIGNAL_COUNT: usize = 64;
pub const STD_SIGNAL_COUNT: usize = 31; // 1 ~ 31
pub const RT_SIGNAL_COUNT: usize = 33; // 32 ~ 64
pub const RT_SIGNAL_START: usize = 32; // 32 ~ 64

// a queued signal entry. The charge releases its slice of the sending
// user's RLIMIT_SIGPENDING budget when the entry is freed.
pub struct PendingSignal {
    pub sigInfo: Box<SignalInfo>,
    pub charge: Option<UserCharge>,
}

#[derive(Default)]
pub struct SignalQueue {
    signals: LinkedList<PendingSignal>,
}

impl SignalQueue {
    pub fn Len(&self) -> u64 {
        return self.signals.len() as u64;
    }

    pub fn Enque(&mut self, info: Box<SignalInfo>, charge: Option<UserCharge>) {
        self.signals.push_back(PendingSignal {
            sigInfo: info,
            charge: charge,
        });
    }

    pub fn Deque(&mut self) -> Option<PendingSignal> {
        return self.signals.pop_front();
    }

    pub fn Clear(&mut self) {
        self.signals.clear();
    }
}

// how an Enque call was absorbed. Senders that queue explicitly (negative
// si_code) treat Degraded realtime sends as a hard failure; everyone else
// carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueStatus {
    // a queue entry was stored
    Queued,
    // standard signal already pending; the duplicate is discarded
    Coalesced,
    // per-user entry budget exhausted; only the membership bit is set, a
    // zero-filled info record will be synthesized at dequeue time
    Degraded,
}

pub struct PendingSignals {
    pub stdSignals: [Option<PendingSignal>; STD_SIGNAL_COUNT],
    pub rtSignals: [SignalQueue; RT_SIGNAL_COUNT],
    pub pendingSet: SignalSet,
}

impl fmt::Debug for PendingSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSignals")
            .field("pendingSet", &self.pendingSet)
            .finish()
    }
}

impl Default for PendingSignals {
    fn default() -> Self {
        return Self {
            stdSignals: core::array::from_fn(|_| None),
            rtSignals: core::array::from_fn(|_| SignalQueue::default()),
            pendingSet: Default::default(),
        };
    }
}

impl PendingSignals {
    // Enque stores info, charging the sending user's budget. Standard
    // signals coalesce: a second instance pending at the same time is
    // dropped on the floor. When the budget is exhausted a realtime signal
    // queued with a kernel-visible code fails with EAGAIN and leaves no
    // state behind; anything else degrades to a bare membership bit.
    pub fn Enque(
        &mut self,
        info: Box<SignalInfo>,
        user: &UserAccount,
        limit: u64,
    ) -> Result<EnqueueStatus> {
        let sig = info.Sig();
        if !sig.IsValid() {
            return Err(Error::SysError(SysErr::EINVAL));
        }

        // A standard signal coalesces on the membership bit, not on the
        // entry slot, so a degraded instance (bit set, no entry) absorbs
        // later sends too.
        if sig.IsStandard() && self.pendingSet.Contains(sig) {
            return Ok(EnqueueStatus::Coalesced);
        }

        let charge = user.Charge(limit);
        if charge.is_none() {
            if sig.IsRealtime() && info.Code != SignalCode::SI_USER {
                return Err(Error::SysError(SysErr::EAGAIN));
            }

            self.pendingSet.Add(sig);
            return Ok(EnqueueStatus::Degraded);
        }

        if sig.IsStandard() {
            self.stdSignals[sig.Index()] = Some(PendingSignal {
                sigInfo: info,
                charge: charge,
            });
        } else {
            self.rtSignals[sig.Index() + 1 - RT_SIGNAL_START].Enque(info, charge);
        }

        self.pendingSet.Add(sig);
        return Ok(EnqueueStatus::Queued);
    }

    // ForceSet records sig with no queue entry and no accounting. Used for
    // the forced SIGKILL/SIGSTOP path which must never fail.
    pub fn ForceSet(&mut self, sig: Signal) {
        self.pendingSet.Add(sig);
    }

    pub fn HasSignal(&self, mask: SignalSet) -> bool {
        return SignalSet(self.pendingSet.0 & !mask.0).0 != 0;
    }

    pub fn Pending(&self) -> SignalSet {
        return self.pendingSet;
    }

    // Deque returns the lowest-numbered pending signal not in mask. A
    // membership bit with no queue entry yields a zero-filled record, the
    // same degraded shape the sender was told about.
    pub fn Deque(&mut self, mask: SignalSet) -> Option<Box<SignalInfo>> {
        let set = SignalSet(self.pendingSet.0 & !mask.0);

        let sig = match set.FirstSignal() {
            None => return None,
            Some(s) => s,
        };

        if sig.IsStandard() {
            self.pendingSet.Remove(sig);
            match self.stdSignals[sig.Index()].take() {
                Some(ps) => return Some(ps.sigInfo),
                None => return Some(Self::synthesize(sig)),
            }
        }

        let q = &mut self.rtSignals[sig.Index() + 1 - RT_SIGNAL_START];
        let ps = q.Deque();
        if q.Len() == 0 {
            self.pendingSet.Remove(sig);
        }

        match ps {
            Some(ps) => return Some(ps.sigInfo),
            None => return Some(Self::synthesize(sig)),
        }
    }

    fn synthesize(sig: Signal) -> Box<SignalInfo> {
        return Box::new(SignalInfo {
            Signo: sig.0,
            ..Default::default()
        });
    }

    pub fn Discard(&mut self, sig: Signal) {
        self.pendingSet.Remove(sig);

        if sig.IsStandard() {
            self.stdSignals[sig.Index()] = None;
            return;
        }

        self.rtSignals[sig.Index() + 1 - RT_SIGNAL_START].Clear()
    }

    pub fn DiscardSet(&mut self, set: SignalSet) {
        set.ForEachSignal(|sig| {
            if self.pendingSet.Contains(sig) {
                self.Discard(sig);
            }
        });
    }

    pub fn Flush(&mut self) {
        for slot in self.stdSignals.iter_mut() {
            *slot = None;
        }

        for q in self.rtSignals.iter_mut() {
            q.Clear();
        }

        self.pendingSet = SignalSet::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserAccount {
        return UserAccount::New(1000);
    }

    #[test]
    fn test_StandardCoalesce() {
        let u = user();
        let mut p = PendingSignals::default();

        let info = SignalInfo::SignalInfoUser(Signal::SIGUSR1, 10, 1000);
        assert_eq!(
            p.Enque(Box::new(info), &u, 1024).unwrap(),
            EnqueueStatus::Queued
        );
        assert_eq!(
            p.Enque(Box::new(info), &u, 1024).unwrap(),
            EnqueueStatus::Coalesced
        );

        let got = p.Deque(SignalSet::default()).unwrap();
        assert_eq!(got.Signo, Signal::SIGUSR1.0);
        assert!(p.Deque(SignalSet::default()).is_none());

        // the coalesced duplicate must not have held a charge
        assert_eq!(u.PendingSignalCount(), 0);
    }

    #[test]
    fn test_StandardCoalescesWithBareMembershipBit() {
        let u = user();
        let mut p = PendingSignals::default();

        // only the membership bit is set, as after a forced or degraded send
        p.ForceSet(Signal::SIGUSR1);

        let info = SignalInfo::SignalInfoUser(Signal::SIGUSR1, 10, 1000);
        assert_eq!(
            p.Enque(Box::new(info), &u, 1024).unwrap(),
            EnqueueStatus::Coalesced
        );
        assert_eq!(u.PendingSignalCount(), 0);

        // the one instance dequeues with synthesized info
        let got = p.Deque(SignalSet::default()).unwrap();
        assert_eq!(got.Signo, Signal::SIGUSR1.0);
        assert_eq!(got.Code, SignalCode::SI_USER);
        assert!(p.Deque(SignalSet::default()).is_none());
    }

    #[test]
    fn test_RealtimeFifo() {
        let u = user();
        let mut p = PendingSignals::default();
        let sig = Signal(Signal::FIRST_RT_SIGNAL + 2);

        for v in 0..3u64 {
            let info = SignalInfo {
                Signo: sig.0,
                Code: SignalCode::SI_QUEUE,
                Details: SignalDetails::SigRt {
                    pid: 1,
                    uid: 1000,
                    value: v,
                },
                ..Default::default()
            };
            assert_eq!(
                p.Enque(Box::new(info), &u, 1024).unwrap(),
                EnqueueStatus::Queued
            );
        }

        for v in 0..3u64 {
            let got = p.Deque(SignalSet::default()).unwrap();
            match got.Details {
                SignalDetails::SigRt { value, .. } => assert_eq!(value, v),
                _ => panic!("wrong details {:?}", got),
            }
        }

        assert!(p.Deque(SignalSet::default()).is_none());
        assert_eq!(u.PendingSignalCount(), 0);
    }

    #[test]
    fn test_RealtimeOverLimitFails() {
        let u = user();
        let mut p = PendingSignals::default();
        let sig = Signal(Signal::FIRST_RT_SIGNAL);

        let info = SignalInfo {
            Signo: sig.0,
            Code: SignalCode::SI_QUEUE,
            ..Default::default()
        };

        assert_eq!(
            p.Enque(Box::new(info), &u, 2).unwrap(),
            EnqueueStatus::Queued
        );
        assert_eq!(
            p.Enque(Box::new(info), &u, 2).unwrap(),
            EnqueueStatus::Queued
        );

        // K+1'th explicitly queued realtime signal must fail and leave no
        // pending bit behind
        let err = p.Enque(Box::new(info), &u, 2);
        assert_eq!(err, Err(Error::SysError(SysErr::EAGAIN)));
        assert_eq!(p.rtSignals[0].Len(), 2);

        p.Deque(SignalSet::default()).unwrap();
        p.Deque(SignalSet::default()).unwrap();
        assert!(!p.pendingSet.Contains(sig));
    }

    #[test]
    fn test_StandardOverLimitDegrades() {
        let u = user();
        let mut p = PendingSignals::default();

        let _hold = u.Charge(1).unwrap();
        let info = SignalInfo::SignalInfoUser(Signal::SIGTERM, 10, 1000);
        assert_eq!(
            p.Enque(Box::new(info), &u, 1).unwrap(),
            EnqueueStatus::Degraded
        );

        // synthesized record is zero-filled apart from the number
        let got = p.Deque(SignalSet::default()).unwrap();
        assert_eq!(got.Signo, Signal::SIGTERM.0);
        assert_eq!(got.Code, SignalCode::SI_USER);
        assert_eq!(got.Details, SignalDetails::None);
    }

    #[test]
    fn test_DequeLowestFirst() {
        let u = user();
        let mut p = PendingSignals::default();

        let rt = Signal(Signal::FIRST_RT_SIGNAL);
        p.Enque(Box::new(SignalInfo::SignalInfoPriv(rt)), &u, 1024)
            .unwrap();
        p.Enque(
            Box::new(SignalInfo::SignalInfoPriv(Signal::SIGTERM)),
            &u,
            1024,
        )
        .unwrap();
        p.Enque(
            Box::new(SignalInfo::SignalInfoPriv(Signal::SIGHUP)),
            &u,
            1024,
        )
        .unwrap();

        assert_eq!(p.Deque(SignalSet::default()).unwrap().Signo, Signal::SIGHUP.0);
        assert_eq!(p.Deque(SignalSet::default()).unwrap().Signo, Signal::SIGTERM.0);
        assert_eq!(p.Deque(SignalSet::default()).unwrap().Signo, rt.0);
    }

    #[test]
    fn test_DequeRespectsMask() {
        let u = user();
        let mut p = PendingSignals::default();

        p.Enque(
            Box::new(SignalInfo::SignalInfoPriv(Signal::SIGHUP)),
            &u,
            1024,
        )
        .unwrap();
        p.Enque(
            Box::new(SignalInfo::SignalInfoPriv(Signal::SIGTERM)),
            &u,
            1024,
        )
        .unwrap();

        let mask = SignalSet::New(Signal::SIGHUP);
        assert_eq!(p.Deque(mask).unwrap().Signo, Signal::SIGTERM.0);
        assert!(p.Deque(mask).is_none());
        assert!(p.HasSignal(SignalSet::default()));
    }

    #[test]
    fn test_DiscardDropsQueue() {
        let u = user();
        let mut p = PendingSignals::default();
        let sig = Signal(Signal::FIRST_RT_SIGNAL + 1);

        for _ in 0..4 {
            p.Enque(Box::new(SignalInfo::SignalInfoPriv(sig)), &u, 1024)
                .unwrap();
        }
        assert_eq!(u.PendingSignalCount(), 4);

        p.Discard(sig);
        assert!(!p.pendingSet.Contains(sig));
        assert_eq!(u.PendingSignalCount(), 0);
        assert!(p.Deque(SignalSet::default()).is_none());
    }

    #[test]
    fn test_ForceSetSynthesizes() {
        let mut p = PendingSignals::default();
        p.ForceSet(Signal::SIGKILL);

        let got = p.Deque(SignalSet::default()).unwrap();
        assert_eq!(got.Signo, Signal::SIGKILL.0);
        assert_eq!(got.Code, SignalCode::SI_USER);
    }
}
