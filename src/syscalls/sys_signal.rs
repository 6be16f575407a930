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
use alloc::vec::Vec;

use super::super::auth::*;
use super::super::common::*;
use super::super::linux_def::*;
use super::super::signal_def::*;
use super::super::threadmgr::thread::*;
use super::super::threadmgr::thread_group::*;

// mayKill decides whether the calling thread may send sig to the target
// thread group, analogous to Linux's kernel/signal.c:check_kill_permission().
// A signal may be sent if the sender holds CAP_KILL, if either of its real
// or effective uids matches the target's real or saved uid, or, for SIGCONT,
// if the target is in the same session.
pub fn mayKill(t: &Thread, target: &ThreadGroup, sig: Signal) -> bool {
    let creds = t.Credentials();
    if creds.HasCapability(Capability::CAP_KILL) {
        return true;
    }

    let tcreds = match target.Leader() {
        None => return false,
        Some(l) => l.Credentials(),
    };

    let ruid = creds.lock().RealKUID;
    let euid = creds.lock().EffectiveKUID;
    let truid = tcreds.lock().RealKUID;
    let tsuid = tcreds.lock().SavedKUID;

    if euid == tsuid || euid == truid || ruid == tsuid || ruid == truid {
        return true;
    }

    if sig == Signal::SIGCONT {
        let tg = t.ThreadGroup();
        match (tg.Session(), target.Session()) {
            (Some(s1), Some(s2)) => {
                if s1 == s2 {
                    return true;
                }
            }
            _ => (),
        }
    }

    return false;
}

fn userOrigin(t: &Thread) -> SignalOrigin {
    return SignalOrigin::UserSpace {
        pid: t.ThreadGroup().ID(),
        uid: t.Credentials().lock().RealKUID,
    };
}

// sendGroupSignal delivers sig to the target thread group after the
// permission gate. sig 0 is a pure permission probe.
fn sendGroupSignal(t: &Thread, target: &ThreadGroup, sig: Signal) -> Result<()> {
    if !mayKill(t, target, sig) {
        return Err(Error::SysError(SysErr::EPERM));
    }

    if sig.0 == 0 {
        return Ok(());
    }

    return target.SendSignal(sig, &userOrigin(t));
}

// Kill implements the pid conventions of kill(2):
//
//	pid > 0: the thread group with that id.
//	pid == 0: every thread group in the caller's process group.
//	pid == -1: every thread group except init and the caller's own.
//	pid < -1: every thread group in process group -pid.
//
pub fn Kill(t: &Thread, pid: ThreadID, sig: Signal) -> Result<()> {
    if !sig.IsValid() && sig.0 != 0 {
        return Err(Error::SysError(SysErr::EINVAL));
    }

    let ts = t.TaskSet();

    if pid > 0 {
        let target = match ts.ThreadGroupWithID(pid) {
            None => return Err(Error::SysError(SysErr::ESRCH)),
            Some(tg) => tg,
        };

        let _r = ts.ReadLock();
        return sendGroupSignal(t, &target, sig);
    }

    if pid == -1 {
        let _r = ts.ReadLock();
        let own = t.ThreadGroup();

        let mut targets = Vec::new();
        ts.forEachThreadGroupLocked(|tg| {
            if tg.ID() == INIT_TID || *tg == own {
                return;
            }

            targets.push(tg.clone());
        });

        // one accessible target is enough for success
        let mut last = Err(Error::SysError(SysErr::ESRCH));
        let mut delivered = 0;
        for target in &targets {
            match sendGroupSignal(t, target, sig) {
                Ok(()) => delivered += 1,
                Err(e) => last = Err(e),
            }
        }

        if delivered > 0 {
            return Ok(());
        }

        return last;
    }

    // pid == 0 targets the caller's own process group
    let pgid = if pid == 0 {
        match t.ThreadGroup().ProcessGroup() {
            None => return Err(Error::SysError(SysErr::ESRCH)),
            Some(pg) => pg.ID(),
        }
    } else {
        -pid
    };

    let _r = ts.ReadLock();
    let mut targets = Vec::new();
    ts.forEachThreadGroupLocked(|tg| {
        let tgid = match tg.ProcessGroup() {
            None => return,
            Some(pg) => pg.ID(),
        };

        if tgid == pgid {
            targets.push(tg.clone());
        }
    });

    if targets.is_empty() {
        return Err(Error::SysError(SysErr::ESRCH));
    }

    let mut last = Err(Error::SysError(SysErr::EPERM));
    let mut delivered = 0;
    for target in &targets {
        match sendGroupSignal(t, target, sig) {
            Ok(()) => delivered += 1,
            Err(e) => last = Err(e),
        }
    }

    if delivered > 0 {
        return Ok(());
    }

    return last;
}

fn tkillSigInfo(t: &Thread, sig: Signal) -> SignalInfo {
    return SignalInfo::SignalInfoTkill(
        sig,
        t.ThreadGroup().ID(),
        t.Credentials().lock().RealKUID,
    );
}

// Tkill implements tkill(2): a signal sent to one specific thread.
pub fn Tkill(t: &Thread, tid: ThreadID, sig: Signal) -> Result<()> {
    if tid <= 0 || (!sig.IsValid() && sig.0 != 0) {
        return Err(Error::SysError(SysErr::EINVAL));
    }

    let ts = t.TaskSet();
    let target = match ts.TaskWithID(tid) {
        None => return Err(Error::SysError(SysErr::ESRCH)),
        Some(t2) => t2,
    };

    if !mayKill(t, &target.ThreadGroup(), sig) {
        return Err(Error::SysError(SysErr::EPERM));
    }

    if sig.0 == 0 {
        return Ok(());
    }

    return target.SendSignal(sig, &SignalOrigin::Explicit(tkillSigInfo(t, sig)));
}

// Tgkill implements tgkill(2): like tkill, but the thread must also belong
// to the named thread group.
pub fn Tgkill(t: &Thread, tgid: ThreadID, tid: ThreadID, sig: Signal) -> Result<()> {
    if tgid <= 0 || tid <= 0 || (!sig.IsValid() && sig.0 != 0) {
        return Err(Error::SysError(SysErr::EINVAL));
    }

    let ts = t.TaskSet();
    let target = match ts.TaskWithID(tid) {
        None => return Err(Error::SysError(SysErr::ESRCH)),
        Some(t2) => t2,
    };

    if target.ThreadGroup().ID() != tgid {
        return Err(Error::SysError(SysErr::ESRCH));
    }

    if !mayKill(t, &target.ThreadGroup(), sig) {
        return Err(Error::SysError(SysErr::EPERM));
    }

    if sig.0 == 0 {
        return Ok(());
    }

    return target.SendSignal(sig, &SignalOrigin::Explicit(tkillSigInfo(t, sig)));
}

// RtSigqueueinfo implements rt_sigqueueinfo(2). Userspace must not forge a
// kernel-reserved si_code when signalling another process.
pub fn RtSigqueueinfo(t: &Thread, pid: ThreadID, sig: Signal, info: SignalInfo) -> Result<()> {
    if info.Code >= 0 && info.Code != SignalCode::SI_TKILL && t.ThreadGroup().ID() != pid {
        return Err(Error::SysError(SysErr::EPERM));
    }

    if info.Signo != sig.0 {
        return Err(Error::SysError(SysErr::EINVAL));
    }

    let ts = t.TaskSet();
    let target = match ts.ThreadGroupWithID(pid) {
        None => return Err(Error::SysError(SysErr::ESRCH)),
        Some(tg) => tg,
    };

    let _r = ts.ReadLock();
    if !mayKill(t, &target, sig) {
        return Err(Error::SysError(SysErr::EPERM));
    }

    if sig.0 == 0 {
        return Ok(());
    }

    return target.SendSignal(sig, &SignalOrigin::Explicit(info));
}

// RtTgsigqueueinfo implements rt_tgsigqueueinfo(2): the thread-directed
// flavor of RtSigqueueinfo.
pub fn RtTgsigqueueinfo(
    t: &Thread,
    tgid: ThreadID,
    tid: ThreadID,
    sig: Signal,
    info: SignalInfo,
) -> Result<()> {
    if tgid <= 0 || tid <= 0 {
        return Err(Error::SysError(SysErr::EINVAL));
    }

    if info.Code >= 0 && info.Code != SignalCode::SI_TKILL && t.ThreadGroup().ID() != tgid {
        return Err(Error::SysError(SysErr::EPERM));
    }

    if info.Signo != sig.0 {
        return Err(Error::SysError(SysErr::EINVAL));
    }

    let ts = t.TaskSet();
    let target = match ts.TaskWithID(tid) {
        None => return Err(Error::SysError(SysErr::ESRCH)),
        Some(t2) => t2,
    };

    if target.ThreadGroup().ID() != tgid {
        return Err(Error::SysError(SysErr::ESRCH));
    }

    if !mayKill(t, &target.ThreadGroup(), sig) {
        return Err(Error::SysError(SysErr::EPERM));
    }

    if sig.0 == 0 {
        return Ok(());
    }

    return target.SendSignal(sig, &SignalOrigin::Explicit(info));
}

// RtSigaction implements rt_sigaction(2).
pub fn RtSigaction(t: &Thread, sig: Signal, act: Option<SigAct>) -> Result<SigAct> {
    return t.ThreadGroup().SetSignalAct(sig, &act);
}

// RtSigprocmask implements rt_sigprocmask(2).
pub fn RtSigprocmask(t: &Thread, how: u64, set: Option<SignalSet>) -> Result<SignalSet> {
    return t.SigProcMask(how, set);
}

// RtSigpending implements rt_sigpending(2).
pub fn RtSigpending(t: &Thread) -> SignalSet {
    return t.SigPending();
}

// RtSigtimedwait implements rt_sigtimedwait(2). timeout == None waits
// forever.
pub fn RtSigtimedwait(
    t: &Thread,
    set: SignalSet,
    timeout: Option<Timespec>,
) -> Result<Box<SignalInfo>> {
    let timeoutNs = match timeout {
        None => None,
        Some(ts) => {
            if !ts.IsValid() {
                return Err(Error::SysError(SysErr::EINVAL));
            }

            Some(ts.ToNs())
        }
    };

    return t.Sigtimedwait(set, timeoutNs);
}

// RtSigsuspend implements rt_sigsuspend(2).
pub fn RtSigsuspend(t: &Thread, mask: SignalSet) -> Result<()> {
    return t.Sigsuspend(mask);
}

// Sigaltstack implements sigaltstack(2). sp is the caller's current stack
// pointer, used both to report the ON_STACK flag and to refuse changing a
// stack that is in use.
pub fn Sigaltstack(t: &Thread, ss: Option<SignalStack>, sp: u64) -> Result<SignalStack> {
    let old = t.SignalStack(sp);

    match ss {
        None => (),
        Some(ss) => t.SetSignalStack(ss, sp)?,
    }

    return Ok(old);
}

// Pause implements pause(2).
pub fn Pause(t: &Thread) -> Result<()> {
    return t.Pause();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threadmgr::task_signals::*;
    use crate::threadmgr::threads::*;
    use alloc::sync::Arc;

    fn blocker() -> Arc<dyn Blocker> {
        return Arc::new(NopBlocker {});
    }

    fn newTaskSet() -> TaskSet {
        let ts = TaskSet::New();
        ts.CreateProcess(None, &Credentials::NewRootCredentials(), blocker())
            .unwrap();
        return ts;
    }

    fn rootProcess(ts: &TaskSet) -> Thread {
        return ts
            .CreateProcess(None, &Credentials::NewRootCredentials(), blocker())
            .unwrap();
    }

    fn userProcess(ts: &TaskSet, uid: UID, parent: Option<Thread>) -> Thread {
        return ts
            .CreateProcess(parent, &Credentials::NewUserCredentials(uid, uid), blocker())
            .unwrap();
    }

    fn handlerAct() -> SigAct {
        return SigAct {
            handler: 0x7000_0000,
            ..Default::default()
        };
    }

    #[test]
    fn test_KillPermissionDenied() {
        let ts = newTaskSet();
        let sender = userProcess(&ts, 1000, None);
        let victim = rootProcess(&ts);

        let res = Kill(&sender, victim.ThreadID(), Signal::SIGTERM);
        assert_eq!(res, Err(Error::SysError(SysErr::EPERM)));
        assert_eq!(victim.PendingSignals(), SignalSet(0));

        // the permission probe is gated the same way
        let res = Kill(&sender, victim.ThreadID(), Signal(0));
        assert_eq!(res, Err(Error::SysError(SysErr::EPERM)));
    }

    #[test]
    fn test_KillMatchingUidAllowed() {
        let ts = newTaskSet();
        let sender = userProcess(&ts, 1000, None);
        let victim = userProcess(&ts, 1000, None);
        victim
            .ThreadGroup()
            .SetSignalAct(Signal::SIGTERM, &Some(handlerAct()))
            .unwrap();

        Kill(&sender, victim.ThreadID(), Signal::SIGTERM).unwrap();
        assert!(victim.PendingSignals().Contains(Signal::SIGTERM));

        // sig 0 probes without queueing anything
        Kill(&sender, victim.ThreadID(), Signal(0)).unwrap();
    }

    #[test]
    fn test_KillRootMayKillAnyone() {
        let ts = newTaskSet();
        let root = rootProcess(&ts);
        let victim = userProcess(&ts, 1000, None);
        victim
            .ThreadGroup()
            .SetSignalAct(Signal::SIGHUP, &Some(handlerAct()))
            .unwrap();

        Kill(&root, victim.ThreadID(), Signal::SIGHUP).unwrap();
        assert!(victim.PendingSignals().Contains(Signal::SIGHUP));
    }

    #[test]
    fn test_SigcontCrossesUidWithinSession() {
        let ts = newTaskSet();
        let parent = userProcess(&ts, 1000, None);
        // same session (inherited process group), different uid
        let other = userProcess(&ts, 2000, Some(parent.clone()));

        // SIGCONT passes the gate; SIGTERM does not
        Kill(&parent, other.ThreadID(), Signal::SIGCONT).unwrap();
        let res = Kill(&parent, other.ThreadID(), Signal::SIGTERM);
        assert_eq!(res, Err(Error::SysError(SysErr::EPERM)));
    }

    #[test]
    fn test_KillUnknownPid() {
        let ts = newTaskSet();
        let sender = rootProcess(&ts);

        let res = Kill(&sender, 9999, Signal::SIGTERM);
        assert_eq!(res, Err(Error::SysError(SysErr::ESRCH)));
    }

    #[test]
    fn test_KillOwnProcessGroup() {
        let ts = newTaskSet();
        let parent = rootProcess(&ts);
        let child = userProcess(&ts, 1000, Some(parent.clone()));
        for tg in [&parent.ThreadGroup(), &child.ThreadGroup()] {
            tg.SetSignalAct(Signal::SIGUSR1, &Some(handlerAct())).unwrap();
        }

        // pid 0: both members of the caller's process group get the signal
        Kill(&parent, 0, Signal::SIGUSR1).unwrap();
        assert!(parent.PendingSignals().Contains(Signal::SIGUSR1));
        assert!(child.PendingSignals().Contains(Signal::SIGUSR1));
    }

    #[test]
    fn test_KillNegativePidTargetsProcessGroup() {
        let ts = newTaskSet();
        let parent = rootProcess(&ts);
        let child = userProcess(&ts, 1000, Some(parent.clone()));
        let outsider = rootProcess(&ts);
        for tg in [&parent.ThreadGroup(), &child.ThreadGroup(), &outsider.ThreadGroup()] {
            tg.SetSignalAct(Signal::SIGUSR2, &Some(handlerAct())).unwrap();
        }

        let pgid = parent.ThreadGroup().ProcessGroup().unwrap().ID();
        Kill(&outsider, -pgid, Signal::SIGUSR2).unwrap();
        assert!(parent.PendingSignals().Contains(Signal::SIGUSR2));
        assert!(child.PendingSignals().Contains(Signal::SIGUSR2));
        assert!(!outsider.PendingSignals().Contains(Signal::SIGUSR2));

        // an empty process group is ESRCH
        let res = Kill(&outsider, -30000, Signal::SIGUSR2);
        assert_eq!(res, Err(Error::SysError(SysErr::ESRCH)));
    }

    #[test]
    fn test_KillBroadcastSkipsInitAndSelf() {
        let ts = newTaskSet();
        let sender = rootProcess(&ts);
        let other = userProcess(&ts, 1000, None);
        other
            .ThreadGroup()
            .SetSignalAct(Signal::SIGUSR1, &Some(handlerAct()))
            .unwrap();

        let init = ts.TaskWithID(INIT_TID).unwrap();

        Kill(&sender, -1, Signal::SIGUSR1).unwrap();
        assert!(other.PendingSignals().Contains(Signal::SIGUSR1));
        assert!(!sender.PendingSignals().Contains(Signal::SIGUSR1));
        assert_eq!(init.PendingSignals(), SignalSet(0));
    }

    #[test]
    fn test_TkillValidation() {
        let ts = newTaskSet();
        let sender = rootProcess(&ts);

        let res = Tkill(&sender, 0, Signal::SIGTERM);
        assert_eq!(res, Err(Error::SysError(SysErr::EINVAL)));
        let res = Tkill(&sender, -2, Signal::SIGTERM);
        assert_eq!(res, Err(Error::SysError(SysErr::EINVAL)));
        let res = Tkill(&sender, 9999, Signal::SIGTERM);
        assert_eq!(res, Err(Error::SysError(SysErr::ESRCH)));
    }

    #[test]
    fn test_TkillTargetsOneThread() {
        let ts = newTaskSet();
        let sender = rootProcess(&ts);
        let victim = userProcess(&ts, 1000, None);
        let worker = victim.NewThread(blocker(), "worker").unwrap();
        victim
            .ThreadGroup()
            .SetSignalAct(Signal::SIGUSR1, &Some(handlerAct()))
            .unwrap();

        Tkill(&sender, worker.ThreadID(), Signal::SIGUSR1).unwrap();

        // private queue of the named thread only
        assert!(worker
            .lock()
            .pendingSignals
            .pendingSet
            .Contains(Signal::SIGUSR1));
        assert!(!victim
            .lock()
            .pendingSignals
            .pendingSet
            .Contains(Signal::SIGUSR1));

        // the info carries the sender, with the tkill code
        match worker.RunInterrupt() {
            SignalDisposition::Handler { info, .. } => {
                assert_eq!(info.Code, SignalCode::SI_TKILL);
                match info.Details {
                    SignalDetails::Kill { pid, .. } => {
                        assert_eq!(pid, sender.ThreadGroup().ID())
                    }
                    d => panic!("wrong details {:?}", d),
                }
            }
            d => panic!("wrong disposition {:?}", d),
        }
    }

    #[test]
    fn test_TgkillChecksMembership() {
        let ts = newTaskSet();
        let sender = rootProcess(&ts);
        let a = userProcess(&ts, 1000, None);
        let b = userProcess(&ts, 1000, None);

        let res = Tgkill(&sender, a.ThreadGroup().ID(), b.ThreadID(), Signal::SIGTERM);
        assert_eq!(res, Err(Error::SysError(SysErr::ESRCH)));

        let res = Tgkill(&sender, 0, a.ThreadID(), Signal::SIGTERM);
        assert_eq!(res, Err(Error::SysError(SysErr::EINVAL)));
    }

    #[test]
    fn test_SigqueueinfoSpoofRejected() {
        let ts = newTaskSet();
        let sender = rootProcess(&ts);
        let victim = userProcess(&ts, 1000, None);

        // a kernel si_code aimed at another process is forgery
        let forged = SignalInfo {
            Signo: Signal::SIGUSR1.0,
            Code: SignalCode::SI_KERNEL,
            ..Default::default()
        };
        let res = RtSigqueueinfo(&sender, victim.ThreadID(), Signal::SIGUSR1, forged);
        assert_eq!(res, Err(Error::SysError(SysErr::EPERM)));

        // the same record sent to itself is allowed
        sender
            .ThreadGroup()
            .SetSignalAct(Signal::SIGUSR1, &Some(handlerAct()))
            .unwrap();
        RtSigqueueinfo(&sender, sender.ThreadGroup().ID(), Signal::SIGUSR1, forged).unwrap();
        assert!(sender.PendingSignals().Contains(Signal::SIGUSR1));
    }

    #[test]
    fn test_SigqueueinfoRealtimeOverLimit() {
        let ts = newTaskSet();
        let sender = rootProcess(&ts);
        let victim = userProcess(&ts, 1000, None);
        let sig = Signal(Signal::FIRST_RT_SIGNAL);
        victim
            .ThreadGroup()
            .SetSignalAct(sig, &Some(handlerAct()))
            .unwrap();

        victim.ThreadGroup().Limits().Set(
            crate::limits::LimitType::SignalsPending,
            crate::limits::Limit { Cur: 1, Max: 1 },
        );

        let info = SignalInfo {
            Signo: sig.0,
            Code: SignalCode::SI_QUEUE,
            Details: SignalDetails::SigRt {
                pid: sender.ThreadGroup().ID(),
                uid: 0,
                value: 7,
            },
            ..Default::default()
        };

        RtSigqueueinfo(&sender, victim.ThreadGroup().ID(), sig, info).unwrap();
        let res = RtSigqueueinfo(&sender, victim.ThreadGroup().ID(), sig, info);
        assert_eq!(res, Err(Error::SysError(SysErr::EAGAIN)));
    }

    #[test]
    fn test_SigprocmaskBadHow() {
        let ts = newTaskSet();
        let t = rootProcess(&ts);

        let res = RtSigprocmask(&t, 99, Some(SignalSet(1)));
        assert_eq!(res, Err(Error::SysError(SysErr::EINVAL)));

        RtSigprocmask(&t, SigHow::SIG_BLOCK, Some(SignalSet::New(Signal::SIGHUP))).unwrap();
        let old =
            RtSigprocmask(&t, SigHow::SIG_UNBLOCK, Some(SignalSet::New(Signal::SIGHUP))).unwrap();
        assert!(old.Contains(Signal::SIGHUP));
        assert!(!t.SignalMask().Contains(Signal::SIGHUP));
    }

    #[test]
    fn test_SigpendingShowsOnlyBlocked() {
        let ts = newTaskSet();
        let t = rootProcess(&ts);

        t.SetSignalMask(SignalSet::New(Signal::SIGUSR1));
        t.SendSignal(Signal::SIGUSR1, &SignalOrigin::KernelGeneric)
            .unwrap();

        assert!(RtSigpending(&t).Contains(Signal::SIGUSR1));
    }

    #[test]
    fn test_SigtimedwaitRejectsBadTimeout() {
        let ts = newTaskSet();
        let t = rootProcess(&ts);

        let bad = Timespec {
            tv_sec: -1,
            tv_nsec: 0,
        };
        let res = RtSigtimedwait(&t, SignalSet::New(Signal::SIGUSR1), Some(bad));
        assert_eq!(res.err(), Some(Error::SysError(SysErr::EINVAL)));
    }

    #[test]
    fn test_SigaltstackValidation() {
        let ts = newTaskSet();
        let t = rootProcess(&ts);

        // default: disabled
        let old = Sigaltstack(&t, None, 0x5000).unwrap();
        assert!(!old.IsEnable());

        // too small
        let small = SignalStack {
            addr: 0x10000,
            flags: 0,
            size: MINSIGSTKSZ - 1,
        };
        let res = Sigaltstack(&t, Some(small), 0x5000);
        assert_eq!(res.err(), Some(Error::SysError(SysErr::ENOMEM)));

        // install a valid stack
        let ss = SignalStack {
            addr: 0x10000,
            flags: 0,
            size: 0x4000,
        };
        Sigaltstack(&t, Some(ss), 0x5000).unwrap();

        // running on it: reported ON_STACK and immutable
        let cur = Sigaltstack(&t, None, 0x12000).unwrap();
        assert!(cur.flags & SignalStackFlags::ON_STACK.bits() != 0);
        let res = Sigaltstack(&t, Some(ss), 0x12000);
        assert_eq!(res.err(), Some(Error::SysError(SysErr::EPERM)));
    }

    #[test]
    fn test_PauseReturnsEintr() {
        let ts = newTaskSet();
        let t = rootProcess(&ts);

        assert_eq!(Pause(&t).err(), Some(Error::SysError(SysErr::EINTR)));
    }
}
