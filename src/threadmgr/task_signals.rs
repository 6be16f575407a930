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
use alloc::sync::Arc;

use super::super::common::*;
use super::super::limits::*;
use super::super::linux_def::*;
use super::super::signal_def::*;
use super::super::signal_handlers::*;
use super::task_exit::*;
use super::task_stop::*;
use super::thread::*;
use super::thread_group::*;

// TracerAction is a tracer's verdict on a signal about to be delivered to
// its tracee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracerAction {
    // deliver the signal as dequeued
    Deliver,
    // suppress the signal
    Cancel,
    // deliver a different signal instead
    Replace(Signal),
}

// Tracer is the ptrace seam: a traced thread reports every dequeued signal
// (except SIGKILL) here, with the signal mutex dropped, before acting on it.
pub trait Tracer: Send + Sync {
    fn NotifySignal(&self, t: &Thread, info: &SignalInfo) -> TracerAction;
}

// SignalDisposition tells the calling thread what to do after a pass
// through the dequeue loop.
#[derive(Debug)]
pub enum SignalDisposition {
    // no deliverable signal; return to userspace
    None,
    // invoke a user handler; restoreMask is the mask sigreturn(2) puts back
    Handler {
        info: Box<SignalInfo>,
        act: SigAct,
        restoreMask: SignalSet,
    },
    // the thread has entered a group stop
    GroupStop(Signal),
    // the thread group is exiting; the thread must run its exit path
    Exit(ExitStatus),
}

impl SignalDisposition {
    pub fn RunState(&self) -> TaskRunState {
        match self {
            Self::None => return TaskRunState::RunApp,
            Self::Handler { .. } => return TaskRunState::RunSyscallRet,
            Self::GroupStop(_) => return TaskRunState::RunInterrupt,
            Self::Exit(_) => return TaskRunState::RunExit,
        }
    }
}

enum Step {
    Continue,
    Return(SignalDisposition),
}

impl ThreadInternal {
    // dequeueSignalLocked returns a pending signal that is *not* included in
    // mask. Private signals are drained before group-directed ones.
    //
    // Preconditions: The signal mutex must be locked.
    pub fn dequeueSignalLocked(&mut self, mask: SignalSet) -> Option<Box<SignalInfo>> {
        match self.pendingSignals.Deque(mask) {
            Some(si) => return Some(si),
            None => (),
        };

        return self.tg.lock().pendingSignals.Deque(mask);
    }

    // participateGroupStopLocked is called to handle thread group side effects
    // after t unsets t.groupStopPending. The caller must handle task side
    // effects (e.g. placing the task into the group stop). It returns true if
    // the caller must notify t.tg.leader's parent of a completed group stop
    // (which participateGroupStopLocked cannot do due to holding the wrong
    // locks).
    //
    // Preconditions: The signal mutex must be locked.
    pub fn participateGroupStopLocked(&mut self) -> bool {
        if self.groupStopAcknowledged {
            return false;
        }

        self.groupStopAcknowledged = true;
        let mut tg = self.tg.lock();
        tg.groupStopPendingCount -= 1;

        if tg.groupStopPendingCount != 0 {
            return false;
        }

        if tg.groupStopComplete {
            return false;
        }

        tg.groupStopComplete = true;
        return true;
    }
}

impl Thread {
    // canReceiveSignalLocked returns true if t should be interrupted to
    // receive the given signal. canReceiveSignalLocked is analogous to
    // Linux's kernel/signal.c:wants_signal().
    //
    // Preconditions: The signal mutex must be locked.
    pub fn canReceiveSignalLocked(&self, sig: Signal) -> bool {
        // - Do not choose tasks that are blocking the signal.
        if self.lock().signalMask.Contains(sig) {
            return false;
        }

        // - Do not choose tasks that have entered the exit path.
        if self.lock().IsExiting() {
            return false;
        }

        // - SIGKILL is taken regardless of stops or prior interrupts.
        if sig == Signal::SIGKILL {
            return true;
        }

        // - Do not choose stopped tasks, which cannot handle signals.
        if self.lock().Stopped() {
            return false;
        }

        // - Do not choose tasks that have already been interrupted, as they
        // may be busy handling another signal.
        if self.lock().interrupted {
            return false;
        }

        return true;
    }

    // signalWakeUpLocked interrupts t so that it revisits the dequeue loop.
    // If resume is true a killable stop is also ended, allowing a stopped
    // thread to take a fatal signal.
    //
    // Preconditions: The signal mutex must be locked.
    pub fn signalWakeUpLocked(&self, resume: bool) {
        let mut t = self.lock();
        t.interrupt();

        if resume {
            match &t.stop {
                Some(s) => {
                    if s.Killable() {
                        t.endInternalStopLocked();
                    }
                }
                None => (),
            }
        }
    }

    // forceSignal ensures that the task is not ignoring or blocking the given
    // signal, then sends it. Used for synchronous faults whose delivery must
    // not be suppressible.
    pub fn forceSignal(&self, sig: Signal) -> Result<()> {
        let tg = self.lock().tg.clone();
        let ts = tg.TaskSet();
        let _r = ts.ReadLock();

        let lock = tg.lock().signalLock.clone();
        let _s = lock.lock();

        self.forceSignalLocked(sig);
        return self.sendSignalLocked(sig, &SignalOrigin::KernelGeneric, false);
    }

    // Preconditions: The signal mutex must be locked.
    pub fn forceSignalLocked(&self, sig: Signal) {
        let tg = self.lock().tg.clone();
        let sh = tg.lock().signalHandlers.clone();

        let blocked = self.lock().signalMask.Contains(sig);
        let mut act = sh.GetAct(sig);
        let ignored = act.handler == SigAct::SIGNAL_ACT_IGNORE;

        if blocked || ignored {
            act.handler = SigAct::SIGNAL_ACT_DEFAULT;
            sh.SetAct(sig, &act);
            if blocked {
                let mask = self.lock().signalMask;
                self.setSignalMaskLocked(SignalSet(mask.0 & !SignalSet::New(sig).0));
            }
        }
    }

    // Preconditions: The signal mutex must be locked.
    pub fn setSignalMaskLocked(&self, mask: SignalSet) {
        let mask = SignalSet(mask.0 & !UNMASKABLE_MASK);

        let oldMask = self.lock().signalMask;
        self.lock().signalMask = mask;

        // If the new mask blocks any signals that were not blocked by the old
        // mask, and at least one such signal is pending in tg.pendingSignals,
        // and t has been woken, it could be the case that t was woken to
        // handle that signal, but will no longer do so as a result of its new
        // signal mask, so we have to pick a replacement.
        let tg = self.lock().tg.clone();
        let blocked = mask.0 & !oldMask.0;
        let blockedGroupPending = SignalSet(blocked & tg.lock().pendingSignals.pendingSet.0);
        if blockedGroupPending.0 != 0 && self.lock().interrupted {
            blockedGroupPending.ForEachSignal(|sig| {
                match tg.lock().findSignalReceiverLocked(sig) {
                    Some(nt) => nt.interrupt(),
                    None => (),
                };
            });
        }

        // Conversely, if the new mask unblocks any signals that were blocked
        // by the old mask, and at least one such signal is pending, we may
        // now need to handle that signal.
        let unblocked = oldMask.0 & !mask.0;
        let pendingSet = self.lock().pendingSignals.pendingSet.0;
        let tgPendingSet = tg.lock().pendingSignals.pendingSet.0;
        if unblocked & (pendingSet | tgPendingSet) != 0 {
            self.lock().interrupt();
        }
    }

    // SetSignalMask sets t's signal mask.
    pub fn SetSignalMask(&self, mask: SignalSet) {
        let tg = self.lock().tg.clone();
        let lock = tg.lock().signalLock.clone();
        let _s = lock.lock();

        self.setSignalMaskLocked(mask);
    }

    // SigProcMask implements the semantics of rt_sigprocmask(2).
    pub fn SigProcMask(&self, how: u64, set: Option<SignalSet>) -> Result<SignalSet> {
        let oldMask = self.SignalMask();

        match set {
            None => (),
            Some(s) => {
                let newMask = match how {
                    SigHow::SIG_BLOCK => SignalSet(oldMask.0 | s.0),
                    SigHow::SIG_UNBLOCK => SignalSet(oldMask.0 & !s.0),
                    SigHow::SIG_SETMASK => s,
                    _ => return Err(Error::SysError(SysErr::EINVAL)),
                };

                self.SetSignalMask(newMask);
            }
        }

        return Ok(oldMask);
    }

    // SendSignal sends the given signal to t.
    //
    // The following errors may be returned:
    //
    //	ESRCH - The task has exited.
    //	EINVAL - The signal is not valid.
    //	EAGAIN - The signal is realtime, and cannot be queued.
    //
    pub fn SendSignal(&self, sig: Signal, origin: &SignalOrigin) -> Result<()> {
        let tg = self.lock().tg.clone();
        let ts = tg.TaskSet();
        let _r = ts.ReadLock();

        let lock = tg.lock().signalLock.clone();
        let _s = lock.lock();

        return self.sendSignalLocked(sig, origin, false);
    }

    // SendGroupSignal sends the given signal to t's thread group.
    pub fn SendGroupSignal(&self, sig: Signal, origin: &SignalOrigin) -> Result<()> {
        let tg = self.lock().tg.clone();
        let ts = tg.TaskSet();
        let _r = ts.ReadLock();

        let lock = tg.lock().signalLock.clone();
        let _s = lock.lock();

        return self.sendSignalLocked(sig, origin, true);
    }

    // Preconditions: The TaskSet mutex and the signal mutex must be locked.
    pub fn sendSignalLocked(&self, sig: Signal, origin: &SignalOrigin, group: bool) -> Result<()> {
        if self.lock().exitState == TaskExitState::TaskExitDead {
            return Err(Error::SysError(SysErr::ESRCH));
        }

        if sig.0 == 0 {
            return Ok(());
        }

        if !sig.IsValid() {
            return Err(Error::SysError(SysErr::EINVAL));
        }

        let info = origin.BuildInfo(sig);

        // A group that is already committed to exiting takes no new signals;
        // every member already has SIGKILL pending. Forced sends still land.
        let tg = self.lock().tg.clone();
        if tg.lock().exiting && !origin.IsForced() {
            return Ok(());
        }

        // Signal side effects apply even if the signal is ultimately discarded.
        tg.lock().applySignalSideEffectsLocked(sig);

        // The forced path never allocates and never fails: only the
        // membership bit is set.
        if origin.IsForced() {
            if !group {
                self.lock().pendingSignals.ForceSet(sig);
                self.signalWakeUpLocked(true);
            } else {
                tg.lock().pendingSignals.ForceSet(sig);
                tg.lock().completeGroupSignalLocked(sig, self);
            }

            return Ok(());
        }

        // Unmasked, ignored signals are discarded without being queued,
        // unless they will be visible to a tracer. Even for group signals,
        // it's the originally-targeted task's signal mask and tracer that
        // matter; compare Linux's kernel/signal.c:__send_signal() =>
        // prepare_signal() => sig_ignored().
        let sh = tg.lock().signalHandlers.clone();
        let ignored = ComputeAction(sig, &sh.GetAct(sig)) == SignalAction::IGNORE;
        let sigset = SignalSet::New(sig);
        let signalMask = self.lock().signalMask;
        let realSignalMask = self.lock().realSignalMask;
        let traced = self.lock().tracer.is_some();
        if sigset.0 & signalMask.0 == 0 && sigset.0 & realSignalMask.0 == 0 && ignored && !traced {
            debug!("Discarding ignored signal {:?}", sig);
            return Ok(());
        }

        let account = self.lock().account.clone();
        let limit = tg.Limits().Get(LimitType::SignalsPending).Cur;
        let status = if !group {
            self.lock()
                .pendingSignals
                .Enque(Box::new(info), &account, limit)?
        } else {
            tg.lock()
                .pendingSignals
                .Enque(Box::new(info), &account, limit)?
        };

        if status == EnqueueStatus::Coalesced {
            // a standard signal already pending absorbs the new instance
            return Ok(());
        }

        // Find a receiver to notify. Note that the task we choose to notify,
        // if any, may not be the task that actually dequeues and handles the
        // signal; e.g. a racing signal mask change may cause the notified
        // task to become ineligible, or a racing sibling task may dequeue
        // the signal first.
        if !group {
            if self.canReceiveSignalLocked(sig) {
                self.signalWakeUpLocked(sig == Signal::SIGKILL);
            }

            return Ok(());
        }

        tg.lock().completeGroupSignalLocked(sig, self);
        return Ok(());
    }

    // initiateGroupStopLocked attempts to initiate a group stop based on a
    // previously-dequeued stop signal. Initiation can lose races against
    // SIGCONT, SIGKILL and group exits that happened while the signal mutex
    // was dropped; groupStopDequeued is the marker those races clear.
    //
    // Preconditions: The signal mutex must be locked.
    pub fn initiateGroupStopLocked(&self, info: &SignalInfo) {
        if self.lock().groupStopPending {
            debug!(
                "Signal {}: not stopping thread group: lost to racing stop signal",
                info.Signo
            );
            return;
        }

        let tg = self.lock().tg.clone();
        let mut tg = tg.lock();
        if !tg.groupStopDequeued {
            debug!(
                "Signal {}: not stopping thread group: lost to racing SIGCONT",
                info.Signo
            );
            return;
        }

        if tg.exiting {
            debug!(
                "Signal {}: not stopping thread group: lost to racing group exit",
                info.Signo
            );
            return;
        }

        if !tg.groupStopComplete {
            tg.groupStopSignal = Signal(info.Signo);
        }

        tg.groupStopPendingCount = 0;

        let mut add = 0;
        for t2 in &tg.tasks {
            let mut t2 = t2.lock();

            if t2.killedLocked() || t2.IsExiting() {
                t2.groupStopPending = false;
                continue;
            }

            t2.groupStopPending = true;
            t2.groupStopAcknowledged = false;
            t2.interrupt();

            add += 1;
        }

        tg.groupStopPendingCount += add;
        debug!(
            "Signal {}: stopping {} threads in thread group",
            info.Signo, tg.groupStopPendingCount
        );
    }

    // signalStop sends a SIGCHLD to t (the parent) describing a stop or
    // continue event of target (a child thread group leader), unless t's
    // disposition for SIGCHLD says not to. code and status are set in the
    // signal sent.
    //
    // Preconditions: The TaskSet mutex must be locked (for reading or
    // writing). The signal mutex of target's thread group must NOT be held.
    pub fn signalStop(&self, target: &Thread, code: i32, status: i32) {
        let tg = self.lock().tg.clone();
        let lock = tg.lock().signalLock.clone();
        let _s = lock.lock();

        let sh = tg.lock().signalHandlers.clone();
        let act = sh.GetAct(Signal::SIGCHLD);
        if act.handler == SigAct::SIGNAL_ACT_IGNORE || act.flags.IsNoCldStop() {
            // still wake the parent's waiters; only the signal is suppressed
            self.lock().interrupt();
            return;
        }

        let info = SignalInfo::SignalInfoChld(
            code,
            target.ThreadID(),
            target.Credentials().lock().RealKUID,
            status,
        );

        // delivery failure here only means the parent is out of queue budget
        match self.sendSignalLocked(Signal::SIGCHLD, &SignalOrigin::Explicit(info), true) {
            Err(e) => info!("signalStop: dropping SIGCHLD: {:?}", e),
            Ok(()) => (),
        }

        self.lock().interrupt();
    }

    // PendingSignals returns the set of pending signals.
    pub fn PendingSignals(&self) -> SignalSet {
        let tg = self.lock().tg.clone();
        let lock = tg.lock().signalLock.clone();
        let _s = lock.lock();

        let pendingSet = self.lock().pendingSignals.pendingSet.0;
        return SignalSet(pendingSet | tg.lock().pendingSignals.pendingSet.0);
    }

    // SigPending implements the semantics of rt_sigpending(2): the pending
    // set intersected with the blocked set.
    pub fn SigPending(&self) -> SignalSet {
        let pending = self.PendingSignals();
        let blocked = self.SignalMask();
        return SignalSet(pending.0 & blocked.0);
    }

    // Sigtimedwait implements the semantics of sigtimedwait(2). timeoutNs ==
    // None waits forever, Some(0) polls.
    pub fn Sigtimedwait(&self, set: SignalSet, timeoutNs: Option<i64>) -> Result<Box<SignalInfo>> {
        // set is the set of signals we're interested in; invert it to get
        // the set of signals to block.
        let mask = SignalSet(!(set.0 & !UNMASKABLE_MASK));

        let tg = self.lock().tg.clone();
        let lock = tg.lock().signalLock.clone();

        {
            let _s = lock.lock();

            match self.lock().dequeueSignalLocked(mask) {
                Some(info) => return Ok(info),
                None => (),
            }

            if timeoutNs == Some(0) {
                return Err(Error::SysError(SysErr::EAGAIN));
            }

            // Unblock signals we're waiting for. Remember the original signal
            // mask so that sendSignalLocked doesn't discard ignored signals
            // that we're temporarily unblocking.
            let signalMask = self.lock().signalMask;
            self.lock().realSignalMask = signalMask;
            self.setSignalMaskLocked(SignalSet(signalMask.0 & mask.0));
        }

        let blocker = self.lock().blocker.clone();
        let res = blocker.BlockWithTimeout(self, timeoutNs);

        {
            let _s = lock.lock();

            let realSignalMask = self.lock().realSignalMask;
            self.setSignalMaskLocked(realSignalMask);
            self.lock().realSignalMask = SignalSet(0);

            match self.lock().dequeueSignalLocked(mask) {
                Some(info) => return Ok(info),
                None => (),
            }

            match res {
                Err(Error::Timeout) => return Err(Error::SysError(SysErr::EAGAIN)),
                _ => return Err(Error::SysError(SysErr::EINTR)),
            }
        }
    }

    // Sigsuspend implements the semantics of rt_sigsuspend(2): install mask,
    // sleep until a signal wants delivery, always fail with EINTR. The
    // pre-suspend mask is restored by the dequeue loop after delivery.
    pub fn Sigsuspend(&self, mask: SignalSet) -> Result<()> {
        {
            let tg = self.lock().tg.clone();
            let lock = tg.lock().signalLock.clone();
            let _s = lock.lock();

            let oldMask = self.lock().signalMask;
            self.lock().savedSignalMask = oldMask;
            self.lock().haveSavedSignalMask = true;
            self.setSignalMaskLocked(mask);
        }

        let blocker = self.lock().blocker.clone();
        let _ = blocker.BlockWithTimeout(self, None);

        return Err(Error::SysError(SysErr::EINTR));
    }

    // Pause implements the semantics of pause(2).
    pub fn Pause(&self) -> Result<()> {
        let blocker = self.lock().blocker.clone();
        let _ = blocker.BlockWithTimeout(self, None);

        return Err(Error::SysError(SysErr::EINTR));
    }

    // SignalReturn restores the mask saved in a handler frame, like
    // rt_sigreturn(2), and forces a pass through the dequeue loop in case
    // the restored mask unblocked something.
    pub fn SignalReturn(&self, restoreMask: SignalSet) {
        self.SetSignalMask(restoreMask);
        self.interrupt();
    }

    // SetSavedSignalMask sets the saved signal mask (see
    // ThreadInternal.savedSignalMask's comment).
    pub fn SetSavedSignalMask(&self, mask: SignalSet) {
        let mut t = self.lock();

        t.savedSignalMask = mask;
        t.haveSavedSignalMask = true;
    }

    // SetSignalStack sets the task's signal stack, failing while the thread
    // is running on the current one. sp is the thread's stack pointer.
    pub fn SetSignalStack(&self, alt: SignalStack, sp: u64) -> Result<()> {
        let cur = self.lock().signalStack;
        if cur.IsEnable() && cur.Contains(sp) {
            return Err(Error::SysError(SysErr::EPERM));
        }

        if alt.flags & !(SignalStackFlags::DISABLE.bits() | SignalStackFlags::AUTO_DISARM.bits())
            != 0
        {
            return Err(Error::SysError(SysErr::EINVAL));
        }

        if alt.flags & SignalStackFlags::DISABLE.bits() == 0 && alt.size < MINSIGSTKSZ {
            return Err(Error::SysError(SysErr::ENOMEM));
        }

        self.lock().signalStack = alt;
        return Ok(());
    }

    pub fn SignalStack(&self, sp: u64) -> SignalStack {
        let mut alt = self.lock().signalStack;
        if alt.IsEnable() && alt.Contains(sp) {
            alt.SetOnStack();
        }

        return alt;
    }

    // RunInterrupt is the dequeue and disposition engine, analogous to
    // Linux's kernel/signal.c:get_signal_to_deliver(). It loops until it can
    // tell the calling thread what to do next.
    pub fn RunInterrupt(&self) -> SignalDisposition {
        self.ResetInterrupt();

        loop {
            if self.handleGroupContNotify() {
                continue;
            }

            match self.handleGroupStopPending() {
                Step::Return(d) => return d,
                Step::Continue => (),
            }

            match self.dequeueAndDispose() {
                Step::Return(d) => return d,
                Step::Continue => continue,
            }
        }
    }

    // Did we just leave a group stop? The first member through here tells
    // the parent; groupContNotify dedups the notification for the whole
    // group.
    fn handleGroupContNotify(&self) -> bool {
        let tg = self.lock().tg.clone();
        let ts = tg.TaskSet();
        let lock = tg.lock().signalLock.clone();

        let (sig, intr) = {
            let _s = lock.lock();

            if !tg.lock().groupContNotify {
                return false;
            }

            tg.lock().groupContNotify = false;
            let sig = tg.lock().groupStopSignal;
            let intr = tg.lock().groupContInterrupted;
            (sig, intr)
        };

        let _r = ts.ReadLock();
        let leader = match tg.Leader() {
            None => return true,
            Some(l) => l,
        };

        // signalStop relocks the leader; the guard must not live across it
        let parent = leader.lock().parent.clone();
        match parent {
            None => (),
            Some(parent) => {
                // If groupContInterrupted, do as Linux does and pretend the
                // group stop completed just before it ended: send only the
                // SIGCHLD indicating the completed stop, since the one
                // indicating the continue would coalesce with it anyway.
                if intr {
                    parent.signalStop(&leader, CldCode::CLD_STOPPED, sig.0);
                } else {
                    parent.signalStop(&leader, CldCode::CLD_CONTINUED, Signal::SIGCONT.0);
                }
            }
        }

        return true;
    }

    // Do we need to enter a group stop? Analogous to Linux's
    // kernel/signal.c:get_signal_to_deliver() => do_signal_stop() =>
    // handle_group_stop().
    fn handleGroupStopPending(&self) -> Step {
        let tg = self.lock().tg.clone();
        let ts = tg.TaskSet();
        let lock = tg.lock().signalLock.clone();

        let (sig, mut notifyParent) = {
            let _s = lock.lock();

            if !self.lock().groupStopPending {
                return Step::Continue;
            }

            self.lock().groupStopPending = false;

            // the thread chosen to carry a fatal core-dump signal initiated
            // this stop and must keep running to dequeue that signal
            let exitTask = tg.lock().groupExitTask.Upgrade();
            match exitTask {
                Some(et) => {
                    if et == *self {
                        tg.lock().groupExitTask = ThreadWeak::default();
                        return Step::Continue;
                    }
                }
                None => (),
            }

            if tg.lock().exiting {
                return Step::Continue;
            }

            let sig = tg.lock().groupStopSignal;
            let notifyParent = self.lock().participateGroupStopLocked();
            (sig, notifyParent)
        };

        let _r = ts.ReadLock();
        let leader = match tg.Leader() {
            None => return Step::Continue,
            Some(l) => l,
        };

        if leader.lock().parent.is_none() {
            notifyParent = false;
        }

        {
            let _s = lock.lock();
            if self.lock().killedLocked() {
                // a racing SIGKILL wins; go around and dequeue it
                return Step::Continue;
            }

            self.lock().beginInternalStopLocked(&Arc::new(GroupStop {}));
        }

        if notifyParent {
            let parent = leader.lock().parent.clone();
            match parent {
                Some(p) => p.signalStop(&leader, CldCode::CLD_STOPPED, sig.0),
                None => (),
            }
        }

        return Step::Return(SignalDisposition::GroupStop(sig));
    }

    fn dequeueAndDispose(&self) -> Step {
        let tg = self.lock().tg.clone();
        let ts = tg.TaskSet();
        let lock = tg.lock().signalLock.clone();

        let mut info = {
            let _s = lock.lock();

            let mask = self.lock().signalMask;
            // bind before matching so the thread guard is released; the None
            // arm relocks self
            let dequeued = self.lock().dequeueSignalLocked(mask);
            match dequeued {
                Some(info) => {
                    if STOP_SIGNALS.Contains(info.Sig()) {
                        // Indicate that we've dequeued a stop signal before
                        // unlocking the signal mutex; initiateGroupStopLocked
                        // will check for races after it is retaken.
                        tg.lock().groupStopDequeued = true;
                    }

                    info
                }
                None => {
                    if self.lock().haveSavedSignalMask {
                        let saved = self.lock().savedSignalMask;
                        self.lock().haveSavedSignalMask = false;
                        self.setSignalMaskLocked(saved);
                    }

                    return Step::Return(SignalDisposition::None);
                }
            }
        };

        let mut sig = info.Sig();

        // A traced thread reports the signal before acting on it. The tracer
        // can suppress it or replace it with another signal; a replacement
        // that the thread is blocking goes back on the private queue.
        let tracer = self.lock().tracer.clone();
        if sig != Signal::SIGKILL {
            match tracer {
                None => (),
                Some(tracer) => {
                    let action = tracer.NotifySignal(self, &info);
                    match action {
                        TracerAction::Cancel => return Step::Continue,
                        TracerAction::Deliver => (),
                        TracerAction::Replace(newSig) => {
                            let (ppid, puid) = match self.lock().parent.clone() {
                                None => (0, 0),
                                Some(p) => (p.ThreadID(), p.Credentials().lock().RealKUID),
                            };

                            sig = newSig;
                            info = Box::new(SignalInfo::SignalInfoUser(newSig, ppid, puid));
                        }
                    }

                    let _s = lock.lock();
                    if self.lock().signalMask.Contains(sig) {
                        let account = self.lock().account.clone();
                        let limit = tg.Limits().Get(LimitType::SignalsPending).Cur;
                        let _ = self.lock().pendingSignals.Enque(info, &account, limit);
                        return Step::Continue;
                    }
                }
            }
        }

        let sh = tg.lock().signalHandlers.clone();
        let action = ComputeAction(sig, &sh.GetAct(sig));

        if action == SignalAction::IGNORE {
            debug!("Signal {}: ignored", sig.0);
            return Step::Continue;
        }

        if action == SignalAction::HANDLER {
            let act = sh.DequeAct(sig);
            let _s = lock.lock();

            // sigreturn restores the pre-suspend mask if the signal arrived
            // during sigsuspend/rt_sigtimedwait, the ordinary mask otherwise
            let mut restoreMask = self.lock().signalMask;
            if self.lock().haveSavedSignalMask {
                restoreMask = self.lock().savedSignalMask;
                self.lock().haveSavedSignalMask = false;
            }

            // the handler runs with act.mask and (without SA_NODEFER) the
            // signal itself additionally blocked
            let mut newMask = SignalSet(self.lock().signalMask.0 | act.mask);
            if !act.flags.IsNoDefer() {
                newMask.Add(sig);
            }
            self.setSignalMaskLocked(newMask);

            debug!("Signal {}: delivering to handler", sig.0);
            return Step::Return(SignalDisposition::Handler {
                info: info,
                act: act,
                restoreMask: restoreMask,
            });
        }

        // Default dispositions from here on. The init process swallows every
        // signal that reaches one, even SIGKILL.
        if tg.ID() == INIT_TID {
            debug!("Signal {}: discarded by init", sig.0);
            return Step::Continue;
        }

        if action == SignalAction::STOP {
            // TTY stop signals are discarded for orphaned process groups;
            // checking requires the TaskSet mutex, so the signal mutex is not
            // held and initiateGroupStopLocked revalidates afterwards.
            if sig != Signal::SIGSTOP {
                let orphan = {
                    let _r = ts.ReadLock();
                    match tg.ProcessGroup() {
                        None => false,
                        Some(pg) => pg.IsOrphan(),
                    }
                };

                if orphan {
                    debug!("Signal {}: discarded for orphaned process group", sig.0);
                    return Step::Continue;
                }
            }

            let _s = lock.lock();
            self.initiateGroupStopLocked(&info);
            return Step::Continue;
        }

        // SignalAction::TERM or SignalAction::CORE
        let dumped = action == SignalAction::CORE;
        info!("Signal {}: terminating thread group", sig.0);

        {
            let _s = lock.lock();
            self.PrepareGroupExitLocked(ExitStatus::NewSignaled(sig, dumped));
        }

        let status = self.lock().exitStatus;
        return Step::Return(SignalDisposition::Exit(status));
    }
}

impl ThreadGroupInternal {
    // isInitLocked returns true if tg is the init process. Init takes no
    // signal it doesn't have a handler for, so the send-time fatal paths
    // must leave it alone and let the dequeue loop discard instead.
    pub fn isInitLocked(&self) -> bool {
        match self.leader.Upgrade() {
            None => return false,
            Some(l) => return l.ThreadID() == INIT_TID,
        }
    }

    // discardSpecificLocked removes all instances of the given signal from
    // all signal queues in tg.
    //
    // Preconditions: The signal mutex must be locked.
    pub fn discardSpecificLocked(&mut self, sig: Signal) {
        self.pendingSignals.Discard(sig);
        for t in &self.tasks {
            t.lock().pendingSignals.Discard(sig);
        }
    }

    // applySignalSideEffectsLocked is analogous to Linux's
    // kernel/signal.c:handle_stop_signal(): side effects that fire when a
    // signal is *sent*, before any queueing decision.
    //
    // Preconditions: The signal mutex must be locked.
    pub fn applySignalSideEffectsLocked(&mut self, sig: Signal) {
        if STOP_SIGNALS.Contains(sig) {
            // Stop signals cause all prior SIGCONT to be discarded.
            self.discardSpecificLocked(Signal::SIGCONT);
        } else if sig == Signal::SIGCONT {
            // SIGCONT wakes up (all threads of) a group-stopped process as a
            // side effect of being sent, before and regardless of delivery.
            self.endGroupStopLocked(true);
        } else if sig == Signal::SIGKILL {
            if self.isInitLocked() {
                return;
            }

            // SIGKILL brings down the whole group and cannot be suppressed.
            if !self.exiting {
                self.exiting = true;
                self.exitStatus = ExitStatus {
                    Signo: Signal::SIGKILL.0,
                    ..Default::default()
                };
            }

            self.groupStopDequeued = false;
            self.groupStopPendingCount = 0;
            self.groupStopComplete = false;

            for t in &self.tasks {
                t.lock().groupStopPending = false;
                t.lock().killLocked();
            }
        }
    }

    // findSignalReceiverLocked returns a task in tg that should be
    // interrupted to receive the given signal, maintaining the round-robin
    // cursor so that group-directed signals spread over the members. If no
    // member currently wants the signal, findSignalReceiverLocked returns
    // nil and the signal stays pending until somebody can take it.
    //
    // Preconditions: The signal mutex must be locked.
    pub fn findSignalReceiverLocked(&mut self, sig: Signal) -> Option<Thread> {
        let start = match self.currTarget.Upgrade() {
            Some(t) => t,
            None => match self.tasks.iter().next() {
                Some(t) => t.clone(),
                None => return None,
            },
        };

        // walk the member collection as a cycle beginning at the cursor
        let members: alloc::vec::Vec<Thread> = self
            .tasks
            .iter()
            .cloned()
            .skip_while(|t| *t != start)
            .chain(self.tasks.iter().cloned().take_while(|t| *t != start))
            .collect();

        for t in members {
            if t.canReceiveSignalLocked(sig) {
                self.currTarget = t.Downgrade();
                return Some(t);
            }
        }

        return None;
    }

    // completeGroupSignalLocked picks the member that a freshly-queued
    // group-directed signal should interrupt, and short-circuits fatal
    // signals into a group exit. Analogous to Linux's
    // kernel/signal.c:__group_complete_signal().
    //
    // Preconditions: The signal mutex must be locked.
    pub fn completeGroupSignalLocked(&mut self, sig: Signal, target: &Thread) {
        // prefer the originally-targeted thread (usually the leader)
        let chosen = if target.canReceiveSignalLocked(sig) {
            target.clone()
        } else {
            match self.findSignalReceiverLocked(sig) {
                Some(t) => t,
                // every member is busy, blocked or stopped; leave the signal
                // pending for whoever unblocks it first
                None => return,
            }
        };

        let act = self.signalHandlers.GetAct(sig);
        let fatal = ComputeAction(sig, &act) == SignalAction::TERM
            || ComputeAction(sig, &act) == SignalAction::CORE;
        let dump = ComputeAction(sig, &act) == SignalAction::CORE;

        if fatal
            && !self.exiting
            && !self.isInitLocked()
            && !chosen.lock().realSignalMask.Contains(sig)
            && (sig == Signal::SIGKILL || !chosen.lock().tracer.is_some())
        {
            if !dump {
                // The signal will certainly kill the whole group: do it now
                // rather than delivering one thread at a time.
                self.exiting = true;
                self.exitStatus = ExitStatus {
                    Signo: sig.0,
                    ..Default::default()
                };
                self.groupStopDequeued = false;
                self.groupStopPendingCount = 0;
                self.groupStopComplete = false;

                for t in &self.tasks {
                    t.lock().groupStopPending = false;
                    t.lock().killLocked();
                }

                return;
            }

            // A core-dump signal synchronizes the group first: everyone but
            // the chosen thread stops, so the dump sees a stable group.
            chosen.lock().pendingSignals.DiscardSet(*STOP_SIGNALS);
            self.pendingSignals.DiscardSet(*STOP_SIGNALS);

            self.groupExitTask = chosen.Downgrade();
            self.groupStopSignal = sig;
            self.groupStopPendingCount = 0;
            self.groupStopComplete = false;

            let mut count = 0;
            for t in &self.tasks {
                if *t == chosen {
                    continue;
                }

                let mut t2 = t.lock();
                if t2.killedLocked() || t2.IsExiting() {
                    t2.groupStopPending = false;
                    continue;
                }

                t2.groupStopPending = true;
                t2.groupStopAcknowledged = false;
                t2.interrupt();
                count += 1;
            }

            self.groupStopPendingCount = count;
            chosen.signalWakeUpLocked(false);
            return;
        }

        chosen.signalWakeUpLocked(sig == Signal::SIGKILL);
    }

    // endGroupStopLocked ensures that all prior stop signals received by tg
    // are not stopping tg and will not stop tg in the future. If broadcast
    // is true, parent notification will be scheduled if appropriate.
    //
    // Preconditions: The signal mutex must be locked.
    pub fn endGroupStopLocked(&mut self, broadcast: bool) {
        STOP_SIGNALS.ForEachSignal(|sig| {
            self.discardSpecificLocked(sig);
        });

        if self.groupStopPendingCount == 0 && !self.groupStopComplete {
            return;
        }

        let contAct = self.signalHandlers.GetAct(Signal::SIGCONT);
        let contHandled = ComputeAction(Signal::SIGCONT, &contAct) == SignalAction::HANDLER;

        for t in &self.tasks {
            let mut t = t.lock();
            t.groupStopPending = false;

            let isGroupStop = match &t.stop {
                Some(s) => s.Type() == TaskStopType::GROUPSTOP,
                None => false,
            };
            if isGroupStop {
                t.endInternalStopLocked();
            }

            // A thread with a SIGCONT handler installed and SIGCONT unblocked
            // must pass through the dequeue loop before resuming userspace.
            if contHandled && !t.signalMask.Contains(Signal::SIGCONT) {
                t.interrupt();
            }
        }

        if broadcast {
            // Instead of notifying the parent here, set groupContNotify so
            // that one of the continuing tasks does so. In order to send a
            // signal to the parent its signal mutex would have to be locked,
            // and tg's signal mutex is already held.
            self.groupContNotify = true;
            self.groupContInterrupted = !self.groupStopComplete;
        }

        // Unsetting groupStopDequeued will cause racing calls to
        // initiateGroupStopLocked to recognize that the group stop has been
        // cancelled. groupStopSignal is kept for the notification that the
        // continuing tasks still owe the parent.
        self.groupStopDequeued = false;
        self.groupStopPendingCount = 0;
        self.groupStopComplete = false;
    }
}

impl ThreadGroup {
    // SendSignal sends the given signal to tg, directed to the whole group.
    pub fn SendSignal(&self, sig: Signal, origin: &SignalOrigin) -> Result<()> {
        let ts = self.TaskSet();
        let _r = ts.ReadLock();

        let lock = self.lock().signalLock.clone();
        let _s = lock.lock();

        let leader = self.lock().leader.Upgrade();
        match leader {
            None => return Err(Error::SysError(SysErr::ESRCH)),
            Some(l) => return l.sendSignalLocked(sig, origin, true),
        }
    }

    // SetSignalAct atomically sets the thread group's signal action for
    // signal sig to *actptr (if actptr is not nil) and returns the old
    // signal action.
    pub fn SetSignalAct(&self, sig: Signal, actptr: &Option<SigAct>) -> Result<SigAct> {
        if !sig.IsValid() {
            return Err(Error::SysError(SysErr::EINVAL));
        }

        let ts = self.TaskSet();
        let _r = ts.ReadLock();

        let lock = self.lock().signalLock.clone();
        let _s = lock.lock();
        let sh = self.lock().signalHandlers.clone();

        let oldact = sh.GetAct(sig);

        if !sig.Maskable() && actptr.is_some() {
            return Err(Error::SysError(SysErr::EINVAL));
        }

        match actptr {
            None => (),
            Some(actptr) => {
                let mut act = *actptr;
                act.mask &= !UNMASKABLE_MASK;
                sh.SetAct(sig, &act);

                // From POSIX, by way of Linux:
                //
                // "Setting a signal action to SIG_IGN for a signal that is
                // pending shall cause the pending signal to be discarded,
                // whether or not it is blocked."
                //
                // "Setting a signal action to SIG_DFL for a signal that is
                // pending and whose default action is to ignore the signal
                // (for example, SIGCHLD), shall cause the pending signal to be
                // discarded, whether or not it is blocked."
                if ComputeAction(sig, &act) == SignalAction::IGNORE {
                    self.lock().discardSpecificLocked(sig);
                }
            }
        }

        return Ok(oldact);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::*;
    use crate::threadmgr::threads::*;
    use core::sync::atomic::AtomicI32;
    use core::sync::atomic::Ordering;

    fn blocker() -> Arc<dyn Blocker> {
        return Arc::new(NopBlocker {});
    }

    // a TaskSet with an init placeholder, so that test processes don't get
    // thread id 1 and inherit init's signal immunity
    fn newTaskSet() -> TaskSet {
        let ts = TaskSet::New();
        ts.CreateProcess(None, &Credentials::NewRootCredentials(), blocker())
            .unwrap();
        return ts;
    }

    fn newProcess(ts: &TaskSet, parent: Option<Thread>) -> Thread {
        return ts
            .CreateProcess(parent, &Credentials::NewRootCredentials(), blocker())
            .unwrap();
    }

    fn handlerAct() -> SigAct {
        return SigAct {
            handler: 0x7000_0000,
            ..Default::default()
        };
    }

    fn ignoreAct() -> SigAct {
        return SigAct {
            handler: SigAct::SIGNAL_ACT_IGNORE,
            ..Default::default()
        };
    }

    fn userOrigin() -> SignalOrigin {
        return SignalOrigin::UserSpace { pid: 100, uid: 0 };
    }

    struct ScriptedTracer {
        action: TracerAction,
        seen: AtomicI32,
    }

    impl Tracer for ScriptedTracer {
        fn NotifySignal(&self, _t: &Thread, _info: &SignalInfo) -> TracerAction {
            self.seen.fetch_add(1, Ordering::SeqCst);
            return self.action;
        }
    }

    #[test]
    fn test_DeliverToHandler() {
        let ts = newTaskSet();
        let t = newProcess(&ts, None);
        let tg = t.ThreadGroup();

        tg.SetSignalAct(Signal::SIGUSR1, &Some(handlerAct())).unwrap();
        t.SendGroupSignal(Signal::SIGUSR1, &userOrigin()).unwrap();
        assert!(t.Interrupted());

        match t.RunInterrupt() {
            SignalDisposition::Handler {
                info,
                act,
                restoreMask,
            } => {
                assert_eq!(info.Signo, Signal::SIGUSR1.0);
                assert_eq!(act.handler, 0x7000_0000);
                assert_eq!(restoreMask, SignalSet(0));
            }
            d => panic!("wrong disposition {:?}", d),
        }

        // the signal itself is blocked while its handler runs
        assert!(t.SignalMask().Contains(Signal::SIGUSR1));

        t.SignalReturn(SignalSet(0));
        match t.RunInterrupt() {
            SignalDisposition::None => (),
            d => panic!("wrong disposition {:?}", d),
        }
    }

    #[test]
    fn test_IgnoredSignalDiscardedAtSend() {
        let ts = newTaskSet();
        let t = newProcess(&ts, None);
        let tg = t.ThreadGroup();

        tg.SetSignalAct(Signal::SIGUSR1, &Some(ignoreAct())).unwrap();
        t.SendGroupSignal(Signal::SIGUSR1, &userOrigin()).unwrap();

        assert_eq!(t.PendingSignals(), SignalSet(0));
        assert!(!t.Interrupted());
    }

    #[test]
    fn test_BlockedSignalStaysPendingUntilUnblocked() {
        let ts = newTaskSet();
        let t = newProcess(&ts, None);

        t.SetSignalMask(SignalSet::New(Signal::SIGUSR1));
        t.SendGroupSignal(Signal::SIGUSR1, &userOrigin()).unwrap();

        // masked: nothing deliverable, signal stays queued
        match t.RunInterrupt() {
            SignalDisposition::None => (),
            d => panic!("wrong disposition {:?}", d),
        }
        assert!(t.PendingSignals().Contains(Signal::SIGUSR1));

        // unblocking reschedules delivery; default disposition terminates
        t.SigProcMask(SigHow::SIG_SETMASK, Some(SignalSet(0)))
            .unwrap();
        assert!(t.Interrupted());

        match t.RunInterrupt() {
            SignalDisposition::Exit(es) => {
                assert_eq!(es.Signo, Signal::SIGUSR1.0);
                assert!(!es.Dumped);
            }
            d => panic!("wrong disposition {:?}", d),
        }
    }

    #[test]
    fn test_FatalGroupSignalKillsEveryThread() {
        let ts = newTaskSet();
        let t1 = newProcess(&ts, None);
        let t2 = t1.NewThread(blocker(), "worker").unwrap();

        t1.SendGroupSignal(Signal::SIGTERM, &userOrigin()).unwrap();

        // the fatal short-circuit spreads SIGKILL group-wide at send time
        assert!(t1.Killed());
        assert!(t2.Killed());

        for t in [&t1, &t2] {
            match t.RunInterrupt() {
                SignalDisposition::Exit(es) => assert_eq!(es.Signo, Signal::SIGTERM.0),
                d => panic!("wrong disposition {:?}", d),
            }
        }
    }

    #[test]
    fn test_SigkillCannotBeBlocked() {
        let ts = newTaskSet();
        let t = newProcess(&ts, None);

        t.SigProcMask(SigHow::SIG_SETMASK, Some(SignalSet(u64::MAX)))
            .unwrap();
        assert!(!t.SignalMask().Contains(Signal::SIGKILL));
        assert!(!t.SignalMask().Contains(Signal::SIGSTOP));

        t.SendGroupSignal(Signal::SIGKILL, &userOrigin()).unwrap();
        match t.RunInterrupt() {
            SignalDisposition::Exit(es) => assert_eq!(es.Signo, Signal::SIGKILL.0),
            d => panic!("wrong disposition {:?}", d),
        }
    }

    #[test]
    fn test_SigkillHandlerRejected() {
        let ts = newTaskSet();
        let t = newProcess(&ts, None);
        let tg = t.ThreadGroup();

        let res = tg.SetSignalAct(Signal::SIGKILL, &Some(handlerAct()));
        assert_eq!(res, Err(Error::SysError(SysErr::EINVAL)));
        let res = tg.SetSignalAct(Signal::SIGSTOP, &Some(ignoreAct()));
        assert_eq!(res, Err(Error::SysError(SysErr::EINVAL)));

        // reading the current action is still allowed
        assert!(tg.SetSignalAct(Signal::SIGKILL, &None).is_ok());
    }

    #[test]
    fn test_GroupStopStopsAllThreadsAndNotifiesParentOnce() {
        let ts = newTaskSet();
        let parent = newProcess(&ts, None);
        let ptg = parent.ThreadGroup();
        ptg.SetSignalAct(Signal::SIGCHLD, &Some(handlerAct()))
            .unwrap();

        let c1 = newProcess(&ts, Some(parent.clone()));
        let c2 = c1.NewThread(blocker(), "worker").unwrap();

        c1.SendGroupSignal(Signal::SIGSTOP, &userOrigin()).unwrap();

        // the dequeuing thread initiates the stop, then participates
        match c1.RunInterrupt() {
            SignalDisposition::GroupStop(sig) => assert_eq!(sig, Signal::SIGSTOP),
            d => panic!("wrong disposition {:?}", d),
        }
        assert!(c1.lock().Stopped());

        // the stop is not complete (and the parent not notified) until the
        // last member joins
        assert!(!parent.PendingSignals().Contains(Signal::SIGCHLD));

        match c2.RunInterrupt() {
            SignalDisposition::GroupStop(sig) => assert_eq!(sig, Signal::SIGSTOP),
            d => panic!("wrong disposition {:?}", d),
        }
        assert!(c2.lock().Stopped());

        match parent.RunInterrupt() {
            SignalDisposition::Handler { info, .. } => {
                assert_eq!(info.Signo, Signal::SIGCHLD.0);
                assert_eq!(info.Code, CldCode::CLD_STOPPED);
                match info.Details {
                    SignalDetails::SigChld { pid, status, .. } => {
                        assert_eq!(pid, c1.ThreadID());
                        assert_eq!(status, Signal::SIGSTOP.0);
                    }
                    d => panic!("wrong details {:?}", d),
                }
            }
            d => panic!("wrong disposition {:?}", d),
        }

        // exactly one notification
        assert!(!parent.PendingSignals().Contains(Signal::SIGCHLD));
    }

    #[test]
    fn test_SigcontEndsGroupStopAndNotifiesParent() {
        let ts = newTaskSet();
        let parent = newProcess(&ts, None);
        let ptg = parent.ThreadGroup();
        ptg.SetSignalAct(Signal::SIGCHLD, &Some(handlerAct()))
            .unwrap();

        let c = newProcess(&ts, Some(parent.clone()));
        c.SendGroupSignal(Signal::SIGSTOP, &userOrigin()).unwrap();
        match c.RunInterrupt() {
            SignalDisposition::GroupStop(_) => (),
            d => panic!("wrong disposition {:?}", d),
        }
        assert!(c.lock().Stopped());

        // consume the stop notification; SIGCHLD is handler-blocked until
        // the frame is torn down again
        match parent.RunInterrupt() {
            SignalDisposition::Handler {
                info, restoreMask, ..
            } => {
                assert_eq!(info.Code, CldCode::CLD_STOPPED);
                parent.SignalReturn(restoreMask);
            }
            d => panic!("wrong disposition {:?}", d),
        }

        // SIGCONT resumes the group as a send-time side effect, before (and
        // here despite) its default-ignore disposition
        c.SendGroupSignal(Signal::SIGCONT, &userOrigin()).unwrap();
        assert!(!c.lock().Stopped());

        match c.RunInterrupt() {
            SignalDisposition::None => (),
            d => panic!("wrong disposition {:?}", d),
        }

        match parent.RunInterrupt() {
            SignalDisposition::Handler { info, .. } => {
                assert_eq!(info.Signo, Signal::SIGCHLD.0);
                assert_eq!(info.Code, CldCode::CLD_CONTINUED);
            }
            d => panic!("wrong disposition {:?}", d),
        }
    }

    #[test]
    fn test_RunInterruptWithEmptyQueueReturnsNone() {
        let ts = newTaskSet();
        let t = newProcess(&ts, None);

        match t.RunInterrupt() {
            SignalDisposition::None => (),
            d => panic!("wrong disposition {:?}", d),
        }

        // a spurious interrupt with nothing pending also falls through
        t.lock().interrupt();
        match t.RunInterrupt() {
            SignalDisposition::None => (),
            d => panic!("wrong disposition {:?}", d),
        }
    }

    #[test]
    fn test_ExitingThreadCompletesGroupStop() {
        let ts = newTaskSet();
        let parent = newProcess(&ts, None);
        let ptg = parent.ThreadGroup();
        ptg.SetSignalAct(Signal::SIGCHLD, &Some(handlerAct()))
            .unwrap();

        let c1 = newProcess(&ts, Some(parent.clone()));
        let c2 = c1.NewThread(blocker(), "worker").unwrap();

        c1.SendGroupSignal(Signal::SIGSTOP, &userOrigin()).unwrap();
        match c1.RunInterrupt() {
            SignalDisposition::GroupStop(_) => (),
            d => panic!("wrong disposition {:?}", d),
        }

        // the stop still waits on c2
        assert!(!parent.PendingSignals().Contains(Signal::SIGCHLD));

        // c2 exits instead of stopping; exiting counts as participation, so
        // the stop completes and the parent is told
        c2.ExitThread();

        match parent.RunInterrupt() {
            SignalDisposition::Handler { info, .. } => {
                assert_eq!(info.Signo, Signal::SIGCHLD.0);
                assert_eq!(info.Code, CldCode::CLD_STOPPED);
            }
            d => panic!("wrong disposition {:?}", d),
        }
    }

    #[test]
    fn test_StopAndContDiscardEachOther() {
        let ts = newTaskSet();
        let t = newProcess(&ts, None);
        let tg = t.ThreadGroup();

        // keep both signals queued by blocking them
        t.SetSignalMask(SignalSet::MakeSignalSet(&[
            Signal::SIGCONT,
            Signal::SIGTSTP,
        ]));

        t.SendGroupSignal(Signal::SIGCONT, &userOrigin()).unwrap();
        assert!(tg.lock().pendingSignals.pendingSet.Contains(Signal::SIGCONT));

        // a stop signal wipes pending SIGCONT...
        t.SendGroupSignal(Signal::SIGTSTP, &userOrigin()).unwrap();
        assert!(!tg.lock().pendingSignals.pendingSet.Contains(Signal::SIGCONT));
        assert!(tg.lock().pendingSignals.pendingSet.Contains(Signal::SIGTSTP));

        // ...and SIGCONT wipes pending stop signals
        t.SendGroupSignal(Signal::SIGCONT, &userOrigin()).unwrap();
        assert!(!tg.lock().pendingSignals.pendingSet.Contains(Signal::SIGTSTP));
        assert!(tg.lock().pendingSignals.pendingSet.Contains(Signal::SIGCONT));
    }

    #[test]
    fn test_InitSwallowsDefaultDispositions() {
        let ts = TaskSet::New();
        let init = newProcess(&ts, None);
        assert_eq!(init.ThreadGroup().ID(), INIT_TID);

        init.SendGroupSignal(Signal::SIGTERM, &userOrigin()).unwrap();
        match init.RunInterrupt() {
            SignalDisposition::None => (),
            d => panic!("wrong disposition {:?}", d),
        }
        assert!(!init.ThreadGroup().lock().exiting);

        // a handler still fires: only default dispositions are swallowed
        init.ThreadGroup()
            .SetSignalAct(Signal::SIGTERM, &Some(handlerAct()))
            .unwrap();
        init.SendGroupSignal(Signal::SIGTERM, &userOrigin()).unwrap();
        match init.RunInterrupt() {
            SignalDisposition::Handler { info, .. } => {
                assert_eq!(info.Signo, Signal::SIGTERM.0)
            }
            d => panic!("wrong disposition {:?}", d),
        }
    }

    #[test]
    fn test_OrphanedProcessGroupDiscardsTtyStops() {
        let ts = newTaskSet();
        // no parent: session leader of an orphaned process group
        let t = newProcess(&ts, None);
        assert!(t.ThreadGroup().ProcessGroup().unwrap().IsOrphan());

        t.SendGroupSignal(Signal::SIGTSTP, &userOrigin()).unwrap();
        match t.RunInterrupt() {
            SignalDisposition::None => (),
            d => panic!("wrong disposition {:?}", d),
        }
        assert!(!t.lock().Stopped());

        // SIGSTOP is exempt from the orphan rule
        t.SendGroupSignal(Signal::SIGSTOP, &userOrigin()).unwrap();
        match t.RunInterrupt() {
            SignalDisposition::GroupStop(sig) => assert_eq!(sig, Signal::SIGSTOP),
            d => panic!("wrong disposition {:?}", d),
        }
    }

    #[test]
    fn test_GroupSignalRoundRobin() {
        let ts = newTaskSet();
        let leader = newProcess(&ts, None);
        let t2 = leader.NewThread(blocker(), "w1").unwrap();
        let t3 = leader.NewThread(blocker(), "w2").unwrap();

        leader
            .ThreadGroup()
            .SetSignalAct(Signal::SIGUSR1, &Some(handlerAct()))
            .unwrap();
        leader.SetSignalMask(SignalSet::New(Signal::SIGUSR1));

        // the leader is blocked, so the cursor picks the next member
        leader.SendGroupSignal(Signal::SIGUSR1, &userOrigin()).unwrap();
        assert!(t2.Interrupted());
        assert!(!t3.Interrupted());

        match t2.RunInterrupt() {
            SignalDisposition::Handler { .. } => (),
            d => panic!("wrong disposition {:?}", d),
        }

        // t2 now blocks SIGUSR1 while its handler runs; the cursor moves on
        leader.SendGroupSignal(Signal::SIGUSR1, &userOrigin()).unwrap();
        assert!(t3.Interrupted());
        assert!(!t2.Interrupted());
    }

    #[test]
    fn test_CoredumpSignalStopsSiblings() {
        let ts = newTaskSet();
        let leader = newProcess(&ts, None);
        let sibling = leader.NewThread(blocker(), "worker").unwrap();

        leader.SendGroupSignal(Signal::SIGQUIT, &userOrigin()).unwrap();

        // the chosen thread keeps running to take the dump; everyone else
        // is pulled into a stop
        match sibling.RunInterrupt() {
            SignalDisposition::GroupStop(sig) => assert_eq!(sig, Signal::SIGQUIT),
            d => panic!("wrong disposition {:?}", d),
        }
        assert!(sibling.lock().Stopped());

        match leader.RunInterrupt() {
            SignalDisposition::Exit(es) => {
                assert_eq!(es.Signo, Signal::SIGQUIT.0);
                assert!(es.Dumped);
            }
            d => panic!("wrong disposition {:?}", d),
        }
    }

    #[test]
    fn test_TracerCancelSuppressesSignal() {
        let ts = newTaskSet();
        let t = newProcess(&ts, None);

        let tracer = Arc::new(ScriptedTracer {
            action: TracerAction::Cancel,
            seen: AtomicI32::new(0),
        });
        t.SetTracer(Some(tracer.clone()));

        t.SendGroupSignal(Signal::SIGTERM, &userOrigin()).unwrap();
        match t.RunInterrupt() {
            SignalDisposition::None => (),
            d => panic!("wrong disposition {:?}", d),
        }

        assert_eq!(tracer.seen.load(Ordering::SeqCst), 1);
        assert!(!t.ThreadGroup().lock().exiting);
    }

    #[test]
    fn test_TracerReplaceSwapsSignal() {
        let ts = newTaskSet();
        let t = newProcess(&ts, None);
        t.ThreadGroup()
            .SetSignalAct(Signal::SIGUSR1, &Some(handlerAct()))
            .unwrap();

        let tracer = Arc::new(ScriptedTracer {
            action: TracerAction::Replace(Signal::SIGTERM),
            seen: AtomicI32::new(0),
        });
        t.SetTracer(Some(tracer));

        t.SendGroupSignal(Signal::SIGUSR1, &userOrigin()).unwrap();
        match t.RunInterrupt() {
            SignalDisposition::Exit(es) => assert_eq!(es.Signo, Signal::SIGTERM.0),
            d => panic!("wrong disposition {:?}", d),
        }
    }

    #[test]
    fn test_TracerSeesIgnoredSignals() {
        let ts = newTaskSet();
        let t = newProcess(&ts, None);
        t.ThreadGroup()
            .SetSignalAct(Signal::SIGUSR1, &Some(ignoreAct()))
            .unwrap();

        let tracer = Arc::new(ScriptedTracer {
            action: TracerAction::Deliver,
            seen: AtomicI32::new(0),
        });
        t.SetTracer(Some(tracer.clone()));

        // traced: the ignored signal is queued instead of discarded
        t.SendGroupSignal(Signal::SIGUSR1, &userOrigin()).unwrap();
        assert!(t.PendingSignals().Contains(Signal::SIGUSR1));

        match t.RunInterrupt() {
            SignalDisposition::None => (),
            d => panic!("wrong disposition {:?}", d),
        }
        assert_eq!(tracer.seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_IgnoreDiscardsPendingInstances() {
        let ts = newTaskSet();
        let t = newProcess(&ts, None);
        let tg = t.ThreadGroup();

        t.SetSignalMask(SignalSet::New(Signal::SIGUSR1));
        t.SendSignal(Signal::SIGUSR1, &userOrigin()).unwrap();
        t.SendGroupSignal(Signal::SIGUSR1, &userOrigin()).unwrap();
        assert!(t.PendingSignals().Contains(Signal::SIGUSR1));

        tg.SetSignalAct(Signal::SIGUSR1, &Some(ignoreAct())).unwrap();
        assert_eq!(t.PendingSignals(), SignalSet(0));
    }

    #[test]
    fn test_SigtimedwaitDequeuesBlockedSignal() {
        let ts = newTaskSet();
        let t = newProcess(&ts, None);

        t.SetSignalMask(SignalSet::New(Signal::SIGUSR2));
        t.SendSignal(Signal::SIGUSR2, &userOrigin()).unwrap();

        let info = t
            .Sigtimedwait(SignalSet::New(Signal::SIGUSR2), Some(0))
            .unwrap();
        assert_eq!(info.Signo, Signal::SIGUSR2.0);

        // mask restored after the wait
        assert_eq!(t.SignalMask(), SignalSet::New(Signal::SIGUSR2));

        // nothing left: a poll reports EAGAIN
        let res = t.Sigtimedwait(SignalSet::New(Signal::SIGUSR2), Some(0));
        assert_eq!(res.err(), Some(Error::SysError(SysErr::EAGAIN)));

        // and a timed wait that expires does too
        let res = t.Sigtimedwait(SignalSet::New(Signal::SIGUSR2), Some(1000));
        assert_eq!(res.err(), Some(Error::SysError(SysErr::EAGAIN)));
    }

    #[test]
    fn test_SigsuspendRestoresMaskAfterwards() {
        let ts = newTaskSet();
        let t = newProcess(&ts, None);

        let orig = SignalSet::New(Signal::SIGUSR2);
        t.SetSignalMask(orig);

        let res = t.Sigsuspend(SignalSet::New(Signal::SIGHUP));
        assert_eq!(res.err(), Some(Error::SysError(SysErr::EINTR)));
        assert!(t.SignalMask().Contains(Signal::SIGHUP));

        // no signal was delivered: the loop puts the old mask back
        match t.RunInterrupt() {
            SignalDisposition::None => (),
            d => panic!("wrong disposition {:?}", d),
        }
        assert_eq!(t.SignalMask(), orig);
    }

    #[test]
    fn test_ExitedThreadIsNoDeliveryCandidate() {
        let ts = newTaskSet();
        let leader = newProcess(&ts, None);
        let worker = leader.NewThread(blocker(), "worker").unwrap();

        leader
            .ThreadGroup()
            .SetSignalAct(Signal::SIGUSR1, &Some(handlerAct()))
            .unwrap();
        leader.SetSignalMask(SignalSet::New(Signal::SIGUSR1));
        worker.ExitThread();

        // only blocked members remain; the signal waits on the shared queue
        leader.SendGroupSignal(Signal::SIGUSR1, &userOrigin()).unwrap();
        assert!(!worker.Interrupted());
        assert!(leader
            .ThreadGroup()
            .lock()
            .pendingSignals
            .pendingSet
            .Contains(Signal::SIGUSR1));
    }

    #[test]
    fn test_SendToDeadThreadFails() {
        let ts = newTaskSet();
        let leader = newProcess(&ts, None);
        let worker = leader.NewThread(blocker(), "worker").unwrap();
        worker.ExitThread();

        let res = worker.SendSignal(Signal::SIGUSR1, &userOrigin());
        assert_eq!(res, Err(Error::SysError(SysErr::ESRCH)));
    }

    #[test]
    fn test_NewThreadRacingGroupExit() {
        let ts = newTaskSet();
        let leader = newProcess(&ts, None);

        leader.PrepareGroupExit(ExitStatus::New(1, 0));
        let res = leader.NewThread(blocker(), "late");
        match res {
            Err(Error::SysError(e)) => assert_eq!(e, SysErr::EINTR),
            _ => panic!("expected EINTR"),
        }
    }
}
