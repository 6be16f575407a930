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

use alloc::vec::Vec;

use super::super::linux_def::*;
use super::super::signal_def::*;
use super::thread::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitStatus {
    // Code is the numeric value passed to the call to exit or exit_group that
    // caused the exit. If the exit was not caused by such a call, Code is 0.
    pub Code: i32,

    // Signo is the signal that caused the exit. If the exit was not caused by
    // a signal, Signo is 0.
    pub Signo: i32,

    // Dumped is true if the fatal signal's default action is a core dump.
    pub Dumped: bool,
}

impl ExitStatus {
    pub fn New(code: i32, signo: i32) -> Self {
        return ExitStatus {
            Code: code,
            Signo: signo,
            Dumped: false,
        };
    }

    pub fn NewSignaled(sig: Signal, dumped: bool) -> Self {
        return ExitStatus {
            Code: 0,
            Signo: sig.0,
            Dumped: dumped,
        };
    }

    // Signaled returns true if the ExitStatus indicates that the exiting task or
    // thread group was killed by a signal.
    pub fn Signaled(&self) -> bool {
        return self.Signo != 0;
    }

    // Status returns the numeric representation of the ExitStatus returned by
    // e.g. the wait4() system call.
    pub fn Status(&self) -> u32 {
        let mut status = (((self.Code as u32) & 0xff) << 8) | ((self.Signo as u32) & 0xff);
        if self.Dumped {
            status |= 0x80;
        }

        return status;
    }

    // ShellExitCode returns the numeric exit code that Bash would return for an
    // exit status of es.
    pub fn ShellExitCode(&self) -> i32 {
        if self.Signaled() {
            return 128 + self.Signo;
        }

        return self.Code;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskExitState {
    // TaskExitNone indicates that the task has not begun exiting.
    TaskExitNone,

    // TaskExitInitiated indicates that the task has entered the exit path,
    // and is no longer eligible to participate in group stops or group
    // signal handling. TaskExitInitiated is analogous to Linux's PF_EXITING.
    TaskExitInitiated,

    // TaskExitDead indicates that the task's thread ID has been released.
    TaskExitDead,
}

impl Default for TaskExitState {
    fn default() -> Self {
        return Self::TaskExitNone;
    }
}

impl ThreadInternal {
    // killLocked marks the thread killed: any killable stop ends, a forced
    // SIGKILL membership bit is set (no queue entry, no accounting) and the
    // thread is interrupted.
    //
    // Preconditions: The signal mutex must be locked.
    pub fn killLocked(&mut self) {
        match &self.stop {
            Some(s) => {
                if s.Killable() {
                    self.endInternalStopLocked();
                }
            }
            None => (),
        }

        self.pendingSignals.ForceSet(Signal::SIGKILL);
        self.interrupt();
    }

    // killedLocked returns true if t has a SIGKILL pending. It is analogous
    // to Linux's fatal_signal_pending().
    //
    // Preconditions: The signal mutex must be locked.
    pub fn killedLocked(&self) -> bool {
        return self.pendingSignals.pendingSet.Contains(Signal::SIGKILL);
    }
}

impl Thread {
    pub fn Killed(&self) -> bool {
        let tg = self.lock().tg.clone();
        let lock = tg.lock().signalLock.clone();
        let _s = lock.lock();

        return self.lock().killedLocked();
    }

    // PrepareGroupExit marks the thread group exiting with status es and
    // force-kills every other member. It is the common path for
    // exit_group(2) and for fatal signal delivery.
    pub fn PrepareGroupExit(&self, es: ExitStatus) {
        let tg = self.lock().tg.clone();
        let lock = tg.lock().signalLock.clone();
        let _s = lock.lock();

        self.PrepareGroupExitLocked(es);
    }

    // Preconditions: The signal mutex must be locked.
    pub fn PrepareGroupExitLocked(&self, es: ExitStatus) {
        let tg = self.lock().tg.clone();

        if tg.lock().exiting {
            self.lock().exitStatus = tg.lock().exitStatus;
            return;
        }

        {
            let mut tglock = tg.lock();
            tglock.exiting = true;
            tglock.exitStatus = es;

            // a group exit supersedes any group stop in progress
            tglock.groupStopDequeued = false;
            tglock.groupStopPendingCount = 0;
            tglock.groupStopComplete = false;
            tglock.groupContNotify = false;
        }
        self.lock().exitStatus = es;

        let tasks: Vec<Thread> = tg.lock().tasks.iter().cloned().collect();
        for sibling in &tasks {
            if *sibling != *self {
                sibling.lock().groupStopPending = false;
                sibling.lock().killLocked();
            }
        }
    }

    // ExitThread removes the thread from signal delivery: its private queue
    // is flushed (uncharging the senders' budgets) and it stops being a
    // candidate for group-directed signals.
    pub fn ExitThread(&self) {
        let tg = self.lock().tg.clone();
        let ts = tg.TaskSet();
        let _w = ts.WriteLock();

        let lock = tg.lock().signalLock.clone();
        let mut notifyParent = false;

        {
            let _s = lock.lock();

            {
                let mut t = self.lock();
                if t.exitState != TaskExitState::TaskExitNone {
                    return;
                }

                t.exitState = TaskExitState::TaskExitInitiated;
                t.pendingSignals.Flush();

                // A thread counted into an in-flight group stop must not
                // leave the stop waiting on it forever: exiting counts as
                // participation.
                if t.groupStopPending {
                    t.groupStopPending = false;
                    notifyParent = t.participateGroupStopLocked();
                }

                if t.stop.is_some() {
                    t.endInternalStopLocked();
                }
            }

            let mut tglock = tg.lock();
            tglock.activeTasks -= 1;

            // move the round-robin cursor off a dying thread
            match tglock.currTarget.Upgrade() {
                Some(curr) => {
                    if curr == *self {
                        tglock.currTarget = ThreadWeak::default();
                    }
                }
                None => (),
            }

            tglock.tasks.remove(self);
            tglock.tasksCount -= 1;
            drop(tglock);

            self.lock().exitState = TaskExitState::TaskExitDead;
        }

        // this thread was the last missing participant; tell the parent with
        // the signal mutex dropped, as the dequeue loop does
        if notifyParent {
            match tg.Leader() {
                None => (),
                Some(leader) => {
                    let parent = leader.lock().parent.clone();
                    let sig = tg.lock().groupStopSignal;
                    match parent {
                        Some(p) => p.signalStop(&leader, CldCode::CLD_STOPPED, sig.0),
                        None => (),
                    }
                }
            }
        }

        let mut tslock = ts.write();
        let id = self.lock().id;
        tslock.tasks.remove(&id);
        tslock.tids.remove(self);
    }
}
