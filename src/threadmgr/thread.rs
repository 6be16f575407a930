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

use alloc::collections::btree_set::BTreeSet;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::sync::Weak;
use core::cmp::*;
use core::ops::Deref;
use spin::Mutex;

use super::super::auth::*;
use super::super::common::*;
use super::super::linux_def::*;
use super::super::signal_def::*;
use super::super::uid::*;
use super::task_exit::*;
use super::task_signals::*;
use super::task_stop::*;
use super::thread_group::*;
use super::threads::*;

// Blocker is how the signal engine sleeps. Sigtimedwait, sigsuspend and
// pause park the calling thread here; a production implementation wires
// this to the scheduler, tests drive it directly.
//
// BlockWithTimeout returns Ok(()) when the sleep was interrupted by
// Thread::interrupt, and Err(Error::Timeout) when timeoutNs elapsed.
// timeoutNs == None sleeps until interrupted.
pub trait Blocker: Send + Sync {
    fn BlockWithTimeout(&self, t: &Thread, timeoutNs: Option<i64>) -> Result<()>;
}

// NopBlocker never sleeps: a timed wait times out immediately and an
// untimed wait reports an interrupt.
pub struct NopBlocker {}

impl Blocker for NopBlocker {
    fn BlockWithTimeout(&self, _t: &Thread, timeoutNs: Option<i64>) -> Result<()> {
        match timeoutNs {
            Some(_) => return Err(Error::Timeout),
            None => return Ok(()),
        }
    }
}

pub struct ThreadInternal {
    pub id: ThreadID,

    // Name is the thread name set by the prctl(PR_SET_NAME) system call.
    pub name: String,

    pub blocker: Arc<dyn Blocker>,

    pub creds: Credentials,

    // account is the per-uid bookkeeping that queued signals sent to this
    // thread are charged against. The account is immutable.
    pub account: UserAccount,

    // tg is the thread group that this task belongs to. The tg pointer is
    // immutable.
    pub tg: ThreadGroup,

    // parent is the task's parent. parent may be nil.
    //
    // parent is protected by the TaskSet mutex.
    pub parent: Option<Thread>,

    // children is this task's children.
    //
    // children is protected by the TaskSet mutex.
    pub children: BTreeSet<Thread>,

    // pendingSignals is the set of pending signals that may be handled only by
    // this task.
    //
    // pendingSignals is protected by the signal mutex; see comment on
    // ThreadGroup.signalLock.
    pub pendingSignals: PendingSignals,

    // signalMask is the set of signals whose delivery is currently blocked.
    //
    // signalMask is protected by the signal mutex. signalMask is owned by
    // the task itself.
    pub signalMask: SignalSet,

    // If the task is currently executing Sigtimedwait, realSignalMask is
    // the previous value of signalMask, which has temporarily been replaced
    // by Sigtimedwait. Otherwise, realSignalMask is 0.
    //
    // realSignalMask is exclusive to the task.
    pub realSignalMask: SignalSet,

    // If haveSavedSignalMask is true, savedSignalMask is the signal mask that
    // should be applied after the task has either delivered one signal to a
    // user handler or is about to resume execution in the untrusted
    // application.
    //
    // Both haveSavedSignalMask and savedSignalMask are exclusive to the task.
    pub haveSavedSignalMask: bool,
    pub savedSignalMask: SignalSet,

    // signalStack is the alternate signal stack used by signal handlers for
    // which the SA_ONSTACK flag is set.
    //
    // signalStack is exclusive to the task.
    pub signalStack: SignalStack,

    // If groupStopPending is true, the task should participate in a group
    // stop in the interrupt path.
    //
    // groupStopPending is protected by the signal mutex.
    pub groupStopPending: bool,

    // If groupStopAcknowledged is true, the task has already acknowledged that
    // it is entering the most recent group stop that has been initiated on its
    // thread group.
    //
    // groupStopAcknowledged is protected by the signal mutex.
    pub groupStopAcknowledged: bool,

    // interrupted is the library's stand-in for TIF_SIGPENDING: it tells
    // the thread to revisit the dequeue loop before returning to userspace.
    //
    // interrupted is protected by the signal mutex.
    pub interrupted: bool,

    // If tracer is not nil, the thread is ptraced and every dequeued signal
    // (except SIGKILL) is reported to the tracer before delivery.
    //
    // tracer is protected by the signal mutex.
    pub tracer: Option<Arc<dyn Tracer>>,

    // If stop is not nil, it is the internally-initiated condition that
    // currently prevents the task from running.
    //
    // stop is protected by the signal mutex.
    pub stop: Option<Arc<dyn TaskStop>>,

    // stopCount is the number of active stops that apply to the task.
    //
    // stopCount is protected by the signal mutex.
    pub stopCount: i32,

    // exitState is the task's progression through the exit path.
    //
    // exitState is protected by the TaskSet mutex.
    pub exitState: TaskExitState,

    // exitStatus is the task's exit status.
    //
    // exitStatus is protected by the signal mutex.
    pub exitStatus: ExitStatus,
}

impl ThreadInternal {
    pub fn interrupt(&mut self) {
        self.interrupted = true;
    }

    pub fn Stopped(&self) -> bool {
        return self.stop.is_some();
    }

    pub fn IsExiting(&self) -> bool {
        return self.exitState != TaskExitState::TaskExitNone;
    }
}

pub struct ThreadWeak {
    pub uid: UniqueID,
    pub data: Weak<Mutex<ThreadInternal>>,
}

impl Default for ThreadWeak {
    fn default() -> Self {
        return Self {
            uid: 0,
            data: Weak::new(),
        };
    }
}

impl ThreadWeak {
    pub fn Upgrade(&self) -> Option<Thread> {
        let t = match self.data.upgrade() {
            None => return None,
            Some(t) => t,
        };

        return Some(Thread {
            uid: self.uid,
            data: t,
        });
    }
}

pub struct Thread {
    pub uid: UniqueID,
    pub data: Arc<Mutex<ThreadInternal>>,
}

impl Clone for Thread {
    fn clone(&self) -> Self {
        return Self {
            uid: self.uid,
            data: self.data.clone(),
        };
    }
}

impl Deref for Thread {
    type Target = Arc<Mutex<ThreadInternal>>;

    fn deref(&self) -> &Arc<Mutex<ThreadInternal>> {
        &self.data
    }
}

impl Ord for Thread {
    fn cmp(&self, other: &Self) -> Ordering {
        return self.uid.cmp(&other.uid);
    }
}

impl PartialOrd for Thread {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Thread {
    fn eq(&self, other: &Self) -> bool {
        return self.uid == other.uid;
    }
}

impl Eq for Thread {}

impl Thread {
    pub fn Uid(&self) -> UniqueID {
        return self.uid;
    }

    pub fn Downgrade(&self) -> ThreadWeak {
        return ThreadWeak {
            uid: self.uid,
            data: Arc::downgrade(&self.data),
        };
    }

    pub fn ThreadGroup(&self) -> ThreadGroup {
        return self.lock().tg.clone();
    }

    pub fn ThreadID(&self) -> ThreadID {
        return self.lock().id;
    }

    pub fn TaskSet(&self) -> TaskSet {
        let tg = self.lock().tg.clone();
        return tg.TaskSet();
    }

    pub fn Credentials(&self) -> Credentials {
        return self.lock().creds.clone();
    }

    pub fn Parent(&self) -> Option<Thread> {
        return self.lock().parent.clone();
    }

    pub fn SignalMask(&self) -> SignalSet {
        return self.lock().signalMask;
    }

    // interrupt wakes the thread out of an interruptible sleep and forces
    // it through the dequeue loop.
    pub fn interrupt(&self) {
        self.lock().interrupt();
    }

    pub fn Interrupted(&self) -> bool {
        return self.lock().interrupted;
    }

    pub fn ResetInterrupt(&self) {
        self.lock().interrupted = false;
    }

    pub fn Blocker(&self) -> Arc<dyn Blocker> {
        return self.lock().blocker.clone();
    }

    pub fn Account(&self) -> UserAccount {
        return self.lock().account.clone();
    }

    pub fn SetTracer(&self, tracer: Option<Arc<dyn Tracer>>) {
        let tg = self.lock().tg.clone();
        let lock = tg.lock().signalLock.clone();
        let _s = lock.lock();

        self.lock().tracer = tracer;
    }

    pub fn Traced(&self) -> bool {
        return self.lock().tracer.is_some();
    }
}
