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
use alloc::sync::Arc;
use alloc::sync::Weak;
use alloc::vec::Vec;
use core::cmp::*;
use core::ops::Deref;
use spin::Mutex;

use super::super::common::*;
use super::super::limits::*;
use super::super::linux_def::*;
use super::super::signal_def::*;
use super::super::signal_handlers::*;
use super::super::uid::*;
use super::processgroup::*;
use super::session::*;
use super::task_exit::*;
use super::thread::*;
use super::threads::*;

pub struct ThreadGroupInternal {
    // owner is the TaskSet containing this thread group. The owner pointer
    // is immutable.
    pub owner: TaskSet,

    // leader is the thread group's leader, which is the oldest task in the
    // thread group. Once a thread group has been made visible to the rest
    // of the system by TaskSet.NewTask, leader is never nil.
    //
    // leader is protected by the TaskSet mutex.
    pub leader: ThreadWeak,

    // tasks is every live task in the thread group.
    //
    // tasks is protected by both the TaskSet mutex and the signal mutex:
    // both must be locked to mutate it, and either may be locked to read
    // it.
    pub tasks: BTreeSet<Thread>,

    // tasksCount is the number of tasks in the thread group that have not
    // yet been reaped.
    //
    // tasksCount is protected as tasks is.
    pub tasksCount: i32,

    // activeTasks is the number of tasks in the thread group that have not
    // yet entered the exit path.
    //
    // activeTasks is protected as tasks is.
    pub activeTasks: i32,

    // processGroup is the processGroup for this thread group.
    //
    // processGroup is protected by the TaskSet mutex.
    pub processGroup: Option<ProcessGroup>,

    // signalLock protects all of the signal state of every member thread
    // and the group itself: the pending queues, masks, dispositions and
    // the group-stop bookkeeping below. It is the lock called "the signal
    // mutex" throughout threadmgr.
    pub signalLock: Arc<Mutex<()>>,

    pub signalHandlers: SignalHandlers,

    pub limits: LimitSet,

    // pendingSignals is the set of pending signals that may be handled by
    // any task in this thread group.
    //
    // pendingSignals is protected by the signal mutex.
    pub pendingSignals: PendingSignals,

    // If groupStopDequeued is true, a task in the thread group has dequeued
    // a stop signal, but has not yet initiated the group stop. Initiation
    // drops the signal mutex to inspect process-group state, so this marker
    // is re-checked afterwards; an intervening SIGCONT or SIGKILL clears it
    // and aborts the stop.
    //
    // groupStopDequeued is analogous to Linux's JOBCTL_STOP_DEQUEUED.
    //
    // groupStopDequeued is protected by the signal mutex.
    pub groupStopDequeued: bool,

    // groupStopSignal is the signal that caused a group stop to be initiated.
    //
    // groupStopSignal is protected by the signal mutex.
    pub groupStopSignal: Signal,

    // groupStopPendingCount is the number of active tasks in the thread
    // group for which Thread.groupStopPending is set.
    //
    // groupStopPendingCount is analogous to Linux's
    // signal_struct::group_stop_count.
    //
    // groupStopPendingCount is protected by the signal mutex.
    pub groupStopPendingCount: i32,

    // If groupStopComplete is true, groupStopPendingCount transitioned from
    // non-zero to zero without an intervening SIGCONT.
    //
    // groupStopComplete is analogous to Linux's SIGNAL_STOP_STOPPED.
    //
    // groupStopComplete is protected by the signal mutex.
    pub groupStopComplete: bool,

    // If groupContNotify is true, then a SIGCONT has recently ended a group
    // stop on this thread group, and the first task to observe it should
    // notify its parent. groupContInterrupted is true iff SIGCONT ended an
    // incomplete group stop.
    //
    // groupContNotify && groupContInterrupted is Linux's SIGNAL_CLD_STOPPED;
    // groupContNotify && !groupContInterrupted is SIGNAL_CLD_CONTINUED.
    //
    // Both are protected by the signal mutex.
    pub groupContNotify: bool,
    pub groupContInterrupted: bool,

    // If groupExitTask is not nil, it is the task chosen to carry a fatal
    // core-dump signal while the rest of the group stops; it does not
    // participate in the stop it initiated.
    //
    // groupExitTask is analogous to Linux's signal_struct::group_exit_task.
    //
    // groupExitTask is protected by the signal mutex.
    pub groupExitTask: ThreadWeak,

    // currTarget is the round-robin cursor for choosing which member takes
    // the next group-directed signal when the leader doesn't want it.
    //
    // currTarget is protected by the signal mutex.
    pub currTarget: ThreadWeak,

    // exiting is true if all tasks in the ThreadGroup should exit. exiting
    // is analogous to Linux's SIGNAL_GROUP_EXIT.
    //
    // exiting is protected by the signal mutex. exiting can only transition
    // from false to true.
    pub exiting: bool,

    // exitStatus is the thread group's exit status.
    //
    // While exiting is false, exitStatus is protected by the signal mutex.
    // When exiting becomes true, exitStatus becomes immutable.
    pub exitStatus: ExitStatus,

    // terminationSignal is the signal that this thread group's leader will
    // send to its parent when it exits.
    //
    // terminationSignal is protected by the TaskSet mutex.
    pub terminationSignal: Signal,
}

#[derive(Clone, Default)]
pub struct ThreadGroupWeak {
    pub uid: UniqueID,
    pub data: Weak<Mutex<ThreadGroupInternal>>,
}

impl ThreadGroupWeak {
    pub fn Upgrade(&self) -> Option<ThreadGroup> {
        let tg = match self.data.upgrade() {
            None => return None,
            Some(tg) => tg,
        };

        return Some(ThreadGroup {
            uid: self.uid,
            data: tg,
        });
    }
}

pub struct ThreadGroup {
    pub uid: UniqueID,
    pub data: Arc<Mutex<ThreadGroupInternal>>,
}

impl Clone for ThreadGroup {
    fn clone(&self) -> Self {
        return Self {
            uid: self.uid,
            data: self.data.clone(),
        };
    }
}

impl Deref for ThreadGroup {
    type Target = Arc<Mutex<ThreadGroupInternal>>;

    fn deref(&self) -> &Arc<Mutex<ThreadGroupInternal>> {
        &self.data
    }
}

impl Ord for ThreadGroup {
    fn cmp(&self, other: &Self) -> Ordering {
        return self.uid.cmp(&other.uid);
    }
}

impl PartialOrd for ThreadGroup {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ThreadGroup {
    fn eq(&self, other: &Self) -> bool {
        return self.uid == other.uid;
    }
}

impl Eq for ThreadGroup {}

impl ThreadGroup {
    pub fn New(owner: TaskSet, limits: LimitSet, terminationSignal: Signal) -> Self {
        let internal = ThreadGroupInternal {
            owner: owner,
            leader: ThreadWeak::default(),
            tasks: BTreeSet::new(),
            tasksCount: 0,
            activeTasks: 0,
            processGroup: None,
            signalLock: Arc::new(Mutex::new(())),
            signalHandlers: SignalHandlers::default(),
            limits: limits,
            pendingSignals: PendingSignals::default(),
            groupStopDequeued: false,
            groupStopSignal: Signal::default(),
            groupStopPendingCount: 0,
            groupStopComplete: false,
            groupContNotify: false,
            groupContInterrupted: false,
            groupExitTask: ThreadWeak::default(),
            currTarget: ThreadWeak::default(),
            exiting: false,
            exitStatus: ExitStatus::default(),
            terminationSignal: terminationSignal,
        };

        return Self {
            uid: NewUID(),
            data: Arc::new(Mutex::new(internal)),
        };
    }

    pub fn Uid(&self) -> UniqueID {
        return self.uid;
    }

    pub fn Downgrade(&self) -> ThreadGroupWeak {
        return ThreadGroupWeak {
            uid: self.uid,
            data: Arc::downgrade(&self.data),
        };
    }

    pub fn TaskSet(&self) -> TaskSet {
        return self.lock().owner.clone();
    }

    pub fn Leader(&self) -> Option<Thread> {
        return self.lock().leader.Upgrade();
    }

    // ID returns the thread group id, which is its leader's thread id.
    pub fn ID(&self) -> ThreadID {
        match self.Leader() {
            None => return 0,
            Some(l) => return l.ThreadID(),
        }
    }

    pub fn SignalHandlers(&self) -> SignalHandlers {
        return self.lock().signalHandlers.clone();
    }

    pub fn Limits(&self) -> LimitSet {
        return self.lock().limits.clone();
    }

    pub fn MemberIDs(&self) -> Vec<ThreadID> {
        let ts = self.TaskSet();
        let _r = ts.ReadLock();

        let mut ids = Vec::new();
        for t in &self.lock().tasks {
            ids.push(t.ThreadID());
        }

        return ids;
    }

    pub fn Count(&self) -> usize {
        let ts = self.TaskSet();
        let _r = ts.ReadLock();

        return self.lock().tasks.len();
    }

    // forEachMember applies f to every live task in the thread group.
    //
    // Preconditions: the signal mutex or the TaskSet mutex must be locked.
    pub fn forEachMember(&self, mut f: impl FnMut(&Thread)) {
        let tasks: Vec<Thread> = self.lock().tasks.iter().cloned().collect();
        for t in &tasks {
            f(t)
        }
    }

    pub fn ProcessGroup(&self) -> Option<ProcessGroup> {
        return self.lock().processGroup.clone();
    }

    pub fn Session(&self) -> Option<Session> {
        match self.ProcessGroup() {
            None => return None,
            Some(pg) => return Some(pg.Session()),
        }
    }

    pub fn parentPG(&self) -> Option<ProcessGroup> {
        match self.Leader() {
            None => return None,
            Some(l) => match l.lock().parent.clone() {
                None => return None,
                Some(p) => return p.lock().tg.ProcessGroup(),
            },
        }
    }

    // createSession makes this thread group the leader of a new session
    // with a single new process group, like setsid(2).
    //
    // Preconditions: TaskSet.mu must be locked for writing.
    pub fn createSession(&self) -> Result<()> {
        let id = self.ID() as SessionID;
        let session = Session::New(id, self.Downgrade());
        let pg = ProcessGroup::New(id as ProcessGroupID, self.Downgrade(), session.clone());

        session.lock().processGroups.insert(pg.clone());

        let ts = self.TaskSet();
        ts.write().sessions.insert(session);

        self.lock().processGroup = Some(pg);
        return Ok(());
    }

    // CreateProcessGroup places this thread group into a fresh process
    // group in its current session, like setpgid(0, 0).
    pub fn CreateProcessGroup(&self) -> Result<()> {
        let ts = self.TaskSet();
        let _w = ts.WriteLock();

        let session = match self.Session() {
            None => return Err(Error::SysError(SysErr::EPERM)),
            Some(s) => s,
        };

        let oldPG = self.ProcessGroup();
        let pg = ProcessGroup::New(self.ID() as ProcessGroupID, self.Downgrade(), session.clone());
        session.lock().processGroups.insert(pg.clone());

        pg.incRefWithParent(self.parentPG());
        if let Some(old) = oldPG {
            old.decRefWithParent(self.parentPG());
        }

        self.lock().processGroup = Some(pg);
        return Ok(());
    }
}
