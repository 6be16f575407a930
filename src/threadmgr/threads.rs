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

use alloc::collections::btree_map::BTreeMap;
use alloc::collections::btree_set::BTreeSet;
use alloc::string::String;
use alloc::string::ToString;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::ops::Deref;
use spin::RwLock;
use spin::RwLockReadGuard;
use spin::RwLockWriteGuard;

use super::super::auth::*;
use super::super::common::*;
use super::super::limits::*;
use super::super::linux_def::*;
use super::super::signal_def::*;
use super::super::uid::*;
use super::session::*;
use super::task_exit::*;
use super::thread::*;
use super::thread_group::*;

// the highest thread id handed out before the allocator wraps around
pub const MAX_TID: ThreadID = 1 << 15;

#[derive(Default)]
pub struct TaskSetInternal {
    // tasks maps thread ids to live threads.
    pub tasks: BTreeMap<ThreadID, Thread>,

    // tids is the inverse of tasks.
    pub tids: BTreeMap<Thread, ThreadID>,

    // tgids maps thread groups to the ids of their leaders.
    pub tgids: BTreeMap<ThreadGroup, ThreadID>,

    pub sessions: BTreeSet<Session>,

    pub lastTID: ThreadID,
}

impl TaskSetInternal {
    pub fn AllocateTID(&mut self) -> Result<ThreadID> {
        let mut tid = self.lastTID;
        loop {
            tid += 1;
            if tid > MAX_TID {
                tid = INIT_TID;
            }

            if tid == self.lastTID {
                return Err(Error::SysError(SysErr::EAGAIN));
            }

            if !self.tasks.contains_key(&tid) {
                self.lastTID = tid;
                return Ok(tid);
            }
        }
    }
}

#[derive(Clone)]
pub struct TaskSet(
    Arc<RwLock<TaskSetInternal>>,
    // mu is "the TaskSet mutex": it serializes thread and thread-group
    // membership changes against readers walking them, independently of
    // the state above.
    Arc<RwLock<()>>,
    Arc<UserRegistry>,
);

impl Default for TaskSet {
    fn default() -> Self {
        return Self::New();
    }
}

impl Deref for TaskSet {
    type Target = Arc<RwLock<TaskSetInternal>>;

    fn deref(&self) -> &Arc<RwLock<TaskSetInternal>> {
        &self.0
    }
}

pub struct TaskConfig {
    pub Parent: Option<Thread>,
    pub ThreadGroup: ThreadGroup,
    pub Credentials: Credentials,
    pub Blocker: Arc<dyn Blocker>,
    pub Name: String,
}

impl TaskSet {
    pub fn New() -> Self {
        return Self(
            Arc::new(RwLock::new(TaskSetInternal::default())),
            Arc::new(RwLock::new(())),
            Arc::new(UserRegistry::default()),
        );
    }

    pub fn ReadLock(&self) -> RwLockReadGuard<()> {
        return self.1.read();
    }

    pub fn WriteLock(&self) -> RwLockWriteGuard<()> {
        return self.1.write();
    }

    pub fn Users(&self) -> Arc<UserRegistry> {
        return self.2.clone();
    }

    pub fn TaskWithID(&self, tid: ThreadID) -> Option<Thread> {
        return self.read().tasks.get(&tid).cloned();
    }

    // ThreadGroupWithID returns the thread group whose leader has id tgid.
    pub fn ThreadGroupWithID(&self, tgid: ThreadID) -> Option<ThreadGroup> {
        let ts = self.read();
        for (tg, id) in &ts.tgids {
            if *id == tgid {
                return Some(tg.clone());
            }
        }

        return None;
    }

    // forEachThreadGroupLocked applies f to each thread group.
    //
    // Preconditions: the TaskSet mutex must be locked (for reading or
    // writing).
    pub fn forEachThreadGroupLocked(&self, mut f: impl FnMut(&ThreadGroup)) {
        let tgids: Vec<ThreadGroup> = self.read().tgids.keys().cloned().collect();
        for tg in &tgids {
            f(tg)
        }
    }

    // CreateProcess builds a new thread group with a single (leader) thread.
    // With no parent the group becomes the leader of a new session; with a
    // parent it joins the parent's process group.
    pub fn CreateProcess(
        &self,
        parent: Option<Thread>,
        creds: &Credentials,
        blocker: Arc<dyn Blocker>,
    ) -> Result<Thread> {
        let tg = ThreadGroup::New(self.clone(), LimitSet::New(), Signal::SIGCHLD);
        return self.NewTask(&TaskConfig {
            Parent: parent,
            ThreadGroup: tg,
            Credentials: creds.clone(),
            Blocker: blocker,
            Name: "".to_string(),
        });
    }

    pub fn NewTask(&self, cfg: &TaskConfig) -> Result<Thread> {
        let tg = cfg.ThreadGroup.clone();
        let account = self.2.Account(cfg.Credentials.lock().RealKUID);

        let internal = ThreadInternal {
            id: 0,
            name: cfg.Name.clone(),
            blocker: cfg.Blocker.clone(),
            creds: cfg.Credentials.clone(),
            account: account,
            tg: tg.clone(),
            parent: cfg.Parent.clone(),
            children: BTreeSet::new(),
            pendingSignals: PendingSignals::default(),
            signalMask: SignalSet::default(),
            realSignalMask: SignalSet::default(),
            haveSavedSignalMask: false,
            savedSignalMask: SignalSet::default(),
            signalStack: SignalStack::default(),
            groupStopPending: false,
            groupStopAcknowledged: false,
            interrupted: false,
            tracer: None,
            stop: None,
            stopCount: 0,
            exitState: TaskExitState::default(),
            exitStatus: ExitStatus::default(),
        };

        let t = Thread {
            uid: NewUID(),
            data: Arc::new(spin::Mutex::new(internal)),
        };

        let _w = self.WriteLock();

        {
            let lock = tg.lock().signalLock.clone();
            let _s = lock.lock();

            if tg.lock().exiting {
                // the caller raced with a group exit; there is nothing
                // useful to join
                return Err(Error::SysError(SysErr::EINTR));
            }

            let mut tslock = self.write();
            let tid = tslock.AllocateTID()?;
            t.lock().id = tid;
            tslock.tasks.insert(tid, t.clone());
            tslock.tids.insert(t.clone(), tid);
            if tg.lock().leader.Upgrade().is_none() {
                tslock.tgids.insert(tg.clone(), tid);
            }
        }

        match &cfg.Parent {
            None => (),
            Some(p) => {
                p.lock().children.insert(t.clone());
            }
        }

        if tg.lock().leader.Upgrade().is_none() {
            tg.lock().leader = t.Downgrade();
            let parentPG = tg.parentPG();
            match parentPG {
                None => tg.createSession()?,
                Some(pg) => {
                    pg.incRefWithParent(Some(pg.clone()));
                    tg.lock().processGroup = Some(pg);
                }
            }
        }

        tg.lock().tasks.insert(t.clone());
        tg.lock().tasksCount += 1;
        tg.lock().activeTasks += 1;

        return Ok(t);
    }
}

impl Thread {
    // NewThread creates a sibling thread in t's thread group, like
    // clone(CLONE_THREAD).
    pub fn NewThread(&self, blocker: Arc<dyn Blocker>, name: &str) -> Result<Thread> {
        // temporaries in a struct expression live to the end of the
        // statement; two inline self.lock() guards would overlap
        let tg = self.lock().tg.clone();
        let parent = self.lock().parent.clone();
        let creds = self.lock().creds.clone();
        let ts = tg.TaskSet();

        return ts.NewTask(&TaskConfig {
            Parent: parent,
            ThreadGroup: tg,
            Credentials: creds,
            Blocker: blocker,
            Name: name.to_string(),
        });
    }
}
