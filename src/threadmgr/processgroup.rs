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

use alloc::sync::Arc;
use core::cmp::*;
use core::ops::Deref;
use spin::Mutex;

use super::super::linux_def::*;
use super::super::uid::*;
use super::session::*;
use super::thread_group::*;

#[derive(Default)]
pub struct ProcessGroupInternal {
    // id is the process group id, which is the thread group id of its
    // originator.
    //
    // The id is immutable.
    pub id: ProcessGroupID,

    // originator is the originator of the group.
    //
    // originator is protected by TaskSet.mu.
    pub originator: ThreadGroupWeak,

    // Session is the parent Session.
    //
    // The session is immutable.
    pub session: Session,

    // ancestors is the number of thread groups in this process group whose
    // parent is in a different process group in the same session.
    //
    // The name is derived from the fact that process groups where
    // ancestors is zero are considered "orphans".
    //
    // ancestors is protected by TaskSet.mu.
    pub ancestors: u32,
}

#[derive(Clone, Default)]
pub struct ProcessGroup {
    pub uid: UniqueID,
    pub data: Arc<Mutex<ProcessGroupInternal>>,
}

impl Deref for ProcessGroup {
    type Target = Arc<Mutex<ProcessGroupInternal>>;

    fn deref(&self) -> &Arc<Mutex<ProcessGroupInternal>> {
        &self.data
    }
}

impl Ord for ProcessGroup {
    fn cmp(&self, other: &Self) -> Ordering {
        return self.uid.cmp(&other.uid);
    }
}

impl PartialOrd for ProcessGroup {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ProcessGroup {
    fn eq(&self, other: &Self) -> bool {
        return self.uid == other.uid;
    }
}

impl Eq for ProcessGroup {}

impl ProcessGroup {
    pub fn New(id: ProcessGroupID, originator: ThreadGroupWeak, session: Session) -> Self {
        let pg = ProcessGroupInternal {
            id: id,
            originator: originator,
            session: session,
            ancestors: 0,
        };

        return Self {
            uid: NewUID(),
            data: Arc::new(Mutex::new(pg)),
        };
    }

    pub fn Uid(&self) -> UniqueID {
        return self.uid;
    }

    pub fn ID(&self) -> ProcessGroupID {
        return self.lock().id;
    }

    pub fn Session(&self) -> Session {
        return self.lock().session.clone();
    }

    // IsOrphan returns true if this process group is an orphan: no member
    // has a parent in a different process group of the same session. TTY
    // stop signals delivered to an orphaned group are discarded.
    //
    // Preconditions: TaskSet.mu must be locked.
    pub fn IsOrphan(&self) -> bool {
        return self.lock().ancestors == 0;
    }

    // Preconditions: TaskSet.mu must be locked for writing.
    pub fn incRefWithParent(&self, parentPG: Option<ProcessGroup>) {
        match &parentPG {
            None => (),
            Some(ppg) => {
                if *self != *ppg && self.lock().session == ppg.lock().session {
                    self.lock().ancestors += 1;
                }
            }
        }
    }

    // Preconditions: TaskSet.mu must be locked for writing.
    pub fn decRefWithParent(&self, parentPG: Option<ProcessGroup>) {
        match &parentPG {
            None => (),
            Some(ppg) => {
                if *self != *ppg && self.lock().session == ppg.lock().session {
                    let mut pg = self.lock();
                    if pg.ancestors > 0 {
                        pg.ancestors -= 1;
                    }
                }
            }
        }
    }
}
