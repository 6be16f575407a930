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
use core::cmp::*;
use core::ops::Deref;
use spin::Mutex;

use super::super::linux_def::*;
use super::super::uid::*;
use super::processgroup::*;
use super::thread_group::*;

#[derive(Default)]
pub struct SessionInternal {
    // id is the session id, which is the thread group id of its leader.
    //
    // The id is immutable.
    pub id: SessionID,

    // leader is the originator of the session.
    //
    // leader is protected by TaskSet.mu.
    pub leader: ThreadGroupWeak,

    // processGroups is the set of process groups in the session.
    //
    // processGroups is protected by TaskSet.mu.
    pub processGroups: BTreeSet<ProcessGroup>,
}

#[derive(Clone, Default)]
pub struct Session {
    pub uid: UniqueID,
    pub data: Arc<Mutex<SessionInternal>>,
}

impl Deref for Session {
    type Target = Arc<Mutex<SessionInternal>>;

    fn deref(&self) -> &Arc<Mutex<SessionInternal>> {
        &self.data
    }
}

impl Ord for Session {
    fn cmp(&self, other: &Self) -> Ordering {
        return self.uid.cmp(&other.uid);
    }
}

impl PartialOrd for Session {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        return self.uid == other.uid;
    }
}

impl Eq for Session {}

impl Session {
    pub fn New(id: SessionID, leader: ThreadGroupWeak) -> Self {
        let internal = SessionInternal {
            id: id,
            leader: leader,
            processGroups: BTreeSet::new(),
        };

        return Self {
            uid: NewUID(),
            data: Arc::new(Mutex::new(internal)),
        };
    }

    pub fn Uid(&self) -> UniqueID {
        return self.uid;
    }

    pub fn ID(&self) -> SessionID {
        return self.lock().id;
    }
}
