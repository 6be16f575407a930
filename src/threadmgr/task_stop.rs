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

use super::thread::*;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum TaskStopType {
    GROUPSTOP,
    OTHER,
}

pub trait TaskStop: Sync + Send {
    fn Type(&self) -> TaskStopType;
    fn Killable(&self) -> bool;
}

// GroupStop is a TaskStop placed on every member of a thread group that
// has completed (or is entering) a group stop. It is killable so that
// SIGKILL can tear the group down while stopped.
pub struct GroupStop {}

impl TaskStop for GroupStop {
    fn Type(&self) -> TaskStopType {
        return TaskStopType::GROUPSTOP;
    }

    fn Killable(&self) -> bool {
        return true;
    }
}

impl ThreadInternal {
    pub fn beginInternalStopLocked<T: TaskStop + 'static>(&mut self, s: &Arc<T>) {
        if self.stop.is_some() {
            panic!("Attempting to enter internal stop when already in internal stop");
        }

        self.stop = Some(s.clone());
        self.beginStopLocked();
    }

    // endInternalStopLocked indicates the end of an internal stop that
    // applies to t. endInternalStopLocked does not wait for the task to
    // resume.
    //
    // Preconditions: The signal mutex must be locked. The task must be in
    // an internal stop (i.e. t.stop != nil).
    pub fn endInternalStopLocked(&mut self) {
        if self.stop.is_none() {
            panic!("Attempting to leave non-existent internal stop")
        }

        self.stop = None;
        self.endStopLocked();
    }

    // beginStopLocked increments t.stopCount to indicate that a new internal or
    // external stop applies to t.
    //
    // Preconditions: The signal mutex must be locked.
    pub fn beginStopLocked(&mut self) {
        self.stopCount += 1;
    }

    // endStopLocked decrements t.stopCount to indicate that an existing internal
    // or external stop no longer applies to t.
    //
    // Preconditions: The signal mutex must be locked.
    pub fn endStopLocked(&mut self) {
        self.stopCount -= 1;
        if self.stopCount < 0 {
            panic!("Invalid stopCount: {}", self.stopCount)
        }
    }
}

impl Thread {
    // BeginExternalStop indicates the start of an external stop that applies
    // to t. BeginExternalStop does not wait for t to stop.
    pub fn BeginExternalStop(&self) {
        let tg = self.lock().tg.clone();
        let lock = tg.lock().signalLock.clone();
        let _s = lock.lock();

        let mut t = self.lock();
        t.beginStopLocked();
        t.interrupt();
    }

    // EndExternalStop indicates the end of an external stop started by a
    // previous call to Thread::BeginExternalStop.
    pub fn EndExternalStop(&self) {
        let tg = self.lock().tg.clone();
        let lock = tg.lock().signalLock.clone();
        let _s = lock.lock();

        let mut t = self.lock();
        t.endStopLocked();
    }
}
