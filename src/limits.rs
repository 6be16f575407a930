// Copyright (c) 2021 QuarkSoft LLC
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
use alloc::sync::Arc;
use core::ops::Deref;
use spin::Mutex;

pub const INFINITY: u64 = u64::MAX;

// default per-user cap on queued signal entries, same as the kernel's
// RLIMIT_SIGPENDING default derived from max_threads/2 on small boxes
pub const DEFAULT_SIGNALS_PENDING: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LimitType {
    SignalsPending,
    ProcessCount,
    Stack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub Cur: u64,
    pub Max: u64,
}

impl Default for Limit {
    fn default() -> Self {
        return Self {
            Cur: INFINITY,
            Max: INFINITY,
        };
    }
}

#[derive(Default)]
pub struct LimitSetInternal {
    pub data: BTreeMap<LimitType, Limit>,
}

#[derive(Clone, Default)]
pub struct LimitSet(pub Arc<Mutex<LimitSetInternal>>);

impl Deref for LimitSet {
    type Target = Arc<Mutex<LimitSetInternal>>;

    fn deref(&self) -> &Arc<Mutex<LimitSetInternal>> {
        &self.0
    }
}

impl LimitSet {
    pub fn New() -> Self {
        let ls = Self::default();
        ls.Set(
            LimitType::SignalsPending,
            Limit {
                Cur: DEFAULT_SIGNALS_PENDING,
                Max: DEFAULT_SIGNALS_PENDING,
            },
        );
        return ls;
    }

    pub fn Get(&self, t: LimitType) -> Limit {
        match self.lock().data.get(&t) {
            None => return Limit::default(),
            Some(l) => return *l,
        }
    }

    pub fn Set(&self, t: LimitType, v: Limit) -> Limit {
        let mut internal = self.lock();
        let old = internal.data.get(&t).cloned().unwrap_or_default();
        internal.data.insert(t, v);
        return old;
    }
}
