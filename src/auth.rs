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

use alloc::sync::Arc;
use cache_padded::CachePadded;
use core::ops::Deref;
use core::sync::atomic::AtomicI64;
use core::sync::atomic::Ordering;
use hashbrown::HashMap;
use spin::Mutex;

use super::linux_def::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapSet(pub u64);

pub struct Capability {}

impl Capability {
    pub const CAP_KILL: u64 = 5;
}

impl CapSet {
    pub fn New(caps: &[u64]) -> Self {
        let mut set = 0u64;
        for c in caps {
            set |= 1 << c;
        }
        return Self(set);
    }

    pub fn Full() -> Self {
        return Self(u64::MAX);
    }

    pub fn Contains(&self, cap: u64) -> bool {
        return self.0 & (1 << cap) != 0;
    }
}

// UserAccount carries the per-uid resource accounting shared by every
// thread the user owns; sigpending counts queued signal entries charged
// against RLIMIT_SIGPENDING.
pub struct UserAccountInternal {
    pub uid: UID,
    pub sigpending: CachePadded<AtomicI64>,
}

#[derive(Clone)]
pub struct UserAccount(Arc<UserAccountInternal>);

impl Deref for UserAccount {
    type Target = Arc<UserAccountInternal>;

    fn deref(&self) -> &Arc<UserAccountInternal> {
        &self.0
    }
}

impl UserAccount {
    pub fn New(uid: UID) -> Self {
        return Self(Arc::new(UserAccountInternal {
            uid: uid,
            sigpending: CachePadded::new(AtomicI64::new(0)),
        }));
    }

    pub fn PendingSignalCount(&self) -> i64 {
        return self.sigpending.load(Ordering::SeqCst);
    }

    // Charge reserves one queued-signal entry against limit. The count is
    // bumped before the check so concurrent senders can't all slip under
    // the limit together.
    pub fn Charge(&self, limit: u64) -> Option<UserCharge> {
        let cnt = self.sigpending.fetch_add(1, Ordering::SeqCst) + 1;
        if cnt as u64 > limit {
            self.sigpending.fetch_sub(1, Ordering::SeqCst);
            return None;
        }

        return Some(UserCharge { user: self.clone() });
    }
}

// UserCharge releases its reservation when the queue entry is freed.
pub struct UserCharge {
    user: UserAccount,
}

impl Drop for UserCharge {
    fn drop(&mut self) {
        self.user.sigpending.fetch_sub(1, Ordering::SeqCst);
    }
}

// UserRegistry dedups UserAccounts by uid so that threads of the same
// user share one sigpending counter.
#[derive(Default)]
pub struct UserRegistry(Mutex<HashMap<UID, UserAccount>>);

impl UserRegistry {
    pub fn Account(&self, uid: UID) -> UserAccount {
        let mut map = self.0.lock();
        if let Some(a) = map.get(&uid) {
            return a.clone();
        }

        let a = UserAccount::New(uid);
        map.insert(uid, a.clone());
        return a;
    }
}

#[derive(Debug)]
pub struct CredentialsInternal {
    pub RealKUID: UID,
    pub EffectiveKUID: UID,
    pub SavedKUID: UID,
    pub RealKGID: GID,
    pub EffectiveKGID: GID,
    pub SavedKGID: GID,

    pub EffectiveCaps: CapSet,
}

#[derive(Clone)]
pub struct Credentials(pub Arc<Mutex<CredentialsInternal>>);

impl Deref for Credentials {
    type Target = Arc<Mutex<CredentialsInternal>>;

    fn deref(&self) -> &Arc<Mutex<CredentialsInternal>> {
        &self.0
    }
}

impl Default for Credentials {
    fn default() -> Self {
        return Self::NewRootCredentials();
    }
}

impl Credentials {
    pub fn NewRootCredentials() -> Self {
        return Self(Arc::new(Mutex::new(CredentialsInternal {
            RealKUID: 0,
            EffectiveKUID: 0,
            SavedKUID: 0,
            RealKGID: 0,
            EffectiveKGID: 0,
            SavedKGID: 0,
            EffectiveCaps: CapSet::Full(),
        })));
    }

    pub fn NewUserCredentials(kuid: UID, kgid: GID) -> Self {
        return Self(Arc::new(Mutex::new(CredentialsInternal {
            RealKUID: kuid,
            EffectiveKUID: kuid,
            SavedKUID: kuid,
            RealKGID: kgid,
            EffectiveKGID: kgid,
            SavedKGID: kgid,
            EffectiveCaps: CapSet::default(),
        })));
    }

    pub fn Fork(&self) -> Self {
        let me = self.lock();
        return Self(Arc::new(Mutex::new(CredentialsInternal {
            RealKUID: me.RealKUID,
            EffectiveKUID: me.EffectiveKUID,
            SavedKUID: me.SavedKUID,
            RealKGID: me.RealKGID,
            EffectiveKGID: me.EffectiveKGID,
            SavedKGID: me.SavedKGID,
            EffectiveCaps: me.EffectiveCaps,
        })));
    }

    pub fn HasCapability(&self, cap: u64) -> bool {
        return self.lock().EffectiveCaps.Contains(cap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ChargeLimit() {
        let user = UserAccount::New(1000);

        let c1 = user.Charge(2);
        let c2 = user.Charge(2);
        assert!(c1.is_some());
        assert!(c2.is_some());
        assert!(user.Charge(2).is_none());
        assert_eq!(user.PendingSignalCount(), 2);

        drop(c1);
        assert_eq!(user.PendingSignalCount(), 1);
        assert!(user.Charge(2).is_some());
        drop(c2);
    }

    #[test]
    fn test_RegistrySharesAccount() {
        let reg = UserRegistry::default();
        let a = reg.Account(1000);
        let b = reg.Account(1000);
        let c1 = a.Charge(10);
        assert_eq!(b.PendingSignalCount(), 1);
        drop(c1);
        assert_eq!(b.PendingSignalCount(), 0);
    }
}
