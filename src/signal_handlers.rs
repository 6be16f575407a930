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
use alloc::sync::Arc;
use core::ops::Deref;
use spin::Mutex;

use super::linux_def::*;
use super::signal_def::*;

pub struct SignalAction {}

impl SignalAction {
    pub const TERM: u64 = 0;
    pub const CORE: u64 = 1;
    pub const STOP: u64 = 2;
    pub const IGNORE: u64 = 3;
    pub const HANDLER: u64 = 4;
}

pub const DEFAULT_ACTION: [u64; STD_SIGNAL_COUNT + 1] = [
    SignalAction::IGNORE, //0
    SignalAction::TERM,   //1 SIGHUP
    SignalAction::TERM,   //2 SIGINT
    SignalAction::CORE,   //3 SIGQUIT
    SignalAction::CORE,   //4 SIGILL
    SignalAction::CORE,   //5 SIGTRAP
    SignalAction::CORE,   //6 SIGABRT
    SignalAction::CORE,   //7 SIGBUS
    SignalAction::CORE,   //8 SIGFPE
    SignalAction::TERM,   //9 SIGKILL
    SignalAction::TERM,   //10 SIGUSR1
    SignalAction::CORE,   //11 SIGSEGV
    SignalAction::TERM,   //12 SIGUSR2
    SignalAction::TERM,   //13 SIGPIPE
    SignalAction::TERM,   //14 SIGALRM
    SignalAction::TERM,   //15 SIGTERM
    SignalAction::TERM,   //16 SIGSTKFLT
    SignalAction::IGNORE, //17 SIGCHLD
    SignalAction::IGNORE, //18 SIGCONT
    SignalAction::STOP,   //19 SIGSTOP
    SignalAction::STOP,   //20 SIGTSTP
    SignalAction::STOP,   //21 SIGTTIN
    SignalAction::STOP,   //22 SIGTTOU
    SignalAction::IGNORE, //23 SIGURG
    SignalAction::CORE,   //24 SIGXCPU
    SignalAction::CORE,   //25 SIGXFSZ
    SignalAction::TERM,   //26 SIGVTALRM
    SignalAction::TERM,   //27 SIGPROF
    SignalAction::IGNORE, //28 SIGWINCH
    SignalAction::TERM,   //29 SIGIO
    SignalAction::TERM,   //30 SIGPWR
    SignalAction::CORE,   //31 SIGSYS
];

// ComputeAction figures out what to do given a signal number and an action.
// If act.handler is:
// 0, the default action is taken;
// 1, the signal is ignored;
// anything else, the function returns SignalAction::HANDLER.
pub fn ComputeAction(sig: Signal, act: &SigAct) -> u64 {
    match sig {
        Signal::SIGSTOP => return SignalAction::STOP,
        Signal::SIGKILL => return SignalAction::TERM,
        _ => {
            if act.handler == SigAct::SIGNAL_ACT_DEFAULT {
                // realtime signals terminate by default
                if sig.IsRealtime() {
                    return SignalAction::TERM;
                }
                return DEFAULT_ACTION[sig.0 as usize];
            } else if act.handler == SigAct::SIGNAL_ACT_IGNORE {
                return SignalAction::IGNORE;
            } else {
                return SignalAction::HANDLER;
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SignalHandlersInternal {
    pub actions: BTreeMap<i32, SigAct>,
}

impl SignalHandlersInternal {
    pub fn GetAct(&self, sig: Signal) -> SigAct {
        match self.actions.get(&sig.0) {
            None => return SigAct::default(),
            Some(act) => return *act,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SignalHandlers(Arc<Mutex<SignalHandlersInternal>>);

impl Deref for SignalHandlers {
    type Target = Arc<Mutex<SignalHandlersInternal>>;

    fn deref(&self) -> &Arc<Mutex<SignalHandlersInternal>> {
        &self.0
    }
}

impl SignalHandlers {
    pub fn Fork(&self) -> Self {
        let me = self.lock();
        let mut sh = SignalHandlersInternal::default();

        for (i, act) in &me.actions {
            sh.actions.insert(*i, *act);
        }

        return SignalHandlers(Arc::new(Mutex::new(sh)));
    }

    // CopyForExec drops every handler; only explicit ignores survive the
    // exec boundary.
    pub fn CopyForExec(&self) -> Self {
        let me = self.lock();
        let mut sh = SignalHandlersInternal::default();

        for (i, act) in &me.actions {
            if act.handler == SigAct::SIGNAL_ACT_IGNORE {
                sh.actions.insert(
                    *i,
                    SigAct {
                        handler: SigAct::SIGNAL_ACT_IGNORE,
                        ..Default::default()
                    },
                );
            }
        }

        return SignalHandlers(Arc::new(Mutex::new(sh)));
    }

    pub fn IsIgnored(&self, sig: Signal) -> bool {
        match self.lock().actions.get(&sig.0) {
            None => return false,
            Some(act) => return act.handler == SigAct::SIGNAL_ACT_IGNORE,
        }
    }

    pub fn GetAct(&self, sig: Signal) -> SigAct {
        return self.lock().GetAct(sig);
    }

    pub fn SetAct(&self, sig: Signal, act: &SigAct) {
        self.lock().actions.insert(sig.0, *act);
    }

    // DequeAct returns the action for a signal being delivered, applying
    // the one-shot SA_RESETHAND reset.
    pub fn DequeAct(&self, sig: Signal) -> SigAct {
        let mut me = self.lock();

        let act = match me.actions.get(&sig.0) {
            None => SigAct::default(),
            Some(act) => *act,
        };

        if act.flags.IsResetHandler() {
            me.actions.remove(&sig.0);
        }

        return act;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ComputeActionUnblockable() {
        // SIGKILL/SIGSTOP keep their dispositions whatever is installed
        let handler = SigAct {
            handler: 0x1000,
            ..Default::default()
        };
        assert_eq!(ComputeAction(Signal::SIGKILL, &handler), SignalAction::TERM);
        assert_eq!(ComputeAction(Signal::SIGSTOP, &handler), SignalAction::STOP);
    }

    #[test]
    fn test_ComputeActionDefaults() {
        let dfl = SigAct::default();
        assert_eq!(ComputeAction(Signal::SIGCHLD, &dfl), SignalAction::IGNORE);
        assert_eq!(ComputeAction(Signal::SIGSEGV, &dfl), SignalAction::CORE);
        assert_eq!(ComputeAction(Signal::SIGTERM, &dfl), SignalAction::TERM);
        assert_eq!(ComputeAction(Signal::SIGTSTP, &dfl), SignalAction::STOP);
        assert_eq!(
            ComputeAction(Signal(Signal::FIRST_RT_SIGNAL), &dfl),
            SignalAction::TERM
        );
    }

    #[test]
    fn test_DequeActOneShot() {
        let sh = SignalHandlers::default();
        let act = SigAct {
            handler: 0x2000,
            flags: SigFlag(SigFlag::SIGNAL_FLAG_RESET_HANDLER),
            ..Default::default()
        };
        sh.SetAct(Signal::SIGUSR1, &act);

        let got = sh.DequeAct(Signal::SIGUSR1);
        assert_eq!(got.handler, 0x2000);

        // handler reverted to default after one delivery
        let got = sh.DequeAct(Signal::SIGUSR1);
        assert_eq!(got.handler, SigAct::SIGNAL_ACT_DEFAULT);
    }

    #[test]
    fn test_CopyForExecKeepsIgnores() {
        let sh = SignalHandlers::default();
        sh.SetAct(
            Signal::SIGUSR1,
            &SigAct {
                handler: SigAct::SIGNAL_ACT_IGNORE,
                ..Default::default()
            },
        );
        sh.SetAct(
            Signal::SIGUSR2,
            &SigAct {
                handler: 0x3000,
                ..Default::default()
            },
        );

        let copy = sh.CopyForExec();
        assert!(copy.IsIgnored(Signal::SIGUSR1));
        assert_eq!(
            copy.GetAct(Signal::SIGUSR2).handler,
            SigAct::SIGNAL_ACT_DEFAULT
        );
    }
}
