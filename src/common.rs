// Copyright (c) 2021 Quark Container Authors
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

use alloc::string::String;

use super::linux_def::*;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    None,
    Timeout,
    Interrupted,
    Common(String),
    SysError(i32),
    // the calling thread has a fatal signal or group exit pending and
    // must run its exit path instead of returning to userspace
    ThreadExit,
}

impl Default for Error {
    fn default() -> Self {
        return Error::None;
    }
}

impl Error {
    pub fn SystemErr(&self) -> i32 {
        match self {
            Error::SysError(e) => return *e,
            Error::Timeout => return SysErr::ETIMEDOUT,
            Error::Interrupted => return SysErr::EINTR,
            _ => panic!("Error::SystemErr unsupported error {:?}", self),
        }
    }
}

// TaskRunState describes what the calling thread has to do after the
// signal dequeue loop returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    RunApp,
    RunInterrupt,
    RunExit,
    RunSyscallRet,
}
