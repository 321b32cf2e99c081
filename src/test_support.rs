//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::stack::{
    ControlPlane, ControlPlaneFuture, SleepFuture, Sleeper, Stack, StackError, StackRequest,
    StackStatus, UpdateOutcome,
};

/// A call recorded by [`ScriptedControlPlane`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ControlPlaneCall {
    /// `create_stack` for the named stack.
    Create(String),
    /// `update_stack` for the named stack.
    Update(String),
    /// `delete_stack` with the retained logical IDs.
    Delete {
        /// Stack being deleted.
        stack_name: String,
        /// Logical IDs to retain.
        retain: Vec<String>,
    },
    /// `describe_stack` for the named stack.
    Describe(String),
    /// `get_template` for the named stack.
    GetTemplate(String),
}

#[derive(Debug, Default)]
struct Script {
    describes: VecDeque<Result<Option<Stack>, StackError>>,
    creates: VecDeque<Result<String, StackError>>,
    updates: VecDeque<Result<UpdateOutcome, StackError>>,
    deletes: VecDeque<Result<(), StackError>>,
    templates: VecDeque<Result<Option<String>, StackError>>,
    calls: Vec<ControlPlaneCall>,
}

/// Control plane that replays pre-seeded responses in FIFO order.
///
/// `describe_stack` fails once its script runs dry; the mutating calls fall
/// back to success and `get_template` to "no such stack".
#[derive(Clone, Debug, Default)]
pub struct ScriptedControlPlane {
    script: Arc<Mutex<Script>>,
}

impl ScriptedControlPlane {
    /// Creates a control plane with nothing scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_script<T>(&self, f: impl FnOnce(&mut Script) -> T) -> T {
        let mut guard = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Queues a describe response reporting `status`.
    pub fn push_status(&self, stack_name: &str, status: StackStatus) -> &Self {
        self.push_stack(Stack::new(stack_name, status))
    }

    /// Queues a describe response returning `stack`.
    pub fn push_stack(&self, stack: Stack) -> &Self {
        self.with_script(|script| script.describes.push_back(Ok(Some(stack))));
        self
    }

    /// Queues a describe response reporting that the stack does not exist.
    pub fn push_absent(&self) -> &Self {
        self.with_script(|script| script.describes.push_back(Ok(None)));
        self
    }

    /// Queues a failing describe response.
    pub fn push_describe_error(&self, err: StackError) -> &Self {
        self.with_script(|script| script.describes.push_back(Err(err)));
        self
    }

    /// Queues a create response.
    pub fn push_create(&self, result: Result<String, StackError>) -> &Self {
        self.with_script(|script| script.creates.push_back(result));
        self
    }

    /// Queues an update response.
    pub fn push_update(&self, result: Result<UpdateOutcome, StackError>) -> &Self {
        self.with_script(|script| script.updates.push_back(result));
        self
    }

    /// Queues a delete response.
    pub fn push_delete(&self, result: Result<(), StackError>) -> &Self {
        self.with_script(|script| script.deletes.push_back(result));
        self
    }

    /// Queues a `get_template` response.
    pub fn push_template(&self, body: Option<&str>) -> &Self {
        self.with_script(|script| script.templates.push_back(Ok(body.map(str::to_owned))));
        self
    }

    /// Returns every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ControlPlaneCall> {
        self.with_script(|script| script.calls.clone())
    }

    /// Number of `describe_stack` calls recorded so far.
    #[must_use]
    pub fn describe_count(&self) -> usize {
        self.with_script(|script| {
            script
                .calls
                .iter()
                .filter(|call| matches!(call, ControlPlaneCall::Describe(_)))
                .count()
        })
    }
}

impl ControlPlane for ScriptedControlPlane {
    fn create_stack<'a>(&'a self, request: &'a StackRequest) -> ControlPlaneFuture<'a, String> {
        Box::pin(async move {
            self.with_script(|script| {
                script
                    .calls
                    .push(ControlPlaneCall::Create(request.stack_name.clone()));
                script
                    .creates
                    .pop_front()
                    .unwrap_or_else(|| Ok(format!("scripted/{}", request.stack_name)))
            })
        })
    }

    fn update_stack<'a>(
        &'a self,
        request: &'a StackRequest,
    ) -> ControlPlaneFuture<'a, UpdateOutcome> {
        Box::pin(async move {
            self.with_script(|script| {
                script
                    .calls
                    .push(ControlPlaneCall::Update(request.stack_name.clone()));
                script
                    .updates
                    .pop_front()
                    .unwrap_or(Ok(UpdateOutcome::Started))
            })
        })
    }

    fn delete_stack<'a>(
        &'a self,
        stack_name: &'a str,
        retain: &'a [String],
    ) -> ControlPlaneFuture<'a, ()> {
        Box::pin(async move {
            self.with_script(|script| {
                script.calls.push(ControlPlaneCall::Delete {
                    stack_name: stack_name.to_owned(),
                    retain: retain.to_vec(),
                });
                script.deletes.pop_front().unwrap_or(Ok(()))
            })
        })
    }

    fn describe_stack<'a>(&'a self, stack_name: &'a str) -> ControlPlaneFuture<'a, Option<Stack>> {
        Box::pin(async move {
            self.with_script(|script| {
                script
                    .calls
                    .push(ControlPlaneCall::Describe(stack_name.to_owned()));
                script.describes.pop_front().unwrap_or_else(|| {
                    Err(StackError::InvalidResponse(String::from(
                        "no scripted describe response available",
                    )))
                })
            })
        })
    }

    fn get_template<'a>(&'a self, stack_name: &'a str) -> ControlPlaneFuture<'a, Option<String>> {
        Box::pin(async move {
            self.with_script(|script| {
                script
                    .calls
                    .push(ControlPlaneCall::GetTemplate(stack_name.to_owned()));
                script.templates.pop_front().unwrap_or(Ok(None))
            })
        })
    }
}

/// Sleeper that records requested delays and returns immediately.
///
/// It can also cancel a token after a number of sleeps, or stall forever so
/// that only cancellation can end the wait.
#[derive(Clone, Debug, Default)]
pub struct FakeSleeper {
    slept: Arc<Mutex<Vec<Duration>>>,
    cancel_after: Option<(usize, CancellationToken)>,
    stall: bool,
}

impl FakeSleeper {
    /// Creates a sleeper that never blocks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels `token` during the `count`-th sleep.
    #[must_use]
    pub fn cancelling_after(count: usize, token: CancellationToken) -> Self {
        Self {
            cancel_after: Some((count, token)),
            ..Self::default()
        }
    }

    /// Creates a sleeper whose sleeps never complete.
    #[must_use]
    pub fn stalled() -> Self {
        Self {
            stall: true,
            ..Self::default()
        }
    }

    /// Delays requested so far.
    #[must_use]
    pub fn slept(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Sleeper for FakeSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        let count = {
            let mut slept = self.slept.lock().unwrap_or_else(PoisonError::into_inner);
            slept.push(duration);
            slept.len()
        };
        if let Some((limit, token)) = &self.cancel_after {
            if count >= *limit {
                token.cancel();
            }
        }
        if self.stall {
            Box::pin(std::future::pending())
        } else {
            Box::pin(std::future::ready(()))
        }
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        Self::apply(pairs, &[]).await
    }

    /// Sets `pairs` and removes `unset` while holding a global mutex.
    pub async fn apply(pairs: &[(&str, &str)], unset: &[&str]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs
                    .iter()
                    .map(|(key, _)| key)
                    .chain(unset)
                    .all(|key| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len() + unset.len());
        for (key, value) in pairs {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`.
            unsafe { env::set_var(key, value) };
        }
        for key in unset {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`.
            unsafe { env::remove_var(key) };
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in self.previous.iter().rev() {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
