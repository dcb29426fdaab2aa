use once_cell::sync::Lazy;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axis_events::Hub;
use axis_kernel::{Kernel, StateStore};
use axis_protocol::{ItemDetail, Mode, RegistryItem, Status};
use tempfile::TempDir;

use crate::automation::{LaunchError, Launcher};
use crate::persistence::PersistenceGateway;
use crate::provider::{Provider, ProviderError};
use crate::AppState;

static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub(crate) mod env {
    use super::*;

    /// Serializes environment mutation across tests and restores the
    /// previous values on drop.
    pub(crate) struct EnvGuard {
        _lock: MutexGuard<'static, ()>,
        saved: HashMap<String, Option<String>>,
    }

    pub(crate) fn guard() -> EnvGuard {
        EnvGuard {
            _lock: ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner()),
            saved: HashMap::new(),
        }
    }

    impl EnvGuard {
        fn remember(&mut self, key: &str) {
            self.saved
                .entry(key.to_string())
                .or_insert_with(|| std::env::var(key).ok());
        }

        pub(crate) fn set(&mut self, key: &str, value: impl AsRef<str>) {
            self.remember(key);
            std::env::set_var(key, value.as_ref());
        }

        pub(crate) fn remove(&mut self, key: &str) {
            self.remember(key);
            std::env::remove_var(key);
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain() {
                match value {
                    Some(val) => std::env::set_var(&key, val),
                    None => std::env::remove_var(&key),
                }
            }
        }
    }
}

/// In-memory provider with call counting and one-shot failure injection.
#[derive(Default)]
pub(crate) struct FakeProvider {
    items: Mutex<Vec<RegistryItem>>,
    contents: Mutex<HashMap<String, String>>,
    deleted: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
    fail_next: AtomicBool,
}

impl FakeProvider {
    pub fn with_items(items: Vec<RegistryItem>) -> Self {
        Self {
            items: Mutex::new(items),
            ..Self::default()
        }
    }

    pub fn set_items(&self, items: Vec<RegistryItem>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn set_content(&self, id: &str, content: &str) {
        self.contents
            .lock()
            .unwrap()
            .insert(id.to_string(), content.to_string());
    }

    /// The next provider call fails with `Unavailable`.
    pub fn fail_next(&self, fail: bool) {
        self.fail_next.store(fail, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn check_failure(&self) -> Result<(), ProviderError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ProviderError::Unavailable("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for FakeProvider {
    async fn list_all(&self) -> Result<Vec<RegistryItem>, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self.items.lock().unwrap().clone())
    }

    async fn get_detail(&self, id: &str) -> Result<ItemDetail, ProviderError> {
        self.check_failure()?;
        let item = self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|item| item.id == id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        let content = self
            .contents
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default();
        Ok(ItemDetail {
            id: item.id,
            kind: item.kind,
            title: item.title,
            content,
        })
    }

    async fn delete(&self, id: &str) -> Result<(), ProviderError> {
        self.check_failure()?;
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|item| item.id != id);
        if items.len() == before {
            return Err(ProviderError::NotFound(id.to_string()));
        }
        self.deleted.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

/// Records launched tasks instead of spawning anything.
#[derive(Default)]
pub(crate) struct FakeLauncher {
    launched: Mutex<Vec<String>>,
    fail: bool,
}

impl FakeLauncher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn launched(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, task: &str) -> Result<(), LaunchError> {
        if self.fail {
            return Err(LaunchError::Spawn {
                program: "fake".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such program"),
            });
        }
        self.launched.lock().unwrap().push(task.to_string());
        Ok(())
    }
}

/// Durable store whose every operation fails.
pub(crate) struct FailingStore;

impl StateStore for FailingStore {
    fn get_mode(&self) -> Result<Option<Mode>> {
        Err(anyhow!("store offline"))
    }

    fn set_mode(&self, _mode: Mode) -> Result<()> {
        Err(anyhow!("store offline"))
    }

    fn get_statuses(&self) -> Result<HashMap<String, Status>> {
        Err(anyhow!("store offline"))
    }

    fn set_status(&self, _id: &str, _status: Status) -> Result<()> {
        Err(anyhow!("store offline"))
    }

    fn delete_status(&self, _id: &str) -> Result<bool> {
        Err(anyhow!("store offline"))
    }
}

/// Fully wired state over a temp directory and fakes.
pub(crate) struct TestApp {
    _dir: TempDir,
    pub kernel: Kernel,
    pub provider: Arc<FakeProvider>,
    pub launcher: Arc<FakeLauncher>,
    pub state: AppState,
}

impl TestApp {
    pub async fn new(items: Vec<RegistryItem>) -> Self {
        Self::with_launcher(items, FakeLauncher::default()).await
    }

    pub async fn with_launcher(items: Vec<RegistryItem>, launcher: FakeLauncher) -> Self {
        let dir = tempfile::tempdir().expect("temp state dir");
        let kernel = Kernel::open(dir.path()).expect("open kernel");
        let persistence = Arc::new(PersistenceGateway::new(
            Arc::new(kernel.clone()),
            dir.path(),
        ));
        let provider = Arc::new(FakeProvider::with_items(items));
        let launcher = Arc::new(launcher);
        let state = AppState::builder(
            Hub::new(),
            persistence,
            provider.clone(),
            launcher.clone(),
        )
        .build()
        .await;
        Self {
            _dir: dir,
            kernel,
            provider,
            launcher,
            state,
        }
    }
}
