//! In-memory container engine for scenario tests

use async_trait::async_trait;
use dotrun::error::{DotrunError, DotrunResult};
use dotrun::orchestration::{
    ContainerEngine, ContainerInfo, ContainerSpec, ContainerState, ExecProcess, ExecRequest,
    ExecSignal,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub state: ContainerState,
    pub image: String,
    pub spec: Option<ContainerSpec>,
}

#[derive(Debug, Default)]
struct State {
    available: bool,
    containers: HashMap<String, FakeContainer>,
    volumes: HashSet<String>,
    images: HashSet<String>,
    exit_codes: Vec<(String, i32)>,
    exec_delay: Duration,
    exec_failures: usize,
    fail_create: bool,
    creates: usize,
    removes: usize,
    pulls: usize,
    pings: usize,
    execs: Vec<ExecRequest>,
    signals: Vec<(Uuid, ExecSignal)>,
}

/// Records every call and keeps container state in memory
pub struct FakeEngine {
    state: Mutex<State>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                available: true,
                ..State::default()
            }),
        }
    }

    pub fn unavailable() -> Self {
        let engine = Self::new();
        engine.state.lock().unwrap().available = false;
        engine
    }

    /// Commands whose joined argv starts with `prefix` exit with `code`
    pub fn exit_code(&self, prefix: &str, code: i32) {
        self.state
            .lock()
            .unwrap()
            .exit_codes
            .push((prefix.to_string(), code));
    }

    /// Every exec waits this long before exiting
    pub fn exec_delay(&self, delay: Duration) {
        self.state.lock().unwrap().exec_delay = delay;
    }

    /// The next `n` execs cannot be dispatched
    pub fn fail_execs(&self, n: usize) {
        self.state.lock().unwrap().exec_failures = n;
    }

    pub fn fail_create(&self, fail: bool) {
        self.state.lock().unwrap().fail_create = fail;
    }

    pub fn add_image(&self, image: &str) {
        self.state.lock().unwrap().images.insert(image.to_string());
    }

    pub fn seed_container(&self, name: &str, state: ContainerState, image: &str) {
        self.state.lock().unwrap().containers.insert(
            name.to_string(),
            FakeContainer {
                id: "seeded".to_string(),
                state,
                image: image.to_string(),
                spec: None,
            },
        );
    }

    pub fn set_state(&self, name: &str, state: ContainerState) {
        if let Some(c) = self.state.lock().unwrap().containers.get_mut(name) {
            c.state = state;
        }
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.state.lock().unwrap().containers.get(name).cloned()
    }

    pub fn has_volume(&self, name: &str) -> bool {
        self.state.lock().unwrap().volumes.contains(name)
    }

    pub fn volume_count(&self) -> usize {
        self.state.lock().unwrap().volumes.len()
    }

    pub fn creates(&self) -> usize {
        self.state.lock().unwrap().creates
    }

    pub fn removes(&self) -> usize {
        self.state.lock().unwrap().removes
    }

    pub fn pulls(&self) -> usize {
        self.state.lock().unwrap().pulls
    }

    pub fn pings(&self) -> usize {
        self.state.lock().unwrap().pings
    }

    /// Signals delivered, keyed by the id of the exec they were sent to
    pub fn signals(&self) -> Vec<(Uuid, ExecSignal)> {
        self.state.lock().unwrap().signals.clone()
    }

    /// Argv of every dispatched exec, in order
    pub fn exec_argvs(&self) -> Vec<Vec<String>> {
        self.state
            .lock()
            .unwrap()
            .execs
            .iter()
            .map(|r| r.argv.clone())
            .collect()
    }

    pub fn execs(&self) -> Vec<ExecRequest> {
        self.state.lock().unwrap().execs.clone()
    }

    /// Number of dispatched execs whose argv joins to `command`
    pub fn count_execs(&self, command: &str) -> usize {
        self.exec_argvs()
            .iter()
            .filter(|argv| argv.join(" ") == command)
            .count()
    }

    fn check_available(&self) -> DotrunResult<()> {
        if self.state.lock().unwrap().available {
            Ok(())
        } else {
            Err(DotrunError::RuntimeUnavailable {
                engine: "fake".to_string(),
                reason: "daemon not running".to_string(),
            })
        }
    }
}

struct FakeProcess {
    code: i32,
    delay: Duration,
}

#[async_trait]
impl ExecProcess for FakeProcess {
    async fn wait(&mut self) -> DotrunResult<i32> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.code)
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    fn engine_name(&self) -> &str {
        "fake"
    }

    async fn ping(&self) -> DotrunResult<()> {
        self.state.lock().unwrap().pings += 1;
        self.check_available()
    }

    async fn inspect(&self, name: &str) -> DotrunResult<Option<ContainerInfo>> {
        self.check_available()?;
        Ok(self.container(name).map(|c| ContainerInfo {
            id: c.id,
            state: c.state,
            image: c.image,
        }))
    }

    async fn image_exists(&self, image: &str) -> DotrunResult<bool> {
        Ok(self.state.lock().unwrap().images.contains(image))
    }

    async fn pull(
        &self,
        image: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> DotrunResult<()> {
        on_output(format!("Pulling {}", image));
        let mut state = self.state.lock().unwrap();
        state.pulls += 1;
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> DotrunResult<String> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create {
            return Err(DotrunError::command_exec("fake create", "no space left on device"));
        }
        if state.containers.contains_key(&spec.name) {
            return Err(DotrunError::command_exec("fake create", "name already in use"));
        }
        state.creates += 1;
        let id = format!("fake-{}", state.creates);
        state.containers.insert(
            spec.name.clone(),
            FakeContainer {
                id: id.clone(),
                state: ContainerState::Created,
                image: spec.image.clone(),
                spec: Some(spec.clone()),
            },
        );
        Ok(id)
    }

    async fn start(&self, name: &str) -> DotrunResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(name) {
            Some(c) if c.state == ContainerState::Broken => Err(DotrunError::container(
                name,
                "container is in a broken state",
            )),
            Some(c) => {
                c.state = ContainerState::Running;
                Ok(())
            }
            None => Err(DotrunError::container(name, "no such container")),
        }
    }

    async fn stop(&self, name: &str) -> DotrunResult<()> {
        self.set_state(name, ContainerState::Created);
        Ok(())
    }

    async fn remove(&self, name: &str) -> DotrunResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.containers.remove(name).is_some() {
            state.removes += 1;
        }
        Ok(())
    }

    async fn volume_create(
        &self,
        name: &str,
        _labels: &HashMap<String, String>,
    ) -> DotrunResult<()> {
        self.state.lock().unwrap().volumes.insert(name.to_string());
        Ok(())
    }

    async fn volume_remove(&self, name: &str) -> DotrunResult<()> {
        self.state.lock().unwrap().volumes.remove(name);
        Ok(())
    }

    async fn exec(
        &self,
        container: &str,
        request: &ExecRequest,
    ) -> DotrunResult<Box<dyn ExecProcess>> {
        let mut state = self.state.lock().unwrap();
        if state.exec_failures > 0 {
            state.exec_failures -= 1;
            return Err(DotrunError::execution(container, "container restarting"));
        }

        state.execs.push(request.clone());
        let command = request.argv.join(" ");
        let code = state
            .exit_codes
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, code)| *code)
            .unwrap_or(0);

        Ok(Box::new(FakeProcess {
            code,
            delay: state.exec_delay,
        }))
    }

    async fn signal(
        &self,
        _container: &str,
        request: &ExecRequest,
        signal: ExecSignal,
    ) -> DotrunResult<()> {
        self.state
            .lock()
            .unwrap()
            .signals
            .push((request.id, signal));
        Ok(())
    }
}
