//! Project operations against the in-memory engine

use crate::fake_engine::FakeEngine;
use dotrun::config::Config;
use dotrun::environment::{EnvironmentResolver, ResolvedEnvironment};
use dotrun::error::DotrunError;
use dotrun::executor::{CommandExecutor, ExecMode};
use dotrun::install::InstallResult;
use dotrun::orchestration::{ContainerEngine, ContainerRuntime, ContainerState, ExecSignal};
use dotrun::project::{Operation, Project, ProjectContext};
use dotrun::ui::UiContext;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

const PACKAGE_JSON: &str = r#"{
  "name": "site",
  "scripts": {
    "start": "yarn run serve",
    "test": "jest",
    "clean": "rm -rf node_modules"
  }
}"#;

struct Fixture {
    project_dir: TempDir,
    state_dir: TempDir,
    engine: Arc<FakeEngine>,
    config: Config,
}

impl Fixture {
    fn new() -> Self {
        let project_dir = TempDir::new().unwrap();
        let state_dir = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::new());

        let mut config = Config::default();
        config.general.state_dir = Some(state_dir.path().to_path_buf());
        engine.add_image(&config.container.image);

        Self {
            project_dir,
            state_dir,
            engine,
            config,
        }
    }

    fn node() -> Self {
        let fixture = Self::new();
        fixture.write("package.json", PACKAGE_JSON);
        fixture
    }

    fn write(&self, name: &str, contents: &str) {
        fs::write(self.project_dir.path().join(name), contents).unwrap();
    }

    fn project(&self) -> Project {
        self.project_with(vec![], vec![])
    }

    fn project_with(
        &self,
        inherited: Vec<(String, String)>,
        overrides: Vec<(String, String)>,
    ) -> Project {
        let ctx = ProjectContext::new(self.project_dir.path(), overrides).unwrap();
        let engine: Arc<dyn ContainerEngine> = self.engine.clone();
        Project::new(
            ctx,
            &self.config,
            engine,
            EnvironmentResolver::with_inherited(inherited, &self.config.environment),
            UiContext::non_interactive(),
        )
    }

    fn container_name(&self) -> String {
        ProjectContext::new(self.project_dir.path(), vec![])
            .unwrap()
            .container_name()
    }

    fn fingerprint_files(&self) -> usize {
        let projects = self.state_dir.path().join("projects");
        if !projects.exists() {
            return 0;
        }
        fs::read_dir(projects)
            .unwrap()
            .map(|entry| entry.unwrap().path().join("fingerprint.json"))
            .filter(|path| path.exists())
            .count()
    }
}

fn pair(k: &str, v: &str) -> (String, String) {
    (k.to_string(), v.to_string())
}

#[tokio::test]
async fn ensure_is_idempotent() {
    let fx = Fixture::new();
    let project = fx.project();

    let first = project.runtime().ensure(project.context()).await.unwrap();
    let second = project.runtime().ensure(project.context()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(fx.engine.creates(), 1);
    assert_eq!(fx.engine.volume_count(), 2);
    assert_eq!(
        fx.engine.container(&fx.container_name()).unwrap().state,
        ContainerState::Running
    );
}

#[tokio::test]
async fn container_mounts_project_and_caches() {
    let fx = Fixture::new();
    let project = fx.project();
    project.runtime().ensure(project.context()).await.unwrap();

    let name = fx.container_name();
    let spec = fx.engine.container(&name).unwrap().spec.unwrap();
    assert_eq!(spec.project_dir, project.context().path());
    assert_eq!(spec.image, fx.config.container.image);
    assert!(spec.volumes.contains(&format!("{}-yarn:/cache/yarn", name)));
    assert!(spec.volumes.contains(&format!("{}-pip:/cache/pip", name)));
    assert!(spec
        .env
        .contains(&pair("YARN_CACHE_FOLDER", "/cache/yarn")));
    assert!(fx.engine.has_volume(&format!("{}-pip", name)));
}

#[tokio::test]
async fn missing_image_is_pulled() {
    let mut fx = Fixture::new();
    fx.config.container.image = "example/toolchain:2".to_string();
    let project = fx.project();

    project.runtime().ensure(project.context()).await.unwrap();
    assert_eq!(fx.engine.pulls(), 1);

    project.runtime().ensure(project.context()).await.unwrap();
    assert_eq!(fx.engine.pulls(), 1);
}

#[tokio::test]
async fn stopped_container_is_started_not_recreated() {
    let fx = Fixture::new();
    let project = fx.project();
    project.runtime().ensure(project.context()).await.unwrap();

    fx.engine.set_state(&fx.container_name(), ContainerState::Created);
    project.runtime().ensure(project.context()).await.unwrap();

    assert_eq!(fx.engine.creates(), 1);
    assert_eq!(
        fx.engine.container(&fx.container_name()).unwrap().state,
        ContainerState::Running
    );
}

#[tokio::test]
async fn broken_container_is_recreated_once() {
    let fx = Fixture::new();
    fx.engine.seed_container(
        &fx.container_name(),
        ContainerState::Broken,
        &fx.config.container.image,
    );
    let project = fx.project();

    let handle = project.runtime().ensure(project.context()).await.unwrap();

    assert_eq!(fx.engine.removes(), 1);
    assert_eq!(fx.engine.creates(), 1);
    assert_ne!(handle.id, "seeded");
}

#[tokio::test]
async fn failed_recreation_is_container_error() {
    let fx = Fixture::new();
    fx.engine.seed_container(
        &fx.container_name(),
        ContainerState::Broken,
        &fx.config.container.image,
    );
    fx.engine.fail_create(true);
    let project = fx.project();

    let err = project
        .runtime()
        .ensure(project.context())
        .await
        .unwrap_err();

    assert!(matches!(err, DotrunError::Container { .. }), "{err:?}");
    assert_eq!(err.exit_code(), 71);
    assert_eq!(fx.engine.removes(), 1);
}

#[tokio::test]
async fn stale_image_is_recreated() {
    let fx = Fixture::new();
    fx.engine.seed_container(
        &fx.container_name(),
        ContainerState::Running,
        "canonicalwebteam/dotrun-image:old",
    );
    let project = fx.project();

    project.runtime().ensure(project.context()).await.unwrap();

    let container = fx.engine.container(&fx.container_name()).unwrap();
    assert_eq!(container.image, fx.config.container.image);
    assert_eq!(fx.engine.creates(), 1);
}

#[tokio::test]
async fn unavailable_engine_is_not_retried() {
    let fx = Fixture::node();
    let engine: Arc<dyn ContainerEngine> = Arc::new(FakeEngine::unavailable());
    let ctx = ProjectContext::new(fx.project_dir.path(), vec![]).unwrap();
    let project = Project::new(
        ctx,
        &fx.config,
        engine,
        EnvironmentResolver::with_inherited(vec![], &fx.config.environment),
        UiContext::non_interactive(),
    );

    let err = project
        .run_command("start", vec![], false)
        .await
        .unwrap_err();
    assert!(matches!(err, DotrunError::RuntimeUnavailable { .. }));
    assert_eq!(err.exit_code(), 69);
}

#[tokio::test]
async fn install_gating_follows_manifests() {
    let fx = Fixture::node();
    let project = fx.project();
    let env = Default::default();

    assert!(project.gate().needed(project.context()).await.unwrap());

    let result = project
        .gate()
        .install(project.context(), &env, false)
        .await
        .unwrap();
    assert!(matches!(result, InstallResult::Installed { ref steps } if steps.len() == 1));
    assert!(!project.gate().needed(project.context()).await.unwrap());

    let result = project
        .gate()
        .install(project.context(), &env, false)
        .await
        .unwrap();
    assert_eq!(result, InstallResult::UpToDate);
    assert_eq!(fx.engine.count_execs("yarn install"), 1);

    fx.write("yarn.lock", "left-pad@^1.0.0:\n  version \"1.3.0\"\n");
    assert!(project.gate().needed(project.context()).await.unwrap());
}

#[tokio::test]
async fn force_installs_regardless_of_fingerprint() {
    let fx = Fixture::node();
    let project = fx.project();

    assert_eq!(project.install(false).await.unwrap(), 0);
    assert_eq!(project.install(true).await.unwrap(), 0);
    assert_eq!(fx.engine.count_execs("yarn install"), 2);
}

#[tokio::test]
async fn python_requirements_installed_after_node() {
    let fx = Fixture::node();
    fx.write("requirements.txt", "flask==3.0\n");
    fx.write("pyproject.toml", "[project]\nname = \"site\"\n");
    let project = fx.project();

    project.install(false).await.unwrap();

    assert_eq!(
        fx.engine.exec_argvs(),
        vec![
            vec!["yarn".to_string(), "install".to_string()],
            vec![
                "pip3".to_string(),
                "install".to_string(),
                "--requirement".to_string(),
                "requirements.txt".to_string()
            ],
        ]
    );
}

#[tokio::test]
async fn failed_install_keeps_fingerprint_stale() {
    let fx = Fixture::node();
    fx.engine.exit_code("yarn install", 1);
    let project = fx.project();

    let err = project.install(false).await.unwrap_err();
    match err {
        DotrunError::Install { ref command, code } => {
            assert_eq!(command, "yarn install");
            assert_eq!(code, 1);
        }
        ref other => panic!("expected Install error, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 75);
    assert!(project.gate().needed(project.context()).await.unwrap());
    assert_eq!(fx.fingerprint_files(), 0);
}

#[tokio::test]
async fn no_manifest_install_is_noop() {
    let fx = Fixture::new();
    let project = fx.project();

    let result = project
        .gate()
        .install(project.context(), &Default::default(), false)
        .await
        .unwrap();

    assert_eq!(result, InstallResult::Installed { steps: vec![] });
    assert!(!project.gate().needed(project.context()).await.unwrap());
    assert_eq!(fx.engine.creates(), 0);
    assert!(fx.engine.exec_argvs().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_installs_run_once() {
    let fx = Fixture::node();
    fx.engine.exec_delay(Duration::from_millis(200));

    let a = Arc::new(fx.project());
    let b = Arc::new(fx.project());

    let first = {
        let a = Arc::clone(&a);
        tokio::spawn(async move {
            a.gate()
                .install(a.context(), &Default::default(), false)
                .await
        })
    };
    let second = {
        let b = Arc::clone(&b);
        tokio::spawn(async move {
            b.gate()
                .install(b.context(), &Default::default(), false)
                .await
        })
    };

    let mut results = vec![
        first.await.unwrap().unwrap(),
        second.await.unwrap().unwrap(),
    ];
    results.sort_by_key(|r| matches!(r, InstallResult::UpToDate));

    assert!(matches!(results[0], InstallResult::Installed { .. }));
    assert_eq!(results[1], InstallResult::UpToDate);
    assert_eq!(fx.engine.count_execs("yarn install"), 1);
    assert!(!b.gate().needed(b.context()).await.unwrap());
}

#[tokio::test]
async fn exit_status_propagates() {
    let fx = Fixture::node();
    fx.engine.exit_code("yarn --no-default-rc run test", 37);
    let project = fx.project();

    let code = project
        .dispatch(Operation::from_command(
            "test",
            vec!["--ci".to_string()],
            false,
        ))
        .await
        .unwrap();

    assert_eq!(code, 37);
    assert_eq!(fx.engine.count_execs("yarn --no-default-rc run test --ci"), 1);
}

#[tokio::test]
async fn run_installs_first_unless_skipped() {
    let fx = Fixture::node();
    let project = fx.project();

    project.run_command("start", vec![], true).await.unwrap();
    assert_eq!(fx.engine.count_execs("yarn install"), 0);

    project.run_command("start", vec![], false).await.unwrap();
    assert_eq!(
        fx.engine.exec_argvs().last().unwrap().join(" "),
        "yarn --no-default-rc run start"
    );
    assert_eq!(fx.engine.count_execs("yarn install"), 1);
}

#[tokio::test]
async fn exec_skips_install_and_defaults_to_shell() {
    let fx = Fixture::node();
    let project = fx.project();

    let code = project
        .dispatch(Operation::Exec { argv: vec![] })
        .await
        .unwrap();

    assert_eq!(code, 0);
    assert_eq!(fx.engine.exec_argvs(), vec![vec!["bash".to_string()]]);
}

#[tokio::test]
async fn environment_layers_reach_the_container() {
    let fx = Fixture::node();
    fx.write(".env", "A=2\nB=2\n");
    fx.write(".env.local", "B=3\n");
    let project = fx.project_with(
        vec![pair("A", "1"), pair("HOME", "/home/me")],
        vec![pair("A", "4")],
    );

    project.run_command("start", vec![], true).await.unwrap();

    let request = fx.engine.execs().pop().unwrap();
    assert_eq!(request.env.get("A"), Some("4"));
    assert_eq!(request.env.get("B"), Some("3"));
    assert_eq!(request.env.get("HOME"), None);
    assert_eq!(request.workdir, project.context().path());
}

#[tokio::test]
async fn malformed_env_file_is_config_error() {
    let fx = Fixture::node();
    fx.write(".env.local", "OK=1\nthis is not an assignment\n");
    let project = fx.project();

    let err = project.run_command("start", vec![], true).await.unwrap_err();
    match err {
        DotrunError::Config { ref path, line, .. } => {
            assert!(path.ends_with(".env.local"));
            assert_eq!(line, 2);
        }
        ref other => panic!("expected Config error, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 78);
    assert!(fx.engine.exec_argvs().is_empty());
}

#[tokio::test]
async fn engine_is_pinged_once_per_invocation() {
    let fx = Fixture::node();
    let project = fx.project();

    project.run_command("start", vec![], false).await.unwrap();

    assert_eq!(fx.engine.count_execs("yarn install"), 1);
    assert_eq!(fx.engine.pings(), 1);
}

#[tokio::test]
async fn interrupt_is_forwarded_to_running_command() {
    let fx = Fixture::node();
    fx.engine.exec_delay(Duration::from_millis(300));
    let engine: Arc<dyn ContainerEngine> = fx.engine.clone();
    let runtime = Arc::new(ContainerRuntime::new(
        engine,
        fx.config.container.clone(),
        UiContext::non_interactive(),
    ));
    let (tx, rx) = mpsc::unbounded_channel();
    let executor = CommandExecutor::with_signal_channel(Arc::clone(&runtime), rx);
    let ctx = ProjectContext::new(fx.project_dir.path(), vec![]).unwrap();
    let handle = runtime.ensure(&ctx).await.unwrap();

    // Queued before the command starts, so it arrives while it is running
    tx.send(ExecSignal::Interrupt).unwrap();
    let code = executor
        .run(
            &ctx,
            &handle,
            vec!["yarn".to_string(), "start".to_string()],
            &ResolvedEnvironment::default(),
            ExecMode::Batch,
        )
        .await
        .unwrap();

    assert_eq!(code, 0);
    let execs = fx.engine.execs();
    assert_eq!(execs.len(), 1);
    assert_eq!(
        fx.engine.signals(),
        vec![(execs[0].id, ExecSignal::Interrupt)]
    );
}

#[tokio::test]
async fn execution_error_retries_once() {
    let fx = Fixture::node();
    fx.engine.fail_execs(1);
    let project = fx.project();

    let code = project.run_command("start", vec![], true).await.unwrap();
    assert_eq!(code, 0);
    assert_eq!(fx.engine.count_execs("yarn --no-default-rc run start"), 1);
}

#[tokio::test]
async fn execution_error_after_retry_is_fatal() {
    let fx = Fixture::node();
    fx.engine.fail_execs(2);
    let project = fx.project();

    let err = project.run_command("start", vec![], true).await.unwrap_err();
    assert!(matches!(err, DotrunError::Execution { .. }));
    assert_eq!(err.exit_code(), 126);
}

#[tokio::test]
async fn clean_always_tears_down() {
    let fx = Fixture::node();
    fx.engine.exit_code("yarn --no-default-rc run clean", 2);
    let project = fx.project();

    project.install(false).await.unwrap();
    assert_eq!(fx.fingerprint_files(), 1);

    let code = project.clean().await.unwrap();

    assert_eq!(code, 0);
    assert_eq!(fx.engine.count_execs("yarn --no-default-rc run clean"), 1);
    assert!(fx.engine.container(&fx.container_name()).is_none());
    assert_eq!(fx.engine.volume_count(), 0);
    assert_eq!(fx.fingerprint_files(), 0);
    assert!(project.gate().needed(project.context()).await.unwrap());
}

#[tokio::test]
async fn clean_without_script_or_container() {
    let fx = Fixture::new();
    fx.write("package.json", r#"{"scripts": {"start": "serve"}}"#);
    let project = fx.project();

    assert_eq!(project.clean().await.unwrap(), 0);
    assert!(fx.engine.exec_argvs().is_empty());

    // Idempotent
    assert_eq!(project.clean().await.unwrap(), 0);
}
