//! Layer image builds
//!
//! A layer is built from a JSON recipe inside a nix container. The recipe is
//! mounted read-only at `/config.json`, the output directory at `/out`, and
//! the recipe flake's builder derivation copies the finished image there.

mod podman;

pub use podman::{default_socket, socket_url, PodmanBuilder};

use crate::config::schema::BuildConfig;
use crate::config::SYSEXT_EXTENSION;
use crate::error::{BextError, BextResult};
use crate::store::blob;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

/// Max number of output lines to include in build error messages.
const BUILD_ERROR_TAIL_LINES: usize = 50;

const NIX_FLAGS: &str = "-L --extra-experimental-features nix-command --extra-experimental-features flakes --impure";

/// Container configuration for a build
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Container image to use
    pub image: String,
    /// Working directory inside the container
    pub workdir: String,
    /// Volume mounts (host:container:options format)
    pub volumes: Vec<String>,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Command to run
    pub command: Vec<String>,
}

/// Container runtime able to run a layer build
#[async_trait]
pub trait BuildRuntime: Send + Sync {
    /// Check that the runtime service answers
    async fn ping(&self) -> BextResult<()>;

    /// Check if image exists locally
    async fn image_exists(&self, image: &str) -> BextResult<bool>;

    /// Pull an image
    async fn pull(&self, image: &str) -> BextResult<()>;

    /// Create a container and return its ID
    async fn create(&self, spec: &ContainerSpec) -> BextResult<String>;

    /// Start a container and stream its output until it exits
    ///
    /// Returns whether the container exited successfully along with every
    /// output line.
    async fn start_attached(
        &self,
        container_id: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> BextResult<(bool, Vec<String>)>;

    /// Remove a container
    async fn remove(&self, container_id: &str) -> BextResult<()>;
}

/// Build recipe; only the fields bext itself needs are read
#[derive(Debug, Clone, Deserialize)]
pub struct Recipe {
    pub name: String,
}

impl Recipe {
    /// Read and validate a recipe, returning its absolute path alongside
    pub fn load(path: &Path) -> BextResult<(PathBuf, Self)> {
        let path = blob::clean_path(path)?;
        let data = fs::read_to_string(&path).map_err(|e| BextError::SourceNotFound {
            path: path.clone(),
            source: e,
        })?;

        let recipe: Recipe = serde_json::from_str(&data).map_err(|e| BextError::RecipeInvalid {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        blob::validate_component(&recipe.name, "recipe name").map_err(|_| {
            BextError::RecipeInvalid {
                path: path.clone(),
                reason: format!("invalid layer name {:?}", recipe.name),
            }
        })?;

        Ok((path, recipe))
    }
}

/// Fully resolved build invocation
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub recipe_path: PathBuf,
    pub recipe: Recipe,
    pub image: String,
    pub recipe_flake: String,
    pub recipe_action: String,
    /// Absolute path of the image file to produce
    pub output_path: PathBuf,
    pub pull: bool,
    pub keep: bool,
}

impl BuildRequest {
    /// Resolve a request from a recipe and build settings
    ///
    /// Without an explicit output path the image lands in `cwd` as
    /// `<name>.raw`.
    pub fn new(
        recipe_path: &Path,
        settings: &BuildConfig,
        output_path: Option<&Path>,
    ) -> BextResult<Self> {
        let (recipe_path, recipe) = Recipe::load(recipe_path)?;
        let output_path = match output_path {
            Some(p) => blob::clean_path(p)?,
            None => blob::clean_path(Path::new(&format!("{}{}", recipe.name, SYSEXT_EXTENSION)))?,
        };

        Ok(Self {
            recipe_path,
            recipe,
            image: format!("{}:{}", settings.image, settings.tag),
            recipe_flake: settings.recipe_flake.clone(),
            recipe_action: settings.recipe_action.clone(),
            output_path,
            pull: true,
            keep: false,
        })
    }

    fn output_dir(&self) -> &Path {
        self.output_path.parent().unwrap_or_else(|| Path::new("/"))
    }

    fn output_name(&self) -> String {
        self.output_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{}{}", self.recipe.name, SYSEXT_EXTENSION))
    }

    /// Shell script run inside the build container
    pub fn script(&self) -> String {
        format!(
            "set -eux ; NIXPKGS_ALLOW_UNFREE=1 nix build {} {}#{} -o result && cp -f ./result ./{} && rm ./result",
            NIX_FLAGS,
            self.recipe_flake,
            self.recipe_action,
            self.output_name()
        )
    }

    /// Container spec for this build
    pub fn container_spec(&self) -> ContainerSpec {
        ContainerSpec {
            image: self.image.clone(),
            workdir: "/out".to_string(),
            volumes: vec![
                format!("{}:/out:Z,rw", self.output_dir().display()),
                format!("{}:/config.json:Z,ro", self.recipe_path.display()),
            ],
            env: BTreeMap::from([("BEXT_CONFIG_FILE".to_string(), "/config.json".to_string())]),
            command: vec!["/bin/sh".to_string(), "-c".to_string(), self.script()],
        }
    }
}

/// Stage reached by [`build_layer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Connecting,
    Pulling,
    Creating,
    Building,
    Cleaning,
}

impl std::fmt::Display for BuildStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connecting => "Connecting to podman",
            Self::Pulling => "Pulling image",
            Self::Creating => "Creating build container",
            Self::Building => "Building image",
            Self::Cleaning => "Removing build container",
        };
        f.write_str(s)
    }
}

/// Run a layer build to completion and return the produced image path
pub async fn build_layer(
    runtime: &dyn BuildRuntime,
    request: &BuildRequest,
    on_stage: &(dyn Fn(BuildStage) + Send + Sync),
    on_output: &(dyn Fn(String) + Send + Sync),
) -> BextResult<PathBuf> {
    on_stage(BuildStage::Connecting);
    runtime.ping().await?;

    if request.pull && !runtime.image_exists(&request.image).await? {
        on_stage(BuildStage::Pulling);
        runtime.pull(&request.image).await?;
    }

    fs::create_dir_all(request.output_dir()).map_err(|e| {
        BextError::io(format!("creating output directory {}", request.output_dir().display()), e)
    })?;

    on_stage(BuildStage::Creating);
    let container = runtime.create(&request.container_spec()).await?;
    info!(container = %container, "Starting build container");

    on_stage(BuildStage::Building);
    let outcome = runtime.start_attached(&container, on_output).await;

    if request.keep {
        debug!(container = %container, "Keeping build container");
    } else {
        on_stage(BuildStage::Cleaning);
        if let Err(e) = runtime.remove(&container).await {
            warn!(container = %container, error = %e, "Failed to remove build container");
        }
    }

    let (success, output) = outcome?;
    if !success {
        return Err(BextError::BuildFailed {
            container,
            output: build_error_output(&output.join("\n"), ""),
        });
    }

    fs::File::open(&request.output_path).map_err(|e| {
        BextError::io(
            format!("opening built image {}", request.output_path.display()),
            e,
        )
    })?;

    info!(
        container = %container,
        image = %request.output_path.display(),
        "Successfully built {}",
        request.output_name()
    );
    Ok(request.output_path.clone())
}

/// Extract the useful tail of build output for error diagnostics.
///
/// Combines stdout and stderr, then returns the last `BUILD_ERROR_TAIL_LINES`
/// lines so error messages are actionable without being overwhelming.
pub(crate) fn build_error_output(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let total = lines.len();
    let tail: Vec<&str> = if total > BUILD_ERROR_TAIL_LINES {
        lines[total - BUILD_ERROR_TAIL_LINES..].to_vec()
    } else {
        lines
    };
    tail.join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines for error reporting.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> BextResult<Vec<String>> {
    let (Some(stderr), Some(stdout)) = (child.stderr.take(), child.stdout.take()) else {
        return Err(BextError::Internal("child output was not piped".to_string()));
    };

    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_reader = BufReader::new(stdout).lines();

    let mut all_output = Vec::new();
    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    Ok(all_output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeRuntime {
        has_image: bool,
        unreachable: bool,
        fail_build: bool,
        calls: Mutex<Vec<String>>,
        /// Written into the output path when the build succeeds
        produce: Option<PathBuf>,
    }

    impl FakeRuntime {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BuildRuntime for FakeRuntime {
        async fn ping(&self) -> BextResult<()> {
            self.record("ping");
            if self.unreachable {
                return Err(BextError::BuildRuntimeUnavailable {
                    socket: "unix:///nowhere".to_string(),
                });
            }
            Ok(())
        }

        async fn image_exists(&self, image: &str) -> BextResult<bool> {
            self.record(format!("exists {}", image));
            Ok(self.has_image)
        }

        async fn pull(&self, image: &str) -> BextResult<()> {
            self.record(format!("pull {}", image));
            Ok(())
        }

        async fn create(&self, spec: &ContainerSpec) -> BextResult<String> {
            self.record(format!("create {}", spec.image));
            Ok("c0ffee".to_string())
        }

        async fn start_attached(
            &self,
            container_id: &str,
            on_output: &(dyn Fn(String) + Send + Sync),
        ) -> BextResult<(bool, Vec<String>)> {
            self.record(format!("start {}", container_id));
            on_output("building".to_string());
            if self.fail_build {
                return Ok((false, vec!["error: recipe broken".to_string()]));
            }
            if let Some(path) = &self.produce {
                fs::write(path, b"image").unwrap();
            }
            Ok((true, vec!["building".to_string()]))
        }

        async fn remove(&self, container_id: &str) -> BextResult<()> {
            self.record(format!("rm {}", container_id));
            Ok(())
        }
    }

    fn recipe(dir: &TempDir, json: &str) -> PathBuf {
        let path = dir.path().join("recipe.json");
        fs::write(&path, json).unwrap();
        path
    }

    fn request(dir: &TempDir) -> BuildRequest {
        let path = recipe(dir, r#"{"name": "htop", "packages": ["htop"]}"#);
        let output = dir.path().join("out").join("htop.raw");
        BuildRequest::new(&path, &BuildConfig::default(), Some(&output)).unwrap()
    }

    fn no_stage(_: BuildStage) {}

    fn no_output(_: String) {}

    #[test]
    fn recipe_requires_name() {
        let dir = TempDir::new().unwrap();
        let path = recipe(&dir, r#"{"packages": []}"#);
        assert!(matches!(
            Recipe::load(&path),
            Err(BextError::RecipeInvalid { .. })
        ));
    }

    #[test]
    fn recipe_rejects_path_names() {
        let dir = TempDir::new().unwrap();
        let path = recipe(&dir, r#"{"name": "../etc"}"#);
        assert!(matches!(
            Recipe::load(&path),
            Err(BextError::RecipeInvalid { .. })
        ));
    }

    #[test]
    fn missing_recipe_is_not_found() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Recipe::load(&dir.path().join("absent.json")),
            Err(BextError::SourceNotFound { .. })
        ));
    }

    #[test]
    fn container_spec_mounts_output_and_recipe() {
        let dir = TempDir::new().unwrap();
        let req = request(&dir);
        let spec = req.container_spec();

        assert_eq!(spec.image, "docker.io/nixos/nix:latest");
        assert_eq!(spec.workdir, "/out");
        assert_eq!(
            spec.volumes,
            vec![
                format!("{}:/out:Z,rw", dir.path().join("out").display()),
                format!("{}:/config.json:Z,ro", req.recipe_path.display()),
            ]
        );
        assert_eq!(spec.env["BEXT_CONFIG_FILE"], "/config.json");
        assert!(spec.command[2].contains("github:ublue-os/bext#bake-recipe"));
        assert!(spec.command[2].ends_with("cp -f ./result ./htop.raw && rm ./result"));
    }

    #[test]
    fn default_output_is_named_after_recipe() {
        let dir = TempDir::new().unwrap();
        let path = recipe(&dir, r#"{"name": "htop"}"#);
        let req = BuildRequest::new(&path, &BuildConfig::default(), None).unwrap();

        assert_eq!(req.output_path.file_name().unwrap(), "htop.raw");
        assert!(req.output_path.is_absolute());
    }

    #[tokio::test]
    async fn build_pulls_missing_image_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let req = request(&dir);
        let runtime = FakeRuntime {
            produce: Some(req.output_path.clone()),
            ..Default::default()
        };

        let built = build_layer(&runtime, &req, &no_stage, &no_output).await.unwrap();

        assert_eq!(built, req.output_path);
        assert_eq!(
            runtime.calls(),
            vec![
                "ping",
                "exists docker.io/nixos/nix:latest",
                "pull docker.io/nixos/nix:latest",
                "create docker.io/nixos/nix:latest",
                "start c0ffee",
                "rm c0ffee",
            ]
        );
    }

    #[tokio::test]
    async fn present_image_or_no_pull_skips_pull() {
        let dir = TempDir::new().unwrap();
        let mut req = request(&dir);
        let runtime = FakeRuntime {
            has_image: true,
            produce: Some(req.output_path.clone()),
            ..Default::default()
        };
        build_layer(&runtime, &req, &no_stage, &no_output).await.unwrap();
        assert!(!runtime.calls().iter().any(|c| c.starts_with("pull")));

        req.pull = false;
        let runtime = FakeRuntime {
            produce: Some(req.output_path.clone()),
            ..Default::default()
        };
        build_layer(&runtime, &req, &no_stage, &no_output).await.unwrap();
        assert!(!runtime.calls().iter().any(|c| c.starts_with("exists")));
    }

    #[tokio::test]
    async fn keep_leaves_container() {
        let dir = TempDir::new().unwrap();
        let mut req = request(&dir);
        req.keep = true;
        let runtime = FakeRuntime {
            has_image: true,
            produce: Some(req.output_path.clone()),
            ..Default::default()
        };

        build_layer(&runtime, &req, &no_stage, &no_output).await.unwrap();
        assert!(!runtime.calls().iter().any(|c| c.starts_with("rm")));
    }

    #[tokio::test]
    async fn failed_build_reports_output_tail() {
        let dir = TempDir::new().unwrap();
        let req = request(&dir);
        let runtime = FakeRuntime {
            has_image: true,
            fail_build: true,
            ..Default::default()
        };

        let err = build_layer(&runtime, &req, &no_stage, &no_output).await.unwrap_err();

        match err {
            BextError::BuildFailed { container, output } => {
                assert_eq!(container, "c0ffee");
                assert!(output.contains("recipe broken"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(runtime.calls().contains(&"rm c0ffee".to_string()));
    }

    #[tokio::test]
    async fn missing_output_fails() {
        let dir = TempDir::new().unwrap();
        let req = request(&dir);
        let runtime = FakeRuntime {
            has_image: true,
            ..Default::default()
        };

        let err = build_layer(&runtime, &req, &no_stage, &no_output).await.unwrap_err();
        assert!(matches!(err, BextError::Io { .. }));
    }

    #[tokio::test]
    async fn unreachable_runtime_stops_early() {
        let dir = TempDir::new().unwrap();
        let req = request(&dir);
        let runtime = FakeRuntime {
            unreachable: true,
            ..Default::default()
        };

        let err = build_layer(&runtime, &req, &no_stage, &no_output).await.unwrap_err();
        assert!(matches!(err, BextError::BuildRuntimeUnavailable { .. }));
        assert_eq!(runtime.calls(), vec!["ping"]);
    }

    #[test]
    fn error_output_keeps_tail() {
        let long: String = (0..80).map(|i| format!("line {}\n", i)).collect();
        let tail = build_error_output(&long, "");
        assert_eq!(tail.lines().count(), BUILD_ERROR_TAIL_LINES);
        assert!(tail.ends_with("line 79"));
    }
}
