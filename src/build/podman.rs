//! Podman build runtime
//!
//! Talks to the podman service socket through the `podman --url` remote
//! client, so builds work the same for root and rootless sockets.

use super::{stream_child_output, BuildRuntime, ContainerSpec};
use crate::error::{BextError, BextResult};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Podman socket URL below a runtime directory
pub fn socket_url(runtime_dir: &Path) -> String {
    format!("unix://{}/podman/podman.sock", runtime_dir.display())
}

/// Podman socket URL for the current user
///
/// Uses `XDG_RUNTIME_DIR`, falling back to `/var/run` for root sessions
/// without one.
pub fn default_socket() -> String {
    let dir = std::env::var_os("XDG_RUNTIME_DIR")
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| "/var/run".into());
    socket_url(Path::new(&dir))
}

/// Build runtime driving the podman remote client
pub struct PodmanBuilder {
    socket: String,
}

impl PodmanBuilder {
    pub fn new(socket: impl Into<String>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    pub fn socket(&self) -> &str {
        &self.socket
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("podman");
        cmd.arg("--url").arg(&self.socket).args(args);
        cmd
    }

    /// Execute a podman command and return the output
    async fn exec(&self, args: &[&str]) -> BextResult<std::process::Output> {
        debug!("Executing: podman --url {} {:?}", self.socket, args);

        self.command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| BextError::command_failed(format!("podman {:?}", args), e))
    }
}

impl Default for PodmanBuilder {
    fn default() -> Self {
        Self::new(default_socket())
    }
}

/// Arguments for `podman create` from a container spec
pub fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec!["create".to_string()];

    args.push("--workdir".to_string());
    args.push(spec.workdir.clone());

    for v in &spec.volumes {
        args.push("-v".to_string());
        args.push(v.clone());
    }

    for (k, v) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", k, v));
    }

    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

#[async_trait]
impl BuildRuntime for PodmanBuilder {
    async fn ping(&self) -> BextResult<()> {
        let output = self
            .exec(&["info", "--format", "{{.Version.Version}}"])
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            debug!("podman info: {}", String::from_utf8_lossy(&output.stderr));
            Err(BextError::BuildRuntimeUnavailable {
                socket: self.socket.clone(),
            })
        }
    }

    async fn image_exists(&self, image: &str) -> BextResult<bool> {
        let output = self.exec(&["image", "exists", image]).await?;
        Ok(output.status.success())
    }

    async fn pull(&self, image: &str) -> BextResult<()> {
        info!(image, "Pulling image");

        let output = self.exec(&["pull", image]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(BextError::ImagePull {
                image: image.to_string(),
                reason: stderr.to_string(),
            })
        }
    }

    async fn create(&self, spec: &ContainerSpec) -> BextResult<String> {
        let args = create_args(spec);
        debug!("Creating container: podman {:?}", args);

        let args_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.exec(&args_refs).await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(BextError::BuildFailed {
                container: "<create>".to_string(),
                output: super::build_error_output(
                    &String::from_utf8_lossy(&output.stdout),
                    &String::from_utf8_lossy(&output.stderr),
                ),
            })
        }
    }

    async fn start_attached(
        &self,
        container_id: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> BextResult<(bool, Vec<String>)> {
        let mut child = self
            .command(&["start", "--attach", container_id])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BextError::command_failed("podman start", e))?;

        let all_output = stream_child_output(&mut child, on_output).await?;

        let status = child
            .wait()
            .await
            .map_err(|e| BextError::command_failed("podman start", e))?;

        Ok((status.success(), all_output))
    }

    async fn remove(&self, container_id: &str) -> BextResult<()> {
        debug!("Removing container: {}", container_id);

        let output = self.exec(&["rm", "-f", container_id]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no such container") {
                Ok(())
            } else {
                Err(BextError::BuildFailed {
                    container: container_id.to_string(),
                    output: stderr.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::BTreeMap;

    #[test]
    fn socket_url_format() {
        assert_eq!(
            socket_url(Path::new("/run/user/1000")),
            "unix:///run/user/1000/podman/podman.sock"
        );
    }

    #[test]
    #[serial]
    fn default_socket_uses_runtime_dir() {
        let saved = std::env::var_os("XDG_RUNTIME_DIR");
        std::env::set_var("XDG_RUNTIME_DIR", "/run/user/4242");
        assert_eq!(default_socket(), "unix:///run/user/4242/podman/podman.sock");

        std::env::remove_var("XDG_RUNTIME_DIR");
        assert_eq!(default_socket(), "unix:///var/run/podman/podman.sock");

        if let Some(dir) = saved {
            std::env::set_var("XDG_RUNTIME_DIR", dir);
        }
    }

    #[test]
    #[serial]
    fn empty_runtime_dir_falls_back() {
        let saved = std::env::var_os("XDG_RUNTIME_DIR");
        std::env::set_var("XDG_RUNTIME_DIR", "");
        assert_eq!(default_socket(), "unix:///var/run/podman/podman.sock");

        match saved {
            Some(dir) => std::env::set_var("XDG_RUNTIME_DIR", dir),
            None => std::env::remove_var("XDG_RUNTIME_DIR"),
        }
    }

    #[test]
    fn create_args_order() {
        let spec = ContainerSpec {
            image: "docker.io/nixos/nix:latest".to_string(),
            workdir: "/out".to_string(),
            volumes: vec!["/tmp/out:/out:Z,rw".to_string()],
            env: BTreeMap::from([("BEXT_CONFIG_FILE".to_string(), "/config.json".to_string())]),
            command: vec!["/bin/sh".to_string(), "-c".to_string(), "true".to_string()],
        };

        assert_eq!(
            create_args(&spec),
            vec![
                "create",
                "--workdir",
                "/out",
                "-v",
                "/tmp/out:/out:Z,rw",
                "-e",
                "BEXT_CONFIG_FILE=/config.json",
                "docker.io/nixos/nix:latest",
                "/bin/sh",
                "-c",
                "true",
            ]
        );
    }

    #[test]
    fn builder_keeps_socket() {
        let builder = PodmanBuilder::new("unix:///tmp/podman.sock");
        assert_eq!(builder.socket(), "unix:///tmp/podman.sock");
    }
}
