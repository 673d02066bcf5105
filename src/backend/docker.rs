//! # Docker CLI backend.
//!
//! Runs each check with the `docker` command line:
//!
//! ```text
//! docker run --rm --name <check id> \
//!     -e CHECK_ID=… -e CHECK_TARGET=… -e CHECK_ASSET_TYPE=… -e CHECK_OPTIONS=… \
//!     -e CHECKTYPE_NAME=… -e CHECKTYPE_VERSION=… -e AGENT_ADDRESS=<push address> \
//!     -e <REQUIRED_VAR> …  <image>
//! ```
//!
//! Required variables are passed by name only, so docker copies their values
//! from the environment of the runtime process.
//!
//! On cancellation the container is force-removed (`docker rm -f`) and the CLI
//! process is killed; the run resolves with [`BackendError::Canceled`].

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::backend::{Backend, RunHandle, RunParams, RunResult};
use crate::checktype::LabelSource;
use crate::error::{BackendError, ChecktypeError};

/// Backend driving the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
    extra_args: Vec<String>,
}

impl DockerCli {
    /// Uses `docker` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("docker")
    }

    /// Uses a specific docker-compatible binary (e.g. `podman`).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    /// Adds arguments passed to `run` before the image (e.g. `--network host`).
    pub fn with_run_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Environment passed to the check container.
    pub fn env(params: &RunParams) -> Vec<(&'static str, String)> {
        vec![
            ("CHECK_ID", params.check_id.clone()),
            ("CHECK_TARGET", params.target.clone()),
            ("CHECK_ASSET_TYPE", params.asset_type.clone()),
            ("CHECK_OPTIONS", params.options.clone()),
            ("CHECKTYPE_NAME", params.checktype_name.clone()),
            ("CHECKTYPE_VERSION", params.checktype_version.clone()),
            ("AGENT_ADDRESS", params.push_address.clone()),
        ]
    }

    /// Arguments of the `docker run` invocation for `params`.
    pub fn run_args(&self, params: &RunParams) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            params.check_id.clone(),
        ];
        for (key, value) in Self::env(params) {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        for var in &params.required_vars {
            args.push("-e".to_string());
            args.push(var.clone());
        }
        args.extend(self.extra_args.iter().cloned());
        args.push(params.image.clone());
        args
    }

    async fn remove_container(program: &str, name: &str) {
        let res = Command::new(program)
            .args(["rm", "-f", name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(err) = res {
            warn!(container = name, error = %err, "unable to remove check container");
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for DockerCli {
    fn name(&self) -> &str {
        "docker"
    }

    async fn run(
        &self,
        ctx: CancellationToken,
        params: RunParams,
    ) -> Result<RunHandle, BackendError> {
        let child = Command::new(&self.program)
            .args(self.run_args(&params))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| BackendError::Launch(format!("{}: {err}", self.program)))?;
        debug!(check_id = %params.check_id, image = %params.image, "docker run started");

        let (tx, handle) = RunHandle::channel();
        let program = self.program.clone();
        let name = params.check_id;
        tokio::spawn(async move {
            let res = tokio::select! {
                out = child.wait_with_output() => match out {
                    Ok(out) if out.status.success() => RunResult::ok(out.stdout),
                    Ok(out) => {
                        let error = String::from_utf8_lossy(&out.stderr).trim().to_string();
                        let mut output = out.stdout;
                        output.extend_from_slice(&out.stderr);
                        RunResult {
                            output,
                            result: Err(BackendError::Run { code: out.status.code(), error }),
                        }
                    }
                    Err(err) => RunResult::failed(BackendError::run(err.to_string())),
                },
                _ = ctx.cancelled() => {
                    Self::remove_container(&program, &name).await;
                    RunResult::failed(BackendError::Canceled)
                }
            };
            let _ = tx.send(res);
        });
        Ok(handle)
    }
}

#[async_trait]
impl LabelSource for DockerCli {
    async fn image_labels(&self, image: &str) -> Result<HashMap<String, String>, ChecktypeError> {
        let out = Command::new(&self.program)
            .args(["image", "inspect", "--format", "{{json .Config.Labels}}", image])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| ChecktypeError::Labels(format!("{}: {err}", self.program)))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(ChecktypeError::Labels(stderr.trim().to_string()));
        }
        let labels: Option<HashMap<String, String>> = serde_json::from_slice(&out.stdout)
            .map_err(|err| ChecktypeError::Labels(err.to_string()))?;
        Ok(labels.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RunParams {
        RunParams {
            check_id: "0b8e".into(),
            checktype_name: "vulcan-nmap".into(),
            checktype_version: "1".into(),
            image: "vulcansec/vulcan-nmap:1".into(),
            target: "example.com".into(),
            asset_type: "Hostname".into(),
            options: r#"{"ports":[22]}"#.into(),
            required_vars: vec!["NMAP_TOKEN".into()],
            push_address: "http://172.17.0.1:8080".into(),
            ..RunParams::default()
        }
    }

    #[test]
    fn run_args_carry_env_and_image_last() {
        let args = DockerCli::new()
            .with_run_args(["--network", "host"])
            .run_args(&params());
        assert_eq!(&args[..4], ["run", "--rm", "--name", "0b8e"]);
        assert!(args.contains(&"CHECK_TARGET=example.com".to_string()));
        assert!(args.contains(&r#"CHECK_OPTIONS={"ports":[22]}"#.to_string()));
        assert!(args.contains(&"AGENT_ADDRESS=http://172.17.0.1:8080".to_string()));
        let var = args.iter().position(|a| a == "NMAP_TOKEN").unwrap();
        assert_eq!(args[var - 1], "-e");
        assert_eq!(args.last().map(String::as_str), Some("vulcansec/vulcan-nmap:1"));
        assert_eq!(args[args.len() - 3..args.len() - 1], ["--network", "host"]);
    }

    #[tokio::test]
    async fn missing_binary_is_a_launch_error() {
        let docker = DockerCli::with_program("/nonexistent/docker-binary");
        let err = docker
            .run(CancellationToken::new(), params())
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "backend_launch");
    }
}
