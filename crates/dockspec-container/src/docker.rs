//! Bollard による ContainerRuntime 実装

// Bollard 0.19 の非推奨APIを一時的に使用
#![allow(deprecated)]

use crate::error::{ContainerError, Result};
use crate::runtime::{ContainerRuntime, ContainerSpec, ContainerState, ContainerStatus, ExecOutput};
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, LogsOptions,
    RemoveContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::models::HostConfig;
use futures_util::stream::StreamExt;
use std::collections::HashMap;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

fn is_status(err: &bollard::errors::Error, code: u16) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == code
    )
}

impl ContainerRuntime for DockerRuntime {
    async fn find_by_name(&self, name: &str) -> Result<Vec<String>> {
        let options = ListContainersOptions::<String> {
            all: true,
            filters: HashMap::from([("name".to_string(), vec![name.to_string()])]),
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;

        // name フィルタは部分一致なので完全一致で絞る
        let wanted = format!("/{}", name);
        Ok(containers
            .into_iter()
            .filter(|c| {
                c.names
                    .as_ref()
                    .is_some_and(|names| names.iter().any(|n| *n == wanted))
            })
            .filter_map(|c| c.id)
            .collect())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };
        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            host_config: Some(HostConfig {
                network_mode: spec.network_mode.clone(),
                ..Default::default()
            }),
            ..Default::default()
        };

        match self.docker.create_container(Some(options), config).await {
            Ok(response) => {
                for warning in &response.warnings {
                    tracing::warn!("create {}: {}", spec.name, warning);
                }
                Ok(response.id)
            }
            Err(e) if is_status(&e, 404) => Err(ContainerError::ImageNotFound {
                image: spec.image.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<bollard::query_parameters::StartContainerOptions>)
            .await?;
        Ok(())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerStatus> {
        let info = match self
            .docker
            .inspect_container(id, None::<bollard::query_parameters::InspectContainerOptions>)
            .await
        {
            Ok(info) => info,
            Err(e) if is_status(&e, 404) => {
                return Err(ContainerError::ContainerNotFound {
                    container: id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let state = match &info.state {
            Some(s) if s.paused.unwrap_or(false) => ContainerState::Paused,
            Some(s) if s.running.unwrap_or(false) => ContainerState::Running,
            Some(s) => match s.status.as_ref().map(|status| status.to_string()).as_deref() {
                Some("created") => ContainerState::Created,
                Some("exited") | Some("dead") => ContainerState::Stopped,
                _ => ContainerState::Unknown,
            },
            None => ContainerState::Unknown,
        };

        Ok(ContainerStatus {
            id: info.id.unwrap_or_else(|| id.to_string()),
            name: info
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            state,
            image: info.config.and_then(|c| c.image).unwrap_or_default(),
        })
    }

    async fn logs(&self, id: &str) -> Result<String> {
        let options = LogsOptions::<String> {
            stdout: true,
            ..Default::default()
        };

        let mut stream = self.docker.logs(id, Some(options));
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk? {
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    text.push_str(&String::from_utf8_lossy(&message));
                }
                LogOutput::StdErr { .. } | LogOutput::StdIn { .. } => {}
            }
        }
        Ok(text)
    }

    async fn exec(&self, id: &str, cmd: &[String]) -> Result<ExecOutput> {
        let exec_config = CreateExecOptions {
            cmd: Some(cmd.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let message = self.docker.create_exec(id, exec_config).await?;

        let mut output = ExecOutput::default();
        match self
            .docker
            .start_exec(&message.id, Some(StartExecOptions::default()))
            .await? {
            StartExecResults::Attached { output: mut stream, .. } => {
                while let Some(msg) = stream.next().await {
                    match msg {
                        Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                            output.stdout.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(LogOutput::StdErr { message }) => {
                            output.stderr.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(LogOutput::StdIn { .. }) => {}
                        Err(e) => {
                            return Err(ContainerError::ExecFailed {
                                container: id.to_string(),
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(ContainerError::ExecFailed {
                    container: id.to_string(),
                    message: "exec was detached".to_string(),
                });
            }
        }

        let inspect = self.docker.inspect_exec(&message.id).await?;
        output.exit_code = inspect.exit_code.unwrap_or(-1);
        Ok(output)
    }

    async fn kill(&self, id: &str) -> Result<()> {
        self.docker
            .kill_container(id, None::<bollard::query_parameters::KillContainerOptions>)
            .await?;
        Ok(())
    }

    async fn remove(&self, id: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        match self.docker.remove_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            // 既に消えていれば目的は達成している
            Err(e) if is_status(&e, 404) => {
                tracing::debug!("Container {} already removed", id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
