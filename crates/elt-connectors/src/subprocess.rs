use crate::executor::{Connector, MessageStream, DEFAULT_TIMEOUT};
use async_trait::async_trait;
use elt_core::model::ConfiguredCatalog;
use elt_protocol::{parser, LogLevel, LogPayload, Message};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_stream::wrappers::LinesStream;

/// The command tokens a subprocess connector must accept (§6 "Subprocess
/// CLI contract").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Spec,
    Check,
    Discover,
    Read,
}

impl Operation {
    fn token(&self) -> &'static str {
        match self {
            Operation::Spec => "spec",
            Operation::Check => "check",
            Operation::Discover => "discover",
            Operation::Read => "read",
        }
    }
}

/// Out-of-process source connector: an executable invoked per §6's CLI
/// contract, communicating over file-path arguments and line-delimited
/// stdout (§4.2 "Subprocess").
pub struct SubprocessConnector {
    id: String,
    executable: PathBuf,
    working_dir: PathBuf,
    timeout: Duration,
    /// Advisory only: cgroup/ulimit enforcement is left to the deployment
    /// environment, not wired here.
    memory_limit_mb: Option<u64>,
    cpu_limit_cores: Option<f64>,
}

impl SubprocessConnector {
    pub fn new(id: impl Into<String>, executable: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        SubprocessConnector {
            id: id.into(),
            executable: executable.into(),
            working_dir: working_dir.into(),
            timeout: DEFAULT_TIMEOUT,
            memory_limit_mb: None,
            cpu_limit_cores: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_resource_limits(mut self, memory_limit_mb: u64, cpu_limit_cores: f64) -> Self {
        self.memory_limit_mb = Some(memory_limit_mb);
        self.cpu_limit_cores = Some(cpu_limit_cores);
        self
    }

    async fn write_temp_json(&self, dir: &Path, name: &str, value: &serde_json::Value) -> anyhow::Result<PathBuf> {
        let path = dir.join(name);
        let body = serde_json::to_vec_pretty(value)?;
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(&body).await?;
        Ok(path)
    }

    /// Run one invocation of the subprocess, returning every message
    /// parsed from stdout and the collected stderr lines as advisory LOG
    /// messages (§4.2 "captures stderr as diagnostic log lines").
    async fn run(
        &self,
        op: Operation,
        config: Option<&serde_json::Value>,
        catalog: Option<&ConfiguredCatalog>,
        prior_state: Option<&serde_json::Value>,
    ) -> anyhow::Result<Vec<Message>> {
        let run_dir = self.working_dir.join(format!("{}-{}", self.id, uuid_like()));
        tokio::fs::create_dir_all(&run_dir).await?;

        // Cleanup on every exit path (§4.2): a guard removes the temp
        // directory on drop regardless of how this function returns.
        let _cleanup = CleanupGuard { path: run_dir.clone() };

        let mut cmd = Command::new(&self.executable);
        cmd.arg(op.token());

        if let Some(config) = config {
            let path = self.write_temp_json(&run_dir, "config.json", config).await?;
            cmd.arg("--config").arg(path);
        }
        if let Some(catalog) = catalog {
            let value = serde_json::to_value(catalog)?;
            let path = self.write_temp_json(&run_dir, "catalog.json", &value).await?;
            cmd.arg("--catalog").arg(path);
        }
        if let Some(state) = prior_state {
            let path = self.write_temp_json(&run_dir, "state.json", state).await?;
            cmd.arg("--state").arg(path);
        }

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(Stdio::null());

        if let (Some(mem), Some(cpu)) = (self.memory_limit_mb, self.cpu_limit_cores) {
            tracing::debug!(connector = %self.id, mem, cpu, "resource limits requested (advisory only)");
        }

        let mut child = cmd.spawn().map_err(|err| {
            anyhow::anyhow!(elt_core::ElError::connect(format!(
                "failed to spawn connector executable {}: {err}",
                self.executable.display()
            )))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("connector child process has no stdout pipe"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("connector child process has no stderr pipe"))?;

        let stdout_task = tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            let mut lines = LinesStream::new(reader.lines());
            let mut messages = Vec::new();
            use tokio_stream::StreamExt;
            while let Some(line) = lines.next().await {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parser::parse_line(&line) {
                    Ok(msg) => messages.push(msg),
                    Err(err) => {
                        tracing::warn!(line, error = %err, "skipping malformed connector stdout line");
                    }
                }
            }
            messages
        });

        let stderr_task = tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = LinesStream::new(reader.lines());
            let mut logs = Vec::new();
            use tokio_stream::StreamExt;
            while let Some(line) = lines.next().await {
                let Ok(line) = line else { break };
                if !line.trim().is_empty() {
                    logs.push(line);
                }
            }
            logs
        });

        let wait_result = tokio::time::timeout(self.timeout, child.wait()).await;

        match wait_result {
            Ok(Ok(status)) => {
                let mut messages = stdout_task.await.unwrap_or_default();
                let stderr_lines = stderr_task.await.unwrap_or_default();
                for line in stderr_lines {
                    messages.push(Message::Log(LogPayload {
                        level: LogLevel::Error,
                        message: line,
                    }));
                }
                if !status.success() {
                    return Err(anyhow::anyhow!(elt_core::ElError::connect(format!(
                        "connector exited with status {status}"
                    ))));
                }
                Ok(messages)
            }
            Ok(Err(err)) => Err(anyhow::anyhow!(elt_core::ElError::connect(format!(
                "failed waiting on connector process: {err}"
            )))),
            Err(_) => {
                // Timed out: kill the process, preserve whatever stdout
                // had already produced (§4.2 "On timeout").
                let _ = child.start_kill();
                let _ = child.wait().await;
                let messages = stdout_task.await.unwrap_or_default();
                Err(PartialTimeout { messages }.into())
            }
        }
    }
}

fn uuid_like() -> String {
    // Cheap unique suffix for the per-invocation working directory; not
    // exposed on the wire so a full UUID would be overkill here.
    format!("{:x}", std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default())
}

/// Carries partial messages out of a timed-out run without losing them to
/// `anyhow`'s opaque error formatting.
#[derive(Debug)]
pub struct PartialTimeout {
    pub messages: Vec<Message>,
}

impl std::fmt::Display for PartialTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "connector execution timed out after yielding {} messages",
            self.messages.len()
        )
    }
}

impl std::error::Error for PartialTimeout {}

struct CleanupGuard {
    path: PathBuf,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let path = self.path.clone();
        // best effort: a failed cleanup leaves a stray temp dir, never
        // corrupts state.
        let _ = std::fs::remove_dir_all(path);
    }
}

#[async_trait]
impl Connector for SubprocessConnector {
    fn connector_id(&self) -> &str {
        &self.id
    }

    async fn spec(&self) -> anyhow::Result<Message> {
        let mut messages = self.run(Operation::Spec, None, None, None).await?;
        messages.pop().ok_or_else(|| anyhow::anyhow!(elt_core::ElError::protocol("connector produced no SPEC message")))
    }

    async fn check(&self, config: &serde_json::Value) -> anyhow::Result<Message> {
        let messages = self.run(Operation::Check, Some(config), None, None).await?;
        messages
            .into_iter()
            .find(|m| matches!(m, Message::ConnectionStatus(_)))
            .ok_or_else(|| anyhow::anyhow!(elt_core::ElError::protocol("connector produced no CONNECTION_STATUS message")))
    }

    async fn discover(&self, config: &serde_json::Value) -> anyhow::Result<Message> {
        let messages = self.run(Operation::Discover, Some(config), None, None).await?;
        messages
            .into_iter()
            .find(|m| matches!(m, Message::Catalog(_)))
            .ok_or_else(|| anyhow::anyhow!(elt_core::ElError::protocol("connector produced no CATALOG message")))
    }

    async fn read(
        &self,
        config: &serde_json::Value,
        configured_catalog: &ConfiguredCatalog,
        prior_state: Option<&serde_json::Value>,
    ) -> anyhow::Result<MessageStream> {
        let run_dir = self.working_dir.join(format!("{}-{}", self.id, uuid_like()));
        tokio::fs::create_dir_all(&run_dir).await?;

        let mut cmd = Command::new(&self.executable);
        cmd.arg(Operation::Read.token());

        let config_path = self.write_temp_json(&run_dir, "config.json", config).await?;
        cmd.arg("--config").arg(config_path);
        let catalog_value = serde_json::to_value(configured_catalog)?;
        let catalog_path = self.write_temp_json(&run_dir, "catalog.json", &catalog_value).await?;
        cmd.arg("--catalog").arg(catalog_path);
        if let Some(state) = prior_state {
            let state_path = self.write_temp_json(&run_dir, "state.json", state).await?;
            cmd.arg("--state").arg(state_path);
        }

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(Stdio::null());

        let mut child = cmd.spawn().map_err(|err| {
            anyhow::anyhow!(elt_core::ElError::connect(format!(
                "failed to spawn connector executable {}: {err}",
                self.executable.display()
            )))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("connector child process has no stdout pipe"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("connector child process has no stderr pipe"))?;

        // Capacity 1: the reader suspends at every line until the consumer
        // pulls it, so a writer blocked on the DB pool blocks this loop too
        // (§5 "Backpressure") instead of the whole run buffering in memory.
        let (tx, rx) = tokio::sync::mpsc::channel::<anyhow::Result<Message>>(1);
        let timeout = self.timeout;

        tokio::spawn(async move {
            let _cleanup = CleanupGuard { path: run_dir };

            let stderr_tx = tx.clone();
            let stderr_task = tokio::spawn(async move {
                let reader = BufReader::new(stderr);
                let mut lines = LinesStream::new(reader.lines());
                use tokio_stream::StreamExt;
                while let Some(line) = lines.next().await {
                    let Ok(line) = line else { break };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let log = Message::Log(LogPayload { level: LogLevel::Error, message: line });
                    if stderr_tx.send(Ok(log)).await.is_err() {
                        break;
                    }
                }
            });

            let stdout_tx = tx.clone();
            let stdout_task = tokio::spawn(async move {
                let reader = BufReader::new(stdout);
                let mut lines = LinesStream::new(reader.lines());
                use tokio_stream::StreamExt;
                while let Some(line) = lines.next().await {
                    let Ok(line) = line else { break };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parser::parse_line(&line) {
                        Ok(msg) => {
                            if stdout_tx.send(Ok(msg)).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            tracing::warn!(line, error = %err, "skipping malformed connector stdout line");
                        }
                    }
                }
            });

            let wait_result = tokio::time::timeout(timeout, child.wait()).await;
            let _ = stdout_task.await;
            let _ = stderr_task.await;

            match wait_result {
                Ok(Ok(status)) if !status.success() => {
                    let _ = tx
                        .send(Err(anyhow::anyhow!(elt_core::ElError::connect(format!(
                            "connector exited with status {status}"
                        )))))
                        .await;
                }
                Ok(Err(err)) => {
                    let _ = tx
                        .send(Err(anyhow::anyhow!(elt_core::ElError::connect(format!(
                            "failed waiting on connector process: {err}"
                        )))))
                        .await;
                }
                Err(_) => {
                    // Timed out: kill the process, but whatever was already
                    // sent through the channel stays with the consumer
                    // (§4.2 "On timeout ... preserve partial records").
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    let _ = tx
                        .send(Err(anyhow::anyhow!(elt_core::ElError::connect(format!(
                            "connector execution timed out after {timeout:?}"
                        )))))
                        .await;
                }
                Ok(Ok(_)) => {}
            }
        });

        Ok(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elt_core::model::ConfiguredCatalog;
    use std::io::Write;

    fn write_script(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("connector.sh");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        file.write_all(body.as_bytes()).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
        }
        path
    }

    #[tokio::test]
    async fn read_parses_stdout_records() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(
            tmp.path(),
            r#"echo '{"type":"RECORD","stream":"users","data":{"id":1},"emitted_at":1}'
"#,
        );
        let connector = SubprocessConnector::new("t", script, tmp.path().to_path_buf());
        let catalog = ConfiguredCatalog::default();
        let mut stream = connector.read(&serde_json::json!({}), &catalog, None).await.unwrap();
        use tokio_stream::StreamExt;
        let msg = stream.next().await.unwrap().unwrap();
        assert!(msg.as_record().is_some());
    }

    #[tokio::test]
    async fn malformed_stdout_line_is_skipped_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(
            tmp.path(),
            r#"echo 'not json'
echo '{"type":"RECORD","stream":"users","data":{"id":1},"emitted_at":1}'
"#,
        );
        let connector = SubprocessConnector::new("t", script, tmp.path().to_path_buf());
        let catalog = ConfiguredCatalog::default();
        let stream = connector.read(&serde_json::json!({}), &catalog, None).await.unwrap();
        use tokio_stream::StreamExt;
        let messages: Vec<_> = stream.collect().await;
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn timeout_preserves_partial_records() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(
            tmp.path(),
            r#"echo '{"type":"RECORD","stream":"users","data":{"id":1},"emitted_at":1}'
sleep 5
"#,
        );
        let connector = SubprocessConnector::new("t", script, tmp.path().to_path_buf())
            .with_timeout(Duration::from_millis(200));
        let catalog = ConfiguredCatalog::default();
        let stream = connector.read(&serde_json::json!({}), &catalog, None).await.unwrap();
        use tokio_stream::StreamExt;
        let results: Vec<_> = stream.collect().await;
        let ok_count = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok_count, 1);
        assert!(results.iter().any(|r| r.is_err()), "timeout should surface as a trailing error");
    }

    #[tokio::test]
    async fn cleans_up_temp_directory_after_run() {
        let tmp = tempfile::tempdir().unwrap();
        let script = write_script(tmp.path(), "echo '{\"type\":\"LOG\",\"level\":\"INFO\",\"message\":\"hi\"}'\n");
        let connector = SubprocessConnector::new("t", script, tmp.path().to_path_buf());
        let catalog = ConfiguredCatalog::default();
        let stream = connector.read(&serde_json::json!({}), &catalog, None).await.unwrap();
        use tokio_stream::StreamExt;
        let _: Vec<_> = stream.collect().await;
        let entries: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        // Only connector.sh should remain; the per-invocation run dir was cleaned up
        // once the stream (and the background task driving it) fully drained.
        assert_eq!(entries.len(), 1);
    }
}
