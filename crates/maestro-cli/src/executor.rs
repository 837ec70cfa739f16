use crate::config::ExecutorConfig;
use async_trait::async_trait;
use maestro_core::{MaestroError, MaestroResult};
use maestro_orchestrator::ActionExecutor;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Runs actions on the local machine.
///
/// File paths are resolved inside `workspace_root` and may not escape it.
/// Code runs through the system interpreter for the requested language and
/// is killed once `code_timeout` elapses.
pub struct LocalExecutor {
    root: PathBuf,
    search_url: Option<String>,
    code_timeout: Duration,
    http: reqwest::Client,
}

impl LocalExecutor {
    pub fn new(config: &ExecutorConfig) -> MaestroResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| MaestroError::Http(e.to_string()))?;
        Ok(Self {
            root: config.workspace_root.clone(),
            search_url: config.search_url.clone(),
            code_timeout: Duration::from_secs(config.code_timeout_secs),
            http,
        })
    }

    /// Resolve `path` under the workspace root, rejecting anything that
    /// would land outside it.
    pub fn resolve(&self, path: &str) -> MaestroResult<PathBuf> {
        let relative = Path::new(path);
        if path.trim().is_empty() {
            return Err(MaestroError::Executor("empty path".to_string()));
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(MaestroError::Executor(format!(
                        "path '{path}' escapes the workspace"
                    )));
                }
            }
        }
        Ok(self.root.join(relative))
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> MaestroResult<String> {
        let resp = request
            .send()
            .await
            .map_err(|e| MaestroError::Http(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| MaestroError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(MaestroError::Executor(format!("{what} returned {status}: {body}")));
        }
        Ok(body)
    }
}

fn interpreter(language: &str) -> MaestroResult<(&'static str, &'static str)> {
    match language.trim().to_lowercase().as_str() {
        "python" | "python3" | "py" => Ok(("python3", "-c")),
        "sh" | "shell" => Ok(("sh", "-c")),
        "bash" => Ok(("bash", "-c")),
        "js" | "javascript" | "node" => Ok(("node", "-e")),
        other => Err(MaestroError::Executor(format!(
            "unsupported language '{other}'"
        ))),
    }
}

#[async_trait]
impl ActionExecutor for LocalExecutor {
    async fn read_file(&self, path: &str) -> MaestroResult<String> {
        let full = self.resolve(path)?;
        debug!(path = %full.display(), "Reading file");
        Ok(tokio::fs::read_to_string(&full).await?)
    }

    async fn write_file(&self, path: &str, content: &str) -> MaestroResult<String> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        debug!(path = %full.display(), bytes = content.len(), "Wrote file");
        Ok(format!("wrote {} bytes to {path}", content.len()))
    }

    async fn web_search(&self, query: &str) -> MaestroResult<String> {
        let url = self
            .search_url
            .as_deref()
            .ok_or_else(|| MaestroError::Executor("no search endpoint configured".to_string()))?;
        self.send(self.http.get(url).query(&[("q", query)]), "search")
            .await
    }

    async fn execute_code(&self, code: &str, language: &str) -> MaestroResult<String> {
        let (program, flag) = interpreter(language)?;
        let child = tokio::process::Command::new(program)
            .arg(flag)
            .arg(code)
            .current_dir(&self.root)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.code_timeout, child)
            .await
            .map_err(|_| {
                MaestroError::Executor(format!(
                    "{program} timed out after {}s",
                    self.code_timeout.as_secs()
                ))
            })??;

        if !output.status.success() {
            return Err(MaestroError::Executor(format!(
                "{program} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn call_api(
        &self,
        url: &str,
        method: &str,
        data: &serde_json::Value,
    ) -> MaestroResult<String> {
        if url.trim().is_empty() {
            return Err(MaestroError::Executor(
                "call_api needs a url; set orchestrator.fallback_endpoint to run fallback actions"
                    .to_string(),
            ));
        }
        let method = reqwest::Method::from_bytes(method.trim().to_uppercase().as_bytes())
            .map_err(|_| MaestroError::Executor(format!("invalid HTTP method '{method}'")))?;
        let mut request = self.http.request(method, url);
        if !data.is_null() {
            request = request.json(data);
        }
        self.send(request, url).await
    }
}
