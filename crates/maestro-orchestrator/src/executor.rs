use crate::types::ActionPayload;
use async_trait::async_trait;
use maestro_core::MaestroResult;

/// The capability that actually performs actions.
///
/// The orchestrator treats every call as opaque, possibly slow and possibly
/// failing. Policy checks (sandboxing, allow-lists) belong to the implementor.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Return the contents of the file at `path`.
    async fn read_file(&self, path: &str) -> MaestroResult<String>;

    /// Write `content` to `path`, returning a short confirmation.
    async fn write_file(&self, path: &str, content: &str) -> MaestroResult<String>;

    /// Run a search and return the raw result text.
    async fn web_search(&self, query: &str) -> MaestroResult<String>;

    /// Run `code` with the interpreter for `language`, returning its output.
    async fn execute_code(&self, code: &str, language: &str) -> MaestroResult<String>;

    /// Send `data` to `url` with the given HTTP method, returning the response body.
    async fn call_api(
        &self,
        url: &str,
        method: &str,
        data: &serde_json::Value,
    ) -> MaestroResult<String>;
}

/// Route a payload to the matching executor operation.
pub async fn dispatch(executor: &dyn ActionExecutor, payload: &ActionPayload) -> MaestroResult<String> {
    match payload {
        ActionPayload::ReadFile { path } => executor.read_file(path).await,
        ActionPayload::WriteFile { path, content } => executor.write_file(path, content).await,
        ActionPayload::WebSearch { query } => executor.web_search(query).await,
        ActionPayload::ExecuteCode { code, language } => {
            executor.execute_code(code, language).await
        }
        ActionPayload::CallApi { url, method, data } => executor.call_api(url, method, data).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::MaestroError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ActionExecutor for RecordingExecutor {
        async fn read_file(&self, path: &str) -> MaestroResult<String> {
            self.calls.lock().push(format!("read:{path}"));
            Ok("contents".to_string())
        }

        async fn write_file(&self, path: &str, content: &str) -> MaestroResult<String> {
            self.calls.lock().push(format!("write:{path}:{content}"));
            Ok(String::new())
        }

        async fn web_search(&self, query: &str) -> MaestroResult<String> {
            self.calls.lock().push(format!("search:{query}"));
            Err(MaestroError::Executor("offline".to_string()))
        }

        async fn execute_code(&self, code: &str, language: &str) -> MaestroResult<String> {
            self.calls.lock().push(format!("exec:{language}:{code}"));
            Ok("1".to_string())
        }

        async fn call_api(
            &self,
            url: &str,
            method: &str,
            _data: &serde_json::Value,
        ) -> MaestroResult<String> {
            self.calls.lock().push(format!("api:{method}:{url}"));
            Ok("{}".to_string())
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_kind() {
        let executor = RecordingExecutor::default();
        let payloads = [
            ActionPayload::ReadFile {
                path: "a.txt".to_string(),
            },
            ActionPayload::WriteFile {
                path: "b.txt".to_string(),
                content: "hi".to_string(),
            },
            ActionPayload::ExecuteCode {
                code: "print(1)".to_string(),
                language: "python".to_string(),
            },
            ActionPayload::CallApi {
                url: "https://x".to_string(),
                method: "GET".to_string(),
                data: serde_json::Value::Null,
            },
        ];
        for payload in &payloads {
            dispatch(&executor, payload).await.unwrap();
        }
        assert_eq!(
            *executor.calls.lock(),
            vec![
                "read:a.txt".to_string(),
                "write:b.txt:hi".to_string(),
                "exec:python:print(1)".to_string(),
                "api:GET:https://x".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_dispatch_propagates_errors() {
        let executor = RecordingExecutor::default();
        let result = dispatch(
            &executor,
            &ActionPayload::WebSearch {
                query: "q".to_string(),
            },
        )
        .await;
        assert!(matches!(result, Err(MaestroError::Executor(_))));
    }
}
