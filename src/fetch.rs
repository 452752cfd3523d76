//! Page fetching with bounded retries and scripted-rendering escalation

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::{
    config::ScraperConfig,
    errors::{EtaTrackerError, Result},
    html::has_table_markup,
};

/// Outcome of a single failed attempt
#[derive(Debug)]
pub enum AttemptError {
    /// Worth another try with a longer timeout
    Retryable(String),
    /// Retrying cannot help
    Fatal(EtaTrackerError),
}

/// Bounded retries; attempt `n` gets `base_timeout * n` and is followed by
/// a pause of `delay * n`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn timeout_for(&self, base_timeout: Duration, attempt: u32) -> Duration {
        base_timeout * attempt
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.delay * attempt
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out.
    pub async fn run<T, F, Fut>(&self, target: &str, base_timeout: Duration, mut op: F) -> Result<T>
    where
        F: FnMut(Duration) -> Fut,
        Fut: Future<Output = std::result::Result<T, AttemptError>>,
    {
        let mut last_reason = String::from("no attempt made");

        for attempt in 1..=self.attempts {
            let timeout = self.timeout_for(base_timeout, attempt);
            debug!("{}: attempt {}/{} (timeout {:?})", target, attempt, self.attempts, timeout);

            match op(timeout).await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Retryable(reason)) => {
                    warn!("{}: attempt {} failed: {}", target, attempt, reason);
                    last_reason = reason;
                }
            }

            if attempt < self.attempts {
                tokio::time::sleep(self.backoff_for(attempt)).await;
            }
        }

        Err(EtaTrackerError::FetchFailed {
            url: target.to_string(),
            attempts: self.attempts,
            reason: last_reason,
        })
    }
}

/// Plain HTTP fetcher with a session cookie store
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    policy: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .cookie_store(true)
            .build()?;
        Ok(Self {
            client,
            policy: RetryPolicy {
                attempts: config.retry_attempts,
                delay: config.retry_delay,
            },
        })
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// GET `url` and return the decoded body.
    pub async fn get(&self, url: &str, base_timeout: Duration) -> Result<String> {
        let body = self
            .policy
            .run(url, base_timeout, |timeout| self.try_get(url, timeout))
            .await?;
        debug!("{}: {} bytes received", url, body.len());
        Ok(body)
    }

    async fn try_get(&self, url: &str, timeout: Duration) -> std::result::Result<String, AttemptError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let reason = format!("HTTP {}", status);
            return Err(if is_retryable_status(status) {
                AttemptError::Retryable(reason)
            } else {
                AttemptError::Fatal(EtaTrackerError::FetchFailed {
                    url: url.to_string(),
                    attempts: 1,
                    reason,
                })
            });
        }

        response.text().await.map_err(classify_request_error)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn classify_request_error(e: reqwest::Error) -> AttemptError {
    if e.is_builder() {
        AttemptError::Fatal(e.into())
    } else {
        AttemptError::Retryable(e.to_string())
    }
}

/// Scripted-rendering collaborator for pages that build their table in
/// the browser.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str, timeout: Duration) -> std::result::Result<String, AttemptError>;
}

/// Runs an external headless renderer that prints the final DOM to stdout.
pub struct CommandRenderer {
    argv: Vec<String>,
}

impl CommandRenderer {
    /// `None` when no command is configured
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        if argv.is_empty() || argv[0].trim().is_empty() {
            None
        } else {
            Some(Self {
                argv: argv.to_vec(),
            })
        }
    }
}

#[async_trait]
impl PageRenderer for CommandRenderer {
    async fn render(&self, url: &str, timeout: Duration) -> std::result::Result<String, AttemptError> {
        let mut command = Command::new(&self.argv[0]);
        command
            .args(&self.argv[1..])
            .arg(url)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, command.output()).await {
            Err(_) => return Err(AttemptError::Retryable(format!("renderer timed out after {:?}", timeout))),
            Ok(Err(e)) => {
                return Err(AttemptError::Fatal(EtaTrackerError::RenderFailed(format!(
                    "could not run {}: {}",
                    self.argv[0], e
                ))))
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            return Err(AttemptError::Retryable(format!(
                "renderer exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Plain fetch first; escalate to the renderer when that fails or the
/// body has no table in it.
///
/// Without a renderer a table-less body is returned as is so the caller
/// can report and preserve it.
pub async fn fetch_with_escalation(
    fetcher: &HttpFetcher,
    renderer: Option<&dyn PageRenderer>,
    url: &str,
    base_timeout: Duration,
    tag: &str,
) -> Result<String> {
    let plain = fetcher.get(url, base_timeout).await;
    match &plain {
        Ok(body) if has_table_markup(body) => {
            info!("[{}] OK - {} bytes received", tag, body.len());
            return plain;
        }
        Ok(body) => info!("[{}] No table in plain response ({} bytes)", tag, body.len()),
        Err(e) => warn!("[{}] Plain fetch failed: {}", tag, e),
    }

    let Some(renderer) = renderer else {
        warn!("[{}] No renderer configured, cannot escalate", tag);
        return plain;
    };

    info!("[{}] Escalating to scripted rendering", tag);
    let rendered = fetcher
        .policy()
        .run(url, base_timeout, |timeout| renderer.render(url, timeout))
        .await?;
    info!("[{}] OK - {} bytes rendered", tag, rendered.len());
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn timeouts_and_backoff_grow_linearly() {
        let policy = RetryPolicy {
            attempts: 3,
            delay: Duration::from_secs(2),
        };
        let base = Duration::from_secs(20);
        assert_eq!(policy.timeout_for(base, 1), Duration::from_secs(20));
        assert_eq!(policy.timeout_for(base, 3), Duration::from_secs(60));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn retries_until_success_with_increasing_timeout() {
        let seen = Mutex::new(Vec::new());
        let result = policy(3)
            .run("test", Duration::from_secs(10), |timeout| {
                seen.lock().unwrap().push(timeout);
                let attempt = seen.lock().unwrap().len();
                async move {
                    if attempt < 3 {
                        Err(AttemptError::Retryable("timeout".to_string()))
                    } else {
                        Ok("body")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "body");
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Duration::from_secs(10),
                Duration::from_secs(20),
                Duration::from_secs(30)
            ]
        );
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = policy(2)
            .run("https://example.invalid", Duration::from_secs(1), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AttemptError::Retryable("HTTP 503".to_string())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match result {
            Err(EtaTrackerError::FetchFailed { attempts, reason, .. }) => {
                assert_eq!(attempts, 2);
                assert_eq!(reason, "HTTP 503");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn fatal_errors_stop_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = policy(5)
            .run("test", Duration::from_secs(1), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AttemptError::Fatal(EtaTrackerError::RenderFailed("missing".to_string()))) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(EtaTrackerError::RenderFailed(_))));
    }

    #[test]
    fn empty_render_command_disables_renderer() {
        assert!(CommandRenderer::from_argv(&[]).is_none());
        assert!(CommandRenderer::from_argv(&["".to_string()]).is_none());
        assert!(CommandRenderer::from_argv(&["chromium".to_string()]).is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_renderer_returns_stdout() {
        let renderer = CommandRenderer::from_argv(&["echo".to_string(), "<table>".to_string()]).unwrap();
        let body = renderer
            .render("https://example.invalid", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(body.trim(), "<table> https://example.invalid");
    }

    #[tokio::test]
    async fn missing_renderer_binary_is_fatal() {
        let renderer = CommandRenderer::from_argv(&["/nonexistent/renderer-binary".to_string()]).unwrap();
        let result = renderer
            .render("https://example.invalid", Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(AttemptError::Fatal(_))));
    }
}
