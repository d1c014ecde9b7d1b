//! Loopback HTTP listener catching the OAuth redirect.
//!
//! [`CallbackListener`] binds an ephemeral port on 127.0.0.1 and serves
//! requests on a background task, one task per connection so an idle socket
//! cannot hold up the redirect, until one of them is terminal: a matching
//! authorization code, a forged/stale `state`, or a provider error. The
//! terminal outcome is handed to the waiting flow over a oneshot channel and
//! the socket is closed before the waiter wakes up.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{GmailError, Result};

const BIND_ADDR: &str = "127.0.0.1:0";
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_HEADER_LINES: usize = 100;
const EVENT_QUEUE: usize = 8;

const SUCCESS_HTML: &str = "<h1>Success</h1>Authorized. You can close this tab.";
const FAILURE_HTML: &str = "<h1>Authorization failed</h1>Return to the terminal for details.";

/// What the listener decided about one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CallbackEvent {
    /// Browser favicon probe; keep waiting
    FaviconProbe,
    /// `state` does not belong to this flow; terminal
    StateMismatch { received: Option<String> },
    /// Provider redirected with an error (e.g. consent denied); terminal
    ProviderError(String),
    /// Authorization code received; terminal
    Code(String),
    /// Request without a code; keep waiting
    MissingCode,
}

impl CallbackEvent {
    fn status(&self) -> (u16, &'static str) {
        match self {
            CallbackEvent::FaviconProbe => (404, "Not Found"),
            CallbackEvent::StateMismatch { .. } => (500, "Internal Server Error"),
            CallbackEvent::ProviderError(_) | CallbackEvent::MissingCode => (400, "Bad Request"),
            CallbackEvent::Code(_) => (200, "OK"),
        }
    }

    fn body(&self) -> &'static str {
        match self {
            CallbackEvent::FaviconProbe => "",
            CallbackEvent::Code(_) => SUCCESS_HTML,
            _ => FAILURE_HTML,
        }
    }

    /// Terminal outcome handed to the flow, or `None` to keep serving
    fn into_outcome(self) -> Option<Result<String>> {
        match self {
            CallbackEvent::Code(code) => Some(Ok(code)),
            CallbackEvent::StateMismatch { received } => Some(Err(GmailError::AuthError(format!(
                "state mismatch in OAuth callback (received {:?})",
                received
            )))),
            CallbackEvent::ProviderError(error) => Some(Err(GmailError::AuthError(format!(
                "authorization was not granted: {}",
                error
            )))),
            CallbackEvent::FaviconProbe | CallbackEvent::MissingCode => None,
        }
    }
}

/// Classify a request target such as `/?state=st1&code=abc`
pub(crate) fn classify_request(target: &str, expected_state: &str) -> CallbackEvent {
    let url = match Url::parse("http://127.0.0.1")
        .and_then(|base| base.join(target))
    {
        Ok(url) => url,
        Err(_) => return CallbackEvent::StateMismatch { received: None },
    };

    if url.path() == "/favicon.ico" {
        return CallbackEvent::FaviconProbe;
    }

    let mut state = None;
    let mut code = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "state" => state = Some(value.into_owned()),
            "code" => code = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return CallbackEvent::StateMismatch { received: state };
    }
    if let Some(error) = error {
        return CallbackEvent::ProviderError(error);
    }
    match code {
        Some(code) if !code.is_empty() => CallbackEvent::Code(code),
        _ => CallbackEvent::MissingCode,
    }
}

/// Running loopback listener for one authorization flow
pub struct CallbackListener {
    addr: SocketAddr,
    outcome: oneshot::Receiver<Result<String>>,
    task: JoinHandle<()>,
}

impl CallbackListener {
    /// Bind an ephemeral loopback port and start serving in the background
    pub async fn bind(expected_state: impl Into<String>) -> Result<Self> {
        let listener = TcpListener::bind(BIND_ADDR)
            .await
            .map_err(|e| GmailError::AuthError(format!("cannot start callback listener: {}", e)))?;
        let addr = listener.local_addr()?;
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(serve(listener, expected_state.into(), tx));

        debug!("OAuth callback listener on http://{}", addr);
        Ok(Self {
            addr,
            outcome: rx,
            task,
        })
    }

    /// Redirect URI to register in the authorization request
    pub fn redirect_uri(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until the listener reaches a terminal outcome.
    ///
    /// `timeout` of `None` waits indefinitely. The listener is closed when
    /// this returns, whatever the result.
    pub async fn wait_for_code(mut self, timeout: Option<Duration>) -> Result<String> {
        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut self.outcome).await {
                Ok(received) => received,
                Err(_) => {
                    self.shutdown().await;
                    return Err(GmailError::AuthError(format!(
                        "no OAuth callback received within {:?}",
                        limit
                    )));
                }
            },
            None => (&mut self.outcome).await,
        };

        self.shutdown().await;
        match received {
            Ok(outcome) => outcome,
            Err(_) => Err(GmailError::AuthError(
                "callback listener stopped without a result".to_string(),
            )),
        }
    }

    async fn shutdown(&mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
        debug!("OAuth callback listener on {} closed", self.addr);
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(listener: TcpListener, expected_state: String, tx: oneshot::Sender<Result<String>>) {
    let expected_state: Arc<str> = expected_state.into();
    let (events_tx, mut events_rx) = mpsc::channel::<CallbackEvent>(EVENT_QUEUE);
    // Dropping the set aborts connections still in flight
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Callback listener accept failed: {}", e);
                        continue;
                    }
                };
                debug!("Callback connection from {}", peer);

                let expected_state = Arc::clone(&expected_state);
                let events = events_tx.clone();
                connections.spawn(async move {
                    match handle_connection(stream, &expected_state).await {
                        Ok(Some(event)) => {
                            let _ = events.send(event).await;
                        }
                        Ok(None) => {}
                        Err(e) => debug!("Dropping callback connection from {}: {}", peer, e),
                    }
                });
            }
            Some(event) = events_rx.recv() => {
                log_event(&event);
                if let Some(outcome) = event.into_outcome() {
                    drop(listener);
                    drop(connections);
                    let _ = tx.send(outcome);
                    return;
                }
            }
            Some(_) = connections.join_next() => {}
        }
    }
}

fn log_event(event: &CallbackEvent) {
    match event {
        CallbackEvent::FaviconProbe => debug!("Ignoring favicon probe"),
        CallbackEvent::MissingCode => warn!("OAuth callback without a code; still waiting"),
        CallbackEvent::StateMismatch { received } => {
            warn!("OAuth callback state mismatch (received {:?})", received)
        }
        CallbackEvent::ProviderError(error) => warn!("OAuth provider returned error: {}", error),
        CallbackEvent::Code(code) => info!("Received authorization code ({} chars)", code.len()),
    }
}

/// Read one request, answer it, and report how it was classified.
/// `Ok(None)` means the peer closed without sending a request.
async fn handle_connection(stream: TcpStream, expected_state: &str) -> Result<Option<CallbackEvent>> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    let read = tokio::time::timeout(REQUEST_READ_TIMEOUT, reader.read_line(&mut request_line))
        .await
        .map_err(|_| GmailError::NetworkError("timed out reading request".to_string()))??;
    if read == 0 {
        return Ok(None);
    }

    // Drain headers so the client sees a clean response
    for _ in 0..MAX_HEADER_LINES {
        let mut line = String::new();
        let read = tokio::time::timeout(REQUEST_READ_TIMEOUT, reader.read_line(&mut line))
            .await
            .map_err(|_| GmailError::NetworkError("timed out reading headers".to_string()))??;
        if read == 0 || line.trim_end().is_empty() {
            break;
        }
    }

    let target = request_line.split_whitespace().nth(1).unwrap_or("/");
    let event = classify_request(target, expected_state);

    let (status, reason) = event.status();
    let body = event.body();
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len(),
    );

    let mut stream = reader.into_inner();
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    let _ = stream.shutdown().await;

    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_code_with_matching_state() {
        assert_eq!(
            classify_request("/?state=st1&code=abc123", "st1"),
            CallbackEvent::Code("abc123".to_string())
        );
    }

    #[test]
    fn classify_decodes_percent_encoding() {
        assert_eq!(
            classify_request("/?code=4%2F0Ab%20c&state=st1", "st1"),
            CallbackEvent::Code("4/0Ab c".to_string())
        );
    }

    #[test]
    fn classify_favicon_before_state_check() {
        assert_eq!(
            classify_request("/favicon.ico", "st1"),
            CallbackEvent::FaviconProbe
        );
    }

    #[test]
    fn classify_state_mismatch() {
        assert_eq!(
            classify_request("/?state=other&code=abc", "st1"),
            CallbackEvent::StateMismatch {
                received: Some("other".to_string())
            }
        );
        assert_eq!(
            classify_request("/?code=abc", "st1"),
            CallbackEvent::StateMismatch { received: None }
        );
    }

    #[test]
    fn classify_provider_error() {
        assert_eq!(
            classify_request("/?state=st1&error=access_denied", "st1"),
            CallbackEvent::ProviderError("access_denied".to_string())
        );
    }

    #[test]
    fn classify_missing_or_empty_code() {
        assert_eq!(classify_request("/?state=st1", "st1"), CallbackEvent::MissingCode);
        assert_eq!(
            classify_request("/?state=st1&code=", "st1"),
            CallbackEvent::MissingCode
        );
    }

    #[test]
    fn only_terminal_events_produce_outcomes() {
        assert!(CallbackEvent::FaviconProbe.into_outcome().is_none());
        assert!(CallbackEvent::MissingCode.into_outcome().is_none());
        assert!(matches!(
            CallbackEvent::Code("c".to_string()).into_outcome(),
            Some(Ok(code)) if code == "c"
        ));
        assert!(matches!(
            CallbackEvent::StateMismatch { received: None }.into_outcome(),
            Some(Err(GmailError::AuthError(_)))
        ));
    }

    #[tokio::test]
    async fn redirect_uri_uses_bound_port() {
        let listener = CallbackListener::bind("st1").await.unwrap();
        let addr = listener.local_addr();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
        assert_eq!(listener.redirect_uri(), format!("http://127.0.0.1:{}", addr.port()));
    }
}
