use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::bridge::WolframBridge;
use crate::handlers;
use crate::protocol::{CancelledParams, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};

/// Maximum bytes per JSON-RPC message (1 MiB).
const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// In-flight `tools/call` requests: id to (call serial, cancel token).
type InFlight = Arc<Mutex<HashMap<RpcId, (u64, CancellationToken)>>>;

/// MCP server that communicates over stdio using newline-delimited JSON-RPC 2.0.
///
/// `tools/call` requests run on their own tasks; everything else is
/// answered inline. All responses go through one writer task.
pub struct McpServer {
    bridge: Arc<WolframBridge>,
    initialized: bool,
    shutdown: CancellationToken,
    in_flight: InFlight,
    next_call: u64,
    drain_grace: Option<Duration>,
}

impl McpServer {
    pub fn new(bridge: Arc<WolframBridge>) -> Self {
        Self {
            bridge,
            initialized: false,
            shutdown: CancellationToken::new(),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_call: 0,
            drain_grace: None,
        }
    }

    /// Bound how long calls received before EOF may keep running. Without
    /// it the server waits for them, which the engine client's own
    /// timeouts already bound.
    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = Some(grace);
        self
    }

    /// Cancelling this token stops the read loop and abandons every
    /// in-flight tool call. EOF on input alone does not cancel it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, shutting down");
                shutdown.cancel();
            }
        });

        self.serve(tokio::io::stdin(), tokio::io::stdout()).await?;
        Ok(())
    }

    /// Serve until EOF or shutdown, then return the output sink.
    pub async fn serve<R, W>(&mut self, input: R, output: W) -> Result<W, Box<dyn std::error::Error>>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
        let writer = tokio::spawn(write_loop(output, out_rx));

        let (line_tx, mut line_rx) = mpsc::channel::<std::io::Result<Vec<u8>>>(16);
        let reader = tokio::spawn(read_loop(input, line_tx));

        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join(joined),
                line = line_rx.recv() => match line {
                    Some(Ok(raw)) => self.handle_line(&raw, &out_tx, &mut tasks).await,
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "failed to read from input");
                        break;
                    }
                    None => break,
                },
            }
        }

        // Input closed: received calls still get their answers, unless
        // shutdown is requested or the drain grace period runs out.
        let grace = self.drain_grace;
        let deadline = async move {
            match grace {
                Some(grace) => tokio::time::sleep(grace).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = &mut deadline => {
                    tracing::warn!(in_flight = tasks.len(), "drain grace period elapsed, cancelling");
                    self.shutdown.cancel();
                    break;
                }
                joined = tasks.join_next() => match joined {
                    Some(joined) => log_join(joined),
                    None => break,
                },
            }
        }

        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
        reader.abort();
        drop(out_tx);

        Ok(writer.await??)
    }

    async fn handle_line(
        &mut self,
        raw: &[u8],
        out: &mpsc::UnboundedSender<JsonRpcResponse>,
        tasks: &mut JoinSet<()>,
    ) {
        if raw.len() > MAX_MESSAGE_BYTES {
            tracing::warn!(bytes = raw.len(), limit = MAX_MESSAGE_BYTES, "message too large");
            send(out, JsonRpcResponse::error(None, JsonRpcError::parse_error()));
            return;
        }

        let trimmed = match std::str::from_utf8(raw) {
            Ok(s) => s.trim(),
            Err(_) => {
                send(out, JsonRpcResponse::error(None, JsonRpcError::parse_error()));
                return;
            }
        };

        if trimmed.is_empty() {
            return;
        }

        let req: JsonRpcRequest = match serde_json::from_str(trimmed) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "parse error");
                send(out, JsonRpcResponse::error(None, JsonRpcError::parse_error()));
                return;
            }
        };

        // Validate jsonrpc version
        if req.jsonrpc != "2.0" {
            send(out, JsonRpcResponse::error(req.id.clone(), JsonRpcError::invalid_request()));
            return;
        }

        // Initialization gate: only `initialize` is allowed before handshake completes
        if !self.initialized && req.method != "initialize" {
            if req.id.is_some() {
                send(
                    out,
                    JsonRpcResponse::error(
                        req.id.clone(),
                        JsonRpcError::invalid_request_with("Server not initialized"),
                    ),
                );
            }
            return;
        }

        if req.method == "notifications/cancelled" {
            self.cancel_request(&req);
            return;
        }

        if req.method == "tools/call" {
            self.spawn_tool_call(req, out.clone(), tasks);
            return;
        }

        let resp = handlers::dispatch(&req, &self.bridge, self.shutdown.child_token()).await;
        if let Some(resp) = resp {
            send(out, resp);
        }

        if req.method == "initialize" {
            self.initialized = true;
        }
    }

    fn cancel_request(&self, req: &JsonRpcRequest) {
        let params: CancelledParams = match req
            .params
            .clone()
            .map(serde_json::from_value)
            .transpose()
        {
            Ok(Some(p)) => p,
            _ => {
                tracing::debug!("ignoring malformed cancellation notice");
                return;
            }
        };

        let entry = lock(&self.in_flight).remove(&params.request_id);
        if let Some((_, token)) = entry {
            tracing::debug!(request_id = ?params.request_id, reason = ?params.reason, "request cancelled by client");
            token.cancel();
        }
    }

    fn spawn_tool_call(
        &mut self,
        req: JsonRpcRequest,
        out: mpsc::UnboundedSender<JsonRpcResponse>,
        tasks: &mut JoinSet<()>,
    ) {
        let token = self.shutdown.child_token();
        let serial = self.next_call;
        self.next_call += 1;

        if let Some(id) = &req.id {
            let mut in_flight = lock(&self.in_flight);
            if in_flight.contains_key(id) {
                drop(in_flight);
                tracing::warn!(request_id = ?id, "duplicate in-flight request id");
                send(
                    &out,
                    JsonRpcResponse::error(
                        req.id.clone(),
                        JsonRpcError::invalid_request_with("Request id is already in flight"),
                    ),
                );
                return;
            }
            in_flight.insert(id.clone(), (serial, token.clone()));
        }

        let bridge = Arc::clone(&self.bridge);
        let in_flight = Arc::clone(&self.in_flight);

        tasks.spawn(async move {
            let resp = handlers::dispatch(&req, &bridge, token).await;

            // No id: sent as a notification. Entry gone or owned by a later
            // call with the same id: this call was cancelled by the client.
            let tracked = match &req.id {
                Some(id) => {
                    let mut in_flight = lock(&in_flight);
                    let owned = matches!(in_flight.get(id), Some((owner, _)) if *owner == serial);
                    if owned {
                        in_flight.remove(id);
                    }
                    owned
                }
                None => false,
            };
            if !tracked {
                return;
            }
            if let Some(resp) = resp {
                send(&out, resp);
            }
        });
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "tool call task failed");
    }
}

fn lock(in_flight: &InFlight) -> std::sync::MutexGuard<'_, HashMap<RpcId, (u64, CancellationToken)>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

fn send(out: &mpsc::UnboundedSender<JsonRpcResponse>, resp: JsonRpcResponse) {
    if out.send(resp).is_err() {
        tracing::warn!("output closed, dropping response");
    }
}

async fn read_loop<R>(input: R, lines: mpsc::Sender<std::io::Result<Vec<u8>>>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(input);
    loop {
        let mut raw = Vec::new();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) => break,
            Ok(_) => {
                if lines.send(Ok(raw)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = lines.send(Err(e)).await;
                break;
            }
        }
    }
}

async fn write_loop<W>(
    mut output: W,
    mut responses: mpsc::UnboundedReceiver<JsonRpcResponse>,
) -> std::io::Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(resp) = responses.recv().await {
        let out = serde_json::to_string(&resp)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        output.write_all(out.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(output)
}
