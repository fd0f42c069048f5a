//! Per-connection session task.
//!
//! Each accepted connection runs one of these from accept to transport
//! death. The connection starts unauthorized, may become authorized, and
//! may then be repurposed as a pure event sink — at which point it
//! leaves the request loop for good. Any transport fault destroys the
//! connection; its sink registration (if any) goes with it.

use std::sync::Arc;

use confab_core::{AuthToken, Gid, UserGid, WireError};
use confab_proto::inquiries::methods;
use confab_proto::{Request, Response, Transport, TransportError};
use metrics::{counter, gauge};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::context::ServerContext;
use crate::fanout::SinkHandle;
use crate::registry::{Call, MethodRegistry};

/// Authorization state, fixed forward-only per connection.
enum SessionState {
    Unauthorized,
    Authorized(UserGid),
}

/// Decision of the request loop: keep serving, or hand the connection to
/// the sink loop under the given identity.
enum LoopExit {
    Dead,
    BecomeSink(UserGid),
}

/// Drive one connection from accept to death.
#[instrument(skip_all, fields(session = %Gid::new()))]
pub async fn run_session(
    mut transport: Box<dyn Transport>,
    ctx: Arc<ServerContext>,
    registry: Arc<MethodRegistry>,
    event_buffer: usize,
    shutdown: CancellationToken,
) {
    counter!("sessions_total").increment(1);
    gauge!("sessions_active").increment(1.0);
    info!("session started");

    let exit = request_loop(transport.as_mut(), &ctx, &registry, &shutdown).await;

    if let LoopExit::BecomeSink(user) = exit {
        sink_loop(transport.as_mut(), &ctx, user, event_buffer, &shutdown).await;
    }

    let _ = transport.close().await;
    gauge!("sessions_active").decrement(1.0);
    info!("session ended");
}

/// Serve requests until the transport dies, the server shuts down, or
/// the connection declares itself an event sink.
async fn request_loop(
    transport: &mut dyn Transport,
    ctx: &ServerContext,
    registry: &MethodRegistry,
    shutdown: &CancellationToken,
) -> LoopExit {
    let mut state = SessionState::Unauthorized;

    loop {
        let incoming = tokio::select! {
            () = shutdown.cancelled() => return LoopExit::Dead,
            received = transport.receive_value() => match received {
                Ok(value) => value,
                Err(error) => {
                    session_fault(&error);
                    return LoopExit::Dead;
                }
            },
        };

        let request: Request = match serde_json::from_value(incoming) {
            Ok(request) => request,
            Err(error) => {
                warn!(%error, "unparseable request frame");
                // No usable id; answer with a placeholder so the peer can
                // at least observe the rejection.
                if send(transport, Response::error("unknown", &WireError::Syntax))
                    .await
                    .is_err()
                {
                    return LoopExit::Dead;
                }
                continue;
            }
        };

        debug!(method = %request.method, id = %request.id, "dispatching request");

        let step = match request.method.as_str() {
            methods::AUTHORIZE => handle_authorize(&mut state, &request, ctx),
            methods::LOGIN => handle_login(&state, &request, ctx),
            methods::CREATE_ACCOUNT => handle_create_account(&state, &request, ctx),
            _ => {
                match handle_business(transport, &state, &request, ctx, registry).await {
                    Ok(step) => step,
                    Err(error) => {
                        session_fault(&error);
                        return LoopExit::Dead;
                    }
                }
            }
        };

        match step {
            Step::Respond(response) => {
                if send(transport, response).await.is_err() {
                    return LoopExit::Dead;
                }
            }
            Step::RespondThenRaw(response, raw) => {
                if send(transport, response).await.is_err() {
                    return LoopExit::Dead;
                }
                if transport.send_raw(&raw).await.is_err() {
                    return LoopExit::Dead;
                }
            }
            Step::RespondThenSink(response, user) => {
                if send(transport, response).await.is_err() {
                    return LoopExit::Dead;
                }
                return LoopExit::BecomeSink(user);
            }
        }
    }
}

/// What one handled request does to the connection.
enum Step {
    Respond(Response),
    RespondThenRaw(Response, bytes::Bytes),
    RespondThenSink(Response, UserGid),
}

fn handle_authorize(state: &mut SessionState, request: &Request, ctx: &ServerContext) -> Step {
    // Roles are fixed at authorization; re-authorizing a live session is
    // not a thing.
    if matches!(state, SessionState::Authorized(_)) {
        return Step::Respond(Response::error(&request.id, &WireError::Restricted));
    }

    let params = request.params.as_ref();
    let Some(token) = params.and_then(|p| p.get("token")).and_then(Value::as_str) else {
        return Step::Respond(Response::error(&request.id, &WireError::Syntax));
    };
    let as_event_sink = params
        .and_then(|p| p.get("asEventSink"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    match ctx.directory.authorize(&AuthToken::from(token)) {
        Ok(user) => {
            let response = Response::success(&request.id, json!({"user": user}));
            if as_event_sink {
                info!(%user, "connection authorized as event sink");
                Step::RespondThenSink(response, user)
            } else {
                info!(%user, "connection authorized");
                *state = SessionState::Authorized(user);
                Step::Respond(response)
            }
        }
        Err(error) => Step::Respond(Response::error(&request.id, &error)),
    }
}

fn handle_login(state: &SessionState, request: &Request, ctx: &ServerContext) -> Step {
    account_op(state, request, |name, secret| ctx.directory.login(name, secret))
}

fn handle_create_account(state: &SessionState, request: &Request, ctx: &ServerContext) -> Step {
    account_op(state, request, |name, secret| {
        ctx.directory.create_account(name, secret)
    })
}

fn account_op(
    state: &SessionState,
    request: &Request,
    op: impl FnOnce(&str, &str) -> Result<(UserGid, AuthToken), WireError>,
) -> Step {
    // Credential operations belong to fresh connections only.
    if matches!(state, SessionState::Authorized(_)) {
        return Step::Respond(Response::error(&request.id, &WireError::Restricted));
    }
    let params = request.params.as_ref();
    let name = params.and_then(|p| p.get("name")).and_then(Value::as_str);
    let secret = params.and_then(|p| p.get("secret")).and_then(Value::as_str);
    let (Some(name), Some(secret)) = (name, secret) else {
        return Step::Respond(Response::error(&request.id, &WireError::Syntax));
    };

    match op(name, secret) {
        Ok((user, token)) => Step::Respond(Response::success(
            &request.id,
            json!({"user": user, "token": token}),
        )),
        Err(error) => Step::Respond(Response::error(&request.id, &error)),
    }
}

/// Run a registry method, honoring the auxiliary drain contract.
///
/// A declared auxiliary payload is drained *before* the business outcome
/// is consulted — even for a caller about to be rejected — because the
/// bytes are already committed to the stream. Only transport faults
/// escape as errors; everything else becomes a response.
async fn handle_business(
    transport: &mut dyn Transport,
    state: &SessionState,
    request: &Request,
    ctx: &ServerContext,
    registry: &MethodRegistry,
) -> Result<Step, TransportError> {
    let aux = match registry.aux_size(&request.method, request.params.as_ref()) {
        None => None,
        Some(Ok(size)) => Some(transport.receive_raw(size).await?),
        Some(Err(error)) => {
            // The announcement itself is malformed: there is no size to
            // drain, so reject and let the next read surface the desync
            // if the peer actually sent bytes.
            return Ok(Step::Respond(Response::error(&request.id, &error)));
        }
    };

    let SessionState::Authorized(user) = state else {
        counter!("requests_rejected_unauthorized_total").increment(1);
        return Ok(Step::Respond(Response::error(
            &request.id,
            &WireError::Restricted,
        )));
    };

    let call = Call {
        user: *user,
        params: request.params.clone(),
        aux,
    };
    match registry.dispatch(&request.method, call, ctx).await {
        Ok(reply) => {
            let response = Response::success(&request.id, reply.value);
            Ok(match reply.raw {
                Some(raw) => Step::RespondThenRaw(response, raw),
                None => Step::Respond(response),
            })
        }
        Err(error) => Ok(Step::Respond(Response::error(&request.id, &error))),
    }
}

/// Forward roster events to the transport until either side dies.
///
/// A sink sends nothing upstream and is never read from again; its death
/// is observed as a send failure and removes exactly this registration.
async fn sink_loop(
    transport: &mut dyn Transport,
    ctx: &ServerContext,
    user: UserGid,
    event_buffer: usize,
    shutdown: &CancellationToken,
) {
    let sink_id = Gid::new();
    let (tx, mut rx) = mpsc::channel(event_buffer);
    ctx.roster.register(user, SinkHandle::new(sink_id, tx));
    gauge!("event_sinks_active").increment(1.0);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            received = rx.recv() => {
                let Some(event) = received else { break };
                let encoded = match serde_json::to_value(&event) {
                    Ok(encoded) => encoded,
                    Err(error) => {
                        warn!(%error, "unencodable event, skipping");
                        continue;
                    }
                };
                if let Err(error) = transport.send_value(&encoded).await {
                    session_fault(&error);
                    break;
                }
            }
        }
    }

    ctx.roster.deregister(user, sink_id);
    gauge!("event_sinks_active").decrement(1.0);
}

async fn send(transport: &mut dyn Transport, response: Response) -> Result<(), TransportError> {
    let encoded = serde_json::to_value(&response)
        .map_err(|e| TransportError::Codec(e.to_string()))?;
    transport.send_value(&encoded).await
}

fn session_fault(error: &TransportError) {
    if matches!(error, TransportError::Closed) {
        debug!("peer closed the connection");
    } else {
        warn!(%error, "transport fault, destroying connection");
    }
    counter!("session_transport_faults_total").increment(1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
