//! Canned Azure-style upstream for manual palace-rs runs.
//!
//! Serves the chat-completions SSE stream, the embeddings endpoint, and the
//! vector-store RPC, so a local palace-rs can be pointed entirely at this
//! process. `MOCK_SCENARIO` selects how the completion stream terminates.

use std::convert::Infallible;
use std::env;
use std::sync::Arc;

use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

const DEFAULT_UPSTREAM_PORT: u16 = 19_101;

#[derive(Copy, Clone)]
enum MockScenario {
    /// Deltas, then a finish_reason frame, then `[DONE]`.
    Text,
    /// Deltas terminated by finish_reason only, no sentinel.
    FinishOnly,
    /// Deltas with no termination signal at all (exercises the idle grace).
    Silent,
    /// A corrupt payload mid-stream.
    Malformed,
    /// A non-2xx response before any streaming.
    Error,
}

struct MockState {
    scenario: MockScenario,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env_u16("UPSTREAM_PORT", DEFAULT_UPSTREAM_PORT);
    let scenario = parse_scenario();
    let state = Arc::new(MockState { scenario });

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind mock upstream on 127.0.0.1:{port}: {err}"));

    let conn_builder = AutoBuilder::new(TokioExecutor::new());

    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok((stream, remote_addr)) => (stream, remote_addr),
            Err(err) => {
                eprintln!("accept error: {err}");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let service_state = Arc::clone(&state);
        let service = service_fn(move |request: Request<Incoming>| {
            let state_ref = Arc::clone(&service_state);
            async move { Ok::<_, Infallible>(handle_request(request, &state_ref).await) }
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, service).await {
                eprintln!("mock upstream connection error from {remote_addr}: {err}");
            }
        });
    }
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn parse_scenario() -> MockScenario {
    match env::var("MOCK_SCENARIO").as_deref() {
        Ok("finish_only") => MockScenario::FinishOnly,
        Ok("silent") => MockScenario::Silent,
        Ok("malformed") => MockScenario::Malformed,
        Ok("error") => MockScenario::Error,
        Ok("text") | Err(_) => MockScenario::Text,
        Ok(other) => {
            eprintln!("unknown MOCK_SCENARIO '{other}', fallback to text");
            MockScenario::Text
        }
    }
}

async fn handle_request(
    request: Request<Incoming>,
    state: &Arc<MockState>,
) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    drain_request_body(body).await;

    let path = parts.uri.path();
    if parts.method != Method::POST {
        return simple_response_static(
            StatusCode::METHOD_NOT_ALLOWED,
            "application/json",
            br#"{"error":"method_not_allowed"}"#,
        );
    }

    if path.starts_with("/openai/deployments/") && path.ends_with("/chat/completions") {
        return completion_response(state.scenario);
    }
    if path.starts_with("/openai/deployments/") && path.ends_with("/embeddings") {
        return simple_response_static(StatusCode::OK, "application/json", EMBEDDING_BODY);
    }
    if path.starts_with("/rest/v1/rpc/") {
        return simple_response_static(StatusCode::OK, "application/json", STORE_ROWS);
    }

    simple_response_static(
        StatusCode::NOT_FOUND,
        "application/json",
        br#"{"error":"not_found"}"#,
    )
}

async fn drain_request_body(mut body: Incoming) {
    while let Some(frame_result) = body.frame().await {
        if frame_result.is_err() {
            break;
        }
    }
}

fn completion_response(scenario: MockScenario) -> Response<Full<Bytes>> {
    let body: &'static [u8] = match scenario {
        MockScenario::Text => STREAM_TEXT,
        MockScenario::FinishOnly => STREAM_FINISH_ONLY,
        MockScenario::Silent => STREAM_SILENT,
        MockScenario::Malformed => STREAM_MALFORMED,
        MockScenario::Error => {
            return simple_response_static(
                StatusCode::SERVICE_UNAVAILABLE,
                "application/json",
                br#"{"error":{"message":"mock injected error","type":"server_error"}}"#,
            );
        }
    };
    let mut response = simple_response_static(StatusCode::OK, "text/event-stream", body);
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn simple_response_static(
    status: StatusCode,
    content_type: &'static str,
    body: &'static [u8],
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

const STREAM_TEXT: &[u8] = b"data: {\"id\":\"chatcmpl-mock\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"The method \"},\"finish_reason\":null}]}\n\ndata: {\"id\":\"chatcmpl-mock\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"of loci.\"},\"finish_reason\":null}]}\n\ndata: {\"id\":\"chatcmpl-mock\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\ndata: [DONE]\n\n";
const STREAM_FINISH_ONLY: &[u8] = b"data: {\"id\":\"chatcmpl-mock\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"finish only\"},\"finish_reason\":null}]}\n\ndata: {\"id\":\"chatcmpl-mock\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n";
const STREAM_SILENT: &[u8] = b"data: {\"id\":\"chatcmpl-mock\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"no terminator\"},\"finish_reason\":null}]}\n\n";
const STREAM_MALFORMED: &[u8] = b"data: {\"id\":\"chatcmpl-mock\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"before \"},\"finish_reason\":null}]}\n\ndata: {corrupt\n\ndata: [DONE]\n\n";

const EMBEDDING_BODY: &[u8] = br#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.01,0.02,0.03,0.04]}],"model":"ada"}"#;
const STORE_ROWS: &[u8] = br#"[{"content_title":"On Memory","content_url":"https://example.com/on-memory","content_date":"2021-04-01","content":"A memory palace is a spatial mnemonic technique.","content_length":47,"content_tokens":10}]"#;
