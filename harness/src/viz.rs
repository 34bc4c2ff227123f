//! Visualization endpoint: a static d3 page at `/` and a JSON graph of
//! node 0's diagnostic peer view at `/data`.

use std::convert::Infallible;
use std::sync::Arc;

use drover_lib::diag::DiagSnapshot;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{
    body::Bytes,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use log::{error, info};
use serde_json::json;
use tokio::net::TcpListener;

use crate::commands::NETWORK_DEADLINE;
use crate::error::HarnessError;
use crate::Harness;

static INDEX_HTML: &str = include_str!("../static/index.html");

/// Render a snapshot as the `{nodes, links}` shape d3's force layout
/// consumes, with links expressed as indices into the node list.
pub fn d3_graph(snapshot: &DiagSnapshot) -> serde_json::Value {
    let index_of: std::collections::HashMap<&str, usize> = snapshot
        .peers
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id.as_str(), i))
        .collect();

    let nodes: Vec<_> = snapshot
        .peers
        .iter()
        .map(|p| json!({ "id": p.id, "address": p.address }))
        .collect();

    let mut links = Vec::new();
    for (i, peer) in snapshot.peers.iter().enumerate() {
        for connection in &peer.connections {
            if let Some(&j) = index_of.get(connection.as_str()) {
                if i < j {
                    links.push(json!({ "source": i, "target": j }));
                }
            }
        }
    }

    json!({ "nodes": nodes, "links": links })
}

fn format_response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static(content_type),
    );
    response
}

fn not_found() -> Response<Full<Bytes>> {
    format_response(
        StatusCode::NOT_FOUND,
        "application/json",
        json!({ "error": "Not Found" }).to_string(),
    )
}

async fn graph_data(harness: &Arc<Harness>) -> Response<Full<Bytes>> {
    let snapshot = match harness.node(0).await {
        Ok(node) => node.diagnostics(NETWORK_DEADLINE).await,
        Err(e) => {
            return format_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "application/json",
                json!({ "error": e.to_string() }).to_string(),
            )
        }
    };

    match snapshot {
        Ok(snapshot) => format_response(
            StatusCode::OK,
            "application/json",
            d3_graph(&snapshot).to_string(),
        ),
        Err(e) => format_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "application/json",
            json!({ "error": e.to_string() }).to_string(),
        ),
    }
}

async fn handler(
    harness: Arc<Harness>,
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/") => Ok(format_response(
            StatusCode::OK,
            "text/html",
            INDEX_HTML,
        )),
        (&Method::GET, "/data") => Ok(graph_data(&harness).await),
        _ => Ok(not_found()),
    }
}

/// Serve until the harness's cancellation token fires.
pub async fn run(harness: Arc<Harness>, addr: String) -> Result<(), HarnessError> {
    let listener = TcpListener::bind(&addr).await?;
    info!("visualization server listening on http://{addr}");

    loop {
        let accepted = tokio::select! {
            _ = harness.cancel.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted,
        };
        let (tcp, _) = accepted?;
        let io = TokioIo::new(tcp);
        let harness = harness.clone();
        tokio::task::spawn(async move {
            let service = service_fn(move |req| handler(harness.clone(), req));
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                error!("error serving visualization connection: {err:?}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_lib::diag::DiagPeer;

    #[test]
    fn d3_graph_links_are_deduplicated_index_pairs() {
        let snapshot = DiagSnapshot {
            self_id: "aa".to_string(),
            peers: vec![
                DiagPeer {
                    id: "aa".to_string(),
                    address: "127.0.0.1:10000".to_string(),
                    control_address: None,
                    connections: vec!["bb".to_string()],
                },
                DiagPeer {
                    id: "bb".to_string(),
                    address: "127.0.0.1:10001".to_string(),
                    control_address: None,
                    connections: vec!["aa".to_string()],
                },
            ],
        };

        let graph = d3_graph(&snapshot);
        assert_eq!(graph["nodes"].as_array().unwrap().len(), 2);
        let links = graph["links"].as_array().unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0]["source"], 0);
        assert_eq!(links[0]["target"], 1);
    }
}
