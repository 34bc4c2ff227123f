//! Command dispatch: resolve `<range> <verb> [args]` into handler
//! invocations against the selected controllers, sequentially or on
//! one task per index.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use drover_lib::keys::parse_peer_id;
use drover_lib::short_id;
use drover_node::NodeHandle;
use log::{error, info};
use tokio::time::timeout;

use crate::error::HarnessError;
use crate::range::parse_range;
use crate::viz::d3_graph;
use crate::Harness;

/// Deadline for every network-involving verb, measured from the moment
/// that handler invocation begins.
pub const NETWORK_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Strict index-list order; a failure is reported and dispatch
    /// continues with the next index.
    Sync,
    /// `go`: one task per index, fire-and-forget; errors surface on the
    /// log sink only.
    Spawn,
    /// `gowait`: one task per index plus a join barrier; the caller
    /// resumes only after every unit has finished, in any order.
    SpawnWait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Continue,
    Quit,
}

pub struct IndexResult {
    pub index: usize,
    pub result: Result<String, HarnessError>,
}

/// Context handed to every verb handler: the live node it addresses,
/// its argument tokens, and the harness for fixtures, stats and
/// `$index` identity lookups.
pub struct CmdCtx {
    pub harness: Arc<Harness>,
    pub index: usize,
    pub node: Arc<dyn NodeHandle>,
    pub args: Vec<String>,
}

type CmdFuture = Pin<Box<dyn Future<Output = Result<String, HarnessError>> + Send>>;
type CmdFn = fn(CmdCtx) -> CmdFuture;

/// The verb registry. Lifecycle verbs (`start`, `kill`) are resolved
/// against the controller instead and handled in `run_one`.
fn lookup(verb: &str) -> Option<CmdFn> {
    let handler: CmdFn = match verb {
        "put" => |ctx| Box::pin(put(ctx)),
        "get" => |ctx| Box::pin(get(ctx)),
        "store" => |ctx| Box::pin(store(ctx)),
        "provide" => |ctx| Box::pin(provide(ctx)),
        "findprov" => |ctx| Box::pin(findprov(ctx)),
        "findpeer" => |ctx| Box::pin(findpeer(ctx)),
        "diag" => |ctx| Box::pin(diag(ctx)),
        "add" => |ctx| Box::pin(add(ctx)),
        "readfile" => |ctx| Box::pin(readfile(ctx)),
        "bandwidth" => |ctx| Box::pin(bandwidth(ctx)),
        _ => return None,
    };
    Some(handler)
}

fn is_known_verb(verb: &str) -> bool {
    matches!(verb, "start" | "kill") || lookup(verb).is_some()
}

/// Execute one already-trimmed command line. Per-index errors are
/// reported here and never abort the line; only `expect` failures
/// propagate as fatal.
pub async fn run_line(harness: &Arc<Harness>, line: &str) -> Result<LineOutcome, HarnessError> {
    let mut parts: Vec<String> = line.split_whitespace().map(str::to_string).collect();
    let Some(first) = parts.first() else {
        return Ok(LineOutcome::Continue);
    };

    if first == "quit" {
        return Ok(LineOutcome::Quit);
    }

    let mode = match first.as_str() {
        "go" => {
            parts.remove(0);
            Mode::Spawn
        }
        "gowait" => {
            parts.remove(0);
            Mode::SpawnWait
        }
        _ => Mode::Sync,
    };

    let Some(first) = parts.first().cloned() else {
        return Err(HarnessError::ArgCount("go <range> <verb> [args...]"));
    };

    if first == "expect" {
        if mode != Mode::Sync {
            return Err(HarnessError::Parse(
                "expect always runs synchronously and cannot follow go/gowait".to_string(),
            ));
        }
        expect(harness, parts.get(1..).unwrap_or_default()).await?;
        println!("expectation held");
        return Ok(LineOutcome::Continue);
    }

    if let Some(name) = first.strip_prefix('@') {
        return fixture_op(harness, name, parts.get(1..).unwrap_or_default())
            .map(|_| LineOutcome::Continue);
    }

    if first == "sleep" {
        let secs = parts
            .get(1)
            .ok_or(HarnessError::ArgCount("sleep <seconds>"))?
            .parse::<u64>()
            .map_err(|e| HarnessError::Parse(e.to_string()))?;
        info!("sleeping for {} seconds", secs);
        tokio::time::sleep(Duration::from_secs(secs)).await;
        return Ok(LineOutcome::Continue);
    }

    let indices = parse_range(&first)?;
    let verb = parts
        .get(1)
        .ok_or(HarnessError::ArgCount("<range> <verb> [args...]"))?
        .to_lowercase();
    if !is_known_verb(&verb) {
        return Err(HarnessError::UnrecognizedCommand(verb));
    }
    let args: Vec<String> = parts.get(2..).unwrap_or_default().to_vec();

    for result in dispatch(harness, indices, &verb, args, mode).await {
        report(&result);
    }
    Ok(LineOutcome::Continue)
}

fn report(result: &IndexResult) {
    match &result.result {
        Ok(output) if !output.is_empty() => println!("{output}"),
        Ok(_) => {}
        Err(e) => error!("node {}: {}", result.index, e),
    }
}

/// Resolve the verb against each index. Duplicated indices invoke the
/// handler multiple times; out-of-range indices fail individually
/// without touching their siblings.
pub async fn dispatch(
    harness: &Arc<Harness>,
    indices: Vec<usize>,
    verb: &str,
    args: Vec<String>,
    mode: Mode,
) -> Vec<IndexResult> {
    match mode {
        Mode::Sync => {
            let mut results = Vec::with_capacity(indices.len());
            for index in indices {
                let result = run_one(harness, index, verb, &args).await;
                results.push(IndexResult { index, result });
            }
            results
        }
        Mode::Spawn | Mode::SpawnWait => {
            let mut handles = Vec::with_capacity(indices.len());
            for index in indices {
                let harness = harness.clone();
                let verb = verb.to_string();
                let args = args.clone();
                handles.push((
                    index,
                    tokio::spawn(async move {
                        run_one(&harness, index, &verb, &args).await
                    }),
                ));
            }

            if mode == Mode::Spawn {
                // Fire-and-forget: completions land on the log sink.
                for (index, handle) in handles {
                    tokio::spawn(async move {
                        match handle.await {
                            Ok(result) => report(&IndexResult { index, result }),
                            Err(e) => error!("node {index}: task panicked: {e}"),
                        }
                    });
                }
                return Vec::new();
            }

            let mut results = Vec::with_capacity(handles.len());
            for (index, handle) in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(HarnessError::Parse(format!("task panicked: {e}"))),
                };
                results.push(IndexResult { index, result });
            }
            results
        }
    }
}

async fn run_one(
    harness: &Arc<Harness>,
    index: usize,
    verb: &str,
    args: &[String],
) -> Result<String, HarnessError> {
    let controller = harness.controller(index)?;
    match verb {
        "start" => {
            controller.start(&harness.network).await?;
            Ok(format!("node {index} started"))
        }
        "kill" => {
            controller.kill().await?;
            Ok(format!("node {index} killed"))
        }
        _ => {
            let node = controller.handle().await?;
            let handler =
                lookup(verb).ok_or_else(|| HarnessError::UnrecognizedCommand(verb.to_string()))?;
            handler(CmdCtx {
                harness: harness.clone(),
                index,
                node,
                args: args.to_vec(),
            })
            .await
        }
    }
}

/// `expect <range> <verb> [args...]`: run the command and assert it
/// holds; `expect ... get key value` compares the fetched value to the
/// inline literal. Any failure is fatal to the run.
async fn expect(harness: &Arc<Harness>, parts: &[String]) -> Result<(), HarnessError> {
    let range = parts
        .first()
        .ok_or(HarnessError::ArgCount("expect <range> <verb> [args...]"))?;
    let verb = parts
        .get(1)
        .ok_or(HarnessError::ArgCount("expect <range> <verb> [args...]"))?
        .to_lowercase();

    for index in parse_range(range)? {
        if verb == "get" {
            let key = parts
                .get(2)
                .ok_or(HarnessError::ArgCount("expect <range> get <key> <value>"))?;
            let expected = parts
                .get(3)
                .ok_or(HarnessError::ArgCount("expect <range> get <key> <value>"))?;

            let node = harness.node(index).await.map_err(|e| {
                HarnessError::ExpectationFailed(format!("node {index}: {e}"))
            })?;
            let value = timeout(NETWORK_DEADLINE, node.get_value(key))
                .await
                .map_err(|_| HarnessError::Timeout)
                .and_then(|r| r.map_err(HarnessError::from))
                .map_err(|e| {
                    HarnessError::ExpectationFailed(format!("get '{key}' on node {index}: {e}"))
                })?;
            let value = String::from_utf8_lossy(&value);
            if value != *expected {
                return Err(HarnessError::ExpectationFailed(format!(
                    "expected '{expected}' for '{key}' on node {index} but got '{value}'"
                )));
            }
        } else {
            let args: Vec<String> = parts.get(2..).unwrap_or_default().to_vec();
            match run_one(harness, index, &verb, &args).await {
                Ok(output) => {
                    if !output.is_empty() {
                        println!("{output}");
                    }
                }
                Err(e) => {
                    return Err(HarnessError::ExpectationFailed(format!(
                        "{verb} on node {index}: {e}"
                    )));
                }
            }
        }
    }
    Ok(())
}

/// `@<name> make <size>`: generate a fixture payload.
fn fixture_op(harness: &Arc<Harness>, name: &str, parts: &[String]) -> Result<(), HarnessError> {
    match parts.first().map(String::as_str) {
        Some("make") => {
            let size = parts
                .get(1)
                .ok_or(HarnessError::ArgCount("@<name> make <size>"))?
                .parse::<usize>()
                .map_err(|e| HarnessError::Parse(e.to_string()))?;
            harness.fixtures.create(name, size);
            println!("created fixture '{name}' ({size} bytes)");
            Ok(())
        }
        Some(op) => Err(HarnessError::UnrecognizedCommand(format!(
            "fixture operation '{op}'"
        ))),
        None => Err(HarnessError::ArgCount("@<name> make <size>")),
    }
}

async fn bounded<T>(
    fut: impl Future<Output = Result<T, drover_node::NodeError>>,
) -> Result<T, HarnessError> {
    match timeout(NETWORK_DEADLINE, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(HarnessError::Timeout),
    }
}

async fn put(ctx: CmdCtx) -> Result<String, HarnessError> {
    let (key, value) = match (ctx.args.first(), ctx.args.get(1)) {
        (Some(k), Some(v)) => (k.clone(), v.clone()),
        _ => return Err(HarnessError::ArgCount("<range> put <key> <value>")),
    };
    bounded(ctx.node.put_value(&key, value.clone().into_bytes())).await?;
    Ok(format!("put value '{value}' for key '{key}'"))
}

async fn get(ctx: CmdCtx) -> Result<String, HarnessError> {
    let key = ctx
        .args
        .first()
        .ok_or(HarnessError::ArgCount("<range> get <key>"))?;
    let value = bounded(ctx.node.get_value(key)).await?;
    Ok(format!("got value: '{}'", String::from_utf8_lossy(&value)))
}

async fn store(ctx: CmdCtx) -> Result<String, HarnessError> {
    let (key, value) = match (ctx.args.first(), ctx.args.get(1)) {
        (Some(k), Some(v)) => (k.clone(), v.clone()),
        _ => return Err(HarnessError::ArgCount("<range> store <key> <value>")),
    };
    ctx.node.store_local(&key, value.into_bytes()).await?;
    Ok(String::new())
}

async fn provide(ctx: CmdCtx) -> Result<String, HarnessError> {
    let key = ctx
        .args
        .first()
        .ok_or(HarnessError::ArgCount("<range> provide <key>"))?;
    bounded(ctx.node.provide(key)).await?;
    Ok(String::new())
}

/// Streams up to `count` providers, bounded overall by the network
/// deadline: whichever comes first closes the stream.
async fn findprov(ctx: CmdCtx) -> Result<String, HarnessError> {
    let key = ctx
        .args
        .first()
        .ok_or(HarnessError::ArgCount("<range> findprov <key> [count]"))?;
    let count = match ctx.args.get(1) {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|e| HarnessError::Parse(e.to_string()))?,
        None => 1,
    };

    let deadline = tokio::time::Instant::now() + NETWORK_DEADLINE;
    let mut rx = match tokio::time::timeout_at(deadline, ctx.node.find_providers(key, count)).await
    {
        Ok(rx) => rx?,
        Err(_) => return Err(HarnessError::Timeout),
    };

    let mut out = format!("providers of '{key}'");
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(id)) => out.push_str(&format!("\n\t{}", hex::encode(id))),
            Ok(None) => break,
            Err(_) => break, // deadline reached; report what we have
        }
    }
    Ok(out)
}

/// `findpeer <peerid>` or `findpeer $<index>`: `$index` resolves to the
/// configured identity of controller `index`, valid in any lifecycle
/// state.
async fn findpeer(ctx: CmdCtx) -> Result<String, HarnessError> {
    let raw = ctx
        .args
        .first()
        .ok_or(HarnessError::ArgCount("<range> findpeer <peerid|$index>"))?;

    let target = if let Some(index) = raw.strip_prefix('$') {
        let index = index
            .parse::<usize>()
            .map_err(|e| HarnessError::Parse(e.to_string()))?;
        ctx.harness
            .configs
            .get(index)
            .ok_or(HarnessError::OutOfRange(index))?
            .identity
            .peer_id
    } else {
        parse_peer_id(raw).map_err(HarnessError::Parse)?
    };

    let address = bounded(ctx.node.find_peer(target)).await?;
    Ok(format!("found peer {} at {}", short_id(&target), address))
}

async fn diag(ctx: CmdCtx) -> Result<String, HarnessError> {
    let format = ctx.args.first().map(String::as_str).unwrap_or("text");
    let snapshot = ctx.node.diagnostics(NETWORK_DEADLINE).await?;

    match format {
        "text" => {
            let mut out = format!("known peers of {}", snapshot.self_id);
            for peer in &snapshot.peers {
                out.push_str(&format!(
                    "\n\t{} @ {} ({} connections)",
                    peer.id,
                    peer.address,
                    peer.connections.len()
                ));
            }
            Ok(out)
        }
        "json" => Ok(serde_json::to_string_pretty(&snapshot)?),
        "d3" => Ok(d3_graph(&snapshot).to_string()),
        other => Err(HarnessError::Parse(format!(
            "unknown diag format '{other}' (expected text|json|d3)"
        ))),
    }
}

async fn add(ctx: CmdCtx) -> Result<String, HarnessError> {
    let name = ctx
        .args
        .first()
        .ok_or(HarnessError::ArgCount("<range> add <fixture>"))?;
    let data = ctx.harness.fixtures.data(name)?;

    let key = ctx.node.add_bytes(&data).await?;
    let root = ctx.harness.fixtures.assign_root(name, key)?;
    Ok(format!("added '{}' as {}", name, hex::encode(root)))
}

async fn readfile(ctx: CmdCtx) -> Result<String, HarnessError> {
    let name = ctx
        .args
        .first()
        .ok_or(HarnessError::ArgCount("<range> readfile <fixture>"))?;
    let data = ctx.harness.fixtures.data(name)?;
    let root = ctx.harness.fixtures.root(name)?.ok_or_else(|| {
        HarnessError::NotFound(format!("fixture '{name}' has not been added yet"))
    })?;

    let start = Instant::now();
    let bytes = ctx.node.read_bytes(root).await?;
    let elapsed = start.elapsed();

    if bytes != *data {
        return Err(HarnessError::IntegrityMismatch(name.clone()));
    }

    let sample = ctx.harness.stats.record(bytes.len(), elapsed);
    Ok(format!(
        "read '{}': {} bytes in {:?} ({:.0} B/s)",
        name,
        sample.bytes,
        sample.elapsed,
        sample.bytes_per_sec
    ))
}

async fn bandwidth(ctx: CmdCtx) -> Result<String, HarnessError> {
    let (bw_in, bw_out) = ctx.node.bandwidth_totals();
    Ok(format!(
        "bandwidth totals\n\tin:  {bw_in}\n\tout: {bw_out}"
    ))
}
