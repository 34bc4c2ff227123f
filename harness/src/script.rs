//! Script-file and interactive input: node count header, topology
//! directives, then command lines, with the input source switching to
//! stdin on `==` or when the file runs out.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use tokio::io::AsyncBufReadExt;

use crate::commands::{self, LineOutcome};
use crate::error::HarnessError;
use crate::topology::{Topology, TopologyLine};
use crate::Harness;

enum SourceKind {
    Script {
        lines: Box<dyn Iterator<Item = std::io::Result<String>> + Send>,
        /// Whether exhaustion falls through to interactive stdin.
        fallback: bool,
    },
    Interactive {
        lines: tokio::io::Lines<tokio::io::BufReader<tokio::io::Stdin>>,
    },
}

/// A line source with one slot of pushback, so the topology phase can
/// hand its first non-directive line back to the command phase.
pub struct ScriptSource {
    kind: SourceKind,
    pushback: Option<String>,
}

impl ScriptSource {
    pub fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let file = File::open(path)?;
        Ok(Self {
            kind: SourceKind::Script {
                lines: Box::new(BufReader::new(file).lines()),
                fallback: true,
            },
            pushback: None,
        })
    }

    /// An in-memory script that ends instead of falling back to stdin;
    /// used by tests and embedded scenarios.
    pub fn from_text(contents: &str) -> Self {
        let lines: Vec<String> = contents.lines().map(str::to_string).collect();
        Self {
            kind: SourceKind::Script {
                lines: Box::new(lines.into_iter().map(Ok)),
                fallback: false,
            },
            pushback: None,
        }
    }

    pub fn interactive() -> Self {
        Self {
            kind: SourceKind::Interactive {
                lines: tokio::io::BufReader::new(tokio::io::stdin()).lines(),
            },
            pushback: None,
        }
    }

    pub fn push_back(&mut self, line: String) {
        self.pushback = Some(line);
    }

    /// Force all further input to come from stdin, dropping any
    /// remaining script content.
    pub fn switch_to_interactive(&mut self) {
        if matches!(self.kind, SourceKind::Script { .. }) {
            info!("switching input to stdin");
            *self = Self::interactive();
        }
    }

    pub async fn next_line(&mut self) -> Result<Option<String>, HarnessError> {
        if let Some(line) = self.pushback.take() {
            return Ok(Some(line));
        }
        loop {
            match &mut self.kind {
                SourceKind::Script { lines, fallback } => match lines.next() {
                    Some(line) => return Ok(Some(line?)),
                    None => {
                        if !*fallback {
                            return Ok(None);
                        }
                        self.switch_to_interactive();
                    }
                },
                SourceKind::Interactive { lines } => return Ok(lines.next_line().await?),
            }
        }
    }
}

/// The mandatory leading node-count line. Blank and comment lines are
/// skipped; a malformed count aborts the run before any node exists.
pub async fn read_node_count(source: &mut ScriptSource) -> Result<usize, HarnessError> {
    loop {
        let line = source
            .next_line()
            .await?
            .ok_or_else(|| HarnessError::Parse("missing node count line".to_string()))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        return line
            .parse::<usize>()
            .map_err(|_| HarnessError::Parse(format!("invalid node count '{line}'")));
    }
}

/// Consume topology directives until `--`, end of input, or the first
/// command line (pushed back for the command phase). Malformed
/// directives are logged and skipped.
pub async fn read_topology(
    source: &mut ScriptSource,
    topology: &mut Topology,
) -> Result<(), HarnessError> {
    while let Some(line) = source.next_line().await? {
        match topology.apply_line(&line) {
            Ok(TopologyLine::Applied) => {}
            Ok(TopologyLine::End) => break,
            Ok(TopologyLine::Command) => {
                source.push_back(line);
                break;
            }
            Err(e) => warn!("skipping bad topology line '{}': {}", line.trim(), e),
        }
    }
    topology.finish();
    Ok(())
}

/// The command loop: one dispatched line at a time until `quit` or end
/// of input. Non-fatal errors are logged and the loop continues; a
/// failed expectation ends the run.
pub async fn run_commands(
    harness: &Arc<Harness>,
    source: &mut ScriptSource,
) -> Result<(), HarnessError> {
    while let Some(line) = source.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line == "==" {
            source.switch_to_interactive();
            continue;
        }
        match commands::run_line(harness, line).await {
            Ok(LineOutcome::Continue) => {}
            Ok(LineOutcome::Quit) => break,
            Err(fatal @ HarnessError::ExpectationFailed(_)) => return Err(fatal),
            Err(e) => log::error!("{e}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn node_count_skips_blanks_and_comments() {
        let mut source = ScriptSource::from_text("# a comment\n\n5\n");
        assert_eq!(read_node_count(&mut source).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn bad_node_count_aborts() {
        let mut source = ScriptSource::from_text("many\n");
        assert!(matches!(
            read_node_count(&mut source).await,
            Err(HarnessError::Parse(_))
        ));

        let mut empty = ScriptSource::from_text("");
        assert!(read_node_count(&mut empty).await.is_err());
    }

    #[tokio::test]
    async fn topology_phase_ends_at_terminator() {
        let mut source = ScriptSource::from_text("[1-2]->0\n--\n0 get foo\n");
        let mut topology = Topology::build(3, false).unwrap();
        read_topology(&mut source, &mut topology).await.unwrap();

        assert_eq!(topology.configs[1].bootstrap.len(), 1);
        // The line after `--` is left for the command phase.
        assert_eq!(
            source.next_line().await.unwrap().as_deref(),
            Some("0 get foo")
        );
    }

    #[tokio::test]
    async fn first_command_line_is_pushed_back() {
        let mut source = ScriptSource::from_text("off 1\n0 put k v\n");
        let mut topology = Topology::build(2, false).unwrap();
        read_topology(&mut source, &mut topology).await.unwrap();

        assert!(topology.disabled.contains(&1));
        assert_eq!(
            source.next_line().await.unwrap().as_deref(),
            Some("0 put k v")
        );
    }

    #[tokio::test]
    async fn malformed_directives_are_skipped() {
        let mut source = ScriptSource::from_text("0 -> banana\n1->0\n--\n");
        let mut topology = Topology::build(2, false).unwrap();
        read_topology(&mut source, &mut topology).await.unwrap();

        assert_eq!(topology.configs[1].bootstrap.len(), 1);
        assert!(topology.configs[0].bootstrap.is_empty());
    }

    #[tokio::test]
    async fn script_without_directives_gets_the_default_star() {
        let mut source = ScriptSource::from_text("--\n");
        let mut topology = Topology::build(3, false).unwrap();
        read_topology(&mut source, &mut topology).await.unwrap();

        assert_eq!(topology.configs[1].bootstrap.len(), 1);
        assert_eq!(topology.configs[2].bootstrap.len(), 1);
    }
}
