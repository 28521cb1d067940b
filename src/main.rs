// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Arbor CLI entrypoint.
//!
//! `replay` rebuilds the graph stored in a journal and prints it as a tree. `compact`
//! rewrites a journal as a single snapshot batch.

use std::error::Error;
use std::path::PathBuf;

use arbor::model::{Graph, NodeId};
use arbor::persist::{journal, PersisterHelperFactory, TypeConverter, WriteDurability};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "ARBOR_LOG";

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} replay <journal> [--verbose]\n  {program} compact <journal> [--durable-writes] [--verbose]\n\nreplay prints the graph stored in <journal>.\ncompact rewrites <journal> as one snapshot batch.\n\n--durable-writes syncs the compacted file and its directory before returning.\nLogging follows {LOG_ENV} (default `warn`; `--verbose` raises it to `debug`)."
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Replay,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    command: Command,
    journal: PathBuf,
    verbose: bool,
    durable_writes: bool,
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<CliOptions, ()> {
    let command = match args.next().as_deref() {
        Some("replay") => Command::Replay,
        Some("compact") => Command::Compact,
        _ => return Err(()),
    };
    let mut journal = None;
    let mut verbose = false;
    let mut durable_writes = false;

    for arg in args {
        match arg.as_str() {
            "--verbose" | "-v" => {
                if verbose {
                    return Err(());
                }
                verbose = true;
            }
            "--durable-writes" => {
                if durable_writes || command != Command::Compact {
                    return Err(());
                }
                durable_writes = true;
            }
            _ if arg.starts_with('-') => return Err(()),
            _ => {
                if journal.is_some() {
                    return Err(());
                }
                journal = Some(PathBuf::from(arg));
            }
        }
    }

    Ok(CliOptions {
        command,
        journal: journal.ok_or(())?,
        verbose,
        durable_writes,
    })
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn render_tree(graph: &Graph) -> String {
    let mut out = String::new();
    render_node(graph, graph.root(), 0, &mut out);
    out
}

fn render_node(graph: &Graph, id: NodeId, depth: usize, out: &mut String) {
    let Some(node) = graph.get(id) else {
        return;
    };
    out.push_str(&"  ".repeat(depth));
    out.push_str(&format!("{} {:?} ({id})\n", node.kind(), node.name()));
    for child in node.children() {
        render_node(graph, *child, depth + 1, out);
    }
}

fn run(options: &CliOptions) -> Result<(), Box<dyn Error>> {
    let converter = TypeConverter::with_default_codecs();
    let graph = journal::replay(&options.journal, &converter)?;
    match options.command {
        Command::Replay => print!("{}", render_tree(&graph)),
        Command::Compact => {
            let durability = if options.durable_writes {
                WriteDurability::Durable
            } else {
                WriteDurability::BestEffort
            };
            let factory = PersisterHelperFactory::with_defaults(converter)?;
            journal::compact(&options.journal, &graph, &factory, durability)?;
            eprintln!(
                "compacted {} ({} objects)",
                options.journal.display(),
                graph.len()
            );
        }
    }
    Ok(())
}

fn main() {
    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "arbor".to_owned());

    let options = match parse_options(args) {
        Ok(options) => options,
        Err(()) => {
            print_usage(&program);
            std::process::exit(2);
        }
    };
    init_logging(options.verbose);

    if let Err(err) = run(&options) {
        eprintln!("arbor: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use arbor::model::{Graph, ObjectNode};

    use super::{parse_options, render_tree, CliOptions, Command};

    fn args(raw: &[&str]) -> impl Iterator<Item = String> {
        raw.iter()
            .map(|s| (*s).to_owned())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn parses_replay() {
        let options = parse_options(args(&["replay", "db.jsonl"])).expect("parse options");
        assert_eq!(
            options,
            CliOptions {
                command: Command::Replay,
                journal: PathBuf::from("db.jsonl"),
                verbose: false,
                durable_writes: false,
            }
        );
    }

    #[test]
    fn parses_compact_with_flags_in_any_order() {
        let options = parse_options(args(&["compact", "--durable-writes", "db.jsonl", "-v"]))
            .expect("parse options");
        assert_eq!(options.command, Command::Compact);
        assert!(options.durable_writes);
        assert!(options.verbose);
    }

    #[test]
    fn rejects_missing_journal() {
        parse_options(args(&["replay"])).unwrap_err();
        parse_options(args(&["replay", "--verbose"])).unwrap_err();
    }

    #[test]
    fn rejects_unknown_commands_and_flags() {
        parse_options(args(&[])).unwrap_err();
        parse_options(args(&["dump", "db.jsonl"])).unwrap_err();
        parse_options(args(&["replay", "db.jsonl", "--nope"])).unwrap_err();
    }

    #[test]
    fn rejects_durable_writes_for_replay() {
        parse_options(args(&["replay", "db.jsonl", "--durable-writes"])).unwrap_err();
    }

    #[test]
    fn rejects_duplicates() {
        parse_options(args(&["replay", "a", "b"])).unwrap_err();
        parse_options(args(&["replay", "a", "-v", "--verbose"])).unwrap_err();
    }

    #[test]
    fn renders_a_lone_root() {
        let graph = Graph::new(ObjectNode::root());
        let rendered = render_tree(&graph);
        assert!(rendered.starts_with("root \"root\" ("));
        assert_eq!(rendered.lines().count(), 1);
    }
}
