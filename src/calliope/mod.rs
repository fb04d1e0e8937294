//! Declarative command tree and argument parsing
//!
//! - [`command`] - Command, group and argument records
//! - [`flags`] - Framework flags and the clap translation of records
//! - [`tree`] - The embedded tree rendered as a clap parser
//! - [`namespace`] - Parsed values with specified-argument tracking

pub mod command;
pub mod flags;
pub mod namespace;
pub mod tree;

pub use command::{Action, CommandDef, ReleaseTrack};
pub use namespace::{Concept, Namespace};
pub use tree::CommandTree;

use crate::error::{CliError, Result};
use crate::resource::Registry;
use clap::error::ErrorKind;

/// What parsing the command line produced
#[derive(Debug)]
pub enum Parsed {
    Command(Namespace),
    /// `--help` or `--version`: text for stdout, exit 0
    Info(String),
}

/// Parse `argv` (without the program name) against `tree`
pub fn parse(tree: &CommandTree, registry: &Registry, argv: &[String]) -> Result<Parsed> {
    let cli = tree.build(registry)?;
    let matches = match cli.try_get_matches_from(
        std::iter::once("cloudctl".to_string()).chain(argv.iter().cloned()),
    ) {
        Ok(m) => m,
        Err(e) => {
            return match e.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                    Ok(Parsed::Info(e.render().to_string()))
                }
                _ => Err(CliError::usage(usage_message(&e.render().to_string()))),
            };
        }
    };

    let mut names: Vec<String> = Vec::new();
    let mut leaf = &matches;
    while let Some((name, sub)) = leaf.subcommand() {
        names.push(name.to_string());
        leaf = sub;
    }

    let track = match names.first().and_then(|n| ReleaseTrack::from_prefix(n)) {
        Some(track) => {
            names.remove(0);
            track
        }
        None => ReleaseTrack::Ga,
    };
    let path = names.join(" ");
    let command = tree
        .command(track, &path)
        .ok_or_else(|| CliError::usage(format!("Invalid choice: '{path}'.")))?;

    let (mut specs, _) = tree.command_args(command, track, registry)?;
    specs.extend(flags::global_flags());
    Ok(Parsed::Command(Namespace::from_matches(
        track,
        command.clone(),
        specs,
        leaf,
    )))
}

/// Strip clap's `error: ` prefix and trailing help hint
fn usage_message(rendered: &str) -> String {
    let trimmed = rendered.trim_end();
    let body = trimmed.strip_prefix("error: ").unwrap_or(trimmed);
    let body = body
        .strip_suffix("For more information, try '--help'.")
        .unwrap_or(body);
    body.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn parse_ok(args: &[&str]) -> Namespace {
        match parse(CommandTree::global(), Registry::global(), &argv(args)).unwrap() {
            Parsed::Command(ns) => ns,
            Parsed::Info(text) => panic!("unexpected info output: {text}"),
        }
    }

    #[test]
    fn test_parse_list_with_global_flags() {
        let ns = parse_ok(&[
            "compute", "instances", "list", "--project", "p", "--filter", "status=RUNNING",
            "--sort-by", "~name,zone", "--limit", "3",
        ]);
        assert_eq!(ns.command_path(), "cloudctl.compute.instances.list");
        assert_eq!(ns.value("project"), Some("p"));
        assert_eq!(ns.values("sort_by"), ["~name".to_string(), "zone".to_string()]);
        assert_eq!(ns.int("limit").unwrap(), Some(3));
        assert!(ns.is_specified("filter"));
        assert!(!ns.is_specified("page_size"));
        assert_eq!(ns.value("verbosity"), Some("warning"));
        assert!(!ns.is_specified("verbosity"));
    }

    #[test]
    fn test_track_prefix_selects_track() {
        let ns = parse_ok(&["beta", "compute", "disks", "get-iam-policy", "d1", "--zone", "z"]);
        assert_eq!(ns.track(), ReleaseTrack::Beta);
        assert_eq!(ns.command_path(), "cloudctl.beta.compute.disks.get-iam-policy");

        let err = parse(
            CommandTree::global(),
            Registry::global(),
            &argv(&["compute", "disks", "get-iam-policy", "d1"]),
        )
        .unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));
    }

    #[test]
    fn test_scope_flags_are_mutually_exclusive() {
        let err = parse(
            CommandTree::global(),
            Registry::global(),
            &argv(&["compute", "disks", "describe", "d1", "--zone", "z", "--region", "r"]),
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_USAGE);
        assert!(err.to_string().contains("cannot be used with"));
    }

    #[test]
    fn test_help_is_info() {
        let parsed = parse(
            CommandTree::global(),
            Registry::global(),
            &argv(&["compute", "instances", "list", "--help"]),
        )
        .unwrap();
        let Parsed::Info(text) = parsed else {
            panic!("expected help text");
        };
        assert!(text.contains("--filter"));
    }

    #[test]
    fn test_plural_positional_counts() {
        let ns = parse_ok(&["compute", "instances", "delete", "a", "b", "c", "--zone", "z", "-q"]);
        assert_eq!(ns.specified_count("instance"), Some(3));
        assert!(ns.flag("quiet"));
    }
}
