//! The command tree and its clap rendering
//!
//! Groups and commands are loaded from the embedded `commands.json`. The GA
//! tree hangs off the root; `alpha` and `beta` get their own copies filtered
//! to the commands visible in that track.

use super::command::{
    scope_kinds, ArgSpec, CommandDef, GroupDef, MutexGroup, ReleaseTrack, ScopeKind,
};
use super::flags::{async_flag, global_flags, list_flags, resource_args, to_clap};
use crate::error::{CliError, Result};
use crate::resource::Registry;
use clap::{ArgGroup, ColorChoice, Command};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::OnceLock;

const COMMANDS_JSON: &str = include_str!("../resources/commands.json");

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CommandTree {
    #[serde(default)]
    pub groups: Vec<GroupDef>,
    #[serde(default)]
    pub commands: Vec<CommandDef>,
}

static TREE: OnceLock<CommandTree> = OnceLock::new();

impl CommandTree {
    pub fn global() -> &'static CommandTree {
        TREE.get_or_init(|| match Self::from_json(COMMANDS_JSON) {
            Ok(tree) => tree,
            Err(e) => {
                tracing::error!("Failed to load embedded commands: {}", e);
                CommandTree::default()
            }
        })
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let tree: CommandTree = serde_json::from_str(content)?;
        tree.validate()?;
        Ok(tree)
    }

    /// Every command needs its parent groups, and paths are unique per track
    fn validate(&self) -> Result<()> {
        let groups: BTreeSet<&str> = self.groups.iter().map(|g| g.path.as_str()).collect();
        let mut seen = BTreeSet::new();
        for command in &self.commands {
            let segments = command.segments();
            for depth in 1..segments.len() {
                let parent = segments[..depth].join(" ");
                if !groups.contains(parent.as_str()) {
                    return Err(CliError::Internal(format!(
                        "Command [{}] has no parent group [{}]",
                        command.path, parent
                    )));
                }
            }
            for track in &command.release_tracks {
                if !seen.insert((command.path.clone(), *track)) {
                    return Err(CliError::Internal(format!(
                        "Command [{}] is defined twice for the {} track",
                        command.path, track
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn command(&self, track: ReleaseTrack, path: &str) -> Option<&CommandDef> {
        self.commands
            .iter()
            .find(|c| c.path == path && c.in_track(track))
    }

    fn group(&self, path: &str) -> Option<&GroupDef> {
        self.groups.iter().find(|g| g.path == path)
    }

    /// Every argument a command takes under `track`, framework flags included
    pub fn command_args(
        &self,
        command: &CommandDef,
        track: ReleaseTrack,
        registry: &Registry,
    ) -> Result<(Vec<ArgSpec>, Vec<MutexGroup>)> {
        let mut args: Vec<ArgSpec> = Vec::new();
        let mut groups: Vec<MutexGroup> = command.mutex_groups.clone();

        if let Some(resource) = &command.resource {
            let info = registry.collection(&resource.collection, None)?;
            let kinds = scope_kinds(info);
            let noun = resource.name.replace('_', " ");
            let (resource_specs, scope_group) = resource_args(resource, &kinds, &noun);
            args.extend(resource_specs);
            groups.extend(scope_group);
        }
        args.extend(command.args_for(track).cloned());

        if let super::command::Action::List { collection } = &command.action {
            let info = registry.collection(collection, None)?;
            let kinds: Vec<ScopeKind> = scope_kinds(info);
            args.extend(list_flags(&kinds));
        }
        if command.action.is_mutating() {
            args.push(async_flag());
        }
        Ok((args, groups))
    }

    /// Build the full parser: globals on the root, GA tree, then track subtrees
    pub fn build(&self, registry: &Registry) -> Result<Command> {
        let mut root = Command::new("cloudctl")
            .about("Manage cloud resources from the command line")
            .version(crate::VERSION)
            .color(ColorChoice::Never)
            .subcommand_required(true)
            .arg_required_else_help(true);
        for spec in global_flags() {
            root = root.arg(to_clap(&spec).global(true));
        }

        for child in self.children(&[], ReleaseTrack::Ga, registry)? {
            root = root.subcommand(child);
        }
        for track in [ReleaseTrack::Beta, ReleaseTrack::Alpha] {
            let children = self.children(&[], track, registry)?;
            if children.is_empty() {
                continue;
            }
            let prefix = track.prefix().unwrap_or_default();
            let mut sub = Command::new(prefix)
                .about(format!("{} versions of cloudctl commands", capitalize(prefix)))
                .subcommand_required(true)
                .arg_required_else_help(true);
            for child in children {
                sub = sub.subcommand(child);
            }
            root = root.subcommand(sub);
        }
        Ok(root)
    }

    /// Groups and commands directly below `prefix` that are visible in `track`
    fn children(
        &self,
        prefix: &[&str],
        track: ReleaseTrack,
        registry: &Registry,
    ) -> Result<Vec<Command>> {
        let mut out = Vec::new();
        for group in &self.groups {
            let segments: Vec<&str> = group.path.split_whitespace().collect();
            if segments.len() != prefix.len() + 1 || segments[..prefix.len()] != *prefix {
                continue;
            }
            if !group.release_tracks.contains(&track) {
                continue;
            }
            let children = self.children(&segments, track, registry)?;
            // Groups with nothing visible in this track are left out
            if children.is_empty() {
                continue;
            }
            let name = segments[segments.len() - 1].to_string();
            let mut cmd = Command::new(name)
                .about(group.help.clone())
                .subcommand_required(true)
                .arg_required_else_help(true);
            for child in children {
                cmd = cmd.subcommand(child);
            }
            out.push(cmd);
        }
        for command in &self.commands {
            let segments = command.segments();
            if segments.len() != prefix.len() + 1 || segments[..prefix.len()] != *prefix {
                continue;
            }
            if !command.in_track(track) {
                continue;
            }
            out.push(self.leaf(command, track, registry)?);
        }
        Ok(out)
    }

    fn leaf(&self, command: &CommandDef, track: ReleaseTrack, registry: &Registry) -> Result<Command> {
        let mut cmd = Command::new(command.name().to_string()).about(command.help.clone());
        if let Some(detail) = &command.detailed_help {
            cmd = cmd.long_about(detail.clone());
        }
        if let Some(examples) = &command.examples {
            cmd = cmd.after_long_help(format!("EXAMPLES:\n{examples}"));
        }

        let (args, groups) = self.command_args(command, track, registry)?;
        let dests: BTreeSet<String> = args.iter().map(|a| a.dest()).collect();
        for spec in &args {
            cmd = cmd.arg(to_clap(spec));
        }
        for group in groups {
            let members: Vec<String> = group.args.iter().map(|a| super::command::dest_of(a)).collect();
            if let Some(missing) = members.iter().find(|m| !dests.contains(*m)) {
                return Err(CliError::Internal(format!(
                    "Mutex group [{}] of [{}] names unknown argument [{}]",
                    group.name, command.path, missing
                )));
            }
            cmd = cmd.group(
                ArgGroup::new(group.name.clone())
                    .args(members)
                    .multiple(false)
                    .required(group.required),
            );
        }
        Ok(cmd)
    }

    /// Best-effort dotted path for error messages when parsing failed
    pub fn path_hint(&self, argv: &[String]) -> String {
        let mut parts = vec!["cloudctl".to_string()];
        let mut words = argv.iter().filter(|a| !a.starts_with('-')).peekable();
        if let Some(track) = words.peek().and_then(|w| ReleaseTrack::from_prefix(w)) {
            parts.push(track.to_string());
            words.next();
        }
        let mut path: Vec<&str> = Vec::new();
        for word in words {
            let candidate = if path.is_empty() {
                word.clone()
            } else {
                format!("{} {}", path.join(" "), word)
            };
            let known = self.group(&candidate).is_some()
                || self.commands.iter().any(|c| c.path == candidate);
            if !known {
                break;
            }
            path.push(word);
        }
        parts.extend(path.iter().map(|s| s.to_string()));
        parts.join(".")
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_tree_builds() {
        let tree = CommandTree::global();
        assert!(!tree.commands.is_empty());
        let cmd = tree.build(Registry::global()).unwrap();
        cmd.debug_assert();
    }

    #[test]
    fn test_track_only_commands_are_hidden_from_ga() {
        let tree = CommandTree::global();
        assert!(tree
            .command(ReleaseTrack::Ga, "compute disks get-iam-policy")
            .is_none());
        assert!(tree
            .command(ReleaseTrack::Beta, "compute disks get-iam-policy")
            .is_some());
    }

    #[test]
    fn test_missing_parent_group_is_rejected() {
        let err = CommandTree::from_json(
            r#"{"groups": [], "commands": [{"path": "compute widgets list", "help": "", "action": {"kind": "describe"}}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("compute"));
    }

    #[test]
    fn test_path_hint() {
        let tree = CommandTree::global();
        let argv: Vec<String> = ["beta", "compute", "instances", "bogus", "--zone", "z"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tree.path_hint(&argv), "cloudctl.beta.compute.instances");
    }
}
