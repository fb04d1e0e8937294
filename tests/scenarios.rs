//! Replays every scenario under `tests/scenarios/`
//!
//! Set `CLOUDCTL_UPDATE_SCENARIOS=1` to rewrite the expectations from the
//! current behavior instead of checking them.

use cloudctl::scenario::ScenarioRunner;
use std::path::{Path, PathBuf};

fn scenario_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("scenarios")
}

async fn replay(name: &str) {
    let path = scenario_dir().join(name);
    let mut runner = ScenarioRunner::load(&path)
        .unwrap_or_else(|e| panic!("Failed to load {}: {e}", path.display()));
    let report = runner
        .run()
        .await
        .unwrap_or_else(|e| panic!("Failed to run {}: {e}", path.display()));
    assert!(
        report.passed(),
        "{} failed:\n{}",
        name,
        report.failures().join("\n")
    );
}

mod scenario_tests {
    use super::*;

    /// Test describe prints the resource as YAML with sorted keys
    #[tokio::test]
    async fn test_instances_describe() {
        replay("instances_describe.yaml").await;
    }

    /// Test filter, sort and format over two aggregated pages
    #[tokio::test]
    async fn test_instances_list() {
        replay("instances_list.yaml").await;
    }

    /// Test the disabled-service prompt, enable call and retry
    #[tokio::test]
    async fn test_service_enable() {
        replay("service_enable.yaml").await;
    }

    /// Test remove-iam-policy-binding writes once and keeps the etag
    #[tokio::test]
    async fn test_iam_remove_binding() {
        replay("iam_remove_binding.yaml").await;
    }

    /// Test create polls the operation and fetches the target
    #[tokio::test]
    async fn test_instances_create() {
        replay("instances_create.yaml").await;
    }

    /// Test an ambiguous disk name is resolved by prompt, or fails without one
    #[tokio::test]
    async fn test_disks_remove_labels() {
        replay("disks_remove_labels.yaml").await;
    }

    /// Test every file in the directory parses
    #[test]
    fn test_all_scenarios_load() {
        let entries = std::fs::read_dir(scenario_dir()).expect("scenario directory");
        let mut count = 0;
        for entry in entries {
            let path = entry.unwrap().path();
            if path.extension().is_some_and(|e| e == "yaml") {
                let runner = ScenarioRunner::load(&path)
                    .unwrap_or_else(|e| panic!("Failed to load {}: {e}", path.display()));
                assert!(!runner.scenario().actions.is_empty(), "{}", path.display());
                count += 1;
            }
        }
        assert!(count >= 6);
    }
}
