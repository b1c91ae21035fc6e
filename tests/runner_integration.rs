//! Integration tests for the file runner: write-back decisions, drift
//! pins, root confinement, and per-file failure isolation.

use repatch::config::{FileTarget, Meta, PatchSet, WritePolicy};
use repatch::rule::Occurrences;
use repatch::{fingerprint, run_patch_set, FileOutcome, PatchRule, RuleStatus, WriteMode};
use std::fs;
use tempfile::TempDir;

/// Rule set with one root-relative target and default meta.
fn single_target_set(path: &str, rules: Vec<PatchRule>) -> PatchSet {
    PatchSet {
        meta: Meta {
            root_relative: true,
            ..Default::default()
        },
        files: vec![FileTarget {
            path: path.to_string(),
            expect_hash: None,
            rules,
        }],
    }
}

#[test]
fn test_apply_patches_file_in_place() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("config.ini");
    fs::write(&file, "mode = production\nretries = 3\n").unwrap();

    let set = single_target_set(
        "config.ini",
        vec![PatchRule::literal("flip-mode", "mode = production", "mode = maintenance").require()],
    );

    let reports = run_patch_set(&set, dir.path(), WriteMode::Apply).unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome, FileOutcome::Patched);
    assert!(reports[0].succeeded);
    assert_eq!(
        fs::read_to_string(&file).unwrap(),
        "mode = maintenance\nretries = 3\n"
    );
}

#[test]
fn test_dry_run_reports_without_writing() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("config.ini");
    fs::write(&file, "mode = production\n").unwrap();

    let set = single_target_set(
        "config.ini",
        vec![PatchRule::literal("flip-mode", "production", "maintenance")],
    );

    let reports = run_patch_set(&set, dir.path(), WriteMode::DryRun).unwrap();

    assert_eq!(reports[0].outcome, FileOutcome::WouldPatch);
    assert!(reports[0].succeeded);
    // The would-be result is available for diffing, the disk is not touched
    assert!(reports[0].patched.contains("maintenance"));
    assert_eq!(fs::read_to_string(&file).unwrap(), "mode = production\n");
}

#[test]
fn test_dry_run_predicts_withheld_write() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.js");
    fs::write(&file, "const level = 'info';\n").unwrap();

    let mut set = single_target_set(
        "app.js",
        vec![
            PatchRule::literal("missing-anchor", "const retries = 5;", "const retries = 8;")
                .require(),
            PatchRule::literal("log-level", "'info'", "'debug'"),
        ],
    );

    // On-success gating would refuse this write, and the dry run says
    // so instead of promising a patch.
    let reports = run_patch_set(&set, dir.path(), WriteMode::DryRun).unwrap();
    assert_eq!(reports[0].outcome, FileOutcome::Withheld);
    assert!(!reports[0].succeeded);
    assert_eq!(fs::read_to_string(&file).unwrap(), "const level = 'info';\n");

    // Always-write really would patch, so the dry run reports that.
    set.meta.write = WritePolicy::Always;
    let reports = run_patch_set(&set, dir.path(), WriteMode::DryRun).unwrap();
    assert_eq!(reports[0].outcome, FileOutcome::WouldPatch);
    assert_eq!(fs::read_to_string(&file).unwrap(), "const level = 'info';\n");
}

#[test]
fn test_write_withheld_when_required_rule_misses() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.js");
    fs::write(&file, "const level = 'info';\n").unwrap();

    // The optional rule changes the buffer, but the required rule
    // misses, so on-success gating refuses the whole write.
    let set = single_target_set(
        "app.js",
        vec![
            PatchRule::literal("missing-anchor", "const retries = 5;", "const retries = 8;")
                .require(),
            PatchRule::literal("log-level", "'info'", "'debug'"),
        ],
    );

    let reports = run_patch_set(&set, dir.path(), WriteMode::Apply).unwrap();

    assert_eq!(reports[0].outcome, FileOutcome::Withheld);
    assert!(!reports[0].succeeded);
    assert_eq!(
        reports[0].results[0].status,
        RuleStatus::MissingRequiredMatch
    );
    assert_eq!(fs::read_to_string(&file).unwrap(), "const level = 'info';\n");
}

#[test]
fn test_always_policy_writes_despite_failure() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.js");
    fs::write(&file, "const level = 'info';\n").unwrap();

    let mut set = single_target_set(
        "app.js",
        vec![
            PatchRule::literal("missing-anchor", "const retries = 5;", "const retries = 8;")
                .require(),
            PatchRule::literal("log-level", "'info'", "'debug'"),
        ],
    );
    set.meta.write = WritePolicy::Always;

    let reports = run_patch_set(&set, dir.path(), WriteMode::Apply).unwrap();

    // The partial result lands on disk; the report still records failure
    assert_eq!(reports[0].outcome, FileOutcome::Patched);
    assert!(!reports[0].succeeded);
    assert_eq!(fs::read_to_string(&file).unwrap(), "const level = 'debug';\n");
}

#[test]
fn test_rerun_with_optional_rules_is_unchanged() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.js");
    fs::write(&file, "const level = 'debug';\n").unwrap();

    let set = single_target_set(
        "app.js",
        vec![PatchRule::literal("log-level", "'info'", "'debug'")],
    );

    let reports = run_patch_set(&set, dir.path(), WriteMode::Apply).unwrap();

    assert_eq!(reports[0].outcome, FileOutcome::Unchanged);
    assert!(reports[0].succeeded);
}

#[test]
fn test_rerun_with_required_rules_is_unchanged_but_failed() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("app.js");
    fs::write(&file, "const level = 'debug';\n").unwrap();

    let set = single_target_set(
        "app.js",
        vec![PatchRule::literal("log-level", "'info'", "'debug'").require()],
    );

    let reports = run_patch_set(&set, dir.path(), WriteMode::Apply).unwrap();

    assert_eq!(reports[0].outcome, FileOutcome::Unchanged);
    assert!(!reports[0].succeeded);
}

#[test]
fn test_strict_meta_withholds_ambiguous_counts() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("page.jsx");
    fs::write(&file, "alert('a');\nalert('b');\n").unwrap();

    let mut set = single_target_set(
        "page.jsx",
        vec![PatchRule::literal("one-alert", "alert(", "notify(").expect(Occurrences::One)],
    );
    set.meta.strict = true;

    let reports = run_patch_set(&set, dir.path(), WriteMode::Apply).unwrap();

    assert_eq!(reports[0].outcome, FileOutcome::Unchanged);
    assert!(!reports[0].succeeded);
    assert_eq!(fs::read_to_string(&file).unwrap(), "alert('a');\nalert('b');\n");
}

#[test]
fn test_matching_fingerprint_allows_patching() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("config.ini");
    fs::write(&file, "mode = production\n").unwrap();

    let mut set = single_target_set(
        "config.ini",
        vec![PatchRule::literal("flip-mode", "production", "maintenance")],
    );
    let fp = fingerprint(&file).unwrap();
    set.files[0].expect_hash = Some(format!("0x{fp:016x}"));

    let reports = run_patch_set(&set, dir.path(), WriteMode::Apply).unwrap();

    assert_eq!(reports[0].outcome, FileOutcome::Patched);
    assert!(reports[0].succeeded);
}

#[test]
fn test_drifted_fingerprint_blocks_patching() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("config.ini");
    fs::write(&file, "mode = production\n").unwrap();

    let mut set = single_target_set(
        "config.ini",
        vec![PatchRule::literal("flip-mode", "production", "maintenance")],
    );
    let fp = fingerprint(&file).unwrap();
    set.files[0].expect_hash = Some(format!("{:016x}", fp ^ 1));

    let reports = run_patch_set(&set, dir.path(), WriteMode::Apply).unwrap();

    match &reports[0].outcome {
        FileOutcome::Drifted { expected, found } => {
            assert_eq!(found, &format!("{fp:016x}"));
            assert_eq!(expected, &format!("{:016x}", fp ^ 1));
        }
        other => panic!("expected drift, got {other:?}"),
    }
    assert!(!reports[0].succeeded);
    // Rules never ran
    assert!(reports[0].results.is_empty());
    assert_eq!(fs::read_to_string(&file).unwrap(), "mode = production\n");
}

#[test]
fn test_missing_file_failure_is_isolated() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("real.txt");
    fs::write(&file, "old text\n").unwrap();

    let set = PatchSet {
        meta: Meta {
            root_relative: true,
            ..Default::default()
        },
        files: vec![
            FileTarget {
                path: "ghost.txt".to_string(),
                expect_hash: None,
                rules: vec![PatchRule::literal("any", "old", "new")],
            },
            FileTarget {
                path: "real.txt".to_string(),
                expect_hash: None,
                rules: vec![PatchRule::literal("any", "old", "new")],
            },
        ],
    };

    let reports = run_patch_set(&set, dir.path(), WriteMode::Apply).unwrap();

    assert_eq!(reports.len(), 2);
    assert!(matches!(reports[0].outcome, FileOutcome::Failed { .. }));
    assert!(!reports[0].succeeded);
    // The sibling target still went through
    assert_eq!(reports[1].outcome, FileOutcome::Patched);
    assert_eq!(fs::read_to_string(&file).unwrap(), "new text\n");
}

#[test]
fn test_target_outside_root_is_rejected() {
    let base = TempDir::new().unwrap();
    let root = base.path().join("root");
    fs::create_dir(&root).unwrap();
    let outside = base.path().join("outside.txt");
    fs::write(&outside, "old text\n").unwrap();

    let set = single_target_set(
        "../outside.txt",
        vec![PatchRule::literal("any", "old", "new")],
    );

    let reports = run_patch_set(&set, &root, WriteMode::Apply).unwrap();

    match &reports[0].outcome {
        FileOutcome::Failed { reason } => {
            assert!(reason.contains("outside patch root"), "reason: {reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(fs::read_to_string(&outside).unwrap(), "old text\n");
}

#[test]
fn test_target_in_forbidden_directory_is_rejected() {
    let dir = TempDir::new().unwrap();
    let forbidden = dir.path().join("node_modules");
    fs::create_dir(&forbidden).unwrap();
    let file = forbidden.join("pkg.json");
    fs::write(&file, "\"version\": \"1.0.0\"\n").unwrap();

    let set = single_target_set(
        "node_modules/pkg.json",
        vec![PatchRule::literal("bump", "1.0.0", "1.0.1")],
    );

    let reports = run_patch_set(&set, dir.path(), WriteMode::Apply).unwrap();

    match &reports[0].outcome {
        FileOutcome::Failed { reason } => {
            assert!(reason.contains("forbidden directory"), "reason: {reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(fs::read_to_string(&file).unwrap(), "\"version\": \"1.0.0\"\n");
}

#[test]
fn test_near_miss_hint_attached_to_report() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("page.jsx");
    fs::write(
        &file,
        "  const [name, setName] = useState(\"\");\n  render();\n",
    )
    .unwrap();

    // Single-quote anchor misses against double-quoted source; the hint
    // should point at the drifted line.
    let set = single_target_set(
        "page.jsx",
        vec![PatchRule::literal(
            "quote-fix",
            "  const [name, setName] = useState('');",
            "  const [name, setName] = useState(null);",
        )
        .require()],
    );

    let reports = run_patch_set(&set, dir.path(), WriteMode::Apply).unwrap();

    assert_eq!(reports[0].outcome, FileOutcome::Unchanged);
    assert!(!reports[0].succeeded);
    assert_eq!(reports[0].hints.len(), 1);
    assert_eq!(reports[0].hints[0].rule_id, "quote-fix");
    assert_eq!(reports[0].hints[0].line, 1);
    assert!(reports[0].hints[0].similarity > 0.9);
}

#[test]
fn test_report_order_follows_declaration() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.txt"), "x\n").unwrap();
    fs::write(dir.path().join("b.txt"), "x\n").unwrap();

    let set = PatchSet {
        meta: Meta {
            root_relative: true,
            ..Default::default()
        },
        files: vec![
            FileTarget {
                path: "b.txt".to_string(),
                expect_hash: None,
                rules: vec![PatchRule::literal("any", "x", "y")],
            },
            FileTarget {
                path: "a.txt".to_string(),
                expect_hash: None,
                rules: vec![PatchRule::literal("any", "x", "y")],
            },
        ],
    };

    let reports = run_patch_set(&set, dir.path(), WriteMode::Apply).unwrap();

    assert!(reports[0].path.ends_with("b.txt"));
    assert!(reports[1].path.ends_with("a.txt"));
}

#[test]
fn test_file_report_json_shape() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("config.ini");
    fs::write(&file, "mode = production\n").unwrap();

    let set = single_target_set(
        "config.ini",
        vec![PatchRule::literal("flip-mode", "production", "maintenance")],
    );

    let reports = run_patch_set(&set, dir.path(), WriteMode::DryRun).unwrap();
    let value = serde_json::to_value(&reports[0]).unwrap();

    assert_eq!(value["outcome"]["kind"], "would-patch");
    assert_eq!(value["succeeded"], true);
    assert_eq!(value["results"][0]["status"]["kind"], "replaced");
    // Buffers and empty hint lists stay out of the wire format
    assert!(value.get("original").is_none());
    assert!(value.get("patched").is_none());
    assert!(value.get("hints").is_none());
}
