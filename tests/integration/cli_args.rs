// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use tempfile::TempDir;

use crate::{get_cmd_output, tart};

#[test]
fn test_help_lists_subcommands() {
    let cmd = tart().arg("--help").ok();
    assert!(cmd.is_ok(), "{:?}", cmd.err());
    let (stdout, _) = get_cmd_output(cmd);
    for sub_command in ["run", "diagnose", "clean-cache"] {
        assert!(stdout.contains(sub_command), "{sub_command} missing: {stdout}");
    }
}

#[test]
fn test_no_subcommand_is_an_error() {
    let cmd = tart().ok();
    assert!(cmd.is_err());
}

#[test]
fn test_simulate_and_device_conflict() {
    let cmd = tart()
        .args(["diagnose", "--simulate", "--device", "/dev/null"])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("--simulate"), "{stderr}");
}

#[test]
fn test_unknown_mode_is_rejected() {
    let cmd = tart().args(["run", "--mode", "warp"]).ok();
    assert!(cmd.is_err());
}

#[test]
fn test_bad_config_extension_is_reported() {
    let tmp_dir = TempDir::new().expect("couldn't make tmp dir");
    let config = tmp_dir.path().join("config.yaml");
    std::fs::write(&config, "mode: off").unwrap();

    let cmd = tart()
        .arg("clean-cache")
        .arg(config.display().to_string())
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("unsupported extension"), "{stderr}");
    assert!(stderr.contains("tart-acquire failed on"), "{stderr}");
}
