use std::process::Command;
use tempfile::TempDir;

fn stalewatch(dir: &std::path::Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_stalewatch"));
    command.current_dir(dir).env_remove("RUST_LOG");
    command
}

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    let output = stalewatch(temp_path)
        .arg("init")
        .output()
        .expect("Failed to run init command");

    assert!(output.status.success());

    let config_path = temp_path.join(".stalewatch/settings.toml");
    assert!(config_path.exists());

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("version = 1"));
    assert!(content.contains("[staleness]"));
    assert!(content.contains("diagnostic_id = \"IDE1004\""));
}

#[test]
fn test_init_refuses_overwrite_without_force() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    assert!(stalewatch(temp_path).arg("init").status().unwrap().success());
    assert!(!stalewatch(temp_path).arg("init").status().unwrap().success());
    assert!(
        stalewatch(temp_path)
            .args(["init", "--force"])
            .status()
            .unwrap()
            .success()
    );
}

#[test]
fn test_config_command() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    let config_dir = temp_path.join(".stalewatch");
    std::fs::create_dir_all(&config_dir).unwrap();

    let config_content = r#"
version = 2
[staleness]
max_indirection_hops = 8
"#;

    std::fs::write(config_dir.join("settings.toml"), config_content).unwrap();

    let output = stalewatch(temp_path)
        .arg("config")
        .output()
        .expect("Failed to run config command");

    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("version = 2"));
    assert!(stdout.contains("max_indirection_hops = 8"));
    // Untouched sections keep their defaults
    assert!(stdout.contains("severity = \"warning\""));
}

#[test]
fn test_custom_config_flag() {
    let temp_dir = TempDir::new().unwrap();
    let custom = temp_dir.path().join("custom.toml");
    std::fs::write(&custom, "[staleness]\ndiagnostic_id = \"SW0001\"\n").unwrap();

    let output = stalewatch(temp_dir.path())
        .arg("--config")
        .arg(&custom)
        .arg("config")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("diagnostic_id = \"SW0001\""));
}

#[test]
fn test_stamp_command() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("A.dll");
    std::fs::write(&file, b"analyzer").unwrap();

    let output = stalewatch(temp_dir.path())
        .arg("stamp")
        .arg(&file)
        .arg(temp_dir.path().join("missing.dll"))
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("A.dll"));
    assert!(!lines[0].starts_with("unknown"));
    assert!(lines[1].starts_with("unknown"));
}
