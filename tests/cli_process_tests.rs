// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// The logvault binary run as separate processes

use logvault::LogEntry;
use std::fs;
use std::process::{Command, Stdio};
use tempfile::TempDir;

#[test]
fn test_concurrent_cli_writers_keep_every_entry() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("logs");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(
        &config_path,
        format!(
            "storage:\n  file:\n    linux_path: \"{root}\"\n    windows_path: \"{root}\"\nlogging:\n  level: error\n",
            root = root.display()
        ),
    )
    .unwrap();

    let writers = 16;
    let children: Vec<_> = (0..writers)
        .map(|i| {
            Command::new(env!("CARGO_BIN_EXE_logvault"))
                .arg("--config")
                .arg(&config_path)
                .args(["store", "--backend", "file", "--service", "svc"])
                .arg("--message")
                .arg(format!("m{}", i))
                .stdout(Stdio::null())
                .spawn()
                .unwrap()
        })
        .collect();

    for mut child in children {
        assert!(child.wait().unwrap().success());
    }

    let content = fs::read_to_string(root.join("logs.json")).unwrap();
    let entries: Vec<LogEntry> = serde_json::from_str(&content).unwrap();
    assert_eq!(entries.len(), writers);

    let mut ids: Vec<u64> = entries.iter().map(|e| e.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=writers as u64).collect::<Vec<u64>>());
}

#[test]
fn test_queue_retrieve_is_refused_without_consumer() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(
        &config_path,
        "storage:\n  queue:\n    host: 127.0.0.1\n    port: 1\nlogging:\n  level: error\n",
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_logvault"))
        .arg("--config")
        .arg(&config_path)
        .args(["retrieve", "--backend", "queue"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let response: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(response["succeeded"], false);
    assert_eq!(response["error_kind"], "NotSupported");
}
