#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::thread::{self, JoinHandle};

/// Serve one connection, answering like a small engine. Returns every line
/// received, including the closing `BYE`.
fn spawn_engine() -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let endpoint = listener.local_addr().expect("local addr").to_string();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("client should connect");
        let mut writer = stream.try_clone().expect("stream should clone");
        writer.write_all(b"100 VTR Ready\r\n").expect("greeting");

        let mut received = Vec::new();
        for line in BufReader::new(stream).lines() {
            let Ok(line) = line else { break };
            received.push(line.clone());
            let reply = match line.split(' ').next().unwrap_or_default() {
                "BYE" => break,
                "play" | "load" => "200 OK\r\n".to_string(),
                "uls" => "201 OK\r\nU0 00 avformat 1\r\n\r\n".to_string(),
                "usta" => "202 OK\r\n0 stopped \"clip.mp4\" 0\r\n".to_string(),
                _ => "400 Unknown command\r\n".to_string(),
            };
            if writer.write_all(reply.as_bytes()).is_err() {
                break;
            }
        }
        received
    });

    (endpoint, handle)
}

fn mvcp(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mvcp"))
        .env_remove("MVCP_ENDPOINT")
        .env_remove("MVCP_LOG")
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("mvcp should run")
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("stdout line should be json"))
        .collect()
}

#[test]
fn send_pipelines_commands_and_prints_each_reply() {
    let (endpoint, engine) = spawn_engine();

    let output = mvcp(&[
        "--endpoint",
        &endpoint,
        "--format",
        "json",
        "send",
        "load u0 clip.mp4",
        "uls",
        "usta u0",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["command"], "load u0 clip.mp4");
    assert_eq!(lines[0]["code"], 200);
    assert_eq!(lines[1]["body"][0], "U0 00 avformat 1");
    assert_eq!(lines[2]["code"], 202);

    let received = engine.join().expect("engine thread");
    assert_eq!(received, ["load u0 clip.mp4", "uls", "usta u0", "BYE"]);
}

#[test]
fn failed_command_sets_exit_code() {
    let (endpoint, engine) = spawn_engine();

    let output = mvcp(&[
        "--endpoint",
        &endpoint,
        "--format",
        "json",
        "send",
        "frobnicate u0",
        "play u0",
    ]);
    assert_eq!(output.status.code(), Some(1));

    let lines = json_lines(&output);
    assert_eq!(lines[0]["ok"], false);
    assert_eq!(lines[0]["code"], 400);
    assert_eq!(lines[0]["status"], "Unknown command");
    assert_eq!(lines[1]["ok"], true);
    engine.join().expect("engine thread");
}

#[test]
fn commands_can_come_from_a_file() {
    let (endpoint, engine) = spawn_engine();
    let path = PathBuf::from(format!(
        "/tmp/mvcp-cli-{}-commands.txt",
        std::process::id()
    ));
    std::fs::write(&path, "# warm up\nload u0 clip.mp4\n\nplay u0\n").expect("write file");

    let output = mvcp(&[
        "--endpoint",
        &endpoint,
        "--format",
        "raw",
        "send",
        "--file",
        path.to_str().expect("utf-8 path"),
    ]);
    let _ = std::fs::remove_file(&path);

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "200 OK\n200 OK\n");
    let received = engine.join().expect("engine thread");
    assert_eq!(received, ["load u0 clip.mp4", "play u0", "BYE"]);
}

#[test]
fn refused_connection_exits_with_transport_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        listener.local_addr().expect("local addr").port()
    };

    let output = mvcp(&["--endpoint", &format!("127.0.0.1:{port}"), "send", "play u0"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
}

#[test]
fn invalid_endpoint_is_usage_error() {
    let output = mvcp(&["--endpoint", "localhost:notaport", "send", "play u0"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_prints_package_version() {
    let output = mvcp(&["version"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("mvcp {}", env!("CARGO_PKG_VERSION"))
    );
}
