//! Profile store integration tests
//!
//! Profiles are written to a temporary directory, read back, and used to
//! bring up a terminal on a loopback port.
//!
//! Run with: cargo test --test profiles

use std::sync::Arc;

use serial_tools_lib::adapters::loopback::LoopbackFactory;
use serial_tools_lib::adapters::profile_store::ProfileStore;
use serial_tools_lib::domain::{BaudRate, Parity, TerminalSettings};
use serial_tools_lib::Terminal;

#[test]
fn saved_profile_round_trips_and_lists() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::open(dir.path().join("profiles")).unwrap();

    let mut bench = TerminalSettings {
        name: "Bench Supply".to_string(),
        port: Some("/dev/ttyUSB3".to_string()),
        dtr: true,
        ..TerminalSettings::default()
    };
    bench.line.baud = BaudRate::try_from(57600).unwrap();
    bench.line.parity = Parity::Odd;
    store.save(&bench).unwrap();
    store.save(&TerminalSettings::default()).unwrap();

    assert_eq!(store.load("Bench Supply").unwrap(), bench);
    assert_eq!(store.list().unwrap(), vec!["Bench Supply", "Default"]);

    store.delete("Bench Supply").unwrap();
    assert!(store.load("Bench Supply").is_err());
    assert!(store.delete("Default").is_err());
}

#[test]
fn legacy_session_file_imports_as_profile() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::open(dir.path()).unwrap();
    let legacy = dir.path().join("session.prefs");
    std::fs::write(
        &legacy,
        r#"{
            "Terminal Serial Port": "/dev/cu.usbserial",
            "Terminal Baud Rate": 4800,
            "Terminal Bits": 7,
            "Terminal Parity": 2,
            "Terminal Stop Bits": 1,
            "Terminal Send CRLF": true,
            "Terminal RTS": true
        }"#,
    )
    .unwrap();

    let settings = store.import_legacy(&legacy, "GPS").unwrap();
    assert_eq!(settings.port.as_deref(), Some("/dev/cu.usbserial"));
    assert_eq!(settings.line.to_string(), "4800 7E1");
    assert!(settings.line.crlf);
    assert!(!settings.line.raw);
    assert!(settings.rts);
    assert!(!settings.dtr);
    assert_eq!(store.load("GPS").unwrap(), settings);
}

#[test]
fn legacy_file_with_bad_baud_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::open(dir.path()).unwrap();
    let legacy = dir.path().join("broken.prefs");
    std::fs::write(
        &legacy,
        r#"{"Terminal Baud Rate": 1234, "Terminal Bits": 8, "Terminal Parity": 0, "Terminal Stop Bits": 1}"#,
    )
    .unwrap();

    assert!(store.import_legacy(&legacy, "Broken").is_err());
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn loaded_profile_brings_up_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let store = ProfileStore::open(dir.path()).unwrap();
    let mut saved = TerminalSettings {
        name: "Loop".to_string(),
        port: Some("/dev/loop0".to_string()),
        rts: true,
        ..TerminalSettings::default()
    };
    saved.line.raw = true;
    store.save(&saved).unwrap();

    let factory = Arc::new(LoopbackFactory::new());
    let port = factory.add_port("/dev/loop0");
    let terminal = Terminal::new(factory);

    terminal.apply_settings(&store.load("Loop").unwrap()).unwrap();
    assert!(terminal.connected());
    assert!(terminal.raw_enabled());
    assert!(port.rts());
    assert_eq!(port.config(), Some(saved.line));
}
