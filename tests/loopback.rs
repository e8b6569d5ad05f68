//! End-to-end loopback experiments: a real sender and receiver on OS
//! threads over one TCP connection, checking output-file fidelity and the
//! CSV report shape.

use std::fs;
use std::thread;
use tempfile::tempdir;
use tempo::config::{ClientConfig, ServerConfig};
use tempo::receiver::Receiver;
use tempo::sender::Sender;
use tempo::transport::{Connection, Listener};

fn patterned_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Runs one full experiment over loopback and returns the output directory.
fn run_experiment(client: ClientConfig, server: ServerConfig) -> tempfile::TempDir {
    let listener = Listener::bind(0).unwrap();
    let port = listener.local_port().unwrap();

    let out_dir = tempdir().unwrap();
    let server = ServerConfig {
        output_directory: out_dir.path().to_string_lossy().into_owned(),
        ..server
    };

    let server_thread = thread::spawn(move || {
        let mut conn = listener.accept().unwrap();
        Receiver::new(server).serve(&mut conn).unwrap();
    });

    let client = ClientConfig {
        server_ip: "127.0.0.1".to_string(),
        server_port: port,
        ..client
    };
    let sender = Sender::new(client).unwrap();
    let mut conn = Connection::connect("127.0.0.1", port).unwrap();
    sender.session(&mut conn).unwrap();

    server_thread.join().unwrap();
    out_dir
}

#[test]
fn full_experiment_round_trip() {
    let input_dir = tempdir().unwrap();
    let input_path = input_dir.path().join("in.dat");
    let payload = patterned_payload(10_000);
    fs::write(&input_path, &payload).unwrap();

    let client = ClientConfig {
        package_size: 64,
        timeout: vec![50, 100],
        file_name: input_path.to_string_lossy().into_owned(),
        maximum_errors: 10,
        number_of_tries: 2,
        apply_select_timeout: true,
        ..ClientConfig::default()
    };
    let out_dir = run_experiment(client, ServerConfig::default());

    // One output file per round index, byte-identical to the source.
    for index in 0..2 {
        let out_path = out_dir.path().join(format!("out_{}_in.dat", index));
        assert_eq!(fs::read(&out_path).unwrap(), payload, "round {}", index);
    }

    // Two-line CSV: configured timeouts, then averaged durations.
    let csv = fs::read_to_string(out_dir.path().join("in.dat.csv")).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "50,100");
    let averages: Vec<i64> = lines[1]
        .split(',')
        .map(|v| v.parse().unwrap())
        .collect();
    assert_eq!(averages.len(), 2);
    assert!(averages.iter().all(|&micros| micros >= 0));
}

#[test]
fn fail_fast_mode_transfers_cleanly_on_loopback() {
    let input_dir = tempdir().unwrap();
    let input_path = input_dir.path().join("in.dat");
    let payload = patterned_payload(1_000);
    fs::write(&input_path, &payload).unwrap();

    // maximum_errors = 0 selects the socket-timeout policy on both sides.
    let client = ClientConfig {
        package_size: 16,
        timeout: vec![250],
        file_name: input_path.to_string_lossy().into_owned(),
        maximum_errors: 0,
        number_of_tries: 1,
        apply_select_timeout: true,
        ..ClientConfig::default()
    };
    let out_dir = run_experiment(client, ServerConfig::default());

    let out_path = out_dir.path().join("out_0_in.dat");
    assert_eq!(fs::read(&out_path).unwrap(), payload);

    let csv = fs::read_to_string(out_dir.path().join("in.dat.csv")).unwrap();
    assert_eq!(csv.lines().count(), 2);
    assert_eq!(csv.lines().next().unwrap(), "250");
}

#[test]
fn polling_disabled_on_both_sides_still_round_trips() {
    let input_dir = tempdir().unwrap();
    let input_path = input_dir.path().join("in.dat");
    let payload = patterned_payload(4_096);
    fs::write(&input_path, &payload).unwrap();

    let client = ClientConfig {
        package_size: 128,
        timeout: vec![100],
        file_name: input_path.to_string_lossy().into_owned(),
        maximum_errors: 5,
        number_of_tries: 1,
        apply_select_timeout: false,
        ..ClientConfig::default()
    };
    let server = ServerConfig {
        apply_select_timeout: false,
        ..ServerConfig::default()
    };
    let out_dir = run_experiment(client, server);

    let out_path = out_dir.path().join("out_0_in.dat");
    assert_eq!(fs::read(&out_path).unwrap(), payload);
}

#[test]
fn output_names_use_base_name_of_remote_path() {
    let input_dir = tempdir().unwrap();
    let input_path = input_dir.path().join("in.dat");
    fs::write(&input_path, patterned_payload(256)).unwrap();

    // The sender announces an absolute path; output files must use only the
    // final component.
    let client = ClientConfig {
        package_size: 32,
        timeout: vec![100],
        file_name: input_path.to_string_lossy().into_owned(),
        maximum_errors: 10,
        number_of_tries: 1,
        apply_select_timeout: true,
        ..ClientConfig::default()
    };
    let out_dir = run_experiment(client, ServerConfig::default());

    assert!(out_dir.path().join("out_0_in.dat").exists());
    assert!(out_dir.path().join("in.dat.csv").exists());
}
