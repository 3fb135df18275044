use std::io::Write;

use nmap_runner_rs::ports::{format_ports, load_ports_from_path, parse_ports_str, PortRange};
use nmap_runner_rs::targets::{normalize_target, validate_target};

#[test]
fn parse_single_and_ranges_and_comments() {
    let input = r#"
        # common ports
        22
        80  # http
        443 # https
        8000-8002
        8000-8002  # duplicate
        # blank line follows

    "#;

    let ports = parse_ports_str(input).expect("parse ok");
    assert_eq!(format_ports(&ports), "22,80,443,8000-8002");
    assert_eq!(ports[3], PortRange { start: 8000, end: 8002 });
}

#[test]
fn invalid_port_rejected() {
    assert!(parse_ports_str("65536\n").is_err());
    assert!(parse_ports_str("22,\n80-\n").is_err());
}

#[test]
fn ports_file_round_trips_into_nmap_token() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# web").unwrap();
    writeln!(file, "80, 443").unwrap();
    writeln!(file, "8080-8090 # alt").unwrap();

    let ranges = load_ports_from_path(file.path()).unwrap();
    assert_eq!(format_ports(&ranges), "80,443,8080-8090");
}

#[test]
fn missing_ports_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_ports_from_path(dir.path().join("nope.txt")).is_err());
}

#[test]
fn targets_are_validated_and_normalized() {
    assert!(validate_target("192.168.1.42/24").is_ok());
    assert_eq!(normalize_target("192.168.1.42/24"), "192.168.1.0/24");
    assert!(validate_target("--script=evil").is_err());
}
