//! Tests for error types

use std::error::Error as _;
use std::path::PathBuf;

use cachebench::Error;

#[test]
fn test_process_start_error() {
    let error = Error::ProcessStart {
        program: "/opt/jdk/bin/java".to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Failed to start process"));
    assert!(error_str.contains("/opt/jdk/bin/java"));
    assert!(error.source().is_some());
    assert_eq!(error.kind(), "process_start");
}

#[test]
fn test_phase_execution_error_carries_output() {
    let error = Error::PhaseExecution {
        workload: "wordcount".to_string(),
        phase: "train-create".to_string(),
        exit_code: 1,
        stdout: "partial".to_string(),
        stderr: "Error: cache mismatch".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Phase `train-create` failed for workload `wordcount`"));
    assert!(error_str.contains("exit code 1"));
    assert!(error_str.contains("STDOUT:\npartial"));
    assert!(error_str.contains("STDERR:\nError: cache mismatch"));
    assert_eq!(error.kind(), "phase_execution");
}

#[test]
fn test_phase_output_error() {
    let error = Error::PhaseOutput {
        workload: "hash".to_string(),
        phase: "replay".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("produced no measurements"));
    assert!(error_str.contains("hash"));
}

#[test]
fn test_insufficient_data_error() {
    let error = Error::InsufficientData {
        workload: "json".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Insufficient data"));
    assert!(error_str.contains("common series length is zero"));
    assert_eq!(error.kind(), "insufficient_data");
}

#[test]
fn test_config_error() {
    let error = Error::Config("repeats must be at least 1".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Configuration error"));
    assert!(error_str.contains("repeats must be at least 1"));
}

#[test]
fn test_persist_error_names_staged_file() {
    let error = Error::Persist {
        staged: PathBuf::from("out/all_raw.csv.tmp"),
        source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("out/all_raw.csv.tmp"));
    assert_eq!(error.kind(), "storage");
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
    assert_eq!(error.kind(), "io");
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("JSON error"));
}

#[test]
fn test_storage_error() {
    let error = Error::Storage("Failed to open Parquet file: missing".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Failed to open Parquet file: missing"));
    assert_eq!(error.kind(), "storage");
}

#[test]
fn test_report_error() {
    let error = Error::Report("no averaged records to plot".to_string());
    assert!(format!("{error}").contains("no averaged records to plot"));
    assert_eq!(error.kind(), "report");
}

#[test]
fn test_error_debug() {
    let error = Error::InsufficientData {
        workload: "w".to_string(),
    };
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("InsufficientData"));
}

#[test]
fn test_result_type_alias() {
    #[allow(clippy::unnecessary_wraps)]
    fn returns_result() -> cachebench::Result<i32> {
        Ok(42)
    }

    let result = returns_result();
    assert!(result.is_ok());
    assert_eq!(result.unwrap(), 42);
}

#[test]
fn test_result_type_alias_error() {
    fn returns_error() -> cachebench::Result<i32> {
        Err(Error::Config("test error".to_string()))
    }

    let result = returns_error();
    assert!(matches!(result, Err(Error::Config(_))));
}
