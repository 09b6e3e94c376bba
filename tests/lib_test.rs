//! Tests for top-level ImageStatsComputer API

use apercal_imstats::{Backend, ImageStatsComputer, StatsConfig};
use std::path::Path;

#[test]
fn test_computer_builder() {
    let computer = ImageStatsComputer::builder().build();
    assert_eq!(computer.backend(), Backend::Simd);
}

#[test]
fn test_computer_builder_with_backend() {
    let computer = ImageStatsComputer::builder().backend(Backend::Scalar).build();
    assert_eq!(computer.backend(), Backend::Scalar);

    let computer = ImageStatsComputer::builder().backend(Backend::Simd).build();
    assert_eq!(computer.backend(), Backend::Simd);
}

#[test]
fn test_computer_builder_chain() {
    let computer = ImageStatsComputer::builder()
        .backend(Backend::Scalar)
        .temp_root("/scratch/apercal")
        .build();

    assert_eq!(computer.workspaces().root(), Path::new("/scratch/apercal"));
    assert_eq!(computer.backend(), Backend::Scalar);
}

#[test]
fn test_computer_debug() {
    let computer = ImageStatsComputer::builder().temp_root("/scratch").build();
    let debug_str = format!("{computer:?}");
    assert!(debug_str.contains("ImageStatsComputer"));
    assert!(debug_str.contains("/scratch"));
}

#[test]
fn test_config_builder() {
    let config = StatsConfig {
        temp_root: Some("/scratch".into()),
        converter_program: None,
        backend: Backend::Scalar,
    };
    let computer = config.builder().build();
    assert_eq!(computer.workspaces().root(), Path::new("/scratch"));
    assert_eq!(computer.backend(), Backend::Scalar);
}

#[test]
fn test_backend_serde_roundtrip() {
    for (backend, json) in [(Backend::Scalar, "\"scalar\""), (Backend::Simd, "\"simd\"")] {
        assert_eq!(serde_json::to_string(&backend).unwrap(), json);
        assert_eq!(serde_json::from_str::<Backend>(json).unwrap(), backend);
    }
    assert!(serde_json::from_str::<Backend>("\"gpu\"").is_err());
}

#[test]
fn test_backend_enum_debug() {
    let backend = Backend::Scalar;
    let debug_str = format!("{backend:?}");
    assert!(debug_str.contains("Scalar"));
}
