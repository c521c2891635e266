use std::fs;

use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};

#[test_log::test]
#[test_log(default_log_filter = "debug")]
fn test_configured_align() {
    let tmpdir = tempfile::tempdir().unwrap();
    let output_file = tmpdir.path().join("aligned.mgf");
    let report_file = tmpdir.path().join("report.json");

    let config = Figment::new()
        .merge(Toml::file_exact("tests/data/align.toml"))
        .merge(Serialized::default("output_file", &output_file))
        .merge(Serialized::default("report_file", &report_file));
    let command: mzaligner::AlignCommand = config.extract().unwrap();
    assert_eq!(command.method, mzaligner::BackendMethod::ActiveSequence);
    assert_eq!(command.threads, 2);
    command.main().unwrap();

    let content = fs::read_to_string(&output_file).unwrap();
    assert_eq!(content.matches("BEGIN IONS").count(), 4);
    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_file).unwrap()).unwrap();
    assert_eq!(report["n_peaks"], 24);
}
