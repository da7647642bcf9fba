use phylo_core::PhyloError;
use phylo_mcmc::RunConfig;

#[test]
fn empty_document_yields_the_defaults() {
    let config = RunConfig::from_yaml_str("{}").unwrap();
    assert_eq!(config.burn_in, 10_000);
    assert_eq!(config.cycles, 100_000);
    assert_eq!(config.sample_rate, 100);
    assert_eq!(config.swap_rate, 100);
    assert_eq!(config.proposal_weights.alignment, 35);
    assert_eq!(config.proposal_weights.mod_ext_param, 0);
    assert!(config.automation.proposal_spans);
    assert!(!config.automation.burn_in);
    assert!((config.tuning.min_acceptance - 0.2).abs() < 1e-12);
    assert_eq!(config.calibration.window, 25_000);
}

#[test]
fn partial_documents_override_selected_fields() {
    let source = "
burn_in: 500
sample_rate: 25
proposal_weights:
  alignment: 10
  topology: 5
automation:
  burn_in: true
tuning:
  min_acceptance: 0.1
  max_acceptance: 0.5
";
    let config = RunConfig::from_yaml_str(source).unwrap();
    assert_eq!(config.burn_in, 500);
    assert_eq!(config.sample_rate, 25);
    assert_eq!(config.proposal_weights.alignment, 10);
    assert_eq!(config.proposal_weights.topology, 5);
    // Unnamed weights keep their defaults.
    assert_eq!(config.proposal_weights.edge_length, 15);
    assert!(config.automation.burn_in);
    assert!((config.tuning.max_acceptance - 0.5).abs() < 1e-12);
}

#[test]
fn all_zero_core_weights_are_rejected() {
    let source = "
proposal_weights:
  alignment: 0
  topology: 0
  edge_length: 0
  indel_param: 0
  subst_param: 0
  mod_ext_param: 7
";
    let err = RunConfig::from_yaml_str(source).unwrap_err();
    assert!(matches!(err, PhyloError::Config(_)));
    assert_eq!(err.info().code, "zero-weights");
}

#[test]
fn degenerate_tuning_settings_are_rejected() {
    let err = RunConfig::from_yaml_str("tuning:\n  span_multiplier: 1.5\n").unwrap_err();
    assert_eq!(err.info().code, "bad-span-multiplier");

    let err = RunConfig::from_yaml_str("sample_rate: 0\n").unwrap_err();
    assert_eq!(err.info().code, "zero-sample-rate");
}

#[test]
fn degenerate_calibration_settings_are_rejected() {
    let err = RunConfig::from_yaml_str("calibration:\n  probe_rate: 0\n").unwrap_err();
    assert!(matches!(err, PhyloError::Config(_)));
    assert_eq!(err.info().code, "zero-probe-rate");

    let err = RunConfig::from_yaml_str("calibration:\n  window: 0\n").unwrap_err();
    assert_eq!(err.info().code, "zero-calibration-window");
}

#[test]
fn malformed_yaml_surfaces_as_a_serde_error() {
    let err = RunConfig::from_yaml_str("burn_in: [not a number").unwrap_err();
    assert!(matches!(err, PhyloError::Serde(_)));
}
