use disflow_core::config::{DisConfig, Preset, VariationalConfig};
use disflow_core::error::FlowError;

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

#[test]
fn test_default_matches_balanced() {
    assert_eq!(DisConfig::default(), DisConfig::from_preset(Preset::Balanced));
    assert_eq!(Preset::default(), Preset::Balanced);
}

#[test]
fn test_preset_values() {
    let fastest = DisConfig::from_preset(Preset::Fastest);
    assert_eq!(fastest.finest_scale, 2);
    assert_eq!(fastest.patch_stride, 4);
    assert_eq!(fastest.grad_descent_iterations, 12);
    assert!(!fastest.variational.is_enabled());

    let hq = DisConfig::from_preset(Preset::HigherQuality);
    assert_eq!(hq.finest_scale, 1);
    assert_eq!(hq.patch_stride, 3);
    assert_eq!(hq.grad_descent_iterations, 25);
    assert_eq!(hq.variational.iterations, 5);

    for preset in [Preset::Fastest, Preset::Balanced, Preset::HigherQuality] {
        let config = DisConfig::from_preset(preset);
        assert_eq!(config.patch_size, 8);
        assert!(config.use_mean_normalization);
        assert!(config.use_spatial_propagation);
        assert!(config.validate().is_ok(), "{preset} should validate");
    }
}

#[test]
fn test_preset_names() {
    assert_eq!(Preset::HigherQuality.to_string(), "higher-quality");
    let parsed: Preset = serde_json::from_str("\"higher-quality\"").unwrap();
    assert_eq!(parsed, Preset::HigherQuality);
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

#[test]
fn test_config_json_roundtrip() {
    let config = DisConfig {
        patch_size: 12,
        use_spatial_propagation: false,
        variational: VariationalConfig {
            alpha: 30.0,
            ..VariationalConfig::default()
        },
        ..DisConfig::from_preset(Preset::HigherQuality)
    };
    let json = serde_json::to_string(&config).unwrap();
    let back: DisConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_partial_config_uses_defaults() {
    let config: DisConfig =
        serde_json::from_str(r#"{"patch_stride": 6, "variational": {"iterations": 0}}"#).unwrap();
    assert_eq!(config.patch_stride, 6);
    assert_eq!(config.patch_size, 8);
    assert_eq!(config.variational.iterations, 0);
    assert_eq!(config.variational.alpha, 20.0);
    assert_eq!(config.variational.sor_iterations, 5);
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn test_validate_rejects_bad_patch_size() {
    for patch_size in [0, 1, 17] {
        let config = DisConfig {
            patch_size,
            ..DisConfig::default()
        };
        assert!(
            matches!(config.validate(), Err(FlowError::InvalidConfig(_))),
            "patch_size {patch_size} should be rejected"
        );
    }
    let config = DisConfig {
        patch_size: 16,
        ..DisConfig::default()
    };
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_rejects_zero_stride() {
    let config = DisConfig {
        patch_stride: 0,
        ..DisConfig::default()
    };
    assert!(matches!(config.validate(), Err(FlowError::InvalidConfig(_))));
}

#[test]
fn test_validate_rejects_non_finite_weights() {
    let mut config = DisConfig::default();
    config.variational.gamma = f32::NAN;
    assert!(config.validate().is_err());
}
