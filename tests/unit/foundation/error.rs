use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        SpatialError::input_track_missing("x")
            .to_string()
            .contains("input track missing:")
    );
    assert!(
        SpatialError::reader_start("x")
            .to_string()
            .contains("reader start failure:")
    );
    assert!(
        SpatialError::writer_start("x")
            .to_string()
            .contains("writer start failure:")
    );
    assert!(
        SpatialError::output_settings_rejected("x")
            .to_string()
            .contains("output settings rejected:")
    );
    assert!(
        SpatialError::pixel_transfer("x")
            .to_string()
            .contains("pixel transfer failure:")
    );
    assert!(
        SpatialError::append("x")
            .to_string()
            .contains("append failure:")
    );
    assert!(
        SpatialError::validation("x")
            .to_string()
            .contains("validation error:")
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = SpatialError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
