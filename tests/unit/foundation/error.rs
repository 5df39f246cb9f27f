use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        MapZoomError::invalid_input("x")
            .to_string()
            .contains("invalid input:")
    );
    assert!(
        MapZoomError::invalid_schedule("x")
            .to_string()
            .contains("invalid schedule:")
    );
    assert!(
        MapZoomError::workspace("x")
            .to_string()
            .contains("workspace error:")
    );
}

#[test]
fn reason_codes_are_stable() {
    let cases: Vec<(MapZoomError, &str)> = vec![
        (MapZoomError::invalid_input("x"), "invalid_input"),
        (MapZoomError::invalid_schedule("x"), "invalid_schedule"),
        (
            MapZoomError::InvalidRange { min: 2.0, max: 1.0 },
            "invalid_range",
        ),
        (
            TileFetchError::new(TileFetchReason::Timeout, 3.0).into(),
            "tile_fetch",
        ),
        (
            MapZoomError::FrameAcquisition {
                index: FrameIndex(4),
                cause: Box::new(MapZoomError::Cancelled),
            },
            "frame_acquisition",
        ),
        (
            MapZoomError::Encode(ProcessFailure::Spawn("nope".into())),
            "encode",
        ),
        (
            MapZoomError::Mux(ProcessFailure::MissingOutput("a.mp4".into())),
            "mux",
        ),
        (MapZoomError::Cancelled, "cancelled"),
        (anyhow::anyhow!("boom").into(), "internal"),
    ];
    for (err, code) in cases {
        assert_eq!(err.reason_code(), code, "{err}");
    }
}

#[test]
fn transient_classification() {
    let t = |reason| TileFetchError::new(reason, 10.0).is_transient();
    assert!(t(TileFetchReason::Timeout));
    assert!(t(TileFetchReason::Transport("reset".into())));
    assert!(t(TileFetchReason::Status(429)));
    assert!(t(TileFetchReason::Status(503)));
    assert!(!t(TileFetchReason::Status(404)));
    assert!(!t(TileFetchReason::Status(401)));
    assert!(!t(TileFetchReason::Malformed("html".into())));
}

#[test]
fn process_failure_display_includes_stderr() {
    let f = ProcessFailure::Exit {
        code: Some(1),
        stderr: "Unknown encoder 'libx264'".into(),
    };
    let s = f.to_string();
    assert!(s.contains("code 1"));
    assert!(s.contains("libx264"));
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = MapZoomError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
