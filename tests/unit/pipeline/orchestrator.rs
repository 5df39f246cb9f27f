use super::*;
use crate::acquire::frames::RetryPolicy;
use crate::encode::runner::{ProcessCommand, ProcessOutput};
use crate::foundation::core::{ImageSize, ZoomRange};
use crate::foundation::error::{TileFetchError, TileFetchReason};
use crate::pipeline::config::Preset;
use crate::schedule::builder::ZoomMode;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};

/// A 4x4 PNG whose pixels carry whole-degree latitude and tenths of zoom.
fn tagged_png(center: Coordinate, zoom: f64) -> Vec<u8> {
    let tag = [center.lat().abs() as u8, (zoom * 10.0).round() as u8, 0, 255];
    let img = image::RgbaImage::from_pixel(4, 4, image::Rgba(tag));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

struct FakeSource {
    fractional: bool,
    fail_at: Option<f64>,
    calls: Arc<AtomicUsize>,
}

impl FakeSource {
    fn whole() -> Self {
        Self {
            fractional: false,
            fail_at: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn fractional() -> Self {
        Self {
            fractional: true,
            ..Self::whole()
        }
    }
}

impl TileSource for FakeSource {
    fn fetch(
        &self,
        center: Coordinate,
        zoom: f64,
        _size: ImageSize,
    ) -> Result<Vec<u8>, TileFetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(zoom) {
            return Err(TileFetchError::new(TileFetchReason::Status(404), zoom));
        }
        Ok(tagged_png(center, zoom))
    }

    fn zoom_bounds(&self) -> (f64, f64) {
        (0.0, 20.0)
    }

    fn fractional_zoom(&self) -> bool {
        self.fractional
    }

    fn attribution(&self) -> &str {
        "© Test Maps"
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// What the fake ffmpeg saw for one invocation.
#[derive(Clone, Debug)]
struct Seen {
    args: Vec<String>,
    frames_on_disk: usize,
    /// `(latitude, zoom * 10)` read back from each frame file, in file name order.
    tags: Vec<(u8, u8)>,
}

#[derive(Clone, Default)]
struct FakeRunner {
    fail_with: Option<i32>,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl ProcessRunner for FakeRunner {
    fn run(&self, cmd: &ProcessCommand) -> std::io::Result<ProcessOutput> {
        let args: Vec<String> = cmd
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let input = args
            .iter()
            .position(|a| a == "-i")
            .map(|i| PathBuf::from(&args[i + 1]))
            .unwrap();
        let mut frames: Vec<PathBuf> = std::fs::read_dir(input.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("frame-"))
            .map(|e| e.path())
            .collect();
        frames.sort();
        let tags = frames
            .iter()
            .map(|p| {
                let px = *image::open(p).unwrap().to_rgba8().get_pixel(0, 0);
                (px[0], px[1])
            })
            .collect();
        self.seen.lock().unwrap().push(Seen {
            args: args.clone(),
            frames_on_disk: frames.len(),
            tags,
        });

        if let Some(code) = self.fail_with {
            return Ok(ProcessOutput {
                success: false,
                code: Some(code),
                stderr: "encoder exploded".into(),
            });
        }
        std::fs::write(args.last().unwrap(), b"\x00\x00\x00\x18ftypisom")?;
        Ok(ProcessOutput {
            success: true,
            code: Some(0),
            stderr: String::new(),
        })
    }
}

struct Harness {
    scratch: tempfile::TempDir,
    out: tempfile::TempDir,
    stages: Arc<Mutex<Vec<Stage>>>,
    seen: Arc<Mutex<Vec<Seen>>>,
    fetches: Arc<AtomicUsize>,
}

impl Harness {
    fn new() -> Self {
        Self {
            scratch: tempfile::tempdir().unwrap(),
            out: tempfile::tempdir().unwrap(),
            stages: Arc::default(),
            seen: Arc::default(),
            fetches: Arc::default(),
        }
    }

    fn config(&self, preset: Preset) -> PipelineConfig {
        let mut c = PipelineConfig::preset(preset);
        c.image_size = ImageSize::square(4);
        c.scale = None;
        c.max_concurrent_fetches = 3;
        c.retry = RetryPolicy::none();
        c.scratch_root = Some(self.scratch.path().to_path_buf());
        c.output_dir = self.out.path().to_path_buf();
        c
    }

    fn orchestrator(
        &self,
        config: PipelineConfig,
        mut source: FakeSource,
        runner: FakeRunner,
    ) -> Orchestrator {
        source.calls = self.fetches.clone();
        let runner = FakeRunner {
            seen: self.seen.clone(),
            ..runner
        };
        let stages = self.stages.clone();
        Orchestrator::new(config, Box::new(source), Box::new(runner))
            .unwrap()
            .with_observer(move |s| stages.lock().unwrap().push(s))
    }

    fn scratch_entries(&self) -> usize {
        std::fs::read_dir(self.scratch.path())
            .map(|d| d.count())
            .unwrap_or(0)
    }

    fn out_entries(&self) -> usize {
        std::fs::read_dir(self.out.path())
            .map(|d| d.count())
            .unwrap_or(0)
    }

    fn stages(&self) -> Vec<Stage> {
        self.stages.lock().unwrap().clone()
    }
}

fn madrid() -> RenderRequest {
    RenderRequest {
        center: Coordinate::new(40.4168, -3.7038).unwrap(),
        display_name: Some("Madrid".into()),
        out_path: None,
    }
}

#[test]
fn discrete_run_encodes_every_zoom_level() {
    let h = Harness::new();
    let orch = h.orchestrator(
        h.config(Preset::Discrete),
        FakeSource::whole(),
        FakeRunner::default(),
    );

    let artifact = orch.run(&madrid(), &CancelToken::new()).unwrap();

    assert_eq!(artifact.frame_count, 10);
    assert!((artifact.duration_secs - 10.0 / 24.0).abs() < 1e-9);
    assert_eq!(artifact.attribution, "© Test Maps");
    assert_eq!(artifact.display_name.as_deref(), Some("Madrid"));
    assert!(!artifact.has_audio);
    assert!(artifact.video_path.is_file());
    assert!(artifact.video_path.starts_with(h.out.path()));
    let name = artifact.video_path.file_name().unwrap().to_string_lossy();
    assert!(name.starts_with("output-") && name.ends_with(".mp4"));

    assert_eq!(h.fetches.load(Ordering::SeqCst), 10);
    let seen = h.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].frames_on_disk, 10);
    assert_eq!(h.scratch_entries(), 0);
    assert_eq!(
        h.stages(),
        vec![
            Stage::Idle,
            Stage::SchedulingFrames,
            Stage::AcquiringFrames,
            Stage::Encoding,
            Stage::Cleaning,
            Stage::Done,
        ]
    );
}

#[test]
fn continuous_run_with_audio_muxes() {
    let h = Harness::new();
    let audio = h.out.path().join("bg.mp3");
    std::fs::write(&audio, b"ID3").unwrap();
    let mut cfg = h.config(Preset::Continuous);
    cfg.audio_track = Some(audio.clone());
    let orch = h.orchestrator(cfg, FakeSource::fractional(), FakeRunner::default());

    let req = RenderRequest {
        out_path: Some(h.out.path().join("clips/madrid.mp4")),
        ..madrid()
    };
    let artifact = orch.run(&req, &CancelToken::new()).unwrap();

    assert_eq!(artifact.frame_count, 120);
    assert!((artifact.duration_secs - 12.0).abs() < 1e-9);
    assert!(artifact.has_audio);
    assert_eq!(artifact.video_path, h.out.path().join("clips/madrid.mp4"));
    assert!(artifact.video_path.is_file());

    let seen = h.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].frames_on_disk, 120);
    let mux_args = &seen[1].args;
    assert!(mux_args.iter().any(|a| a == &audio.to_string_lossy()));
    assert!(mux_args.iter().any(|a| a.ends_with("silent.mp4")));
    assert!(h.stages().contains(&Stage::Muxing));
    assert_eq!(h.stages().last(), Some(&Stage::Done));
    assert_eq!(h.scratch_entries(), 0);
}

#[test]
fn encoder_failure_leaves_nothing_behind() {
    let h = Harness::new();
    let orch = h.orchestrator(
        h.config(Preset::Discrete),
        FakeSource::whole(),
        FakeRunner {
            fail_with: Some(1),
            ..FakeRunner::default()
        },
    );

    let err = orch.run(&madrid(), &CancelToken::new()).unwrap_err();

    assert_eq!(err.stage, Stage::Encoding);
    assert_eq!(err.reason_code(), "encode");
    assert!(err.to_string().contains("encoding failed"));
    assert_eq!(h.scratch_entries(), 0);
    assert_eq!(h.out_entries(), 0);
    let stages = h.stages();
    assert_eq!(&stages[stages.len() - 2..], &[Stage::Cleaning, Stage::Failed]);
}

#[test]
fn acquisition_failure_never_invokes_encoder() {
    let h = Harness::new();
    let source = FakeSource {
        fail_at: Some(13.0),
        ..FakeSource::whole()
    };
    let orch = h.orchestrator(h.config(Preset::Discrete), source, FakeRunner::default());

    let err = orch.run(&madrid(), &CancelToken::new()).unwrap_err();

    assert_eq!(err.stage, Stage::AcquiringFrames);
    assert_eq!(err.reason_code(), "frame_acquisition");
    match &err.source {
        MapZoomError::FrameAcquisition { index, .. } => assert_eq!(index.0, 3),
        other => panic!("unexpected {other:?}"),
    }
    assert!(h.seen.lock().unwrap().is_empty());
    assert_eq!(h.scratch_entries(), 0);
    assert!(!h.stages().contains(&Stage::Encoding));
}

#[test]
fn fractional_schedule_needs_fractional_provider() {
    let h = Harness::new();
    let orch = h.orchestrator(
        h.config(Preset::Continuous),
        FakeSource::whole(),
        FakeRunner::default(),
    );

    let err = orch.run(&madrid(), &CancelToken::new()).unwrap_err();

    assert_eq!(err.stage, Stage::SchedulingFrames);
    assert_eq!(err.reason_code(), "invalid_input");
    assert_eq!(h.fetches.load(Ordering::SeqCst), 0);
    assert_eq!(h.scratch_entries(), 0);
    assert_eq!(
        h.stages(),
        vec![
            Stage::Idle,
            Stage::SchedulingFrames,
            Stage::Cleaning,
            Stage::Failed
        ]
    );
}

#[test]
fn zoom_range_beyond_provider_is_rejected() {
    let h = Harness::new();
    let mut cfg = h.config(Preset::Discrete);
    cfg.zoom = ZoomRange {
        min: 10.0,
        max: 21.0,
    };
    let orch = h.orchestrator(cfg, FakeSource::whole(), FakeRunner::default());
    let err = orch.plan().unwrap_err();
    assert_eq!(err.reason_code(), "invalid_input");
}

#[test]
fn plan_follows_config() {
    let h = Harness::new();
    let mut cfg = h.config(Preset::Continuous);
    cfg.mode = ZoomMode::Continuous { frames: 4 };
    cfg.zoom = ZoomRange { min: 5.0, max: 7.0 };
    let orch = h.orchestrator(cfg, FakeSource::fractional(), FakeRunner::default());
    let zooms: Vec<f64> = orch.plan().unwrap().iter().map(|f| f.zoom).collect();
    assert_eq!(zooms, vec![5.0, 5.5, 6.0, 6.5]);
}

#[test]
fn cancelled_run_does_no_work() {
    let h = Harness::new();
    let orch = h.orchestrator(
        h.config(Preset::Discrete),
        FakeSource::whole(),
        FakeRunner::default(),
    );
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = orch.run(&madrid(), &cancel).unwrap_err();

    assert_eq!(err.reason_code(), "cancelled");
    assert_eq!(h.fetches.load(Ordering::SeqCst), 0);
    assert!(h.seen.lock().unwrap().is_empty());
    assert_eq!(h.scratch_entries(), 0);
}

#[test]
fn existing_output_requires_overwrite() {
    let h = Harness::new();
    let target = h.out.path().join("taken.mp4");
    std::fs::write(&target, b"keep me").unwrap();
    let req = RenderRequest {
        out_path: Some(target.clone()),
        ..madrid()
    };

    let orch = h.orchestrator(
        h.config(Preset::Discrete),
        FakeSource::whole(),
        FakeRunner::default(),
    );
    let err = orch.run(&req, &CancelToken::new()).unwrap_err();
    assert_eq!(err.stage, Stage::Idle);
    assert_eq!(std::fs::read(&target).unwrap(), b"keep me");

    let mut cfg = h.config(Preset::Discrete);
    cfg.overwrite = true;
    let orch = h.orchestrator(cfg, FakeSource::whole(), FakeRunner::default());
    orch.run(&req, &CancelToken::new()).unwrap();
    assert_ne!(std::fs::read(&target).unwrap(), b"keep me");
}

fn tokyo() -> RenderRequest {
    RenderRequest {
        center: Coordinate::new(35.6762, 139.6503).unwrap(),
        display_name: Some("Tokyo".into()),
        out_path: None,
    }
}

#[test]
fn workspace_failure_is_reported_at_acquiring_frames() {
    let h = Harness::new();
    let blocker = h.scratch.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();
    let mut cfg = h.config(Preset::Discrete);
    cfg.scratch_root = Some(blocker);
    let orch = h.orchestrator(cfg, FakeSource::whole(), FakeRunner::default());

    let err = orch.run(&madrid(), &CancelToken::new()).unwrap_err();

    assert_eq!(err.stage, Stage::AcquiringFrames);
    assert_eq!(h.fetches.load(Ordering::SeqCst), 0);
    assert!(h.seen.lock().unwrap().is_empty());
    assert_eq!(
        h.stages(),
        vec![
            Stage::Idle,
            Stage::SchedulingFrames,
            Stage::AcquiringFrames,
            Stage::Cleaning,
            Stage::Failed
        ]
    );
}

#[test]
fn concurrent_runs_use_separate_workspaces() {
    let h = Harness::new();
    let orch = Arc::new(h.orchestrator(
        h.config(Preset::Discrete),
        FakeSource::whole(),
        FakeRunner::default(),
    ));

    let handles: Vec<_> = [madrid(), tokyo()]
        .into_iter()
        .enumerate()
        .map(|(i, req)| {
            let orch = orch.clone();
            let out = h.out.path().join(format!("run-{i}.mp4"));
            std::thread::spawn(move || {
                let req = RenderRequest {
                    out_path: Some(out),
                    ..req
                };
                orch.run(&req, &CancelToken::new())
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap().unwrap().video_path.is_file());
    }

    let seen = h.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    let input_of = |s: &Seen| {
        let i = s.args.iter().position(|a| a == "-i").unwrap();
        s.args[i + 1].clone()
    };
    assert_ne!(input_of(&seen[0]), input_of(&seen[1]));
    assert!(seen.iter().all(|s| s.frames_on_disk == 10));

    let expected_zooms: Vec<u8> = (100..=190).step_by(10).collect();
    let mut lats: Vec<u8> = seen
        .iter()
        .map(|s| {
            let lat = s.tags[0].0;
            assert!(s.tags.iter().all(|t| t.0 == lat), "mixed frames: {:?}", s.tags);
            let zooms: Vec<u8> = s.tags.iter().map(|t| t.1).collect();
            assert_eq!(zooms, expected_zooms);
            lat
        })
        .collect();
    lats.sort();
    assert_eq!(lats, vec![35, 40]);
    assert_eq!(h.scratch_entries(), 0);
}

#[test]
fn default_output_names_are_unique() {
    let a = default_output_name();
    let b = default_output_name();
    assert_ne!(a, b);
    assert!(a.starts_with("output-") && a.ends_with(".mp4"));
}

#[test]
fn artifact_serializes_for_callers() {
    let artifact = VideoArtifact {
        video_path: PathBuf::from("videos/output-1.mp4"),
        attribution: "© OpenStreetMap contributors".into(),
        provider: "static-map".into(),
        frame_count: 10,
        fps: 24.0,
        duration_secs: 10.0 / 24.0,
        display_name: None,
        has_audio: false,
    };
    let v = serde_json::to_value(&artifact).unwrap();
    assert_eq!(v["attribution"], "© OpenStreetMap contributors");
    assert_eq!(v["frame_count"], 10);
    assert_eq!(Stage::AcquiringFrames.to_string(), "acquiring_frames");
}
