// SPDX-License-Identifier: MPL-2.0

//! End-to-end tests for burst capture and fusion

use burst_camera::backends::file_source::DirectoryFrameSource;
use burst_camera::backends::synthetic::{SyntheticCamera, SyntheticFrame, encode_rgb16_tiff};
use burst_camera::errors::{AppError, SourceError};
use burst_camera::pipelines::photo::burst_mode::burst::FrameReceiver;
use burst_camera::pipelines::photo::{
    BurstCamera, BurstCoordinator, FusionProcessor, LiveFrameSource, OutputMode,
};
use burst_camera::{Config, Status, StatusSink};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingStatus(Mutex<Vec<String>>);

impl RecordingStatus {
    fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl StatusSink for RecordingStatus {
    fn post(&self, status: &Status) {
        self.0.lock().unwrap().push(status.to_string());
    }
}

fn grey_frame() -> Vec<u8> {
    encode_rgb16_tiff(&SyntheticFrame::solid(48, 32, 0.5)).unwrap()
}

fn write_frames(dir: &Path, frames: &[Vec<u8>]) {
    for (i, data) in frames.iter().enumerate() {
        std::fs::write(dir.join(format!("frame_{:03}.tif", i)), data).unwrap();
    }
}

fn test_config(output: &Path) -> Config {
    Config {
        output_dir: Some(output.join("photos")),
        fallback_dir: Some(output.join("unsaved")),
        ..Config::default()
    }
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

fn directory_camera(
    config: &Config,
    input: &Path,
    status: Arc<RecordingStatus>,
) -> BurstCamera<FusionProcessor> {
    BurstCamera::new(
        FusionProcessor::from_config(config, status.clone()),
        Arc::new(DirectoryFrameSource::new(input)),
        status,
        tokio::runtime::Handle::current(),
    )
}

#[tokio::test]
async fn test_grey_burst_fuses_to_mid_grey_photo() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_frames(input.path(), &vec![grey_frame(); 6]);

    let config = test_config(output.path());
    let status = Arc::new(RecordingStatus::default());
    let camera = directory_camera(&config, input.path(), status.clone());

    let ticket = camera.start_burst(6, OutputMode::EncodedOnly).await.unwrap();
    let result = ticket.wait().await.unwrap().unwrap();

    assert_eq!(
        status.messages(),
        vec!["capturing burst of size 6", "saved encoded-only"]
    );
    assert_eq!(result.report.frames_fused, 6);
    assert!(result.stored.raw.is_none());
    assert_eq!(files_in(&output.path().join("photos")).len(), 1);

    let photo = image::open(&result.stored.photo).unwrap().to_rgb8();
    assert_eq!(photo.dimensions(), (48, 32));
    let mean = photo.as_raw().iter().map(|&v| v as f64).sum::<f64>() / photo.as_raw().len() as f64;
    assert!((mean - 188.0).abs() < 3.0, "mean {}", mean);
}

#[tokio::test]
async fn test_corrupt_frame_is_skipped() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let mut frames = vec![grey_frame(); 4];
    frames[2] = b"not a raw container".to_vec();
    write_frames(input.path(), &frames);

    let config = test_config(output.path());
    let status = Arc::new(RecordingStatus::default());
    let camera = directory_camera(&config, input.path(), status.clone());

    let ticket = camera.start_burst(4, OutputMode::EncodedOnly).await.unwrap();
    let result = ticket.wait().await.unwrap().unwrap();

    let messages = status.messages();
    assert_eq!(messages.len(), 3);
    assert!(messages[1].starts_with("skipped frame 2:"), "{:?}", messages);
    assert_eq!(messages[2], "saved encoded-only");
    assert_eq!(result.report.frames_received, 4);
    assert_eq!(result.report.frames_fused, 3);
}

#[tokio::test]
async fn test_undecodable_burst_writes_nothing() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_frames(input.path(), &vec![b"garbage".to_vec(); 3]);

    let config = test_config(output.path());
    let status = Arc::new(RecordingStatus::default());
    let camera = directory_camera(&config, input.path(), status.clone());

    let ticket = camera.start_burst(3, OutputMode::EncodedPlusRaw).await.unwrap();
    let err = ticket.wait().await.unwrap().unwrap_err();

    assert!(matches!(err, AppError::Pipeline(_)));
    let messages = status.messages();
    assert_eq!(messages.len(), 2);
    assert!(
        messages[1].starts_with("process error: no decodable frames"),
        "{:?}",
        messages
    );
    assert!(files_in(&output.path().join("photos")).is_empty());
    assert!(files_in(&output.path().join("unsaved")).is_empty());
}

#[tokio::test]
async fn test_raw_artifact_is_middle_frame_verbatim() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let frames: Vec<Vec<u8>> = (0..6)
        .map(|i| encode_rgb16_tiff(&SyntheticFrame::solid(16, 16, 0.3 + 0.05 * i as f32)).unwrap())
        .collect();
    write_frames(input.path(), &frames);

    let config = test_config(output.path());
    let status = Arc::new(RecordingStatus::default());
    let camera = directory_camera(&config, input.path(), status.clone());

    let ticket = camera.start_burst(6, OutputMode::EncodedPlusRaw).await.unwrap();
    let result = ticket.wait().await.unwrap().unwrap();

    let raw_path = result.stored.raw.expect("raw artifact");
    assert_eq!(std::fs::read(&raw_path).unwrap(), frames[3]);
    assert_eq!(status.messages().last().unwrap(), "saved encoded-plus-raw");
    assert_eq!(files_in(&output.path().join("photos")).len(), 2);
}

#[tokio::test]
async fn test_short_directory_aborts_burst() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_frames(input.path(), &vec![grey_frame(); 2]);

    let config = test_config(output.path());
    let status = Arc::new(RecordingStatus::default());
    let camera = directory_camera(&config, input.path(), status.clone());

    let err = camera
        .start_burst(5, OutputMode::EncodedOnly)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Source(SourceError::NotEnoughFrames {
            found: 2,
            requested: 5
        })
    ));
    assert!(!camera.coordinator().is_collecting());
    assert!(status.messages()[1].starts_with("capture error:"));

    // The coordinator is free for the next burst
    write_frames(input.path(), &vec![grey_frame(); 5]);
    let ticket = camera.start_burst(5, OutputMode::EncodedOnly).await.unwrap();
    assert!(ticket.wait().await.unwrap().is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_live_source_out_of_order_completions() {
    let output = tempfile::tempdir().unwrap();
    let device = SyntheticCamera::new(vec![grey_frame()]).with_delays(vec![
        Duration::from_millis(40),
        Duration::from_millis(5),
        Duration::from_millis(25),
        Duration::from_millis(0),
    ]);

    let config = test_config(output.path());
    let status = Arc::new(RecordingStatus::default());
    let camera = BurstCamera::new(
        FusionProcessor::from_config(&config, status.clone()),
        Arc::new(LiveFrameSource::new(device)),
        status.clone(),
        tokio::runtime::Handle::current(),
    );

    let ticket = camera.start_burst(4, OutputMode::EncodedOnly).await.unwrap();
    let result = ticket.wait().await.unwrap().unwrap();

    assert_eq!(result.report.frames_fused, 4);
    assert_eq!(
        status.messages(),
        vec!["capturing burst of size 4", "saved encoded-only"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_capture_does_not_count_toward_burst() {
    let output = tempfile::tempdir().unwrap();
    let device = SyntheticCamera::new(vec![grey_frame()]).with_failures([1]);

    let config = test_config(output.path());
    let status = Arc::new(RecordingStatus::default());
    let camera = BurstCamera::new(
        FusionProcessor::from_config(&config, status.clone()),
        Arc::new(LiveFrameSource::new(device)),
        status.clone(),
        tokio::runtime::Handle::current(),
    );

    let ticket = camera.start_burst(3, OutputMode::EncodedOnly).await.unwrap();

    // Two good captures land, the third never does
    for _ in 0..200 {
        if camera.coordinator().collected_count() == 2
            && status.messages().iter().any(|m| m.starts_with("capture error"))
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(camera.coordinator().collected_count(), 2);
    assert!(camera.coordinator().is_collecting());

    // A replacement frame completes the burst
    camera.coordinator().submit_frame(grey_frame()).unwrap();
    let result = ticket.wait().await.unwrap().unwrap();
    assert_eq!(result.report.frames_fused, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submission_dispatches_once() {
    let output = tempfile::tempdir().unwrap();
    let config = test_config(output.path());
    let status = Arc::new(RecordingStatus::default());
    let coordinator = Arc::new(BurstCoordinator::new(
        FusionProcessor::from_config(&config, status.clone()),
        tokio::runtime::Handle::current(),
    ));
    let ticket = coordinator.begin_burst(8, OutputMode::EncodedOnly).unwrap();
    let frame = grey_frame();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            let frame = frame.clone();
            std::thread::spawn(move || coordinator.submit_frame(frame).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let result = ticket.wait().await.unwrap().unwrap();
    assert_eq!(result.report.frames_received, 8);
    assert_eq!(
        status
            .messages()
            .iter()
            .filter(|m| m.starts_with("saved"))
            .count(),
        1
    );
    assert!(coordinator.submit_frame(frame).is_err());
}
