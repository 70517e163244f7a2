use anyhow::Result;

use video_stabilizer::ingest::{open_source, MemorySource};
use video_stabilizer::{
    FrameSource, MemorySink, RelativeTransform, StabilizationPlan, Stabilizer, SyntheticClip,
};

/// Content offset of output frame `i`: raw offset shifted by its correction.
fn output_offsets(clip: &SyntheticClip, plan: &StabilizationPlan) -> Vec<f64> {
    plan.corrective()
        .iter()
        .enumerate()
        .map(|(i, c)| clip.offset(i).0 + c.dx)
        .collect()
}

#[test]
fn jittery_pan_is_smoothed_to_steady_motion() -> Result<()> {
    let clip = SyntheticClip::default();
    assert_eq!((clip.frames, clip.pan_x, clip.jitter), (100, 1.0, 5.0));

    let relative: Vec<RelativeTransform> = (0..clip.frames - 1)
        .map(|i| {
            let (dx, dy) = clip.true_motion(i);
            RelativeTransform::new(dx, dy, 0.0)
        })
        .collect();
    let plan = StabilizationPlan::build(relative, 30)?;
    assert_eq!(plan.len(), 99);

    // Raw frame-to-frame motion swings between -9 and +11.
    let raw_swing = (0..10)
        .map(|i| clip.true_motion(i).0)
        .fold(0.0f64, |acc, dx| acc.max((dx - clip.pan_x).abs()));
    assert!(raw_swing >= 9.0);

    let offsets = output_offsets(&clip, &plan);
    for i in 30..68 {
        let step = offsets[i + 1] - offsets[i];
        assert!(
            (step - clip.pan_x).abs() < 0.2,
            "step {} at {} is not close to the pan rate",
            step,
            i
        );
    }

    // Smoothed trajectory keeps the pan: slope of a least-squares line ~ 1.
    let n = 38.0;
    let xs: Vec<f64> = (30..68).map(|i| i as f64).collect();
    let ys: Vec<f64> = (30..68).map(|i| plan.smoothed()[i].x).collect();
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let cov: f64 = xs.iter().zip(&ys).map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();
    let var: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    assert!((cov / var - 1.0).abs() < 0.05);

    for c in plan.corrective() {
        assert_eq!(c.dy, 0.0);
        assert_eq!(c.da, 0.0);
    }
    Ok(())
}

#[test]
fn estimator_tracks_synthetic_clip() -> Result<()> {
    let url = "stub://shaky?frames=12&width=160&height=120&pan=1&jitter=3";
    let clip = SyntheticClip::from_url(url)?;
    let mut source = open_source(url)?;

    let stabilizer = Stabilizer::default();
    let motion = stabilizer.estimate_motion(&mut source, |_, _| {})?;
    assert_eq!(motion.frames_read, 12);
    assert_eq!(motion.relative.len(), 11);

    let close = motion
        .relative
        .iter()
        .enumerate()
        .filter(|(i, t)| {
            let (dx, dy) = clip.true_motion(*i);
            (t.dx - dx).abs() < 0.5 && (t.dy - dy).abs() < 0.5 && t.da.abs() < 0.01
        })
        .count();
    assert!(close >= 9, "only {} of 11 pairs matched the true motion", close);

    let plan = stabilizer.plan(&motion)?;
    let mut sink = MemorySink::new();
    let written = stabilizer.render(&mut source, &plan, &mut sink, |_, _| {})?;
    assert_eq!(written, 11);
    assert!(sink.frames().iter().all(|f| f.dimensions() == (160, 120)));
    Ok(())
}

#[test]
fn output_has_one_frame_per_pair() -> Result<()> {
    let mut source = open_source("stub://x?frames=5&width=48&height=32&jitter=0")?;
    let run = Stabilizer::default().run(&mut source, |_| Ok(MemorySink::new()), |_, _| {})?;
    assert_eq!(run.summary.frames_read, 5);
    assert_eq!(run.summary.pairs, 4);
    assert_eq!(run.summary.frames_written, 4);
    assert_eq!(run.summary.fps, 30.0);
    Ok(())
}

#[test]
fn short_second_pass_truncates_output() -> Result<()> {
    let clip = SyntheticClip::from_url("stub://x?frames=6&width=48&height=32")?;
    let frames = (0..clip.frames)
        .map(|i| clip.render(i))
        .collect::<Result<Vec<_>>>()?;
    let mut source = MemorySource::new(frames, clip.fps)?.truncate_after_rewind(3);
    assert_eq!(source.info().frame_count, Some(6));

    let run = Stabilizer::default().run(&mut source, |_| Ok(MemorySink::new()), |_, _| {})?;
    assert_eq!(run.summary.pairs, 5);
    assert_eq!(run.summary.frames_written, 3);
    Ok(())
}

#[test]
fn empty_video_is_rejected() -> Result<()> {
    let mut source = open_source("stub://empty?frames=0&width=8&height=8")?;
    let err = Stabilizer::default()
        .run(&mut source, |_| Ok(MemorySink::new()), |_, _| {})
        .err()
        .map(|e| e.to_string());
    assert_eq!(err.as_deref(), Some("no frames in video"));
    Ok(())
}

#[test]
fn plan_exports_all_sequences_as_json() -> Result<()> {
    let relative = vec![
        RelativeTransform::new(1.0, 0.0, 0.0),
        RelativeTransform::new(-1.0, 2.0, 0.01),
    ];
    let plan = StabilizationPlan::build(relative, 1)?;
    let value: serde_json::Value = serde_json::from_str(&plan.to_json()?)?;
    assert_eq!(value["radius"], 1);
    for key in ["relative", "trajectory", "smoothed", "corrective"] {
        assert_eq!(value[key].as_array().map(Vec::len), Some(2), "{}", key);
    }
    Ok(())
}
