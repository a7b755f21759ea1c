//! End-to-end tests for the lighting dispatcher against a mock link.

use caselights::animation::{Animation, AnimationKind};
use caselights::audio::AudioFeed;
use caselights::dispatcher::{LightingDispatcher, SignalSources, TickOutcome};
use caselights::hardware::mock::MockLink;
use caselights::mapping::Rgb;
use caselights::mode::{AudioVariant, Mode};
use caselights::protocol::FrameFormat;
use caselights::signal::StatsSample;
use std::time::Duration;
use tokio::sync::watch;

fn parse_frame(frame: &str) -> Option<(u8, u8, u8)> {
    let body = frame.strip_suffix('\n')?;
    let mut parts = body.split(',');
    let r = parts.next()?.parse().ok()?;
    let g = parts.next()?.parse().ok()?;
    let b = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((r, g, b))
}

#[tokio::test]
async fn static_red_then_off() {
    let link = MockLink::new();
    let dispatcher = LightingDispatcher::new(link.clone(), SignalSources::default());

    dispatcher.set_mode(Mode::Static(Rgb::new(255, 0, 0)));
    dispatcher.tick().await.unwrap();
    dispatcher.set_mode(Mode::Off);
    dispatcher.tick().await.unwrap();

    assert_eq!(link.frames(), vec!["255,0,0\n", "0,0,0\n"]);
}

#[tokio::test]
async fn mode_changes_apply_on_next_tick_only() {
    let link = MockLink::new();
    let dispatcher = LightingDispatcher::new(link.clone(), SignalSources::default());

    dispatcher.set_mode(Mode::Static(Rgb::new(0, 0, 255)));
    dispatcher.set_brightness(0.5);
    assert!(link.frames().is_empty());

    dispatcher.tick().await.unwrap();
    assert_eq!(link.frames(), vec!["0,0,128\n"]);
}

#[tokio::test]
async fn stats_mode_tracks_latest_sample() {
    let link = MockLink::new();
    let sources = SignalSources::default();
    let dispatcher = LightingDispatcher::new(link.clone(), sources.clone());
    dispatcher.set_mode("stats:level:0".parse().unwrap());

    sources.stats.set(Some(StatsSample::new(50.0, 0.0, 100.0)));
    dispatcher.tick().await.unwrap();
    sources.stats.set(Some(StatsSample::new(100.0, 0.0, 100.0)));
    dispatcher.tick().await.unwrap();

    assert_eq!(link.frames(), vec!["128,0,0\n", "255,0,0\n"]);
}

#[tokio::test]
async fn blink_animation_over_ticks() {
    let link = MockLink::new();
    let interval = Duration::from_millis(10);
    let dispatcher = LightingDispatcher::with_settings(
        link.clone(),
        SignalSources::default(),
        FrameFormat::Csv,
        interval,
    );
    dispatcher.set_mode(Mode::Animation(
        Animation::new(AnimationKind::Blink(Rgb::new(0, 255, 0))).with_cycle(interval * 3),
    ));

    for _ in 0..6 {
        dispatcher.tick().await.unwrap();
    }

    let on = "0,255,0\n";
    let off = "0,0,0\n";
    assert_eq!(link.frames(), vec![on, on, off, on, on, off]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ticks_and_audio_deliveries_interleave_cleanly() {
    let link = MockLink::new();
    let sources = SignalSources::default();
    let dispatcher = LightingDispatcher::new(link.clone(), sources.clone());
    dispatcher.set_mode(Mode::Audio(AudioVariant::Spectrum));

    // Every published spectrum color is gray, so a frame mixing two
    // deliveries would show unequal channels.
    let audio = tokio::task::spawn_blocking(move || {
        for i in 0..1000u32 {
            let k = (i % 256) as u8;
            sources.spectrum.set(Rgb::new(k, k, k));
        }
    });

    let mut sent = 0;
    for _ in 0..1000 {
        match dispatcher.tick().await.unwrap() {
            TickOutcome::Sent(frame) => {
                let (r, g, b) = parse_frame(&frame).unwrap();
                assert!(r == g && g == b, "torn frame {:?}", frame);
                sent += 1;
            }
            TickOutcome::Skipped => {}
        }
    }
    audio.await.unwrap();

    assert_eq!(sent, 1000);
    let frames = link.frames();
    assert_eq!(frames.len(), 1000);
    assert!(frames.iter().all(|f| parse_frame(f).is_some()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn level_frames_match_a_delivered_level() {
    let link = MockLink::new();
    let sources = SignalSources::default();
    let dispatcher = LightingDispatcher::new(link.clone(), sources.clone());
    dispatcher.set_mode(Mode::Audio(AudioVariant::Level { hue: 0.0 }));

    let levels: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
    let delivered = levels.clone();
    let audio = tokio::task::spawn_blocking(move || {
        let mut feed = AudioFeed::new(sources.intensity.clone(), sources.spectrum.clone());
        for i in 0..1000 {
            feed.deliver(&vec![delivered[i % delivered.len()]; 256]);
        }
    });

    let allowed: Vec<u8> = levels
        .iter()
        .map(|level| (f64::from(*level) * 255.0).round() as u8)
        .collect();
    for _ in 0..1000 {
        if let TickOutcome::Sent(frame) = dispatcher.tick().await.unwrap() {
            let (r, g, b) = parse_frame(&frame).unwrap();
            assert_eq!((g, b), (0, 0), "unexpected frame {:?}", frame);
            assert!(
                allowed.iter().any(|a| a.abs_diff(r) <= 1),
                "red {} matches no delivered level",
                r
            );
        }
    }
    audio.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ticks_never_overlap_writes() {
    let link = MockLink::new();
    link.set_write_delay(Duration::from_millis(2));
    let dispatcher = LightingDispatcher::new(link.clone(), SignalSources::default());
    dispatcher.set_mode(Mode::Static(Rgb::new(10, 20, 30)));

    let mut handles = Vec::new();
    for _ in 0..50 {
        let d = dispatcher.clone();
        handles.push(tokio::spawn(async move { d.tick().await.unwrap() }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let counters = dispatcher.counters();
    assert_eq!(counters.sent + counters.skipped, 50);
    assert_eq!(link.frames().len() as u64, counters.sent);
    assert!(counters.sent >= 1);
}

#[tokio::test]
async fn run_loop_survives_failures_and_shuts_down() {
    let link = MockLink::new();
    let dispatcher = LightingDispatcher::with_settings(
        link.clone(),
        SignalSources::default(),
        FrameFormat::Csv,
        Duration::from_millis(5),
    );
    dispatcher.set_mode(Mode::Static(Rgb::new(1, 1, 1)));

    let (stop_tx, stop_rx) = watch::channel(false);
    let runner = dispatcher.clone();
    let handle = tokio::spawn(async move { runner.run(stop_rx).await });

    link.set_fail_writes(true);
    tokio::time::sleep(Duration::from_millis(40)).await;
    link.set_fail_writes(false);
    tokio::time::sleep(Duration::from_millis(40)).await;

    stop_tx.send(true).unwrap();
    handle.await.unwrap();

    let counters = dispatcher.counters();
    assert!(counters.failed > 0);
    assert!(counters.sent > 0);

    tokio::time::sleep(Duration::from_millis(20)).await;
    dispatcher.shutdown().await.unwrap();
    let frames = link.frames();
    assert_eq!(&frames[frames.len() - 2..], ["0,0,0\n", "UV 0\n"]);
    assert!(!link.is_open());
}
