mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{advance_secs, keyed_profile, profile, Harness};
use herdsman::core::{
    CdKey, EngineError, EngineTimings, HandshakeResend, InstanceState, KeyList, MessageKind,
    ScriptMessage, WindowPlacement,
};
use tokio::task::JoinSet;

fn shared_list(names: &[&str]) -> KeyList {
    KeyList::new(
        "Shared",
        names
            .iter()
            .map(|n| CdKey::new(*n, format!("{}-C", n), format!("{}-X", n)))
            .collect(),
    )
}

#[tokio::test(start_paused = true)]
async fn start_runs_and_stop_is_idempotent() {
    let h = Harness::new(vec![profile("Bot1")], vec![]);

    h.engine.start_profile("Bot1").await.unwrap();
    let running = h.engine.instance("Bot1").unwrap();
    assert_eq!(running.state, InstanceState::Running);
    assert_eq!(running.pid, Some(1000));

    h.engine.stop_profile("Bot1").await.unwrap();
    assert_eq!(h.engine.state("Bot1").unwrap(), InstanceState::Stopped);
    assert!(h.backend.process(0).close_requested.load(Ordering::SeqCst));
    assert!(!h.backend.process(0).killed.load(Ordering::SeqCst));

    let events = h.sink.event_count();
    h.engine.stop_profile("Bot1").await.unwrap();
    assert_eq!(h.sink.event_count(), events);
}

#[tokio::test(start_paused = true)]
async fn concurrent_starts_of_one_profile_conflict() {
    let h = Harness::new(vec![profile("Bot1")], vec![]);

    let (a, b) = tokio::join!(
        h.engine.start_profile("Bot1"),
        h.engine.start_profile("Bot1")
    );
    let results = [a, b];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(EngineError::StateConflict(_)))));
    assert_eq!(h.backend.launches(), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_profile_is_a_configuration_error() {
    let h = Harness::new(vec![], vec![]);
    assert!(matches!(
        h.engine.start_profile("Ghost").await,
        Err(EngineError::Configuration(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn missing_game_path_fails_the_start() {
    let h = Harness::new(
        vec![herdsman::core::Profile::new("Bot1", "")],
        vec![],
    );
    let err = h.engine.start_profile("Bot1").await.unwrap_err();
    assert_eq!(err.code(), "CONFIGURATION");
    let snapshot = h.engine.instance("Bot1").unwrap();
    assert_eq!(snapshot.state, InstanceState::Stopped);
    assert!(snapshot.last_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn one_more_start_than_keys_exhausts_the_list() {
    let h = Harness::new(
        vec![
            keyed_profile("Bot1", "Shared"),
            keyed_profile("Bot2", "Shared"),
            keyed_profile("Bot3", "Shared"),
        ],
        vec![shared_list(&["K1", "K2"])],
    );

    let mut set = JoinSet::new();
    for name in ["Bot1", "Bot2", "Bot3"] {
        let engine = Arc::clone(&h.engine);
        set.spawn(async move { (name, engine.start_profile(name).await) });
    }

    let mut ok = Vec::new();
    let mut exhausted = Vec::new();
    while let Some(joined) = set.join_next().await {
        let (name, result) = joined.unwrap();
        match result {
            Ok(()) => ok.push(name),
            Err(EngineError::ResourceExhausted(_)) => exhausted.push(name),
            Err(e) => panic!("unexpected error {}", e),
        }
    }
    assert_eq!(ok.len(), 2);
    assert_eq!(exhausted.len(), 1);

    let mut keys: Vec<String> = ok
        .iter()
        .map(|n| h.engine.instance(n).unwrap().current_key.unwrap())
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["K1", "K2"]);

    let failed = h.engine.instance(exhausted[0]).unwrap();
    assert_eq!(failed.state, InstanceState::Stopped);
    assert!(failed.last_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn held_keys_are_skipped_and_freed_keys_reused() {
    let mut list = shared_list(&["K1", "K2", "K3"]);
    list.keys[0].held = true;
    let h = Harness::new(
        vec![
            keyed_profile("Bot1", "Shared"),
            keyed_profile("Bot2", "Shared"),
            keyed_profile("Bot3", "Shared"),
        ],
        vec![list],
    );

    h.engine.start_profile("Bot1").await.unwrap();
    h.engine.start_profile("Bot2").await.unwrap();
    assert_eq!(h.engine.instance("Bot1").unwrap().current_key.as_deref(), Some("K2"));
    assert_eq!(h.engine.instance("Bot2").unwrap().current_key.as_deref(), Some("K3"));
    assert!(matches!(
        h.engine.start_profile("Bot3").await,
        Err(EngineError::ResourceExhausted(_))
    ));

    h.engine.stop_profile("Bot1").await.unwrap();
    h.engine.start_profile("Bot3").await.unwrap();
    assert_eq!(h.engine.instance("Bot3").unwrap().current_key.as_deref(), Some("K2"));

    let request = h.backend.request(2);
    let args = request.arguments.join(" ");
    assert!(args.contains("-d2c K2-C -d2x K2-X"));
}

#[tokio::test(start_paused = true)]
async fn held_key_leaves_one_key_for_two_profiles() {
    let mut list = shared_list(&["K1", "K2"]);
    list.keys[1].held = true;
    let h = Harness::new(
        vec![keyed_profile("Bot1", "Shared"), keyed_profile("Bot2", "Shared")],
        vec![list],
    );

    let (first, second) = tokio::join!(
        h.engine.start_profile("Bot1"),
        h.engine.start_profile("Bot2")
    );
    first.unwrap();
    assert!(matches!(second, Err(EngineError::ResourceExhausted(_))));
    assert_eq!(h.engine.instance("Bot1").unwrap().current_key.as_deref(), Some("K1"));
    assert_eq!(h.engine.state("Bot2").unwrap(), InstanceState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn failed_spawn_releases_the_key() {
    let h = Harness::new(
        vec![keyed_profile("Bot1", "Shared")],
        vec![shared_list(&["K1"])],
    );
    h.backend.fail_spawn.store(true, Ordering::SeqCst);

    assert!(matches!(
        h.engine.start_profile("Bot1").await,
        Err(EngineError::ProcessLifecycle(_))
    ));
    let snapshot = h.engine.instance("Bot1").unwrap();
    assert_eq!(snapshot.state, InstanceState::Stopped);
    assert_eq!(snapshot.current_key, None);

    h.backend.fail_spawn.store(false, Ordering::SeqCst);
    h.engine.start_profile("Bot1").await.unwrap();
    assert_eq!(h.engine.instance("Bot1").unwrap().current_key.as_deref(), Some("K1"));
}

#[tokio::test(start_paused = true)]
async fn clean_exit_stops_without_restart() {
    let h = Harness::new(vec![profile("Bot1")], vec![]);
    *h.backend.exit_on_spawn.lock().unwrap() = Some(0);

    h.engine.start_profile("Bot1").await.unwrap();
    advance_secs(10).await;

    let snapshot = h.engine.instance("Bot1").unwrap();
    assert_eq!(snapshot.state, InstanceState::Stopped);
    assert_eq!(snapshot.last_error, None);
    assert_eq!(h.backend.launches(), 1);
    assert_eq!(h.stored("Bot1").stats.crashes, 0);
}

#[tokio::test(start_paused = true)]
async fn crash_loop_gives_up_after_five_restarts() {
    let h = Harness::new(
        vec![keyed_profile("Bot1", "Shared").with_schedule("Night", true)],
        vec![shared_list(&["K1"])],
    );
    *h.backend.exit_on_spawn.lock().unwrap() = Some(1);

    h.engine.start_profile("Bot1").await.unwrap();
    advance_secs(120).await;

    assert_eq!(h.backend.launches(), 6);
    let snapshot = h.engine.instance("Bot1").unwrap();
    assert_eq!(snapshot.state, InstanceState::Stopped);
    assert_eq!(snapshot.current_key, None);
    assert!(snapshot.last_error.unwrap().contains("giving up"));

    let stored = h.stored("Bot1");
    assert!(!stored.schedule_enabled);
    assert_eq!(stored.stats.crashes, 6);
    assert_eq!(stored.stats.restarts, 5);

    // A user start begins a fresh recovery budget
    *h.backend.exit_on_spawn.lock().unwrap() = None;
    h.engine.start_profile("Bot1").await.unwrap();
    assert_eq!(h.engine.instance("Bot1").unwrap().crash_count, 0);
}

#[tokio::test(start_paused = true)]
async fn stop_during_restart_delay_cancels_the_restart() {
    let h = Harness::new(vec![profile("Bot1")], vec![]);
    *h.backend.exit_on_spawn.lock().unwrap() = Some(3);

    h.engine.start_profile("Bot1").await.unwrap();
    advance_secs(2).await;
    assert_eq!(h.engine.state("Bot1").unwrap(), InstanceState::Starting);

    h.engine.stop_profile("Bot1").await.unwrap();
    advance_secs(30).await;

    assert_eq!(h.engine.state("Bot1").unwrap(), InstanceState::Stopped);
    assert_eq!(h.backend.launches(), 1);
}

#[tokio::test(start_paused = true)]
async fn silent_game_is_killed_and_restarted() {
    let h = Harness::new(vec![profile("Bot1")], vec![]);

    h.engine.start_profile("Bot1").await.unwrap();
    let first = h.backend.process(0);

    advance_secs(55).await;
    assert!(!first.killed.load(Ordering::SeqCst));
    assert_eq!(h.engine.instance("Bot1").unwrap().missed_heartbeats, 2);
    // Handshake goes out on every poll until a heartbeat arrives
    assert!(h.channel.count(1000, MessageKind::Handle) >= 50);

    advance_secs(15).await;
    assert!(first.killed.load(Ordering::SeqCst));
    assert_eq!(h.backend.launches(), 2);
    assert_eq!(h.engine.state("Bot1").unwrap(), InstanceState::Running);
    assert_eq!(h.stored("Bot1").stats.crashes, 1);
}

#[tokio::test(start_paused = true)]
async fn handshake_on_check_is_resent_only_on_missed_checks() {
    let timings = EngineTimings {
        handshake_resend: HandshakeResend::OnCheck,
        ..Default::default()
    };
    let h = Harness::with_timings(vec![profile("Bot1")], vec![], timings);
    h.engine.start_profile("Bot1").await.unwrap();

    // Only the launch handshake while the heartbeat is still fresh
    advance_secs(35).await;
    assert_eq!(h.channel.count(1000, MessageKind::Handle), 1);
    assert_eq!(h.engine.instance("Bot1").unwrap().missed_heartbeats, 0);

    advance_secs(20).await;
    assert_eq!(h.engine.instance("Bot1").unwrap().missed_heartbeats, 2);
    assert_eq!(h.channel.count(1000, MessageKind::Handle), 3);
}

#[tokio::test(start_paused = true)]
async fn handshake_carries_the_launch_handle() {
    let h = Harness::new(vec![profile("Bot1")], vec![]);
    h.engine.start_profile("Bot1").await.unwrap();

    let args = h.backend.request(0).arguments.join(" ");
    assert!(args.contains("-handle hub"));
    let sent = h.channel.sent.lock().unwrap();
    let (_, _, payload) = sent
        .iter()
        .find(|(pid, kind, _)| *pid == 1000 && *kind == MessageKind::Handle)
        .unwrap();
    assert_eq!(payload, "hub");
}

#[tokio::test(start_paused = true)]
async fn stable_restart_clears_the_crash_count() {
    let timings = EngineTimings {
        crash_reset_after: Duration::from_secs(20),
        ..Default::default()
    };
    let h = Harness::with_timings(vec![profile("Bot1")], vec![], timings);
    h.engine.start_profile("Bot1").await.unwrap();

    h.backend.process(0).exit_with(3);
    advance_secs(10).await;
    assert_eq!(h.backend.launches(), 2);
    assert_eq!(h.engine.instance("Bot1").unwrap().crash_count, 1);

    advance_secs(20).await;
    let snapshot = h.engine.instance("Bot1").unwrap();
    assert_eq!(snapshot.state, InstanceState::Running);
    assert_eq!(snapshot.crash_count, 0);
}

#[tokio::test(start_paused = true)]
async fn monitor_panic_settles_only_its_profile() {
    let h = Harness::new(vec![profile("Bot1"), profile("Bot2")], vec![]);
    h.engine.start_profile("Bot1").await.unwrap();
    h.engine.start_profile("Bot2").await.unwrap();

    h.backend.process(0).poisoned.store(true, Ordering::SeqCst);
    advance_secs(3).await;

    let failed = h.engine.instance("Bot1").unwrap();
    assert_eq!(failed.state, InstanceState::Stopped);
    assert!(failed.last_error.unwrap().contains("monitor"));
    assert!(h.backend.process(0).killed.load(Ordering::SeqCst));
    assert!(!h.engine.on_heartbeat(1000));

    assert_eq!(h.engine.state("Bot2").unwrap(), InstanceState::Running);
    assert!(!h.backend.process(1).killed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn panic_during_crash_restart_stops_the_profile() {
    let h = Harness::new(vec![profile("Bot1")], vec![]);
    h.engine.start_profile("Bot1").await.unwrap();

    h.backend.panic_spawn.store(true, Ordering::SeqCst);
    h.backend.process(0).exit_with(3);
    advance_secs(10).await;

    let snapshot = h.engine.instance("Bot1").unwrap();
    assert_eq!(snapshot.state, InstanceState::Stopped);
    assert!(snapshot.last_error.unwrap().contains("restart"));

    h.backend.panic_spawn.store(false, Ordering::SeqCst);
    h.engine.start_profile("Bot1").await.unwrap();
    assert_eq!(h.engine.state("Bot1").unwrap(), InstanceState::Running);
}

#[tokio::test(start_paused = true)]
async fn panic_during_user_start_leaves_the_profile_startable() {
    let h = Harness::new(vec![profile("Bot1")], vec![]);

    h.backend.panic_spawn.store(true, Ordering::SeqCst);
    let result = h.engine.start_profile("Bot1").await;
    assert!(matches!(result, Err(EngineError::ProcessLifecycle(_))));
    assert_eq!(h.engine.state("Bot1").unwrap(), InstanceState::Stopped);

    h.backend.panic_spawn.store(false, Ordering::SeqCst);
    h.engine.start_profile("Bot1").await.unwrap();
    assert_eq!(h.engine.state("Bot1").unwrap(), InstanceState::Running);
}

#[tokio::test(start_paused = true)]
async fn slow_launch_does_not_block_other_profiles() {
    let h = Harness::new(vec![profile("Bot1"), profile("Bot2")], vec![]);
    h.engine.start_profile("Bot2").await.unwrap();

    let (release, gate) = std::sync::mpsc::channel();
    *h.backend.spawn_gate.lock().unwrap() = Some(gate);
    let engine = Arc::clone(&h.engine);
    let start = tokio::spawn(async move { engine.start_profile("Bot1").await });

    // Bot1's spawn is parked on its thread; Bot2 is still served
    h.backend.spawn_entered.notified().await;
    assert_eq!(h.engine.state("Bot1").unwrap(), InstanceState::Starting);
    h.engine.stop_profile("Bot2").await.unwrap();
    assert_eq!(h.engine.state("Bot2").unwrap(), InstanceState::Stopped);

    release.send(()).unwrap();
    start.await.unwrap().unwrap();
    assert_eq!(h.engine.state("Bot1").unwrap(), InstanceState::Running);
}

#[tokio::test(start_paused = true)]
async fn heartbeats_keep_the_game_alive() {
    let h = Harness::new(vec![profile("Bot1")], vec![]);
    h.engine.start_profile("Bot1").await.unwrap();
    let pid = h.engine.instance("Bot1").unwrap().pid.unwrap();

    for _ in 0..24 {
        h.engine
            .handle_script_message(pid, ScriptMessage::Heartbeat)
            .await
            .unwrap();
        advance_secs(5).await;
    }

    assert_eq!(h.engine.state("Bot1").unwrap(), InstanceState::Running);
    assert_eq!(h.backend.launches(), 1);
    assert!(!h.backend.process(0).killed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn script_counters_are_persisted() {
    let h = Harness::new(vec![profile("Bot1")], vec![]);
    h.engine.start_profile("Bot1").await.unwrap();
    let pid = h.engine.instance("Bot1").unwrap().pid.unwrap();

    for message in [
        ScriptMessage::Run,
        ScriptMessage::Run,
        ScriptMessage::Chicken,
        ScriptMessage::Death,
        ScriptMessage::Status("In game".into()),
    ] {
        h.engine.handle_script_message(pid, message).await.unwrap();
    }

    let stats = h.stored("Bot1").stats;
    assert_eq!(stats.runs, 2);
    assert_eq!(stats.key_runs, 2);
    assert_eq!(stats.chickens, 1);
    assert_eq!(stats.deaths, 1);
    assert_eq!(h.engine.instance("Bot1").unwrap().status_text, "In game");

    // Unknown senders are ignored
    h.engine
        .handle_script_message(4321, ScriptMessage::Run)
        .await
        .unwrap();
    assert_eq!(h.stored("Bot1").stats.runs, 2);
}

#[tokio::test(start_paused = true)]
async fn key_in_use_holds_the_key_and_rotates() {
    let h = Harness::new(
        vec![keyed_profile("Bot1", "Shared")],
        vec![shared_list(&["K1", "K2"])],
    );
    h.engine.start_profile("Bot1").await.unwrap();
    let pid = h.engine.instance("Bot1").unwrap().pid.unwrap();
    assert_eq!(h.engine.instance("Bot1").unwrap().current_key.as_deref(), Some("K1"));

    h.engine
        .handle_script_message(pid, ScriptMessage::KeyInUse)
        .await
        .unwrap();

    assert_eq!(h.engine.instance("Bot1").unwrap().current_key.as_deref(), Some("K2"));
    let list = h.engine.keys().list("Shared").unwrap();
    assert!(list.keys[0].held);
    assert_eq!(h.channel.count(pid, MessageKind::SetKey), 1);

    // Held flag survives a reload
    let reloaded = herdsman::core::KeyPool::load(h.db.clone()).unwrap();
    assert!(reloaded.list("Shared").unwrap().keys[0].held);
}

#[tokio::test(start_paused = true)]
async fn realm_down_is_counted_against_the_key() {
    let h = Harness::new(
        vec![keyed_profile("Bot1", "Shared")],
        vec![shared_list(&["K1", "K2"])],
    );
    h.engine.start_profile("Bot1").await.unwrap();
    let pid = h.engine.instance("Bot1").unwrap().pid.unwrap();

    h.engine
        .handle_script_message(pid, ScriptMessage::RealmDown)
        .await
        .unwrap();

    let list = h.engine.keys().list("Shared").unwrap();
    assert_eq!(list.keys[0].realm_down, 1);
    assert!(!list.keys[0].held);
    assert_eq!(h.engine.instance("Bot1").unwrap().current_key.as_deref(), Some("K2"));
}

#[tokio::test(start_paused = true)]
async fn rotate_key_resets_key_runs() {
    let h = Harness::new(
        vec![keyed_profile("Bot1", "Shared"), profile("Plain")],
        vec![shared_list(&["K1", "K2"])],
    );
    h.engine.start_profile("Bot1").await.unwrap();
    let pid = h.engine.instance("Bot1").unwrap().pid.unwrap();
    h.engine.handle_script_message(pid, ScriptMessage::Run).await.unwrap();
    assert_eq!(h.stored("Bot1").stats.key_runs, 1);

    assert!(h.engine.rotate_key("Bot1").await);
    assert_eq!(h.engine.instance("Bot1").unwrap().current_key.as_deref(), Some("K2"));
    let stats = h.stored("Bot1").stats;
    assert_eq!(stats.key_runs, 0);
    assert_eq!(stats.runs, 1);

    assert!(!h.engine.rotate_key("Plain").await);
    assert!(!h.engine.rotate_key("Ghost").await);
}

#[tokio::test(start_paused = true)]
async fn rotate_key_needs_a_running_profile() {
    let h = Harness::new(
        vec![keyed_profile("Bot1", "Shared")],
        vec![shared_list(&["K1", "K2"])],
    );

    assert!(!h.engine.rotate_key("Bot1").await);
    assert_eq!(h.engine.instance("Bot1").unwrap().current_key, None);
    assert_eq!(h.backend.launches(), 0);
}

#[tokio::test(start_paused = true)]
async fn release_key_frees_it_for_others() {
    let h = Harness::new(
        vec![keyed_profile("Bot1", "Shared"), keyed_profile("Bot2", "Shared")],
        vec![shared_list(&["K1"])],
    );
    h.engine.start_profile("Bot1").await.unwrap();
    h.engine.release_key("Bot1").unwrap();
    assert_eq!(h.engine.instance("Bot1").unwrap().current_key, None);

    h.engine.start_profile("Bot2").await.unwrap();
    assert_eq!(h.engine.instance("Bot2").unwrap().current_key.as_deref(), Some("K1"));
}

#[tokio::test(start_paused = true)]
async fn rename_keeps_routing_messages() {
    let h = Harness::new(vec![profile("Bot1")], vec![]);
    h.engine.start_profile("Bot1").await.unwrap();
    let pid = h.engine.instance("Bot1").unwrap().pid.unwrap();

    h.engine.rename_profile("Bot1", "Bot9").unwrap();
    h.engine.handle_script_message(pid, ScriptMessage::Run).await.unwrap();

    assert_eq!(h.stored("Bot9").stats.runs, 1);
    assert!(matches!(h.engine.state("Bot1"), Err(EngineError::Configuration(_))));
    assert_eq!(h.engine.state("Bot9").unwrap(), InstanceState::Running);

    h.engine.stop_profile("Bot9").await.unwrap();
    assert_eq!(h.engine.state("Bot9").unwrap(), InstanceState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn rename_onto_existing_name_is_rejected() {
    let h = Harness::new(vec![profile("Bot1"), profile("Bot2")], vec![]);
    assert!(matches!(
        h.engine.rename_profile("Bot1", "Bot2"),
        Err(EngineError::StateConflict(_))
    ));
    assert_eq!(h.engine.profile_names(), vec!["Bot1", "Bot2"]);
}

#[tokio::test(start_paused = true)]
async fn remove_stops_and_forgets_the_profile() {
    let h = Harness::new(vec![profile("Bot1")], vec![]);
    h.engine.start_profile("Bot1").await.unwrap();
    let pid = h.engine.instance("Bot1").unwrap().pid.unwrap();

    h.engine.remove_profile("Bot1").await.unwrap();

    assert!(h.backend.process(0).killed.load(Ordering::SeqCst));
    assert!(h.engine.profile_names().is_empty());
    assert!(!h.engine.on_heartbeat(pid));
    use herdsman::core::ProfileStore;
    assert!(h.db.load_profile("Bot1").unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn add_profile_registers_an_instance() {
    let h = Harness::new(vec![], vec![]);
    h.engine.add_profile(profile("Bot1")).unwrap();
    assert!(matches!(
        h.engine.add_profile(profile("Bot1")),
        Err(EngineError::StateConflict(_))
    ));
    h.engine.start_profile("Bot1").await.unwrap();
    assert_eq!(h.engine.state("Bot1").unwrap(), InstanceState::Running);
}

#[tokio::test(start_paused = true)]
async fn reset_stats_publishes_a_snapshot() {
    let h = Harness::new(vec![profile("Bot1"), profile("Bot2")], vec![]);
    h.engine.start_profile("Bot1").await.unwrap();
    let pid = h.engine.instance("Bot1").unwrap().pid.unwrap();
    h.engine.handle_script_message(pid, ScriptMessage::Death).await.unwrap();

    h.engine.reset_stats("Bot1").unwrap();

    assert_eq!(h.stored("Bot1").stats.deaths, 0);
    let snapshots = h.sink.snapshots.lock().unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].len(), 2);
    assert_eq!(snapshots[0][0].state, InstanceState::Running);
    assert_eq!(snapshots[0][0].pid, Some(pid));
}

#[tokio::test(start_paused = true)]
async fn commands_and_windows_need_a_running_game() {
    let h = Harness::new(vec![profile("Bot1")], vec![]);
    assert!(matches!(
        h.engine.send_command("Bot1", "mule"),
        Err(EngineError::StateConflict(_))
    ));

    h.engine.start_profile("Bot1").await.unwrap();
    let pid = h.engine.instance("Bot1").unwrap().pid.unwrap();
    h.engine.send_command("Bot1", "mule").unwrap();
    h.engine.hide_window("Bot1").unwrap();
    h.engine
        .move_window("Bot1", WindowPlacement { x: 5, y: 5 })
        .unwrap();

    assert_eq!(h.channel.count(pid, MessageKind::Command), 1);
    assert_eq!(*h.backend.shown.lock().unwrap(), vec![(pid, false)]);
}

#[tokio::test(start_paused = true)]
async fn script_stop_request_stops_the_profile() {
    let h = Harness::new(vec![profile("Bot1")], vec![]);
    h.engine.start_profile("Bot1").await.unwrap();
    let pid = h.engine.instance("Bot1").unwrap().pid.unwrap();

    h.engine.handle_script_message(pid, ScriptMessage::Stop).await.unwrap();
    advance_secs(1).await;

    assert_eq!(h.engine.state("Bot1").unwrap(), InstanceState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn start_all_and_stop_all_cover_every_profile() {
    let h = Harness::new(vec![profile("Bot1"), profile("Bot2")], vec![]);

    let started = h.engine.start_all().await;
    assert_eq!(started.len(), 2);
    assert!(started.iter().all(|(_, r)| r.is_ok()));

    let stopped = h.engine.stop_all().await;
    assert!(stopped.iter().all(|(_, r)| r.is_ok()));
    for name in ["Bot1", "Bot2"] {
        assert_eq!(h.engine.state(name).unwrap(), InstanceState::Stopped);
    }
}
