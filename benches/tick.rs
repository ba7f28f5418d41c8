use criterion::{black_box, criterion_group, criterion_main, Criterion};

use strikepoint_server::game::capture::CapturePoint;
use strikepoint_server::game::combatant::ActorRef;
use strikepoint_server::game::entity::Soldier;
use strikepoint_server::game::game_loop::{GameLoop, GameLoopConfig};
use strikepoint_server::game::spawn::{build_payload, DefaultLoadout, LoadoutProvider, PadSpawnSelector, SpawnPad};
use strikepoint_server::net::replication::{apply_snapshot, emit_snapshot};
use strikepoint_server::net::session::Session;
use strikepoint_server::util::vec3::Vec3;

fn bench_soldier_snapshot(c: &mut Criterion) {
    let actor = ActorRef::bot(1);
    let payload = build_payload(actor, 0, 1, vec![2, 4], DefaultLoadout.loadout(actor, 0));
    let soldier = Soldier::spawn(actor, 1, Vec3::new(10.0, 0.0, -4.0), 0.7, &payload);
    let mut target = soldier.clone();

    c.bench_function("soldier_snapshot_emit", |b| {
        b.iter(|| black_box(emit_snapshot(&soldier)))
    });

    let bytes = emit_snapshot(&soldier);
    c.bench_function("soldier_snapshot_apply", |b| {
        b.iter(|| apply_snapshot(&mut target, black_box(&bytes)).unwrap())
    });
}

fn bench_authority_tick(c: &mut Criterion) {
    let pads = vec![
        SpawnPad {
            team: 0,
            position: Vec3::new(-60.0, 0.0, 0.0),
            yaw: 0.0,
        },
        SpawnPad {
            team: 1,
            position: Vec3::new(60.0, 0.0, 0.0),
            yaw: std::f32::consts::PI,
        },
    ];
    let flags = vec![
        CapturePoint::new(0, Vec3::new(-30.0, 0.0, 0.0), 6.0),
        CapturePoint::new(1, Vec3::new(30.0, 0.0, 0.0), 6.0),
    ];

    let mut session = Session::host("Bench", 64);
    let mut game = GameLoop::new(
        GameLoopConfig {
            capacity: 64,
            team_count: 2,
            bot_fill: true,
            model_pool: vec![0, 1],
        },
        flags,
        Box::new(PadSpawnSelector::new(pads)),
        Box::new(DefaultLoadout),
    );
    game.register_human(&mut session, 1, "Bench".into());
    game.select_team(&mut session, 1, 0);
    game.start(&mut session);

    // Let the roster spawn in before measuring steady-state ticks
    for _ in 0..60 {
        game.authority_tick(&mut session);
        session.drain_outbox();
    }

    c.bench_function("authority_tick_64", |b| {
        b.iter(|| {
            game.authority_tick(&mut session);
            black_box(session.drain_outbox())
        })
    });
}

criterion_group!(benches, bench_soldier_snapshot, bench_authority_tick);
criterion_main!(benches);
