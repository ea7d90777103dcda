use std::cell::RefCell;
use std::rc::Rc;

use voxedit_common::{Block, BlockPos, Region, SessionId};
use voxedit_engine::{
    Command, CommandOutput, EditContext, EditContextExt, EditEngine, EngineConfig, FILL_PHASES,
    FillBody, FillMode,
};
use voxedit_jobs::{JobError, JobHandle, JobId, Step};
use voxedit_kernel::World;

fn engine_with(config: EngineConfig) -> EditEngine {
    EditEngine::with_world(config, World::new())
}

fn stone() -> Option<Block> {
    Some(Block::new("stone"))
}

fn cube(size: i32) -> Region {
    Region::cuboid(BlockPos::ZERO, BlockPos::new(size - 1, size - 1, size - 1))
}

fn run_until_idle(engine: &mut EditEngine) -> usize {
    for ticks in 0..1_000 {
        if engine.scheduler().is_empty() {
            return ticks;
        }
        engine.tick();
    }
    panic!("jobs still running after 1000 ticks");
}

fn started(output: CommandOutput) -> JobId {
    match output {
        CommandOutput::Started { job } => job,
        other => panic!("expected a started job, got {other:?}"),
    }
}

fn say(text: &str) -> CommandOutput {
    CommandOutput::Message(text.to_string())
}

#[test]
fn fill_then_undo_then_redo() {
    let mut engine = engine_with(EngineConfig::default());
    let id = engine.join("alex");
    engine
        .dispatch(id, Command::Select { corner: 0, pos: BlockPos::ZERO })
        .unwrap();
    engine
        .dispatch(id, Command::Select { corner: 1, pos: BlockPos::new(3, 3, 3) })
        .unwrap();
    let before = engine.world().state_hash();

    started(engine.dispatch(id, Command::Set { region: None, block: stone() }).unwrap());
    run_until_idle(&mut engine);
    assert_eq!(engine.world().block_count(), 64);
    let after = engine.world().state_hash();

    assert_eq!(engine.dispatch(id, Command::Undo).unwrap(), say("Undo successful."));
    assert_eq!(engine.world().state_hash(), before);
    assert_eq!(engine.dispatch(id, Command::Redo).unwrap(), say("Redo successful."));
    assert_eq!(engine.world().state_hash(), after);
    assert_eq!(engine.dispatch(id, Command::Redo).unwrap(), say("Nothing left to redo."));
}

#[test]
fn replace_only_touches_matching_blocks() {
    let mut world = World::new();
    world.set_block(BlockPos::new(1, 0, 0), Some(Block::new("dirt"))).unwrap();
    world.set_block(BlockPos::new(2, 0, 0), Some(Block::new("sand"))).unwrap();
    let mut engine = EditEngine::with_world(EngineConfig::default(), world);
    let id = engine.join("alex");

    let handle = engine
        .run_edit_body(
            id,
            Some(FILL_PHASES),
            FillBody::new(
                Region::cuboid(BlockPos::ZERO, BlockPos::new(3, 0, 0)),
                FillMode::Replace { from: Some(Block::new("dirt")), to: stone() },
            ),
        )
        .unwrap();
    run_until_idle(&mut engine);

    assert_eq!(handle.try_take().unwrap().unwrap(), 1);
    let world = engine.world();
    assert_eq!(world.get_block(BlockPos::new(1, 0, 0)).unwrap(), Some(&Block::new("stone")));
    assert_eq!(world.get_block(BlockPos::new(2, 0, 0)).unwrap(), Some(&Block::new("sand")));
    assert_eq!(world.block_count(), 2);
}

#[test]
fn history_keeps_only_newest_records() {
    let mut engine = engine_with(EngineConfig::default());
    let id = engine.join("alex");
    for x in 0..25 {
        let pos = BlockPos::new(x, 0, 0);
        engine
            .dispatch(id, Command::Set { region: Some(Region::cuboid(pos, pos)), block: stone() })
            .unwrap();
        run_until_idle(&mut engine);
    }
    assert_eq!(engine.world().block_count(), 25);

    for _ in 0..20 {
        assert_eq!(engine.dispatch(id, Command::Undo).unwrap(), say("Undo successful."));
    }
    assert_eq!(engine.dispatch(id, Command::Undo).unwrap(), say("Nothing left to undo."));
    assert_eq!(engine.world().block_count(), 5);
}

#[test]
fn failing_job_restores_the_world() {
    let mut world = World::new();
    world.set_block(BlockPos::new(5, 0, 5), Some(Block::new("dirt"))).unwrap();
    let mut engine = EditEngine::with_world(EngineConfig::default(), world);
    let id = engine.join("alex");
    let before = engine.world().state_hash();

    let region = Region::cuboid(BlockPos::ZERO, BlockPos::new(9, 0, 9));
    let mut cells = region.clone().into_iter();
    let mut step = 0u32;
    let mut opened = false;
    let handle = engine
        .run_edit(id, Some(100), move |cx: &mut EditContext<'_>| {
            step += 1;
            let mut scope = cx.edit()?;
            if !opened {
                let record = scope.record()?;
                scope.track(record, std::slice::from_ref(&region))?;
                opened = true;
            }
            if step == 57 {
                return Err("generator failed".into());
            }
            let pos = cells.next().ok_or("ran out of cells")?;
            scope.world().set_block(pos, Some(Block::new("gold")))?;
            cx.next_step(format!("step {step}"));
            Ok(Step::<()>::Yield)
        })
        .unwrap();

    let mut failed = None;
    for _ in 0..100 {
        let report = engine.tick();
        if let Some(job) = report.pump.finished.first() {
            failed = Some(job.clone());
            assert_eq!(report.rolled_back, vec![id]);
            break;
        }
    }
    let failed = failed.unwrap();
    assert_eq!(failed.error.as_deref(), Some("generator failed"));
    assert!(matches!(handle.try_take(), Some(Err(JobError::Failed(_)))));
    assert_eq!(engine.world().state_hash(), before);

    let history = engine.session(id).unwrap().history();
    assert!(!history.is_recording());
    assert_eq!(history.undo_len(), 0);
    assert_eq!(history.stored_snapshots(), 0);
}

#[test]
fn cancelled_fill_leaves_world_unchanged() {
    let mut engine = engine_with(EngineConfig::default());
    let id = engine.join("alex");
    let before = engine.world().state_hash();

    let handle = engine
        .run_edit_body(
            id,
            Some(FILL_PHASES),
            FillBody::new(cube(4), FillMode::Set(stone())).with_blocks_per_step(4),
        )
        .unwrap();
    for _ in 0..5 {
        engine.tick();
    }
    assert!(engine.world().block_count() > 0);
    assert!(engine.session(id).unwrap().history().is_recording());

    let out = engine.dispatch(id, Command::Cancel(handle.id())).unwrap();
    assert_eq!(out, say("Cancelled 1 job(s)."));
    engine.tick();

    assert!(matches!(handle.try_take(), Some(Err(JobError::Cancelled(_)))));
    assert_eq!(engine.world().state_hash(), before);
    assert_eq!(engine.session(id).unwrap().history().undo_len(), 0);
    assert_eq!(engine.dispatch(id, Command::Undo).unwrap(), say("Nothing left to undo."));
}

#[test]
fn history_refused_while_a_job_records() {
    let mut engine = engine_with(EngineConfig::default());
    let id = engine.join("alex");
    engine
        .run_edit_body(
            id,
            Some(FILL_PHASES),
            FillBody::new(cube(4), FillMode::Set(stone())).with_blocks_per_step(1),
        )
        .unwrap();
    engine.tick();

    assert!(engine.dispatch(id, Command::Undo).is_err());
    assert!(engine.dispatch(id, Command::Set { region: Some(cube(2)), block: None }).is_err());
    // The failed commands must not disturb the job's record.
    assert!(engine.session(id).unwrap().history().is_recording());
    run_until_idle(&mut engine);
    assert_eq!(engine.world().block_count(), 64);
    assert_eq!(engine.session(id).unwrap().history().undo_len(), 1);
}

#[test]
fn sessions_keep_separate_histories() {
    let mut engine = engine_with(EngineConfig::default());
    let alex = engine.join("alex");
    let sam = engine.join("sam");
    let far = Region::cuboid(BlockPos::new(100, 0, 0), BlockPos::new(101, 1, 1));

    engine.dispatch(alex, Command::Set { region: Some(cube(2)), block: stone() }).unwrap();
    engine
        .dispatch(sam, Command::Set { region: Some(far), block: Some(Block::new("glass")) })
        .unwrap();
    run_until_idle(&mut engine);
    assert_eq!(engine.world().block_count(), 16);

    engine.dispatch(alex, Command::Undo).unwrap();
    assert_eq!(engine.world().block_count(), 8);
    assert_eq!(
        engine.world().get_block(BlockPos::new(100, 0, 0)).unwrap(),
        Some(&Block::new("glass"))
    );
    assert_eq!(engine.dispatch(alex, Command::Undo).unwrap(), say("Nothing left to undo."));
    assert_eq!(engine.dispatch(sam, Command::Undo).unwrap(), say("Undo successful."));
    assert_eq!(engine.world().block_count(), 0);
}

#[test]
fn cancelling_parent_cancels_child() {
    let mut engine = engine_with(EngineConfig::default());
    let id = engine.join("alex");
    let child: Rc<RefCell<Option<JobHandle<()>>>> = Rc::default();

    let slot = Rc::clone(&child);
    let parent = engine
        .run_edit(id, None, move |cx: &mut EditContext<'_>| {
            if slot.borrow().is_none() {
                let handle = cx.spawn(None, |_cx: &mut EditContext<'_>| Ok(Step::<()>::Yield));
                *slot.borrow_mut() = Some(handle);
            }
            Ok(Step::<()>::Yield)
        })
        .unwrap();
    engine.tick();
    engine.tick();

    let child_id = child.borrow().as_ref().map(JobHandle::id).unwrap();
    let cancelled = engine.cancel_job(parent.id()).unwrap();
    assert!(cancelled.contains(&parent.id()));
    assert!(cancelled.contains(&child_id));

    engine.tick();
    assert!(matches!(parent.try_take(), Some(Err(JobError::Cancelled(_)))));
    let child = child.borrow_mut().take().unwrap();
    assert!(matches!(child.try_take(), Some(Err(JobError::Cancelled(_)))));
    assert!(engine.scheduler().is_empty());
}

#[test]
fn zero_budget_runs_one_step_per_tick() {
    let config = EngineConfig {
        async_time_budget_ms: 0,
        ..EngineConfig::default()
    };
    let mut engine = engine_with(config);
    let id = engine.join("alex");
    let mut steps = 0u32;
    let handle = engine
        .run_edit(id, Some(10), move |cx: &mut EditContext<'_>| {
            if steps == 10 {
                return Ok(Step::Done(steps));
            }
            steps += 1;
            cx.next_step(format!("step {steps}"));
            Ok(Step::Continue)
        })
        .unwrap();

    for _ in 0..10 {
        engine.tick();
        assert!(!handle.is_settled());
    }
    engine.tick();
    assert_eq!(handle.try_take().unwrap().unwrap(), 10);
}

#[test]
fn departed_session_revives_then_expires() {
    let config = EngineConfig {
        ticks_to_delete_session: 3,
        ..EngineConfig::default()
    };
    let mut engine = engine_with(config);
    let id = engine.join("alex");
    engine.dispatch(id, Command::Set { region: Some(cube(2)), block: stone() }).unwrap();
    run_until_idle(&mut engine);

    engine.leave(id).unwrap();
    assert!(!engine.session(id).unwrap().is_active());
    assert!(engine.dispatch(id, Command::Undo).is_err());
    engine.tick();

    assert_eq!(engine.join("alex"), id);
    assert_eq!(engine.dispatch(id, Command::Undo).unwrap(), say("Undo successful."));

    engine.leave(id).unwrap();
    let deleted: Vec<SessionId> = (0..3).flat_map(|_| engine.tick().deleted_sessions).collect();
    assert_eq!(deleted, vec![id]);
    assert!(engine.session(id).is_none());

    let fresh = engine.join("alex");
    assert_ne!(fresh, id);
    assert_eq!(engine.dispatch(fresh, Command::Redo).unwrap(), say("Nothing left to redo."));
}

#[test]
fn leaving_rolls_back_a_running_edit() {
    let mut engine = engine_with(EngineConfig::default());
    let id = engine.join("alex");
    engine
        .run_edit_body(
            id,
            Some(FILL_PHASES),
            FillBody::new(cube(4), FillMode::Set(stone())).with_blocks_per_step(8),
        )
        .unwrap();
    engine.tick();
    engine.tick();
    assert!(engine.world().block_count() > 0);

    engine.leave(id).unwrap();
    assert_eq!(engine.world().block_count(), 0);
    engine.tick();
    assert!(engine.scheduler().is_empty());
    assert_eq!(engine.world().block_count(), 0);
}

#[test]
fn change_limit_fails_the_edit() {
    let mut engine = engine_with(EngineConfig::default());
    let id = engine.join("alex");
    engine.dispatch(id, Command::Limit(10)).unwrap();

    let handle = engine
        .run_edit_body(id, Some(FILL_PHASES), FillBody::new(cube(4), FillMode::Set(stone())))
        .unwrap();
    run_until_idle(&mut engine);

    match handle.try_take() {
        Some(Err(JobError::Failed(err))) => assert!(err.to_string().contains("change limit")),
        other => panic!("expected a failure, got {other:?}"),
    }
    assert_eq!(engine.world().block_count(), 0);
    assert!(!engine.session(id).unwrap().history().is_recording());
}

#[test]
fn fill_waits_for_chunks_to_load() {
    let config = EngineConfig {
        chunk_loads_per_tick: 1,
        ..EngineConfig::default()
    };
    let mut engine = EditEngine::new(config);
    let id = engine.join("alex");
    let region = Region::cuboid(BlockPos::ZERO, BlockPos::new(20, 0, 0));

    let handle = engine
        .run_edit_body(id, Some(FILL_PHASES), FillBody::new(region, FillMode::Set(stone())))
        .unwrap();
    let first = engine.tick();
    assert!(first.pump.finished.is_empty());
    assert_eq!(engine.world().pending_loads(), 2);

    let second = engine.tick();
    assert_eq!(second.pump.waiting, 1);

    run_until_idle(&mut engine);
    assert_eq!(handle.try_take().unwrap().unwrap(), 21);
    assert_eq!(engine.world().block_count(), 21);
}

#[test]
fn progress_report_shows_running_fill() {
    let config = EngineConfig {
        async_time_budget_ms: 0,
        ..EngineConfig::default()
    };
    let mut engine = engine_with(config);
    let id = engine.join("alex");
    assert!(engine.progress_report(id).is_none());

    engine
        .run_edit_body(
            id,
            Some(FILL_PHASES),
            FillBody::new(cube(4), FillMode::Set(stone())).with_blocks_per_step(16),
        )
        .unwrap();
    engine.tick();
    engine.tick();
    let text = engine.progress_report(id).unwrap();
    assert!(text.contains("Generating blocks"), "{text}");
    assert!(text.ends_with("62.50%"), "{text}");
}
