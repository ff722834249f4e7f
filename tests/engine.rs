use std::f64::consts::FRAC_PI_2;

use spritefe::app::EditorApp;
use spritefe::canvas::{Document, NoOp};
use spritefe::components::colors::{self, Color, ColorParse};
use spritefe::components::history::Direction;
use spritefe::components::tools::{self, EditorCommand, ToolFlag};
use spritefe::io::{self, FormatError};
use spritefe::ops::fill::{self, FillStrategy};
use spritefe::ops::selection;
use spritefe::ops::transform;
use spritefe::project::Project;
use spritefe::settings::EngineConfig;

const RED: Color = Color::rgba(255, 0, 0, 255);
const GREEN: Color = Color::rgba(0, 255, 0, 255);
const BLUE: Color = Color::rgba(0, 0, 255, 255);

fn doc_with_capacity(cols: u32, rows: u32, capacity: usize) -> Document {
    let config = EngineConfig {
        history_capacity: capacity,
        mask_workers: 4,
        ..EngineConfig::default()
    };
    Document::with_config(cols, rows, &config)
}

fn run(doc: &mut Document, cmds: &[EditorCommand]) {
    for cmd in cmds {
        let _ = tools::execute(doc, cmd);
    }
}

fn temp_path(ext: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("spritefe_test_{}.{}", uuid::Uuid::new_v4(), ext))
}

// ============================================================================
// History
// ============================================================================

#[test]
fn paint_and_fill_then_undo_restores_buffer() {
    let mut doc = doc_with_capacity(8, 8, 10);
    let original = doc.layers[0].buffer.clone();
    run(
        &mut doc,
        &[
            EditorCommand::SetColor(RED),
            EditorCommand::Paint { x: 1.0, y: 1.0 },
            EditorCommand::Paint { x: 6.0, y: 1.0 },
            EditorCommand::EndStroke,
            EditorCommand::SetColor(GREEN),
            EditorCommand::Fill { x: 0.0, y: 7.0 },
            EditorCommand::SetLineWidth(3),
            EditorCommand::SetColor(BLUE),
            EditorCommand::Paint { x: 4.0, y: 4.0 },
            EditorCommand::EndStroke,
        ],
    );
    assert_ne!(doc.layers[0].buffer, original);

    for _ in 0..3 {
        assert!(tools::execute(&mut doc, &EditorCommand::Undo).is_ok());
    }
    assert_eq!(doc.layers[0].buffer, original);
    assert_eq!(
        tools::execute(&mut doc, &EditorCommand::Undo),
        Err(NoOp::NothingToUndo)
    );
}

#[test]
fn strokes_through_far_off_canvas_points_paint_the_visible_part() {
    let mut doc = doc_with_capacity(4, 2, 10);
    run(
        &mut doc,
        &[
            EditorCommand::SetColor(RED),
            EditorCommand::Paint { x: -1e12, y: 0.0 },
            EditorCommand::Paint { x: 1e12, y: 0.0 },
            EditorCommand::Paint { x: f64::MAX, y: 1.0 },
            EditorCommand::EndStroke,
        ],
    );
    assert!((0..4).all(|x| doc.layers[0].get(x, 0) == Some(RED)));
    assert!(tools::execute(&mut doc, &EditorCommand::Undo).is_ok());
    assert!(doc.layers[0].buffer.iter().all(|c| *c == Color::TRANSPARENT));
}

#[test]
fn history_drops_oldest_frame_beyond_capacity() {
    let mut doc = doc_with_capacity(2, 2, 3);
    for color in [RED, GREEN, BLUE, Color::WHITE] {
        run(
            &mut doc,
            &[EditorCommand::SetColor(color), EditorCommand::Fill { x: 0.0, y: 0.0 }],
        );
    }
    assert_eq!(doc.layers[0].history.undo_count(), 3);

    for _ in 0..3 {
        assert!(doc.layers[0].undo().is_ok());
    }
    // The RED frame is the only surviving change the history cannot revert.
    assert!(doc.layers[0].buffer.iter().all(|c| *c == RED));
    assert_eq!(doc.layers[0].undo(), Err(NoOp::NothingToUndo));
}

#[test]
fn paced_replay_matches_synchronous_undo() {
    let script = [
        EditorCommand::SetColor(RED),
        EditorCommand::Fill { x: 0.0, y: 0.0 },
        EditorCommand::SetColor(GREEN),
        EditorCommand::SelectRect {
            a: (2.0, 2.0),
            b: (12.0, 9.0),
        },
        EditorCommand::Fill { x: 5.0, y: 5.0 },
    ];
    let mut sync = doc_with_capacity(20, 20, 10);
    let mut paced = doc_with_capacity(20, 20, 10);
    run(&mut sync, &script);
    run(&mut paced, &script);
    assert_eq!(sync.layers[0].buffer, paced.layers[0].buffer);

    sync.layers[0].undo().expect("undo");

    let layer = &mut paced.layers[0];
    let (mut replay, guard) = layer.begin_paced(Direction::Undo).expect("paced undo");
    let mut steps = 0;
    while !layer.step_paced(&mut replay) {
        steps += 1;
        assert!(layer.write_lock().is_held());
    }
    assert!(steps > 0);
    layer.finish_paced(replay, guard);

    assert!(!paced.layers[0].write_lock().is_held());
    assert_eq!(sync.layers[0].buffer, paced.layers[0].buffer);
    assert_eq!(
        sync.layers[0].history.redo_count(),
        paced.layers[0].history.redo_count()
    );
}

// ============================================================================
// Flood fill
// ============================================================================

#[test]
fn fill_of_transparent_grid_is_one_frame_of_sixteen() {
    let mut doc = doc_with_capacity(4, 4, 10);
    let red = colors::parse("#FF0000FF").color().expect("valid color");
    doc.settings.color = red;
    let (layer, ctx) = doc.active_mut();
    assert_eq!(fill::flood_fill(layer, &ctx, 0, 0), Ok(16));

    let layer = &doc.layers[0];
    assert!(layer.buffer.iter().all(|c| *c == red));
    assert_eq!(layer.history.undo_count(), 1);
    assert_eq!(layer.history.open_frame_len(), 16);
}

#[test]
fn refilling_with_same_color_records_nothing() {
    let mut doc = doc_with_capacity(6, 3, 10);
    doc.settings.color = RED;
    let (layer, ctx) = doc.active_mut();
    assert_eq!(fill::flood_fill(layer, &ctx, 2, 1), Ok(18));
    let (layer, ctx) = doc.active_mut();
    assert_eq!(fill::flood_fill(layer, &ctx, 5, 2), Ok(0));
    assert_eq!(doc.layers[0].history.open_frame_len(), 0);

    // The empty frame is skipped: one undo reverts the first fill.
    assert_eq!(doc.layers[0].undo(), Ok(18));
    assert!(doc.layers[0].buffer.iter().all(|c| *c == Color::TRANSPARENT));
    assert_eq!(doc.layers[0].undo(), Err(NoOp::NothingToUndo));
}

#[test]
fn fill_strategies_reach_the_same_cells() {
    let mut doc = doc_with_capacity(12, 12, 10);
    // Walls make the region irregular.
    for i in 0..10 {
        doc.layers[0].buffer[12 * 3 + i] = BLUE;
        doc.layers[0].buffer[12 * 8 + 2 + i] = BLUE;
        doc.layers[0].buffer[12 * i + 6] = if i == 5 { Color::TRANSPARENT } else { BLUE };
    }
    let layer = &doc.layers[0];
    let mut stack = fill::fill_region(layer, &doc.mask, 0, 0, false, FillStrategy::Stack)
        .expect("seed inside");
    let mut queue = fill::fill_region(layer, &doc.mask, 0, 0, false, FillStrategy::Queue)
        .expect("seed inside");
    assert_ne!(stack, queue);
    stack.sort_unstable();
    queue.sort_unstable();
    assert_eq!(stack, queue);
}

#[test]
fn fill_on_busy_layer_is_a_no_op() {
    let mut doc = doc_with_capacity(4, 4, 10);
    doc.settings.color = RED;
    let guard = doc.layers[0].write_lock().try_acquire().expect("free lock");
    let (layer, ctx) = doc.active_mut();
    assert_eq!(fill::flood_fill(layer, &ctx, 0, 0), Err(NoOp::Busy));
    assert!(doc.layers[0].buffer.iter().all(|c| *c == Color::TRANSPARENT));
    assert!(!doc.layers[0].history.can_undo());
    drop(guard);

    let (layer, ctx) = doc.active_mut();
    assert_eq!(fill::flood_fill(layer, &ctx, 0, 0), Ok(16));
}

// ============================================================================
// Colors
// ============================================================================

#[test]
fn color_text_acceptance() {
    assert_eq!(colors::parse("#112233"), ColorParse::Malformed);
    assert!(colors::parse("rgba(10,20,30,2.5)").is_ok());
    assert_eq!(
        colors::parse("rgba(10,20,30,2.5)").color(),
        Some(Color::rgba(10, 20, 30, 255))
    );
    assert!(matches!(
        colors::parse("rgba(300,20,30,1)"),
        ColorParse::ClampedOverflow(_)
    ));
}

// ============================================================================
// Selection masks
// ============================================================================

#[test]
fn rect_and_quadrilateral_masks_agree() {
    let mut doc = doc_with_capacity(15, 11, 10);
    selection::select_rect(&mut doc, (3.0, 2.0), (11.0, 9.0));
    let rect = doc.mask.clone();

    selection::select_polygon(&mut doc, &[(3.0, 2.0), (11.0, 2.0), (11.0, 9.0), (3.0, 9.0)]);
    doc.wait_mask();
    assert_eq!(doc.mask, rect);
    assert_eq!(rect.selected_count(), 8 * 7);
}

#[test]
fn stale_polygon_batches_are_discarded() {
    let mut doc = doc_with_capacity(32, 32, 10);
    selection::select_polygon(&mut doc, &[(0.0, 0.0), (32.0, 0.0), (32.0, 32.0), (0.0, 32.0)]);
    selection::select_polygon(&mut doc, &[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)]);
    doc.wait_mask();
    assert_eq!(doc.rasterizer.discarded_batches(), 1);
    assert_eq!(doc.mask.selected_count(), 16);

    // A fill respects the finished mask.
    doc.settings.color = RED;
    let (layer, ctx) = doc.active_mut();
    assert_eq!(fill::flood_fill(layer, &ctx, 1, 1), Ok(16));
}

// ============================================================================
// Floating selections
// ============================================================================

#[test]
fn single_cell_rotated_quarter_turn_lands_on_itself() {
    let mut doc = doc_with_capacity(5, 5, 10);
    doc.layers[0].buffer[2 * 5 + 3] = RED;
    let (layer, ctx) = doc.active_mut();
    assert_eq!(transform::extract_auto(layer, &ctx, 3, 2), Ok(1));
    let (layer, ctx) = doc.active_mut();
    transform::rotate(layer, &ctx, FRAC_PI_2, None).expect("rotate");
    let (layer, ctx) = doc.active_mut();
    transform::commit(layer, &ctx).expect("commit");

    let buffer = &doc.layers[0].buffer;
    assert_eq!(buffer[2 * 5 + 3], RED);
    assert_eq!(buffer.iter().filter(|c| **c == RED).count(), 1);
}

#[test]
fn anti_aliased_coverage_is_saturated() {
    let mut doc = doc_with_capacity(12, 12, 10);
    for y in 3..8 {
        for x in 2..9 {
            doc.layers[0].buffer[y * 12 + x] = GREEN;
        }
    }
    doc.settings.anti_aliased = true;
    let (layer, ctx) = doc.active_mut();
    transform::extract_auto(layer, &ctx, 4, 4).expect("extract");
    let (layer, ctx) = doc.active_mut();
    transform::rotate(layer, &ctx, 0.3, None).expect("rotate");

    let floating = doc.layers[0].floating.as_ref().expect("floating");
    let coverage = transform::accumulate_coverage(floating, 12, 12);
    assert!(!coverage.is_empty());
    for cov in coverage.values() {
        assert!(cov.weight() <= 1.0 + 1e-9);
        assert!(cov.color().a() > 0);
    }
}

#[test]
fn drag_through_commands_moves_the_block() {
    let mut doc = doc_with_capacity(6, 6, 10);
    doc.layers[0].buffer[0] = BLUE;
    doc.layers[0].buffer[1] = BLUE;
    run(
        &mut doc,
        &[
            EditorCommand::Extract { x: 0.0, y: 0.0 },
            EditorCommand::Drag { dx: 2.0, dy: 3.0 },
            EditorCommand::Commit,
        ],
    );
    let buffer = &doc.layers[0].buffer;
    assert_eq!(buffer[0], Color::TRANSPARENT);
    assert_eq!(buffer[3 * 6 + 2], BLUE);
    assert_eq!(buffer[3 * 6 + 3], BLUE);

    // Extract and commit are separate frames.
    assert!(doc.layers[0].undo().is_ok());
    assert!(doc.layers[0].buffer.iter().all(|c| *c == Color::TRANSPARENT));
}

// ============================================================================
// Project files and the editor loop
// ============================================================================

#[test]
fn project_file_round_trips_through_disk() {
    let config = EngineConfig::default();
    let mut project = Project::new_untitled(1, 7, 3, &config);
    project.document.layers[0].buffer[4] = RED;
    let path = temp_path("sfe");
    project.save_as(&path).expect("save");
    assert!(!project.is_dirty);

    let reopened = Project::open(&path, &config).expect("open");
    assert_eq!((reopened.document.cols, reopened.document.rows), (7, 3));
    assert_eq!(reopened.document.layers[0].buffer[4], RED);
    assert_eq!(reopened.library, project.library);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn corrupt_record_tag_is_rejected() {
    let config = EngineConfig::default();
    let project = Project::new_untitled(1, 2, 2, &config);
    let mut bytes = io::encode_project(&project.library).expect("encode");
    // Word 0 is the root record's size, word 1 its tag.
    bytes[4] = 9;
    assert!(matches!(io::decode_project(&bytes), Err(FormatError::Corrupted(_))));
    assert!(matches!(
        io::decode_project(&bytes[..bytes.len() - 4]),
        Err(FormatError::Corrupted(_))
    ));
}

#[test]
fn script_driven_session_with_slow_history() {
    let config = EngineConfig::default();
    let project = Project::new_untitled(1, 24, 24, &config);
    let mut app = EditorApp::new(project, config);
    let script = "\
color #FF0000FF
fill 0 0
layer add
color rgba(0, 0, 255, 1)
select-polygon 0,0 12,0 12,12 0,12
fill 0 0
set slow-history on
undo
";
    assert_eq!(app.submit_script(script), Ok(8));
    app.run_until_idle(100_000);
    assert!(app.is_idle());

    // The blue fill on layer 2 was undone; layer 1 stays red.
    assert_eq!(app.project.document.layers.len(), 2);
    assert!(app.frame().iter().all(|c| *c == RED));
    assert!(app.project.is_dirty);
    assert!(app.project.document.settings.slow_history);
    assert_eq!(ToolFlag::SlowHistory.name(), "slow-history");
}
