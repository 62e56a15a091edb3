//! GPU pipeline tests
//!
//! Runs the pass sequence on small headless grids and reads the fields back.
//! Tests cover:
//! - quiescent fluid staying at rest
//! - dye conservation and dissipation
//! - wall conditions for both wall policies and for pressure
//! - dye transport direction and divergence removal by projection
//! - the force splat's sign and magnitude
//! - resize under both resize policies

use fluidflow::gpu::field::{Field, FieldKind, FieldSnapshot};
use fluidflow::{
    FlowError, FluidPipeline, GpuContext, PointerForce, ResizePolicy, SimConfig, WallPolicy,
};
use glam::Vec2;

const W: u32 = 32;
const H: u32 = 32;

/// Headless context, or None (with a note) when the machine has no adapter.
fn context() -> Option<GpuContext> {
    match GpuContext::headless() {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("No GPU adapter available ({e}); skipping test.");
            None
        }
    }
}

fn small_config() -> SimConfig {
    SimConfig {
        seed_size: 10.0,
        force_radius: 3.0,
        ..SimConfig::default()
    }
}

fn pipeline(ctx: &GpuContext, config: SimConfig, width: u32, height: u32) -> FluidPipeline {
    FluidPipeline::new(ctx, config, width, height).expect("pipeline should build")
}

fn read(ctx: &GpuContext, pipeline: &FluidPipeline, kind: FieldKind) -> FieldSnapshot {
    pipeline.read_field(ctx, kind).expect("readback")
}

/// Deterministic, sign-varying velocity with exactly representable values.
fn velocity_pattern(width: u32, height: u32) -> Vec<[f32; 4]> {
    (0..height)
        .flat_map(|y| {
            (0..width).map(move |x| {
                let a = ((x * 7 + y * 3) % 11) as f32 - 5.0;
                let b = ((x * 5 + y * 13) % 9) as f32 - 4.0;
                [a * 0.5, b * 0.25, 0.0, 0.0]
            })
        })
        .collect()
}

fn with_encoder(ctx: &GpuContext, record: impl FnOnce(&mut wgpu::CommandEncoder)) {
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Test Encoder"),
        });
    record(&mut encoder);
    ctx.queue.submit(Some(encoder.finish()));
}

// ============================================================================
// Quiescent fluid
// ============================================================================

#[test]
fn test_zero_force_keeps_velocity_zero() {
    let Some(ctx) = context() else { return };
    let mut pipeline = pipeline(&ctx, small_config(), W, H);

    for _ in 0..5 {
        pipeline.tick(&ctx, &PointerForce::NONE);
    }

    let velocity = read(&ctx, &pipeline, FieldKind::Velocity);
    assert_eq!(velocity.max_abs_xy(), 0.0, "velocity drifted from rest");
    let pressure = read(&ctx, &pipeline, FieldKind::Pressure);
    assert_eq!(pressure.total_magnitude(), 0.0);
    assert_eq!(pipeline.ticks(), 5);
}

#[test]
fn test_one_tick_leaves_dye_in_place() {
    let Some(ctx) = context() else { return };
    let mut pipeline = pipeline(&ctx, small_config(), W, H);

    let before = read(&ctx, &pipeline, FieldKind::Dye);
    pipeline.tick(&ctx, &PointerForce::NONE);
    let after = read(&ctx, &pipeline, FieldKind::Dye);

    assert!(before.total_magnitude() > 0.0, "seed triangle missing");
    let delta = before.max_difference(&after);
    assert!(delta < 1e-5, "dye moved by {delta} without any force");
}

#[test]
fn test_dye_total_never_increases() {
    let Some(ctx) = context() else { return };
    let config = SimConfig {
        dye_dissipation: 0.95,
        ..small_config()
    };
    let mut pipeline = pipeline(&ctx, config, W, H);

    let mut previous = read(&ctx, &pipeline, FieldKind::Dye).total_magnitude();
    for tick in 0..4 {
        pipeline.tick(&ctx, &PointerForce::NONE);
        let total = read(&ctx, &pipeline, FieldKind::Dye).total_magnitude();
        assert!(
            total <= previous + 1e-3,
            "tick {tick}: dye grew from {previous} to {total}"
        );
        previous = total;
    }
}

#[test]
fn test_seed_covers_center_not_corners() {
    let Some(ctx) = context() else { return };
    let config = small_config();
    let pipeline = pipeline(&ctx, config.clone(), W, H);

    let dye = read(&ctx, &pipeline, FieldKind::Dye);
    assert_eq!(dye.at(W / 2, H / 2), config.dye_seed_color);
    assert_eq!(dye.at(0, 0), config.dye_background);
    assert_eq!(dye.at(W - 1, H - 1), config.dye_background);
}

// ============================================================================
// Wall conditions
// ============================================================================

fn check_walls(policy: WallPolicy) {
    let Some(ctx) = context() else { return };
    let config = SimConfig {
        wall_policy: policy,
        ..small_config()
    };
    let mut pipeline = pipeline(&ctx, config, W, H);

    let input = velocity_pattern(W, H);
    pipeline
        .upload_field(&ctx, FieldKind::Velocity, &input)
        .expect("upload");
    with_encoder(&ctx, |encoder| pipeline.encode_boundaries(&ctx, encoder));
    let out = read(&ctx, &pipeline, FieldKind::Velocity);

    let tangential_sign = match policy {
        WallPolicy::NoSlip => -1.0,
        WallPolicy::FreeSlip => 1.0,
    };

    for y in 1..H - 1 {
        for (edge, inner) in [(0, 1), (W - 1, W - 2)] {
            let e = out.at(edge, y);
            let i = out.at(inner, y);
            assert_eq!(e[0] + i[0], 0.0, "normal flow through x wall at ({edge}, {y})");
            assert_eq!(e[1], tangential_sign * i[1], "tangential at ({edge}, {y})");
        }
    }
    for x in 1..W - 1 {
        for (edge, inner) in [(0, 1), (H - 1, H - 2)] {
            let e = out.at(x, edge);
            let i = out.at(x, inner);
            assert_eq!(e[1] + i[1], 0.0, "normal flow through y wall at ({x}, {edge})");
            assert_eq!(e[0], tangential_sign * i[0], "tangential at ({x}, {edge})");
        }
    }

    // Interior passes through untouched.
    let source = FieldSnapshot {
        width: W,
        height: H,
        cells: input,
    };
    for y in 1..H - 1 {
        for x in 1..W - 1 {
            assert_eq!(out.at(x, y), source.at(x, y));
        }
    }
}

#[test]
fn test_no_slip_walls_block_flow() {
    check_walls(WallPolicy::NoSlip);
}

#[test]
fn test_free_slip_walls_block_normal_flow_only() {
    check_walls(WallPolicy::FreeSlip);
}

#[test]
fn test_pressure_walls_copy_inward_neighbour() {
    let Some(ctx) = context() else { return };
    let mut pipeline = pipeline(&ctx, small_config(), W, H);

    let input: Vec<[f32; 4]> = velocity_pattern(W, H)
        .into_iter()
        .map(|v| [v[0] + 2.0 * v[1], v[1], 0.0, 0.0])
        .collect();
    pipeline
        .upload_field(&ctx, FieldKind::Pressure, &input)
        .expect("upload");
    with_encoder(&ctx, |encoder| pipeline.encode_boundaries(&ctx, encoder));
    let out = read(&ctx, &pipeline, FieldKind::Pressure);
    let source = FieldSnapshot {
        width: W,
        height: H,
        cells: input,
    };

    let inward = |v: u32, last: u32| {
        if v == 0 {
            1
        } else if v == last {
            last - 1
        } else {
            v
        }
    };
    for y in 0..H {
        for x in 0..W {
            let (ix, iy) = (inward(x, W - 1), inward(y, H - 1));
            if (ix, iy) == (x, y) {
                assert_eq!(out.at(x, y), source.at(x, y), "interior ({x}, {y})");
            } else {
                // Zero normal gradient: the edge copies its inward neighbour.
                assert_eq!(out.at(x, y), out.at(ix, iy), "edge ({x}, {y})");
                assert_eq!(out.at(x, y), source.at(ix, iy), "edge ({x}, {y})");
            }
        }
    }
}

// ============================================================================
// Transport and projection
// ============================================================================

/// Uniform velocity in cells/s (y up) over the whole grid.
fn uniform_velocity(width: u32, height: u32, v: Vec2) -> Vec<[f32; 4]> {
    vec![[v.x, v.y, 0.0, 0.0]; (width * height) as usize]
}

/// Dye with a single white cell at `mark`.
fn dye_mark(width: u32, height: u32, mark: (u32, u32)) -> Vec<[f32; 4]> {
    let mut cells = vec![[0.0; 4]; (width * height) as usize];
    cells[(mark.1 * width + mark.0) as usize] = [1.0; 4];
    cells
}

fn advect_mark(ctx: &GpuContext, velocity: Vec2) -> FieldSnapshot {
    const N: u32 = 16;
    let config = SimConfig {
        time_step: 1.0,
        ..small_config()
    };
    let mut pipeline = pipeline(ctx, config, N, N);
    pipeline
        .upload_field(ctx, FieldKind::Velocity, &uniform_velocity(N, N, velocity))
        .expect("upload velocity");
    pipeline
        .upload_field(ctx, FieldKind::Dye, &dye_mark(N, N, (8, 8)))
        .expect("upload dye");

    with_encoder(ctx, |encoder| pipeline.encode_dye_advection(ctx, encoder));
    read(ctx, &pipeline, FieldKind::Dye)
}

#[test]
fn test_dye_follows_horizontal_velocity() {
    let Some(ctx) = context() else { return };
    let dye = advect_mark(&ctx, Vec2::new(1.0, 0.0));

    assert_eq!(dye.at(9, 8), [1.0; 4], "mark did not move right");
    assert_eq!(dye.at(8, 8), [0.0; 4]);
    assert_eq!(dye.total_magnitude(), 3.0);
}

#[test]
fn test_dye_follows_upward_velocity() {
    let Some(ctx) = context() else { return };
    // Velocity y points up, rows grow downward: +1 cell/s moves one row up.
    let dye = advect_mark(&ctx, Vec2::new(0.0, 1.0));

    assert_eq!(dye.at(8, 7), [1.0; 4], "mark did not move up a row");
    assert_eq!(dye.at(8, 8), [0.0; 4]);
    assert_eq!(dye.at(8, 9), [0.0; 4]);
    assert_eq!(dye.total_magnitude(), 3.0);
}

/// Summed |div u| over cells whose stencil stays inside the grid, with the
/// same central differences the pressure kernel uses (up is row - 1).
fn interior_divergence(v: &FieldSnapshot) -> f64 {
    let mut total = 0.0;
    for y in 1..v.height - 1 {
        for x in 1..v.width - 1 {
            let div = 0.5
                * ((v.at(x + 1, y)[0] - v.at(x - 1, y)[0])
                    + (v.at(x, y - 1)[1] - v.at(x, y + 1)[1]));
            total += div.abs() as f64;
        }
    }
    total
}

#[test]
fn test_projection_reduces_divergence() {
    let Some(ctx) = context() else { return };
    let mut pipeline = pipeline(&ctx, small_config(), W, H);

    // Gaussian source at the grid center: flow points outward everywhere.
    let center = Vec2::new(W as f32 / 2.0, H as f32 / 2.0);
    let source: Vec<[f32; 4]> = (0..H)
        .flat_map(|y| {
            (0..W).map(move |x| {
                let d = Vec2::new(x as f32 + 0.5, y as f32 + 0.5) - center;
                let g = (-d.length_squared() / 9.0).exp();
                [d.x * g, -d.y * g, 0.0, 0.0]
            })
        })
        .collect();
    pipeline
        .upload_field(&ctx, FieldKind::Velocity, &source)
        .expect("upload");
    let before = interior_divergence(&read(&ctx, &pipeline, FieldKind::Velocity));

    with_encoder(&ctx, |encoder| {
        pipeline.encode_pressure_solve(&ctx, encoder);
        pipeline.encode_projection(&ctx, encoder);
    });
    let after = interior_divergence(&read(&ctx, &pipeline, FieldKind::Velocity));

    assert!(before > 1.0, "source field is not divergent ({before})");
    assert!(
        after < before * 0.75,
        "divergence went from {before} to {after}"
    );

    // lap(p) = div(u) > 0 at a source, so pressure dips at its center and
    // the gradient points outward, against the flow.
    let pressure = read(&ctx, &pipeline, FieldKind::Pressure);
    assert!(pressure.at(W / 2, H / 2)[0] < pressure.at(1, 1)[0]);
}

// ============================================================================
// Force injection
// ============================================================================

fn velocity_after_impulse(ctx: &GpuContext, delta: Vec2) -> ([f32; 4], Vec2) {
    let config = small_config();
    let mut pipeline = pipeline(ctx, config.clone(), W, H);

    // Cell centers sit at +0.5, so this lands exactly on the center cell.
    let origin = Vec2::new(W as f32 / 2.0 + 0.5, H as f32 / 2.0 + 0.5);
    let force = PointerForce::new(origin, delta);
    pipeline.tick(ctx, &force);

    let velocity = read(ctx, &pipeline, FieldKind::Velocity);
    (
        velocity.at(W / 2, H / 2),
        force.impulse(config.force_scale, config.time_step),
    )
}

#[test]
fn test_horizontal_impulse_sign_and_bound() {
    let Some(ctx) = context() else { return };
    let (v, impulse) = velocity_after_impulse(&ctx, Vec2::new(2.0, 0.0));

    assert!(impulse.x > 0.0);
    assert!(v[0] > 0.0, "impulse {impulse:?} produced {v:?}");
    assert!(v[0] <= impulse.x * 1.0001, "{} exceeds {}", v[0], impulse.x);
}

#[test]
fn test_downward_drag_pushes_velocity_down() {
    let Some(ctx) = context() else { return };
    // Pointer rows grow downward, velocity y grows upward.
    let (v, impulse) = velocity_after_impulse(&ctx, Vec2::new(0.0, 2.0));

    assert!(impulse.y < 0.0);
    assert!(v[1] < 0.0, "impulse {impulse:?} produced {v:?}");
    assert!(v[1].abs() <= impulse.y.abs() * 1.0001);
}

#[test]
fn test_released_pointer_adds_nothing() {
    let Some(ctx) = context() else { return };
    let mut pipeline = pipeline(&ctx, small_config(), W, H);
    let mut sampler = fluidflow::PointerSampler::new();

    sampler.move_to(Vec2::new(4.0, 4.0));
    sampler.move_to(Vec2::new(20.0, 9.0));
    pipeline.tick(&ctx, &sampler.sample());

    let velocity = read(&ctx, &pipeline, FieldKind::Velocity);
    assert_eq!(velocity.max_abs_xy(), 0.0);
}

// ============================================================================
// Resize
// ============================================================================

#[test]
fn test_reset_resize_matches_fresh_pipeline() {
    let Some(ctx) = context() else { return };
    let config = SimConfig {
        resize_policy: ResizePolicy::Reset,
        ..small_config()
    };
    let mut resized = pipeline(&ctx, config.clone(), W, H);
    resized.tick(
        &ctx,
        &PointerForce::new(Vec2::new(10.0, 10.0), Vec2::new(3.0, -1.0)),
    );
    resized.resize(&ctx, 48, 40).expect("resize");
    assert_eq!(resized.size(), (48, 40));

    let fresh = pipeline(&ctx, config, 48, 40);
    for kind in FieldKind::ALL {
        let a = read(&ctx, &resized, kind);
        let b = read(&ctx, &fresh, kind);
        assert_eq!(a.max_difference(&b), 0.0, "{} differs", kind.name());
    }
}

#[test]
fn test_preserve_resize_keeps_overlap() {
    let Some(ctx) = context() else { return };
    let config = small_config();
    assert_eq!(config.resize_policy, ResizePolicy::Preserve);
    let mut pipeline = pipeline(&ctx, config, W, H);

    let pattern = velocity_pattern(W, H);
    pipeline
        .upload_field(&ctx, FieldKind::Velocity, &pattern)
        .expect("upload");
    let before = read(&ctx, &pipeline, FieldKind::Velocity);
    let dye_before = read(&ctx, &pipeline, FieldKind::Dye);

    pipeline.resize(&ctx, 24, 40).expect("resize");
    let after = read(&ctx, &pipeline, FieldKind::Velocity);
    let dye_after = read(&ctx, &pipeline, FieldKind::Dye);

    for y in 0..40 {
        for x in 0..24 {
            if y < H {
                assert_eq!(after.at(x, y), before.at(x, y), "velocity at ({x}, {y})");
                assert_eq!(dye_after.at(x, y), dye_before.at(x, y), "dye at ({x}, {y})");
            } else {
                assert_eq!(after.at(x, y), [0.0; 4], "new velocity row {y}");
                assert_eq!(
                    dye_after.at(x, y),
                    pipeline.config().dye_background,
                    "new dye row {y}"
                );
            }
        }
    }

    // The pipeline keeps running on the new grid.
    pipeline.tick(&ctx, &PointerForce::NONE);
    assert_eq!(read(&ctx, &pipeline, FieldKind::Dye).cells.len(), 24 * 40);
}

#[test]
fn test_zero_and_same_size_resize_are_ignored() {
    let Some(ctx) = context() else { return };
    let mut pipeline = pipeline(&ctx, small_config(), W, H);
    let pattern = velocity_pattern(W, H);
    pipeline
        .upload_field(&ctx, FieldKind::Velocity, &pattern)
        .expect("upload");

    pipeline.resize(&ctx, 0, 0).expect("minimized");
    pipeline.resize(&ctx, W, 0).expect("zero height");
    pipeline.resize(&ctx, W, H).expect("same size");

    assert_eq!(pipeline.size(), (W, H));
    assert_eq!(read(&ctx, &pipeline, FieldKind::Velocity).cells, pattern);
}

#[test]
fn test_reset_reseeds_fields() {
    let Some(ctx) = context() else { return };
    let mut pipeline = pipeline(&ctx, small_config(), W, H);
    let initial = read(&ctx, &pipeline, FieldKind::Dye);

    pipeline.tick(
        &ctx,
        &PointerForce::new(Vec2::new(16.0, 16.0), Vec2::new(6.0, 6.0)),
    );
    pipeline.reset(&ctx);

    assert_eq!(read(&ctx, &pipeline, FieldKind::Dye).max_difference(&initial), 0.0);
    assert_eq!(read(&ctx, &pipeline, FieldKind::Velocity).max_abs_xy(), 0.0);
}

// ============================================================================
// Field
// ============================================================================

#[test]
fn test_field_swap_twice_restores_roles() {
    let Some(ctx) = context() else { return };
    let mut field = Field::allocate(&ctx, FieldKind::Pressure, 8, 8).expect("allocate");

    let front = field.front();
    field.swap();
    assert_ne!(field.front(), front);
    field.swap();
    assert_eq!(field.front(), front);
}

#[test]
fn test_field_rejects_bad_sizes() {
    let Some(ctx) = context() else { return };
    assert!(matches!(
        Field::allocate(&ctx, FieldKind::Dye, 0, 8),
        Err(FlowError::InvalidDimensions { width: 0, height: 8 })
    ));
    let too_wide = ctx.max_grid_dimension() + 1;
    assert!(matches!(
        Field::allocate(&ctx, FieldKind::Dye, too_wide, 8),
        Err(FlowError::InvalidDimensions { .. })
    ));

    let field = Field::allocate(&ctx, FieldKind::Dye, 4, 4).expect("allocate");
    assert!(matches!(
        field.upload(&ctx.queue, &[[0.0; 4]; 3]),
        Err(FlowError::RenderTarget { field: "dye", .. })
    ));
}

#[test]
fn test_field_upload_read_and_clear() {
    let Some(ctx) = context() else { return };
    let field = Field::allocate(&ctx, FieldKind::Velocity, 5, 3).expect("allocate");

    let cells = velocity_pattern(5, 3);
    field.upload(&ctx.queue, &cells).expect("upload");
    assert_eq!(field.read(&ctx).expect("read").cells, cells);

    with_encoder(&ctx, |encoder| {
        field.clear(
            encoder,
            wgpu::Color {
                r: 1.0,
                g: 2.0,
                b: 0.0,
                a: 0.0,
            },
        )
    });
    let cleared = field.read(&ctx).expect("read");
    assert!(cleared.cells.iter().all(|c| *c == [1.0, 2.0, 0.0, 0.0]));
}

#[test]
fn test_device_lost_flag_is_per_context() {
    let Some(lost) = context() else { return };
    let Some(healthy) = context() else { return };

    let a = Field::allocate(&lost, FieldKind::Dye, 4, 4).expect("allocate");
    let b = Field::allocate(&healthy, FieldKind::Dye, 4, 4).expect("allocate");

    lost.mark_device_lost();
    assert!(lost.is_device_lost());
    assert!(!healthy.is_device_lost());

    assert!(matches!(a.read(&lost), Err(FlowError::DeviceLost)));
    assert!(b.read(&healthy).is_ok());
}
