use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;
use windflow_core::fem::QuadratureRule;
use windflow_core::linalg::vector_ops::norm2;
use windflow_core::mesh::NodeType;
use windflow_core::{
    CancellationToken, DiffusionConfig, DiffusionScheme, DomainAverageInitializer, Elevation, FieldInitializer,
    LinearSolverConfig, MassConservation, Mesh, MeshConfig, ProgressSink, RecordingProgress, Result, Severity,
    SolverError, SteadyStateConfig, SteadyStateSolver, UniformInitializer, Vec3, VectorField,
};

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn hill_mesh() -> Mesh {
    let elevation = Elevation::single_hill(200.0, 200.0, 20.0, 0.0, 30.0, 50.0);
    let config = MeshConfig {
        nlayers: 8,
        domain_height: 200.0,
        vertical_growth: 1.2,
    };
    Mesh::terrain_following(&elevation, &config).unwrap()
}

fn short_run(max_iterations: usize) -> SteadyStateConfig {
    SteadyStateConfig {
        max_iterations,
        ..SteadyStateConfig::default()
    }
}

/// Domain-average wind with seeded per-node noise on the horizontal components
struct NoisyInitializer {
    base: DomainAverageInitializer,
    amplitude: f64,
    seed: u64,
}

impl FieldInitializer for NoisyInitializer {
    fn initialize_fields(&self, mesh: &Mesh) -> Result<VectorField> {
        let mut field = self.base.initialize_fields(mesh)?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        for node in 0..mesh.numnp() {
            if field.is_on_ground(node) {
                continue;
            }
            let noise = Vec3::new(
                rng.random_range(-self.amplitude..self.amplitude),
                rng.random_range(-self.amplitude..self.amplitude),
                0.0,
            );
            field.set(node, field.get(node) + noise);
        }
        Ok(field)
    }
}

/// Cancels its token once the outer loop reports the given percentage
struct CancelAt {
    percent: &'static str,
    token: CancellationToken,
}

impl ProgressSink for CancelAt {
    fn message(&self, severity: Severity, text: &str) {
        if severity == Severity::OuterIterProgress && text == self.percent {
            self.token.cancel();
        }
    }
}

/// Project `u` once more and return the relative residual of the potential
/// system, `‖SK·Φ − RHS‖ / ‖RHS‖`
fn reprojection_residual(mesh: &Mesh, u: &VectorField) -> f64 {
    let mut projection = MassConservation::new(QuadratureRule::One);
    projection.initialize(mesh, u).unwrap();
    projection.discretize().unwrap();
    projection.set_boundary_conditions().unwrap();
    projection
        .solve_with_fallback(&LinearSolverConfig::default(), &RecordingProgress::new())
        .unwrap();

    let phi = projection.phi().unwrap();
    let rhs = projection.rhs().unwrap();
    let mut product = vec![0.0; phi.len()];
    projection.matrix().unwrap().mul_vec(phi, &mut product);
    let residual: Vec<f64> = product.iter().zip(rhs).map(|(l, r)| l - r).collect();
    norm2(&residual) / norm2(rhs).max(1.0)
}

fn interior_max_divergence(mesh: &Mesh, u: &VectorField) -> f64 {
    let mut projection = MassConservation::new(QuadratureRule::One);
    projection.initialize(mesh, u).unwrap();
    let divergence = projection.divergence(u).unwrap();

    let mut max: f64 = 0.0;
    for k in 2..mesh.nlayers() - 2 {
        for i in 2..mesh.nrows() - 2 {
            for j in 2..mesh.ncols() - 2 {
                max = max.max(divergence.get(i, j, k).abs());
            }
        }
    }
    max
}

#[test]
fn test_uniform_inflow_on_minimal_mesh() {
    let mesh = Mesh::flat(3, 3, 3, 10.0, 10.0).unwrap();
    let sink = RecordingProgress::new();
    let result = SteadyStateSolver::new(short_run(3))
        .run(
            &mesh,
            &UniformInitializer {
                velocity: Vec3::new(5.0, 0.0, 0.0),
            },
            &sink,
            &CancellationToken::new(),
        )
        .unwrap();

    assert!(!result.null_run);
    assert_eq!(result.iterations, 3);
    assert!(result.projection_reports.iter().all(|r| r.converged()));
    let tolerance = LinearSolverConfig::default().tolerance;
    assert!(result.projection_reports.iter().all(|r| r.residual < tolerance));
    assert!(reprojection_residual(&mesh, &result.last) < 1e-5);
    assert!(sink.with_severity(Severity::Fatal).is_empty());

    for node in 0..mesh.numnp() {
        let v = result.average.get(node);
        assert!(v.iter().all(|c| c.is_finite()));
        if result.average.is_on_ground(node) {
            assert_eq!(v, Vec3::zeros());
        }
    }
}

#[test]
fn test_calm_domain_is_a_null_run() {
    let mesh = hill_mesh();
    let sink = RecordingProgress::new();
    let initializer = DomainAverageInitializer {
        speed: 0.0,
        ..DomainAverageInitializer::default()
    };
    let result = SteadyStateSolver::default()
        .run(&mesh, &initializer, &sink, &CancellationToken::new())
        .unwrap();

    assert!(result.null_run);
    assert!(result.average.is_all_zero());
    assert!(sink.with_severity(Severity::Fatal).is_empty());
}

#[test]
fn test_hill_run_reduces_divergence_of_noisy_input() {
    let mesh = hill_mesh();
    let initializer = NoisyInitializer {
        base: DomainAverageInitializer::default(),
        amplitude: 1.0,
        seed: 7,
    };
    let initial = initializer.initialize_fields(&mesh).unwrap();

    let result = SteadyStateSolver::new(short_run(2))
        .run(&mesh, &initializer, &RecordingProgress::new(), &CancellationToken::new())
        .unwrap();

    let before = interior_max_divergence(&mesh, &initial);
    let after = interior_max_divergence(&mesh, &result.last);
    assert!(before > 1e-3);
    assert!(after < before, "{after} vs {before}");

    for node in 0..mesh.numnp() {
        if result.last.is_on_ground(node) {
            assert_eq!(result.last.get(node), Vec3::zeros());
        }
    }
}

#[test]
fn test_runs_with_each_diffusion_scheme() {
    let mesh = hill_mesh();
    for scheme in [
        DiffusionScheme::ExplicitLumpedCapacitance,
        DiffusionScheme::ImplicitBackwardDifference,
        DiffusionScheme::ImplicitCentralDifference,
    ] {
        let config = SteadyStateConfig {
            diffusion: Some(DiffusionConfig {
                scheme,
                ..DiffusionConfig::default()
            }),
            ..short_run(2)
        };
        let sink = RecordingProgress::new();
        let result = SteadyStateSolver::new(config)
            .run(&mesh, &DomainAverageInitializer::default(), &sink, &CancellationToken::new())
            .unwrap();

        assert_eq!(result.iterations, 2, "{scheme:?}");
        assert!(result.projection_reports.iter().all(|r| r.converged()));
        assert!(sink.with_severity(Severity::Fatal).is_empty());
        for node in 0..mesh.numnp() {
            assert!(result.average.get(node).iter().all(|c| c.is_finite()), "{scheme:?}");
        }
    }
}

#[test]
fn test_corrupted_node_class_is_fatal() {
    let mesh = Mesh::flat(4, 4, 4, 10.0, 10.0).unwrap();
    let mut classes: Vec<u8> = (0..mesh.numnp())
        .map(|node| {
            let (i, j, k) = mesh.ijk(node);
            mesh.node_class(i, j, k)
        })
        .collect();
    let bad = mesh.index(1, 2, 1);
    assert_eq!(NodeType::from_class(classes[bad]), Some(NodeType::Internal));
    classes[bad] = 9;
    let mesh = mesh.with_node_classes(classes).unwrap();

    let sink = RecordingProgress::new();
    let result = SteadyStateSolver::default().run(
        &mesh,
        &UniformInitializer {
            velocity: Vec3::new(3.0, 3.0, 0.0),
        },
        &sink,
        &CancellationToken::new(),
    );

    assert!(matches!(
        result,
        Err(SolverError::InvalidNodeType { node, kind: 9 }) if node == bad
    ));
    let fatal = sink.with_severity(Severity::Fatal);
    assert_eq!(fatal.len(), 1);
    assert!(fatal[0].contains("error arranging stiffness matrix"));
}

#[test]
fn test_cancel_from_progress_sink_stops_the_loop() {
    let mesh = Mesh::flat(5, 5, 4, 10.0, 10.0).unwrap();
    let token = CancellationToken::new();
    let sink = CancelAt {
        percent: "50",
        token: token.clone(),
    };

    let result = SteadyStateSolver::new(short_run(4)).run(
        &mesh,
        &UniformInitializer {
            velocity: Vec3::new(2.0, 1.0, 0.0),
        },
        &sink,
        &token,
    );
    assert!(matches!(result, Err(SolverError::Cancelled)));
}

#[test]
fn test_zero_iterations_returns_first_projection() {
    let mesh = hill_mesh();
    let sink = RecordingProgress::new();
    let result = SteadyStateSolver::new(short_run(0))
        .run(&mesh, &DomainAverageInitializer::default(), &sink, &CancellationToken::new())
        .unwrap();

    assert_eq!(result.iterations, 0);
    assert_eq!(result.projection_reports.len(), 1);
    assert_eq!(result.average, result.last);
    assert!(sink.with_severity(Severity::OuterIterProgress).is_empty());

    // No-slip holds for the first projection as well
    for node in 0..mesh.numnp() {
        if result.average.is_on_ground(node) {
            assert_eq!(result.average.get(node), Vec3::zeros());
        }
    }
}
