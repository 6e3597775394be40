use approx::assert_relative_eq;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use ndarray::{array, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use single_pema::{
    run, score, BranchTopology, Decomposition, FitMethod, MetabolicNetwork, PemaBuilder,
    PemaError, ResultTable, ScoreProvider,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn random_problem(seed: u64, n_obs: usize, n_flux: usize, n_modes: usize) -> (Array2<f64>, Array2<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let em = Array2::from_shape_fn((n_flux, n_modes), |_| {
        if rng.random_bool(0.4) {
            0.0
        } else {
            rng.random_range(0.1..1.0)
        }
    });
    let weights = Array2::from_shape_fn((n_obs, n_modes), |(_, j)| {
        if j % 3 == 0 {
            rng.random_range(0.5..2.0)
        } else {
            rng.random_range(0.0..0.2)
        }
    });
    let noise = Array2::from_shape_fn((n_obs, n_flux), |_| rng.random_range(-0.05..0.05));
    (weights.dot(&em.t()) + noise, em)
}

fn assert_table_properties(table: &ResultTable, n_modes: usize, max_pems: usize) {
    assert!(table.len() <= max_pems);
    for (i, row) in table.rows().iter().enumerate() {
        assert_eq!(row.modes.len(), i + 1);
        assert!(row.modes.is_valid_for(n_modes));
        assert!((0.0..=100.0).contains(&row.explained_variance));
    }
    for pair in table.explained_variances().windows(2) {
        assert!(
            pair[1] >= pair[0] - 1e-8,
            "explained variance dropped from {} to {}",
            pair[0],
            pair[1]
        );
    }
}

// Toy network (metabolites A, B, C, D):
//   r0: -> A   r1: A -> B   r2: B -> C   r3: B -> D   r4: C ->   r5: D ->   r6: C <-> D
fn toy_network() -> MetabolicNetwork {
    let mut coo = CooMatrix::new(4, 7);
    for &(m, r, v) in &[
        (0, 0, 1.0),
        (0, 1, -1.0),
        (1, 1, 1.0),
        (1, 2, -1.0),
        (1, 3, -1.0),
        (2, 2, 1.0),
        (2, 4, -1.0),
        (2, 6, -1.0),
        (3, 3, 1.0),
        (3, 5, -1.0),
        (3, 6, 1.0),
    ] {
        coo.push(m, r, v);
    }
    MetabolicNetwork::from_stoichiometry(&CsrMatrix::from(&coo))
}

// Elementary modes of the toy network; modes 2 and 3 run r6 in opposite directions.
fn toy_modes() -> Array2<f64> {
    array![
        [1.0, 1.0, 1.0, 1.0],
        [1.0, 1.0, 1.0, 1.0],
        [1.0, 0.0, 1.0, 0.0],
        [0.0, 1.0, 0.0, 1.0],
        [1.0, 0.0, 0.0, 1.0],
        [0.0, 1.0, 1.0, 0.0],
        [0.0, 0.0, 1.0, -1.0]
    ]
}

#[test]
fn five_modes_ten_observations() {
    init_logger();
    let em = array![
        [1.0, 0.0, 0.0, 1.0, 0.5],
        [0.0, 1.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0, 0.0, 0.5],
        [1.0, 1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 1.0, 0.0, 1.0],
        [1.0, 0.0, 1.0, 1.0, 0.0]
    ];
    let weights = Array2::from_shape_fn((10, 5), |(i, j)| 1.0 + ((i * 5 + j * 3) % 7) as f64 / 3.0);
    let x = weights.dot(&em.t());

    let table = run(x.view(), em.view(), 3, 1, 5).unwrap();

    assert_eq!(table.len(), 5);
    assert_table_properties(&table, 5, 5);
    let mut all = table.last().unwrap().modes.indices().to_vec();
    all.sort_unstable();
    assert_eq!(all, vec![0, 1, 2, 3, 4]);
    assert_relative_eq!(table.last().unwrap().explained_variance, 100.0, epsilon = 1e-6);
}

#[test]
fn random_problems_satisfy_table_properties() {
    init_logger();
    for seed in 0..4 {
        let (x, em) = random_problem(seed, 12, 9, 8);
        let table = run(x.view(), em.view(), 2, 2, 6).unwrap();
        assert!(!table.is_empty());
        assert_table_properties(&table, 8, 6);
    }
}

#[test]
fn runs_are_deterministic() {
    let (x, em) = random_problem(7, 15, 10, 12);
    let first = run(x.view(), em.view(), 3, 1, 5).unwrap();
    let second = run(x.view(), em.view(), 3, 1, 5).unwrap();
    assert_eq!(first, second);
}

#[test]
fn stored_variance_matches_rescoring() {
    let (x, em) = random_problem(11, 10, 8, 10);
    let table = run(x.view(), em.view(), 3, 1, 5).unwrap();

    for row in table.rows() {
        let rescored = score(x.view(), em.view(), row.modes.indices()).unwrap();
        assert_relative_eq!(rescored, row.explained_variance, epsilon = 1e-12);
    }
}

#[test]
fn zero_relaxations_keep_greedy_prefixes() {
    let (x, em) = random_problem(3, 10, 8, 10);
    let table = run(x.view(), em.view(), 0, 1, 5).unwrap();

    for pair in table.rows().windows(2) {
        assert_eq!(
            &pair[1].modes.indices()[..pair[0].modes.len()],
            pair[0].modes.indices()
        );
    }
}

#[test]
fn first_row_is_the_best_single_mode() {
    let (x, em) = random_problem(5, 10, 8, 10);
    let table = run(x.view(), em.view(), 3, 1, 3).unwrap();

    let best_single = (0..em.ncols())
        .filter(|&m| em.column(m).iter().any(|&v| v != 0.0))
        .map(|m| score(x.view(), em.view(), &[m]).unwrap())
        .fold(f64::NEG_INFINITY, f64::max);
    assert_relative_eq!(
        table.solution(1).unwrap().explained_variance,
        best_single,
        epsilon = 1e-12
    );
}

#[test]
fn linearly_dependent_modes_still_extend_the_fit() {
    init_logger();
    // four fluxes, five modes: mode 0 + mode 2 = mode 1 + mode 3, yet no mode is a non-negative
    // combination of the others
    let em = array![
        [1.0, 0.0, 0.0, 1.0, 1.0],
        [1.0, 1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 1.0, 0.0, 1.0],
        [0.0, 0.0, 1.0, 1.0, 0.0]
    ];
    let weights = Array2::from_shape_fn((10, 5), |(i, j)| {
        1.0 + 0.5 * ((i + 2 * j) % 3) as f64 + 0.1 * i as f64
    });
    let x = weights.dot(&em.t());

    let table = run(x.view(), em.view(), 3, 1, 5).unwrap();

    assert_eq!(table.len(), 5);
    assert_table_properties(&table, 5, 5);
    let mut all = table.last().unwrap().modes.indices().to_vec();
    all.sort_unstable();
    assert_eq!(all, vec![0, 1, 2, 3, 4]);
    assert_relative_eq!(table.last().unwrap().explained_variance, 100.0, epsilon = 1e-6);
    assert!(table.solution(4).unwrap().explained_variance < 100.0 - 1e-3);
}

#[test]
fn max_pems_beyond_the_cone_truncates() {
    // two fluxes: mode 2 = mode 0 + mode 1 and mode 3 = 2 · mode 1, mode 4 = mode 0 - mode 1
    let em = array![[1.0, 0.0, 1.0, 0.0, 1.0], [0.0, 1.0, 1.0, 2.0, -1.0]];
    let x = array![[2.0, 1.0], [1.0, 3.0], [0.5, 0.5]];

    let conic = run(x.view(), em.view(), 2, 0, 5).unwrap();
    assert_eq!(conic.len(), 3);
    assert_table_properties(&conic, 5, 5);
    let mut modes = conic.last().unwrap().modes.indices().to_vec();
    modes.sort_unstable();
    assert_eq!(modes, vec![0, 1, 4]);

    // with negative weights allowed, any two independent modes span both fluxes
    let linear = PemaBuilder::new()
        .relaxations(2)
        .branch_points(0)
        .max_pems(5)
        .fit_method(FitMethod::LeastSquares)
        .build()
        .run(x.view(), em.view())
        .unwrap();
    assert_eq!(linear.len(), 2);
    assert_relative_eq!(linear.last().unwrap().explained_variance, 100.0, epsilon = 1e-8);
}

#[test]
fn network_branch_points_keep_opposite_modes_apart() {
    init_logger();
    let network = toy_network();
    let em = toy_modes();
    let weights = Array2::from_shape_fn((8, 4), |(i, j)| match j {
        2 => 1.0 + 0.3 * i as f64,
        3 => 0.6 + 0.25 * (i % 3) as f64,
        _ => 0.0,
    });
    let x = weights.dot(&em.t());

    let constrained = PemaBuilder::new()
        .relaxations(3)
        .max_pems(4)
        .topology(BranchTopology::from_network(&network, 3))
        .build()
        .run(x.view(), em.view())
        .unwrap();
    assert_table_properties(&constrained, 4, 4);
    assert!(constrained.len() <= 3);
    for row in constrained.rows() {
        assert!(!(row.modes.contains(2) && row.modes.contains(3)));
    }

    let unconstrained = PemaBuilder::new()
        .relaxations(3)
        .max_pems(4)
        .topology(BranchTopology::unconstrained())
        .build()
        .run(x.view(), em.view())
        .unwrap();
    let mut pair = unconstrained.solution(2).unwrap().modes.indices().to_vec();
    pair.sort_unstable();
    assert_eq!(pair, vec![2, 3]);
    assert_relative_eq!(
        unconstrained.solution(2).unwrap().explained_variance,
        100.0,
        epsilon = 1e-8
    );
    assert!(
        constrained.solution(2).unwrap().explained_variance
            < unconstrained.solution(2).unwrap().explained_variance
    );
}

#[test]
fn decomposition_of_final_row() {
    let (x, em) = random_problem(13, 10, 8, 9);
    let pema = PemaBuilder::new().max_pems(4).build();
    let table = pema.run(x.view(), em.view()).unwrap();
    let best = table.last().unwrap();

    let d = Decomposition::compute(x.view(), em.view(), best.modes.indices(), pema.provider())
        .unwrap();
    assert_relative_eq!(d.explained_variance, best.explained_variance, epsilon = 1e-12);
    assert_eq!(d.weights.dim(), (10, best.modes.len()));
    assert_eq!(d.reconstruction.dim(), x.dim());
    assert!(d.weights.iter().all(|&w| w >= 0.0));
    assert!(d
        .observation_variance
        .iter()
        .all(|v| (0.0..=100.0).contains(v)));
}

#[test]
fn errors_surface_unchanged() {
    let (x, em) = random_problem(1, 5, 6, 4);

    let wrong_fluxes = Array2::<f64>::ones((5, 4));
    let err = run(wrong_fluxes.view(), em.view(), 1, 1, 2).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PemaError>(),
        Some(PemaError::DimensionMismatch { .. })
    ));

    let no_observations = Array2::<f64>::zeros((0, 6));
    let err = run(no_observations.view(), em.view(), 1, 1, 2).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PemaError>(),
        Some(PemaError::InsufficientData { .. })
    ));

    let err = ScoreProvider::default()
        .score(x.view(), em.view(), &[0, 4])
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PemaError>(),
        Some(PemaError::InvalidSubset { .. })
    ));
}
