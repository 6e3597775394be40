//! Runs a complete PEM analysis on a matrix file and prints what the usual plots would show.
//!
//! ```bash
//! RUST_LOG=debug cargo run --example pema_example -- data/toy_network.json
//! ```

use single_pema::io::load_matrices;
use single_pema::{Decomposition, PemaBuilder};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let datafile = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "data/toy_network.json".to_string());

    // number of relaxations, number of branch points, number of PEMs to extract
    let (nrel, nbranch, max_pems) = (3, 1, 5);

    let (x, em) = load_matrices(&datafile)?;
    let pema = PemaBuilder::new()
        .relaxations(nrel)
        .branch_points(nbranch)
        .max_pems(max_pems)
        .build();
    let result = pema.run(x.view(), em.view())?;

    println!("{}", result);

    println!("Scree:");
    for (k, variance) in result.scree() {
        println!("  {:>2} PEMs  {:>8.3}%", k, variance);
    }

    let Some(best) = result.last() else {
        println!("No admissible elementary mode found");
        return Ok(());
    };
    let decomposition =
        Decomposition::compute(x.view(), em.view(), best.modes.indices(), pema.provider())?;

    println!("\nVariance per PEM:");
    for (mode, variance) in decomposition
        .modes
        .iter()
        .zip(decomposition.mode_variance.iter())
    {
        println!("  EM {:>3}  {:>8.3}%", mode, variance);
    }

    println!("\nWeights (scenarios × PEMs):");
    for row in decomposition.weights.rows() {
        let cells: Vec<String> = row.iter().map(|w| format!("{:>8.4}", w)).collect();
        println!("  {}", cells.join(" "));
    }

    println!("\nExplained variance per observation:");
    for (i, variance) in decomposition.observation_variance.iter().enumerate() {
        println!("  obs {:>3}  {:>8.3}%", i, variance);
    }

    let max_residual = decomposition
        .residuals()
        .iter()
        .fold(0.0f64, |acc, r| acc.max(r.abs()));
    println!("\nLargest |observed - predicted| flux: {:.5}", max_residual);

    Ok(())
}
