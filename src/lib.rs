pub mod branch;
mod dense;
pub mod dimred;
pub mod error;
pub mod fit;
pub mod io;
pub mod network;
pub mod report;
pub mod score;
mod utils;

pub use branch::{BranchPoint, BranchTopology};
pub use dimred::pema::{run, CandidateSolution, ModeSubset, Pema, PemaBuilder, ResultTable};
pub use error::PemaError;
pub use fit::FitMethod;
pub use io::load_matrices;
pub use network::MetabolicNetwork;
pub use report::Decomposition;
pub use score::{score, ScoreProvider};
