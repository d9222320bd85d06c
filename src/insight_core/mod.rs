/// ML algorithm core modules
pub mod feature;
pub mod model;
pub mod shared;
pub mod tree;

// Re-export commonly used types
pub use feature::{to_feature_matrix, validate_features};
pub use model::{calibrate_threshold, run_isolation_forest, Ensemble, IsolationForest, Label, ScoredPoint};
pub use shared::SharedForest;
pub use tree::{average_path_length, IsolationTree, TreeNode};
