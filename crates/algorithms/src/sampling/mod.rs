//! Feature table assembly
//!
//! Presence rows from occurrence points, seeded pseudo-absences from valid
//! cells, stratified train/test splitting and CSV persistence.

mod builder;
mod persist;
mod split;
pub(crate) mod table;

pub use builder::{build_feature_table, SamplingParams, SamplingSummary};
pub use persist::{
    read_feature_table, read_feature_table_from, write_feature_table, write_feature_table_to,
};
pub use split::{train_test_split, SplitParams, TrainTestSplit};
pub use table::{FeatureTable, Label, SampleRecord};
